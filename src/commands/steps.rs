use knode::STEPS;

/// Handle steps command
pub fn handle_steps() {
    println!("Provisioning steps:");
    println!();
    for step in STEPS.iter() {
        println!("  {}. {}", step.number, step.title);
    }
    println!();
    println!("Resume a stopped run with: knode provision --from-step <N>");
}
