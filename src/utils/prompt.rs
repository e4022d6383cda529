//! Operator input

use anyhow::Result;
use std::io::{self, Write};

/// Source of operator answers. Injected so the steps run without a terminal.
pub trait Prompt {
    /// Ask a question and return the trimmed reply (empty when none was given)
    fn ask(&self, question: &str) -> Result<String>;
}

/// Reads replies from stdin
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn ask(&self, question: &str) -> Result<String> {
        print!("{}: ", question);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }
}

/// Answers every question with nothing (`--yes` runs)
pub struct NoPrompt;

impl Prompt for NoPrompt {
    fn ask(&self, question: &str) -> Result<String> {
        log::info!("Not prompting (non-interactive): {}", question);
        Ok(String::new())
    }
}
