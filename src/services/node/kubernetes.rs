use super::packages::KUBERNETES_PACKAGES;
use super::{StepContext, StepOutcome};
use crate::error::ProvisionError;
use crate::utils::exec::run_checked;

/// Step 6. The repo excludes these packages, so lift the exclusion for this install only.
pub fn install_kubernetes_components(
    ctx: &mut StepContext,
) -> Result<StepOutcome, ProvisionError> {
    ctx.package_manager.install_packages(
        ctx.exec,
        &KUBERNETES_PACKAGES,
        &["--disableexcludes=kubernetes"],
    )?;
    println!("  ✓ Installed {}", KUBERNETES_PACKAGES.join(", "));
    Ok(StepOutcome::Success)
}

/// Step 7. Enabled only; kubeadm join starts it.
pub fn enable_kubelet(ctx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
    run_checked(ctx.exec, "systemctl", &["enable", "kubelet"])?;
    println!("  ✓ kubelet enabled (starts on join)");
    Ok(StepOutcome::Success)
}
