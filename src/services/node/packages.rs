//! Base dependencies and the Kubernetes package repository

use super::{StepContext, StepOutcome};
use crate::error::ProvisionError;

pub const BASE_DEPENDENCIES: [&str; 3] = ["yum-utils", "device-mapper-persistent-data", "lvm2"];

pub const KUBERNETES_REPO_PATH: &str = "/etc/yum.repos.d/kubernetes.repo";

pub const KUBERNETES_PACKAGES: [&str; 3] = ["kubelet", "kubeadm", "kubectl"];

/// Step 3
pub fn install_dependencies(ctx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
    println!(
        "  Installing {} with {}",
        BASE_DEPENDENCIES.join(", "),
        ctx.package_manager.display_name()
    );
    ctx.package_manager
        .install_packages(ctx.exec, &BASE_DEPENDENCIES, &[])?;
    println!("  ✓ Dependencies installed");
    Ok(StepOutcome::Success)
}

/// The `.repo` definition for one Kubernetes minor stream. The Kubernetes
/// packages are excluded by default so routine updates never move them.
pub fn kubernetes_repo_definition(version: &str) -> String {
    format!(
        "[kubernetes]\n\
         name=Kubernetes\n\
         baseurl=https://pkgs.k8s.io/core:/stable:/{version}/rpm/\n\
         enabled=1\n\
         gpgcheck=1\n\
         gpgkey=https://pkgs.k8s.io/core:/stable:/{version}/rpm/repodata/repomd.xml.key\n\
         exclude={packages} cri-tools kubernetes-cni\n",
        version = version,
        packages = KUBERNETES_PACKAGES.join(" "),
    )
}

/// Step 4. Always overwrites.
pub fn register_kubernetes_repo(ctx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
    let definition = kubernetes_repo_definition(&ctx.config.k8s_version);
    ctx.exec.mkdir_p("/etc/yum.repos.d")?;
    ctx.exec
        .write_file(KUBERNETES_REPO_PATH, definition.as_bytes())?;
    println!(
        "  ✓ Wrote {} for Kubernetes {}",
        KUBERNETES_REPO_PATH, ctx.config.k8s_version
    );
    Ok(StepOutcome::Success)
}
