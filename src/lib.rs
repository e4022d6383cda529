// knode library
// Provisioning logic for a Kubernetes worker node, shared by the CLI and tests

pub mod config;
pub mod error;
pub mod services;
pub mod utils;

// Re-export commonly used items
pub use config::{ConfigLayer, NodeConfig};
pub use error::{ProvisionError, RemoteError};
pub use services::node::{RunReport, Sequencer, StepContext, StepOutcome, StepResult, STEPS};
