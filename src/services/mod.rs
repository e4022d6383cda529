//! Services - the provisioning logic behind each command
pub mod node;
