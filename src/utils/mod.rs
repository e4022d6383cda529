// Utils module - code that calls out to the host, the operator, or the control plane
pub mod exec;
pub mod hostname;
pub mod prompt;
pub mod ssh;
