//! On-disk state owned by the agent.

pub mod service_dir;
