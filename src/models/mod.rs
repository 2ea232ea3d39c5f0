//! Domain model module declarations.

pub mod request;
pub mod service;

pub use request::{CheckpointRequest, MessageResponse, MountSpec, StartRequest, SubscribeQuery};
pub use service::{Service, ServiceStatus};
