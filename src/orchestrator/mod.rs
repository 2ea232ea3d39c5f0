//! Container orchestration.
//!
//! Covers container start, stop and removal, status resolution, and
//! rebuilding the registry after a restart.

pub mod lifecycle;
