// src/sched/mod.rs

//! Scheduling: readiness, dispatch, completion and batch close-out.

pub mod internal;
pub mod permission;
pub mod scheduler;

pub use permission::PermissionGuard;
pub use scheduler::Scheduler;
