//! gRPC service surface for `bmcd.v1.Machine`.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`MachineService`), running every
//!   call through the interceptor pipeline.
//! - [`router`] - terminal handler mapping method paths to business logic.

pub mod handler;
pub mod router;

pub use handler::{MachineService, build_machine_service};
pub use router::MethodRouter;
