#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// Generated tonic bindings for the `bmcd.v1.Machine` service.
#[allow(clippy::all, missing_docs)]
pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/bmcd.v1.Machine.rs"));
}
