//! `veracity-cli` crate (library surface).
//!
//! The entrypoint for end users is the `veracity` binary. This module re-exports the
//! crates it is built from so embedders get one dependency with a stable layout.

pub use veracity_core as core;
pub use veracity_local as local;
