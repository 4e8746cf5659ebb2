//! Public facade crate for `veracity`.
//!
//! This crate intentionally contains no IO or provider-specific logic.
//! It re-exports the verdict types, the response parser and the quote matcher from
//! `veracity-core`.

pub use veracity_core::*;
