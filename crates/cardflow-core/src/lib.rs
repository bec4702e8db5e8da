//! Core error type for the cardflow relay.
//!
//! Every crate in the workspace reports failures through [`CardflowError`],
//! one variant per concern, so callers can match on the failure class
//! without caring which component produced it.

mod error;

pub use error::CardflowError;
