//! Type definitions for the offload engine
//!
//! This module contains the wire types shared across the engine: offload
//! requests, execution responses, task statuses and C parameter
//! descriptors.

mod param;
mod request;

pub use param::*;
pub use request::*;
