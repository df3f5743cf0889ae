//! HTTP handlers over the generated endpoint registry.

pub mod endpoint;
pub use endpoint::*;
