//! SQL generation: dialects, parameter binding and the default query-option compiler.

mod compiler;
mod dialect;
pub mod odata;
pub mod params;
mod statement;

pub use compiler::*;
pub use dialect::*;
pub use params::*;
pub use statement::*;
