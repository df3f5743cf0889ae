pub mod types;
pub mod filter;
pub mod loader;
pub mod validator;

pub use types::*;
pub use filter::*;
pub use loader::*;
pub use validator::*;
