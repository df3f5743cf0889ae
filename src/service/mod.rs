//! Query execution: the streaming executor and its result stream.

mod executor;
mod stream;
pub use executor::{QueryExecutor, QueryExecutorBuilder, QueryItem};
pub use stream::QueryStream;
