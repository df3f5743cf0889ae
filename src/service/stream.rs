//! Pull-based result stream returned by the executor.

use crate::error::Result;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::{Stream, StreamExt};

type DynStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'static>>;

/// Forward-only, pull-based result sequence. Each poll advances the underlying
/// cursor by at most one row; dropping the stream releases its connection.
pub struct QueryStream<T> {
    stream: DynStream<T>,
}

impl<T: Send + 'static> QueryStream<T> {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        QueryStream {
            stream: Box::pin(stream),
        }
    }

    /// Stream yielding exactly one item.
    pub fn from_value(value: T) -> Self {
        QueryStream::from_stream(tokio_stream::once(Ok(value)))
    }

    pub fn empty() -> Self {
        QueryStream::from_stream(tokio_stream::empty())
    }

    /// Returns the next item in the stream.
    pub async fn next(&mut self) -> Option<Result<T>> {
        StreamExt::next(&mut self.stream).await
    }

    /// Drain the stream, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }
}

impl<T> Stream for QueryStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}

impl<T> fmt::Debug for QueryStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStream").finish()
    }
}
