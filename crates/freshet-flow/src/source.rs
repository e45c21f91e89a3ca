//! Event source contract and the shipped implementations.
//!
//! The production bus client is collaborator-owned; the engine only needs
//! something that yields raw payloads in arrival order. Shipped here: an
//! in-memory source for tests and an NDJSON line reader for the service
//! binary and replay runs.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::error::{Error, Result};

/// Yields raw change-event payloads in arrival order.
#[async_trait]
pub trait EventSource: Send {
    /// Returns the next payload, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns a source error when the underlying transport fails
    /// irrecoverably.
    async fn next_record(&mut self) -> Result<Option<Bytes>>;
}

/// A fixed sequence of payloads, served in order.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: VecDeque<Bytes>,
}

impl MemorySource {
    /// Creates a source over the given payloads.
    pub fn new<I>(records: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        Self {
            records: records.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl EventSource for MemorySource {
    async fn next_record(&mut self) -> Result<Option<Bytes>> {
        Ok(self.records.pop_front())
    }
}

/// Reads one JSON payload per line from an async reader.
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    /// Wraps a buffered async reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for JsonLinesSource<R> {
    async fn next_record(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => return Ok(Some(Bytes::from(line))),
                Ok(None) => return Ok(None),
                Err(err) => {
                    return Err(Error::source_failure("failed to read event line", err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_source_serves_in_order_then_ends() {
        let mut source = MemorySource::new(["a", "b"]);
        assert_eq!(source.next_record().await.unwrap(), Some(Bytes::from("a")));
        assert_eq!(source.next_record().await.unwrap(), Some(Bytes::from("b")));
        assert_eq!(source.next_record().await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_lines_source_skips_blank_lines() {
        let input = b"{\"id\":1}\n\n{\"id\":2}\n" as &[u8];
        let mut source = JsonLinesSource::new(input);
        assert_eq!(
            source.next_record().await.unwrap(),
            Some(Bytes::from("{\"id\":1}"))
        );
        assert_eq!(
            source.next_record().await.unwrap(),
            Some(Bytes::from("{\"id\":2}"))
        );
        assert_eq!(source.next_record().await.unwrap(), None);
    }
}
