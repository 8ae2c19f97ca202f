//! Change feed sources

use crate::ingest::error::{IngestError, IngestResult};
use crate::ingest::event::ChangeEvent;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::mpsc;

/// Ordered source of change events
#[async_trait]
pub trait ChangeFeed: Send {
    /// Next event, or `None` once the feed is exhausted
    ///
    /// A [`IngestError::Malformed`] error covers one bad entry only; the
    /// feed stays usable and the following call moves past it.
    async fn next_event(&mut self) -> IngestResult<Option<ChangeEvent>>;

    /// Human-readable name used in logs
    fn name(&self) -> &str;
}

/// In-process feed backed by a bounded tokio channel
pub struct ChannelFeed {
    receiver: mpsc::Receiver<ChangeEvent>,
}

impl ChannelFeed {
    /// Create a feed and the sender producers publish into
    pub fn new(capacity: usize) -> (mpsc::Sender<ChangeEvent>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver })
    }
}

#[async_trait]
impl ChangeFeed for ChannelFeed {
    async fn next_event(&mut self) -> IngestResult<Option<ChangeEvent>> {
        Ok(self.receiver.recv().await)
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Newline-delimited JSON change events
pub struct JsonLinesFeed<R> {
    lines: Lines<BufReader<R>>,
    source_name: String,
    line: usize,
}

impl JsonLinesFeed<File> {
    /// Open a JSON-lines file
    pub async fn open(path: impl AsRef<Path>) -> IngestResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        Ok(Self::from_reader(file, path.display().to_string()))
    }
}

impl<R: AsyncRead + Unpin + Send> JsonLinesFeed<R> {
    pub fn from_reader(reader: R, source_name: impl Into<String>) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            source_name: source_name.into(),
            line: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ChangeFeed for JsonLinesFeed<R> {
    async fn next_event(&mut self) -> IngestResult<Option<ChangeEvent>> {
        loop {
            let Some(raw) = self.lines.next_line().await? else {
                return Ok(None);
            };
            self.line += 1;

            let raw = raw.trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }
            return serde_json::from_str::<ChangeEvent>(raw)
                .map(Some)
                .map_err(|e| IngestError::Malformed {
                    source_name: self.source_name.clone(),
                    line: self.line,
                    reason: e.to_string(),
                });
        }
    }

    fn name(&self) -> &str {
        &self.source_name
    }
}
