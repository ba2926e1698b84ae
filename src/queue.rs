use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::models::ArticleRecord;
use crate::utils::error::{AppError, Result};

/// Hand-off point between extraction and downstream processing.
#[async_trait]
pub trait ArticleQueue: Send + Sync {
    async fn enqueue(&self, batch: Vec<ArticleRecord>) -> Result<()>;

    /// Next record, or `None` once the queue is drained.
    async fn dequeue(&self) -> Result<Option<ArticleRecord>>;
}

/// In-process queue over a tokio channel.
pub struct ChannelQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<ArticleRecord>>>,
    receiver: Mutex<mpsc::UnboundedReceiver<ArticleRecord>>,
}

impl ChannelQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(receiver),
        }
    }

    /// Stops accepting records. `dequeue` returns `None` once the backlog is consumed.
    pub async fn close(&self) {
        self.sender.lock().await.take();
    }
}

impl Default for ChannelQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArticleQueue for ChannelQueue {
    async fn enqueue(&self, batch: Vec<ArticleRecord>) -> Result<()> {
        let sender = self.sender.lock().await;
        let sender = sender
            .as_ref()
            .ok_or_else(|| AppError::Queue("queue closed".to_string()))?;
        for record in batch {
            sender
                .send(record)
                .map_err(|_| AppError::Queue("receiver dropped".to_string()))?;
        }
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<ArticleRecord>> {
        Ok(self.receiver.lock().await.recv().await)
    }
}

/// JSON-lines spool file shared between a crawl process and an upload process.
///
/// Records are appended on enqueue. The first dequeue on an empty buffer
/// loads every spooled record and truncates the file.
pub struct SpoolQueue {
    path: PathBuf,
    pending: Mutex<VecDeque<ArticleRecord>>,
}

impl SpoolQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<VecDeque<ArticleRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(VecDeque::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = VecDeque::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ArticleRecord>(line) {
                Ok(record) => records.push_back(record),
                Err(e) => warn!(path = %self.path.display(), line = line_no + 1, error = %e, "Skipping malformed spool line"),
            }
        }

        tokio::fs::write(&self.path, b"").await?;
        debug!(path = %self.path.display(), records = records.len(), "Spool loaded");
        Ok(records)
    }
}

#[async_trait]
impl ArticleQueue for SpoolQueue {
    async fn enqueue(&self, batch: Vec<ArticleRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut buffer = Vec::new();
        for record in &batch {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        debug!(path = %self.path.display(), records = batch.len(), "Records spooled");
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<ArticleRecord>> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            *pending = self.load().await?;
        }
        Ok(pending.pop_front())
    }
}

/// Drains `queue` until it reports empty.
pub async fn drain<Q: ArticleQueue + ?Sized>(queue: &Q) -> Result<Vec<ArticleRecord>> {
    let mut records = Vec::new();
    while let Some(record) = queue.dequeue().await? {
        records.push(record);
    }
    Ok(records)
}
