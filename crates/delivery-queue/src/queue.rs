//! Typed queue of data points.

use crate::{DataPoint, QueueEncryptor, QueueFile, QueueResult};
use std::path::Path;
use tracing::{debug, info};

/// Persistent FIFO of [`DataPoint`]s.
///
/// Entries are JSON-encoded, passed through the encryptor, and stored in a
/// [`QueueFile`]. Callers serialize access (the delivery manager keeps it
/// behind a mutex).
pub struct DurableQueue {
    file: QueueFile,
    encryptor: Box<dyn QueueEncryptor>,
    epoch: u64,
}

impl DurableQueue {
    /// Open (or create) the queue stored at `path`.
    pub fn open(path: impl AsRef<Path>, encryptor: Box<dyn QueueEncryptor>) -> QueueResult<Self> {
        let file = QueueFile::open(path)?;
        Ok(Self {
            file,
            encryptor,
            epoch: 0,
        })
    }

    /// Append a data point at the tail. Durable once this returns `Ok`.
    pub fn append(&mut self, point: &DataPoint) -> QueueResult<()> {
        let encoded = serde_json::to_vec(point)?;
        let stored = self.encryptor.encrypt(&encoded)?;
        self.file.append(&stored)?;
        debug!(record_id = %point.id(), pending = self.file.size(), "Data point enqueued");
        Ok(())
    }

    /// Decode the head data point without removing it.
    pub fn peek_head(&mut self) -> QueueResult<DataPoint> {
        let stored = self.file.peek()?;
        let encoded = self.encryptor.decrypt(&stored)?;
        Ok(serde_json::from_slice(&encoded)?)
    }

    /// Remove the head data point.
    pub fn remove_head(&mut self) -> QueueResult<()> {
        self.file.remove()
    }

    /// Drop every pending data point. Idempotent.
    ///
    /// Bumps [`DurableQueue::epoch`] so a worker holding a peeked head can
    /// tell the queue was wiped underneath it.
    pub fn clear(&mut self) -> QueueResult<()> {
        let dropped = self.file.size();
        self.epoch += 1;
        self.file.clear()?;
        if dropped > 0 {
            info!(dropped, "Queue cleared");
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.file.size()
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }

    /// Number of times the queue has been cleared since it was opened.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl std::fmt::Debug for DurableQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueue")
            .field("path", &self.file.path())
            .field("size", &self.file.size())
            .field("epoch", &self.epoch)
            .finish()
    }
}
