//! Single-flight upload worker.

use crate::delegate::DelegateSlot;
use crate::CredentialSession;
use delivery_client::{PostError, RemoteEndpoint};
use delivery_queue::{DataPoint, DurableQueue, QueueError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Why a drain stopped before the queue was empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Session locked or signed out.
    NotReady,
    /// The queue could not be read or updated.
    Storage,
    /// Signed in but no token could be read.
    MissingToken,
    /// The endpoint failed in a way that may succeed later; head kept.
    Transient,
}

/// Summary of one [`UploadWorker::run`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Records accepted by the endpoint.
    pub uploaded: usize,
    /// Records removed after a conflict or invalid-record answer.
    pub discarded: usize,
    /// Set when draining stopped with records possibly left.
    pub stop: Option<StopReason>,
    /// Another drain was already in progress; this call did nothing.
    pub already_running: bool,
}

enum DrainExit {
    Idle,
    Stopped(StopReason),
}

/// Drains the queue head-first against the endpoint.
///
/// At most one drain runs at a time. Locks are never held across the
/// network call.
pub struct UploadWorker {
    queue: Arc<Mutex<DurableQueue>>,
    session: Arc<CredentialSession>,
    endpoint: Arc<dyn RemoteEndpoint>,
    delegate: Arc<DelegateSlot>,
    uploading: AtomicBool,
}

impl UploadWorker {
    pub(crate) fn new(
        queue: Arc<Mutex<DurableQueue>>,
        session: Arc<CredentialSession>,
        endpoint: Arc<dyn RemoteEndpoint>,
        delegate: Arc<DelegateSlot>,
    ) -> Self {
        Self {
            queue,
            session,
            endpoint,
            delegate,
            uploading: AtomicBool::new(false),
        }
    }

    /// Whether a drain is currently running.
    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::Acquire)
    }

    /// Schedule a drain on the runtime and return immediately.
    pub fn trigger(self: &Arc<Self>) {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let report = worker.run().await;
            if !report.already_running {
                debug!(
                    uploaded = report.uploaded,
                    discarded = report.discarded,
                    stop = ?report.stop,
                    "Upload drain finished"
                );
            }
        });
    }

    /// Drain until the queue is empty or an attempt stops the drain.
    pub async fn run(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let mut first_pass = true;

        loop {
            if self
                .uploading
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                report.already_running = first_pass;
                return report;
            }
            first_pass = false;

            let exit = self.drain(&mut report).await;
            self.uploading.store(false, Ordering::Release);

            match exit {
                DrainExit::Stopped(reason) => {
                    report.stop = Some(reason);
                    return report;
                }
                DrainExit::Idle => {
                    // A submit may have been refused the flag after our last
                    // empty check; pick its record up.
                    let pending = !self.queue.lock().await.is_empty();
                    if !pending || !self.session.is_signed_in().await {
                        return report;
                    }
                }
            }
        }
    }

    async fn drain(&self, report: &mut DrainReport) -> DrainExit {
        loop {
            if !self.session.is_signed_in().await {
                debug!("Session not ready, upload deferred");
                return DrainExit::Stopped(StopReason::NotReady);
            }

            let (point, epoch) = match self.peek_head().await {
                Ok(Some(head)) => head,
                Ok(None) => return DrainExit::Idle,
                Err(e) => {
                    error!(error = %e, "Failed to read queue head");
                    return DrainExit::Stopped(StopReason::Storage);
                }
            };

            let token = match self.session.auth_token().await {
                Some(token) if !token.is_empty() => token,
                _ => {
                    error!(record_id = %point.id(), "Upload attempted without an auth token");
                    return DrainExit::Stopped(StopReason::MissingToken);
                }
            };

            match self.endpoint.post_record(&point, &token).await {
                Ok(()) => {
                    if let Err(reason) = self.remove_head(epoch).await {
                        return DrainExit::Stopped(reason);
                    }
                    report.uploaded += 1;
                    info!(record_id = %point.id(), "Record uploaded");
                }
                Err(e) if e.is_permanent() => {
                    if let Err(reason) = self.remove_head(epoch).await {
                        return DrainExit::Stopped(reason);
                    }
                    report.discarded += 1;
                    warn!(record_id = %point.id(), error = %e, "Record discarded");
                }
                Err(PostError::InvalidToken) => {
                    warn!(record_id = %point.id(), "Auth token rejected, upload paused");
                    self.delegate.notify(|d| d.on_invalid_token());
                    return DrainExit::Stopped(StopReason::Transient);
                }
                Err(e) => {
                    warn!(
                        record_id = %point.id(),
                        error = %e,
                        "Upload failed, will retry on next trigger"
                    );
                    return DrainExit::Stopped(StopReason::Transient);
                }
            }
        }
    }

    async fn peek_head(&self) -> Result<Option<(DataPoint, u64)>, QueueError> {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return Ok(None);
        }
        match queue.peek_head() {
            Ok(point) => Ok(Some((point, queue.epoch()))),
            Err(QueueError::Empty) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove the head unless the queue was cleared since it was peeked.
    async fn remove_head(&self, peeked_epoch: u64) -> Result<(), StopReason> {
        let mut queue = self.queue.lock().await;
        if queue.epoch() != peeked_epoch {
            debug!("Queue cleared during upload, nothing to remove");
            return Ok(());
        }
        queue.remove_head().map_err(|e| {
            error!(error = %e, "Failed to remove queue head");
            StopReason::Storage
        })
    }
}
