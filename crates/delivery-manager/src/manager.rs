//! Delivery manager façade.

use crate::delegate::DelegateSlot;
use crate::{
    CredentialSession, DeliveryDelegate, DeliveryError, DeliveryResult, DrainReport, UploadWorker,
};
use delivery_client::{GeneratorCredentials, RemoteEndpoint};
use delivery_config_and_utils::{Config, Paths};
use delivery_queue::{DataPoint, DurableQueue, QueueEncryptor};
use delivery_storage::SecureStorage;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Entry point for submitting data points and managing the participant session.
pub struct DeliveryManager {
    queue: Arc<Mutex<DurableQueue>>,
    session: Arc<CredentialSession>,
    endpoint: Arc<dyn RemoteEndpoint>,
    delegate: Arc<DelegateSlot>,
    worker: Arc<UploadWorker>,
}

impl DeliveryManager {
    pub fn new(
        queue: DurableQueue,
        session: CredentialSession,
        endpoint: Arc<dyn RemoteEndpoint>,
    ) -> Arc<Self> {
        let queue = Arc::new(Mutex::new(queue));
        let session = Arc::new(session);
        let delegate = Arc::new(DelegateSlot::default());
        let worker = Arc::new(UploadWorker::new(
            queue.clone(),
            session.clone(),
            endpoint.clone(),
            delegate.clone(),
        ));

        Arc::new(Self {
            queue,
            session,
            endpoint,
            delegate,
            worker,
        })
    }

    /// Open the queue at `<base>/<queue_directory>/delivery.queue` and build a manager.
    pub fn open(
        config: &Config,
        paths: &Paths,
        store: Arc<dyn SecureStorage>,
        endpoint: Arc<dyn RemoteEndpoint>,
        encryptor: Box<dyn QueueEncryptor>,
    ) -> DeliveryResult<Arc<Self>> {
        let queue_path = paths.queue_file(&config.queue_directory);
        let queue = DurableQueue::open(&queue_path, encryptor)?;
        info!(
            path = %queue_path.display(),
            pending = queue.size(),
            "Delivery manager opened"
        );
        Ok(Self::new(queue, CredentialSession::new(store), endpoint))
    }

    pub fn set_delegate(&self, delegate: Arc<dyn DeliveryDelegate>) {
        self.delegate.set(delegate);
    }

    pub fn clear_delegate(&self) {
        self.delegate.clear();
    }

    /// Deliver the external unlock signal. Unlocking starts an upload of
    /// anything queued meanwhile.
    pub async fn set_credential_store_unlocked(&self, unlocked: bool) {
        if self.session.set_unlocked(unlocked).await {
            self.worker.trigger();
        }
    }

    pub async fn is_signed_in(&self) -> bool {
        self.session.is_signed_in().await
    }

    pub async fn has_credentials(&self) -> bool {
        self.session.has_credentials().await
    }

    pub async fn username(&self) -> Option<String> {
        self.session.username().await
    }

    /// Number of records waiting for upload.
    pub async fn pending_count(&self) -> usize {
        self.queue.lock().await.size()
    }

    /// Whether the upload worker is currently draining.
    pub fn is_uploading(&self) -> bool {
        self.worker.is_uploading()
    }

    /// Persist a record for upload. Returns once it is durable on disk.
    ///
    /// The queue lock is held from the signed-in check through the append, so
    /// a concurrent [`sign_out`](Self::sign_out) either runs first and the
    /// submit is refused, or runs after and clears the record.
    pub async fn submit(&self, point: DataPoint) -> DeliveryResult<()> {
        {
            let mut queue = self.queue.lock().await;
            if !self.session.is_signed_in().await {
                return Err(DeliveryError::NotSignedIn);
            }
            if !self.endpoint.validate(&point) {
                debug!(record_id = %point.id(), "Rejected invalid record");
                return Err(DeliveryError::InvalidRecord);
            }
            queue.append(&point)?;
        }

        self.worker.trigger();
        Ok(())
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> DeliveryResult<()> {
        if !self.session.is_unlocked().await {
            return Err(DeliveryError::SessionLocked);
        }

        let response = self.endpoint.sign_in(username, password).await?;
        self.session.set_auth_token(&response.auth_token).await?;
        info!(username = %username, "Signed in");

        self.delegate.notify(|d| d.on_sign_in());
        self.worker.trigger();
        Ok(())
    }

    /// Sign in with the stored username and password.
    pub async fn sign_in_with_credentials(&self) -> DeliveryResult<()> {
        if !self.session.is_unlocked().await {
            return Err(DeliveryError::SessionLocked);
        }

        let username = self.session.username().await;
        let password = self.session.password().await;
        let (username, password) = match (username, password) {
            (Some(username), Some(password)) => (username, password),
            _ => return Err(DeliveryError::DoesNotHaveCredentials),
        };
        self.sign_in(&username, &password).await
    }

    /// Create a participant account and store its credentials.
    pub async fn generate_participant_account(
        &self,
        credentials: &GeneratorCredentials,
    ) -> DeliveryResult<()> {
        if !self.session.is_unlocked().await {
            return Err(DeliveryError::SessionLocked);
        }
        if self.session.has_credentials().await {
            return Err(DeliveryError::AlreadyHasCredentials);
        }

        let account = self.endpoint.generate_account(credentials).await?;
        self.session
            .set_credentials(&account.username, &account.password)
            .await?;
        info!(username = %account.username, "Participant account stored");

        self.delegate.notify(|d| d.on_sign_in());
        Ok(())
    }

    /// Sign out remotely (best effort), then wipe the queue and credentials.
    ///
    /// Local clearing always runs; its first failure is returned after the
    /// delegate has been notified.
    pub async fn sign_out(&self) -> DeliveryResult<()> {
        if let Some(token) = self.session.auth_token().await {
            match self.endpoint.sign_out(&token).await {
                Ok(true) => debug!("Remote sign-out acknowledged"),
                Ok(false) => warn!("Remote sign-out refused, clearing locally"),
                Err(e) => warn!(error = %e, "Remote sign-out failed, clearing locally"),
            }
        }

        let (queue_result, session_result) = {
            let mut queue = self.queue.lock().await;
            let queue_result = queue.clear();
            let session_result = self.session.clear().await;
            (queue_result, session_result)
        };
        info!("Signed out");

        self.delegate.notify(|d| d.on_sign_out());

        queue_result?;
        session_result?;
        Ok(())
    }

    /// Ask the worker to try uploading now.
    pub fn nudge(&self) {
        self.worker.trigger();
    }

    /// Drain on the calling task and report what happened.
    pub async fn upload_now(&self) -> DrainReport {
        self.worker.run().await
    }

    /// Nudge the worker every `interval` until the manager is dropped.
    ///
    /// Returns `None` without spawning anything when `interval` is zero.
    pub fn spawn_periodic_retry(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            warn!("Periodic upload retry needs a non-zero interval, not started");
            return None;
        }

        let manager: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match manager.upgrade() {
                    Some(manager) => manager.nudge(),
                    None => break,
                }
            }
            debug!("Periodic upload retry stopped");
        });
        Some(handle)
    }

    /// Start the periodic retry if `retry_interval_secs` is configured.
    pub fn spawn_configured_retry(self: &Arc<Self>, config: &Config) -> Option<JoinHandle<()>> {
        config
            .retry_interval_secs
            .and_then(|secs| self.spawn_periodic_retry(Duration::from_secs(secs)))
    }
}
