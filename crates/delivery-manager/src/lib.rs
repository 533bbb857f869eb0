//! # Delivery Manager
//!
//! Reliable delivery of data points to a remote collection endpoint.
//!
//! Records are persisted in a [`DurableQueue`](delivery_queue::DurableQueue)
//! before [`DeliveryManager::submit`] returns, then drained by a single-flight
//! [`UploadWorker`] one record at a time:
//!
//! - success, conflict, or invalid record: the head is removed and the next
//!   record is attempted;
//! - anything else: the head stays and draining stops until the next trigger
//!   (a submit, a session unlock, a nudge, or the optional periodic retry).
//!
//! Uploads only run while the [`CredentialSession`] is unlocked and signed in.
//!
//! ```ignore
//! let manager = DeliveryManager::open(&config, &paths, store, endpoint, encryptor)?;
//! manager.set_credential_store_unlocked(true).await;
//! manager.sign_in("participant", "password").await?;
//! manager.submit(point).await?;
//! ```

mod delegate;
mod error;
mod manager;
mod session;
mod worker;

#[cfg(test)]
mod tests;

pub use delegate::DeliveryDelegate;
pub use error::{DeliveryError, DeliveryResult, SessionError, SessionResult};
pub use manager::DeliveryManager;
pub use session::CredentialSession;
pub use worker::{DrainReport, StopReason, UploadWorker};
