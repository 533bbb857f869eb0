//! Durable FIFO queue of pending data points.
//!
//! [`QueueFile`] is the crash-safe byte engine: CRC-framed entries behind a
//! checksummed header that is only rewritten once an entry is on disk.
//! [`DurableQueue`] layers JSON encoding and an optional [`QueueEncryptor`]
//! on top and is what the delivery manager holds.

mod datapoint;
mod encryption;
mod error;
mod file;
mod queue;

pub use datapoint::{AcquisitionProvenance, DataPoint, DataPointHeader, Modality, SchemaId};
pub use encryption::{ChaChaEncryptor, ClearEncryptor, QueueEncryptor, KEY_SIZE, NONCE_SIZE};
pub use error::{QueueError, QueueResult};
pub use file::{QueueFile, COMPACTION_THRESHOLD_BYTES, HEADER_LEN};
pub use queue::DurableQueue;
