//! Remote endpoint contract.

use crate::{EndpointResult, PostError};
use async_trait::async_trait;
use delivery_queue::DataPoint;
use serde::{Deserialize, Serialize};

/// Credentials that allow minting a participant account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorCredentials {
    pub generator_id: String,
    pub generator_password: String,
}

/// A freshly generated participant account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantAccount {
    pub username: String,
    pub password: String,
}

/// Successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInResponse {
    pub auth_token: String,
}

/// Operations the delivery manager needs from the collection endpoint.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    async fn generate_account(
        &self,
        credentials: &GeneratorCredentials,
    ) -> EndpointResult<ParticipantAccount>;

    async fn sign_in(&self, username: &str, password: &str) -> EndpointResult<SignInResponse>;

    /// Invalidate `auth_token` remotely. Returns the endpoint's success flag.
    async fn sign_out(&self, auth_token: &str) -> EndpointResult<bool>;

    /// Local structural check, run before a record is enqueued.
    fn validate(&self, point: &DataPoint) -> bool {
        validate_data_point(point)
    }

    /// Upload one record.
    async fn post_record(&self, point: &DataPoint, auth_token: &str) -> Result<(), PostError>;
}

/// Structural validation shared by every endpoint implementation.
pub fn validate_data_point(point: &DataPoint) -> bool {
    let schema = &point.header.schema;
    !point.header.id.is_nil()
        && !schema.namespace.trim().is_empty()
        && !schema.name.trim().is_empty()
        && !schema.version.trim().is_empty()
        && !point.body.is_null()
}
