//! Client side of the remote collection endpoint.
//!
//! The upload worker only sees the [`RemoteEndpoint`] trait;
//! [`HttpEndpointClient`] is the reqwest-backed implementation.

mod endpoint;
mod error;
mod http;

pub use endpoint::{
    validate_data_point, GeneratorCredentials, ParticipantAccount, RemoteEndpoint, SignInResponse,
};
pub use error::{EndpointError, EndpointResult, PostError};
pub use http::{classify_post_status, EndpointConfig, HttpEndpointClient};
