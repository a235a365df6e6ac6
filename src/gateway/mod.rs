//! Single point of contact with the remote account system's RPC endpoint.

mod client;
mod password;
mod rpc;

pub use client::NewClient;
pub use password::generate_password;
pub use rpc::{RpcGateway, RpcResponse};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("undecodable response: {message}")]
    Decode { message: String, body: String },

    #[error("remote error: {0}")]
    Remote(String),
}

/// Identifier the remote system assigned to a created client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operations the importer needs from the remote system.
#[async_trait]
pub trait ClientGateway: Send + Sync {
    /// Whether a client with this email already exists remotely.
    async fn client_exists(&self, email: &str) -> Result<bool, GatewayError>;

    /// Creates the client and returns the remote identifier.
    async fn create_client(&self, client: &NewClient) -> Result<RemoteId, GatewayError>;
}
