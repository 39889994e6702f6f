//! Gantry Client
//!
//! HTTP client for a gantry host: a generic call path plus typed
//! helpers for the system service. The transfer-then-install flow for
//! deploying an addin is two calls:
//!
//! ```ignore
//! let client = Client::new("127.0.0.1", 5001);
//! client.transfer_file("./target/release/libopencmd.so").await?;
//! client
//!     .install(&InstallMessage::new("libopencmd.so", Vec::new()))
//!     .await?;
//! ```

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;

use gantry_api::wire::system;
use gantry_api::{Envelope, InstallMessage, ReturnMessage, ServiceMetaData, TransferMessage};

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode reply: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Client for one gantry host
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint: String,
}

impl Client {
    /// Create a client for the host at `host:port`
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_endpoint(format!("http://{host}:{port}/rpc"))
    }

    /// Create a client for a full endpoint URL
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one call and return the raw reply envelope
    pub async fn call(
        &self,
        service: impl Into<String>,
        function: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<Envelope> {
        let request = Envelope::new(service, function, data);
        let reply = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<Envelope>()
            .await?;
        Ok(reply)
    }

    /// Send one call and decode the reply payload as `T`
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        service: impl Into<String>,
        function: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<T> {
        let reply = self.call(service, function, data).await?;
        Ok(serde_json::from_str(&reply.data)?)
    }

    /// Upload a file into the host's staging area
    pub async fn transfer(&self, message: &TransferMessage) -> Result<ReturnMessage> {
        self.system_call(system::TRANSFER, message).await
    }

    /// Read a local file and transfer it base64-encoded under its own
    /// file name
    pub async fn transfer_file(&self, path: impl AsRef<Path>) -> Result<ReturnMessage> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        self.transfer(&TransferMessage {
            filename,
            kind: "base64".to_string(),
            content: BASE64.encode(bytes),
        })
        .await
    }

    /// Install a previously transferred addin
    pub async fn install(&self, message: &InstallMessage) -> Result<ReturnMessage> {
        self.system_call(system::INSTALL, message).await
    }

    /// Uninstall an addin and remove its files from the host
    pub async fn uninstall(&self, message: &InstallMessage) -> Result<ReturnMessage> {
        self.system_call(system::UNINSTALL, message).await
    }

    /// List registered services with their functions and usage counters
    pub async fn list(&self) -> Result<Vec<ServiceMetaData>> {
        self.call_json(system::SERVICE, system::LIST, "").await
    }

    async fn system_call<M: serde::Serialize>(
        &self,
        function: &str,
        message: &M,
    ) -> Result<ReturnMessage> {
        self.call_json(system::SERVICE, function, serde_json::to_string(message)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_host_and_port() {
        let client = Client::new("127.0.0.1", 5001);
        assert_eq!(client.endpoint(), "http://127.0.0.1:5001/rpc");
    }

    #[test]
    fn test_endpoint_taken_verbatim() {
        let client = Client::with_endpoint("http://box.local:9000/rpc");
        assert_eq!(client.endpoint(), "http://box.local:9000/rpc");
    }
}
