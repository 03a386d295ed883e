//! Node registration with the node server, which hands out the bus server address.

use crate::bus::error::BusError;
use crate::bus::models::{RegisterRequest, RegisterResponse};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const LOG_TARGET: &str = "pulse_rx::bus::registration";

/// Timeout for every node server request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the node server's registration endpoints.
#[derive(Clone, Debug)]
pub struct NodeRegistrar {
    client: Client,
    node_server: String,
}

impl NodeRegistrar {
    /// `node_server` may be given with or without an `http://` scheme.
    pub fn new(node_server: &str) -> Result<Self, BusError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(NodeRegistrar {
            client,
            node_server: with_http_scheme(node_server),
        })
    }

    pub fn node_server(&self) -> &str {
        &self.node_server
    }

    /// Registers this node and returns the bus server it should connect to.
    #[instrument(skip(self, request), fields(node = %request.node_name, node_id = %request.node_id))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, BusError> {
        let url = format!("{}/api/register", self.node_server);
        debug!(target: LOG_TARGET, "Registering node at {}", url);

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BusError::RegistrationRejected(format!("{}: {}", status, body)));
        }

        let registered: RegisterResponse = response.json().await?;
        info!(target: LOG_TARGET, "Node registered, bus server is {}", registered.server_url);
        Ok(registered)
    }

    /// Removes the node registration. Failures are logged and otherwise ignored.
    #[instrument(skip(self))]
    pub async fn unregister(&self, node_id: &str) {
        let url = format!("{}/api/unregister", self.node_server);
        let body = serde_json::json!({ "NodeId": node_id });
        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                info!(target: LOG_TARGET, "Node {} unregistered", node_id);
            }
            Ok(response) => {
                warn!(target: LOG_TARGET, "Node server refused unregister: {}", response.status());
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to unregister node: {}", e);
            }
        }
    }
}

fn with_http_scheme(address: &str) -> String {
    let trimmed = address.trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
