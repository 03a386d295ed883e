//! Pub/sub bus client: node registration, subscription and supply delivery.

pub mod error;
pub mod models;
pub mod registration;
pub mod websocket;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use error::BusError;
pub use models::{AudioRecord, Envelope, STORAGE_SERVICE};
pub use registration::NodeRegistrar;
pub use websocket::{BusClient, BusConfig};

/// Receives every message delivered on the subscribed channel.
///
/// Called on the bus client's task, possibly back to back. There is no
/// return path: failures stay inside the handler.
pub trait SupplyHandler: Send + Sync {
    fn on_message(&self, envelope: &Envelope);
}

/// A bus connection that feeds a [`SupplyHandler`] until shutdown.
#[async_trait]
pub trait BusSubscriber: Send {
    /// Runs the subscription. Only the initial connection failure is returned;
    /// later disconnects are retried internally.
    async fn run(
        &mut self,
        handler: Arc<dyn SupplyHandler>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), BusError>;
}
