//! Integration tests for the bus client against local servers

use crate::test_utils::{supply_text, CollectingHandler};
use futures::{SinkExt, StreamExt};
use pulse_rx::bus::models::RegisterRequest;
use pulse_rx::bus::{BusClient, BusConfig, BusSubscriber, NodeRegistrar, SupplyHandler, STORAGE_SERVICE};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::tungstenite::Message;

async fn wait_for(handler: &CollectingHandler, count: usize) {
    for _ in 0..200 {
        if handler.count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
mod bus_integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_and_receive_supplies() -> Result<(), Box<dyn Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let (subscribe_tx, subscribe_rx) = oneshot::channel::<String>();
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = subscribe_tx.send(text);
            }
            ws.send(Message::Text(supply_text(&[0.1, 0.2]))).await.unwrap();
            ws.send(Message::Text(r#"{"MessageType":"Supply","Data":{"SupplyName":"empty"}}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Text("garbage".to_string())).await.unwrap();

            let _ = done_rx.await;
            let _ = ws.close(None).await;
        });

        let mut config = BusConfig::new(&address.to_string(), "node-1", STORAGE_SERVICE);
        config.initial_backoff = Duration::from_millis(20);
        let mut client = BusClient::new(config);
        let handler = Arc::new(CollectingHandler::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let run = {
            let handler: Arc<dyn SupplyHandler> = handler.clone();
            tokio::spawn(async move { client.run(handler, shutdown_rx).await })
        };

        let subscribe: serde_json::Value = serde_json::from_str(&subscribe_rx.await?)?;
        assert_eq!(subscribe["MessageType"], "Subscribe");
        assert_eq!(subscribe["Data"]["NodeId"], "node-1");
        assert_eq!(subscribe["Data"]["ChannelType"], STORAGE_SERVICE);

        wait_for(&handler, 2).await;
        {
            let envelopes = handler.envelopes.lock().unwrap();
            assert_eq!(envelopes.len(), 2);
            assert!(envelopes[0].payload.is_some());
            assert_eq!(envelopes[1].supply_name, "empty");
            assert!(envelopes[1].payload.is_none());
        }

        shutdown_tx.send(())?;
        let result = tokio::time::timeout(Duration::from_secs(5), run).await??;
        assert!(result.is_ok());

        let _ = done_tx.send(());
        server.await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_reported() -> Result<(), Box<dyn Error>> {
        // Bind and drop to get a port nothing listens on.
        let address = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;

        let mut client = BusClient::new(BusConfig::new(&address.to_string(), "node-1", STORAGE_SERVICE));
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handler: Arc<dyn SupplyHandler> = Arc::new(CollectingHandler::default());

        assert!(client.run(handler, shutdown_rx).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_register_returns_bus_server() -> Result<(), Box<dyn Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
            }
            let body = r#"{"ServerUrl":"127.0.0.1:10000"}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
            String::from_utf8_lossy(&request).to_string()
        });

        let registrar = NodeRegistrar::new(&address.to_string())?;
        let response = registrar
            .register(&RegisterRequest {
                node_name: "PulseAudioRx@test".to_string(),
                node_id: "node-1".to_string(),
                channel_types: vec![STORAGE_SERVICE],
            })
            .await?;
        assert_eq!(response.server_url, "127.0.0.1:10000");

        let request = server.await?;
        assert!(request.starts_with("POST /api/register"));
        Ok(())
    }
}
