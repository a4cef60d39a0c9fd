//! Media core WebSocket client.
//!
//! Connects to the core, runs the pairing handshake carrying the
//! extension identity, subscribes to zone events and forwards them in
//! delivery order over an mpsc channel. The session loop reconnects
//! with a fixed delay and synthesizes an `Unpaired` event whenever the
//! connection is lost so the tracker can reset.

use anyhow::{anyhow, bail, Result};
use futures::{SinkExt, Stream, StreamExt};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::zones::CoreEvent;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// SOOD multicast group the core answers discovery probes on.
const DISCOVERY_GROUP: &str = "239.255.90.90:9003";
const DISCOVERY_QUERY: &[u8] = b"QUERY:roon-core";
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CoreClientError {
    #[error("connection closed before pairing completed")]
    ClosedDuringPairing,
    #[error("unexpected message during pairing: {0}")]
    UnexpectedPairingReply(String),
    #[error("no core answered the discovery probe")]
    DiscoveryTimeout,
    #[error("malformed discovery reply: {0}")]
    MalformedDiscoveryReply(String),
}

/// Extension identity presented to the core during pairing.
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionInfo {
    pub extension_id: &'static str,
    pub display_name: &'static str,
    pub display_version: &'static str,
    pub publisher: &'static str,
    pub email: &'static str,
    pub website: &'static str,
}

impl Default for ExtensionInfo {
    fn default() -> Self {
        Self {
            extension_id: "com.open-horizon-labs.roon-discord-presence",
            display_name: "Discord Rich Presence",
            display_version: env!("CARGO_PKG_VERSION"),
            publisher: "Open Horizon Labs",
            email: "support@openhorizonlabs.com",
            website: "https://github.com/open-horizon-labs/roon-discord-presence",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "request", rename_all = "snake_case")]
enum CoreRequest {
    Pair { extension: ExtensionInfo },
    SubscribeZones,
}

/// Run the client until shutdown, reconnecting on loss.
pub async fn run(config: CoreConfig, events: mpsc::Sender<CoreEvent>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = session(&config, &events) => {
                match result {
                    Ok(()) => info!("media core session ended"),
                    Err(e) => warn!(error = %e, "media core connection lost"),
                }
                if events.send(CoreEvent::Unpaired).await.is_err() {
                    break;
                }
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(RECONNECT_DELAY) => {}
        }
    }
    info!("media core client stopped");
}

/// One connect-pair-subscribe-stream session.
async fn session(config: &CoreConfig, events: &mpsc::Sender<CoreEvent>) -> Result<()> {
    let (host, port) = resolve_core(config).await?;
    let url = format!("ws://{host}:{port}");
    info!(%url, "connecting to media core");

    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws.split();

    let pair = CoreRequest::Pair {
        extension: ExtensionInfo::default(),
    };
    write.send(Message::text(serde_json::to_string(&pair)?)).await?;

    let core_name = wait_for_pairing(&mut read).await?;
    events
        .send(CoreEvent::Paired { core_name })
        .await
        .map_err(|_| anyhow!("event channel closed"))?;

    write
        .send(Message::text(serde_json::to_string(&CoreRequest::SubscribeZones)?))
        .await?;

    while let Some(message) = read.next().await {
        match message? {
            Message::Text(text) => match serde_json::from_str::<CoreEvent>(text.as_str()) {
                Ok(event) => {
                    if events.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => warn!(error = %e, "ignoring malformed zone payload"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

async fn wait_for_pairing<S>(read: &mut S) -> Result<String>
where
    S: Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = read.next().await {
        match message? {
            Message::Text(text) => {
                let event: CoreEvent = serde_json::from_str(text.as_str())?;
                return match event {
                    CoreEvent::Paired { core_name } => Ok(core_name),
                    other => {
                        Err(CoreClientError::UnexpectedPairingReply(format!("{other:?}")).into())
                    }
                };
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(CoreClientError::ClosedDuringPairing.into())
}

/// Resolve the core's address: discovery when enabled, otherwise the
/// configured host and port.
async fn resolve_core(config: &CoreConfig) -> Result<(String, u16)> {
    if config.use_discovery {
        return discover_core().await;
    }
    match &config.host {
        Some(host) => Ok((host.clone(), config.port)),
        None => bail!("no media core host configured and discovery is disabled"),
    }
}

/// Probe the multicast group; the reply carries the WebSocket port and
/// the core's address comes from the datagram source.
async fn discover_core() -> Result<(String, u16)> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.send_to(DISCOVERY_QUERY, DISCOVERY_GROUP).await?;

    let mut buf = [0u8; 256];
    let (len, addr) = timeout(DISCOVERY_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .map_err(|_| CoreClientError::DiscoveryTimeout)??;

    let reply = std::str::from_utf8(&buf[..len])
        .map_err(|_| CoreClientError::MalformedDiscoveryReply("not utf-8".to_string()))?;
    let port: u16 = reply
        .trim()
        .parse()
        .map_err(|_| CoreClientError::MalformedDiscoveryReply(reply.to_string()))?;

    info!(host = %addr.ip(), port, "discovered media core");
    Ok((addr.ip().to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_request_carries_extension_identity() {
        let request = CoreRequest::Pair {
            extension: ExtensionInfo::default(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"request\":\"pair\""));
        assert!(json.contains("com.open-horizon-labs.roon-discord-presence"));
        assert!(json.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_subscribe_request_shape() {
        let json = serde_json::to_string(&CoreRequest::SubscribeZones).unwrap();
        assert_eq!(json, r#"{"request":"subscribe_zones"}"#);
    }

    #[tokio::test]
    async fn test_resolve_core_requires_host_or_discovery() {
        let config = CoreConfig {
            host: None,
            port: 9100,
            use_discovery: false,
        };
        assert!(resolve_core(&config).await.is_err());

        let config = CoreConfig {
            host: Some("192.168.0.200".to_string()),
            port: 9100,
            use_discovery: false,
        };
        let (host, port) = resolve_core(&config).await.unwrap();
        assert_eq!(host, "192.168.0.200");
        assert_eq!(port, 9100);
    }
}
