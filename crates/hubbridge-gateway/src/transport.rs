/*!
 * Publish/subscribe transport.
 *
 * The bridge only needs to publish and to receive a stream of messages
 * followed by a disconnect notice. [`TransportConnector`] opens such a
 * session; the MQTT implementation connects to the broker running on the
 * coordinator and subscribes to every topic.
 */
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Something delivered by a live transport session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// An inbound publish
    Message {
        /// Topic name
        topic: String,
        /// Raw payload
        payload: Bytes,
    },
    /// The session ended; no further events follow
    Disconnected(String),
}

/// Outbound side of a transport session
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a payload with at-most-once delivery
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Whether the session is still up
    fn is_connected(&self) -> bool;

    /// Close the session
    async fn disconnect(&self) -> Result<()>;
}

/// A connected transport: a publisher plus the inbound event stream
pub struct TransportSession {
    /// Outbound handle
    pub publisher: Arc<dyn Publisher>,
    /// Inbound messages, ending with [`TransportEvent::Disconnected`]
    pub events: mpsc::Receiver<TransportEvent>,
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("connected", &self.publisher.is_connected())
            .finish()
    }
}

/// Opens transport sessions to a coordinator
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Connect to the broker at `host:port` and subscribe to all topics
    async fn connect(&self, host: &str, port: u16) -> Result<TransportSession>;
}

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttConnector, MqttPublisher};

#[cfg(feature = "mqtt")]
mod mqtt {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
    use tokio::sync::mpsc;
    use tracing::{debug, info, trace};
    use uuid::Uuid;

    use super::{Publisher, TransportConnector, TransportEvent, TransportSession};
    use crate::error::{GatewayError, Result};

    /// MQTT connector
    #[derive(Debug, Clone)]
    pub struct MqttConnector {
        client_id_prefix: String,
        keep_alive: Duration,
        connect_timeout: Duration,
    }

    impl MqttConnector {
        /// Create a new connector
        pub fn new<S: Into<String>>(
            client_id_prefix: S,
            keep_alive: Duration,
            connect_timeout: Duration,
        ) -> Self {
            Self {
                client_id_prefix: client_id_prefix.into(),
                keep_alive,
                connect_timeout,
            }
        }
    }

    /// Publisher backed by a rumqttc client
    #[derive(Debug)]
    pub struct MqttPublisher {
        client: AsyncClient,
        connected: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Publisher for MqttPublisher {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
            if !self.is_connected() {
                return Err(GatewayError::NotConnected);
            }
            self.client
                .publish(topic, QoS::AtMostOnce, false, payload)
                .await
                .map_err(|e| GatewayError::connection(e.to_string()))
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn disconnect(&self) -> Result<()> {
            self.connected.store(false, Ordering::SeqCst);
            self.client
                .disconnect()
                .await
                .map_err(|e| GatewayError::connection(e.to_string()))
        }
    }

    #[async_trait]
    impl TransportConnector for MqttConnector {
        async fn connect(&self, host: &str, port: u16) -> Result<TransportSession> {
            let client_id = format!("{}-{}", self.client_id_prefix, Uuid::new_v4().simple());
            let mut options = MqttOptions::new(client_id, host, port);
            options.set_keep_alive(self.keep_alive);
            options.set_clean_session(true);

            let (client, mut eventloop) = AsyncClient::new(options, 10);

            let connack = tokio::time::timeout(self.connect_timeout, async {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                        Ok(_) => continue,
                        Err(e) => return Err(GatewayError::connection(e.to_string())),
                    }
                }
            })
            .await
            .map_err(|_| GatewayError::timeout(format!("MQTT connect to {}:{}", host, port)))??;

            if !matches!(connack.code, ConnectReturnCode::Success) {
                return Err(GatewayError::connection(format!(
                    "broker refused connection: {:?}",
                    connack.code
                )));
            }

            client
                .subscribe("#", QoS::AtMostOnce)
                .await
                .map_err(|e| GatewayError::connection(e.to_string()))?;
            info!("Connected to MQTT broker at {}:{}", host, port);

            let connected = Arc::new(AtomicBool::new(true));
            let (tx, rx) = mpsc::channel(256);
            let flag = connected.clone();
            let endpoint = format!("{}:{}", host, port);

            tokio::spawn(async move {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            trace!("MQTT {} <= {} bytes", publish.topic, publish.payload.len());
                            let event = TransportEvent::Message {
                                topic: publish.topic,
                                payload: publish.payload,
                            };
                            if tx.send(event).await.is_err() {
                                debug!("Transport receiver for {} dropped", endpoint);
                                break;
                            }
                        }
                        Ok(Event::Incoming(Packet::Disconnect)) => {
                            flag.store(false, Ordering::SeqCst);
                            let _ = tx
                                .send(TransportEvent::Disconnected("broker disconnect".into()))
                                .await;
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            flag.store(false, Ordering::SeqCst);
                            let _ = tx.send(TransportEvent::Disconnected(e.to_string())).await;
                            break;
                        }
                    }
                }
                flag.store(false, Ordering::SeqCst);
            });

            Ok(TransportSession {
                publisher: Arc::new(MqttPublisher { client, connected }),
                events: rx,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "mqtt")]
    #[tokio::test]
    async fn test_mqtt_connect_refused() {
        use std::time::Duration;

        // bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = MqttConnector::new(
            "hubbridge-test",
            Duration::from_secs(5),
            Duration::from_secs(2),
        );
        let err = connector.connect("127.0.0.1", port).await.unwrap_err();
        assert!(err.is_transient());
    }
}
