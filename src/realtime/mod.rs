//! Subscription to `INSERT` events on `public.votes` over the hosted
//! service's Phoenix-channel websocket.

use crate::error::{Result, VoteError};
use crate::models::{VoteInserted, VoteRecord};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub url: Url,
    pub api_key: String,
    pub schema: String,
    pub table: String,
    pub event: String,
    pub handshake_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub capacity: usize,
}

impl RealtimeConfig {
    pub fn new(url: Url, api_key: impl Into<String>) -> Self {
        Self {
            url,
            api_key: api_key.into(),
            schema: "public".to_string(),
            table: "votes".to_string(),
            event: "INSERT".to_string(),
            handshake_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(5),
            capacity: 64,
        }
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }
}

pub struct RealtimeClient {
    config: RealtimeConfig,
    tx: broadcast::Sender<VoteInserted>,
    stop: CancellationToken,
}

impl RealtimeClient {
    pub fn new(
        config: RealtimeConfig,
        stop: CancellationToken,
    ) -> (Self, broadcast::Receiver<VoteInserted>) {
        let (tx, rx) = broadcast::channel(config.capacity);
        (Self { config, tx, stop }, rx)
    }

    /// Connects, and reconnects after a delay, until the stop token fires.
    pub async fn run(self) {
        info!("Subscribing to {} changes on {}", self.config.event, self.config.topic());
        while !self.stop.is_cancelled() {
            match self.connect().await {
                Ok(stream) => {
                    if let Err(e) = self.pump(stream).await {
                        warn!("Realtime stream ended with error: {}", e);
                    }
                }
                Err(e) => warn!("Failed to connect to realtime service: {}", e),
            }

            if self.stop.is_cancelled() {
                break;
            }
            debug!("Reconnecting in {:?}", self.config.reconnect_delay);
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = sleep(self.config.reconnect_delay) => {}
            }
        }
        info!("Realtime subscription released");
    }

    async fn connect(&self) -> Result<WsStream> {
        let (stream, _) = timeout(self.config.handshake_timeout, connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| VoteError::Realtime("handshake timed out".to_string()))??;
        Ok(stream)
    }

    async fn pump(&self, stream: WsStream) -> Result<()> {
        let (mut sink, mut source) = stream.split();
        let topic = self.config.topic();

        sink.send(Message::Text(join_message(&self.config)?)).await?;

        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let heartbeat_msg = heartbeat_message()?;
        let mut joined = false;
        let mut outcome = Ok(());

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = heartbeat.tick() => {
                    if let Err(e) = sink.send(Message::Text(heartbeat_msg.clone())).await {
                        warn!("Heartbeat failed: {}", e);
                        break;
                    }
                }
                msg = source.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match decode(&self.config, &topic, &mut joined, &text) {
                                Ok(Some(event)) => {
                                    // No receivers just means the view is gone.
                                    let _ = self.tx.send(event);
                                }
                                Ok(None) => {}
                                // Without a joined channel nothing will ever arrive.
                                Err(e @ VoteError::Realtime(_)) => {
                                    outcome = Err(e);
                                    break;
                                }
                                Err(e) => warn!("Failed to handle realtime message: {}", e),
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            sink.send(Message::Pong(payload)).await.ok();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!("Socket closed by server: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => break,
                    }
                }
            }
        }

        leave(&mut sink, topic).await.ok();
        sink.close().await.ok();
        outcome
    }
}

async fn leave(sink: &mut SplitSink<WsStream, Message>, topic: String) -> Result<()> {
    sink.send(Message::Text(encode(&PhoenixEnvelope {
        topic,
        event: "phx_leave",
        reference: "2",
        payload: EmptyPayload {},
    })?))
    .await?;
    Ok(())
}

/// Turns one socket frame into a notification, tracking the join acknowledgement.
fn decode(
    config: &RealtimeConfig,
    topic: &str,
    joined: &mut bool,
    text: &str,
) -> Result<Option<VoteInserted>> {
    let message: IncomingMessage = serde_json::from_str(text)?;

    match message.event.as_str() {
        "phx_reply" if message.topic == topic => {
            let reply: ReplyPayload = serde_json::from_value(message.payload.unwrap_or(Value::Null))?;
            if reply.status != "ok" {
                return Err(VoteError::Realtime(format!(
                    "subscription to {} rejected: {}",
                    topic, reply.status
                )));
            }
            if !*joined {
                *joined = true;
                info!("Subscription to {} acknowledged", topic);
            }
            Ok(None)
        }
        "postgres_changes" => {
            if !*joined {
                debug!("Ignoring change before join acknowledgement");
                return Ok(None);
            }
            let Some(payload) = message.payload else {
                return Ok(None);
            };
            let payload: ChangePayload = serde_json::from_value(payload)?;
            let Some(change) = payload.data else {
                return Ok(None);
            };
            if !change.event_type.eq_ignore_ascii_case(&config.event) {
                debug!("Skipping {} change", change.event_type);
                return Ok(None);
            }
            let record = change
                .record
                .and_then(|row| serde_json::from_value::<VoteRecord>(row).ok());
            Ok(Some(VoteInserted { record }))
        }
        other => {
            debug!("Ignoring realtime event {}", other);
            Ok(None)
        }
    }
}

fn join_message(config: &RealtimeConfig) -> Result<String> {
    encode(&PhoenixEnvelope {
        topic: config.topic(),
        event: "phx_join",
        reference: "1",
        payload: JoinPayload {
            access_token: &config.api_key,
            config: JoinConfig {
                postgres_changes: [PostgresChange {
                    event: &config.event,
                    schema: &config.schema,
                    table: &config.table,
                }],
            },
        },
    })
}

fn heartbeat_message() -> Result<String> {
    encode(&PhoenixEnvelope {
        topic: "phoenix".to_string(),
        event: "heartbeat",
        reference: "hb",
        payload: EmptyPayload {},
    })
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[derive(Serialize)]
struct PhoenixEnvelope<T> {
    topic: String,
    event: &'static str,
    #[serde(rename = "ref")]
    reference: &'static str,
    payload: T,
}

#[derive(Serialize)]
struct EmptyPayload {}

#[derive(Serialize)]
struct JoinPayload<'a> {
    access_token: &'a str,
    config: JoinConfig<'a>,
}

#[derive(Serialize)]
struct JoinConfig<'a> {
    postgres_changes: [PostgresChange<'a>; 1],
}

#[derive(Serialize)]
struct PostgresChange<'a> {
    event: &'a str,
    schema: &'a str,
    table: &'a str,
}

#[derive(Deserialize)]
struct IncomingMessage {
    topic: String,
    event: String,
    payload: Option<Value>,
}

#[derive(Deserialize)]
struct ReplyPayload {
    status: String,
}

#[derive(Deserialize)]
struct ChangePayload {
    data: Option<Change>,
}

#[derive(Deserialize)]
struct Change {
    #[serde(rename = "eventType", alias = "type")]
    event_type: String,
    #[serde(default)]
    record: Option<Value>,
}
