//! Reconnecting socket task

use super::types::{SocketConfig, SocketError, SocketEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Channels of a running socket task
///
/// Dropping either end stops the task and closes the connection.
pub struct SocketHandle {
    pub events: mpsc::Receiver<SocketEvent>,
    pub outgoing: mpsc::Sender<String>,
}

/// How a single connection ended without error
enum SessionEnd {
    /// Peer sent a close frame
    Closed,
    /// Our side dropped one of the channels
    Abandoned,
}

/// Spawn a task that owns the connection to `config.url`
///
/// The task reconnects after `config.reconnect_delay` whenever the
/// connection fails and emits `Connected` after every handshake so the caller
/// can resubscribe. A close from the peer ends the task after a final
/// `Disconnected`.
pub fn open(config: SocketConfig) -> SocketHandle {
    let (event_tx, events) = mpsc::channel(config.event_capacity);
    let (outgoing, outgoing_rx) = mpsc::channel(config.outgoing_capacity);

    tokio::spawn(drive(config, event_tx, outgoing_rx));

    SocketHandle { events, outgoing }
}

async fn drive(
    config: SocketConfig,
    events: mpsc::Sender<SocketEvent>,
    mut outgoing: mpsc::Receiver<String>,
) {
    let mut failures = 0u32;

    loop {
        let err = match session(&config, &events, &mut outgoing, &mut failures).await {
            Ok(SessionEnd::Closed) => {
                tracing::info!(url = %config.url, "Socket closed by peer");
                let _ = events.send(SocketEvent::Disconnected).await;
                return;
            }
            Ok(SessionEnd::Abandoned) => return,
            Err(e) => e,
        };

        failures += 1;
        tracing::warn!(
            error = %err,
            attempt = failures,
            delay_ms = config.reconnect_delay.as_millis() as u64,
            "Socket failed, reconnecting"
        );
        if events
            .send(SocketEvent::Reconnecting { attempt: failures })
            .await
            .is_err()
        {
            return;
        }

        tokio::select! {
            _ = sleep(config.reconnect_delay) => {}
            _ = events.closed() => return,
        }
    }
}

/// Run one connection until it closes or fails
async fn session(
    config: &SocketConfig,
    events: &mpsc::Sender<SocketEvent>,
    outgoing: &mut mpsc::Receiver<String>,
    failures: &mut u32,
) -> Result<SessionEnd, SocketError> {
    let (stream, _) = connect_async(config.url.as_str())
        .await
        .map_err(|e| SocketError::Connect {
            url: config.url.clone(),
            message: e.to_string(),
        })?;
    *failures = 0;
    tracing::info!(url = %config.url, "Socket connected");

    if events.send(SocketEvent::Connected).await.is_err() {
        return Ok(SessionEnd::Abandoned);
    }

    let (mut sink, mut source) = stream.split();
    let lost = |e: tokio_tungstenite::tungstenite::Error| SocketError::Lost(e.to_string());

    let mut keepalive = interval_at(Instant::now() + config.keepalive, config.keepalive);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ping_sent: Option<Instant> = None;

    loop {
        tokio::select! {
            incoming = source.next() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(lost(e)),
                    None => return Err(SocketError::Lost("stream ended".into())),
                };
                let event = match message {
                    Message::Text(text) => SocketEvent::Text(text),
                    Message::Binary(data) => SocketEvent::Binary(data),
                    Message::Ping(payload) => {
                        sink.send(Message::Pong(payload)).await.map_err(lost)?;
                        continue;
                    }
                    Message::Pong(_) => {
                        ping_sent = None;
                        continue;
                    }
                    Message::Close(frame) => {
                        tracing::debug!(?frame, "Close frame received");
                        return Ok(SessionEnd::Closed);
                    }
                    Message::Frame(_) => continue,
                };
                if events.send(event).await.is_err() {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Abandoned);
                }
            }

            frame = outgoing.recv() => match frame {
                Some(text) => sink.send(Message::Text(text)).await.map_err(lost)?,
                None => {
                    tracing::debug!(url = %config.url, "Outgoing channel dropped, closing");
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Abandoned);
                }
            },

            _ = keepalive.tick() => {
                if let Some(sent) = ping_sent {
                    if sent.elapsed() >= config.pong_timeout {
                        return Err(SocketError::PongTimeout(config.pong_timeout));
                    }
                }
                sink.send(Message::Ping(Vec::new())).await.map_err(lost)?;
                ping_sent.get_or_insert_with(Instant::now);
            }
        }
    }
}
