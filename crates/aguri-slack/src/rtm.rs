//! RTM transport: `rtm.connect`, then a WebSocket read loop feeding an mpsc
//! channel. Reconnects with capped exponential backoff until cancelled or the
//! consumer goes away.

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use aguri_core::events::RtmEvent;

use crate::{
    client::{SlackClient, RATE_LIMIT_MESSAGE},
    events::{decode_event, GOODBYE},
};

const EVENT_BUFFER: usize = 256;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Open the stream for one workspace. Events arrive in transport order.
pub fn spawn(client: Arc<SlackClient>, label: &str, cancel: CancellationToken) -> mpsc::Receiver<RtmEvent> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(connection_loop(client, label.to_string(), tx, cancel));
    rx
}

/// Delay before reconnect attempt `attempt` (1-based).
pub(crate) fn backoff(attempt: u32, max: Duration) -> Duration {
    std::cmp::min(Duration::from_millis(100 * 2u64.pow(attempt.min(10))), max)
}

enum Disconnect {
    Reconnect,
    Shutdown,
}

async fn connection_loop(
    client: Arc<SlackClient>,
    label: String,
    tx: mpsc::Sender<RtmEvent>,
    cancel: CancellationToken,
) {
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        match client.rtm_connect().await {
            Ok(url) => {
                tracing::info!(workspace = %label, "connecting to RTM");
                match connect_async(url.as_str()).await {
                    Ok((ws, _)) => {
                        attempt = 0;
                        match handle_connection(ws, &label, &tx, &cancel).await {
                            Disconnect::Shutdown => return,
                            Disconnect::Reconnect => {
                                tracing::info!(workspace = %label, "RTM connection lost, reconnecting");
                            }
                        }
                    }
                    Err(e) => {
                        if !report(&tx, format!("websocket connect failed: {e}")).await {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                let text = if e.is_http_status(429) {
                    RATE_LIMIT_MESSAGE.to_string()
                } else {
                    e.to_string()
                };
                if !report(&tx, text).await {
                    return;
                }
            }
        }

        attempt += 1;
        let delay = backoff(attempt, MAX_BACKOFF);
        tracing::debug!(workspace = %label, ?delay, "reconnecting");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Forward a transport failure to the consumer. False once it is gone.
async fn report(tx: &mpsc::Sender<RtmEvent>, text: String) -> bool {
    tx.send(RtmEvent::ConnectionError(text)).await.is_ok()
}

async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    label: &str,
    tx: &mpsc::Sender<RtmEvent>,
    cancel: &CancellationToken,
) -> Disconnect {
    let (mut sink, mut stream) = ws.split();
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;
    let mut next_id = 1u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Disconnect::Shutdown;
            }
            _ = ping.tick() => {
                let frame = json!({ "id": next_id, "type": "ping" }).to_string();
                next_id += 1;
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    tracing::debug!(workspace = %label, "ping failed: {e}");
                    return Disconnect::Reconnect;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let ev = decode_event(&text);
                    let goodbye = matches!(&ev, RtmEvent::Ignored { kind } if kind == GOODBYE);
                    if tx.send(ev).await.is_err() {
                        return Disconnect::Shutdown;
                    }
                    if goodbye {
                        return Disconnect::Reconnect;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => return Disconnect::Reconnect,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if !report(tx, e.to_string()).await {
                        return Disconnect::Shutdown;
                    }
                    return Disconnect::Reconnect;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        assert_eq!(backoff(1, MAX_BACKOFF), Duration::from_millis(200));
        assert_eq!(backoff(3, MAX_BACKOFF), Duration::from_millis(800));
        assert_eq!(backoff(9, MAX_BACKOFF), Duration::from_millis(51_200));
        assert_eq!(backoff(10, MAX_BACKOFF), MAX_BACKOFF);
        assert_eq!(backoff(u32::MAX, MAX_BACKOFF), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn unreachable_api_reports_connection_errors_until_cancelled() {
        let client = Arc::new(
            SlackClient::new("xoxb-test")
                .unwrap()
                .with_base_url("http://127.0.0.1:9/api"),
        );
        let cancel = CancellationToken::new();
        let mut rx = spawn(client, "alpha", cancel.clone());

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, RtmEvent::ConnectionError(_)));

        cancel.cancel();
        while rx.recv().await.is_some() {}
    }
}
