//! Per-client `WebSocket` session.
//!
//! Each connection runs two loops against the same socket: the write loop
//! drains the client's outbound queue and sends keepalive pings, the read
//! loop handles inbound commands under a read deadline. Whichever loop ends
//! first ends the connection, and the client is unregistered from the hub.

use std::time::Duration;

use cyper_core::ConnectionId;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::envelope::{ClientCommand, InboundMessage, event_type};
use crate::error::{EventsError, EventsResult};
use crate::hub::{Client, EventHub, Frame};

/// Timing and size limits for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Interval between keepalive pings. Must be shorter than the read deadline.
    pub ping_interval: Duration,
    /// Maximum silence from the client before the connection is dropped.
    pub read_deadline: Duration,
    /// Maximum time to hand one frame to the transport.
    pub write_timeout: Duration,
    /// Inbound text frames longer than this are ignored.
    pub max_message_bytes: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(54),
            read_deadline: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            max_message_bytes: 4096,
        }
    }
}

/// Which side ended the session.
enum Ended {
    Outbound(EventsResult<()>),
    Inbound(EventsResult<()>),
}

/// Drive a registered client until it disconnects, falls behind, or
/// `cancel` fires.
///
/// The client is always unregistered before this returns.
///
/// # Errors
///
/// Returns the transport error, [`EventsError::ReadDeadline`] or
/// [`EventsError::WriteTimeout`] that ended the session. A clean close by
/// either side is `Ok(())`.
pub async fn serve_connection<S>(
    hub: &EventHub,
    ws: WebSocketStream<S>,
    client: Client,
    options: ConnectionOptions,
    cancel: &CancellationToken,
) -> EventsResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Client {
        id,
        user_id,
        outbound,
    } = client;
    let (mut sink, mut stream) = ws.split();

    let ended = tokio::select! {
        result = write_loop(&mut sink, outbound, &options, cancel) => Ended::Outbound(result),
        result = read_loop(hub, id, &mut stream, &options) => Ended::Inbound(result),
    };

    hub.unregister_client(id).await;

    let result = match ended {
        Ended::Outbound(result) => result,
        Ended::Inbound(result) => {
            // The peer may already be gone; a failed close is not interesting.
            if let Ok(Err(e)) = tokio::time::timeout(options.write_timeout, sink.close()).await {
                debug!(connection_id = %id, error = %e, "Close after read loop failed");
            }
            result
        },
    };

    match &result {
        Ok(()) => info!(connection_id = %id, user_id = %user_id, "Connection closed"),
        Err(e) => warn!(connection_id = %id, user_id = %user_id, error = %e, "Connection dropped"),
    }
    result
}

async fn send_frame<W>(sink: &mut W, message: Message, timeout: Duration) -> EventsResult<()>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    tokio::time::timeout(timeout, sink.send(message))
        .await
        .map_err(|_| EventsError::WriteTimeout)??;
    Ok(())
}

async fn send_close<W>(sink: &mut W, code: CloseCode, reason: &str, timeout: Duration)
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = send_frame(sink, Message::Close(Some(frame)), timeout).await {
        debug!(error = %e, "Failed to send close frame");
    }
}

async fn write_loop<W>(
    sink: &mut W,
    mut outbound: mpsc::Receiver<Frame>,
    options: &ConnectionOptions,
    cancel: &CancellationToken,
) -> EventsResult<()>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let first_ping = Instant::now()
        .checked_add(options.ping_interval)
        .unwrap_or_else(Instant::now);
    let mut ping = tokio::time::interval_at(first_ping, options.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                send_close(sink, CloseCode::Away, "server shutting down", options.write_timeout).await;
                return Ok(());
            },
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    send_frame(sink, Message::Text(frame.to_string().into()), options.write_timeout).await?;
                },
                None => {
                    // Unregistered by the hub: backpressure drop or hub shutdown.
                    send_close(sink, CloseCode::Policy, "outbound queue closed", options.write_timeout).await;
                    return Ok(());
                },
            },
            _ = ping.tick() => {
                send_frame(sink, Message::Ping(Vec::new().into()), options.write_timeout).await?;
            },
        }
    }
}

async fn read_loop<R>(
    hub: &EventHub,
    id: ConnectionId,
    stream: &mut R,
    options: &ConnectionOptions,
) -> EventsResult<()>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let next = tokio::time::timeout(options.read_deadline, stream.next())
            .await
            .map_err(|_| EventsError::ReadDeadline)?;

        match next {
            Some(Ok(Message::Text(text))) => {
                handle_text(hub, id, text.as_str(), options.max_message_bytes).await;
            },
            Some(Ok(Message::Close(_))) | None => return Ok(()),
            Some(Ok(Message::Binary(_))) => {
                debug!(connection_id = %id, "Ignoring binary frame");
            },
            // Pongs only refresh the deadline; pings are answered by tungstenite.
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {},
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn handle_text(hub: &EventHub, id: ConnectionId, text: &str, max_bytes: usize) {
    if text.len() > max_bytes {
        warn!(connection_id = %id, bytes = text.len(), "Inbound message too large; ignored");
        return;
    }
    let message: InboundMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(connection_id = %id, error = %e, "Malformed inbound message");
            return;
        },
    };

    match ClientCommand::from(message) {
        ClientCommand::Ping => {
            if let Err(e) = hub.send_to_client(id, event_type::PONG, json!({})).await {
                debug!(connection_id = %id, error = %e, "Pong not delivered");
            }
        },
        // Delivery is per user; topic requests are acknowledged but not tracked.
        ClientCommand::Subscribe(topics) => {
            debug!(connection_id = %id, topics = %topics, "Subscribe request ignored");
        },
        ClientCommand::Unsubscribe(topics) => {
            debug!(connection_id = %id, topics = %topics, "Unsubscribe request ignored");
        },
        ClientCommand::Unknown(kind) => {
            warn!(connection_id = %id, message_type = %kind, "Unknown inbound message type");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubOptions;
    use cyper_core::{SystemClock, UserId};
    use std::sync::Arc;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn socket_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (server, client)
    }

    fn start_hub() -> (Arc<EventHub>, CancellationToken) {
        let hub = Arc::new(EventHub::new(HubOptions::default(), Arc::new(SystemClock)));
        let cancel = CancellationToken::new();
        let runner = Arc::clone(&hub);
        let token = cancel.clone();
        tokio::spawn(async move { runner.run(token).await });
        (hub, cancel)
    }

    fn spawn_serve(
        hub: &Arc<EventHub>,
        server: WebSocketStream<DuplexStream>,
        client: Client,
        options: ConnectionOptions,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<EventsResult<()>> {
        let hub = Arc::clone(hub);
        tokio::spawn(async move { serve_connection(&hub, server, client, options, &cancel).await })
    }

    async fn next_text(ws: &mut WebSocketStream<DuplexStream>) -> serde_json::Value {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Ping(_) | Message::Pong(_) => {},
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        let (hub, cancel) = start_hub();
        let (server, mut peer) = socket_pair().await;
        let client = hub.register_client(UserId::from("u1")).await;
        let task = spawn_serve(&hub, server, client, ConnectionOptions::default(), cancel.clone());

        peer.send(Message::Text(r#"{"type":"ping"}"#.to_string().into()))
            .await
            .unwrap();
        let reply = next_text(&mut peer).await;
        assert_eq!(reply["type"], "pong");

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_user_broadcast_reaches_socket() {
        let (hub, cancel) = start_hub();
        let (server, mut peer) = socket_pair().await;
        let client = hub.register_client(UserId::from("u1")).await;
        let task = spawn_serve(&hub, server, client, ConnectionOptions::default(), cancel.clone());

        // Unknown and subscribe messages change nothing.
        peer.send(Message::Text(r#"{"type":"subscribe","data":{"topic":"scans"}}"#.to_string().into()))
            .await
            .unwrap();
        peer.send(Message::Text(r#"{"type":"dance"}"#.to_string().into()))
            .await
            .unwrap();

        hub.broadcast_to_user(&UserId::from("u1"), event_type::ALERT, json!({"msg": "x"}))
            .await
            .unwrap();
        let envelope = next_text(&mut peer).await;
        assert_eq!(envelope["type"], "alert");
        assert_eq!(envelope["user_id"], "u1");
        assert_eq!(envelope["data"]["msg"], "x");

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_sends_going_away() {
        let (hub, cancel) = start_hub();
        let (server, mut peer) = socket_pair().await;
        let client = hub.register_client(UserId::from("u1")).await;
        let task = spawn_serve(&hub, server, client, ConnectionOptions::default(), cancel.clone());

        cancel.cancel();
        task.await.unwrap().unwrap();

        match peer.next().await.unwrap().unwrap() {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
            other => panic!("expected close frame, got {other:?}"),
        }
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_hub_unregister_closes_socket() {
        let (hub, cancel) = start_hub();
        let (server, mut peer) = socket_pair().await;
        let client = hub.register_client(UserId::from("u1")).await;
        let id = client.id;
        let task = spawn_serve(&hub, server, client, ConnectionOptions::default(), cancel);

        hub.unregister_client(id).await;
        task.await.unwrap().unwrap();

        match peer.next().await.unwrap().unwrap() {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_hits_read_deadline() {
        let (hub, _cancel) = start_hub();
        let (server, _peer) = socket_pair().await;
        let client = hub.register_client(UserId::from("u1")).await;

        // The peer never reads, so pings go unanswered.
        let result = serve_connection(
            &hub,
            server,
            client,
            ConnectionOptions::default(),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(EventsError::ReadDeadline)));
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_peer_close_ends_session() {
        let (hub, cancel) = start_hub();
        let (server, mut peer) = socket_pair().await;
        let client = hub.register_client(UserId::from("u1")).await;
        let task = spawn_serve(&hub, server, client, ConnectionOptions::default(), cancel);

        peer.close(None).await.unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(hub.client_count().await, 0);
    }
}
