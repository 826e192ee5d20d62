//! Per-connection pumps.
//!
//! Every upgraded WebSocket is split into two halves, each driven by its own
//! task:
//!
//! - the **inbound pump** is the only reader: it enforces the read deadline
//!   and size limit, decodes frames and hands them to the hub;
//! - the **outbound pump** is the only writer: it drains the outbound queue,
//!   coalescing whatever is already queued into one write, and sends
//!   keepalive pings.
//!
//! # Teardown
//!
//! ```text
//! inbound exits ──> hub.unregister ──> queue closed ──> outbound sends Close, exits
//! outbound exits ──> cancel token  ──> inbound exits ──> hub.unregister
//! ```
//!
//! Only the hub closes the queue, and only once; the pumps just observe it.

use std::time::Duration;

use bytes::Bytes;
use courier_core::{ConnectionConfig, ConnectionId, Liveness};
use courier_proto::{InboundMessage, ProtocolError, join_frames};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{
        self, Message, error::ProtocolError as WsProtocolError, protocol::frame::coding::CloseCode,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{error::ServerError, hub::HubHandle};

/// Why a pump stopped.
#[derive(Debug, Error)]
pub enum PumpExit {
    /// Peer sent a close frame (with its code, if any) or the stream ended
    #[error("peer closed the connection (code {0:?})")]
    PeerClosed(Option<CloseCode>),

    /// Nothing heard from the peer within the liveness window
    #[error("no frame from peer for {0:?}")]
    ReadTimeout(Duration),

    /// Inbound frame over the size limit
    #[error(transparent)]
    Oversized(ProtocolError),

    /// A write did not complete in time
    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),

    /// The hub closed the outbound queue
    #[error("outbound queue closed by hub")]
    QueueClosed,

    /// The other pump tore the connection down
    #[error("connection torn down by its writer")]
    Cancelled,

    /// The hub actor is gone
    #[error("hub is no longer running")]
    HubClosed,

    /// Read or write failed
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

impl PumpExit {
    /// Whether this is an ordinary way for a connection to end.
    ///
    /// Normal, going-away and abnormal closes, closes without a code, resets
    /// without a closing handshake and hub-initiated closes are expected.
    /// Everything else, including a peer closing with a protocol or server
    /// error code, deserves a warning.
    pub fn is_expected(&self) -> bool {
        match self {
            Self::PeerClosed(code) => matches!(
                code,
                None | Some(
                    CloseCode::Normal | CloseCode::Away | CloseCode::Abnormal | CloseCode::Status
                )
            ),
            Self::QueueClosed | Self::Cancelled | Self::HubClosed => true,
            Self::Transport(err) => match err {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
                tungstenite::Error::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => {
                    true
                },
                tungstenite::Error::Io(io) => matches!(
                    io.kind(),
                    std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::UnexpectedEof
                ),
                _ => false,
            },
            Self::ReadTimeout(_) | Self::Oversized(_) | Self::WriteTimeout(_) => false,
        }
    }
}

type Reader<S> = SplitStream<WebSocketStream<S>>;
type Writer<S> = SplitSink<WebSocketStream<S>, Message>;

/// Register an upgraded WebSocket with the hub and start its pumps.
///
/// Registration completes before either pump runs, so the hub always knows
/// the connection before its first message arrives.
pub async fn spawn<S>(
    conn: ConnectionId,
    ws: WebSocketStream<S>,
    hub: HubHandle,
    config: ConnectionConfig,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (queue, outbound) = mpsc::channel(config.queue_capacity.max(1));
    hub.register(conn, queue).await?;

    let (writer, reader) = ws.split();
    let teardown = CancellationToken::new();

    tokio::spawn(outbound_pump(conn, writer, outbound, config, teardown.clone()));
    tokio::spawn(inbound_pump(conn, reader, hub, config, teardown));
    Ok(())
}

async fn inbound_pump<S>(
    conn: ConnectionId,
    mut reader: Reader<S>,
    hub: HubHandle,
    config: ConnectionConfig,
    teardown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut liveness = Liveness::new(Instant::now().into_std(), config.pong_wait);

    let exit = loop {
        let deadline = Instant::from_std(liveness.deadline());
        let next = tokio::select! {
            () = teardown.cancelled() => break PumpExit::Cancelled,
            next = tokio::time::timeout_at(deadline, reader.next()) => next,
        };

        let message = match next {
            Err(_) => {
                let elapsed = liveness
                    .check_timeout(Instant::now().into_std())
                    .unwrap_or(config.pong_wait);
                break PumpExit::ReadTimeout(elapsed);
            },
            Ok(None) => break PumpExit::PeerClosed(None),
            Ok(Some(Err(err))) => break PumpExit::Transport(err),
            Ok(Some(Ok(message))) => message,
        };

        // Pings and pongs count as signs of life too
        liveness.record_activity(Instant::now().into_std());

        let payload: &[u8] = match &message {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => &data[..],
            Message::Close(frame) => {
                break PumpExit::PeerClosed(frame.as_ref().map(|frame| frame.code));
            },
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        if let Err(err) = ProtocolError::check_size(payload.len(), config.max_message_size) {
            break PumpExit::Oversized(err);
        }

        match InboundMessage::decode(payload) {
            Ok(decoded) => {
                if hub.inbound(conn, decoded).await.is_err() {
                    break PumpExit::HubClosed;
                }
            },
            Err(err) => warn!(conn, error = %err, "discarding undecodable frame"),
        }
    };

    log_exit(conn, "inbound", &exit);
    liveness.close();
    // Unregistering twice is harmless; the hub may also be gone already
    let _ = hub.unregister(conn).await;
}

async fn outbound_pump<S>(
    conn: ConnectionId,
    mut writer: Writer<S>,
    mut queue: mpsc::Receiver<Bytes>,
    config: ConnectionConfig,
    teardown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Whatever ends this pump ends the reader too
    let _teardown = teardown.drop_guard();

    let mut keepalive =
        tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            frame = queue.recv() => {
                let Some(first) = frame else {
                    if let Err(err) = write(&mut writer, Message::Close(None), config.write_wait).await {
                        debug!(conn, error = %err, "close frame not sent");
                    }
                    break PumpExit::QueueClosed;
                };

                let batch = drain_queued(first, &mut queue);
                if let Err(exit) = write(&mut writer, text_message(batch), config.write_wait).await {
                    break exit;
                }
            },
            _ = keepalive.tick() => {
                if let Err(exit) = write(&mut writer, Message::Ping(Bytes::new()), config.write_wait).await {
                    break exit;
                }
            },
        }
    };

    log_exit(conn, "outbound", &exit);
}

/// Take `first` plus every frame already waiting, as one newline-joined batch.
fn drain_queued(first: Bytes, queue: &mut mpsc::Receiver<Bytes>) -> Bytes {
    let waiting = queue.len();
    if waiting == 0 {
        return first;
    }

    let mut frames = Vec::with_capacity(waiting + 1);
    frames.push(first);
    for _ in 0..waiting {
        match queue.try_recv() {
            Ok(frame) => frames.push(frame),
            Err(_) => break,
        }
    }
    join_frames(&frames)
}

fn text_message(batch: Bytes) -> Message {
    match String::from_utf8(batch.to_vec()) {
        Ok(text) => Message::text(text),
        Err(err) => Message::binary(err.into_bytes()),
    }
}

async fn write<S>(writer: &mut Writer<S>, message: Message, wait: Duration) -> Result<(), PumpExit>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(wait, writer.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(PumpExit::Transport(err)),
        Err(_) => Err(PumpExit::WriteTimeout(wait)),
    }
}

fn log_exit(conn: ConnectionId, pump: &'static str, exit: &PumpExit) {
    if exit.is_expected() {
        debug!(conn, pump, reason = %exit, "pump stopped");
    } else {
        warn!(conn, pump, reason = %exit, "pump stopped");
    }
}
