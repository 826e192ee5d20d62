//! WebSocket client over simulated TCP.

use courier_proto::OutboundMessage;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{WebSocketStream, client_async, tungstenite::Message};

use crate::{SERVER_PORT, WS_PATH, SimResult};

/// Relay client for use inside `sim.client(..)`.
pub struct SimClient {
    ws: WebSocketStream<turmoil::net::TcpStream>,
}

impl SimClient {
    /// Connect to the relay on `host` and upgrade.
    pub async fn connect(host: &str) -> SimResult<Self> {
        let addr = format!("{host}:{SERVER_PORT}");
        let stream = turmoil::net::TcpStream::connect(addr.as_str()).await?;
        let (ws, _response) = client_async(format!("ws://{addr}{WS_PATH}"), stream).await?;
        Ok(Self { ws })
    }

    /// Claim `(realm, id)` with a first message.
    pub async fn bind(&mut self, realm: i64, id: i64) -> SimResult {
        self.send_text(&format!(r#"{{"user_type":{realm},"from":{id}}}"#)).await
    }

    /// Send `body` to `target` in `realm`.
    pub async fn send_to(&mut self, realm: i64, from: i64, target: i64, body: &str) -> SimResult {
        self.send_text(&format!(
            r#"{{"user_type":{realm},"id":{target},"from":{from},"msg":"{body}"}}"#
        ))
        .await
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, text: &str) -> SimResult {
        self.ws.send(Message::text(text.to_owned())).await?;
        Ok(())
    }

    /// Close the connection and wait for the server's side of the handshake.
    pub async fn close(mut self) -> SimResult {
        self.ws.close(None).await?;
        while let Some(Ok(_)) = self.ws.next().await {}
        Ok(())
    }

    /// Next frame of any kind; `None` once the stream has ended.
    ///
    /// Reading is also what answers the server's pings.
    pub async fn next_message(&mut self) -> SimResult<Option<Message>> {
        match self.ws.next().await {
            Some(message) => Ok(Some(message?)),
            None => Ok(None),
        }
    }

    /// Next delivery, split into its messages; `None` once closed.
    pub async fn next_delivery(&mut self) -> SimResult<Option<Vec<OutboundMessage>>> {
        loop {
            match self.next_message().await? {
                Some(Message::Text(text)) => {
                    let messages = text
                        .as_str()
                        .split('\n')
                        .map(|line| OutboundMessage::decode(line.as_bytes()))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(Some(messages));
                },
                Some(Message::Close(_)) | None => return Ok(None),
                Some(_) => {},
            }
        }
    }
}
