// WebSocket listener for the chat relay.

use futures_util::stream::Stream;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{info, warn};

/// Events emitted by the gateway listener to the application loop.
#[derive(Debug, PartialEq)]
pub enum GatewayEvent {
    /// A relay connected.
    Connected { addr: String },
    /// The current relay disconnected.
    Disconnected,
    /// A text frame from the relay (raw JSON string).
    Frame(String),
}

/// Listen on `127.0.0.1:{port}`, serving one relay connection at a time and
/// forwarding its events through `tx`. Returns when `tx` is closed.
pub async fn serve(port: u16, tx: mpsc::Sender<GatewayEvent>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    info!("Gateway listening on {}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        let addr = addr.to_string();
        info!("Accepted TCP connection from {addr}");

        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {addr}: {e}");
                continue;
            }
        };

        if tx
            .send(GatewayEvent::Connected { addr: addr.clone() })
            .await
            .is_err()
        {
            break;
        }

        let (_write, read) = ws_stream.split();
        if forward_frames(read, &tx, &addr).await.is_err() {
            break;
        }

        if tx.send(GatewayEvent::Disconnected).await.is_err() {
            break;
        }
    }

    Ok(())
}

/// Forward text frames from `stream` through `tx` until the peer closes or
/// errors. Returns `Err(())` if the receiver has been dropped.
pub async fn forward_frames<St>(
    mut stream: St,
    tx: &mpsc::Sender<GatewayEvent>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if tx.send(GatewayEvent::Frame(text.to_string())).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Relay {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            // Binary, ping and pong frames carry nothing for us.
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn frames(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    #[tokio::test]
    async fn text_frames_forwarded_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = vec![
            Ok(Message::Text(r#"{"type":"HEARTBEAT"}"#.into())),
            Ok(Message::Text("second".into())),
        ];

        forward_frames(frames(input), &tx, "test").await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            GatewayEvent::Frame(r#"{"type":"HEARTBEAT"}"#.into())
        );
        assert_eq!(rx.recv().await.unwrap(), GatewayEvent::Frame("second".into()));
    }

    #[tokio::test]
    async fn close_frame_stops_forwarding() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = vec![
            Ok(Message::Text("before".into())),
            Ok(Message::Close(None)),
            Ok(Message::Text("after".into())),
        ];

        forward_frames(frames(input), &tx, "test").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), GatewayEvent::Frame("before".into()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stream_error_stops_forwarding() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = vec![
            Err(WsError::ConnectionClosed),
            Ok(Message::Text("after".into())),
        ];

        forward_frames(frames(input), &tx, "test").await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_text_frames_are_skipped() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = vec![
            Ok(Message::Binary(vec![1, 2].into())),
            Ok(Message::Ping(vec![].into())),
            Ok(Message::Text("kept".into())),
        ];

        forward_frames(frames(input), &tx, "test").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), GatewayEvent::Frame("kept".into()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_is_reported() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let input = vec![Ok(Message::Text("orphan".into()))];
        assert!(forward_frames(frames(input), &tx, "test").await.is_err());
    }
}
