use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};
use ws_chat_client::{
    ChatMessage, Codec, ProtoCodec, Session, SessionConfig, SessionError, SessionState,
    TransportError,
};

const WAIT: Duration = Duration::from_secs(3);

async fn accept(listener: &TcpListener) -> Result<(WebSocketStream<TcpStream>, String)> {
    let (stream, _) = listener.accept().await?;
    let (path_tx, path_rx) = oneshot::channel();
    let callback = move |request: &Request, response: Response| {
        let _ = path_tx.send(request.uri().path().to_string());
        Ok::<_, ErrorResponse>(response)
    };
    let ws = accept_hdr_async(stream, callback).await?;
    let path = path_rx.await.context("handshake callback never ran")?;
    Ok((ws, path))
}

async fn next_binary(ws: &mut WebSocketStream<TcpStream>) -> Result<Vec<u8>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Binary(frame))) => return Ok(frame),
            Some(Ok(_)) => continue,
            Some(Err(error)) => return Err(error.into()),
            None => bail!("client hung up"),
        }
    }
}

fn config_for(listener: &TcpListener) -> Result<SessionConfig> {
    let mut config = SessionConfig::new("alice");
    config.host = "127.0.0.1".into();
    config.port = listener.local_addr()?.port();
    config.path = "/chat".into();
    config.timeout_ms = Some(2_000);
    Ok(config)
}

#[tokio::test]
async fn messages_cross_a_real_websocket() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let config = config_for(&listener)?;

    let reply = ChatMessage::text("bob", 20, "hi alice")?;
    let server = tokio::spawn({
        let reply = reply.clone();
        async move {
            let (mut ws, path) = accept(&listener).await?;
            let first = next_binary(&mut ws).await?;
            let second = next_binary(&mut ws).await?;
            ws.send(Message::Binary(ProtoCodec.encode(&reply))).await?;

            // Hold the connection open until the client says goodbye.
            while let Some(Ok(message)) = ws.next().await {
                if message.is_close() {
                    break;
                }
            }
            Ok::<_, anyhow::Error>((path, vec![first, second]))
        }
    });

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    let (session, task) = Session::connect(config, move |message: ChatMessage| {
        let _ = inbound_tx.send(message);
    });

    let text = ChatMessage::text("alice", 10, "hello bob")?;
    let image = ChatMessage::image("alice", 11, "png", vec![0x89, b'P', b'N', b'G'])?;
    // Sent before the handshake completes; buffered until active.
    session.send(text.clone())?;
    timeout(WAIT, session.wait_active()).await??;
    session.send(image.clone())?;

    let received = timeout(WAIT, inbound_rx.recv())
        .await?
        .ok_or_else(|| anyhow!("handler dropped"))?;
    assert_eq!(received, reply);

    session.close();
    timeout(WAIT, task).await???;
    assert_eq!(session.state(), SessionState::Closed);

    let (path, frames) = timeout(WAIT, server).await???;
    assert_eq!(path, "/chat");
    let decoded = frames
        .iter()
        .map(|frame| ProtoCodec.decode(frame))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(decoded, vec![text, image]);
    Ok(())
}

#[tokio::test]
async fn server_close_ends_the_session() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let config = config_for(&listener)?;

    let server = tokio::spawn(async move {
        let (mut ws, _) = accept(&listener).await?;
        ws.close(None).await?;
        Ok::<_, anyhow::Error>(())
    });

    let (session, task) = Session::connect(config, |_message: ChatMessage| {});
    match timeout(WAIT, task).await?? {
        Err(SessionError::Read {
            source: TransportError::PeerClosed,
            ..
        }) => {}
        other => panic!("expected the peer to close, got {other:?}"),
    }
    assert!(session.is_closed());
    timeout(WAIT, server).await???;
    Ok(())
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let config = config_for(&listener)?;
    drop(listener);

    let (session, task) = Session::connect(config, |_message: ChatMessage| {});
    assert!(matches!(
        timeout(WAIT, task).await??,
        Err(SessionError::Connect { .. })
    ));
    assert!(session.wait_active().await.is_err());
    Ok(())
}

#[tokio::test]
async fn non_websocket_peer_fails_the_handshake() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let config = config_for(&listener)?;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        // Accept the TCP connection, then hang up without upgrading.
        drop(stream);
        Ok::<_, anyhow::Error>(())
    });

    let (_session, task) = Session::connect(config, |_message: ChatMessage| {});
    assert!(matches!(
        timeout(WAIT, task).await??,
        Err(SessionError::Handshake { .. })
    ));
    timeout(WAIT, server).await???;
    Ok(())
}
