// src/websocket.rs
use crate::market::{MarketFeed, Snapshot};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

fn encode(snapshot: &Snapshot) -> Result<Message, serde_json::Error> {
    serde_json::to_string(snapshot.as_ref()).map(Message::Text)
}

/// Accepts websocket clients and streams every market snapshot to them.
pub async fn serve(addr: SocketAddr, feed: MarketFeed) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Price stream listening on ws://{}", addr);
    loop {
        let (stream, peer) = listener.accept().await?;
        let feed = feed.clone();
        tokio::spawn(async move {
            match stream_prices(stream, feed).await {
                Ok(()) => debug!("Price stream to {} closed", peer),
                Err(e) => warn!("Price stream to {} ended: {}", peer, e),
            }
        });
    }
}

async fn stream_prices(stream: TcpStream, feed: MarketFeed) -> Result<(), WsError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut outgoing, mut incoming) = ws.split();
    let mut updates = feed.subscribe();

    // Mark the current snapshot seen so the first `changed()` waits for a new tick.
    let first = updates.borrow_and_update().clone();
    match encode(&first) {
        Ok(msg) => outgoing.send(msg).await?,
        Err(e) => error!("Failed to encode snapshot: {}", e),
    }

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow().clone();
                match encode(&snapshot) {
                    Ok(msg) => outgoing.send(msg).await?,
                    Err(e) => error!("Failed to encode snapshot: {}", e),
                }
            }
            msg = incoming.next() => match msg {
                Some(Ok(Message::Ping(payload))) => outgoing.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
            },
        }
    }
    outgoing.close().await.or_else(|e| match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => Ok(()),
        other => Err(other),
    })
}
