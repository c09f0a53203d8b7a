//! Local WebSocket server standing in for an exchange

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

use crossfeed::adapters::shared::BackoffPolicy;

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    DropAll,
}

/// Accepts any number of connections. Every text frame received is forwarded
/// to `received`; `push` broadcasts to every open connection.
pub struct MockExchange {
    pub url: String,
    received: mpsc::UnboundedReceiver<String>,
    control: broadcast::Sender<Control>,
    accepted: Arc<AtomicUsize>,
}

impl MockExchange {
    /// Start a server; with `auto_pong` a text `ping` is answered with `pong`
    pub async fn start(auto_pong: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (received_tx, received) = mpsc::unbounded_channel();
        let (control, _) = broadcast::channel(64);
        let accepted = Arc::new(AtomicUsize::new(0));

        let control_tx = control.clone();
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut control_rx = control_tx.subscribe();
                let received_tx = received_tx.clone();
                counter.fetch_add(1, Ordering::SeqCst);

                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    loop {
                        tokio::select! {
                            inbound = ws.next() => match inbound {
                                Some(Ok(Message::Text(text))) => {
                                    if auto_pong && text == "ping" {
                                        let _ = ws.send(Message::Text("pong".into())).await;
                                        continue;
                                    }
                                    let _ = received_tx.send(text);
                                }
                                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                                Some(Ok(_)) => {}
                            },
                            control = control_rx.recv() => match control {
                                Ok(Control::Push(text)) => {
                                    if ws.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(Control::DropAll) | Err(_) => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            url,
            received,
            control,
            accepted,
        }
    }

    /// Next text frame from any client, failing the test after 5 s
    pub async fn next_frame(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("no frame received in time")
            .expect("server stopped")
    }

    /// Frame received within `wait`, if any
    pub async fn frame_within(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.received.recv()).await.ok().flatten()
    }

    pub fn push(&self, text: impl Into<String>) {
        let _ = self.control.send(Control::Push(text.into()));
    }

    /// Drop every open connection without a close handshake
    pub fn drop_all(&self) {
        let _ = self.control.send(Control::DropAll);
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Backoff fast enough for tests
pub fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        min_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        factor: 2.0,
        jitter: 0.0,
        max_attempts: None,
    }
}

/// A local URL nothing listens on
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}

/// Wait for the first item matching `pred`, failing the test after 5 s
pub async fn wait_for<T, F>(rx: &mut mpsc::Receiver<T>, mut pred: F) -> T
where
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let item = rx.recv().await.expect("channel closed");
            if pred(&item) {
                return item;
            }
        }
    })
    .await
    .expect("condition not met in time")
}
