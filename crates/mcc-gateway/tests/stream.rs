//! Stream lifecycle against an in-process WebSocket upstream.

use futures_util::SinkExt;
use mcc_gateway::{Backoff, ConnectionState, ConnectionStatus, GatewayClient, GatewayConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// How the fake upstream treats each accepted connection.
#[derive(Clone, Copy)]
enum Behavior {
    /// Send the frames, then hold the socket open.
    Greet,
    /// Complete the handshake, then close with this code.
    CloseWith(u16),
    /// Answer the upgrade with 401.
    RejectUpgrade,
    /// Accept TCP and hang up before the handshake.
    HangUp,
}

struct Upstream {
    url: String,
    accepts: Arc<AtomicUsize>,
    authorization: Arc<std::sync::Mutex<Option<String>>>,
}

impl Upstream {
    fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

async fn upstream(behavior: Behavior) -> Upstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let accepts = Arc::new(AtomicUsize::new(0));
    let authorization = Arc::new(std::sync::Mutex::new(None));

    let counter = accepts.clone();
    let auth_seen = authorization.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let auth_seen = auth_seen.clone();
            tokio::spawn(async move {
                if let Behavior::HangUp = behavior {
                    drop(stream);
                    return;
                }
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *auth_seen.lock().unwrap() = req
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    if let Behavior::RejectUpgrade = behavior {
                        let reject = http::Response::builder()
                            .status(http::StatusCode::UNAUTHORIZED)
                            .body(None)
                            .unwrap();
                        return Err(reject);
                    }
                    Ok(resp)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                match behavior {
                    Behavior::Greet => {
                        for text in ["one", "two", "three"] {
                            let _ = ws.send(Message::Text(text.into())).await;
                        }
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                    Behavior::CloseWith(code) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "bye".into(),
                        };
                        let _ = ws.close(Some(frame)).await;
                    }
                    Behavior::RejectUpgrade | Behavior::HangUp => {}
                }
            });
        }
    });

    Upstream {
        url,
        accepts,
        authorization,
    }
}

fn client(ws_url: &str) -> GatewayClient {
    GatewayClient::new(GatewayConfig {
        ws_url: ws_url.to_string(),
        token: Some("secret".into()),
        backoff: Backoff::new(Duration::from_millis(20), Duration::from_millis(80), 5),
        ..Default::default()
    })
    .unwrap()
}

async fn wait_for(
    rx: &mut broadcast::Receiver<ConnectionStatus>,
    state: ConnectionState,
) -> ConnectionStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(status) if status.state == state => return status,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("state channel closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
}

#[tokio::test]
async fn connects_and_delivers_frames_in_order() {
    let up = upstream(Behavior::Greet).await;
    let gw = client(&up.url);
    let mut states = gw.subscribe_state();
    let mut frames = gw.subscribe_messages();

    gw.start();
    let status = wait_for(&mut states, ConnectionState::Connected).await;
    assert!(status.connected_at.is_some());
    assert_eq!(
        up.authorization.lock().unwrap().as_deref(),
        Some("Bearer secret")
    );

    let mut got = Vec::new();
    for _ in 0..3 {
        let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap()
            .unwrap();
        got.push(frame);
    }
    assert_eq!(got, ["one", "two", "three"]);

    let now = gw.status();
    assert_eq!(now.state, ConnectionState::Connected);
    assert!(now.connected_at.is_some());

    gw.stop();
    let stopped = gw.status();
    assert_eq!(stopped.state, ConnectionState::Disconnected);
    assert_eq!(stopped.connected_at, None);
    assert_eq!(stopped.uptime_seconds, 0);
}

#[tokio::test]
async fn ordinary_close_reconnects() {
    let up = upstream(Behavior::CloseWith(1000)).await;
    let gw = client(&up.url);
    let mut states = gw.subscribe_state();

    gw.start();
    wait_for(&mut states, ConnectionState::Connected).await;
    wait_for(&mut states, ConnectionState::Reconnecting).await;
    wait_for(&mut states, ConnectionState::Connected).await;
    assert!(up.accepts() >= 2);
    gw.stop();
}

#[tokio::test]
async fn auth_close_code_stops_reconnecting() {
    let up = upstream(Behavior::CloseWith(4001)).await;
    let gw = client(&up.url);
    let mut states = gw.subscribe_state();

    gw.start();
    wait_for(&mut states, ConnectionState::Unauthorized).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(up.accepts(), 1);
    assert_eq!(gw.status().state, ConnectionState::Unauthorized);
}

#[tokio::test]
async fn tls_stream_url_is_refused_up_front() {
    let up = upstream(Behavior::HangUp).await;
    let wss = up.url.replacen("ws://", "wss://", 1);
    let err = GatewayClient::new(GatewayConfig {
        ws_url: wss,
        ..Default::default()
    })
    .err()
    .expect("wss must not validate");
    assert!(err.to_string().contains("stream"), "{err}");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(up.accepts(), 0);
}

#[tokio::test]
async fn rejected_upgrade_is_unauthorized() {
    let up = upstream(Behavior::RejectUpgrade).await;
    let gw = client(&up.url);
    let mut states = gw.subscribe_state();

    gw.start();
    wait_for(&mut states, ConnectionState::Unauthorized).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(up.accepts(), 1);
}

#[tokio::test]
async fn stop_while_reconnecting_prevents_further_attempts() {
    let up = upstream(Behavior::HangUp).await;
    let gw = client(&up.url);
    let mut states = gw.subscribe_state();

    gw.start();
    wait_for(&mut states, ConnectionState::Reconnecting).await;
    gw.stop();
    assert_eq!(gw.status().state, ConnectionState::Disconnected);

    // Let any in-flight attempt settle, then make sure nothing new happens.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = up.accepts();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(up.accepts(), settled);
    assert_eq!(gw.status().state, ConnectionState::Disconnected);

    // Stop again: no effect.
    gw.stop();
    assert_eq!(gw.status().state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn restart_after_stop_connects_again() {
    let up = upstream(Behavior::Greet).await;
    let gw = client(&up.url);
    let mut states = gw.subscribe_state();

    gw.start();
    wait_for(&mut states, ConnectionState::Connected).await;
    gw.stop();
    wait_for(&mut states, ConnectionState::Disconnected).await;

    gw.start();
    wait_for(&mut states, ConnectionState::Connected).await;
    assert_eq!(up.accepts(), 2);
    gw.stop();
}
