//! Stream driver: runs the state machine's side effects.
//!
//! All transitions go through [`Shared::dispatch`], which holds one mutex for
//! the whole apply-publish-execute step. The lock is never held across an
//! await. Spawned tasks keep only a `Weak` reference, so dropping the last
//! client handle winds everything down.

use crate::GatewayConfig;
use crate::machine::{Action, Event, Machine};
use futures_util::{SinkExt, StreamExt};
use mcc_core::{ConnectionStatus, epoch_millis};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header};
use tokio_tungstenite::tungstenite::{self, Message};

const EVENT_CAPACITY: usize = 64;
const MESSAGE_CAPACITY: usize = 256;

struct StreamHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

struct Driver {
    machine: Machine,
    timer: Option<JoinHandle<()>>,
    stream: Option<StreamHandle>,
}

pub(crate) struct Shared {
    config: GatewayConfig,
    driver: Mutex<Driver>,
    status_tx: watch::Sender<ConnectionStatus>,
    state_tx: broadcast::Sender<ConnectionStatus>,
    message_tx: broadcast::Sender<String>,
}

impl Shared {
    pub(crate) fn new(config: GatewayConfig) -> Arc<Self> {
        let machine = Machine::new(config.backoff);
        let (status_tx, _) = watch::channel(machine.status(epoch_millis()));
        let (state_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (message_tx, _) = broadcast::channel(MESSAGE_CAPACITY);
        Arc::new(Self {
            config,
            driver: Mutex::new(Driver {
                machine,
                timer: None,
                stream: None,
            }),
            status_tx,
            state_tx,
            message_tx,
        })
    }

    pub(crate) fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Latest published snapshot with uptime computed now.
    pub(crate) fn status(&self) -> ConnectionStatus {
        let snapshot = *self.status_tx.borrow();
        ConnectionStatus::project(snapshot.state, snapshot.connected_at, epoch_millis())
    }

    pub(crate) fn subscribe_state(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.state_tx.subscribe()
    }

    pub(crate) fn subscribe_messages(&self) -> broadcast::Receiver<String> {
        self.message_tx.subscribe()
    }

    /// Apply one event and carry out whatever it asks for.
    pub(crate) fn dispatch(self: &Arc<Self>, event: Event) {
        let mut driver = self.lock();
        let now = epoch_millis();
        let transition = driver.machine.apply(event, now);

        if transition.changed {
            let status = driver.machine.status(now);
            tracing::info!(
                state = %status.state,
                retries = driver.machine.retries(),
                "gateway connection state changed"
            );
            self.status_tx.send_replace(status);
            // No receivers is fine.
            let _ = self.state_tx.send(status);
        }

        for action in transition.actions {
            match action {
                Action::Connect { generation } => {
                    if let Some(old) = driver.stream.take() {
                        old.close();
                    }
                    driver.stream = Some(self.spawn_stream(generation));
                }
                Action::ArmTimer { delay, generation } => {
                    tracing::info!(?delay, generation, "scheduling gateway reconnect");
                    if let Some(old) = driver.timer.take() {
                        old.abort();
                    }
                    driver.timer = Some(self.spawn_timer(delay, generation));
                }
                Action::CancelTimer => {
                    if let Some(timer) = driver.timer.take() {
                        timer.abort();
                    }
                }
                Action::CloseStream => {
                    if let Some(stream) = driver.stream.take() {
                        stream.close();
                    }
                }
            }
        }
    }

    /// Forward a stream frame if it came from the live connection.
    fn deliver(&self, generation: u64, text: String) {
        let driver = self.lock();
        if driver.machine.accepts_messages(generation) {
            let _ = self.message_tx.send(text);
        } else {
            tracing::debug!(generation, "dropping frame from superseded stream");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Driver> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_stream(self: &Arc<Self>, generation: u64) -> StreamHandle {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_stream(Arc::downgrade(self), generation, shutdown_rx));
        StreamHandle {
            shutdown: Some(shutdown),
            task,
        }
    }

    fn spawn_timer(self: &Arc<Self>, delay: std::time::Duration, generation: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.dispatch(Event::TimerFired { generation });
            }
        })
    }
}

impl StreamHandle {
    /// Ask the task to send a close frame; it exits on its own. A task still
    /// in its handshake has nothing to close and is aborted.
    fn close(mut self) {
        let delivered = self
            .shutdown
            .take()
            .is_some_and(|tx| tx.send(()).is_ok());
        if !delivered {
            self.task.abort();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(stream) = self.stream.take() {
            stream.task.abort();
        }
    }
}

/// What ended a stream attempt.
enum Outcome {
    Rejected,
    Failed,
    Closed(Option<u16>),
    Shutdown,
}

async fn run_stream(shared: Weak<Shared>, generation: u64, mut shutdown: oneshot::Receiver<()>) {
    let Some(request) = shared.upgrade().map(|s| build_request(s.config())) else {
        return;
    };

    let outcome = match request {
        Ok(request) => {
            tokio::select! {
                connected = tokio_tungstenite::connect_async(request) => match connected {
                    Ok((ws, _)) => {
                        match shared.upgrade() {
                            Some(s) => s.dispatch(Event::Opened { generation }),
                            None => return,
                        }
                        pump(&shared, generation, ws, &mut shutdown).await
                    }
                    Err(tungstenite::Error::Http(response))
                        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
                    {
                        tracing::warn!(status = %response.status(), "gateway stream rejected credential");
                        Outcome::Rejected
                    }
                    Err(err) => {
                        tracing::warn!(%err, "gateway stream connect failed");
                        Outcome::Failed
                    }
                },
                _ = &mut shutdown => Outcome::Shutdown,
            }
        }
        Err(err) => {
            tracing::warn!(%err, "cannot build gateway stream request");
            Outcome::Failed
        }
    };

    let event = match outcome {
        Outcome::Rejected => Event::Rejected { generation },
        Outcome::Failed => Event::Failed { generation },
        Outcome::Closed(code) => Event::Closed { generation, code },
        Outcome::Shutdown => return,
    };
    if let Some(s) = shared.upgrade() {
        s.dispatch(event);
    }
}

async fn pump<S>(
    shared: &Weak<Shared>,
    generation: u64,
    mut ws: tokio_tungstenite::WebSocketStream<S>,
    shutdown: &mut oneshot::Receiver<()>,
) -> Outcome
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                let _ = ws.close(None).await;
                return Outcome::Shutdown;
            }
            frame = ws.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        tracing::info!(?code, "gateway stream closed by peer");
                        return Outcome::Closed(code);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        tracing::warn!(%err, "gateway stream error");
                        return Outcome::Failed;
                    }
                    None => return Outcome::Closed(None),
                };
                match shared.upgrade() {
                    Some(s) => s.deliver(generation, text),
                    None => {
                        let _ = ws.send(Message::Close(None)).await;
                        return Outcome::Shutdown;
                    }
                }
            }
        }
    }
}

fn build_request(
    config: &GatewayConfig,
) -> Result<tungstenite::handshake::client::Request, tungstenite::Error> {
    let mut request = config.ws_url.as_str().into_client_request()?;
    if let Some(token) = config.token() {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| tungstenite::Error::HttpFormat(e.into()))?;
        request.headers_mut().insert(header::AUTHORIZATION, value);
    }
    Ok(request)
}
