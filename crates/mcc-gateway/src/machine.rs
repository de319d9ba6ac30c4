//! Connection state machine.
//!
//! Every input (lifecycle calls, stream callbacks, timer expiry, call-path
//! auth failures) is an [`Event`] fed through [`Machine::apply`], which
//! mutates state and returns the side effects for the driver to perform.
//! The machine does no I/O, so the transition rules are testable in
//! isolation.
//!
//! Each stream attempt and each armed timer carries the `generation` it was
//! issued under. Events from an older generation are dropped untouched.

use mcc_core::{Backoff, ConnectionState, ConnectionStatus};
use std::time::Duration;

/// Close codes upstream uses for a missing or rejected credential.
pub const AUTH_CLOSE_CODES: [u16; 2] = [1008, 4001];

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Stop,
    /// Stream handshake accepted.
    Opened { generation: u64 },
    /// Stream closed by the peer, with its close code if one was sent.
    Closed { generation: u64, code: Option<u16> },
    /// Connect failed or the stream errored.
    Failed { generation: u64 },
    /// The upgrade request was answered with 401/403.
    Rejected { generation: u64 },
    TimerFired { generation: u64 },
    /// A request/response call saw 401/403.
    CallUnauthorized,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a new stream. Any previous handle is abandoned.
    Connect { generation: u64 },
    ArmTimer { delay: Duration, generation: u64 },
    CancelTimer,
    CloseStream,
}

/// Result of applying one event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Transition {
    /// State or `connected_at` changed; observers should be notified.
    pub changed: bool,
    pub actions: Vec<Action>,
}

impl Transition {
    fn ignored() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub struct Machine {
    state: ConnectionState,
    connected_at: Option<u64>,
    retries: u32,
    generation: u64,
    running: bool,
    timer_armed: bool,
    stream_live: bool,
    backoff: Backoff,
}

impl Machine {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            connected_at: None,
            retries: 0,
            generation: 0,
            running: false,
            timer_armed: false,
            stream_live: false,
            backoff,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn timer_armed(&self) -> bool {
        self.timer_armed
    }

    /// Whether frames from stream `generation` should reach subscribers.
    pub fn accepts_messages(&self, generation: u64) -> bool {
        self.running && generation == self.generation && self.state == ConnectionState::Connected
    }

    pub fn status(&self, now_ms: u64) -> ConnectionStatus {
        ConnectionStatus::project(self.state, self.connected_at, now_ms)
    }

    pub fn apply(&mut self, event: Event, now_ms: u64) -> Transition {
        let before = (self.state, self.connected_at);
        let actions = match event {
            Event::Start => self.start(now_ms),
            Event::Stop => self.stop(now_ms),
            Event::Opened { generation } if self.is_current(generation) => {
                self.retries = 0;
                self.set_state(ConnectionState::Connected, now_ms);
                Vec::new()
            }
            Event::Closed { generation, code } if self.is_current(generation) => {
                self.stream_live = false;
                match code {
                    Some(code) if AUTH_CLOSE_CODES.contains(&code) => self.refuse(now_ms),
                    _ => self.schedule_reconnect(now_ms),
                }
            }
            Event::Failed { generation } if self.is_current(generation) => {
                self.stream_live = false;
                self.schedule_reconnect(now_ms)
            }
            Event::Rejected { generation } if self.is_current(generation) => {
                self.stream_live = false;
                self.refuse(now_ms)
            }
            Event::TimerFired { generation }
                if self.timer_armed && self.is_current(generation) =>
            {
                self.timer_armed = false;
                self.begin_attempt(now_ms)
            }
            Event::CallUnauthorized => self.call_unauthorized(now_ms),
            _ => {
                tracing::debug!(?event, current = self.generation, "dropping stale event");
                return Transition::ignored();
            }
        };
        Transition {
            changed: before != (self.state, self.connected_at),
            actions,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.running && generation == self.generation
    }

    fn start(&mut self, now_ms: u64) -> Vec<Action> {
        if self.running && self.state != ConnectionState::Unauthorized {
            return Vec::new();
        }
        self.running = true;
        self.retries = 0;
        self.begin_attempt(now_ms)
    }

    fn stop(&mut self, now_ms: u64) -> Vec<Action> {
        if !self.running
            && !self.timer_armed
            && !self.stream_live
            && self.state == ConnectionState::Disconnected
        {
            return Vec::new();
        }
        let actions = self.halt();
        self.running = false;
        self.set_state(ConnectionState::Disconnected, now_ms);
        actions
    }

    fn call_unauthorized(&mut self, now_ms: u64) -> Vec<Action> {
        if self.state == ConnectionState::Unauthorized {
            return Vec::new();
        }
        let actions = self.halt();
        self.set_state(ConnectionState::Unauthorized, now_ms);
        actions
    }

    /// Upstream refused the credential. Nothing reconnects until `start()`.
    fn refuse(&mut self, now_ms: u64) -> Vec<Action> {
        let actions = self.halt();
        self.set_state(ConnectionState::Unauthorized, now_ms);
        actions
    }

    /// Cancel the timer, drop the stream, and orphan anything in flight.
    fn halt(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.timer_armed {
            self.timer_armed = false;
            actions.push(Action::CancelTimer);
        }
        if self.stream_live {
            self.stream_live = false;
            actions.push(Action::CloseStream);
        }
        self.generation += 1;
        actions
    }

    fn begin_attempt(&mut self, now_ms: u64) -> Vec<Action> {
        self.generation += 1;
        self.stream_live = true;
        let phase = if self.retries > 0 {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        };
        self.set_state(phase, now_ms);
        vec![Action::Connect {
            generation: self.generation,
        }]
    }

    fn schedule_reconnect(&mut self, now_ms: u64) -> Vec<Action> {
        if self.timer_armed {
            return Vec::new();
        }
        self.retries = self.retries.saturating_add(1);
        self.timer_armed = true;
        self.set_state(ConnectionState::Reconnecting, now_ms);
        vec![Action::ArmTimer {
            delay: self.backoff.delay(self.retries),
            generation: self.generation,
        }]
    }

    fn set_state(&mut self, next: ConnectionState, now_ms: u64) {
        if next == ConnectionState::Connected {
            if self.state != ConnectionState::Connected {
                self.connected_at = Some(now_ms);
            }
        } else {
            self.connected_at = None;
        }
        self.state = next;
    }
}
