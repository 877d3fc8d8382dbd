//! Session registry.
//!
//! The registry is the authoritative map from session id to live session.
//! Each [`Session`] pairs exactly one shell process with the set of
//! connections attached to it. A session leaves the registry for good when
//! its process exits or when it is reaped after sitting with no attached
//! connection for longer than the idle TTL.
//!
//! Locking: the map is a `DashMap`; each session guards its client set,
//! timestamps, geometry and `closed` flag with one mutex. The mutex is never
//! held across an `.await` and never while holding a map guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use shellbridge_protocol::{
    close_code, ClientFrame, ServerMessage, SessionId, REASON_SERVER_SHUTDOWN,
    REASON_SESSION_ENDED,
};
use tokio::sync::mpsc;

use super::multiplexer::{next_client_id, ClientHandle, ClientId, ClientSet, Outbound, Utf8Decoder};
use super::pty::{
    ProcessSpawner, ProcessStatus, PtyEvent, PtyEvents, SessionError, TerminalProcess,
    TerminalSize,
};

/// Returns the current Unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A connection's attachment to a session.
pub struct Attachment {
    pub client_id: ClientId,
    /// Messages and the eventual close for this connection, `ready` first.
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

struct SessionState {
    clients: ClientSet,
    last_active_at: Instant,
    last_heartbeat_at: Instant,
    size: TerminalSize,
    /// Set once, by process exit, reaping or shutdown.
    closed: bool,
}

impl SessionState {
    fn touch(&mut self) {
        let now = Instant::now();
        self.last_active_at = self.last_active_at.max(now);
        self.last_heartbeat_at = self.last_heartbeat_at.max(now);
    }

    fn last_seen(&self) -> Instant {
        self.last_active_at.max(self.last_heartbeat_at)
    }
}

/// One shell process and the connections attached to it.
pub struct Session {
    id: SessionId,
    process: Box<dyn TerminalProcess>,
    state: Mutex<SessionState>,
}

impl Session {
    fn new(id: SessionId, process: Box<dyn TerminalProcess>, size: TerminalSize) -> Self {
        let now = Instant::now();
        Self {
            id,
            process,
            state: Mutex::new(SessionState {
                clients: ClientSet::new(),
                last_active_at: now,
                last_heartbeat_at: now,
                size,
                closed: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Process ID of the shell.
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Last-known terminal geometry.
    pub fn size(&self) -> TerminalSize {
        self.state().size
    }

    /// Number of attached connections.
    pub fn client_count(&self) -> usize {
        self.state().clients.len()
    }

    /// Whether the session has reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Refreshes activity timestamps. Returns false if the session is closed.
    pub fn touch(&self) -> bool {
        let mut state = self.state();
        if state.closed {
            return false;
        }
        state.touch();
        true
    }

    /// Attaches a new connection.
    ///
    /// The returned receiver yields `ready` before anything else. Fails with
    /// [`SessionError::NotFound`] once the session is closed.
    pub fn attach(&self) -> Result<Attachment, SessionError> {
        let mut state = self.state();
        if state.closed {
            return Err(SessionError::NotFound(self.id.to_string()));
        }

        let client_id = next_client_id();
        let (mut handle, outbound) = ClientHandle::new(client_id);
        handle.send(Outbound::Message(ServerMessage::Ready {
            session_id: self.id.to_string(),
        }));
        state.clients.insert(handle);
        state.touch();

        tracing::info!(
            session_id = %self.id,
            client_id,
            clients = state.clients.len(),
            "Client attached to session"
        );

        Ok(Attachment {
            client_id,
            outbound,
        })
    }

    /// Detaches a connection. The process is left untouched.
    pub fn detach(&self, client_id: ClientId) {
        let mut state = self.state();
        let removed = state.clients.remove(client_id);
        if !state.closed {
            state.touch();
        }

        if let Some(stats) = removed {
            tracing::info!(
                session_id = %self.id,
                client_id,
                messages_sent = stats.messages_sent,
                clients = state.clients.len(),
                "Client detached from session"
            );
        }
    }

    /// Applies one inbound frame from `client_id`.
    pub fn handle_frame(&self, client_id: ClientId, frame: ClientFrame) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.touch();

        match frame {
            ClientFrame::Input(data) | ClientFrame::Raw(data) => {
                if !data.is_empty() {
                    self.process.write(data.as_bytes());
                }
            }
            ClientFrame::Resize { cols, rows } => {
                let size = TerminalSize::new(cols, rows);
                state.size = size;
                self.process.resize(size);
                tracing::debug!(session_id = %self.id, cols, rows, "Resized session");
            }
            ClientFrame::Ping => {
                state.clients.send_to(client_id, ServerMessage::Pong);
            }
            ClientFrame::Ignored => {}
        }
    }

    /// Broadcasts decoded process output to every attached connection.
    fn broadcast_output(&self, data: String) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.touch();
        state.clients.broadcast(&ServerMessage::Output { data });
    }

    /// Sends a liveness ping to every attached connection.
    ///
    /// Returns the number of connections pinged.
    fn heartbeat(&self, timestamp_ms: u64) -> usize {
        let mut state = self.state();
        if state.closed || state.clients.is_empty() {
            return 0;
        }
        state.clients.broadcast(&ServerMessage::Ping { data: timestamp_ms })
    }

    /// Moves the session to its terminal state, closing every connection.
    ///
    /// Returns true only for the call that performed the transition.
    fn close(&self, code: u16, reason: &str) -> bool {
        let mut state = self.state();
        if state.closed {
            return false;
        }
        state.closed = true;
        let closed = state.clients.close_all(code, reason);
        tracing::debug!(session_id = %self.id, code, clients = closed, "Closed session");
        true
    }

    /// Marks the session closed if it has no clients and has been idle for
    /// at least `ttl` as of `now`.
    ///
    /// The emptiness check, the staleness check and the transition happen in
    /// one critical section, so a concurrent attach either prevents the reap
    /// or fails.
    fn try_reap(&self, now: Instant, ttl: Duration) -> bool {
        let mut state = self.state();
        if state.closed || !state.clients.is_empty() {
            return false;
        }
        if now.saturating_duration_since(state.last_seen()) < ttl {
            return false;
        }
        state.closed = true;
        true
    }
}

type SessionMap = DashMap<SessionId, Arc<Session>>;

/// Thread-safe registry of live sessions.
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    spawner: Arc<dyn ProcessSpawner>,
    default_size: TerminalSize,
    ttl: Duration,
    /// Cleared by `shutdown`; no session is created while it is unset.
    accepting: AtomicBool,
}

impl SessionRegistry {
    /// Creates an empty registry.
    ///
    /// New sessions start at `default_size`; sessions without clients are
    /// reaped once idle for `ttl`.
    pub fn new(spawner: Arc<dyn ProcessSpawner>, default_size: TerminalSize, ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            spawner,
            default_size,
            ttl,
            accepting: AtomicBool::new(true),
        }
    }

    /// Accepts new sessions again after a `shutdown`.
    pub fn reopen(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    /// The idle TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live session `candidate` refers to, or provisions a new
    /// one.
    ///
    /// Invalid, unknown and dead ids all lead to a fresh session with a fresh
    /// id. Fails with [`SessionError::ShuttingDown`] once `shutdown` has
    /// started. Must be called from within a Tokio runtime.
    pub fn get_or_create(&self, candidate: Option<&str>) -> Result<Arc<Session>, SessionError> {
        if let Some(session) = candidate.and_then(|id| self.get(id.trim())) {
            if session.touch() {
                tracing::debug!(session_id = %session.id(), "Reusing live session");
                return Ok(session);
            }
        }
        self.create()
    }

    /// Spawns a process and registers a new session for it.
    fn create(&self) -> Result<Arc<Session>, SessionError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SessionError::ShuttingDown);
        }
        let (process, events) = self.spawner.spawn(self.default_size)?;

        let mut id = SessionId::generate();
        while self.sessions.contains_key(&id) {
            id = SessionId::generate();
        }

        let session = Arc::new(Session::new(id.clone(), process, self.default_size));
        self.sessions.insert(id, Arc::clone(&session));

        tokio::spawn(forward_events(
            Arc::clone(&session),
            events,
            Arc::clone(&self.sessions),
        ));

        // A shutdown that began after the first check may have taken its
        // snapshot before the insert; tear the newcomer down here instead.
        if !self.accepting.load(Ordering::SeqCst) {
            session.close(close_code::GOING_AWAY, REASON_SERVER_SHUTDOWN);
            if let Err(e) = session.process.kill() {
                tracing::warn!(session_id = %session.id(), error = %e, "Failed to kill session created during shutdown");
            }
            evict(&self.sessions, &session);
            return Err(SessionError::ShuttingDown);
        }

        tracing::info!(
            session_id = %session.id(),
            pid = ?session.pid(),
            cols = self.default_size.cols,
            rows = self.default_size.rows,
            "Created new session"
        );

        Ok(session)
    }

    /// Resolves a live session. Ids failing the syntactic check never match.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let id = SessionId::parse(id).ok()?;
        let session = self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))?;
        (!session.is_closed()).then_some(session)
    }

    /// Refreshes a live session's timestamps, returning it.
    pub fn touch(&self, id: &str) -> Option<Arc<Session>> {
        self.get(id).filter(|session| session.touch())
    }

    /// Deletes the mapping for `id`. Absent ids are not an error.
    ///
    /// The removed session's process is left to the caller.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Kills and evicts every session idle past the TTL with no clients.
    ///
    /// Returns the number of sessions reaped. A failing kill is logged and
    /// does not stop the sweep.
    pub fn cleanup_idle(&self, now: Instant) -> usize {
        let mut reaped = 0;

        for session in self.snapshot() {
            if !session.try_reap(now, self.ttl) {
                continue;
            }

            if let Err(e) = session.process.kill() {
                tracing::warn!(session_id = %session.id(), error = %e, "Failed to kill idle session");
            }
            evict(&self.sessions, &session);
            reaped += 1;

            tracing::info!(session_id = %session.id(), "Reaped idle session");
        }

        reaped
    }

    /// Pings every connection of every session that has one.
    ///
    /// Returns the number of connections pinged.
    pub fn broadcast_heartbeat(&self) -> usize {
        let timestamp = now_millis();
        self.snapshot()
            .iter()
            .map(|session| session.heartbeat(timestamp))
            .sum()
    }

    /// Closes every connection and kills every process.
    ///
    /// New sessions are refused from here on until [`reopen`](Self::reopen).
    pub fn shutdown(&self) -> usize {
        self.accepting.store(false, Ordering::SeqCst);
        let sessions = self.snapshot();
        for session in &sessions {
            session.close(close_code::GOING_AWAY, REASON_SERVER_SHUTDOWN);
            if let Err(e) = session.process.kill() {
                tracing::warn!(session_id = %session.id(), error = %e, "Failed to kill session during shutdown");
            }
            evict(&self.sessions, session);
        }
        if !sessions.is_empty() {
            tracing::info!(count = sessions.len(), "Killed all sessions");
        }
        sessions.len()
    }

    /// Returns the number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Clones out the current sessions so no map guard is held while
    /// session locks are taken.
    fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

/// Removes `session` from the map unless its id has been taken over.
fn evict(sessions: &SessionMap, session: &Arc<Session>) {
    sessions.remove_if(session.id(), |_, current| Arc::ptr_eq(current, session));
}

/// Delivers process events to the session until the process exits, then
/// tears the session down.
async fn forward_events(session: Arc<Session>, mut events: PtyEvents, sessions: Arc<SessionMap>) {
    let mut decoder = Utf8Decoder::new();
    let mut status = ProcessStatus::Unknown;

    while let Some(event) = events.recv().await {
        match event {
            PtyEvent::Output(bytes) => {
                let text = decoder.decode(&bytes);
                if !text.is_empty() {
                    session.broadcast_output(text);
                }
            }
            PtyEvent::Exited(exit) => {
                status = exit;
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        session.broadcast_output(tail);
    }

    let first = session.close(close_code::SESSION_ENDED, REASON_SESSION_ENDED);
    evict(&sessions, &session);

    if first {
        tracing::info!(session_id = %session.id(), status = ?status, "Session ended");
    }
}
