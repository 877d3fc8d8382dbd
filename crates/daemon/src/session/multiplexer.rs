//! Session output multiplexer.
//!
//! This module fans session events out to every attached connection. Each
//! connection owns an unbounded outbound queue drained by its socket task, so
//! a slow browser never stalls the shell or the other viewers, and every
//! viewer sees output in the order the process produced it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use shellbridge_protocol::ServerMessage;
use tokio::sync::mpsc;

/// Unique identifier for an attached connection.
pub type ClientId = u64;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-wide unique client id.
pub fn next_client_id() -> ClientId {
    NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Something a connection must deliver to its peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A protocol message.
    Message(ServerMessage),
    /// Close the connection with this code and reason.
    Close { code: u16, reason: String },
}

/// Statistics about a client's message handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Total messages queued successfully.
    pub messages_sent: u64,
}

/// A handle representing an attached connection.
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::UnboundedSender<Outbound>,
    stats: ClientStats,
}

impl ClientHandle {
    /// Creates a new client handle.
    ///
    /// Returns the handle and the receiver the connection drains.
    pub fn new(id: ClientId) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ClientHandle {
            id,
            tx,
            stats: ClientStats::default(),
        };
        (handle, rx)
    }

    /// Returns the client ID.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Returns a copy of the current statistics.
    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Queues an item for the connection.
    ///
    /// Returns false if the connection has already gone away.
    pub fn send(&mut self, item: Outbound) -> bool {
        match self.tx.send(item) {
            Ok(()) => {
                self.stats.messages_sent += 1;
                true
            }
            Err(_) => {
                tracing::trace!(client_id = self.id, "Client channel closed");
                false
            }
        }
    }

    /// Checks if the connection has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The set of connections attached to one session.
///
/// Not synchronized on its own; the owning session guards it with its lock.
#[derive(Default)]
pub struct ClientSet {
    clients: HashMap<ClientId, ClientHandle>,
}

impl ClientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection.
    pub fn insert(&mut self, handle: ClientHandle) {
        tracing::debug!(client_id = handle.id(), "Added client to session");
        self.clients.insert(handle.id(), handle);
    }

    /// Removes a connection, returning its statistics if it was attached.
    pub fn remove(&mut self, id: ClientId) -> Option<ClientStats> {
        self.clients.remove(&id).map(|h| h.stats())
    }

    /// Queues a message for one connection.
    pub fn send_to(&mut self, id: ClientId, message: ServerMessage) -> bool {
        self.clients
            .get_mut(&id)
            .map(|h| h.send(Outbound::Message(message)))
            .unwrap_or(false)
    }

    /// Queues a message for every connection.
    ///
    /// Connections whose receivers are gone are dropped from the set.
    /// Returns the number of connections that accepted the message.
    pub fn broadcast(&mut self, message: &ServerMessage) -> usize {
        let mut delivered = 0;
        self.clients.retain(|_, handle| {
            if handle.is_closed() {
                tracing::debug!(client_id = handle.id(), "Removed disconnected client");
                return false;
            }
            if handle.send(Outbound::Message(message.clone())) {
                delivered += 1;
            }
            true
        });
        delivered
    }

    /// Sends a close to every connection and empties the set.
    ///
    /// Returns the number of connections that were attached.
    pub fn close_all(&mut self, code: u16, reason: &str) -> usize {
        let count = self.clients.len();
        for (_, mut handle) in self.clients.drain() {
            handle.send(Outbound::Close {
                code,
                reason: reason.to_string(),
            });
        }
        count
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Incremental UTF-8 decoder for PTY output.
///
/// A read can end in the middle of a multi-byte character; the incomplete
/// tail is held back until the next chunk instead of being mangled.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `chunk` as possible.
    ///
    /// Invalid sequences become U+FFFD; only a truncated final character is
    /// carried over.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flushes a held-back partial character, if any.
    pub fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&tail).into_owned()
    }
}
