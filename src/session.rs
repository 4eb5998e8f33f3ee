//! Streaming session lifecycle.
//!
//! A [`StreamSession`] is created per streaming call. It feeds transport
//! chunks through the [`EventReassembler`] and reports to a [`StreamSink`]:
//! items in order, then exactly one `on_done`. Sessions are tracked in a
//! [`SessionRegistry`] until they reach a terminal state so that the owner
//! can cancel whatever is still running.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::client::ClientError;
use crate::decode::DecodedEvent;
use crate::sse::EventReassembler;

/// Receiver of a session's output.
///
/// `on_item` is called zero or more times, in order. `on_error` is called at
/// most once, for content errors only, immediately before `on_done`.
/// `on_done` is called exactly once and carries the error that ended the
/// stream, or `None` on completion and on cancellation.
pub trait StreamSink<T>: Send {
    fn on_item(&mut self, item: T);

    fn on_error(&mut self, _error: &ClientError) {}

    fn on_done(&mut self, error: Option<ClientError>);
}

/// Lifecycle state. `Completed`, `Failed` and `Cancelled` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Thread-safe set of live sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionId, CancellationToken>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, CancellationToken>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new session and return its control handle.
    pub fn register(&self) -> SessionControl {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        self.lock().insert(id, token.clone());

        SessionControl {
            id,
            token,
            registry: self.clone(),
        }
    }

    fn deregister(&self, id: SessionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of sessions that have not reached a terminal state.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Request cancellation of every live session.
    pub fn cancel_all(&self) {
        for token in self.lock().values() {
            token.cancel();
        }
    }
}

/// Handle to cancel a running session.
///
/// Clones share the same cancellation flag.
#[derive(Debug, Clone)]
pub struct SessionControl {
    id: SessionId,
    token: CancellationToken,
    registry: SessionRegistry,
}

impl SessionControl {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Request cancellation. The session stops delivering items and reports
    /// `on_done(None)`. Has no effect once the session has finished.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    fn deregister(&self) -> bool {
        self.registry.deregister(self.id)
    }
}

/// State machine of one streaming call.
pub struct StreamSession<T, S> {
    state: SessionState,
    reassembler: EventReassembler,
    control: SessionControl,
    sink: S,
    _item: PhantomData<fn() -> T>,
}

impl<T, S> StreamSession<T, S>
where
    T: DeserializeOwned,
    S: StreamSink<T>,
{
    pub fn new(sink: S, control: SessionControl) -> Self {
        Self {
            state: SessionState::Idle,
            reassembler: EventReassembler::new(),
            control,
            sink,
            _item: PhantomData,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn control(&self) -> &SessionControl {
        &self.control
    }

    /// Move from `Idle` to `Active`, unless cancellation was already
    /// requested.
    pub fn start(&mut self) {
        if self.state != SessionState::Idle {
            return;
        }
        if self.control.is_cancelled() {
            self.cancel();
            return;
        }
        debug!(session = %self.control.id, "stream started");
        self.state = SessionState::Active;
    }

    /// Process one chunk from the transport.
    pub fn on_data(&mut self, chunk: &[u8]) {
        if self.state != SessionState::Active {
            return;
        }
        if self.control.is_cancelled() {
            self.cancel();
            return;
        }
        trace!(session = %self.control.id, bytes = chunk.len(), "chunk received");

        let batch = self.reassembler.feed::<T>(chunk);
        for event in batch.events {
            match event {
                DecodedEvent::Item(item) => self.sink.on_item(item),
                DecodedEvent::ApiError(error) => {
                    self.fail(ClientError::Api(error));
                    return;
                }
                DecodedEvent::Failure(error) => {
                    self.fail(error);
                    return;
                }
            }
        }

        if batch.done {
            self.complete();
        }
    }

    /// Terminal signal from the transport.
    pub fn on_complete(&mut self, result: Result<(), ClientError>) {
        if self.state.is_terminal() {
            return;
        }
        match result {
            Ok(()) => self.complete(),
            Err(error) => self.finish(SessionState::Failed, Some(error)),
        }
    }

    /// End the session with `error`. Content errors are also reported
    /// through `on_error`.
    pub fn fail(&mut self, error: ClientError) {
        if self.state.is_terminal() {
            return;
        }
        warn!(session = %self.control.id, error = %error, "stream failed");
        if error.is_content_error() {
            self.sink.on_error(&error);
        }
        self.finish(SessionState::Failed, Some(error));
    }

    /// Cancel the session: no further items are delivered.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.control.cancel();
        self.finish(SessionState::Cancelled, None);
    }

    fn complete(&mut self) {
        if let Some(residual) = self.reassembler.finish() {
            debug!(
                session = %self.control.id,
                bytes = residual.len(),
                "discarding incomplete trailing fragment"
            );
        }
        self.finish(SessionState::Completed, None);
    }

    fn finish(&mut self, state: SessionState, error: Option<ClientError>) {
        self.state = state;
        if !self.control.deregister() {
            warn!(session = %self.control.id, "session was not registered");
        }
        debug!(session = %self.control.id, ?state, "stream finished");
        self.sink.on_done(error);
    }
}
