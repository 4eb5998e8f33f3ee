//! Driving sessions from a chunk source, and the two ways of consuming them.
//!
//! - Callback style: pass any [`StreamSink`], e.g. a [`CallbackSink`].
//! - Pull style: an [`EventStream`], which implements [`futures::Stream`].

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::client::ClientError;
use crate::session::{SessionControl, SessionRegistry, SessionState, StreamSession, StreamSink};

/// Run `session` over `source` until it reaches a terminal state.
///
/// The source is polled one chunk at a time. When the session finishes early
/// (termination marker, content error or cancellation) the source is dropped
/// without being drained, which aborts the underlying transport.
pub async fn drive<T, S, C>(mut session: StreamSession<T, S>, source: C)
where
    T: DeserializeOwned,
    S: StreamSink<T>,
    C: Stream<Item = Result<Bytes, ClientError>>,
{
    let control = session.control().clone();
    session.start();

    futures::pin_mut!(source);
    while session.state() == SessionState::Active {
        tokio::select! {
            biased;
            _ = control.cancelled() => session.cancel(),
            next = source.next() => match next {
                Some(Ok(chunk)) => session.on_data(&chunk),
                Some(Err(error)) => session.on_complete(Err(error)),
                None => session.on_complete(Ok(())),
            },
        }
    }
}

/// Handle of the tokio runtime the caller is running on.
pub(crate) fn runtime_handle() -> Result<Handle, ClientError> {
    Handle::try_current().map_err(|error| {
        ClientError::Config(format!("streaming requires a tokio runtime: {}", error))
    })
}

/// Register a session in `registry` and drive it over `source` on the tokio
/// runtime.
///
/// Fails without registering anything when called outside a runtime.
pub fn spawn<T, S, C>(
    registry: &SessionRegistry,
    sink: S,
    source: C,
) -> Result<SessionControl, ClientError>
where
    T: DeserializeOwned + Send + 'static,
    S: StreamSink<T> + 'static,
    C: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
{
    let runtime = runtime_handle()?;
    let control = registry.register();
    let session = StreamSession::new(sink, control.clone());
    runtime.spawn(drive(session, source));
    Ok(control)
}

type ItemCallback<T> = Box<dyn FnMut(T) + Send>;
type ErrorCallback = Box<dyn FnMut(&ClientError) + Send>;
type DoneCallback = Box<dyn FnOnce(Option<ClientError>) + Send>;

/// Sink built from closures.
///
/// # Example
/// ```rust,ignore
/// let sink = CallbackSink::new(
///     |chunk: ChatStreamResult| print!("{:?}", chunk.choices[0].delta.content),
///     |error| println!("\ndone: {:?}", error),
/// );
/// let control = client.chats_stream(query, sink)?;
/// ```
pub struct CallbackSink<T> {
    on_item: ItemCallback<T>,
    on_error: Option<ErrorCallback>,
    on_done: Option<DoneCallback>,
}

impl<T> CallbackSink<T> {
    pub fn new(
        on_item: impl FnMut(T) + Send + 'static,
        on_done: impl FnOnce(Option<ClientError>) + Send + 'static,
    ) -> Self {
        Self {
            on_item: Box::new(on_item),
            on_error: None,
            on_done: Some(Box::new(on_done)),
        }
    }

    /// Also observe content errors before the final `on_done`.
    pub fn with_error(mut self, on_error: impl FnMut(&ClientError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }
}

impl<T> StreamSink<T> for CallbackSink<T> {
    fn on_item(&mut self, item: T) {
        (self.on_item)(item);
    }

    fn on_error(&mut self, error: &ClientError) {
        if let Some(on_error) = self.on_error.as_mut() {
            on_error(error);
        }
    }

    fn on_done(&mut self, error: Option<ClientError>) {
        if let Some(on_done) = self.on_done.take() {
            on_done(error);
        }
    }
}

/// Sink forwarding into the channel behind an [`EventStream`].
pub struct ChannelSink<T> {
    sender: mpsc::UnboundedSender<Result<T, ClientError>>,
}

impl<T> ChannelSink<T> {
    pub fn new(sender: mpsc::UnboundedSender<Result<T, ClientError>>) -> Self {
        Self { sender }
    }
}

impl<T: Send> StreamSink<T> for ChannelSink<T> {
    fn on_item(&mut self, item: T) {
        // A closed receiver means the EventStream was dropped, which has
        // already cancelled the session.
        let _ = self.sender.send(Ok(item));
    }

    fn on_done(&mut self, error: Option<ClientError>) {
        if let Some(error) = error {
            let _ = self.sender.send(Err(error));
        }
    }
}

/// Pull-based view of a streaming session.
///
/// Yields items in order, then at most one error, then ends. The stream can
/// be consumed once. Dropping it cancels the session.
pub struct EventStream<T> {
    receiver: mpsc::UnboundedReceiver<Result<T, ClientError>>,
    control: SessionControl,
}

impl<T> EventStream<T> {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Result<T, ClientError>>,
        control: SessionControl,
    ) -> Self {
        Self { receiver, control }
    }

    /// Drive a new session over an arbitrary chunk source.
    pub fn from_source<C>(registry: &SessionRegistry, source: C) -> Result<Self, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
        C: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let control = spawn(registry, ChannelSink::new(sender), source)?;
        Ok(Self::new(receiver, control))
    }

    /// Handle to the underlying session.
    pub fn control(&self) -> &SessionControl {
        &self.control
    }

    /// Stop the stream. Items already buffered are still yielded.
    pub fn cancel(&self) {
        self.control.cancel();
    }
}

impl<T> Unpin for EventStream<T> {}

impl<T> Stream for EventStream<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.control.cancel();
    }
}
