//! Request/response multiplexer over one extension stream

use crate::{
    BridgeError, Result,
    console::ConsoleBridge,
    protocol::{ExtensionMessage, MessageBody},
};
use deploy_model::{ProgressSink, report};
use futures::future::{BoxFuture, Either, select};
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt, channel::mpsc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use toolchain_exec::CancelToken;
use tracing::{debug, warn};

/// Per-request channel capacity.
///
/// Absorbs short progress bursts without blocking the receive loop; a caller
/// slower than 50 buffered messages will eventually block the dispatcher.
pub const PROGRESS_BURST_BUDGET: usize = 50;

type Pending = Arc<Mutex<HashMap<String, async_channel::Sender<ExtensionMessage>>>>;

/// The orchestrator's handle to one out-of-process extension.
///
/// Clonable; all clones multiplex over the same underlying stream.
#[derive(Clone)]
pub struct ExtensionBridge {
    outbound: mpsc::UnboundedSender<ExtensionMessage>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    console: Option<ConsoleBridge>,
}

impl ExtensionBridge {
    /// Start a bridge over the given message sink/stream pair.
    ///
    /// Returns the bridge handle and the driver future that owns the single
    /// receive loop; the caller spawns the driver on its runtime.
    pub fn start<Si, St>(sink: Si, stream: St) -> (Self, BoxFuture<'static, Result<()>>)
    where
        Si: Sink<ExtensionMessage> + Send + Unpin + 'static,
        Si::Error: std::fmt::Display,
        St: Stream<Item = Result<ExtensionMessage>> + Send + Unpin + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let bridge = Self {
            outbound,
            pending: pending.clone(),
            closed: closed.clone(),
            console: None,
        };

        let driver = drive(sink, stream, outbound_rx, pending, closed).boxed();
        (bridge, driver)
    }

    /// Tee extension console output into the host console while calls are
    /// outstanding
    pub fn with_console(mut self, console: ConsoleBridge) -> Self {
        self.console = Some(console);
        self
    }

    /// Whether the underlying stream has terminated
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for the response satisfying `predicate`.
    ///
    /// Progress messages for this request are forwarded to `progress` and
    /// never satisfy the predicate. A response carrying a non-empty error
    /// message fails the call with that message verbatim. Cancellation
    /// returns immediately; the routing entry is freed on every exit path.
    pub async fn call(
        &self,
        body: MessageBody,
        predicate: impl Fn(&ExtensionMessage) -> bool,
        progress: Option<&ProgressSink>,
        cancel: &CancelToken,
    ) -> Result<ExtensionMessage> {
        if self.is_closed() {
            return Err(BridgeError::StreamClosed);
        }

        let message = ExtensionMessage::request(body);
        let request_id = message.request_id.clone();

        let (tx, rx) = async_channel::bounded(PROGRESS_BURST_BUDGET);
        self.pending
            .lock()
            .unwrap()
            .insert(request_id.clone(), tx);
        let _entry = PendingGuard {
            pending: self.pending.clone(),
            request_id: request_id.clone(),
        };
        let _console = self.console.as_ref().map(|console| console.guard());

        debug!("Sending extension request {}", request_id);
        self.outbound
            .unbounded_send(message)
            .map_err(|_| BridgeError::StreamClosed)?;

        loop {
            let received = rx.recv();
            futures::pin_mut!(received);
            let cancelled = cancel.cancelled();
            futures::pin_mut!(cancelled);

            let message = match select(received, cancelled).await {
                Either::Left((Ok(message), _)) => message,
                Either::Left((Err(_), _)) => return Err(BridgeError::StreamClosed),
                Either::Right(((), _)) => return Err(BridgeError::Cancelled),
            };

            if let Some(error) = &message.error
                && !error.message.is_empty()
            {
                return Err(BridgeError::Extension {
                    message: error.message.clone(),
                    code: error.code.clone(),
                });
            }

            if let MessageBody::Progress { message: text } = &message.body {
                if let Some(sink) = progress {
                    report(sink, text.clone()).await;
                }
                continue;
            }

            if predicate(&message) {
                return Ok(message);
            }

            warn!(
                "Ignoring unexpected response body for request {}",
                request_id
            );
        }
    }
}

/// Removes the routing entry when a call returns, succeeds or is cancelled
struct PendingGuard {
    pending: Pending,
    request_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().unwrap().remove(&self.request_id);
    }
}

async fn drive<Si, St>(
    mut sink: Si,
    stream: St,
    mut outbound_rx: mpsc::UnboundedReceiver<ExtensionMessage>,
    pending: Pending,
    closed: Arc<AtomicBool>,
) -> Result<()>
where
    Si: Sink<ExtensionMessage> + Send + Unpin + 'static,
    Si::Error: std::fmt::Display,
    St: Stream<Item = Result<ExtensionMessage>> + Send + Unpin + 'static,
{
    let mut stream = stream.fuse();

    let result = loop {
        futures::select! {
            outgoing = outbound_rx.next() => {
                match outgoing {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            break Err(BridgeError::transport(e.to_string()));
                        }
                    }
                    // All bridge handles dropped
                    None => break Ok(()),
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(message)) => route(&pending, message).await,
                    Some(Err(e)) => {
                        warn!("Extension stream error: {}", e);
                        break Err(e);
                    }
                    None => {
                        debug!("Extension stream ended");
                        break Ok(());
                    }
                }
            }
        }
    };

    // Fail every outstanding waiter: dropping the senders closes their
    // channels, which callers surface as StreamClosed.
    closed.store(true, Ordering::SeqCst);
    pending.lock().unwrap().clear();

    result
}

async fn route(pending: &Pending, message: ExtensionMessage) {
    let sender = pending
        .lock()
        .unwrap()
        .get(&message.request_id)
        .cloned();

    match sender {
        Some(sender) => {
            // Blocks the dispatcher when the caller is more than a burst
            // budget behind.
            let _ = sender.send(message).await;
        }
        None => {
            warn!(
                "Dropping message for unknown request id {}",
                message.request_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory transport pair: the test plays the extension side
    fn test_bridge() -> (
        ExtensionBridge,
        mpsc::UnboundedReceiver<ExtensionMessage>,
        mpsc::UnboundedSender<Result<ExtensionMessage>>,
    ) {
        let (to_ext_tx, to_ext_rx) = mpsc::unbounded();
        let (from_ext_tx, from_ext_rx) = mpsc::unbounded();
        let (bridge, driver) = ExtensionBridge::start(to_ext_tx, from_ext_rx);
        smol::spawn(driver).detach();
        (bridge, to_ext_rx, from_ext_tx)
    }

    fn is_initialize_response(message: &ExtensionMessage) -> bool {
        matches!(message.body, MessageBody::InitializeResponse {})
    }

    #[smol_potat::test]
    async fn test_call_round_trip() {
        let (bridge, mut requests, responses) = test_bridge();

        let call = smol::spawn({
            let bridge = bridge.clone();
            async move {
                bridge
                    .call(
                        MessageBody::EndpointsResponse { endpoints: vec![] },
                        is_initialize_response,
                        None,
                        &CancelToken::none(),
                    )
                    .await
            }
        });

        let request = requests.next().await.unwrap();
        responses
            .unbounded_send(Ok(ExtensionMessage::response(
                &request.request_id,
                MessageBody::InitializeResponse {},
            )))
            .unwrap();

        let response = call.await.unwrap();
        assert_eq!(response.request_id, request.request_id);
    }

    #[smol_potat::test]
    async fn test_extension_error_is_returned_verbatim() {
        let (bridge, mut requests, responses) = test_bridge();

        let call = smol::spawn({
            let bridge = bridge.clone();
            async move {
                bridge
                    .call(
                        MessageBody::InitializeResponse {},
                        is_initialize_response,
                        None,
                        &CancelToken::none(),
                    )
                    .await
            }
        });

        let request = requests.next().await.unwrap();
        responses
            .unbounded_send(Ok(ExtensionMessage::response(
                &request.request_id,
                MessageBody::InitializeResponse {},
            )
            .with_error("registry unavailable", None)))
            .unwrap();

        let err = call.await.unwrap_err();
        assert!(
            matches!(err, BridgeError::Extension { message, .. } if message == "registry unavailable")
        );
    }

    #[smol_potat::test]
    async fn test_stream_close_fails_outstanding_calls() {
        let (bridge, mut requests, responses) = test_bridge();

        let call = smol::spawn({
            let bridge = bridge.clone();
            async move {
                bridge
                    .call(
                        MessageBody::InitializeResponse {},
                        is_initialize_response,
                        None,
                        &CancelToken::none(),
                    )
                    .await
            }
        });

        let _request = requests.next().await.unwrap();
        drop(responses);

        let err = call.await.unwrap_err();
        assert!(matches!(err, BridgeError::StreamClosed));
        assert!(bridge.is_closed());
    }

    #[smol_potat::test]
    async fn test_cancellation_frees_the_entry() {
        let (bridge, mut requests, _responses) = test_bridge();
        let (source, token) = toolchain_exec::cancel_pair();

        let call = smol::spawn({
            let bridge = bridge.clone();
            async move {
                bridge
                    .call(
                        MessageBody::InitializeResponse {},
                        is_initialize_response,
                        None,
                        &token,
                    )
                    .await
            }
        });

        let _request = requests.next().await.unwrap();
        source.cancel();

        let err = call.await.unwrap_err();
        assert!(matches!(err, BridgeError::Cancelled));
        assert!(bridge.pending.lock().unwrap().is_empty());
    }
}
