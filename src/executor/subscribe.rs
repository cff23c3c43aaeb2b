//! Subscribe executor: a long-lived subscription streaming one emission per
//! received message.
//!
//! The declared timeout gates only the time to the first message; after that
//! the stream is unbounded until the caller cancels. The subscription handle
//! is released on every exit path.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::connection::{MessageStream, Transport};
use crate::errors::{ExecutionError, ExecutionResult};
use crate::frame::ResultFrame;
use crate::message::NatsMessage;
use crate::query::QueryDefinition;
use crate::script::ScriptSandbox;

use super::{map_message, ExecutionState};

/// One emission from a Subscribe-mode execution
#[derive(Debug)]
pub enum SubscribeEvent {
    /// A mapped frame for one received message
    Frame(ResultFrame),
    /// A per-message or terminal error; only terminal errors close the stream
    Error(ExecutionError),
}

/// Handle to a live Subscribe-mode execution
pub struct SubscribeStream {
    receiver: mpsc::UnboundedReceiver<SubscribeEvent>,
    cancel: watch::Sender<bool>,
    state: Arc<Mutex<ExecutionState>>,
    task: JoinHandle<()>,
}

impl SubscribeStream {
    /// Awaits the next emission; `None` means the execution has ended and
    /// the subscription has been released
    pub async fn next_event(&mut self) -> Option<SubscribeEvent> {
        self.receiver.recv().await
    }

    /// Signals cancellation; observed at the next message boundary
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Current lifecycle state of the execution
    pub fn state(&self) -> ExecutionState {
        *self.state.lock().unwrap()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl fmt::Debug for SubscribeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeStream")
            .field("state", &self.state())
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl Drop for SubscribeStream {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

pub(super) async fn execute(
    transport: Arc<dyn Transport>,
    query: QueryDefinition,
    budget: Duration,
) -> ExecutionResult<SubscribeStream> {
    // A script that does not compile would fail on every message; reject
    // before the subscription is opened.
    let sandbox = if query.script.trim().is_empty() {
        None
    } else {
        Some(Arc::new(ScriptSandbox::compile(&query.script)?))
    };

    let stream = transport
        .subscribe(&query.subject)
        .await
        .map_err(|failure| ExecutionError::TransportError(failure.to_string()))?;

    let (sender, receiver) = mpsc::unbounded_channel();
    let (cancel, cancelled) = watch::channel(false);
    let state = Arc::new(Mutex::new(ExecutionState::Running));

    let task = tokio::spawn(run(
        transport,
        stream,
        sandbox,
        budget,
        query.subject.clone(),
        sender,
        cancelled,
        Arc::clone(&state),
    ));

    Ok(SubscribeStream {
        receiver,
        cancel,
        state,
        task,
    })
}

#[allow(clippy::too_many_arguments)]
async fn run(
    transport: Arc<dyn Transport>,
    mut stream: Box<dyn MessageStream>,
    sandbox: Option<Arc<ScriptSandbox>>,
    budget: Duration,
    subject: String,
    sender: mpsc::UnboundedSender<SubscribeEvent>,
    mut cancelled: watch::Receiver<bool>,
    state: Arc<Mutex<ExecutionState>>,
) {
    let mut gate = Some(budget);
    let final_state = 'run: loop {
        let waited = tokio::select! {
            _ = cancelled.changed() => {
                let _ = sender.send(SubscribeEvent::Error(ExecutionError::Cancelled));
                break 'run ExecutionState::Cancelled;
            }
            waited = next_within(stream.as_mut(), gate) => waited,
        };

        match waited {
            Waited::Message(message) => {
                gate = None;
                match map_message(&transport, sandbox.as_ref(), message, budget).await {
                    Ok(frames) => {
                        for frame in frames {
                            if sender.send(SubscribeEvent::Frame(frame)).is_err() {
                                break 'run ExecutionState::Cancelled;
                            }
                        }
                    }
                    Err(err) => {
                        let fatal = err.is_fatal_for_subscription();
                        let _ = sender.send(SubscribeEvent::Error(err));
                        if fatal {
                            break 'run ExecutionState::Failed;
                        }
                    }
                }
            }
            Waited::GateExpired(limit) => {
                let _ = sender.send(SubscribeEvent::Error(ExecutionError::Timeout(limit)));
                break 'run ExecutionState::Failed;
            }
            Waited::Ended => break 'run ExecutionState::Succeeded,
        }
    };

    if stream.unsubscribe().await.is_err() {
        debug!(%subject, "failed to release subscription");
    }
    *state.lock().unwrap() = final_state;
}

enum Waited {
    Message(NatsMessage),
    GateExpired(Duration),
    Ended,
}

async fn next_within(stream: &mut dyn MessageStream, gate: Option<Duration>) -> Waited {
    match gate {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(Some(message)) => Waited::Message(message),
            Ok(None) => Waited::Ended,
            Err(_) => Waited::GateExpired(limit),
        },
        None => match stream.next().await {
            Some(message) => Waited::Message(message),
            None => Waited::Ended,
        },
    }
}
