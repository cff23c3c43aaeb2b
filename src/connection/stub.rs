//! Stubbed transport for testing (no live NATS cluster).
//!
//! Records every transport interaction in an ordered journal so tests can
//! assert protocol ordering, e.g. that an inbox subscription exists before
//! the correlated request is published.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::message::NatsMessage;

use super::transport::{MessageStream, Transport, TransportFailure};

/// One recorded transport interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubEvent {
    /// A subscription was opened on the subject
    Subscribed(String),
    /// A subscription on the subject was released
    Unsubscribed(String),
    /// A message was published
    Published {
        subject: String,
        reply: Option<String>,
    },
    /// A request/reply round-trip was issued
    Requested(String),
}

#[derive(Default)]
struct StubState {
    /// Canned reply payloads per request subject
    responders: HashMap<String, NatsMessage>,
    /// Request subjects that never answer
    silent: Vec<String>,
    /// Per-subject fan-in payloads delivered to the reply inbox on publish
    fanout: HashMap<String, Vec<Bytes>>,
    /// Open subscriptions by exact subject
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<NatsMessage>>>,
    /// When set, every operation fails at the connection level
    connection_down: bool,
}

/// Stub transport for tests, mirroring the production transport's contract
#[derive(Clone, Default)]
pub struct StubTransport {
    state: Arc<Mutex<StubState>>,
    journal: Arc<Mutex<Vec<StubEvent>>>,
    inbox_counter: Arc<AtomicUsize>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a canned reply for requests on `subject`
    pub fn respond_to(&self, subject: impl Into<String>, reply: NatsMessage) {
        self.state
            .lock()
            .unwrap()
            .responders
            .insert(subject.into(), reply);
    }

    /// Registers a canned JSON reply payload for requests on `subject`
    pub fn respond_with_payload(&self, subject: impl Into<String>, payload: impl Into<Bytes>) {
        let subject = subject.into();
        let reply = NatsMessage::with_payload(subject.clone(), payload);
        self.respond_to(subject, reply);
    }

    /// Marks `subject` as never answering requests
    pub fn stay_silent_on(&self, subject: impl Into<String>) {
        self.state.lock().unwrap().silent.push(subject.into());
    }

    /// When a request is later published on `subject` with a reply inbox,
    /// each payload is delivered to that inbox as a separate message
    pub fn fan_out_on_request(&self, subject: impl Into<String>, payloads: Vec<Bytes>) {
        self.state
            .lock()
            .unwrap()
            .fanout
            .insert(subject.into(), payloads);
    }

    /// Simulates a connection-level outage
    pub fn take_connection_down(&self) {
        self.state.lock().unwrap().connection_down = true;
    }

    /// Delivers a message to current subscribers of its subject
    pub fn inject(&self, message: NatsMessage) {
        Self::deliver(&mut self.state.lock().unwrap(), message);
    }

    /// Snapshot of the interaction journal
    pub fn events(&self) -> Vec<StubEvent> {
        self.journal.lock().unwrap().clone()
    }

    /// Number of live subscriptions on the subject
    pub fn subscriber_count(&self, subject: &str) -> usize {
        let mut state = self.state.lock().unwrap();
        if let Some(senders) = state.subscribers.get_mut(subject) {
            senders.retain(|sender| !sender.is_closed());
            senders.len()
        } else {
            0
        }
    }

    fn record(&self, event: StubEvent) {
        self.journal.lock().unwrap().push(event);
    }

    fn deliver(state: &mut StubState, message: NatsMessage) {
        if let Some(senders) = state.subscribers.get_mut(&message.subject) {
            senders.retain(|sender| sender.send(message.clone()).is_ok());
        }
    }

    fn ensure_up(&self) -> Result<(), TransportFailure> {
        if self.state.lock().unwrap().connection_down {
            Err(TransportFailure::Connection(
                "connection refused by stub".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn request(
        &self,
        subject: &str,
        _payload: Bytes,
    ) -> Result<NatsMessage, TransportFailure> {
        self.record(StubEvent::Requested(subject.to_string()));
        self.ensure_up()?;

        let (reply, silent) = {
            let state = self.state.lock().unwrap();
            (
                state.responders.get(subject).cloned(),
                state.silent.iter().any(|s| s == subject),
            )
        };

        if silent {
            // Outlives any sane per-request timeout; the executor cancels us.
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Err(TransportFailure::RequestTimedOut(subject.to_string()));
        }

        reply.ok_or_else(|| TransportFailure::NoResponders(subject.to_string()))
    }

    async fn publish(&self, message: NatsMessage) -> Result<(), TransportFailure> {
        self.record(StubEvent::Published {
            subject: message.subject.clone(),
            reply: message.reply.clone(),
        });
        self.ensure_up()?;

        let mut state = self.state.lock().unwrap();

        // Fan-in scenario: replies land on the request's reply inbox.
        if let Some(reply) = &message.reply {
            if let Some(payloads) = state.fanout.get(&message.subject).cloned() {
                for payload in payloads {
                    Self::deliver(&mut state, NatsMessage::with_payload(reply.clone(), payload));
                }
                return Ok(());
            }
        }

        Self::deliver(&mut state, message);
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
    ) -> Result<Box<dyn MessageStream>, TransportFailure> {
        self.ensure_up()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        self.state
            .lock()
            .unwrap()
            .subscribers
            .entry(subject.to_string())
            .or_default()
            .push(sender);
        self.record(StubEvent::Subscribed(subject.to_string()));

        Ok(Box::new(StubStream {
            subject: subject.to_string(),
            receiver,
            journal: Arc::clone(&self.journal),
        }))
    }

    fn new_inbox(&self) -> String {
        let n = self.inbox_counter.fetch_add(1, Ordering::Relaxed);
        format!("_INBOX.stub.{n}")
    }

    async fn check(&self) -> Result<(), TransportFailure> {
        self.ensure_up()
    }
}

struct StubStream {
    subject: String,
    receiver: mpsc::UnboundedReceiver<NatsMessage>,
    journal: Arc<Mutex<Vec<StubEvent>>>,
}

#[async_trait]
impl MessageStream for StubStream {
    async fn next(&mut self) -> Option<NatsMessage> {
        self.receiver.recv().await
    }

    async fn unsubscribe(&mut self) -> Result<(), TransportFailure> {
        self.receiver.close();
        self.journal
            .lock()
            .unwrap()
            .push(StubEvent::Unsubscribed(self.subject.clone()));
        Ok(())
    }
}
