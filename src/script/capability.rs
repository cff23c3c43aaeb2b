//! Capability objects handed to user scripts.
//!
//! Each object bridges the synchronous script thread onto the async
//! transport via a runtime handle; every blocking call is individually
//! timeout-bounded. Connection-level transport failures are recorded on the
//! capability so an uncaught script error can be re-classified as
//! `TransportError` instead of `ScriptError`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use rhai::{Dynamic, EvalAltResult, Position};
use tokio::runtime::Handle;

use crate::connection::{MessageStream, Transport, TransportFailure};
use crate::message::{Header, NatsMessage};
use crate::query::parse_duration;

/// A message as seen by scripts: payload exposed as a string
#[derive(Debug, Clone, Default)]
pub struct ScriptMessage {
    pub subject: String,
    pub reply: String,
    pub header: Header,
    pub data: String,
}

impl ScriptMessage {
    /// Constructor bound as `new_message(subject)`
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            ..Self::default()
        }
    }
}

impl From<NatsMessage> for ScriptMessage {
    fn from(message: NatsMessage) -> Self {
        Self {
            subject: message.subject,
            reply: message.reply.unwrap_or_default(),
            header: message.header,
            data: String::from_utf8_lossy(&message.data).into_owned(),
        }
    }
}

impl From<ScriptMessage> for NatsMessage {
    fn from(message: ScriptMessage) -> Self {
        Self {
            subject: message.subject,
            reply: if message.reply.is_empty() {
                None
            } else {
                Some(message.reply)
            },
            header: message.header,
            data: Bytes::from(message.data.into_bytes()),
        }
    }
}

/// Connection capability passed into the script scope as `conn`.
///
/// Every call bridges onto the async runtime with `Handle::block_on`, which
/// requires the script to run on a blocking thread of a multi-thread
/// runtime. On a current-thread runtime a capability call would wedge the
/// thread until its own per-call timeout expires.
#[derive(Clone)]
pub struct ScriptConnection {
    transport: Arc<dyn Transport>,
    handle: Handle,
    failure: Arc<Mutex<Option<TransportFailure>>>,
}

impl ScriptConnection {
    pub fn new(transport: Arc<dyn Transport>, handle: Handle) -> Self {
        Self {
            transport,
            handle,
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Takes the recorded connection-level failure, if any
    pub fn take_failure(&self) -> Option<TransportFailure> {
        self.failure.lock().unwrap().take()
    }

    fn record(&self, failure: &TransportFailure) {
        if !failure.is_no_reply() {
            *self.failure.lock().unwrap() = Some(failure.clone());
        }
    }

    fn raise(&self, failure: TransportFailure) -> Box<EvalAltResult> {
        self.record(&failure);
        script_error(failure.to_string())
    }

    pub(crate) fn request(
        &mut self,
        subject: &str,
        payload: &str,
        timeout: &str,
    ) -> Result<ScriptMessage, Box<EvalAltResult>> {
        let duration = parse_timeout(timeout)?;
        let transport = Arc::clone(&self.transport);
        let payload = Bytes::from(payload.as_bytes().to_vec());
        let subject = subject.to_string();

        let outcome = self.handle.block_on(async move {
            tokio::time::timeout(duration, transport.request(&subject, payload)).await
        });

        match outcome {
            Err(_) => Err(script_error(format!(
                "no reply within {timeout}"
            ))),
            Ok(Err(failure)) => Err(self.raise(failure)),
            Ok(Ok(message)) => Ok(message.into()),
        }
    }

    pub(crate) fn publish(
        &mut self,
        subject: &str,
        payload: &str,
    ) -> Result<(), Box<EvalAltResult>> {
        self.publish_message(ScriptMessage {
            subject: subject.to_string(),
            data: payload.to_string(),
            ..ScriptMessage::default()
        })
    }

    pub(crate) fn publish_request(
        &mut self,
        subject: &str,
        reply: &str,
        payload: &str,
    ) -> Result<(), Box<EvalAltResult>> {
        self.publish_message(ScriptMessage {
            subject: subject.to_string(),
            reply: reply.to_string(),
            data: payload.to_string(),
            ..ScriptMessage::default()
        })
    }

    pub(crate) fn publish_message(
        &mut self,
        message: ScriptMessage,
    ) -> Result<(), Box<EvalAltResult>> {
        let transport = Arc::clone(&self.transport);
        let message: NatsMessage = message.into();

        let outcome = self
            .handle
            .block_on(async move { transport.publish(message).await });

        outcome.map_err(|failure| self.raise(failure))
    }

    pub(crate) fn subscribe_sync(
        &mut self,
        subject: &str,
    ) -> Result<ScriptSubscription, Box<EvalAltResult>> {
        let transport = Arc::clone(&self.transport);
        let subject_owned = subject.to_string();

        let outcome = self
            .handle
            .block_on(async move { transport.subscribe(&subject_owned).await });

        match outcome {
            Ok(stream) => Ok(ScriptSubscription {
                stream: Arc::new(tokio::sync::Mutex::new(stream)),
                handle: self.handle.clone(),
            }),
            Err(failure) => Err(self.raise(failure)),
        }
    }

    pub(crate) fn new_inbox(&mut self) -> String {
        self.transport.new_inbox()
    }
}

/// Subscription capability returned by `conn.subscribe_sync`
#[derive(Clone)]
pub struct ScriptSubscription {
    stream: Arc<tokio::sync::Mutex<Box<dyn MessageStream>>>,
    handle: Handle,
}

impl ScriptSubscription {
    /// Awaits the next message within `timeout`; yields `()` on silence,
    /// which is the loop-termination signal of the polling protocol
    pub(crate) fn next_message(&mut self, timeout: &str) -> Result<Dynamic, Box<EvalAltResult>> {
        let duration = parse_timeout(timeout)?;
        let stream = Arc::clone(&self.stream);

        let outcome = self.handle.block_on(async move {
            let mut stream = stream.lock().await;
            tokio::time::timeout(duration, stream.next()).await
        });

        match outcome {
            Ok(Some(message)) => Ok(Dynamic::from(ScriptMessage::from(message))),
            Ok(None) | Err(_) => Ok(Dynamic::UNIT),
        }
    }

    pub(crate) fn unsubscribe(&mut self) -> Result<(), Box<EvalAltResult>> {
        let stream = Arc::clone(&self.stream);

        self.handle
            .block_on(async move { stream.lock().await.unsubscribe().await })
            .map_err(|failure| script_error(failure.to_string()))
    }
}

fn parse_timeout(timeout: &str) -> Result<Duration, Box<EvalAltResult>> {
    parse_duration(timeout)
        .filter(|d| !d.is_zero())
        .ok_or_else(|| script_error(format!("invalid timeout '{timeout}'")))
}

fn script_error(message: String) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(message.into(), Position::NONE))
}
