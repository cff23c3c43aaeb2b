//! Transport trait seam and the production `async-nats` implementation.
//!
//! Executors and the script capability run against [`Transport`] /
//! [`MessageStream`] so tests can substitute a stub without a live cluster.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;

use crate::message::{Header, NatsMessage};

/// Transport-level failures, kept separate from the execution taxonomy so
/// executors can classify them (no-reply vs. connection-level).
#[derive(Debug, Clone, Error)]
pub enum TransportFailure {
    /// The cluster reported no responders for the subject
    #[error("no responders on subject '{0}'")]
    NoResponders(String),

    /// The request produced no reply in time
    #[error("request on subject '{0}' timed out")]
    RequestTimedOut(String),

    /// Connection-level failure (disconnect, auth rejection)
    #[error("connection failure: {0}")]
    Connection(String),
}

impl TransportFailure {
    /// True for the "nobody answered" outcomes, which executors report as
    /// `NoResponse` rather than `TransportError`
    pub fn is_no_reply(&self) -> bool {
        matches!(
            self,
            TransportFailure::NoResponders(_) | TransportFailure::RequestTimedOut(_)
        )
    }
}

/// One query execution's view of the NATS connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes a request and awaits a single reply
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> Result<NatsMessage, TransportFailure>;

    /// Publishes a message, honoring its reply subject and headers
    async fn publish(&self, message: NatsMessage) -> Result<(), TransportFailure>;

    /// Opens a subscription; the caller owns the returned stream and must
    /// release it on every exit path
    async fn subscribe(&self, subject: &str)
        -> Result<Box<dyn MessageStream>, TransportFailure>;

    /// Generates a unique, ephemeral inbox subject
    fn new_inbox(&self) -> String;

    /// Round-trips the connection to verify it is alive
    async fn check(&self) -> Result<(), TransportFailure>;
}

/// An open subscription handle
#[async_trait]
pub trait MessageStream: Send {
    /// Awaits the next message; `None` means the subscription closed
    async fn next(&mut self) -> Option<NatsMessage>;

    /// Releases the subscription
    async fn unsubscribe(&mut self) -> Result<(), TransportFailure>;
}

/// Production transport backed by an `async-nats` client
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    /// Wraps an established client
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Access to the underlying client
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> Result<NatsMessage, TransportFailure> {
        match self.client.request(subject.to_string(), payload).await {
            Ok(message) => Ok(message.into()),
            Err(err) => match err.kind() {
                async_nats::RequestErrorKind::NoResponders => {
                    Err(TransportFailure::NoResponders(subject.to_string()))
                }
                async_nats::RequestErrorKind::TimedOut => {
                    Err(TransportFailure::RequestTimedOut(subject.to_string()))
                }
                async_nats::RequestErrorKind::Other => {
                    Err(TransportFailure::Connection(err.to_string()))
                }
            },
        }
    }

    async fn publish(&self, message: NatsMessage) -> Result<(), TransportFailure> {
        let subject = message.subject.clone();
        let headers = if message.header.is_empty() {
            None
        } else {
            Some(to_header_map(&message.header))
        };

        let result = match (message.reply, headers) {
            (Some(reply), Some(headers)) => {
                self.client
                    .publish_with_reply_and_headers(subject, reply, headers, message.data)
                    .await
            }
            (Some(reply), None) => {
                self.client
                    .publish_with_reply(subject, reply, message.data)
                    .await
            }
            (None, Some(headers)) => {
                self.client
                    .publish_with_headers(subject, headers, message.data)
                    .await
            }
            (None, None) => self.client.publish(subject, message.data).await,
        };

        result.map_err(|err| TransportFailure::Connection(err.to_string()))
    }

    async fn subscribe(
        &self,
        subject: &str,
    ) -> Result<Box<dyn MessageStream>, TransportFailure> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|err| TransportFailure::Connection(err.to_string()))?;
        Ok(Box::new(NatsMessageStream { inner: subscriber }))
    }

    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }

    async fn check(&self) -> Result<(), TransportFailure> {
        self.client
            .flush()
            .await
            .map_err(|err| TransportFailure::Connection(err.to_string()))
    }
}

struct NatsMessageStream {
    inner: async_nats::Subscriber,
}

#[async_trait]
impl MessageStream for NatsMessageStream {
    async fn next(&mut self) -> Option<NatsMessage> {
        self.inner.next().await.map(Into::into)
    }

    async fn unsubscribe(&mut self) -> Result<(), TransportFailure> {
        self.inner
            .unsubscribe()
            .await
            .map_err(|err| TransportFailure::Connection(err.to_string()))
    }
}

fn to_header_map(header: &Header) -> async_nats::HeaderMap {
    let mut map = async_nats::HeaderMap::new();
    for (key, values) in header.iter() {
        for value in values {
            map.append(key.as_str(), value.as_str());
        }
    }
    map
}
