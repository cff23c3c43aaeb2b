//! A single NATS message as produced by the transport layer.

use bytes::Bytes;

use super::header::Header;

/// A received or outgoing NATS message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NatsMessage {
    /// Subject the message was published on
    pub subject: String,

    /// Reply subject for correlated responses, if any
    pub reply: Option<String>,

    /// Header multimap (empty when the message carried no headers)
    pub header: Header,

    /// Raw payload bytes
    pub data: Bytes,
}

impl NatsMessage {
    /// Creates a message with an empty payload on the given subject
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Creates a message with the given payload
    pub fn with_payload(subject: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            data: data.into(),
            ..Self::default()
        }
    }

    /// Sets the reply subject
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Sets a header value
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.append(key, value);
        self
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<async_nats::Message> for NatsMessage {
    fn from(message: async_nats::Message) -> Self {
        let mut header = Header::new();
        if let Some(headers) = &message.headers {
            for (name, values) in headers.iter() {
                for value in values {
                    header.append(name.to_string(), value.to_string());
                }
            }
        }

        Self {
            subject: message.subject.to_string(),
            reply: message.reply.as_ref().map(|r| r.to_string()),
            header,
            data: message.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_style_construction() {
        let msg = NatsMessage::with_payload("stats.node1", r#"{"a":1}"#)
            .with_reply("_INBOX.abc")
            .with_header("My-Header", "x");

        assert_eq!(msg.subject, "stats.node1");
        assert_eq!(msg.reply.as_deref(), Some("_INBOX.abc"));
        assert_eq!(msg.header.get("My-Header"), Some("x"));
        assert_eq!(msg.len(), 7);
    }

    #[test]
    fn test_empty_message() {
        let msg = NatsMessage::new("events.>");
        assert!(msg.is_empty());
        assert!(msg.reply.is_none());
        assert!(msg.header.is_empty());
    }
}
