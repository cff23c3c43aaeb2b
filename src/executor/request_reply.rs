//! Request/Reply executor: one empty-payload request, one awaited reply.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::connection::Transport;
use crate::errors::{ExecutionError, ExecutionResult};
use crate::frame::ResultFrame;
use crate::query::QueryDefinition;
use crate::script::ScriptSandbox;

use super::map_message;

pub(super) async fn execute(
    transport: Arc<dyn Transport>,
    query: QueryDefinition,
    budget: Duration,
) -> ExecutionResult<Vec<ResultFrame>> {
    let sandbox = if query.script.trim().is_empty() {
        None
    } else {
        Some(Arc::new(ScriptSandbox::compile(&query.script)?))
    };

    let outcome =
        tokio::time::timeout(budget, transport.request(&query.subject, Bytes::new())).await;

    let message = match outcome {
        Err(_) => return Err(no_response(&query.subject, budget)),
        // Zero responders is the same reportable outcome as silence.
        Ok(Err(failure)) if failure.is_no_reply() => {
            return Err(no_response(&query.subject, budget))
        }
        Ok(Err(failure)) => return Err(ExecutionError::TransportError(failure.to_string())),
        Ok(Ok(message)) => message,
    };

    map_message(&transport, sandbox.as_ref(), message, budget).await
}

fn no_response(subject: &str, timeout: Duration) -> ExecutionError {
    ExecutionError::NoResponse {
        subject: subject.to_string(),
        timeout,
    }
}
