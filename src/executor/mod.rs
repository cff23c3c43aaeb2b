//! # Mode Executors
//!
//! The query dispatcher and the three interaction-mode executors. The
//! dispatcher validates the definition, picks the executor for the query's
//! mode, and bounds non-streaming executions to the declared timeout plus a
//! fixed grace margin. Subscribe-mode executions stream instead; their
//! timeout only gates the time to the first message.

mod request_reply;
mod script;
mod subscribe;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connection::Transport;
use crate::errors::{ExecutionError, ExecutionResult};
use crate::frame::ResultFrame;
use crate::message::NatsMessage;
use crate::query::{QueryDefinition, QueryType};
use crate::script::{ScriptConnection, ScriptSandbox};

pub use subscribe::{SubscribeEvent, SubscribeStream};

/// Slack added on top of the declared timeout before the dispatcher
/// forcibly cancels a non-streaming execution
pub const TIMEOUT_GRACE: Duration = Duration::from_millis(500);

/// Lifecycle of one query execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// What a query execution hands back to the caller
pub enum QueryOutput {
    /// Complete result of a Request/Reply or Script execution
    Frames(Vec<ResultFrame>),
    /// Live emission stream of a Subscribe execution
    Stream(SubscribeStream),
}

impl fmt::Debug for QueryOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOutput::Frames(frames) => f.debug_tuple("Frames").field(frames).finish(),
            QueryOutput::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
        }
    }
}

impl QueryOutput {
    pub fn into_frames(self) -> Option<Vec<ResultFrame>> {
        match self {
            QueryOutput::Frames(frames) => Some(frames),
            QueryOutput::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<SubscribeStream> {
        match self {
            QueryOutput::Stream(stream) => Some(stream),
            QueryOutput::Frames(_) => None,
        }
    }
}

/// Dispatches query definitions to mode executors over a shared transport
pub struct QueryEngine {
    transport: Arc<dyn Transport>,
}

impl QueryEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Validates and executes one query.
    ///
    /// Fails with `InvalidQuery` before anything touches the network. For
    /// Request/Reply and Script the returned frames are complete; for
    /// Subscribe the returned stream emits until cancelled.
    pub async fn execute(&self, query: &QueryDefinition) -> ExecutionResult<QueryOutput> {
        let budget = query.validate()?;
        let execution_id = Uuid::new_v4();
        debug!(
            %execution_id,
            mode = ?query.query_type,
            subject = %query.subject,
            ?budget,
            "executing query"
        );

        let outcome = match query.query_type {
            QueryType::RequestReply => {
                let task =
                    request_reply::execute(Arc::clone(&self.transport), query.clone(), budget);
                bounded(budget, task).await.map(QueryOutput::Frames)
            }
            QueryType::Script => {
                let task =
                    script::execute(Arc::clone(&self.transport), query.script.clone(), budget);
                bounded(budget, task).await.map(QueryOutput::Frames)
            }
            QueryType::Subscribe => {
                subscribe::execute(Arc::clone(&self.transport), query.clone(), budget)
                    .await
                    .map(QueryOutput::Stream)
            }
        };

        if let Err(err) = &outcome {
            warn!(%execution_id, subject = %query.subject, error = %err, "query failed");
        }
        outcome
    }
}

/// Caps a non-streaming execution at the budget plus [`TIMEOUT_GRACE`]
async fn bounded<F>(budget: Duration, task: F) -> ExecutionResult<Vec<ResultFrame>>
where
    F: Future<Output = ExecutionResult<Vec<ResultFrame>>>,
{
    match tokio::time::timeout(budget + TIMEOUT_GRACE, task).await {
        Ok(result) => result,
        Err(_) => Err(ExecutionError::Timeout(budget)),
    }
}

/// Applies the per-message mapping shared by Request/Reply and Subscribe:
/// the default JSON mapping when no sandbox is given, otherwise one script
/// run with the message bound as `msg`.
async fn map_message(
    transport: &Arc<dyn Transport>,
    sandbox: Option<&Arc<ScriptSandbox>>,
    message: NatsMessage,
    budget: Duration,
) -> ExecutionResult<Vec<ResultFrame>> {
    match sandbox {
        None => Ok(vec![crate::frame::builder::frame_from_payload(
            &message.data,
        )?]),
        Some(sandbox) => {
            let sandbox = Arc::clone(sandbox);
            let conn = ScriptConnection::new(Arc::clone(transport), Handle::current());
            // Scripts are synchronous and may block on capability calls,
            // so they run off the async worker threads.
            tokio::task::spawn_blocking(move || sandbox.run_message(&message, conn, budget))
                .await
                .map_err(|err| ExecutionError::ScriptError(format!("script task failed: {err}")))?
        }
    }
}
