//! Script executor: a sandboxed script owns the whole interaction through
//! the connection capability.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::connection::Transport;
use crate::errors::{ExecutionError, ExecutionResult};
use crate::frame::ResultFrame;
use crate::script::{ScriptConnection, ScriptSandbox};

pub(super) async fn execute(
    transport: Arc<dyn Transport>,
    source: String,
    budget: Duration,
) -> ExecutionResult<Vec<ResultFrame>> {
    let sandbox = ScriptSandbox::compile(&source)?;
    let conn = ScriptConnection::new(transport, Handle::current());

    tokio::task::spawn_blocking(move || sandbox.run_connection(conn, budget))
        .await
        .map_err(|err| ExecutionError::ScriptError(format!("script task failed: {err}")))?
}
