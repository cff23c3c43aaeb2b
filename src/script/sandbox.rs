//! Sandboxed script evaluation.
//!
//! One `ScriptSandbox` wraps a compiled script. Each run gets a fresh scope
//! (no state leaks across invocations) and a wall-clock deadline enforced
//! through the engine's progress hook.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rhai::{Dynamic, Engine, EvalAltResult, Position, Scope, AST};
use serde_json::Value;

use crate::connection::TransportFailure;
use crate::errors::{ExecutionError, ExecutionResult};
use crate::frame::{builder, ResultFrame};
use crate::message::{Header, NatsMessage};

use super::capability::{ScriptConnection, ScriptMessage, ScriptSubscription};
use super::convert;

/// A compiled user script plus the engine it runs on
pub struct ScriptSandbox {
    engine: Engine,
    ast: AST,
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl fmt::Debug for ScriptSandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptSandbox").finish_non_exhaustive()
    }
}

impl ScriptSandbox {
    /// Compiles the script source.
    ///
    /// A parse failure is structural: it would recur on every message, so
    /// it is reported as a fatal `ScriptError`.
    pub fn compile(source: &str) -> ExecutionResult<Self> {
        let deadline = Arc::new(Mutex::new(None));
        let engine = build_engine(Arc::clone(&deadline));
        let ast = engine
            .compile(source)
            .map_err(|err| ExecutionError::ScriptError(format!("compile error: {err}")))?;

        Ok(Self {
            engine,
            ast,
            deadline,
        })
    }

    /// Runs the script against one message (`msg` bound in scope)
    pub fn run_message(
        &self,
        message: &NatsMessage,
        conn: ScriptConnection,
        budget: Duration,
    ) -> ExecutionResult<Vec<ResultFrame>> {
        let mut scope = Scope::new();
        scope.push("msg", ScriptMessage::from(message.clone()));
        self.run(scope, conn, budget)
    }

    /// Runs the script with only the connection capability (SCRIPT mode)
    pub fn run_connection(
        &self,
        conn: ScriptConnection,
        budget: Duration,
    ) -> ExecutionResult<Vec<ResultFrame>> {
        self.run(Scope::new(), conn, budget)
    }

    fn run(
        &self,
        mut scope: Scope,
        conn: ScriptConnection,
        budget: Duration,
    ) -> ExecutionResult<Vec<ResultFrame>> {
        scope.push("conn", conn.clone());

        *self.deadline.lock().unwrap() = Some(Instant::now() + budget);
        let outcome = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast);
        *self.deadline.lock().unwrap() = None;

        match outcome {
            Ok(value) => convert::frames_from_dynamic(value),
            Err(err) => Err(classify_eval_error(*err, &conn, budget)),
        }
    }
}

/// Maps an evaluation failure onto the execution taxonomy: deadline
/// termination is `Timeout`, a propagating connection-level failure is
/// `TransportError`, everything else is the script author's problem.
fn classify_eval_error(
    err: EvalAltResult,
    conn: &ScriptConnection,
    budget: Duration,
) -> ExecutionError {
    if matches!(err, EvalAltResult::ErrorTerminated(..)) {
        return ExecutionError::Timeout(budget);
    }
    // Reclassify only when the failure a capability call raised is what
    // actually propagated. A script that caught the failure and raised its
    // own error afterwards is a script error, not an outage report.
    if let Some(failure) = conn.take_failure() {
        if propagated_from(&err, &failure) {
            return ExecutionError::TransportError(failure.to_string());
        }
    }
    ExecutionError::ScriptError(err.to_string())
}

fn propagated_from(err: &EvalAltResult, failure: &TransportFailure) -> bool {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => value
            .clone()
            .into_immutable_string()
            .map_or(false, |raised| raised.as_str() == failure.to_string()),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => propagated_from(inner, failure),
        _ => false,
    }
}

fn build_engine(deadline: Arc<Mutex<Option<Instant>>>) -> Engine {
    let mut engine = Engine::new();

    engine.on_progress(move |_operations| {
        let expired = deadline
            .lock()
            .unwrap()
            .map(|at| Instant::now() >= at)
            .unwrap_or(false);
        if expired {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });

    engine
        .register_type_with_name::<ScriptMessage>("Message")
        .register_get_set(
            "subject",
            |m: &mut ScriptMessage| m.subject.clone(),
            |m: &mut ScriptMessage, v: String| m.subject = v,
        )
        .register_get_set(
            "reply",
            |m: &mut ScriptMessage| m.reply.clone(),
            |m: &mut ScriptMessage, v: String| m.reply = v,
        )
        .register_get_set(
            "data",
            |m: &mut ScriptMessage| m.data.clone(),
            |m: &mut ScriptMessage, v: String| m.data = v,
        )
        .register_get("header", |m: &mut ScriptMessage| m.header.clone());

    engine
        .register_type_with_name::<Header>("Header")
        .register_fn("get", |header: &mut Header, key: &str| match header.get(key) {
            Some(value) => Dynamic::from(value.to_string()),
            None => Dynamic::UNIT,
        })
        .register_fn("values", |header: &mut Header, key: &str| -> rhai::Array {
            header
                .values(key)
                .iter()
                .map(|value| Dynamic::from(value.clone()))
                .collect()
        });

    engine
        .register_type_with_name::<ScriptConnection>("Connection")
        .register_fn("request", ScriptConnection::request)
        .register_fn("publish", ScriptConnection::publish)
        .register_fn("publish_request", ScriptConnection::publish_request)
        .register_fn("publish_message", ScriptConnection::publish_message)
        .register_fn("subscribe_sync", ScriptConnection::subscribe_sync)
        .register_fn("new_inbox", ScriptConnection::new_inbox);

    engine
        .register_type_with_name::<ScriptSubscription>("Subscription")
        .register_fn("next_message", ScriptSubscription::next_message)
        .register_fn("unsubscribe", ScriptSubscription::unsubscribe);

    engine
        .register_type_with_name::<ResultFrame>("Frame")
        .register_fn("new_frame", |name: &str| ResultFrame::new(name))
        .register_fn(
            "push_row",
            |frame: &mut ResultFrame, row: rhai::Map| -> Result<(), Box<EvalAltResult>> {
                let value: Value = rhai::serde::from_dynamic(&Dynamic::from(row))
                    .map_err(|err| runtime_error(err.to_string()))?;
                match value {
                    Value::Object(map) => {
                        frame.push_row(builder::row_from_object(map));
                        Ok(())
                    }
                    _ => Err(runtime_error("push_row expects a row map".to_string())),
                }
            },
        );

    engine.register_fn("new_message", ScriptMessage::new);

    engine.register_fn(
        "parse_json",
        |text: &str| -> Result<Dynamic, Box<EvalAltResult>> {
            let value: Value = serde_json::from_str(text)
                .map_err(|err| runtime_error(format!("invalid JSON: {err}")))?;
            rhai::serde::to_dynamic(value).map_err(|err| runtime_error(err.to_string()))
        },
    );
    engine.register_fn(
        "to_json",
        |value: Dynamic| -> Result<String, Box<EvalAltResult>> {
            let json: Value = rhai::serde::from_dynamic(&value)
                .map_err(|err| runtime_error(err.to_string()))?;
            Ok(json.to_string())
        },
    );

    engine
}

fn runtime_error(message: String) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(message.into(), Position::NONE))
}
