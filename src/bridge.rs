//! Line-delimited JSON-RPC 2.0 bridge over a [`TriageSession`].
//!
//! Lets a front end that owns the pointer events and rendering drive the
//! triage core over stdin/stdout.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::filters::RawFilter;
use crate::gesture::{PointerId, PointerTarget};
use crate::models::Label;
use crate::session::{FetchFailure, FetchOutcome, TriageSession};

const JSONRPC_VERSION: &str = "2.0";

const METHODS: &[&str] = &[
    "initialize",
    "session/state",
    "session/cancel",
    "session/signOut",
    "filters/apply",
    "filters/reset",
    "queue/refresh",
    "queue/classify",
    "gesture/pointerDown",
    "gesture/pointerMove",
    "gesture/pointerUp",
    "gesture/pointerCancel",
    "thread/get",
];

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointerParams {
    pointer_id: PointerId,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    target: PointerTarget,
}

#[derive(Debug, Deserialize)]
struct ClassifyParams {
    label: String,
}

enum CallError {
    InvalidParams(String),
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for CallError {
    fn from(error: anyhow::Error) -> Self {
        Self::Failed(error)
    }
}

impl From<serde_json::Error> for CallError {
    fn from(error: serde_json::Error) -> Self {
        Self::Failed(error.into())
    }
}

#[derive(Clone)]
pub struct Bridge {
    session: TriageSession,
}

impl Bridge {
    pub fn new(session: TriageSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &TriageSession {
        &self.session
    }

    pub async fn run_stdio(&self) -> Result<()> {
        self.serve(io::stdin(), io::stdout()).await
    }

    /// Reads one request per line from `reader` until EOF. Each request runs
    /// on its own task, so a slow fetch never blocks state reads, gestures or
    /// cancellation. Responses are written in completion order.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (responses, mut outgoing) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response_line) = outgoing.recv().await {
                writer
                    .write_all(format!("{response_line}\n").as_bytes())
                    .await
                    .context("write bridge response")?;
                writer.flush().await.context("flush bridge response")?;
            }
            Ok::<(), anyhow::Error>(())
        });

        let mut requests = JoinSet::new();
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await.context("read bridge request line")? {
            if line.trim().is_empty() {
                continue;
            }

            let bridge = self.clone();
            let responses = responses.clone();
            requests.spawn(async move {
                if let Some(response_line) = bridge.handle_request_line(&line).await {
                    if responses.send(response_line).is_err() {
                        debug!("bridge writer closed; dropping response");
                    }
                }
            });
        }

        while let Some(joined) = requests.join_next().await {
            if let Err(err) = joined {
                warn!("bridge request task failed: {err}");
            }
        }
        drop(responses);
        writer_task.await.context("join bridge writer")??;

        self.session.dispatcher().wait_idle().await;
        Ok(())
    }

    pub async fn handle_request_line(&self, line: &str) -> Option<String> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(error) => {
                return Some(
                    jsonrpc_error(None, -32700, "Parse error", Some(error.to_string())).to_string(),
                );
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(
                jsonrpc_error(
                    request.id,
                    -32600,
                    "Invalid Request",
                    Some("jsonrpc must be \"2.0\"".to_string()),
                )
                .to_string(),
            );
        }

        let id = request.id.clone();
        let response = if METHODS.contains(&request.method.as_str()) {
            match self.call(&request.method, request.params).await {
                Ok(result) => jsonrpc_result(id, result),
                Err(CallError::InvalidParams(detail)) => {
                    jsonrpc_error(id, -32602, "Invalid params", Some(detail))
                }
                Err(CallError::Failed(error)) => {
                    jsonrpc_error(id, -32000, "Call failed", Some(format!("{error:#}")))
                }
            }
        } else {
            jsonrpc_error(
                id,
                -32601,
                "Method not found",
                Some(format!("Unknown method '{}'", request.method)),
            )
        };

        // Notifications get no reply.
        if request.id.is_none() {
            return None;
        }

        Some(response.to_string())
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, CallError> {
        let session = &self.session;
        match method {
            "initialize" => {
                let user = session
                    .sign_in()
                    .await
                    .context("load signed-in user")?;
                Ok(json!({
                    "serverInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": { "methods": METHODS },
                    "user": user,
                }))
            }
            "session/state" => Ok(serde_json::to_value(session.snapshot())?),
            "session/cancel" => {
                session.cancel_pending();
                Ok(serde_json::to_value(session.snapshot())?)
            }
            "session/signOut" => {
                session.sign_out().await;
                Ok(serde_json::to_value(session.snapshot())?)
            }
            "filters/apply" => {
                let overrides: RawFilter = parse_params(params)?;
                let outcome = session.apply_filters(overrides).await;
                self.with_state(outcome)
            }
            "filters/reset" => {
                let outcome = session.reset_filters().await;
                self.with_state(outcome)
            }
            "queue/refresh" => {
                let outcome = session.refresh().await;
                self.with_state(outcome)
            }
            "queue/classify" => {
                let params: ClassifyParams = parse_params(params)?;
                let label = params
                    .label
                    .parse::<Label>()
                    .map_err(CallError::InvalidParams)?;
                let decision = session.classify(label);
                Ok(json!({
                    "decision": decision,
                    "state": session.snapshot(),
                }))
            }
            "gesture/pointerDown" => {
                let params: PointerParams = parse_params(params)?;
                let captured = session.pointer_down(params.pointer_id, params.x, params.target);
                Ok(json!({
                    "captured": captured,
                    "card": session.card_feedback(),
                }))
            }
            "gesture/pointerMove" => {
                let params: PointerParams = parse_params(params)?;
                Ok(serde_json::to_value(
                    session.pointer_move(params.pointer_id, params.x),
                )?)
            }
            "gesture/pointerUp" => {
                let params: PointerParams = parse_params(params)?;
                let outcome = session.pointer_up(params.pointer_id);
                Ok(json!({
                    "end": outcome.end,
                    "decision": outcome.decision,
                    "state": session.snapshot(),
                }))
            }
            "gesture/pointerCancel" => {
                let params: PointerParams = parse_params(params)?;
                let end = session.pointer_cancel(params.pointer_id);
                Ok(json!({
                    "end": end,
                    "card": session.card_feedback(),
                }))
            }
            "thread/get" => Ok(serde_json::to_value(session.conversation().await)?),
            other => Err(CallError::InvalidParams(format!("unsupported method '{other}'"))),
        }
    }

    fn with_state(&self, outcome: FetchOutcome) -> Result<Value, CallError> {
        let mut value = outcome_json(&outcome);
        value["state"] = serde_json::to_value(self.session.snapshot())?;
        Ok(value)
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, CallError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|error| CallError::InvalidParams(error.to_string()))
}

fn outcome_json(outcome: &FetchOutcome) -> Value {
    match outcome {
        FetchOutcome::Applied(summary) => json!({ "status": "applied", "summary": summary }),
        FetchOutcome::Failed(failure) => json!({
            "status": "failed",
            "error": failure.message(),
            "sessionExpired": *failure == FetchFailure::SessionExpired,
        }),
        FetchOutcome::Stale => json!({ "status": "stale" }),
        FetchOutcome::SignedOut => json!({ "status": "signedOut" }),
    }
}

fn jsonrpc_result(id: Option<Value>, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.unwrap_or(Value::Null),
        "result": result
    })
}

fn jsonrpc_error(id: Option<Value>, code: i64, message: &str, data: Option<String>) -> Value {
    let mut error = json!({
        "code": code,
        "message": message,
    });
    if let Some(data) = data {
        error["data"] = Value::String(data);
    }

    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.unwrap_or(Value::Null),
        "error": error
    })
}
