//! Agent stream driver
//!
//! An `AgentQuery` turns a prompt into an `EventStream`. `run_query` consumes
//! that stream in order, feeding each event to a fresh `Dispatcher`, until the
//! stream ends, fails, or the query is aborted.

use crate::agents::truncate;
use crate::dispatch::Dispatcher;
use crate::error::QueryError;
use crate::event::StreamEvent;
use crate::notify::Notifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{Level, error, info, trace};

/// Default buffer between the agent reader task and the consumer.
pub const DEFAULT_STREAM_CAPACITY: usize = 64;

/// Tool permission policy handed to the agent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    #[default]
    BypassPermissions,
    Plan,
}

impl PermissionMode {
    /// Value passed to the agent's `--permission-mode`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::BypassPermissions => "bypassPermissions",
            Self::Plan => "plan",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub permission_mode: PermissionMode,
    pub cwd: PathBuf,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            permission_mode: PermissionMode::default(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// One agent query: the instruction plus how to run it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub prompt: String,
    pub options: QueryOptions,
}

/// Lazy, finite, non-restartable sequence of agent events.
///
/// Backed by a bounded channel, so the producer only runs ahead of the
/// consumer by the channel capacity. Dropping the stream tells the producer
/// to stop.
pub struct EventStream {
    rx: mpsc::Receiver<Result<StreamEvent, QueryError>>,
}

/// Producer half of an `EventStream`.
pub struct EventSender {
    tx: mpsc::Sender<Result<StreamEvent, QueryError>>,
}

impl EventStream {
    pub fn channel(capacity: usize) -> (EventSender, EventStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (EventSender { tx }, EventStream { rx })
    }

    /// A stream that yields `items` then ends.
    pub fn from_items(items: Vec<Result<StreamEvent, QueryError>>) -> Self {
        let (tx, stream) = Self::channel(items.len());
        for item in items {
            // Capacity equals the item count, so this cannot be full.
            let _ = tx.tx.try_send(item);
        }
        stream
    }

    pub async fn next(&mut self) -> Option<Result<StreamEvent, QueryError>> {
        self.rx.recv().await
    }
}

impl EventSender {
    /// Returns false once the consumer has gone away.
    pub async fn send(&self, item: Result<StreamEvent, QueryError>) -> bool {
        self.tx.send(item).await.is_ok()
    }

    /// Resolves when the consumer drops its `EventStream`.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Requests cancellation of a running query.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes an `AbortHandle`.
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortHandle {
    pub fn new() -> (AbortHandle, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
    }

    /// Cooperative: takes effect at the next event boundary.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once aborted. Never resolves if every handle is dropped first.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Agent SDK boundary.
pub trait AgentQuery: Send + Sync {
    fn start(&self, request: QueryRequest) -> Result<EventStream, QueryError>;
}

impl<T: AgentQuery + ?Sized> AgentQuery for Arc<T> {
    fn start(&self, request: QueryRequest) -> Result<EventStream, QueryError> {
        (**self).start(request)
    }
}

/// Summary of one consumed query.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Events received and dispatched
    pub events: usize,
    pub cancelled: bool,
    pub failed: bool,
}

/// Drive one query to completion, cancellation, or failure.
///
/// Events are dispatched strictly in arrival order; each one is fully handled
/// before the next is pulled. A stream error is logged and reported once as an
/// error notification, then the query ends.
pub async fn run_query<A, N>(
    agent: &A,
    request: QueryRequest,
    notifier: N,
    abort: &AbortSignal,
) -> QueryOutcome
where
    A: AgentQuery + ?Sized,
    N: Notifier,
{
    let mut dispatcher = Dispatcher::new(notifier);
    let mut outcome = QueryOutcome::default();

    if abort.is_aborted() {
        outcome.cancelled = true;
        return outcome;
    }

    info!(
        prompt = truncate(&request.prompt, 100),
        permission_mode = %request.options.permission_mode,
        cwd = %request.options.cwd.display(),
        "starting agent query"
    );

    let mut stream = match agent.start(request) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Error executing agent query: {e}");
            dispatcher.report_error(format!("Error executing agent query: {e}"));
            outcome.failed = true;
            return outcome;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = abort.aborted() => {
                info!(events = outcome.events, "agent query aborted");
                outcome.cancelled = true;
                break;
            }
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    outcome.events += 1;
                    if tracing::enabled!(Level::TRACE) {
                        let raw = serde_json::to_string(&event).unwrap_or_default();
                        trace!(kind = event.kind(), %raw, "agent event");
                    }
                    dispatcher.dispatch(&event);
                }
                Some(Err(e)) => {
                    error!("Error executing agent query: {e}");
                    dispatcher.report_error(format!("Error executing agent query: {e}"));
                    outcome.failed = true;
                    break;
                }
                None => {
                    info!(events = outcome.events, "Total messages received");
                    break;
                }
            }
        }
    }
    drop(stream);
    outcome
}
