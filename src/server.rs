//! Unix socket server for inbound messages
//!
//! Listens on `agent-relay.sock` for newline-delimited messages. Each line is
//! one inbound message and starts one agent query. Lines on a connection are
//! handled one after another; connections are independent.

use crate::error::InboundError;
use crate::inbound::{Inbound, normalize};
use crate::notify::{Notification, Notifier};
use crate::query::{AbortSignal, AgentQuery, QueryOptions, QueryOutcome, QueryRequest, run_query};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

/// Everything needed to turn an inbound message into a dispatched query.
pub struct Relay {
    agent: Arc<dyn AgentQuery>,
    notifier: Arc<dyn Notifier>,
    options: QueryOptions,
}

impl Relay {
    pub fn new(
        agent: Arc<dyn AgentQuery>,
        notifier: Arc<dyn Notifier>,
        options: QueryOptions,
    ) -> Self {
        Self {
            agent,
            notifier,
            options,
        }
    }

    /// Run one message. `None` when the message normalizes to nothing.
    pub async fn handle_message(
        &self,
        message: Inbound,
        abort: &AbortSignal,
    ) -> Option<QueryOutcome> {
        let Some(prompt) = normalize(&message) else {
            debug!("empty inbound message, skipping");
            return None;
        };
        let request = QueryRequest {
            prompt,
            options: self.options.clone(),
        };
        Some(run_query(&*self.agent, request, Arc::clone(&self.notifier), abort).await)
    }

    /// Log a handler failure and report it on the chat channel.
    pub fn report_handler_error(&self, err: &InboundError) {
        error!("Error in message handler: {err}");
        let notification = Notification::error_text(format!("Error in message handler: {err}"));
        if let Err(e) = self.notifier.notify(&notification) {
            warn!("notification failed: {e}");
        }
    }
}

/// Serve inbound messages until `abort` fires.
///
/// Removes any stale socket file before binding and removes the socket on
/// shutdown.
pub async fn start(relay: Arc<Relay>, path: &Path, abort: AbortSignal) -> Result<(), InboundError> {
    // Remove stale socket if it exists
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path).map_err(|source| InboundError::Bind {
        path: path.display().to_string(),
        source,
    })?;

    info!("Relay listening on {}", path.display());

    loop {
        tokio::select! {
            biased;
            _ = abort.aborted() => {
                info!("Relay shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    debug!("inbound connection");
                    tokio::spawn(serve_connection(Arc::clone(&relay), stream, abort.clone()));
                }
                Err(e) => {
                    warn!("Failed to accept socket connection: {}", e);
                }
            }
        }
    }

    if let Err(e) = std::fs::remove_file(path) {
        debug!("Failed to remove socket {}: {}", path.display(), e);
    }
    Ok(())
}

async fn serve_connection(relay: Arc<Relay>, stream: UnixStream, abort: AbortSignal) {
    let mut lines = BufReader::new(stream).lines();

    loop {
        let line = tokio::select! {
            biased;
            _ = abort.aborted() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let message = Inbound::from_line(&line);
                debug!(?message, "inbound message");
                if let Some(outcome) = relay.handle_message(message, &abort).await {
                    debug!(?outcome, "message handled");
                }
            }
            Ok(None) => break,
            Err(e) => {
                relay.report_handler_error(&e.into());
                break;
            }
        }
    }
}
