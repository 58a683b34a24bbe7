//! IPC utilities for Unix socket communication
//!
//! Both directions use newline-delimited JSON. Inbound messages arrive on the
//! relay socket (see `server`); outbound notifications are written as one
//! `Envelope` per line to a sink.

use crate::error::NotifyError;
use crate::notify::{Domain, Notification, Notifier};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tracing::{debug, warn};

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lines buffered for the bus before new notifications are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Runtime directory for sockets: `$XDG_RUNTIME_DIR`, else the temp dir.
pub fn socket_path(name: &str) -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(std::env::temp_dir)
        .join(name)
}

/// Default socket the relay listens on for inbound messages.
pub fn inbound_socket_path() -> PathBuf {
    socket_path("agent-relay.sock")
}

/// Default socket of the notification bus.
pub fn notify_socket_path() -> PathBuf {
    socket_path("agent-relay-notify.sock")
}

/// One notification on the wire: `{"domain":"fs","type":"file_read_request",...}`
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub domain: Domain,
    #[serde(flatten)]
    pub notification: &'a Notification,
}

impl<'a> Envelope<'a> {
    pub fn new(notification: &'a Notification) -> Self {
        Self {
            domain: notification.domain(),
            notification,
        }
    }
}

/// Serialize a notification as one newline-terminated JSON line.
pub fn encode_line(notification: &Notification) -> Result<Vec<u8>, NotifyError> {
    let mut line = serde_json::to_vec(&Envelope::new(notification))?;
    line.push(b'\n');
    Ok(line)
}

/// Writes notifications to the notification bus socket.
///
/// `notify` never blocks: encoded lines go into a bounded queue and are
/// dropped (with an error) when the queue is full. One writer task owns the
/// connection. It connects on demand, writes whole lines, and drops the
/// connection after a failed or timed-out write so the next line starts on a
/// fresh connection.
pub struct SocketNotifier {
    tx: mpsc::Sender<Vec<u8>>,
}

impl SocketNotifier {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(write_loop(path.into(), rx));
        Self { tx }
    }
}

impl Notifier for SocketNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let line = encode_line(notification)?;
        self.tx.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => NotifyError::QueueFull,
            TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

async fn write_loop(path: PathBuf, mut rx: mpsc::Receiver<Vec<u8>>) {
    let mut conn: Option<UnixStream> = None;

    while let Some(line) = rx.recv().await {
        if conn.is_none() {
            match UnixStream::connect(&path).await {
                Ok(stream) => {
                    debug!(path = %path.display(), "connected to notification bus");
                    conn = Some(stream);
                }
                Err(source) => {
                    let err = NotifyError::Connect {
                        path: path.display().to_string(),
                        source,
                    };
                    warn!("{err}, dropping notification");
                    continue;
                }
            }
        }
        let Some(stream) = conn.as_mut() else {
            continue;
        };

        match timeout(WRITE_TIMEOUT, stream.write_all(&line)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(path = %path.display(), "notification bus write failed: {e}");
                conn = None;
            }
            Err(_) => {
                warn!(path = %path.display(), "notification bus write timed out");
                conn = None;
            }
        }
    }
    debug!("notification writer stopped");
}

/// Writes envelopes to any writer, one per line (stdout for one-shot runs).
pub struct JsonLinesNotifier<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesNotifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> Result<W, NotifyError> {
        self.out.into_inner().map_err(|_| NotifyError::Poisoned)
    }
}

impl<W: Write + Send> Notifier for JsonLinesNotifier<W> {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let line = encode_line(notification)?;
        let mut out = self.out.lock().map_err(|_| NotifyError::Poisoned)?;
        out.write_all(&line)?;
        out.flush()?;
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    /// Snapshot of everything received so far
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Drain everything received so far
    pub fn take(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|mut sent| std::mem::take(&mut *sent))
            .unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Poisoned)?
            .push(notification.clone());
        Ok(())
    }
}
