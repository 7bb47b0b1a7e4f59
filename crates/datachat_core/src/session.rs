//! The process-wide toolhost session: one subprocess, one channel, shared by
//! every concurrent request.
//!
//! All traffic funnels through a single writer task; every request carries a
//! correlation id and a reader task routes each response line to the waiting
//! caller, so interleaved requests cannot cross-talk or desynchronize the
//! channel. There is no reconnect: once the channel drops the session is
//! `Closed` and stays that way until the host restarts.

use crate::error::ToolError;
use crate::wire::{WireRequest, WireResponse, PROTOCOL_VERSION};
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Path to the toolhost executable.
    pub command: PathBuf,
    /// SQLite database handed to the subprocess via DATACHAT_DB.
    pub db_path: PathBuf,
}

impl SessionConfig {
    /// `DATACHAT_TOOLHOST_BIN` overrides the subprocess; otherwise the
    /// `datachat-toolhost` binary next to the current executable is used.
    pub fn from_env() -> Result<Self> {
        let command = match std::env::var("DATACHAT_TOOLHOST_BIN") {
            Ok(p) => PathBuf::from(p),
            Err(_) => std::env::current_exe()
                .context("locating current executable")?
                .parent()
                .map(|dir| dir.join("datachat-toolhost"))
                .context("current executable has no parent directory")?,
        };
        let db_path = std::env::var("DATACHAT_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("company_data.db"));
        Ok(Self { command, db_path })
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<WireResponse>>>>;

#[derive(Debug)]
pub struct Session {
    tx: mpsc::Sender<WireRequest>,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    child: Mutex<Option<Child>>,
}

impl Session {
    /// Start the toolhost subprocess and perform the handshake. Any failure
    /// here must abort host startup; a half-initialized session is never
    /// handed out.
    pub async fn spawn(config: &SessionConfig) -> Result<Self> {
        let mut child = Command::new(&config.command)
            .env("DATACHAT_DB", &config.db_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning toolhost {}", config.command.display()))?;
        let stdin = child.stdin.take().context("toolhost stdin unavailable")?;
        let stdout = child.stdout.take().context("toolhost stdout unavailable")?;
        let session = Self::connect(stdout, stdin).await?;
        *session.child.lock() = Some(child);
        tracing::info!(command = %config.command.display(), db = %config.db_path.display(), "toolhost session ready");
        Ok(session)
    }

    /// Wire the session over an arbitrary transport and handshake. `spawn`
    /// uses the child's pipes; tests inject an in-process duplex.
    pub async fn connect<R, W>(reader: R, writer: W) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<WireRequest>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        // Single writer: the only task that touches the channel's write half.
        let writer_pending = pending.clone();
        let writer_closed = closed.clone();
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(req) = rx.recv().await {
                let line = match serde_json::to_string(&req) {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::error!(error = %e, "unserializable request; dropping");
                        writer_pending.lock().remove(&req.id);
                        continue;
                    }
                };
                if let Err(e) = write_line(&mut writer, &line).await {
                    tracing::error!(error = %e, "tool channel write failed; closing session");
                    writer_closed.store(true, Ordering::SeqCst);
                    writer_pending.lock().clear();
                    break;
                }
            }
        });

        // Reader: routes each response to its caller by correlation id.
        let reader_pending = pending.clone();
        let reader_closed = closed.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<WireResponse>(line) {
                            Ok(resp) => {
                                let waiter = reader_pending.lock().remove(&resp.id);
                                match waiter {
                                    Some(tx) => {
                                        let _ = tx.send(resp);
                                    }
                                    None => {
                                        tracing::warn!(id = resp.id, "response with no waiter")
                                    }
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "undecodable response line"),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "tool channel read failed");
                        break;
                    }
                }
            }
            // Peer is gone. Fail fast for everyone still waiting. `closed`
            // must be set before the sweep; `request` checks it under the
            // map lock.
            reader_closed.store(true, Ordering::SeqCst);
            reader_pending.lock().clear();
            tracing::info!("tool channel closed");
        });

        let session = Self {
            tx,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            child: Mutex::new(None),
        };

        let hello = tokio::time::timeout(HANDSHAKE_TIMEOUT, session.handshake())
            .await
            .context("toolhost handshake timed out")??;
        let version = hello
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if version != PROTOCOL_VERSION {
            bail!("toolhost handshake returned protocol {version:?}, want {PROTOCOL_VERSION:?}");
        }
        Ok(session)
    }

    async fn handshake(&self) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .request(WireRequest::initialize(id))
            .await
            .map_err(|e| anyhow::anyhow!("toolhost handshake failed: {e}"))?;
        if let Some(err) = resp.error {
            bail!("toolhost refused initialize: {}", err.message);
        }
        resp.result.context("initialize response carried no result")
    }

    pub fn state(&self) -> SessionState {
        if self.closed.load(Ordering::SeqCst) {
            SessionState::Closed
        } else {
            SessionState::Ready
        }
    }

    /// Issue one tool call and wait for its correlated response. Returns the
    /// raw `tools/call` result value; the proxy decodes it.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self.request(WireRequest::tool_call(id, name, arguments)).await?;
        if let Some(err) = resp.error {
            return Err(ToolError::Tool(err.message));
        }
        resp.result
            .ok_or_else(|| ToolError::MalformedResult("response carried no result".into()))
    }

    async fn request(&self, req: WireRequest) -> Result<WireResponse, ToolError> {
        let id = req.id;
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            // Closed-check and waiter registration happen under one lock.
            // Teardown flips `closed` before sweeping the map under the same
            // lock, so a waiter can never land after the sweep and strand
            // its caller.
            let mut pending = self.pending.lock();
            if self.closed.load(Ordering::SeqCst) {
                return Err(ToolError::SessionUnavailable(
                    "tool server session is closed".into(),
                ));
            }
            pending.insert(id, reply_tx);
        }
        if self.tx.send(req).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(ToolError::SessionUnavailable(
                "tool channel writer has stopped".into(),
            ));
        }
        reply_rx.await.map_err(|_| {
            ToolError::SessionUnavailable("tool server exited before responding".into())
        })
    }

    /// Terminate the subprocess and close the channel. Every exit path of the
    /// host goes through here (or through kill-on-drop as the backstop).
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.lock().clear();
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "toolhost kill failed");
            }
            let _ = child.wait().await;
            tracing::info!("toolhost subprocess terminated");
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
