//! Embedding via a long-lived external model process.
//!
//! The process reads one JSON command per line on stdin and answers each with
//! one JSON object per line on stdout, in order:
//!
//! | command               | fields              | reply                     |
//! |-----------------------|---------------------|---------------------------|
//! | `initialize`          |                     | `{"status": "..."}`       |
//! | `generate_embedding`  | `text`, `is_query`  | `{"embedding": [..]}`     |
//! | `generate_embeddings` | `texts`, `is_query` | `{"embeddings": [[..]]}`  |
//!
//! Any command may instead be answered with `{"error": "..."}`. Loading the
//! model is slow, so the process is started once and reused; if it exits,
//! the next call starts a new one.
//!
//! The channel carries one request at a time. [`ProcessEmbedder`] holds an
//! async mutex across each exchange, which both serializes callers and makes
//! initialization single-flight.

use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::framing::{frame_reader, next_frame, FrameReader};
use super::{EmbedTask, Embedder};
use crate::error::EmbeddingError;

/// Lifecycle of the external process as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Wire requests. One per line.
#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Request<'a> {
    Initialize,
    GenerateEmbedding { text: &'a str, is_query: bool },
    GenerateEmbeddings { texts: &'a [String], is_query: bool },
}

/// Wire replies. Which field is set depends on the command answered.
#[derive(Debug, Default, Deserialize)]
struct Reply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    error: Option<Value>,
}

/// Byte streams to and from a running embedding process.
pub struct Channel {
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// The OS process, when there is one. In-memory channels have none.
    pub child: Option<Child>,
}

/// Starts the embedding process.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Channel, EmbeddingError>;
}

/// Spawns `program args...` with piped stdio.
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }
}

#[async_trait]
impl Launcher for CommandLauncher {
    async fn launch(&self) -> Result<Channel, EmbeddingError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| EmbeddingError::Spawn(format!("{}: {e}", self.program)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EmbeddingError::Spawn("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EmbeddingError::Spawn("failed to capture stdout".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        info!(program = %self.program, pid = ?child.id(), "embedding process spawned");

        Ok(Channel {
            writer: Box::new(stdin),
            reader: Box::new(stdout),
            child: Some(child),
        })
    }
}

/// The model process logs progress on stderr.
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "mnemos::embedding::process", "{line}");
    }
}

struct Session {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    frames: FrameReader<Box<dyn AsyncRead + Send + Unpin>>,
    child: Option<Child>,
    /// Replies still owed for requests that timed out; discarded on arrival.
    stale_replies: usize,
}

impl Session {
    fn new(channel: Channel) -> Self {
        Self {
            writer: channel.writer,
            frames: frame_reader(channel.reader),
            child: channel.child,
            stale_replies: 0,
        }
    }

    fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn exchange(
        &mut self,
        request: &Request<'_>,
        timeout: Duration,
    ) -> Result<Reply, EmbeddingError> {
        let mut line = serde_json::to_vec(request)
            .map_err(|e| EmbeddingError::Malformed(format!("cannot encode request: {e}")))?;
        line.push(b'\n');

        self.writer.write_all(&line).await?;
        self.writer.flush().await?;

        match tokio::time::timeout(timeout, self.read_reply()).await {
            Ok(reply) => reply,
            Err(_) => {
                self.stale_replies += 1;
                warn!(timeout = ?timeout, "embedding request timed out; its reply will be discarded");
                Err(EmbeddingError::Timeout(timeout))
            }
        }
    }

    /// Read until the reply to the current request is complete.
    ///
    /// Cancel safe: bytes already read stay in the frame buffer.
    async fn read_reply(&mut self) -> Result<Reply, EmbeddingError> {
        loop {
            let Some(frame) = next_frame(&mut self.frames).await? else {
                return Err(EmbeddingError::ProcessExited);
            };
            if self.stale_replies > 0 {
                self.stale_replies -= 1;
                debug!("discarded reply to a timed-out request");
                continue;
            }
            return parse_reply(&frame);
        }
    }

    /// Close stdin and give the process `grace` to exit before killing it.
    async fn close(self, grace: Duration) {
        let Session { writer, child, .. } = self;
        drop(writer);
        let Some(mut child) = child else {
            return;
        };
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => info!(%status, "embedding process exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for embedding process"),
            Err(_) => {
                warn!(grace = ?grace, "embedding process did not exit in time; killing");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill embedding process");
                }
            }
        }
    }
}

fn parse_reply(frame: &str) -> Result<Reply, EmbeddingError> {
    let reply: Reply = serde_json::from_str(frame)
        .map_err(|e| EmbeddingError::Malformed(format!("invalid JSON reply: {e}")))?;
    if let Some(error) = reply.error {
        let message = match error {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Err(EmbeddingError::Remote(message));
    }
    Ok(reply)
}

fn into_status(reply: Reply) -> Result<String, EmbeddingError> {
    reply
        .status
        .ok_or_else(|| EmbeddingError::Malformed("initialize reply has no status".into()))
}

fn into_vector(reply: Reply) -> Result<Vec<f32>, EmbeddingError> {
    let vector = reply
        .embedding
        .ok_or_else(|| EmbeddingError::Malformed("reply has neither embedding nor error".into()))?;
    if vector.is_empty() {
        return Err(EmbeddingError::Malformed("empty vector".into()));
    }
    Ok(vector)
}

fn into_vectors(reply: Reply, expected: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let vectors = reply
        .embeddings
        .ok_or_else(|| EmbeddingError::Malformed("reply has neither embeddings nor error".into()))?;
    if vectors.len() != expected {
        return Err(EmbeddingError::Malformed(format!(
            "expected {expected} vectors, got {}",
            vectors.len()
        )));
    }
    if let Some(first) = vectors.first() {
        if first.is_empty() {
            return Err(EmbeddingError::Malformed("empty vector".into()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
            return Err(EmbeddingError::DimensionMismatch {
                left: first.len(),
                right: bad.len(),
            });
        }
    }
    Ok(vectors)
}

/// [`Embedder`] backed by an external process.
pub struct ProcessEmbedder {
    launcher: Box<dyn Launcher>,
    session: Mutex<Option<Session>>,
    state: StdMutex<EmbedderState>,
    model: String,
    request_timeout: Duration,
    init_timeout: Duration,
}

impl ProcessEmbedder {
    pub fn new(
        launcher: Box<dyn Launcher>,
        model: &str,
        request_timeout: Duration,
        init_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            session: Mutex::new(None),
            state: StdMutex::new(EmbedderState::Uninitialized),
            model: model.to_string(),
            request_timeout,
            init_timeout,
        }
    }

    pub fn state(&self) -> EmbedderState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: EmbedderState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    async fn start(&self) -> Result<Session, EmbeddingError> {
        self.set_state(EmbedderState::Initializing);
        info!(model = %self.model, "initializing embedding process");

        let mut session = match self.launcher.launch().await {
            Ok(channel) => Session::new(channel),
            Err(e) => {
                self.set_state(EmbedderState::Uninitialized);
                return Err(e);
            }
        };

        let initialized = session
            .exchange(&Request::Initialize, self.init_timeout)
            .await
            .and_then(into_status);
        match initialized {
            Ok(status) => {
                self.set_state(EmbedderState::Ready);
                info!(model = %self.model, %status, "embedding process ready");
                Ok(session)
            }
            Err(e) => {
                self.set_state(EmbedderState::Uninitialized);
                warn!(error = %e, "embedding process failed to initialize");
                session.close(Duration::ZERO).await;
                Err(e)
            }
        }
    }

    /// Send one request, starting the process first if needed.
    async fn call(&self, request: &Request<'_>) -> Result<Reply, EmbeddingError> {
        let mut slot = self.session.lock().await;

        if slot.as_mut().is_some_and(Session::has_exited) {
            warn!("embedding process exited; restarting");
            *slot = None;
            self.set_state(EmbedderState::Uninitialized);
        }

        if slot.is_none() {
            *slot = Some(self.start().await?);
        }
        let Some(session) = slot.as_mut() else {
            return Err(EmbeddingError::NotInitialized);
        };

        match session.exchange(request, self.request_timeout).await {
            Err(e) if e.is_fatal_to_session() => {
                warn!(error = %e, "embedding channel lost");
                *slot = None;
                self.set_state(EmbedderState::Uninitialized);
                Err(e)
            }
            other => other,
        }
    }
}

#[async_trait]
impl Embedder for ProcessEmbedder {
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>, EmbeddingError> {
        let request = Request::GenerateEmbedding {
            text,
            is_query: task.is_query(),
        };
        into_vector(self.call(&request).await?)
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        is_query: bool,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self
            .call(&Request::GenerateEmbeddings { texts, is_query })
            .await?;
        into_vectors(reply, texts.len())
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn shutdown(&self, grace: Duration) {
        let Ok(mut slot) = tokio::time::timeout(grace, self.session.lock()).await else {
            warn!("embedding request still in flight at shutdown; process is killed on drop");
            return;
        };
        if let Some(session) = slot.take() {
            session.close(grace).await;
        }
        self.set_state(EmbedderState::Uninitialized);
    }
}
