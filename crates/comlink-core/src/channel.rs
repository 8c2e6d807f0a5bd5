//! Process channel to the comment store.
//!
//! A single I/O task owns the process's stdin and stdout. Requests are queued
//! FIFO and written one at a time: the next request only goes out once the
//! in-flight one has been answered, so every stdout line belongs to exactly
//! one request. A caller that stops waiting leaves its slot in place and the
//! late answer is discarded. After `MAX_CONSECUTIVE_TIMEOUTS` unanswered
//! requests in a row the channel is closed.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::protocol::{parse_response, Command, CommandKind, Response};
use crate::store::CommentStore;

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_QUEUED: usize = 32;
const MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;

/// Channel limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// How long a caller waits for its response.
    pub request_timeout: Duration,
    /// Outstanding requests allowed before `send` reports `Busy`.
    pub max_queued: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_queued: DEFAULT_MAX_QUEUED,
        }
    }
}

/// Output mirrored from the store process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutput {
    /// A stdout line.
    Stdout(String),
    /// A stderr line.
    Stderr(String),
    /// The process closed its output; the channel is dead.
    Exited,
}

impl StoreOutput {
    /// Text shown in the editor's log.
    pub fn render(&self) -> String {
        match self {
            StoreOutput::Stdout(line) => line.clone(),
            StoreOutput::Stderr(line) => format!("[stderr] {line}"),
            StoreOutput::Exited => "comment store exited".to_string(),
        }
    }
}

type Reply = oneshot::Sender<Result<Response, StoreError>>;

struct Outbound {
    kind: CommandKind,
    line: String,
    reply: Option<Reply>,
}

struct InFlight {
    kind: CommandKind,
    reply: Reply,
}

/// Handle to the comment store process.
pub struct ProcessChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
    outstanding: Arc<AtomicUsize>,
    alive: Arc<AtomicBool>,
    timeouts: AtomicU32,
    shutdown: Arc<Notify>,
    config: ChannelConfig,
    child: Option<Child>,
}

impl ProcessChannel {
    /// Launches `program` with `args` followed by the workspace `root`.
    pub fn spawn(
        program: &str,
        args: &[String],
        root: &Path,
        config: ChannelConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<StoreOutput>), StoreError> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .arg(root)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                error!(program, error = %err, "failed to launch comment store");
                StoreError::ProcessUnavailable
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(StoreError::ProcessUnavailable);
        };

        info!(program, root = %root.display(), "comment store launched");
        let (mut channel, events) = Self::from_io(stdin, stdout, Some(stderr), config);
        channel.child = Some(child);
        Ok((channel, events))
    }

    /// Builds a channel over arbitrary stream halves.
    pub fn from_io<W, R, E>(
        stdin: W,
        stdout: R,
        stderr: Option<E>,
        config: ChannelConfig,
    ) -> (Self, mpsc::UnboundedReceiver<StoreOutput>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let outstanding = Arc::new(AtomicUsize::new(0));
        let alive = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());

        if let Some(stderr) = stderr {
            tokio::spawn(mirror_stderr(stderr, event_tx.clone()));
        }
        tokio::spawn(run_channel_io(
            stdin,
            stdout,
            outbound_rx,
            event_tx,
            Arc::clone(&outstanding),
            Arc::clone(&alive),
            Arc::clone(&shutdown),
        ));

        let channel = Self {
            outbound: outbound_tx,
            outstanding,
            alive,
            timeouts: AtomicU32::new(0),
            shutdown,
            config,
            child: None,
        };
        (channel, event_rx)
    }

    /// Whether the process is still reachable.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Requests accepted but not yet answered.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Sends `command` and waits for its response line.
    ///
    /// Commands that are never answered resolve as soon as they are queued,
    /// with an empty text response.
    ///
    /// A timed-out request keeps its slot until the store answers it, so
    /// requests queued behind it wait too. Once `MAX_CONSECUTIVE_TIMEOUTS`
    /// requests in a row time out, the channel closes and every pending and
    /// later request fails with `ProcessUnavailable`.
    pub async fn send(&self, command: Command) -> Result<Response, StoreError> {
        if !self.is_alive() {
            return Err(StoreError::ProcessUnavailable);
        }
        let kind = command.kind();
        let line = command.to_line()?;

        if !command.expects_response() {
            self.outbound
                .send(Outbound {
                    kind,
                    line,
                    reply: None,
                })
                .map_err(|_| StoreError::ProcessUnavailable)?;
            return Ok(Response::Text(String::new()));
        }

        let queued = self.outstanding.fetch_add(1, Ordering::AcqRel);
        if queued >= self.config.max_queued {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            warn!(kind = kind.as_str(), queued, "comment store busy");
            return Err(StoreError::Busy { queued });
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .outbound
            .send(Outbound {
                kind,
                line,
                reply: Some(reply_tx),
            })
            .is_err()
        {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(StoreError::ProcessUnavailable);
        }

        match tokio::time::timeout(self.config.request_timeout, reply_rx).await {
            Ok(Ok(result)) => {
                self.timeouts.store(0, Ordering::Release);
                result
            }
            Ok(Err(_)) => Err(StoreError::Dropped),
            Err(_) => {
                let millis = u64::try_from(self.config.request_timeout.as_millis())
                    .unwrap_or(u64::MAX);
                let missed = self.timeouts.fetch_add(1, Ordering::AcqRel) + 1;
                warn!(kind = kind.as_str(), millis, missed, "comment store request timed out");
                if missed >= MAX_CONSECUTIVE_TIMEOUTS {
                    error!(missed, "comment store stopped answering; closing channel");
                    self.alive.store(false, Ordering::Release);
                    self.shutdown.notify_one();
                }
                Err(StoreError::Timeout(millis))
            }
        }
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

#[async_trait]
impl CommentStore for ProcessChannel {
    async fn init(&self) -> Result<(), StoreError> {
        let ack = self.send(Command::Init).await?;
        debug!(ack = ?ack, "store init acknowledged");
        self.send(Command::ConfirmDirectory).await?;
        Ok(())
    }

    async fn create(&self, body: &str) -> Result<String, StoreError> {
        match self.send(Command::Create(body.to_string())).await? {
            Response::Created(id) if !id.is_empty() => Ok(id),
            other => Err(StoreError::UnexpectedResponse(other.into_line())),
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<String>, StoreError> {
        let text = self.send(Command::Fetch(id.to_string())).await?.into_line();
        if text.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let ack = self.send(Command::Delete(id.to_string())).await?;
        debug!(id, ack = ?ack, "store delete acknowledged");
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.is_alive()
    }
}

async fn run_channel_io<W, R>(
    mut stdin: W,
    stdout: R,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    event_tx: mpsc::UnboundedSender<StoreOutput>,
    outstanding: Arc<AtomicUsize>,
    alive: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    let mut in_flight: Option<InFlight> = None;
    let mut waiting: VecDeque<Outbound> = VecDeque::new();
    let mut failure = StoreError::ProcessUnavailable;

    loop {
        if let Err(err) = write_ready(&mut stdin, &mut in_flight, &mut waiting, &outstanding).await
        {
            error!(error = %err, "write to comment store failed; closing channel");
            break;
        }

        tokio::select! {
            () = shutdown.notified() => {
                debug!("comment store channel shut down");
                break;
            }
            message = outbound_rx.recv() => match message {
                Some(out) => waiting.push_back(out),
                None => {
                    debug!("comment store channel handle dropped");
                    break;
                }
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    debug!(target: "comlink::store", "{line}");
                    let _ = event_tx.send(StoreOutput::Stdout(line.clone()));
                    resolve(&mut in_flight, &line, &outstanding);
                }
                Ok(None) => {
                    info!("comment store closed its output");
                    break;
                }
                Err(err) => {
                    error!(error = %err, "error reading from comment store");
                    failure = err.into();
                    break;
                }
            }
        }
    }

    alive.store(false, Ordering::Release);
    outbound_rx.close();

    let mut abandoned = 0usize;
    if let Some(flight) = in_flight.take() {
        let _ = flight.reply.send(Err(failure));
        abandoned += 1;
    }
    while let Ok(out) = outbound_rx.try_recv() {
        waiting.push_back(out);
    }
    for out in waiting {
        if let Some(reply) = out.reply {
            let _ = reply.send(Err(StoreError::ProcessUnavailable));
            abandoned += 1;
        }
    }
    outstanding.fetch_sub(abandoned, Ordering::AcqRel);
    let _ = event_tx.send(StoreOutput::Exited);
}

async fn write_ready<W>(
    stdin: &mut W,
    in_flight: &mut Option<InFlight>,
    waiting: &mut VecDeque<Outbound>,
    outstanding: &AtomicUsize,
) -> Result<(), StoreError>
where
    W: AsyncWrite + Unpin,
{
    while in_flight.is_none() {
        let Some(out) = waiting.pop_front() else {
            break;
        };
        let written = async {
            stdin.write_all(out.line.as_bytes()).await?;
            stdin.flush().await
        }
        .await
        .map_err(StoreError::from);
        if let Err(err) = written {
            if let Some(reply) = out.reply {
                let _ = reply.send(Err(err.clone()));
                outstanding.fetch_sub(1, Ordering::AcqRel);
            }
            return Err(err);
        }
        debug!(kind = out.kind.as_str(), "request written to comment store");
        if let Some(reply) = out.reply {
            *in_flight = Some(InFlight {
                kind: out.kind,
                reply,
            });
        }
    }
    Ok(())
}

fn resolve(in_flight: &mut Option<InFlight>, line: &str, outstanding: &AtomicUsize) {
    let Some(flight) = in_flight.take() else {
        debug!("discarding unsolicited comment store line");
        return;
    };
    outstanding.fetch_sub(1, Ordering::AcqRel);
    if flight.reply.send(Ok(parse_response(line))).is_err() {
        warn!(
            kind = flight.kind.as_str(),
            "discarding response for abandoned request"
        );
    }
}

async fn mirror_stderr<E>(stderr: E, event_tx: mpsc::UnboundedSender<StoreOutput>)
where
    E: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!(target: "comlink::store", "[stderr] {line}");
        if event_tx.send(StoreOutput::Stderr(line)).is_err() {
            break;
        }
    }
}
