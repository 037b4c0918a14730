//! Process spawning and incremental output streaming.
//!
//! A [`ProcessHandle`] is created from an executable path and spawns one
//! child per [`run`](ProcessHandle::run) call. Output from both pipes is
//! pumped by background tasks into an mpsc channel; the consumer drains
//! [`ProcessEvent`]s from its own task, so pipe I/O never runs on the
//! caller's thread of control and no locking is needed on the consumer
//! side. Dropping the stream before the final event terminates and reaps
//! the child.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::args::ArgumentList;
use crate::error::{ProcessError, Result};

const CHANNEL_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// One I/O notification from a running child.
///
/// Zero or more `Output` chunks arrive in pipe order, not necessarily
/// aligned to lines or UTF-8 boundaries, followed by exactly one
/// `Exited`. Consumers must copy whatever they need.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Output(Bytes),
    Exited { code: i32 },
}

/// Handle to one external executable.
pub struct ProcessHandle {
    executable: PathBuf,
}

impl ProcessHandle {
    /// Returns `None` unless the path resolves to an existing file.
    /// Nothing is spawned yet.
    pub fn create(executable: impl Into<PathBuf>) -> Option<Self> {
        let executable = executable.into();
        if executable.is_file() {
            Some(Self { executable })
        } else {
            None
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Spawn the child with the given arguments.
    ///
    /// Fails immediately when the spawn itself fails; no events are ever
    /// delivered in that case. On success the returned stream yields the
    /// child's combined stdout/stderr followed by its exit code. There
    /// is no timeout: a child that never exits keeps its stream open
    /// until the stream is dropped.
    pub fn run(&self, args: &ArgumentList) -> Result<ProcessStream> {
        let mut child = Command::new(&self.executable)
            .args(args.tokens())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.executable.display().to_string(),
                source,
            })?;

        let pid = child.id();
        debug!(program = %self.executable.display(), pid, args = %args, "Spawned process");

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_pipe(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_pipe(stderr, tx.clone())));
        }
        tokio::spawn(supervise(child, pumps, tx));

        Ok(ProcessStream { pid, events: rx })
    }
}

/// Receiving end of one child's event stream.
pub struct ProcessStream {
    pid: Option<u32>,
    events: mpsc::Receiver<ProcessEvent>,
}

impl ProcessStream {
    /// Stream backed by an arbitrary event channel, for launchers that
    /// replay scripted output instead of spawning an OS process.
    pub fn scripted(events: mpsc::Receiver<ProcessEvent>) -> Self {
        Self { pid: None, events }
    }

    /// OS process id of the child, when one was spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next event, or `None` once the final event has been delivered.
    pub async fn recv(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }
}

async fn pump_pipe<R>(mut pipe: R, tx: mpsc::Sender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                if tx.send(ProcessEvent::Output(chunk)).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn supervise(mut child: Child, pumps: Vec<JoinHandle<()>>, tx: mpsc::Sender<ProcessEvent>) {
    let drained = async {
        for pump in pumps {
            let _ = pump.await;
        }
    };

    tokio::select! {
        biased;

        _ = tx.closed() => {
            // Consumer dropped the stream mid-run: terminate the child
            // and reap it so neither a zombie nor its pipes remain.
            debug!(pid = child.id(), "Stream dropped, killing child");
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        _ = drained => {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(_) => -1,
            };
            debug!(code, "Process exited");
            let _ = tx.send(ProcessEvent::Exited { code }).await;
        }
    }
}
