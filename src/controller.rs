//! The controller process: an opaque peer fed with match messages whose
//! output is typed into the session verbatim.

use crate::reader::ReadEvent;
use anyhow::{Context as _, Result};
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

/// Write side of the controller: newline-terminated messages.
pub struct ControllerInput {
    writer: Pin<Box<dyn AsyncWrite + Send>>,
    closed: bool,
}

impl ControllerInput {
    pub fn new(writer: impl AsyncWrite + Send + 'static) -> Self {
        Self {
            writer: Box::pin(writer),
            closed: false,
        }
    }

    /// Write `line` and a newline, then flush.
    ///
    /// A broken pipe means the controller has gone away. It is not an error
    /// here: the input is marked closed and the engine ends the run.
    pub async fn send(&mut self, line: &str) -> Result<()> {
        if self.closed {
            debug!(message = line, "Controller input closed, dropping message");
            return Ok(());
        }

        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        let result = async {
            self.writer.write_all(&data).await?;
            self.writer.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                debug!(message = line, "Sent to controller");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                warn!("Controller closed its input");
                self.closed = true;
                Ok(())
            }
            Err(e) => Err(e).context("Failed to write to controller"),
        }
    }

    /// Whether the controller stopped accepting messages.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A running controller process.
pub struct Controller {
    child: Child,
    pub(crate) input: ControllerInput,
    pub(crate) output: Option<UnboundedReceiver<ReadEvent>>,
}

impl Controller {
    /// Spawn `command` with piped stdin/stdout. Its stderr is inherited.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn controller: {command}"))?;

        let stdin = child
            .stdin
            .take()
            .context("Failed to get controller stdin")?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to get controller stdout")?;

        info!(command, pid = ?child.id(), "Controller spawned");

        Ok(Self {
            child,
            input: ControllerInput::new(stdin),
            output: Some(spawn_async_reader(stdout)),
        })
    }

    /// Send one message to the controller.
    pub async fn send(&mut self, line: &str) -> Result<()> {
        self.input.send(line).await
    }

    /// Take the stream of output chunks. Returns `None` once taken.
    pub fn take_output(&mut self) -> Option<UnboundedReceiver<ReadEvent>> {
        self.output.take()
    }

    /// Close the controller's input, kill it if still running, and reap it.
    pub async fn shutdown(self) -> Option<i32> {
        let Controller {
            mut child, input, ..
        } = self;
        drop(input);

        if let Ok(None) = child.try_wait() {
            debug!("Killing controller");
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "Failed to kill controller");
            }
        }

        match child.wait().await {
            Ok(status) => {
                info!(status = %status, "Controller exited");
                status.code()
            }
            Err(e) => {
                warn!(error = %e, "Failed to reap controller");
                None
            }
        }
    }
}

/// Forward everything `reader` produces, chunk by chunk, without framing.
fn spawn_async_reader<R: AsyncRead + Unpin + Send + 'static>(mut reader: R) -> UnboundedReceiver<ReadEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut buffer = [0u8; 4096];
        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => {
                    let _ = tx.send(ReadEvent::Eof);
                    break;
                }
                Ok(n) => {
                    if tx.send(ReadEvent::Data(buffer[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = tx.send(ReadEvent::Failed(e));
                    break;
                }
            }
        }
    });

    rx
}
