//! The session orchestrator.
//!
//! [`Engine`] owns the shell's pty, the controller process and the single
//! write path into the shell. [`Engine::run`] multiplexes every input stream
//! until the shell or the controller exits, then tears everything down in a
//! fixed order.

use crate::action::Context;
use crate::assembler::LineAssembler;
use crate::controller::Controller;
use crate::pty::{DEFAULT_SIZE, PtySession};
use crate::reader::{ReadEvent, spawn_reader};
use crate::rule::RuleSet;
use crate::terminal::{self, RawModeGuard, WindowChanges};
use crate::writer::{PtyWriter, spawn_writer};
use anyhow::{Context as _, Result, anyhow};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

type OutputHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// How long cleanup waits for queued writes to drain.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Runtime configuration for one [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub shell: String,
    pub shell_args: Vec<String>,
    /// Controller command and its arguments.
    pub controller: Option<(String, Vec<String>)>,
    /// Forward the user's stdin to the shell and put the terminal in raw mode.
    pub passthrough_input: bool,
    /// Initial pty size as `(rows, cols)`. Defaults to 24x80.
    pub size: Option<(u16, u16)>,
}

impl EngineOptions {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            shell_args: Vec::new(),
            controller: None,
            passthrough_input: false,
            size: None,
        }
    }

    pub fn with_shell_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_controller<I, S>(mut self, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.controller = Some((command.into(), args.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_passthrough_input(mut self, passthrough: bool) -> Self {
        self.passthrough_input = passthrough;
        self
    }

    pub fn with_size(mut self, rows: u16, cols: u16) -> Self {
        self.size = Some((rows, cols));
        self
    }
}

/// A running shell session and its rules.
pub struct Engine {
    rules: RuleSet,
    pty: PtySession,
    writer: PtyWriter,
    writer_task: JoinHandle<io::Result<()>>,
    output: UnboundedReceiver<ReadEvent>,
    controller: Option<Controller>,
    output_handler: OutputHandler,
    passthrough_input: bool,
}

impl Engine {
    /// Spawn the session, echoing its output to stdout.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(rules: RuleSet, options: EngineOptions) -> Result<Self> {
        Self::spawn_with_handler(rules, options, |data| {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(data);
            let _ = stdout.flush();
        })
    }

    /// Spawn the session with a custom sink for its output.
    pub fn spawn_with_handler<F>(rules: RuleSet, options: EngineOptions, handler: F) -> Result<Self>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        // Spawned first so a failed shell spawn drops (and kills) it.
        let controller = match &options.controller {
            Some((command, args)) => Some(Controller::spawn(command, args)?),
            None => {
                if rules.uses_controller() {
                    warn!("Rules report to a controller but none is configured; those messages will be dropped");
                }
                None
            }
        };

        // Start the shell and its reader and writer tasks
        let size = options.size.unwrap_or(DEFAULT_SIZE);
        let (pty, reader, writer) = PtySession::spawn(&options.shell, &options.shell_args, size)?;
        let output = spawn_reader(reader);
        let (writer, writer_task) = spawn_writer(writer);

        info!(rules = rules.len(), "Engine started");

        Ok(Engine {
            rules,
            pty,
            writer,
            writer_task,
            output,
            controller,
            output_handler: Arc::new(handler),
            passthrough_input: options.passthrough_input,
        })
    }

    /// Drive the session to completion and return the shell's exit code.
    ///
    /// The run ends when the shell closes the pty, when the controller exits,
    /// or on the first I/O failure. Cleanup runs in every case: the write
    /// queue is closed, the controller is shut down, the shell is killed and
    /// reaped, the writer is drained and the terminal mode is restored.
    pub async fn run(self) -> Result<i32> {
        let Engine {
            rules,
            mut pty,
            writer,
            writer_task,
            mut output,
            mut controller,
            output_handler,
            passthrough_input,
        } = self;

        // Restored when dropped, after the writer has drained
        let raw_mode = if passthrough_input {
            RawModeGuard::enable()?
        } else {
            None
        };

        let mut controller_output = controller.as_mut().and_then(Controller::take_output);
        let mut user_input = passthrough_input.then(|| spawn_reader(io::stdin()));
        let mut writer_task = Some(writer_task);
        let mut windows = WindowChanges::listen();

        let mut reactor = Reactor {
            rules,
            writer,
            controller,
            assembler: LineAssembler::new(),
            output_handler,
        };

        // Multiplex until something ends the run
        let outcome: Result<()> = loop {
            let step = tokio::select! {
                event = output.recv() => match event {
                    Some(ReadEvent::Data(data)) => reactor.on_output(&data).await,
                    Some(ReadEvent::Eof) | None => {
                        info!(pending = reactor.assembler.pending().len(), "Shell closed the terminal");
                        Ok(Step::Finish)
                    }
                    Some(ReadEvent::Failed(e)) => Err(anyhow!(e).context("Failed to read from shell")),
                },
                event = next_event(&mut user_input) => match event {
                    Some(ReadEvent::Data(data)) => reactor.writer.send(data).map(|()| Step::Continue),
                    Some(ReadEvent::Eof) | None => {
                        debug!("User input closed");
                        user_input = None;
                        Ok(Step::Continue)
                    }
                    Some(ReadEvent::Failed(e)) => Err(anyhow!(e).context("Failed to read user input")),
                },
                event = next_event(&mut controller_output) => match event {
                    Some(ReadEvent::Data(data)) => {
                        debug!(bytes = data.len(), "Forwarding controller output");
                        reactor.writer.send(data).map(|()| Step::Continue)
                    }
                    Some(ReadEvent::Eof) | None => {
                        info!("Controller exited");
                        Ok(Step::Finish)
                    }
                    Some(ReadEvent::Failed(e)) => Err(anyhow!(e).context("Failed to read controller output")),
                },
                () = windows.changed() => {
                    if let Some((rows, cols)) = terminal::size() {
                        if let Err(e) = pty.resize(rows, cols) {
                            warn!(error = %e, "Failed to resize terminal");
                        }
                    }
                    Ok(Step::Continue)
                }
                result = join_writer(&mut writer_task) => {
                    result.and_then(|()| Err::<Step, _>(anyhow!("Terminal writer stopped unexpectedly")))
                }
            };

            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Finish) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        // Stop accepting writes
        let Reactor {
            writer, controller, ..
        } = reactor;
        drop(writer);

        // Terminate the controller
        if let Some(controller) = controller {
            controller.shutdown().await;
        }

        // Kill and reap the shell; dropping the session closes the pty
        if let Err(e) = pty.kill() {
            warn!(error = %e, "Failed to kill shell");
        }
        let exit_code = tokio::task::spawn_blocking(move || pty.wait())
            .await
            .context("Shell reaper panicked")?;

        // Let queued writes finish
        if let Some(task) = writer_task {
            match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, task).await {
                Ok(Ok(Err(e))) => debug!(error = %e, "Writer stopped with error during cleanup"),
                Ok(_) => {}
                Err(_) => debug!("Writer did not drain in time"),
            }
        }

        drop(raw_mode);

        outcome?;
        exit_code
    }
}

enum Step {
    Continue,
    Finish,
}

/// The parts of the engine that react to shell output.
struct Reactor {
    rules: RuleSet,
    writer: PtyWriter,
    controller: Option<Controller>,
    assembler: LineAssembler,
    output_handler: OutputHandler,
}

impl Reactor {
    /// Show a chunk of shell output, then run the first matching rule for
    /// every line it completes, in order.
    async fn on_output(&mut self, data: &[u8]) -> Result<Step> {
        // Display first, independent of line boundaries
        (self.output_handler)(data);

        for line in self.assembler.push(data) {
            let Some((rule, bindings)) = self.rules.first_match(&line) else {
                trace!(line = %line, "No rule matched");
                continue;
            };
            debug!(rule = rule.line, action = rule.action.name(), ?bindings, "Rule matched");

            let mut ctx = Context::new(
                &self.writer,
                self.controller.as_mut().map(|c| &mut c.input),
            );
            rule.action
                .execute(&bindings, &mut ctx)
                .await
                .with_context(|| format!("Action for rule at line {} failed", rule.line))?;

            if self.controller.as_ref().is_some_and(|c| c.input.is_closed()) {
                info!("Controller stopped reading");
                return Ok(Step::Finish);
            }
        }

        Ok(Step::Continue)
    }
}

/// Next event from an optional stream. Never resolves once the stream is gone.
async fn next_event(rx: &mut Option<UnboundedReceiver<ReadEvent>>) -> Option<ReadEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Wait for the writer task to finish. Never resolves once it has been joined.
async fn join_writer(task: &mut Option<JoinHandle<io::Result<()>>>) -> Result<()> {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };
    let result = handle.await;
    *task = None;
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e).context("Failed to write to shell"),
        Err(e) => Err(e).context("Terminal writer panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use std::sync::Mutex;
    use std::time::Instant;

    const PING_LINE: &str =
        "64 bytes from slashdot.org (216.34.181.45): icmp_seq=3 ttl=230 time=94.4 ms";

    fn sh(script: &str) -> EngineOptions {
        EngineOptions::new("sh").with_shell_args(["-c", script])
    }

    async fn run_captured(rules: &str, options: EngineOptions) -> (i32, String) {
        let rules = parse_str(rules).unwrap();
        let captured = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink = captured.clone();
        let engine = Engine::spawn_with_handler(rules, options, move |data| {
            sink.lock().unwrap().extend_from_slice(data);
        })
        .unwrap();

        let code = tokio::time::timeout(Duration::from_secs(20), engine.run())
            .await
            .expect("run timed out")
            .unwrap();
        let output = String::from_utf8_lossy(&captured.lock().unwrap()).into_owned();
        (code, output)
    }

    #[tokio::test]
    async fn test_literal_reply_answers_prompt() {
        let (code, output) = run_captured(
            ">Would you like to play a game? (y/n)\n!terminal \"no\"\n",
            sh(r#"echo "Would you like to play a game? (y/n)"; read answer; echo "answer=$answer"; exit 3"#),
        )
        .await;
        assert_eq!(code, 3);
        assert!(output.contains("answer=no"), "got: {output}");
    }

    #[tokio::test]
    async fn test_unmatched_output_is_passed_through() {
        let (code, output) = run_captured(">never printed\n!terminal \"x\"\n", sh("echo hello; exit 0")).await;
        assert_eq!(code, 0);
        assert!(output.contains("hello"));
    }

    #[tokio::test]
    async fn test_controller_receives_bindings_and_types_reply() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report.txt");
        let rules = format!(
            ">{PING_LINE}\n?{}. seq\n?{}... ttl\n?{}.... time\n!controller \"REPLY $seq $ttl $time\"\n",
            " ".repeat(53),
            " ".repeat(59),
            " ".repeat(68),
        );
        let controller_script = format!(
            "read msg; printf '%s\\n' \"$msg\" > '{}'; echo 4; exec sleep 5",
            report.display()
        );
        let options = sh(&format!("printf '%s\\n' '{PING_LINE}'; read code; exit \"$code\""))
            .with_controller("sh", ["-c", controller_script.as_str()]);

        let (code, _) = run_captured(&rules, options).await;
        assert_eq!(code, 4);
        assert_eq!(std::fs::read_to_string(&report).unwrap(), "REPLY 3 230 94.4\n");
    }

    #[tokio::test]
    async fn test_controller_output_is_forwarded_as_keystrokes() {
        let options = sh("trap 'exit 7' INT; echo ready; while :; do sleep 1; done")
            .with_controller("sh", ["-c", r"read go; printf '\003'; exec sleep 5"]);
        let (code, _) = run_captured(">ready\n!controller \"go\"\n", options).await;
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn test_controller_exit_ends_run() {
        let started = Instant::now();
        let options = sh("sleep 30").with_controller("true", Vec::<String>::new());
        run_captured("", options).await;
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_controller_spawn_failure() {
        let options = sh("exit 0").with_controller("/nonexistent/controller", Vec::<String>::new());
        let err = Engine::spawn_with_handler(RuleSet::default(), options, |_| {})
            .err()
            .unwrap();
        assert!(err.to_string().contains("Failed to spawn controller"));
    }

    #[tokio::test]
    async fn test_shell_spawn_failure() {
        let err = Engine::spawn_with_handler(
            RuleSet::default(),
            EngineOptions::new("/nonexistent/shell"),
            |_| {},
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("Failed to spawn command"));
    }

    #[test]
    fn test_options_builder() {
        let options = EngineOptions::new("bash")
            .with_shell_args(["-l"])
            .with_controller("ctl", ["--fast"])
            .with_passthrough_input(true)
            .with_size(40, 120);
        assert_eq!(options.shell_args, vec!["-l"]);
        assert_eq!(options.controller, Some(("ctl".to_string(), vec!["--fast".to_string()])));
        assert!(options.passthrough_input);
        assert_eq!(options.size, Some((40, 120)));
    }
}
