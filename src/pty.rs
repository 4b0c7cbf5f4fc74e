use anyhow::{Context, Result};
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use tracing::{debug, info};

/// Default size used when the invoking terminal's size is unknown.
pub const DEFAULT_SIZE: (u16, u16) = (24, 80);

/// Manages the shell running inside a PTY
pub struct PtySession {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl PtySession {
    /// Spawn a program in a new PTY.
    ///
    /// Returns the session together with the read and write sides of the
    /// master, which the caller hands to its reader and writer tasks.
    pub fn spawn(
        command: &str,
        args: &[String],
        (rows, cols): (u16, u16),
    ) -> Result<(Self, Box<dyn Read + Send>, Box<dyn Write + Send>)> {
        let pty_system = portable_pty::native_pty_system();

        let pty_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        // Open the PTY at the requested size
        let pair = pty_system
            .openpty(pty_size)
            .context("Failed to open PTY")?;

        // Build the command, inheriting the caller's environment and cwd
        let mut cmd = CommandBuilder::new(command);
        for arg in args {
            cmd.arg(arg);
        }
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        // Spawn the shell on the slave side
        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn command: {command}"))?;
        // Only the child may keep the slave open, otherwise reads never see EOF.
        drop(pair.slave);

        info!(command, pid = ?child.process_id(), rows, cols, "PTY spawned");

        // Get reader and writer from the master PTY
        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;

        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        let session = PtySession {
            master: pair.master,
            child,
        };

        Ok((session, reader, writer))
    }

    /// Check if the child process is still running
    pub fn is_running(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    /// Terminate the child process if it is still running
    pub fn kill(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("Killing shell");
            self.child.kill().context("Failed to kill shell")?;
        }
        Ok(())
    }

    /// Wait for the child process to exit and return its exit code
    pub fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().context("Failed to wait for shell")?;
        let code = status.exit_code() as i32;
        info!(exit_code = code, "Shell exited");
        Ok(code)
    }

    /// Resize the PTY
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self.master.resize(size).context("Failed to resize PTY")?;
        debug!(rows, cols, "PTY resized");
        Ok(())
    }
}
