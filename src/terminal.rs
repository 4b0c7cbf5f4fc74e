//! The user's own terminal: raw mode, size and resize notifications.

use anyhow::{Context as _, Result};
use crossterm::terminal;
use std::io::IsTerminal;
use tracing::{debug, warn};

/// Whether stdin is an interactive terminal.
pub fn is_tty() -> bool {
    std::io::stdin().is_terminal()
}

/// Current size of the user's terminal as `(rows, cols)`, if it has one.
pub fn size() -> Option<(u16, u16)> {
    if !is_tty() {
        return None;
    }
    match terminal::size() {
        Ok((cols, rows)) if rows > 0 && cols > 0 => Some((rows, cols)),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Terminal size unavailable");
            None
        }
    }
}

/// Puts the user's terminal in raw mode and restores it on drop.
#[derive(Debug)]
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    /// Enable raw mode. Returns `None` when stdin is not a terminal.
    pub fn enable() -> Result<Option<Self>> {
        if !is_tty() {
            return Ok(None);
        }
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        debug!("Raw mode enabled");
        Ok(Some(Self { _private: () }))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            warn!(error = %e, "Failed to restore terminal mode");
        } else {
            debug!("Raw mode disabled");
        }
    }
}

/// Stream of window-size change notifications (SIGWINCH).
pub struct WindowChanges {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl WindowChanges {
    pub fn listen() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let signal = match signal(SignalKind::window_change()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(error = %e, "Cannot watch window size changes");
                    None
                }
            };
            Self { signal }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    /// Resolve on the next size change. Never resolves if changes cannot be
    /// observed.
    pub async fn changed(&mut self) {
        #[cfg(unix)]
        {
            if let Some(signal) = self.signal.as_mut() {
                if signal.recv().await.is_some() {
                    return;
                }
                self.signal = None;
            }
        }
        std::future::pending::<()>().await
    }
}
