//! The single serialized write path into the session's input stream.
//!
//! Every keystroke that reaches the shell goes through one [`PtyWriter`]:
//! user passthrough, `terminal` actions, and controller output alike. Each
//! request is written in full and flushed before the next one is taken, so
//! two sources can never interleave inside one logical write.

use anyhow::{Result, anyhow};
use std::io::{self, Write};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::trace;

/// Handle used to request writes into the session input.
#[derive(Debug)]
pub struct PtyWriter {
    tx: UnboundedSender<Vec<u8>>,
}

impl PtyWriter {
    /// Queue one atomic write request.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.tx
            .send(data.into())
            .map_err(|_| anyhow!("Terminal writer has stopped"))
    }
}

/// Spawn the writer task that owns `writer`.
///
/// The task ends with `Ok(())` once every [`PtyWriter`] handle is dropped and
/// the queue is drained, or with the first write error.
pub fn spawn_writer<W: Write + Send + 'static>(mut writer: W) -> (PtyWriter, JoinHandle<io::Result<()>>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let handle = tokio::task::spawn_blocking(move || {
        while let Some(data) = rx.blocking_recv() {
            writer.write_all(&data)?;
            writer.flush()?;
            trace!(len = data.len(), "Wrote to PTY");
        }
        Ok(())
    });

    (PtyWriter { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<Vec<u8>>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_requests_are_written_whole_and_in_order() {
        let sink = Sink::default();
        let (writer, handle) = spawn_writer(sink.clone());
        writer.send(b"no\n".to_vec()).unwrap();
        writer.send(vec![3u8]).unwrap();
        writer.send("ls -l\n").unwrap();
        drop(writer);
        handle.await.unwrap().unwrap();

        let written = sink.0.lock().unwrap().clone();
        assert_eq!(written, vec![b"no\n".to_vec(), vec![3u8], b"ls -l\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_write_error_ends_task() {
        let (writer, handle) = spawn_writer(Broken);
        writer.send("x").unwrap();
        let result = handle.await.unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
        assert!(writer.send("y").is_err());
    }
}
