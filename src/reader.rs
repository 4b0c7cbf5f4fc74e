use std::io::{self, Read};
use std::thread;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// One step of a byte stream read on a background thread.
#[derive(Debug)]
pub enum ReadEvent {
    Data(Vec<u8>),
    Eof,
    Failed(io::Error),
}

/// Spawns a background thread that drains a blocking reader into a channel.
///
/// The last event sent is always `Eof` or `Failed`, unless the receiver is
/// dropped first.
pub fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> UnboundedReceiver<ReadEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => {
                    let _ = tx.send(ReadEvent::Eof);
                    break;
                }
                Ok(n) => {
                    if tx.send(ReadEvent::Data(buffer[..n].to_vec())).is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_hangup(&e) => {
                    let _ = tx.send(ReadEvent::Eof);
                    break;
                }
                Err(e) => {
                    let _ = tx.send(ReadEvent::Failed(e));
                    break;
                }
            }
        }
    });

    rx
}

/// A pty master reports EIO once every slave descriptor is closed.
#[cfg(unix)]
fn is_hangup(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EIO)
}

#[cfg(not(unix))]
fn is_hangup(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::BrokenPipe
}
