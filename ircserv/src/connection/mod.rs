//! Per-client connection handler.
//!
//! Each TCP connection gets a reader loop (this task) and a writer task:
//! - the reader feeds socket chunks into a [`LineBuffer`] and runs every
//!   complete line through the dispatcher under the registry lock
//! - the writer drains the session's outbound queue onto the socket
//!
//! The reader stops on EOF, a read error, QUIT or server shutdown. In every
//! case the session is then removed from the registry (peers hear a QUIT) and
//! the writer flushes whatever is still queued before the socket closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientId, ClientSession};
use crate::codec::LineBuffer;
use crate::command::{Flow, closing_link};
use crate::server::SharedState;

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 512;
/// Lines written before an explicit flush.
const MAX_WRITE_BATCH: usize = 64;
/// How long a closing connection waits for its writer to finish.
const WRITER_GRACE: Duration = Duration::from_secs(2);

const SHUTDOWN_REASON: &str = "Server shutting down";

/// Why the reader loop ended.
#[derive(Debug)]
enum Disconnect {
    /// The client sent QUIT; its session is already gone.
    Quit,
    Eof,
    Shutdown,
    ReadError(std::io::Error),
}

/// Handle a plain TCP connection until it closes.
pub async fn handle(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<SharedState>,
    cancel: CancellationToken,
) -> Result<()> {
    let id = state.next_client_id();
    let host = peer.ip().to_string();
    tracing::info!(client = %id, %peer, "New connection");

    let (tx, rx) = mpsc::channel::<String>(state.config.outbound_queue);
    state
        .registry
        .lock()
        .add_client(ClientSession::new(id, host.clone(), tx));

    let (mut reader, writer) = stream.into_split();
    let mut write_handle = tokio::spawn(write_loop(id, writer, rx));

    let disconnect = read_loop(id, &mut reader, &state, &cancel).await;

    {
        let mut reg = state.registry.lock();
        let reason = match disconnect {
            Disconnect::Shutdown => {
                reg.send_to(id, &closing_link(&host, SHUTDOWN_REASON));
                SHUTDOWN_REASON
            }
            Disconnect::ReadError(_) => "Read error",
            Disconnect::Quit | Disconnect::Eof => "Connection closed",
        };
        // The session owns the only sender, so removing it lets the writer drain and exit.
        reg.remove_client(id, reason);
    }

    if tokio::time::timeout(WRITER_GRACE, &mut write_handle)
        .await
        .is_err()
    {
        tracing::warn!(client = %id, "Writer did not finish, aborting");
        write_handle.abort();
    }
    tracing::info!(client = %id, %peer, ?disconnect, "Connection closed");

    match disconnect {
        Disconnect::ReadError(e) => Err(e).with_context(|| format!("read from {peer} failed")),
        _ => Ok(()),
    }
}

async fn read_loop(
    id: ClientId,
    reader: &mut OwnedReadHalf,
    state: &SharedState,
    cancel: &CancellationToken,
) -> Disconnect {
    let mut buffer = LineBuffer::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return Disconnect::Shutdown,
            read = reader.read(&mut chunk) => match read {
                Ok(0) => return Disconnect::Eof,
                Ok(n) => n,
                Err(e) => return Disconnect::ReadError(e),
            },
        };

        if let Err(overflow) = buffer.append(&chunk[..n]) {
            tracing::warn!(client = %id, discarded = overflow.discarded, "{overflow}");
        }

        while let Some(line) = buffer.extract_line() {
            let Some(command) = state.dispatcher.parse(id, &line) else {
                tracing::debug!(client = %id, "Ignoring unrecognized line: {line}");
                continue;
            };
            tracing::debug!(client = %id, verb = %command.verb(), "<- {line}");
            let flow = command.execute(&mut state.registry.lock());
            if flow == Flow::Close {
                return Disconnect::Quit;
            }
        }
    }
}

/// Drain the outbound queue onto the socket, batching queued lines before
/// each flush. Ends when every sender is gone or the socket fails.
async fn write_loop(id: ClientId, mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<String>) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            tracing::warn!(client = %id, "Write error: {e}");
            return;
        }
        let mut batched = 0;
        while batched < MAX_WRITE_BATCH {
            let Ok(queued) = rx.try_recv() else {
                break;
            };
            if let Err(e) = writer.write_all(queued.as_bytes()).await {
                tracing::warn!(client = %id, "Write error: {e}");
                return;
            }
            batched += 1;
        }
        if let Err(e) = writer.flush().await {
            tracing::warn!(client = %id, "Flush error: {e}");
            return;
        }
    }
    let _ = writer.shutdown().await;
}
