//! Socket tasks.
//!
//! Each pooled connection's TCP stream is owned by its own task. The task
//! reports what happens on the socket to the pool as [`SocketEvent`]s and
//! writes whatever the pool hands it. Events carry the slot index and the
//! generation of the socket so the pool can discard news from a socket it
//! has already replaced.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug)]
pub(crate) enum SocketEventKind {
    Connected,
    ConnectFailed(io::Error),
    Data(Bytes),
    SendComplete,
    Closed,
    Failed(io::Error),
}

#[derive(Debug)]
pub(crate) struct SocketEvent {
    pub slot: usize,
    pub generation: u64,
    pub kind: SocketEventKind,
}

/// Handle to a running socket task. Dropping it aborts the task.
pub(crate) struct SocketHandle {
    writes: mpsc::UnboundedSender<Bytes>,
    task: JoinHandle<()>,
}

impl SocketHandle {
    pub fn spawn(
        slot: usize,
        generation: u64,
        addr: SocketAddr,
        connect_timeout: Duration,
        tcp_nodelay: bool,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Self {
        let (writes, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(
            Reporter {
                slot,
                generation,
                events,
            },
            addr,
            connect_timeout,
            tcp_nodelay,
            rx,
        ));
        Self { writes, task }
    }

    /// Queue `bytes` for writing. Returns false if the task has exited.
    pub fn write(&self, bytes: Bytes) -> bool {
        self.writes.send(bytes).is_ok()
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Reporter {
    slot: usize,
    generation: u64,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl Reporter {
    fn report(&self, kind: SocketEventKind) {
        // the pool has shut down if this fails
        let _ = self.events.send(SocketEvent {
            slot: self.slot,
            generation: self.generation,
            kind,
        });
    }
}

async fn run(
    reporter: Reporter,
    addr: SocketAddr,
    connect_timeout: Duration,
    tcp_nodelay: bool,
    mut writes: mpsc::UnboundedReceiver<Bytes>,
) {
    let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            reporter.report(SocketEventKind::ConnectFailed(e));
            return;
        }
        Err(_) => {
            reporter.report(SocketEventKind::ConnectFailed(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {addr} timed out"),
            )));
            return;
        }
    };
    if tcp_nodelay {
        let _ = stream.set_nodelay(true);
    }
    reporter.report(SocketEventKind::Connected);

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        if buf.capacity() < READ_BUFFER_SIZE / 4 {
            buf.reserve(READ_BUFFER_SIZE);
        }
        tokio::select! {
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    reporter.report(SocketEventKind::Closed);
                    return;
                }
                Ok(_) => reporter.report(SocketEventKind::Data(buf.split().freeze())),
                Err(e) => {
                    reporter.report(SocketEventKind::Failed(e));
                    return;
                }
            },
            bytes = writes.recv() => match bytes {
                Some(bytes) => match writer.write_all(&bytes).await {
                    Ok(()) => reporter.report(SocketEventKind::SendComplete),
                    Err(e) => {
                        reporter.report(SocketEventKind::Failed(e));
                        return;
                    }
                },
                // the pool dropped this socket
                None => return,
            },
        }
    }
}
