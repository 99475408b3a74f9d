//! Write side of an HTTP/1.1 socket.
//!
//! Responses never touch the socket directly: they push [`SocketCommand`]s
//! into a [`SocketHandle`], and a single [`SocketWriter`] task per connection
//! writes them in order. The writer drains every command already queued
//! before flushing, so a head and body written back to back leave in one
//! segment.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::trace;

use crate::protocol::ResponseError;

const COMMAND_CHANNEL_SIZE: usize = 32;
const WRITE_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug)]
pub enum SocketCommand {
    Write(Bytes),
    /// Flush what is queued, then shut the write half down.
    Close,
}

#[derive(Debug, Clone)]
pub struct SocketHandle {
    sender: mpsc::Sender<SocketCommand>,
}

impl SocketHandle {
    pub async fn write(&self, bytes: Bytes) -> Result<(), ResponseError> {
        self.sender.send(SocketCommand::Write(bytes)).await.map_err(|_| ResponseError::Closed)
    }

    pub async fn close(&self) {
        // the writer being gone already means the socket is closed
        let _ = self.sender.send(SocketCommand::Close).await;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Debug)]
pub struct SocketWriter<W> {
    writer: BufWriter<W>,
    receiver: mpsc::Receiver<SocketCommand>,
}

impl<W> SocketWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> (SocketHandle, Self) {
        let (sender, receiver) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        (SocketHandle { sender }, Self { writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, writer), receiver })
    }

    /// Runs until a [`SocketCommand::Close`] arrives or every handle is dropped.
    pub async fn run(mut self) -> io::Result<()> {
        while let Some(command) = self.receiver.recv().await {
            let mut close = self.apply(command).await?;
            while !close {
                match self.receiver.try_recv() {
                    Ok(command) => close = self.apply(command).await?,
                    Err(_) => break,
                }
            }

            self.writer.flush().await?;
            if close {
                break;
            }
        }

        trace!("socket writer shutting down");
        self.writer.shutdown().await
    }

    async fn apply(&mut self, command: SocketCommand) -> io::Result<bool> {
        match command {
            SocketCommand::Write(bytes) => {
                self.writer.write_all(&bytes).await?;
                Ok(false)
            }
            SocketCommand::Close => Ok(true),
        }
    }
}
