//! The implementation of the sending end of the one-shot rendezvous exchange.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::Serialize;

/// The sending end handle of the communication.
///
/// Messages are written as is, without any length prefix.
pub struct RawSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> RawSender<W> {
    /// Creates a new `RawSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Sends `msg` through the inner sender.
    ///
    /// # Arguments
    /// * `msg` - A serializable object.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> io::Result<()> {
        let Self { buf, tx } = self;

        buf.clear();
        msg.serialize(buf)?;

        tx.write_all(buf).await?;
        tx.flush().await
    }

    /// Consumes the sender and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.tx
    }
}
