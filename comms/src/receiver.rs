use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Deserialize;

/// The receiving end handle of the communication.
///
/// There is no framing on the wire, the message length is whatever arrived
/// before the peer's message parsed completely, the stream ended or the
/// capacity was exhausted.
pub struct RawReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<u8>,
    capacity: usize,
}

impl<R: AsyncRead + Unpin> RawReceiver<R> {
    /// Creates a new `RawReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    /// * `capacity` - The maximum size in bytes of a received message.
    pub(super) fn new(rx: R, capacity: usize) -> Self {
        Self {
            rx,
            buf: vec![0; capacity],
            capacity,
        }
    }

    /// Waits to receive a new message from the inner receiver.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure.
    /// A message that doesn't fit in the capacity fails with `io::ErrorKind::InvalidData`.
    pub async fn recv<T>(&mut self) -> io::Result<T>
    where
        T: for<'a> Deserialize<'a>,
    {
        let Self { rx, buf, capacity } = self;
        let mut len = 0;

        loop {
            if len == *capacity {
                let text = format!("message exceeds the receive capacity of {capacity} bytes");
                return Err(io::Error::new(io::ErrorKind::InvalidData, text));
            }

            let n = rx.read(&mut buf[len..]).await?;
            if n == 0 {
                return T::deserialize(trim_nul(&buf[..len]));
            }

            len += n;
            match T::deserialize(trim_nul(&buf[..len])) {
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => continue,
                res => return res,
            }
        }
    }
}

/// Strips the NUL terminators some peers write after the message.
fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}
