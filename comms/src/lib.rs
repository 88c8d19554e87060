mod deserialize;
pub mod msg;
mod receiver;
mod sender;
mod serialize;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use deserialize::Deserialize;
pub use receiver::RawReceiver;
pub use sender::RawSender;
pub use serialize::Serialize;

/// The default amount of bytes a `RawReceiver` accepts for a single message.
pub const DEFAULT_CAPACITY: usize = 5000;

/// Creates both `RawReceiver` and `RawSender` network channel parts.
///
/// The channel carries one unframed message per direction, the receiving end
/// accumulates bytes until a whole message is available or `capacity` is reached.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
/// * `capacity` - The maximum amount of bytes of a single received message.
///
/// # Returns
/// A communication stream in the form of a raw receiver and sender.
pub fn channel<R, W>(rx: R, tx: W, capacity: usize) -> (RawReceiver<R>, RawSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (RawReceiver::new(rx, capacity), RawSender::new(tx))
}
