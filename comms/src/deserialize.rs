use std::io;

pub trait Deserialize<'a>: Sized {
    /// Parses an instance out of `buf`.
    ///
    /// Must fail with `io::ErrorKind::UnexpectedEof` whenever `buf` holds
    /// only a prefix of a valid message, receivers rely on it to keep reading.
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}
