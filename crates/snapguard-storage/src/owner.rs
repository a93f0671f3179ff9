//! Ownership of a transformed stream together with its raw source

use std::io::{self, Read};

use tracing::{debug, trace};

/// A transformed stream that owns the raw stream it reads from.
///
/// `T` is a codec reader holding the raw backend stream as its last field, so
/// releasing the owner drops the transform state first and the raw stream
/// second. Both happen exactly once: on [`StreamOwner::close`], or on drop
/// along any other path (early return, error, panic unwind).
pub struct StreamOwner<T: Read> {
    stream: Option<T>,
    snapshot: String,
    bytes: u64,
}

impl<T: Read> StreamOwner<T> {
    pub fn new(stream: T, snapshot: impl Into<String>) -> Self {
        Self {
            stream: Some(stream),
            snapshot: snapshot.into(),
            bytes: 0,
        }
    }

    /// Bytes produced by the transform so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    /// Release the transform and the raw stream now.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            trace!(snapshot = %self.snapshot, bytes = self.bytes, "snapshot stream released");
        }
    }
}

impl<T: Read> Read for StreamOwner<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };
        match stream.read(buf) {
            Ok(n) => {
                self.bytes += n as u64;
                Ok(n)
            }
            Err(e) => {
                debug!(snapshot = %self.snapshot, bytes = self.bytes, "snapshot stream failed: {e}");
                Err(e)
            }
        }
    }
}

impl<T: Read> Drop for StreamOwner<T> {
    fn drop(&mut self) {
        self.release();
    }
}
