use std::{
    fmt::{self, Debug, Formatter},
    ops::{Deref, DerefMut},
    str,
};

/// A read buffer with a consumed-prefix offset.
///
/// Parsing a response head usually over-reads into the body; `skip_front`
/// marks head bytes as consumed without shifting the remainder, and the
/// leftover bytes are handed to the body reader.
#[derive(Default)]
pub struct Buffer {
    head: usize,
    data: Vec<u8>,
}

impl Buffer {
    /// Construct an empty buffer with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            head: 0,
            data: Vec::with_capacity(capacity),
        }
    }

    /// The number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    /// Whether all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark the first `n` unconsumed bytes as consumed.
    pub fn skip_front(&mut self, n: usize) {
        self.head += n;
        if self.head >= self.data.len() {
            self.data.truncate(0);
            self.head = 0;
        }
    }

    /// Keep only the first `n` unconsumed bytes.
    pub fn truncate(&mut self, n: usize) {
        if n == 0 {
            self.head = 0;
            self.data.truncate(0);
        } else {
            self.data.truncate(self.head + n);
        }
    }

    /// Append bytes after the current content.
    pub fn extend_from_slice(&mut self, slice: &[u8]) {
        self.data.extend_from_slice(slice);
    }

    /// Grow the buffer so that a read has zeroed room to land in,
    /// reserving more capacity when full.
    pub fn expand(&mut self) {
        if self.data.len() == self.data.capacity() {
            self.data.reserve(64);
        }
        self.data.resize(self.data.capacity(), 0);
    }

    /// The unconsumed bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// The unconsumed bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.head..]
    }
}

impl Debug for Buffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match str::from_utf8(self.as_slice()) {
            Ok(s) => Debug::fmt(s, f),
            Err(_) => Debug::fmt(self.as_slice(), f),
        }
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self { head: 0, data }
    }
}

impl From<Buffer> for Vec<u8> {
    fn from(mut buffer: Buffer) -> Self {
        buffer.data.copy_within(buffer.head.., 0);
        buffer.data.truncate(buffer.data.len() - buffer.head);
        buffer.data
    }
}
