use futures_lite::{ready, AsyncRead, AsyncReadExt};
use std::{
    borrow::Cow,
    fmt::{self, Debug, Formatter},
    io::{Error, ErrorKind, Result},
    pin::Pin,
    task::{Context, Poll},
};
use BodyRepr::{Empty, Fixed, Streaming};

/// An outgoing request body.
///
/// Holds either in-memory content or a boxed [`AsyncRead`] source.
/// Reading from a `Body` yields wire bytes: fixed content verbatim, and
/// unknown-length streaming content framed as chunked transfer coding, so
/// a serializer can `io::copy` a body to the transport regardless of kind.
#[derive(Debug, Default)]
pub struct Body(BodyRepr);

#[derive(Default)]
enum BodyRepr {
    #[default]
    Empty,

    Fixed {
        content: Cow<'static, [u8]>,
        offset: usize,
    },

    Streaming {
        reader: Pin<Box<dyn AsyncRead + Send + Sync + 'static>>,
        len: Option<u64>,
        sent: u64,
        done: bool,
    },
}

impl Body {
    /// Construct a body from content already in memory.
    pub fn new_fixed(content: impl Into<Cow<'static, [u8]>>) -> Self {
        Self(Fixed {
            content: content.into(),
            offset: 0,
        })
    }

    /// Construct a body from a streaming source. With `len` of None the
    /// body is sent with chunked transfer coding; otherwise exactly `len`
    /// bytes are sent with a content-length.
    pub fn new_streaming(
        reader: impl AsyncRead + Send + Sync + 'static,
        len: Option<u64>,
    ) -> Self {
        Self(Streaming {
            reader: Box::pin(reader),
            len,
            sent: 0,
            done: false,
        })
    }

    /// The content length of this body when known. None means chunked.
    pub fn len(&self) -> Option<u64> {
        match &self.0 {
            Empty => Some(0),
            Fixed { content, .. } => Some(content.len() as u64),
            Streaming { len, .. } => *len,
        }
    }

    /// Whether this body is known to contain no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// A borrow of the fixed content, when this body is in memory.
    pub fn fixed_bytes(&self) -> Option<&[u8]> {
        match &self.0 {
            Fixed { content, .. } => Some(content),
            _ => None,
        }
    }

    /// Consume the body, returning all of its content. Streaming bodies
    /// are read to completion; a streaming body that has already been
    /// partially sent returns an error.
    pub async fn into_bytes(self) -> Result<Cow<'static, [u8]>> {
        match self.0 {
            Empty => Ok(Cow::Borrowed(b"")),

            Fixed { content, .. } => Ok(content),

            Streaming {
                mut reader,
                len,
                sent: 0,
                done: false,
            } => {
                let mut content = len
                    .and_then(|len| len.try_into().ok())
                    .map(Vec::with_capacity)
                    .unwrap_or_default();
                reader.read_to_end(&mut content).await?;
                Ok(Cow::Owned(content))
            }

            Streaming { .. } => Err(Error::new(
                ErrorKind::Other,
                "streaming body already partially read",
            )),
        }
    }
}

/// The largest payload read that fits in `buf_len` bytes once chunk
/// framing (hex length, two crlf pairs) is added around it.
fn chunk_payload_capacity(buf_len: usize) -> usize {
    assert!(
        buf_len >= 6,
        "{buf_len} byte buffers are too small to frame a chunk"
    );

    let after_framing = buf_len - 4;
    let bits = usize::BITS - after_framing.leading_zeros();
    let hex_digits = bits.div_ceil(4).max(1) as usize;
    after_framing.saturating_sub(hex_digits)
}

impl AsyncRead for Body {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize>> {
        match &mut self.0 {
            Empty => Poll::Ready(Ok(0)),

            Fixed { content, offset } => {
                let bytes = (content.len() - *offset).min(buf.len());
                buf[..bytes].copy_from_slice(&content[*offset..*offset + bytes]);
                *offset += bytes;
                Poll::Ready(Ok(bytes))
            }

            Streaming {
                reader,
                len: Some(len),
                sent,
                done,
            } => {
                if *done {
                    return Poll::Ready(Ok(0));
                }

                let remaining = (*len - *sent).try_into().unwrap_or(buf.len());
                let limit = remaining.min(buf.len());
                let bytes = ready!(reader
                    .as_mut()
                    .poll_read(cx, &mut buf[..limit]))?;

                if bytes == 0 {
                    *done = true;
                } else {
                    *sent += bytes as u64;
                }

                Poll::Ready(Ok(bytes))
            }

            Streaming {
                reader,
                len: None,
                sent,
                done,
            } => {
                if *done {
                    return Poll::Ready(Ok(0));
                }

                let capacity = chunk_payload_capacity(buf.len());
                let bytes = ready!(reader.as_mut().poll_read(cx, &mut buf[..capacity]))?;

                if bytes == 0 {
                    *done = true;
                } else {
                    *sent += bytes as u64;
                }

                // frame in place: size CRLF payload CRLF. a zero-byte read
                // produces the terminal 0\r\n\r\n chunk.
                let prefix = format!("{bytes:X}\r\n");
                let total = prefix.len() + bytes + 2;
                buf.copy_within(..bytes, prefix.len());
                buf[..prefix.len()].copy_from_slice(prefix.as_bytes());
                buf[total - 2..total].copy_from_slice(b"\r\n");
                Poll::Ready(Ok(total))
            }
        }
    }
}

impl Debug for BodyRepr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Empty => f.debug_tuple("Empty").finish(),

            Fixed { content, offset } => f
                .debug_struct("Fixed")
                .field("content", &String::from_utf8_lossy(content))
                .field("offset", offset)
                .finish(),

            Streaming {
                len, sent, done, ..
            } => f
                .debug_struct("Streaming")
                .field("reader", &"..")
                .field("len", len)
                .field("sent", sent)
                .field("done", done)
                .finish(),
        }
    }
}

impl From<String> for Body {
    fn from(content: String) -> Self {
        content.into_bytes().into()
    }
}

impl From<&'static str> for Body {
    fn from(content: &'static str) -> Self {
        Self::new_fixed(content.as_bytes())
    }
}

impl From<Vec<u8>> for Body {
    fn from(content: Vec<u8>) -> Self {
        Self::new_fixed(content)
    }
}

impl From<&'static [u8]> for Body {
    fn from(content: &'static [u8]) -> Self {
        Self::new_fixed(content)
    }
}

#[cfg(test)]
mod tests {
    use super::{chunk_payload_capacity, Body};
    use futures_lite::{future::block_on, io::Cursor, AsyncReadExt};

    #[test]
    fn payload_capacity_fits_framing() {
        for (buf_len, expected) in [(6, 1), (7, 2), (20, 14), (22, 16), (262, 255), (263, 256)] {
            let capacity = chunk_payload_capacity(buf_len);
            assert_eq!(capacity, expected, "for buffer length {buf_len}");

            let framed = capacity + format!("{capacity:X}").len() + 4;
            assert!(framed <= buf_len, "{framed} > {buf_len}");
        }
    }

    #[test]
    fn streaming_without_length_frames_chunks() {
        block_on(async {
            let mut body = Body::new_streaming(Cursor::new("hello world"), None);
            let mut out = Vec::new();
            loop {
                let mut buf = [0; 32];
                match body.read(&mut buf).await.unwrap() {
                    0 => break,
                    n => out.extend_from_slice(&buf[..n]),
                }
            }
            let out = String::from_utf8(out).unwrap();
            assert!(out.starts_with("B\r\nhello world\r\n"));
            assert!(out.ends_with("0\r\n\r\n"));
        });
    }

    #[test]
    fn fixed_reads_verbatim() {
        block_on(async {
            let mut body = Body::from("abc");
            assert_eq!(body.len(), Some(3));
            let mut out = String::new();
            body.read_to_string(&mut out).await.unwrap();
            assert_eq!(out, "abc");
        });
    }
}
