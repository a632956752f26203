use crate::{maybe_owned::MaybeOwned, Buffer, Error};
use encoding_rs::Encoding;
use futures_lite::{io, ready, AsyncRead, AsyncReadExt, Stream};
use std::{
    fmt::{self, Debug, Formatter},
    io::ErrorKind,
    pin::Pin,
    task::{Context, Poll},
};

use Poll::{Pending, Ready};
use ReceivedBodyState::{Chunked, End, FixedLength, Start};

/// A response body read incrementally from the transport.
///
/// The body either borrows the transport, buffer, and read state from an
/// in-flight exchange, or owns them outright when it outlives the exchange
/// (a streamed response). An owned body may carry an `on_completion` hook,
/// which receives the transport back exactly when the body reaches its
/// end; dropping the body before that point drops the transport with it,
/// since there is no way to prove the remaining bytes were consumed
/// without reading them.
pub struct ReceivedBody<'conn, Transport> {
    content_length: Option<u64>,
    buffer: MaybeOwned<'conn, Buffer>,
    transport: Option<MaybeOwned<'conn, Transport>>,
    state: MaybeOwned<'conn, ReceivedBodyState>,
    on_completion: Option<Box<dyn Fn(Transport) + Send + Sync + 'static>>,
    encoding: &'static Encoding,
    max_len: Option<u64>,
}

impl<'conn, Transport> ReceivedBody<'conn, Transport>
where
    Transport: AsyncRead + Unpin + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    #[doc(hidden)]
    pub fn new(
        content_length: Option<u64>,
        buffer: impl Into<MaybeOwned<'conn, Buffer>>,
        transport: impl Into<MaybeOwned<'conn, Transport>>,
        state: impl Into<MaybeOwned<'conn, ReceivedBodyState>>,
        on_completion: Option<Box<dyn Fn(Transport) + Send + Sync + 'static>>,
        encoding: &'static Encoding,
        max_len: Option<u64>,
    ) -> Self {
        Self {
            content_length,
            buffer: buffer.into(),
            transport: Some(transport.into()),
            state: state.into(),
            on_completion,
            encoding,
            max_len,
        }
    }

    /// The length of this body when the response declared one. Chunked
    /// bodies have no known length.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// The character encoding derived from the response content-type.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Read the entire remaining body into memory.
    ///
    /// Enforces the configured buffered-body limit, if any, returning
    /// [`Error::BodyTooLarge`] when exceeded. This consumes the only copy
    /// of the content.
    pub async fn read_bytes(mut self) -> crate::Result<Vec<u8>> {
        if let (Some(max_len), Some(content_length)) = (self.max_len, self.content_length) {
            if content_length > max_len {
                return Err(Error::BodyTooLarge(max_len));
            }
        }

        let max_len = self.max_len;
        let mut content = self
            .content_length
            .and_then(|length| length.try_into().ok())
            .map(Vec::with_capacity)
            .unwrap_or_default();

        let mut buf = vec![0; 16 * 1024];
        loop {
            match self.read(&mut buf).await? {
                0 => break,
                bytes => {
                    content.extend_from_slice(&buf[..bytes]);
                    if let Some(max_len) = max_len {
                        if content.len() as u64 > max_len {
                            return Err(Error::BodyTooLarge(max_len));
                        }
                    }
                }
            }
        }

        Ok(content)
    }

    /// Read the entire remaining body as a string, decoding with the
    /// response charset. Malformed sequences become replacement
    /// characters.
    pub async fn read_string(self) -> crate::Result<String> {
        let encoding = self.encoding();
        let bytes = self.read_bytes().await?;
        let (string, _, _) = encoding.decode(&bytes);
        Ok(string.into_owned())
    }

    /// Read the remainder of this body and discard it, returning the
    /// number of bytes consumed. Necessary before a keep-alive connection
    /// can carry another exchange.
    pub async fn drain(self) -> io::Result<u64> {
        io::copy(self, io::sink()).await
    }

    fn owns_transport(&self) -> bool {
        self.transport
            .as_ref()
            .map(MaybeOwned::is_owned)
            .unwrap_or_default()
    }

    fn read_raw(&mut self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        match self.transport.as_mut() {
            Some(transport) => read_buffered(&mut self.buffer, &mut **transport, cx, buf),
            None => Ready(Err(ErrorKind::NotConnected.into())),
        }
    }
}

impl<Transport> ReceivedBody<'static, Transport> {
    /// Take the owned transport out of this body, if present.
    pub fn take_transport(&mut self) -> Option<Transport> {
        self.transport.take().map(MaybeOwned::unwrap_owned)
    }
}

/// Pending buffered bytes are served before the transport is polled; when
/// the buffer empties into `buf` with room left over, the transport is
/// polled opportunistically for the remainder.
fn read_buffered<Transport>(
    buffer: &mut Buffer,
    transport: &mut Transport,
    cx: &mut Context<'_>,
    buf: &mut [u8],
) -> Poll<io::Result<usize>>
where
    Transport: AsyncRead + Unpin,
{
    if buffer.is_empty() {
        return Pin::new(transport).poll_read(cx, buf);
    }

    let len = buffer.len().min(buf.len());
    buf[..len].copy_from_slice(&buffer[..len]);
    buffer.skip_front(len);

    if len == buf.len() {
        return Ready(Ok(len));
    }

    match Pin::new(transport).poll_read(cx, &mut buf[len..]) {
        Ready(Ok(bytes)) => Ready(Ok(len + bytes)),
        Pending => Ready(Ok(len)),
        Ready(Err(error)) => Ready(Err(error)),
    }
}

/// Decode chunked transfer coding in place.
///
/// `buf[..len]` contains raw wire bytes; `remaining` is the unread portion
/// of the current chunk including its trailing crlf. Payload ranges are
/// compacted to the front of `buf`, and any bytes past the terminal chunk
/// are returned for the connection's read buffer (pipelined data).
fn decode_chunks(
    remaining: usize,
    mut total: u64,
    buf: &mut [u8],
) -> io::Result<(ReceivedBodyState, usize, Option<Vec<u8>>)> {
    let mut payload_ranges = vec![];
    let mut cursor = 0;
    let mut chunk_end = remaining;

    let (state, unused) = loop {
        if chunk_end > 2 {
            let payload_end = buf.len().min(chunk_end - 2);
            payload_ranges.push(cursor..payload_end);
            total += (payload_end - cursor) as u64;
        }

        cursor = chunk_end;

        if cursor >= buf.len() {
            break (
                Chunked {
                    remaining: cursor - buf.len(),
                    total,
                },
                None,
            );
        }

        match httparse::parse_chunk_size(&buf[cursor..]) {
            Ok(httparse::Status::Complete((framing, chunk_size))) => {
                cursor += framing;
                chunk_end = 2 + cursor + chunk_size as usize;

                if chunk_size == 0 {
                    let unused = (chunk_end < buf.len()).then(|| buf[chunk_end..].to_vec());
                    break (End, unused);
                }
            }

            Ok(httparse::Status::Partial) => {
                let unused = (cursor < buf.len()).then(|| buf[cursor..].to_vec());
                break (Chunked { remaining: 0, total }, unused);
            }

            Err(httparse::InvalidChunkSize) => {
                return Err(io::Error::new(ErrorKind::InvalidData, "invalid chunk size"));
            }
        }
    };

    let mut bytes = 0;
    for range in payload_ranges.drain(..) {
        let range_len = range.end - range.start;
        buf.copy_within(range, bytes);
        bytes += range_len;
    }

    Ok((state, bytes, unused))
}

impl<Transport> AsyncRead for ReceivedBody<'_, Transport>
where
    Transport: AsyncRead + Unpin + Send + Sync + 'static,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let (next_state, bytes, unused) = match *self.state {
            Start => (
                match self.content_length {
                    Some(0) => End,

                    Some(total_length) => FixedLength {
                        current_index: 0,
                        total_length,
                    },

                    None => Chunked {
                        remaining: 0,
                        total: 0,
                    },
                },
                0,
                None,
            ),

            Chunked { remaining, total } => {
                let bytes = ready!(self.read_raw(cx, buf)?);
                // eof before the terminal chunk is a truncated message
                if bytes == 0 {
                    return Ready(Err(ErrorKind::UnexpectedEof.into()));
                }
                decode_chunks(remaining, total, &mut buf[..bytes])?
            }

            FixedLength {
                current_index,
                total_length,
            } => {
                let remaining = usize::try_from(total_length - current_index).unwrap_or(usize::MAX);
                let limit = buf.len().min(remaining);
                let buf = &mut buf[..limit];
                let bytes = ready!(self.read_raw(cx, buf)?);
                if bytes == 0 {
                    return Ready(Err(ErrorKind::UnexpectedEof.into()));
                }

                let current_index = current_index + bytes as u64;
                let state = if current_index == total_length {
                    End
                } else {
                    FixedLength {
                        current_index,
                        total_length,
                    }
                };

                (state, bytes, None)
            }

            End => (End, 0, None),
        };

        if let Some(unused) = unused {
            self.buffer.extend_from_slice(&unused);
        }

        *self.state = next_state;

        if *self.state == End {
            if self.on_completion.is_some() && self.owns_transport() {
                let transport = self.transport.take().unwrap().unwrap_owned();
                let on_completion = self.on_completion.take().unwrap();
                on_completion(transport);
            }
            Ready(Ok(bytes))
        } else if bytes == 0 {
            cx.waker().wake_by_ref();
            Pending
        } else {
            Ready(Ok(bytes))
        }
    }
}

const STREAM_CHUNK_LENGTH: usize = 4 * 1024;

impl<Transport> Stream for ReceivedBody<'_, Transport>
where
    Transport: AsyncRead + Unpin + Send + Sync + 'static,
{
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut chunk = vec![0; STREAM_CHUNK_LENGTH];
        match Pin::new(&mut *self).poll_read(cx, &mut chunk) {
            Pending => Pending,
            Ready(Ok(0)) => Ready(None),
            Ready(Ok(bytes)) => {
                chunk.truncate(bytes);
                Ready(Some(Ok(chunk)))
            }
            Ready(Err(error)) => Ready(Some(Err(error))),
        }
    }
}

impl<Transport> Debug for ReceivedBody<'_, Transport> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedBody")
            .field("state", &*self.state)
            .field("content_length", &self.content_length)
            .field("buffer", &*self.buffer)
            .field("on_completion", &self.on_completion.is_some())
            .field("max_len", &self.max_len)
            .finish()
    }
}

/// The read state of a [`ReceivedBody`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ReceivedBodyState {
    /// Nothing has been read; the framing has not been decided yet.
    #[default]
    Start,

    /// Reading a chunked body.
    Chunked {
        /// bytes left in the current chunk, including its trailing crlf;
        /// zero means the next bytes are a chunk size line
        remaining: usize,
        /// payload bytes decoded so far
        total: u64,
    },

    /// Reading a body with a declared content-length.
    FixedLength {
        /// bytes read so far
        current_index: u64,
        /// the declared length
        total_length: u64,
    },

    /// The body has been fully read.
    End,
}

#[cfg(test)]
mod tests {
    use super::{decode_chunks, ReceivedBody, ReceivedBodyState};
    use crate::Buffer;
    use encoding_rs::UTF_8;
    use futures_lite::{future::block_on, io::Cursor, AsyncRead, AsyncReadExt};

    fn assert_decoded(input: (usize, &str), expected: (Option<usize>, &str, Option<&str>)) {
        let (remaining, wire) = input;
        let mut buf = wire.to_string().into_bytes();
        let (state, bytes, unused) = decode_chunks(remaining, 0, &mut buf).unwrap();

        assert_eq!(
            (
                match state {
                    ReceivedBodyState::Chunked { remaining, .. } => Some(remaining),
                    ReceivedBodyState::End => None,
                    other => panic!("unexpected state {other:?}"),
                },
                &*String::from_utf8_lossy(&buf[..bytes]),
                unused.as_deref().map(String::from_utf8_lossy).as_deref(),
            ),
            expected
        );
    }

    #[test]
    fn chunk_decoding() {
        assert_decoded((0, "5\r\n12345\r\n"), (Some(0), "12345", None));
        assert_decoded((0, "F\r\n1"), (Some(14 + 2), "1", None));
        assert_decoded((0, "5\r\n123"), (Some(2 + 2), "123", None));
        assert_decoded((0, "1\r\nX\r\n1\r\nX\r\n"), (Some(0), "XX", None));
        assert_decoded((0, "1\r\nX\r\n1\r\nX\r\n1"), (Some(0), "XX", Some("1")));
        assert_decoded((0, "FFF\r\n"), (Some(0xfff + 2), "", None));
        assert_decoded((10, "hello"), (Some(5), "hello", None));
        assert_decoded((7, "hello\r\nA\r\n world"), (Some(4 + 2), "hello world", None));
        assert_decoded(
            (0, "e\r\ntest test test\r\n0\r\n\r\n"),
            (None, "test test test", None),
        );
        assert_decoded(
            (0, "1\r\n_\r\n0\r\n\r\nnext response"),
            (None, "_", Some("next response")),
        );
        assert_decoded((7, "hello\r\n0\r\n\r\n"), (None, "hello", None));
    }

    fn chunked_body(input: &'static str) -> ReceivedBody<'static, Cursor<&'static str>> {
        ReceivedBody::new(
            None,
            Buffer::default(),
            Cursor::new(input),
            ReceivedBodyState::Chunked {
                remaining: 0,
                total: 0,
            },
            None,
            UTF_8,
            None,
        )
    }

    async fn read_with_buffers_of_size<R>(reader: &mut R, size: usize) -> crate::Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut content = Vec::new();
        loop {
            let mut buf = vec![0; size];
            match reader.read(&mut buf).await? {
                0 => break Ok(String::from_utf8_lossy(&content).into()),
                bytes => content.extend_from_slice(&buf[..bytes]),
            }
        }
    }

    #[test]
    fn full_chunked_decode_at_all_read_sizes() {
        for size in 3..50 {
            let mut body = chunked_body("5\r\n12345\r\n1\r\na\r\n2\r\nbc\r\n3\r\ndef\r\n0\r\n\r\n");
            let output = block_on(read_with_buffers_of_size(&mut body, size)).unwrap();
            assert_eq!(output, "12345abcdef", "read size: {size}");

            let mut body = chunked_body("7\r\nMozilla\r\n9\r\nDeveloper\r\n7\r\nNetwork\r\n0\r\n\r\n");
            let output = block_on(read_with_buffers_of_size(&mut body, size)).unwrap();
            assert_eq!(output, "MozillaDeveloperNetwork", "read size: {size}");
        }
    }

    #[test]
    fn fixed_length_stops_at_content_length() {
        block_on(async {
            let body = ReceivedBody::new(
                Some(5),
                Buffer::default(),
                Cursor::new("hello, extra bytes for the next exchange"),
                ReceivedBodyState::Start,
                None,
                UTF_8,
                None,
            );
            assert_eq!(body.read_string().await.unwrap(), "hello");
        });
    }

    #[test]
    fn buffered_limit_is_enforced() {
        block_on(async {
            let body = ReceivedBody::new(
                None,
                Buffer::default(),
                Cursor::new("B\r\nhello world\r\n0\r\n\r\n"),
                ReceivedBodyState::Start,
                None,
                UTF_8,
                Some(4),
            );
            let error = body.read_bytes().await.unwrap_err();
            assert!(matches!(error, crate::Error::BodyTooLarge(4)));
        });
    }

    #[test]
    fn completion_hook_receives_transport() {
        use std::sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        };

        block_on(async {
            let completed = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&completed);
            let body = ReceivedBody::new(
                Some(2),
                Buffer::default(),
                Cursor::new("ok"),
                ReceivedBodyState::Start,
                Some(Box::new(move |_transport| {
                    flag.store(true, Ordering::SeqCst);
                })),
                UTF_8,
                None,
            );
            assert_eq!(body.read_string().await.unwrap(), "ok");
            assert!(completed.load(Ordering::SeqCst));
        });
    }
}
