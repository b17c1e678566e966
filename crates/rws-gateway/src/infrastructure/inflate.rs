//! Client-side half of `permessage-deflate`.
//!
//! tokio-tungstenite rejects any frame with RSV1 set, so on a session that
//! negotiated compression the raw upgraded socket is wrapped in
//! [`InflatingStream`] first.  It rewrites the client-to-server byte stream:
//!
//! ```text
//! [FIN|RSV1|op][MASK|len][key:4][deflated...]   (one or more fragments)
//!                  │
//!                  ▼
//! [FIN|op][MASK|len][0 0 0 0][inflated...]      (one frame)
//! ```
//!
//! Frames without RSV1 and all control frames pass through untouched.  The
//! re-emitted frame keeps the mask bit with an all-zero key, so the protocol
//! layer still sees a masked client frame.  Writes are not touched.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BufMut, BytesMut};
use rws_core::codec::decompress;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const FIN: u8 = 0x80;
const RSV1: u8 = 0x40;
const OPCODE_MASK: u8 = 0x0f;
const CONTINUATION: u8 = 0x0;
const CONTROL_BIT: u8 = 0x08;
const MASK_BIT: u8 = 0x80;

/// Upper bound on one compressed message, matching tungstenite's default
/// maximum message size.
pub const MAX_COMPRESSED_MESSAGE: usize = 64 << 20;

const READ_CHUNK: usize = 8 * 1024;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    fin: bool,
    rsv1: bool,
    opcode: u8,
    mask: Option<[u8; 4]>,
    payload_len: u64,
    header_len: usize,
}

impl FrameHeader {
    /// `None` until `bytes` holds the whole header.
    fn parse(bytes: &[u8]) -> Option<Self> {
        let (&first, rest) = bytes.split_first()?;
        let &second = rest.first()?;
        let masked = second & MASK_BIT != 0;

        let (payload_len, mut header_len) = match second & 0x7f {
            126 => (u64::from(u16::from_be_bytes(bytes.get(2..4)?.try_into().ok()?)), 4),
            127 => (u64::from_be_bytes(bytes.get(2..10)?.try_into().ok()?), 10),
            short => (u64::from(short), 2),
        };
        let mask = if masked {
            let key: [u8; 4] = bytes.get(header_len..header_len + 4)?.try_into().ok()?;
            header_len += 4;
            Some(key)
        } else {
            None
        };

        Some(Self {
            fin: first & FIN != 0,
            rsv1: first & RSV1 != 0,
            opcode: first & OPCODE_MASK,
            mask,
            payload_len,
            header_len,
        })
    }

    fn is_control(&self) -> bool {
        self.opcode & CONTROL_BIT != 0
    }
}

/// A compressed message whose fragments are still arriving.
struct CompressedMessage {
    opcode: u8,
    body: Vec<u8>,
}

enum State {
    Header,
    /// Forwarding the payload of a frame that is not compressed.
    Copy { remaining: u64 },
    /// Unmasking the payload of one fragment of a compressed message.
    Collect {
        remaining: usize,
        mask: Option<[u8; 4]>,
        offset: usize,
        fin: bool,
    },
}

/// Byte-stream rewriter behind [`InflatingStream`].
struct FrameInflater {
    input: BytesMut,
    state: State,
    message: Option<CompressedMessage>,
}

impl FrameInflater {
    fn new() -> Self {
        Self {
            input: BytesMut::new(),
            state: State::Header,
            message: None,
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        self.input.extend_from_slice(bytes);
    }

    /// Moves every byte that can be decided on so far into `out`.
    fn drain_into(&mut self, out: &mut BytesMut) -> io::Result<()> {
        loop {
            match &mut self.state {
                State::Header => {
                    let Some(header) = FrameHeader::parse(&self.input) else {
                        return Ok(());
                    };
                    self.start_frame(header, out)?;
                }
                State::Copy { remaining } => {
                    if self.input.is_empty() && *remaining > 0 {
                        return Ok(());
                    }
                    let n = usize::try_from(*remaining)
                        .map_or(self.input.len(), |r| r.min(self.input.len()));
                    out.put(self.input.split_to(n));
                    *remaining -= n as u64;
                    if *remaining == 0 {
                        self.state = State::Header;
                    }
                }
                State::Collect {
                    remaining,
                    mask,
                    offset,
                    fin,
                } => {
                    if self.input.is_empty() && *remaining > 0 {
                        return Ok(());
                    }
                    let n = (*remaining).min(self.input.len());
                    let chunk = self.input.split_to(n);
                    let Some(message) = self.message.as_mut() else {
                        return Err(invalid("compressed fragment without a message"));
                    };
                    let (key, start) = (*mask, *offset);
                    message.body.extend(chunk.iter().enumerate().map(|(i, byte)| match key {
                        Some(key) => byte ^ key[(start + i) % 4],
                        None => *byte,
                    }));
                    *offset += n;
                    *remaining -= n;
                    if *remaining == 0 {
                        let finished = *fin;
                        self.state = State::Header;
                        if finished {
                            self.finish_message(out)?;
                        }
                    }
                }
            }
        }
    }

    fn start_frame(&mut self, header: FrameHeader, out: &mut BytesMut) -> io::Result<()> {
        let starts_compressed = header.rsv1 && !header.is_control() && header.opcode != CONTINUATION;
        let continues_compressed = header.opcode == CONTINUATION && self.message.is_some();

        if starts_compressed && self.message.is_some() {
            return Err(invalid("new compressed message before the previous one finished"));
        }
        if continues_compressed && header.rsv1 {
            return Err(invalid("RSV1 set on a continuation frame"));
        }

        if starts_compressed || continues_compressed {
            let buffered = self.message.as_ref().map_or(0, |m| m.body.len());
            let len = usize::try_from(header.payload_len)
                .ok()
                .filter(|len| buffered.saturating_add(*len) <= MAX_COMPRESSED_MESSAGE)
                .ok_or_else(|| invalid("compressed message too large"))?;
            if starts_compressed {
                self.message = Some(CompressedMessage {
                    opcode: header.opcode,
                    body: Vec::with_capacity(len),
                });
            }
            self.input.advance(header.header_len);
            self.state = State::Collect {
                remaining: len,
                mask: header.mask,
                offset: 0,
                fin: header.fin,
            };
            if len == 0 && header.fin {
                self.state = State::Header;
                self.finish_message(out)?;
            }
            return Ok(());
        }

        out.put(self.input.split_to(header.header_len));
        self.state = if header.payload_len == 0 {
            State::Header
        } else {
            State::Copy {
                remaining: header.payload_len,
            }
        };
        Ok(())
    }

    fn finish_message(&mut self, out: &mut BytesMut) -> io::Result<()> {
        let Some(message) = self.message.take() else {
            return Ok(());
        };
        let payload = decompress(&message.body).map_err(|e| invalid(&e.to_string()))?;
        write_masked_frame(out, message.opcode, &payload);
        Ok(())
    }
}

/// Appends one final, masked frame with an all-zero key.
fn write_masked_frame(out: &mut BytesMut, opcode: u8, payload: &[u8]) {
    out.put_u8(FIN | opcode);
    match payload.len() {
        len if len < 126 => out.put_u8(MASK_BIT | len as u8),
        len if len <= usize::from(u16::MAX) => {
            out.put_u8(MASK_BIT | 126);
            out.put_u16(len as u16);
        }
        len => {
            out.put_u8(MASK_BIT | 127);
            out.put_u64(len as u64);
        }
    }
    out.put_slice(&[0; 4]);
    out.put_slice(payload);
}

fn invalid(detail: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("permessage-deflate: {detail}"))
}

/// Socket wrapper that inflates compressed client frames on read.
pub struct InflatingStream<T> {
    inner: T,
    inflater: FrameInflater,
    ready: BytesMut,
    eof: bool,
}

impl<T> InflatingStream<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            inflater: FrameInflater::new(),
            ready: BytesMut::new(),
            eof: false,
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for InflatingStream<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.ready.is_empty() {
                let n = buf.remaining().min(this.ready.len());
                buf.put_slice(&this.ready.split_to(n));
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                return Poll::Ready(Ok(()));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let mut chunk_buf = ReadBuf::new(&mut chunk);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut chunk_buf))?;
            let filled = chunk_buf.filled();
            if filled.is_empty() {
                this.eof = true;
                continue;
            }
            this.inflater.feed(filled);
            this.inflater.drain_into(&mut this.ready)?;
        }
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for InflatingStream<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
