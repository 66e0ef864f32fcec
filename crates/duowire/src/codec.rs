//! # Codec
//!
//! Binds a `Format` to one duplex connection and moves whole frames across
//! it.
//!
//! ## Invariants
//!
//! - Exactly one reader at a time; the reader lock enforces it.
//! - Writes are serialized by the writer lock, so frames never interleave.
//! - After `close`, every blocked or future `read`/`write` returns
//!   `CodecError::Closed` promptly.

use std::sync::Arc;

use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::watch;
use tokio::sync::Mutex;

use crate::error::CodecError;
use crate::error::Result;
use crate::format::Format;
use crate::format::Framing;
use crate::format::WireType;
use crate::frame::Envelope;
use crate::frame::Frame;
use crate::frame::RequestFrame;
use crate::frame::ResponseFrame;

/// Default upper bound for a single frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

type Reader = Box<dyn AsyncBufRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// A framed connection speaking one format.
pub struct Codec<F> {
    format: Arc<F>,
    reader: Mutex<Reader>,
    writer: Mutex<Writer>,
    closed: watch::Sender<bool>,
    max_frame_len: usize,
}

impl<F: Format> Codec<F> {
    /// Split a duplex stream into a codec.
    pub fn new<T>(format: F, io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self::from_parts(format, reader, writer)
    }

    /// Build a codec from separate halves.
    pub fn from_parts<R, W>(format: F, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (closed, _) = watch::channel(false);
        Self {
            format: Arc::new(format),
            reader: Mutex::new(Box::new(BufReader::new(reader))),
            writer: Mutex::new(Box::new(writer)),
            closed,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn format(&self) -> &Arc<F> {
        &self.format
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Make `T` known to the format. A no-op for self-describing formats.
    pub fn register_type<T: WireType>(&self) -> Result<()> {
        self.format.register_type::<T>()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub async fn write_request(&self, frame: &RequestFrame<F>) -> Result<()> {
        let envelope = Envelope::from_request(frame)?;
        self.write_envelope(&envelope).await
    }

    pub async fn write_response(&self, frame: &ResponseFrame<F>) -> Result<()> {
        let envelope = Envelope::from_response(frame);
        self.write_envelope(&envelope).await
    }

    async fn write_envelope(&self, envelope: &Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(CodecError::Closed);
        }

        // prepare the frame outside the lock
        let body = self.format.encode_envelope(envelope)?;
        if body.len() > self.max_frame_len {
            return Err(CodecError::FrameTooLarge { len: body.len(), max: self.max_frame_len });
        }
        let frame = delimit(F::FRAMING, body)?;

        let closed = wait_closed(self.closed.subscribe());
        let mut writer = self.writer.lock().await;

        tokio::select! {
            biased;
            _ = closed => Err(CodecError::Closed),
            written = async {
                writer.write_all(&frame).await?;
                writer.flush().await?;
                Ok::<(), std::io::Error>(())
            } => {
                written?;
                tracing::trace!(id = envelope.id, len = frame.len(), "wrote frame");
                Ok(())
            }
        }
    }

    /// Block until one whole frame arrives.
    pub async fn read(&self) -> Result<Frame<F>> {
        if self.is_closed() {
            return Err(CodecError::Closed);
        }

        let closed = wait_closed(self.closed.subscribe());
        let mut reader = self.reader.lock().await;

        let body = tokio::select! {
            biased;
            _ = closed => return Err(CodecError::Closed),
            body = read_body(&mut *reader, F::FRAMING, self.max_frame_len) => body?,
        };

        // the peer hung up between frames
        let Some(body) = body else {
            return Err(CodecError::Closed);
        };

        let envelope = self.format.decode_envelope(&body)?;
        tracing::trace!(id = envelope.id, len = body.len(), request = envelope.is_request(), "read frame");
        Ok(envelope.into_frame(&self.format))
    }

    /// Wake blocked readers and writers and release the write half.
    pub async fn close(&self) -> Result<()> {
        if self.closed.send_replace(true) {
            return Ok(());
        }

        tracing::debug!(format = self.format.name(), "closing codec");
        let mut writer = self.writer.lock().await;
        match writer.shutdown().await {
            Ok(()) => Ok(()),
            // the peer may already be gone
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    loop {
        let done = *closed.borrow_and_update();
        if done {
            return;
        }
        if closed.changed().await.is_err() {
            return;
        }
    }
}

fn delimit(framing: Framing, mut body: Vec<u8>) -> Result<Vec<u8>> {
    match framing {
        Framing::Lines => {
            body.push(b'\n');
            Ok(body)
        }
        Framing::LengthPrefixed => {
            let len = u32::try_from(body.len())
                .map_err(|_| CodecError::FrameTooLarge { len: body.len(), max: u32::MAX as usize })?;
            let mut frame = Vec::with_capacity(4 + body.len());
            frame.extend_from_slice(&len.to_be_bytes());
            frame.extend_from_slice(&body);
            Ok(frame)
        }
    }
}

/// One frame body, or `None` on a clean end of stream.
async fn read_body<R>(reader: &mut R, framing: Framing, max: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    match framing {
        Framing::Lines => read_line(reader, max).await,
        Framing::LengthPrefixed => read_prefixed(reader, max).await,
    }
}

async fn read_line<R>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = Vec::new();
        let limit = max as u64 + 1;
        let n = (&mut *reader).take(limit).read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Ok(None);
        }

        if line.last() == Some(&b'\n') {
            line.pop();
        } else if n as u64 >= limit {
            return Err(CodecError::FrameTooLarge { len: n, max });
        }

        // skip blank lines between frames
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        return Ok(Some(line));
    }
}

async fn read_prefixed<R>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut prefix = [0u8; 4];
    let first = reader.read(&mut prefix[..1]).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut prefix[1..]).await?;

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max {
        return Err(CodecError::FrameTooLarge { len, max });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}
