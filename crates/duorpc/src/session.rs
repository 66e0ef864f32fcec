//! # Session
//!
//! One connection, one codec, one read loop. The loop is the only reader: it
//! hands requests to the `Server` and responses to the `Client`, so both
//! directions share the connection.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────── Session ────────────┐
//!  call() ──►│ Client ── write_request ──┐     │
//!            │                           ▼     │
//!            │                        Codec ◄──┼──► connection
//!            │                           │     │
//!            │ run(): read ─┬─ Request ──► Server ── write_response
//!            │              └─ Response ─► Client.resolve
//!            └─────────────────────────────────┘
//! ```
//!
//! Requests are served inline by default, which means a slow handler holds
//! up every frame behind it, including responses the handler itself may be
//! waiting for. `Dispatch::Pooled` serves them on spawned tasks instead.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use duowire::codec::DEFAULT_MAX_FRAME_LEN;
use duowire::Codec;
use duowire::CodecError;
use duowire::Format;
use duowire::Frame;
use duowire::RequestFrame;
use duowire::WireType;

use crate::client::Client;
use crate::client::DEFAULT_TIMEOUT;
use crate::server::Server;

#[derive(Debug)]
pub enum Error {
    /// Another loop is already reading this session.
    AlreadyRunning,
    /// The connection delivered something that is not a frame.
    Read(CodecError),
    /// A response could not be written.
    Write(CodecError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "Session loop is already running"),
            Self::Read(e) => write!(f, "Read failed: {}", e),
            Self::Write(e) => write!(f, "Write failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read(e) | Self::Write(e) => Some(e),
            Self::AlreadyRunning => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// How incoming requests are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// On the read loop, one at a time.
    Inline,
    /// On spawned tasks, at most `workers` at once.
    Pooled { workers: usize },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a call waits for its response. Zero waits forever.
    pub timeout: Duration,
    pub max_frame_len: usize,
    pub dispatch: Dispatch,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            dispatch: Dispatch::Inline,
        }
    }
}

/// Builder for a `Session`.
pub struct SessionBuilder<F> {
    format: F,
    config: SessionConfig,
}

impl<F: Format> SessionBuilder<F> {
    pub fn new(format: F) -> Self {
        Self { format, config: SessionConfig::default() }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.config.max_frame_len = max_frame_len;
        self
    }

    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.config.dispatch = dispatch;
        self
    }

    /// Serve requests on up to `workers` tasks at once.
    pub fn workers(self, workers: usize) -> Self {
        self.dispatch(Dispatch::Pooled { workers })
    }

    /// Bind the session to a duplex stream.
    pub fn build<T>(self, io: T) -> Session<F>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = Codec::new(self.format, io).with_max_frame_len(self.config.max_frame_len);
        Session::from_codec(codec, self.config)
    }

    /// Bind the session to separate read and write halves.
    pub fn build_from_parts<R, W>(self, reader: R, writer: W) -> Session<F>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let codec = Codec::from_parts(self.format, reader, writer)
            .with_max_frame_len(self.config.max_frame_len);
        Session::from_codec(codec, self.config)
    }
}

struct SessionInner<F> {
    codec: Arc<Codec<F>>,
    client: Client<F>,
    server: Server<F>,
    config: SessionConfig,
    running: AtomicBool,
    fatal: Mutex<Option<CodecError>>,
}

/// Both ends of RPC over one connection. Cheap to clone.
pub struct Session<F> {
    inner: Arc<SessionInner<F>>,
}

impl<F> Clone for Session<F> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// Clears the running flag when the loop exits.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<F: Format> Session<F> {
    /// A session with the default configuration.
    pub fn new<T>(format: F, io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        SessionBuilder::new(format).build(io)
    }

    pub fn builder(format: F) -> SessionBuilder<F> {
        SessionBuilder::new(format)
    }

    pub fn from_codec(codec: Codec<F>, config: SessionConfig) -> Self {
        let codec = Arc::new(codec);
        let client = Client::new(codec.clone(), config.timeout);
        let server = Server::new(codec.clone());

        Self {
            inner: Arc::new(SessionInner {
                codec,
                client,
                server,
                config,
                running: AtomicBool::new(false),
                fatal: Mutex::new(None),
            }),
        }
    }

    pub fn client(&self) -> &Client<F> {
        &self.inner.client
    }

    pub fn server(&self) -> &Server<F> {
        &self.inner.server
    }

    pub fn codec(&self) -> &Arc<Codec<F>> {
        &self.inner.codec
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Make `T` known to the codec. A no-op for self-describing formats.
    pub fn register_type<T: WireType>(&self) -> std::result::Result<(), CodecError> {
        self.inner.codec.register_type::<T>()
    }

    /// Run the read loop on its own task.
    pub fn spawn(&self) -> JoinHandle<Result<()>> {
        let session = self.clone();
        tokio::spawn(async move { session.run().await })
    }

    /// Read and route frames until the connection ends.
    ///
    /// Returns `Ok(())` when the peer hangs up or the session is closed.
    pub async fn run(&self) -> Result<()> {
        let inner = &*self.inner;
        if inner.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }
        let _running = RunningGuard(&inner.running);

        let workers = match inner.config.dispatch {
            Dispatch::Inline => None,
            Dispatch::Pooled { workers } => Some(Arc::new(Semaphore::new(workers.max(1)))),
        };

        tracing::debug!(format = inner.codec.format().name(), "session started");
        let result = loop {
            match inner.codec.read().await {
                Ok(Frame::Request(request)) => {
                    if let Err(e) = self.serve(request, workers.as_ref()).await {
                        tracing::warn!(error = %e, "response write failed");
                        break Err(Error::Write(e));
                    }
                }
                Ok(Frame::Response(response)) => {
                    inner.client.resolve(response);
                }
                Err(CodecError::Closed) => break Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "read failed");
                    break Err(Error::Read(e));
                }
            }
        };

        // a worker may have failed while the loop was waiting
        let fatal = self.fatal().take();

        tracing::debug!("session ended");
        match (result, fatal) {
            (Ok(()), Some(e)) => Err(Error::Write(e)),
            (result, _) => result,
        }
    }

    async fn serve(
        &self,
        request: RequestFrame<F>,
        workers: Option<&Arc<Semaphore>>,
    ) -> std::result::Result<(), CodecError> {
        let Some(workers) = workers else {
            return self.inner.server.on_request(request).await;
        };

        // waits for a free worker, which also throttles reading
        let Ok(permit) = workers.clone().acquire_owned().await else {
            return Err(CodecError::Closed);
        };

        let session = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = session.inner.server.on_request(request).await {
                session.fail(e).await;
            }
        });
        Ok(())
    }

    /// Record a worker's write failure and stop the session.
    async fn fail(&self, e: CodecError) {
        tracing::warn!(error = %e, "response write failed");
        if matches!(e, CodecError::Closed) {
            return;
        }

        self.fatal().get_or_insert(e);
        let _ = self.inner.codec.close().await;
    }

    /// The recorded worker failure. A panicked holder cannot leave the
    /// slot half-written, so poisoning is ignored.
    fn fatal(&self) -> MutexGuard<'_, Option<CodecError>> {
        match self.inner.fatal.lock() {
            Ok(fatal) => fatal,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Close the connection. A blocked read loop returns promptly; calls
    /// made afterwards fail with `Disconnected`.
    pub async fn close(&self) -> std::result::Result<(), CodecError> {
        self.inner.codec.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.codec.is_closed()
    }
}
