use ferrous_backend_application::use_cases::LookupQueryUseCase;
use ferrous_backend_domain::config::{ResolverFailurePolicy, ServerConfig};
use ferrous_backend_domain::protocol::{self, END, FAIL};
use ferrous_backend_domain::{AbiVersion, BackendError, Record};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::{HandlerRegistry, SessionControl};

/// Per-session settings shared by every handler of a server.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub banner: Arc<str>,
    pub resolver_failure: ResolverFailurePolicy,
}

impl SessionOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            banner: Arc::from(config.banner.as_str()),
            resolver_failure: config.resolver_failure,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Lifecycle of one session. Closing is reachable from both
/// `AwaitingHandshake` and `Ready`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandlerState {
    AwaitingHandshake = 0,
    Ready = 1,
    Closing = 2,
    Closed = 3,
}

impl HandlerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HandlerState::AwaitingHandshake,
            1 => HandlerState::Ready,
            2 => HandlerState::Closing,
            _ => HandlerState::Closed,
        }
    }
}

/// What a session did before it ended without error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub version: Option<AbiVersion>,
    pub queries_answered: u64,
    pub failed_lookups: u64,
    /// Ended by `stop()` rather than by the peer.
    pub stopped: bool,
}

/// Runs the protocol state machine for one accepted connection.
///
/// Queries are handled strictly one at a time: the full answer for a query
/// is written before the next line is read.
pub struct ConnectionHandler {
    id: u64,
    options: SessionOptions,
    lookup: Arc<LookupQueryUseCase>,
    registry: Arc<HandlerRegistry>,
    state: AtomicU8,
    shutting_down: AtomicBool,
    cancel: CancellationToken,
}

struct Session<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

enum ReadOutcome {
    Line(String),
    /// Peer closed the connection.
    Eof,
    /// The read was interrupted by `stop()`.
    Cancelled,
}

impl ConnectionHandler {
    pub fn new(
        id: u64,
        options: SessionOptions,
        lookup: Arc<LookupQueryUseCase>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            id,
            options,
            lookup,
            registry,
            state: AtomicU8::new(HandlerState::AwaitingHandshake as u8),
            shutting_down: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> HandlerState {
        HandlerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Sets the shutdown flag, then forces the connection closed. A read in
    /// progress returns and is treated as a normal end of session.
    pub fn stop(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.cancel.cancel();
        debug!(handler_id = self.id, "Shutting down handler");
    }

    /// Runs the session to completion and releases the connection.
    ///
    /// Protocol errors have already been reported to the peer as `FAIL` when
    /// they are returned here.
    pub async fn run<S>(&self, stream: S) -> Result<SessionSummary, BackendError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut session = Session {
            reader: BufReader::new(read_half),
            writer: write_half,
        };
        let mut summary = SessionSummary::default();

        let result = self.drive(&mut session, &mut summary).await;
        self.close(session).await;

        result.map(|()| {
            summary.stopped = self.is_shutting_down();
            summary
        })
    }

    async fn drive<S>(
        &self,
        session: &mut Session<S>,
        summary: &mut SessionSummary,
    ) -> Result<(), BackendError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let version = match self.handshake(session).await? {
            Some(version) => version,
            None => return Ok(()),
        };
        summary.version = Some(version);
        self.transition(HandlerState::Ready);
        info!(handler_id = self.id, version = %version, "Start handling");

        loop {
            let line = match self.read_line(session).await {
                Ok(ReadOutcome::Line(line)) if !line.trim().is_empty() => line,
                Ok(_) => break,
                Err(e) => {
                    self.write_fail(session).await;
                    return Err(e);
                }
            };

            let query = match protocol::parse_query(&line, version) {
                Ok(query) => query,
                Err(e) => {
                    self.write_fail(session).await;
                    return Err(e);
                }
            };

            match self.lookup.execute(&query).await {
                Ok(records) => {
                    self.write_answer(session, &records).await?;
                    summary.queries_answered += 1;
                }
                Err(e @ BackendError::Resolver(_)) => {
                    self.write_fail(session).await;
                    match self.options.resolver_failure {
                        ResolverFailurePolicy::Close => return Err(e),
                        ResolverFailurePolicy::Continue => {
                            warn!(handler_id = self.id, error = %e, "Lookup failed, continuing session");
                            summary.failed_lookups += 1;
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            handler_id = self.id,
            queries = summary.queries_answered,
            "Done with session"
        );
        Ok(())
    }

    /// Returns `None` when the session ended before a handshake line arrived.
    async fn handshake<S>(&self, session: &mut Session<S>) -> Result<Option<AbiVersion>, BackendError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let line = match self.read_line(session).await {
            Ok(ReadOutcome::Line(line)) => line,
            Ok(ReadOutcome::Eof) | Ok(ReadOutcome::Cancelled) => return Ok(None),
            Err(e) => {
                self.write_fail(session).await;
                return Err(e);
            }
        };

        let version = match protocol::parse_handshake(&line) {
            Ok(version) => version,
            Err(e) => {
                self.write_fail(session).await;
                return Err(e);
            }
        };

        let ack = protocol::format_handshake_ack(&self.options.banner);
        self.write_lines(session, std::iter::once(ack)).await?;
        Ok(Some(version))
    }

    async fn read_line<S>(&self, session: &mut Session<S>) -> Result<ReadOutcome, BackendError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let mut line = String::new();
        let read = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection closed by shutdown",
            )),
            read = session.reader.read_line(&mut line) => read,
        };

        match read {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(_) => Ok(ReadOutcome::Line(line)),
            Err(e) if self.is_shutting_down() => {
                debug!(handler_id = self.id, reason = %e, "Read interrupted by shutdown");
                Ok(ReadOutcome::Cancelled)
            }
            Err(e) => Err(BackendError::Io(e)),
        }
    }

    async fn write_answer<S>(
        &self,
        session: &mut Session<S>,
        records: &[Record],
    ) -> Result<(), BackendError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let lines = records
            .iter()
            .map(protocol::format_data_line)
            .chain(std::iter::once(END.to_string()));
        self.write_lines(session, lines).await
    }

    /// Writes the lines with a single flush. A failed write after `stop()`
    /// is not an error.
    async fn write_lines<S, I>(&self, session: &mut Session<S>, lines: I) -> Result<(), BackendError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
        I: IntoIterator<Item = String>,
    {
        let mut buf = String::new();
        for line in lines {
            buf.push_str(&line);
            buf.push('\n');
        }

        let written = async {
            session.writer.write_all(buf.as_bytes()).await?;
            session.writer.flush().await
        }
        .await;

        match written {
            Ok(()) => Ok(()),
            Err(e) if self.is_shutting_down() => {
                debug!(handler_id = self.id, reason = %e, "Write interrupted by shutdown");
                Ok(())
            }
            Err(e) => Err(BackendError::Io(e)),
        }
    }

    /// Best-effort `FAIL`; the session is ending anyway.
    async fn write_fail<S>(&self, session: &mut Session<S>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        if let Err(e) = self
            .write_lines(session, std::iter::once(FAIL.to_string()))
            .await
        {
            debug!(handler_id = self.id, error = %e, "Could not send FAIL");
        }
    }

    async fn close<S>(&self, session: Session<S>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        if !self.begin_closing() {
            return;
        }

        let Session { reader, mut writer } = session;
        let _ = writer.shutdown().await;
        drop(writer);
        drop(reader);

        self.registry.unregister(self.id);
        self.transition(HandlerState::Closed);
        debug!(handler_id = self.id, "Handler closed");
    }

    /// Moves to `Closing` unless already there. Returns false on a repeat call.
    fn begin_closing(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= HandlerState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                HandlerState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn transition(&self, next: HandlerState) {
        self.state.store(next as u8, Ordering::Release);
    }
}

impl SessionControl for ConnectionHandler {
    fn id(&self) -> u64 {
        self.id
    }

    fn stop(&self) -> Result<(), BackendError> {
        ConnectionHandler::stop(self);
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
