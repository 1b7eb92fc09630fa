use ferrous_backend_application::ports::Resolver;
use ferrous_backend_application::use_cases::LookupQueryUseCase;
use ferrous_backend_domain::config::{DispatchMode, ServerConfig};
use ferrous_backend_domain::{BackendError, Query, Record};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::dispatch;
use super::events::{SessionEvent, SessionEventEmitter, SessionOutcome};
use super::handler::{ConnectionHandler, SessionOptions};
use super::registry::{HandlerRegistry, SessionControl};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Listens on a Unix socket and runs one worker per accepted connection.
///
/// `stop()` signals every live session, closes the listening socket and makes
/// `serve()` return once all workers are done. It is safe to call from any
/// task, any number of times, while sessions are finishing on their own.
pub struct SocketServer {
    socket_path: PathBuf,
    options: SessionOptions,
    dispatch: DispatchMode,
    lookup: Arc<LookupQueryUseCase>,
    registry: Arc<HandlerRegistry>,
    emitter: SessionEventEmitter,
    listener: Mutex<Option<UnixListener>>,
    shutdown: CancellationToken,
    workers: TaskTracker,
}

impl SocketServer {
    /// Binds the listening socket. Must be called inside a tokio runtime.
    pub fn bind(config: &ServerConfig, lookup: Arc<LookupQueryUseCase>) -> Result<Self, BackendError> {
        let socket_path = PathBuf::from(&config.socket_path);

        if config.remove_stale_socket {
            remove_socket_file(&socket_path);
        }

        let listener = UnixListener::bind(&socket_path)?;
        info!(socket = %socket_path.display(), dispatch = %config.dispatch, "Init server");

        Ok(Self {
            socket_path,
            options: SessionOptions::from_config(config),
            dispatch: config.dispatch,
            lookup,
            registry: Arc::new(HandlerRegistry::new()),
            emitter: SessionEventEmitter::new_disabled(),
            listener: Mutex::new(Some(listener)),
            shutdown: CancellationToken::new(),
            workers: TaskTracker::new(),
        })
    }

    pub fn with_event_emitter(mut self, emitter: SessionEventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    /// Registers the resolver. Allowed once, before or while serving.
    pub fn set_resolver(&self, resolver: Arc<dyn Resolver>) -> Result<(), BackendError> {
        self.lookup.set_resolver(resolver)
    }

    /// Resolves through the registered resolver, failing with a
    /// configuration error when none is set.
    pub async fn lookup(&self, query: &Query) -> Result<Vec<Record>, BackendError> {
        self.lookup.execute(query).await
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Runs the accept loop until `stop()` is called.
    pub async fn serve(&self) -> Result<(), BackendError> {
        let Some(listener) = self.take_listener() else {
            if self.is_stopping() {
                debug!("Server stopped before serving");
                return Ok(());
            }
            return Err(BackendError::Configuration("server is already serving".to_string()));
        };

        if !self.lookup.has_resolver() {
            warn!("Serving without a resolver; every lookup will fail");
        }

        info!(socket = %self.socket_path.display(), "Backend server ready to accept connections");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => self.dispatch(stream, &listener),
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        remove_socket_file(&self.socket_path);
        debug!("Listening socket closed");

        // Connections accepted while stop() was running.
        self.registry.stop();

        self.workers.close();
        self.workers.wait().await;

        info!("Server has been shut down");
        Ok(())
    }

    /// Stops every registered handler, then closes the listening socket and
    /// ends the accept loop.
    pub fn stop(&self) {
        info!(active = self.registry.len(), "Shutting down server");
        self.registry.stop();
        self.shutdown.cancel();

        // Not serving yet: the listener is still ours to close.
        if let Some(listener) = self.take_listener() {
            drop(listener);
            remove_socket_file(&self.socket_path);
            debug!("Listening socket closed");
        }
    }

    fn take_listener(&self) -> Option<UnixListener> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn dispatch(&self, stream: UnixStream, listener: &UnixListener) {
        let id = self.registry.next_id();
        match self.dispatch {
            DispatchMode::Task => self.spawn_task_worker(id, stream),
            DispatchMode::Process => self.spawn_process_worker(id, stream, listener),
        }
    }

    fn spawn_task_worker(&self, id: u64, stream: UnixStream) {
        let handler = Arc::new(ConnectionHandler::new(
            id,
            self.options.clone(),
            Arc::clone(&self.lookup),
            Arc::clone(&self.registry),
        ));
        self.registry.register(handler.clone());
        if self.is_stopping() {
            handler.stop();
        }

        let emitter = self.emitter.clone();
        self.workers.spawn(
            async move {
                let result = handler.run(stream).await;
                report(&emitter, SessionEvent::from_result(id, &result));
            }
            .instrument(info_span!("session", handler_id = id)),
        );
    }

    fn spawn_process_worker(&self, id: u64, stream: UnixStream, listener: &UnixListener) {
        let worker = match dispatch::fork_session(
            id,
            stream,
            Some(listener.as_raw_fd()),
            self.options.clone(),
            Arc::clone(&self.lookup),
        ) {
            Ok(worker) => worker,
            Err(e) => {
                error!(handler_id = id, error = %e, "Failed to fork worker process");
                return;
            }
        };

        self.registry.register(worker.clone());
        if self.is_stopping() {
            if let Err(e) = worker.stop() {
                warn!(handler_id = id, error = %e, "Failed to stop worker process");
            }
        }

        let registry = Arc::clone(&self.registry);
        let emitter = self.emitter.clone();
        self.workers.spawn(async move {
            let pid = worker.pid();
            let reaped = Arc::clone(&worker);
            let exit = tokio::task::spawn_blocking(move || dispatch::wait_for_exit(&reaped)).await;
            registry.unregister(id);

            match exit {
                Ok(Ok(exit)) => report(&emitter, exit.into_event(&worker)),
                Ok(Err(e)) => error!(handler_id = id, pid, error = %e, "Failed to reap worker process"),
                Err(e) => error!(handler_id = id, pid, error = %e, "Reaper task failed"),
            }
        });
    }
}

fn report(emitter: &SessionEventEmitter, event: SessionEvent) {
    if let SessionOutcome::Failed { ref error, sent_fail } = event.outcome {
        error!(handler_id = event.handler_id, error = %error, sent_fail, "Session ended with an error");
    } else {
        debug!(
            handler_id = event.handler_id,
            queries = event.queries_answered,
            outcome = ?event.outcome,
            "Session finished"
        );
    }
    emitter.emit(event);
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(socket = %path.display(), "Removed socket file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(socket = %path.display(), error = %e, "Could not remove socket file"),
    }
}

impl std::fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketServer")
            .field("socket_path", &self.socket_path)
            .field("dispatch", &self.dispatch)
            .field("registry", &self.registry)
            .field("stopping", &self.is_stopping())
            .finish()
    }
}
