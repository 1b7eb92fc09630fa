//! Process-per-connection workers.
//!
//! The accepted socket is handed to a forked child which runs the session on
//! its own single-threaded runtime. The parent keeps a [`ProcessWorker`] in
//! the registry so shutdown can reach the child, and reaps it on exit.
//!
//! The child shares nothing mutable with the parent after the fork: it gets a
//! private registry, and any state inside the resolver is a copy. Resolvers
//! used with this mode must be read-only or initialise themselves per process.
//!
//! The child does not log. Its outcome reaches the parent through the exit
//! status only.

use ferrous_backend_application::use_cases::LookupQueryUseCase;
use ferrous_backend_domain::BackendError;
use std::io;
use std::os::unix::io::RawFd;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::UnixStream;
use tracing::debug;
use tracing::subscriber::NoSubscriber;

use super::events::{SessionEvent, SessionOutcome};
use super::handler::{ConnectionHandler, SessionOptions};
use super::registry::{HandlerRegistry, SessionControl};

/// Child exit code: session ended normally or by shutdown.
pub const EXIT_OK: i32 = 0;
/// Child exit code: session ended on a protocol error, `FAIL` was sent.
pub const EXIT_PROTOCOL_FAILURE: i32 = 1;
/// Child exit code: session ended on an I/O or configuration fault.
pub const EXIT_FAULT: i32 = 2;

/// Parent-side handle of a forked session.
#[derive(Debug)]
pub struct ProcessWorker {
    id: u64,
    pid: libc::pid_t,
    stop_requested: AtomicBool,
    /// Set under the lock together with the final `waitpid`, so `stop` never
    /// signals a pid that may already belong to another process.
    reaped: Mutex<bool>,
}

impl ProcessWorker {
    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub fn is_reaped(&self) -> bool {
        *self.lock_reaped()
    }

    fn lock_reaped(&self) -> MutexGuard<'_, bool> {
        self.reaped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionControl for ProcessWorker {
    fn id(&self) -> u64 {
        self.id
    }

    fn stop(&self) -> Result<(), BackendError> {
        self.stop_requested.store(true, Ordering::Release);

        let reaped = self.lock_reaped();
        if *reaped {
            return Ok(());
        }

        // SAFETY: kill has no memory-safety preconditions. The child is not
        // reaped while we hold the lock, so the pid is still ours.
        let rc = unsafe { libc::kill(self.pid, libc::SIGTERM) };
        drop(reaped);

        if rc == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(BackendError::Io(err));
        }

        debug!(handler_id = self.id, pid = self.pid, "Sent SIGTERM to worker process");
        Ok(())
    }
}

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Exited(i32),
    Signaled(i32),
}

impl ChildExit {
    pub fn into_event(self, worker: &ProcessWorker) -> SessionEvent {
        let outcome = match self {
            ChildExit::Exited(EXIT_OK) if worker.stop_requested() => SessionOutcome::Stopped,
            ChildExit::Exited(EXIT_OK) => SessionOutcome::Completed,
            ChildExit::Signaled(_) if worker.stop_requested() => SessionOutcome::Stopped,
            ChildExit::Exited(code) => SessionOutcome::Failed {
                error: format!("worker process exited with status {}", code),
                sent_fail: code == EXIT_PROTOCOL_FAILURE,
            },
            ChildExit::Signaled(signal) => SessionOutcome::Failed {
                error: format!("worker process killed by signal {}", signal),
                sent_fail: false,
            },
        };

        SessionEvent {
            handler_id: worker.id,
            version: None,
            queries_answered: 0,
            outcome,
        }
    }
}

/// SIGTERM and SIGINT blocked on the calling thread until dropped.
struct BlockedSignals {
    previous: libc::sigset_t,
}

impl BlockedSignals {
    fn termination() -> io::Result<Self> {
        // SAFETY: both sets are plain data, initialised by sigemptyset or
        // filled in by pthread_sigmask before they are read.
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGTERM);
            libc::sigaddset(&mut set, libc::SIGINT);

            let mut previous: libc::sigset_t = std::mem::zeroed();
            let rc = libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut previous);
            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
            Ok(Self { previous })
        }
    }
}

impl Drop for BlockedSignals {
    fn drop(&mut self) {
        // SAFETY: restores the mask saved by `termination`.
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, std::ptr::null_mut());
        }
    }
}

/// Forks a child that serves `stream` and returns the parent-side handle.
///
/// `listener_fd` is closed in the child so the listening socket goes away
/// as soon as the parent drops it.
pub fn fork_session(
    id: u64,
    stream: UnixStream,
    listener_fd: Option<RawFd>,
    options: SessionOptions,
    lookup: Arc<LookupQueryUseCase>,
) -> Result<Arc<ProcessWorker>, BackendError> {
    let stream = stream.into_std()?;

    // Termination signals stay pending until the child has dropped the
    // parent's handlers.
    let blocked = BlockedSignals::termination()?;

    // SAFETY: the child only touches memory it owns after the fork and
    // leaves through `_exit`, never returning into the parent's runtime.
    let pid = unsafe { libc::fork() };

    match pid {
        -1 => Err(BackendError::Io(io::Error::last_os_error())),
        0 => {
            let code = run_child(id, stream, listener_fd, options, lookup, blocked);
            // SAFETY: terminates the child without running the parent's destructors.
            unsafe { libc::_exit(code) }
        }
        pid => {
            drop(blocked);
            drop(stream);
            debug!(handler_id = id, pid, "Forked worker process");
            Ok(Arc::new(ProcessWorker {
                id,
                pid,
                stop_requested: AtomicBool::new(false),
                reaped: Mutex::new(false),
            }))
        }
    }
}

fn run_child(
    id: u64,
    stream: std::os::unix::net::UnixStream,
    listener_fd: Option<RawFd>,
    options: SessionOptions,
    lookup: Arc<LookupQueryUseCase>,
    blocked: BlockedSignals,
) -> i32 {
    // SAFETY: restores default dispositions inherited from the parent's
    // signal handling and closes our copy of the listening socket.
    unsafe {
        libc::signal(libc::SIGTERM, libc::SIG_DFL);
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        if let Some(fd) = listener_fd {
            libc::close(fd);
        }
    }
    drop(blocked);

    // The forking thread's runtime context is copied into the child, so the
    // session runs on a fresh thread with its own runtime.
    std::panic::catch_unwind(AssertUnwindSafe(move || {
        std::thread::Builder::new()
            .name(format!("session-{}", id))
            .spawn(move || child_session(id, stream, options, lookup))
            .map(|session| session.join().unwrap_or(EXIT_FAULT))
            .unwrap_or(EXIT_FAULT)
    }))
    .unwrap_or(EXIT_FAULT)
}

fn child_session(
    id: u64,
    stream: std::os::unix::net::UnixStream,
    options: SessionOptions,
    lookup: Arc<LookupQueryUseCase>,
) -> i32 {
    // The inherited subscriber's writer locks may belong to parent threads
    // that do not exist here.
    tracing::subscriber::with_default(NoSubscriber::default(), || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(_) => return EXIT_FAULT,
        };

        let handler = ConnectionHandler::new(id, options, lookup, Arc::new(HandlerRegistry::new()));
        let result = runtime.block_on(async {
            let stream = UnixStream::from_std(stream)?;
            handler.run(stream).await
        });

        match result {
            Ok(_) => EXIT_OK,
            Err(e) if e.sends_fail() => EXIT_PROTOCOL_FAILURE,
            Err(_) => EXIT_FAULT,
        }
    })
}

/// Blocks until the child exits, then reaps it. Run on the blocking pool.
pub fn wait_for_exit(worker: &ProcessWorker) -> io::Result<ChildExit> {
    let pid = worker.pid;

    // Wait without reaping: the pid stays ours while `stop` may signal it.
    loop {
        // SAFETY: info points to a live, zeroed siginfo_t for the call.
        let rc = unsafe {
            let mut info: libc::siginfo_t = std::mem::zeroed();
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    let mut reaped = worker.lock_reaped();
    let mut status: libc::c_int = 0;
    loop {
        // SAFETY: status points to a live c_int for the duration of the call.
        let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
        if rc != -1 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            // The pid is no longer ours to signal either way.
            *reaped = true;
            return Err(err);
        }
    }
    *reaped = true;
    drop(reaped);

    if libc::WIFEXITED(status) {
        Ok(ChildExit::Exited(libc::WEXITSTATUS(status)))
    } else if libc::WIFSIGNALED(status) {
        Ok(ChildExit::Signaled(libc::WTERMSIG(status)))
    } else {
        Err(io::Error::other(format!("unexpected wait status {}", status)))
    }
}
