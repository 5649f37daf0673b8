//! Shared state between a listener thread and its owner.
//!
//! A [`ListenerHandle`] is allocated by the owner immediately before the
//! listener thread is spawned. The thread populates it during its
//! initialization phase (under the startup lock), the steady-state loop
//! consults it on every wake, and the owner uses it to request shutdown.

use crate::error::{StartError, INIT_SUCCESS};
use crate::watcher::Canceller;
use parking_lot::{Condvar, Mutex};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::ThreadId;

/// Mechanism `request_shutdown` uses to unblock the parked listener thread.
///
/// Installed by the listener thread once its wait machinery exists, and
/// cleared by the same thread right before it exits, so the owner can never
/// signal a mechanism that has already been released.
pub(crate) enum WakeTarget {
    /// Thread not started yet, already exited, or needs no wake (the
    /// polling control-line watcher observes the flag on its own).
    None,
    /// Write side of the data listener's wake descriptor.
    Fd(RawFd),
    /// Cancel capability of a blocking control-line watcher.
    Cancel(Canceller),
}

/// Synchronization and state record shared between the owner and one
/// listener thread.
///
/// Exactly one listener thread is ever associated with a handle. The
/// handshake fields are the only state needing mutual exclusion, and that
/// exclusion is scoped to startup; the steady-state loop reads the shutdown
/// flag without locking.
pub struct ListenerHandle {
    /// Borrowed descriptor of the already-open port. Never closed here.
    fd: RawFd,
    /// Set by the owner to request termination.
    shutdown: AtomicBool,
    /// Startup handshake slot; written exactly once by the listener thread.
    startup: Mutex<Option<Result<(), StartError>>>,
    startup_cond: Condvar,
    /// Integer view of the handshake result. `0` until published.
    init_status: AtomicI32,
    wake: Mutex<WakeTarget>,
    /// `None` is the sentinel for "no thread running".
    thread_id: Mutex<Option<ThreadId>>,
}

impl ListenerHandle {
    pub(crate) fn new(fd: RawFd) -> Self {
        Self {
            fd,
            shutdown: AtomicBool::new(false),
            startup: Mutex::new(None),
            startup_cond: Condvar::new(),
            init_status: AtomicI32::new(0),
            wake: Mutex::new(WakeTarget::None),
            thread_id: Mutex::new(None),
        }
    }

    /// The watched port descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Whether the owner has requested termination.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Integer init result: `0` while initialization is still in flight,
    /// [`INIT_SUCCESS`] on success, a negative cause code on failure.
    pub fn init_status(&self) -> i32 {
        self.init_status.load(Ordering::SeqCst)
    }

    /// Identifier of the running listener thread, or `None` once it has
    /// exited (or never initialized).
    pub fn thread_id(&self) -> Option<ThreadId> {
        *self.thread_id.lock()
    }

    /// Request termination and fire the thread's wake mechanism.
    ///
    /// Idempotent: only the first call signals the wake mechanism, so a
    /// repeated request produces no duplicate side effects.
    pub fn request_shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let wake = self.wake.lock();
        match &*wake {
            WakeTarget::None => {}
            WakeTarget::Fd(fd) => crate::poll::signal_wake_fd(*fd),
            WakeTarget::Cancel(canceller) => canceller.fire(),
        }
    }

    /// Publish the init result and release the owner blocked in
    /// [`wait_for_init`](Self::wait_for_init). Called once, by the
    /// listener thread, at the end of its initialization phase.
    pub(crate) fn publish_init(&self, result: Result<(), StartError>) {
        let mut slot = self.startup.lock();
        debug_assert!(slot.is_none(), "init result published twice");
        let code = match &result {
            Ok(()) => INIT_SUCCESS,
            Err(err) => err.status_code(),
        };
        self.init_status.store(code, Ordering::SeqCst);
        *slot = Some(result);
        self.startup_cond.notify_all();
    }

    /// Block until the listener thread publishes its init result.
    pub(crate) fn wait_for_init(&self) -> Result<(), StartError> {
        let mut slot = self.startup.lock();
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            self.startup_cond.wait(&mut slot);
        }
    }

    pub(crate) fn set_wake_fd(&self, fd: RawFd) {
        *self.wake.lock() = WakeTarget::Fd(fd);
    }

    pub(crate) fn set_canceller(&self, canceller: Canceller) {
        *self.wake.lock() = WakeTarget::Cancel(canceller);
    }

    /// Remove the wake mechanism. The listener thread calls this before
    /// releasing the underlying resource; holding the lock here is what
    /// keeps `request_shutdown` from signaling a released mechanism.
    pub(crate) fn clear_wake(&self) {
        *self.wake.lock() = WakeTarget::None;
    }

    pub(crate) fn set_thread_id(&self, id: ThreadId) {
        *self.thread_id.lock() = Some(id);
    }

    pub(crate) fn clear_thread_id(&self) {
        *self.thread_id.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_handshake_roundtrip() {
        let handle = Arc::new(ListenerHandle::new(-1));
        assert_eq!(handle.init_status(), 0);

        let publisher = Arc::clone(&handle);
        let t = thread::spawn(move || {
            publisher.set_thread_id(thread::current().id());
            publisher.publish_init(Ok(()));
        });

        assert!(handle.wait_for_init().is_ok());
        assert_eq!(handle.init_status(), INIT_SUCCESS);
        t.join().unwrap();
        assert!(handle.thread_id().is_some());
    }

    #[test]
    fn test_handshake_failure_carries_status_code() {
        let handle = Arc::new(ListenerHandle::new(-1));
        let publisher = Arc::clone(&handle);
        let t = thread::spawn(move || {
            publisher.publish_init(Err(StartError::WakeDescriptor(
                std::io::Error::from_raw_os_error(libc::EMFILE),
            )));
        });

        let err = handle.wait_for_init().unwrap_err();
        assert_eq!(err.status_code(), -4);
        assert_eq!(handle.init_status(), -4);
        t.join().unwrap();
    }

    #[test]
    fn test_request_shutdown_fires_canceller_once() {
        let handle = ListenerHandle::new(-1);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        handle.set_canceller(Canceller::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!handle.shutdown_requested());
        handle.request_shutdown();
        handle.request_shutdown();
        assert!(handle.shutdown_requested());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_with_cleared_wake_is_a_no_op() {
        let handle = ListenerHandle::new(-1);
        handle.set_canceller(Canceller::from_fn(|| {
            panic!("must not fire after clear_wake")
        }));
        handle.clear_wake();
        handle.request_shutdown();
    }

    #[test]
    fn test_thread_id_sentinel() {
        let handle = ListenerHandle::new(-1);
        assert!(handle.thread_id().is_none());
        handle.set_thread_id(thread::current().id());
        assert!(handle.thread_id().is_some());
        handle.clear_thread_id();
        assert!(handle.thread_id().is_none());
    }
}
