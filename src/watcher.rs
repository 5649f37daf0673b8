//! Control-line wait strategies.
//!
//! Two ways of learning that a modem control line changed, behind one
//! trait: on Linux the `TIOCMIWAIT` ioctl sleeps in the kernel until a line
//! transitions; everywhere else the watcher polls the lines at a fixed
//! cadence. The two differ in delivery policy as well, and that asymmetry
//! is part of the contract: the blocking watcher reports every wake-up,
//! the polling watcher only reports changes.

use crate::lines::LineMask;
use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;
use thiserror::Error;

/// How the event listener decides whether a computed mask is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Deliver unconditionally every time the wait call returns
    /// (level-triggered; the blocking-primitive platforms).
    EveryWake,
    /// Deliver only when the mask differs from the previously delivered
    /// one, starting from an all-clear baseline (edge-triggered; the
    /// polling platforms).
    OnChange,
}

/// Outcome of a control-line wait that did not observe a line change.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The blocking wait was interrupted by a signal. The listener checks
    /// for a shutdown request and otherwise re-enters the wait.
    #[error("control-line wait interrupted by signal")]
    Interrupted,

    /// The wait failed at the device level, typically because the
    /// underlying device disappeared (`TIOCMIWAIT` returns `EIO` when a
    /// USB adapter is unplugged). The listener restarts the wait.
    #[error("control-line wait failed: {0}")]
    Device(#[source] io::Error),
}

/// Capability that breaks an in-flight blocking wait from another thread.
///
/// Obtained from the watcher on the listener thread during initialization
/// and fired by `request_shutdown`. Watchers whose waits observe the
/// shutdown flag on their own (the polling strategy) return a no-op.
pub struct Canceller {
    fire: Option<Box<dyn Fn() + Send>>,
}

impl Canceller {
    /// A canceller that does nothing when fired.
    pub fn none() -> Self {
        Self { fire: None }
    }

    /// Wrap an arbitrary interruption action.
    pub fn from_fn(f: impl Fn() + Send + 'static) -> Self {
        Self {
            fire: Some(Box::new(f)),
        }
    }

    pub(crate) fn fire(&self) {
        if let Some(fire) = &self.fire {
            fire();
        }
    }
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller")
            .field("armed", &self.fire.is_some())
            .finish()
    }
}

/// Strategy for waiting on modem control-line changes.
pub trait ControlLineWatcher: Send {
    /// Park until a line may have changed.
    ///
    /// `Ok(())` means the lines should be read and the mask considered for
    /// delivery; both error outcomes are recoverable and restart the loop.
    fn wait(&mut self) -> Result<(), WaitError>;

    /// Query the current control-line state.
    fn read_lines(&mut self) -> io::Result<LineMask>;

    /// The delivery policy this strategy mandates.
    fn delivery_policy(&self) -> DeliveryPolicy;

    /// Hand out the interruption capability for this watcher.
    ///
    /// Called once, on the listener thread, during initialization.
    fn canceller(&mut self) -> Canceller {
        Canceller::none()
    }
}

/// Read and decode the modem lines of `fd` via `TIOCMGET`.
pub(crate) fn read_modem_lines(fd: RawFd) -> io::Result<LineMask> {
    let mut status: libc::c_int = 0;
    let ret = unsafe { libc::ioctl(fd, libc::TIOCMGET as _, &mut status) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(LineMask::from_tiocm(status))
}

/// Construct the watcher native to this platform.
pub(crate) fn platform_watcher(
    fd: RawFd,
    poll_interval: Duration,
) -> io::Result<Box<dyn ControlLineWatcher>> {
    #[cfg(target_os = "linux")]
    {
        let _ = poll_interval;
        Ok(Box::new(ModemWaitWatcher::new(fd)?))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Ok(Box::new(IntervalWatcher::new(fd, poll_interval)))
    }
}

/// `TIOCMIWAIT` is absent from the libc crate; same value across Linux
/// architectures.
#[cfg(target_os = "linux")]
const TIOCMIWAIT: libc::c_ulong = 0x545C;

/// Blocking watcher built on the `TIOCMIWAIT` ioctl (Linux).
///
/// The ioctl is uninterruptible except by signal, so construction installs
/// a no-op `SIGUSR1` handler (without `SA_RESTART`) and the canceller
/// delivers that signal to the listener thread, forcing the ioctl to
/// return `EINTR` within one wait-call round trip.
#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct ModemWaitWatcher {
    fd: RawFd,
}

#[cfg(target_os = "linux")]
impl ModemWaitWatcher {
    /// Install the interruption handler and wrap `fd`.
    pub fn new(fd: RawFd) -> io::Result<Self> {
        install_wake_signal_handler()?;
        Ok(Self { fd })
    }
}

#[cfg(target_os = "linux")]
impl ControlLineWatcher for ModemWaitWatcher {
    fn wait(&mut self) -> Result<(), WaitError> {
        let lines = libc::TIOCM_CD | libc::TIOCM_RI | libc::TIOCM_DSR | libc::TIOCM_CTS;
        let ret = unsafe { libc::ioctl(self.fd, TIOCMIWAIT as _, lines as libc::c_ulong) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Err(WaitError::Interrupted);
            }
            return Err(WaitError::Device(err));
        }
        Ok(())
    }

    fn read_lines(&mut self) -> io::Result<LineMask> {
        read_modem_lines(self.fd)
    }

    fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy::EveryWake
    }

    fn canceller(&mut self) -> Canceller {
        // pthread_self is only meaningful because this runs on the
        // listener thread itself.
        let thread = unsafe { libc::pthread_self() };
        Canceller::from_fn(move || {
            let _ = unsafe { libc::pthread_kill(thread, libc::SIGUSR1) };
        })
    }
}

/// Polling watcher for platforms without a blocking wait primitive.
///
/// Sleeps for a fixed interval, then has the caller sample the lines; the
/// shutdown flag is observed between sleeps, so no canceller is needed.
#[derive(Debug)]
pub struct IntervalWatcher {
    fd: RawFd,
    interval: Duration,
}

impl IntervalWatcher {
    pub fn new(fd: RawFd, interval: Duration) -> Self {
        Self { fd, interval }
    }
}

impl ControlLineWatcher for IntervalWatcher {
    fn wait(&mut self) -> Result<(), WaitError> {
        std::thread::sleep(self.interval);
        Ok(())
    }

    fn read_lines(&mut self) -> io::Result<LineMask> {
        read_modem_lines(self.fd)
    }

    fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy::OnChange
    }
}

#[cfg(target_os = "linux")]
extern "C" fn wake_signal_handler(_signal: libc::c_int) {
    // Nothing to do: receipt alone makes the blocked ioctl return EINTR.
}

#[cfg(target_os = "linux")]
fn install_wake_signal_handler() -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = wake_signal_handler as usize;
        libc::sigemptyset(&mut action.sa_mask);
        // No SA_RESTART: the blocking ioctl must fail with EINTR instead
        // of being transparently restarted.
        action.sa_flags = 0;
        if libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
