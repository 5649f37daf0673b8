//! Readiness-notification multiplexing.
//!
//! One `Poller` implementation per platform, selected at compile time:
//! epoll on Linux, kqueue on macOS and the BSDs. Both expose the same
//! surface (register a readable source under a token, wait with no timeout,
//! report which sources fired) and are intentionally not unified further;
//! the data listener is written against this small shared shape.
//!
//! `WakeFd` is the self-signaling descriptor registered alongside the port:
//! writing to it from another thread makes the blocked wait return so the
//! listener can observe a shutdown request.

use std::io;
use std::os::unix::io::RawFd;

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(target_os = "linux")]
pub(crate) use epoll::Poller;

#[cfg(not(target_os = "linux"))]
mod kqueue;
#[cfg(not(target_os = "linux"))]
pub(crate) use kqueue::Poller;

/// Caller-chosen identifier attached to a registered source.
pub(crate) type Token = usize;

/// One source that fired during a wait.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PollEvent {
    pub token: Token,
    pub readable: bool,
    pub error: bool,
    pub hangup: bool,
}

/// Self-signaling wake descriptor.
///
/// Created and owned by the listener thread; the handle only ever sees the
/// raw write-side fd, and that copy is cleared before this struct (and the
/// descriptors with it) is released.
#[derive(Debug)]
pub(crate) struct WakeFd {
    #[cfg(target_os = "linux")]
    fd: RawFd,
    #[cfg(not(target_os = "linux"))]
    read_fd: RawFd,
    #[cfg(not(target_os = "linux"))]
    write_fd: RawFd,
}

#[cfg(target_os = "linux")]
impl WakeFd {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Descriptor to register with the poller.
    pub fn wait_fd(&self) -> RawFd {
        self.fd
    }

    /// Descriptor another thread writes to in order to wake us.
    pub fn signal_fd(&self) -> RawFd {
        self.fd
    }

    /// Consume a pending wake so the level-triggered poller does not
    /// immediately report it again.
    pub fn drain(&self) {
        let mut count: u64 = 0;
        // Non-blocking; EAGAIN just means nothing was pending.
        let _ = unsafe {
            libc::read(
                self.fd,
                &mut count as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
    }
}

#[cfg(target_os = "linux")]
impl Drop for WakeFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl WakeFd {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }
        for fd in fds {
            unsafe {
                libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK);
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
        Ok(Self {
            read_fd: fds[0],
            write_fd: fds[1],
        })
    }

    pub fn wait_fd(&self) -> RawFd {
        self.read_fd
    }

    pub fn signal_fd(&self) -> RawFd {
        self.write_fd
    }

    pub fn drain(&self) {
        let mut scratch = [0u8; 16];
        loop {
            let n = unsafe {
                libc::read(
                    self.read_fd,
                    scratch.as_mut_ptr() as *mut libc::c_void,
                    scratch.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl Drop for WakeFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

/// Signal a wake descriptor from outside the listener thread.
///
/// Failures are deliberately swallowed: the only caller is
/// `request_shutdown`, and if the write fails the listener is already past
/// the point of caring (or will notice the flag on its next wake anyway).
pub(crate) fn signal_wake_fd(fd: RawFd) {
    #[cfg(target_os = "linux")]
    let res = {
        let value: u64 = 1;
        unsafe {
            libc::write(
                fd,
                &value as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        }
    };
    #[cfg(not(target_os = "linux"))]
    let res = unsafe { libc::write(fd, b"w".as_ptr() as *const libc::c_void, 1) };

    if res < 0 {
        tracing::trace!("wake descriptor write failed: {}", io::Error::last_os_error());
    }
}
