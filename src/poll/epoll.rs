//! epoll-backed readiness multiplexer (Linux).
//!
//! Level-triggered, registered for read/error/hangup interest. The wait
//! call blocks with no timeout; waking it is the wake descriptor's job.

use super::{PollEvent, Token};
use std::io;
use std::os::unix::io::RawFd;

const MAX_EVENTS: usize = 4;

#[derive(Debug)]
pub(crate) struct Poller {
    epfd: RawFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epfd })
    }

    /// Register `fd` for readable/error/hangup notification under `token`.
    pub fn register_readable(&mut self, fd: RawFd, token: Token) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: (libc::EPOLLIN | libc::EPOLLPRI | libc::EPOLLERR | libc::EPOLLHUP) as u32,
            u64: token as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Block until at least one registered source fires, with no timeout.
    ///
    /// `out` is cleared and refilled. An error return (including `EINTR`)
    /// leaves `out` empty; the caller restarts its loop.
    pub fn wait(&mut self, out: &mut Vec<PollEvent>) -> io::Result<()> {
        out.clear();
        let mut events: [libc::epoll_event; MAX_EVENTS] = unsafe { std::mem::zeroed() };
        let ret = unsafe {
            libc::epoll_wait(self.epfd, events.as_mut_ptr(), MAX_EVENTS as libc::c_int, -1)
        };
        if ret <= 0 {
            return Err(io::Error::last_os_error());
        }
        for event in events.iter().take(ret as usize) {
            let bits = event.events;
            out.push(PollEvent {
                token: event.u64 as Token,
                readable: bits & (libc::EPOLLIN | libc::EPOLLPRI) as u32 != 0,
                error: bits & libc::EPOLLERR as u32 != 0,
                hangup: bits & libc::EPOLLHUP as u32 != 0,
            });
        }
        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
