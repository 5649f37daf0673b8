//! kqueue-backed readiness multiplexer (macOS and the BSDs).
//!
//! Registrations are folded into the same `kevent` call the wait uses, but
//! this module keeps them as separate explicit steps to match the epoll
//! surface: register once during listener init, then wait forever.

use super::{PollEvent, Token};
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

const MAX_EVENTS: usize = 4;

#[derive(Debug)]
pub(crate) struct Poller {
    kq: RawFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { kq })
    }

    /// Register `fd` for read-filter notification under `token`.
    pub fn register_readable(&mut self, fd: RawFd, token: Token) -> io::Result<()> {
        // Struct literal avoided: the kevent layout grows an `ext` field
        // on some BSDs.
        let mut change: libc::kevent = unsafe { std::mem::zeroed() };
        change.ident = fd as libc::uintptr_t;
        change.filter = libc::EVFILT_READ;
        change.flags = libc::EV_ADD;
        change.udata = token as *mut libc::c_void;
        let ret = unsafe { libc::kevent(self.kq, &change, 1, ptr::null_mut(), 0, ptr::null()) };
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
        let mut events: [libc::kevent; MAX_EVENTS] = unsafe { std::mem::zeroed() };
        let ret = unsafe {
            libc::kevent(
                self.kq,
                ptr::null(),
                0,
                events.as_mut_ptr(),
                MAX_EVENTS as libc::c_int,
                ptr::null(),
            )
        };
        if ret <= 0 {
            return Err(io::Error::last_os_error());
        }
        for event in events.iter().take(ret as usize) {
            out.push(PollEvent {
                token: event.udata as Token,
                readable: event.filter == libc::EVFILT_READ,
                error: event.flags & libc::EV_ERROR != 0,
                hangup: event.flags & libc::EV_EOF != 0,
            });
        }
        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kq);
        }
    }
}
