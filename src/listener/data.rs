//! Data listener: wait for readable, drain, deliver.
//!
//! The loop parks in the readiness multiplexer with no timeout, watching
//! the port descriptor and the wake descriptor. Every readiness
//! notification for the port yields exactly one `deliver_bytes` call: the
//! bytes read, reassembled across signal-interrupted partial reads, or an
//! empty buffer when readiness turned out to be spurious.

use crate::config::ListenerConfig;
use crate::consumer::Consumer;
use crate::error::StartError;
use crate::handle::ListenerHandle;
use crate::poll::{PollEvent, Poller, Token, WakeFd};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub(crate) const PORT_TOKEN: Token = 0;
pub(crate) const WAKE_TOKEN: Token = 1;

/// Classified result of one non-blocking read attempt.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    /// Bytes arrived and the call completed normally.
    Data(usize),
    /// Bytes may have arrived but the call was interrupted by a signal
    /// before completing; retry immediately and reassemble.
    Interrupted(usize),
    /// Nothing to read after all.
    WouldBlock,
    /// End of stream.
    Eof,
    /// Any other read failure; not fatal to the listener.
    Failed(io::Error),
}

/// Read seam so the drain sub-protocol is scriptable in tests.
pub(crate) trait PortReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> ReadOutcome;
}

/// Real reader over the port descriptor.
///
/// Mirrors the errno discipline of the underlying C idiom: errno is
/// cleared before the call so a successful-but-interrupted read (`n > 0`
/// with `EINTR` reported) can be told apart from a clean one.
pub(crate) struct FdReader {
    fd: RawFd,
}

impl FdReader {
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }
}

impl PortReader for FdReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> ReadOutcome {
        clear_errno();
        let ret = unsafe {
            libc::read(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if ret > 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return ReadOutcome::Interrupted(ret as usize);
            }
            return ReadOutcome::Data(ret as usize);
        }
        if ret == 0 {
            return ReadOutcome::Eof;
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return ReadOutcome::WouldBlock;
        }
        if err.raw_os_error() == Some(libc::EINTR) {
            return ReadOutcome::Interrupted(0);
        }
        ReadOutcome::Failed(err)
    }
}

fn clear_errno() {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe {
        *libc::__errno_location() = 0;
    }
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    unsafe {
        *libc::__error() = 0;
    }
}

/// Append `bytes` to `pending`, respecting the accumulation capacity.
fn append_clamped(pending: &mut Vec<u8>, bytes: &[u8], capacity: usize) {
    let room = capacity.saturating_sub(pending.len());
    if bytes.len() > room {
        warn!(
            dropped = bytes.len() - room,
            "partial-read accumulation buffer full, dropping bytes"
        );
    }
    pending.extend_from_slice(&bytes[..bytes.len().min(room)]);
}

/// The read-drain sub-protocol: one logical buffer per readiness
/// notification.
///
/// Retries interrupted reads immediately, accumulating the bytes obtained
/// so far (up to `capacity`), until a non-interrupted outcome is reached.
/// Every path returns exactly one buffer; a would-block, end-of-stream, or
/// failed read yields an empty one. Pending partial data never survives
/// past the returned buffer.
pub(crate) fn drain_available(
    reader: &mut dyn PortReader,
    scratch: &mut [u8],
    pending: &mut Vec<u8>,
    capacity: usize,
) -> Vec<u8> {
    pending.clear();
    loop {
        match reader.read_chunk(scratch) {
            ReadOutcome::Data(n) => {
                if pending.is_empty() {
                    return scratch[..n].to_vec();
                }
                append_clamped(pending, &scratch[..n], capacity);
                return std::mem::take(pending);
            }
            ReadOutcome::Interrupted(n) => {
                if n > 0 {
                    append_clamped(pending, &scratch[..n], capacity);
                }
                // Do not return to the outer wait; finish the read first.
            }
            ReadOutcome::WouldBlock | ReadOutcome::Eof => return Vec::new(),
            ReadOutcome::Failed(err) => {
                warn!("read failed while draining port: {err}");
                return Vec::new();
            }
        }
    }
}

/// State owned by the data listener thread.
pub(crate) struct DataLoop {
    handle: Arc<ListenerHandle>,
    consumer: Arc<dyn Consumer>,
    poller: Poller,
    wake: WakeFd,
    reader: FdReader,
    scratch: Vec<u8>,
    pending: Vec<u8>,
    capacity: usize,
}

impl DataLoop {
    /// Initialization phase, run on the listener thread before the owner
    /// is released from the startup handshake.
    ///
    /// On failure every partially acquired resource is released (by drop,
    /// in reverse acquisition order) and nothing is left registered on the
    /// handle, so the owner may retry.
    pub fn init(
        handle: Arc<ListenerHandle>,
        consumer: Arc<dyn Consumer>,
        config: &ListenerConfig,
    ) -> Result<Self, StartError> {
        consumer.attach().map_err(StartError::from)?;

        let wake = WakeFd::new().map_err(StartError::WakeDescriptor)?;
        let mut poller = Poller::new().map_err(StartError::NotificationContext)?;
        poller
            .register_readable(handle.fd(), PORT_TOKEN)
            .map_err(StartError::Registration)?;
        poller
            .register_readable(wake.wait_fd(), WAKE_TOKEN)
            .map_err(StartError::Registration)?;

        handle.set_wake_fd(wake.signal_fd());
        handle.set_thread_id(std::thread::current().id());

        let scratch = vec![0u8; config.read_buffer_size];
        let capacity = config.accumulation_capacity();
        Ok(Self {
            reader: FdReader::new(handle.fd()),
            handle,
            consumer,
            poller,
            wake,
            scratch,
            pending: Vec::new(),
            capacity,
        })
    }

    /// The wait loop. Runs until a shutdown request arrives through the
    /// wake descriptor.
    pub fn run(mut self) {
        debug!(fd = self.handle.fd(), "data listener entering wait loop");
        let mut events: Vec<PollEvent> = Vec::with_capacity(4);
        loop {
            if let Err(err) = self.poller.wait(&mut events) {
                trace!("readiness wait failed, restarting: {err}");
                continue;
            }

            if events.iter().any(|event| event.token == WAKE_TOKEN) {
                self.wake.drain();
                if self.handle.shutdown_requested() {
                    break;
                }
                trace!("wake with no shutdown request, treating as spurious");
            }

            let port = events.iter().find(|event| event.token == PORT_TOKEN);
            if let Some(event) = port {
                if event.readable && !event.error {
                    let buffer = drain_available(
                        &mut self.reader,
                        &mut self.scratch,
                        &mut self.pending,
                        self.capacity,
                    );
                    // A shutdown observed here suppresses the delivery.
                    if self.handle.shutdown_requested() {
                        break;
                    }
                    self.consumer.deliver_bytes(&buffer);
                }
            }
        }
        self.release();
    }

    fn release(self) {
        // Clear the handle's wake-fd copy before the descriptors close
        // with this struct's drop.
        self.handle.clear_wake();
        self.handle.clear_thread_id();
        debug!(fd = self.handle.fd(), "data listener exiting");
    }
}
