//! Per-port background listener engine for serial communication.
//!
//! This crate runs the two wait loops that sit underneath a serial
//! communication library: a **data listener** that parks in the OS
//! readiness multiplexer (epoll on Linux, kqueue on macOS/BSD) and hands
//! every batch of newly arrived bytes to a registered [`Consumer`], and an
//! **event listener** that watches the four modem control lines
//! (CTS/DSR/DCD/RI) and delivers a 4-bit [`LineMask`] when they change.
//!
//! Opening and configuring the port is the surrounding library's job; this
//! crate borrows an already-open descriptor and never closes it.
//!
//! # Modules
//!
//! - `config`: listener tuning knobs (read buffer size, polling cadence)
//! - `consumer`: the delivery capability and a channel-backed helper
//! - `error`: startup errors and their negative status codes
//! - `handle`: owner/thread shared state and the startup handshake
//! - `lines`: the control-line mask
//! - `listener`: lifecycle entry points and the two wait loops
//! - `watcher`: control-line wait strategies (blocking vs polling)
//!
//! # Example
//!
//! ```no_run
//! use serial_listener::{start_data_listener, ChannelConsumer, ListenerConfig};
//! use std::sync::Arc;
//!
//! # fn open_port() -> std::os::unix::io::RawFd { 0 }
//! let fd = open_port(); // an already-open serial port descriptor
//! let (consumer, deliveries) = ChannelConsumer::new();
//!
//! let listener = start_data_listener(fd, Arc::new(consumer), &ListenerConfig::default())?;
//! for delivery in deliveries.iter().take(3) {
//!     println!("{delivery:?}");
//! }
//! listener.shutdown();
//! # Ok::<(), serial_listener::StartError>(())
//! ```

#[cfg(not(unix))]
compile_error!("serial-listener relies on Unix readiness primitives (epoll/kqueue)");

pub mod config;
pub mod consumer;
pub mod error;
pub mod handle;
pub mod lines;
pub mod listener;
pub mod watcher;

mod poll;

// Re-export the full working surface for convenience.
pub use config::{ConfigError, ListenerConfig, ACCUMULATION_FACTOR};
pub use consumer::{ChannelConsumer, Consumer, Delivery};
pub use error::{AttachError, StartError, INIT_SUCCESS};
pub use handle::ListenerHandle;
pub use lines::LineMask;
pub use listener::{start_data_listener, start_event_listener, Listener};
pub use watcher::{Canceller, ControlLineWatcher, DeliveryPolicy, IntervalWatcher, WaitError};

#[cfg(target_os = "linux")]
pub use watcher::ModemWaitWatcher;
