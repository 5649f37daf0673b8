//! Event listener: wait for a control-line transition, decode, deliver.
//!
//! The loop itself is platform-independent; the platform differences live
//! entirely in the [`ControlLineWatcher`] it drives. The blocking watcher
//! delivers every wake-up, the polling watcher only delivers changes,
//! an asymmetry inherited from the two wait primitives and kept on
//! purpose.

use crate::config::ListenerConfig;
use crate::consumer::Consumer;
use crate::error::StartError;
use crate::handle::ListenerHandle;
use crate::lines::LineMask;
use crate::watcher::{platform_watcher, ControlLineWatcher, DeliveryPolicy, WaitError};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Initialization phase, run on the listener thread.
///
/// Resolves the consumer binding and builds the platform watcher (which
/// installs its interruption machinery as a side effect). The watcher's
/// cancel capability is parked on the handle so `request_shutdown` can
/// break an in-flight blocking wait.
pub(crate) fn init(
    handle: &Arc<ListenerHandle>,
    consumer: &Arc<dyn Consumer>,
    config: &ListenerConfig,
) -> Result<Box<dyn ControlLineWatcher>, StartError> {
    consumer.attach().map_err(StartError::from)?;
    let watcher = platform_watcher(handle.fd(), config.poll_interval())
        .map_err(StartError::InterruptHandler)?;
    Ok(finish_init(handle, watcher))
}

/// Tail of the init phase, shared with test setups that inject their own
/// watcher.
pub(crate) fn finish_init(
    handle: &Arc<ListenerHandle>,
    mut watcher: Box<dyn ControlLineWatcher>,
) -> Box<dyn ControlLineWatcher> {
    handle.set_canceller(watcher.canceller());
    handle.set_thread_id(std::thread::current().id());
    watcher
}

/// The wait loop. Runs until a shutdown request is observed after a wake,
/// an interruption, or a device error.
pub(crate) fn run(
    handle: Arc<ListenerHandle>,
    consumer: Arc<dyn Consumer>,
    mut watcher: Box<dyn ControlLineWatcher>,
) {
    debug!(fd = handle.fd(), "event listener entering wait loop");
    let mut last_delivered = LineMask::EMPTY;
    loop {
        // The flag is set before the wake mechanism fires, so a request
        // that lands while this thread is delivering (where the wake
        // signal is consumed without effect) must be noticed here, before
        // the wait blocks again with nothing left to interrupt it.
        if shutdown_observed(&handle) {
            break;
        }

        match watcher.wait() {
            Ok(()) => {}
            Err(WaitError::Interrupted) => {
                if shutdown_observed(&handle) {
                    break;
                }
                continue;
            }
            Err(WaitError::Device(err)) => {
                // Seen e.g. when a USB adapter is unplugged mid-wait; the
                // wait restarts and may fail again immediately. That tight
                // loop is the accepted degenerate mode while cancellation
                // is pending.
                warn!("control-line wait failed, restarting: {err}");
                if shutdown_observed(&handle) {
                    break;
                }
                continue;
            }
        }

        if shutdown_observed(&handle) {
            break;
        }

        let mask = match watcher.read_lines() {
            Ok(mask) => mask,
            Err(err) => {
                warn!("control-line query failed, skipping: {err}");
                continue;
            }
        };

        match watcher.delivery_policy() {
            DeliveryPolicy::EveryWake => {
                trace!(%mask, "delivering control-line event");
                consumer.deliver_event(mask);
            }
            DeliveryPolicy::OnChange => {
                if mask != last_delivered {
                    trace!(%mask, "delivering control-line change");
                    consumer.deliver_event(mask);
                    last_delivered = mask;
                }
            }
        }
    }

    handle.clear_wake();
    handle.clear_thread_id();
    debug!(fd = handle.fd(), "event listener exiting");
}

fn shutdown_observed(handle: &ListenerHandle) -> bool {
    handle.shutdown_requested()
}
