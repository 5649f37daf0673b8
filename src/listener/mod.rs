//! Listener lifecycle: start, handshake, shutdown.
//!
//! The two listener types share one startup choreography: the owner
//! allocates a [`ListenerHandle`], spawns the dedicated thread, and blocks
//! on the startup handshake until the thread has either acquired all of
//! its wait machinery or failed and released it again. Success hands the
//! owner a [`Listener`]; failure hands back the [`StartError`] (whose
//! [`status_code`](StartError::status_code) is the negative value of the
//! lifecycle contract).

mod data;
mod event;

use crate::config::ListenerConfig;
use crate::consumer::Consumer;
use crate::error::StartError;
use crate::handle::ListenerHandle;
use crate::watcher::ControlLineWatcher;
use data::DataLoop;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::debug;

/// A running listener thread, as seen by its owner.
///
/// Dropping a `Listener` requests shutdown and joins the thread; use
/// [`shutdown`](Listener::shutdown) to do the same explicitly.
pub struct Listener {
    handle: Arc<ListenerHandle>,
    thread: Option<JoinHandle<()>>,
}

impl Listener {
    /// Identifier of the listener thread, or `None` once it has exited.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.handle.thread_id()
    }

    /// The shared handle, for owners that keep their own registry.
    pub fn handle(&self) -> &Arc<ListenerHandle> {
        &self.handle
    }

    /// Request termination without waiting for it.
    ///
    /// Idempotent. The thread observes the request within one
    /// wake-mechanism round trip (or one poll interval for the polling
    /// event listener).
    pub fn request_shutdown(&self) {
        self.handle.request_shutdown();
    }

    /// Request termination and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.handle.request_shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.handle.request_shutdown();
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("fd", &self.handle.fd())
            .field("thread_id", &self.thread_id())
            .finish()
    }
}

/// Start a data listener on an already-open port descriptor.
///
/// Spawns the dedicated thread and blocks until it reports its
/// initialization result. The descriptor is borrowed: it must stay open
/// for the listener's lifetime and is never closed by this crate. The
/// owner must not read from it concurrently while the listener runs.
pub fn start_data_listener(
    fd: RawFd,
    consumer: Arc<dyn Consumer>,
    config: &ListenerConfig,
) -> Result<Listener, StartError> {
    config.validate()?;
    let handle = Arc::new(ListenerHandle::new(fd));
    let thread_handle = Arc::clone(&handle);
    let thread_config = config.clone();

    let thread = thread::Builder::new()
        .name(format!("serial-data-{fd}"))
        .spawn(move || {
            match DataLoop::init(Arc::clone(&thread_handle), consumer, &thread_config) {
                Ok(data_loop) => {
                    thread_handle.publish_init(Ok(()));
                    data_loop.run();
                }
                Err(err) => {
                    debug!("data listener init failed: {err}");
                    thread_handle.clear_thread_id();
                    thread_handle.clear_wake();
                    thread_handle.publish_init(Err(err));
                }
            }
        })
        .map_err(StartError::Spawn)?;

    finish_start(handle, thread)
}

/// Start an event listener on an already-open port descriptor, using the
/// platform-native control-line wait strategy.
pub fn start_event_listener(
    fd: RawFd,
    consumer: Arc<dyn Consumer>,
    config: &ListenerConfig,
) -> Result<Listener, StartError> {
    config.validate()?;
    let config = config.clone();
    start_event_listener_inner(fd, consumer, move |handle, consumer| {
        event::init(handle, consumer, &config)
    })
}

/// Event-listener startup with an injected watcher-construction step; the
/// public entry point passes the platform factory, tests pass scripted
/// watchers.
fn start_event_listener_inner<F>(
    fd: RawFd,
    consumer: Arc<dyn Consumer>,
    make_watcher: F,
) -> Result<Listener, StartError>
where
    F: FnOnce(
            &Arc<ListenerHandle>,
            &Arc<dyn Consumer>,
        ) -> Result<Box<dyn ControlLineWatcher>, StartError>
        + Send
        + 'static,
{
    let handle = Arc::new(ListenerHandle::new(fd));
    let thread_handle = Arc::clone(&handle);

    let thread = thread::Builder::new()
        .name(format!("serial-event-{fd}"))
        .spawn(move || match make_watcher(&thread_handle, &consumer) {
            Ok(watcher) => {
                thread_handle.publish_init(Ok(()));
                event::run(Arc::clone(&thread_handle), consumer, watcher);
            }
            Err(err) => {
                debug!("event listener init failed: {err}");
                thread_handle.clear_thread_id();
                thread_handle.clear_wake();
                thread_handle.publish_init(Err(err));
            }
        })
        .map_err(StartError::Spawn)?;

    finish_start(handle, thread)
}

/// Owner side of the startup handshake.
fn finish_start(
    handle: Arc<ListenerHandle>,
    thread: JoinHandle<()>,
) -> Result<Listener, StartError> {
    match handle.wait_for_init() {
        Ok(()) => Ok(Listener {
            handle,
            thread: Some(thread),
        }),
        Err(err) => {
            // The thread has already released its resources; reap it so a
            // failed start leaves nothing behind.
            let _ = thread.join();
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::ChannelConsumer;
    use crate::error::AttachError;
    use crate::lines::LineMask;
    use crate::watcher::{DeliveryPolicy, WaitError};
    use std::io;
    use std::time::Duration;

    struct UnresolvableConsumer;

    impl Consumer for UnresolvableConsumer {
        fn attach(&self) -> Result<(), AttachError> {
            Err(AttachError::MissingBinding("deliver_bytes".into()))
        }

        fn deliver_bytes(&self, _bytes: &[u8]) {
            panic!("must never be reached");
        }

        fn deliver_event(&self, _mask: LineMask) {
            panic!("must never be reached");
        }
    }

    /// Watcher that idles in short interruptible waits.
    struct IdleWatcher;

    impl ControlLineWatcher for IdleWatcher {
        fn wait(&mut self) -> Result<(), WaitError> {
            thread::sleep(Duration::from_millis(2));
            Err(WaitError::Interrupted)
        }

        fn read_lines(&mut self) -> io::Result<LineMask> {
            Ok(LineMask::EMPTY)
        }

        fn delivery_policy(&self) -> DeliveryPolicy {
            DeliveryPolicy::EveryWake
        }
    }

    #[test]
    fn test_data_listener_rejects_invalid_config() {
        let (consumer, _rx) = ChannelConsumer::new();
        let config = ListenerConfig {
            read_buffer_size: 0,
            ..Default::default()
        };
        let err = start_data_listener(0, Arc::new(consumer), &config).unwrap_err();
        assert_eq!(err.status_code(), -8);
    }

    #[test]
    fn test_data_listener_unresolvable_consumer_reports_negative_status() {
        let err = start_data_listener(
            0,
            Arc::new(UnresolvableConsumer),
            &ListenerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StartError::ConsumerResolution(_)));
        assert_eq!(err.status_code(), -3);
    }

    #[test]
    fn test_data_listener_bad_descriptor_fails_registration() {
        let (consumer, _rx) = ChannelConsumer::new();
        let err = start_data_listener(-1, Arc::new(consumer), &ListenerConfig::default())
            .unwrap_err();
        assert!(matches!(err, StartError::Registration(_)));
        assert_eq!(err.status_code(), -6);
    }

    #[test]
    fn test_event_listener_unresolvable_consumer_reports_negative_status() {
        let err = start_event_listener_inner(
            -1,
            Arc::new(UnresolvableConsumer),
            |_handle, consumer| {
                consumer.attach().map_err(StartError::from)?;
                unreachable!("attach must fail first")
            },
        )
        .unwrap_err();
        assert_eq!(err.status_code(), -3);
    }

    #[test]
    fn test_event_listener_lifecycle_with_injected_watcher() {
        let (consumer, _rx) = ChannelConsumer::new();
        let listener = start_event_listener_inner(
            -1,
            Arc::new(consumer),
            |handle, consumer| {
                consumer.attach().map_err(StartError::from)?;
                Ok(event::finish_init(handle, Box::new(IdleWatcher)))
            },
        )
        .unwrap();

        assert!(listener.thread_id().is_some());
        let handle = Arc::clone(listener.handle());

        listener.request_shutdown();
        listener.request_shutdown();
        listener.shutdown();

        assert!(handle.thread_id().is_none());
    }
}
