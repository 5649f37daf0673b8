//! End-to-end data listener lifecycle tests.
//!
//! A `UnixStream` pair stands in for the serial port descriptor: the
//! listener watches one end while the test writes into the other. This
//! exercises the real readiness multiplexer, wake descriptor, and
//! shutdown path without hardware.

use serial_listener::{
    start_data_listener, AttachError, ChannelConsumer, Consumer, Delivery, LineMask,
    ListenerConfig, StartError,
};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "serial_listener=debug".into()),
        )
        .try_init();
}

fn recv_bytes(rx: &Receiver<Delivery>) -> Vec<u8> {
    match rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Delivery::Bytes(bytes)) => bytes,
        Ok(other) => panic!("unexpected delivery: {other:?}"),
        Err(err) => panic!("no delivery arrived: {err}"),
    }
}

#[test]
fn test_delivers_bytes_in_arrival_order() {
    init_tracing();
    let (mut writer, port) = UnixStream::pair().unwrap();
    let (consumer, rx) = ChannelConsumer::new();

    let listener = start_data_listener(
        port.as_raw_fd(),
        Arc::new(consumer),
        &ListenerConfig::default(),
    )
    .unwrap();
    assert!(listener.thread_id().is_some());

    writer.write_all(b"first").unwrap();
    assert_eq!(recv_bytes(&rx), b"first");

    writer.write_all(b"second").unwrap();
    assert_eq!(recv_bytes(&rx), b"second");

    listener.shutdown();
}

#[test]
fn test_no_deliveries_after_shutdown() {
    init_tracing();
    let (mut writer, port) = UnixStream::pair().unwrap();
    let (consumer, rx) = ChannelConsumer::new();

    let listener = start_data_listener(
        port.as_raw_fd(),
        Arc::new(consumer),
        &ListenerConfig::default(),
    )
    .unwrap();

    writer.write_all(b"before").unwrap();
    assert_eq!(recv_bytes(&rx), b"before");

    // Idempotent: the repeated request must not break anything.
    listener.request_shutdown();
    listener.request_shutdown();
    listener.shutdown();

    writer.write_all(b"after").unwrap();
    assert!(
        rx.recv_timeout(Duration::from_millis(200)).is_err(),
        "listener delivered after shutdown"
    );
}

#[test]
fn test_closed_peer_yields_empty_buffer() {
    init_tracing();
    let (writer, port) = UnixStream::pair().unwrap();
    let (consumer, rx) = ChannelConsumer::new();

    let listener = start_data_listener(
        port.as_raw_fd(),
        Arc::new(consumer),
        &ListenerConfig::default(),
    )
    .unwrap();

    // End of stream is a spurious readiness: delivered as an empty
    // buffer, not fatal to the listener.
    drop(writer);
    assert_eq!(recv_bytes(&rx), b"");

    listener.shutdown();
}

#[test]
fn test_unresolvable_consumer_fails_start_cleanly() {
    init_tracing();

    struct UnresolvableConsumer;

    impl Consumer for UnresolvableConsumer {
        fn attach(&self) -> Result<(), AttachError> {
            Err(AttachError::MissingBinding("deliver_bytes".into()))
        }

        fn deliver_bytes(&self, _bytes: &[u8]) {
            unreachable!("listener must not loop after a failed attach");
        }

        fn deliver_event(&self, _mask: LineMask) {
            unreachable!("listener must not loop after a failed attach");
        }
    }

    let (_writer, port) = UnixStream::pair().unwrap();
    let err = start_data_listener(
        port.as_raw_fd(),
        Arc::new(UnresolvableConsumer),
        &ListenerConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(err, StartError::ConsumerResolution(_)));
    assert_eq!(err.status_code(), -3);
}

#[test]
fn test_listeners_on_two_ports_are_independent() {
    init_tracing();
    let (mut writer_a, port_a) = UnixStream::pair().unwrap();
    let (mut writer_b, port_b) = UnixStream::pair().unwrap();
    let (consumer_a, rx_a) = ChannelConsumer::new();
    let (consumer_b, rx_b) = ChannelConsumer::new();
    let config = ListenerConfig::default();

    let listener_a =
        start_data_listener(port_a.as_raw_fd(), Arc::new(consumer_a), &config).unwrap();
    let listener_b =
        start_data_listener(port_b.as_raw_fd(), Arc::new(consumer_b), &config).unwrap();

    writer_b.write_all(b"to-b").unwrap();
    writer_a.write_all(b"to-a").unwrap();

    assert_eq!(recv_bytes(&rx_a), b"to-a");
    assert_eq!(recv_bytes(&rx_b), b"to-b");

    listener_a.shutdown();

    // Listener B keeps running after A is gone.
    writer_b.write_all(b"still-alive").unwrap();
    assert_eq!(recv_bytes(&rx_b), b"still-alive");
    listener_b.shutdown();
}
