//! Listener startup error types and status-code mapping.
//!
//! A listener reports initialization failure synchronously to the owner that
//! started it. Each failure cause carries its own negative status code so the
//! port-management layer above can distinguish them without inspecting the
//! error; `1` means the listener thread initialized and is running.

use crate::config::ConfigError;
use thiserror::Error;

/// Status code reported through the startup handshake on success.
pub const INIT_SUCCESS: i32 = 1;

/// Errors raised while binding a [`Consumer`](crate::Consumer) to a listener
/// thread during initialization.
#[derive(Debug, Error)]
pub enum AttachError {
    /// The consumer's backing runtime refused the per-thread attachment.
    #[error("consumer runtime attachment failed: {0}")]
    Runtime(String),

    /// The consumer does not expose the delivery method the listener needs.
    #[error("consumer delivery binding missing: {0}")]
    MissingBinding(String),
}

/// Errors that can abort listener startup.
///
/// Produced on the listener thread during its initialization phase and handed
/// back to the spawning owner through the startup handshake. The listener
/// thread releases any partially acquired resources before reporting, so the
/// owner may retry registration after observing a failure.
#[derive(Debug, Error)]
pub enum StartError {
    /// The consumer's runtime attachment step failed on the listener thread.
    #[error("consumer failed to attach on the listener thread: {0}")]
    ConsumerAttach(String),

    /// The consumer lacks the required delivery binding.
    #[error("consumer delivery binding could not be resolved: {0}")]
    ConsumerResolution(String),

    /// The wake descriptor (eventfd / pipe) could not be created.
    #[error("failed to create wake descriptor: {0}")]
    WakeDescriptor(#[source] std::io::Error),

    /// The readiness-notification context (epoll / kqueue) could not be created.
    #[error("failed to create readiness notification context: {0}")]
    NotificationContext(#[source] std::io::Error),

    /// A descriptor could not be registered with the notification context.
    #[error("failed to register descriptor for readiness notification: {0}")]
    Registration(#[source] std::io::Error),

    /// The signal handler used to interrupt a blocking control-line wait
    /// could not be installed.
    #[error("failed to install interruption handler: {0}")]
    InterruptHandler(#[source] std::io::Error),

    /// The listener configuration failed validation.
    #[error("invalid listener configuration: {0}")]
    Config(#[from] ConfigError),

    /// The OS refused to spawn the listener thread.
    #[error("failed to spawn listener thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl StartError {
    /// Negative status code identifying this failure cause.
    ///
    /// The codes are part of the lifecycle contract with the owning layer;
    /// [`INIT_SUCCESS`] (`1`) is the only non-negative value ever reported.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::ConsumerAttach(_) => -2,
            Self::ConsumerResolution(_) => -3,
            Self::WakeDescriptor(_) => -4,
            Self::NotificationContext(_) => -5,
            Self::Registration(_) => -6,
            Self::InterruptHandler(_) => -7,
            Self::Config(_) => -8,
            Self::Spawn(_) => -9,
        }
    }
}

impl From<AttachError> for StartError {
    fn from(err: AttachError) -> Self {
        match err {
            AttachError::Runtime(msg) => Self::ConsumerAttach(msg),
            AttachError::MissingBinding(msg) => Self::ConsumerResolution(msg),
        }
    }
}
