//! Crate-wide error type.

/// The result type returned by this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures that can surface from the two cores.
///
/// Per-opcode protocol failures (bad mode, unknown opcode, host I/O errors)
/// are *not* represented here: the ARM semihosting contract requires those
/// to be written into `result`/`sys_errno` and handed back to the target,
/// never raised as a Rust error. This enum covers only failures the target
/// contract has no slot for: the collaborator itself misbehaving.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A read or write against the target's memory or registers failed.
    #[error("target memory/register access failed")]
    Target(#[from] TargetError),

    /// A user-supplied event hook (pre/post enable, pre/post disable, or a
    /// semihosting setup/post-result callback) returned failure.
    #[error("event hook failed: {0}")]
    Hook(String),

    /// `enable()` was asked for a trace protocol the attached TPIU does not
    /// report support for via `DEVID`.
    #[error("TPIU does not support protocol {0:?}")]
    UnsupportedProtocol(crate::tpiu::instance::PinProtocol),

    /// `enable()` preconditions were not met (missing clock info, missing
    /// pin frequency for an externally-clocked UART/Manchester output).
    #[error("TPIU instance misconfigured: {0}")]
    Configuration(String),

    /// The requested synchronous port width is not supported by the
    /// attached TPIU (`SSPSR` bit not set).
    #[error("TPIU does not support port width {0}")]
    UnsupportedPortWidth(u8),

    /// A name collision on `TpiuSwoController::create`.
    #[error("a TPIU/SWO instance named {0:?} already exists")]
    DuplicateInstance(String),

    /// A lookup by name found nothing.
    #[error("no TPIU/SWO instance named {0:?}")]
    UnknownInstance(String),

    /// The probe's trace-capture primitive failed.
    #[error("probe trace capture failed: {0}")]
    Probe(String),

    /// A sink (trace file or TCP broadcast service) failed to open.
    #[error("failed to open trace sink: {0}")]
    Sink(#[source] std::io::Error),

    /// Generic host I/O failure not otherwise classified.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A target-memory transport failure, as reported by a [`crate::Target`]
/// implementation. Kept distinct from [`Error`] so collaborator impls can
/// return their own concrete error and have it folded in via `#[from]`.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct TargetError(pub String);

impl TargetError {
    /// Build a `TargetError` from any displayable cause.
    pub fn new(cause: impl std::fmt::Display) -> Self {
        Self(cause.to_string())
    }
}
