//! External-role collaborators named out of scope by the source system:
//! the command interpreter, the probe driver's trace primitives, the
//! remote file-I/O transport, and the generic TCP service registry.
//!
//! Each is expressed here as a trait with default no-op methods, following
//! the same shape as `RunLoopPoller` in probe-rs's run loop: a caller with
//! nothing to plug in can pass `None::<Foo>` rather than writing a no-op
//! struct, via the blanket `impl<T: Trait> Trait for Option<T>` below each
//! trait.

use crate::error::Result;

/// Resolves a logical "DAP handle + access-port number" pair to a concrete
/// access port, lazily, the first time an instance is enabled.
///
/// Stands in for the debug access port / access-port abstraction (spec §1).
pub trait ApResolver {
    /// Opaque handle type for the resolved access port.
    type Ap;

    /// Resolves `dap`/`ap_num` to a usable access port.
    fn resolve(&mut self, dap: &str, ap_num: u8) -> Result<Self::Ap>;
}

/// Register-level access to a resolved access port, used by
/// [`crate::tpiu::instance::TpiuSwoInstance`] to read/write the TPIU block
/// at `ap_spot.base + offset`.
///
/// Stands in for `wrap_read_u32`/`wrap_write_u32` in `arm_tpiu_swo.c`, which
/// dispatch to either a direct core register access (HLA transport) or an
/// atomic mem-AP access depending on transport; both collapse to "read/write
/// a 32-bit register at an address" from this crate's point of view, so a
/// single trait covers both without the transport distinction (out of scope
/// per spec §1, "the debug access port ... abstraction").
pub trait ApRegisterAccess {
    /// Reads a 32-bit register at `addr`.
    fn read_u32(&mut self, addr: u64) -> Result<u32>;

    /// Writes a 32-bit register at `addr`.
    fn write_u32(&mut self, addr: u64, value: u32) -> Result<()>;
}

/// The probe driver's trace-capture primitives (spec §1: "the probe driver
/// exposing `poll_trace`/`config_trace` primitives").
pub trait TraceProbe {
    /// Starts or stops probe-side trace capture.
    ///
    /// `pin_freq_inout` is desired SWO bit rate on entry (0 = autodetect)
    /// and actual achieved bit rate on exit; `prescaler_out` receives the
    /// prescaler the probe itself applied, when it computes one internally
    /// (sync/adapter-timed paths) rather than leaving that to the caller.
    #[allow(clippy::too_many_arguments)]
    fn config_trace(
        &mut self,
        enable: bool,
        protocol: crate::tpiu::instance::PinProtocol,
        port_width: u8,
        pin_freq_inout: &mut u32,
        traceclkin_freq: u32,
        prescaler_out: &mut Option<u32>,
    ) -> Result<()>;

    /// Polls up to `max_bytes` of captured trace data.
    fn poll_trace(&mut self, max_bytes: usize) -> Result<Vec<u8>>;
}

/// Runs a user-supplied event-hook body (TPIU pre/post enable/disable,
/// semihosting USER_CMD) under whatever script interpreter the host embeds.
///
/// Modeled per spec §9 as `EventRunner.run(body, saved_target) -> Result<(), HookError>`.
pub trait EventRunner {
    /// Executes `body` with `target_name` as the interpreter's "current
    /// target", saving and restoring whatever the interpreter considered
    /// current before the call.
    fn run(&mut self, body: &str, target_name: &str) -> Result<()>;
}

impl<T: EventRunner> EventRunner for Option<T> {
    fn run(&mut self, body: &str, target_name: &str) -> Result<()> {
        match self {
            Some(inner) => inner.run(body, target_name),
            None => Ok(()),
        }
    }
}

/// The remote file-I/O transport to an attached debug frontend (spec §1).
///
/// When `is_fileio` is set, I/O-class semihosting operations are published
/// here instead of running on the host; see [`crate::semihosting::fileio`].
pub trait FileioTransport {
    /// Publishes a pending file-I/O request for the frontend to service.
    fn publish(&mut self, request: crate::semihosting::fileio::FileioRequest);
}

impl<T: FileioTransport> FileioTransport for Option<T> {
    fn publish(&mut self, request: crate::semihosting::fileio::FileioRequest) {
        if let Some(inner) = self {
            inner.publish(request);
        }
    }
}

/// The generic TCP service registry used to publish streaming endpoints
/// (spec §1). `TpiuSwoController`'s own broadcast fan-out (spec §2, §4.4
/// sink setup) is in scope and does not go through this trait; this models
/// only the wider, cross-subsystem service directory a real host process
/// would also have (so a caller integrating this crate into such a host can
/// still register the same port through one registry instead of two).
pub trait ServiceRegistry {
    /// Registers a listener on `port`, returning an opaque service handle.
    fn register(&mut self, port: u16) -> Result<()>;

    /// Unregisters a previously registered listener.
    fn unregister(&mut self, port: u16);
}

impl<T: ServiceRegistry> ServiceRegistry for Option<T> {
    fn register(&mut self, port: u16) -> Result<()> {
        match self {
            Some(inner) => inner.register(port),
            None => Ok(()),
        }
    }

    fn unregister(&mut self, port: u16) {
        if let Some(inner) = self {
            inner.unregister(port);
        }
    }
}

/// Collaborator callbacks `SemihostingState` invokes around dispatch (spec
/// §3: `setup`, `post_result`, `user_command_extension`).
pub trait SemihostingHooks {
    /// Called whenever `semihosting {enable|disable}` toggles `is_active`,
    /// before the new value is stored, so a target-type layer gets a chance
    /// to arm/disarm its semihosting trap handling.
    fn setup(&mut self, target: &mut dyn crate::Target, is_active: bool) -> Result<()> {
        let _ = (target, is_active);
        Ok(())
    }

    /// Delivers the final result/errno for a dispatched operation back to
    /// the target (writing return registers, resuming execution, etc).
    fn post_result(&mut self, target: &mut dyn crate::Target, result: i64, sys_errno: i32) {
        let _ = (target, result, sys_errno);
    }

    /// Gives a native extension first refusal on a `USER_CMD` opcode before
    /// it falls back to the generic buffer-copy-and-event-publish path.
    ///
    /// Returning `Some(result)` short-circuits the default handling.
    fn user_command_extension(
        &mut self,
        target: &mut dyn crate::Target,
        opcode: u32,
        param: u64,
    ) -> Option<i64> {
        let _ = (target, opcode, param);
        None
    }
}

impl<T: SemihostingHooks> SemihostingHooks for Option<T> {
    fn setup(&mut self, target: &mut dyn crate::Target, is_active: bool) -> Result<()> {
        match self {
            Some(inner) => inner.setup(target, is_active),
            None => Ok(()),
        }
    }

    fn post_result(&mut self, target: &mut dyn crate::Target, result: i64, sys_errno: i32) {
        if let Some(inner) = self {
            inner.post_result(target, result, sys_errno);
        }
    }

    fn user_command_extension(
        &mut self,
        target: &mut dyn crate::Target,
        opcode: u32,
        param: u64,
    ) -> Option<i64> {
        self.as_mut()?.user_command_extension(target, opcode, param)
    }
}
