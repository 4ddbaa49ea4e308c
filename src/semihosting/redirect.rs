//! Redirecting console/stdio streams to an attached TCP client instead of
//! host stdio (spec §4.3).

#[cfg(feature = "net")]
use std::cell::RefCell;
#[cfg(feature = "net")]
use std::io::{Read, Write};
#[cfg(feature = "net")]
use std::net::{TcpListener, TcpStream};
#[cfg(feature = "net")]
use std::rc::Rc;

use super::opcode;

/// Governs which console/stdio operations divert to the attached TCP
/// redirect client (spec §3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectConfig {
    /// No redirection; all I/O goes to host stdio.
    #[default]
    None,
    /// Redirect `READ`/`WRITE` only.
    Stdio,
    /// Redirect `READC`/`WRITEC`/`WRITE0` only.
    Debug,
    /// Redirect everything in both groups.
    All,
}

/// Whether `fd`, given the current `op` and `redirect_cfg`, should be
/// served from the attached TCP client rather than host stdio.
///
/// `is_read_op` reports whether this is a read-direction operation (so the
/// caller knows to compare against `stdin_fd` rather than `stdout_fd`/`stderr_fd`).
pub fn is_redirected(
    cfg: RedirectConfig,
    op: u32,
    fd: i32,
    stdin_fd: i32,
    stdout_fd: i32,
    stderr_fd: i32,
) -> bool {
    if cfg == RedirectConfig::None {
        return false;
    }

    let (group_matches, is_read_op) = match op {
        opcode::SYS_READC => (cfg != RedirectConfig::Stdio, true),
        opcode::SYS_WRITEC | opcode::SYS_WRITE0 => (cfg != RedirectConfig::Stdio, false),
        opcode::SYS_READ => (cfg != RedirectConfig::Debug, true),
        opcode::SYS_WRITE => (cfg != RedirectConfig::Debug, false),
        _ => return false,
    };

    if !group_matches {
        return false;
    }

    if is_read_op {
        fd == stdin_fd
    } else {
        fd == stdout_fd || fd == stderr_fd
    }
}

/// A borrowed handle to the TCP client currently attached to a redirect
/// service.
///
/// Modeled as a weak reference per spec §9 ("Redirect connection ... model
/// as a weak reference checked for liveness on each use"): the service owns
/// the stream's lifetime, `SemihostingState` only ever holds a clone of
/// this handle and checks liveness by attempting the read/write.
#[cfg(feature = "net")]
#[derive(Clone)]
pub struct RedirectConnection {
    stream: Rc<RefCell<TcpStream>>,
}

#[cfg(feature = "net")]
impl RedirectConnection {
    /// Writes `buf` to the client. Mirrors `semihosting_redirect_write`.
    pub fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.borrow_mut().write(buf)
    }

    /// Reads into `buf` from the client. Mirrors `semihosting_redirect_read`;
    /// the caller is responsible for treating `Ok(0)` as EOF.
    pub fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.borrow_mut().read(buf)
    }
}

/// A single-client redirect listener: at most one active client per target,
/// matching spec §4.3 ("at most one active service per target").
#[cfg(feature = "net")]
pub struct RedirectService {
    listener: TcpListener,
    port: u16,
    client: Option<RedirectConnection>,
}

#[cfg(feature = "net")]
impl RedirectService {
    /// Binds a new redirect listener on `port`.
    pub fn bind(port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            port,
            client: None,
        })
    }

    /// The bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accepts a pending connection, if any, replacing any previous client.
    /// Call this from the host's event loop on each tick.
    pub fn accept_pending(&mut self) {
        if let Ok((stream, _)) = self.listener.accept() {
            let _ = stream.set_nodelay(true);
            self.client = Some(RedirectConnection {
                stream: Rc::new(RefCell::new(stream)),
            });
        }
    }

    /// The currently attached client connection, if any.
    pub fn connection(&self) -> Option<RedirectConnection> {
        self.client.clone()
    }

    /// Drops the current client, if any.
    pub fn disconnect(&mut self) {
        self.client = None;
    }
}

#[cfg(all(test, feature = "net"))]
mod tests {
    use super::*;

    #[test]
    fn redirect_symmetry_debug_group() {
        assert!(is_redirected(
            RedirectConfig::Debug,
            opcode::SYS_READC,
            5,
            5,
            1,
            2
        ));
        assert!(!is_redirected(
            RedirectConfig::Debug,
            opcode::SYS_READ,
            5,
            5,
            1,
            2
        ));
    }

    #[test]
    fn redirect_symmetry_stdio_group() {
        assert!(is_redirected(
            RedirectConfig::Stdio,
            opcode::SYS_WRITE,
            1,
            5,
            1,
            2
        ));
        assert!(!is_redirected(
            RedirectConfig::Stdio,
            opcode::SYS_WRITEC,
            1,
            5,
            1,
            2
        ));
    }

    #[test]
    fn redirect_all_covers_both_groups() {
        for op in [
            opcode::SYS_READC,
            opcode::SYS_WRITEC,
            opcode::SYS_WRITE0,
            opcode::SYS_READ,
            opcode::SYS_WRITE,
        ] {
            let fd = if op == opcode::SYS_READC || op == opcode::SYS_READ {
                5
            } else {
                1
            };
            assert!(is_redirected(RedirectConfig::All, op, fd, 5, 1, 2));
        }
    }

    #[test]
    fn none_never_redirects() {
        assert!(!is_redirected(
            RedirectConfig::None,
            opcode::SYS_WRITE,
            1,
            5,
            1,
            2
        ));
    }
}
