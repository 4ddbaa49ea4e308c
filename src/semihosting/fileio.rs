//! File-I/O mode: forwarding I/O-class semihosting operations to a debug
//! frontend instead of running them on the host (spec §4.2, "File-I/O
//! mode").

use super::opcode;

/// A pending file-I/O request, published to the frontend when
/// [`crate::semihosting::SemihostingState`] is in fileio mode and later
/// completed via [`FileioRequest::end`].
///
/// Field names mirror the ARM fileio identifiers ("open", "read", "write",
/// …) rather than the originating opcode, since that's what the wire
/// protocol to the frontend actually carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileioRequest {
    /// Canonical fileio identifier: one of "open", "read", "write",
    /// "close", "lseek", "unlink", "rename", "system", "isatty".
    pub identifier: &'static str,
    /// Up to four opcode-specific parameters, meaning depends on
    /// `identifier` (mirrors the source's `gdb_fileio_info` struct).
    pub params: [i64; 4],
    /// The opcode that produced this request, needed by [`FileioRequest::end`]
    /// to apply the right result-munging and failure classification.
    pub(crate) op: u32,
}

impl FileioRequest {
    pub(crate) fn new(op: u32, identifier: &'static str, params: [i64; 4]) -> Self {
        Self {
            identifier,
            params,
            op,
        }
    }

    /// Finalizes this request: applies per-opcode result munging and
    /// failure classification, matching the source's
    /// `semihosting_common_fileio_end` exactly.
    ///
    /// Returns the final `result` and, iff the request failed, the
    /// `sys_errno` to store; `semihosting_common_fileio_end` only ever
    /// assigns `semihosting->sys_errno` inside its `fileio_failed` branch, so
    /// a successful completion must leave whatever `sys_errno` was already
    /// cached (e.g. from a prior failed op) untouched rather than zeroing it.
    pub fn end(&self, result: i64, fileio_errno: i32, _ctrl_c: bool) -> (i64, Option<i32>) {
        let mut result = result;

        match self.op {
            opcode::SYS_WRITE | opcode::SYS_READ => {
                let requested_len = self.params[2];
                result = if result < 0 {
                    requested_len
                } else {
                    requested_len - result
                };
            }
            opcode::SYS_SEEK => {
                if result > 0 {
                    result = 0;
                }
            }
            _ => {}
        }

        let failed = if self.op == opcode::SYS_ISTTY {
            result == 0
        } else if self.op == opcode::SYS_RENAME {
            result != 0
        } else {
            result == -1
        };

        let sys_errno = failed.then_some(fileio_errno);
        (result, sys_errno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_munges_to_bytes_not_transferred() {
        let req = FileioRequest::new(opcode::SYS_WRITE, "write", [0, 0, 5, 0]);
        let (result, errno) = req.end(5, 0, false);
        assert_eq!(result, 0);
        assert_eq!(errno, None);
    }

    #[test]
    fn write_failure_reports_requested_length() {
        let req = FileioRequest::new(opcode::SYS_WRITE, "write", [0, 0, 5, 0]);
        let (result, errno) = req.end(-1, libc_like_eio(), false);
        assert_eq!(result, 5);
        assert_eq!(errno, Some(libc_like_eio()));
    }

    #[test]
    fn seek_positive_result_becomes_zero() {
        let req = FileioRequest::new(opcode::SYS_SEEK, "lseek", [0, 100, 0, 0]);
        let (result, _) = req.end(100, 0, false);
        assert_eq!(result, 0);
    }

    #[test]
    fn istty_zero_is_failure() {
        let req = FileioRequest::new(opcode::SYS_ISTTY, "isatty", [0; 4]);
        let (result, errno) = req.end(0, 9, false);
        assert_eq!(result, 0);
        assert_eq!(errno, Some(9));
    }

    #[test]
    fn rename_nonzero_is_failure() {
        let req = FileioRequest::new(opcode::SYS_RENAME, "rename", [0; 4]);
        let (result, errno) = req.end(1, 9, false);
        assert_eq!(result, 1);
        assert_eq!(errno, Some(9));
    }

    #[test]
    fn default_failure_is_minus_one() {
        let req = FileioRequest::new(opcode::SYS_CLOSE, "close", [0; 4]);
        let (result, errno) = req.end(-1, 9, false);
        assert_eq!(result, -1);
        assert_eq!(errno, Some(9));

        let (result, errno) = req.end(0, 9, false);
        assert_eq!(result, 0);
        assert_eq!(errno, None, "success must not clobber cached sys_errno");
    }

    fn libc_like_eio() -> i32 {
        5
    }
}
