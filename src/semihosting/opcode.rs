//! ARM semihosting 2.0 opcode constants.
//!
//! <https://github.com/ARM-software/abi-aa/blob/2024Q3/semihosting/semihosting.rst>

/// `SYS_OPEN`.
pub const SYS_OPEN: u32 = 0x01;
/// `SYS_CLOSE`.
pub const SYS_CLOSE: u32 = 0x02;
/// `SYS_WRITEC`.
pub const SYS_WRITEC: u32 = 0x03;
/// `SYS_WRITE0`.
pub const SYS_WRITE0: u32 = 0x04;
/// `SYS_WRITE`.
pub const SYS_WRITE: u32 = 0x05;
/// `SYS_READ`.
pub const SYS_READ: u32 = 0x06;
/// `SYS_READC`.
pub const SYS_READC: u32 = 0x07;
/// `SYS_ISERROR`.
pub const SYS_ISERROR: u32 = 0x08;
/// `SYS_ISTTY`.
pub const SYS_ISTTY: u32 = 0x09;
/// `SYS_SEEK`.
pub const SYS_SEEK: u32 = 0x0A;
/// `SYS_FLEN`.
pub const SYS_FLEN: u32 = 0x0C;
/// `SYS_REMOVE`.
pub const SYS_REMOVE: u32 = 0x0E;
/// `SYS_RENAME`.
pub const SYS_RENAME: u32 = 0x0F;
/// `SYS_CLOCK`.
pub const SYS_CLOCK: u32 = 0x10;
/// `SYS_TIME`.
pub const SYS_TIME: u32 = 0x11;
/// `SYS_SYSTEM`.
pub const SYS_SYSTEM: u32 = 0x12;
/// `SYS_ERRNO`.
pub const SYS_ERRNO: u32 = 0x13;
/// `SYS_GET_CMDLINE`.
pub const SYS_GET_CMDLINE: u32 = 0x15;
/// `SYS_HEAPINFO`.
pub const SYS_HEAPINFO: u32 = 0x16;
/// `SYS_EXIT` (`angel_SWIreason_ReportException`).
pub const SYS_EXIT: u32 = 0x18;
/// `SYS_EXIT_EXTENDED`.
pub const SYS_EXIT_EXTENDED: u32 = 0x20;
/// `SYS_ELAPSED`.
pub const SYS_ELAPSED: u32 = 0x30;
/// `SYS_TICKFREQ`.
pub const SYS_TICKFREQ: u32 = 0x31;
/// `SYS_TMPNAM`.
pub const SYS_TMPNAM: u32 = 0x0D;

/// First user-defined opcode currently implemented.
pub const SYS_USER_CMD_0X100: u32 = 0x100;
/// Last user-defined opcode currently implemented.
pub const SYS_USER_CMD_0X107: u32 = 0x107;

/// `ADP_Stopped_ApplicationExit`: the one `EXIT` reason that maps to a real
/// process exit status rather than a diagnostic-only stop.
pub const ADP_STOPPED_APPLICATION_EXIT: u32 = 0x20026;
/// `ADP_Stopped_RunTimeError`: only meaningful on 32-bit targets, where
/// `EXIT`'s reason code is the 32-bit semihosting reason directly rather
/// than a `(type, code)` pair.
pub const ADP_STOPPED_RUN_TIME_ERROR: u32 = 0x20023;

/// Upper bound on a `USER_CMD` parameter string, matching the source's
/// `SEMIHOSTING_MAX_TCL_COMMAND_FIELD_LENGTH`.
pub const USER_CMD_MAX_PARAM_LEN: usize = 1024;

/// Host open-mode flags selected by an ARM `SYS_OPEN` mode (`0..=11`), for
/// non-fileio, non-`:tt` opens. Index matches the ARM mode directly; the
/// string counterparts used by the fileio path are in [`mode_str`].
pub fn host_open_options(mode: u8) -> Option<std::fs::OpenOptions> {
    let mut options = std::fs::OpenOptions::new();
    match mode {
        0 | 1 => {
            options.read(true);
        }
        2 | 3 => {
            options.read(true).write(true);
        }
        4 | 5 => {
            options.write(true).create(true).truncate(true);
        }
        6 | 7 => {
            options.read(true).write(true).create(true).truncate(true);
        }
        8 | 9 => {
            options.write(true).create(true).append(true);
        }
        10 | 11 => {
            options.read(true).write(true).create(true).append(true);
        }
        _ => return None,
    }
    Some(options)
}

/// The ARM-spec mode string for a `SYS_OPEN` mode value. Purely descriptive
/// (log messages, diagnostics); the fileio transport's `param_3` is an
/// integer GDB-remote-protocol open-flags value, not this string — see
/// [`gdb_open_flags`].
pub fn mode_str(mode: u8) -> &'static str {
    match mode {
        0 => "r",
        1 => "rb",
        2 => "r+",
        3 => "r+b",
        4 => "w",
        5 => "wb",
        6 => "w+",
        7 => "w+b",
        8 => "a",
        9 => "ab",
        10 => "a+",
        11 => "a+b",
        _ => "unknown",
    }
}

/// `TARGET_O_*`: GDB-remote-protocol open-flag bits, as sent over the wire
/// to the frontend. Distinct from the host's own `O_*` values (`libc`'s
/// `O_CREAT`/`O_TRUNC`/... are not guaranteed to match these numerically).
const TARGET_O_RDONLY: i64 = 0x000;
const TARGET_O_WRONLY: i64 = 0x001;
const TARGET_O_RDWR: i64 = 0x002;
const TARGET_O_APPEND: i64 = 0x008;
const TARGET_O_CREAT: i64 = 0x200;
const TARGET_O_TRUNC: i64 = 0x400;

/// The `open_gdb_modeflags[12]` table: maps an ARM `SYS_OPEN` mode (`0..=11`)
/// to the integer GDB-remote-protocol open flags sent as `param_3` of a
/// fileio "open" request (spec Table 1, "Mode table maps 12 ARM modes to the
/// frontend's open flags"). `param_4` (creation permissions) is always
/// `0o644`, matching the source's unconditional `fileio_info->param_4 = 0644`.
pub fn gdb_open_flags(mode: u8) -> i64 {
    match mode {
        0 | 1 => TARGET_O_RDONLY,
        2 | 3 => TARGET_O_RDWR,
        4 | 5 => TARGET_O_WRONLY | TARGET_O_CREAT | TARGET_O_TRUNC,
        6 | 7 => TARGET_O_RDWR | TARGET_O_CREAT | TARGET_O_TRUNC,
        8 | 9 => TARGET_O_WRONLY | TARGET_O_CREAT | TARGET_O_APPEND,
        10 | 11 => TARGET_O_RDWR | TARGET_O_CREAT | TARGET_O_APPEND,
        _ => TARGET_O_RDONLY,
    }
}

/// Creation permissions sent as `param_4` of a fileio "open" request.
pub const GDB_OPEN_CREATE_MODE: i64 = 0o644;
