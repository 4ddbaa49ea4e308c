//! ARM semihosting operation dispatch (spec §4.2).

pub mod fileio;
pub mod opcode;
pub mod redirect;

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::collab::{FileioTransport, SemihostingHooks};
use crate::error::{Error, Result};
use crate::mem_codec::{read_fields, write_fields};
use crate::target::{Target, TargetEvent};
use fileio::FileioRequest;
use redirect::RedirectConfig;

const ENOTSUP: i32 = 95;
const EINVAL: i32 = 22;
const ENOMEM: i32 = 12;

/// Per-target semihosting dispatcher state (spec §3).
pub struct SemihostingState {
    /// Whether the feature is enabled for this target at all.
    pub is_active: bool,
    /// When true, I/O-class ops are forwarded to the debug frontend rather
    /// than executed on the host.
    pub is_fileio: bool,
    /// When true, `EXIT` does not terminate the process even without a
    /// connected frontend.
    pub has_resumable_exit: bool,
    /// Whether a remote debug frontend (e.g. GDB) currently holds a
    /// connection to this target; governs `EXIT`'s process-exit-or-diagnostic
    /// choice. Not itself part of the dispatch protocol, but required to
    /// reproduce that choice; set by the host as frontends attach/detach.
    pub frontend_connected: bool,
    /// Governs which console/stdio ops divert to a TCP client.
    pub redirect_cfg: RedirectConfig,
    /// Host fd opened when firmware opens `:tt` in read mode; -1 until opened.
    pub stdin_fd: i32,
    /// Host fd opened when firmware opens `:tt` in write mode; -1 until opened.
    pub stdout_fd: i32,
    /// Host fd opened when firmware opens `:tt` in append mode; -1 until opened.
    pub stderr_fd: i32,
    /// Current request opcode, set by the trap entry point before dispatch.
    pub op: u32,
    /// Current request parameter register value.
    pub param: u64,
    /// Output value; initialized to -1 on each dispatch.
    pub result: i64,
    /// Output errno-equivalent.
    pub sys_errno: i32,
    /// Whether the target may resume after this dispatch.
    pub is_resumable: bool,
    /// Whether this dispatch is pending completion via a fileio request.
    pub hit_fileio: bool,
    /// Target word size in bytes; 4 or 8.
    pub word_size_bytes: u8,
    /// Reference clock for `CLOCK`.
    pub setup_time: Instant,
    /// Firmware command line, returned by `GET_CMDLINE`.
    pub cmdline: String,
    /// Prefix applied to `OPEN`/`REMOVE`/`RENAME`/`SYSTEM` paths.
    pub basedir: String,

    #[cfg(feature = "net")]
    redirect_service: Option<redirect::RedirectService>,

    pending_fileio: Option<FileioRequest>,
}

impl Default for SemihostingState {
    fn default() -> Self {
        Self {
            is_active: false,
            is_fileio: false,
            has_resumable_exit: false,
            frontend_connected: false,
            redirect_cfg: RedirectConfig::None,
            stdin_fd: -1,
            stdout_fd: -1,
            stderr_fd: -1,
            op: 0,
            param: 0,
            result: -1,
            sys_errno: 0,
            is_resumable: true,
            hit_fileio: false,
            word_size_bytes: 4,
            setup_time: Instant::now(),
            cmdline: String::new(),
            basedir: String::new(),
            #[cfg(feature = "net")]
            redirect_service: None,
            pending_fileio: None,
        }
    }
}

impl SemihostingState {
    /// Creates fresh state for a target with the given word size.
    pub fn new(word_size_bytes: u8) -> Self {
        Self {
            word_size_bytes,
            ..Default::default()
        }
    }

    /// Toggles `is_active`, the Rust-method equivalent of the
    /// `semihosting {enable|disable}` command. Calls `hooks.setup` first,
    /// matching the source's `semihosting_common_handle_enable_command`
    /// (arm/disarm the target-type trap handling before flipping the flag);
    /// on hook failure, `is_active` is left unchanged.
    pub fn set_active(
        &mut self,
        target: &mut dyn Target,
        hooks: &mut impl SemihostingHooks,
        is_active: bool,
    ) -> Result<()> {
        hooks.setup(target, is_active)?;
        self.is_active = is_active;
        Ok(())
    }

    /// Toggles `is_fileio`, the Rust-method equivalent of the
    /// `semihosting_fileio {enable|disable}` command.
    pub fn set_fileio(&mut self, is_fileio: bool) {
        self.is_fileio = is_fileio;
    }

    /// Sets the firmware command line returned by `GET_CMDLINE`, the
    /// Rust-method equivalent of `semihosting_cmdline <args...>`.
    pub fn set_cmdline(&mut self, cmdline: impl Into<String>) {
        self.cmdline = cmdline.into();
    }

    /// Sets the path prefix applied to `OPEN`/`REMOVE`/`RENAME`/`SYSTEM`
    /// names, the Rust-method equivalent of `semihosting_basedir [dir]`.
    pub fn set_basedir(&mut self, basedir: impl Into<String>) {
        self.basedir = basedir.into();
    }

    /// Switches the redirect configuration, closing any previously bound
    /// TCP service first (spec §4.3: "changing the config closes the old
    /// service before creating the new").
    #[cfg(feature = "net")]
    pub fn set_redirect(&mut self, cfg: RedirectConfig, port: Option<u16>) -> std::io::Result<()> {
        self.redirect_service = None;
        self.redirect_cfg = cfg;
        if cfg != RedirectConfig::None {
            if let Some(port) = port {
                self.redirect_service = Some(redirect::RedirectService::bind(port)?);
            }
        }
        Ok(())
    }

    /// Accepts a pending redirect client connection, if the service has one
    /// waiting. Call from the host's event loop on each tick.
    #[cfg(feature = "net")]
    pub fn poll_redirect_service(&mut self) {
        if let Some(service) = self.redirect_service.as_mut() {
            service.accept_pending();
        }
    }

    #[cfg(feature = "net")]
    fn tcp_connection(&self) -> Option<redirect::RedirectConnection> {
        self.redirect_service.as_ref().and_then(|s| s.connection())
    }

    /// Returns the pending fileio request, if `hit_fileio` is set, without
    /// consuming it. Equivalent of the source's `get_fileio_info`.
    pub fn fileio_info(&self) -> Option<&FileioRequest> {
        self.pending_fileio.as_ref()
    }

    /// Completes a pending fileio request (spec §4.2, "File-I/O mode").
    pub fn fileio_end(
        &mut self,
        target: &mut dyn Target,
        hooks: &mut impl SemihostingHooks,
        result: i64,
        fileio_errno: i32,
        ctrl_c: bool,
    ) {
        let Some(request) = self.pending_fileio.take() else {
            return;
        };
        self.hit_fileio = false;
        let (result, sys_errno) = request.end(result, fileio_errno, ctrl_c);
        self.result = result;
        if let Some(sys_errno) = sys_errno {
            self.sys_errno = sys_errno;
        }
        hooks.post_result(target, self.result, self.sys_errno);
    }

    /// Dispatches the operation currently loaded into `op`/`param` (spec
    /// §4.2). `target` provides memory access; `hooks` and `fileio` are the
    /// setup/post_result/user-command and remote file-I/O collaborators.
    ///
    /// Returns `Err` only for a transport failure against `target` itself;
    /// every other failure is written into `result`/`sys_errno` per the ARM
    /// semihosting contract and this returns `Ok(())`.
    pub fn dispatch(
        &mut self,
        target: &mut dyn Target,
        hooks: &mut impl SemihostingHooks,
        fileio: &mut impl FileioTransport,
    ) -> Result<()> {
        self.result = -1;
        self.is_resumable = true;
        self.hit_fileio = false;

        self.handle(target, hooks, fileio)?;

        if !self.hit_fileio {
            hooks.post_result(target, self.result, self.sys_errno);
        }
        Ok(())
    }

    fn handle(
        &mut self,
        target: &mut dyn Target,
        hooks: &mut impl SemihostingHooks,
        fileio: &mut impl FileioTransport,
    ) -> Result<()> {
        use opcode::*;

        match self.op {
            SYS_CLOCK => {
                let centis = self.setup_time.elapsed().as_millis() / 10;
                self.result = centis as i64;
            }

            SYS_CLOSE => {
                let fields = read_fields(target, self.param, 1).map_err(Error::Target)?;
                let fd = fields[0] as i32;
                if matches!(fd, 0 | 1 | 2) {
                    self.result = 0;
                } else if self.is_fileio {
                    self.hit_fileio = true;
                    self.pending_fileio = Some(FileioRequest::new(SYS_CLOSE, "close", [fd as i64, 0, 0, 0]));
                    fileio.publish(self.pending_fileio.clone().unwrap());
                } else {
                    self.result = host_close(fd);
                    if self.result == -1 {
                        self.sys_errno = last_errno();
                    }
                }
            }

            SYS_ERRNO => {
                self.result = self.sys_errno as i64;
            }

            SYS_EXIT => self.handle_exit(target, false)?,
            SYS_EXIT_EXTENDED => self.handle_exit(target, true)?,

            SYS_FLEN => {
                let fields = read_fields(target, self.param, 1).map_err(Error::Target)?;
                let fd = fields[0] as i32;
                if self.is_fileio {
                    self.result = -1;
                    self.sys_errno = EINVAL;
                } else {
                    match host_file_len(fd) {
                        Some(len) => self.result = len,
                        None => {
                            self.result = -1;
                            self.sys_errno = last_errno();
                        }
                    }
                }
            }

            SYS_GET_CMDLINE => {
                let bytes = {
                    let mut b = self.cmdline.clone().into_bytes();
                    b.push(0);
                    b
                };
                // field 0: buffer address, field 1: buffer length (in/out)
                let fields = read_fields(target, self.param, 2).map_err(Error::Target)?;
                let buf_addr = fields[0];
                let buf_len = fields[1] as usize;
                if bytes.len() > buf_len {
                    self.result = -1;
                } else {
                    write_buffer(target, buf_addr, &bytes).map_err(Error::Target)?;
                    write_fields(target, self.param, &[buf_addr, (bytes.len() - 1) as u64])
                        .map_err(Error::Target)?;
                    self.result = 0;
                }
            }

            SYS_HEAPINFO => {
                // Intentional "unknown": four zero-valued words (heap/stack
                // base/limit). See SPEC_FULL.md open-question resolution.
                let fields = read_fields(target, self.param, 1).map_err(Error::Target)?;
                let block_addr = fields[0];
                write_fields(target, block_addr, &[0, 0, 0, 0]).map_err(Error::Target)?;
                self.result = 0;
            }

            SYS_ISERROR => {
                let fields = read_fields(target, self.param, 1).map_err(Error::Target)?;
                self.result = (fields[0] != 0) as i64;
            }

            SYS_ISTTY => {
                let fields = read_fields(target, self.param, 1).map_err(Error::Target)?;
                let fd = fields[0] as i32;
                if self.is_fileio {
                    self.hit_fileio = true;
                    self.pending_fileio =
                        Some(FileioRequest::new(SYS_ISTTY, "isatty", [self.param as i64, 0, 0, 0]));
                    fileio.publish(self.pending_fileio.clone().unwrap());
                } else {
                    self.result = host_isatty(fd) as i64;
                    if self.result == 0 {
                        self.sys_errno = last_errno();
                    }
                }
            }

            SYS_OPEN => self.handle_open(target, fileio)?,

            SYS_READ => self.handle_read(target, fileio)?,

            SYS_READC => {
                if self.is_fileio {
                    return Err(Error::Hook(
                        "SYS_READC not supported by semihosting fileio".into(),
                    ));
                }
                self.result = self.getchar(self.stdin_fd);
            }

            SYS_REMOVE => {
                let fields = read_fields(target, self.param, 2).map_err(Error::Target)?;
                let (addr, len) = (fields[0], fields[1] as usize);
                if self.is_fileio {
                    self.hit_fileio = true;
                    self.pending_fileio = Some(FileioRequest::new(
                        SYS_REMOVE,
                        "unlink",
                        [addr as i64, len as i64, 0, 0],
                    ));
                    fileio.publish(self.pending_fileio.clone().unwrap());
                } else {
                    let path = self.resolve_path(target, addr, len, true)?;
                    self.result = if std::fs::remove_file(&path).is_ok() {
                        0
                    } else {
                        self.sys_errno = last_errno();
                        -1
                    };
                }
            }

            SYS_RENAME => {
                let fields = read_fields(target, self.param, 4).map_err(Error::Target)?;
                let (addr1, len1) = (fields[0], fields[1] as usize);
                let (addr2, len2) = (fields[2], fields[3] as usize);
                if self.is_fileio {
                    self.hit_fileio = true;
                    self.pending_fileio = Some(FileioRequest::new(
                        SYS_RENAME,
                        "rename",
                        [addr1 as i64, len1 as i64, addr2 as i64, len2 as i64],
                    ));
                    fileio.publish(self.pending_fileio.clone().unwrap());
                } else {
                    let from = self.resolve_path(target, addr1, len1, true)?;
                    let to = self.resolve_path(target, addr2, len2, true)?;
                    match std::fs::rename(&from, &to) {
                        Ok(()) => self.result = 0,
                        Err(_) => {
                            self.sys_errno = last_errno();
                            self.result = 1;
                        }
                    }
                }
            }

            SYS_SEEK => {
                let fields = read_fields(target, self.param, 2).map_err(Error::Target)?;
                let (fd, pos) = (fields[0] as i32, fields[1]);
                if self.is_fileio {
                    self.hit_fileio = true;
                    self.pending_fileio = Some(FileioRequest::new(
                        SYS_SEEK,
                        "lseek",
                        [fd as i64, pos as i64, 0 /* SEEK_SET */, 0],
                    ));
                    fileio.publish(self.pending_fileio.clone().unwrap());
                } else {
                    match host_seek(fd, pos) {
                        Some(_) => self.result = 0,
                        None => {
                            self.sys_errno = last_errno();
                            self.result = -1;
                        }
                    }
                }
            }

            SYS_SYSTEM => {
                let fields = read_fields(target, self.param, 2).map_err(Error::Target)?;
                let (addr, len) = (fields[0], fields[1] as usize);
                if self.is_fileio {
                    self.hit_fileio = true;
                    self.pending_fileio = Some(FileioRequest::new(
                        SYS_SYSTEM,
                        "system",
                        [addr as i64, len as i64, 0, 0],
                    ));
                    fileio.publish(self.pending_fileio.clone().unwrap());
                } else {
                    let mut buf = vec![0u8; len];
                    target.read_memory(addr, &mut buf).map_err(Error::Target)?;
                    let cmd = String::from_utf8_lossy(&buf).into_owned();
                    self.result = host_system(&cmd);
                }
            }

            SYS_TIME => {
                self.result = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
            }

            SYS_WRITE => self.handle_write(target, fileio)?,

            SYS_WRITEC => {
                let byte = target.read_u32(self.param).map_err(Error::Target)? as u8;
                self.putchar(byte);
            }

            SYS_WRITE0 => {
                let s = read_c_string(target, self.param)?;
                for &b in s.as_bytes() {
                    self.putchar(b);
                }
            }

            op if (opcode::SYS_USER_CMD_0X100..=opcode::SYS_USER_CMD_0X107).contains(&op) => {
                if let Some(result) = hooks.user_command_extension(target, op, self.param) {
                    self.result = result;
                } else {
                    let fields = read_fields(target, self.param, 2).map_err(Error::Target)?;
                    let (addr, len) = (fields[0], fields[1] as usize);
                    if len > opcode::USER_CMD_MAX_PARAM_LEN {
                        return Err(Error::Hook(format!(
                            "user command parameter too long: {len}"
                        )));
                    }
                    let mut payload = vec![0u8; len];
                    target.read_memory(addr, &mut payload).map_err(Error::Target)?;
                    target.publish_event(TargetEvent::UserCommand { opcode: op, payload });
                    self.result = 0;
                }
            }

            _ => {
                self.result = -1;
                self.sys_errno = ENOTSUP;
            }
        }

        Ok(())
    }

    fn handle_exit(&mut self, target: &mut dyn Target, extended: bool) -> Result<()> {
        let has_block = extended || self.word_size_bytes == 8;
        let (reason, code) = if has_block {
            let fields = read_fields(target, self.param, 2).map_err(Error::Target)?;
            (fields[0] as u32, fields[1] as i32)
        } else {
            (self.param as u32, 0)
        };

        if reason == opcode::ADP_STOPPED_APPLICATION_EXIT {
            let code = if has_block { code } else { 0 };
            if !self.frontend_connected {
                std::process::exit(code);
            }
            eprintln!("semihosting: *** application exited with {code} ***");
        } else if !has_block && reason == opcode::ADP_STOPPED_RUN_TIME_ERROR {
            if !self.frontend_connected {
                std::process::exit(1);
            }
            eprintln!("semihosting: *** application exited with error ***");
        } else if !has_block {
            if !self.frontend_connected {
                std::process::exit(1);
            }
            eprintln!("semihosting: application exception {reason:#x}");
        } else {
            eprintln!("semihosting: application exception {reason:#x}");
        }

        if !self.has_resumable_exit {
            self.is_resumable = false;
            target.publish_event(TargetEvent::Halt);
        }
        Ok(())
    }

    fn handle_open(&mut self, target: &mut dyn Target, fileio: &mut impl FileioTransport) -> Result<()> {
        let fields = read_fields(target, self.param, 3).map_err(Error::Target)?;
        let (addr, mode, len) = (fields[0], fields[1] as u8, fields[2] as usize);

        if mode > 11 {
            self.result = -1;
            self.sys_errno = EINVAL;
            return Ok(());
        }

        let mut buf = vec![0u8; len];
        target.read_memory(addr, &mut buf).map_err(Error::Target)?;
        let mut name = String::from_utf8_lossy(&buf).into_owned();
        if name != ":tt" && name != ":semihosting-features" {
            name = self.apply_basedir(&name);
        }

        if self.is_fileio {
            if name == ":semihosting-features" {
                self.result = -1;
                self.sys_errno = EINVAL;
            } else if name == ":tt" {
                self.result = match mode {
                    0 => 0,
                    4 => 1,
                    8 => 2,
                    _ => {
                        self.sys_errno = EINVAL;
                        -1
                    }
                };
            } else {
                self.hit_fileio = true;
                self.pending_fileio = Some(FileioRequest::new(
                    opcode::SYS_OPEN,
                    "open",
                    [
                        addr as i64,
                        len as i64,
                        opcode::gdb_open_flags(mode),
                        opcode::GDB_OPEN_CREATE_MODE,
                    ],
                ));
                fileio.publish(self.pending_fileio.clone().unwrap());
            }
        } else if name == ":tt" {
            let fd = host_dup_std_stream(mode);
            match mode {
                0..=3 => self.stdin_fd = fd,
                4..=7 => self.stdout_fd = fd,
                _ => self.stderr_fd = fd,
            }
            self.result = fd as i64;
            if fd == -1 {
                self.sys_errno = last_errno();
            }
        } else {
            match opcode::host_open_options(mode).and_then(|o| o.open(&name).ok()) {
                Some(file) => {
                    self.result = host_leak_fd(file) as i64;
                }
                None => {
                    self.result = -1;
                    self.sys_errno = last_errno();
                }
            }
        }
        Ok(())
    }

    fn handle_read(&mut self, target: &mut dyn Target, fileio: &mut impl FileioTransport) -> Result<()> {
        let fields = read_fields(target, self.param, 3).map_err(Error::Target)?;
        let (fd, addr, len) = (fields[0] as i32, fields[1], fields[2] as usize);

        if self.is_fileio {
            self.hit_fileio = true;
            self.pending_fileio = Some(FileioRequest::new(
                opcode::SYS_READ,
                "read",
                [fd as i64, addr as i64, len as i64, 0],
            ));
            fileio.publish(self.pending_fileio.clone().unwrap());
            return Ok(());
        }

        let mut buf = vec![0u8; len];
        let n = self.read_raw(fd, &mut buf);
        if n < 0 {
            self.result = len as i64;
        } else {
            let n = n as usize;
            target.write_memory(addr, &buf[..n]).map_err(Error::Target)?;
            self.result = (len - n) as i64;
        }
        Ok(())
    }

    fn handle_write(&mut self, target: &mut dyn Target, fileio: &mut impl FileioTransport) -> Result<()> {
        let fields = read_fields(target, self.param, 3).map_err(Error::Target)?;
        let (fd, addr, len) = (fields[0] as i32, fields[1], fields[2] as usize);

        if self.is_fileio {
            self.hit_fileio = true;
            self.pending_fileio = Some(FileioRequest::new(
                opcode::SYS_WRITE,
                "write",
                [fd as i64, addr as i64, len as i64, 0],
            ));
            fileio.publish(self.pending_fileio.clone().unwrap());
            return Ok(());
        }

        let mut buf = vec![0u8; len];
        target.read_memory(addr, &mut buf).map_err(Error::Target)?;
        let n = self.write_raw(fd, &buf);
        if n < 0 {
            self.result = -1;
        } else {
            self.result = (len - n as usize) as i64;
        }
        Ok(())
    }

    fn apply_basedir(&self, name: &str) -> String {
        if self.basedir.is_empty() || std::path::Path::new(name).is_absolute() {
            return name.to_string();
        }
        if self.basedir.ends_with('/') {
            format!("{}{}", self.basedir, name)
        } else {
            format!("{}/{}", self.basedir, name)
        }
    }

    fn resolve_path(
        &self,
        target: &mut dyn Target,
        addr: u64,
        len: usize,
        prefix: bool,
    ) -> Result<String> {
        let mut buf = vec![0u8; len];
        target.read_memory(addr, &mut buf).map_err(Error::Target)?;
        let name = String::from_utf8_lossy(&buf).into_owned();
        Ok(if prefix { self.apply_basedir(&name) } else { name })
    }

    fn is_redirected(&self, op: u32, fd: i32) -> bool {
        redirect::is_redirected(
            self.redirect_cfg,
            op,
            fd,
            self.stdin_fd,
            self.stdout_fd,
            self.stderr_fd,
        )
    }

    fn putchar(&mut self, byte: u8) {
        #[cfg(feature = "net")]
        if self.is_redirected(self.op, self.stdout_fd) {
            if let Some(conn) = self.tcp_connection() {
                let _ = conn.write(&[byte]);
                return;
            }
            self.sys_errno = 9; // EBADF
            return;
        }
        host_putchar(byte);
    }

    fn getchar(&mut self, fd: i32) -> i64 {
        #[cfg(feature = "net")]
        if self.is_redirected(self.op, fd) {
            return match self.tcp_connection() {
                Some(conn) => {
                    let mut byte = [0u8; 1];
                    match conn.read(&mut byte) {
                        Ok(n) if n > 0 => byte[0] as i64,
                        _ => -1,
                    }
                }
                None => {
                    self.sys_errno = 9; // EBADF
                    -1
                }
            };
        }
        host_getchar()
    }

    fn read_raw(&mut self, fd: i32, buf: &mut [u8]) -> i64 {
        #[cfg(feature = "net")]
        if self.is_redirected(self.op, fd) {
            return match self.tcp_connection() {
                Some(conn) => conn.read(buf).map(|n| n as i64).unwrap_or(-1),
                None => {
                    self.sys_errno = 9; // EBADF
                    -1
                }
            };
        }
        host_read(fd, buf, &mut self.sys_errno)
    }

    fn write_raw(&mut self, fd: i32, buf: &[u8]) -> i64 {
        #[cfg(feature = "net")]
        if self.is_redirected(self.op, fd) {
            return match self.tcp_connection() {
                Some(conn) => conn.write(buf).map(|n| n as i64).unwrap_or(-1),
                None => {
                    self.sys_errno = 9; // EBADF
                    -1
                }
            };
        }
        host_write(fd, buf, &mut self.sys_errno)
    }
}

fn read_c_string(target: &mut dyn Target, addr: u64) -> Result<String> {
    let mut bytes = Vec::new();
    let mut buf = [0u8; 128];
    let mut from = addr;
    loop {
        target.read_memory(from, &mut buf).map_err(Error::Target)?;
        if let Some(end) = buf.iter().position(|&b| b == 0) {
            bytes.extend_from_slice(&buf[..end]);
            break;
        }
        bytes.extend_from_slice(&buf);
        from += buf.len() as u64;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_buffer(target: &mut dyn Target, addr: u64, buf: &[u8]) -> std::result::Result<(), crate::error::TargetError> {
    target.write_memory(addr, buf)
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(ENOMEM)
}

#[cfg(unix)]
fn host_close(fd: i32) -> i64 {
    use std::os::unix::io::FromRawFd;
    unsafe { drop(std::fs::File::from_raw_fd(fd)) };
    0
}

#[cfg(not(unix))]
fn host_close(_fd: i32) -> i64 {
    -1
}

#[cfg(unix)]
fn host_file_len(fd: i32) -> Option<i64> {
    use std::os::unix::io::FromRawFd;
    let file = unsafe { std::fs::File::from_raw_fd(fd) };
    let meta = file.metadata().ok();
    std::mem::forget(file);
    meta.map(|m| m.len() as i64)
}

#[cfg(not(unix))]
fn host_file_len(_fd: i32) -> Option<i64> {
    None
}

#[cfg(unix)]
fn host_isatty(fd: i32) -> bool {
    unsafe { libc_isatty(fd) != 0 }
}

#[cfg(not(unix))]
fn host_isatty(_fd: i32) -> bool {
    false
}

#[cfg(unix)]
extern "C" {
    #[link_name = "isatty"]
    fn libc_isatty(fd: i32) -> i32;
}

#[cfg(unix)]
fn host_dup_std_stream(mode: u8) -> i32 {
    use std::os::unix::io::AsRawFd;
    let src: i32 = match mode {
        0..=3 => std::io::stdin().as_raw_fd(),
        4..=7 => std::io::stdout().as_raw_fd(),
        _ => std::io::stderr().as_raw_fd(),
    };
    unsafe { libc_dup(src) }
}

#[cfg(not(unix))]
fn host_dup_std_stream(_mode: u8) -> i32 {
    -1
}

#[cfg(unix)]
extern "C" {
    #[link_name = "dup"]
    fn libc_dup(fd: i32) -> i32;
}

#[cfg(unix)]
fn host_leak_fd(file: std::fs::File) -> i32 {
    use std::os::unix::io::IntoRawFd;
    file.into_raw_fd()
}

#[cfg(not(unix))]
fn host_leak_fd(_file: std::fs::File) -> i32 {
    -1
}

#[cfg(unix)]
fn host_seek(fd: i32, pos: u64) -> Option<u64> {
    use std::io::{Seek, SeekFrom};
    use std::os::unix::io::FromRawFd;
    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    let result = file.seek(SeekFrom::Start(pos)).ok();
    std::mem::forget(file);
    result
}

#[cfg(not(unix))]
fn host_seek(_fd: i32, _pos: u64) -> Option<u64> {
    None
}

fn host_system(cmd: &str) -> i64 {
    #[cfg(unix)]
    {
        std::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .status()
            .map(|s| s.code().unwrap_or(-1) as i64)
            .unwrap_or(-1)
    }
    #[cfg(not(unix))]
    {
        let _ = cmd;
        -1
    }
}

fn host_putchar(byte: u8) {
    use std::io::Write;
    let _ = std::io::stdout().write_all(&[byte]);
}

fn host_getchar() -> i64 {
    use std::io::Read;
    let mut buf = [0u8; 1];
    match std::io::stdin().read(&mut buf) {
        Ok(1) => buf[0] as i64,
        _ => -1,
    }
}

#[cfg(unix)]
fn host_read(fd: i32, buf: &mut [u8], sys_errno: &mut i32) -> i64 {
    use std::io::Read;
    use std::os::unix::io::FromRawFd;
    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    let result = file.read(buf);
    std::mem::forget(file);
    match result {
        Ok(n) => n as i64,
        Err(e) => {
            *sys_errno = e.raw_os_error().unwrap_or(ENOMEM);
            -1
        }
    }
}

#[cfg(not(unix))]
fn host_read(_fd: i32, _buf: &mut [u8], _sys_errno: &mut i32) -> i64 {
    -1
}

#[cfg(unix)]
fn host_write(fd: i32, buf: &[u8], sys_errno: &mut i32) -> i64 {
    use std::io::Write;
    use std::os::unix::io::FromRawFd;
    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    let result = file.write(buf);
    std::mem::forget(file);
    match result {
        Ok(n) => n as i64,
        Err(e) => {
            *sys_errno = e.raw_os_error().unwrap_or(ENOMEM);
            -1
        }
    }
}

#[cfg(not(unix))]
fn host_write(_fd: i32, _buf: &[u8], _sys_errno: &mut i32) -> i64 {
    -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Endian;

    struct FakeTarget {
        mem: Vec<u8>,
        events: Vec<TargetEvent>,
    }

    impl FakeTarget {
        fn new() -> Self {
            Self {
                mem: vec![0; 0x1_0000],
                events: Vec::new(),
            }
        }
    }

    impl Target for FakeTarget {
        fn word_size_bytes(&self) -> u8 {
            4
        }
        fn endian(&self) -> Endian {
            Endian::Little
        }
        fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> std::result::Result<(), crate::error::TargetError> {
            let addr = addr as usize;
            buf.copy_from_slice(&self.mem[addr..addr + buf.len()]);
            Ok(())
        }
        fn write_memory(&mut self, addr: u64, buf: &[u8]) -> std::result::Result<(), crate::error::TargetError> {
            let addr = addr as usize;
            self.mem[addr..addr + buf.len()].copy_from_slice(buf);
            Ok(())
        }
        fn publish_event(&mut self, event: TargetEvent) {
            self.events.push(event);
        }
    }

    #[derive(Default)]
    struct NoHooks;
    impl SemihostingHooks for NoHooks {}

    struct FailingSetup;
    impl SemihostingHooks for FailingSetup {
        fn setup(&mut self, _target: &mut dyn Target, _is_active: bool) -> Result<()> {
            Err(Error::Hook("setup rejected".into()))
        }
    }

    #[derive(Default)]
    struct NoFileio;
    impl FileioTransport for NoFileio {
        fn publish(&mut self, _request: FileioRequest) {}
    }

    fn write_u32(t: &mut FakeTarget, addr: u64, v: u32) {
        t.mem[addr as usize..addr as usize + 4].copy_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn protected_stdio_close_does_not_touch_errno() {
        let mut target = FakeTarget::new();
        let mut state = SemihostingState::new(4);
        state.sys_errno = 0xdead as i32;

        write_u32(&mut target, 0x1000, 1); // fd = stdout
        state.op = opcode::SYS_CLOSE;
        state.param = 0x1000;

        state
            .dispatch(&mut target, &mut NoHooks, &mut NoFileio)
            .unwrap();

        assert_eq!(state.result, 0);
        assert_eq!(state.sys_errno, 0xdead as i32);
    }

    #[test]
    fn result_initial_state_is_minus_one_before_handler_runs() {
        // Use an opcode whose handler doesn't touch `result` at all
        // (unknown opcode path explicitly writes -1, so check via ISERROR
        // with field != 0 which writes 1, confirming -1 was the starting
        // point by checking a deliberately-unhandled op instead).
        let mut target = FakeTarget::new();
        let mut state = SemihostingState::new(4);
        state.result = 42; // stale from a previous call
        state.op = 0x999; // unknown
        state.param = 0;

        state
            .dispatch(&mut target, &mut NoHooks, &mut NoFileio)
            .unwrap();

        assert_eq!(state.result, -1);
        assert_eq!(state.sys_errno, ENOTSUP);
    }

    #[test]
    fn heapinfo_writes_zeroes() {
        let mut target = FakeTarget::new();
        let mut state = SemihostingState::new(4);
        write_u32(&mut target, 0x2000, 0x3000); // block addr
        state.op = opcode::SYS_HEAPINFO;
        state.param = 0x2000;

        state
            .dispatch(&mut target, &mut NoHooks, &mut NoFileio)
            .unwrap();

        assert_eq!(state.result, 0);
        for i in 0..4u64 {
            let addr = 0x3000 + i * 4;
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&target.mem[addr as usize..addr as usize + 4]);
            assert_eq!(u32::from_le_bytes(buf), 0);
        }
    }

    #[test]
    fn time_returns_unix_seconds_roughly_now() {
        let mut target = FakeTarget::new();
        let mut state = SemihostingState::new(4);
        state.op = opcode::SYS_TIME;

        state
            .dispatch(&mut target, &mut NoHooks, &mut NoFileio)
            .unwrap();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        assert!((state.result - now).abs() < 5);
    }

    #[test]
    fn unknown_opcode_reports_enotsup() {
        let mut target = FakeTarget::new();
        let mut state = SemihostingState::new(4);
        state.op = 0xABCD;

        state
            .dispatch(&mut target, &mut NoHooks, &mut NoFileio)
            .unwrap();

        assert_eq!(state.result, -1);
        assert_eq!(state.sys_errno, ENOTSUP);
    }

    #[test]
    fn set_active_calls_setup_hook_before_flipping_flag() {
        let mut target = FakeTarget::new();
        let mut state = SemihostingState::new(4);
        assert!(!state.is_active);

        state.set_active(&mut target, &mut NoHooks, true).unwrap();
        assert!(state.is_active);
    }

    #[test]
    fn set_active_leaves_flag_unchanged_on_hook_failure() {
        let mut target = FakeTarget::new();
        let mut state = SemihostingState::new(4);

        let err = state
            .set_active(&mut target, &mut FailingSetup, true)
            .unwrap_err();
        assert!(matches!(err, Error::Hook(_)));
        assert!(!state.is_active);
    }

    #[test]
    fn user_cmd_publishes_event_with_payload() {
        let mut target = FakeTarget::new();
        let mut state = SemihostingState::new(4);

        let payload = b"hello\0";
        target.mem[0x4000..0x4000 + payload.len()].copy_from_slice(payload);
        write_u32(&mut target, 0x3000, 0x4000); // addr
        write_u32(&mut target, 0x3004, payload.len() as u32); // len

        state.op = opcode::SYS_USER_CMD_0X100;
        state.param = 0x3000;

        state
            .dispatch(&mut target, &mut NoHooks, &mut NoFileio)
            .unwrap();

        assert_eq!(state.result, 0);
        assert_eq!(target.events.len(), 1);
        match &target.events[0] {
            TargetEvent::UserCommand { opcode, payload: p } => {
                assert_eq!(*opcode, opcode::SYS_USER_CMD_0X100);
                assert_eq!(p, payload);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
