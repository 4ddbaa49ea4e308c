//! End-to-end scenario tests S1-S4 (SPEC_FULL.md §8).

use arm_debug_services::collab::{FileioTransport, SemihostingHooks};
use arm_debug_services::error::TargetError;
use arm_debug_services::semihosting::fileio::FileioRequest;
use arm_debug_services::semihosting::{opcode, SemihostingState};
use arm_debug_services::target::{Endian, Target, TargetEvent};

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

    fn write_u32(&mut self, addr: u64, v: u32) {
        let addr = addr as usize;
        self.mem[addr..addr + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn write_bytes(&mut self, addr: u64, buf: &[u8]) {
        let addr = addr as usize;
        self.mem[addr..addr + buf.len()].copy_from_slice(buf);
    }
}

impl Target for FakeTarget {
    fn word_size_bytes(&self) -> u8 {
        4
    }

    fn endian(&self) -> Endian {
        Endian::Little
    }

    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), TargetError> {
        let addr = addr as usize;
        buf.copy_from_slice(&self.mem[addr..addr + buf.len()]);
        Ok(())
    }

    fn write_memory(&mut self, addr: u64, buf: &[u8]) -> Result<(), TargetError> {
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

#[derive(Default)]
struct NoFileio;
impl FileioTransport for NoFileio {
    fn publish(&mut self, _request: FileioRequest) {}
}

/// S1 — `SYS_OPEN(":tt", mode=4)` with `is_fileio=false` returns a nonzero
/// fd and sets `stdout_fd`.
#[test]
fn s1_open_tt_write_mode_sets_stdout_fd() {
    let mut target = FakeTarget::new();
    let mut state = SemihostingState::new(4);

    let name = b":tt";
    target.write_bytes(0x5000, name);
    target.write_u32(0x3000, 0x5000); // name addr
    target.write_u32(0x3004, 4); // mode
    target.write_u32(0x3008, name.len() as u32); // name len

    state.op = opcode::SYS_OPEN;
    state.param = 0x3000;

    state
        .dispatch(&mut target, &mut NoHooks, &mut NoFileio)
        .unwrap();

    assert_ne!(state.result, 0);
    assert!(state.result > 0);
    assert_eq!(state.stdout_fd, state.result as i32);
}

/// S2 — `SYS_WRITE(fd=stdout_fd, addr, len=5)` with `is_fileio=false`,
/// `redirect_cfg=None` writes the bytes to the host descriptor bound to
/// `stdout_fd` and reports `result=0`.
///
/// A temp file's raw fd stands in for "host stdout" here (the source's
/// `stdout_fd` is itself just a raw host descriptor bound at `OPEN` time;
/// using a throwaway file avoids clobbering the test runner's real stdout).
#[test]
fn s2_write_with_no_redirect_reaches_bound_descriptor() {
    #[cfg(unix)]
    {
        use std::io::{Read, Seek, SeekFrom};
        use std::os::unix::io::IntoRawFd;

        let tmp = tempfile_in_target_dir();
        let raw_fd = tmp.try_clone().unwrap().into_raw_fd();

        let mut target = FakeTarget::new();
        let mut state = SemihostingState::new(4);
        state.stdout_fd = raw_fd;

        let payload_addr = 0x1000u64;
        target.write_bytes(payload_addr, b"hello");
        target.write_u32(0x3000, raw_fd as u32); // fd
        target.write_u32(0x3004, payload_addr as u32); // addr
        target.write_u32(0x3008, 5); // len

        state.op = opcode::SYS_WRITE;
        state.param = 0x3000;

        state
            .dispatch(&mut target, &mut NoHooks, &mut NoFileio)
            .unwrap();

        assert_eq!(state.result, 0);

        let mut file = tmp;
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }
}

#[cfg(unix)]
fn tempfile_in_target_dir() -> std::fs::File {
    use std::fs::OpenOptions;
    let path = std::env::temp_dir().join(format!(
        "arm-debug-services-test-{}-{}",
        std::process::id(),
        "s2"
    ));
    OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(path)
        .unwrap()
}

/// S3 — same as S2 but `redirect_cfg=ALL` with a TCP client attached: the
/// bytes land on the client instead of the bound host descriptor.
#[cfg(feature = "net")]
#[test]
fn s3_write_with_redirect_all_reaches_tcp_client() {
    use arm_debug_services::semihosting::redirect::RedirectConfig;
    use std::io::Read;
    use std::net::TcpStream;

    let mut target = FakeTarget::new();
    let mut state = SemihostingState::new(4);
    state.stdout_fd = 111; // arbitrary; never touched because of redirect

    // `RedirectService::bind` takes a fixed port (port 0 would need a
    // post-hoc lookup of the OS-assigned port, which isn't exposed here).
    const PORT: u16 = 18_245;
    state.set_redirect(RedirectConfig::All, Some(PORT)).unwrap();
    let client = TcpStream::connect(("127.0.0.1", PORT)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(50));
    state.poll_redirect_service();

    let payload_addr = 0x1000u64;
    target.write_bytes(payload_addr, b"hello");
    target.write_u32(0x3000, state.stdout_fd as u32);
    target.write_u32(0x3004, payload_addr as u32);
    target.write_u32(0x3008, 5);

    state.op = opcode::SYS_WRITE;
    state.param = 0x3000;

    state
        .dispatch(&mut target, &mut NoHooks, &mut NoFileio)
        .unwrap();

    assert_eq!(state.result, 0);

    let mut client = client;
    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");
}

/// S4 — `SYS_EXIT` with a frontend attached never calls `process::exit`;
/// instead a diagnostic is printed and, since `has_resumable_exit=false`,
/// `is_resumable` becomes false and a `Halt` event is published.
///
/// The no-frontend branch (`process::exit(code)`) cannot be exercised
/// in-process without terminating the test runner, so only the
/// frontend-attached branch is covered here.
#[test]
fn s4_exit_with_frontend_does_not_terminate_and_halts() {
    let mut target = FakeTarget::new();
    let mut state = SemihostingState::new(8);
    state.has_resumable_exit = false;
    state.frontend_connected = true;

    target.write_u32(0x3000, opcode::ADP_STOPPED_APPLICATION_EXIT);
    target.write_u32(0x3004, 7); // exit code

    state.op = opcode::SYS_EXIT;
    state.param = 0x3000;

    state
        .dispatch(&mut target, &mut NoHooks, &mut NoFileio)
        .unwrap();

    assert!(!state.is_resumable);
    assert!(target.events.contains(&TargetEvent::Halt));
}
