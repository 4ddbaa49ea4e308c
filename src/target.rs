//! The target-memory collaborator role.
//!
//! In the source system this is the debug access port (DAP) / access-port
//! abstraction: reads and writes against the attached core's memory space.
//! That abstraction is named out of scope (spec §1) and modeled here purely
//! as a trait boundary, the way `probe-rs`'s `MemoryInterface` sits between
//! a `Core` and the concrete probe transport underneath it.

use crate::error::TargetError;

/// Byte order of a target's memory bus, as seen by the field codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

/// Minimal memory-access surface a semihosting/TPIU core needs from its
/// attached target.
///
/// Implementations are expected to be thin adapters over a real DAP/AP
/// session; this crate never holds one across a suspension point longer
/// than a single dispatch or poll.
pub trait Target {
    /// The target's word size in bytes, as configured for semihosting field
    /// packing. Always 4 or 8.
    fn word_size_bytes(&self) -> u8;

    /// The target's memory bus byte order.
    fn endian(&self) -> Endian;

    /// Reads `buf.len()` bytes starting at `addr`.
    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), TargetError>;

    /// Writes `buf` starting at `addr`.
    fn write_memory(&mut self, addr: u64, buf: &[u8]) -> Result<(), TargetError>;

    /// Reads a single target word (4 or 8 bytes, per [`Target::word_size_bytes`])
    /// at `addr` and returns it zero-extended to `u64`.
    fn read_word(&mut self, addr: u64) -> Result<u64, TargetError> {
        let mut buf = [0u8; 8];
        let n = self.word_size_bytes() as usize;
        self.read_memory(addr, &mut buf[..n])?;
        Ok(decode_word(&buf[..n], self.endian()))
    }

    /// Writes a single target word at `addr`, truncating `value` to the
    /// target's word size.
    fn write_word(&mut self, addr: u64, value: u64) -> Result<(), TargetError> {
        let n = self.word_size_bytes() as usize;
        let mut buf = [0u8; 8];
        encode_word(value, self.endian(), &mut buf[..n]);
        self.write_memory(addr, &buf[..n])
    }

    /// Reads a 32-bit word regardless of the target's configured word size;
    /// used for register accesses which are always 4 bytes wide (TPIU
    /// registers, the semihosting operation/parameter registers).
    fn read_u32(&mut self, addr: u64) -> Result<u32, TargetError> {
        let mut buf = [0u8; 4];
        self.read_memory(addr, &mut buf)?;
        Ok(match self.endian() {
            Endian::Little => u32::from_le_bytes(buf),
            Endian::Big => u32::from_be_bytes(buf),
        })
    }

    /// Writes a 32-bit word regardless of the target's configured word size.
    fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), TargetError> {
        let buf = match self.endian() {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        };
        self.write_memory(addr, &buf)
    }

    /// Publishes an event to whatever generic event sink the host wires up
    /// (used for the TPIU `TRACE_CONFIG` event and the semihosting
    /// USER_CMD event, and to signal a target halt when a non-resumable
    /// `EXIT` is handled).
    fn publish_event(&mut self, event: TargetEvent) {
        let _ = event;
    }
}

/// Events this crate publishes to the target/host event sink.
///
/// A no-op default is provided by [`Target::publish_event`] so
/// implementations that don't care about any of these can ignore the
/// method entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEvent {
    /// The target should halt: a non-resumable `EXIT` was processed.
    Halt,
    /// A TPIU/SWO instance finished an enable or disable transition.
    TraceConfigChanged {
        /// Name of the instance whose configuration changed.
        instance: String,
    },
    /// A `USER_CMD` opcode (0x100-0x107) was dispatched with the given
    /// payload, for an interpreter-side handler to consume.
    UserCommand {
        /// Opcode, in `0x100..=0x107`.
        opcode: u32,
        /// Raw bytes copied from the target's user-command buffer.
        payload: Vec<u8>,
    },
}

fn decode_word(buf: &[u8], endian: Endian) -> u64 {
    let mut padded = [0u8; 8];
    match endian {
        Endian::Little => padded[..buf.len()].copy_from_slice(buf),
        Endian::Big => padded[8 - buf.len()..].copy_from_slice(buf),
    }
    match endian {
        Endian::Little => u64::from_le_bytes(padded),
        Endian::Big => u64::from_be_bytes(padded),
    }
}

fn encode_word(value: u64, endian: Endian, out: &mut [u8]) {
    match endian {
        Endian::Little => out.copy_from_slice(&value.to_le_bytes()[..out.len()]),
        Endian::Big => out.copy_from_slice(&value.to_be_bytes()[8 - out.len()..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTarget {
        mem: Vec<u8>,
        word_size_bytes: u8,
        endian: Endian,
    }

    impl Target for FakeTarget {
        fn word_size_bytes(&self) -> u8 {
            self.word_size_bytes
        }

        fn endian(&self) -> Endian {
            self.endian
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
    }

    #[test]
    fn word_round_trip_64_bit_little_endian() {
        let mut t = FakeTarget {
            mem: vec![0; 16],
            word_size_bytes: 8,
            endian: Endian::Little,
        };
        t.write_word(0, 0x1122_3344_5566_7788).unwrap();
        assert_eq!(t.read_word(0).unwrap(), 0x1122_3344_5566_7788);
    }

    #[test]
    fn word_truncates_to_32_bit() {
        let mut t = FakeTarget {
            mem: vec![0; 16],
            word_size_bytes: 4,
            endian: Endian::Big,
        };
        t.write_word(0, 0xFFFF_FFFF_1234_5678).unwrap();
        assert_eq!(t.read_word(0).unwrap(), 0x1234_5678);
    }
}
