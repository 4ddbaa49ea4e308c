//! TPIU/SWO register offsets and `DEVID` capability bits (spec §6).
//!
//! Offsets are relative to the instance's configured base address
//! (`0xE0040000` by default on Cortex-M parts with an integrated TPIU/SWO).

/// `SSPSR`: synchronous port size support register (read-only, bitmask of
/// supported port widths).
pub const SSPSR_OFFSET: u64 = 0x000;
/// `CSPSR`: current synchronous port size register.
pub const CSPSR_OFFSET: u64 = 0x004;
/// `ACPR`: asynchronous clock prescaler register.
pub const ACPR_OFFSET: u64 = 0x010;
/// `SPPR`: selected pin protocol register.
pub const SPPR_OFFSET: u64 = 0x0F0;
/// `FFSR`: formatter and flush status register.
pub const FFSR_OFFSET: u64 = 0x300;
/// `FFCR`: formatter and flush control register.
pub const FFCR_OFFSET: u64 = 0x304;
/// `FSCR`: formatter synchronization counter register.
pub const FSCR_OFFSET: u64 = 0x308;
/// `DEVID`: device configuration register (read-only, protocol support bits).
pub const DEVID_OFFSET: u64 = 0xFC8;

/// `DEVID` bit 9: when *set*, synchronous trace mode is *not* supported.
pub const DEVID_NOSUPPORT_SYNC: u32 = 1 << 9;
/// `DEVID` bit 10: Manchester-encoded SWO support.
pub const DEVID_SUPPORT_MANCHESTER: u32 = 1 << 10;
/// `DEVID` bit 11: UART (NRZ) SWO support.
pub const DEVID_SUPPORT_UART: u32 = 1 << 11;

/// `FFCR` bit 1: continuous formatting enable.
pub const FFCR_FORMATTER_BIT: u32 = 1 << 1;

/// Maximum value `ACPR`'s prescaler field can hold.
pub const ACPR_MAX_PRESCALER: u32 = 0x1FFF;

/// Default TPIU/SWO base address on Cortex-M3/M4 parts with an integrated
/// block, used by [`super::instance::TpiuSwoInstance::new`] until overridden
/// by a `-baseaddr` configure option.
pub const DEFAULT_BASE: u64 = 0xE004_0000;
