//! `TpiuSwoInstance`: per-instance TPIU/SWO configuration and the
//! enable/disable state machine (spec §4.4).

use crate::collab::{ApRegisterAccess, ApResolver, EventRunner, TraceProbe};
use crate::error::{Error, Result};
use crate::target::{Target, TargetEvent};
use crate::tpiu::registers as reg;

#[cfg(feature = "net")]
use crate::tpiu::sink::BroadcastService;
use std::fs::File;

/// Trace pin protocol, matching the TPIU `SPPR` register encoding.
///
/// Values follow `arm_tpiu_swo.c`'s `TPIU_SPPR_PROTOCOL_*` aliases of
/// `TPIU_PIN_PROTOCOL_*`: sync is 0, Manchester-encoded async SWO is 1,
/// UART (NRZ) async SWO is 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinProtocol {
    /// Parallel synchronous trace port.
    Sync,
    /// Single-pin SWO, Manchester encoded.
    Manchester,
    /// Single-pin SWO, UART (NRZ) encoded.
    Uart,
}

impl PinProtocol {
    /// The `SPPR` register value for this protocol.
    pub fn sppr_value(self) -> u32 {
        match self {
            PinProtocol::Sync => 0,
            PinProtocol::Manchester => 1,
            PinProtocol::Uart => 2,
        }
    }

    fn devid_support_bit(self, devid: u32) -> bool {
        match self {
            PinProtocol::Sync => devid & reg::DEVID_NOSUPPORT_SYNC == 0,
            PinProtocol::Uart => devid & reg::DEVID_SUPPORT_UART != 0,
            PinProtocol::Manchester => devid & reg::DEVID_SUPPORT_MANCHESTER != 0,
        }
    }

    fn is_async(self) -> bool {
        matches!(self, PinProtocol::Uart | PinProtocol::Manchester)
    }
}

/// The event an event-action hook body is bound to (spec §3 `event_actions`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Fired before any register access during `enable`.
    PreEnable,
    /// Fired after registers are programmed and capture has started.
    PostEnable,
    /// Fired at the start of `disable`, before capture is torn down.
    PreDisable,
    /// Fired after capture has been torn down.
    PostDisable,
}

/// A single configure-time option (spec §4.4 "configure(opts)", exhaustive
/// list). Exposed as a plain enum rather than a string-keyed map since the
/// command interpreter that would parse `-flag value` pairs is named out of
/// scope (spec §1); an adapter translates parsed flags into these.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOption {
    /// `-port-width 1..32`.
    PortWidth(u8),
    /// `-protocol {sync|uart|manchester}`.
    Protocol(PinProtocol),
    /// `-formatter {on|off}`.
    Formatter(bool),
    /// `-traceclk <Hz>`.
    TraceClkIn(u32),
    /// `-pin-freq <Hz>`.
    PinFreq(u32),
    /// `-output <dest>`: `"external"`, `"-"`, `":<port>"`, or a file path.
    Output(String),
    /// `-event <event> <body>`.
    Event(EventKind, String),
    /// `-dap <name>`.
    Dap(String),
    /// `-ap-num <n>`.
    ApNum(u8),
    /// `-baseaddr <addr>`.
    BaseAddr(u64),
}

/// Identifies a single scalar configure option, for `cget` (spec §4.4
/// "`<name> cget -opt`"). `Event`'s current value is read via
/// [`TpiuSwoInstance::eventlist`] instead, since a single event kind maps to
/// a body string rather than a bare scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    /// `-port-width`.
    PortWidth,
    /// `-protocol`.
    Protocol,
    /// `-formatter`.
    Formatter,
    /// `-traceclk`.
    TraceClkIn,
    /// `-pin-freq`.
    PinFreq,
    /// `-output`.
    Output,
    /// `-dap`.
    Dap,
    /// `-ap-num`.
    ApNum,
    /// `-baseaddr`.
    BaseAddr,
}

/// Trace-output destination, derived from the `-output` configure string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputKind {
    /// No host-side capture at all.
    External,
    /// Host capture active, but no file kept (`-`).
    NoFile,
    /// Broadcast TCP service on the given port.
    Tcp(u16),
    /// Append-binary file at the given path.
    File(String),
}

fn parse_output(s: &str) -> Result<OutputKind> {
    if s == "external" {
        Ok(OutputKind::External)
    } else if s == "-" {
        Ok(OutputKind::NoFile)
    } else if let Some(port_str) = s.strip_prefix(':') {
        let port: u32 = port_str
            .parse()
            .map_err(|_| Error::Configuration(format!("invalid TCP port '{port_str}'")))?;
        if port == 0 || port > u16::MAX as u32 {
            return Err(Error::Configuration(format!("invalid TCP port '{port_str}'")));
        }
        Ok(OutputKind::Tcp(port as u16))
    } else {
        Ok(OutputKind::File(s.to_string()))
    }
}

/// A single TPIU/SWO instance: its DAP/AP identity, trace configuration,
/// output sinks, event hooks, and enable/disable lifecycle (spec §3, §4.4).
pub struct TpiuSwoInstance<A> {
    name: String,
    dap: Option<String>,
    ap_num: Option<u8>,
    base: u64,
    ap: Option<A>,

    port_width: u8,
    pin_protocol: PinProtocol,
    en_formatter: bool,
    traceclkin_freq: u32,
    swo_pin_freq: u32,
    out_filename: String,

    file: Option<File>,
    #[cfg(feature = "net")]
    service: Option<BroadcastService>,

    event_actions: Vec<(EventKind, String)>,

    deferred_enable: bool,
    enabled: bool,
    en_capture: bool,
}

impl<A> TpiuSwoInstance<A> {
    /// Creates a new instance with the source's documented defaults: base
    /// address `0xE0040000`, port width 1, output `"external"` (spec §4.4
    /// "create(name, opts)").
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dap: None,
            ap_num: None,
            base: reg::DEFAULT_BASE,
            ap: None,
            port_width: 1,
            pin_protocol: PinProtocol::Sync,
            en_formatter: false,
            traceclkin_freq: 0,
            swo_pin_freq: 0,
            out_filename: "external".to_string(),
            file: None,
            #[cfg(feature = "net")]
            service: None,
            event_actions: Vec::new(),
            deferred_enable: false,
            enabled: false,
            en_capture: false,
        }
    }

    /// This instance's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this instance is currently enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether probe-side capture is currently running. Distinct from
    /// `enabled` only in the "external" output case, where the source still
    /// sets `enabled=true` without ever flipping `en_capture` (no poll timer
    /// or sink is needed when the host never receives the bytes).
    pub fn capturing(&self) -> bool {
        self.en_capture
    }

    /// Whether `enable()` was deferred to a later `TpiuSwoController::init`
    /// (spec §4.4 step 1, "invoked during config load").
    pub fn deferred_enable(&self) -> bool {
        self.deferred_enable
    }

    /// Marks this instance for deferred enable, to be run by a later
    /// `TpiuSwoController::init`.
    pub fn defer_enable(&mut self) {
        self.deferred_enable = true;
    }

    /// Applies configure options. Rejected while `enabled` (spec §4.4
    /// "configure(opts): forbidden while enabled").
    pub fn configure(&mut self, opts: impl IntoIterator<Item = ConfigOption>) -> Result<()> {
        if self.enabled {
            return Err(Error::Configuration(format!(
                "cannot configure TPIU/SWO; {} is enabled",
                self.name
            )));
        }
        for opt in opts {
            match opt {
                ConfigOption::PortWidth(w) => {
                    if !(1..=32).contains(&w) {
                        return Err(Error::Configuration(format!("invalid port width {w}")));
                    }
                    self.port_width = w;
                }
                ConfigOption::Protocol(p) => self.pin_protocol = p,
                ConfigOption::Formatter(on) => self.en_formatter = on,
                ConfigOption::TraceClkIn(hz) => self.traceclkin_freq = hz,
                ConfigOption::PinFreq(hz) => self.swo_pin_freq = hz,
                ConfigOption::Output(s) => {
                    parse_output(&s)?;
                    self.out_filename = s;
                }
                ConfigOption::Event(event, body) => {
                    if let Some(slot) = self.event_actions.iter_mut().find(|(e, _)| *e == event) {
                        slot.1 = body;
                    } else {
                        self.event_actions.push((event, body));
                    }
                }
                ConfigOption::Dap(name) => self.dap = Some(name),
                ConfigOption::ApNum(n) => self.ap_num = Some(n),
                ConfigOption::BaseAddr(addr) => self.base = addr,
            }
        }
        Ok(())
    }

    /// Prints the (event, body) table (spec §4.4 "eventlist").
    pub fn eventlist(&self) -> &[(EventKind, String)] {
        &self.event_actions
    }

    /// Reads back the current value of a single scalar configure option
    /// (spec §4.4 "`<name> cget -opt`"). `Dap`/`ApNum` report empty/`0` when
    /// unset, matching the "require DAP handle and access-port number"
    /// precondition only being enforced at `enable`, not at `create`.
    pub fn cget(&self, key: ConfigKey) -> ConfigOption {
        match key {
            ConfigKey::PortWidth => ConfigOption::PortWidth(self.port_width),
            ConfigKey::Protocol => ConfigOption::Protocol(self.pin_protocol),
            ConfigKey::Formatter => ConfigOption::Formatter(self.en_formatter),
            ConfigKey::TraceClkIn => ConfigOption::TraceClkIn(self.traceclkin_freq),
            ConfigKey::PinFreq => ConfigOption::PinFreq(self.swo_pin_freq),
            ConfigKey::Output => ConfigOption::Output(self.out_filename.clone()),
            ConfigKey::Dap => ConfigOption::Dap(self.dap.clone().unwrap_or_default()),
            ConfigKey::ApNum => ConfigOption::ApNum(self.ap_num.unwrap_or(0)),
            ConfigKey::BaseAddr => ConfigOption::BaseAddr(self.base),
        }
    }

    fn run_event(&mut self, event: EventKind, events: &mut impl EventRunner) -> Result<()> {
        let Some((_, body)) = self.event_actions.iter().find(|(e, _)| *e == event) else {
            return Ok(());
        };
        let body = body.clone();
        tracing::debug!(instance = %self.name, event = ?event, "TPIU/SWO event action");
        events.run(&body, &self.name).map_err(|e| {
            tracing::error!(instance = %self.name, event = ?event, error = %e, "TPIU/SWO event action failed");
            e
        })
    }

    /// Tears down capture resources (sinks, timer, probe) without touching
    /// `enabled`. Shared by `enable`'s failure-rollback path and `disable`.
    fn stop_capture(&mut self, probe: &mut impl TraceProbe) -> Result<()> {
        self.file = None;
        #[cfg(feature = "net")]
        {
            self.service = None;
        }
        if self.en_capture {
            self.en_capture = false;
            let mut dummy_freq = 0u32;
            let mut dummy_prescaler = None;
            probe.config_trace(
                false,
                self.pin_protocol,
                self.port_width,
                &mut dummy_freq,
                0,
                &mut dummy_prescaler,
            )?;
        }
        Ok(())
    }
}

impl<A: ApRegisterAccess> TpiuSwoInstance<A> {
    /// Runs the enable state machine (spec §4.4 "enable()"). `target` is
    /// used only to publish the `TraceConfigChanged` event; all register
    /// access goes through the resolved `A: ApRegisterAccess`.
    pub fn enable(
        &mut self,
        during_config_load: bool,
        resolver: &mut impl ApResolver<Ap = A>,
        probe: &mut impl TraceProbe,
        events: &mut impl EventRunner,
        target: &mut dyn Target,
    ) -> Result<()> {
        if during_config_load {
            self.defer_enable();
            return Ok(());
        }
        if self.enabled {
            return Ok(());
        }

        if self.traceclkin_freq == 0 {
            return Err(Error::Configuration(
                "trace clock-in frequency not set".into(),
            ));
        }

        let output = parse_output(&self.out_filename)?;
        let output_external = output == OutputKind::External;

        if self.pin_protocol.is_async() && self.swo_pin_freq == 0 && output_external {
            return Err(Error::Configuration(
                "SWO pin frequency required when using external capturing".into(),
            ));
        }

        let dap = self
            .dap
            .as_deref()
            .ok_or_else(|| Error::Configuration("-dap not set".into()))?;
        let ap_num = self
            .ap_num
            .ok_or_else(|| Error::Configuration("-ap-num not set".into()))?;
        if self.ap.is_none() {
            self.ap = Some(resolver.resolve(dap, ap_num)?);
        }

        self.run_event(EventKind::PreEnable, events)?;

        let ap = self.ap.as_mut().expect("resolved above");
        let devid = ap.read_u32(self.base + reg::DEVID_OFFSET)?;
        if !self.pin_protocol.devid_support_bit(devid) {
            return Err(Error::UnsupportedProtocol(self.pin_protocol));
        }

        if self.pin_protocol == PinProtocol::Sync {
            let sspsr = ap.read_u32(self.base + reg::SSPSR_OFFSET)?;
            if sspsr & (1 << (self.port_width - 1)) == 0 {
                return Err(Error::UnsupportedPortWidth(self.port_width));
            }
        }

        if let Err(e) = self.enable_inner(&output, output_external, probe) {
            self.stop_capture(probe).ok();
            return Err(e);
        }

        self.run_event(EventKind::PostEnable, events).map_err(|e| {
            // Hook failure after registers/capture are live: tear down per
            // spec §7 "Partial enable failure" (same rollback as step 6+).
            let _ = self.stop_capture(probe);
            e
        })?;

        target.publish_event(TargetEvent::TraceConfigChanged {
            instance: self.name.clone(),
        });
        self.enabled = true;
        Ok(())
    }

    fn enable_inner(
        &mut self,
        output: &OutputKind,
        output_external: bool,
        probe: &mut impl TraceProbe,
    ) -> Result<()> {
        let mut prescaler: Option<u32> = None;
        let mut swo_pin_freq = self.swo_pin_freq;

        if !output_external {
            match output {
                #[cfg(feature = "net")]
                OutputKind::Tcp(port) => {
                    tracing::info!(instance = %self.name, port, "starting trace server");
                    self.service = Some(BroadcastService::bind(*port)?);
                }
                #[cfg(not(feature = "net"))]
                OutputKind::Tcp(_) => {
                    return Err(Error::Configuration(
                        "TCP trace output requires the 'net' feature".into(),
                    ));
                }
                OutputKind::File(path) => {
                    self.file = Some(crate::tpiu::sink::open_file_sink(path)?);
                }
                OutputKind::NoFile | OutputKind::External => {}
            }

            probe.config_trace(
                true,
                self.pin_protocol,
                self.port_width,
                &mut swo_pin_freq,
                self.traceclkin_freq,
                &mut prescaler,
            )?;

            if self.pin_protocol.is_async() && swo_pin_freq == 0 {
                return Err(Error::Configuration(if self.swo_pin_freq != 0 {
                    format!("adapter rejected SWO pin frequency {} Hz", self.swo_pin_freq)
                } else {
                    "adapter does not support auto-detection of SWO pin frequency nor a default value".into()
                }));
            }

            if self.swo_pin_freq != swo_pin_freq {
                tracing::info!(instance = %self.name, hz = swo_pin_freq, "SWO pin data rate adjusted by adapter");
            }
            self.swo_pin_freq = swo_pin_freq;
            self.en_capture = true;
        }

        // Adapters that don't manage their own bit-clock division leave
        // `prescaler_out` unset; fall back to computing `ACPR` from the
        // reference clock and desired SWO rate directly (spec §4.4 step 10).
        // This also covers the `output="external"` path, where no adapter
        // is consulted at all.
        if prescaler.is_none() && self.pin_protocol.is_async() {
            let computed = (self.traceclkin_freq + self.swo_pin_freq / 2) / self.swo_pin_freq;
            let clamped = computed.clamp(1, reg::ACPR_MAX_PRESCALER);
            prescaler = Some(clamped);
            let actual = self.traceclkin_freq / clamped;
            if self.swo_pin_freq != actual {
                tracing::info!(instance = %self.name, hz = actual, "SWO pin data rate adjusted");
            }
            self.swo_pin_freq = actual;
        }

        let prescaler = prescaler.unwrap_or(1);
        let ap = self.ap.as_mut().expect("resolved before enable_inner");
        ap.write_u32(self.base + reg::CSPSR_OFFSET, 1 << (self.port_width - 1))?;
        ap.write_u32(self.base + reg::ACPR_OFFSET, prescaler - 1)?;
        ap.write_u32(self.base + reg::SPPR_OFFSET, self.pin_protocol.sppr_value())?;
        let mut ffcr = ap.read_u32(self.base + reg::FFCR_OFFSET)?;
        if self.en_formatter {
            ffcr |= reg::FFCR_FORMATTER_BIT;
        } else {
            ffcr &= !reg::FFCR_FORMATTER_BIT;
        }
        ap.write_u32(self.base + reg::FFCR_OFFSET, ffcr)?;

        Ok(())
    }

    /// Tears down capture and releases sinks (spec §4.4 "disable()"). Never
    /// touches TPIU registers — probe de-configuration is sufficient.
    pub fn disable(
        &mut self,
        probe: &mut impl TraceProbe,
        events: &mut impl EventRunner,
        target: &mut dyn Target,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.enabled = false;

        // Hook failures during disable are logged by `run_event` and do not
        // abort teardown (spec §7: only the *transition* fails, the
        // instance must still end up torn down).
        let _ = self.run_event(EventKind::PreDisable, events);
        self.stop_capture(probe)?;
        let _ = self.run_event(EventKind::PostDisable, events);

        target.publish_event(TargetEvent::TraceConfigChanged {
            instance: self.name.clone(),
        });
        Ok(())
    }

    /// Polls up to 4096 bytes of captured trace and fans them out to the
    /// file sink, TCP broadcast clients, and the target's generic trace
    /// callback (spec §4.4 "poll_trace (periodic)").
    pub fn poll_trace(&mut self, probe: &mut impl TraceProbe, target: &mut dyn Target) -> Result<()> {
        const TRACE_BUF_SIZE: usize = 4096;
        let buf = probe.poll_trace(TRACE_BUF_SIZE)?;
        if buf.is_empty() {
            return Ok(());
        }

        target.publish_event(TargetEvent::TraceConfigChanged {
            instance: self.name.clone(),
        });

        if let Some(file) = self.file.as_mut() {
            crate::tpiu::sink::write_file_sink(file, &buf)?;
        }

        #[cfg(feature = "net")]
        if let Some(service) = self.service.as_mut() {
            service.accept_pending();
            service.broadcast(&buf);
        }

        Ok(())
    }

    /// Releases this instance's resources for cleanup (spec §4.5), mirroring
    /// `disable` but tolerant of being called on an already-disabled
    /// instance (the AP handle and event-action chain are freed either way).
    pub fn release_ap(&mut self) {
        self.ap = None;
    }
}
