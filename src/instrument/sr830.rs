//! Stanford Research SR830 DSP Lock-In Amplifier Driver
//!
//! Reference: SR830 User's Manual, chapter 5 (Remote Programming)
//!
//! Protocol Overview:
//! - Format: `<KEYWORD>[?][i][,j]` with LF terminator
//! - Setters write `<KW><value>\n`; getters query `<KW>?\n` and wait
//!   [`DEFAULT_QUERY_DELAY`] before reading the reply
//! - Enumerated settings are sent as their integer code
//!
//! Out-of-range arguments are rejected with [`GpibError::InvalidParameter`]
//! before anything reaches the instrument.

use crate::adapters::Transport;
use crate::address::Address;
use crate::error::{GpibError, GpibResult};
use bitflags::bitflags;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Settle time between a query and its reply read.
pub const DEFAULT_QUERY_DELAY: Duration = Duration::from_millis(60);

macro_rules! coded_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $code),+
        }

        impl $name {
            /// Integer code used on the wire.
            pub fn code(self) -> u8 {
                self as u8
            }

            /// Variant for a wire code, `None` when the code is unknown.
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

coded_enum! {
    /// Reference source (`FMOD`).
    ReferenceSource {
        /// Reference input connector.
        External = 0,
        /// Internal oscillator.
        Internal = 1,
    }
}

coded_enum! {
    /// External reference trigger (`RSLP`).
    ReferenceTrigger {
        /// Sine zero crossing.
        Sine = 0,
        /// TTL rising edge.
        Rising = 1,
        /// TTL falling edge.
        Falling = 2,
    }
}

coded_enum! {
    /// Input shield grounding (`IGND`).
    InputShield {
        /// Shield floats.
        Float = 0,
        /// Shield grounded.
        Ground = 1,
    }
}

coded_enum! {
    /// Input coupling (`ICPL`).
    InputCoupling {
        /// AC coupled.
        Ac = 0,
        /// DC coupled.
        Dc = 1,
    }
}

coded_enum! {
    /// Behaviour when the data buffer fills (`SEND`).
    EndOfBuffer {
        /// Stop storing when full.
        Shot = 0,
        /// Overwrite the oldest points.
        Loop = 1,
    }
}

coded_enum! {
    /// Quantity read by `OUTP?`.
    Output {
        /// In-phase component.
        X = 1,
        /// Quadrature component.
        Y = 2,
        /// Magnitude.
        R = 3,
        /// Phase in degrees.
        Theta = 4,
    }
}

coded_enum! {
    /// Channel targeted by `AOFF`.
    OffsetChannel {
        /// In-phase component.
        X = 1,
        /// Quadrature component.
        Y = 2,
        /// Magnitude.
        R = 3,
    }
}

coded_enum! {
    /// Front panel display (`OUTR?`) or buffer (`TRCA?`) channel.
    Channel {
        /// Channel 1.
        One = 1,
        /// Channel 2.
        Two = 2,
    }
}

bitflags! {
    /// Serial poll status byte (`*STB?` and the bus serial poll).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SerialPollStatus: u8 {
        /// No scan in progress.
        const NO_SCAN = 1 << 0;
        /// No command being executed.
        const NO_COMMAND = 1 << 1;
        /// An enabled error status bit is set.
        const ERROR = 1 << 2;
        /// An enabled lock-in status bit is set.
        const LIA = 1 << 3;
        /// Output buffer holds data.
        const MESSAGE_AVAILABLE = 1 << 4;
        /// An enabled standard event bit is set.
        const STANDARD_EVENT = 1 << 5;
        /// Service request.
        const SERVICE_REQUEST = 1 << 6;
    }

    /// Standard event status register (`*ESR?`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StandardEventStatus: u8 {
        /// Input queue overflowed.
        const INPUT_OVERFLOW = 1 << 0;
        /// Output queue overflowed.
        const OUTPUT_OVERFLOW = 1 << 2;
        /// Command could not execute.
        const CANNOT_EXECUTE = 1 << 4;
        /// Unrecognised command.
        const ILLEGAL_COMMAND = 1 << 5;
        /// Front panel key pressed.
        const KEY_PRESS = 1 << 6;
        /// Power cycled.
        const POWER_ON = 1 << 7;
    }

    /// Lock-in status register (`LIAS?`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LiaStatus: u8 {
        /// Input or amplifier overload.
        const INPUT_OVERLOAD = 1 << 0;
        /// Time constant filter overload.
        const FILTER_OVERLOAD = 1 << 1;
        /// Output overload.
        const OUTPUT_OVERLOAD = 1 << 2;
        /// Reference unlocked.
        const REFERENCE_UNLOCK = 1 << 3;
        /// Detection frequency range switched.
        const RANGE_CHANGE = 1 << 4;
        /// Time constant changed indirectly.
        const TIME_CONSTANT_CHANGE = 1 << 5;
        /// Data storage triggered.
        const DATA_STORAGE_TRIGGER = 1 << 6;
    }

    /// Error status register (`ERRS?`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ErrorStatus: u8 {
        /// Backup battery failed.
        const BATTERY_FAIL = 1 << 1;
        /// RAM memory test failed.
        const RAM_FAIL = 1 << 2;
        /// ROM memory test failed.
        const ROM_FAIL = 1 << 4;
        /// GPIB fast transfer aborted.
        const GPIB_FAIL = 1 << 5;
        /// DSP test failed.
        const DSP_FAIL = 1 << 6;
        /// Internal math error.
        const MATH_FAIL = 1 << 7;
    }
}

fn check_range<V>(name: &'static str, value: V, range: RangeInclusive<V>) -> GpibResult<V>
where
    V: PartialOrd + std::fmt::Display + Copy,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(GpibError::invalid(
            name,
            value,
            format!("must be {}..={}", range.start(), range.end()),
        ))
    }
}

fn check_bit(bit: u8) -> GpibResult<u8> {
    check_range("status bit", bit, 0..=7)
}

fn parse_code<E>(what: &'static str, raw: &str, from_code: fn(u8) -> Option<E>) -> GpibResult<E> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .and_then(from_code)
        .ok_or_else(|| GpibError::parse(what, raw))
}

/// Parse a comma separated list of floats. A trailing comma is allowed.
pub fn parse_float_list(what: &'static str, raw: &str) -> GpibResult<Vec<f64>> {
    raw.trim()
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| field.parse::<f64>().map_err(|_| GpibError::parse(what, raw)))
        .collect()
}

/// Driver for the SR830 lock-in amplifier.
pub struct Sr830<T: Transport> {
    transport: T,
    query_delay: Duration,
}

impl<T: Transport> Sr830<T> {
    /// Wrap `transport` with the default query delay.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            query_delay: DEFAULT_QUERY_DELAY,
        }
    }

    /// Override the settle time used by every query of this instance.
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Point the transport at the lock-in.
    pub fn set_address(&mut self, address: &Address) -> GpibResult<()> {
        self.transport.set_address(address)
    }

    /// Address the transport currently targets.
    pub fn address(&mut self) -> GpibResult<Address> {
        self.transport.address()
    }

    /// Serial poll through the transport.
    pub fn read_status_byte(&mut self) -> GpibResult<SerialPollStatus> {
        self.transport
            .read_status_byte()
            .map(SerialPollStatus::from_bits_retain)
    }

    /// Direct access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send(&mut self, command: &str) -> GpibResult<()> {
        debug!(command = %command.trim_end(), "SR830 command");
        self.transport.write(command)
    }

    fn query_raw(&mut self, command: &str) -> GpibResult<String> {
        self.transport.query(command, self.query_delay)
    }

    fn query_value<V: FromStr>(&mut self, what: &'static str, command: &str) -> GpibResult<V> {
        let raw = self.query_raw(command)?;
        let parsed = raw.trim().parse::<V>();
        parsed.map_err(|_| GpibError::parse(what, raw))
    }

    fn query_flag(&mut self, what: &'static str, command: &str) -> GpibResult<bool> {
        Ok(self.query_value::<u8>(what, command)? == 1)
    }

    fn query_code<E>(
        &mut self,
        what: &'static str,
        command: &str,
        from_code: fn(u8) -> Option<E>,
    ) -> GpibResult<E> {
        let raw = self.query_raw(command)?;
        parse_code(what, &raw, from_code)
    }

    // Reference and phase

    /// Reference phase shift in degrees (`PHAS?`).
    pub fn phase(&mut self) -> GpibResult<f64> {
        self.query_value("phase", "PHAS?\n")
    }

    /// Reference phase shift in degrees.
    pub fn set_phase(&mut self, degrees: f64) -> GpibResult<()> {
        let degrees = check_range("phase", degrees, -360.0..=729.99)?;
        self.send(&format!("PHAS{}\n", degrees))
    }

    /// Reference source (`FMOD?`).
    pub fn reference_source(&mut self) -> GpibResult<ReferenceSource> {
        self.query_code("reference source", "FMOD?\n", ReferenceSource::from_code)
    }

    /// Select the reference source.
    pub fn set_reference_source(&mut self, source: ReferenceSource) -> GpibResult<()> {
        self.send(&format!("FMOD{}\n", source.code()))
    }

    /// Reference frequency in Hz (`FREQ?`).
    pub fn reference_frequency(&mut self) -> GpibResult<f64> {
        self.query_value("reference frequency", "FREQ?\n")
    }

    /// Internal reference frequency in Hz.
    pub fn set_reference_frequency(&mut self, hz: f64) -> GpibResult<()> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(GpibError::invalid(
                "reference frequency",
                hz,
                "must be a positive frequency in Hz",
            ));
        }
        self.send(&format!("FREQ{}\n", hz))
    }

    /// External reference trigger (`RSLP?`).
    pub fn reference_trigger(&mut self) -> GpibResult<ReferenceTrigger> {
        self.query_code("reference trigger", "RSLP?\n", ReferenceTrigger::from_code)
    }

    /// Select the external reference trigger.
    pub fn set_reference_trigger(&mut self, trigger: ReferenceTrigger) -> GpibResult<()> {
        self.send(&format!("RSLP{}\n", trigger.code()))
    }

    /// Detection harmonic (`HARM?`).
    pub fn harmonic(&mut self) -> GpibResult<u32> {
        self.query_value("harmonic", "HARM?\n")
    }

    /// Detection harmonic, 1..=19999.
    pub fn set_harmonic(&mut self, harmonic: u32) -> GpibResult<()> {
        let harmonic = check_range("harmonic", harmonic, 1..=19999)?;
        self.send(&format!("HARM{}\n", harmonic))
    }

    /// Sine output amplitude in Vrms.
    pub fn sine_amplitude(&mut self) -> GpibResult<f64> {
        self.query_value("sine output amplitude", "SLVL?\n")
    }

    // Input and filter

    /// Input configuration: 0 = A, 1 = A-B, 2 = I (1 MΩ), 3 = I (100 MΩ).
    pub fn input_config(&mut self) -> GpibResult<u8> {
        self.query_value("input configuration", "ISRC?\n")
    }

    /// Input configuration, 0..=3.
    pub fn set_input_config(&mut self, config: u8) -> GpibResult<()> {
        let config = check_range("input configuration", config, 0..=3)?;
        self.send(&format!("ISRC{}\n", config))
    }

    /// Input shield grounding (`IGND?`).
    pub fn input_shield(&mut self) -> GpibResult<InputShield> {
        self.query_code("input shield", "IGND?\n", InputShield::from_code)
    }

    /// Float or ground the input shield.
    pub fn set_input_shield(&mut self, shield: InputShield) -> GpibResult<()> {
        self.send(&format!("IGND{}\n", shield.code()))
    }

    /// Input coupling (`ICPL?`).
    pub fn input_coupling(&mut self) -> GpibResult<InputCoupling> {
        self.query_code("input coupling", "ICPL?\n", InputCoupling::from_code)
    }

    /// AC or DC input coupling.
    pub fn set_input_coupling(&mut self, coupling: InputCoupling) -> GpibResult<()> {
        self.send(&format!("ICPL{}\n", coupling.code()))
    }

    /// Line notch filters: 0 = none, 1 = line, 2 = 2x line, 3 = both.
    pub fn line_notch(&mut self) -> GpibResult<u8> {
        self.query_value("line notch", "ILIN?\n")
    }

    /// Line notch filters, 0..=3.
    pub fn set_line_notch(&mut self, notch: u8) -> GpibResult<()> {
        let notch = check_range("line notch", notch, 0..=3)?;
        self.send(&format!("ILIN{}\n", notch))
    }

    // Gain and time constant

    /// Sensitivity index, 0 (2 nV) through 26 (1 V).
    pub fn sensitivity(&mut self) -> GpibResult<u8> {
        self.query_value("sensitivity", "SENS?\n")
    }

    /// Sensitivity index, 0..=26.
    pub fn set_sensitivity(&mut self, index: u8) -> GpibResult<()> {
        let index = check_range("sensitivity", index, 0..=26)?;
        self.send(&format!("SENS{}\n", index))
    }

    /// Reserve mode: 0 = high reserve, 1 = normal, 2 = low noise.
    pub fn reserve_mode(&mut self) -> GpibResult<u8> {
        self.query_value("reserve mode", "RMOD?\n")
    }

    /// Reserve mode, 0..=2.
    pub fn set_reserve_mode(&mut self, mode: u8) -> GpibResult<()> {
        let mode = check_range("reserve mode", mode, 0..=2)?;
        self.send(&format!("RMOD{}\n", mode))
    }

    /// Time constant index, 0 (10 µs) through 19 (30 ks).
    pub fn time_constant(&mut self) -> GpibResult<u8> {
        self.query_value("time constant", "OFLT?\n")
    }

    /// Time constant index, 0..=19.
    pub fn set_time_constant(&mut self, index: u8) -> GpibResult<()> {
        let index = check_range("time constant", index, 0..=19)?;
        self.send(&format!("OFLT{}\n", index))
    }

    /// Low pass slope: 0 = 6, 1 = 12, 2 = 18, 3 = 24 dB/oct.
    pub fn lowpass_slope(&mut self) -> GpibResult<u8> {
        self.query_value("low pass slope", "OFSL?\n")
    }

    /// Low pass slope, 0..=3.
    pub fn set_lowpass_slope(&mut self, slope: u8) -> GpibResult<()> {
        let slope = check_range("low pass slope", slope, 0..=3)?;
        self.send(&format!("OFSL{}\n", slope))
    }

    /// Synchronous filter state (`SYNC?`).
    pub fn sync_filter(&mut self) -> GpibResult<bool> {
        self.query_flag("sync filter", "SYNC?\n")
    }

    /// Enable the synchronous filter below 200 Hz.
    pub fn set_sync_filter(&mut self, on: bool) -> GpibResult<()> {
        self.send(&format!("SYNC{}\n", u8::from(on)))
    }

    // Auxiliary I/O

    /// Voltage on aux input 1..=4.
    pub fn aux_input(&mut self, index: u8) -> GpibResult<f64> {
        let index = check_range("aux input", index, 1..=4)?;
        self.query_value("aux input", &format!("OAUX?{}\n", index))
    }

    /// Voltage set on aux output 1..=4.
    pub fn aux_output(&mut self, index: u8) -> GpibResult<f64> {
        let index = check_range("aux output", index, 1..=4)?;
        self.query_value("aux output", &format!("AUXV?{}\n", index))
    }

    /// Set aux output 1..=4 to `volts` (-10.5..=10.5 V).
    pub fn set_aux_output(&mut self, index: u8, volts: f64) -> GpibResult<()> {
        let index = check_range("aux output", index, 1..=4)?;
        let volts = check_range("aux output voltage", volts, -10.5..=10.5)?;
        self.send(&format!("AUXV{},{}\n", index, volts))
    }

    // Remote programming

    /// Route responses to the GPIB interface.
    pub fn set_gpib_output(&mut self) -> GpibResult<()> {
        self.send("OUTX1\n")
    }

    /// Whether responses go to GPIB (`OUTX?` == 1).
    pub fn is_gpib_output(&mut self) -> GpibResult<bool> {
        self.query_flag("output interface", "OUTX?\n")
    }

    /// Lock the front panel while under remote control.
    pub fn enable_lockout(&mut self) -> GpibResult<()> {
        self.send("OVRM0\n")
    }

    /// Release the front panel.
    pub fn disable_lockout(&mut self) -> GpibResult<()> {
        self.send("OVRM1\n")
    }

    /// Key click state (`KCLK?`).
    pub fn key_click(&mut self) -> GpibResult<bool> {
        self.query_flag("key click", "KCLK?\n")
    }

    /// Turn the key click on or off.
    pub fn set_key_click(&mut self, on: bool) -> GpibResult<()> {
        self.send(&format!("KCLK{}\n", u8::from(on)))
    }

    /// Audible alarm state (`ALRM?`).
    pub fn alarm(&mut self) -> GpibResult<bool> {
        self.query_flag("alarm", "ALRM?\n")
    }

    /// Turn the audible alarm on or off.
    pub fn set_alarm(&mut self, on: bool) -> GpibResult<()> {
        self.send(&format!("ALRM{}\n", u8::from(on)))
    }

    /// Store the current setup in buffer 1..=9.
    pub fn save_setup(&mut self, slot: u8) -> GpibResult<()> {
        let slot = check_range("setup slot", slot, 1..=9)?;
        self.send(&format!("SSET{}\n", slot))
    }

    /// Recall the setup stored in buffer 1..=9.
    pub fn recall_setup(&mut self, slot: u8) -> GpibResult<()> {
        let slot = check_range("setup slot", slot, 1..=9)?;
        self.send(&format!("RSET{}\n", slot))
    }

    // Auto functions

    /// Auto gain (`AGAN`).
    pub fn auto_gain(&mut self) -> GpibResult<()> {
        self.send("AGAN\n")
    }

    /// Auto reserve (`ARSV`).
    pub fn auto_reserve(&mut self) -> GpibResult<()> {
        self.send("ARSV\n")
    }

    /// Auto phase (`APHS`).
    pub fn auto_phase(&mut self) -> GpibResult<()> {
        self.send("APHS\n")
    }

    /// Auto offset of X, Y or R (`AOFF`).
    pub fn auto_offset(&mut self, channel: OffsetChannel) -> GpibResult<()> {
        self.send(&format!("AOFF{}\n", channel.code()))
    }

    // Data storage

    /// Sample rate index, 0 (62.5 mHz) through 13 (512 Hz), 14 = trigger.
    pub fn sample_rate(&mut self) -> GpibResult<u8> {
        self.query_value("sample rate", "SRAT?\n")
    }

    /// Sample rate index, 0..=14.
    pub fn set_sample_rate(&mut self, index: u8) -> GpibResult<()> {
        let index = check_range("sample rate", index, 0..=14)?;
        self.send(&format!("SRAT{}\n", index))
    }

    /// End of buffer mode (`SEND?`).
    pub fn end_of_buffer(&mut self) -> GpibResult<EndOfBuffer> {
        self.query_code("end of buffer mode", "SEND?\n", EndOfBuffer::from_code)
    }

    /// Single shot or loop storage.
    pub fn set_end_of_buffer(&mut self, mode: EndOfBuffer) -> GpibResult<()> {
        self.send(&format!("SEND{}\n", mode.code()))
    }

    /// Software trigger (`TRIG`).
    pub fn software_trigger(&mut self) -> GpibResult<()> {
        self.send("TRIG\n")
    }

    /// Whether a trigger starts the scan (`TSTR?`).
    pub fn trigger_starts_scan(&mut self) -> GpibResult<bool> {
        self.query_flag("trigger start mode", "TSTR?\n")
    }

    /// Let a trigger start the scan.
    pub fn set_trigger_starts_scan(&mut self, on: bool) -> GpibResult<()> {
        self.send(&format!("TSTR{}\n", u8::from(on)))
    }

    /// Start or resume data storage (`STRT`).
    pub fn start_storage(&mut self) -> GpibResult<()> {
        self.send("STRT\n")
    }

    /// Pause data storage (`PAUS`).
    pub fn pause_storage(&mut self) -> GpibResult<()> {
        self.send("PAUS\n")
    }

    /// Reset the data buffers (`REST`).
    pub fn reset_buffer(&mut self) -> GpibResult<()> {
        self.send("REST\n")
    }

    // Data transfer

    /// Current value of X, Y, R or θ (`OUTP?`).
    pub fn read_output(&mut self, output: Output) -> GpibResult<f64> {
        self.query_value("output value", &format!("OUTP?{}\n", output.code()))
    }

    /// Current value of a display channel (`OUTR?`).
    pub fn read_display(&mut self, channel: Channel) -> GpibResult<f64> {
        self.query_value("display value", &format!("OUTR?{}\n", channel.code()))
    }

    /// Read 2..=6 parameters at the same instant.
    ///
    /// Ids: 1 X, 2 Y, 3 R, 4 θ, 5..=8 aux in 1..=4, 9 reference frequency,
    /// 10 CH1 display, 11 CH2 display.
    pub fn snap(&mut self, ids: &[u8]) -> GpibResult<Vec<f64>> {
        let command = snap_command(ids)?;
        let raw = self.query_raw(&command)?;
        let values = parse_float_list("snap values", &raw)?;
        if values.len() != ids.len() {
            return Err(GpibError::parse("snap values", raw));
        }
        Ok(values)
    }

    /// Number of points stored in the buffer.
    pub fn buffer_len(&mut self) -> GpibResult<u32> {
        self.query_value("stored point count", "SPTS?\n")
    }

    /// `count` buffered points from `start` as ASCII floats.
    pub fn buffer_ascii(&mut self, channel: Channel, start: u32, count: u32) -> GpibResult<Vec<f64>> {
        let raw = self.query_raw(&format!("TRCA?{},{},{}\n", channel.code(), start, count))?;
        parse_float_list("buffer values", &raw)
    }

    /// Buffered points in IEEE float format, unparsed.
    pub fn buffer_ieee_raw(&mut self, channel: Channel, start: u32, count: u32) -> GpibResult<String> {
        self.query_raw(&format!("TRCB?{},{},{}\n", channel.code(), start, count))
    }

    /// Buffered points in the non-IEEE (LIA) float format, unparsed.
    pub fn buffer_lia_raw(&mut self, channel: Channel, start: u32, count: u32) -> GpibResult<String> {
        self.query_raw(&format!("TRCL?{},{},{}\n", channel.code(), start, count))
    }

    /// Fast transfer mode: 0 = off, 1 = DOS, 2 = Windows.
    pub fn fast_transfer(&mut self) -> GpibResult<u8> {
        self.query_value("fast transfer mode", "FAST?\n")
    }

    /// Fast transfer mode, 0..=2.
    pub fn set_fast_transfer(&mut self, mode: u8) -> GpibResult<()> {
        let mode = check_range("fast transfer mode", mode, 0..=2)?;
        self.send(&format!("FAST{}\n", mode))
    }

    /// Start a scan after fast transfer is armed (`STRD`).
    pub fn start_fast_scan(&mut self) -> GpibResult<()> {
        self.send("STRD\n")
    }

    // Interface

    /// Reset to the default configuration (`*RST`).
    pub fn reset(&mut self) -> GpibResult<()> {
        self.send("*RST\n")
    }

    /// Identification string (`*IDN?`), trimmed.
    pub fn identity(&mut self) -> GpibResult<String> {
        Ok(self.query_raw("*IDN?\n")?.trim().to_string())
    }

    /// 0 = local, 1 = remote, 2 = local lockout.
    pub fn local_mode(&mut self) -> GpibResult<u8> {
        self.query_value("local mode", "LOCL?\n")
    }

    /// Local/remote state, 0..=2.
    pub fn set_local_mode(&mut self, mode: u8) -> GpibResult<()> {
        let mode = check_range("local mode", mode, 0..=2)?;
        self.send(&format!("LOCL{}\n", mode))
    }

    /// GPIB override remote state (`OVRM?`).
    pub fn gpib_override(&mut self) -> GpibResult<bool> {
        self.query_flag("GPIB override", "OVRM?\n")
    }

    /// Set the GPIB override remote state.
    pub fn set_gpib_override(&mut self, on: bool) -> GpibResult<()> {
        self.send(&format!("OVRM{}\n", u8::from(on)))
    }

    // Status reporting

    /// Clear all status registers (`*CLS`).
    pub fn clear_status(&mut self) -> GpibResult<()> {
        self.send("*CLS\n")
    }

    fn register(&mut self, keyword: &str) -> GpibResult<u8> {
        self.query_value("status register", &format!("{}?\n", keyword))
    }

    fn register_bit(&mut self, keyword: &str, bit: u8) -> GpibResult<bool> {
        let bit = check_bit(bit)?;
        self.query_flag("status bit", &format!("{}?{}\n", keyword, bit))
    }

    fn set_register(&mut self, keyword: &str, value: u8) -> GpibResult<()> {
        self.send(&format!("{}{}\n", keyword, value))
    }

    fn set_register_bit(&mut self, keyword: &str, bit: u8, on: bool) -> GpibResult<()> {
        let bit = check_bit(bit)?;
        self.send(&format!("{}{},{}\n", keyword, bit, u8::from(on)))
    }

    /// Standard event enable register (`*ESE?`).
    pub fn standard_event_enable(&mut self) -> GpibResult<StandardEventStatus> {
        self.register("*ESE").map(StandardEventStatus::from_bits_retain)
    }

    /// One bit of the standard event enable register.
    pub fn standard_event_enable_bit(&mut self, bit: u8) -> GpibResult<bool> {
        self.register_bit("*ESE", bit)
    }

    /// Write the standard event enable register.
    pub fn set_standard_event_enable(&mut self, mask: StandardEventStatus) -> GpibResult<()> {
        self.set_register("*ESE", mask.bits())
    }

    /// Set or clear one standard event enable bit.
    pub fn set_standard_event_enable_bit(&mut self, bit: u8, on: bool) -> GpibResult<()> {
        self.set_register_bit("*ESE", bit, on)
    }

    /// Reading the register clears it on the instrument.
    pub fn standard_event_status(&mut self) -> GpibResult<StandardEventStatus> {
        self.register("*ESR").map(StandardEventStatus::from_bits_retain)
    }

    /// One bit of the standard event status register.
    pub fn standard_event_status_bit(&mut self, bit: u8) -> GpibResult<bool> {
        self.register_bit("*ESR", bit)
    }

    /// Status byte as reported by the instrument (`*STB?`), not the bus poll.
    pub fn serial_poll_status(&mut self) -> GpibResult<SerialPollStatus> {
        self.register("*STB").map(SerialPollStatus::from_bits_retain)
    }

    /// One bit of the status byte (`*STB?i`).
    pub fn serial_poll_status_bit(&mut self, bit: u8) -> GpibResult<bool> {
        self.register_bit("*STB", bit)
    }

    /// Power-on status clear flag (`*PSC?`).
    pub fn power_on_status_clear(&mut self) -> GpibResult<bool> {
        self.query_flag("power-on status clear", "*PSC?\n")
    }

    /// Set the power-on status clear flag.
    pub fn set_power_on_status_clear(&mut self, on: bool) -> GpibResult<()> {
        self.send(&format!("*PSC{}\n", u8::from(on)))
    }

    /// Error status enable register (`ERRE?`).
    pub fn error_status_enable(&mut self) -> GpibResult<ErrorStatus> {
        self.register("ERRE").map(ErrorStatus::from_bits_retain)
    }

    /// One bit of the error status enable register.
    pub fn error_status_enable_bit(&mut self, bit: u8) -> GpibResult<bool> {
        self.register_bit("ERRE", bit)
    }

    /// Write the error status enable register.
    pub fn set_error_status_enable(&mut self, mask: ErrorStatus) -> GpibResult<()> {
        self.set_register("ERRE", mask.bits())
    }

    /// Set or clear one error status enable bit.
    pub fn set_error_status_enable_bit(&mut self, bit: u8, on: bool) -> GpibResult<()> {
        self.set_register_bit("ERRE", bit, on)
    }

    /// Error status register (`ERRS?`).
    pub fn error_status(&mut self) -> GpibResult<ErrorStatus> {
        self.register("ERRS").map(ErrorStatus::from_bits_retain)
    }

    /// One bit of the error status register.
    pub fn error_status_bit(&mut self, bit: u8) -> GpibResult<bool> {
        self.register_bit("ERRS", bit)
    }

    /// Lock-in status enable register (`LIAE?`).
    pub fn lia_status_enable(&mut self) -> GpibResult<LiaStatus> {
        self.register("LIAE").map(LiaStatus::from_bits_retain)
    }

    /// One bit of the lock-in status enable register.
    pub fn lia_status_enable_bit(&mut self, bit: u8) -> GpibResult<bool> {
        self.register_bit("LIAE", bit)
    }

    /// Write the lock-in status enable register.
    pub fn set_lia_status_enable(&mut self, mask: LiaStatus) -> GpibResult<()> {
        self.set_register("LIAE", mask.bits())
    }

    /// Set or clear one lock-in status enable bit.
    pub fn set_lia_status_enable_bit(&mut self, bit: u8, on: bool) -> GpibResult<()> {
        self.set_register_bit("LIAE", bit, on)
    }

    /// Lock-in status register (`LIAS?`).
    pub fn lia_status(&mut self) -> GpibResult<LiaStatus> {
        self.register("LIAS").map(LiaStatus::from_bits_retain)
    }

    /// One bit of the lock-in status register.
    pub fn lia_status_bit(&mut self, bit: u8) -> GpibResult<bool> {
        self.register_bit("LIAS", bit)
    }
}

/// Build a `SNAP?` command for 2..=6 parameter ids in 1..=11.
pub fn snap_command(ids: &[u8]) -> GpibResult<String> {
    if !(2..=6).contains(&ids.len()) {
        return Err(GpibError::invalid(
            "snap parameter count",
            ids.len(),
            "must be 2..=6",
        ));
    }
    let fields = ids
        .iter()
        .map(|&id| check_range("snap parameter", id, 1..=11).map(|id| id.to_string()))
        .collect::<GpibResult<Vec<_>>>()?;
    Ok(format!("SNAP?{}\n", fields.join(",")))
}
