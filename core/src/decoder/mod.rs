//! The boot and output state machine.
//!
//! Wraps the playback engine with everything the surrounding hardware
//! did: the 250 ms hard-boot window, the power-on self test and its
//! startup bong, the soft-boot path into the running decoder, and the
//! sample pull interface with self-reset recovery.

mod bong;

use std::fmt;

use crate::FRAME_SAMPLES;
use crate::catalog::{Catalog, TrackInfo};
use crate::engine::{Engine, EngineCtx};
use crate::host::Host;
use crate::ident::{self, HwVersion, Identification, OsVersion};
use crate::rom::RomSet;
use crate::stream::StreamDecoder;
use crate::track::Decompiler;

use bong::Bong;

/// Samples spent in the hard-boot window: 250 ms at the fixed rate.
pub const HARD_BOOT_SAMPLES: u32 = 7812;

/// Samples per startup bong repetition, about 750 ms.
pub const BONG_SAMPLES: u32 = 23_437;

/// Consecutive self-resets tolerated before giving up.
const MAX_CONSECUTIVE_RESETS: u32 = 3;

/// Master volume applied after a soft boot when the host never sends a
/// volume command.
const DEFAULT_VOLUME: u8 = 0x67;

/// Why a soft boot failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootError {
    /// No U2 image was added; nothing can run without it.
    MissingRom,
    /// U2 is present but holds no recognizable catalog.
    CatalogNotFound,
    /// The identification probes matched no known software variant.
    SoftwareNotRecognized,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRom => write!(f, "ROM U2 is missing"),
            Self::CatalogNotFound => write!(f, "no catalog found in ROM U2"),
            Self::SoftwareNotRecognized => {
                write!(f, "the ROM software version was not recognized")
            }
        }
    }
}

impl std::error::Error for BootError {}

/// Decoder lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// In the 250 ms post-reset window, watching the data port.
    HardBoot,
    /// Playing the startup bong.
    Bong,
    /// Decoding normally.
    Running,
    /// Halted after repeated run-time decode failures.
    DecoderFatalError,
    /// Halted because a soft boot failed.
    InitializationError,
}

/// A complete decoder instance: the ROM set, the playback engine, and
/// the boot/output state machine around them.
///
/// Instances are independent; any number can coexist in a process.
pub struct Decoder {
    roms: RomSet,
    ident: Identification,
    catalog: Option<Catalog>,
    engine: Engine,
    streams: Box<dyn StreamDecoder>,
    host: Box<dyn Host>,

    state: DecoderState,
    error_message: String,

    /// Samples spent in the current HardBoot/Bong mode.
    mode_samples: u32,
    bong: Bong,
    bong_count: u8,
    fast_boot: bool,
    default_volume: u8,

    frame: [i16; FRAME_SAMPLES],
    frame_pos: usize,
    consecutive_resets: u32,
}

impl Decoder {
    /// Create a decoder around a stream decoder and a host interface.
    /// Add the ROM images next, then call [`hard_boot`](Self::hard_boot)
    /// (or [`soft_boot`](Self::soft_boot) to skip the boot sequence).
    pub fn new(streams: Box<dyn StreamDecoder>, host: Box<dyn Host>) -> Self {
        Self {
            roms: RomSet::new(),
            ident: Identification::default(),
            catalog: None,
            engine: Engine::new(0),
            streams,
            host,
            state: DecoderState::HardBoot,
            error_message: String::new(),
            mode_samples: 0,
            bong: Bong::new(),
            bong_count: 0,
            fast_boot: false,
            default_volume: DEFAULT_VOLUME,
            frame: [0; FRAME_SAMPLES],
            frame_pos: FRAME_SAMPLES,
            consecutive_resets: 0,
        }
    }

    // -- ROM setup -----------------------------------------------------------

    /// Add a ROM image; `chip_no` is 2..9 for chips U2..U9.
    pub fn add_rom(&mut self, chip_no: usize, data: Vec<u8>) {
        self.roms.add_rom(chip_no, data);
    }

    pub fn rom_set(&self) -> &RomSet {
        &self.roms
    }

    /// Validate the loaded ROM set against the index in U2. See
    /// [`ident::check_roms`] for the status codes.
    pub fn check_roms(&self) -> u8 {
        ident::check_roms(&self.roms)
    }

    pub fn signature(&self) -> Option<&str> {
        self.roms.signature()
    }

    pub fn ident(&self) -> &Identification {
        &self.ident
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    /// Track details, available once the decoder has booted.
    pub fn track_info(&self, track: u16) -> Option<TrackInfo> {
        self.catalog
            .as_ref()
            .and_then(|c| c.track_info(&self.roms, &self.ident, track))
    }

    /// A decompiler view over the loaded ROM set, available once the
    /// decoder has booted.
    pub fn decompiler(&self) -> Option<Decompiler<'_>> {
        self.catalog
            .as_ref()
            .map(|c| Decompiler::new(&self.roms, &self.ident, c))
    }

    // -- state ---------------------------------------------------------------

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// False once the decoder has halted with an error.
    pub fn is_ok(&self) -> bool {
        !matches!(
            self.state,
            DecoderState::DecoderFatalError | DecoderState::InitializationError
        )
    }

    /// True when boot has completed and decoding is live.
    pub fn is_running(&self) -> bool {
        self.state == DecoderState::Running
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    // -- configuration -------------------------------------------------------

    /// Skip the startup bong after the self tests.
    pub fn set_fast_boot(&mut self, fast: bool) {
        self.fast_boot = fast;
    }

    /// Master volume to apply automatically after every soft boot. The
    /// original boards had no non-volatile storage and relied on the
    /// host to send a volume command after each reset; this spares
    /// embedding hosts that chore.
    pub fn set_default_volume(&mut self, volume: u8) {
        self.default_volume = volume;
    }

    /// Change the master volume now, exactly as the 55 AA host command
    /// sequence would.
    pub fn set_master_volume(&mut self, volume: u8) {
        self.engine.set_master_volume(volume);
    }

    pub fn master_volume(&self) -> u8 {
        self.engine.master_volume()
    }

    // -- boot flow -----------------------------------------------------------

    /// Begin the hard-boot sequence: clear both data-port directions and
    /// open the 250 ms window during which a host byte soft-boots
    /// immediately. The window closes via the host's boot timer or
    /// after [`HARD_BOOT_SAMPLES`] pulled samples, whichever comes
    /// first.
    pub fn hard_boot(&mut self) {
        self.state = DecoderState::HardBoot;
        self.engine.clear_data_port();
        self.host.clear_data_port();
        self.mode_samples = 0;
        self.host.boot_timer_control(true);
    }

    /// Close the hard-boot window and run the power-on self tests:
    /// validate the ROM set, report `0x79` plus the status code to the
    /// host, then play the bong (once per status count) or, in
    /// fast-boot mode, go straight to the decoder.
    pub fn start_self_tests(&mut self) {
        self.host.boot_timer_control(false);
        if self.state != DecoderState::HardBoot {
            return;
        }

        self.ident = Identification::detect(&self.roms);
        let status = ident::check_roms(&self.roms);
        self.host.receive_data_port(0x79);
        self.host.receive_data_port(status);
        log::info!("self tests complete, status {status:#04x}");

        if self.fast_boot {
            self.soft_boot();
        } else {
            self.bong.start();
            self.bong_count = status;
            self.mode_samples = 0;
            self.state = DecoderState::Bong;
        }
    }

    /// Reset into the running decoder: re-identify the ROMs if needed,
    /// reset all channel and variable state, and apply the default
    /// volume. On failure the decoder lands in
    /// [`DecoderState::InitializationError`].
    pub fn soft_boot(&mut self) {
        self.host.boot_timer_control(false);

        if self.ident.hw == HwVersion::Unknown {
            self.ident = Identification::detect(&self.roms);
        }

        match self.initialize() {
            Ok(()) => {
                self.state = DecoderState::Running;
            }
            Err(e) => {
                log::error!("soft boot failed: {e}");
                self.error_message = e.to_string();
                self.state = DecoderState::InitializationError;
            }
        }

        // the frame buffer is empty until the first decode
        self.frame_pos = FRAME_SAMPLES;
    }

    fn initialize(&mut self) -> Result<(), BootError> {
        if !self.roms.is_populated(0) {
            return Err(BootError::MissingRom);
        }
        let catalog = Catalog::read(&self.roms).ok_or(BootError::CatalogNotFound)?;
        if self.ident.os == OsVersion::Unknown {
            return Err(BootError::SoftwareNotRecognized);
        }

        let n_channels = match self.ident.channels {
            0 => {
                log::warn!("channel count not detected, assuming 6");
                6
            }
            n => n,
        };

        self.engine
            .soft_reset(self.streams.as_mut(), n_channels, self.default_volume);
        self.catalog = Some(catalog);
        Ok(())
    }

    // -- data port -----------------------------------------------------------

    /// Write a byte from the host. During the hard-boot window this
    /// short-circuits straight into a soft boot (the byte itself is not
    /// queued); otherwise the byte joins the FIFO command queue drained
    /// on the next sample pull.
    pub fn write_data_port(&mut self, byte: u8) {
        if self.state == DecoderState::HardBoot {
            self.soft_boot();
            return;
        }
        self.engine.write_data_port(byte);
    }

    /// Drop any queued host bytes.
    pub fn clear_data_port(&mut self) {
        self.engine.clear_data_port();
    }

    // -- sample output -------------------------------------------------------

    /// Pull the next output sample. This is the decoder's clock: the
    /// boot window and the bong advance by sample count, and in the
    /// running state each pull first drains the host command queue,
    /// then refills the frame buffer when it runs dry.
    pub fn get_next_sample(&mut self) -> i16 {
        match self.state {
            DecoderState::HardBoot => {
                // the 250 ms data-port watch loop, counted in samples
                self.mode_samples += 1;
                if self.mode_samples >= HARD_BOOT_SAMPLES {
                    self.start_self_tests();
                }
                0
            }

            DecoderState::Bong => {
                self.mode_samples += 1;
                if self.mode_samples >= BONG_SAMPLES {
                    self.bong_count = self.bong_count.saturating_sub(1);
                    if self.bong_count == 0 {
                        self.soft_boot();
                    } else {
                        // audible status codes: one bong per count
                        self.bong.start();
                        self.mode_samples = 0;
                    }
                }
                self.bong.next_sample()
            }

            DecoderState::Running => self.next_running_sample(),

            DecoderState::DecoderFatalError | DecoderState::InitializationError => 0,
        }
    }

    fn next_running_sample(&mut self) -> i16 {
        let Some(catalog) = self.catalog else {
            // can't happen after a successful soft boot
            return 0;
        };

        // commands first, so a track started this pull is decoding by
        // the time the buffer refills
        let mut ctx = EngineCtx {
            roms: &self.roms,
            ident: &self.ident,
            catalog: &catalog,
            streams: self.streams.as_mut(),
            host: self.host.as_mut(),
        };
        self.engine.run_commands(&mut ctx);

        if self.frame_pos >= FRAME_SAMPLES {
            // A decode fault unwinds to here; the board answer is a
            // self-reset and another try. A refill that needed a reset
            // leaves the consecutive-reset count standing, so a ROM
            // that faults on every refill runs out of tries.
            let mut faulted = false;
            loop {
                let result = {
                    let mut ctx = EngineCtx {
                        roms: &self.roms,
                        ident: &self.ident,
                        catalog: &catalog,
                        streams: self.streams.as_mut(),
                        host: self.host.as_mut(),
                    };
                    self.engine.run_frame(&mut ctx, &mut self.frame)
                };
                match result {
                    Ok(()) => {
                        self.frame_pos = 0;
                        if !faulted {
                            self.consecutive_resets = 0;
                        }
                        break;
                    }
                    Err(fault) => {
                        faulted = true;
                        self.consecutive_resets += 1;
                        if self.consecutive_resets > MAX_CONSECUTIVE_RESETS {
                            self.state = DecoderState::DecoderFatalError;
                            self.error_message = format!(
                                "the decoder reset itself repeatedly while decoding track \
                                 data ({fault}); the ROM image is probably invalid or \
                                 corrupted"
                            );
                            log::error!("{}", self.error_message);
                            return 0;
                        }
                        log::warn!("decode fault ({fault}), soft-resetting");
                        self.soft_boot();
                        if self.state != DecoderState::Running {
                            return 0;
                        }
                    }
                }
            }
        }

        let sample = self.frame[self.frame_pos];
        self.frame_pos += 1;
        sample
    }
}
