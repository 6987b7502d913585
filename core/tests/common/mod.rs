//! Shared test fixtures: a synthetic ROM image builder that plants the
//! catalog, indices, track bodies, and the opcode idioms the identifier
//! probes for, plus recording stream-decoder and host doubles.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use backbox_core::FRAME_SAMPLES;
use backbox_core::decoder::Decoder;
use backbox_core::host::Host;
use backbox_core::rom::{RomPointer, RomSet, checksum};
use backbox_core::stream::{FrameStatus, StreamDecoder};

/// Software variant to fabricate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Os {
    Os93a,
    Os93b,
    Os94,
    Os95,
}

const U2_SIZE: usize = 0x10000; // 64 KiB = 16 4K units

// layout offsets relative to the catalog base
const TRACK_INDEX: u32 = 0x100;
const INDIRECT_INDEX: u32 = 0x500;
const TABLES: u32 = 0x580;
const BODIES: u32 = 0x800;
const STREAMS: u32 = 0x1000;

/// Builds a U2 image (plus optional extra chips) that the identifier,
/// catalog reader, and engine accept as a real ROM set.
pub struct RomBuilder {
    os: Os,
    signature: String,
    /// Plant the channel-count idiom with this count (and the matching
    /// mask). `None` leaves the count undetectable.
    channels: Option<u32>,
    /// Plant the embedded version idiom (Os95 only).
    nominal_version: Option<u16>,
    tracks: Vec<Option<Vec<u8>>>,
    tables: Vec<Option<Vec<u16>>>,
    stream_data: Vec<u8>,
    stream_addrs: Vec<u32>,
    extra_chips: Vec<(usize, Vec<u8>)>,
}

impl RomBuilder {
    pub fn new(os: Os) -> Self {
        Self {
            os,
            signature: "Test Fixture Sounds".to_string(),
            channels: Some(6),
            nominal_version: None,
            tracks: Vec::new(),
            tables: Vec::new(),
            stream_data: Vec::new(),
            stream_addrs: Vec::new(),
            extra_chips: Vec::new(),
        }
    }

    pub fn signature(mut self, text: &str) -> Self {
        self.signature = text.to_string();
        self
    }

    pub fn channels(mut self, channels: Option<u32>) -> Self {
        self.channels = channels;
        self
    }

    pub fn nominal_version(mut self, version: u16) -> Self {
        self.nominal_version = Some(version);
        self
    }

    fn catalog_base(&self) -> u32 {
        if self.os == Os::Os95 { 0x6000 } else { 0x4000 }
    }

    /// Add a stream object with the given header frame count; returns
    /// its linear ROM address.
    pub fn add_stream(&mut self, frames: u16) -> u32 {
        let addr = self.catalog_base() + STREAMS + self.stream_data.len() as u32;
        self.stream_data.extend_from_slice(&frames.to_be_bytes());
        // a little opaque payload, as a real stream would have
        self.stream_data.extend_from_slice(&[0xA5; 6]);
        self.stream_addrs.push(addr);
        addr
    }

    /// Add a track body (type byte, channel byte, payload); returns its
    /// track number.
    pub fn add_track(&mut self, body: Vec<u8>) -> u16 {
        self.tracks.push(Some(body));
        (self.tracks.len() - 1) as u16
    }

    /// Add an absent track index entry (high byte 0xFF).
    pub fn add_absent_track(&mut self) -> u16 {
        self.tracks.push(None);
        (self.tracks.len() - 1) as u16
    }

    /// Add a deferred-indirect table; returns its table number.
    pub fn add_table(&mut self, tracks: Vec<u16>) -> u8 {
        self.tables.push(Some(tracks));
        (self.tables.len() - 1) as u8
    }

    /// Add an absent deferred-indirect index entry.
    pub fn add_absent_table(&mut self) -> u8 {
        self.tables.push(None);
        (self.tables.len() - 1) as u8
    }

    /// Add an extra chip image (chip number 3..9). The image length
    /// must be a power of two and a multiple of 4096.
    pub fn add_chip(&mut self, chip_no: usize, data: Vec<u8>) {
        self.extra_chips.push((chip_no, data));
    }

    /// Assemble the chip images, (chip number, bytes) pairs.
    pub fn build_images(&self) -> Vec<(usize, Vec<u8>)> {
        let mut u2 = vec![0xFFu8; U2_SIZE];
        let cat = self.catalog_base();

        // reset vector: a JUMP instruction, then the signature
        u2[0..4].copy_from_slice(&[0x18, 0x00, 0x0F, 0x00]);
        let sig = self.signature.as_bytes();
        u2[4..4 + sig.len()].copy_from_slice(sig);
        u2[4 + sig.len()] = 0;

        // planted opcode idioms
        match self.os {
            Os::Os93a => {
                plant_cells(&mut u2, 0x1400, &[0x380026, 0x3C1005, 0x0C00C0]);
                plant_cells(&mut u2, 0x2800, &[0x47FFF2, 0x47C946]);
            }
            Os::Os93b => {
                plant_cells(&mut u2, 0x1400, &[0x380026, 0x3C1005, 0x0C00C0]);
            }
            Os::Os94 => {}
            Os::Os95 => {
                if let Some(v) = self.nominal_version {
                    let load = 0x40000E | (u32::from(v) << 4);
                    plant_cells(
                        &mut u2,
                        0x2C00,
                        &[
                            load, 0x0F16F8, 0x93300E, 0x18000F, load, 0x0F1608, 0x0F16F8,
                            0x93300E, 0x18000F,
                        ],
                    );
                }
            }
        }
        if let Some(n) = self.channels {
            let mask = (1u32 << n) - 1;
            plant_cells(
                &mut u2,
                0x1800,
                &[
                    0x22200F,
                    0x400004 | (n << 4),
                    0x26E20F,
                    0x221800,
                    0x90000A,
                    0x80000A,
                    0x400004 | (mask << 4),
                    0x26E20F,
                    0x180001,
                ],
            );
        }

        // ROM index: U2's own entry first (chip select and checksum are
        // zero by convention; the image is neutralized below to make
        // its real checksum zero too), then the extra chips, then the
        // zero-size terminator
        let mut index = cat as usize;
        put_u16(&mut u2, index, (U2_SIZE / 4096) as u16);
        put_u16(&mut u2, index + 2, 0);
        put_u16(&mut u2, index + 4, 0);
        index += 6;
        for (chip_no, data) in &self.extra_chips {
            let chip_select = (chip_no - 2) as u16;
            let stored = if self.os == Os::Os95 {
                chip_select << 1
            } else {
                chip_select
            };
            put_u16(&mut u2, index, (data.len() / 4096) as u16);
            put_u16(&mut u2, index + 2, stored << 8);
            put_u16(&mut u2, index + 4, checksum(data));
            index += 6;
        }
        put_u16(&mut u2, index, 0);

        // catalog pointers and track count
        put_u24(&mut u2, (cat + 0x40) as usize, cat + TRACK_INDEX);
        put_u24(&mut u2, (cat + 0x43) as usize, cat + INDIRECT_INDEX);
        put_u16(&mut u2, (cat + 0x46) as usize, self.tracks.len() as u16);

        // track index and bodies
        let mut body_at = cat + BODIES;
        for (i, track) in self.tracks.iter().enumerate() {
            let entry = (cat + TRACK_INDEX) as usize + i * 3;
            match track {
                None => put_u24(&mut u2, entry, 0xFF_FFFF),
                Some(body) => {
                    put_u24(&mut u2, entry, body_at);
                    u2[body_at as usize..body_at as usize + body.len()].copy_from_slice(body);
                    body_at += body.len() as u32;
                }
            }
        }

        // deferred-indirect index and tables
        let mut table_at = cat + TABLES;
        for (i, table) in self.tables.iter().enumerate() {
            let entry = (cat + INDIRECT_INDEX) as usize + i * 3;
            match table {
                None => put_u24(&mut u2, entry, 0xFF_FFFF),
                Some(tracks) => {
                    put_u24(&mut u2, entry, table_at);
                    for track in tracks {
                        put_u16(&mut u2, table_at as usize, *track);
                        table_at += 2;
                    }
                }
            }
        }

        // streams
        let streams_at = (cat + STREAMS) as usize;
        u2[streams_at..streams_at + self.stream_data.len()].copy_from_slice(&self.stream_data);

        // Neutralize the image checksum to 0x0000 (matching the zero in
        // the index entry) with two compensation bytes at the top.
        u2[U2_SIZE - 2] = 0;
        u2[U2_SIZE - 1] = 0;
        let current = checksum(&u2);
        u2[U2_SIZE - 2] = ((current >> 8) as u8).wrapping_neg();
        u2[U2_SIZE - 1] = (current as u8).wrapping_neg();
        debug_assert_eq!(checksum(&u2), 0);

        let mut images = vec![(2usize, u2)];
        for (chip_no, data) in &self.extra_chips {
            images.push((*chip_no, data.clone()));
        }
        images
    }

    /// Assemble the images into a [`RomSet`].
    pub fn build(&self) -> RomSet {
        let mut roms = RomSet::new();
        for (chip_no, data) in self.build_images() {
            roms.add_rom(chip_no, data);
        }
        roms
    }
}

/// Write 24-bit opcode cells (4 bytes each, big-endian value plus an
/// unused pad byte) at a byte offset.
fn plant_cells(u2: &mut [u8], byte_offset: usize, cells: &[u32]) {
    for (i, cell) in cells.iter().enumerate() {
        let at = byte_offset + i * 4;
        u2[at] = (cell >> 16) as u8;
        u2[at + 1] = (cell >> 8) as u8;
        u2[at + 2] = *cell as u8;
        u2[at + 3] = 0xFF;
    }
}

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_be_bytes());
}

fn put_u24(buf: &mut [u8], at: usize, value: u32) {
    buf[at] = (value >> 16) as u8;
    buf[at + 1] = (value >> 8) as u8;
    buf[at + 2] = value as u8;
}

/// A filler chip image with deterministic contents.
pub fn filler_chip(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

// ---------------------------------------------------------------------------
// Track program helpers
// ---------------------------------------------------------------------------

/// Assemble a track body from a type code, a channel, and a payload.
pub fn body(track_type: u8, channel: u8, payload: &[u8]) -> Vec<u8> {
    let mut v = vec![track_type, channel];
    v.extend_from_slice(payload);
    v
}

/// Assemble one program instruction: delay prefix, opcode, operands.
pub fn op(delay: u16, opcode: u8, operands: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(3 + operands.len());
    v.extend_from_slice(&delay.to_be_bytes());
    v.push(opcode);
    v.extend_from_slice(operands);
    v
}

/// The operand bytes of a PlayStream instruction.
pub fn play_ops(channel: u8, stream_addr: u32, repeat: u8) -> [u8; 5] {
    [
        channel,
        (stream_addr >> 16) as u8,
        (stream_addr >> 8) as u8,
        stream_addr as u8,
        repeat,
    ]
}

// ---------------------------------------------------------------------------
// Recording collaborators
// ---------------------------------------------------------------------------

/// Events recorded by [`TestStreams`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Load { channel: usize, offset: u32, level: u8 },
    Clear { channel: usize },
    Frame { channel: usize, level: u8 },
}

#[derive(Default)]
pub struct StreamLog {
    pub events: Vec<StreamEvent>,
    /// Remaining frames per channel, from each stream's header.
    pub remaining: [Option<u16>; 8],
    /// Sample value emitted while a stream is bound.
    pub fill: i16,
}

/// A stream decoder double: honors the header frame count, fills frames
/// with a constant value, and records every call.
pub struct TestStreams(pub Rc<RefCell<StreamLog>>);

impl TestStreams {
    pub fn new_with_fill(fill: i16) -> (Box<dyn StreamDecoder>, Rc<RefCell<StreamLog>>) {
        let log = Rc::new(RefCell::new(StreamLog {
            fill,
            ..StreamLog::default()
        }));
        (Box::new(TestStreams(log.clone())), log)
    }

    pub fn new() -> (Box<dyn StreamDecoder>, Rc<RefCell<StreamLog>>) {
        Self::new_with_fill(1000)
    }
}

impl StreamDecoder for TestStreams {
    fn load(&mut self, roms: &RomSet, channel: usize, start: RomPointer, level: u8) {
        let mut log = self.0.borrow_mut();
        log.remaining[channel] = Some(start.peek_u16(roms));
        log.events.push(StreamEvent::Load {
            channel,
            offset: start.offset,
            level,
        });
    }

    fn clear(&mut self, channel: usize) {
        let mut log = self.0.borrow_mut();
        log.remaining[channel] = None;
        log.events.push(StreamEvent::Clear { channel });
    }

    fn next_frame(
        &mut self,
        _roms: &RomSet,
        channel: usize,
        out: &mut [i16; FRAME_SAMPLES],
        level: u8,
    ) -> FrameStatus {
        let mut log = self.0.borrow_mut();
        out.fill(log.fill);
        log.events.push(StreamEvent::Frame { channel, level });
        let Some(remaining) = log.remaining[channel].as_mut() else {
            return FrameStatus::Done;
        };
        if *remaining > 0 {
            *remaining -= 1;
        }
        if *remaining == 0 {
            FrameStatus::Done
        } else {
            FrameStatus::Playing
        }
    }
}

#[derive(Default)]
pub struct HostLog {
    /// Status bytes received from the decoder, in order.
    pub received: Vec<u8>,
    pub clears: u32,
    /// Boot timer control calls, in order.
    pub timer: Vec<bool>,
}

/// A host double that records everything.
pub struct TestHost(pub Rc<RefCell<HostLog>>);

impl TestHost {
    pub fn new() -> (Box<dyn Host>, Rc<RefCell<HostLog>>) {
        let log = Rc::new(RefCell::new(HostLog::default()));
        (Box::new(TestHost(log.clone())), log)
    }
}

impl Host for TestHost {
    fn receive_data_port(&mut self, data: u8) {
        self.0.borrow_mut().received.push(data);
    }

    fn clear_data_port(&mut self) {
        self.0.borrow_mut().clears += 1;
    }

    fn boot_timer_control(&mut self, set: bool) {
        self.0.borrow_mut().timer.push(set);
    }
}

// ---------------------------------------------------------------------------
// Decoder wiring
// ---------------------------------------------------------------------------

/// Build a decoder over the given ROM images with recording doubles.
#[allow(clippy::type_complexity)]
pub fn decoder_for(
    builder: &RomBuilder,
) -> (Decoder, Rc<RefCell<StreamLog>>, Rc<RefCell<HostLog>>) {
    let (streams, stream_log) = TestStreams::new();
    let (host, host_log) = TestHost::new();
    let mut decoder = Decoder::new(streams, host);
    for (chip_no, data) in builder.build_images() {
        decoder.add_rom(chip_no, data);
    }
    (decoder, stream_log, host_log)
}

/// Pull `n` samples, discarding them.
pub fn pull(decoder: &mut Decoder, n: usize) {
    for _ in 0..n {
        decoder.get_next_sample();
    }
}
