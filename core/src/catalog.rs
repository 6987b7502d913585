//! The catalog and its indices.
//!
//! The catalog is a data structure in U2 describing the ROM set: which
//! chips are populated (with sizes and checksums), how many tracks the
//! set contains, and where the track index and the deferred-indirect
//! table index live.

use crate::ident::Identification;
use crate::rom::{RomPointer, RomSet};
use crate::track::operand_len;

/// Upper bound on instructions examined while sizing a track program.
/// Real programs are tiny; the bound only guards against walking
/// garbage data that never reaches a terminator.
const MAX_WALK_STEPS: usize = 0x1_0000;

/// Track type code, the first byte of every track body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackType {
    /// The track holds a byte-code program that runs when loaded.
    Program,
    /// The track holds a 16-bit defer code naming another track; it is
    /// armed on its channel and started later by opcode 0x05.
    Deferred,
    /// Like [`Deferred`](Self::Deferred), but the track to start is
    /// chosen at trigger time from a lookup table indexed by a variable.
    DeferredIndirect,
}

impl TrackType {
    fn from_code(code: u8) -> Option<TrackType> {
        match code {
            1 => Some(TrackType::Program),
            2 => Some(TrackType::Deferred),
            3 => Some(TrackType::DeferredIndirect),
            _ => None,
        }
    }
}

/// Details of one catalog track.
#[derive(Clone, Copy, Debug)]
pub struct TrackInfo {
    /// 24-bit linear ROM address of the track body.
    pub address: u32,
    /// Playback channel the track runs on.
    pub channel: u8,
    pub track_type: TrackType,
    /// For deferred tracks, the 16-bit defer code: a track number for
    /// type 2; variable index (high byte) and table index (low byte)
    /// for type 3. 0xFFFF for program tracks.
    pub defer_code: u16,
    /// Playback time in frames (one frame = 240 samples = 7.68 ms).
    /// For a looping track, the time of one iteration of the outermost
    /// loop.
    pub time: u32,
    /// Does the track loop forever? Only set for infinite loops, not
    /// for loops with a fixed repeat count.
    pub looping: bool,
}

/// The catalog location and the ROM-resident tables it points at.
#[derive(Clone, Copy, Debug)]
pub struct Catalog {
    /// Byte offset of the catalog in U2.
    pub offset: u32,
    /// Number of track index entries.
    pub n_tracks: u16,
    /// U2 byte offset of the track index (3-byte entries).
    pub track_index: u32,
    /// U2 byte offset of the deferred-indirect table index (3-byte
    /// entries).
    pub indirect_index: u32,
}

impl Catalog {
    /// Read the catalog tables from a ROM set whose catalog has been
    /// located. Returns `None` when U2 or the catalog is missing.
    pub fn read(roms: &RomSet) -> Option<Catalog> {
        let offset = roms.catalog_offset();
        if offset == 0 || !roms.is_populated(0) {
            return None;
        }
        Some(Catalog {
            offset,
            track_index: roms.read_u24(0, offset + 0x40),
            indirect_index: roms.read_u24(0, offset + 0x43),
            n_tracks: roms.read_u16(0, offset + 0x46),
        })
    }

    /// The highest valid track number.
    pub fn max_track_number(&self) -> u16 {
        self.n_tracks.saturating_sub(1)
    }

    /// Linear ROM address of a track body. `None` for out-of-range
    /// track numbers and for index entries with 0xFF in the high byte,
    /// which mark absent tracks.
    pub fn track_address(&self, roms: &RomSet, track: u16) -> Option<u32> {
        if track >= self.n_tracks {
            return None;
        }
        let addr = roms.read_u24(0, self.track_index + u32::from(track) * 3);
        if addr & 0x00FF_0000 == 0x00FF_0000 {
            return None;
        }
        Some(addr)
    }

    /// Look up a track and, for program tracks, statically size its
    /// playback time. Returns `None` for absent tracks and for bodies
    /// with an invalid type or channel.
    pub fn track_info(&self, roms: &RomSet, ident: &Identification, track: u16) -> Option<TrackInfo> {
        let addr = self.track_address(roms, track)?;
        let mut p = RomPointer::from_linear(addr, ident.hw);

        let track_type = TrackType::from_code(p.get_u8(roms))?;
        let channel = p.get_u8(roms);
        if channel > 7 {
            return None;
        }

        let mut info = TrackInfo {
            address: addr,
            channel,
            track_type,
            defer_code: 0xFFFF,
            time: 0,
            looping: false,
        };

        match track_type {
            TrackType::Deferred | TrackType::DeferredIndirect => {
                // Types 2 and 3 carry only the 16-bit defer code.
                info.defer_code = p.get_u16(roms);
            }
            TrackType::Program => {
                let (time, looping) = walk_program_time(roms, ident, p);
                info.time = time;
                info.looping = looping;
            }
        }
        Some(info)
    }
}

/// One loop level of the static timing walk.
#[derive(Clone, Copy, Default)]
struct TimeLevel {
    program_time: u32,
    /// Frame count of the most recent forever-looping stream started at
    /// this level. An infinite program wait audibly repeats this stream,
    /// so it becomes the effective loop iteration time.
    looping_stream_time: u32,
    n_loops: u8,
    looping: bool,
}

/// Walk a track program, accumulating the delay prefixes through the
/// loop structure to compute the total playback time and whether the
/// program loops forever.
fn walk_program_time(roms: &RomSet, ident: &Identification, mut p: RomPointer) -> (u32, bool) {
    // current loop level plus the stack of enclosing levels
    let mut top = TimeLevel {
        n_loops: 1,
        ..TimeLevel::default()
    };
    let mut outer: Vec<TimeLevel> = Vec::new();

    for _ in 0..MAX_WALK_STEPS {
        let counter = p.get_u16(roms);
        let opcode = p.get_u8(roms);

        // An infinite wait means the program can never proceed beyond
        // this point; it spins here with the last looping stream still
        // audible, so that stream's length is the iteration time.
        if counter == 0xFFFF {
            top.looping = true;
            top.program_time += top.looping_stream_time;
            break;
        }
        top.program_time += u32::from(counter);

        match opcode {
            0x00 => break,
            0x01 => {
                // play stream: channel, stream address, repeat count
                p.advance(1);
                let stream = RomPointer::from_linear(p.get_u24(roms), ident.hw);
                let repeat = p.get_u8(roms);

                // the first u16 of the stream is its frame count
                top.looping_stream_time = if repeat == 0 {
                    u32::from(stream.peek_u16(roms))
                } else {
                    0
                };
            }
            0x0E => {
                // push a loop level
                let n_loops = p.get_u8(roms);
                outer.push(top);
                top = TimeLevel {
                    n_loops,
                    looping: n_loops == 0,
                    ..TimeLevel::default()
                };
            }
            0x0F => {
                // pop a loop level and fold its time into the parent;
                // an unmatched loop end is tolerated as a no-op
                if let Some(mut parent) = outer.pop() {
                    let reps = if top.looping { 1 } else { u32::from(top.n_loops) };
                    parent.program_time += reps * top.program_time;
                    let ends_program = top.looping;
                    if ends_program {
                        // The program can never escape this loop. If the
                        // body started a forever-looping stream, that
                        // stream is what keeps playing, so one iteration
                        // audibly lasts at least the stream's length.
                        parent.program_time += top.looping_stream_time;
                        parent.looping = true;
                    }
                    top = parent;
                    if ends_program {
                        break;
                    }
                }
            }
            other => {
                // everything else just has operands to skip; unknown
                // opcodes are treated as operand-free here (run-time
                // execution faults on them, sizing does not)
                let skip = operand_len(other, ident.os).unwrap_or(0);
                p.advance(skip as i32);
            }
        }
    }

    // Fold any levels left open by an early exit (an infinite loop nested
    // inside outer levels ends the walk with the stack still deep).
    while let Some(mut parent) = outer.pop() {
        let reps = if top.n_loops == 0 { 1 } else { u32::from(top.n_loops) };
        parent.program_time += reps * top.program_time;
        if top.looping {
            parent.looping = true;
        }
        top = parent;
    }

    (top.program_time, top.looping)
}
