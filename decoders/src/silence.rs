//! A placeholder stream decoder.
//!
//! The real frequency-to-time codec lives outside this workspace.
//! [`SilentStreams`] honors the stream contract — it reads the header
//! frame count and reports completion on schedule — but emits silence,
//! which is enough for harnesses exercising the engine, the command
//! port, and the boot flow without linking a codec.

use backbox_core::FRAME_SAMPLES;
use backbox_core::rom::{RomPointer, RomSet};
use backbox_core::stream::{FrameStatus, StreamDecoder};

#[derive(Clone, Copy)]
struct Slot {
    remaining_frames: u16,
}

/// Header-honoring silent [`StreamDecoder`].
pub struct SilentStreams {
    slots: [Option<Slot>; 8],
}

impl SilentStreams {
    pub fn new() -> Self {
        Self { slots: [None; 8] }
    }
}

impl Default for SilentStreams {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder for SilentStreams {
    fn load(&mut self, roms: &RomSet, channel: usize, start: RomPointer, _level: u8) {
        if let Some(slot) = self.slots.get_mut(channel) {
            *slot = Some(Slot {
                remaining_frames: start.peek_u16(roms),
            });
        }
    }

    fn clear(&mut self, channel: usize) {
        if let Some(slot) = self.slots.get_mut(channel) {
            *slot = None;
        }
    }

    fn next_frame(
        &mut self,
        _roms: &RomSet,
        channel: usize,
        out: &mut [i16; FRAME_SAMPLES],
        _level: u8,
    ) -> FrameStatus {
        out.fill(0);
        let Some(Some(slot)) = self.slots.get_mut(channel) else {
            return FrameStatus::Done;
        };
        if slot.remaining_frames > 0 {
            slot.remaining_frames -= 1;
        }
        if slot.remaining_frames == 0 {
            FrameStatus::Done
        } else {
            FrameStatus::Playing
        }
    }
}
