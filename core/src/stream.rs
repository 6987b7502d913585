//! The stream decoder contract.
//!
//! The frequency-to-time codec that turns compressed stream data into
//! PCM is an external collaborator. The playback engine only needs to
//! bind streams to channels and pull one 240-sample frame at a time.

use crate::FRAME_SAMPLES;
use crate::rom::{RomPointer, RomSet};

/// Result of decoding one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// More frames remain after this one.
    Playing,
    /// This was the stream's last frame (the header frame count is
    /// exhausted). The engine decides whether to repeat or clear.
    Done,
}

/// Decodes audio streams bound to playback channels.
///
/// A stream object in ROM starts with a big-endian u16 frame count; the
/// rest of its format is the decoder's business.
pub trait StreamDecoder {
    /// Bind a stream to a channel, replacing whatever was there.
    fn load(&mut self, roms: &RomSet, channel: usize, start: RomPointer, level: u8);

    /// Unbind the channel's stream, if any.
    fn clear(&mut self, channel: usize);

    /// Decode the channel's next frame into `out`, attenuated by the
    /// channel mixing level (0..255).
    fn next_frame(
        &mut self,
        roms: &RomSet,
        channel: usize,
        out: &mut [i16; FRAME_SAMPLES],
        level: u8,
    ) -> FrameStatus;
}
