pub mod catalog;
pub mod decoder;
pub mod engine;
pub mod host;
pub mod ident;
pub mod rom;
pub mod stream;
pub mod track;

pub mod prelude {
    pub use crate::catalog::{Catalog, TrackInfo, TrackType};
    pub use crate::decoder::{Decoder, DecoderState};
    pub use crate::host::{Host, MinHost};
    pub use crate::ident::{HwVersion, Identification, OsVersion, Title};
    pub use crate::rom::{RomPointer, RomSet};
    pub use crate::stream::{FrameStatus, StreamDecoder};
}

/// Fixed output sample rate of the sound boards, in samples per second.
pub const SAMPLE_RATE: u32 = 31_250;

/// Samples per decode frame. One frame is 7.68 ms at the fixed rate, and
/// every time count in the track byte-code is expressed in these frames.
pub const FRAME_SAMPLES: usize = 240;
