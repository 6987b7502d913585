//! The native decoder implementation.
//!
//! "Native" here means the portable re-implementation of the board
//! software, as opposed to running the original DSP machine code in an
//! emulator. This is the only implementation in the workspace; an
//! emulated one would register alongside it for output comparison.

use backbox_core::decoder::Decoder;
use backbox_core::host::Host;
use backbox_core::stream::StreamDecoder;

use crate::registry::DecoderEntry;

/// Build a native decoder around the given collaborators.
pub fn create(streams: Box<dyn StreamDecoder>, host: Box<dyn Host>) -> Decoder {
    Decoder::new(streams, host)
}

/// Build a native decoder, load the given ROM images (chip number,
/// data), and log what was identified.
pub fn create_with_roms(
    streams: Box<dyn StreamDecoder>,
    host: Box<dyn Host>,
    roms: Vec<(usize, Vec<u8>)>,
) -> Decoder {
    let mut decoder = create(streams, host);
    for (chip_no, data) in roms {
        decoder.add_rom(chip_no, data);
    }
    match decoder.signature() {
        Some(sig) => log::info!("loaded ROM set: {sig}"),
        None => log::warn!("loaded ROM set has no recognizable signature"),
    }
    decoder
}

inventory::submit! {
    DecoderEntry::new(
        "native",
        "Portable re-implementation of the board decoder software",
        create,
    )
}
