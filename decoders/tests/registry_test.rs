use backbox_core::FRAME_SAMPLES;
use backbox_core::decoder::DecoderState;
use backbox_core::host::MinHost;
use backbox_core::rom::{RomPointer, RomSet};
use backbox_core::stream::{FrameStatus, StreamDecoder};
use backbox_decoders::{SilentStreams, registry};

// =================================================================
// Registry
// =================================================================

#[test]
fn native_decoder_is_registered() {
    let entry = registry::find("native").expect("native decoder registered");
    assert!(!entry.description.is_empty());
}

#[test]
fn all_is_sorted_and_contains_native() {
    let entries = registry::all();
    assert!(entries.iter().any(|e| e.name == "native"));
    let names: Vec<_> = entries.iter().map(|e| e.name).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn unknown_name_finds_nothing() {
    assert!(registry::find("emulated").is_none());
}

#[test]
fn factory_builds_a_fresh_decoder() {
    let entry = registry::find("native").expect("native decoder registered");
    let decoder = (entry.create)(Box::new(SilentStreams::new()), Box::new(MinHost));
    assert_eq!(decoder.state(), DecoderState::HardBoot);
    assert!(decoder.is_ok());
}

// =================================================================
// SilentStreams
// =================================================================

fn roms_with_stream(offset: u32, frames: u16) -> RomSet {
    let mut data = vec![0u8; 0x1000];
    data[offset as usize..offset as usize + 2].copy_from_slice(&frames.to_be_bytes());
    let mut roms = RomSet::new();
    roms.add_rom(2, data);
    roms
}

#[test]
fn silent_stream_honors_header_frame_count() {
    let roms = roms_with_stream(0x100, 3);
    let mut streams = SilentStreams::new();
    let mut out = [1i16; FRAME_SAMPLES];

    streams.load(&roms, 0, RomPointer::new(0, 0x100), 0x64);
    assert_eq!(streams.next_frame(&roms, 0, &mut out, 0x64), FrameStatus::Playing);
    assert!(out.iter().all(|&s| s == 0), "silence only");
    assert_eq!(streams.next_frame(&roms, 0, &mut out, 0x64), FrameStatus::Playing);
    assert_eq!(streams.next_frame(&roms, 0, &mut out, 0x64), FrameStatus::Done);
}

#[test]
fn silent_stream_unbound_channel_is_done() {
    let roms = roms_with_stream(0x100, 3);
    let mut streams = SilentStreams::new();
    let mut out = [0i16; FRAME_SAMPLES];
    assert_eq!(streams.next_frame(&roms, 5, &mut out, 0), FrameStatus::Done);
}

#[test]
fn silent_stream_clear_unbinds() {
    let roms = roms_with_stream(0x100, 3);
    let mut streams = SilentStreams::new();
    let mut out = [0i16; FRAME_SAMPLES];
    streams.load(&roms, 1, RomPointer::new(0, 0x100), 0x64);
    streams.clear(1);
    assert_eq!(streams.next_frame(&roms, 1, &mut out, 0), FrameStatus::Done);
}
