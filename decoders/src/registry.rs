//! Decoder implementation registry.
//!
//! Each available decoder implementation self-registers via
//! [`inventory::submit!`] with a [`DecoderEntry`] naming it and giving a
//! factory function. Harnesses discover the implementations at runtime
//! without a central list; this crate registers the native one, and a
//! test harness can register alternates of its own to compare against.

use backbox_core::decoder::Decoder;
use backbox_core::host::Host;
use backbox_core::stream::StreamDecoder;

/// Describes one decoder implementation.
pub struct DecoderEntry {
    /// Short name used to select the implementation (e.g. "native").
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// Factory: build a decoder around the given collaborators.
    pub create: fn(Box<dyn StreamDecoder>, Box<dyn Host>) -> Decoder,
}

impl DecoderEntry {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        create: fn(Box<dyn StreamDecoder>, Box<dyn Host>) -> Decoder,
    ) -> Self {
        Self {
            name,
            description,
            create,
        }
    }
}

inventory::collect!(DecoderEntry);

/// All registered decoder implementations, sorted by name.
pub fn all() -> Vec<&'static DecoderEntry> {
    let mut entries: Vec<_> = inventory::iter::<DecoderEntry>.into_iter().collect();
    entries.sort_by_key(|e| e.name);
    entries
}

/// Look up an implementation by name.
pub fn find(name: &str) -> Option<&'static DecoderEntry> {
    inventory::iter::<DecoderEntry>
        .into_iter()
        .find(|e| e.name == name)
}
