//! The sound board ROM set: up to eight chips, U2 through U9.
//!
//! U2 is special. Beyond audio data it carries the board program, the
//! signature string, the catalog, and the track indices, so adding it
//! also parses the signature, locates the catalog, and infers the title.

use crate::ident::{self, Title};

/// Number of chip sockets on the board (U2..U9).
pub const NUM_SLOTS: usize = 8;

/// Size of the placeholder block simulated for unpopulated sockets.
/// The original hardware read such addresses as $FF without complaint.
const MISSING_SLOT_SIZE: u32 = 0x2000;

/// Compute the power-on-test checksum of a ROM image: the sum of the
/// even-offset bytes (mod 256) in the high byte and the sum of the
/// odd-offset bytes (mod 256) in the low byte.
pub fn checksum(data: &[u8]) -> u16 {
    let mut even: u8 = 0;
    let mut odd: u8 = 0;
    for (i, &b) in data.iter().enumerate() {
        if i % 2 == 0 {
            even = even.wrapping_add(b);
        } else {
            odd = odd.wrapping_add(b);
        }
    }
    (u16::from(even) << 8) | u16::from(odd)
}

struct RomSlot {
    data: Vec<u8>,
    /// Offset mask, size - 1. Slot sizes are powers of two, so every
    /// offset is masked before dereference rather than bounds-checked.
    mask: u32,
}

/// The fixed array of eight chip slots. Constructed once per decoder
/// instance and immutable for the rest of the run.
pub struct RomSet {
    slots: [Option<RomSlot>; NUM_SLOTS],

    // U2 metadata, parsed when slot 0 is added
    signature: Option<String>,
    catalog_offset: u32,
    title: Title,
}

impl RomSet {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            signature: None,
            catalog_offset: 0,
            title: Title::Unknown,
        }
    }

    /// Add a ROM image. `chip_no` is the nominal chip number from the
    /// board layout, 2..9 for chips U2..U9. Out-of-range chip numbers and
    /// zero-length images are ignored (caller contract).
    ///
    /// Adding U2 triggers the signature parse, the catalog search, and
    /// title inference.
    pub fn add_rom(&mut self, chip_no: usize, data: Vec<u8>) {
        if !(2..=9).contains(&chip_no) || data.is_empty() {
            return;
        }
        let slot = chip_no - 2;
        if slot == 0 {
            self.signature = ident::signature(&data);
            self.catalog_offset = ident::find_catalog(&data);
            self.title = match &self.signature {
                Some(sig) => Title::infer(sig),
                None => Title::Unknown,
            };
            log::debug!(
                "U2 added: {} bytes, catalog at {:#06x}, signature {:?}",
                data.len(),
                self.catalog_offset,
                self.signature.as_deref().unwrap_or("")
            );
        }

        let mask = (data.len() as u32).wrapping_sub(1);
        self.slots[slot] = Some(RomSlot { data, mask });
    }

    /// Is the given slot (0 = U2) populated?
    pub fn is_populated(&self, slot: usize) -> bool {
        slot < NUM_SLOTS && self.slots[slot].is_some()
    }

    /// Size in bytes of the given slot's image; 0 when unpopulated.
    pub fn size(&self, slot: usize) -> usize {
        match self.slots.get(slot).and_then(|s| s.as_ref()) {
            Some(slot) => slot.data.len(),
            None => 0,
        }
    }

    /// Offset mask of the given slot (size - 1). Unpopulated slots get
    /// the placeholder mask.
    pub fn mask(&self, slot: usize) -> u32 {
        match self.slots.get(slot).and_then(|s| s.as_ref()) {
            Some(slot) => slot.mask,
            None => MISSING_SLOT_SIZE - 1,
        }
    }

    /// The raw bytes of a populated slot, for pattern searches.
    pub fn bytes(&self, slot: usize) -> Option<&[u8]> {
        self.slots
            .get(slot)
            .and_then(|s| s.as_ref())
            .map(|s| s.data.as_slice())
    }

    /// Power-on-test checksum of a populated slot; 0 when unpopulated.
    pub fn checksum_of(&self, slot: usize) -> u16 {
        match self.slots.get(slot).and_then(|s| s.as_ref()) {
            Some(slot) => checksum(&slot.data),
            None => 0,
        }
    }

    /// Read one byte. The offset is masked with the slot's mask first;
    /// unpopulated slots read as $FF, as on the original hardware.
    pub fn read_u8(&self, slot: usize, offset: u32) -> u8 {
        match self.slots.get(slot).and_then(|s| s.as_ref()) {
            Some(s) => s.data[(offset & s.mask) as usize],
            None => 0xFF,
        }
    }

    /// Read a big-endian 16-bit value.
    pub fn read_u16(&self, slot: usize, offset: u32) -> u16 {
        (u16::from(self.read_u8(slot, offset)) << 8) | u16::from(self.read_u8(slot, offset + 1))
    }

    /// Read a big-endian 24-bit value.
    pub fn read_u24(&self, slot: usize, offset: u32) -> u32 {
        (u32::from(self.read_u8(slot, offset)) << 16)
            | (u32::from(self.read_u8(slot, offset + 1)) << 8)
            | u32::from(self.read_u8(slot, offset + 2))
    }

    /// Read a big-endian 32-bit value.
    pub fn read_u32(&self, slot: usize, offset: u32) -> u32 {
        (u32::from(self.read_u16(slot, offset)) << 16) | u32::from(self.read_u16(slot, offset + 2))
    }

    /// The signature string parsed from U2, if U2 is present and carries
    /// a valid one. An absent signature means the image is not a
    /// recognizable sound ROM.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Byte offset of the catalog in U2, or 0 if no catalog was found.
    pub fn catalog_offset(&self) -> u32 {
        self.catalog_offset
    }

    /// The title inferred from the U2 signature.
    pub fn title(&self) -> Title {
        self.title
    }
}

impl Default for RomSet {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
