//! Cross-ROM pointers.
//!
//! A [`RomPointer`] is a plain (chip, offset) index pair; it does not
//! borrow the ROM data. Dereferencing always goes through the
//! [`RomSet`], which masks the offset with the chip's size mask.

use crate::ident::HwVersion;
use crate::rom::RomSet;

/// A pointer into the ROM set: chip select 0..7 (U2..U9) plus a byte
/// offset within that chip. Freely copyable; all reads are big-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RomPointer {
    pub chip: usize,
    pub offset: u32,
}

impl RomPointer {
    pub fn new(chip: usize, offset: u32) -> Self {
        Self { chip, offset }
    }

    /// Decode a 24-bit linear ROM address read from ROM data. The chip
    /// select field sits in bits 20..22 on the original audio boards and
    /// bits 21..23 on the 1995 audio/video boards.
    pub fn from_linear(addr: u32, hw: HwVersion) -> Self {
        let shift = match hw {
            HwVersion::Hw95 => 21,
            _ => 20,
        };
        Self {
            chip: ((addr >> shift) & 0x07) as usize,
            offset: addr & ((1 << shift) - 1),
        }
    }

    /// Encode this pointer back into the 24-bit linear address form for
    /// the given hardware version.
    pub fn to_linear(self, hw: HwVersion) -> u32 {
        let shift = match hw {
            HwVersion::Hw95 => 21,
            _ => 20,
        };
        ((self.chip as u32) << shift) | (self.offset & ((1 << shift) - 1))
    }

    /// The nominal chip number (the x in the Ux reference designator):
    /// chip select plus 2.
    pub fn nominal_chip_number(self) -> usize {
        self.chip + 2
    }

    pub fn advance(&mut self, delta: i32) {
        self.offset = self.offset.wrapping_add_signed(delta);
    }

    // -- reads without increment --

    pub fn peek_u8(self, roms: &RomSet) -> u8 {
        roms.read_u8(self.chip, self.offset)
    }

    pub fn peek_u16(self, roms: &RomSet) -> u16 {
        roms.read_u16(self.chip, self.offset)
    }

    pub fn peek_u24(self, roms: &RomSet) -> u32 {
        roms.read_u24(self.chip, self.offset)
    }

    pub fn peek_u32(self, roms: &RomSet) -> u32 {
        roms.read_u32(self.chip, self.offset)
    }

    // -- reads with post-increment --

    pub fn get_u8(&mut self, roms: &RomSet) -> u8 {
        let v = self.peek_u8(roms);
        self.advance(1);
        v
    }

    pub fn get_u16(&mut self, roms: &RomSet) -> u16 {
        let v = self.peek_u16(roms);
        self.advance(2);
        v
    }

    pub fn get_u24(&mut self, roms: &RomSet) -> u32 {
        let v = self.peek_u24(roms);
        self.advance(3);
        v
    }

    pub fn get_u32(&mut self, roms: &RomSet) -> u32 {
        let v = self.peek_u32(roms);
        self.advance(4);
        v
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
