//! Track byte-code tooling: the decompiler, the human-readable program
//! listing, and the deferred-indirect table harvester.
//!
//! A type-1 track body is a sequence of instructions, each a 16-bit
//! delay prefix (in frames), an opcode byte, and a fixed number of
//! operand bytes per opcode. The program ends at opcode 0x00 or at a
//! delay prefix of 0xFFFF (an infinite wait).

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Catalog, TrackType};
use crate::ident::{Identification, OsVersion};
use crate::rom::{RomPointer, RomSet};

/// Operand byte count for each opcode, or `None` for an opcode that is
/// not part of the instruction set. Opcode 0x04 grew an extra 16-bit
/// channel-timer operand in the first 1993 software only.
pub(crate) fn operand_len(opcode: u8, os: OsVersion) -> Option<usize> {
    match opcode {
        0x00 | 0x0D | 0x0F => Some(0),
        0x02 | 0x05 | 0x0E => Some(1),
        0x03 | 0x06..=0x09 | 0x10 => Some(2),
        0x04 => Some(if os == OsVersion::Os93a { 3 } else { 1 }),
        0x0A..=0x0C | 0x11 | 0x12 => Some(4),
        0x01 => Some(5),
        _ => None,
    }
}

/// Maximum operand bytes of any instruction.
pub const MAX_OPERANDS: usize = 8;

/// One decompiled track program step.
#[derive(Clone, Debug)]
pub struct TrackStep {
    /// Byte offset of the instruction (its delay prefix) from the start
    /// of the program.
    pub offset: usize,
    /// Loop nesting level; top-level instructions are at 0.
    pub nesting_level: usize,
    /// Index in the decompiled step list of the loop-begin enclosing
    /// this step, or -1 at top level.
    pub loop_parent: isize,
    /// Delay prefix in frames; 0xFFFF is an infinite wait.
    pub delay: u16,
    pub opcode: u8,
    operands: [u8; MAX_OPERANDS],
    n_operands: usize,
    /// Mnemonic description of the instruction.
    pub desc: String,
    /// The instruction's byte coding as hex, grouped by interpretation
    /// (bytes as 2 digits, words as 4).
    pub hex: String,
}

impl TrackStep {
    /// The instruction's operand bytes.
    pub fn operands(&self) -> &[u8] {
        &self.operands[..self.n_operands]
    }
}

/// Deferred-indirect usage harvested from the track programs.
///
/// The ROM carries no metadata giving the number or sizes of the
/// deferred-indirect tables, so the layout has to be inferred from the
/// programs that reach them: opcode 0x06 steps bound the values each
/// variable can hold, and type-3 tracks reveal which variables index
/// which tables.
#[derive(Clone, Debug, Default)]
pub struct DeferredIndirectInfo {
    /// Variables assigned by opcode 0x06 steps (or used by a type-3
    /// track), with the maximum value ever assigned.
    pub vars: Vec<VarUse>,
    /// The reachable tables with their contents.
    pub tables: Vec<TableUse>,
}

#[derive(Clone, Copy, Debug)]
pub struct VarUse {
    pub id: u8,
    pub max_value: u8,
}

#[derive(Clone, Debug)]
pub struct TableUse {
    pub id: u8,
    /// Track numbers copied from the ROM table.
    pub tracks: Vec<u16>,
    /// Variables used to index this table.
    pub vars: Vec<u8>,
}

/// Read-only view over a ROM set used to take track programs apart.
pub struct Decompiler<'a> {
    roms: &'a RomSet,
    ident: &'a Identification,
    catalog: &'a Catalog,
}

impl<'a> Decompiler<'a> {
    pub fn new(roms: &'a RomSet, ident: &'a Identification, catalog: &'a Catalog) -> Self {
        Self {
            roms,
            ident,
            catalog,
        }
    }

    /// Decompile a track program into a step list. Returns an empty list
    /// for absent tracks and for track types without a program.
    pub fn decompile(&self, track: u16) -> Vec<TrackStep> {
        let Some(info) = self.catalog.track_info(self.roms, self.ident, track) else {
            return Vec::new();
        };
        if info.track_type != TrackType::Program {
            return Vec::new();
        }

        // the byte-code program starts after the type and channel bytes
        let mut start = RomPointer::from_linear(info.address, self.ident.hw);
        start.advance(2);
        let mut p = start;

        let mut steps: Vec<TrackStep> = Vec::new();
        // indices into `steps` of the open loop-begin instructions
        let mut loop_stack: Vec<usize> = Vec::new();

        // Real programs are a handful of instructions; the cap only
        // guards against walking garbage that never terminates.
        const MAX_STEPS: usize = 0x1_0000;

        let mut done = false;
        while !done && steps.len() < MAX_STEPS {
            let offset = p.offset.wrapping_sub(start.offset) as usize;
            let nesting_level = loop_stack.len();
            let loop_parent = loop_stack.last().map_or(-1, |&i| i as isize);

            let delay = p.get_u16(self.roms);
            // an infinite delay ends the program no matter the opcode
            if delay == 0xFFFF {
                done = true;
            }
            let opcode = p.get_u8(self.roms);

            let mut hex = format!("{delay:04X} {opcode:02X}");
            let operand_start = p;
            let mut desc;

            match opcode {
                0x00 => {
                    desc = "End;".to_string();
                    done = true;
                }
                0x01 => {
                    let ch = p.get_u8(self.roms);
                    let stream = p.get_u24(self.roms);
                    let repeat = p.get_u8(self.roms);
                    hex += &format!(" {ch:02X} {stream:06X} {repeat:02X}");
                    let ch_tag = if ch == info.channel {
                        String::new()
                    } else {
                        format!("channel {ch}, ")
                    };
                    desc = match repeat {
                        0 => format!("Play({ch_tag}stream ${stream:06X}, repeat forever);"),
                        1 => format!("Play({ch_tag}stream ${stream:06X});"),
                        n => format!("Play({ch_tag}stream ${stream:06X}, repeat {n});"),
                    };
                }
                0x02 => {
                    let ch = p.get_u8(self.roms);
                    hex += &format!(" {ch:02X}");
                    desc = format!("Stop(channel {ch});");
                }
                0x03 => {
                    let n = p.get_u16(self.roms);
                    hex += &format!(" {n:04X}");
                    desc = format!("Queue(track ${n:04X});");
                }
                0x04 => {
                    if self.ident.os == OsVersion::Os93a {
                        let b = p.get_u8(self.roms);
                        let counter = p.get_u16(self.roms);
                        hex += &format!(" {b:02X} {counter:04X}");
                        desc = format!("SetChannelTimer(byte ${b:02X}, counter ${counter:04X});");
                    } else {
                        let b = p.get_u8(self.roms);
                        hex += &format!(" {b:02X}");
                        desc = format!("WriteDataPort(byte ${b:02X});");
                    }
                }
                0x05 => {
                    let ch = p.get_u8(self.roms);
                    hex += &format!(" {ch:02X}");
                    desc = format!("StartDeferred(channel {ch});");
                }
                0x06 => {
                    let var = p.get_u8(self.roms);
                    let value = p.get_u8(self.roms);
                    hex += &format!(" {var:02X} {value:02X}");
                    desc = format!("SetVariable(var ${var:02X}, value ${value:02X});");
                }
                0x07..=0x09 => {
                    let ch = p.get_u8(self.roms);
                    let level = p.get_u8(self.roms);
                    hex += &format!(" {ch:02X} {level:02X}");
                    let ch_tag = if ch == info.channel {
                        String::new()
                    } else {
                        format!("channel {ch}, ")
                    };
                    let verb = match opcode {
                        0x07 => "level",
                        0x08 => "increase",
                        _ => "decrease",
                    };
                    desc = format!("SetMixingLevel({ch_tag}{verb} {level});");
                }
                0x0A..=0x0C => {
                    let ch = p.get_u8(self.roms);
                    let level = p.get_u8(self.roms);
                    let steps_count = p.get_u16(self.roms);
                    hex += &format!(" {ch:02X} {level:02X} {steps_count:04X}");
                    let ch_tag = if ch == info.channel {
                        String::new()
                    } else {
                        format!("channel {ch}, ")
                    };
                    let verb = match opcode {
                        0x0A => "level",
                        0x0B => "increase",
                        _ => "decrease",
                    };
                    desc = format!("SetMixingLevel({ch_tag}{verb} {level}, steps {steps_count});");
                }
                0x0D => {
                    desc = "NOP;".to_string();
                }
                0x0E => {
                    let count = p.get_u8(self.roms);
                    hex += &format!(" {count:02X}");
                    desc = if count == 0 {
                        "Loop {".to_string()
                    } else {
                        format!("Loop ({count}) {{")
                    };
                    // the loop-begin itself is the step just being built
                    loop_stack.push(steps.len());
                }
                0x0F => {
                    desc = "}".to_string();
                    // A loop end without a matching begin exists in at
                    // least one production ROM; the original decoders
                    // accept it silently, so annotate rather than abort.
                    if loop_stack.pop().is_none() {
                        desc = "LoopEnd;  (unmatched)".to_string();
                    }
                }
                0x10 => {
                    let b0 = p.get_u8(self.roms);
                    let b1 = p.get_u8(self.roms);
                    hex += &format!(" {b0:02X} {b1:02X}");
                    desc = format!("Opcode$10(${b0:02X},${b1:02X});");
                }
                0x11 | 0x12 => {
                    let b0 = p.get_u8(self.roms);
                    let b1 = p.get_u8(self.roms);
                    let w = p.get_u16(self.roms);
                    hex += &format!(" {b0:02X} {b1:02X} {w:04X}");
                    desc = format!("Opcode${opcode:02X}(${b0:02X},${b1:02X},${w:04X});");
                }
                other => {
                    desc = format!("InvalidOpcode${other:02X};");
                    done = true;
                }
            }

            // copy out the operand bytes consumed above
            let n_operands = (p.offset.wrapping_sub(operand_start.offset) as usize).min(MAX_OPERANDS);
            let mut operands = [0u8; MAX_OPERANDS];
            for (i, slot) in operands.iter_mut().enumerate().take(n_operands) {
                *slot = self.roms.read_u8(operand_start.chip, operand_start.offset + i as u32);
            }

            steps.push(TrackStep {
                offset,
                nesting_level,
                loop_parent,
                delay,
                opcode,
                operands,
                n_operands,
                desc,
                hex,
            });
        }

        steps
    }

    /// Render a track program as an indented listing, one instruction
    /// per line, with the hex byte coding in a comment column.
    /// `line_prefix` is prepended to every line.
    pub fn explain(&self, track: u16, line_prefix: &str) -> String {
        let Some(info) = self.catalog.track_info(self.roms, self.ident, track) else {
            return "[Invalid track]".to_string();
        };

        match info.track_type {
            TrackType::Deferred => {
                return format!("{line_prefix}Deferred (${:04X})", info.defer_code);
            }
            TrackType::DeferredIndirect => {
                return format!(
                    "{line_prefix}Deferred Indirect (${:02X}[${:02X}])",
                    info.defer_code & 0xFF,
                    info.defer_code >> 8,
                );
            }
            TrackType::Program => {}
        }

        let mut out = String::new();
        let mut indent = String::new();
        for step in self.decompile(track) {
            if !out.is_empty() {
                out.push('\n');
            }
            let wait = match step.delay {
                0 => String::new(),
                0xFFFF => "Wait(Forever) ".to_string(),
                n => format!("Wait({n}) "),
            };
            if step.opcode == 0x0F && indent.len() >= 2 {
                indent.truncate(indent.len() - 2);
            }
            let body = format!("{indent}{wait}{}", step.desc);
            out += &format!("{line_prefix}{body:<60}    // {}", step.hex);
            if step.opcode == 0x0E {
                indent += "  ";
            }
        }
        out
    }

    /// All distinct streams referenced from any track program, as linear
    /// ROM addresses in ascending order.
    pub fn list_streams(&self) -> Vec<u32> {
        let mut streams = BTreeSet::new();
        for track in 0..self.catalog.n_tracks {
            for step in self.decompile(track) {
                if step.opcode == 0x01 {
                    let ops = step.operands();
                    let addr = (u32::from(ops[1]) << 16) | (u32::from(ops[2]) << 8) | u32::from(ops[3]);
                    streams.insert(addr);
                }
            }
        }
        streams.into_iter().collect()
    }

    /// Harvest the deferred-indirect tables reachable from the track
    /// programs. See [`DeferredIndirectInfo`].
    pub fn deferred_indirect_tables(&self) -> DeferredIndirectInfo {
        // maximum value assigned to each opcode 0x06 variable
        let mut var_max: BTreeMap<u8, u8> = BTreeMap::new();
        // variables used to index each table
        let mut table_vars: BTreeMap<u8, BTreeSet<u8>> = BTreeMap::new();

        for track in 0..self.catalog.n_tracks {
            let Some(info) = self.catalog.track_info(self.roms, self.ident, track) else {
                continue;
            };
            match info.track_type {
                TrackType::Program => {
                    for step in self.decompile(track) {
                        if step.opcode == 0x06 {
                            let ops = step.operands();
                            let entry = var_max.entry(ops[0]).or_insert(0);
                            *entry = (*entry).max(ops[1]);
                        }
                    }
                }
                TrackType::DeferredIndirect => {
                    let var = (info.defer_code >> 8) as u8;
                    let table = (info.defer_code & 0xFF) as u8;
                    table_vars.entry(table).or_default().insert(var);
                    // a variable that is only ever read still exists;
                    // its reachable maximum is the boot-time zero
                    var_max.entry(var).or_insert(0);
                }
                TrackType::Deferred => {}
            }
        }

        // Table length is implied by the variables that index it: a
        // maximum index of n requires at least n + 1 entries.
        let mut info = DeferredIndirectInfo::default();
        for (&table_id, vars) in &table_vars {
            let len = vars
                .iter()
                .map(|v| usize::from(var_max.get(v).copied().unwrap_or(0)) + 1)
                .max()
                .unwrap_or(0);
            if len == 0 {
                continue;
            }

            // read this table's ROM pointer from the index
            let table_addr = self
                .roms
                .read_u24(0, self.catalog.indirect_index + u32::from(table_id) * 3);
            if table_addr & 0x00FF_0000 == 0x00FF_0000 {
                continue;
            }
            let mut p = RomPointer::from_linear(table_addr, self.ident.hw);
            let tracks = (0..len).map(|_| p.get_u16(self.roms)).collect();

            info.tables.push(TableUse {
                id: table_id,
                tracks,
                vars: vars.iter().copied().collect(),
            });
        }

        info.vars = var_max
            .into_iter()
            .map(|(id, max_value)| VarUse { id, max_value })
            .collect();
        info
    }
}
