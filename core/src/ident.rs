//! ROM identification.
//!
//! The ROM images carry no explicit version marker, so everything about a
//! set has to be inferred from its contents: the signature string at the
//! start of U2, the location of the catalog (which pins down the hardware
//! generation), and a handful of characteristic DSP opcode sequences that
//! distinguish the software variants and reveal the channel count.

use crate::rom::{Pattern, RomSet};

// ---------------------------------------------------------------------------
// Version enums
// ---------------------------------------------------------------------------

/// Target hardware generation of a ROM set. The generations encode
/// 24-bit linear ROM addresses differently (see
/// [`RomPointer::from_linear`](crate::rom::RomPointer::from_linear)), so
/// this must be known before any cross-ROM pointer can be followed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HwVersion {
    /// Not detected, or detection failed.
    #[default]
    Unknown,
    /// Original audio-only board (1993-1995 titles).
    Hw93,
    /// 1995 audio/video board.
    Hw95,
}

/// Software variant found in a ROM set.
///
/// There were several releases of the board software between 1993 and
/// 1998, but only four matter for data-format compatibility: the two
/// 1993 builds (which differ from each other only in a mixing-level
/// detail, and from everything later in the audio frame format), the
/// mainstream 1994 build used through 1995, and the 1995+ build for the
/// audio/video boards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OsVersion {
    /// Not detected, or no known probe matched. Deliberately not
    /// defaulted: an out-of-corpus ROM must be reported as unknown.
    #[default]
    Unknown,
    /// First 1993 release (two titles). Opcode 0x04 carries an extra
    /// channel-timer operand in this version only.
    Os93a,
    /// Second 1993 release (one title).
    Os93b,
    /// Mainstream 1994-1995 software for the audio-only board.
    Os94,
    /// Software for the 1995 audio/video board.
    Os95,
}

// ---------------------------------------------------------------------------
// Title recognition
// ---------------------------------------------------------------------------

/// The known 1993-1998 pinball titles, recognized from the U2 signature.
///
/// Every title ships its own copy of the board software, so in principle
/// any of them could carry unique behavior. In practice they do not, with
/// one documented exception: one 1996 title's command handler answers
/// command 0x03E7 with status byte 0x11 even though the track program
/// sends 0x10. This crate does not replicate that quirk; the title is
/// exposed so a host that cares can.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Title {
    #[default]
    Unknown,
    AttackFromMars,
    CactusCanyon,
    ChampionPub,
    CirqusVoltaire,
    Corvette,
    DemolitionMan,
    DirtyHarry,
    Flintstones,
    IndianaJones,
    Indy500,
    JackBot,
    JohnnyMnemonic,
    JudgeDredd,
    MedievalMadness,
    MonsterBash,
    NbaFastbreak,
    NoFear,
    NoGoodGofers,
    Popeye,
    RoadShow,
    SafeCracker,
    ScaredStiff,
    Shadow,
    StarTrekTng,
    ArabianNights,
    TheatreOfMagic,
    WorldCupSoccer,
    WhoDunnit,
}

/// Signature recognition table: (title, official name, signature text).
/// The signature text is matched case-insensitively as a substring of the
/// U2 signature string.
static TITLE_TABLE: [(Title, &str, &str); 28] = [
    (Title::AttackFromMars, "Attack from Mars", "Attack from Mars"),
    (Title::CactusCanyon, "Cactus Canyon", "Cactus Canyon"),
    (Title::ChampionPub, "The Champion Pub", "Champion Pub"),
    (Title::CirqusVoltaire, "Cirqus Voltaire", "Cirqus Voltaire"),
    (Title::Corvette, "Corvette", "Corvette Pinball"),
    (Title::DemolitionMan, "Demolition Man", "Demolition Man"),
    (Title::DirtyHarry, "Dirty Harry", "Dirty Harry"),
    (Title::Flintstones, "The Flintstones", "WMS Gaming Stones Sounds"),
    (
        Title::IndianaJones,
        "Indiana Jones: The Pinball Adventure",
        "Indiana Jones",
    ),
    (Title::Indy500, "Indianapolis 500", "Indy 500"),
    (Title::JackBot, "Jack*Bot", "Jackbot"),
    (Title::JohnnyMnemonic, "Johnny Mnemonic", "Johnny Mnemonic"),
    (Title::JudgeDredd, "Judge Dredd", "Judge Dredd"),
    (Title::MedievalMadness, "Medieval Madness", "Medieval Madness"),
    (Title::MonsterBash, "Monster Bash", "Monster Pinball"),
    (Title::NbaFastbreak, "NBA Fastbreak", "Fastbreak Game Sounds"),
    (Title::NoFear, "No Fear: Dangerous Sports", "No Fear Pinball"),
    (Title::NoGoodGofers, "No Good Gofers", "Gofers Pinball"),
    (Title::Popeye, "Popeye Saves the Earth", "Popeye"),
    (Title::RoadShow, "Red & Ted's Road Show", "Roadshow"),
    (Title::SafeCracker, "Safe Cracker", "Safe Cracker"),
    (Title::ScaredStiff, "Scared Stiff", "Elv2 AV Pinball"),
    (Title::Shadow, "The Shadow", "The Shadow"),
    (
        Title::StarTrekTng,
        "Star Trek: The Next Generation",
        "Star Trek The Next Generation",
    ),
    (
        Title::ArabianNights,
        "Tales of the Arabian Nights",
        "Arabian Nights",
    ),
    (Title::TheatreOfMagic, "Theatre of Magic", "Theatre of Magic"),
    (Title::WorldCupSoccer, "World Cup Soccer", "World Cup Soccer"),
    (Title::WhoDunnit, "Who Dunnit", "WDI Pinball"),
];

impl Title {
    /// Infer the title from a U2 signature string.
    pub fn infer(signature: &str) -> Title {
        let lowered = signature.to_ascii_lowercase();
        for (title, _, probe) in &TITLE_TABLE {
            if lowered.contains(&probe.to_ascii_lowercase()) {
                return *title;
            }
        }
        Title::Unknown
    }

    /// The official marketing title, or "[Unknown]".
    pub fn name(self) -> &'static str {
        for (title, name, _) in &TITLE_TABLE {
            if *title == self {
                return name;
            }
        }
        "[Unknown]"
    }
}

// ---------------------------------------------------------------------------
// Signature and catalog location
// ---------------------------------------------------------------------------

/// Does the byte block start with a JUMP instruction? The first three
/// bytes of U2 are loaded into the DSP's reset vector at boot, and every
/// known boot loader puts a JUMP to its entrypoint there (instruction
/// format $18 xx xF).
fn is_jump(bytes: &[u8]) -> bool {
    bytes.len() >= 3 && bytes[0] & 0xFC == 0x18 && bytes[2] & 0x0F == 0x0F
}

/// Extract the signature string from a U2 image: a NUL-terminated run of
/// up to 120 printable bytes starting at offset 4, valid only when the
/// image starts with a JUMP instruction. `None` means the image is not a
/// recognizable sound ROM.
pub fn signature(u2: &[u8]) -> Option<String> {
    if u2.len() < 5 || !is_jump(u2) {
        return None;
    }
    let mut len = 0;
    while len < 120 {
        match u2.get(4 + len) {
            Some(&b) if (32..127).contains(&b) => len += 1,
            _ => break,
        }
    }
    if u2.get(4 + len) != Some(&0) {
        return None;
    }
    Some(String::from_utf8_lossy(&u2[4..4 + len]).into_owned())
}

/// Candidate byte offsets for the catalog in U2. Offset 0x6000 is only
/// used by the 1995 audio/video boards; the earlier boards use 0x3000 or
/// 0x4000.
pub const CATALOG_OFFSETS: [u32; 3] = [0x3000, 0x4000, 0x6000];

/// Locate the catalog in a U2 image. The catalog starts with the
/// three-u16 index entry for U2 itself: its size in 4K units, its chip
/// select code, and its checksum. The chip select and checksum are both
/// always zero for U2, and the size has to match the actual image size,
/// which together make random data very unlikely to qualify. Returns 0
/// when no candidate offset matches.
pub fn find_catalog(u2: &[u8]) -> u32 {
    for &ofs in &CATALOG_OFFSETS {
        let ofs_usize = ofs as usize;
        if u2.len() < ofs_usize + 6 {
            continue;
        }
        let size4k = u16::from_be_bytes([u2[ofs_usize], u2[ofs_usize + 1]]);
        let chipsel = u16::from_be_bytes([u2[ofs_usize + 2], u2[ofs_usize + 3]]) >> 8;
        let cksum = u16::from_be_bytes([u2[ofs_usize + 4], u2[ofs_usize + 5]]);
        if chipsel == 0 && cksum == 0 && usize::from(size4k) * 4096 == u2.len() {
            return ofs;
        }
    }
    0
}

// ---------------------------------------------------------------------------
// ROM index validation
// ---------------------------------------------------------------------------

/// Validate the loaded ROM set against the ROM index in U2, using the
/// power-on self-test status codes of the original boards:
///
/// - `0x01`: every populated slot matches its index entry and the index
///   names no absent slot;
/// - `0x02`..`0x09`: the chip number of the first entry that failed
///   (absent slot, size mismatch, or checksum mismatch);
/// - `0x02` also when U2 is missing or no candidate offset holds a
///   recognizable index at all.
pub fn check_roms(roms: &RomSet) -> u8 {
    if !roms.is_populated(0) {
        return 2;
    }

    for &ofs in &CATALOG_OFFSETS {
        // Parse the candidate as an index of up to 9 three-u16 entries
        // terminated by a zero size. At offset 0x6000 the chip select
        // byte is stored shifted one extra bit left, matching the
        // narrower ROM banking window of the audio/video boards.
        let mut n_validated = 0;
        let mut first_failed = None;
        for entry_no in 0u32..9 {
            let base = ofs + entry_no * 6;
            let size = u32::from(roms.read_u16(0, base)) * 4096;
            let mut chipsel = usize::from(roms.read_u16(0, base + 2) >> 8);
            let cksum = roms.read_u16(0, base + 4);
            if size == 0 {
                break;
            }
            if ofs == 0x6000 {
                chipsel >>= 1;
            }

            let ok = chipsel < 8
                && roms.is_populated(chipsel)
                && roms.size(chipsel) as u32 == size
                && roms.checksum_of(chipsel) == cksum;
            if ok {
                n_validated += 1;
            } else {
                first_failed = Some(entry_no);
                break;
            }
        }

        // At least one validated entry means this is the real index;
        // report the first failure if there was one.
        if n_validated > 0 {
            return match first_failed {
                None => 1,
                Some(entry_no) => (entry_no + 2) as u8,
            };
        }
    }

    // No candidate offset held a single valid entry. That is equivalent
    // to a U2 failure, since it means the U2 image itself is bad.
    2
}

// ---------------------------------------------------------------------------
// Version and channel-count probes
// ---------------------------------------------------------------------------

/// Probe for the first 1993 software build, present in all of the 1993
/// ROMs and only those:
///
/// ```text
///   38 00 26   M6 = $0002
///   3C 10 05   CNTR = $0100
///   0C 00 C0   ENA BIT_REV
/// ```
const OS93_PROBE: &str = "380026 3C1005 0C00C0";

/// Probe distinguishing the first 1993 build from the second, found only
/// in the former, in the $2000 overlay code:
///
/// ```text
///   47 FF F2   MX0 = $7FFF
///   47 C9 46   MY0 = $7C94
/// ```
const OS93A_PROBE: &str = "47FFF2 47C946";

/// Probe for the version number embedded in the 1995+ software's
/// command handler. The immediate value loaded into the first shift
/// register is the major:minor version as a 16-bit number.
const VERSION_PROBE: &str = "4vvvvE 0F16F8 93300E 18***F 4wwwwE 0F1608 0F16F8 93300E 18***F";

/// Probe for the channel execution loop. `n` captures the channel count
/// and `m` the channel mask; the match is only trusted when
/// `m == (1 << n) - 1`.
const CHANNELS_PROBE: &str = "22200F 4000n4 26E20F 221800 9****A 8****A 400mm4 26E20F 18***1";

/// Run a compiled probe over a byte window of U2. `byte_start` and
/// `byte_len` are byte offsets; matching is in 4-byte opcode cells.
fn probe(u2: &[u8], pattern: &Pattern, byte_start: usize, byte_len: usize) -> Option<crate::rom::Captures> {
    let end = (byte_start + byte_len).min(u2.len());
    if byte_start >= end {
        return None;
    }
    pattern
        .find_in_rom(&u2[byte_start..end], 0)
        .map(|(_, vars)| vars)
}

/// Everything that can be inferred about a ROM set.
#[derive(Clone, Debug, Default)]
pub struct Identification {
    pub hw: HwVersion,
    pub os: OsVersion,
    /// Version number embedded in the 1995+ software (0x0103..0x0105),
    /// or 0x0102 by convention for audio/video builds that predate the
    /// embedded number. Zero for the earlier boards.
    pub nominal_version: u16,
    /// Channel count detected from the channel execution loop, 4, 6, or
    /// 8. Zero when the probe found nothing; callers must treat that as
    /// unknown.
    pub channels: usize,
    /// Catalog byte offset in U2; 0 when no catalog was found.
    pub catalog_offset: u32,
    pub title: Title,
}

impl Identification {
    /// Identify a ROM set. Never fails outright; undetectable fields
    /// are left at their Unknown/zero values for the caller to judge.
    pub fn detect(roms: &RomSet) -> Identification {
        let mut id = Identification {
            title: roms.title(),
            catalog_offset: roms.catalog_offset(),
            ..Identification::default()
        };

        let Some(u2) = roms.bytes(0) else {
            return id;
        };
        if id.catalog_offset == 0 {
            return id;
        }

        // The channel-count loop appears in every known build, so probe
        // for it unconditionally. It doubles as the confirmation probe
        // for the mainstream 1994 software below.
        let channels_pat = Pattern::compile(CHANNELS_PROBE);
        let channel_match = probe(u2, &channels_pat, 0, 0x6000);
        if let Some(vars) = &channel_match
            && let (Some(&n), Some(&m)) = (vars.get(&'n'), vars.get(&'m'))
            && m == (1u32 << n) - 1
        {
            id.channels = n as usize;
        }

        if id.catalog_offset == 0x6000 {
            // Catalog at 0x6000 is unique to the audio/video boards.
            id.hw = HwVersion::Hw95;
            id.os = OsVersion::Os95;

            // The embedded version number lives in the command-handler
            // region of the main program, which loads from U2 $2000.
            // The idiom first appears in the 1996 builds; its absence
            // means the earlier 1995 software, 1.02 by convention.
            let version_pat = Pattern::compile(VERSION_PROBE);
            id.nominal_version = match probe(u2, &version_pat, 0x2000 + 0x0300 * 4, 0x180 * 4) {
                Some(vars) => vars.get(&'v').map(|&v| v as u16).unwrap_or(0x0102),
                None => 0x0102,
            };
        } else {
            id.hw = HwVersion::Hw93;

            // The 1993 builds are recognized by a probe in the main
            // program region (loaded from U2 $1000); a second probe in
            // the $2000 overlay separates the two 1993 sub-variants.
            let os93_pat = Pattern::compile(OS93_PROBE);
            if probe(u2, &os93_pat, 0x1000 + 0x0100 * 4, 0x180 * 4).is_some() {
                let os93a_pat = Pattern::compile(OS93A_PROBE);
                id.os = if probe(u2, &os93a_pat, 0x2000 + 0x0200 * 4, 0x100 * 4).is_some() {
                    OsVersion::Os93a
                } else {
                    OsVersion::Os93b
                };
            } else if id.channels != 0 {
                // Not a 1993 build; accept it as the mainstream 1994
                // software only if the channel loop confirmed that this
                // is a build we actually understand. Otherwise leave it
                // Unknown rather than guessing.
                id.os = OsVersion::Os94;
            }
        }

        log::info!(
            "ROM set identified: {} ({:?}/{:?}, version {:04X}, {} channels)",
            id.title.name(),
            id.hw,
            id.os,
            id.version_number(),
            id.channels,
        );
        id
    }

    /// The nominal software version as major:minor (e.g. 0x0103 for
    /// version 1.03). The pre-1995 builds carried no embedded number, so
    /// they are assigned 1.00 (1993) and 1.01 (1994) by convention.
    pub fn version_number(&self) -> u16 {
        match self.os {
            OsVersion::Os93a | OsVersion::Os93b => 0x0100,
            OsVersion::Os94 => 0x0101,
            OsVersion::Os95 => {
                if self.nominal_version != 0 {
                    self.nominal_version
                } else {
                    0x0102
                }
            }
            OsVersion::Unknown => 0,
        }
    }

    /// Human-readable description of the detected hardware and software.
    pub fn version_info(&self) -> String {
        let hw = match self.hw {
            HwVersion::Unknown => "unknown board type",
            HwVersion::Hw93 => "audio board",
            HwVersion::Hw95 => "audio/video board",
        };
        let sw = match self.os {
            OsVersion::Unknown => "software not recognized".to_string(),
            OsVersion::Os93a => "software 1.00a (1993)".to_string(),
            OsVersion::Os93b => "software 1.00b (1993)".to_string(),
            OsVersion::Os94 => "software 1.01 (1994)".to_string(),
            OsVersion::Os95 => {
                let v = self.version_number();
                format!("software {}.{:02} (1995+)", v >> 8, v & 0xFF)
            }
        };
        format!("{hw}, {sw}")
    }
}

/// Byte offset in U2 of the main decoder program: $1000 when the reset
/// vector there holds a JUMP instruction, $2000 otherwise.
pub fn soft_boot_offset(roms: &RomSet) -> u32 {
    match roms.bytes(0) {
        Some(u2) => soft_boot_offset_of(u2),
        None => 0x2000,
    }
}

/// [`soft_boot_offset`] over a raw U2 image, for callers scanning data
/// that isn't loaded into a ROM set.
pub fn soft_boot_offset_of(u2: &[u8]) -> u32 {
    if u2.len() > 0x1003 && is_jump(&u2[0x1000..]) {
        0x1000
    } else {
        0x2000
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
