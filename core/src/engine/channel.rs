//! Per-channel playback state.

use crate::rom::RomPointer;
use crate::track::MAX_OPERANDS;

/// Default mixing level applied to every channel at reset.
pub const DEFAULT_MIX_LEVEL: u8 = 0x64;

/// What a channel's deferred slot is armed with, if anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) enum Deferred {
    #[default]
    None,
    /// A type-2 link: start this track when triggered.
    Track(u16),
    /// A type-3 link: at trigger time, look up table entry
    /// `variables[var]` to pick the track.
    Indirect { var: u8, table: u8 },
}

/// A stream bound to the channel.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ActiveStream {
    pub start: RomPointer,
    /// Remaining play count; 0 means loop forever.
    pub repeats: u8,
}

/// An in-progress mixing level fade: linear interpolation toward the
/// target across the remaining steps, in 8.8 fixed point.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Fade {
    pub target: u8,
    pub steps_left: u16,
    pub delta: i32,
}

/// A fully decoded instruction waiting out its delay prefix.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PendingStep {
    pub opcode: u8,
    pub operands: [u8; MAX_OPERANDS],
}

/// One open loop: where the body starts and how many passes remain.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LoopFrame {
    pub start: RomPointer,
    /// Remaining pass count; 0 means loop forever.
    pub count: u8,
}

/// An executing track program.
#[derive(Clone, Debug)]
pub(crate) struct Program {
    /// Next unfetched instruction (its delay prefix).
    pub pc: RomPointer,
    /// Frames left before the pending instruction executes.
    pub countdown: u16,
    pub pending: Option<PendingStep>,
    /// Latched by an infinite delay prefix: the program can never
    /// proceed, but the channel's streams keep playing.
    pub halted: bool,
    pub loops: Vec<LoopFrame>,
}

impl Program {
    pub fn new(pc: RomPointer) -> Self {
        Self {
            pc,
            countdown: 0,
            pending: None,
            halted: false,
            loops: Vec::with_capacity(4),
        }
    }
}

/// One playback channel: a mixing slot with an optional stream, an
/// optional byte-code program, and an optional armed deferred track.
pub(crate) struct Channel {
    pub stream: Option<ActiveStream>,
    /// Mixing level in 8.8 fixed point (fades step fractionally).
    pub level_fp: u32,
    pub fade: Option<Fade>,
    pub program: Option<Program>,
    pub deferred: Deferred,
    /// Byte stored by the 55 Bx host command. Kept per the wire
    /// protocol, but nothing reads it back.
    pub reserved: u8,
}

impl Channel {
    pub fn new() -> Self {
        Self {
            stream: None,
            level_fp: u32::from(DEFAULT_MIX_LEVEL) << 8,
            fade: None,
            program: None,
            deferred: Deferred::None,
            reserved: 0,
        }
    }

    /// Current integral mixing level, 0..255.
    pub fn level(&self) -> u8 {
        (self.level_fp >> 8) as u8
    }

    /// Set the level immediately, cancelling any fade.
    pub fn set_level(&mut self, level: u8) {
        self.level_fp = u32::from(level) << 8;
        self.fade = None;
    }

    /// Begin a linear fade to `target` over `steps` frames. A zero step
    /// count applies the target immediately.
    pub fn start_fade(&mut self, target: u8, steps: u16) {
        if steps == 0 {
            self.set_level(target);
            return;
        }
        let delta = (i64::from(u32::from(target) << 8) - i64::from(self.level_fp)) / i64::from(steps);
        self.fade = Some(Fade {
            target,
            steps_left: steps,
            delta: delta as i32,
        });
    }

    /// Advance an in-progress fade by one frame. The final step lands
    /// exactly on the target; intermediate levels stay clamped 0..255.
    pub fn step_fade(&mut self) {
        let Some(fade) = &mut self.fade else {
            return;
        };
        fade.steps_left -= 1;
        if fade.steps_left == 0 {
            let target = fade.target;
            self.set_level(target);
        } else {
            let next = i64::from(self.level_fp) + i64::from(fade.delta);
            self.level_fp = next.clamp(0, 0xFF00) as u32;
        }
    }
}
