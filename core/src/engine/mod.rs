//! The track-program playback engine.
//!
//! Runs the per-channel byte-code programs, binds streams to channels,
//! mixes the decoded frames, and services the host command port. The
//! engine works one 240-sample frame at a time; the boot/output state
//! machine in [`crate::decoder`] drives it and owns the error recovery.

mod channel;
mod command;

use std::collections::VecDeque;
use std::fmt;

use crate::FRAME_SAMPLES;
use crate::catalog::{Catalog, TrackType};
use crate::host::Host;
use crate::ident::{Identification, OsVersion};
use crate::rom::{RomPointer, RomSet};
use crate::stream::{FrameStatus, StreamDecoder};
use crate::track::{MAX_OPERANDS, operand_len};

use channel::{ActiveStream, Channel, Deferred, PendingStep, Program};
use command::{Command, CommandState};

pub use channel::DEFAULT_MIX_LEVEL;

/// A run-time decode failure. The original board software reset the DSP
/// when it hit one of these; here the fault travels up to the state
/// machine, which performs the equivalent soft reset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeFault {
    /// A track program contained an opcode outside the instruction set.
    UnknownOpcode { opcode: u8, channel: usize },
}

impl fmt::Display for DecodeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { opcode, channel } => write!(
                f,
                "invalid opcode ${opcode:02X} in the track program on channel {channel}"
            ),
        }
    }
}

impl std::error::Error for DecodeFault {}

/// Borrowed surroundings the engine needs while running: the ROM data,
/// what we know about it, and the two external collaborators.
pub struct EngineCtx<'a> {
    pub roms: &'a RomSet,
    pub ident: &'a Identification,
    pub catalog: &'a Catalog,
    pub streams: &'a mut dyn StreamDecoder,
    pub host: &'a mut dyn Host,
}

pub struct Engine {
    channels: Vec<Channel>,
    variables: [u8; 256],

    // host -> board data port
    queue: VecDeque<u8>,
    cmd: CommandState,

    master_volume: u8,

    // per-frame scratch
    mix: [i32; FRAME_SAMPLES],
    decoded: [i16; FRAME_SAMPLES],
}

impl Engine {
    pub fn new(n_channels: usize) -> Self {
        Self {
            channels: (0..n_channels).map(|_| Channel::new()).collect(),
            variables: [0; 256],
            queue: VecDeque::new(),
            cmd: CommandState::default(),
            master_volume: 0,
            mix: [0; FRAME_SAMPLES],
            decoded: [0; FRAME_SAMPLES],
        }
    }

    /// Reset to the soft-boot state: `n_channels` idle channels,
    /// variables zeroed, the given master volume in effect. The
    /// data-port queue survives a soft boot; only a hard boot clears it.
    pub fn soft_reset(&mut self, streams: &mut dyn StreamDecoder, n_channels: usize, volume: u8) {
        self.channels = (0..n_channels).map(|_| Channel::new()).collect();
        for i in 0..n_channels {
            streams.clear(i);
        }
        self.variables = [0; 256];
        self.cmd = CommandState::default();
        self.master_volume = volume;
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn master_volume(&self) -> u8 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: u8) {
        self.master_volume = volume;
    }

    /// Current mixing level of a channel, 0..255.
    pub fn channel_level(&self, channel: usize) -> u8 {
        self.channels.get(channel).map_or(0, |ch| ch.level())
    }

    /// Current value of a track-program variable.
    pub fn variable(&self, index: u8) -> u8 {
        self.variables[usize::from(index)]
    }

    /// The channel's stored 55 Bx byte. Kept for the wire protocol;
    /// playback never reads it.
    pub fn channel_reserved(&self, channel: usize) -> u8 {
        self.channels.get(channel).map_or(0, |ch| ch.reserved)
    }

    /// Queue a byte from the host. Bytes are consumed in FIFO order by
    /// the command handler at the next sample pull.
    pub fn write_data_port(&mut self, byte: u8) {
        self.queue.push_back(byte);
    }

    /// Drop all pending host bytes.
    pub fn clear_data_port(&mut self) {
        self.queue.clear();
        self.cmd = CommandState::default();
    }

    pub fn data_port_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Consume every queued host byte, dispatching completed commands.
    pub fn run_commands(&mut self, ctx: &mut EngineCtx) {
        while let Some(byte) = self.queue.pop_front() {
            let Some(cmd) = self.cmd.feed(byte, self.channels.len()) else {
                continue;
            };
            match cmd {
                Command::PlayTrack(track) => {
                    log::trace!("host: play track {track:#06x}");
                    self.load_track(ctx, track);
                }
                Command::MasterVolume(volume) => {
                    log::debug!("host: master volume {volume}");
                    self.master_volume = volume;
                }
                Command::ChannelLevel { channel, level } => {
                    self.channels[channel].set_level(level);
                }
                Command::ChannelReserved { channel, value } => {
                    self.channels[channel].reserved = value;
                }
                Command::VersionQueryMajor | Command::VersionQueryMinor => {
                    // only the audio/video board software answers these
                    if ctx.ident.os == OsVersion::Os95 {
                        let version = ctx.ident.version_number();
                        let reply = if cmd == Command::VersionQueryMajor {
                            (version >> 8) as u8
                        } else {
                            version as u8
                        };
                        ctx.host.receive_data_port(reply);
                    }
                }
            }
        }
    }

    /// Run one frame: advance the track programs, pull a frame from
    /// every active stream, step fades, and mix into `out`.
    pub fn run_frame(
        &mut self,
        ctx: &mut EngineCtx,
        out: &mut [i16; FRAME_SAMPLES],
    ) -> Result<(), DecodeFault> {
        for i in 0..self.channels.len() {
            self.step_program(ctx, i)?;
        }

        self.mix = [0; FRAME_SAMPLES];
        for i in 0..self.channels.len() {
            if self.channels[i].stream.is_some() {
                let level = self.channels[i].level();
                let status = ctx.streams.next_frame(ctx.roms, i, &mut self.decoded, level);
                for (acc, &s) in self.mix.iter_mut().zip(&self.decoded) {
                    *acc += i32::from(s);
                }
                if status == FrameStatus::Done {
                    self.wrap_stream(ctx, i);
                }
            }
            self.channels[i].step_fade();
        }

        let gain = master_gain(self.master_volume);
        for (o, &acc) in out.iter_mut().zip(&self.mix) {
            let scaled = (i64::from(acc) * i64::from(gain)) >> 16;
            *o = scaled.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16;
        }
        Ok(())
    }

    // -- track program execution --------------------------------------------

    /// Advance one channel's program by one frame: count down any delay,
    /// then execute instructions until one imposes a new delay or the
    /// program ends.
    fn step_program(&mut self, ctx: &mut EngineCtx, i: usize) -> Result<(), DecodeFault> {
        if let Some(prog) = self.channels[i].program.as_mut()
            && !prog.halted
            && prog.countdown > 0
        {
            prog.countdown -= 1;
        }

        // A degenerate program can loop forever without ever imposing a
        // delay (an infinite loop whose body is all zero-delay steps).
        // Such a program can never make progress, so after a generous
        // budget it is parked the same way an infinite wait parks it:
        // frozen, with its streams still playing.
        let mut budget = 1024;

        loop {
            if budget == 0 {
                if let Some(prog) = self.channels[i].program.as_mut() {
                    prog.halted = true;
                }
                log::warn!("channel {i}: zero-delay program never yields, parking it");
                break;
            }
            budget -= 1;
            // Re-borrow every iteration: an executed instruction may
            // have replaced or cleared this channel's program.
            let Some(prog) = self.channels[i].program.as_mut() else {
                break;
            };
            if prog.halted || prog.countdown > 0 {
                break;
            }

            if let Some(step) = prog.pending.take() {
                self.execute(ctx, i, step);
                continue;
            }

            let delay = prog.pc.get_u16(ctx.roms);
            if delay == 0xFFFF {
                // infinite wait: the program parks here forever while
                // the channel's streams keep playing
                prog.halted = true;
                break;
            }
            let opcode = prog.pc.get_u8(ctx.roms);
            let Some(n_operands) = operand_len(opcode, ctx.ident.os) else {
                log::warn!("channel {i}: invalid opcode ${opcode:02X}, requesting reset");
                return Err(DecodeFault::UnknownOpcode { opcode, channel: i });
            };
            let mut operands = [0u8; MAX_OPERANDS];
            for slot in operands.iter_mut().take(n_operands) {
                *slot = prog.pc.get_u8(ctx.roms);
            }

            let step = PendingStep { opcode, operands };
            if delay > 0 {
                prog.countdown = delay;
                prog.pending = Some(step);
                break;
            }
            self.execute(ctx, i, step);
        }
        Ok(())
    }

    /// Execute one decoded instruction on behalf of channel `i`.
    fn execute(&mut self, ctx: &mut EngineCtx, i: usize, step: PendingStep) {
        let ops = &step.operands;
        match step.opcode {
            0x00 => {
                self.channels[i].program = None;
            }
            0x01 => {
                let target = usize::from(ops[0]);
                let addr =
                    (u32::from(ops[1]) << 16) | (u32::from(ops[2]) << 8) | u32::from(ops[3]);
                self.load_stream(ctx, target, addr, ops[4]);
            }
            0x02 => {
                self.clear_channel(ctx, usize::from(ops[0]));
            }
            0x03 => {
                let track = (u16::from(ops[0]) << 8) | u16::from(ops[1]);
                self.load_track(ctx, track);
            }
            0x04 => {
                // a zero byte is suppressed; the extra channel-timer
                // operand of the first 1993 software is accepted unused
                if ops[0] != 0 {
                    ctx.host.receive_data_port(ops[0]);
                }
            }
            0x05 => {
                self.start_deferred(ctx, usize::from(ops[0]));
            }
            0x06 => {
                self.variables[usize::from(ops[0])] = ops[1];
            }
            0x07..=0x09 => {
                if let Some(ch) = self.channels.get_mut(usize::from(ops[0])) {
                    ch.set_level(stepped_level(step.opcode - 0x07, ch.level(), ops[1]));
                }
            }
            0x0A..=0x0C => {
                let steps = (u16::from(ops[2]) << 8) | u16::from(ops[3]);
                if let Some(ch) = self.channels.get_mut(usize::from(ops[0])) {
                    let target = stepped_level(step.opcode - 0x0A, ch.level(), ops[1]);
                    ch.start_fade(target, steps);
                }
            }
            0x0D => {}
            0x0E => {
                if let Some(prog) = self.channels[i].program.as_mut() {
                    prog.loops.push(channel::LoopFrame {
                        start: prog.pc,
                        count: ops[0],
                    });
                }
            }
            0x0F => {
                if let Some(prog) = self.channels[i].program.as_mut()
                    && let Some(top) = prog.loops.last_mut()
                {
                    if top.count == 0 {
                        // infinite loop: always branch back
                        prog.pc = top.start;
                    } else {
                        top.count -= 1;
                        if top.count > 0 {
                            prog.pc = top.start;
                        } else {
                            prog.loops.pop();
                        }
                    }
                }
                // a loop end with no open loop is tolerated silently
            }
            // reserved opcodes: operands consumed, no visible effect
            0x10..=0x12 => {}
            other => {
                // decode rejected everything else before we got here
                debug_assert!(false, "undecodable opcode {other:#04x} reached execute");
            }
        }
    }

    // -- channel operations --------------------------------------------------

    /// Bind a stream to a channel (opcode 0x01).
    fn load_stream(&mut self, ctx: &mut EngineCtx, target: usize, addr: u32, repeats: u8) {
        let Some(ch) = self.channels.get_mut(target) else {
            return;
        };
        let start = RomPointer::from_linear(addr, ctx.ident.hw);
        ch.stream = Some(ActiveStream { start, repeats });
        let level = ch.level();
        ctx.streams.load(ctx.roms, target, start, level);
    }

    /// Stop everything on a channel: stream, program, and any armed
    /// deferred track (opcode 0x02 and the deferred failure path).
    fn clear_channel(&mut self, ctx: &mut EngineCtx, target: usize) {
        let Some(ch) = self.channels.get_mut(target) else {
            return;
        };
        ch.stream = None;
        ch.program = None;
        ch.deferred = Deferred::None;
        ctx.streams.clear(target);
    }

    /// Load a track by number. A program track starts on its own channel
    /// immediately; deferred tracks arm that channel's deferred slot.
    /// Absent or malformed tracks are ignored.
    fn load_track(&mut self, ctx: &mut EngineCtx, track: u16) {
        let Some(info) = ctx.catalog.track_info(ctx.roms, ctx.ident, track) else {
            log::debug!("track {track:#06x} absent, ignored");
            return;
        };
        let target = usize::from(info.channel);
        let Some(ch) = self.channels.get_mut(target) else {
            return;
        };

        match info.track_type {
            TrackType::Program => {
                let mut pc = RomPointer::from_linear(info.address, ctx.ident.hw);
                pc.advance(2); // skip the type and channel bytes
                ch.program = Some(Program::new(pc));
            }
            TrackType::Deferred => {
                ch.deferred = Deferred::Track(info.defer_code);
            }
            TrackType::DeferredIndirect => {
                ch.deferred = Deferred::Indirect {
                    var: (info.defer_code >> 8) as u8,
                    table: (info.defer_code & 0xFF) as u8,
                };
            }
        }
    }

    /// Trigger a channel's armed deferred track (opcode 0x05).
    fn start_deferred(&mut self, ctx: &mut EngineCtx, target: usize) {
        let Some(ch) = self.channels.get_mut(target) else {
            return;
        };
        match std::mem::take(&mut ch.deferred) {
            Deferred::None => {}
            Deferred::Track(track) => self.load_track(ctx, track),
            Deferred::Indirect { var, table } => {
                // resolve through the deferred-indirect table index
                let table_addr = ctx
                    .roms
                    .read_u24(0, ctx.catalog.indirect_index + u32::from(table) * 3);
                if table_addr & 0x00FF_0000 == 0x00FF_0000 {
                    // undefined table: treat as an absent track
                    self.clear_channel(ctx, target);
                    return;
                }
                let mut p = RomPointer::from_linear(table_addr, ctx.ident.hw);
                p.advance(i32::from(self.variables[usize::from(var)]) * 2);
                let track = p.peek_u16(ctx.roms);
                if ctx.catalog.track_info(ctx.roms, ctx.ident, track).is_some() {
                    self.load_track(ctx, track);
                } else {
                    self.clear_channel(ctx, target);
                }
            }
        }
    }

    /// Advance a stream that just played its last frame: repeat it or
    /// clear the channel, according to its remaining play count.
    fn wrap_stream(&mut self, ctx: &mut EngineCtx, i: usize) {
        let Some(ch) = self.channels.get_mut(i) else {
            return;
        };
        let (start, repeats) = match ch.stream.as_ref() {
            Some(s) => (s.start, s.repeats),
            None => return,
        };
        match repeats {
            0 => {
                // loop forever: rewind for the next pass
                let level = ch.level();
                ctx.streams.load(ctx.roms, i, start, level);
            }
            1 => {
                // that was the last pass
                ch.stream = None;
                ctx.streams.clear(i);
            }
            _ => {
                if let Some(s) = ch.stream.as_mut() {
                    s.repeats -= 1;
                }
                let level = ch.level();
                ctx.streams.load(ctx.roms, i, start, level);
            }
        }
    }
}

/// Apply an immediate or fade level opcode: variant 0 sets the level,
/// 1 raises it, 2 lowers it, saturating at the 0..255 rails.
fn stepped_level(variant: u8, current: u8, amount: u8) -> u8 {
    match variant {
        0 => amount,
        1 => current.saturating_add(amount),
        _ => current.saturating_sub(amount),
    }
}

/// Master volume gain in Q16: 0 mutes, 255 is unity, with a quadratic
/// taper between for a roughly logarithmic perceived response.
fn master_gain(volume: u8) -> u32 {
    let v = u32::from(volume);
    (v * v * 65536) / (255 * 255)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
