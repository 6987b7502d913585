//! The host command decoder.
//!
//! The main game controller talks to the sound board one byte at a time
//! through a latch port, so multi-byte commands can arrive split across
//! any number of sample pulls. This parser keeps its position between
//! bytes and emits a [`Command`] when one completes.
//!
//! Wire formats:
//!
//! ```text
//!   aa bb               aa <= 54: load and play track aabb
//!   55 AA vol ~vol      set master volume
//!   55 Ax level ~level  set channel (x - AB) mixing level
//!   55 Bx byte ~byte    store channel (x - BA) reserved byte
//!   55 C2 / 55 C3       query software version major / minor
//! ```
//!
//! The fourth byte of the four-byte forms is the ones-complement of the
//! third, as a transmission check; a command that fails the check is
//! dropped. Unknown sequences are consumed silently.

/// A completed host command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    PlayTrack(u16),
    MasterVolume(u8),
    ChannelLevel { channel: usize, level: u8 },
    ChannelReserved { channel: usize, value: u8 },
    VersionQueryMajor,
    VersionQueryMinor,
}

/// Parser position within a command envelope.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) enum CommandState {
    #[default]
    Idle,
    /// Track command: high byte seen, low byte pending.
    TrackLow(u8),
    /// 0x55 seen, selector byte pending.
    Ext,
    /// 0x55 plus a selector that takes a value and its complement.
    ExtArgs { op: u8, value: Option<u8> },
}

impl CommandState {
    /// Feed one byte; returns a command when one completes.
    pub fn feed(&mut self, byte: u8, n_channels: usize) -> Option<Command> {
        match *self {
            CommandState::Idle => {
                match byte {
                    0x00..=0x54 => *self = CommandState::TrackLow(byte),
                    0x55 => *self = CommandState::Ext,
                    // bytes above 0x55 can't start a command
                    _ => {}
                }
                None
            }

            CommandState::TrackLow(high) => {
                *self = CommandState::Idle;
                Some(Command::PlayTrack((u16::from(high) << 8) | u16::from(byte)))
            }

            CommandState::Ext => match byte {
                0xC2 => {
                    *self = CommandState::Idle;
                    Some(Command::VersionQueryMajor)
                }
                0xC3 => {
                    *self = CommandState::Idle;
                    Some(Command::VersionQueryMinor)
                }
                0xA0..=0xBF => {
                    *self = CommandState::ExtArgs {
                        op: byte,
                        value: None,
                    };
                    None
                }
                _ => {
                    // unknown selector, envelope complete
                    *self = CommandState::Idle;
                    None
                }
            },

            CommandState::ExtArgs { op, value: None } => {
                *self = CommandState::ExtArgs {
                    op,
                    value: Some(byte),
                };
                None
            }

            CommandState::ExtArgs {
                op,
                value: Some(value),
            } => {
                *self = CommandState::Idle;
                if byte != !value {
                    // failed the complement check; drop the command
                    return None;
                }
                match op {
                    0xAA => Some(Command::MasterVolume(value)),
                    0xAB.. if usize::from(op - 0xAB) < n_channels => Some(Command::ChannelLevel {
                        channel: usize::from(op - 0xAB),
                        level: value,
                    }),
                    0xBA.. if usize::from(op - 0xBA) < n_channels => {
                        Some(Command::ChannelReserved {
                            channel: usize::from(op - 0xBA),
                            value,
                        })
                    }
                    _ => None,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
