//! Input Commands
//!
//! Parses controller command strings into validated `InputCmd`s.
//!
//! A command arrives as two strings: `"<cmd>=<issuedAtTick>"` and a
//! direction parameter, e.g. `("move=12", "north")`.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::coord::{Direction, UnknownDirection};
use crate::core::time::WorldTime;

// =============================================================================
// ERRORS
// =============================================================================

/// Validation faults for controller input. Entity state is never touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Command string has no `=<tick>` part.
    #[error("command {0:?} is missing its issue tick")]
    MissingTick(String),

    /// The tick after `=` is not an integer.
    #[error("invalid issue tick: {0}")]
    InvalidTick(#[from] ParseIntError),

    /// Not one of `move` / `moveCancel`.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// Not one of north/east/south/west.
    #[error(transparent)]
    UnknownDirection(#[from] UnknownDirection),
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Command verb.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Queue a move request
    #[serde(rename = "move")]
    Move,
    /// Cancel a queued move request in the same direction
    #[serde(rename = "moveCancel")]
    MoveCancel,
}

impl CommandKind {
    /// Wire name of the verb.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Move => "move",
            CommandKind::MoveCancel => "moveCancel",
        }
    }
}

impl FromStr for CommandKind {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "move" => Ok(CommandKind::Move),
            "moveCancel" => Ok(CommandKind::MoveCancel),
            other => Err(InputError::UnknownCommand(other.to_string())),
        }
    }
}

/// A validated controller command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCmd {
    /// Tick the client issued the command at
    pub issued_at: WorldTime,
    /// Verb
    pub kind: CommandKind,
    /// Direction parameter
    pub direction: Direction,
}

impl InputCmd {
    /// Create a command directly.
    pub const fn new(issued_at: WorldTime, kind: CommandKind, direction: Direction) -> Self {
        Self { issued_at, kind, direction }
    }

    /// Shorthand for a move command.
    pub const fn move_to(issued_at: WorldTime, direction: Direction) -> Self {
        Self::new(issued_at, CommandKind::Move, direction)
    }

    /// Shorthand for a move cancel command.
    pub const fn cancel(issued_at: WorldTime, direction: Direction) -> Self {
        Self::new(issued_at, CommandKind::MoveCancel, direction)
    }

    /// Parse `("move=12", "north")`.
    ///
    /// The tick is parsed before the verb and direction, so a malformed tick
    /// is reported even when the rest is also wrong.
    pub fn parse(cmd: &str, params: &str) -> Result<Self, InputError> {
        let (verb, tick) = cmd
            .split_once('=')
            .ok_or_else(|| InputError::MissingTick(cmd.to_string()))?;

        let issued_at = tick.parse::<WorldTime>()?;
        let kind = verb.parse::<CommandKind>()?;
        let direction = params.parse::<Direction>()?;

        Ok(Self { issued_at, kind, direction })
    }
}

impl fmt::Display for InputCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} {}", self.kind.as_str(), self.issued_at, self.direction)
    }
}
