//! Scheduler priority levels.
//!
//! The cooperative scheduler that maps these classes to wall-clock deadlines
//! lives outside this crate; only the ordering is needed here.

use std::fmt;
use std::str::FromStr;

/// Scheduling class, ordered `NoPriority < Immediate < ... < Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityLevel {
    #[default]
    NoPriority,
    /// Must run synchronously.
    Immediate,
    /// Result of a user interaction (click, key press).
    UserBlocking,
    Normal,
    /// May be deferred but must eventually finish.
    Low,
    /// Never expires; runs only when nothing else is pending.
    Idle,
}

impl PriorityLevel {
    pub const ALL: [PriorityLevel; 6] = [
        PriorityLevel::NoPriority,
        PriorityLevel::Immediate,
        PriorityLevel::UserBlocking,
        PriorityLevel::Normal,
        PriorityLevel::Low,
        PriorityLevel::Idle,
    ];

    pub const fn as_u8(self) -> u8 {
        match self {
            Self::NoPriority => 0,
            Self::Immediate => 1,
            Self::UserBlocking => 2,
            Self::Normal => 3,
            Self::Low => 4,
            Self::Idle => 5,
        }
    }

    pub const fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::NoPriority),
            1 => Some(Self::Immediate),
            2 => Some(Self::UserBlocking),
            3 => Some(Self::Normal),
            4 => Some(Self::Low),
            5 => Some(Self::Idle),
            _ => None,
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPriority => write!(f, "none"),
            Self::Immediate => write!(f, "immediate"),
            Self::UserBlocking => write!(f, "user_blocking"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

impl FromStr for PriorityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::NoPriority),
            "immediate" => Ok(Self::Immediate),
            "user_blocking" => Ok(Self::UserBlocking),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            "idle" => Ok(Self::Idle),
            _ => Err(format!("Unknown priority level: {}", s)),
        }
    }
}
