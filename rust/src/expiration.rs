//! Expiration times and root tags.
//!
//! An expiration time is the priority currency used by every scheduling
//! decision in this crate. Larger values are more urgent; `SYNC` is the
//! maximum and must be processed synchronously, `NO_WORK` is the absent
//! value and sorts below everything else.

use std::fmt;

/// Max 31 bit integer. The largest expiration time that can be represented.
pub const MAX_SIGNED_31_BIT_INT: u32 = 1_073_741_823;

/// Totally ordered priority token for updates, passes, and root ranges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpirationTime(u32);

impl ExpirationTime {
    /// No pending work.
    pub const NO_WORK: Self = Self(0);
    /// Work that never expires on its own (offscreen, hidden).
    pub const NEVER: Self = Self(1);
    /// Idle work, just above `NEVER`.
    pub const IDLE: Self = Self(2);
    /// Must run synchronously. Nothing is more urgent.
    pub const SYNC: Self = Self(MAX_SIGNED_31_BIT_INT);
    /// Batched synchronous work, one step below `SYNC`.
    pub const BATCHED: Self = Self(MAX_SIGNED_31_BIT_INT - 1);

    /// Build an expiration time from a raw value, clamped to `SYNC`.
    pub const fn new(value: u32) -> Self {
        if value > MAX_SIGNED_31_BIT_INT {
            Self::SYNC
        } else {
            Self(value)
        }
    }

    /// Raw numeric value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_no_work(self) -> bool {
        self.0 == 0
    }

    /// The next more urgent time (`T + 1`), saturating at `SYNC`.
    #[inline]
    pub const fn more_urgent(self) -> Self {
        Self::new(self.0.saturating_add(1))
    }

    /// The next less urgent time (`T - 1`), saturating at `NO_WORK`.
    #[inline]
    pub const fn less_urgent(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl From<u32> for ExpirationTime {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<ExpirationTime> for u32 {
    fn from(time: ExpirationTime) -> Self {
        time.0
    }
}

impl fmt::Display for ExpirationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NO_WORK => write!(f, "NoWork"),
            Self::NEVER => write!(f, "Never"),
            Self::IDLE => write!(f, "Idle"),
            Self::SYNC => write!(f, "Sync"),
            Self::BATCHED => write!(f, "Batched"),
            Self(value) => write!(f, "{}", value),
        }
    }
}

/// The mode a work root was created in.
///
/// Carried for the external scheduler; the queue and tracker never branch on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RootTag {
    #[default]
    Legacy,
    Blocking,
    Concurrent,
}

impl RootTag {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Legacy => 0,
            Self::Blocking => 1,
            Self::Concurrent => 2,
        }
    }

    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Legacy),
            1 => Some(Self::Blocking),
            2 => Some(Self::Concurrent),
            _ => None,
        }
    }
}

impl fmt::Display for RootTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Blocking => write!(f, "blocking"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}
