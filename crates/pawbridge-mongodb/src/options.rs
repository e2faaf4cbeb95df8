//! Per-call options

use crate::format::OutputShape;

/// Verbosity of the logs emitted on behalf of one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DebugLevel {
    #[default]
    Off,
    Low,
    Med,
    High,
    Tmi,
    WayTmi,
}

impl DebugLevel {
    /// True when this call asked for at least `level`
    pub fn at_least(self, level: DebugLevel) -> bool {
        self != DebugLevel::Off && self >= level
    }

    /// Map the numeric ladder (0 = off, 5 = everything) used by callers
    pub fn from_number(level: u8) -> Self {
        match level {
            0 => DebugLevel::Off,
            1 => DebugLevel::Low,
            2 => DebugLevel::Med,
            3 => DebugLevel::High,
            4 => DebugLevel::Tmi,
            _ => DebugLevel::WayTmi,
        }
    }
}

/// Options accepted by every public operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub debug: DebugLevel,
    pub shape: OutputShape,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(mut self, debug: DebugLevel) -> Self {
        self.debug = debug;
        self
    }

    pub fn shape(mut self, shape: OutputShape) -> Self {
        self.shape = shape;
        self
    }
}
