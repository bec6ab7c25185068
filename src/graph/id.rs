//! Identity types for the module graph.
//!
//! `ModuleId` is a newtype over `u32` that doubles as the index into the
//! graph's module slots. `PortId` addresses one port of one module by
//! (direction, kind, index-within-kind).

use crate::graph::port::{PortDirection, PortKind};
use std::fmt;

/// Index into `Graph::modules`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl ModuleId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({})", self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Uniform port address: which module, which side, which payload kind, and
/// the slot index among that module's ports of the same side and kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId {
    pub module: ModuleId,
    pub direction: PortDirection,
    pub kind: PortKind,
    pub index: u16,
}

impl PortId {
    pub const fn input(module: ModuleId, kind: PortKind, index: u16) -> Self {
        Self {
            module,
            direction: PortDirection::Input,
            kind,
            index,
        }
    }

    pub const fn output(module: ModuleId, kind: PortKind, index: u16) -> Self {
        Self {
            module,
            direction: PortDirection::Output,
            kind,
            index,
        }
    }

    #[inline]
    pub fn is_input(self) -> bool {
        self.direction == PortDirection::Input
    }

    #[inline]
    pub fn is_output(self) -> bool {
        self.direction == PortDirection::Output
    }
}

impl fmt::Debug for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.direction {
            PortDirection::Input => "in",
            PortDirection::Output => "out",
        };
        write!(
            f,
            "PortId(module={}, {}:{}#{})",
            self.module.0,
            side,
            self.kind.name(),
            self.index
        )
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
