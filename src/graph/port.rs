//! Port declarations for the module system.
//!
//! Each module declares its arity per payload kind via static `PortArity`
//! arrays, one for inputs and one for outputs. Every table must name all three
//! kinds exactly once, even when the count is zero.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of payload carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// Image volume plus its deferred kernel chain.
    Image,
    /// Renderable scene node.
    Scene,
    /// Scalar or string value.
    Base,
}

impl PortKind {
    /// All kinds, in notification order.
    pub const ALL: [PortKind; 3] = [PortKind::Image, PortKind::Scene, PortKind::Base];

    pub fn name(self) -> &'static str {
        match self {
            PortKind::Image => "image",
            PortKind::Scene => "scene",
            PortKind::Base => "base",
        }
    }

    #[inline]
    fn slot(self) -> usize {
        match self {
            PortKind::Image => 0,
            PortKind::Scene => 1,
            PortKind::Base => 2,
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Static arity entry: how many ports of `kind` a module declares on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortArity {
    pub kind: PortKind,
    pub count: usize,
}

impl PortArity {
    pub const fn new(kind: PortKind, count: usize) -> Self {
        Self { kind, count }
    }
}

/// Resolved per-kind port counts for one side of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortCounts([usize; 3]);

impl PortCounts {
    /// Resolve a declaration table. Returns the first kind that is missing or
    /// declared more than once.
    pub fn resolve(table: &[PortArity]) -> Result<Self, PortKind> {
        let mut counts = [0usize; 3];
        let mut seen = [false; 3];
        for entry in table {
            let slot = entry.kind.slot();
            if seen[slot] {
                return Err(entry.kind);
            }
            seen[slot] = true;
            counts[slot] = entry.count;
        }
        for kind in PortKind::ALL {
            if !seen[kind.slot()] {
                return Err(kind);
            }
        }
        Ok(Self(counts))
    }

    #[inline]
    pub fn get(&self, kind: PortKind) -> usize {
        self.0[kind.slot()]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

/// One value per payload kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerKind<T> {
    image: T,
    scene: T,
    base: T,
}

impl<T> PerKind<T> {
    pub fn from_fn(mut f: impl FnMut(PortKind) -> T) -> Self {
        Self {
            image: f(PortKind::Image),
            scene: f(PortKind::Scene),
            base: f(PortKind::Base),
        }
    }

    pub fn get(&self, kind: PortKind) -> &T {
        match kind {
            PortKind::Image => &self.image,
            PortKind::Scene => &self.scene,
            PortKind::Base => &self.base,
        }
    }

    pub fn get_mut(&mut self, kind: PortKind) -> &mut T {
        match kind {
            PortKind::Image => &mut self.image,
            PortKind::Scene => &mut self.scene,
            PortKind::Base => &mut self.base,
        }
    }

    /// Values in notification order.
    pub fn iter(&self) -> impl Iterator<Item = (PortKind, &T)> {
        PortKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

/// Arity table with zero ports of every kind.
pub static NO_PORTS: &[PortArity] = &[
    PortArity::new(PortKind::Image, 0),
    PortArity::new(PortKind::Scene, 0),
    PortArity::new(PortKind::Base, 0),
];
