//! Graph-specific error types.

use crate::graph::id::{ModuleId, PortId};
use crate::graph::port::PortKind;
use thiserror::Error;

/// Errors that can occur within the module graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Kind mismatch: output carries {output}, input expects {input}")]
    KindMismatch { output: PortKind, input: PortKind },

    #[error("Invalid kernel: {0}")]
    InvalidKernel(String),

    #[error("Unsupported sample type: {0}")]
    UnsupportedSampleType(String),

    #[error("Module {module:?} declares {count} {kind} ports, only one is supported")]
    UnsupportedArity {
        module: ModuleId,
        kind: PortKind,
        count: usize,
    },

    #[error("Module '{module}' arity table must declare {kind} exactly once")]
    IncompleteArityDeclaration { module: String, kind: PortKind },

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Invalid parameter for '{module}': {message}")]
    InvalidParameter { module: String, message: String },

    #[error("Unknown module {0:?}")]
    UnknownModule(ModuleId),

    #[error("Unknown port {0:?}")]
    UnknownPort(PortId),

    #[error("Port {0:?} has the wrong direction for this operation")]
    DirectionMismatch(PortId),

    #[error("Cannot connect module {0:?} to itself")]
    SelfConnection(ModuleId),

    #[error("Connecting {from:?} -> {to:?} would create a cycle")]
    CycleDetected { from: ModuleId, to: ModuleId },

    #[error("Voxel size x ({x}) and y ({y}) differ, which volume rendering does not support")]
    AnisotropicVoxels { x: f64, y: f64 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mismatch_display() {
        let err = GraphError::KindMismatch {
            output: PortKind::Scene,
            input: PortKind::Image,
        };
        assert_eq!(
            err.to_string(),
            "Kind mismatch: output carries scene, input expects image"
        );
    }

    #[test]
    fn test_arity_display() {
        let err = GraphError::IncompleteArityDeclaration {
            module: "Broken".into(),
            kind: PortKind::Base,
        };
        assert!(err.to_string().contains("base exactly once"));
    }
}
