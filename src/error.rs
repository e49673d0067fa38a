use thiserror::Error;

use crate::types::EntityId;

/// Errors raised by shape construction and world operations.
///
/// Two families exist: invalid arguments (bad geometry or configuration, caught
/// at construction) and illegal states (calls that do not fit the current
/// registration state of an entity). Neither is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("{kind} requires at least {required} points, got {actual}")]
    TooFewPoints {
        kind: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("{what} must be finite and > 0, got {value}")]
    InvalidDimension { what: &'static str, value: f32 },

    #[error("pixels per meter must be finite and > 0, got {0}")]
    InvalidPixelsPerMeter(f32),

    #[error("grid cell size must be > 0, got {0}x{1}")]
    InvalidCellSize(f32, f32),

    #[error("degenerate shape: {0}")]
    DegenerateShape(String),

    #[error("entity {0:?} is not registered with the physics world")]
    UnknownEntity(EntityId),

    #[error("physics body has not been created yet (entity not added to a world)")]
    BodyNotCreated,

    #[error("entity {0:?} has no physics component")]
    NoBody(EntityId),

    #[error("entity {0:?} already has a physics body")]
    AlreadyRegistered(EntityId),

    #[error("entity {0:?} has no hit box or sensor named '{1}'")]
    UnknownHitBox(EntityId, String),
}

impl PhysicsError {
    /// Malformed input detected before any engine interaction.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            PhysicsError::TooFewPoints { .. }
                | PhysicsError::InvalidDimension { .. }
                | PhysicsError::InvalidPixelsPerMeter(_)
                | PhysicsError::InvalidCellSize(..)
                | PhysicsError::DegenerateShape(_)
        )
    }

    /// Programmer error: the call does not match the entity's registration state.
    pub fn is_illegal_state(&self) -> bool {
        !self.is_invalid_argument()
    }
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
