//! pixphys: pixel-space collision notifications over a rapier2d rigid-body world

pub mod api;
pub mod entity;
pub mod error;
pub mod grid;
pub mod handler;
pub mod hitbox;
pub mod narrowphase;
pub mod pair;
pub mod shape;
pub mod types;
pub mod units;
pub mod world;

mod engine;

pub use crate::api::*;
pub use crate::engine::BodyHandle;
pub use crate::entity::{BoundingBoxComponent, Entity, PhysicsComponent};
pub use crate::error::{PhysicsError, Result};
pub use crate::grid::CollisionGrid;
pub use crate::handler::HandlerRegistry;
pub use crate::hitbox::HitBox;
pub use crate::narrowphase::Narrowphase;
pub use crate::pair::{CollisionPair, PairSource, PairTracker, UnorderedPair};
pub use crate::shape::{EngineShape, Shape, ShapeKind};
pub use crate::types::*;
pub use crate::units::UnitConverter;
pub use crate::world::{PhysicsWorld, SensorId};
