use std::fmt::Debug;
use std::hash::Hash;

use glam::Vec2;
use slotmap::new_key_type;

new_key_type! {
    /// Stable handle of an entity registered with a [`crate::PhysicsWorld`].
    pub struct EntityId;
}

/// Type tag used as the collision handler registration key (usually a small enum).
pub trait EntityType: Copy + Eq + Hash + Debug + 'static {}

impl<T: Copy + Eq + Hash + Debug + 'static> EntityType for T {}

/// Axis-aligned rectangle in pixel space (`min` is the top-left corner).
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    /// Rectangle from its top-left corner and size.
    pub fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self::new(origin, origin + size)
    }

    pub fn from_center_size(center: Vec2, size: Vec2) -> Self {
        Self::new(center - size * 0.5, center + size * 0.5)
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn translate(&self, by: Vec2) -> Rect {
        Rect { min: self.min + by, max: self.max + by }
    }

    /// Smallest rectangle containing all `points`; `None` for an empty iterator.
    pub fn enclosing(points: impl IntoIterator<Item = Vec2>) -> Option<Rect> {
        points.into_iter().fold(None, |acc: Option<Rect>, p| match acc {
            Some(r) => Some(Rect { min: r.min.min(p), max: r.max.max(p) }),
            None => Some(Rect { min: p, max: p }),
        })
    }

    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }
}

/// Rotate `p` by `degrees` about `origin` (clockwise on a y-down screen).
pub fn rotate_about(p: Vec2, origin: Vec2, degrees: f32) -> Vec2 {
    if degrees == 0.0 {
        return p;
    }
    origin + Vec2::from_angle(degrees.to_radians()).rotate(p - origin)
}

/// Local-to-world transform of a game object, in pixels.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    /// World position of the local (0, 0) point.
    pub position: Vec2,
    /// Rotation in degrees.
    pub rotation: f32,
    /// Local pivot of `rotation`.
    pub rotation_origin: Vec2,
    pub scale: Vec2,
    /// Local pivot of `scale`.
    pub scale_origin: Vec2,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            rotation_origin: Vec2::ZERO,
            scale: Vec2::ONE,
            scale_origin: Vec2::ZERO,
        }
    }
}

impl Transform {
    pub fn at(position: Vec2) -> Self {
        Self { position, ..Default::default() }
    }

    /// Apply scale about `scale_origin`; the result is still in local space.
    pub fn scale_point(&self, local: Vec2) -> Vec2 {
        self.scale_origin + (local - self.scale_origin) * self.scale
    }

    /// Scale both corners of a local rectangle, keeping min/max ordered for negative scales.
    pub fn scale_rect(&self, local: &Rect) -> Rect {
        Rect::new(self.scale_point(local.min), self.scale_point(local.max))
    }

    /// Map an already scaled local point to world space.
    pub fn place(&self, scaled: Vec2) -> Vec2 {
        self.position + rotate_about(scaled, self.rotation_origin, self.rotation)
    }

    /// Full local-to-world mapping.
    pub fn apply(&self, local: Vec2) -> Vec2 {
        self.place(self.scale_point(local))
    }
}

/// Rigid-body simulation mode of a physics body.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyType {
    /// Never moves; chain shapes belong here.
    #[default]
    Static,
    /// Moved by velocity only, unaffected by forces.
    Kinematic,
    Dynamic,
}

/// Body-creation overrides, consumed once when the body is built.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BodyDef {
    pub body_type: BodyType,
    pub fixed_rotation: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    /// Enables the engine's continuous collision for fast movers.
    pub bullet: bool,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            fixed_rotation: false,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            bullet: false,
        }
    }
}

/// Fixture material shared by every hit box of a body.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixtureDef {
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
}

impl Default for FixtureDef {
    fn default() -> Self {
        Self { density: 1.0, friction: 0.2, restitution: 0.0 }
    }
}

/// Nearest hit of [`crate::PhysicsWorld::raycast`]; both fields are `None` on a miss.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct RaycastResult {
    pub entity: Option<EntityId>,
    /// Hit point in pixels.
    pub point: Option<Vec2>,
}

impl RaycastResult {
    pub const NONE: RaycastResult = RaycastResult { entity: None, point: None };

    pub fn is_hit(&self) -> bool {
        self.entity.is_some()
    }
}

/// How candidate pairs for the overlap (SAT) pass are produced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CollisionDetectionStrategy {
    /// Every collidable entity against every other.
    #[default]
    BruteForce,
    /// Only entities sharing a cell of the spatial grid.
    GridIndexing,
}

/// World-level configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldConfig {
    /// Fixed pixel-to-meter scale; must be > 0.
    pub pixels_per_meter: f32,
    /// Height of the pixel world, used to flip points into the y-up physics space.
    pub app_height: f32,
    /// Initial gravity in meters / s² (physics space, y up).
    pub gravity: Vec2,
    pub strategy: CollisionDetectionStrategy,
    pub cell_width: f32,
    pub cell_height: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            pixels_per_meter: 50.0,
            app_height: 600.0,
            gravity: Vec2::new(0.0, -10.0),
            strategy: CollisionDetectionStrategy::BruteForce,
            cell_width: 64.0,
            cell_height: 64.0,
        }
    }
}
