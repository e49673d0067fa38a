use glam::Vec2;

use crate::entity::Entity;
use crate::hitbox::HitBox;
use crate::types::*;

/// Pixel ↔ meter conversion used to feed the rigid-body engine.
///
/// Pixel space is y-down; physics space is y-up. Scalars only scale, vectors also
/// negate Y, points also reflect about the app height.
pub trait PhysicsUnitConverter {
    fn to_meters(&self, pixels: f32) -> f32;

    fn to_pixels(&self, meters: f32) -> f32;

    /// Height of the pixel world used by point conversion.
    fn app_height(&self) -> f32;

    /// Pixel-space vector (direction, offset, velocity) to physics space.
    fn to_physics_vector(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.to_meters(v.x), -self.to_meters(v.y))
    }

    fn to_pixel_vector(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.to_pixels(v.x), -self.to_pixels(v.y))
    }

    /// Pixel-space location to physics space.
    fn to_physics_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(self.to_meters(p.x), self.to_meters(self.app_height() - p.y))
    }

    fn to_pixel_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(self.to_pixels(p.x), self.to_pixels(self.to_meters(self.app_height()) - p.y))
    }
}

/// Exact overlap tests that run without the rigid-body engine.
pub trait NarrowphaseApi {
    /// Separating-axis test between two rectangles, each rotated by its angle
    /// (degrees) about its own center.
    fn is_colliding(box_a: Rect, box_b: Rect, angle_a: f32, angle_b: f32) -> bool;

    /// Axis-aligned rectangle overlap, edges inclusive.
    fn overlap_rect_rect(a: &Rect, b: &Rect) -> bool;
}

/// Callbacks for one registered pair of entity types.
///
/// Arguments always arrive in the declared type order of the registration,
/// whichever entity the engine or the overlap pass saw first.
#[allow(unused_variables)]
pub trait CollisionHandler<T: EntityType> {
    /// Fired once, right before [`Self::on_collision_begin`], with the hit boxes
    /// that started the contact.
    fn on_hit_box_trigger(&mut self, a: &mut Entity<T>, b: &mut Entity<T>, box_a: &HitBox, box_b: &HitBox) {}

    fn on_collision_begin(&mut self, a: &mut Entity<T>, b: &mut Entity<T>) {}

    /// Fired every tick while the pair stays in contact, including the first.
    fn on_collision(&mut self, a: &mut Entity<T>, b: &mut Entity<T>) {}

    fn on_collision_end(&mut self, a: &mut Entity<T>, b: &mut Entity<T>) {}
}

/// Callbacks for a sensor hit box; `other` is the entity inside the sensor.
#[allow(unused_variables)]
pub trait SensorCollisionHandler<T: EntityType> {
    fn on_collision_begin(&mut self, other: &mut Entity<T>) {}

    fn on_collision(&mut self, other: &mut Entity<T>) {}

    fn on_collision_end(&mut self, other: &mut Entity<T>) {}
}
