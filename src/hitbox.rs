use glam::Vec2;

use crate::shape::Shape;
use crate::types::*;

/// A named shape placed in an entity's local space.
///
/// Names are not unique; they let handlers tell apart the boxes of an entity
/// that carries several.
#[derive(Clone, Debug, PartialEq)]
pub struct HitBox {
    name: String,
    origin: Vec2,
    shape: Shape,
}

impl HitBox {
    pub fn new(name: impl Into<String>, origin: Vec2, shape: Shape) -> HitBox {
        HitBox { name: name.into(), origin, shape }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local min-corner offset of the box.
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Unscaled bounds in entity-local space.
    pub fn local_bounds(&self) -> Rect {
        Rect::from_origin_size(self.origin + self.shape.min(), self.shape.size())
    }

    pub fn center_local(&self) -> Vec2 {
        self.origin + self.shape.center()
    }

    /// Center for an entity at `position`, ignoring scale and rotation.
    pub fn center_world(&self, position: Vec2) -> Vec2 {
        self.center_local() + position
    }

    /// Axis-aligned world bounds with scale applied but not rotation.
    pub fn scaled_world_bounds(&self, transform: &Transform) -> Rect {
        transform.scale_rect(&self.local_bounds()).translate(transform.position)
    }

    /// Axis-aligned box enclosing the fully transformed (scaled and rotated) hit box.
    pub fn world_aabb(&self, transform: &Transform) -> Rect {
        let local = self.local_bounds();
        Rect::enclosing(local.corners().map(|c| transform.apply(c))).unwrap_or(local)
    }

    /// Unrotated rectangle centred where the rotated box actually sits.
    ///
    /// Feeding it to the SAT together with `transform.rotation` yields the exact
    /// oriented box, since turning about the entity pivot equals moving the
    /// center there and turning about the center.
    pub fn sat_rect(&self, transform: &Transform) -> Rect {
        let scaled = transform.scale_rect(&self.local_bounds());
        Rect::from_center_size(transform.place(scaled.center()), scaled.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_at(origin: Vec2, w: f32, h: f32) -> HitBox {
        HitBox::new("b", origin, Shape::new_box(w, h).unwrap())
    }

    #[test]
    fn test_centers() {
        let hb = box_at(Vec2::new(10.0, 20.0), 40.0, 20.0);
        assert_eq!(hb.center_local(), Vec2::new(30.0, 30.0));
        assert_eq!(hb.center_world(Vec2::new(100.0, 100.0)), Vec2::new(130.0, 130.0));
    }

    #[test]
    fn test_scaled_world_bounds_about_origin() {
        let hb = box_at(Vec2::ZERO, 40.0, 40.0);
        let tf = Transform {
            position: Vec2::new(100.0, 100.0),
            scale: Vec2::new(2.0, 0.5),
            scale_origin: Vec2::new(20.0, 20.0),
            ..Default::default()
        };
        let r = hb.scaled_world_bounds(&tf);
        assert_eq!(r.min, Vec2::new(80.0, 110.0));
        assert_eq!(r.max, Vec2::new(160.0, 130.0));
    }

    #[test]
    fn test_world_aabb_with_rotation() {
        let hb = box_at(Vec2::ZERO, 40.0, 20.0);
        let tf = Transform { rotation: 90.0, rotation_origin: Vec2::new(20.0, 10.0), ..Default::default() };
        let r = hb.world_aabb(&tf);
        assert!(r.min.abs_diff_eq(Vec2::new(10.0, -10.0), 1e-4));
        assert!(r.max.abs_diff_eq(Vec2::new(30.0, 30.0), 1e-4));
    }

    #[test]
    fn test_sat_rect_moves_center_around_pivot() {
        let hb = box_at(Vec2::new(40.0, 0.0), 20.0, 20.0);
        let tf = Transform { rotation: 180.0, ..Default::default() };
        let r = hb.sat_rect(&tf);
        assert!(r.center().abs_diff_eq(Vec2::new(-50.0, -10.0), 1e-4));
        assert!(r.size().abs_diff_eq(Vec2::new(20.0, 20.0), 1e-4));
    }
}
