use glam::Vec2;

use crate::api::PhysicsUnitConverter;
use crate::entity::BoundingBoxComponent;
use crate::error::{PhysicsError, Result};
use crate::hitbox::HitBox;
use crate::types::*;

/// Hit box geometry, relative to the hit box origin.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeKind {
    Circle { radius: f32 },
    Box { width: f32, height: f32 },
    /// Convex outline in either winding, at least three points. Concave
    /// outlines are rejected by [`Shape::new_polygon`].
    Polygon(Vec<Vec2>),
    /// Open polyline, at least two points. Only meant for static bodies; the
    /// engine does not simulate chains on moving bodies well.
    Chain(Vec<Vec2>),
}

/// Immutable, validated hit box geometry with its size envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct Shape {
    kind: ShapeKind,
    /// Extremes of the geometry, relative to the hit box origin.
    envelope: Rect,
}

/// Engine-ready geometry in meters, relative to the owning body's center, y up.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineShape {
    Ball { center: Vec2, radius: f32 },
    Cuboid { center: Vec2, half_extents: Vec2 },
    ConvexPolygon { vertices: Vec<Vec2> },
    Polyline { vertices: Vec<Vec2> },
}

fn positive(what: &'static str, value: f32) -> Result<f32> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(PhysicsError::InvalidDimension { what, value })
    }
}

fn point_envelope(kind: &'static str, points: &[Vec2], required: usize) -> Result<Rect> {
    if points.len() < required {
        return Err(PhysicsError::TooFewPoints { kind, required, actual: points.len() });
    }
    if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
        return Err(PhysicsError::InvalidDimension { what: "point coordinate", value: if bad.x.is_finite() { bad.y } else { bad.x } });
    }
    Ok(Rect::enclosing(points.iter().copied()).unwrap_or_default())
}

/// Every corner turns the same way. Collinear runs are allowed; fully collinear
/// outlines are left for the engine to reject.
fn is_convex(points: &[Vec2]) -> bool {
    let n = points.len();
    let mut sign = 0.0_f32;
    for i in 0..n {
        let (a, b, c) = (points[i], points[(i + 1) % n], points[(i + 2) % n]);
        let turn = (b - a).perp_dot(c - b);
        if turn.abs() <= f32::EPSILON {
            continue;
        }
        if sign != 0.0 && turn.signum() != sign {
            return false;
        }
        sign = turn.signum();
    }
    true
}

impl Shape {
    pub fn new_circle(radius: f32) -> Result<Shape> {
        let radius = positive("radius", radius)?;
        Ok(Shape {
            kind: ShapeKind::Circle { radius },
            envelope: Rect::from_origin_size(Vec2::ZERO, Vec2::splat(radius * 2.0)),
        })
    }

    pub fn new_box(width: f32, height: f32) -> Result<Shape> {
        let width = positive("width", width)?;
        let height = positive("height", height)?;
        Ok(Shape {
            kind: ShapeKind::Box { width, height },
            envelope: Rect::from_origin_size(Vec2::ZERO, Vec2::new(width, height)),
        })
    }

    pub fn new_polygon(points: Vec<Vec2>) -> Result<Shape> {
        let envelope = point_envelope("polygon", &points, 3)?;
        if !is_convex(&points) {
            return Err(PhysicsError::DegenerateShape(format!("polygon of {} points is not convex", points.len())));
        }
        Ok(Shape { kind: ShapeKind::Polygon(points), envelope })
    }

    /// Polygon from a flat `[x0, y0, x1, y1, ...]` list; a trailing odd value is ignored.
    pub fn new_polygon_from_coords(coords: &[f32]) -> Result<Shape> {
        Self::new_polygon(coords.chunks_exact(2).map(|c| Vec2::new(c[0], c[1])).collect())
    }

    pub fn new_chain(points: Vec<Vec2>) -> Result<Shape> {
        let envelope = point_envelope("chain", &points, 2)?;
        Ok(Shape { kind: ShapeKind::Chain(points), envelope })
    }

    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    pub fn is_chain(&self) -> bool {
        matches!(self.kind, ShapeKind::Chain(_))
    }

    /// Width and height of the envelope.
    pub fn size(&self) -> Vec2 {
        self.envelope.size()
    }

    /// Top-left of the envelope relative to the hit box origin.
    pub fn min(&self) -> Vec2 {
        self.envelope.min
    }

    pub fn center(&self) -> Vec2 {
        self.envelope.center()
    }

    /// Build the engine description of this shape for `hit_box` on an object with
    /// the given bounding box and transform.
    ///
    /// Offsets are taken against the scaled center of the whole bounding box,
    /// which is where the world places the body. Scale is applied to every
    /// vertex so a non-uniform scale warps polygons instead of stretching only
    /// their envelope. Rotation is left to the body pose.
    pub fn to_engine_shape<C: PhysicsUnitConverter>(
        &self,
        hit_box: &HitBox,
        bbox: &BoundingBoxComponent,
        transform: &Transform,
        converter: &C,
    ) -> EngineShape {
        let body_center = bbox.scaled_center_local(transform);
        let box_bounds = transform.scale_rect(&hit_box.local_bounds());
        let offset = converter.to_physics_vector(box_bounds.center() - body_center);

        match &self.kind {
            ShapeKind::Circle { .. } => EngineShape::Ball {
                center: offset,
                radius: converter.to_meters(box_bounds.width() / 2.0),
            },
            ShapeKind::Box { .. } => EngineShape::Cuboid {
                center: offset,
                half_extents: Vec2::new(
                    converter.to_meters(box_bounds.width() / 2.0),
                    converter.to_meters(box_bounds.height() / 2.0),
                ),
            },
            ShapeKind::Polygon(points) => EngineShape::ConvexPolygon {
                vertices: Self::engine_vertices(points, hit_box, transform, body_center, converter),
            },
            ShapeKind::Chain(points) => EngineShape::Polyline {
                vertices: Self::engine_vertices(points, hit_box, transform, body_center, converter),
            },
        }
    }

    fn engine_vertices<C: PhysicsUnitConverter>(
        points: &[Vec2],
        hit_box: &HitBox,
        transform: &Transform,
        body_center: Vec2,
        converter: &C,
    ) -> Vec<Vec2> {
        points
            .iter()
            .map(|&p| {
                let scaled = transform.scale_point(hit_box.origin() + p);
                converter.to_physics_vector(scaled - body_center)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitConverter;
    use approx::assert_abs_diff_eq;

    fn conv() -> UnitConverter {
        UnitConverter::new(50.0, 600.0).unwrap()
    }

    #[test]
    fn test_construction_guards() {
        let two = vec![Vec2::ZERO, Vec2::new(1.0, 0.0)];
        let err = Shape::new_polygon(two.clone()).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(err, PhysicsError::TooFewPoints { kind: "polygon", required: 3, actual: 2 });
        assert!(Shape::new_chain(vec![Vec2::ZERO]).unwrap_err().is_invalid_argument());

        assert!(Shape::new_chain(two.clone()).is_ok());
        let mut three = two;
        three.push(Vec2::new(0.0, 1.0));
        assert!(Shape::new_polygon(three).is_ok());

        assert!(Shape::new_circle(0.0).is_err());
        assert!(Shape::new_box(10.0, -1.0).is_err());
        assert!(Shape::new_box(f32::INFINITY, 1.0).is_err());
    }

    #[test]
    fn test_concave_polygon_rejected() {
        let arrow = vec![
            Vec2::ZERO,
            Vec2::new(40.0, 0.0),
            Vec2::new(20.0, 10.0),
            Vec2::new(40.0, 20.0),
            Vec2::new(0.0, 20.0),
        ];
        let err = Shape::new_polygon(arrow).unwrap_err();
        assert!(matches!(err, PhysicsError::DegenerateShape(_)));
        assert!(err.is_invalid_argument());

        let cw = vec![Vec2::ZERO, Vec2::new(0.0, 20.0), Vec2::new(40.0, 20.0), Vec2::new(40.0, 0.0)];
        let ccw: Vec<Vec2> = cw.iter().rev().copied().collect();
        assert!(Shape::new_polygon(cw).is_ok());
        assert!(Shape::new_polygon(ccw).is_ok());
        // a midpoint on an edge is still convex
        assert!(Shape::new_polygon_from_coords(&[0.0, 0.0, 20.0, 0.0, 40.0, 0.0, 40.0, 20.0]).is_ok());
    }

    #[test]
    fn test_size_envelope() {
        assert_eq!(Shape::new_circle(5.0).unwrap().size(), Vec2::new(10.0, 10.0));
        assert_eq!(Shape::new_box(40.0, 20.0).unwrap().size(), Vec2::new(40.0, 20.0));

        let tri = Shape::new_polygon_from_coords(&[0.0, 0.0, 30.0, 10.0, 10.0, 25.0]).unwrap();
        assert_eq!(tri.size(), Vec2::new(30.0, 25.0));
        assert_eq!(tri.center(), Vec2::new(15.0, 12.5));

        let chain = Shape::new_chain(vec![Vec2::new(5.0, 5.0), Vec2::new(25.0, 15.0)]).unwrap();
        assert_eq!(chain.min(), Vec2::new(5.0, 5.0));
        assert_eq!(chain.size(), Vec2::new(20.0, 10.0));
        assert!(chain.is_chain());
    }

    #[test]
    fn test_box_offset_from_body_center() {
        // two boxes side by side: body center sits between them
        let left = HitBox::new("left", Vec2::ZERO, Shape::new_box(50.0, 50.0).unwrap());
        let right = HitBox::new("right", Vec2::new(50.0, 0.0), Shape::new_box(50.0, 50.0).unwrap());
        let mut bbox = BoundingBoxComponent::default();
        bbox.add_hit_box(left.clone());
        bbox.add_hit_box(right.clone());
        let tf = Transform::default();

        let shape = left.shape().to_engine_shape(&left, &bbox, &tf, &conv());
        let EngineShape::Cuboid { center, half_extents } = shape else { panic!("expected cuboid") };
        assert!(center.abs_diff_eq(Vec2::new(-0.5, 0.0), 1e-6));
        assert!(half_extents.abs_diff_eq(Vec2::new(0.5, 0.5), 1e-6));

        let shape = right.shape().to_engine_shape(&right, &bbox, &tf, &conv());
        let EngineShape::Cuboid { center, .. } = shape else { panic!("expected cuboid") };
        assert!(center.abs_diff_eq(Vec2::new(0.5, 0.0), 1e-6));
    }

    #[test]
    fn test_circle_flips_vertical_offset() {
        let top = HitBox::new("top", Vec2::ZERO, Shape::new_circle(25.0).unwrap());
        let bottom = HitBox::new("bottom", Vec2::new(0.0, 50.0), Shape::new_box(50.0, 50.0).unwrap());
        let mut bbox = BoundingBoxComponent::default();
        bbox.add_hit_box(top.clone());
        bbox.add_hit_box(bottom);

        let shape = top.shape().to_engine_shape(&top, &bbox, &Transform::default(), &conv());
        let EngineShape::Ball { center, radius } = shape else { panic!("expected ball") };
        // above the body center on screen means positive y in physics space
        assert!(center.abs_diff_eq(Vec2::new(0.0, 0.5), 1e-6));
        assert_abs_diff_eq!(radius, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_polygon_vertices_follow_non_uniform_scale() {
        let tri = Shape::new_polygon(vec![Vec2::ZERO, Vec2::new(100.0, 0.0), Vec2::new(0.0, 100.0)]).unwrap();
        let hb = HitBox::new("tri", Vec2::ZERO, tri);
        let mut bbox = BoundingBoxComponent::default();
        bbox.add_hit_box(hb.clone());
        let tf = Transform { scale: Vec2::new(2.0, 1.0), scale_origin: Vec2::ZERO, ..Default::default() };

        let shape = hb.shape().to_engine_shape(&hb, &bbox, &tf, &conv());
        let EngineShape::ConvexPolygon { vertices } = shape else { panic!("expected polygon") };
        // scaled bounds are 200x100 centered at (100, 50)
        assert!(vertices[0].abs_diff_eq(Vec2::new(-2.0, 1.0), 1e-6));
        assert!(vertices[1].abs_diff_eq(Vec2::new(2.0, 1.0), 1e-6));
        assert!(vertices[2].abs_diff_eq(Vec2::new(-2.0, -1.0), 1e-6));
    }

    #[test]
    fn test_chain_vertices_relative_to_origin() {
        let chain = Shape::new_chain(vec![Vec2::ZERO, Vec2::new(50.0, 0.0)]).unwrap();
        let hb = HitBox::new("floor", Vec2::new(10.0, 0.0), chain);
        let mut bbox = BoundingBoxComponent::default();
        bbox.add_hit_box(HitBox::new("body", Vec2::ZERO, Shape::new_box(100.0, 50.0).unwrap()));
        bbox.add_hit_box(hb.clone());

        let shape = hb.shape().to_engine_shape(&hb, &bbox, &Transform::default(), &conv());
        let EngineShape::Polyline { vertices } = shape else { panic!("expected polyline") };
        assert_eq!(vertices.len(), 2);
        // body center is (50, 25)
        assert!(vertices[0].abs_diff_eq(Vec2::new(-0.8, 0.5), 1e-6));
        assert!(vertices[1].abs_diff_eq(Vec2::new(0.2, 0.5), 1e-6));
    }
}
