use glam::Vec2;

use crate::api::NarrowphaseApi;
use crate::types::*;

/// Stateless overlap tests on literal rectangles.
pub struct Narrowphase;

/// Corners of `rect` turned by `degrees` about its own center, in winding order.
fn oriented_corners(rect: &Rect, degrees: f32) -> [Vec2; 4] {
    let c = rect.center();
    rect.corners().map(|p| rotate_about(p, c, degrees))
}

fn project(corners: &[Vec2; 4], axis: Vec2) -> (f32, f32) {
    corners.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
        let d = p.dot(axis);
        (lo.min(d), hi.max(d))
    })
}

impl NarrowphaseApi for Narrowphase {
    fn is_colliding(box_a: Rect, box_b: Rect, angle_a: f32, angle_b: f32) -> bool {
        let a = oriented_corners(&box_a, angle_a);
        let b = oriented_corners(&box_b, angle_b);

        // two edge normals per rectangle; opposite edges share an axis
        let axes = [a[1] - a[0], a[3] - a[0], b[1] - b[0], b[3] - b[0]];

        for edge in axes {
            let axis = edge.perp();
            if axis.length_squared() <= f32::EPSILON {
                continue;
            }
            let (min_a, max_a) = project(&a, axis);
            let (min_b, max_b) = project(&b, axis);
            if max_a < min_b || max_b < min_a {
                return false;
            }
        }
        true
    }

    fn overlap_rect_rect(a: &Rect, b: &Rect) -> bool {
        a.min.x <= b.max.x && b.min.x <= a.max.x && a.min.y <= b.max.y && b.min.y <= a.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_origin_size(Vec2::new(x, y), Vec2::new(w, h))
    }

    #[test]
    fn test_same_origin_collides() {
        assert!(Narrowphase::is_colliding(rect(0.0, 0.0, 20.0, 40.0), rect(0.0, 0.0, 20.0, 40.0), 0.0, 0.0));
    }

    #[test]
    fn test_separated_by_one_pixel() {
        let a = rect(0.0, 0.0, 20.0, 40.0);
        assert!(!Narrowphase::is_colliding(a, rect(21.0, 0.0, 20.0, 40.0), 0.0, 0.0));
        assert!(!Narrowphase::is_colliding(a, rect(0.0, 41.0, 20.0, 40.0), 0.0, 0.0));
        assert!(!Narrowphase::is_colliding(a, rect(-21.0, 0.0, 20.0, 40.0), 0.0, 0.0));
    }

    #[test]
    fn test_touching_edges_collide() {
        let a = rect(0.0, 0.0, 20.0, 40.0);
        assert!(Narrowphase::is_colliding(a, rect(20.0, 0.0, 20.0, 40.0), 0.0, 0.0));
    }

    #[test]
    fn test_argument_order_does_not_matter() {
        let a = rect(0.0, 0.0, 40.0, 40.0);
        let b = rect(30.0, 30.0, 10.0, 50.0);
        assert_eq!(
            Narrowphase::is_colliding(a, b, 15.0, 70.0),
            Narrowphase::is_colliding(b, a, 70.0, 15.0)
        );
    }

    #[test]
    fn test_rotation_closes_gap() {
        // 60x10 bar and a 10x10 box 5px below its middle: separate unrotated,
        // overlapping once the bar is turned upright
        let bar = rect(0.0, 0.0, 60.0, 10.0);
        let block = rect(25.0, 15.0, 10.0, 10.0);
        assert!(!Narrowphase::is_colliding(bar, block, 0.0, 0.0));
        assert!(Narrowphase::is_colliding(bar, block, 90.0, 0.0));
    }

    #[test]
    fn test_rotation_opens_gap() {
        // diamond vs. a box near its bounding corner: AABBs overlap, shapes don't
        let diamond = rect(0.0, 0.0, 20.0, 20.0);
        let corner = rect(20.0, 20.0, 10.0, 10.0);
        assert!(Narrowphase::is_colliding(diamond, rect(18.0, 18.0, 10.0, 10.0), 0.0, 0.0));
        assert!(!Narrowphase::is_colliding(diamond, rect(19.0, 19.0, 10.0, 10.0), 45.0, 0.0));
        assert!(!Narrowphase::is_colliding(diamond, corner, 45.0, 0.0));
    }

    #[test]
    fn test_overlap_rect_rect() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        assert!(Narrowphase::overlap_rect_rect(&a, &rect(10.0, 0.0, 5.0, 5.0)));
        assert!(Narrowphase::overlap_rect_rect(&a, &rect(2.0, 2.0, 2.0, 2.0)));
        assert!(!Narrowphase::overlap_rect_rect(&a, &rect(10.5, 0.0, 5.0, 5.0)));
    }
}
