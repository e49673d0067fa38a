use glam::Vec2;

use crate::api::NarrowphaseApi;
use crate::engine::BodyHandle;
use crate::error::{PhysicsError, Result};
use crate::hitbox::HitBox;
use crate::narrowphase::Narrowphase;
use crate::types::*;

/// The hit boxes of one entity and the bounds they span together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundingBoxComponent {
    hit_boxes: Vec<HitBox>,
}

impl BoundingBoxComponent {
    pub fn hit_boxes(&self) -> &[HitBox] {
        &self.hit_boxes
    }

    pub fn is_empty(&self) -> bool {
        self.hit_boxes.is_empty()
    }

    pub fn add_hit_box(&mut self, hit_box: HitBox) {
        self.hit_boxes.push(hit_box);
    }

    /// Remove the first hit box called `name`.
    pub fn remove_hit_box(&mut self, name: &str) -> Option<HitBox> {
        let idx = self.hit_boxes.iter().position(|hb| hb.name() == name)?;
        Some(self.hit_boxes.remove(idx))
    }

    /// Union of the unscaled local bounds of all hit boxes.
    pub fn local_bounds(&self) -> Option<Rect> {
        self.hit_boxes.iter().map(HitBox::local_bounds).reduce(|a, b| a.union(&b))
    }

    pub fn center_local(&self) -> Vec2 {
        self.local_bounds().map_or(Vec2::ZERO, |r| r.center())
    }

    /// Center of the scaled local bounds; the physics body sits here.
    pub fn scaled_center_local(&self, transform: &Transform) -> Vec2 {
        self.hit_boxes
            .iter()
            .map(|hb| transform.scale_rect(&hb.local_bounds()))
            .reduce(|a, b| a.union(&b))
            .map_or(Vec2::ZERO, |r| r.center())
    }

    pub fn center_world(&self, transform: &Transform) -> Vec2 {
        transform.place(self.scaled_center_local(transform))
    }

    /// Axis-aligned world box enclosing every transformed hit box.
    pub fn world_bounds(&self, transform: &Transform) -> Option<Rect> {
        self.hit_boxes.iter().map(|hb| hb.world_aabb(transform)).reduce(|a, b| a.union(&b))
    }

    /// First pair of hit boxes (by index) that overlap, or `None`.
    pub fn check_collision(
        &self,
        transform: &Transform,
        other: &BoundingBoxComponent,
        other_transform: &Transform,
    ) -> Option<(usize, usize)> {
        for (i, a) in self.hit_boxes.iter().enumerate() {
            let rect_a = a.sat_rect(transform);
            for (j, b) in other.hit_boxes.iter().enumerate() {
                let rect_b = b.sat_rect(other_transform);
                if Narrowphase::is_colliding(rect_a, rect_b, transform.rotation, other_transform.rotation) {
                    return Some((i, j));
                }
            }
        }
        None
    }
}

/// Marks an entity as simulated by the rigid-body engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhysicsComponent {
    pub body_def: BodyDef,
    pub fixture_def: FixtureDef,
    /// Skip this body in [`crate::PhysicsWorld::raycast`].
    pub raycast_ignored: bool,
    pub(crate) body: Option<BodyHandle>,
    /// Scale the fixtures were last built with.
    pub(crate) built_scale: Vec2,
    pub(crate) dirty: bool,
}

impl PhysicsComponent {
    pub fn new(body_type: BodyType) -> Self {
        Self { body_def: BodyDef { body_type, ..Default::default() }, ..Default::default() }
    }

    pub fn with_body_def(mut self, body_def: BodyDef) -> Self {
        self.body_def = body_def;
        self
    }

    pub fn with_fixture_def(mut self, fixture_def: FixtureDef) -> Self {
        self.fixture_def = fixture_def;
        self
    }

    pub fn body_type(&self) -> BodyType {
        self.body_def.body_type
    }

    /// Engine body handle; only valid once the entity is in a world.
    pub fn body(&self) -> Result<BodyHandle> {
        self.body.ok_or(PhysicsError::BodyNotCreated)
    }

    pub fn is_registered(&self) -> bool {
        self.body.is_some()
    }
}

/// The view of a game object the physics layer works with.
#[derive(Clone, Debug)]
pub struct Entity<T: EntityType> {
    id: EntityId,
    entity_type: T,
    pub transform: Transform,
    bbox: BoundingBoxComponent,
    collidable: bool,
    ignored_types: Vec<T>,
    pub(crate) physics: Option<PhysicsComponent>,
}

impl<T: EntityType> Entity<T> {
    pub fn new(entity_type: T) -> Self {
        Self {
            id: EntityId::default(),
            entity_type,
            transform: Transform::default(),
            bbox: BoundingBoxComponent::default(),
            collidable: false,
            ignored_types: Vec::new(),
            physics: None,
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.transform.position = Vec2::new(x, y);
        self
    }

    pub fn with_hit_box(mut self, hit_box: HitBox) -> Self {
        self.bbox.add_hit_box(hit_box);
        self
    }

    pub fn with_collidable(mut self, collidable: bool) -> Self {
        self.collidable = collidable;
        self
    }

    pub fn with_physics(mut self, physics: PhysicsComponent) -> Self {
        self.physics = Some(physics);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Null id until the entity is added to a world.
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    pub fn entity_type(&self) -> T {
        self.entity_type
    }

    pub fn is_type(&self, t: T) -> bool {
        self.entity_type == t
    }

    pub fn position(&self) -> Vec2 {
        self.transform.position
    }

    /// Move the entity. Bodies driven by the engine overwrite this every tick;
    /// use [`crate::PhysicsWorld::overwrite_position`] for those.
    pub fn set_position(&mut self, position: Vec2) {
        self.transform.position = position;
    }

    pub fn translate(&mut self, by: Vec2) {
        self.transform.position += by;
    }

    pub fn rotation(&self) -> f32 {
        self.transform.rotation
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.transform.rotation = degrees;
    }

    /// Scale changes rebuild the physics fixtures at the next tick.
    pub fn set_scale(&mut self, scale: Vec2) {
        self.transform.scale = scale;
    }

    pub fn bbox(&self) -> &BoundingBoxComponent {
        &self.bbox
    }

    pub(crate) fn bbox_mut(&mut self) -> &mut BoundingBoxComponent {
        &mut self.bbox
    }

    pub fn hit_boxes(&self) -> &[HitBox] {
        self.bbox.hit_boxes()
    }

    /// World-space center of the combined hit box bounds.
    pub fn center(&self) -> Vec2 {
        self.bbox.center_world(&self.transform)
    }

    pub fn world_bounds(&self) -> Option<Rect> {
        self.bbox.world_bounds(&self.transform)
    }

    pub fn is_collidable(&self) -> bool {
        self.collidable
    }

    /// Turning collision off ends active pairs at the next tick.
    pub fn set_collidable(&mut self, collidable: bool) {
        self.collidable = collidable;
    }

    /// Never report collisions between this entity and entities of type `t`.
    pub fn ignore_type(&mut self, t: T) {
        if !self.ignored_types.contains(&t) {
            self.ignored_types.push(t);
        }
    }

    pub fn ignored_types(&self) -> &[T] {
        &self.ignored_types
    }

    /// Whether either side ignores the other's type.
    pub fn ignores(&self, other: &Entity<T>) -> bool {
        self.ignored_types.contains(&other.entity_type) || other.ignored_types.contains(&self.entity_type)
    }

    pub fn physics(&self) -> Option<&PhysicsComponent> {
        self.physics.as_ref()
    }

    pub fn has_body(&self) -> bool {
        self.physics.as_ref().is_some_and(PhysicsComponent::is_registered)
    }

    pub(crate) fn body_handle(&self) -> Option<BodyHandle> {
        self.physics.as_ref().and_then(|p| p.body)
    }

    pub(crate) fn body_type(&self) -> Option<BodyType> {
        self.physics.as_ref().map(PhysicsComponent::body_type)
    }
}
