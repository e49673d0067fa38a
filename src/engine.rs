use std::sync::{Mutex, PoisonError};

use glam::Vec2;
use rapier2d::prelude::*;
use slotmap::{Key, KeyData};

use crate::error::{PhysicsError, Result};
use crate::shape::EngineShape;
use crate::types::{BodyDef, BodyType, EntityId, FixtureDef};

// ---------------------------------------------------------------------------
// glam <-> nalgebra
// ---------------------------------------------------------------------------

fn to_na(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

fn to_na_point(v: Vec2) -> Point<Real> {
    point![v.x, v.y]
}

fn from_na(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

impl BodyType {
    fn to_rapier(self) -> RigidBodyType {
        match self {
            BodyType::Static => RigidBodyType::Fixed,
            BodyType::Kinematic => RigidBodyType::KinematicVelocityBased,
            BodyType::Dynamic => RigidBodyType::Dynamic,
        }
    }
}

/// Opaque handle of an engine body owned by a [`crate::PhysicsWorld`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub(crate) RigidBodyHandle);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FixtureKind {
    HitBox = 0,
    Sensor = 1,
}

/// Identity of one engine collider, packed into its `user_data`:
/// entity key in the high 64 bits, kind and index below.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct FixtureTag {
    pub entity: EntityId,
    pub kind: FixtureKind,
    /// Hit box index, or sensor id.
    pub index: u32,
}

impl FixtureTag {
    pub fn hit_box(entity: EntityId, index: usize) -> Self {
        Self { entity, kind: FixtureKind::HitBox, index: index as u32 }
    }

    pub fn sensor(entity: EntityId, id: u32) -> Self {
        Self { entity, kind: FixtureKind::Sensor, index: id }
    }

    fn pack(self) -> u128 {
        ((self.entity.data().as_ffi() as u128) << 64) | ((self.kind as u128) << 32) | self.index as u128
    }

    fn unpack(data: u128) -> Option<Self> {
        let kind = match (data >> 32) as u32 {
            0 => FixtureKind::HitBox,
            1 => FixtureKind::Sensor,
            _ => return None,
        };
        Some(Self {
            entity: EntityId::from(KeyData::from_ffi((data >> 64) as u64)),
            kind,
            index: data as u32,
        })
    }
}

/// A contact or sensor overlap that started or stopped during a step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ContactEvent {
    pub a: FixtureTag,
    pub b: FixtureTag,
    pub started: bool,
}

// Events for removed colliders cannot be resolved to a tag and are dropped.
#[derive(Default)]
struct EventCollector {
    contacts: Mutex<Vec<ContactEvent>>,
}

impl EventCollector {
    fn drain(&self) -> Vec<ContactEvent> {
        std::mem::take(&mut *self.contacts.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        let (h1, h2, started) = match event {
            CollisionEvent::Started(h1, h2, _) => (h1, h2, true),
            CollisionEvent::Stopped(h1, h2, _) => (h1, h2, false),
        };
        let tag = |h: ColliderHandle| colliders.get(h).and_then(|c| FixtureTag::unpack(c.user_data));
        if let (Some(a), Some(b)) = (tag(h1), tag(h2)) {
            self.contacts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(ContactEvent { a, b, started });
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// Thin wrapper over the rapier pipeline, in meters with y up.
pub(crate) struct RapierEngine {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    events: EventCollector,
}

impl RapierEngine {
    pub fn new(gravity: Vec2) -> Self {
        Self {
            gravity: to_na(gravity),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            events: EventCollector::default(),
        }
    }

    pub fn gravity(&self) -> Vec2 {
        from_na(&self.gravity)
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = to_na(gravity);
        // sleeping bodies would otherwise ignore the change
        for (_, rb) in self.bodies.iter_mut() {
            if rb.is_dynamic() {
                rb.wake_up(true);
            }
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn create_body(&mut self, entity: EntityId, def: &BodyDef, position: Vec2, angle: f32) -> BodyHandle {
        let rb = RigidBodyBuilder::new(def.body_type.to_rapier())
            .translation(to_na(position))
            .rotation(angle)
            .gravity_scale(def.gravity_scale)
            .locked_axes(if def.fixed_rotation { LockedAxes::ROTATION_LOCKED } else { LockedAxes::empty() })
            .ccd_enabled(def.bullet)
            .linear_damping(def.linear_damping)
            .angular_damping(def.angular_damping)
            .user_data(entity.data().as_ffi() as u128)
            .build();
        BodyHandle(self.bodies.insert(rb))
    }

    pub fn attach_fixture(
        &mut self,
        body: BodyHandle,
        shape: &EngineShape,
        fixture: &FixtureDef,
        tag: FixtureTag,
    ) -> Result<()> {
        if !self.bodies.contains(body.0) {
            return Err(PhysicsError::BodyNotCreated);
        }
        let builder = match shape {
            EngineShape::Ball { center, radius } => ColliderBuilder::ball(*radius).translation(to_na(*center)),
            EngineShape::Cuboid { center, half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y).translation(to_na(*center))
            }
            EngineShape::ConvexPolygon { vertices } => {
                let points: Vec<Point<Real>> = vertices.iter().copied().map(to_na_point).collect();
                ColliderBuilder::convex_hull(&points).ok_or_else(|| {
                    PhysicsError::DegenerateShape(format!("no convex hull for {} polygon points", points.len()))
                })?
            }
            EngineShape::Polyline { vertices } => {
                ColliderBuilder::polyline(vertices.iter().copied().map(to_na_point).collect(), None)
            }
        };

        let mut builder = builder
            .density(fixture.density)
            .friction(fixture.friction)
            .restitution(fixture.restitution)
            .user_data(tag.pack())
            .active_events(ActiveEvents::COLLISION_EVENTS);
        if tag.kind == FixtureKind::Sensor {
            builder = builder.sensor(true).active_collision_types(ActiveCollisionTypes::all());
        }

        self.colliders.insert_with_parent(builder.build(), body.0, &mut self.bodies);
        Ok(())
    }

    /// Remove every collider of `body`, keeping the body itself.
    pub fn clear_fixtures(&mut self, body: BodyHandle) {
        let Some(rb) = self.bodies.get(body.0) else {
            return;
        };
        let handles = rb.colliders().to_vec();
        for h in handles {
            self.colliders.remove(h, &mut self.island_manager, &mut self.bodies, true);
        }
    }

    pub fn remove_body(&mut self, body: BodyHandle) {
        self.bodies.remove(
            body.0,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Advance the simulation by `dt` seconds and return the contact changes.
    pub fn step(&mut self, dt: f32) -> Vec<ContactEvent> {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &self.events,
        );
        // forces last one step
        for (_, rb) in self.bodies.iter_mut() {
            rb.reset_forces(false);
            rb.reset_torques(false);
        }
        self.events.drain()
    }

    /// Bring collider poses and the ray query structure up to date without stepping.
    pub fn refresh_queries(&mut self) {
        self.bodies.propagate_modified_body_positions_to_colliders(&mut self.colliders);
        self.query_pipeline.update(&self.colliders);
    }

    /// Nearest solid, non-sensor hit along `origin + t * dir` for `t` in `[0, 1]`.
    pub fn cast_ray(&self, origin: Vec2, dir: Vec2, skip: &dyn Fn(EntityId) -> bool) -> Option<(FixtureTag, Vec2)> {
        let ray = Ray::new(to_na_point(origin), to_na(dir));
        let predicate =
            |_: ColliderHandle, c: &Collider| FixtureTag::unpack(c.user_data).is_some_and(|t| !skip(t.entity));
        let filter = QueryFilter::new().exclude_sensors().predicate(&predicate);
        let (handle, toi) = self.query_pipeline.cast_ray(&self.bodies, &self.colliders, &ray, 1.0, true, filter)?;
        let tag = FixtureTag::unpack(self.colliders.get(handle)?.user_data)?;
        let p = ray.point_at(toi);
        Some((tag, Vec2::new(p.x, p.y)))
    }

    pub fn body_pose(&self, body: BodyHandle) -> Option<(Vec2, f32)> {
        self.bodies.get(body.0).map(|rb| (from_na(rb.translation()), rb.rotation().angle()))
    }

    pub fn set_body_pose(&mut self, body: BodyHandle, position: Vec2, angle: f32) {
        if let Some(rb) = self.bodies.get_mut(body.0) {
            rb.set_position(Isometry::new(to_na(position), angle), true);
        }
    }

    pub fn linvel(&self, body: BodyHandle) -> Option<Vec2> {
        self.bodies.get(body.0).map(|rb| from_na(rb.linvel()))
    }

    pub fn set_linvel(&mut self, body: BodyHandle, velocity: Vec2) {
        if let Some(rb) = self.bodies.get_mut(body.0) {
            rb.set_linvel(to_na(velocity), true);
        }
    }

    pub fn angvel(&self, body: BodyHandle) -> Option<f32> {
        self.bodies.get(body.0).map(|rb| rb.angvel())
    }

    pub fn set_angvel(&mut self, body: BodyHandle, angvel: f32) {
        if let Some(rb) = self.bodies.get_mut(body.0) {
            rb.set_angvel(angvel, true);
        }
    }

    /// Queue a force for the next step, at the center of mass or at a world point.
    pub fn add_force(&mut self, body: BodyHandle, force: Vec2, point: Option<Vec2>) {
        let Some(rb) = self.bodies.get_mut(body.0) else {
            return;
        };
        match point {
            Some(p) => rb.add_force_at_point(to_na(force), to_na_point(p), true),
            None => rb.add_force(to_na(force), true),
        }
    }

    /// Change velocity right away, at the center of mass or at a world point.
    pub fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec2, point: Option<Vec2>, wake: bool) {
        let Some(rb) = self.bodies.get_mut(body.0) else {
            return;
        };
        match point {
            Some(p) => rb.apply_impulse_at_point(to_na(impulse), to_na_point(p), wake),
            None => rb.apply_impulse(to_na(impulse), wake),
        }
    }

    /// Drop every body and collider, keeping gravity.
    pub fn clear(&mut self) {
        *self = Self::new(self.gravity());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn entity_ids(n: usize) -> Vec<EntityId> {
        let mut sm: SlotMap<EntityId, ()> = SlotMap::with_key();
        (0..n).map(|_| sm.insert(())).collect()
    }

    fn unit_box() -> EngineShape {
        EngineShape::Cuboid { center: Vec2::ZERO, half_extents: Vec2::splat(0.5) }
    }

    #[test]
    fn test_tag_round_trip() {
        let ids = entity_ids(3);
        for tag in [FixtureTag::hit_box(ids[2], 7), FixtureTag::sensor(ids[1], u32::MAX)] {
            assert_eq!(FixtureTag::unpack(tag.pack()), Some(tag));
        }
        assert_eq!(FixtureTag::unpack(5u128 << 32), None);
    }

    #[test]
    fn test_create_and_remove_body() {
        let ids = entity_ids(1);
        let mut engine = RapierEngine::new(Vec2::ZERO);
        let body = engine.create_body(ids[0], &BodyDef::default(), Vec2::new(1.0, 2.0), 0.0);
        engine.attach_fixture(body, &unit_box(), &FixtureDef::default(), FixtureTag::hit_box(ids[0], 0)).unwrap();
        assert_eq!(engine.body_count(), 1);
        assert_eq!(engine.body_pose(body).map(|(p, _)| p), Some(Vec2::new(1.0, 2.0)));

        engine.remove_body(body);
        assert_eq!(engine.body_count(), 0);
        assert!(engine.body_pose(body).is_none());
        let err = engine.attach_fixture(body, &unit_box(), &FixtureDef::default(), FixtureTag::hit_box(ids[0], 0));
        assert_eq!(err, Err(PhysicsError::BodyNotCreated));
    }

    #[test]
    fn test_collinear_polygon_is_degenerate() {
        let ids = entity_ids(1);
        let mut engine = RapierEngine::new(Vec2::ZERO);
        let body = engine.create_body(ids[0], &BodyDef::default(), Vec2::ZERO, 0.0);
        let line = EngineShape::ConvexPolygon { vertices: vec![Vec2::ZERO, Vec2::X, Vec2::X * 2.0] };
        let err = engine.attach_fixture(body, &line, &FixtureDef::default(), FixtureTag::hit_box(ids[0], 0));
        assert!(err.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_gravity_moves_dynamic_body_only() {
        let ids = entity_ids(2);
        let mut engine = RapierEngine::new(Vec2::new(0.0, -10.0));
        let dynamic = BodyDef { body_type: BodyType::Dynamic, ..Default::default() };
        let falling = engine.create_body(ids[0], &dynamic, Vec2::new(0.0, 10.0), 0.0);
        let fixed = engine.create_body(ids[1], &BodyDef::default(), Vec2::new(5.0, 10.0), 0.0);
        engine.attach_fixture(falling, &unit_box(), &FixtureDef::default(), FixtureTag::hit_box(ids[0], 0)).unwrap();
        engine.attach_fixture(fixed, &unit_box(), &FixtureDef::default(), FixtureTag::hit_box(ids[1], 0)).unwrap();

        for _ in 0..30 {
            engine.step(1.0 / 60.0);
        }
        assert!(engine.body_pose(falling).unwrap().0.y < 10.0);
        assert_eq!(engine.body_pose(fixed).unwrap().0.y, 10.0);
    }

    #[test]
    fn test_touching_fixtures_report_start_and_stop() {
        let ids = entity_ids(2);
        let mut engine = RapierEngine::new(Vec2::ZERO);
        let dynamic = BodyDef { body_type: BodyType::Dynamic, ..Default::default() };
        let a = engine.create_body(ids[0], &BodyDef::default(), Vec2::ZERO, 0.0);
        let b = engine.create_body(ids[1], &dynamic, Vec2::new(0.8, 0.0), 0.0);
        engine.attach_fixture(a, &unit_box(), &FixtureDef::default(), FixtureTag::hit_box(ids[0], 0)).unwrap();
        engine.attach_fixture(b, &unit_box(), &FixtureDef::default(), FixtureTag::hit_box(ids[1], 0)).unwrap();

        let events = engine.step(1.0 / 60.0);
        assert!(events.iter().any(|e| e.started));
        let tags = [events[0].a.entity, events[0].b.entity];
        assert!(tags.contains(&ids[0]) && tags.contains(&ids[1]));

        engine.set_body_pose(b, Vec2::new(10.0, 0.0), 0.0);
        let events = engine.step(1.0 / 60.0);
        assert!(events.iter().any(|e| !e.started));
    }

    #[test]
    fn test_force_lasts_one_step_and_impulse_is_immediate() {
        let ids = entity_ids(1);
        let mut engine = RapierEngine::new(Vec2::ZERO);
        let dynamic = BodyDef { body_type: BodyType::Dynamic, ..Default::default() };
        let body = engine.create_body(ids[0], &dynamic, Vec2::ZERO, 0.0);
        engine.attach_fixture(body, &unit_box(), &FixtureDef::default(), FixtureTag::hit_box(ids[0], 0)).unwrap();

        engine.add_force(body, Vec2::new(10.0, 0.0), None);
        engine.step(1.0 / 60.0);
        let after_push = engine.linvel(body).unwrap();
        assert!(after_push.x > 0.0);
        engine.step(1.0 / 60.0);
        assert!(engine.linvel(body).unwrap().abs_diff_eq(after_push, 1e-5));

        engine.apply_impulse(body, Vec2::new(0.0, 2.0), None, true);
        assert!(engine.linvel(body).unwrap().y > 0.0);

        // off-center push spins the body
        engine.apply_impulse(body, Vec2::new(0.0, 1.0), Some(Vec2::new(0.5, 0.0)), true);
        assert!(engine.angvel(body).unwrap() > 0.0);
        engine.set_angvel(body, -2.0);
        assert_eq!(engine.angvel(body), Some(-2.0));
    }

    #[test]
    fn test_cast_ray_nearest_and_skip() {
        let ids = entity_ids(2);
        let mut engine = RapierEngine::new(Vec2::ZERO);
        for (i, x) in [2.0, 4.0].into_iter().enumerate() {
            let body = engine.create_body(ids[i], &BodyDef::default(), Vec2::new(x, 0.0), 0.0);
            engine.attach_fixture(body, &unit_box(), &FixtureDef::default(), FixtureTag::hit_box(ids[i], 0)).unwrap();
        }
        engine.refresh_queries();

        let (tag, point) = engine.cast_ray(Vec2::ZERO, Vec2::new(10.0, 0.0), &|_| false).unwrap();
        assert_eq!(tag.entity, ids[0]);
        assert!(point.abs_diff_eq(Vec2::new(1.5, 0.0), 1e-4));

        let (tag, _) = engine.cast_ray(Vec2::ZERO, Vec2::new(10.0, 0.0), &|e| e == ids[0]).unwrap();
        assert_eq!(tag.entity, ids[1]);

        // segment ends before the first box
        assert!(engine.cast_ray(Vec2::ZERO, Vec2::new(1.0, 0.0), &|_| false).is_none());
    }
}
