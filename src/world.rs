use glam::Vec2;
use log::{debug, trace, warn};
use slotmap::SlotMap;

use std::collections::{HashMap, HashSet};

use crate::api::{CollisionHandler, NarrowphaseApi, PhysicsUnitConverter, SensorCollisionHandler};
use crate::engine::{ContactEvent, FixtureKind, FixtureTag, RapierEngine};
use crate::entity::{Entity, PhysicsComponent};
use crate::error::{PhysicsError, Result};
use crate::grid::CollisionGrid;
use crate::handler::HandlerRegistry;
use crate::hitbox::HitBox;
use crate::narrowphase::Narrowphase;
use crate::pair::{CollisionPair, PairSource, PairTracker, UnorderedPair};
use crate::types::*;
use crate::units::UnitConverter;

/// Handle of a sensor added with [`PhysicsWorld::add_sensor`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SensorId(u32);

struct Sensor<T: EntityType> {
    owner: EntityId,
    hit_box: HitBox,
    handler: Box<dyn SensorCollisionHandler<T>>,
    // entities inside the sensor -> touching fixture count
    touching: HashMap<EntityId, u32>,
    ground: bool,
}

/// Handler of a ground sensor; grounding is read back from the touching set.
struct GroundContact;

impl<T: EntityType> SensorCollisionHandler<T> for GroundContact {}

/// A pair that became active this tick, already in handler order.
struct Begin<T: EntityType> {
    key: UnorderedPair<T>,
    a: EntityId,
    b: EntityId,
    boxes: (usize, usize),
}

/// Collision world for pixel-space game objects.
///
/// Entities with a [`PhysicsComponent`] get a rapier body; everything else takes
/// part in collision notifications through the separating-axis pass only. Each
/// [`update`](Self::update) steps the engine, reconciles contacts and overlaps
/// into the pair tracker, then fires handler callbacks.
pub struct PhysicsWorld<T: EntityType> {
    config: WorldConfig,
    converter: UnitConverter,
    engine: RapierEngine,
    entities: SlotMap<EntityId, Entity<T>>,
    handlers: HandlerRegistry<T>,
    pairs: PairTracker<T>,
    sensors: HashMap<u32, Sensor<T>>,
    next_sensor_id: u32,
    grid: CollisionGrid,
}

fn with_pair<T: EntityType>(
    handlers: &mut HandlerRegistry<T>,
    entities: &mut SlotMap<EntityId, Entity<T>>,
    key: &UnorderedPair<T>,
    a: EntityId,
    b: EntityId,
    f: impl FnOnce(&mut dyn CollisionHandler<T>, &mut Entity<T>, &mut Entity<T>),
) {
    let Some(handler) = handlers.get_mut(key) else {
        return;
    };
    let Some([ea, eb]) = entities.get_disjoint_mut([a, b]) else {
        return;
    };
    f(handler, ea, eb);
}

fn end_pair<T: EntityType>(
    handlers: &mut HandlerRegistry<T>,
    entities: &mut SlotMap<EntityId, Entity<T>>,
    pair: &CollisionPair<T>,
) {
    trace!("collision end {:?} / {:?}", pair.a(), pair.b());
    with_pair(handlers, entities, &pair.handler_key(), pair.a(), pair.b(), |h, a, b| {
        h.on_collision_end(a, b)
    });
}

impl<T: EntityType> PhysicsWorld<T> {
    pub fn new(config: WorldConfig) -> Result<Self> {
        let converter = UnitConverter::new(config.pixels_per_meter, config.app_height)?;
        let grid = CollisionGrid::new(config.cell_width, config.cell_height)?;
        debug!(
            "physics world: {} px/m, app height {}, {:?}",
            config.pixels_per_meter, config.app_height, config.strategy
        );
        Ok(Self {
            engine: RapierEngine::new(config.gravity),
            config,
            converter,
            entities: SlotMap::with_key(),
            handlers: HandlerRegistry::new(),
            pairs: PairTracker::new(),
            sensors: HashMap::new(),
            next_sensor_id: 0,
            grid,
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn converter(&self) -> &UnitConverter {
        &self.converter
    }

    // --- Entities ----------------------------------------------------------

    /// Register an entity, creating its body right away when it carries a
    /// physics component.
    pub fn add_entity(&mut self, mut entity: Entity<T>) -> Result<EntityId> {
        if let Some(p) = entity.physics.as_mut() {
            if p.body.is_some() {
                return Err(PhysicsError::AlreadyRegistered(entity.id()));
            }
            p.dirty = false;
        }
        let has_physics = entity.physics.is_some();
        let id = self.entities.insert_with_key(|id| {
            entity.set_id(id);
            entity
        });
        if has_physics {
            if let Err(e) = self.create_body(id) {
                self.entities.remove(id);
                return Err(e);
            }
        }
        Ok(id)
    }

    /// Unregister an entity. Its active pairs and sensor contacts end first.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<Entity<T>> {
        if !self.entities.contains_key(id) {
            return Err(PhysicsError::UnknownEntity(id));
        }

        for key in self.pairs.keys_where(|p| p.involves(id)) {
            if let Some(pair) = self.pairs.take(&key) {
                end_pair(&mut self.handlers, &mut self.entities, &pair);
            }
        }

        let owned: Vec<u32> = self.sensors.iter().filter(|(_, s)| s.owner == id).map(|(sid, _)| *sid).collect();
        for sid in owned {
            if let Some(sensor) = self.sensors.remove(&sid) {
                self.end_sensor_contacts(sensor);
            }
        }
        for sensor in self.sensors.values_mut() {
            if sensor.touching.remove(&id).is_some() {
                if let Some(e) = self.entities.get_mut(id) {
                    sensor.handler.on_collision_end(e);
                }
            }
        }

        let mut entity = self.entities.remove(id).ok_or(PhysicsError::UnknownEntity(id))?;
        if let Some(body) = entity.physics.as_mut().and_then(|p| p.body.take()) {
            self.engine.remove_body(body);
            self.engine.refresh_queries();
        }
        entity.set_id(EntityId::default());
        Ok(entity)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity<T>> {
        self.entities.get(id)
    }

    /// Mutable access for gameplay changes (position, collidable flag, ignored types).
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity<T>> {
        self.entities.get_mut(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity<T>> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Give an already registered entity a body.
    pub fn attach_physics(&mut self, id: EntityId, physics: PhysicsComponent) -> Result<()> {
        let entity = self.entities.get_mut(id).ok_or(PhysicsError::UnknownEntity(id))?;
        if entity.has_body() {
            return Err(PhysicsError::AlreadyRegistered(id));
        }
        entity.physics = Some(PhysicsComponent { body: None, dirty: false, ..physics });
        if let Err(e) = self.create_body(id) {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.physics = None;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Add a hit box; body fixtures follow at the next tick.
    pub fn add_hit_box(&mut self, id: EntityId, hit_box: HitBox) -> Result<()> {
        let entity = self.entities.get_mut(id).ok_or(PhysicsError::UnknownEntity(id))?;
        entity.bbox_mut().add_hit_box(hit_box);
        if let Some(p) = entity.physics.as_mut() {
            p.dirty = true;
        }
        Ok(())
    }

    pub fn remove_hit_box(&mut self, id: EntityId, name: &str) -> Result<HitBox> {
        let entity = self.entities.get_mut(id).ok_or(PhysicsError::UnknownEntity(id))?;
        let removed = entity
            .bbox_mut()
            .remove_hit_box(name)
            .ok_or_else(|| PhysicsError::UnknownHitBox(id, name.to_string()))?;
        if let Some(p) = entity.physics.as_mut() {
            p.dirty = true;
        }
        Ok(removed)
    }

    // --- Sensors -----------------------------------------------------------

    /// Attach a trigger volume to a body. The fixture is built at the next tick.
    pub fn add_sensor(
        &mut self,
        id: EntityId,
        hit_box: HitBox,
        handler: impl SensorCollisionHandler<T> + 'static,
    ) -> Result<SensorId> {
        self.insert_sensor(id, hit_box, Box::new(handler), false)
    }

    /// Attach a sensor below a body; [`is_on_ground`](Self::is_on_ground) reports
    /// whether any other body is inside it.
    pub fn add_ground_sensor(&mut self, id: EntityId, hit_box: HitBox) -> Result<SensorId> {
        self.insert_sensor(id, hit_box, Box::new(GroundContact), true)
    }

    /// Whether a ground sensor of `id` touches another body. Always false for
    /// entities without one.
    pub fn is_on_ground(&self, id: EntityId) -> bool {
        self.sensors.values().any(|s| s.ground && s.owner == id && !s.touching.is_empty())
    }

    fn insert_sensor(
        &mut self,
        id: EntityId,
        hit_box: HitBox,
        handler: Box<dyn SensorCollisionHandler<T>>,
        ground: bool,
    ) -> Result<SensorId> {
        let entity = self.entities.get_mut(id).ok_or(PhysicsError::UnknownEntity(id))?;
        let physics = entity.physics.as_mut().ok_or(PhysicsError::NoBody(id))?;
        physics.dirty = true;

        let sid = self.next_sensor_id;
        self.next_sensor_id = self.next_sensor_id.wrapping_add(1);
        self.sensors.insert(sid, Sensor { owner: id, hit_box, handler, touching: HashMap::new(), ground });
        Ok(SensorId(sid))
    }

    /// Detach a sensor; entities still inside it get a final end callback.
    pub fn remove_sensor(&mut self, sensor: SensorId) -> Option<HitBox> {
        let removed = self.sensors.remove(&sensor.0)?;
        if let Some(p) = self.entities.get_mut(removed.owner).and_then(|e| e.physics.as_mut()) {
            p.dirty = true;
        }
        let hit_box = removed.hit_box.clone();
        self.end_sensor_contacts(removed);
        Some(hit_box)
    }

    fn end_sensor_contacts(&mut self, mut sensor: Sensor<T>) {
        for (other, _) in sensor.touching.drain() {
            if let Some(e) = self.entities.get_mut(other) {
                trace!("sensor end {:?}", other);
                sensor.handler.on_collision_end(e);
            }
        }
    }

    // --- Handlers ----------------------------------------------------------

    /// Register `handler` for the pair of types. Replacing a handler ends the
    /// pairs the old one owned.
    pub fn add_collision_handler(&mut self, type_a: T, type_b: T, handler: impl CollisionHandler<T> + 'static) {
        if self.handlers.contains(type_a, type_b) {
            debug!("replacing collision handler for {:?} / {:?}", type_a, type_b);
            self.remove_collision_handler(type_a, type_b);
        } else {
            debug!("collision handler for {:?} / {:?}", type_a, type_b);
        }
        self.handlers.insert(type_a, type_b, Box::new(handler));
    }

    /// Unregister the handler; its active pairs get a final end callback.
    pub fn remove_collision_handler(&mut self, type_a: T, type_b: T) -> bool {
        let key = UnorderedPair::new(type_a, type_b);
        for pair_key in self.pairs.keys_where(|p| p.handler_key() == key) {
            if let Some(pair) = self.pairs.take(&pair_key) {
                end_pair(&mut self.handlers, &mut self.entities, &pair);
            }
        }
        self.handlers.remove(type_a, type_b).is_some()
    }

    /// Drop every handler and every active pair without callbacks.
    pub fn clear_collision_handlers(&mut self) {
        self.handlers.clear();
        self.pairs.clear();
    }

    pub fn active_collisions(&self) -> impl Iterator<Item = &CollisionPair<T>> {
        self.pairs.iter()
    }

    pub fn is_colliding(&self, a: EntityId, b: EntityId) -> bool {
        self.pairs.contains(a, b)
    }

    // --- Engine ------------------------------------------------------------

    /// Set gravity in pixels / s² (y down).
    pub fn set_gravity(&mut self, x: f32, y: f32) {
        self.engine.set_gravity(self.converter.to_physics_vector(Vec2::new(x, y)));
    }

    /// Gravity as the engine sees it, in meters / s² (y up).
    pub fn gravity(&self) -> Vec2 {
        self.engine.gravity()
    }

    pub fn body_count(&self) -> usize {
        self.engine.body_count()
    }

    fn body_of(&self, id: EntityId) -> Result<crate::engine::BodyHandle> {
        let entity = self.entities.get(id).ok_or(PhysicsError::UnknownEntity(id))?;
        entity.physics().ok_or(PhysicsError::NoBody(id))?.body()
    }

    /// Set body velocity in pixels / s.
    pub fn set_linear_velocity(&mut self, id: EntityId, velocity: Vec2) -> Result<()> {
        let body = self.body_of(id)?;
        self.engine.set_linvel(body, self.converter.to_physics_vector(velocity));
        Ok(())
    }

    /// Body velocity in pixels / s.
    pub fn linear_velocity(&self, id: EntityId) -> Result<Vec2> {
        let body = self.body_of(id)?;
        let v = self.engine.linvel(body).ok_or(PhysicsError::BodyNotCreated)?;
        Ok(self.converter.to_pixel_vector(v))
    }

    /// Set body spin in degrees / s (clockwise on screen).
    pub fn set_angular_velocity(&mut self, id: EntityId, degrees_per_sec: f32) -> Result<()> {
        let body = self.body_of(id)?;
        self.engine.set_angvel(body, -degrees_per_sec.to_radians());
        Ok(())
    }

    /// Body spin in degrees / s (clockwise on screen).
    pub fn angular_velocity(&self, id: EntityId) -> Result<f32> {
        let body = self.body_of(id)?;
        let w = self.engine.angvel(body).ok_or(PhysicsError::BodyNotCreated)?;
        Ok(-w.to_degrees())
    }

    /// Push the body during the next step with a force applied at a world
    /// point (pixels). Off-center forces also spin it.
    pub fn apply_force(&mut self, id: EntityId, force: Vec2, point: Vec2) -> Result<()> {
        let body = self.body_of(id)?;
        let point = self.converter.to_physics_point(point);
        self.engine.add_force(body, self.converter.to_physics_vector(force), Some(point));
        Ok(())
    }

    pub fn apply_force_to_center(&mut self, id: EntityId, force: Vec2) -> Result<()> {
        let body = self.body_of(id)?;
        self.engine.add_force(body, self.converter.to_physics_vector(force), None);
        Ok(())
    }

    /// Change the body velocity right away with an impulse applied at a world
    /// point (pixels).
    pub fn apply_linear_impulse(&mut self, id: EntityId, impulse: Vec2, point: Vec2, wake: bool) -> Result<()> {
        let body = self.body_of(id)?;
        let point = self.converter.to_physics_point(point);
        self.engine.apply_impulse(body, self.converter.to_physics_vector(impulse), Some(point), wake);
        Ok(())
    }

    /// Exclude the entity's body from [`raycast`](Self::raycast), or include it again.
    pub fn set_raycast_ignored(&mut self, id: EntityId, ignored: bool) -> Result<()> {
        let entity = self.entities.get_mut(id).ok_or(PhysicsError::UnknownEntity(id))?;
        entity.physics.as_mut().ok_or(PhysicsError::NoBody(id))?.raycast_ignored = ignored;
        Ok(())
    }

    /// Turn an entity and its body to `degrees` about the rotation origin.
    pub fn overwrite_angle(&mut self, id: EntityId, degrees: f32) -> Result<()> {
        let entity = self.entities.get_mut(id).ok_or(PhysicsError::UnknownEntity(id))?;
        entity.set_rotation(degrees);
        self.resync_body(id);
        Ok(())
    }

    /// Teleport an entity and its body. Plain entities just move.
    pub fn overwrite_position(&mut self, id: EntityId, position: Vec2) -> Result<()> {
        let entity = self.entities.get_mut(id).ok_or(PhysicsError::UnknownEntity(id))?;
        entity.set_position(position);
        self.resync_body(id);
        Ok(())
    }

    /// Move the body of `id`, if any, to match the entity transform.
    fn resync_body(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        if let Some(body) = entity.body_handle() {
            let (pos, angle) = self.body_pose_of(entity);
            self.engine.set_body_pose(body, pos, angle);
            self.engine.refresh_queries();
        }
    }

    /// Engine pose matching the entity transform.
    fn body_pose_of(&self, entity: &Entity<T>) -> (Vec2, f32) {
        let center = entity.bbox().scaled_center_local(&entity.transform);
        let pos = self.converter.to_physics_point(entity.transform.place(center));
        (pos, -entity.transform.rotation.to_radians())
    }

    fn create_body(&mut self, id: EntityId) -> Result<()> {
        let entity = self.entities.get(id).ok_or(PhysicsError::UnknownEntity(id))?;
        let physics = entity.physics().ok_or(PhysicsError::NoBody(id))?;
        if physics.is_registered() {
            return Err(PhysicsError::AlreadyRegistered(id));
        }
        let (pos, angle) = self.body_pose_of(entity);
        let body = self.engine.create_body(id, &physics.body_def, pos, angle);
        debug!("body {:?} ({:?}) for entity {:?}", body, physics.body_type(), id);

        if let Some(p) = self.entities.get_mut(id).and_then(|e| e.physics.as_mut()) {
            p.body = Some(body);
        }
        if let Err(e) = self.build_fixtures(id) {
            self.engine.remove_body(body);
            if let Some(p) = self.entities.get_mut(id).and_then(|e| e.physics.as_mut()) {
                p.body = None;
            }
            return Err(e);
        }
        self.engine.refresh_queries();
        Ok(())
    }

    /// Replace every fixture of the entity's body with fresh ones built from its
    /// hit boxes and sensors.
    fn build_fixtures(&mut self, id: EntityId) -> Result<()> {
        let entity = self.entities.get(id).ok_or(PhysicsError::UnknownEntity(id))?;
        let physics = entity.physics().ok_or(PhysicsError::NoBody(id))?;
        let body = physics.body()?;

        self.engine.clear_fixtures(body);
        for (i, hb) in entity.hit_boxes().iter().enumerate() {
            if hb.shape().is_chain() && physics.body_type() != BodyType::Static {
                warn!("chain hit box '{}' on a {:?} body of {:?}", hb.name(), physics.body_type(), id);
            }
            let shape = hb.shape().to_engine_shape(hb, entity.bbox(), &entity.transform, &self.converter);
            self.engine.attach_fixture(body, &shape, &physics.fixture_def, FixtureTag::hit_box(id, i))?;
        }
        for (sid, sensor) in self.sensors.iter().filter(|(_, s)| s.owner == id) {
            let hb = &sensor.hit_box;
            let shape = hb.shape().to_engine_shape(hb, entity.bbox(), &entity.transform, &self.converter);
            self.engine.attach_fixture(body, &shape, &physics.fixture_def, FixtureTag::sensor(id, *sid))?;
        }

        let scale = entity.transform.scale;
        if let Some(p) = self.entities.get_mut(id).and_then(|e| e.physics.as_mut()) {
            p.built_scale = scale;
            p.dirty = false;
        }
        Ok(())
    }

    /// Rebuild fixtures of bodies whose hit boxes, sensors or scale changed.
    ///
    /// Contact counts involving a rebuilt body drop to zero; fixtures that still
    /// touch report again during the following step.
    fn rebuild_dirty_fixtures(&mut self) -> Result<()> {
        let dirty: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, e)| {
                e.physics().is_some_and(|p| p.is_registered() && (p.dirty || p.built_scale != e.transform.scale))
            })
            .map(|(id, _)| id)
            .collect();

        for id in dirty {
            trace!("rebuilding fixtures of {:?}", id);
            self.build_fixtures(id)?;
            for pair in self.pairs.iter_mut().filter(|p| p.involves(id)) {
                if let PairSource::Engine { contacts } = &mut pair.source {
                    *contacts = 0;
                }
            }
            for sensor in self.sensors.values_mut() {
                if sensor.owner == id {
                    sensor.touching.values_mut().for_each(|c| *c = 0);
                } else if let Some(c) = sensor.touching.get_mut(&id) {
                    *c = 0;
                }
            }
        }
        Ok(())
    }

    /// Copy simulated poses of moving bodies back into entity transforms.
    fn sync_bodies(&mut self) {
        for entity in self.entities.values_mut() {
            let Some(body) = entity.body_handle() else {
                continue;
            };
            if entity.body_type() == Some(BodyType::Static) {
                continue;
            }
            let Some((pos, angle)) = self.engine.body_pose(body) else {
                continue;
            };
            let rotation = -angle.to_degrees();
            entity.transform.rotation = rotation;
            let center = entity.bbox().scaled_center_local(&entity.transform);
            entity.transform.position = self.converter.to_pixel_point(pos)
                - rotate_about(center, entity.transform.rotation_origin, rotation);
        }
    }

    // --- Queries -----------------------------------------------------------

    /// Nearest entity body between `start` and `end` (pixels), skipping sensors
    /// and raycast-ignored bodies.
    pub fn raycast(&self, start: Vec2, end: Vec2) -> RaycastResult {
        let origin = self.converter.to_physics_point(start);
        let dir = self.converter.to_physics_vector(end - start);
        let entities = &self.entities;
        let skip = |id: EntityId| entities.get(id).and_then(Entity::physics).is_none_or(|p| p.raycast_ignored);

        match self.engine.cast_ray(origin, dir, &skip) {
            Some((tag, point)) => RaycastResult {
                entity: Some(tag.entity),
                point: Some(self.converter.to_pixel_point(point)),
            },
            None => RaycastResult::NONE,
        }
    }

    /// Entities with at least one hit box overlapping `region`.
    pub fn query_region(&mut self, region: Rect) -> Vec<EntityId> {
        let candidates: Vec<EntityId> = match self.config.strategy {
            CollisionDetectionStrategy::BruteForce => self.entities.keys().collect(),
            CollisionDetectionStrategy::GridIndexing => {
                self.grid.clear();
                for e in self.entities.values() {
                    self.grid.insert(e);
                }
                self.grid.query(&region)
            }
        };
        candidates
            .into_iter()
            .filter(|id| {
                self.entities.get(*id).is_some_and(|e| {
                    e.hit_boxes()
                        .iter()
                        .any(|hb| Narrowphase::is_colliding(region, hb.sat_rect(&e.transform), 0.0, e.rotation()))
                })
            })
            .collect()
    }

    // --- Tick --------------------------------------------------------------

    /// Run one simulation tick of `tpf` seconds. A non-positive `tpf` skips the
    /// engine but still evaluates overlaps and fires callbacks.
    pub fn update(&mut self, tpf: f32) -> Result<()> {
        let mut begins = Vec::new();
        let mut sensor_begins = Vec::new();

        if tpf > 0.0 {
            self.rebuild_dirty_fixtures()?;
            let events = self.engine.step(tpf);
            self.sync_bodies();
            for event in &events {
                self.apply_contact_event(event, &mut begins, &mut sensor_begins);
            }
        }

        let overlapping = self.overlap_pass(&mut begins);
        let ended = self.collect_ended(&overlapping);
        let sensor_ended = self.collect_sensor_ended();

        self.dispatch(begins, ended);
        self.dispatch_sensors(sensor_begins, sensor_ended);
        Ok(())
    }

    fn apply_contact_event(
        &mut self,
        event: &ContactEvent,
        begins: &mut Vec<Begin<T>>,
        sensor_begins: &mut Vec<(u32, EntityId)>,
    ) {
        match (event.a.kind, event.b.kind) {
            (FixtureKind::HitBox, FixtureKind::HitBox) => self.apply_body_contact(event.a, event.b, event.started, begins),
            (FixtureKind::Sensor, FixtureKind::HitBox) => {
                self.apply_sensor_contact(event.a.index, event.b.entity, event.started, sensor_begins)
            }
            (FixtureKind::HitBox, FixtureKind::Sensor) => {
                self.apply_sensor_contact(event.b.index, event.a.entity, event.started, sensor_begins)
            }
            (FixtureKind::Sensor, FixtureKind::Sensor) => {}
        }
    }

    fn apply_body_contact(&mut self, x: FixtureTag, y: FixtureTag, started: bool, begins: &mut Vec<Begin<T>>) {
        if let Some(pair) = self.pairs.get_mut(x.entity, y.entity) {
            // an overlap-found pair the engine now reports is taken over without a new begin
            pair.source = match (pair.source, started) {
                (PairSource::Engine { contacts }, true) => PairSource::Engine { contacts: contacts + 1 },
                (PairSource::Engine { contacts }, false) => PairSource::Engine { contacts: contacts.saturating_sub(1) },
                (PairSource::Overlap, true) => PairSource::Engine { contacts: 1 },
                (PairSource::Overlap, false) => PairSource::Overlap,
            };
            return;
        }
        if !started {
            return;
        }

        let (Some(ex), Some(ey)) = (self.entities.get(x.entity), self.entities.get(y.entity)) else {
            return;
        };
        if !ex.is_collidable() || !ey.is_collidable() || ex.ignores(ey) {
            return;
        }
        let Some((key, a, b, swapped)) = self.handlers.orient(ex.entity_type(), x.entity, ey.entity_type(), y.entity)
        else {
            return;
        };
        let boxes = if swapped { (y.index as usize, x.index as usize) } else { (x.index as usize, y.index as usize) };
        self.pairs.put(CollisionPair::new(a, b, key, PairSource::Engine { contacts: 1 }));
        begins.push(Begin { key, a, b, boxes });
    }

    fn apply_sensor_contact(&mut self, sid: u32, other: EntityId, started: bool, begins: &mut Vec<(u32, EntityId)>) {
        let Some(sensor) = self.sensors.get_mut(&sid) else {
            return;
        };
        if !self.entities.contains_key(other) {
            return;
        }
        match (sensor.touching.get_mut(&other), started) {
            (Some(count), true) => *count += 1,
            (Some(count), false) => *count = count.saturating_sub(1),
            (None, true) => {
                sensor.touching.insert(other, 1);
                begins.push((sid, other));
            }
            (None, false) => {}
        }
    }

    fn participates(e: &Entity<T>) -> bool {
        e.is_collidable() && !e.bbox().is_empty()
    }

    /// Whether the rigid-body engine reports contacts for this pair.
    fn engine_modelled(a: &Entity<T>, b: &Entity<T>) -> bool {
        a.has_body()
            && b.has_body()
            && (a.body_type() == Some(BodyType::Dynamic) || b.body_type() == Some(BodyType::Dynamic))
    }

    /// Separating-axis pass over pairs the engine does not cover. Returns every
    /// entity pair found overlapping this tick.
    fn overlap_pass(&mut self, begins: &mut Vec<Begin<T>>) -> HashSet<UnorderedPair<EntityId>> {
        let candidates: Vec<(EntityId, EntityId)> = match self.config.strategy {
            CollisionDetectionStrategy::BruteForce => {
                let ids: Vec<EntityId> =
                    self.entities.iter().filter(|(_, e)| Self::participates(e)).map(|(id, _)| id).collect();
                let mut out = Vec::new();
                for i0 in 0..ids.len() {
                    for i1 in (i0 + 1)..ids.len() {
                        out.push((ids[i0], ids[i1]));
                    }
                }
                out
            }
            CollisionDetectionStrategy::GridIndexing => {
                self.grid.clear();
                for e in self.entities.values().filter(|e| Self::participates(e)) {
                    self.grid.insert(e);
                }
                self.grid.candidate_pairs()
            }
        };

        let mut overlapping = HashSet::new();
        for (x, y) in candidates {
            let (Some(ex), Some(ey)) = (self.entities.get(x), self.entities.get(y)) else {
                continue;
            };
            if Self::engine_modelled(ex, ey) || ex.ignores(ey) {
                continue;
            }
            let Some((key, a, b, swapped)) = self.handlers.orient(ex.entity_type(), x, ey.entity_type(), y) else {
                continue;
            };
            let Some((i, j)) = ex.bbox().check_collision(&ex.transform, ey.bbox(), &ey.transform) else {
                continue;
            };

            overlapping.insert(UnorderedPair::new(x, y));
            if !self.pairs.contains(x, y) {
                let boxes = if swapped { (j, i) } else { (i, j) };
                self.pairs.put(CollisionPair::new(a, b, key, PairSource::Overlap));
                begins.push(Begin { key, a, b, boxes });
            }
        }
        overlapping
    }

    /// Remove and return every pair that is no longer active.
    fn collect_ended(&mut self, overlapping: &HashSet<UnorderedPair<EntityId>>) -> Vec<CollisionPair<T>> {
        let entities = &self.entities;
        let stale = self.pairs.keys_where(|p| {
            let (Some(a), Some(b)) = (entities.get(p.a()), entities.get(p.b())) else {
                return true;
            };
            !a.is_collidable()
                || !b.is_collidable()
                || a.ignores(b)
                || match p.source() {
                    PairSource::Overlap => !overlapping.contains(&p.key()),
                    PairSource::Engine { contacts } => contacts == 0,
                }
        });
        stale.iter().filter_map(|k| self.pairs.take(k)).collect()
    }

    fn collect_sensor_ended(&mut self) -> Vec<(u32, EntityId)> {
        let entities = &self.entities;
        let mut ended = Vec::new();
        for (sid, sensor) in self.sensors.iter_mut() {
            sensor.touching.retain(|other, count| {
                let keep = *count > 0 && entities.contains_key(*other);
                if !keep {
                    ended.push((*sid, *other));
                }
                keep
            });
        }
        ended
    }

    /// Begin callbacks, then persist for every active pair, then end callbacks.
    fn dispatch(&mut self, begins: Vec<Begin<T>>, ended: Vec<CollisionPair<T>>) {
        for begin in &begins {
            trace!("collision begin {:?} / {:?}", begin.a, begin.b);
            let (i, j) = begin.boxes;
            with_pair(&mut self.handlers, &mut self.entities, &begin.key, begin.a, begin.b, |h, a, b| {
                if let (Some(box_a), Some(box_b)) = (a.hit_boxes().get(i).cloned(), b.hit_boxes().get(j).cloned()) {
                    h.on_hit_box_trigger(a, b, &box_a, &box_b);
                }
                h.on_collision_begin(a, b);
            });
        }

        let active: Vec<(UnorderedPair<T>, EntityId, EntityId)> =
            self.pairs.iter().map(|p| (p.handler_key(), p.a(), p.b())).collect();
        for (key, a, b) in active {
            with_pair(&mut self.handlers, &mut self.entities, &key, a, b, |h, a, b| h.on_collision(a, b));
        }

        for pair in &ended {
            end_pair(&mut self.handlers, &mut self.entities, pair);
        }
    }

    fn dispatch_sensors(&mut self, begins: Vec<(u32, EntityId)>, ended: Vec<(u32, EntityId)>) {
        for (sid, other) in begins {
            if let (Some(sensor), Some(e)) = (self.sensors.get_mut(&sid), self.entities.get_mut(other)) {
                trace!("sensor begin {:?}", other);
                sensor.handler.on_collision_begin(e);
            }
        }
        for sensor in self.sensors.values_mut() {
            for other in sensor.touching.keys() {
                if let Some(e) = self.entities.get_mut(*other) {
                    sensor.handler.on_collision(e);
                }
            }
        }
        for (sid, other) in ended {
            if let (Some(sensor), Some(e)) = (self.sensors.get_mut(&sid), self.entities.get_mut(other)) {
                trace!("sensor end {:?}", other);
                sensor.handler.on_collision_end(e);
            }
        }
    }

    /// Drop all entities, bodies, pairs and sensors. Configuration, gravity and
    /// handlers stay; no callbacks fire.
    pub fn reset(&mut self) {
        debug!("physics world reset ({} entities)", self.entities.len());
        self.entities.clear();
        self.pairs.clear();
        self.sensors.clear();
        self.grid.clear();
        self.engine.clear();
    }
}
