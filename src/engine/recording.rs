// src/engine/recording.rs
//! Test double for [`PhysicsEngine`]: keeps plain state, logs every mutating
//! call and integrates velocity without gravity or contacts. Collisions are
//! whatever a test pushes into `pending_collisions`.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Quat, Vec3};
use parking_lot::Mutex;

use super::{
    AxisLocks, BodyId, BodyType, CollisionRecord, ConstraintId, EntityProperties, Frame, PhysicsEngine, ShapeDesc,
    ShapeId, StepOutput,
};
use crate::error::{PhysicsError, PhysicsResult};
use crate::object::LocalId;
use crate::terrain::Terrain;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateShape(ShapeId),
    CreateCompound(ShapeId),
    AddChild { compound: ShapeId, child: ShapeId, offset: Vec3 },
    DestroyShape(ShapeId),
    CreateBody { id: LocalId, body: BodyId },
    DestroyBody(BodyId),
    AddToWorld(BodyId),
    RemoveFromWorld(BodyId),
    SetBodyShape(BodyId, ShapeId),
    SetBodyType(BodyId, BodyType),
    SetTransform(BodyId, Vec3),
    SetLinearVelocity(BodyId, Vec3),
    SetAngularVelocity(BodyId, Vec3),
    SetMassProps(BodyId, f32),
    SetMaterial(BodyId),
    SetCollisionResponse(BodyId, bool),
    SetCollisionEvents(BodyId, bool),
    ApplyForce(BodyId, Vec3),
    ApplyImpulse(BodyId, Vec3),
    ApplyTorque(BodyId, Vec3),
    ApplyTorqueImpulse(BodyId, Vec3),
    CreateConstraint(ConstraintId),
    DestroyConstraint(ConstraintId),
    RecalculateConstraint(ConstraintId),
    SetTerrain,
    Step,
}

#[derive(Debug, Clone)]
pub enum RecShape {
    Convex(ShapeDesc),
    Compound(Vec<(ShapeId, Vec3, Quat)>),
}

#[derive(Debug, Clone)]
pub struct RecBody {
    pub id: LocalId,
    pub shape: ShapeId,
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
    pub inertia: Vec3,
    pub in_world: bool,
    pub body_type: BodyType,
    pub collision_response: bool,
    pub events: bool,
    pub gravity_scale: f32,
    pub rotation_locked: bool,
    pub friction: f32,
    pub restitution: f32,
    pub force: Vec3,
}

#[derive(Debug, Clone)]
pub struct RecConstraint {
    pub body_a: BodyId,
    pub body_b: Option<BodyId>,
    pub frame_a: Frame,
    pub locks: Option<AxisLocks>,
}

#[derive(Debug, Default)]
pub struct RecState {
    next: u64,
    pub shapes: HashMap<ShapeId, RecShape>,
    pub bodies: HashMap<BodyId, RecBody>,
    pub constraints: HashMap<ConstraintId, RecConstraint>,
    pub calls: Vec<Call>,
    pub pending_collisions: Vec<CollisionRecord>,
    pub terrain_sets: usize,
}

impl RecState {
    fn next(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    pub fn body_of(&self, id: LocalId) -> Option<(BodyId, &RecBody)> {
        self.bodies
            .iter()
            .find(|(_, b)| b.id == id)
            .map(|(handle, b)| (*handle, b))
    }

    pub fn calls_for(&self, body: BodyId) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|c| match c {
                Call::CreateBody { body: b, .. }
                | Call::DestroyBody(b)
                | Call::AddToWorld(b)
                | Call::RemoveFromWorld(b)
                | Call::SetBodyShape(b, _)
                | Call::SetBodyType(b, _)
                | Call::SetTransform(b, _)
                | Call::SetLinearVelocity(b, _)
                | Call::SetAngularVelocity(b, _)
                | Call::SetMassProps(b, _)
                | Call::SetMaterial(b)
                | Call::SetCollisionResponse(b, _)
                | Call::SetCollisionEvents(b, _)
                | Call::ApplyForce(b, _)
                | Call::ApplyImpulse(b, _)
                | Call::ApplyTorque(b, _)
                | Call::ApplyTorqueImpulse(b, _) => *b == body,
                _ => false,
            })
            .cloned()
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

#[derive(Clone, Default)]
pub struct RecordingEngine {
    state: Arc<Mutex<RecState>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the state, usable after the engine moved into a scene.
    pub fn handle(&self) -> Arc<Mutex<RecState>> {
        Arc::clone(&self.state)
    }

    fn with_body(&mut self, body: BodyId, call: Call, f: impl FnOnce(&mut RecBody)) {
        let mut state = self.state.lock();
        state.calls.push(call);
        if let Some(b) = state.bodies.get_mut(&body) {
            f(b);
        }
    }
}

impl PhysicsEngine for RecordingEngine {
    fn create_shape(&mut self, desc: &ShapeDesc) -> PhysicsResult<ShapeId> {
        let mut state = self.state.lock();
        let id = ShapeId(state.next());
        state.shapes.insert(id, RecShape::Convex(desc.clone()));
        state.calls.push(Call::CreateShape(id));
        Ok(id)
    }

    fn create_compound_shape(&mut self) -> ShapeId {
        let mut state = self.state.lock();
        let id = ShapeId(state.next());
        state.shapes.insert(id, RecShape::Compound(Vec::new()));
        state.calls.push(Call::CreateCompound(id));
        id
    }

    fn add_child_shape_to_compound(
        &mut self,
        compound: ShapeId,
        child: ShapeId,
        offset_pos: Vec3,
        offset_rot: Quat,
    ) -> PhysicsResult<()> {
        let mut state = self.state.lock();
        if !matches!(state.shapes.get(&child), Some(RecShape::Convex(_))) {
            return Err(PhysicsError::InvalidHandle(format!("{child:?}")));
        }
        match state.shapes.get_mut(&compound) {
            Some(RecShape::Compound(children)) => children.push((child, offset_pos, offset_rot)),
            _ => return Err(PhysicsError::InvalidHandle(format!("{compound:?}"))),
        }
        state.calls.push(Call::AddChild {
            compound,
            child,
            offset: offset_pos,
        });
        Ok(())
    }

    fn compound_child_count(&self, compound: ShapeId) -> usize {
        match self.state.lock().shapes.get(&compound) {
            Some(RecShape::Compound(children)) => children.len(),
            _ => 0,
        }
    }

    fn destroy_shape(&mut self, shape: ShapeId) {
        let mut state = self.state.lock();
        state.shapes.remove(&shape);
        state.calls.push(Call::DestroyShape(shape));
    }

    fn create_body(&mut self, id: LocalId, shape: ShapeId, position: Vec3, orientation: Quat) -> PhysicsResult<BodyId> {
        let mut state = self.state.lock();
        if !state.shapes.contains_key(&shape) {
            return Err(PhysicsError::InvalidHandle(format!("{shape:?}")));
        }
        let body = BodyId(state.next());
        state.bodies.insert(
            body,
            RecBody {
                id,
                shape,
                position,
                orientation,
                velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                mass: 0.0,
                inertia: Vec3::ZERO,
                in_world: false,
                body_type: BodyType::Static,
                collision_response: true,
                events: false,
                gravity_scale: 1.0,
                rotation_locked: false,
                friction: 0.5,
                restitution: 0.0,
                force: Vec3::ZERO,
            },
        );
        state.calls.push(Call::CreateBody { id, body });
        Ok(body)
    }

    fn destroy_body(&mut self, body: BodyId) {
        let mut state = self.state.lock();
        state.bodies.remove(&body);
        state
            .constraints
            .retain(|_, c| c.body_a != body && c.body_b != Some(body));
        state.calls.push(Call::DestroyBody(body));
    }

    fn has_body(&self, body: BodyId) -> bool {
        self.state.lock().bodies.contains_key(&body)
    }

    fn add_to_world(&mut self, body: BodyId) {
        self.with_body(body, Call::AddToWorld(body), |b| b.in_world = true);
    }

    fn remove_from_world(&mut self, body: BodyId) {
        self.with_body(body, Call::RemoveFromWorld(body), |b| b.in_world = false);
    }

    fn is_in_world(&self, body: BodyId) -> bool {
        self.state.lock().bodies.get(&body).map(|b| b.in_world).unwrap_or(false)
    }

    fn set_body_shape(&mut self, body: BodyId, shape: ShapeId) -> PhysicsResult<()> {
        if !self.state.lock().shapes.contains_key(&shape) {
            return Err(PhysicsError::InvalidHandle(format!("{shape:?}")));
        }
        self.with_body(body, Call::SetBodyShape(body, shape), |b| b.shape = shape);
        Ok(())
    }

    fn set_body_type(&mut self, body: BodyId, body_type: BodyType) {
        self.with_body(body, Call::SetBodyType(body, body_type), |b| b.body_type = body_type);
    }

    fn set_transform(&mut self, body: BodyId, position: Vec3, orientation: Quat) {
        self.with_body(body, Call::SetTransform(body, position), |b| {
            b.position = position;
            b.orientation = orientation;
        });
    }

    fn transform(&self, body: BodyId) -> Option<(Vec3, Quat)> {
        self.state
            .lock()
            .bodies
            .get(&body)
            .map(|b| (b.position, b.orientation))
    }

    fn set_linear_velocity(&mut self, body: BodyId, velocity: Vec3) {
        self.with_body(body, Call::SetLinearVelocity(body, velocity), |b| b.velocity = velocity);
    }

    fn linear_velocity(&self, body: BodyId) -> Option<Vec3> {
        self.state.lock().bodies.get(&body).map(|b| b.velocity)
    }

    fn set_angular_velocity(&mut self, body: BodyId, velocity: Vec3) {
        self.with_body(body, Call::SetAngularVelocity(body, velocity), |b| {
            b.angular_velocity = velocity
        });
    }

    fn angular_velocity(&self, body: BodyId) -> Option<Vec3> {
        self.state.lock().bodies.get(&body).map(|b| b.angular_velocity)
    }

    fn set_mass_props(&mut self, body: BodyId, mass: f32, inertia: Vec3) {
        self.with_body(body, Call::SetMassProps(body, mass), |b| {
            b.mass = mass;
            b.inertia = inertia;
        });
    }

    fn calculate_local_inertia(&self, _shape: ShapeId, mass: f32) -> Vec3 {
        Vec3::splat(mass * 0.1)
    }

    fn set_material(&mut self, body: BodyId, friction: f32, restitution: f32) {
        self.with_body(body, Call::SetMaterial(body), |b| {
            b.friction = friction;
            b.restitution = restitution;
        });
    }

    fn set_gravity_scale(&mut self, body: BodyId, scale: f32) {
        if let Some(b) = self.state.lock().bodies.get_mut(&body) {
            b.gravity_scale = scale;
        }
    }

    fn set_collision_response(&mut self, body: BodyId, enabled: bool) {
        self.with_body(body, Call::SetCollisionResponse(body, enabled), |b| {
            b.collision_response = enabled
        });
    }

    fn set_collision_events(&mut self, body: BodyId, enabled: bool) {
        self.with_body(body, Call::SetCollisionEvents(body, enabled), |b| b.events = enabled);
    }

    fn set_rotation_locked(&mut self, body: BodyId, locked: bool) {
        if let Some(b) = self.state.lock().bodies.get_mut(&body) {
            b.rotation_locked = locked;
        }
    }

    fn set_damping(&mut self, _body: BodyId, _linear: f32, _angular: f32) {}

    fn apply_central_force(&mut self, body: BodyId, force: Vec3) {
        self.with_body(body, Call::ApplyForce(body, force), |b| b.force += force);
    }

    fn apply_central_impulse(&mut self, body: BodyId, impulse: Vec3) {
        self.with_body(body, Call::ApplyImpulse(body, impulse), |b| {
            if b.mass > 0.0 {
                b.velocity += impulse / b.mass;
            }
        });
    }

    fn apply_torque(&mut self, body: BodyId, torque: Vec3) {
        self.with_body(body, Call::ApplyTorque(body, torque), |_| {});
    }

    fn apply_torque_impulse(&mut self, body: BodyId, impulse: Vec3) {
        self.with_body(body, Call::ApplyTorqueImpulse(body, impulse), |_| {});
    }

    fn create_fixed_constraint(
        &mut self,
        body_a: BodyId,
        frame_a: Frame,
        body_b: BodyId,
        _frame_b: Frame,
    ) -> PhysicsResult<ConstraintId> {
        let mut state = self.state.lock();
        if !(state.bodies.contains_key(&body_a) && state.bodies.contains_key(&body_b)) {
            return Err(PhysicsError::InvalidHandle(format!("{body_a:?} / {body_b:?}")));
        }
        let id = ConstraintId(state.next());
        state.constraints.insert(
            id,
            RecConstraint {
                body_a,
                body_b: Some(body_b),
                frame_a,
                locks: None,
            },
        );
        state.calls.push(Call::CreateConstraint(id));
        Ok(id)
    }

    fn create_world_constraint(
        &mut self,
        body: BodyId,
        world_frame: Frame,
        locks: AxisLocks,
    ) -> PhysicsResult<ConstraintId> {
        let mut state = self.state.lock();
        if !state.bodies.contains_key(&body) {
            return Err(PhysicsError::InvalidHandle(format!("{body:?}")));
        }
        let id = ConstraintId(state.next());
        state.constraints.insert(
            id,
            RecConstraint {
                body_a: body,
                body_b: None,
                frame_a: world_frame,
                locks: Some(locks),
            },
        );
        state.calls.push(Call::CreateConstraint(id));
        Ok(id)
    }

    fn recalculate_constraint(&mut self, constraint: ConstraintId) {
        self.state.lock().calls.push(Call::RecalculateConstraint(constraint));
    }

    fn destroy_constraint(&mut self, constraint: ConstraintId) {
        let mut state = self.state.lock();
        state.constraints.remove(&constraint);
        state.calls.push(Call::DestroyConstraint(constraint));
    }

    fn has_constraint(&self, constraint: ConstraintId) -> bool {
        self.state.lock().constraints.contains_key(&constraint)
    }

    fn set_gravity(&mut self, _gravity: Vec3) {}

    fn set_terrain(&mut self, _terrain: &Terrain) -> PhysicsResult<()> {
        let mut state = self.state.lock();
        state.terrain_sets += 1;
        state.calls.push(Call::SetTerrain);
        Ok(())
    }

    fn step_simulation(&mut self, dt: f32, _max_substeps: u32, _fixed_timestep: f32) -> StepOutput {
        let mut state = self.state.lock();
        state.calls.push(Call::Step);
        let mut output = StepOutput {
            substeps: 1,
            ..Default::default()
        };
        for body in state.bodies.values_mut() {
            if !body.in_world || body.body_type != BodyType::Dynamic {
                continue;
            }
            let before = body.velocity;
            if body.mass > 0.0 {
                body.velocity += body.force / body.mass * dt;
            }
            body.force = Vec3::ZERO;
            body.position += body.velocity * dt;
            output.updates.push(EntityProperties {
                id: body.id,
                position: body.position,
                orientation: body.orientation,
                velocity: body.velocity,
                acceleration: (body.velocity - before) / dt.max(f32::EPSILON),
                angular_velocity: body.angular_velocity,
            });
        }
        output.updates.sort_by_key(|u| u.id);
        output.collisions = std::mem::take(&mut state.pending_collisions);
        output
    }
}
