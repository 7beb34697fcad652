// src/linkset/mod.rs
//! Linksets: a root object plus children that move as one rigid body.
//!
//! Two implementations share the membership bookkeeping here:
//!
//! - [`LinksetKind::Compound`] merges every member's shape into one compound
//!   shape carried by the root; children are ghosted while it is built.
//! - [`LinksetKind::Constraint`] keeps every body and ties each child to the
//!   root with a fixed joint.
//!
//! Membership changes never touch the engine layout directly. They schedule a
//! rebuild as a post-taint keyed on the root, so any number of changes in one
//! tick cost one rebuild.

mod compound;
mod constraints;

use std::collections::{BTreeMap, HashMap};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::body::PhysBody;
use crate::config::PhysicsConfig;
use crate::engine::{ConstraintId, PhysicsEngine, ShapeId};
use crate::math::center_of_mass;
use crate::object::LocalId;
use crate::taint::TaintSender;
use crate::world::Taint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinksetKind {
    #[default]
    Compound,
    Constraint,
}

/// Child pose relative to the root, captured in the root's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkInfo {
    pub offset_position: Vec3,
    pub offset_rotation: Quat,
    pub constraint: Option<ConstraintId>,
}

impl LinkInfo {
    pub fn capture(root_position: Vec3, root_rotation: Quat, child_position: Vec3, child_rotation: Quat) -> Self {
        let inverse = root_rotation.inverse();
        Self {
            offset_position: inverse * (child_position - root_position),
            offset_rotation: inverse * child_rotation,
            constraint: None,
        }
    }

    /// World pose of the child for a given root pose.
    pub fn world_pose(&self, root_position: Vec3, root_rotation: Quat) -> (Vec3, Quat) {
        (
            root_position + root_rotation * self.offset_position,
            root_rotation * self.offset_rotation,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Built,
    /// A member was not ready; another attempt is scheduled.
    Deferred,
    /// Nothing to build (no children or not physical); members are independent.
    Reverted,
}

/// What a linkset needs from the taint world while it works.
pub struct LinksetCtx<'a> {
    pub engine: &'a mut dyn PhysicsEngine,
    pub bodies: &'a mut HashMap<LocalId, PhysBody>,
    pub config: &'a PhysicsConfig,
    pub taints: &'a TaintSender<Taint>,
}

#[derive(Debug)]
pub struct Linkset {
    kind: LinksetKind,
    root: LocalId,
    children: BTreeMap<LocalId, LinkInfo>,
    rebuild_scheduled: bool,
    failed_attempts: u32,
    warned_incomplete: bool,
    rebuild_count: u64,
    compound: Option<ShapeId>,
}

impl Linkset {
    pub fn new(kind: LinksetKind, root: LocalId) -> Self {
        Self {
            kind,
            root,
            children: BTreeMap::new(),
            rebuild_scheduled: false,
            failed_attempts: 0,
            warned_incomplete: false,
            rebuild_count: 0,
            compound: None,
        }
    }

    #[inline]
    pub fn kind(&self) -> LinksetKind {
        self.kind
    }

    #[inline]
    pub fn root(&self) -> LocalId {
        self.root
    }

    pub fn children(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.children.keys().copied()
    }

    pub fn has_child(&self, id: LocalId) -> bool {
        self.children.contains_key(&id)
    }

    pub fn link_info(&self, child: LocalId) -> Option<&LinkInfo> {
        self.children.get(&child)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Root first, then children in id order.
    pub fn members(&self) -> Vec<LocalId> {
        std::iter::once(self.root).chain(self.children()).collect()
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }

    pub fn is_rebuild_scheduled(&self) -> bool {
        self.rebuild_scheduled
    }

    /// Rebuilds deferred in a row because a member was not ready.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn has_warned_incomplete(&self) -> bool {
        self.warned_incomplete
    }

    /// Compound shape installed on the root, if built.
    pub fn compound_shape(&self) -> Option<ShapeId> {
        self.compound
    }

    /// Sum of the members' own masses.
    pub fn mass(&self, bodies: &HashMap<LocalId, PhysBody>) -> f32 {
        self.members()
            .iter()
            .filter_map(|id| bodies.get(id))
            .map(|b| b.object().mass())
            .sum()
    }

    pub fn center_of_mass(&self, bodies: &HashMap<LocalId, PhysBody>) -> Vec3 {
        center_of_mass(
            self.members()
                .iter()
                .filter_map(|id| bodies.get(id))
                .map(|b| b.object().with_raw(|raw| (raw.position, raw.mass))),
        )
    }

    fn capture(&self, child: LocalId, bodies: &HashMap<LocalId, PhysBody>) -> Option<LinkInfo> {
        let (root_position, root_rotation) = bodies.get(&self.root)?.object().with_raw(|r| (r.position, r.orientation));
        let (position, rotation) = bodies.get(&child)?.object().with_raw(|r| (r.position, r.orientation));
        Some(LinkInfo::capture(root_position, root_rotation, position, rotation))
    }

    /// Re-derive every child's offsets from the current Raw poses.
    fn refresh_offsets(&mut self, bodies: &HashMap<LocalId, PhysBody>) {
        let ids: Vec<LocalId> = self.children().collect();
        for id in ids {
            if let Some(fresh) = self.capture(id, bodies) {
                if let Some(info) = self.children.get_mut(&id) {
                    info.offset_position = fresh.offset_position;
                    info.offset_rotation = fresh.offset_rotation;
                }
            }
        }
    }

    pub(crate) fn schedule_rebuild(&mut self, taints: &TaintSender<Taint>) {
        if self.rebuild_scheduled {
            return;
        }
        self.rebuild_scheduled = true;
        taints.submit_post("RebuildLinkset", u64::from(self.root), Taint::RebuildLinkset { root: self.root });
    }

    pub(crate) fn add_child(&mut self, child: LocalId, ctx: &mut LinksetCtx<'_>) -> bool {
        if child == self.root || self.children.contains_key(&child) {
            return false;
        }
        let Some(info) = self.capture(child, ctx.bodies) else {
            log::debug!("linkset {}: cannot link unknown object {child}", self.root);
            return false;
        };
        self.children.insert(child, info);
        if let Some(body) = ctx.bodies.get(&child) {
            body.object().write_raw().linkset_root = Some(self.root);
        }
        if let Some(root) = ctx.bodies.get(&self.root) {
            root.object().write_raw().linkset_root = Some(self.root);
        }
        log::debug!("linkset {}: added child {child}", self.root);
        self.schedule_rebuild(ctx.taints);
        true
    }

    pub(crate) fn remove_child(&mut self, child: LocalId, ctx: &mut LinksetCtx<'_>) -> bool {
        let Some(info) = self.children.remove(&child) else {
            return false;
        };
        match self.kind {
            LinksetKind::Compound => compound::remove_child(child, ctx),
            LinksetKind::Constraint => constraints::remove_child(child, info, ctx),
        }
        if let Some(body) = ctx.bodies.get(&child) {
            body.object().write_raw().linkset_root = None;
        }
        log::debug!("linkset {}: removed child {child}", self.root);
        self.schedule_rebuild(ctx.taints);
        true
    }

    /// A child was moved or turned by the simulator.
    pub(crate) fn child_moved(&mut self, child: LocalId, ctx: &mut LinksetCtx<'_>) {
        let Some(fresh) = self.capture(child, ctx.bodies) else {
            return;
        };
        let Some(info) = self.children.get_mut(&child) else {
            return;
        };
        info.offset_position = fresh.offset_position;
        info.offset_rotation = fresh.offset_rotation;
        if let Some(constraint) = info.constraint.take() {
            ctx.engine.destroy_constraint(constraint);
        }
        self.schedule_rebuild(ctx.taints);
    }

    pub(crate) fn rebuild(&mut self, ctx: &mut LinksetCtx<'_>) -> RebuildOutcome {
        self.rebuild_scheduled = false;
        self.rebuild_count += 1;

        // Members destroyed since the last build just drop out.
        let bodies = &*ctx.bodies;
        self.children.retain(|id, _| bodies.contains_key(id));

        let outcome = match self.kind {
            LinksetKind::Compound => compound::rebuild(self, ctx),
            LinksetKind::Constraint => constraints::rebuild(self, ctx),
        };
        if outcome != RebuildOutcome::Deferred {
            self.failed_attempts = 0;
            self.warned_incomplete = false;
        }
        log::debug!("linkset {} rebuild #{}: {outcome:?}", self.root, self.rebuild_count);
        outcome
    }

    /// Undo whatever the last build installed in the engine.
    pub(crate) fn revert(&mut self, ctx: &mut LinksetCtx<'_>) {
        match self.kind {
            LinksetKind::Compound => compound::revert(self, ctx),
            LinksetKind::Constraint => constraints::revert(self, ctx),
        }
    }

    /// Copy the root's new pose into the children's Raw state. Returns
    /// `false` when the children move on their own.
    pub(crate) fn propagate_root_update(&self, bodies: &HashMap<LocalId, PhysBody>) -> bool {
        if self.kind == LinksetKind::Compound && self.compound.is_some() {
            compound::propagate(self, bodies);
            return true;
        }
        false
    }

    /// Count a rebuild that had to wait on `missing`, and try again next tick.
    fn note_incomplete(&mut self, missing: LocalId, ctx: &mut LinksetCtx<'_>) {
        self.failed_attempts += 1;
        if self.failed_attempts >= ctx.config.linkset_incomplete_warn_after && !self.warned_incomplete {
            log::warn!(
                "linkset {}: member {missing} still not ready after {} rebuild attempts",
                self.root,
                self.failed_attempts
            );
            self.warned_incomplete = true;
        } else {
            log::debug!("linkset {}: member {missing} not ready, rebuild deferred", self.root);
        }
        self.schedule_rebuild(ctx.taints);
    }

    /// First member that cannot take part in a build yet.
    fn first_unready(&self, bodies: &HashMap<LocalId, PhysBody>) -> Option<LocalId> {
        self.members().into_iter().find(|id| {
            bodies
                .get(id)
                .map_or(true, |b| !b.has_physical_body() || b.native_shape_id().is_none())
        })
    }
}

/// All linksets of a scene, keyed by root.
#[derive(Debug, Default)]
pub struct Linksets {
    sets: HashMap<LocalId, Linkset>,
    parents: HashMap<LocalId, LocalId>,
}

impl Linksets {
    pub fn get(&self, root: LocalId) -> Option<&Linkset> {
        self.sets.get(&root)
    }

    pub fn get_mut(&mut self, root: LocalId) -> Option<&mut Linkset> {
        self.sets.get_mut(&root)
    }

    /// Root of the linkset `id` belongs to (itself for a root).
    pub fn root_of(&self, id: LocalId) -> Option<LocalId> {
        if self.sets.contains_key(&id) {
            Some(id)
        } else {
            self.parents.get(&id).copied()
        }
    }

    /// Root of `id` when `id` is a child.
    pub fn parent_of(&self, id: LocalId) -> Option<LocalId> {
        self.parents.get(&id).copied()
    }

    pub fn is_root(&self, id: LocalId) -> bool {
        self.sets.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub(crate) fn entry(&mut self, root: LocalId, kind: LinksetKind) -> &mut Linkset {
        self.sets.entry(root).or_insert_with(|| Linkset::new(kind, root))
    }

    pub(crate) fn remove(&mut self, root: LocalId) -> Option<Linkset> {
        let linkset = self.sets.remove(&root)?;
        for child in linkset.children() {
            self.parents.remove(&child);
        }
        Some(linkset)
    }

    pub(crate) fn set_parent(&mut self, child: LocalId, root: LocalId) {
        self.parents.insert(child, root);
    }

    pub(crate) fn clear_parent(&mut self, child: LocalId) {
        self.parents.remove(&child);
    }
}
