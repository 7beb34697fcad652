// src/linkset/compound.rs
//! Compound-shape linksets.
//!
//! The root's engine body carries one compound shape holding every member's
//! native shape at its offset. The compound's origin sits at the linkset's
//! center of mass, so the root body is displaced by the vector from the root's
//! simulator origin to that center, expressed in root axes.

use std::collections::HashMap;

use glam::{Quat, Vec3};

use super::{Linkset, LinksetCtx, RebuildOutcome};
use crate::body::PhysBody;
use crate::object::LocalId;

pub(super) fn rebuild(linkset: &mut Linkset, ctx: &mut LinksetCtx<'_>) -> RebuildOutcome {
    let root_id = linkset.root;
    let root_active = ctx.bodies.get(&root_id).is_some_and(|b| b.is_physically_active());
    if linkset.children.is_empty() || !root_active {
        revert(linkset, ctx);
        return RebuildOutcome::Reverted;
    }
    if let Some(missing) = linkset.first_unready(ctx.bodies) {
        linkset.note_incomplete(missing, ctx);
        return RebuildOutcome::Deferred;
    }

    linkset.refresh_offsets(ctx.bodies);
    let Some((root_position, root_rotation)) = ctx
        .bodies
        .get(&root_id)
        .map(|b| b.object().with_raw(|raw| (raw.position, raw.orientation)))
    else {
        return RebuildOutcome::Reverted;
    };
    let center = linkset.center_of_mass(ctx.bodies);
    let displacement = root_rotation.inverse() * (center - root_position);

    let compound = ctx.engine.create_compound_shape();
    for id in linkset.members() {
        let Some(shape) = ctx.bodies.get(&id).and_then(PhysBody::native_shape_id) else {
            continue;
        };
        let (offset, rotation) = match linkset.children.get(&id) {
            Some(info) => (info.offset_position, info.offset_rotation),
            None => (Vec3::ZERO, Quat::IDENTITY),
        };
        if let Err(e) = ctx
            .engine
            .add_child_shape_to_compound(compound, shape, offset - displacement, rotation)
        {
            log::warn!("linkset {root_id}: compound build failed on member {id}: {e}");
            ctx.engine.destroy_shape(compound);
            revert(linkset, ctx);
            return RebuildOutcome::Reverted;
        }
    }

    for child in linkset.children.keys() {
        if let Some(body) = ctx.bodies.get_mut(child) {
            body.set_ghosted(ctx.engine, ctx.config, true);
        }
    }

    let mass = linkset.mass(ctx.bodies);
    let Some(root) = ctx.bodies.get_mut(&root_id) else {
        ctx.engine.destroy_shape(compound);
        return RebuildOutcome::Reverted;
    };
    let Some(handle) = root.handle() else {
        ctx.engine.destroy_shape(compound);
        return RebuildOutcome::Reverted;
    };
    ctx.engine.remove_from_world(handle);
    if let Err(e) = ctx.engine.set_body_shape(handle, compound) {
        log::warn!("linkset {root_id}: cannot install compound: {e}");
        ctx.engine.destroy_shape(compound);
        revert(linkset, ctx);
        return RebuildOutcome::Reverted;
    }
    root.compound_shape = Some(compound);
    root.linkset_mass = Some(mass);
    root.displacement = displacement;
    root.update_physical_parameters(ctx.engine, ctx.config);

    if let Some(old) = linkset.compound.replace(compound) {
        ctx.engine.destroy_shape(old);
    }
    log::debug!(
        "linkset {root_id}: compound of {} members, mass {mass}, displacement {displacement}",
        linkset.children.len() + 1
    );
    RebuildOutcome::Built
}

/// Give the root its own shape back and return the children to the world.
pub(super) fn revert(linkset: &mut Linkset, ctx: &mut LinksetCtx<'_>) {
    if let Some(compound) = linkset.compound.take() {
        if let Some(root) = ctx.bodies.get_mut(&linkset.root) {
            root.compound_shape = None;
            root.linkset_mass = None;
            root.displacement = Vec3::ZERO;
            if let (Some(handle), Some(native)) = (root.handle(), root.native_shape_id()) {
                ctx.engine.remove_from_world(handle);
                if let Err(e) = ctx.engine.set_body_shape(handle, native) {
                    log::warn!("linkset {}: cannot restore root shape: {e}", linkset.root);
                }
                root.update_physical_parameters(ctx.engine, ctx.config);
            }
        }
        ctx.engine.destroy_shape(compound);
    }
    for child in linkset.children.keys() {
        if let Some(body) = ctx.bodies.get_mut(child) {
            body.set_ghosted(ctx.engine, ctx.config, false);
        }
    }
}

/// A child leaving keeps its last propagated pose and rejoins the world.
pub(super) fn remove_child(child: LocalId, ctx: &mut LinksetCtx<'_>) {
    if let Some(body) = ctx.bodies.get_mut(&child) {
        body.set_ghosted(ctx.engine, ctx.config, false);
    }
}

pub(super) fn propagate(linkset: &Linkset, bodies: &HashMap<LocalId, PhysBody>) {
    let Some(root) = bodies.get(&linkset.root) else {
        return;
    };
    let (position, rotation, velocity, angular) = root
        .object()
        .with_raw(|raw| (raw.position, raw.orientation, raw.velocity, raw.angular_velocity));
    for (id, info) in &linkset.children {
        let Some(child) = bodies.get(id) else {
            continue;
        };
        let (child_position, child_rotation) = info.world_pose(position, rotation);
        let mut raw = child.object().write_raw();
        raw.position = child_position;
        raw.orientation = child_rotation;
        raw.velocity = velocity + angular.cross(child_position - position);
        raw.angular_velocity = angular;
    }
}
