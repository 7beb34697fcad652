// src/linkset/constraints.rs
//! Constraint linksets: every member keeps its own body, children are held to
//! the root by fixed joints anchored halfway between the two origins. Each
//! member is given the whole linkset's mass so the joints do not fight
//! mismatched bodies.

use super::{LinkInfo, Linkset, LinksetCtx, RebuildOutcome};
use crate::body::PhysBody;
use crate::engine::{Frame, PhysicsEngine};
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

    let mass = linkset.mass(ctx.bodies);
    for id in linkset.members() {
        if let Some(body) = ctx.bodies.get_mut(&id) {
            body.linkset_mass = Some(mass);
            body.update_physical_mass_properties(ctx.engine, mass, !body.is_ghosted());
        }
    }

    let Some(root) = ctx.bodies.get(&root_id) else {
        return RebuildOutcome::Reverted;
    };
    let Some(root_handle) = root.handle() else {
        return RebuildOutcome::Reverted;
    };
    let (root_position, root_rotation) = root.object().with_raw(|raw| (raw.position, raw.orientation));
    let root_inverse = root_rotation.inverse();

    for (child_id, info) in linkset.children.iter_mut() {
        if let Some(constraint) = info.constraint {
            if ctx.engine.has_constraint(constraint) {
                ctx.engine.recalculate_constraint(constraint);
                continue;
            }
        }
        let Some(child) = ctx.bodies.get(child_id) else {
            continue;
        };
        let Some(child_handle) = child.handle() else {
            continue;
        };
        let (child_position, child_rotation) = child.object().with_raw(|raw| (raw.position, raw.orientation));
        let child_inverse = child_rotation.inverse();

        let midpoint = (root_position + child_position) * 0.5;
        let frame_a = Frame::new(root_inverse * (midpoint - root_position), root_inverse);
        let frame_b = Frame::new(child_inverse * (midpoint - child_position), child_inverse);
        match ctx.engine.create_fixed_constraint(root_handle, frame_a, child_handle, frame_b) {
            Ok(constraint) => {
                ctx.engine.recalculate_constraint(constraint);
                info.constraint = Some(constraint);
            }
            Err(e) => log::warn!("linkset {root_id}: cannot join child {child_id}: {e}"),
        }
    }
    RebuildOutcome::Built
}

/// Drop every joint and give each member its own mass back.
pub(super) fn revert(linkset: &mut Linkset, ctx: &mut LinksetCtx<'_>) {
    for info in linkset.children.values_mut() {
        if let Some(constraint) = info.constraint.take() {
            ctx.engine.destroy_constraint(constraint);
        }
    }
    for id in linkset.members() {
        if let Some(body) = ctx.bodies.get_mut(&id) {
            restore_mass(body, ctx.engine);
        }
    }
}

pub(super) fn remove_child(child: LocalId, info: LinkInfo, ctx: &mut LinksetCtx<'_>) {
    if let Some(constraint) = info.constraint {
        ctx.engine.destroy_constraint(constraint);
    }
    if let Some(body) = ctx.bodies.get_mut(&child) {
        restore_mass(body, ctx.engine);
        body.force_transform_from_raw(ctx.engine);
    }
}

fn restore_mass(body: &mut PhysBody, engine: &mut dyn PhysicsEngine) {
    if body.linkset_mass.take().is_some() && body.has_physical_body() {
        let own = body.object().mass();
        body.update_physical_mass_properties(engine, own, !body.is_ghosted());
    }
}
