// src/actors/lock_axis.rs
//! Axis locking through a world constraint on the object's body.

use super::{ActorCtx, ActorKind, PhysActor};
use crate::engine::{AxisLocks, ConstraintId, Frame};
use crate::world::Taint;

#[derive(Debug, Default)]
pub struct LockAxisActor {
    enabled: bool,
    constraint: Option<ConstraintId>,
    locks: AxisLocks,
}

impl LockAxisActor {
    pub fn new() -> Self {
        Self {
            enabled: true,
            constraint: None,
            locks: AxisLocks::FREE,
        }
    }

    pub fn constraint(&self) -> Option<ConstraintId> {
        self.constraint
    }

    fn release_constraint(&mut self, ctx: &mut ActorCtx<'_>) {
        if let Some(constraint) = self.constraint.take() {
            log::debug!("object {}: releasing axis lock constraint", ctx.id());
            ctx.engine.destroy_constraint(constraint);
        }
    }
}

impl PhysActor for LockAxisActor {
    fn kind(&self) -> ActorKind {
        ActorKind::LockAxis
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn refresh(&mut self, ctx: &mut ActorCtx<'_>) {
        let locks = ctx.body.object().with_raw(|raw| raw.axis_locks);
        if locks.all_free() {
            self.enabled = false;
        }
        if !self.is_active(ctx.body) {
            self.release_constraint(ctx);
            return;
        }

        if let Some(constraint) = self.constraint {
            if locks == self.locks && ctx.engine.has_constraint(constraint) {
                return;
            }
        }
        self.release_constraint(ctx);

        let Some(body) = ctx.body.handle() else {
            return;
        };
        let Some((position, rotation)) = ctx.engine.transform(body) else {
            return;
        };
        match ctx.engine.create_world_constraint(body, Frame::new(position, rotation), locks) {
            Ok(constraint) => {
                self.constraint = Some(constraint);
                self.locks = locks;
            }
            Err(e) => log::warn!("object {}: axis lock failed: {e}", ctx.id()),
        }
    }

    fn remove_body_dependencies(&mut self, ctx: &mut ActorCtx<'_>) {
        self.release_constraint(ctx);
        if self.enabled {
            // Recreate against whatever body exists once the rebuild is done.
            let id = ctx.id();
            ctx.taints.submit(
                "LockAxisRefresh",
                Taint::RefreshActor {
                    id,
                    kind: ActorKind::LockAxis,
                },
            );
        }
    }

    fn dispose(&mut self, ctx: &mut ActorCtx<'_>) {
        ctx.unregister_pre_step(ActorKind::LockAxis);
        self.release_constraint(ctx);
    }
}
