// src/lib.rs
//! Physics core for a region simulator.
//!
//! Simulator code owns [`PhysObject`] handles and mutates their Raw state from
//! any thread; every engine mutation is queued as a taint and replayed by the
//! stepping thread inside [`PhysicsScene::simulate`]. Behaviors (avatar walking,
//! hover, vehicles, persistent forces) are actors attached per object, and
//! linked objects move as one through a compound or constraint linkset.
//!
//! ```no_run
//! use glam::Vec3;
//! use prim_physics::{ObjectDesc, PhysicsConfig, PhysicsScene};
//!
//! let mut scene = PhysicsScene::with_rapier(PhysicsConfig::default())?;
//! let crate_box = scene.add_prim(
//!     ObjectDesc::prim(1, Vec3::new(128.0, 128.0, 30.0), Vec3::ONE).physical(true),
//! )?;
//! for _ in 0..55 {
//!     scene.simulate(1.0 / 55.0);
//! }
//! println!("landed at {}", crate_box.position());
//! # Ok::<(), prim_physics::PhysicsError>(())
//! ```

pub mod actors;
pub mod body;
pub mod collision;
pub mod config;
pub mod engine;
pub mod error;
pub mod linkset;
pub mod material;
pub mod math;
pub mod motor;
pub mod object;
pub mod scene;
pub mod taint;
pub mod terrain;
pub mod world;

pub use crate::actors::{ActorKind, HoverKind, MoveTarget, VehicleFlags, VehicleParam, VehicleType};
pub use crate::collision::ContactInfo;
pub use crate::config::PhysicsConfig;
pub use crate::engine::{AxisLocks, PhysicsEngine, RapierEngine, TERRAIN_ID};
pub use crate::error::{PhysicsError, PhysicsResult};
pub use crate::linkset::LinksetKind;
pub use crate::material::MaterialKind;
pub use crate::object::{LocalId, ObjectDesc, ObjectKind, PhysObject, PrimShape};
pub use crate::scene::{PhysicsScene, SceneEvent, SceneHandle, StepStats};
pub use crate::terrain::Terrain;
pub use crate::world::TaintWorld;
