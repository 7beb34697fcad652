// src/main.rs
//! Headless demo: a rolling region, a pile of crates, a linked cart and a
//! walking avatar, stepped at the simulator frame rate.
//!
//! Usage: `prim_physics_demo [config.json] [ticks]`

use std::backtrace::Backtrace;
use std::fs::File;
use std::io::Write;
use std::panic;

use anyhow::{Context, Result};
use glam::Vec3;
use log::{info, LevelFilter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use prim_physics::{
    HoverKind, ObjectDesc, PhysicsConfig, PhysicsScene, PrimShape, SceneEvent, StepStats, Terrain,
};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_TICKS: u64 = 550;

fn main() -> Result<()> {
    setup_diagnostics();
    setup_thread_priority();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => PhysicsConfig::from_file(&path).with_context(|| format!("loading config {path}"))?,
        None => PhysicsConfig::default(),
    };
    let ticks = match args.next() {
        Some(n) => n.parse::<u64>().with_context(|| format!("bad tick count {n:?}"))?,
        None => DEFAULT_TICKS,
    };

    run(config, ticks)
}

fn run(config: PhysicsConfig, ticks: u64) -> Result<()> {
    let dt = config.fixed_timestep;
    let terrain = rolling_terrain(&config)?;
    let mut scene = PhysicsScene::with_rapier(config)?;
    scene.set_terrain(terrain);

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let center = Vec3::new(128.0, 128.0, 0.0);

    // Crates dropped from a few meters up.
    for id in 1..=24 {
        let offset = Vec3::new(rng.gen_range(-12.0..12.0), rng.gen_range(-12.0..12.0), 0.0);
        let size = Vec3::splat(rng.gen_range(0.4..1.2));
        let shape = if rng.gen_bool(0.25) { PrimShape::Sphere } else { PrimShape::Box };
        scene.add_prim(
            ObjectDesc::prim(id, center + offset + Vec3::Z * rng.gen_range(26.0..34.0), size)
                .with_shape(shape)
                .physical(true),
        )?;
    }

    // A cart: body plus four wheels, moved as one.
    let cart = 100;
    scene.add_prim(ObjectDesc::prim(cart, center + Vec3::new(20.0, 0.0, 24.0), Vec3::new(3.0, 1.5, 0.4)).physical(true))?;
    for (i, (x, y)) in [(-1.2, -0.8), (-1.2, 0.8), (1.2, -0.8), (1.2, 0.8)].into_iter().enumerate() {
        let wheel = cart + 1 + i as u32;
        scene.add_prim(
            ObjectDesc::prim(wheel, center + Vec3::new(20.0 + x, y, 23.6), Vec3::splat(0.6))
                .with_shape(PrimShape::Cylinder)
                .physical(true),
        )?;
        scene.link(wheel, cart)?;
    }

    let balloon = scene.add_prim(ObjectDesc::prim(200, center + Vec3::new(-20.0, 0.0, 25.0), Vec3::splat(0.8)).physical(true))?;
    balloon.set_hover(4.0, HoverKind::Ground, 1.5)?;

    let avatar = scene.add_avatar(ObjectDesc::avatar(500, center + Vec3::new(0.0, -20.0, 24.0)))?;
    avatar.set_target_velocity(Vec3::new(0.0, 1.5, 0.0))?;
    avatar.subscribe_events(250);

    let mut totals = StepStats::default();
    let mut reports = 0usize;
    for tick in 1..=ticks {
        let stats = scene.simulate(dt);
        totals.taints += stats.taints;
        totals.post_taints += stats.post_taints;
        totals.collisions += stats.collisions;
        totals.corrections += stats.corrections;
        reports += scene
            .drain_events()
            .iter()
            .filter(|e| matches!(e, SceneEvent::Collisions { .. }))
            .count();

        if tick % 55 == 0 {
            info!(
                "t={:.1}s avatar {} cart {} (mass {:.1}) balloon z {:.2}",
                tick as f32 * dt,
                avatar.position(),
                scene.object(cart).map(|o| o.position()).unwrap_or_default(),
                scene.linkset_mass(cart).unwrap_or_default(),
                balloon.position().z,
            );
        }
    }

    info!(
        "{ticks} ticks: {} taints, {} post-taints, {} contacts, {reports} collision reports, {} corrections",
        totals.taints, totals.post_taints, totals.collisions, totals.corrections
    );
    Ok(())
}

/// Gentle hills around the configured base height.
fn rolling_terrain(config: &PhysicsConfig) -> Result<Terrain> {
    let [width, depth] = config.region_size;
    let (columns, rows) = (65, 65);
    let mut heights = Vec::with_capacity(columns * rows);
    for row in 0..rows {
        for column in 0..columns {
            let x = column as f32 / (columns - 1) as f32 * std::f32::consts::TAU;
            let y = row as f32 / (rows - 1) as f32 * std::f32::consts::TAU;
            heights.push(config.default_terrain_height + 1.5 * x.sin() * y.cos());
        }
    }
    Terrain::from_heights([width, depth], columns, rows, heights, config.water_height)
        .context("building the demo terrain")
}

fn setup_thread_priority() {
    #[cfg(feature = "high_priority")]
    {
        match thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max) {
            Ok(()) => info!("stepping thread priority raised to Max"),
            Err(e) => log::warn!("cannot raise thread priority: {e:?}"),
        }
    }
}

/// Logger plus a panic hook that leaves a crash report behind.
fn setup_diagnostics() {
    env_logger::Builder::new()
        .filter_level(if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format_timestamp_millis()
        .format_target(false)
        .parse_default_env()
        .init();

    panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();
        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };
        let location = panic_info
            .location()
            .map_or("unknown location".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));

        let report = format!("=== PHYSICS CRASH ===\nReason: {msg}\nLocation: {location}\n\nStack Trace:\n{backtrace}");
        eprintln!("\x1b[31;1m{report}\x1b[0m");
        if let Ok(mut file) = File::create("physics_crash.log") {
            let _ = file.write_all(report.as_bytes());
            eprintln!("crash report saved to physics_crash.log");
        }
    }));
}
