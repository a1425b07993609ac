//! Trellis demo runtime
//!
//! Boots a title world that hands over to a level world after a short delay,
//! runs the level for a couple of simulated seconds and quits.
//!
//! Reads `trellis.json` from the working directory when present. Logging
//! honours `RUST_LOG` (default `info`).

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use trellis_asset::{FnLoader, LoadError, Persistence, ResourceCache, ResourceHandle};
use trellis_core::ecs::{
    Controller, Entity, Processor, ProcessorError, Retire, TaskProcessor, TaskStep, UpdateContext, World, WorldEvent,
    WorldId,
};
use trellis_core::glam::Vec2;
use trellis_core::spatial::Transform2D;
use trellis_runtime::{BuildError, Driver, Loop, RuntimeConfig};

const CONFIG_FILE: &str = "trellis.json";
const TITLE_SECONDS: f32 = 0.5;
const LEVEL_SECONDS: f32 = 2.0;
// Safety net in case a world never asks to quit.
const MAX_FRAMES: u64 = 600;

#[derive(Debug, Clone, Copy)]
struct Velocity(Vec2);

/// Text resource attached to an entity.
struct Label(ResourceHandle<String>);

/// Spins its entity's transform; logs when attached, detached and on every
/// full turn.
struct Spinner {
    degrees_per_second: f32,
    turned: f32,
}

impl Controller for Spinner {
    fn on_attach(&mut self, entity: Entity, world: WorldId) {
        tracing::debug!(%entity, %world, "spinner attached");
    }

    fn on_detach(&mut self, entity: Entity) {
        tracing::debug!(%entity, turned = self.turned, "spinner detached");
    }

    fn on_update(&mut self, entity: Entity, dt: f32, ctx: &mut UpdateContext<'_>) {
        let Some(transform) = ctx.component::<Transform2D>(entity) else {
            return;
        };
        let delta = self.degrees_per_second * dt;
        if transform.rotation() + delta >= 360.0 {
            tracing::debug!(%entity, turned = self.turned + delta, "spinner completed a turn");
        }
        self.turned += delta;
        ctx.commands().push(move |world: &mut World| {
            world.get_component_mut::<Transform2D>(entity)?.rotate(delta);
            Ok(())
        });
    }
}

/// Integrates `Velocity` into `Transform2D`.
struct Movement;

impl Processor for Movement {
    fn update(&mut self, world: &mut World, dt: f32) -> Result<(), ProcessorError> {
        for entity in world.query_entities::<(Transform2D, Velocity)>() {
            let velocity = world.get_component::<Velocity>(entity)?.0;
            world.get_component_mut::<Transform2D>(entity)?.translate(velocity * dt);
        }
        Ok(())
    }
}

/// Resolves every `Label` that has not been loaded yet.
struct LabelResolver;

impl Processor for LabelResolver {
    fn update(&mut self, world: &mut World, _dt: f32) -> Result<(), ProcessorError> {
        for (entity, label) in world.query::<(Label,)>().iter() {
            if label.0.get().is_none() {
                let text = label.0.resolve().map_err(ProcessorError::from_error)?;
                tracing::info!(%entity, key = %label.0.key(), %text, "label resolved");
            }
        }
        Ok(())
    }
}

fn load_config() -> Result<RuntimeConfig> {
    if Path::new(CONFIG_FILE).exists() {
        RuntimeConfig::load(CONFIG_FILE).context("loading runtime config")
    } else {
        Ok(RuntimeConfig::default())
    }
}

fn text_loader() -> Arc<FnLoader<String, impl Fn(&str) -> Result<String, LoadError> + Send + Sync + 'static>> {
    Arc::new(
        FnLoader::new("text", |path: &str| {
            tracing::debug!(path, "loading text");
            Ok(format!("<{path}>"))
        })
        .with_release(|text: &String| tracing::debug!(%text, "text released")),
    )
}

fn build_title(driver: &mut Driver, level: WorldId) -> Result<WorldId> {
    let id = driver.create_world("title");
    let cache = driver.cache().clone();
    let loader = text_loader();
    let world = driver.world_mut(id).context("title world vanished")?;

    world.subscribe(|event: &WorldEvent| tracing::trace!(?event, "title event"));

    let logo = world.create_entity()?;
    world.add_component(logo, Transform2D::from_position(Vec2::ZERO))?;
    world.add_controller(
        logo,
        Spinner {
            degrees_per_second: 90.0,
            turned: 0.0,
        },
    )?;
    world.add_component(logo, Label(cache.make_handle("splash/logo", Arc::clone(&loader), Persistence::Scene)))?;

    let heading = world.create_entity()?;
    world.add_component(heading, Label(cache.make_handle("fonts/title", loader, Persistence::Persistent)))?;

    world.add_processor(LabelResolver, 5);

    let mut tasks = TaskProcessor::new();
    let mut waited = false;
    tasks.start(move |world: &mut World, _dt: f32| {
        if !waited {
            waited = true;
            return TaskStep::Wait(TITLE_SECONDS);
        }
        tracing::info!("title finished, switching to level");
        world.request_switch(level, Retire::Discard);
        TaskStep::Done
    });
    world.add_processor(tasks, 10);
    Ok(id)
}

fn populate_level(world: &mut World, cache: &ResourceCache) -> Result<(), BuildError> {
    let loader = text_loader();

    world.subscribe(|event: &WorldEvent| match event {
        WorldEvent::SwitchedIn { from, to } => tracing::info!(?from, %to, "entered level"),
        WorldEvent::Quit => tracing::info!("leaving level"),
        _ => {}
    });

    for index in 0..3u8 {
        let ship = world.create_entity()?;
        let offset = f32::from(index) * 10.0;
        world.add_component(ship, Transform2D::from_position(Vec2::new(offset, 0.0)))?;
        world.add_component(ship, Velocity(Vec2::new(0.0, 5.0 + offset)))?;
    }

    let hud = world.create_entity()?;
    world.add_component(hud, Label(cache.make_handle("fonts/title", Arc::clone(&loader), Persistence::Scene)))?;
    let banner = world.create_entity()?;
    world.add_component(banner, Label(cache.make_handle("levels/1/name", loader, Persistence::Ephemeral)))?;

    world.add_processor(Movement, 1);
    world.add_processor(LabelResolver, 5);

    let mut tasks = TaskProcessor::new();
    let mut waited = false;
    tasks.start(move |world: &mut World, _dt: f32| {
        if !waited {
            waited = true;
            return TaskStep::Wait(LEVEL_SECONDS);
        }
        for (entity, transform) in world.query::<(Transform2D,)>().iter() {
            tracing::info!(%entity, position = ?transform.position(), "final position");
        }
        world.request_quit();
        TaskStep::Done
    });
    world.add_processor(tasks, 10);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Trellis v{}", trellis_core::VERSION);

    let config = load_config()?;
    let mut driver = Driver::new(config);
    let level = driver.register_world("level", populate_level)?;
    let title = build_title(&mut driver, level)?;
    driver.activate(title)?;

    let mut game_loop = Loop::new(driver);
    let summary = game_loop.run(Some(MAX_FRAMES))?;

    let counters = game_loop.counters().snapshot();
    let stats = serde_json::to_string(&game_loop.driver().cache().stats())?;
    tracing::info!(
        frames = summary.frames,
        ticks = summary.ticks,
        quit = summary.quit,
        ?counters,
        "run finished"
    );
    tracing::info!(%stats, cached = game_loop.driver().cache().len(), "resource cache");
    Ok(())
}
