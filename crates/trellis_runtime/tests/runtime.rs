//! End-to-end behaviour of the driver, loop and resource cache together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use trellis_asset::{
    ExtensionImporter, FnLoader, HandleState, LoadError, Persistence, ResourceHandle, ResourceKey, ResourceMap,
    ScanOptions,
};
use trellis_core::ecs::{
    Controller, Enter, Entity, Processor, ProcessorError, Retire, UpdateContext, World, WorldEvent, WorldId,
};
use trellis_runtime::{Driver, Loop, RuntimeConfig};

type Log = Arc<Mutex<Vec<&'static str>>>;

struct Named {
    name: &'static str,
    log: Log,
}

impl Processor for Named {
    fn name(&self) -> &str {
        self.name
    }

    fn update(&mut self, _world: &mut World, _dt: f32) -> Result<(), ProcessorError> {
        self.log.lock().unwrap().push(self.name);
        Ok(())
    }
}

#[test]
fn processors_run_by_priority_then_registration() {
    let mut driver = Driver::default();
    let id = driver.create_world("main");
    let log = Log::default();
    {
        let world = driver.world_mut(id).unwrap();
        for (name, priority) in [("p1", 5), ("p2", 1), ("p3", 5)] {
            world.add_processor(
                Named {
                    name,
                    log: Arc::clone(&log),
                },
                priority,
            );
        }
    }
    driver.activate(id).unwrap();
    driver.tick(0.1).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["p2", "p1", "p3"]);
}

#[derive(Default)]
struct Counter {
    attached: u32,
    updates: u32,
}

impl Controller for Counter {
    fn on_attach(&mut self, _entity: Entity, _world: WorldId) {
        self.attached += 1;
    }

    fn on_update(&mut self, _entity: Entity, _dt: f32, _ctx: &mut UpdateContext<'_>) {
        self.updates += 1;
    }
}

#[test]
fn controllers_attach_once_and_update_every_tick() {
    let mut driver = Driver::default();
    let id = driver.create_world("main");
    let entity = {
        let world = driver.world_mut(id).unwrap();
        let entity = world.create_entity().unwrap();
        world.add_controller(entity, Counter::default()).unwrap();
        entity
    };
    driver.activate(id).unwrap();
    for _ in 0..3 {
        driver.tick(0.1).unwrap();
    }

    let counter = driver.world(id).unwrap().get_component::<Counter>(entity).unwrap();
    assert_eq!(counter.attached, 1);
    assert_eq!(counter.updates, 3);
}

struct Prop(ResourceHandle<String>);

fn echo_loader() -> Arc<FnLoader<String, impl Fn(&str) -> Result<String, LoadError> + Send + Sync + 'static>> {
    Arc::new(FnLoader::new("echo", |path: &str| Ok(path.to_string())))
}

#[test]
fn discarding_a_world_keeps_only_persistent_resources() {
    let mut driver = Driver::default();
    let title = driver.create_world("title");
    let level = driver.create_world("level");
    let cache = driver.cache().clone();
    let loader = echo_loader();

    {
        let world = driver.world_mut(title).unwrap();
        for (path, persistence) in [
            ("music/theme", Persistence::Persistent),
            ("splash/logo", Persistence::Scene),
            ("splash/flash", Persistence::Ephemeral),
        ] {
            let entity = world.create_entity().unwrap();
            let handle = cache.make_handle(path, Arc::clone(&loader), persistence);
            handle.resolve().unwrap();
            world.add_component(entity, Prop(handle)).unwrap();
        }
    }
    assert_eq!(cache.len(), 3);

    driver.activate(title).unwrap();
    driver.switch(level, Retire::Discard).unwrap();

    assert_eq!(cache.keys(), vec![ResourceKey::new("music/theme", "echo")]);
    assert_eq!(cache.hold_count(&ResourceKey::new("music/theme", "echo")), Some(0));
}

#[test]
fn keeping_a_world_keeps_its_resources() {
    let mut driver = Driver::default();
    let title = driver.create_world("title");
    let level = driver.create_world("level");
    let cache = driver.cache().clone();

    {
        let world = driver.world_mut(title).unwrap();
        let entity = world.create_entity().unwrap();
        let handle = cache.make_handle("splash/logo", echo_loader(), Persistence::Scene);
        handle.resolve().unwrap();
        world.add_component(entity, Prop(handle)).unwrap();
    }

    driver.activate(title).unwrap();
    driver.switch(level, Retire::Keep).unwrap();

    assert!(driver.world(title).is_some());
    assert_eq!(cache.hold_count(&ResourceKey::new("splash/logo", "echo")), Some(1));
}

#[test]
fn failed_loads_can_be_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let loader = Arc::new(FnLoader::new("flaky", move |path: &str| -> Result<String, LoadError> {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(format!("{path} is not ready").into())
        } else {
            Ok(path.to_uppercase())
        }
    }));

    let driver = Driver::default();
    let handle = driver.cache().make_handle("intro", loader, Persistence::Scene);

    let error = handle.resolve().unwrap_err();
    assert!(error.is_retryable());
    assert_eq!(handle.state(), HandleState::Failed);
    assert!(!driver.cache().contains(handle.key()));

    assert_eq!(*handle.resolve().unwrap(), "INTRO");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(driver.cache().stats().failures, 1);
}

#[test]
fn inactive_worlds_buffer_events_until_activated() {
    let mut driver = Driver::default();
    let id = driver.create_world("lobby");
    let seen = Arc::new(AtomicUsize::new(0));
    {
        let counter = Arc::clone(&seen);
        let world = driver.world_mut(id).unwrap();
        world.subscribe(move |event: &WorldEvent| {
            if matches!(event, WorldEvent::EntityCreated(_)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        world.create_entity().unwrap();
        world.create_entity().unwrap();
    }
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    driver.activate(id).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    driver.world_mut(id).unwrap().create_entity().unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

/// Requests a switch on its first tick.
struct SwitchTo(Option<WorldId>);

impl Processor for SwitchTo {
    fn update(&mut self, world: &mut World, _dt: f32) -> Result<(), ProcessorError> {
        if let Some(target) = self.0.take() {
            world.request_switch(target, Retire::Discard);
        }
        Ok(())
    }
}

/// Requests quit once it has seen `remaining` ticks.
struct QuitAfter {
    remaining: u32,
}

impl Processor for QuitAfter {
    fn update(&mut self, world: &mut World, _dt: f32) -> Result<(), ProcessorError> {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            world.request_quit();
        }
        Ok(())
    }
}

#[test]
fn loop_follows_switch_and_quit_requests() {
    let config = RuntimeConfig {
        tick_rate_hz: 10,
        ..RuntimeConfig::default()
    };
    let mut driver = Driver::new(config);
    let title = driver.create_world("title");
    let level = driver.create_world("level");
    driver.world_mut(title).unwrap().add_processor(SwitchTo(Some(level)), 1);
    driver.world_mut(level).unwrap().add_processor(QuitAfter { remaining: 3 }, 1);
    driver.activate(title).unwrap();

    let mut game_loop = Loop::new(driver);
    let summary = game_loop.run_for(100, Duration::from_millis(100)).unwrap();

    // One tick on the title, three on the level.
    assert!(summary.quit);
    assert_eq!(summary.ticks, 4);
    assert_eq!(summary.frames, 4);

    let driver = game_loop.into_driver();
    assert_eq!(driver.active_id(), Some(level));
    assert!(driver.world(title).is_none());
    assert_eq!(driver.switches(), 2);
}

#[test]
fn scanned_map_resolves_through_the_driver_cache() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("text/intro")).unwrap();
    std::fs::write(dir.path().join("text/intro/hello.txt"), "hello").unwrap();
    std::fs::write(dir.path().join("text/readme.md"), "ignored").unwrap();

    let loader = Arc::new(FnLoader::new("file", |path: &str| -> Result<String, LoadError> {
        Ok(std::fs::read_to_string(path)?)
    }));
    let importer = ExtensionImporter::new(&["txt"], loader, Persistence::Scene);

    let mut map = ResourceMap::new();
    let options = ScanOptions {
        strip_extensions: true,
        ..ScanOptions::default()
    };
    let added = map.scan(dir.path(), &[&importer], options).unwrap();
    assert_eq!(added, 1);

    let driver = Driver::default();
    let handle = map.handle::<String>(driver.cache(), "text/intro/hello").unwrap();
    assert_eq!(*handle.resolve().unwrap(), "hello");
    assert_eq!(driver.cache().len(), 1);
}

/// Restarts its own world once, then quits.
struct RestartOnce {
    builds: Arc<AtomicUsize>,
}

impl Processor for RestartOnce {
    fn update(&mut self, world: &mut World, _dt: f32) -> Result<(), ProcessorError> {
        if self.builds.load(Ordering::SeqCst) == 1 {
            world.request_switch_with(world.id(), Retire::Keep, Enter::Restart);
        } else {
            world.request_quit();
        }
        Ok(())
    }
}

#[test]
fn worlds_can_restart_themselves_through_the_loop() {
    let builds = Arc::new(AtomicUsize::new(0));
    let mut driver = Driver::new(RuntimeConfig {
        tick_rate_hz: 10,
        ..RuntimeConfig::default()
    });
    let counter = Arc::clone(&builds);
    let level = driver
        .register_world("level", move |world: &mut World, cache: &trellis_asset::ResourceCache| {
            counter.fetch_add(1, Ordering::SeqCst);
            let entity = world.create_entity()?;
            let handle = cache.make_handle("level/name", echo_loader(), Persistence::Scene);
            world.add_component(entity, Prop(handle))?;
            world.add_processor(
                RestartOnce {
                    builds: Arc::clone(&counter),
                },
                1,
            );
            Ok(())
        })
        .unwrap();
    driver.activate(level).unwrap();

    let mut game_loop = Loop::new(driver);
    let summary = game_loop.run_for(10, Duration::from_millis(100)).unwrap();

    assert!(summary.quit);
    assert_eq!(summary.ticks, 2);
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    let driver = game_loop.into_driver();
    assert_eq!(driver.active_id(), Some(level));
    assert_eq!(driver.world(level).unwrap().entity_count(), 1);
    assert_eq!(driver.switches(), 2);
}
