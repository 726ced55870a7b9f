//! The embedding surface and frame loop.
//!
//! A [`Host`] owns one run: the world, the scheduler, the input bus, the frame
//! clock and a [`RenderSurface`]. A [`Game`] plugs in through three optional
//! callbacks (initialize once, update and render every frame).
//!
//! Each frame runs, in order: clock tick, input drain, the game's `update`,
//! the scheduler tick, the game's `render`, and presenting the frame's
//! [`DrawList`]. Every frame runs inside a `frame` tracing span.
//!
//! Resources available to games and systems after [`Host::start`]:
//! [`EngineConfig`], [`HostConfig`], [`PhysicsWorld`], [`DrawList`] and
//! [`Keyboard`].

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use playfield_ecs::events::{EventBus, EventSender, Subscription};
use playfield_ecs::scheduler::Scheduler;
use playfield_ecs::world::World;

use crate::clock::{FrameClock, TimeSource};
use crate::config::{EngineConfig, HostConfig};
use crate::input::{KeyEvent, KeyState, Keyboard};
use crate::physics::PhysicsWorld;
use crate::render::{DrawList, RenderSurface};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// Callbacks a game mode provides. All have no-op defaults.
pub trait Game {
    fn name(&self) -> &str {
        "game"
    }

    /// Build entities and register systems. Runs once from [`Host::start`].
    fn initialize(&mut self, _world: &mut World, _scheduler: &mut Scheduler) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs every frame before the systems, with the smoothed delta in
    /// seconds.
    fn update(&mut self, _world: &mut World, _dt: f64) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs every frame after the systems, before the frame is presented.
    fn render(&mut self, _world: &mut World) -> anyhow::Result<()> {
        Ok(())
    }
}

type InitFn = Box<dyn FnMut(&mut World, &mut Scheduler) -> anyhow::Result<()>>;
type UpdateFn = Box<dyn FnMut(&mut World, f64) -> anyhow::Result<()>>;
type RenderFn = Box<dyn FnMut(&mut World) -> anyhow::Result<()>>;

/// A [`Game`] assembled from closures.
#[derive(Default)]
pub struct Callbacks {
    initialize: Option<InitFn>,
    update: Option<UpdateFn>,
    render: Option<RenderFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_initialize(
        mut self,
        f: impl FnMut(&mut World, &mut Scheduler) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.initialize = Some(Box::new(f));
        self
    }

    pub fn on_update(mut self, f: impl FnMut(&mut World, f64) -> anyhow::Result<()> + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    pub fn on_render(mut self, f: impl FnMut(&mut World) -> anyhow::Result<()> + 'static) -> Self {
        self.render = Some(Box::new(f));
        self
    }
}

impl Game for Callbacks {
    fn name(&self) -> &str {
        "callbacks"
    }

    fn initialize(&mut self, world: &mut World, scheduler: &mut Scheduler) -> anyhow::Result<()> {
        self.initialize.as_mut().map_or(Ok(()), |f| f(world, scheduler))
    }

    fn update(&mut self, world: &mut World, dt: f64) -> anyhow::Result<()> {
        self.update.as_mut().map_or(Ok(()), |f| f(world, dt))
    }

    fn render(&mut self, world: &mut World) -> anyhow::Result<()> {
        self.render.as_mut().map_or(Ok(()), |f| f(world))
    }
}

// ---------------------------------------------------------------------------
// LoopHandle
// ---------------------------------------------------------------------------

/// Stops a running host. Clones control the same loop; cancelling twice is
/// harmless.
#[derive(Debug, Clone, Default)]
pub struct LoopHandle {
    running: Rc<Cell<bool>>,
}

impl LoopHandle {
    /// Stop the loop. No frame runs after this returns.
    pub fn cancel(&self) {
        if self.running.replace(false) {
            tracing::debug!("frame loop cancelled");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    fn set_running(&self) {
        self.running.set(true);
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// One simulation run.
pub struct Host {
    config: EngineConfig,
    world: World,
    scheduler: Scheduler,
    bus: EventBus<KeyEvent>,
    keyboard: Keyboard,
    input_tokens: Vec<Subscription<KeyState>>,
    clock: FrameClock,
    surface: Box<dyn RenderSurface>,
    game: Option<Box<dyn Game>>,
    handle: LoopHandle,
    paced: bool,
    present_failures: u64,
}

impl Host {
    /// A host on wall-clock time.
    pub fn new(config: EngineConfig, surface: Box<dyn RenderSurface>) -> Self {
        let clock = FrameClock::new(&config.clock);
        Self::with_clock(config, surface, clock)
    }

    /// A host reading time from `time`; frames are not paced.
    pub fn with_time_source(
        config: EngineConfig,
        surface: Box<dyn RenderSurface>,
        time: Box<dyn TimeSource>,
    ) -> Self {
        let clock = FrameClock::with_time_source(&config.clock, time);
        let mut host = Self::with_clock(config, surface, clock);
        host.paced = false;
        host
    }

    fn with_clock(config: EngineConfig, surface: Box<dyn RenderSurface>, clock: FrameClock) -> Self {
        Self {
            config,
            world: World::new(),
            scheduler: Scheduler::new(),
            bus: EventBus::new(),
            keyboard: Keyboard::new(),
            input_tokens: Vec::new(),
            clock,
            surface,
            game: None,
            handle: LoopHandle::default(),
            paced: true,
            present_failures: 0,
        }
    }

    /// Sleep out the rest of each frame in [`run`](Self::run).
    pub fn set_paced(&mut self, paced: bool) {
        self.paced = paced;
    }

    /// Bring up the surface and solver, attach input and initialize `game`.
    ///
    /// Any failure leaves the host stopped.
    pub fn start(&mut self, game: Box<dyn Game>) -> Result<LoopHandle, EngineError> {
        if self.handle.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        self.config.validate()?;

        let HostConfig {
            width,
            height,
            background,
        } = self.config.host.clone();
        if let Err(err) = self.surface.init(width, height, background) {
            tracing::error!(error = %err, "rendering surface failed to start");
            return Err(EngineError::SurfaceInit(err));
        }
        let physics = match PhysicsWorld::new(&self.config.physics) {
            Ok(physics) => physics,
            Err(err) => {
                tracing::error!(error = %err, "physics solver failed to start");
                self.surface.shutdown();
                return Err(err);
            }
        };

        self.world.insert_resource(self.config.clone());
        self.world.insert_resource(self.config.host.clone());
        self.world.insert_resource(physics);
        self.world.insert_resource(DrawList::new());
        self.world.insert_resource(self.keyboard.clone());
        self.input_tokens = self.keyboard.attach(&mut self.bus);
        if self.config.profiling {
            self.scheduler.metrics_mut().enable();
        } else {
            self.scheduler.metrics_mut().disable();
        }

        let mut game = game;
        if let Err(err) = game.initialize(&mut self.world, &mut self.scheduler) {
            tracing::error!(game = game.name(), error = %format!("{err:#}"), "game failed to initialize");
            self.teardown();
            return Err(EngineError::GameInit(format!("{err:#}")));
        }
        tracing::info!(
            game = game.name(),
            width,
            height,
            systems = self.scheduler.len(),
            entities = self.world.entity_count(),
            "host started"
        );
        self.game = Some(game);
        self.clock.reset();
        self.handle.set_running();
        Ok(self.handle.clone())
    }

    /// Run one frame.
    pub fn frame(&mut self) -> Result<(), EngineError> {
        if !self.handle.is_running() {
            return Err(EngineError::NotRunning);
        }
        self.clock.tick();
        let frame = self.clock.frame_count();
        let _span = tracing::debug_span!("frame", frame).entered();
        let dt = self.clock.smoothed_delta();
        if self.clock.is_running_slowly() {
            tracing::debug!(
                smoothed_ms = dt * 1000.0,
                ratio = self.clock.performance_ratio(),
                "running slowly"
            );
        }

        self.bus.process_events();

        if let Some(game) = self.game.as_mut() {
            if let Err(err) = game.update(&mut self.world, dt) {
                tracing::error!(game = game.name(), error = %format!("{err:#}"), "update callback failed");
            }
        }

        self.scheduler.tick(&mut self.world, dt);

        if let Some(game) = self.game.as_mut() {
            if let Err(err) = game.render(&mut self.world) {
                tracing::error!(game = game.name(), error = %format!("{err:#}"), "render callback failed");
            }
        }

        if let Some(list) = self.world.resource_mut::<DrawList>() {
            if let Err(err) = self.surface.present(list) {
                self.present_failures += 1;
                tracing::warn!(error = %err, "frame not presented");
            }
            list.clear();
        }

        let dropped = self.keyboard.discard_presses();
        if dropped > 0 {
            tracing::trace!(dropped, "unread key presses dropped");
        }
        Ok(())
    }

    /// Run frames until cancelled or, if given, `max_frames` have run.
    /// Returns the number of frames run.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<u64, EngineError> {
        if !self.handle.is_running() {
            return Err(EngineError::NotRunning);
        }
        let mut frames = 0;
        while self.handle.is_running() && max_frames.map_or(true, |max| frames < max) {
            let started = self.clock.now_ms();
            self.frame()?;
            frames += 1;
            if self.paced {
                let budget = self.clock.target_frame_time() * 1000.0;
                let spent = self.clock.now_ms() - started;
                if spent < budget {
                    std::thread::sleep(Duration::from_secs_f64((budget - spent) / 1000.0));
                }
            }
        }
        Ok(frames)
    }

    /// Stop the loop, detach input, clear every manager and release the
    /// surface. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let was_running = self.handle.is_running();
        self.handle.cancel();
        if self.game.is_none() && !was_running {
            return;
        }
        self.teardown();
        tracing::info!("host shut down");
    }

    fn teardown(&mut self) {
        Keyboard::detach(&mut self.bus, std::mem::take(&mut self.input_tokens));
        self.keyboard.clear();
        self.bus.clear();
        self.scheduler.clear(&mut self.world);
        self.world.clear();
        self.world.resources_mut().clear();
        self.game = None;
        self.surface.shutdown();
    }

    /// Queue a key press for the next frame.
    pub fn key_down(&self, key: &str, code: &str) {
        self.bus.emit(KeyEvent::pressed(key, code));
    }

    /// Queue an auto-repeat for a key that is already down. It keeps the
    /// key held but is not a new press.
    pub fn key_repeat(&self, key: &str, code: &str) {
        self.bus.emit(KeyEvent::held(key, code));
    }

    /// Queue a key release for the next frame.
    pub fn key_up(&self, key: &str, code: &str) {
        self.bus.emit(KeyEvent::released(key, code));
    }

    /// A sender for host input adapters.
    pub fn input(&self) -> EventSender<KeyEvent> {
        self.bus.sender()
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn events(&self) -> &EventBus<KeyEvent> {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Frames whose presentation failed.
    pub fn present_failures(&self) -> u64 {
        self.present_failures
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTime;
    use crate::render::HeadlessSurface;
    use std::cell::RefCell;

    fn host(surface: &HeadlessSurface) -> (Host, ManualTime) {
        let time = ManualTime::new();
        let host = Host::with_time_source(
            EngineConfig::default(),
            Box::new(surface.clone()),
            Box::new(time.clone()),
        );
        (host, time)
    }

    #[test]
    fn callbacks_run_in_frame_order() {
        let surface = HeadlessSurface::new();
        let (mut host, time) = host(&surface);
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b, c) = (log.clone(), log.clone(), log.clone());
        let game = Callbacks::new()
            .on_initialize(move |_, _| {
                a.borrow_mut().push("init");
                Ok(())
            })
            .on_update(move |_, dt| {
                assert!(dt > 0.0);
                b.borrow_mut().push("update");
                Ok(())
            })
            .on_render(move |_| {
                c.borrow_mut().push("render");
                Ok(())
            });
        host.start(Box::new(game)).unwrap();
        time.advance(16.0);
        host.frame().unwrap();
        assert_eq!(*log.borrow(), vec!["init", "update", "render"]);
        assert_eq!(surface.presented(), 1);
        assert_eq!(surface.background(), Some(EngineConfig::default().host.background));
    }

    #[test]
    fn cancel_is_idempotent_and_stops_frames() {
        let surface = HeadlessSurface::new();
        let (mut host, _) = host(&surface);
        let handle = host.start(Box::new(Callbacks::new())).unwrap();
        assert_eq!(host.run(Some(3)).unwrap(), 3);
        handle.cancel();
        handle.cancel();
        assert!(matches!(host.frame(), Err(EngineError::NotRunning)));
        assert_eq!(surface.presented(), 3);
    }

    #[test]
    fn surface_failure_prevents_start() {
        let surface = HeadlessSurface::failing("no context");
        let (mut host, _) = host(&surface);
        assert!(matches!(
            host.start(Box::new(Callbacks::new())),
            Err(EngineError::SurfaceInit(_))
        ));
        assert!(!host.is_running());
    }

    #[test]
    fn double_start_is_rejected() {
        let surface = HeadlessSurface::new();
        let (mut host, _) = host(&surface);
        host.start(Box::new(Callbacks::new())).unwrap();
        assert!(matches!(
            host.start(Box::new(Callbacks::new())),
            Err(EngineError::AlreadyRunning)
        ));
    }

    #[test]
    fn failing_initialize_tears_down() {
        let surface = HeadlessSurface::new();
        let (mut host, _) = host(&surface);
        let game = Callbacks::new().on_initialize(|world, _| {
            world.spawn();
            anyhow::bail!("missing level")
        });
        assert!(matches!(host.start(Box::new(game)), Err(EngineError::GameInit(_))));
        assert_eq!(host.world().entity_count(), 0);
        assert!(surface.is_shut_down());
    }

    #[test]
    fn shutdown_clears_everything() {
        let surface = HeadlessSurface::new();
        let (mut host, _) = host(&surface);
        host.start(Box::new(Callbacks::new().on_initialize(|world, _| {
            world.spawn_named("player");
            Ok(())
        })))
        .unwrap();
        host.key_down("a", "KeyA");
        host.frame().unwrap();
        assert!(host.keyboard().is_down("a"));

        host.shutdown();
        host.shutdown();
        assert_eq!(host.world().entity_count(), 0);
        assert!(!host.world().has_resource::<PhysicsWorld>());
        assert!(!host.events().has_listeners(KeyState::Pressed));
        assert!(!host.keyboard().is_down("a"));
        assert!(surface.is_shut_down());

        // A fresh run starts from empty.
        host.start(Box::new(Callbacks::new())).unwrap();
        assert_eq!(host.world().entity_count(), 0);
    }

    #[test]
    fn unread_presses_do_not_outlive_their_frame() {
        let surface = HeadlessSurface::new();
        let (mut host, time) = host(&surface);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        host.start(Box::new(Callbacks::new().on_update(move |world, _| {
            if let Some(kb) = world.resource::<Keyboard>() {
                sink.borrow_mut().push(kb.pending_presses());
            }
            Ok(())
        })))
        .unwrap();

        for _ in 0..50 {
            host.key_down("x", "KeyX");
            host.key_down("y", "KeyY");
            time.advance(1000.0 / 60.0);
            host.frame().unwrap();
            assert_eq!(host.keyboard().pending_presses(), 0);
        }
        assert!(seen.borrow().iter().all(|&n| n == 2));
        assert!(host.keyboard().is_down("x"));

        host.key_repeat("x", "KeyX");
        host.frame().unwrap();
        assert_eq!(seen.borrow().last(), Some(&0));
        assert!(host.keyboard().is_down("x"));
    }

    #[test]
    fn failing_callbacks_do_not_stop_the_loop() {
        let surface = HeadlessSurface::new();
        let (mut host, _) = host(&surface);
        host.start(Box::new(
            Callbacks::new().on_update(|_, _| anyhow::bail!("flaky")),
        ))
        .unwrap();
        host.run(Some(2)).unwrap();
        assert_eq!(surface.presented(), 2);
    }
}
