//! Ordered execution of systems.
//!
//! The [`Scheduler`] runs every registered system once per [`tick`], in
//! registration order. Order is entirely caller-controlled; there is no
//! priority field. A system that returns an error or panics is logged and
//! recorded as a [`SystemFault`], and the remaining systems still run.
//!
//! After each system returns, pending component changes are dispatched to
//! every system's `on_component_added` / `on_component_removed` reaction.
//! Changes made outside the scheduler (setup code, the host's update
//! callback) are dispatched at the start of the next tick.
//!
//! [`tick`]: Scheduler::tick

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::profile::PerformanceMetrics;
use crate::system::{System, SystemContext, SystemId};
use crate::world::{ChangeKind, World};
use crate::EcsError;

/// Reactions may themselves mutate components; dispatch stops after this many
/// rounds and leaves the rest for the next dispatch point.
const MAX_DISPATCH_ROUNDS: usize = 8;

// ---------------------------------------------------------------------------
// Faults and reports
// ---------------------------------------------------------------------------

/// How a system failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// `update` or a reaction returned `Err`.
    Error(String),
    /// `update` panicked.
    Panic(String),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Error(msg) => write!(f, "error: {msg}"),
            FaultKind::Panic(msg) => write!(f, "panic: {msg}"),
        }
    }
}

/// A contained failure of one system during one tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("system '{system}' faulted ({kind})")]
pub struct SystemFault {
    pub system: String,
    pub kind: FaultKind,
}

/// Timing and faults of the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Wall-clock time per system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Total time for the tick, dispatch included.
    pub total_time: Duration,
    /// Systems that failed this tick.
    pub faults: Vec<SystemFault>,
    /// Component events delivered to reactions this tick.
    pub dispatched: usize,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Registered {
    id: SystemId,
    name: String,
    system: Box<dyn System>,
}

/// The ordered list of systems for one world.
pub struct Scheduler {
    systems: Vec<Registered>,
    next_id: u32,
    metrics: PerformanceMetrics,
    last_report: TickReport,
}

impl Scheduler {
    /// An empty scheduler. Profiling starts disabled.
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            next_id: 0,
            metrics: PerformanceMetrics::new(false),
            last_report: TickReport::default(),
        }
    }

    /// Append `system` to the execution order.
    ///
    /// Its matched set is created in `world` immediately and seeded from the
    /// entities that already exist.
    pub fn register(&mut self, world: &mut World, system: impl System + 'static) -> SystemId {
        self.register_boxed(world, Box::new(system))
    }

    /// [`register`](Self::register) for an already boxed system.
    pub fn register_boxed(&mut self, world: &mut World, system: Box<dyn System>) -> SystemId {
        let id = SystemId::from_raw(self.next_id);
        self.next_id += 1;
        let signature = system.signature();
        world.register_system(id, &signature);
        let name = system.name().to_owned();
        tracing::debug!(
            system = %name,
            id = id.to_raw(),
            required = signature.required().len(),
            matched = world.matched(id).map_or(0, |m| m.len()),
            "registered system"
        );
        self.systems.push(Registered { id, name, system });
        id
    }

    /// Remove a system, returning it.
    pub fn unregister(&mut self, world: &mut World, id: SystemId) -> Result<Box<dyn System>, EcsError> {
        let pos = self
            .systems
            .iter()
            .position(|s| s.id == id)
            .ok_or(EcsError::UnknownSystem { system: id })?;
        let entry = self.systems.remove(pos);
        world.unregister_system(id);
        tracing::debug!(system = %entry.name, "unregistered system");
        Ok(entry.system)
    }

    /// Run every system once, in order.
    pub fn tick(&mut self, world: &mut World, dt: f64) -> &TickReport {
        let tick_start = Instant::now();
        let mut report = TickReport {
            dispatched: self.dispatch_changes(world),
            ..TickReport::default()
        };

        for idx in 0..self.systems.len() {
            let Self {
                systems, metrics, ..
            } = self;
            let entry = &mut systems[idx];
            let (elapsed, fault) = run_update(entry, world, dt, metrics);
            report.system_times.push((entry.name.clone(), elapsed));
            report.faults.extend(fault);
            report.dispatched += self.dispatch_changes(world);
        }

        report.total_time = tick_start.elapsed();
        self.last_report = report;
        &self.last_report
    }

    /// Deliver pending component events to every system's reactions.
    /// Returns the number of events delivered.
    pub fn dispatch_changes(&mut self, world: &mut World) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_DISPATCH_ROUNDS {
            let changes = world.drain_changes();
            if changes.is_empty() {
                return delivered;
            }
            for event in &changes {
                for entry in &mut self.systems {
                    let mut ctx = SystemContext::new(world, entry.id);
                    let result = match event.kind {
                        ChangeKind::Added => entry.system.on_component_added(&mut ctx, event),
                        ChangeKind::Removed => entry.system.on_component_removed(&mut ctx, event),
                    };
                    if let Err(err) = result {
                        tracing::error!(
                            system = %entry.name,
                            entity = %event.entity,
                            component = event.name,
                            error = %err,
                            "component reaction failed"
                        );
                    }
                }
            }
            delivered += changes.len();
        }
        if world.pending_changes() > 0 {
            tracing::warn!(
                pending = world.pending_changes(),
                "component reactions still pending after {MAX_DISPATCH_ROUNDS} rounds"
            );
        }
        delivered
    }

    /// Drop every system and its matched set.
    pub fn clear(&mut self, world: &mut World) {
        for entry in self.systems.drain(..) {
            world.unregister_system(entry.id);
        }
        self.metrics.reset();
        self.last_report = TickReport::default();
    }

    /// System names in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    /// The id of the first system called `name`.
    pub fn find(&self, name: &str) -> Option<SystemId> {
        self.systems.iter().find(|s| s.name == name).map(|s| s.id)
    }

    /// Number of registered systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Whether no systems are registered.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Report of the last tick.
    pub fn last_report(&self) -> &TickReport {
        &self.last_report
    }

    /// Per-system profiling.
    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    /// Mutable profiling handle (enable, disable, reset).
    pub fn metrics_mut(&mut self) -> &mut PerformanceMetrics {
        &mut self.metrics
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("systems", &self.system_names())
            .finish()
    }
}

fn run_update(
    entry: &mut Registered,
    world: &mut World,
    dt: f64,
    metrics: &mut PerformanceMetrics,
) -> (Duration, Option<SystemFault>) {
    let guard = metrics.guard(&entry.name);
    let mut ctx = SystemContext::new(world, entry.id);
    let system = &mut entry.system;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| system.update(&mut ctx, dt)));
    let elapsed = guard.elapsed();
    drop(guard);

    let kind = match outcome {
        Ok(Ok(())) => return (elapsed, None),
        Ok(Err(err)) => FaultKind::Error(format!("{err:#}")),
        Err(payload) => FaultKind::Panic(panic_message(payload.as_ref())),
    };
    tracing::error!(system = %entry.name, fault = %kind, "system update failed");
    (
        elapsed,
        Some(SystemFault {
            system: entry.name.clone(),
            kind,
        }),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
