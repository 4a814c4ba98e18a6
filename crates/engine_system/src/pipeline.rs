//! Ordered per-stage system execution.
//!
//! A system is registered as a [`SystemModule`]: its config plus a factory.
//! The factory runs synchronously against the context (to define queries)
//! and returns a future resolving to the per-tick closure. All futures of one
//! [`Pipeline::init_systems`] call are awaited together; a failed factory is
//! logged and left out without affecting its siblings.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tracing::{debug, error, info, warn};

use crate::config::{PipelineConfig, SystemConfig, SystemUpdateType};
use crate::context::SystemContext;

/// The per-tick body of a system.
pub type SystemFn = Box<dyn FnMut(&mut SystemContext) -> anyhow::Result<()> + Send>;

type SystemFactory = Box<dyn FnOnce(&mut SystemContext) -> BoxFuture<'static, anyhow::Result<SystemFn>> + Send>;

/// A system waiting to be initialized.
pub struct SystemModule {
    pub config: SystemConfig,
    factory: SystemFactory,
}

impl std::fmt::Debug for SystemModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemModule").field("config", &self.config).finish_non_exhaustive()
    }
}

impl SystemModule {
    pub fn new<F, Fut>(config: SystemConfig, factory: F) -> Self
    where
        F: FnOnce(&mut SystemContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<SystemFn>> + Send + 'static,
    {
        Self {
            config,
            factory: Box::new(move |ctx| factory(ctx).boxed()),
        }
    }

    /// A module whose factory needs no asynchronous work.
    pub fn from_fn<F, S>(config: SystemConfig, factory: F) -> Self
    where
        F: FnOnce(&mut SystemContext) -> anyhow::Result<S> + Send + 'static,
        S: FnMut(&mut SystemContext) -> anyhow::Result<()> + Send + 'static,
    {
        Self::new(config, move |ctx| {
            let system = factory(ctx).map(|s| Box::new(s) as SystemFn);
            futures::future::ready(system)
        })
    }
}

struct RegisteredSystem {
    config: SystemConfig,
    run: SystemFn,
}

/// Initialized systems grouped by stage.
pub struct Pipeline {
    config: PipelineConfig,
    stages: [Vec<RegisteredSystem>; SystemUpdateType::ALL.len()],
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("systems", &self.len())
            .finish()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            stages: Default::default(),
        }
    }

    /// Number of registered systems across all stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the systems in `stage`, in execution order.
    #[must_use]
    pub fn system_names(&self, stage: SystemUpdateType) -> Vec<&str> {
        self.stages[stage.index()]
            .iter()
            .map(|system| system.config.name.as_str())
            .collect()
    }

    /// Runs every factory, awaits their futures together and appends the
    /// successful systems to their stages in registration order. Returns how
    /// many were added.
    pub async fn init_systems(&mut self, ctx: &mut SystemContext, modules: Vec<SystemModule>) -> usize {
        let (configs, pending): (Vec<_>, Vec<_>) = modules
            .into_iter()
            .map(|module| {
                let future = (module.factory)(ctx);
                (module.config, future)
            })
            .unzip();

        let results = join_all(pending).await;

        let mut added = 0;
        for (config, result) in configs.into_iter().zip(results) {
            match result {
                Ok(run) => {
                    debug!(system = %config.name, stage = %config.stage, "system initialized");
                    self.stages[config.stage.index()].push(RegisteredSystem { config, run });
                    added += 1;
                }
                Err(e) => {
                    error!(system = %config.name, stage = %config.stage, error = %e, "system failed to initialize");
                }
            }
        }
        info!(added, total = self.len(), "systems initialized");
        added
    }

    /// Runs the systems of `stage` in order. A system that errors or panics
    /// is logged and the stage continues with the next one.
    pub fn execute_stage(&mut self, stage: SystemUpdateType, ctx: &mut SystemContext) {
        let threshold = self.config.slow_system_threshold();
        for system in &mut self.stages[stage.index()] {
            let start = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (system.run)(ctx)));
            let elapsed = start.elapsed();

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(system = %system.config.name, %stage, error = %e, "system failed");
                }
                Err(payload) => {
                    error!(system = %system.config.name, %stage, panic = panic_message(payload.as_ref()), "system panicked");
                }
            }

            if elapsed > threshold {
                warn!(
                    system = %system.config.name,
                    %stage,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "long running system"
                );
            }
        }
    }

    /// Removes scene systems, or every system when `scene_only` is false.
    /// Factories are not re-run. Returns how many were removed.
    pub fn unload_systems(&mut self, scene_only: bool) -> usize {
        let before = self.len();
        for systems in &mut self.stages {
            systems.retain(|system| scene_only && !system.config.scene_system);
        }
        let removed = before - self.len();
        info!(removed, scene_only, "systems unloaded");
        removed
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use engine_component::World;
    use engine_net::{NetworkConfig, NetworkWorld, UserId};

    use super::*;

    fn context() -> SystemContext {
        SystemContext::new(
            World::new(),
            NetworkWorld::new(UserId::from("me"), true, NetworkConfig::default()),
        )
    }

    fn recording(name: &'static str, stage: SystemUpdateType, log: &Arc<Mutex<Vec<&'static str>>>) -> SystemModule {
        let log = Arc::clone(log);
        SystemModule::from_fn(SystemConfig::new(name, stage), move |_| {
            Ok(move |_: &mut SystemContext| {
                log.lock().unwrap().push(name);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_failed_factory_is_excluded() {
        let mut ctx = context();
        let mut pipeline = Pipeline::new(PipelineConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let modules = vec![
            recording("a", SystemUpdateType::Fixed, &log),
            SystemModule::new(SystemConfig::new("broken", SystemUpdateType::Fixed), |_| async {
                Err::<SystemFn, _>(anyhow::anyhow!("no assets"))
            }),
            recording("b", SystemUpdateType::Fixed, &log),
        ];
        assert_eq!(pipeline.init_systems(&mut ctx, modules).await, 2);
        assert_eq!(pipeline.system_names(SystemUpdateType::Fixed), vec!["a", "b"]);

        pipeline.execute_stage(SystemUpdateType::Fixed, &mut ctx);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_registration_order_survives_async_completion_order() {
        let mut ctx = context();
        let mut pipeline = Pipeline::new(PipelineConfig::default());
        let slow = SystemModule::new(SystemConfig::new("slow", SystemUpdateType::Update), |_| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Box::new(|_: &mut SystemContext| Ok(())) as SystemFn)
        });
        let fast = SystemModule::new(SystemConfig::new("fast", SystemUpdateType::Update), |_| async {
            Ok(Box::new(|_: &mut SystemContext| Ok(())) as SystemFn)
        });
        pipeline.init_systems(&mut ctx, vec![slow, fast]).await;
        assert_eq!(pipeline.system_names(SystemUpdateType::Update), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_error_and_panic_do_not_stop_the_stage() {
        let mut ctx = context();
        let mut pipeline = Pipeline::new(PipelineConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let modules = vec![
            SystemModule::from_fn(SystemConfig::new("fails", SystemUpdateType::Fixed), |_| {
                Ok(|_: &mut SystemContext| anyhow::bail!("bad tick"))
            }),
            SystemModule::from_fn(SystemConfig::new("panics", SystemUpdateType::Fixed), |_| {
                Ok(|_: &mut SystemContext| -> anyhow::Result<()> { panic!("boom") })
            }),
            recording("after", SystemUpdateType::Fixed, &log),
        ];
        pipeline.init_systems(&mut ctx, modules).await;

        pipeline.execute_stage(SystemUpdateType::Fixed, &mut ctx);
        pipeline.execute_stage(SystemUpdateType::Fixed, &mut ctx);
        assert_eq!(*log.lock().unwrap(), vec!["after", "after"]);
    }

    #[tokio::test]
    async fn test_factory_sees_context_and_system_mutates_it() {
        let mut ctx = context();
        let mut pipeline = Pipeline::new(PipelineConfig::default());
        let module = SystemModule::from_fn(SystemConfig::new("spawner", SystemUpdateType::Fixed), |ctx| {
            let existing = ctx.world.entity_count();
            Ok(move |ctx: &mut SystemContext| {
                assert_eq!(existing, 0);
                ctx.world.create_entity();
                Ok(())
            })
        });
        pipeline.init_systems(&mut ctx, vec![module]).await;
        pipeline.execute_stage(SystemUpdateType::Fixed, &mut ctx);
        pipeline.execute_stage(SystemUpdateType::Update, &mut ctx);
        assert_eq!(ctx.world.entity_count(), 1);
    }

    #[tokio::test]
    async fn test_unload_scene_systems() {
        let mut ctx = context();
        let mut pipeline = Pipeline::new(PipelineConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let scene = {
            let log = Arc::clone(&log);
            SystemModule::from_fn(SystemConfig::new("scene", SystemUpdateType::Fixed).scene(), move |_| {
                Ok(move |_: &mut SystemContext| {
                    log.lock().unwrap().push("scene");
                    Ok(())
                })
            })
        };
        let modules = vec![scene, recording("core", SystemUpdateType::Fixed, &log)];
        pipeline.init_systems(&mut ctx, modules).await;

        assert_eq!(pipeline.unload_systems(true), 1);
        pipeline.execute_stage(SystemUpdateType::Fixed, &mut ctx);
        assert_eq!(*log.lock().unwrap(), vec!["core"]);

        assert_eq!(pipeline.unload_systems(false), 1);
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("oops"));
        assert_eq!(panic_message(payload.as_ref()), "oops");
    }
}
