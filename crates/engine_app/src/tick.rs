//! Coordinator tick loop.
//!
//! One frame of the fixed-timestep lifecycle:
//!
//! 1. Run the `Update` stage once.
//! 2. Run the fixed stages as many times as the accumulated time allows,
//!    advancing the network fixed tick before each step and closing the
//!    world tick after it.
//! 3. Run `PreRender` and `PostRender`.
//!
//! The world tick follows the fixed tick, so a frame without a fixed step
//! leaves query deltas and deferred removals for the next step.

use std::time::{Duration, Instant};

use engine_component::World;
use engine_net::{NetworkWorld, Transport, UserId};
use engine_system::{Pipeline, SystemContext, SystemModule, SystemUpdateType};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::systems;

/// Fixed steps one frame may run before the backlog is dropped.
pub const MAX_FIXED_STEPS_PER_FRAME: u32 = 8;

/// One engine instance: its systems, their context and the frame clock.
#[derive(Debug)]
pub struct TickLoop {
    /// Frames run so far.
    tick_id: u64,
    pipeline: Pipeline,
    ctx: SystemContext,
    /// Simulated time not yet consumed by fixed steps.
    accumulator: f64,
}

impl TickLoop {
    /// Create a tick loop over an initialized pipeline.
    #[must_use]
    pub fn new(pipeline: Pipeline, mut ctx: SystemContext, tick_rate: f64) -> Self {
        ctx.fixed_delta_seconds = 1.0 / tick_rate;
        Self {
            tick_id: 0,
            pipeline,
            ctx,
            accumulator: 0.0,
        }
    }

    /// Builds an engine for `user_id` with the built-in network systems
    /// followed by `scene`, talking over `transport`.
    pub async fn start(
        config: &EngineConfig,
        user_id: UserId,
        is_hosting: bool,
        transport: Box<dyn Transport>,
        scene: Vec<SystemModule>,
    ) -> Self {
        let mut network = NetworkWorld::new(user_id, is_hosting, config.network.clone());
        network.set_transport(transport);
        let mut ctx = SystemContext::new(World::new(), network);
        ctx.fixed_delta_seconds = config.fixed_delta_seconds();

        let mut pipeline = Pipeline::new(config.pipeline.clone());
        let mut modules = systems::network_systems();
        modules.extend(scene);
        pipeline.init_systems(&mut ctx, modules).await;

        Self::new(pipeline, ctx, config.tick_rate)
    }

    /// Returns the number of frames run.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn ctx(&self) -> &SystemContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut SystemContext {
        &mut self.ctx
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Runs one frame covering `dt` seconds. Returns how many fixed steps ran.
    pub fn frame(&mut self, dt: f64) -> u32 {
        self.tick_id += 1;
        self.ctx.delta_seconds = dt;
        self.ctx.elapsed_seconds += dt;

        self.pipeline.execute_stage(SystemUpdateType::Update, &mut self.ctx);

        let fixed_dt = self.ctx.fixed_delta_seconds;
        self.accumulator += dt;
        let mut steps = 0;
        while self.accumulator >= fixed_dt {
            if steps == MAX_FIXED_STEPS_PER_FRAME {
                warn!(
                    tick_id = self.tick_id,
                    skipped_ms = self.accumulator * 1000.0,
                    "fixed step backlog dropped"
                );
                self.accumulator = 0.0;
                break;
            }
            let fixed_tick = self.ctx.network.advance_fixed_tick();
            for stage in SystemUpdateType::FIXED {
                self.pipeline.execute_stage(stage, &mut self.ctx);
            }
            self.ctx.world.end_tick();
            self.accumulator -= fixed_dt;
            steps += 1;
            debug!(tick_id = self.tick_id, fixed_tick, "fixed step");
        }

        self.pipeline.execute_stage(SystemUpdateType::PreRender, &mut self.ctx);
        self.pipeline.execute_stage(SystemUpdateType::PostRender, &mut self.ctx);
        steps
    }
}

/// Runs `loops` side by side at `tick_rate` until `max_ticks` frames have
/// run (0 = until Ctrl-C).
pub async fn run(loops: &mut [TickLoop], tick_rate: f64, max_ticks: u64) {
    let tick_duration = Duration::from_secs_f64(1.0 / tick_rate);
    let mut interval = tokio::time::interval(tick_duration);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut tick_count = 0u64;

    info!(tick_rate, max_ticks, engines = loops.len(), "starting tick loop");

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!(ticks = tick_count, "interrupted");
                break;
            }
        }

        let start = Instant::now();
        for tick_loop in loops.iter_mut() {
            tick_loop.frame(tick_duration.as_secs_f64());
        }

        tick_count += 1;
        if max_ticks > 0 && tick_count >= max_ticks {
            info!(ticks = tick_count, "tick loop complete");
            break;
        }

        let elapsed = start.elapsed();
        if elapsed > tick_duration {
            warn!(
                tick_id = tick_count,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = tick_duration.as_millis() as u64,
                "tick exceeded time budget"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use engine_component::{Component, DenseStorage, QueryDescriptor};
    use engine_net::{ChannelTransport, NetworkConfig};
    use engine_system::{PipelineConfig, SystemConfig};

    use super::*;

    type Log = Arc<Mutex<Vec<SystemUpdateType>>>;

    async fn recording_loop(log: &Log) -> TickLoop {
        let mut ctx = SystemContext::new(
            World::new(),
            NetworkWorld::new(UserId::from("me"), true, NetworkConfig::default()),
        );
        let modules = SystemUpdateType::ALL
            .into_iter()
            .map(|stage| {
                let log = Arc::clone(log);
                SystemModule::from_fn(SystemConfig::new(stage.to_string(), stage), move |_| {
                    Ok(move |_: &mut SystemContext| {
                        log.lock().unwrap().push(stage);
                        Ok(())
                    })
                })
            })
            .collect();
        let mut pipeline = Pipeline::new(PipelineConfig::default());
        pipeline.init_systems(&mut ctx, modules).await;
        TickLoop::new(pipeline, ctx, 64.0)
    }

    #[tokio::test]
    async fn test_tick_advances_counter() {
        let log = Log::default();
        let mut tick_loop = recording_loop(&log).await;
        assert_eq!(tick_loop.tick_id(), 0);
        tick_loop.frame(1.0 / 64.0);
        assert_eq!(tick_loop.tick_id(), 1);
        tick_loop.frame(1.0 / 64.0);
        assert_eq!(tick_loop.tick_id(), 2);
        assert_eq!(tick_loop.ctx().world.tick(), 2);
    }

    #[tokio::test]
    async fn test_stage_order_within_a_frame() {
        let log = Log::default();
        let mut tick_loop = recording_loop(&log).await;
        assert_eq!(tick_loop.frame(1.0 / 64.0), 1);
        assert_eq!(*log.lock().unwrap(), SystemUpdateType::ALL.to_vec());
        assert_eq!(tick_loop.ctx().fixed_tick(), 1);
    }

    #[tokio::test]
    async fn test_fixed_steps_follow_accumulated_time() {
        let log = Log::default();
        let mut tick_loop = recording_loop(&log).await;

        assert_eq!(tick_loop.frame(1.0 / 128.0), 0);
        assert_eq!(tick_loop.ctx().fixed_tick(), 0);
        assert_eq!(tick_loop.frame(3.0 / 128.0), 2);
        assert_eq!(tick_loop.ctx().fixed_tick(), 2);

        let fixed_runs = log
            .lock()
            .unwrap()
            .iter()
            .filter(|&&stage| stage == SystemUpdateType::Fixed)
            .count();
        assert_eq!(fixed_runs, 2);
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Marker;

    impl Component for Marker {
        type Storage = DenseStorage<Self>;

        fn type_name() -> &'static str {
            "Marker"
        }
    }

    #[tokio::test]
    async fn test_enter_survives_frames_without_fixed_steps() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = SystemContext::new(
            World::new(),
            NetworkWorld::new(UserId::from("me"), true, NetworkConfig::default()),
        );
        let spawner = SystemModule::from_fn(SystemConfig::new("spawner", SystemUpdateType::FixedEarly), |_| {
            Ok(|ctx: &mut SystemContext| {
                if ctx.fixed_tick() == 2 {
                    let entity = ctx.world.create_entity();
                    ctx.world.add_component(entity, Marker)?;
                }
                Ok(())
            })
        });
        let watcher = {
            let seen = Arc::clone(&seen);
            SystemModule::from_fn(SystemConfig::new("watcher", SystemUpdateType::Fixed), move |ctx| {
                let marked = ctx.world.define_query(QueryDescriptor::new().with::<Marker>());
                Ok(move |ctx: &mut SystemContext| {
                    seen.lock().unwrap().extend(marked.enter(&mut ctx.world));
                    Ok(())
                })
            })
        };
        let mut pipeline = Pipeline::new(PipelineConfig::default());
        pipeline.init_systems(&mut ctx, vec![spawner, watcher]).await;
        let mut tick_loop = TickLoop::new(pipeline, ctx, 64.0);

        assert_eq!(tick_loop.frame(2.0 / 64.0), 2);
        assert_eq!(tick_loop.frame(0.5 / 64.0), 0);
        for _ in 0..5 {
            tick_loop.frame(1.0 / 64.0);
        }
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(tick_loop.ctx().world.tick(), u64::from(tick_loop.ctx().fixed_tick()));
    }

    #[tokio::test]
    async fn test_world_tick_waits_for_a_fixed_step() {
        let log = Log::default();
        let mut tick_loop = recording_loop(&log).await;
        assert_eq!(tick_loop.frame(0.5 / 64.0), 0);
        assert_eq!(tick_loop.ctx().world.tick(), 0);
        assert_eq!(tick_loop.frame(0.5 / 64.0), 1);
        assert_eq!(tick_loop.ctx().world.tick(), 1);
    }

    #[tokio::test]
    async fn test_backlog_is_capped() {
        let log = Log::default();
        let mut tick_loop = recording_loop(&log).await;
        assert_eq!(tick_loop.frame(1.0), MAX_FIXED_STEPS_PER_FRAME);
        assert_eq!(tick_loop.frame(0.0), 0);
    }

    #[tokio::test]
    async fn test_start_registers_network_and_scene_systems() {
        let (transport, _peer) = ChannelTransport::pair();
        let config = EngineConfig {
            tick_rate: 30.0,
            ..EngineConfig::default()
        };
        let tick_loop = TickLoop::start(
            &config,
            UserId::from("me"),
            true,
            Box::new(transport),
            vec![systems::wander()],
        )
        .await;
        assert_eq!(tick_loop.pipeline().len(), 6);
        assert_eq!(tick_loop.ctx().fixed_delta_seconds, 1.0 / 30.0);
        assert!(tick_loop.ctx().network.is_hosting());
    }

    #[tokio::test]
    async fn test_run_limited_ticks() {
        let log = Log::default();
        let mut loops = vec![recording_loop(&log).await];
        run(&mut loops, 1000.0, 5).await;
        assert_eq!(loops[0].tick_id(), 5);
    }
}
