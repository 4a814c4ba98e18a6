//! # engine_system
//!
//! The system pipeline of the networked ECS.
//!
//! Systems are registered per [`SystemUpdateType`] stage. Each one is built
//! by a factory that may do asynchronous setup, then runs once per stage
//! execution against a shared [`SystemContext`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use engine_component::World;
//! use engine_net::{NetworkConfig, NetworkWorld, UserId};
//! use engine_system::{Pipeline, PipelineConfig, SystemConfig, SystemContext, SystemModule, SystemUpdateType};
//!
//! # async fn run() {
//! let mut ctx = SystemContext::new(
//!     World::new(),
//!     NetworkWorld::new(UserId::new_random(), true, NetworkConfig::default()),
//! );
//! let mut pipeline = Pipeline::new(PipelineConfig::default());
//! let spin = SystemModule::from_fn(SystemConfig::new("spin", SystemUpdateType::Fixed), |_| {
//!     Ok(|_ctx: &mut SystemContext| Ok(()))
//! });
//! pipeline.init_systems(&mut ctx, vec![spin]).await;
//! pipeline.execute_stage(SystemUpdateType::Fixed, &mut ctx);
//! # }
//! ```

pub mod config;
pub mod context;
pub mod pipeline;

pub use config::{PipelineConfig, SystemConfig, SystemUpdateType};
pub use context::SystemContext;
pub use pipeline::{Pipeline, SystemFn, SystemModule};
