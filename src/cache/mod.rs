//! Kettle cache engine
//!
//! Keeps derived values consistent with committed entity state:
//!
//! - **Definitions**: named cache families with a primary type, an optional
//!   filter, dependency paths and a build function
//! - **Resolution**: each committed change is mapped to the exact keys whose
//!   value depends on it, by walking dependency paths backward
//! - **Rebuild**: affected keys are rebuilt out of band by the consumer
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `kettle.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! store_limit = 10000
//! event_queue_limit = 4096
//! # ... see config.rs for all options
//! ```

mod config;
mod consumer;
mod definition;
mod dispatcher;
mod error;
mod events;
mod facade;
mod keys;
pub(crate) mod lock;
mod planner;
mod registry;
mod store;
mod trigger;
mod worker;

pub use config::CacheConfig;
pub use consumer::CacheConsumer;
pub use definition::{Beverage, BuildError, BuildFn, Filter, Recipe};
pub use dispatcher::{DispatchReport, RebuildDispatcher};
pub use error::KettleError;
pub use events::{ChangeEvent, Epoch, EventQueue};
pub use facade::{Kettle, global, install};
pub use keys::CacheKey;
pub use planner::{ChangeResolver, RebuildPlan};
pub use registry::DefinitionRegistry;
pub use store::{CacheStore, MemoryStore};
pub use trigger::CacheTrigger;
pub use worker::spawn_worker;
