// # starwatch-core
//
// Core library for the starwatch notification daemon.
//
// ## Architecture Overview
//
// This library provides the detection/dispatch core for watching one user's
// starred repositories and fanning new-star events out to messaging
// destinations:
// - **SnapshotSource**: Trait yielding the current full set of starred repos
// - **Connector**: Trait for delivering a message to one destination platform
// - **StateStore**: Trait for the persisted watermark of already-seen repos
// - **detector**: Set-difference change detection between watermark and snapshot
// - **Dispatcher**: Per-item fan-out across the active connector set
// - **StarwatchEngine**: The detect → dispatch → persist daemon loop
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from platform crates
// 2. **Library-First**: All core functionality can be used without the daemon
// 3. **Failure Isolation**: One destination's failure never affects another,
//    nor the watermark advancement
// 4. **Baseline, not backfill**: The first run seeds tracking without posting

pub mod config;
pub mod detector;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod state;
pub mod template;
pub mod traits;

// Re-export core types for convenience
pub use config::{ConnectorConfig, EngineConfig, GithubConfig, StarwatchConfig, StateStoreConfig};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use engine::{EngineEvent, StarwatchEngine};
pub use error::{Error, Result};
pub use state::{FileStateStore, MemoryStateStore};
pub use template::MessageTemplate;
pub use traits::{Connector, Envelope, PostOutcome, Repo, SnapshotSource, StateStore, Watermark};
