//! Core traits for the starwatch system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`SnapshotSource`]: Fetch the current full set of starred repositories
//! - [`Connector`]: Deliver a message about one repository to one destination
//! - [`StateStore`]: Persist the watermark of already-processed repositories

pub mod connector;
pub mod snapshot_source;
pub mod state_store;

pub use connector::{Connector, Envelope, PostOutcome, truncate_for_platform};
pub use snapshot_source::{Repo, SnapshotSource};
pub use state_store::{StateStore, Watermark};
