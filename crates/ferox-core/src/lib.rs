//! Ferox core: a parallel bacterial-colony simulation engine.
//!
//! Many colonies compete on a shared 2D grid of atomic cells. Each tick, a
//! fixed worker pool runs the age and spread phases over spatial regions
//! (cell claims are CAS-based and lock-free), then the serial phases apply
//! environment, combat, turnover, mutation, division, recombination, spawn
//! and behavior updates in a fixed order. External consumers pull immutable
//! snapshots and submit commands between ticks; transports and renderers
//! live outside this crate.

pub mod colony;
pub mod command;
pub mod fields;
pub mod genome;
pub mod grid;
pub mod pool;
pub mod shape;
pub mod snapshot;
pub mod world;

pub use colony::{Colony, ColonyState, ColonyTable};
pub use command::{Command, CommandError};
pub use genome::{Archetype, Genome};
pub use shape::shape_at;
pub use snapshot::{rle_decode, rle_encode, RleGrid, WorldSnapshot};
pub use world::{TickMetrics, TickTimings, World, WorldConfig, WorldInitError};
