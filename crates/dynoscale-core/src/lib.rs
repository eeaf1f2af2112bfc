//! dynoscale-core — shared types and configuration for dynoscale.
//!
//! Holds the per-target [`ScalingPolicy`], the threshold [`RatioTable`]
//! that maps backlog size to worker count, the per-tick snapshot types
//! observed from the broker and the fleet platform, and the TOML config
//! parser used by the daemon.

pub mod config;
pub mod types;

pub use config::{ConfigError, DynoscaleConfig, parse_duration};
pub use types::*;
