//! Sortline Common Library
//!
//! Shared types and definitions for all sortline workspace crates.
//!
//! # Module Structure
//!
//! - [`config`] - Station configuration loading and validation
//! - [`consts`] - Shared constants (timing, pin map, servo angles)
//! - [`events`] - Fire-and-forget station events
//! - [`hal`] - Sensing backend and servo bus contracts
//! - [`inspect`] - Verdict types and the classification contract
//! - [`motion`] - Positions, joint configuration, waypoint table
//! - [`state`] - Shared system state (armed / conveyor / threshold)
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod consts;
pub mod events;
pub mod hal;
pub mod inspect;
pub mod motion;
pub mod prelude;
pub mod state;
