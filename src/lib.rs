//! Datamine converter and ballistic table generator: library entry point.
//!
//! Stage 1 (`convert-datamine`) turns an extracted game-data tree into Data
//! files; stage 2 (`make-ballistic`) turns Data files into penetration tables.
//! Both stages are incremental through a per-output-directory cache manifest.

pub mod ballistics;
pub mod cache;
pub mod config;
pub mod datamine;
pub mod emit;
pub mod error;
pub mod golden;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod selection;
pub mod store;
pub mod util;
pub mod warning;
