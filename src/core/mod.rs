// LogSift - core/mod.rs
//
// Core business logic layer.
// Dependencies: standard library plus pure-logic crates (chrono, regex, serde).
// Must NOT depend on: platform, app, or perform I/O.

pub mod filter;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod patterns;
pub mod stats;
