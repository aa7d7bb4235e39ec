// LogSift - platform/mod.rs
//
// Platform abstraction layer: filesystem access, scratch run storage and
// configuration.
// Dependencies: standard library, memmap2, memchr, tempfile, directories,
// toml, and the core model and merge vocabulary.
// Must NOT depend on: app.

pub mod chunking;
pub mod config;
pub mod fs;
pub mod runs;
