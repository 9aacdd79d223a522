//! CLI subcommand implementations.

pub mod blocks;
pub mod entries;
pub mod sync;
pub mod util;
