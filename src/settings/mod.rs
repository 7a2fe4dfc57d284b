//! Settings come from a TOML file (`settings/dev.toml` in debug builds,
//! `settings/release.toml` otherwise, or `--settings <path>`), with
//! environment overrides of the form `MARQUEE__AUTH__ACCESS_TTL_SECS`.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
