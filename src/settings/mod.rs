//! Settings are loaded from a TOML file chosen by `--settings` and
//! overridden from the environment. See `bin/settings_demo.rs`.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
