//! Config CLI subcommands: show, defaults.
//!
//! These read the environment directly; no running server is needed.

use crate::config::{self, EnvConfig};

/// Print the effective configuration as `KEY=value` lines.
pub fn run_show() {
    for line in config::load().effective_config().to_env_lines() {
        println!("{}", line);
    }
}

/// Print documented defaults, ignoring the environment.
pub fn run_defaults() {
    for line in EnvConfig::default().effective_config().to_env_lines() {
        println!("{}", line);
    }
}
