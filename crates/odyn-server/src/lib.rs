//! Odyn administrative server.
//!
//! The binary mirrors the store's lifecycle: initialize logging, build the
//! configured storage engine, prepare it, connect, run one command, close.
//!
//! ## Usage
//!
//! ```bash
//! odyn-server prep
//! odyn-server --config /etc/odyn/odyn.toml show user/Leela
//! odyn-server check user/doorman device/Leela/Toaster s --at 20150803202208
//! odyn-server check user/Leela device/Leela/Toaster g -p heat --app app/Slurm
//! odyn-server erase --yes
//! ```

pub mod cli;
pub mod commands;

pub use cli::{Args, Command, log_settings};
pub use commands::{Outcome, run};
