//! APT-backed [`aptprobe_core::DependencyEngine`].
//!
//! Configuration is loaded through `apt-config`, the installed package set
//! comes from the dpkg status database and the upgrade outcome from an
//! `apt-get --simulate` run. Nothing here ever changes installed state.

pub mod engine;
pub mod options;
pub mod simulate;
pub mod status;

pub use engine::AptEngine;
pub use options::{parse_config_dump, AptOptions, DEFAULT_STATUS_PATH};
pub use simulate::{parse_simulation, SimAction, Simulation};
pub use status::{parse_status, StatusEntry, StatusError};
