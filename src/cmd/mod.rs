//! CLI command implementations.
//!
//! | Module   | Commands handled      |
//! |----------|-----------------------|
//! | `update` | `Update`              |
//! | `phase`  | `Status`, `Intel`     |
//! | `config` | `Config`              |

pub mod config;
pub mod phase;
pub mod update;

pub use config::cmd_config;
pub use phase::{cmd_intel, cmd_status};
pub use update::cmd_update;
