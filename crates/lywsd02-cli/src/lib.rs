//! Command-line interface for the Xiaomi LYWSD02 clock/hygrometer.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `read` | Read the current temperature and humidity |
//! | `history` | Download min/max history records |
//! | `units` | Show or set the display units |
//! | `clock` | Show the device clock or sync it to the host |
//! | `battery` | Show the battery percentage |
//! | `status` | Battery, units, clock and record counts over one connection |
//!
//! # Configuration
//!
//! Defaults are read from `config.toml` in the platform config directory
//! (`~/.config/lywsd02/config.toml` on Linux):
//!
//! ```toml
//! device = "E7:2E:00:B1:38:96"
//! timeout_secs = 20
//! min_interval_secs = 10
//! tz_offset = 2
//! format = "json"
//! ```
//!
//! Command-line flags win over the file. `LYWSD02_DEVICE` supplies the device
//! address when `--device` is not given.
//!
//! # Examples
//!
//! ```bash
//! lywsd02 --device E7:2E:00:B1:38:96 read
//! lywsd02 history --from 100 --format json
//! lywsd02 units set F
//! lywsd02 clock sync --tz-offset 1
//! ```

pub mod cli;
pub mod config;
pub mod format;

pub use lywsd02_core;
pub use lywsd02_types;
