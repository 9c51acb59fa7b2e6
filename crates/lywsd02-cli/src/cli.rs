//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    /// Parse a format name as written in the config file.
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name.trim(), true).ok()
    }
}

#[derive(Debug, Parser)]
#[command(name = "lywsd02")]
#[command(author, version, about = "CLI for the Xiaomi LYWSD02 clock/hygrometer", long_about = None)]
pub struct Cli {
    /// Device address, or use LYWSD02_DEVICE env var
    #[arg(short, long, env = "LYWSD02_DEVICE", global = true)]
    pub device: Option<String>,

    /// Connection timeout in seconds
    #[arg(short = 'T', long, global = true)]
    pub timeout: Option<u64>,

    /// Seconds to wait for each notification from the device
    #[arg(long, global = true)]
    pub notification_timeout: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read the current temperature and humidity
    Read,

    /// Download history records
    History {
        /// Start the download at this record index
        #[arg(long)]
        from: Option<u32>,
    },

    /// Show or set the display units
    Units {
        #[command(subcommand)]
        action: Option<UnitsAction>,
    },

    /// Show the device clock, or sync it to the host
    Clock {
        #[command(subcommand)]
        action: Option<ClockAction>,
    },

    /// Show the battery percentage
    Battery,

    /// Show battery, units, clock and record counts
    Status,
}

#[derive(Debug, Subcommand)]
pub enum UnitsAction {
    /// Set the display units
    Set {
        /// C or F
        unit: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ClockAction {
    /// Write the host's current time to the device
    Sync {
        /// Timezone offset in hours (defaults to the host's)
        #[arg(long, allow_hyphen_values = true)]
        tz_offset: Option<i8>,
    },
}
