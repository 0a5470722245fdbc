use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "repline", version, about = "Guided strength workouts in the terminal")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Emit machine-readable JSON instead of colorful text.
    #[arg(global = true, long)]
    pub json: bool,

    /// Database file (overrides the `database` config key).
    #[arg(global = true, long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Config file (defaults to the platform config directory).
    #[arg(global = true, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Workout program management
    #[command(subcommand, visible_alias = "p")]
    Program(ProgramCmd),

    /// Run a workout from start to finish
    #[command(visible_alias = "r")]
    Run {
        /// Program index (from `p list`) or exact name
        program: String,
    },

    /// Pick up a workout that was saved mid-session
    Resume {
        /// Session id (from `history`)
        session: String,
    },

    /// Show recent sessions
    #[command(visible_alias = "h")]
    History {
        /// How many sessions to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Show personal records
    Prs,

    /// View or edit repline config
    #[command(subcommand)]
    Config(ConfigCmd),
}

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Show all config keys
    List,

    /// Get the value of a key
    Get { key: String },

    /// Set or override a key
    Set { key: String, val: String },

    /// Reset a key to its default
    Unset { key: String },
}

#[derive(Subcommand)]
pub enum ProgramCmd {
    /// Import one or more programs
    #[command(visible_alias = "i")]
    Import { files: Vec<String> },

    /// List programs
    #[command(visible_alias = "l")]
    List,

    /// Show a single program in detail
    #[command(visible_alias = "s")]
    Show {
        /// Program index (from `p list`) or exact name
        program: String,
    },

    /// Delete a program
    #[command(visible_alias = "d")]
    Delete {
        /// Program index (from `p list`) or exact name
        program: String,
    },
}
