use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Identify individual animals from photos", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum GroupArgs {
    /// Create a new group
    Create {
        /// Group name
        name: String,

        /// Owning account
        #[clap(short, long)]
        owner: String,
    },
    /// List all groups
    List {},
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP daemon
    Daemon {
        /// Address to listen on (overrides config)
        #[clap(short, long)]
        listen: Option<String>,
    },

    /// Manage groups
    Group {
        #[clap(subcommand)]
        action: GroupArgs,
    },

    /// Add photos of one individual, one slot per photo
    Add {
        /// Group name
        #[clap(short, long)]
        group: String,

        /// Individual's identifier
        #[clap(short, long)]
        identity: String,

        /// Photo files
        #[clap(required = true)]
        photos: Vec<PathBuf>,
    },

    /// Import a directory laid out as <dir>/<identity>/<photo>
    Import {
        /// Group name
        #[clap(short, long)]
        group: String,

        /// Directory to import
        dir: PathBuf,
    },

    /// Find the closest individuals for a photo
    Identify {
        /// Group name
        #[clap(short, long)]
        group: String,

        /// Maximum number of matches (defaults to config)
        #[clap(short = 'n', long)]
        top_n: Option<usize>,

        /// Minimum similarity (defaults to config)
        #[clap(short, long, allow_hyphen_values = true)]
        min_score: Option<f32>,

        /// Photo file
        photo: PathBuf,
    },

    /// List stored entries of a group
    List {
        /// Group name
        #[clap(short, long)]
        group: String,
    },

    /// Remove one stored photo
    Remove {
        /// Group name
        #[clap(short, long)]
        group: String,

        /// Individual's identifier
        #[clap(short, long)]
        identity: String,

        /// Slot to remove
        #[clap(short, long)]
        slot: u64,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// Print the embedding of a photo
    Embed {
        /// Photo file
        photo: PathBuf,
    },
}
