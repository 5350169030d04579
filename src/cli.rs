use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pull the product catalog into the vector index
    Sync {
        /// Re-run even if the index already holds products.
        /// Existing products are never overwritten.
        #[clap(short, long, default_value = "false")]
        force: bool,
    },

    /// Show product count and last sync time
    Status,

    /// Create the product index if it does not exist
    SetupIndex {
        /// Only print the FT.CREATE arguments for the configured schema
        #[clap(long, default_value = "false")]
        print: bool,
    },

    /// Find products matching a skin profile
    Similar {
        /// e.g. "dry", "oily"
        #[clap(short, long, default_value = "")]
        skin_type: String,

        /// Comma separated goals
        #[clap(short, long)]
        goals: Option<String>,

        /// Comma separated skin conditions
        #[clap(short, long)]
        conditions: Option<String>,

        /// Number of results (defaults to query.default_limit)
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Print the embedding of a text
    Embed {
        text: Vec<String>,

        /// Treat every argument as an effect, embedded the way products are
        #[clap(long, default_value = "false")]
        effects: bool,
    },
}
