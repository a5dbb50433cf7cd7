use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Data directory (defaults to ~/.noterag)
    #[clap(long)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a note
    Add {
        /// Note title
        title: String,

        /// Note body
        #[clap(default_value = "")]
        content: String,

        /// Comma-separated tags
        #[clap(short = 'g', long)]
        tags: Option<String>,

        /// Category
        #[clap(short, long)]
        category: Option<String>,
    },

    /// Search notes by meaning and keywords
    Search {
        /// Query text
        query: String,

        /// Number of results
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Weight of the semantic ranking [0.0, 1.0]
        #[clap(short = 'w', long)]
        semantic_weight: Option<f32>,

        /// Skip keyword matching, rank by similarity only
        #[clap(long, default_value = "false")]
        semantic_only: bool,

        /// Only notes in this category
        #[clap(short, long)]
        category: Option<String>,
    },

    /// Show one note
    Show {
        /// Note id
        id: String,
    },

    /// List all notes
    List {},

    /// Update a note
    Update {
        /// Note id
        id: String,

        /// New title
        #[clap(short, long)]
        title: Option<String>,

        /// New body
        #[clap(long)]
        content: Option<String>,

        /// Replace tags
        #[clap(long)]
        tags: Option<String>,

        /// Append tags
        #[clap(short = 'a', long)]
        append_tags: Option<String>,

        /// Remove tags
        #[clap(short = 'r', long)]
        remove_tags: Option<String>,

        /// New category
        #[clap(short, long)]
        category: Option<String>,
    },

    /// Delete a note
    Delete {
        /// Note id
        id: String,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// Rebuild the vector index from all notes
    Reindex {
        /// Notes embedded per batch
        #[clap(short, long)]
        batch_size: Option<usize>,
    },

    /// Show note and index counts
    Status {},

    /// List all tags
    Tags {},

    /// List all categories
    Categories {},
}
