use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::chunking::ChunkStrategy;

#[derive(Debug, Parser)]
#[command(
    name = "derlem",
    about = "Semantic passage retrieval over a document corpus"
)]
pub struct Cli {
    /// Override the data directory holding index stores
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the index from scratch over a content dump
    Index(IndexArgs),
    /// Add documents that are not yet in the index
    Update(IndexArgs),
    /// Search the index with a single query
    Search(SearchArgs),
    /// Search with several query variants and fuse the results
    Multi(MultiArgs),
    /// Suggest categories semantically close to a query
    Suggest(SuggestArgs),
    /// List categories present in the index with chunk counts
    Categories(CategoriesArgs),
    /// Show the store's config descriptor and location
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, clap::Args)]
pub struct IndexArgs {
    /// Directory containing the scraped .txt dump
    pub content_dir: PathBuf,

    /// Chunking strategy
    #[arg(long, value_enum)]
    pub chunk_strategy: Option<ChunkStrategy>,
}

#[derive(Debug, clap::Args)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value_t = crate::settings::DEFAULT_TOP_K)]
    pub count: usize,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Return multiple chunks per source document
    #[arg(long)]
    pub no_diversify: bool,

    /// Disable MMR diversification
    #[arg(long)]
    pub no_mmr: bool,

    /// Blend relevance-model scores into the ranking
    #[arg(long)]
    pub rerank: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct MultiArgs {
    /// Query variants (at least one)
    #[arg(required = true)]
    pub queries: Vec<String>,

    /// Number of fused results to return
    #[arg(short = 'n', long, default_value_t = crate::settings::DEFAULT_TOP_K)]
    pub count: usize,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Disable MMR diversification
    #[arg(long)]
    pub no_mmr: bool,

    /// Blend relevance-model scores into the ranking
    #[arg(long)]
    pub rerank: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct FilterArgs {
    /// Restrict results to one category
    #[arg(long)]
    pub category: Option<String>,

    /// Earliest document date (inclusive)
    #[arg(long)]
    pub date_from: Option<String>,

    /// Latest document date (inclusive)
    #[arg(long)]
    pub date_to: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct SuggestArgs {
    /// The query to route
    pub query: String,

    /// Number of suggestions
    #[arg(short = 'n', long, default_value_t = 3)]
    pub count: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct CategoriesArgs {
    /// Hide categories with fewer chunks than this
    #[arg(long, default_value_t = crate::settings::DEFAULT_CATEGORY_MIN_CHUNKS)]
    pub min_chunks: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}
