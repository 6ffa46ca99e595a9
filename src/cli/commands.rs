use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "docvec",
    about = "Document vector store with threshold-filtered semantic search",
    after_help = "Backend and embedder are configured through DOCVEC_* environment variables."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the collection, its index and load it
    Provision {
        /// Drop an existing collection of the same name first
        #[arg(long)]
        drop_old: bool,
    },
    /// Embed and insert documents
    Add {
        /// JSON array of documents: [{"content": "...", "metadata": {...}}]
        json: String,
        /// Do not flush the collection after inserting
        #[arg(long)]
        skip_flush: bool,
    },
    /// Similarity search
    Search {
        query: String,
        /// Number of nearest neighbours to fetch
        #[arg(long, short, default_value = "10")]
        k: usize,
        /// Minimum normalized score (0.0-1.0, inclusive)
        #[arg(long, default_value = "0.0")]
        threshold: f32,
        /// strong, session, bounded or eventually
        #[arg(long)]
        consistency: Option<String>,
        /// Backend filter expression
        #[arg(long)]
        filter: Option<String>,
        /// Search a single partition
        #[arg(long)]
        partition: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_defaults() {
        let cli = Cli::try_parse_from(["docvec", "search", "cities in Japan"]).unwrap();
        match cli.command {
            Commands::Search { query, k, threshold, consistency, .. } => {
                assert_eq!(query, "cities in Japan");
                assert_eq!(k, 10);
                assert_eq!(threshold, 0.0);
                assert!(consistency.is_none());
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_provision_flag() {
        let cli = Cli::try_parse_from(["docvec", "provision", "--drop-old"]).unwrap();
        assert!(matches!(cli.command, Commands::Provision { drop_old: true }));
    }
}
