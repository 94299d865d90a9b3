use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sfc-queue")]
#[command(about = "Warm and revalidate static file cache entries from the queue")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Release stale claims, then probe pending entries
    Run {
        /// Entries to claim (0 means 999; defaults to batch_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete completed queue rows
    Cleanup,
    /// Queue a URL for probing
    Enqueue {
        /// Cache URL
        url: String,
        /// Owning page id, flushed by tag when the probe fails
        #[arg(short, long, default_value_t = 0)]
        page_id: i64,
    },
    /// Print queue counts as JSON
    Stats,
    /// Return abandoned in-flight rows to pending
    Release {
        /// Claim age in seconds (defaults to stale_claim_secs)
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_limit() {
        let cli = Cli::try_parse_from(["sfc-queue", "run", "--limit", "25"]).unwrap();
        assert_eq!(cli.command, Command::Run { limit: Some(25) });
    }

    #[test]
    fn test_parse_enqueue_defaults_page_id() {
        let cli = Cli::try_parse_from(["sfc-queue", "enqueue", "https://example.test/a"]).unwrap();
        assert_eq!(cli.command, Command::Enqueue { url: "https://example.test/a".into(), page_id: 0 });
    }

    #[test]
    fn test_parse_release() {
        let cli = Cli::try_parse_from(["sfc-queue", "release", "--older-than-secs", "120"]).unwrap();
        assert_eq!(cli.command, Command::Release { older_than_secs: Some(120) });
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["sfc-queue"]).is_err());
    }
}
