use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "steward")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge this node to its compiled catalog", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (default: steward.toml in the config directory)
    #[arg(long, global = true, env = "STEWARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch this node's catalog and apply it
    Run(RunArgs),

    /// Apply a catalog document from a local file
    Apply(ApplyArgs),

    /// Allow agent runs again
    Enable,

    /// Prevent agent runs until enabled
    Disable,

    /// Show lock, cache and last-run state
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by every command that applies a catalog
#[derive(Args, Debug, Clone, Default)]
pub struct ApplyFlags {
    /// Report what would change without changing anything
    #[arg(short = 'n', long)]
    pub noop: bool,

    /// Only apply resources carrying one of these tags
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Vec<String>,
}

impl ApplyFlags {
    pub fn to_options(&self) -> declarative::ApplyOptions {
        declarative::ApplyOptions {
            noop: self.noop,
            tags: self.tags.clone(),
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub flags: ApplyFlags,

    /// Catalog compiler URL (overrides the settings file)
    #[arg(long, env = "STEWARD_SERVER")]
    pub server: Option<String>,

    /// Never reuse the cached catalog
    #[arg(long)]
    pub ignore_cache: bool,

    /// Skip the splay delay for this run
    #[arg(long)]
    pub no_splay: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Catalog document (JSON)
    pub catalog: PathBuf,

    #[command(flatten)]
    pub flags: ApplyFlags,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "steward", "-vv", "run", "--noop", "--tags", "web,db", "--server", "http://c:8140",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let options = args.flags.to_options();
        assert!(options.noop);
        assert_eq!(options.tags, vec!["web", "db"]);
        assert_eq!(args.server.as_deref(), Some("http://c:8140"));
    }

    #[test]
    fn test_apply_requires_catalog() {
        assert!(Cli::try_parse_from(["steward", "apply"]).is_err());
        let cli = Cli::try_parse_from(["steward", "apply", "site.json", "-n"]).unwrap();
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.catalog, PathBuf::from("site.json"));
        assert!(args.flags.noop);
    }
}
