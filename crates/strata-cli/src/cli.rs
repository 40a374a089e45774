use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "strata object-graph store: persist, inspect, and prune records",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Directory holding the record files
    #[arg(long, global = true, default_value = ".strata")]
    pub store: PathBuf,

    /// TOML file with `[heap]` and `[store]` settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Persist a small cyclic graph, unload it, and load it back
    Demo(DemoArgs),
    /// List records with their class and size
    Ls(LsArgs),
    /// Show one record
    Show(ShowArgs),
    /// Delete one record
    Rm(RmArgs),
    /// Summarize the store
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct DemoArgs {
    /// Number of nodes in the ring
    #[arg(short = 'n', long, default_value = "3")]
    pub nodes: usize,
}

#[derive(Args)]
pub struct LsArgs {}

#[derive(Args)]
pub struct ShowArgs {
    pub key: String,
}

#[derive(Args)]
pub struct RmArgs {
    pub key: String,
}

#[derive(Args)]
pub struct StatsArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_demo_defaults() {
        let cli = Cli::try_parse_from(["strata", "demo"]).unwrap();
        if let Command::Demo(args) = cli.command {
            assert_eq!(args.nodes, 3);
        } else { panic!("wrong command"); }
        assert_eq!(cli.store, PathBuf::from(".strata"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_demo_nodes() {
        let cli = Cli::try_parse_from(["strata", "demo", "-n", "7"]).unwrap();
        if let Command::Demo(args) = cli.command {
            assert_eq!(args.nodes, 7);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_ls() {
        let cli = Cli::try_parse_from(["strata", "ls"]).unwrap();
        assert!(matches!(cli.command, Command::Ls(_)));
    }

    #[test]
    fn parse_show() {
        let cli = Cli::try_parse_from(["strata", "show", "42"]).unwrap();
        if let Command::Show(args) = cli.command {
            assert_eq!(args.key, "42");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_rm_requires_key() {
        assert!(Cli::try_parse_from(["strata", "rm"]).is_err());
        let cli = Cli::try_parse_from(["strata", "rm", "9"]).unwrap();
        assert!(matches!(cli.command, Command::Rm(RmArgs { ref key }) if key == "9"));
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "strata", "stats", "--store", "/tmp/s", "--config", "heap.toml", "-v",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Stats(_)));
        assert_eq!(cli.store, PathBuf::from("/tmp/s"));
        assert_eq!(cli.config, Some(PathBuf::from("heap.toml")));
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["strata", "--format", "json", "ls"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
