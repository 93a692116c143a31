//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::commands::modules::ModulesArgs;
use crate::cli::commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(name = "oak")]
#[command(about = "Oak - modular service host", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to oak.yaml + oak.local.yaml)
    #[arg(short, long, global = true, env = "OAK_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the host: load modules and read operator commands from stdin
    Run(RunArgs),

    /// Inspect module definitions without starting the host
    Modules(ModulesArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::modules::ModulesCommands;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from(["oak", "run", "--modules-dir", "/tmp/m", "--no-console"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.modules_dir.as_deref(), Some("/tmp/m"));
                assert!(args.no_console);
            }
            Commands::Modules(_) => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_modules_check_with_global_json() {
        let cli = Cli::try_parse_from(["oak", "modules", "check", "tickets", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Modules(args) => {
                assert!(matches!(args.command, ModulesCommands::Check { ref name } if name == "tickets"));
            }
            Commands::Run(_) => panic!("expected modules"),
        }
    }
}
