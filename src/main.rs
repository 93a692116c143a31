//! Oak CLI entry point.

use clap::Parser;

use oak::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Run(args) => oak::cli::commands::run::execute(args, config_path).await,
        Commands::Modules(args) => oak::cli::commands::modules::execute(args, config_path, cli.json).await,
    };

    if let Err(err) = result {
        oak::cli::handle_error(err, cli.json);
    }
}
