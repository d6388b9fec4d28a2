mod cli;
mod commands;
mod error;
mod fixture;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use topowatch_config::{Config, ConfigError, LogFormat};

use crate::cli::{Cli, Command, GlobalOpts, LogFormatArg};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load config before tracing so [logging] can seed the filter
    let config = topowatch_config::load_config(cli.global.config.as_deref());
    init_tracing(&cli.global, config.as_ref().ok());

    if let Err(err) = run(cli, config).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(global: &GlobalOpts, config: Option<&Config>) {
    let logging = config.map(|c| c.logging.clone()).unwrap_or_default();
    let level = match global.verbose {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let json = match global.log_format {
        Some(LogFormatArg::Json) => true,
        Some(LogFormatArg::Text) => false,
        None => logging.format == LogFormat::Json,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli, config: Result<Config, ConfigError>) -> Result<(), CliError> {
    match cli.command {
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global, config),

        Command::Diff(args) => commands::diff::handle(&args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "topowatch", &mut std::io::stdout());
            Ok(())
        }

        Command::Run(args) => {
            let config = config?;
            tracing::debug!(fixture = %args.fixture.display(), "dispatching run");
            commands::run::handle(&args, &cli.global, &config).await
        }
    }
}
