//! `topowatch config`: inspect and bootstrap the configuration file.

use topowatch_config::{Config, ConfigError, save_config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// `loaded` is passed through unevaluated so `config path` and
/// `config init` still work when the existing file is broken.
pub fn handle(
    args: &ConfigArgs,
    global: &GlobalOpts,
    loaded: Result<Config, ConfigError>,
) -> Result<(), CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(topowatch_config::config_path);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
        }

        ConfigCommand::Show => {
            let cfg = loaded?;
            let rendered = match global.output {
                OutputFormat::Json => output::render_json(&cfg, false)?,
                OutputFormat::JsonCompact => output::render_json(&cfg, true)?,
                OutputFormat::Yaml => serde_yaml::to_string(&cfg)?,
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)?,
            };
            output::print_output(rendered.trim_end(), global.quiet);
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            save_config(&Config::default(), &path)?;
            let color = output::should_color(global.color);
            output::print_output(
                &format!("{} {}", output::ok("wrote", color), path.display()),
                global.quiet,
            );
        }
    }
    Ok(())
}
