pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shopkeep_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "shopkeep",
    about = "Conversational shopping assistant CLI",
    long_about = "Chat with a tool-calling shopping assistant backed by a local Ollama model \
                  and a REST (or built-in mock) ecommerce store.",
    after_help = "Examples:\n  shopkeep chat\n  shopkeep ask \"do you sell yoga mats?\"\n  \
                  shopkeep products --search sports\n  shopkeep config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a shopkeep.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override llm.model")]
    model: Option<String>,
    #[arg(long, global = true, help = "Override llm.base_url")]
    llm_url: Option<String>,
    #[arg(long, global = true, help = "Override store.base_url (omit to use the mock store)")]
    store_url: Option<String>,
    #[arg(long, global = true, help = "Enable simulated token cost tracking")]
    track_cost: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive chat session (/reset, /history, /cost, /quit)")]
    Chat,
    #[command(about = "Send a single message and print the assistant's reply")]
    Ask {
        #[arg(required = true, help = "Message to send")]
        message: Vec<String>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List or search the store catalog without involving the model")]
    Products {
        #[arg(long, help = "Case-insensitive name or category filter")]
        search: Option<String>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

/// Commands that need a loaded config and an async runtime.
#[derive(Debug, PartialEq, Eq)]
enum RuntimeCommand {
    Chat,
    Ask { message: String, json: bool },
    Products { search: Option<String>, json: bool },
}

impl Command {
    /// `None` for `config`, which reports on the config instead of loading it.
    fn into_runtime(self) -> Option<RuntimeCommand> {
        match self {
            Self::Chat => Some(RuntimeCommand::Chat),
            Self::Ask { message, json } => {
                Some(RuntimeCommand::Ask { message: message.join(" "), json })
            }
            Self::Products { search, json } => Some(RuntimeCommand::Products { search, json }),
            Self::Config => None,
        }
    }
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                llm_base_url: self.llm_url.clone(),
                llm_model: self.model.clone(),
                store_base_url: self.store_url.clone(),
                cost_tracking: self.track_cost.then_some(true),
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    let result = match cli.command.into_runtime() {
        None => CommandResult::text(commands::config::run(options)),
        Some(command) => match AppConfig::load(options) {
            Ok(config) => {
                init_logging(&config);
                execute(command, config)
            }
            Err(error) => CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            ),
        },
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}

fn execute(command: RuntimeCommand, config: AppConfig) -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure("startup", "runtime", error.to_string(), 1);
        }
    };

    runtime.block_on(async move {
        match command {
            RuntimeCommand::Chat => commands::chat::run(&config).await,
            RuntimeCommand::Ask { message, json } => {
                commands::ask::run(&config, &message, json).await
            }
            RuntimeCommand::Products { search, json } => {
                commands::products::run(&config, search.as_deref(), json).await
            }
        }
    })
}

/// Logs go to stderr so stdout stays clean for replies and JSON output.
pub fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, RuntimeCommand};

    fn runtime_command(args: &[&str]) -> Option<RuntimeCommand> {
        Cli::try_parse_from(args).expect("valid arguments").command.into_runtime()
    }

    #[test]
    fn config_command_does_not_need_a_runtime() {
        assert_eq!(runtime_command(&["shopkeep", "config"]), None);
        assert_eq!(runtime_command(&["shopkeep", "--model", "qwen2.5", "config"]), None);
    }

    #[test]
    fn runtime_commands_carry_their_arguments() {
        assert_eq!(runtime_command(&["shopkeep", "chat"]), Some(RuntimeCommand::Chat));
        assert_eq!(
            runtime_command(&["shopkeep", "ask", "do you sell", "yoga mats?", "--json"]),
            Some(RuntimeCommand::Ask { message: "do you sell yoga mats?".to_string(), json: true })
        );
        assert_eq!(
            runtime_command(&["shopkeep", "products", "--search", "sports"]),
            Some(RuntimeCommand::Products { search: Some("sports".to_string()), json: false })
        );
    }
}
