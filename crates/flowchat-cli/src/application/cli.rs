use clap::Arg;
use clap::ArgAction;
use clap::Command;

use crate::configuration::Config;
use crate::configuration::ConfigKey;

fn config_arg(key: ConfigKey, help: &str) -> Arg {
    let default = Config::default(key);
    let help = if default.is_empty() {
        help.to_string()
    } else {
        format!("{help} [default: {default}]")
    };

    Arg::new(key.to_string())
        .long(key.to_string())
        .env(format!("FLOWCHAT_{}", key.to_string().replace('-', "_").to_uppercase()))
        .help(help)
        .num_args(1)
        .global(true)
}

pub fn build() -> Command {
    Command::new("flowchat")
        .about("Chat with a Flowise-style agent flow from the terminal")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(config_arg(
            ConfigKey::ApiUrl,
            "Prediction endpoint of the agent flow",
        ))
        .arg(config_arg(
            ConfigKey::ApiKey,
            "Bearer token sent with every prediction request",
        ))
        .arg(config_arg(ConfigKey::ConfigFile, "Path to the config file"))
        .arg(config_arg(
            ConfigKey::StorageFile,
            "Where conversations are persisted",
        ))
        .arg(
            config_arg(ConfigKey::LogLevel, "Log verbosity")
                .value_parser(["off", "error", "warn", "info", "debug", "trace"]),
        )
        .arg(
            config_arg(ConfigKey::Theme, "Colour scheme for terminal output")
                .value_parser(["light", "dark", "system"]),
        )
        .arg(config_arg(
            ConfigKey::User,
            "Name shown as the signed-in identity",
        ))
        .arg(config_arg(
            ConfigKey::StaggerMs,
            "Pause between agent reasoning steps, in milliseconds",
        ))
        .arg(config_arg(
            ConfigKey::SafetyEndMs,
            "Wait before the final end-of-turn signal, in milliseconds",
        ))
        .arg(config_arg(
            ConfigKey::ChunkTimeoutSecs,
            "Give up on a response after this many seconds without data",
        ))
        .arg(
            Arg::new("replay")
                .long("replay")
                .value_name("FILE")
                .help("Replay a recorded response body instead of calling the agent service")
                .num_args(1)
                .global(true),
        )
        .subcommand(Command::new("chat").about("Interactive chat session (default)"))
        .subcommand(
            Command::new("ask")
                .about("Ask a single question and print the answer")
                .arg(
                    Arg::new("question")
                        .required(true)
                        .num_args(1..)
                        .action(ArgAction::Append)
                        .help("The question to send"),
                ),
        )
        .subcommand(Command::new("list").about("List stored conversations"))
        .subcommand(
            Command::new("config")
                .about("Configuration helpers")
                .subcommand_required(true)
                .subcommand(
                    Command::new("default").about("Print a commented default config file"),
                ),
        )
}
