use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::ArgMatches;
use flowchat_cli::application::cli;
use flowchat_cli::application::commands;
use flowchat_cli::application::render::Palette;
use flowchat_cli::application::setup;
use flowchat_cli::ChatApp;
use flowchat_cli::Config;
use flowchat_cli::ConfigKey;
use flowchat_client::ChatTransport;
use flowchat_core::SessionController;
use flowchat_core::ThemeProvider;
use flowchat_core::TokioScheduler;
use flowchat_core::TurnStatus;
use log::LevelFilter;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;

#[derive(Debug, Clone, Copy)]
enum RunMode {
    Chat,
    Ask,
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = cli::build();
    let matches = cmd.clone().get_matches();

    if let Some(("config", config_matches)) = matches.subcommand() {
        if let Some(("default", _)) = config_matches.subcommand() {
            println!("{}", Config::serialize_default(&cmd));
        }
        return Ok(());
    }

    let mut arg_matches = vec![&matches];
    if let Some((_, sub_matches)) = matches.subcommand() {
        arg_matches.push(sub_matches);
    }
    Config::load(&cmd, arg_matches).await?;

    let mode = match matches.subcommand_name() {
        Some("ask") => RunMode::Ask,
        Some("list") => RunMode::List,
        _ => RunMode::Chat,
    };
    init_logging(mode)?;

    let replay = replay_file(&matches);

    match matches.subcommand() {
        Some(("ask", ask_matches)) => {
            let question = ask_matches
                .get_many::<String>("question")
                .map(|words| words.cloned().collect::<Vec<String>>().join(" "))
                .unwrap_or_default();
            run_ask(&question, replay.as_deref()).await
        }
        Some(("list", _)) => run_list(),
        _ => run_chat(replay.as_deref()).await,
    }
}

fn replay_file(matches: &ArgMatches) -> Option<String> {
    let from_sub = matches
        .subcommand()
        .and_then(|(_, sub)| sub.try_get_one::<String>("replay").ok().flatten().cloned());

    from_sub.or_else(|| matches.get_one::<String>("replay").cloned())
}

fn init_logging(mode: RunMode) -> Result<()> {
    let log_level_filter = Config::get(ConfigKey::LogLevel)
        .parse()
        .unwrap_or(LevelFilter::Info);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(log_level_filter);

    match mode {
        RunMode::Ask => {
            // One-shot answers go to stdout, so logs stay on stderr
            builder.target(env_logger::Target::Stderr);
        }
        RunMode::Chat | RunMode::List => {
            // Keep the chat transcript clean
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open("flowchat.log")
                .context("Failed to create flowchat.log file")?;
            builder.target(env_logger::Target::Pipe(Box::new(log_file)));
        }
    }

    builder.init();
    Ok(())
}

fn build_app(transport: Arc<dyn ChatTransport>) -> Result<(ChatApp, Arc<SessionController>)> {
    let theme = setup::theme()?;
    let palette = Palette::new(theme.theme_mode(), std::io::stdout().is_terminal());

    let controller = Arc::new(SessionController::new(
        setup::open_store(),
        transport,
        Arc::new(TokioScheduler),
        setup::controller_options()?,
    ));
    let app = ChatApp::new(controller.clone(), Arc::new(setup::auth()), palette);

    Ok((app, controller))
}

async fn run_chat(replay: Option<&str>) -> Result<()> {
    let transport = setup::create_transport(replay).await?;
    if let Err(err) = transport.health_check().await {
        log::warn!("Health check failed: {}", err);
        eprintln!(
            "Warning: the agent service at {} is not answering yet ({err}).",
            Config::get(ConfigKey::ApiUrl)
        );
    }

    let (app, _) = build_app(transport)?;
    let mut stdout = tokio::io::stdout();
    app.run(BufReader::new(tokio::io::stdin()), &mut stdout).await
}

async fn run_ask(question: &str, replay: Option<&str>) -> Result<()> {
    let transport = setup::create_transport(replay).await?;
    let (app, controller) = build_app(transport)?;
    controller.store().create_conversation()?;

    let mut stdout = tokio::io::stdout();
    let outcome = app.stream_turn(question, &mut stdout).await?;
    stdout.flush().await?;

    if let TurnStatus::Failed(category) = outcome.status {
        anyhow::bail!("The turn failed ({category:?})");
    }
    Ok(())
}

fn run_list() -> Result<()> {
    let store = setup::open_store();
    println!("{}", commands::format_conversation_list(&store.get_state()));
    Ok(())
}
