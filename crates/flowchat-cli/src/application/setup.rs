use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use flowchat_client::ChatTransport;
use flowchat_client::TransportFactory;
use flowchat_core::ControllerOptions;
use flowchat_core::ConversationStore;
use flowchat_core::FileRepository;
use flowchat_core::StaticAuth;
use flowchat_core::StaticTheme;
use flowchat_core::ThemeMode;

use crate::configuration::Config;
use crate::configuration::ConfigKey;

pub fn controller_options() -> Result<ControllerOptions> {
    Ok(ControllerOptions {
        stagger: Duration::from_millis(Config::get_u64(ConfigKey::StaggerMs)?),
        safety_delay: Duration::from_millis(Config::get_u64(ConfigKey::SafetyEndMs)?),
        chunk_timeout: Duration::from_secs(Config::get_u64(ConfigKey::ChunkTimeoutSecs)?),
    })
}

pub fn theme() -> Result<StaticTheme> {
    let raw = Config::get(ConfigKey::Theme);
    let mode = ThemeMode::from_str(&raw).with_context(|| format!("Unknown theme '{raw}'"))?;
    Ok(StaticTheme::new(mode))
}

pub fn auth() -> StaticAuth {
    StaticAuth::new(Config::get_optional(ConfigKey::User))
}

pub fn open_store() -> Arc<ConversationStore> {
    let repository = FileRepository::new(Config::get(ConfigKey::StorageFile));
    log::info!("Using conversation storage at {}", repository.path().display());
    Arc::new(ConversationStore::new(Arc::new(repository)))
}

/// The HTTP transport for the configured endpoint, or a replay of a
/// recorded response body when `replay` is given.
pub async fn create_transport(replay: Option<&str>) -> Result<Arc<dyn ChatTransport>> {
    if let Some(path) = replay {
        log::info!("Replaying responses from {}", path);
        return TransportFactory::create_replay_transport(path)
            .await
            .with_context(|| format!("Failed to load replay file {path}"));
    }

    let timeout = Duration::from_secs(Config::get_u64(ConfigKey::ChunkTimeoutSecs)?);
    Ok(TransportFactory::create_http_transport(
        Config::get(ConfigKey::ApiUrl),
        Config::get_optional(ConfigKey::ApiKey),
        timeout,
    ))
}
