#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    ApiUrl,
    ApiKey,
    ConfigFile,
    StorageFile,
    LogLevel,
    Theme,
    User,
    StaggerMs,
    SafetyEndMs,
    ChunkTimeoutSecs,
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    /// The value, or `None` when it is unset or blank.
    pub fn get_optional(key: ConfigKey) -> Option<String> {
        let val = Config::get(key);
        if val.trim().is_empty() {
            return None;
        }

        return Some(val);
    }

    pub fn get_u64(key: ConfigKey) -> Result<u64> {
        let val = Config::get(key);
        return val
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Invalid value for '{key}': expected a whole number, got '{val}'"));
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    pub fn default(key: ConfigKey) -> String {
        let config_path = dirs::config_dir()
            .map(|dir| dir.join("flowchat/config.toml"))
            .unwrap_or_else(|| path::PathBuf::from("flowchat.toml"));

        let storage_path = dirs::data_local_dir()
            .map(|dir| dir.join("flowchat/ai-chat-data.json"))
            .unwrap_or_else(|| path::PathBuf::from("ai-chat-data.json"));

        let res = match key {
            ConfigKey::ApiUrl => "http://localhost:3000/api/v1/prediction/default".to_string(),
            ConfigKey::ApiKey => "".to_string(),
            ConfigKey::LogLevel => "info".to_string(),
            ConfigKey::Theme => "system".to_string(),
            ConfigKey::User => "".to_string(),
            ConfigKey::StaggerMs => "300".to_string(),
            ConfigKey::SafetyEndMs => "500".to_string(),
            ConfigKey::ChunkTimeoutSecs => "120".to_string(),

            // Paths
            ConfigKey::ConfigFile => config_path.to_string_lossy().to_string(),
            ConfigKey::StorageFile => storage_path.to_string_lossy().to_string(),
        };

        return res;
    }

    pub async fn load(cmd: &Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(&config_path).await?;
            let doc = toml_str
                .parse::<toml_edit::Document>()
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;

            for key in ConfigKey::iter() {
                if key == ConfigKey::ConfigFile {
                    continue;
                }

                if let Some(val) = doc.get(&key.to_string()) {
                    // Use clap value parsers to do validation.
                    let possible_values = Config::possible_values(cmd, key);

                    if let Some(val_int) = val.as_integer() {
                        Config::set(key, &val_int.to_string());
                    } else if let Some(val_str) = val.as_str() {
                        if val_str.is_empty() {
                            continue;
                        }
                        if !possible_values.is_empty()
                            && !possible_values.contains(&val_str.to_string())
                        {
                            bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nPossible values are: {}", possible_values.join(", ")));
                        }
                        Config::set(key, val_str);
                    }
                }
            }
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::set(key, val)
                }
            }
        }

        log::debug!(
            "config: api-url={}, theme={}, storage-file={}",
            Config::get(ConfigKey::ApiUrl),
            Config::get(ConfigKey::Theme),
            Config::get(ConfigKey::StorageFile)
        );

        return Ok(());
    }

    fn possible_values(cmd: &Command, key: ConfigKey) -> Vec<String> {
        let long = key.to_string();
        return cmd
            .get_arguments()
            .find(|e| return e.get_long() == Some(long.as_str()))
            .map(|arg| {
                return arg
                    .get_possible_values()
                    .iter()
                    .map(|e| return e.get_name().to_string())
                    .collect::<Vec<String>>();
            })
            .unwrap_or_default();
    }

    pub fn serialize_default(cmd: &Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let long = key.to_string();
                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(long.as_str()))?;

                let mut description = arg
                    .get_help()
                    .map(|help| return help.to_string())
                    .unwrap_or_default();

                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                let possible_values = Config::possible_values(cmd, key);
                if !possible_values.is_empty() {
                    description = format!(
                        "{description} [possible values: {}]",
                        possible_values.join(", ")
                    );
                }

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i64>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
