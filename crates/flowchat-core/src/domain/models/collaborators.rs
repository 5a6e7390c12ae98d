use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumString;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

/// Who is chatting. The engine only needs to know whether someone is signed
/// in and how to label them.
pub trait AuthProvider: Send + Sync {
    fn is_logged_in(&self) -> bool;
    fn identity_label(&self) -> Option<String>;
}

pub trait ThemeProvider: Send + Sync {
    fn theme_mode(&self) -> ThemeMode;
}
