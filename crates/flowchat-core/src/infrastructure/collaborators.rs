use crate::domain::models::AuthProvider;
use crate::domain::models::ThemeMode;
use crate::domain::models::ThemeProvider;

/// Identity fixed at startup, for example from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticAuth {
    user: Option<String>,
}

impl StaticAuth {
    pub fn new(user: Option<String>) -> StaticAuth {
        StaticAuth {
            user: user.filter(|user| !user.trim().is_empty()),
        }
    }
}

impl AuthProvider for StaticAuth {
    fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    fn identity_label(&self) -> Option<String> {
        self.user.clone()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StaticTheme {
    mode: ThemeMode,
}

impl StaticTheme {
    pub fn new(mode: ThemeMode) -> StaticTheme {
        StaticTheme { mode }
    }
}

impl ThemeProvider for StaticTheme {
    fn theme_mode(&self) -> ThemeMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_static_auth() {
        assert!(!StaticAuth::new(None).is_logged_in());
        assert!(!StaticAuth::new(Some("  ".to_string())).is_logged_in());

        let auth = StaticAuth::new(Some("ada".to_string()));
        assert!(auth.is_logged_in());
        assert_eq!(auth.identity_label().as_deref(), Some("ada"));
    }

    #[test]
    fn test_static_theme() {
        assert_eq!(StaticTheme::default().theme_mode(), ThemeMode::System);
        let mode = ThemeMode::from_str("dark").unwrap();
        assert_eq!(StaticTheme::new(mode).theme_mode(), ThemeMode::Dark);
    }
}
