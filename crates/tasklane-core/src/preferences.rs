use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, warn};

use crate::storage::{DARK_MODE_KEY, KeyValueStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeMode {
    Light,
    Dark,
}

/// What to use when nothing has been stored yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeFallback {
    Light,
    Dark,
    System,
}

impl std::str::FromStr for ThemeFallback {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" | "day" => Ok(Self::Light),
            "dark" | "night" => Ok(Self::Dark),
            "system" | "auto" => Ok(Self::System),
            other => Err(anyhow!("invalid theme setting: {other}")),
        }
    }
}

/// Dark/light display flag. Read once at startup, then only changed by
/// explicit toggles, each of which is persisted.
pub struct ThemePreference {
    store: Arc<dyn KeyValueStore>,
    mode: ThemeMode,
}

impl ThemePreference {
    pub fn load(store: Arc<dyn KeyValueStore>, fallback: ThemeFallback) -> anyhow::Result<Self> {
        let stored = store.get(DARK_MODE_KEY)?;
        let mode = match stored.as_deref().map(serde_json::from_str::<bool>) {
            Some(Ok(true)) => ThemeMode::Dark,
            Some(Ok(false)) => ThemeMode::Light,
            Some(Err(err)) => {
                warn!(error = %err, "ignoring unreadable stored theme");
                resolve_fallback(fallback)
            }
            None => resolve_fallback(fallback),
        };
        debug!(?mode, "loaded theme preference");
        Ok(Self { store, mode })
    }

    pub fn mode(&self) -> ThemeMode {
        self.mode
    }

    pub fn is_dark(&self) -> bool {
        self.mode == ThemeMode::Dark
    }

    pub fn set(&mut self, mode: ThemeMode) -> anyhow::Result<()> {
        self.store
            .set(DARK_MODE_KEY, &serde_json::to_string(&(mode == ThemeMode::Dark))?)?;
        self.mode = mode;
        Ok(())
    }

    pub fn toggle(&mut self) -> anyhow::Result<ThemeMode> {
        let next = match self.mode {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        };
        self.set(next)?;
        Ok(next)
    }
}

fn resolve_fallback(fallback: ThemeFallback) -> ThemeMode {
    match fallback {
        ThemeFallback::Light => ThemeMode::Light,
        ThemeFallback::Dark => ThemeMode::Dark,
        ThemeFallback::System => {
            if terminal_prefers_dark(std::env::var("COLORFGBG").ok().as_deref()) {
                ThemeMode::Dark
            } else {
                ThemeMode::Light
            }
        }
    }
}

/// `COLORFGBG` is `fg;bg` (sometimes `fg;default;bg`); ANSI backgrounds
/// 0-6 and 8 are dark.
fn terminal_prefers_dark(colorfgbg: Option<&str>) -> bool {
    colorfgbg
        .and_then(|value| value.rsplit(';').next())
        .and_then(|bg| bg.trim().parse::<u8>().ok())
        .is_some_and(|bg| bg <= 6 || bg == 8)
}
