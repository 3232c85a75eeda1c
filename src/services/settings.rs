use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::storage::{load_json, save_json, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Default for Theme {
    fn default() -> Self {
        Theme::Dark
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accent {
    Mostly,
    Vitally,
    Principally,
}

impl Default for Accent {
    fn default() -> Self {
        Accent::Mostly
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ru,
    Tm,
}

impl Default for Language {
    fn default() -> Self {
        Language::En
    }
}

impl Language {
    /// Map a locale tag (e.g. "ru-RU", "tk") onto a supported language.
    /// Turkmen locales report "tk" but the app language code is "tm".
    pub fn from_locale(tag: &str) -> Self {
        let code = tag
            .split('-')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match code.as_str() {
            "tk" | "tm" => Language::Tm,
            "ru" => Language::Ru,
            _ => Language::En,
        }
    }
}

/// Persisted client preferences. All simple scalars, no versioning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub accent: Accent,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub last_chat_id: Option<String>,
}

/// Preference state with an init-from-disk / persist-on-change lifecycle.
/// Observers subscribe to a watch channel instead of reading globals.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join("settings.json");
        let settings: Settings = load_json(&path)?;
        let (tx, _rx) = watch::channel(settings);
        Ok(Self { path, tx })
    }

    pub fn get(&self) -> Settings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), StoreError> {
        self.update(|settings| settings.theme = theme)
    }

    pub fn toggle_theme(&self) -> Result<(), StoreError> {
        self.update(|settings| {
            settings.theme = match settings.theme {
                Theme::Dark => Theme::Light,
                Theme::Light => Theme::Dark,
            }
        })
    }

    pub fn set_accent(&self, accent: Accent) -> Result<(), StoreError> {
        self.update(|settings| settings.accent = accent)
    }

    pub fn set_language(&self, language: Language) -> Result<(), StoreError> {
        self.update(|settings| settings.language = language)
    }

    pub fn set_last_chat_id(&self, id: Option<String>) -> Result<(), StoreError> {
        self.update(|settings| settings.last_chat_id = id)
    }

    fn update(&self, mutate: impl FnOnce(&mut Settings)) -> Result<(), StoreError> {
        let mut settings = self.get();
        mutate(&mut settings);
        save_json(&self.path, &settings)?;
        self.tx.send_replace(settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SettingsStore::open(dir.path()).unwrap();
            store.set_theme(Theme::Light).unwrap();
            store.set_accent(Accent::Vitally).unwrap();
            store.set_language(Language::Ru).unwrap();
            store.set_last_chat_id(Some("c42".to_string())).unwrap();
        }

        let reopened = SettingsStore::open(dir.path()).unwrap();
        let settings = reopened.get();
        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.accent, Accent::Vitally);
        assert_eq!(settings.language, Language::Ru);
        assert_eq!(settings.last_chat_id.as_deref(), Some("c42"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn locale_mapping_matches_the_supported_languages() {
        assert_eq!(Language::from_locale("en-US"), Language::En);
        assert_eq!(Language::from_locale("ru"), Language::Ru);
        assert_eq!(Language::from_locale("tk"), Language::Tm);
        assert_eq!(Language::from_locale("tm"), Language::Tm);
        assert_eq!(Language::from_locale("de-DE"), Language::En);
    }

    #[test]
    fn subscribers_observe_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        let rx = store.subscribe();
        store.toggle_theme().unwrap();
        assert_eq!(rx.borrow().theme, Theme::Light);
    }
}
