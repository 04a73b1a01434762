use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Online,
    Idle,
    Dnd,
    Invisible,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Online => "online",
            Status::Idle => "idle",
            Status::Dnd => "dnd",
            Status::Invisible => "invisible",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "online" => Ok(Status::Online),
            "idle" => Ok(Status::Idle),
            "dnd" => Ok(Status::Dnd),
            "invisible" => Ok(Status::Invisible),
            other => Err(format!(
                "unknown status '{other}' (expected online, idle, dnd or invisible)"
            )),
        }
    }
}

/// User-editable settings persisted as JSON next to the binary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    pub status: Status,
    pub custom_status: String,
    pub auto_join_voice: bool,
    pub voice_channel_id: String,
}

/// File-backed settings. Readers get a cheap snapshot; writers persist to
/// disk first and only then publish the new snapshot.
#[derive(Clone)]
pub struct SettingsStore {
    path: PathBuf,
    current: Arc<ArcSwap<Settings>>,
    write_lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    /// Load settings from `path`, creating the file with defaults if it does
    /// not exist and writing back any keys that were missing.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let settings = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let value: serde_json::Value = serde_json::from_str(&raw)?;
                let (settings, changed) = fill_defaults(value)?;
                if changed {
                    tracing::info!("added missing keys to {}", path.display());
                    write_file(&path, &settings)?;
                }
                settings
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Settings::default();
                write_file(&path, &settings)?;
                tracing::info!("created default settings at {}", path.display());
                settings
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            current: Arc::new(ArcSwap::from_pointee(settings)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        (**self.current.load()).clone()
    }

    /// Apply `f` to a copy of the current settings, persist it, then publish.
    pub fn update<F>(&self, f: F) -> Result<Settings, SettingsError>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = self.get();
        f(&mut next);
        write_file(&self.path, &next)?;
        self.current.store(Arc::new(next.clone()));
        Ok(next)
    }
}

fn fill_defaults(value: serde_json::Value) -> Result<(Settings, bool), SettingsError> {
    let defaults = serde_json::to_value(Settings::default())?;
    let mut merged = match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    let mut changed = false;
    if let serde_json::Value::Object(default_map) = defaults {
        for (key, default) in default_map {
            if !merged.contains_key(&key) {
                merged.insert(key, default);
                changed = true;
            }
        }
    }

    let settings = serde_json::from_value(serde_json::Value::Object(merged))?;
    Ok((settings, changed))
}

fn write_file(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    Ok(())
}
