//! Key/value settings store.
//!
//! Values follow registry DWORD semantics: every setting is an integer and
//! booleans are stored as `0`/`1`. Call sites always supply their own default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Source of raw setting values.
pub trait SettingsProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<i64>;
}

impl<T: SettingsProvider + ?Sized> SettingsProvider for Arc<T> {
    fn get(&self, key: &str) -> Option<i64> {
        (**self).get(key)
    }
}

/// Typed view over a [`SettingsProvider`].
#[derive(Clone)]
pub struct Settings {
    provider: Arc<dyn SettingsProvider>,
}

impl Settings {
    pub fn new(provider: Arc<dyn SettingsProvider>) -> Self {
        Self { provider }
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.provider.get(key)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).map(|value| value != 0).unwrap_or(default)
    }

    pub fn get_f32(&self, key: &str, default: f32) -> f32 {
        self.get(key).map(|value| value as f32).unwrap_or(default)
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings").finish_non_exhaustive()
    }
}

fn read_map(lock: &RwLock<HashMap<String, i64>>) -> RwLockReadGuard<'_, HashMap<String, i64>> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_map(lock: &RwLock<HashMap<String, i64>>) -> RwLockWriteGuard<'_, HashMap<String, i64>> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-memory settings, mutable while shared.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, i64>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: i64) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: i64) {
        write_map(&self.values).insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) {
        write_map(&self.values).remove(key);
    }
}

impl SettingsProvider for MemorySettings {
    fn get(&self, key: &str) -> Option<i64> {
        read_map(&self.values).get(key).copied()
    }
}

/// Settings backed by a flat JSON object on disk.
///
/// ```json
/// { "guardian": true, "guardian_radius": 1800, "aim_pose_rot_x": -15 }
/// ```
#[derive(Debug)]
pub struct JsonSettings {
    path: Option<PathBuf>,
    values: RwLock<HashMap<String, i64>>,
}

impl JsonSettings {
    /// Load settings from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let values = Self::read_file(path)?;
        debug!(path = %path.display(), count = values.len(), "loaded settings");
        Ok(Self {
            path: Some(path.to_path_buf()),
            values: RwLock::new(values),
        })
    }

    /// Parse settings from a JSON document that has no backing file.
    pub fn parse(json: &str) -> Result<Self> {
        Ok(Self {
            path: None,
            values: RwLock::new(parse_document(json)?),
        })
    }

    /// Re-read the backing file. Returns `true` if any value changed.
    pub fn reload(&self) -> Result<bool> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };
        let values = Self::read_file(path)?;
        let mut current = write_map(&self.values);
        let changed = *current != values;
        *current = values;
        Ok(changed)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read_file(path: &Path) -> Result<HashMap<String, i64>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };
        parse_document(&text)
    }
}

impl SettingsProvider for JsonSettings {
    fn get(&self, key: &str) -> Option<i64> {
        read_map(&self.values).get(key).copied()
    }
}

fn parse_document(json: &str) -> Result<HashMap<String, i64>> {
    let document: Value = serde_json::from_str(json)?;
    let Value::Object(entries) = document else {
        return Err(Error::config("settings document must be a JSON object"));
    };

    let mut values = HashMap::with_capacity(entries.len());
    for (key, value) in entries {
        let raw = match &value {
            Value::Bool(flag) => i64::from(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(int) => int,
                None => number
                    .as_f64()
                    .map(|float| float.round() as i64)
                    .ok_or_else(|| Error::config(format!("{key}: number out of range")))?,
            },
            other => {
                return Err(Error::config(format!(
                    "{key}: expected number or boolean, got {other}"
                )));
            }
        };
        values.insert(key, raw);
    }
    Ok(values)
}
