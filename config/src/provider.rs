use std::collections::HashMap;
use std::sync::Arc;

/// Read access to named settings such as `database.connection_string`.
pub trait ConfigProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// The value as written, before `${VAR}` expansion.
    fn get_raw(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    /// The value for `key` when it is present and not blank.
    fn get_non_blank(&self, key: &str) -> Option<String> {
        self.get(key).filter(|value| !value.trim().is_empty())
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProvider for Arc<P> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        (**self).get_raw(key)
    }
}

/// Environment variable consulted before the file for `key`:
/// `database.connection_string` becomes `DEPOT_DATABASE_CONNECTION_STRING`.
#[must_use]
pub fn env_override_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + 6);
    name.push_str("DEPOT_");
    for ch in key.chars() {
        if ch.is_ascii_alphanumeric() {
            name.push(ch.to_ascii_uppercase());
        } else {
            name.push('_');
        }
    }
    name
}

/// In-memory settings, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigProvider for MapConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
