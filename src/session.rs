// Persisted session state: tokens, the signed-in user and the selected destination.
// Values live under fixed string keys in a `SessionStore`; logout removes them all
// in one store operation.

use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{AuthResponse, User};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";
pub const PROFILE_KEY: &str = "profile";
pub const COUNTRY_KEY: &str = "country";
pub const CITY_KEY: &str = "city";

pub const SESSION_KEYS: [&str; 6] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_KEY,
    PROFILE_KEY,
    COUNTRY_KEY,
    CITY_KEY,
];

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub trait SessionStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    // Removes every key in one step
    fn remove_all(&self, keys: &[&str]) -> Result<(), SessionError>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), SessionError> {
        let mut values = self.values.write();
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

/// Session values persisted as one JSON object on disk.
///
/// Every write replaces the file through a temporary sibling and a rename, so
/// a reader never sees a half-written session.
pub struct FileSessionStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FileSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        debug!(path = %path.display(), keys = values.len(), "opened session file");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), SessionError> {
        let mut values = self.values.write();
        for key in keys {
            values.remove(*key);
        }
        self.persist(&values)
    }
}

// Selected travel profile and place, all optional until the user picks them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destination {
    pub profile: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), SessionError> {
        self.store.set(ACCESS_TOKEN_KEY, token)
    }

    pub fn store_auth(&self, auth: &AuthResponse) -> Result<(), SessionError> {
        self.store.set(ACCESS_TOKEN_KEY, &auth.access)?;
        self.store.set(REFRESH_TOKEN_KEY, &auth.refresh)?;
        self.store.set(USER_KEY, &serde_json::to_string(&auth.user)?)
    }

    // A corrupt user entry reads as signed out rather than failing the caller
    pub fn user(&self) -> Option<User> {
        let raw = self.store.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable session user");
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn set_destination(&self, destination: &Destination) -> Result<(), SessionError> {
        let fields = [
            (PROFILE_KEY, &destination.profile),
            (COUNTRY_KEY, &destination.country),
            (CITY_KEY, &destination.city),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                self.store.set(key, value)?;
            }
        }
        Ok(())
    }

    pub fn destination(&self) -> Destination {
        Destination {
            profile: self.store.get(PROFILE_KEY),
            country: self.store.get(COUNTRY_KEY),
            city: self.store.get(CITY_KEY),
        }
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        self.store.remove_all(&SESSION_KEYS)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::in_memory()
    }
}
