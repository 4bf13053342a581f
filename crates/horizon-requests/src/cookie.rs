//! Persistent cookie jars.
//!
//! A [`PersistentCookieJar`] is loaded once when it is opened, supplies and
//! receives cookies while a request runs, and is saved after every execution
//! attempt. Where it is saved to is decided by a [`CookiePersistence`]
//! backend; [`JsonFileCookies`] keeps cookies in a JSON file.
//!
//! Jars may be shared by several requests. Saves from concurrent requests are
//! not coordinated with each other; the last save wins.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cookie_store::CookieStore;
use reqwest_cookie_store::CookieStoreMutex;

use crate::error::{RequestError, Result};

/// Storage backend for a cookie jar.
pub trait CookiePersistence: Send + Sync {
    /// Load the stored cookies. A backend with nothing stored yet returns an
    /// empty store.
    fn load(&self) -> Result<CookieStore>;

    /// Persist the current cookies.
    fn save(&self, store: &CookieStore) -> Result<()>;
}

/// Cookies stored as JSON in a single file.
#[derive(Clone, Debug)]
pub struct JsonFileCookies {
    path: PathBuf,
}

impl JsonFileCookies {
    /// Use the file at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CookiePersistence for JsonFileCookies {
    fn load(&self) -> Result<CookieStore> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CookieStore::default()),
            Err(e) => {
                return Err(RequestError::Cookie(format!(
                    "open {}: {e}",
                    self.path.display()
                )));
            }
        };

        // An empty file is treated like a missing one.
        if file.metadata().map(|m| m.len() == 0).unwrap_or(false) {
            return Ok(CookieStore::default());
        }

        cookie_store::serde::json::load(BufReader::new(file))
            .map_err(|e| RequestError::Cookie(format!("load {}: {e}", self.path.display())))
    }

    fn save(&self, store: &CookieStore) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| RequestError::Cookie(format!("create {}: {e}", parent.display())))?;
        }

        let tmp = self.path.with_extension("tmp");
        let file = File::create(&tmp)
            .map_err(|e| RequestError::Cookie(format!("create {}: {e}", tmp.display())))?;
        let mut writer = BufWriter::new(file);
        cookie_store::serde::json::save(store, &mut writer)
            .map_err(|e| RequestError::Cookie(format!("save {}: {e}", self.path.display())))?;
        writer
            .flush()
            .map_err(|e| RequestError::Cookie(format!("flush {}: {e}", tmp.display())))?;
        drop(writer);

        fs::rename(&tmp, &self.path)
            .map_err(|e| RequestError::Cookie(format!("rename {}: {e}", self.path.display())))
    }
}

/// A cookie jar that survives process restarts.
pub struct PersistentCookieJar {
    store: Arc<CookieStoreMutex>,
    persistence: Box<dyn CookiePersistence>,
}

impl PersistentCookieJar {
    /// Open a jar backed by a JSON file, loading whatever it already holds.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_persistence(JsonFileCookies::new(path))
    }

    /// Open a jar over an arbitrary backend, loading its cookies.
    pub fn with_persistence(persistence: impl CookiePersistence + 'static) -> Result<Self> {
        let store = persistence.load()?;
        Ok(Self {
            store: Arc::new(CookieStoreMutex::new(store)),
            persistence: Box::new(persistence),
        })
    }

    /// Persist the jar's current contents.
    pub fn save(&self) -> Result<()> {
        let store = self
            .store
            .lock()
            .map_err(|_| RequestError::Cookie("cookie store lock poisoned".to_string()))?;
        self.persistence.save(&store)
    }

    /// Names and values of the cookies that would be sent to `url`.
    pub fn cookies_for(&self, url: &url::Url) -> Vec<(String, String)> {
        match self.store.lock() {
            Ok(store) => store
                .get_request_values(url)
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// The cookie provider handed to the HTTP client.
    pub(crate) fn provider(&self) -> Arc<CookieStoreMutex> {
        self.store.clone()
    }
}

impl std::fmt::Debug for PersistentCookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCookieJar").finish_non_exhaustive()
    }
}
