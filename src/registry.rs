//! Description-source registry.
//!
//! The registry owns the set of sources the active database is compiled
//! from: the built-in descriptions embedded in the binary (togglable,
//! never removable) and any operator-supplied DBC file paths. The
//! control loop mutates it in response to requests and recompiles; the
//! public surface only takes read snapshots. All methods are short and
//! lock-free internally; the caller holds the registry behind its own
//! mutex and keeps critical sections to the mutation itself, compiling
//! from a [`snapshot`](SourceRegistry::snapshot) outside any lock.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::database::{Database, DatabaseBuilder};

/// A description source embedded in the binary.
struct Builtin {
    name: &'static str,
    text: &'static str,
    enabled: bool,
}

/// The built-in descriptions shipped with the library: the Prohelion
/// WaveSculptor 22 motor controller, the array MPPT, and the vehicle
/// controls board.
const BUILTINS: &[(&str, &str)] = &[
    ("wavesculptor22", include_str!("../dbc/wavesculptor22.dbc")),
    ("mppt", include_str!("../dbc/mppt.dbc")),
    ("controls", include_str!("../dbc/controls.dbc")),
];

/// Everything needed to compile one database, detached from the
/// registry so compilation and file I/O run outside its lock.
pub struct RegistrySnapshot {
    builtin_texts: Vec<&'static str>,
    files: Vec<PathBuf>,
}

impl RegistrySnapshot {
    /// Compile the snapshot into a fresh database.
    ///
    /// A file that fails to read is skipped with a warning; a bad file
    /// never aborts the rest of the rebuild.
    pub async fn compile(&self) -> Database {
        let mut builder = DatabaseBuilder::new();
        for text in &self.builtin_texts {
            builder.add_source(text);
        }
        for path in &self.files {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => builder.add_source(&text),
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable description file");
                }
            }
        }
        let database = builder.build();
        debug!(messages = database.message_count(), "database compiled");
        database
    }
}

/// Registry of built-in and file-backed description sources.
pub struct SourceRegistry {
    builtins: Vec<Builtin>,
    files: Vec<PathBuf>,
}

impl SourceRegistry {
    /// Create a registry with every built-in disabled and no files.
    pub fn new() -> Self {
        let builtins = BUILTINS
            .iter()
            .map(|&(name, text)| Builtin { name, text, enabled: false })
            .collect();
        Self { builtins, files: Vec::new() }
    }

    /// Whether a built-in with this name exists at all, enabled or not.
    pub fn contains_builtin(&self, name: &str) -> bool {
        self.builtins.iter().any(|b| b.name == name)
    }

    /// Enable a built-in by name. Returns whether the enabled set
    /// changed (false for unknown names and already-enabled builtins).
    pub fn enable_builtin(&mut self, name: &str) -> bool {
        self.set_builtin(name, true)
    }

    /// Disable a built-in by name. Returns whether the set changed.
    pub fn disable_builtin(&mut self, name: &str) -> bool {
        self.set_builtin(name, false)
    }

    fn set_builtin(&mut self, name: &str, enabled: bool) -> bool {
        match self.builtins.iter_mut().find(|b| b.name == name) {
            Some(builtin) if builtin.enabled != enabled => {
                builtin.enabled = enabled;
                true
            }
            Some(_) => false,
            None => {
                warn!(name, "unknown builtin description");
                false
            }
        }
    }

    /// Add a file-backed source. Idempotent: re-adding a present path is
    /// a no-op and returns false.
    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.files.contains(&path) {
            return false;
        }
        self.files.push(path);
        true
    }

    /// Remove a file-backed source. Returns whether it was present.
    pub fn remove_file(&mut self, path: &Path) -> bool {
        let before = self.files.len();
        self.files.retain(|p| p != path);
        self.files.len() != before
    }

    /// Names and enabled flags of every built-in, in registry order.
    pub fn list_builtins(&self) -> Vec<(String, bool)> {
        self.builtins.iter().map(|b| (b.name.to_string(), b.enabled)).collect()
    }

    /// Currently loaded file paths, in load order.
    pub fn list_files(&self) -> Vec<PathBuf> {
        self.files.clone()
    }

    /// Snapshot the enabled set for compilation outside the lock.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            builtin_texts: self
                .builtins
                .iter()
                .filter(|b| b.enabled)
                .map(|b| b.text)
                .collect(),
            files: self.files.clone(),
        }
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
