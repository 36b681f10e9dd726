//! Scene table and command resolution

use std::sync::RwLock;

/// One switch target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneEntry {
    /// Command string that selects this scene
    pub command: String,
    /// Scene name as known to OBS
    pub display_name: String,
    /// Scene number for numeric fallback matching
    pub ordinal: Option<i64>,
    pub enabled: bool,
}

/// Scene entries shared between the coordinator and whoever refreshes them
///
/// Readers always see a complete table: [`SceneTable::replace`] swaps the
/// whole entry list under the write lock.
#[derive(Debug, Default)]
pub struct SceneTable {
    entries: RwLock<Vec<SceneEntry>>,
}

impl SceneTable {
    /// Create a table from entries, dropping duplicate commands
    pub fn new(entries: Vec<SceneEntry>) -> Self {
        Self {
            entries: RwLock::new(normalize(entries)),
        }
    }

    /// Replace every entry at once
    pub fn replace(&self, entries: Vec<SceneEntry>) {
        let entries = normalize(entries);
        let count = entries.len();
        match self.entries.write() {
            Ok(mut guard) => *guard = entries,
            Err(poisoned) => *poisoned.into_inner() = entries,
        }
        tracing::debug!("Scene table replaced ({} entries)", count);
    }

    /// Copy of the current entries, ordered by ordinal
    pub fn snapshot(&self) -> Vec<SceneEntry> {
        match self.entries.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of entries, enabled or not
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a command to an enabled scene
    ///
    /// Exact command match wins. Otherwise an integer command matches the
    /// first enabled entry with that ordinal; fractional commands never match
    /// by ordinal.
    pub fn resolve(&self, command: &str) -> Option<SceneEntry> {
        let guard = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(entry) = guard.iter().find(|e| e.enabled && e.command == command) {
            return Some(entry.clone());
        }

        let number: i64 = command.trim().parse().ok()?;
        guard
            .iter()
            .find(|e| e.enabled && e.ordinal == Some(number))
            .cloned()
    }
}

/// Sort by ordinal (entries without one last, then by command) and keep the
/// first entry for each command
fn normalize(mut entries: Vec<SceneEntry>) -> Vec<SceneEntry> {
    entries.sort_by(|a, b| {
        let key = |e: &SceneEntry| (e.ordinal.is_none(), e.ordinal, e.command.clone());
        key(a).cmp(&key(b))
    });

    let mut seen = std::collections::HashSet::new();
    entries.retain(|e| {
        let fresh = seen.insert(e.command.clone());
        if !fresh {
            tracing::warn!("Duplicate scene command {:?} ignored", e.command);
        }
        fresh
    });
    entries
}
