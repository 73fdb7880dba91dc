//! Per-source log store with non-destructive filtering.
//!
//! Entries are immutable once cached and carry a process-wide sequence
//! number, so every read returns them in insertion order and entries from
//! different sources can be merged by sequence.

pub mod format;
pub mod markup;

pub use format::{FormattedLine, LogFormatter, MessageKind};
pub use markup::{escape, strip_html};

use crate::error::{UartError, UartResult};
use chrono::{DateTime, Local};
use parking_lot::{ReentrantMutex, RwLock};
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// One cached line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub sequence: u64,
    pub source: String,
    pub kind: Option<MessageKind>,
    pub markup: String,
    pub plain: String,
    pub timestamp: DateTime<Local>,
}

impl LogEntry {
    /// `[12:00:01] RX(CPU1): text`, for terminals.
    pub fn display_line(&self) -> String {
        let label = self.kind.map_or("LOG", MessageKind::label);
        format!(
            "[{}] {}({}): {}",
            self.timestamp.format("%H:%M:%S"),
            label,
            self.source,
            self.plain
        )
    }
}

pub type EntryCallback = Arc<dyn Fn(&Arc<LogEntry>) + Send + Sync>;

/// Shared, thread-safe log store keyed by source.
pub struct LogCache {
    sources: RwLock<BTreeMap<String, VecDeque<Arc<LogEntry>>>>,
    next_sequence: AtomicU64,
    /// Entries kept per source; 0 keeps everything.
    max_entries: usize,
    subscribers: RwLock<Vec<EntryCallback>>,
    dispatch: ReentrantMutex<()>,
}

impl Default for LogCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LogCache {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// A cache keeping at most `max_entries` per source, evicting the oldest.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            sources: RwLock::new(BTreeMap::new()),
            next_sequence: AtomicU64::new(0),
            max_entries,
            subscribers: RwLock::new(Vec::new()),
            dispatch: ReentrantMutex::new(()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Append an entry to `source`. Existing entries are never touched.
    pub fn cache_log_line(&self, source: &str, markup: &str, plain: &str) -> Arc<LogEntry> {
        self.append(source, None, markup.to_string(), plain.to_string(), Local::now())
    }

    /// Append the output of a [`LogFormatter`].
    pub fn cache_formatted(&self, source: &str, line: FormattedLine) -> Arc<LogEntry> {
        self.append(source, Some(line.kind), line.markup, line.plain, line.timestamp)
    }

    fn append(
        &self,
        source: &str,
        kind: Option<MessageKind>,
        markup: String,
        plain: String,
        timestamp: DateTime<Local>,
    ) -> Arc<LogEntry> {
        // Held across notification so observers see appends in sequence order.
        let _dispatch = self.dispatch.lock();

        let entry = {
            let mut sources = self.sources.write();
            let entry = Arc::new(LogEntry {
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
                source: source.to_string(),
                kind,
                markup,
                plain,
                timestamp,
            });
            let lines = sources.entry(source.to_string()).or_default();
            lines.push_back(Arc::clone(&entry));
            if self.max_entries > 0 {
                while lines.len() > self.max_entries {
                    lines.pop_front();
                }
            }
            entry
        };
        trace!(source, sequence = entry.sequence, "log line cached");

        let subscribers = self.subscribers.read().clone();
        for callback in subscribers {
            callback(&entry);
        }
        entry
    }

    /// Register an observer for newly appended entries.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&Arc<LogEntry>) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(callback));
    }

    /// Entries of `source` whose plain text contains `query`, ignoring case.
    ///
    /// An empty query matches everything. An unknown source yields nothing.
    pub fn filter_cache(&self, source: &str, query: &str) -> Vec<Arc<LogEntry>> {
        let sources = self.sources.read();
        let Some(lines) = sources.get(source) else {
            return Vec::new();
        };
        if query.is_empty() {
            return lines.iter().cloned().collect();
        }

        let needle = query.to_lowercase();
        lines
            .iter()
            .filter(|entry| entry.plain.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Entries of `source` whose plain text matches `pattern`, ignoring case.
    ///
    /// # Errors
    ///
    /// - `UartError::InvalidConfig` if the pattern does not compile
    pub fn filter_cache_regex(&self, source: &str, pattern: &str) -> UartResult<Vec<Arc<LogEntry>>> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| UartError::InvalidConfig(format!("invalid filter pattern: {e}")))?;

        let sources = self.sources.read();
        Ok(sources
            .get(source)
            .map(|lines| {
                lines
                    .iter()
                    .filter(|entry| regex.is_match(&entry.plain))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Every entry of `source`, oldest first.
    pub fn entries(&self, source: &str) -> Vec<Arc<LogEntry>> {
        self.filter_cache(source, "")
    }

    /// Entries of all sources merged by sequence.
    pub fn combined(&self) -> Vec<Arc<LogEntry>> {
        let sources = self.sources.read();
        let mut all: Vec<_> = sources.values().flatten().cloned().collect();
        all.sort_unstable_by_key(|entry| entry.sequence);
        all
    }

    /// Discard the entries of `source`; other sources are unaffected.
    pub fn clear_cache(&self, source: &str) {
        if let Some(lines) = self.sources.write().remove(source) {
            debug!(source, dropped = lines.len(), "log cache cleared");
        }
    }

    pub fn clear_all(&self) {
        let mut sources = self.sources.write();
        debug!(sources = sources.len(), "log cache cleared for all sources");
        sources.clear();
    }

    /// Plain text of `source`, one entry per line.
    pub fn export_text(&self, source: &str) -> String {
        let sources = self.sources.read();
        sources
            .get(source)
            .map(|lines| {
                lines
                    .iter()
                    .map(|entry| entry.plain.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }

    pub fn len(&self, source: &str) -> usize {
        self.sources.read().get(source).map_or(0, VecDeque::len)
    }

    pub fn total_len(&self) -> usize {
        self.sources.read().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Sources with at least one cached entry, sorted by name.
    pub fn sources(&self) -> Vec<String> {
        self.sources.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for LogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCache")
            .field("sources", &self.sources())
            .field("total_len", &self.total_len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
