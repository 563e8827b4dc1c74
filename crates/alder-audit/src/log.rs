//! Append-only audit log with a queryable, newest-first read surface.

use crate::entry::{AuditAction, AuditEntryDraft, AuditLogEntry};
use crate::error::AuditError;
use alder_types::{EntryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Hook that may decorate a draft before it is appended.
///
/// The break-glass controller implements this to tag entries produced
/// while the acting user has an active emergency session.
pub trait EntryTagger: Send + Sync {
    fn tag(&self, draft: AuditEntryDraft) -> AuditEntryDraft;
}

struct LogState {
    entries: Vec<AuditLogEntry>,
    last_timestamp: DateTime<Utc>,
    next_sequence: u64,
}

/// The append-only audit ledger.
///
/// Entries are owned by the log for the process lifetime; there is no
/// update or delete surface. Timestamps are monotonically non-decreasing
/// per process even if the wall clock steps backwards.
pub struct AuditLog {
    state: RwLock<LogState>,
    tagger: RwLock<Option<Arc<dyn EntryTagger>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LogState {
                entries: Vec::new(),
                last_timestamp: DateTime::<Utc>::MIN_UTC,
                next_sequence: 0,
            }),
            tagger: RwLock::new(None),
        }
    }

    /// Install the entry tagger consulted on every append.
    pub fn set_tagger(&self, tagger: Arc<dyn EntryTagger>) -> Result<(), AuditError> {
        let mut slot = self.tagger.write().map_err(|_| AuditError::LockError)?;
        *slot = Some(tagger);
        Ok(())
    }

    /// Append an entry unconditionally. Assigns id, sequence, and a
    /// timestamp no earlier than the previously appended entry.
    pub fn append(&self, draft: AuditEntryDraft) -> Result<AuditLogEntry, AuditError> {
        let draft = self.run_tagger(draft)?;

        let mut state = self.state.write().map_err(|_| AuditError::LockError)?;
        let timestamp = Utc::now().max(state.last_timestamp);
        let sequence = state.next_sequence;

        let entry = AuditLogEntry {
            id: EntryId::generate(),
            sequence,
            timestamp,
            action: draft.action,
            entity_type: draft.entity_type,
            entity_id: draft.entity_id,
            user_id: draft.user_id,
            user_name: draft.user_name,
            change_note: draft.change_note,
            changes: draft.changes,
            is_break_glass_action: draft.is_break_glass_action,
            break_glass_session_id: draft.break_glass_session_id,
        };

        state.last_timestamp = timestamp;
        state.next_sequence += 1;
        state.entries.push(entry.clone());

        tracing::debug!(
            action = %entry.action,
            entity = %entry.entity_type,
            entity_id = %entry.entity_id,
            user = %entry.user_id,
            break_glass = entry.is_break_glass_action,
            "audit entry appended"
        );

        Ok(entry)
    }

    /// Append a field-mutation entry, skipping it entirely when the diff
    /// is empty. Event-style actions are appended regardless.
    pub fn record(&self, draft: AuditEntryDraft) -> Result<Option<AuditLogEntry>, AuditError> {
        if draft.action.requires_changes() && draft.changes.is_empty() {
            return Ok(None);
        }
        self.append(draft).map(Some)
    }

    /// Query entries matching all supplied filters, newest first.
    ///
    /// Ordering is part of the contract: timestamp descending, ties broken
    /// in reverse insertion order. Date bounds are inclusive on both ends.
    pub fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, AuditError> {
        let state = self.state.read().map_err(|_| AuditError::LockError)?;

        let mut results: Vec<AuditLogEntry> = state
            .entries
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect();

        results.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then(b.sequence.cmp(&a.sequence))
        });

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    /// Counters over the whole log, for administration surfaces.
    pub fn statistics(&self) -> Result<AuditStatistics, AuditError> {
        let state = self.state.read().map_err(|_| AuditError::LockError)?;

        let mut by_action: HashMap<String, usize> = HashMap::new();
        let mut by_entity_type: HashMap<String, usize> = HashMap::new();
        let mut break_glass_actions = 0;

        for entry in &state.entries {
            *by_action.entry(entry.action.to_string()).or_insert(0) += 1;
            *by_entity_type.entry(entry.entity_type.clone()).or_insert(0) += 1;
            if entry.is_break_glass_action {
                break_glass_actions += 1;
            }
        }

        Ok(AuditStatistics {
            total_entries: state.entries.len(),
            by_action,
            by_entity_type,
            break_glass_actions,
        })
    }

    pub fn len(&self) -> Result<usize, AuditError> {
        let state = self.state.read().map_err(|_| AuditError::LockError)?;
        Ok(state.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, AuditError> {
        Ok(self.len()? == 0)
    }

    fn run_tagger(&self, draft: AuditEntryDraft) -> Result<AuditEntryDraft, AuditError> {
        let tagger = {
            let slot = self.tagger.read().map_err(|_| AuditError::LockError)?;
            slot.clone()
        };
        Ok(match tagger {
            Some(tagger) => tagger.tag(draft),
            None => draft,
        })
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Filters for an audit query. All supplied filters must match.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub user_id: Option<UserId>,
    pub action: Option<AuditAction>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub break_glass_only: bool,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn for_entity(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(ref entity_type) = self.entity_type {
            if entry.entity_type != *entity_type {
                return false;
            }
        }
        if let Some(ref entity_id) = self.entity_id {
            if entry.entity_id != *entity_id {
                return false;
            }
        }
        if let Some(ref user_id) = self.user_id {
            if entry.user_id != *user_id {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp > end {
                return false;
            }
        }
        if self.break_glass_only && !entry.is_break_glass_action {
            return false;
        }
        true
    }
}

/// Aggregate counters over the audit log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total_entries: usize,
    pub by_action: HashMap<String, usize>,
    pub by_entity_type: HashMap<String, usize>,
    pub break_glass_actions: usize,
}
