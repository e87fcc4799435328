//! What a sync did, action by action

use serde::{Deserialize, Serialize};
use vendo_cache::CacheStatus;

use crate::fetch::CacheEvent;

/// Kind of a reported action; serialized in kebab case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Fetch,
    Pull,
    Unbundle,
    CacheStore,
    CacheSkip,
    Place,
    Lock,
    Error,
}

/// One reported step of a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAction {
    pub action: ActionKind,
    /// Directory path the action belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Content path within the directory, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

impl SyncAction {
    pub fn new(action: ActionKind, message: impl Into<String>) -> Self {
        Self {
            action,
            directory: None,
            path: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, directory: &str, path: Option<&str>) -> Self {
        self.directory = Some(directory.to_string());
        self.path = path.map(str::to_string);
        self
    }

    /// The action reporting a cache event, if the cache was involved.
    pub fn from_cache_event(event: &CacheEvent) -> Option<Self> {
        match &event.status {
            CacheStatus::Disabled => None,
            CacheStatus::Hit => Some(Self::new(
                ActionKind::Unbundle,
                format!("Using cached {} (unbundle)", event.subject),
            )),
            CacheStatus::Stored => Some(Self::new(
                ActionKind::CacheStore,
                format!("Stored {} in cache", event.subject),
            )),
            CacheStatus::Skipped { reason } => Some(Self::new(
                ActionKind::CacheSkip,
                format!("Not caching {}: {reason}", event.subject),
            )),
        }
    }
}

/// Report of a completed sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub actions: Vec<SyncAction>,
}

impl SyncReport {
    /// Actions of the given kind, in order.
    pub fn of_kind(&self, kind: ActionKind) -> impl Iterator<Item = &SyncAction> {
        self.actions.iter().filter(move |a| a.action == kind)
    }

    /// Whether any action of `kind` was reported.
    pub fn has(&self, kind: ActionKind) -> bool {
        self.of_kind(kind).next().is_some()
    }
}
