//! Tools catalog: the latest tool definitions advertised by the server.
//!
//! Every `tools` event replaces the catalog wholesale. Readers take an
//! `Arc` snapshot, so a caller never observes a half-applied update.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::ToolDescriptor;

/// An immutable view of the catalog at one point in time.
#[derive(Debug, Clone, Default)]
pub struct ToolSnapshot {
    tools: BTreeMap<String, ToolDescriptor>,
    generation: u64,
    received_at: Option<DateTime<Utc>>,
}

impl ToolSnapshot {
    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Whether a tool with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// All descriptors in name order.
    pub fn tools(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    /// Number of tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// How many `tools` events have been applied (0 = none yet).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the snapshot's `tools` event was applied.
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }
}

/// Process-wide cache of the latest tool definitions for one client.
#[derive(Debug, Default)]
pub struct ToolsCatalog {
    current: RwLock<Arc<ToolSnapshot>>,
}

impl ToolsCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot.
    pub async fn snapshot(&self) -> Arc<ToolSnapshot> {
        self.current.read().await.clone()
    }

    /// Look up a tool in the current snapshot.
    pub async fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.current.read().await.get(name).cloned()
    }

    /// Replace the catalog with `tools` (last write wins).
    ///
    /// Duplicate names within one update keep the last descriptor.
    pub async fn replace(&self, tools: Vec<ToolDescriptor>) -> Arc<ToolSnapshot> {
        let mut map = BTreeMap::new();
        for tool in tools {
            if let Some(previous) = map.insert(tool.name.clone(), tool) {
                warn!(tool = %previous.name, "duplicate tool name in catalog update");
            }
        }

        let mut current = self.current.write().await;
        let snapshot = Arc::new(ToolSnapshot {
            tools: map,
            generation: current.generation + 1,
            received_at: Some(Utc::now()),
        });
        *current = snapshot.clone();
        debug!(
            count = snapshot.len(),
            generation = snapshot.generation,
            "tools catalog replaced"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_catalog() {
        let catalog = ToolsCatalog::new();
        let snapshot = catalog.snapshot().await;
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.generation(), 0);
        assert!(snapshot.received_at().is_none());
    }

    #[tokio::test]
    async fn test_replace_is_not_a_merge() {
        let catalog = ToolsCatalog::new();
        catalog
            .replace(vec![
                ToolDescriptor::new("a", ""),
                ToolDescriptor::new("b", ""),
            ])
            .await;
        catalog.replace(vec![ToolDescriptor::new("c", "")]).await;

        let snapshot = catalog.snapshot().await;
        assert_eq!(snapshot.names(), vec!["c".to_string()]);
        assert_eq!(snapshot.generation(), 2);
        assert!(catalog.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_names_last_wins() {
        let catalog = ToolsCatalog::new();
        catalog
            .replace(vec![
                ToolDescriptor::new("echo", "first"),
                ToolDescriptor::new("echo", "second"),
            ])
            .await;
        assert_eq!(catalog.get("echo").await.unwrap().description, "second");
    }

    #[tokio::test]
    async fn test_old_snapshot_is_unaffected() {
        let catalog = ToolsCatalog::new();
        catalog.replace(vec![ToolDescriptor::new("a", "")]).await;
        let before = catalog.snapshot().await;
        catalog.replace(vec![ToolDescriptor::new("b", "")]).await;
        assert!(before.contains("a"));
        assert!(!before.contains("b"));
    }
}
