use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DaybotError;
use crate::tasks::ensure_parent_dir;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroceryItem {
    pub id: String,
    pub name: String,
    pub quantity: Option<String>,
    pub unit: Option<String>,
    pub created_at: String,
}

/// Per-chat grocery list, one JSON array per chat (`groceries_<chat>.json`).
pub struct GroceryStore {
    path: PathBuf,
    items: Vec<GroceryItem>,
}

impl GroceryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path)?;
        let items = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| DaybotError::Storage(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| DaybotError::Serialization(format!("{}: {e}", path.display())))?
        } else {
            Vec::new()
        };
        Ok(Self { path, items })
    }

    pub fn add_item(
        &mut self,
        name: &str,
        quantity: Option<String>,
        unit: Option<String>,
        now: &str,
    ) -> Result<GroceryItem> {
        let item = GroceryItem {
            id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            name: name.to_string(),
            quantity,
            unit,
            created_at: now.to_string(),
        };
        self.items.push(item.clone());
        self.save()?;
        Ok(item)
    }

    pub fn list_items(&self) -> &[GroceryItem] {
        &self.items
    }

    pub fn remove_by_id(&mut self, item_id: &str) -> Result<Option<GroceryItem>> {
        let Some(index) = self.items.iter().position(|i| i.id == item_id) else {
            return Ok(None);
        };
        let removed = self.items.remove(index);
        self.save()?;
        Ok(Some(removed))
    }

    /// Remove the most recently added item with a matching name
    /// (case-insensitive, whitespace-trimmed).
    pub fn remove_by_name(&mut self, name: &str) -> Result<Option<GroceryItem>> {
        let needle = name.trim().to_lowercase();
        let Some(index) = self
            .items
            .iter()
            .rposition(|i| i.name.trim().to_lowercase() == needle)
        else {
            return Ok(None);
        };
        let removed = self.items.remove(index);
        self.save()?;
        Ok(Some(removed))
    }

    pub fn clear(&mut self) -> Result<usize> {
        let count = self.items.len();
        self.items.clear();
        if count > 0 {
            self.save()?;
        }
        Ok(count)
    }

    fn save(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.items)
            .map_err(|e| DaybotError::Serialization(e.to_string()))?;
        fs::write(&self.path, raw)
            .map_err(|e| DaybotError::Storage(format!("write {}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2024-01-01T08:00:00";

    #[test]
    fn remove_by_name_takes_the_last_match() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = GroceryStore::open(dir.path().join("groceries_42.json")).expect("store");
        let first = store.add_item("Milk", None, None, NOW).expect("add");
        let second = store
            .add_item("  milk ", Some("2".to_string()), Some("l".to_string()), NOW)
            .expect("add");

        let removed = store.remove_by_name("MILK").expect("remove").expect("match");
        assert_eq!(removed.id, second.id);
        assert_eq!(store.list_items().len(), 1);
        assert_eq!(store.list_items()[0].id, first.id);

        assert!(store.remove_by_name("bread").expect("remove").is_none());

        let removed = store.remove_by_id(&first.id).expect("remove").expect("match");
        assert_eq!(removed.name, "Milk");
        assert!(store.remove_by_id(&first.id).expect("remove").is_none());
        assert!(store.list_items().is_empty());
    }

    #[test]
    fn clear_reports_removed_count_and_persists() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("groceries_42.json");
        {
            let mut store = GroceryStore::open(&path).expect("store");
            store.add_item("Eggs", None, None, NOW).expect("add");
            store.add_item("Butter", None, None, NOW).expect("add");
            assert_eq!(store.clear().expect("clear"), 2);
            assert_eq!(store.clear().expect("clear again"), 0);
        }
        let store = GroceryStore::open(&path).expect("reopen");
        assert!(store.list_items().is_empty());
    }
}
