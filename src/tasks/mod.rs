use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DaybotError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Sort rank for summaries: high first, low last.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MED",
            Priority::Low => "LOW",
        }
    }

    pub fn from_option(value: Option<&str>) -> Self {
        value
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Priority::Medium)
    }
}

impl std::str::FromStr for Priority {
    type Err = ();

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match value.to_ascii_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Medium,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub remind_at: Option<String>,
    pub reminded_at: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl Task {
    /// A task the reminder scheduler should hold a live timer for.
    pub fn is_reminder_eligible(&self) -> bool {
        self.status == TaskStatus::Pending && self.remind_at.is_some() && self.reminded_at.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TaskFilter {
    Pending,
    Completed,
    All,
}

impl TaskFilter {
    pub fn from_option(value: Option<&str>) -> Self {
        value.and_then(|raw| raw.parse().ok()).unwrap_or(TaskFilter::All)
    }
}

impl std::str::FromStr for TaskFilter {
    type Err = ();

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match value {
            "pending" => TaskFilter::Pending,
            "completed" => TaskFilter::Completed,
            _ => TaskFilter::All,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskSummary {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub high_priority_pending: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChatSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    daily_summary_time: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Durable per-chat task list plus chat settings.
///
/// One JSON array per chat (`tasks_<chat>.json`) with a sibling settings
/// object (`settings_<chat>.json`); every mutation persists before returning.
pub struct TaskStore {
    tasks_path: PathBuf,
    settings_path: PathBuf,
    tasks: Vec<Task>,
    settings: ChatSettings,
}

impl TaskStore {
    pub fn open(tasks_path: impl AsRef<Path>) -> Result<Self> {
        let tasks_path = tasks_path.as_ref().to_path_buf();
        let settings_path = derive_settings_path(&tasks_path);
        ensure_parent_dir(&tasks_path)?;

        let tasks = if tasks_path.exists() {
            let raw = fs::read_to_string(&tasks_path)
                .map_err(|e| DaybotError::Storage(format!("read {}: {e}", tasks_path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| DaybotError::Serialization(format!("{}: {e}", tasks_path.display())))?
        } else {
            Vec::new()
        };

        let settings = if settings_path.exists() {
            let raw = fs::read_to_string(&settings_path).map_err(|e| {
                DaybotError::Storage(format!("read {}: {e}", settings_path.display()))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                DaybotError::Serialization(format!("{}: {e}", settings_path.display()))
            })?
        } else {
            ChatSettings::default()
        };

        Ok(Self {
            tasks_path,
            settings_path,
            tasks,
            settings,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn add_task(
        &mut self,
        title: &str,
        priority: Priority,
        remind_at: Option<String>,
        now: &str,
    ) -> Result<Task> {
        let task = Task {
            id: new_task_id(),
            title: title.to_string(),
            priority,
            status: TaskStatus::Pending,
            remind_at,
            reminded_at: None,
            created_at: now.to_string(),
            completed_at: None,
        };
        self.tasks.push(task.clone());
        self.save()?;
        Ok(task)
    }

    pub fn list_tasks(&self, filter: TaskFilter) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| match filter {
                TaskFilter::Pending => t.status == TaskStatus::Pending,
                TaskFilter::Completed => t.status == TaskStatus::Completed,
                TaskFilter::All => true,
            })
            .cloned()
            .collect()
    }

    pub fn complete_task(&mut self, task_id: &str, now: &str) -> Result<Option<Task>> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            return Ok(None);
        };
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now.to_string());
        let task = task.clone();
        self.save()?;
        Ok(Some(task))
    }

    pub fn delete_task(&mut self, task_id: &str) -> Result<Option<Task>> {
        let Some(index) = self.tasks.iter().position(|t| t.id == task_id) else {
            return Ok(None);
        };
        let deleted = self.tasks.remove(index);
        self.save()?;
        Ok(Some(deleted))
    }

    /// Attach a reminder time. Clears `reminded_at` so the task becomes
    /// eligible again for the new value.
    pub fn set_reminder(&mut self, task_id: &str, remind_at: &str) -> Result<Option<Task>> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            return Ok(None);
        };
        task.remind_at = Some(remind_at.to_string());
        task.reminded_at = None;
        let task = task.clone();
        self.save()?;
        Ok(Some(task))
    }

    /// Record that the reminder fired. The fencepost that suppresses any
    /// further fire for the current `remind_at` value.
    pub fn mark_reminded(&mut self, task_id: &str, when: &str) -> Result<bool> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            return Ok(false);
        };
        task.reminded_at = Some(when.to_string());
        self.save()?;
        Ok(true)
    }

    pub fn clear_reminders(&mut self) -> Result<usize> {
        let mut cleared = 0;
        for task in &mut self.tasks {
            if task.remind_at.is_some() || task.reminded_at.is_some() {
                task.remind_at = None;
                task.reminded_at = None;
                cleared += 1;
            }
        }
        if cleared > 0 {
            self.save()?;
        }
        Ok(cleared)
    }

    pub fn summary(&self) -> TaskSummary {
        let pending: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let high_priority_pending = pending
            .iter()
            .filter(|t| t.priority == Priority::High)
            .count();
        TaskSummary {
            total: self.tasks.len(),
            pending: pending.len(),
            completed,
            high_priority_pending,
        }
    }

    pub fn get_daily_summary_time(&self) -> Option<&str> {
        self.settings.daily_summary_time.as_deref()
    }

    pub fn set_daily_summary_time(&mut self, value: Option<String>) -> Result<()> {
        self.settings.daily_summary_time = value;
        self.save_settings()
    }

    fn save(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.tasks)
            .map_err(|e| DaybotError::Serialization(e.to_string()))?;
        fs::write(&self.tasks_path, raw)
            .map_err(|e| DaybotError::Storage(format!("write {}: {e}", self.tasks_path.display())))
    }

    fn save_settings(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.settings)
            .map_err(|e| DaybotError::Serialization(e.to_string()))?;
        fs::write(&self.settings_path, raw).map_err(|e| {
            DaybotError::Storage(format!("write {}: {e}", self.settings_path.display()))
        })
    }
}

fn new_task_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn derive_settings_path(tasks_path: &Path) -> PathBuf {
    let stem = tasks_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match stem.strip_prefix("tasks_") {
        Some(suffix) => format!("settings_{suffix}.json"),
        None => "settings.json".to_string(),
    };
    tasks_path
        .parent()
        .map(|p| p.join(&name))
        .unwrap_or_else(|| PathBuf::from(name))
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| DaybotError::Storage(format!("create {}: {e}", parent.display())))?;
    }
    Ok(())
}
