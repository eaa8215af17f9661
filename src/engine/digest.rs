use serde::Serialize;

use crate::tasks::{Task, TaskStatus};

/// Snapshot handed to the notification sink when a daily digest fires.
///
/// Pending tasks only, high priority first, insertion order within a
/// priority band.
#[derive(Debug, Clone, Serialize)]
pub struct DigestSummary {
    pub pending: usize,
    pub high_pending: usize,
    pub tasks: Vec<Task>,
}

impl DigestSummary {
    pub fn build(tasks: &[Task]) -> Self {
        let mut pending: Vec<Task> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        // Stable sort keeps insertion order within a priority band.
        pending.sort_by_key(|t| t.priority.rank());
        let high_pending = pending
            .iter()
            .filter(|t| t.priority == crate::tasks::Priority::High)
            .count();
        Self {
            pending: pending.len(),
            high_pending,
            tasks: pending,
        }
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            "Daily summary".to_string(),
            format!("Pending: {} (High: {})", self.pending, self.high_pending),
        ];
        for task in &self.tasks {
            lines.push(format!("- [{}] {}", task.priority.label(), task.title));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Priority;

    fn task(id: &str, title: &str, priority: Priority, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            priority,
            status,
            remind_at: None,
            reminded_at: None,
            created_at: "2024-01-01T08:00:00".to_string(),
            completed_at: None,
        }
    }

    #[test]
    fn sorts_by_priority_with_insertion_order_ties() {
        let tasks = vec![
            task("a", "low one", Priority::Low, TaskStatus::Pending),
            task("b", "high one", Priority::High, TaskStatus::Pending),
            task("c", "med one", Priority::Medium, TaskStatus::Pending),
            task("d", "high two", Priority::High, TaskStatus::Pending),
            task("e", "done", Priority::High, TaskStatus::Completed),
        ];
        let digest = DigestSummary::build(&tasks);
        assert_eq!(digest.pending, 4);
        assert_eq!(digest.high_pending, 2);
        let ids: Vec<&str> = digest.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn renders_labels_and_counts() {
        let tasks = vec![
            task("a", "Ship release", Priority::High, TaskStatus::Pending),
            task("b", "Water plants", Priority::Low, TaskStatus::Pending),
        ];
        let rendered = DigestSummary::build(&tasks).render();
        assert_eq!(
            rendered,
            "Daily summary\nPending: 2 (High: 1)\n- [HIGH] Ship release\n- [LOW] Water plants"
        );
    }
}
