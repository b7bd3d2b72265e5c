//! In-process filtering and sorting over `TaskStore::list` output.
//!
//! A deliberate simplicity/scale tradeoff: listing is index-driven, the
//! passes below are linear in the owner's own task count. Acceptable to
//! around 10,000 tasks per owner.

use chrono::{DateTime, Utc};
use tasknest_core::{Priority, Task};

/// Filter applied over an owner's listed tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    /// Tag membership; matched against the normalized (lowercase) set.
    pub tag: Option<String>,
    pub due_after: Option<DateTime<Utc>>,
    pub due_before: Option<DateTime<Utc>>,
    /// Case-insensitive substring over title and description.
    pub text: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(completed) = self.completed
            && task.completed != completed
        {
            return false;
        }
        if let Some(priority) = self.priority
            && task.priority != priority
        {
            return false;
        }
        if let Some(tag) = &self.tag {
            let tag = tag.trim().to_lowercase();
            if !task.tags.iter().any(|t| *t == tag) {
                return false;
            }
        }
        if self.due_after.is_some() || self.due_before.is_some() {
            let Some(due) = task.due_at else { return false };
            if let Some(after) = self.due_after
                && due < after
            {
                return false;
            }
            if let Some(before) = self.due_before
                && due > before
            {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let haystack = format!(
                "{} {}",
                task.title.to_lowercase(),
                task.description.to_lowercase()
            );
            if !haystack.contains(&needle) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, tasks: Vec<Task>) -> Vec<Task> {
        tasks.into_iter().filter(|t| self.matches(t)).collect()
    }
}

/// Sort order for listed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSort {
    /// Earliest due first; tasks without a due date last.
    DueDate,
    /// High priority first.
    Priority,
    /// Newest first.
    Created,
}

impl TaskSort {
    pub fn apply(&self, tasks: &mut [Task]) {
        match self {
            TaskSort::DueDate => tasks.sort_by_key(|t| t.due_at.unwrap_or(DateTime::<Utc>::MAX_UTC)),
            TaskSort::Priority => tasks.sort_by(|a, b| b.priority.cmp(&a.priority)),
            TaskSort::Created => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
    }
}

impl std::str::FromStr for TaskSort {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "due" => Ok(TaskSort::DueDate),
            "priority" => Ok(TaskSort::Priority),
            "created" => Ok(TaskSort::Created),
            _ => Err(()),
        }
    }
}
