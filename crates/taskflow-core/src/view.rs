use std::collections::BTreeSet;

use tracing::trace;

use crate::task::{
  Category,
  Priority,
  Status,
  Task
};

#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub enum CategoryScope {
  #[default]
  All,
  Category(String)
}

impl CategoryScope {
  pub fn includes(
    &self,
    task: &Task
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Category(id) => {
        task.category_id == *id
      }
    }
  }

  /// Falls back to `All` when the scoped
  /// category is gone.
  pub fn retain(
    &mut self,
    categories: &[Category]
  ) {
    if let Self::Category(id) = self
      && !categories
        .iter()
        .any(|c| c.id == *id)
    {
      trace!(category_id = %id, "scoped category vanished; widening to all");
      *self = Self::All;
    }
  }

  pub fn heading(
    &self,
    categories: &[Category]
  ) -> String {
    match self {
      | Self::All => {
        "All Tasks".to_string()
      }
      | Self::Category(id) => categories
        .iter()
        .find(|c| c.id == *id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| {
          "Tasks".to_string()
        })
    }
  }
}

/// Status and priority constraints. An
/// empty set places no constraint on its
/// dimension.
#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub struct Filters {
  pub status:   BTreeSet<Status>,
  pub priority: BTreeSet<Priority>
}

impl Filters {
  pub fn is_empty(&self) -> bool {
    self.status.is_empty()
      && self.priority.is_empty()
  }

  pub fn toggle_status(
    &mut self,
    status: Status
  ) {
    if !self.status.remove(&status) {
      self.status.insert(status);
    }
  }

  pub fn toggle_priority(
    &mut self,
    priority: Priority
  ) {
    if !self.priority.remove(&priority) {
      self.priority.insert(priority);
    }
  }

  pub fn clear(&mut self) {
    self.status.clear();
    self.priority.clear();
  }

  fn admits(
    &self,
    task: &Task
  ) -> bool {
    (self.status.is_empty()
      || self.status.contains(&task.status()))
      && (self.priority.is_empty()
        || self
          .priority
          .contains(&task.priority))
  }
}

/// Everything the task list is derived
/// from, besides the tasks themselves.
#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub struct ViewQuery {
  pub filters: Filters,
  pub search:  String,
  pub scope:   CategoryScope
}

impl ViewQuery {
  pub fn derive<'a>(
    &self,
    tasks: &'a [Task]
  ) -> Vec<&'a Task> {
    derive(
      tasks,
      &self.filters,
      &self.search,
      &self.scope
    )
  }
}

/// Scope, then status, then priority, then
/// title search; the survivors are sorted
/// High → Medium → Low. The sort is stable,
/// so equal priorities keep their input
/// order.
#[tracing::instrument(skip(
  tasks, filters
))]
pub fn derive<'a>(
  tasks: &'a [Task],
  filters: &Filters,
  search: &str,
  scope: &CategoryScope
) -> Vec<&'a Task> {
  let needle = search.to_lowercase();

  let mut out: Vec<&Task> = tasks
    .iter()
    .filter(|task| scope.includes(task))
    .filter(|task| filters.admits(task))
    .filter(|task| {
      needle.is_empty()
        || task
          .title
          .to_lowercase()
          .contains(&needle)
    })
    .collect();

  out.sort_by_key(|task| {
    task.priority.rank()
  });

  trace!(
    input = tasks.len(),
    output = out.len(),
    "derived task view"
  );
  out
}

/// The derived list split for display.
/// Both halves keep the derived order.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroups<'a> {
  pub pending:        Vec<&'a Task>,
  pub completed:      Vec<&'a Task>,
  pub show_completed: bool
}

impl TaskGroups<'_> {
  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
      && self.completed.is_empty()
  }
}

pub fn group(
  derived: Vec<&Task>
) -> TaskGroups<'_> {
  let (completed, pending) = derived
    .into_iter()
    .partition(|task| task.completed);

  TaskGroups {
    pending,
    completed,
    show_completed: false
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn task(
    id: &str,
    title: &str,
    priority: Priority,
    completed: bool,
    category: &str
  ) -> Task {
    Task {
      id: id.to_string(),
      title: title.to_string(),
      priority,
      due_date: None,
      category_id: category.to_string(),
      completed
    }
  }

  fn ids(tasks: &[&Task]) -> Vec<String> {
    tasks
      .iter()
      .map(|t| t.id.clone())
      .collect()
  }

  fn pair() -> Vec<Task> {
    vec![
      task(
        "1",
        "A",
        Priority::Low,
        false,
        "c1"
      ),
      task(
        "2",
        "B",
        Priority::High,
        true,
        "c1"
      ),
    ]
  }

  fn sample() -> Vec<Task> {
    vec![
      task("t1", "Finish Q2 financial report", Priority::High, false, "l1"),
      task("t2", "Schedule team meeting", Priority::Medium, false, "l1"),
      task("t3", "Review project proposal", Priority::Low, true, "l1"),
      task("t4", "Call the dentist", Priority::High, false, "l2"),
      task("t5", "Pay electricity bill", Priority::Medium, false, "l2"),
      task("t6", "Buy milk and eggs", Priority::Low, true, "l3"),
      task("t7", "Get a birthday gift for Sarah", Priority::High, false, "l3"),
    ]
  }

  #[test]
  fn unfiltered_view_orders_by_priority()
  {
    let tasks = pair();
    let out = derive(
      &tasks,
      &Filters::default(),
      "",
      &CategoryScope::All
    );
    assert_eq!(ids(&out), vec!["2", "1"]);
  }

  #[test]
  fn pending_status_keeps_only_open_tasks()
   {
    let tasks = pair();
    let mut filters = Filters::default();
    filters.toggle_status(Status::Pending);
    let out = derive(
      &tasks,
      &filters,
      "",
      &CategoryScope::All
    );
    assert_eq!(ids(&out), vec!["1"]);
  }

  #[test]
  fn full_sets_behave_like_empty_sets()
  {
    let tasks = sample();
    let all = Filters {
      status:   [
        Status::Completed,
        Status::Pending
      ]
      .into_iter()
      .collect(),
      priority: Priority::ALL
        .into_iter()
        .collect()
    };

    let constrained = derive(
      &tasks,
      &all,
      "",
      &CategoryScope::All
    );
    let unconstrained = derive(
      &tasks,
      &Filters::default(),
      "",
      &CategoryScope::All
    );
    assert_eq!(
      ids(&constrained),
      ids(&unconstrained)
    );
    assert_eq!(unconstrained.len(), 7);
  }

  #[test]
  fn equal_priorities_keep_input_order()
  {
    let tasks = sample();
    let out = derive(
      &tasks,
      &Filters::default(),
      "",
      &CategoryScope::All
    );
    assert_eq!(
      ids(&out),
      vec![
        "t1", "t4", "t7", "t2", "t5",
        "t3", "t6"
      ]
    );

    let mut reversed = sample();
    reversed.reverse();
    let out = derive(
      &reversed,
      &Filters::default(),
      "",
      &CategoryScope::All
    );
    assert_eq!(
      ids(&out),
      vec![
        "t7", "t4", "t1", "t5", "t2",
        "t6", "t3"
      ]
    );
  }

  #[test]
  fn derive_is_idempotent() {
    let tasks = sample();
    let mut query = ViewQuery::default();
    query
      .filters
      .toggle_priority(Priority::High);
    query
      .filters
      .toggle_priority(Priority::Low);
    query.search = "e".to_string();

    let once: Vec<Task> = query
      .derive(&tasks)
      .into_iter()
      .cloned()
      .collect();
    let twice = query.derive(&once);
    assert_eq!(
      ids(&twice),
      once
        .iter()
        .map(|t| t.id.clone())
        .collect::<Vec<_>>()
    );
  }

  #[test]
  fn search_ignores_case_and_only_reads_titles()
   {
    let tasks = vec![
      task("m", "Buy Milk", Priority::Low, false, "milk"),
      task("x", "Walk dog", Priority::Low, false, "milk"),
    ];
    let out = derive(
      &tasks,
      &Filters::default(),
      "milk",
      &CategoryScope::All
    );
    assert_eq!(ids(&out), vec!["m"]);

    let out = derive(
      &tasks,
      &Filters::default(),
      "MILK",
      &CategoryScope::All
    );
    assert_eq!(ids(&out), vec!["m"]);
  }

  #[test]
  fn scope_and_filters_compose() {
    let tasks = sample();
    let mut filters = Filters::default();
    filters.toggle_status(Status::Pending);
    let out = derive(
      &tasks,
      &filters,
      "",
      &CategoryScope::Category(
        "l1".to_string()
      )
    );
    assert_eq!(ids(&out), vec!["t1", "t2"]);
  }

  #[test]
  fn toggling_twice_clears_a_constraint()
  {
    let mut filters = Filters::default();
    filters.toggle_priority(Priority::Medium);
    assert!(!filters.is_empty());
    filters.toggle_priority(Priority::Medium);
    assert!(filters.is_empty());

    filters.toggle_status(Status::Completed);
    filters.clear();
    assert_eq!(filters, Filters::default());
  }

  #[test]
  fn grouping_preserves_derived_order()
  {
    let tasks = sample();
    let derived = derive(
      &tasks,
      &Filters::default(),
      "",
      &CategoryScope::All
    );
    let groups = group(derived);
    assert_eq!(
      ids(&groups.pending),
      vec!["t1", "t4", "t7", "t2", "t5"]
    );
    assert_eq!(
      ids(&groups.completed),
      vec!["t3", "t6"]
    );
    assert!(!groups.show_completed);
  }

  #[test]
  fn scope_widens_when_category_disappears()
   {
    let categories = vec![Category {
      id:   "l1".to_string(),
      name: "Work".to_string()
    }];
    let mut scope = CategoryScope::Category(
      "l2".to_string()
    );
    scope.retain(&categories);
    assert_eq!(scope, CategoryScope::All);
    assert_eq!(
      scope.heading(&categories),
      "All Tasks"
    );

    let scope = CategoryScope::Category(
      "l1".to_string()
    );
    assert_eq!(
      scope.heading(&categories),
      "Work"
    );
  }
}
