use tracing::{debug, info};

use crate::error::SyncError;
use crate::gateway::Gateway;
use crate::task::{Category, NewTask, Task};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Tasks,
    Categories,
}

/// How the cache is brought back in line with the server once a mutation
/// has succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Replace the collection with a fresh copy from the server.
    Refetch(Collection),
    /// Drop the entity locally; with `cascade`, also drop the tasks that
    /// referenced it.
    LocalRemoval { cascade: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    CreateTask,
    UpdateTask,
    ToggleTask,
    DeleteTask,
    CreateCategory,
    DeleteCategory,
}

impl Mutation {
    pub const fn reconcile(self) -> Reconcile {
        match self {
            Self::CreateTask | Self::UpdateTask | Self::ToggleTask => {
                Reconcile::Refetch(Collection::Tasks)
            }
            Self::CreateCategory => Reconcile::Refetch(Collection::Categories),
            Self::DeleteTask => Reconcile::LocalRemoval { cascade: false },
            Self::DeleteCategory => Reconcile::LocalRemoval { cascade: true },
        }
    }
}

/// The local copy of the user's tasks and categories.
///
/// Every mutation is pessimistic: the cache changes only after the server
/// accepted the change (and, where the strategy says so, after the refetch
/// succeeded). A failed call leaves both collections untouched.
#[derive(Debug)]
pub struct EntityStore<T> {
    gateway: Gateway<T>,
    tasks: Vec<Task>,
    categories: Vec<Category>,
}

impl<T: Transport> EntityStore<T> {
    pub fn new(gateway: Gateway<T>) -> Self {
        Self {
            gateway,
            tasks: Vec::new(),
            categories: Vec::new(),
        }
    }

    pub fn gateway(&self) -> &Gateway<T> {
        &self.gateway
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn category_name(&self, id: &str) -> Option<&str> {
        self.category(id).map(|category| category.name.as_str())
    }

    /// Fetches both collections concurrently and replaces the cache only if
    /// both arrived.
    #[tracing::instrument(skip(self))]
    pub async fn load_all(&mut self) -> Result<(), SyncError> {
        let (tasks, categories) = tokio::try_join!(
            self.gateway.fetch_tasks(),
            self.gateway.fetch_categories()
        )?;

        info!(
            tasks = tasks.len(),
            categories = categories.len(),
            "loaded tasks and categories"
        );
        self.tasks = tasks;
        self.categories = categories;
        Ok(())
    }

    #[tracing::instrument(skip(self, task), fields(category_id = %task.category_id))]
    pub async fn create_task(&mut self, task: &NewTask) -> Result<(), SyncError> {
        self.gateway.create_task(task).await?;
        self.reconcile(Mutation::CreateTask, None).await
    }

    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn update_task(&mut self, task: &Task) -> Result<(), SyncError> {
        if self.task(&task.id).is_none() {
            return Err(SyncError::UnknownTask(task.id.clone()));
        }
        self.gateway.replace_task(task).await?;
        self.reconcile(Mutation::UpdateTask, None).await
    }

    /// Flips the completion flag of a cached task and writes the whole task
    /// back.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_task(&mut self, id: &str) -> Result<(), SyncError> {
        let mut toggled = self
            .task(id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownTask(id.to_string()))?;
        toggled.completed = !toggled.completed;
        debug!(completed = toggled.completed, "toggling task");

        self.gateway.replace_task(&toggled).await?;
        self.reconcile(Mutation::ToggleTask, None).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&mut self, id: &str) -> Result<(), SyncError> {
        self.gateway.delete_task(id).await?;
        self.reconcile(Mutation::DeleteTask, Some(id)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_category(&mut self, name: &str) -> Result<(), SyncError> {
        self.gateway.create_category(name).await?;
        self.reconcile(Mutation::CreateCategory, None).await
    }

    /// Deletes the category and, locally, every task filed under it. The
    /// server performs the same cascade on its side.
    #[tracing::instrument(skip(self))]
    pub async fn delete_category(&mut self, id: &str) -> Result<(), SyncError> {
        self.gateway.delete_category(id).await?;
        self.reconcile(Mutation::DeleteCategory, Some(id)).await
    }

    async fn reconcile(&mut self, mutation: Mutation, removed: Option<&str>) -> Result<(), SyncError> {
        match mutation.reconcile() {
            Reconcile::Refetch(Collection::Tasks) => {
                self.tasks = self.gateway.fetch_tasks().await?;
            }
            Reconcile::Refetch(Collection::Categories) => {
                self.categories = self.gateway.fetch_categories().await?;
            }
            Reconcile::LocalRemoval { cascade } => {
                let Some(id) = removed else {
                    return Ok(());
                };
                if cascade {
                    self.categories.retain(|category| category.id != id);
                    let before = self.tasks.len();
                    self.tasks.retain(|task| task.category_id != id);
                    info!(
                        category_id = id,
                        removed_tasks = before - self.tasks.len(),
                        "removed category and its tasks"
                    );
                } else {
                    self.tasks.retain(|task| task.id != id);
                }
            }
        }
        debug!(?mutation, "reconciled cache");
        Ok(())
    }
}
