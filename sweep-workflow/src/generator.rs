use std::collections::BTreeMap;
use sweep_core::{CoreError, Result, SweepConfig, Task, TaskId};

/// Expands the sweep grid into the ordered, immutable task list.
#[derive(Debug, Clone)]
pub struct TaskGenerator<'a> {
    sweep: &'a SweepConfig,
}

impl<'a> TaskGenerator<'a> {
    pub fn new(sweep: &'a SweepConfig) -> Self {
        Self { sweep }
    }

    /// Baseline trials first, then every traffic value in ascending order
    /// with its trials ascending.
    pub fn tasks(&self) -> Vec<Task> {
        let base = self.sweep.base_seed;
        let mut tasks = Vec::with_capacity(self.sweep.task_count());

        tasks.extend((1..=self.sweep.baseline_trials).map(|trial| Task::baseline(trial, base)));

        let mut values = self.sweep.traffic_values.clone();
        values.sort_unstable();
        values.dedup();
        for value in values {
            tasks.extend(
                (1..=self.sweep.trials_per_value).map(|trial| Task::mixed(value, trial, base)),
            );
        }

        tasks
    }

    /// Seeds shared by more than one task, with the tasks sharing them.
    pub fn seed_collisions(tasks: &[Task]) -> BTreeMap<u64, Vec<TaskId>> {
        let mut by_seed: BTreeMap<u64, Vec<TaskId>> = BTreeMap::new();
        for task in tasks {
            by_seed.entry(task.seed).or_default().push(task.id());
        }
        by_seed.retain(|_, ids| ids.len() > 1);
        by_seed
    }

    /// Generate the task list, refusing a grid whose seeds collide unless
    /// collisions were explicitly allowed.
    pub fn generate(&self) -> Result<Vec<Task>> {
        let tasks = self.tasks();
        if tasks.is_empty() {
            return Err(CoreError::Validation("sweep produces no tasks".to_string()));
        }

        let collisions = Self::seed_collisions(&tasks);
        if let Some((seed, ids)) = collisions.iter().next() {
            let listed = ids.iter().map(TaskId::to_string).collect::<Vec<_>>().join(", ");
            if self.sweep.allow_seed_collisions {
                tracing::warn!(
                    "{} seed(s) shared between tasks, e.g. seed {} used by {}",
                    collisions.len(),
                    seed,
                    listed
                );
            } else {
                return Err(CoreError::Validation(format!(
                    "seed {} is shared by {}; adjust base_seed or set allow_seed_collisions",
                    seed, listed
                )));
            }
        }

        tracing::info!("Generated {} task(s)", tasks.len());
        Ok(tasks)
    }
}
