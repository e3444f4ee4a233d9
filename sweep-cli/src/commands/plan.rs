//! `plan`: list generated tasks

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;
use sweep_core::Task;
use sweep_workflow::TaskGenerator;

use crate::context::Context;
use crate::output::{print_field, print_section, TableDisplay};

#[derive(Debug, Serialize)]
struct TaskDisplay {
    id: String,
    kind: String,
    traffic_value: Option<u32>,
    trial: u32,
    seed: u64,
}

impl From<&Task> for TaskDisplay {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id().to_string(),
            kind: task.kind.to_string(),
            traffic_value: task.traffic_value,
            trial: task.trial,
            seed: task.seed,
        }
    }
}

impl TaskDisplay {
    fn value_label(&self) -> String {
        self.traffic_value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

impl TableDisplay for TaskDisplay {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(&self.id),
            Cell::new(&self.kind),
            Cell::new(self.value_label()),
            Cell::new(self.trial),
            Cell::new(self.seed),
        ]
    }

    fn display_single(&self) {
        print_section("Task");
        print_field("ID", &self.id);
        print_field("Kind", &self.kind);
        print_field("Traffic value", &self.value_label());
        print_field("Trial", &self.trial.to_string());
        print_field("Seed", &self.seed.to_string());
    }

    fn display_compact(&self) {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            self.id,
            self.kind,
            self.value_label(),
            self.trial,
            self.seed
        );
    }
}

pub fn execute(ctx: &Context) -> Result<()> {
    let tasks = TaskGenerator::new(&ctx.config.sweep).generate()?;
    let rows: Vec<TaskDisplay> = tasks.iter().map(Into::into).collect();

    ctx.output
        .write_list(&rows, &["ID", "Kind", "Value", "Trial", "Seed"])?;

    if ctx.output.is_table() {
        ctx.output.info(&format!(
            "{} worker slot(s), outputs under {}",
            ctx.config.execution.effective_max_jobs(),
            ctx.config.paths.output_dir.display()
        ));
    }
    Ok(())
}
