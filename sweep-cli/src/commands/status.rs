//! `status`: dry-run classification of every task's artifacts

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use std::sync::Arc;
use sweep_workflow::{Campaign, ProcessToolRunner, TaskInspection};

use crate::context::Context;
use crate::output::{print_field, print_list_field, print_section, status_badge, TableDisplay};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Only list tasks that still have stages to run
    #[arg(long)]
    pub pending: bool,
}

#[derive(Debug, Serialize)]
struct TaskStatusDisplay {
    id: String,
    status: String,
    pending_stages: Vec<String>,
    invalid_artifacts: Vec<String>,
    #[serde(skip)]
    inspection: TaskInspection,
}

impl From<TaskInspection> for TaskStatusDisplay {
    fn from(inspection: TaskInspection) -> Self {
        let invalid_artifacts = inspection
            .stages
            .iter()
            .flat_map(|s| &s.artifacts)
            .filter(|a| !a.state.is_valid() && !a.state.is_absent())
            .map(|a| a.path.display().to_string())
            .collect();

        Self {
            id: inspection.task_id.to_string(),
            status: if inspection.is_complete() {
                "complete".to_string()
            } else {
                "pending".to_string()
            },
            pending_stages: inspection
                .pending_stages()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            invalid_artifacts,
            inspection,
        }
    }
}

impl TableDisplay for TaskStatusDisplay {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(&self.id),
            Cell::new(status_badge(&self.status)),
            Cell::new(self.pending_stages.join(", ")),
            Cell::new(self.invalid_artifacts.len()),
        ]
    }

    fn display_single(&self) {
        print_section(&format!("Task {}", self.id));
        print_field("Status", &status_badge(&self.status));
        for stage in &self.inspection.stages {
            for artifact in &stage.artifacts {
                print_field(
                    &stage.stage.to_string(),
                    &format!(
                        "{} ({})",
                        artifact.path.display(),
                        status_badge(artifact.state.label())
                    ),
                );
            }
        }
        print_list_field("Invalid", &self.invalid_artifacts);
    }

    fn display_compact(&self) {
        println!("{}\t{}\t{}", self.id, self.status, self.pending_stages.join(","));
    }
}

pub async fn execute(ctx: &Context, args: StatusArgs) -> Result<()> {
    // Inspection never invokes the runner.
    let campaign = Campaign::new(Arc::clone(&ctx.config), Arc::new(ProcessToolRunner::new()));
    let inspections = campaign.inspect().await?;

    let total = inspections.len();
    let complete = inspections.iter().filter(|i| i.is_complete()).count();

    let rows: Vec<TaskStatusDisplay> = inspections
        .into_iter()
        .filter(|i| !args.pending || !i.is_complete())
        .map(Into::into)
        .collect();

    ctx.output
        .write_list(&rows, &["Task", "Status", "Pending stages", "Invalid"])?;
    ctx.output
        .info(&format!("{} of {} task(s) complete", complete, total));
    Ok(())
}
