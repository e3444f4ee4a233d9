//! `run`: execute the campaign

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use std::sync::Arc;
use sweep_core::{CampaignReport, RunResult};
use sweep_workflow::{Campaign, ProcessToolRunner, TaskEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::config::Overrides;
use crate::context::Context;
use crate::output::{
    format_duration_ms, format_timestamp, format_uuid_short, print_field, print_section,
    status_badge, TableDisplay,
};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Maximum number of tasks running at once (default: logical CPUs)
    #[arg(short = 'j', long)]
    pub max_jobs: Option<usize>,

    /// Per-task time budget in seconds
    #[arg(long)]
    pub task_timeout: Option<u64>,
}

impl RunArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            max_jobs: self.max_jobs,
            task_timeout_secs: self.task_timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportDisplay<'a> {
    #[serde(flatten)]
    report: &'a CampaignReport,
    succeeded: usize,
    failed: usize,
    tool_invocations: usize,
}

impl<'a> From<&'a CampaignReport> for ReportDisplay<'a> {
    fn from(report: &'a CampaignReport) -> Self {
        Self {
            report,
            succeeded: report.succeeded().count(),
            failed: report.failed().count(),
            tool_invocations: report.tool_invocations(),
        }
    }
}

impl TableDisplay for ReportDisplay<'_> {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(format_uuid_short(&self.report.run_id)),
            Cell::new(self.succeeded),
            Cell::new(self.failed),
            Cell::new(format_duration_ms(self.report.duration_ms().max(0) as u64)),
        ]
    }

    fn display_single(&self) {
        print_section("Campaign");
        print_field("Run", &self.report.run_id.to_string());
        print_field("Started", &format_timestamp(&self.report.started_at));
        print_field(
            "Duration",
            &format_duration_ms(self.report.duration_ms().max(0) as u64),
        );
        print_field("Tasks", &self.report.total().to_string());
        print_field("Succeeded", &self.succeeded.to_string());
        print_field("Failed", &self.failed.to_string());
        print_field("Tool invocations", &self.tool_invocations.to_string());
        print_field(
            "Concurrency",
            &format!("peak {} of {}", self.report.peak_running, self.report.max_jobs),
        );
    }

    fn display_compact(&self) {
        println!(
            "{}\t{}\t{}\t{}",
            self.report.run_id, self.succeeded, self.failed, self.tool_invocations
        );
    }
}

#[derive(Debug, Serialize)]
struct FailureDisplay {
    task: String,
    kind: String,
    detail: String,
}

impl From<&RunResult> for FailureDisplay {
    fn from(result: &RunResult) -> Self {
        Self {
            task: result.task_id.to_string(),
            kind: result.error_kind.clone().unwrap_or_default(),
            detail: result.error_detail.clone().unwrap_or_default(),
        }
    }
}

impl TableDisplay for FailureDisplay {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(&self.task),
            Cell::new(status_badge(&self.kind)),
            Cell::new(&self.detail),
        ]
    }

    fn display_single(&self) {
        print_section(&format!("Failure {}", self.task));
        print_field("Kind", &self.kind);
        print_field("Detail", &self.detail);
    }

    fn display_compact(&self) {
        println!("{}\t{}\t{}", self.task, self.kind, self.detail);
    }
}

pub async fn execute(ctx: &Context, _args: RunArgs) -> Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; stopping admission and killing running tools");
                cancel.cancel();
            }
        }
    });

    let campaign = Campaign::new(Arc::clone(&ctx.config), Arc::new(ProcessToolRunner::new()))
        .with_cancellation(cancel);
    let total = ctx.config.sweep.task_count() as u64;
    let progress = ctx.output.progress_bar(total, "starting");
    let mut events = campaign.subscribe();

    let tracker = tokio::spawn({
        let progress = progress.clone();
        async move {
            loop {
                match events.recv().await {
                    Ok(TaskEvent::Started { task_id, running }) => {
                        if let Some(pb) = &progress {
                            pb.set_message(format!("{} ({} running)", task_id, running));
                        }
                    }
                    Ok(TaskEvent::Finished { .. }) => {
                        if let Some(pb) = &progress {
                            pb.inc(1);
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }
    });

    let outcome = campaign.execute().await;
    drop(campaign);
    let _ = tracker.await;
    interrupt.abort();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let report = outcome?;
    ctx.output.write(&ReportDisplay::from(&report))?;

    // JSON/YAML output already carries every result.
    let failures: Vec<FailureDisplay> = report.failed().map(Into::into).collect();
    if ctx.output.is_table() && ctx.verbose && !failures.is_empty() {
        ctx.output
            .write_list(&failures, &["Task", "Kind", "Detail"])?;
    }

    match report.ensure_success() {
        Ok(()) => {
            ctx.output.success(&format!(
                "All {} task(s) succeeded; report at {}",
                report.total(),
                ctx.config.paths.report_path().display()
            ));
            Ok(())
        }
        Err(err) => {
            if ctx.output.is_table() && !ctx.verbose {
                for failure in &failures {
                    ctx.output
                        .error(&format!("{}: {}", failure.task, failure.detail));
                }
            }
            Err(err.into())
        }
    }
}
