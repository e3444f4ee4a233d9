//! `inventory`: published simulation outputs grouped by traffic value

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;
use sweep_workflow::{OutputInventory, ValueInventory};

use crate::context::Context;
use crate::output::{print_field, print_section, status_badge, TableDisplay};

#[derive(Debug, Serialize)]
struct ValueDisplay {
    traffic_value: u32,
    sim_outputs: usize,
    stop_events: usize,
    complete_trials: usize,
    expected_trials: u32,
    status: String,
}

impl ValueDisplay {
    fn new(value: &ValueInventory, expected_trials: u32) -> Self {
        let complete_trials = value.complete_trials();
        Self {
            traffic_value: value.traffic_value,
            sim_outputs: value.sim_output_trials.len(),
            stop_events: value.stop_event_trials.len(),
            complete_trials,
            expected_trials,
            status: if complete_trials >= expected_trials as usize {
                "complete".to_string()
            } else {
                "incomplete".to_string()
            },
        }
    }
}

impl TableDisplay for ValueDisplay {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(self.traffic_value),
            Cell::new(self.sim_outputs),
            Cell::new(self.stop_events),
            Cell::new(format!("{}/{}", self.complete_trials, self.expected_trials)),
            Cell::new(status_badge(&self.status)),
        ]
    }

    fn display_single(&self) {
        print_section(&format!("Traffic value {}", self.traffic_value));
        print_field("Simulation outputs", &self.sim_outputs.to_string());
        print_field("Stop events", &self.stop_events.to_string());
        print_field(
            "Complete trials",
            &format!("{}/{}", self.complete_trials, self.expected_trials),
        );
    }

    fn display_compact(&self) {
        println!(
            "{}\t{}\t{}\t{}",
            self.traffic_value, self.complete_trials, self.expected_trials, self.status
        );
    }
}

pub fn execute(ctx: &Context) -> Result<()> {
    let inventory = OutputInventory::scan(&ctx.config)?;
    let rows: Vec<ValueDisplay> = inventory
        .values
        .values()
        .map(|v| ValueDisplay::new(v, inventory.expected_trials))
        .collect();

    ctx.output.write_list(
        &rows,
        &["Value", "Sim outputs", "Stop events", "Trials", "Status"],
    )?;

    ctx.output.info(&format!(
        "Baseline: {}/{} trial(s) in {}",
        inventory.baseline_trials.len(),
        inventory.expected_baseline_trials,
        inventory.sim_dir.display()
    ));

    let incomplete = inventory.incomplete_values();
    if !incomplete.is_empty() {
        let listed: Vec<String> = incomplete.iter().map(u32::to_string).collect();
        ctx.output.warning(&format!(
            "Values with missing trials: {}",
            listed.join(", ")
        ));
    }
    if !inventory.stray_temps.is_empty() {
        ctx.output.warning(&format!(
            "{} leftover temp file(s) from an interrupted run",
            inventory.stray_temps.len()
        ));
    }
    Ok(())
}
