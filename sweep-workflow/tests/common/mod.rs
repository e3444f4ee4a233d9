#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sweep_core::{CampaignConfig, StageError, TaskId};
use sweep_workflow::{ToolInvocation, ToolOutput, ToolRunner};
use tempfile::TempDir;

// ===== Sandbox =====

pub struct Sandbox {
    pub dir: TempDir,
    pub config: CampaignConfig,
}

impl Sandbox {
    /// Inputs in `<tmp>/inputs`, outputs in `<tmp>/outputs`, two worker slots.
    pub fn new(values: &[u32], trials: u32, baseline: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let inputs = dir.path().join("inputs");
        fs::create_dir_all(&inputs).unwrap();

        fs::write(inputs.join("network.net.xml"), xml_document("net", "edge", 40)).unwrap();
        fs::write(inputs.join("zones.taz.xml"), xml_document("tazs", "taz", 5)).unwrap();
        fs::write(inputs.join("pt_routes.rou.xml"), xml_document("routes", "vehicle", 5)).unwrap();
        let stops = xml_document("additional", "busStop", 5);
        fs::write(inputs.join("pt_stops.add.xml"), stops).unwrap();
        fs::write(
            inputs.join("od_template.od"),
            "$OR;D2\n* From-Time  To-Time\n0.00 1.00\n* Factor\n1.00\n1 2 {{TRAFFIC_VALUE}}\n",
        )
        .unwrap();

        let mut config = CampaignConfig::default();
        config.sweep.traffic_values = values.to_vec();
        config.sweep.trials_per_value = trials;
        config.sweep.baseline_trials = baseline;
        config.execution.max_jobs = Some(2);
        config.naming.city = "Testville".to_string();
        config.paths.output_dir = dir.path().join("outputs");
        config.paths.network = inputs.join("network.net.xml");
        config.paths.taz = inputs.join("zones.taz.xml");
        config.paths.matrix_template = inputs.join("od_template.od");
        config.paths.pt_routes = inputs.join("pt_routes.rou.xml");
        config.paths.pt_additionals = vec![inputs.join("pt_stops.add.xml")];

        Self { dir, config }
    }

    pub fn config(&self) -> Arc<CampaignConfig> {
        Arc::new(self.config.clone().validated().unwrap())
    }

    pub fn outputs(&self) -> PathBuf {
        self.config.paths.output_dir.clone()
    }

    /// Every file under the output directory except the report, with bytes.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let report = self.config.paths.report_path();
        files_under(&self.outputs())
            .into_iter()
            .filter(|p| *p != report)
            .map(|p| {
                let bytes = fs::read(&p).unwrap();
                (p, bytes)
            })
            .collect()
    }

    pub fn temp_files(&self) -> Vec<PathBuf> {
        files_under(&self.outputs())
            .into_iter()
            .filter(|p| p.to_string_lossy().ends_with(".tmp"))
            .collect()
    }
}

pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return files;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files.sort();
    files
}

pub fn xml_document(root: &str, child: &str, entries: usize) -> String {
    let mut doc = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<{}>\n", root);
    for i in 0..entries {
        doc.push_str(&format!(
            "    <{} id=\"{}_{}\" depart=\"{}.00\" arrival=\"{}.00\"/>\n",
            child,
            child,
            i,
            i * 10,
            i * 10 + 7
        ));
    }
    doc.push_str(&format!("</{}>\n", root));
    doc
}

// ===== Scripted tool runner =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Write well-formed outputs and exit 0.
    Succeed,
    /// Exit with the given code without writing anything.
    Exit(i32),
    /// Exit 0 but leave a document cut off mid-element.
    Truncate,
    /// Exit 0 and write nothing.
    WriteNothing,
    /// Exit 0 with well-formed outputs, except that outputs whose path
    /// contains the fragment get a tiny (still well-formed) document.
    BreakOutput(&'static str),
    /// Never finish.
    Hang,
}

struct Rule {
    stage: String,
    needle: String,
    behavior: Behavior,
}

/// In-memory stand-in for the external toolchain.
pub struct ScriptedToolRunner {
    delay: Duration,
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<ToolInvocation>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedToolRunner {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Apply `behavior` to invocations of `stage` whose output path contains
    /// `needle`, e.g. `"_1000_2"` or `"baseline_1"`.
    pub fn when(self, stage: &str, needle: &str, behavior: Behavior) -> Self {
        self.rules.lock().unwrap().push(Rule {
            stage: stage.to_string(),
            needle: needle.to_string(),
            behavior,
        });
        self
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn stages_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.stage).collect()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, invocation: &ToolInvocation) -> Behavior {
        let rules = self.rules.lock().unwrap();
        rules
            .iter()
            .find(|rule| {
                rule.stage == invocation.stage
                    && invocation
                        .outputs
                        .iter()
                        .any(|o| o.to_string_lossy().contains(&rule.needle))
            })
            .map(|rule| rule.behavior)
            .unwrap_or(Behavior::Succeed)
    }
}

struct Busy<'a>(&'a AtomicUsize);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ToolRunner for ScriptedToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, StageError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _busy = Busy(&self.running);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.behavior_for(invocation) {
            Behavior::Succeed => {
                for output in &invocation.outputs {
                    fs::write(output, xml_document(&invocation.stage, "record", 60)).unwrap();
                }
                Ok(ToolOutput::success())
            }
            Behavior::Exit(code) => Ok(ToolOutput::exited(code, "Error: scripted failure")),
            Behavior::Truncate => {
                for output in &invocation.outputs {
                    let doc = xml_document(&invocation.stage, "record", 60);
                    fs::write(output, &doc[..doc.len() - 40]).unwrap();
                }
                Ok(ToolOutput::success())
            }
            Behavior::WriteNothing => Ok(ToolOutput::success()),
            Behavior::BreakOutput(fragment) => {
                for output in &invocation.outputs {
                    if output.to_string_lossy().contains(fragment) {
                        fs::write(output, "<stops/>\n").unwrap();
                    } else {
                        fs::write(output, xml_document(&invocation.stage, "record", 60)).unwrap();
                    }
                }
                Ok(ToolOutput::success())
            }
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(ToolOutput::success())
            }
        }
    }
}

pub fn result_ids(ids: &[TaskId]) -> Vec<String> {
    ids.iter().map(TaskId::to_string).collect()
}
