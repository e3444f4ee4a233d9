use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use sweep_core::{CommandSpec, StageError};

const STDERR_TAIL_BYTES: usize = 2000;

/// Values substituted for `{name}` tokens in a command template.
pub type Bindings = BTreeMap<&'static str, String>;

/// One fully rendered external tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub stage: String,
    pub program: String,
    pub args: Vec<String>,
    /// Temp paths the tool is expected to write.
    pub outputs: Vec<PathBuf>,
}

impl ToolInvocation {
    pub fn render(
        stage: &str,
        command: &CommandSpec,
        bindings: &Bindings,
        outputs: Vec<PathBuf>,
    ) -> Result<Self, StageError> {
        let args = command
            .args
            .iter()
            .map(|arg| render_template(stage, arg, bindings))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            stage: stage.to_string(),
            program: command.program.clone(),
            args,
            outputs,
        })
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"))
}

fn render_template(stage: &str, template: &str, bindings: &Bindings) -> Result<String, StageError> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = bindings.get(name.as_str()).ok_or_else(|| StageError::Template {
            stage: stage.to_string(),
            placeholder: name.as_str().to_string(),
        })?;
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(value);
        last = whole.end();
    }

    rendered.push_str(&template[last..]);
    Ok(rendered)
}

/// What the engine learns from a tool: its exit status and the tail of
/// its stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stderr_tail: String,
}

impl ToolOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            stderr_tail: String::new(),
        }
    }

    pub fn exited(code: i32, stderr_tail: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stderr_tail: stderr_tail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run to completion. Dropping the returned future must stop the tool.
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, StageError>;
}

/// Runs tools as child processes, each in its own process group so that
/// helpers a wrapper script starts die with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessToolRunner;

impl ProcessToolRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, StageError> {
        tracing::debug!("Invoking {}", invocation.command_line());

        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| StageError::ToolSpawn {
            stage: invocation.stage.clone(),
            program: invocation.program.clone(),
            reason: e.to_string(),
        })?;

        // Armed until the tool exits on its own; a timeout or cancellation
        // drops this future mid-wait and takes the whole group down.
        let group = ProcessGroup::new(child.id());
        let output = child.wait_with_output().await.map_err(|e| {
            StageError::Internal(format!("{}: wait failed: {}", invocation.stage, e))
        })?;
        group.disarm();

        Ok(ToolOutput {
            code: output.status.code(),
            stderr_tail: tail(&output.stderr, STDERR_TAIL_BYTES),
        })
    }
}

/// Process group of a running tool, killed on drop unless disarmed.
struct ProcessGroup {
    id: Option<u32>,
}

impl ProcessGroup {
    fn new(id: Option<u32>) -> Self {
        Self { id }
    }

    fn disarm(mut self) {
        self.id = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(id) = self.id.take() {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(id as i32), Signal::SIGKILL) {
                Ok(()) => tracing::debug!("Killed process group {}", id),
                Err(Errno::ESRCH) => {}
                Err(e) => tracing::warn!("Could not kill process group {}: {}", id, e),
            }
        }
    }
}

fn tail(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        let mut b = Bindings::new();
        b.insert("seed", "1044".to_string());
        b.insert("pt_routes", "pt.rou.xml".to_string());
        b.insert("routes", "routes_1000_2.rou.xml".to_string());
        b.insert("output", "trips_1000_2.xml.tmp".to_string());
        b
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let command = CommandSpec::new(
            "sumo",
            &["--seed", "{seed}", "--route-files", "{pt_routes},{routes}", "-o", "{output}"],
        );
        let invocation = ToolInvocation::render(
            "mixed_simulation",
            &command,
            &bindings(),
            vec![PathBuf::from("trips_1000_2.xml.tmp")],
        )
        .unwrap();

        assert_eq!(
            invocation.args,
            vec![
                "--seed",
                "1044",
                "--route-files",
                "pt.rou.xml,routes_1000_2.rou.xml",
                "-o",
                "trips_1000_2.xml.tmp"
            ]
        );
        assert!(invocation.command_line().starts_with("sumo --seed 1044"));
    }

    #[test]
    fn test_render_rejects_unknown_placeholder() {
        let command = CommandSpec::new("od2trips", &["--taz-files", "{zones}"]);
        let err =
            ToolInvocation::render("trip_generation", &command, &bindings(), vec![]).unwrap_err();

        assert_eq!(
            err,
            StageError::Template {
                stage: "trip_generation".to_string(),
                placeholder: "zones".to_string(),
            }
        );
    }

    #[test]
    fn test_render_leaves_other_braces() {
        let command = CommandSpec::new("sh", &["-c", "echo {SEED} {seed}"]);
        let invocation = ToolInvocation::render("x", &command, &bindings(), vec![]).unwrap();
        assert_eq!(invocation.args[1], "echo {SEED} 1044");
    }

    #[test]
    fn test_tail_keeps_last_bytes() {
        assert_eq!(tail(b"  abcdef \n", 4), "ef");
        assert_eq!(tail(b"short", 100), "short");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_reports_exit_code() {
        let runner = ProcessToolRunner::new();
        let invocation = ToolInvocation {
            stage: "baseline_simulation".to_string(),
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            outputs: vec![],
        };

        let output = runner.run(&invocation).await.unwrap();
        assert_eq!(output, ToolOutput::exited(3, "boom"));
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_process_runner_missing_binary() {
        let runner = ProcessToolRunner::new();
        let invocation = ToolInvocation {
            stage: "baseline_simulation".to_string(),
            program: "definitely-not-an-installed-tool".to_string(),
            args: vec![],
            outputs: vec![],
        };

        let err = runner.run(&invocation).await.unwrap_err();
        assert_eq!(err.kind(), "tool_spawn");
    }
}
