use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::Duration;
use sweep_core::*;

fn valid_config() -> CampaignConfig {
    let mut config = CampaignConfig::default();
    config.sweep.traffic_values = vec![1000, 2000];
    config.sweep.trials_per_value = 2;
    config.sweep.baseline_trials = 2;
    config.naming.city = "Szeged".to_string();
    config
}

// ===== Defaults =====

#[test]
fn test_threshold_defaults() {
    let thresholds = ThresholdConfig::default();

    assert_eq!(thresholds.baseline_stop_events, ArtifactPolicy::xml(500));
    assert_eq!(thresholds.mixed_stop_events, ArtifactPolicy::xml(200));
    assert_eq!(thresholds.sim_output, ArtifactPolicy::xml(1000));
    assert_eq!(thresholds.trips.min_size_bytes, 500);
    assert_eq!(thresholds.routes.min_size_bytes, 500);
    assert_eq!(thresholds.matrix.check, StructureCheckKind::None);
}

#[test]
fn test_sweep_defaults() {
    let sweep = SweepConfig::default();

    assert!(sweep.traffic_values.is_empty());
    assert_eq!(sweep.trials_per_value, 10);
    assert_eq!(sweep.baseline_trials, 10);
    assert_eq!(sweep.base_seed, 42);
    assert!(!sweep.allow_seed_collisions);
}

#[test]
fn test_execution_defaults_to_host_parallelism() {
    let execution = ExecutionConfig::default();

    assert!(execution.effective_max_jobs() >= 1);
    assert_eq!(execution.task_timeout(), None);
    assert_eq!(execution.failure_policy, FailurePolicy::FailAtEnd);

    let capped = ExecutionConfig {
        max_jobs: Some(3),
        task_timeout_secs: Some(90),
        ..Default::default()
    };
    assert_eq!(capped.effective_max_jobs(), 3);
    assert_eq!(capped.task_timeout(), Some(Duration::from_secs(90)));
}

#[test]
fn test_default_tool_commands() {
    let tools = ToolsConfig::default();

    assert_eq!(tools.trip_generation.program, "od2trips");
    assert_eq!(tools.route_assignment.program, "duarouter");
    assert_eq!(tools.baseline_simulation.program, "sumo");
    assert!(tools.mixed_simulation.args.iter().any(|a| a == "{tripinfo_output}"));
    assert!(!tools.baseline_simulation.args.iter().any(|a| a.contains("{routes}")));
}

// ===== Artifact Paths =====

#[test]
fn test_artifact_paths() {
    let config = valid_config();

    assert_eq!(
        config.baseline_stop_events_path(1),
        PathBuf::from("outputs/sim/stop_events_baseline_1.xml")
    );
    assert_eq!(
        config.mixed_stop_events_path(2000, 2),
        PathBuf::from("outputs/sim/stop_events_2000_2.xml")
    );
    assert_eq!(
        config.sim_output_path(2000, 2),
        PathBuf::from("outputs/sim/4_2000_2_Szeged_sim_output.xml")
    );
    assert_eq!(config.trips_path(1000, 1), PathBuf::from("outputs/trips/trips_1000_1.xml"));
    assert_eq!(
        config.routes_path(1000, 1),
        PathBuf::from("outputs/routes/routes_1000_1.rou.xml")
    );
    assert_eq!(
        config.matrix_variant_path(1000),
        PathBuf::from("outputs/matrices/od_matrix_1000.od")
    );
    assert_eq!(
        config.paths.report_path(),
        PathBuf::from("outputs/campaign_report.json")
    );
}

#[test]
fn test_custom_sim_dir() {
    let mut config = valid_config();
    config.paths.sim_dir = Some(PathBuf::from("/data/sim"));

    assert_eq!(
        config.baseline_stop_events_path(4),
        PathBuf::from("/data/sim/stop_events_baseline_4.xml")
    );
}

#[test]
fn test_additionals_arg_joins_with_commas() {
    let mut paths = PathsConfig::default();
    paths.pt_additionals = vec![PathBuf::from("a.add.xml"), PathBuf::from("b.add.xml")];
    assert_eq!(paths.additionals_arg(), "a.add.xml,b.add.xml");
}

// ===== Validation =====

#[test]
fn test_valid_config_passes() {
    let config = valid_config().validated().unwrap();
    assert_eq!(config.sweep.task_count(), 6);
}

#[test]
fn test_missing_city_rejected() {
    let mut config = valid_config();
    config.naming.city.clear();

    assert!(matches!(config.validated(), Err(CoreError::Validation(_))));
}

#[test]
fn test_zero_max_jobs_rejected() {
    let mut config = valid_config();
    config.execution.max_jobs = Some(0);

    assert!(config.validated().is_err());
}

#[test]
fn test_unsorted_values_rejected() {
    let mut config = valid_config();
    config.sweep.traffic_values = vec![2000, 1000];

    let err = config.validated().unwrap_err();
    assert!(err.to_string().contains("strictly ascending"));
}

#[test]
fn test_duplicate_values_rejected() {
    let mut config = valid_config();
    config.sweep.traffic_values = vec![1000, 1000];

    assert!(config.validated().is_err());
}

#[test]
fn test_empty_grid_rejected() {
    let mut config = valid_config();
    config.sweep.traffic_values.clear();
    config.sweep.baseline_trials = 0;

    let err = config.validated().unwrap_err();
    assert!(err.to_string().contains("no tasks"));
}

#[test]
fn test_inverted_window_rejected() {
    let mut config = valid_config();
    config.window = TimeWindow { begin: 3600, end: 0 };

    assert!(config.validated().is_err());
}

#[test]
fn test_zero_timeout_rejected() {
    let mut config = valid_config();
    config.execution.task_timeout_secs = Some(0);

    assert!(config.validated().is_err());
}

#[test]
fn test_empty_program_rejected() {
    let mut config = valid_config();
    config.tools.route_assignment.program.clear();

    assert!(config.validated().is_err());
}

// ===== Deserialization =====

#[test]
fn test_deserialize_partial_toml() {
    let raw = r#"
        [sweep]
        traffic_values = [1000, 2000]
        trials_per_value = 2
        baseline_trials = 2

        [naming]
        city = "Brest"

        [execution]
        max_jobs = 2
        failure_policy = "fail_at_end"

        [thresholds.sim_output]
        min_size_bytes = 4096

        [tools.trip_generation]
        program = "/opt/sumo/bin/od2trips"
        args = ["-o", "{output}"]
    "#;

    let config: CampaignConfig = toml::from_str(raw).unwrap();
    let config = config.validated().unwrap();

    assert_eq!(config.sweep.base_seed, 42);
    assert_eq!(config.naming.prefix, "4");
    assert_eq!(config.execution.max_jobs, Some(2));
    assert_eq!(config.thresholds.sim_output, ArtifactPolicy::xml(4096));
    assert_eq!(config.thresholds.mixed_stop_events, ArtifactPolicy::xml(200));
    assert_eq!(config.tools.trip_generation.args, vec!["-o", "{output}"]);
    assert_eq!(config.tools.route_assignment.program, "duarouter");
}

#[test]
fn test_fail_fast_policy_not_accepted() {
    let raw = r#"
        [execution]
        failure_policy = "fail_fast"
    "#;

    assert!(toml::from_str::<CampaignConfig>(raw).is_err());
}
