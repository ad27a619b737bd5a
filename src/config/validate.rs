// src/config/validate.rs

use std::collections::HashSet;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::cloud::{
    Environment, FailureModel, PerformanceVariation, RuntimeDistribution, StorageParams,
    VmBehaviour,
};
use crate::config::model::{ConfigFile, RawConfigFile, VmTypeConfig, WorkflowConfig};
use crate::dag::Dag;
use crate::errors::{Result, SimError};
use crate::types::StorageKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SimError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        let storage = StorageParams {
            kind: raw.storage.kind,
            cache: raw.storage.cache,
            read_bandwidth: raw.storage.read_bandwidth,
            write_bandwidth: raw.storage.write_bandwidth,
        };
        let environment = Environment::new(
            raw.vm_type.iter().map(VmTypeConfig::to_vm_type).collect(),
            storage,
            raw.simulation.storage_aware,
        )?
        .with_expected_degradation(raw.variation.expected_degradation);

        let v = &raw.variation;
        let behaviour = VmBehaviour {
            runtime: RuntimeDistribution::from_variance(v.runtime_variance),
            failure: FailureModel::new(v.failure_rate),
            variation: PerformanceVariation::new(
                v.avg_performance_variation,
                v.stddev_performance_variation,
                v.max_performance_variation,
            ),
        };

        let workflows = raw
            .workflow
            .iter()
            .enumerate()
            .map(|(index, wf)| build_dag(index, wf).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(ConfigFile::new_unchecked(
            raw.simulation,
            environment,
            behaviour,
            workflows,
        ))
    }
}

/// Turn one validated `[[workflow]]` into a DAG with an absolute deadline.
fn build_dag(index: usize, wf: &WorkflowConfig) -> Result<Dag> {
    let mut dag = Dag::new(index.to_string(), wf.name.clone())
        .with_budget(wf.budget)
        .with_deadline(wf.submit_time + wf.deadline)
        .with_submit_time(wf.submit_time);

    for file in &wf.files {
        dag.add_file(&file.name, file.size)?;
    }
    for task in &wf.task {
        dag.add_task(&task.name, task.size, task.memory)?;
    }
    for task in &wf.task {
        for parent in &task.parents {
            dag.add_edge(parent, &task.name)?;
        }
        for input in &task.inputs {
            dag.add_input(&task.name, input)?;
        }
        for output in &task.outputs {
            dag.add_output(&task.name, output)?;
        }
    }
    Ok(dag)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_vm_types(cfg)?;
    ensure_has_workflows(cfg)?;
    validate_simulation(cfg)?;
    validate_storage(cfg)?;
    validate_variation(cfg)?;
    validate_vm_types(cfg)?;
    validate_workflows(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> SimError {
    SimError::ConfigError(msg.into())
}

fn ensure_has_vm_types(cfg: &RawConfigFile) -> Result<()> {
    if cfg.vm_type.is_empty() {
        return Err(config_error(
            "config must contain at least one [[vm_type]] section",
        ));
    }
    Ok(())
}

fn ensure_has_workflows(cfg: &RawConfigFile) -> Result<()> {
    if cfg.workflow.is_empty() {
        return Err(config_error(
            "config must contain at least one [[workflow]] section",
        ));
    }
    Ok(())
}

fn ensure_positive(what: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(config_error(format!("{what} must be > 0 (got {value})")));
    }
    Ok(())
}

fn ensure_non_negative(what: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(config_error(format!("{what} must be >= 0 (got {value})")));
    }
    Ok(())
}

fn ensure_fraction(what: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(config_error(format!(
            "{what} must be within [0, 1] (got {value})"
        )));
    }
    Ok(())
}

fn validate_simulation(cfg: &RawConfigFile) -> Result<()> {
    // `max_time` may be infinite to disable the horizon.
    if cfg.simulation.max_time.is_nan() || cfg.simulation.max_time <= 0.0 {
        return Err(config_error(format!(
            "[simulation].max_time must be > 0 (got {})",
            cfg.simulation.max_time
        )));
    }
    Ok(())
}

fn validate_storage(cfg: &RawConfigFile) -> Result<()> {
    if cfg.storage.kind == StorageKind::Global {
        ensure_positive("[storage].read_bandwidth", cfg.storage.read_bandwidth)?;
        ensure_positive("[storage].write_bandwidth", cfg.storage.write_bandwidth)?;
    }
    Ok(())
}

fn validate_variation(cfg: &RawConfigFile) -> Result<()> {
    let v = &cfg.variation;
    ensure_fraction("[variation].runtime_variance", v.runtime_variance)?;
    ensure_fraction("[variation].failure_rate", v.failure_rate)?;
    ensure_fraction(
        "[variation].avg_performance_variation",
        v.avg_performance_variation,
    )?;
    ensure_non_negative(
        "[variation].stddev_performance_variation",
        v.stddev_performance_variation,
    )?;
    ensure_fraction(
        "[variation].max_performance_variation",
        v.max_performance_variation,
    )?;
    if !(0.0..1.0).contains(&v.expected_degradation) {
        return Err(config_error(format!(
            "[variation].expected_degradation must be within [0, 1) (got {})",
            v.expected_degradation
        )));
    }
    Ok(())
}

fn validate_vm_types(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for t in &cfg.vm_type {
        if !seen.insert(t.name.as_str()) {
            return Err(config_error(format!(
                "vm type '{}' is defined more than once",
                t.name
            )));
        }
        ensure_positive(&format!("vm type '{}' mips", t.name), t.mips)?;
        ensure_positive(&format!("vm type '{}' price", t.name), t.price)?;
        ensure_positive(
            &format!("vm type '{}' billing_period", t.name),
            t.billing_period,
        )?;
        if t.cores == 0 {
            return Err(config_error(format!(
                "vm type '{}' must have at least one core",
                t.name
            )));
        }
        ensure_non_negative(
            &format!("vm type '{}' provisioning_delay", t.name),
            t.provisioning_delay.mean(),
        )?;
        ensure_non_negative(
            &format!("vm type '{}' deprovisioning_delay", t.name),
            t.deprovisioning_delay.mean(),
        )?;
    }
    Ok(())
}

fn validate_workflows(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for wf in &cfg.workflow {
        if !seen.insert(wf.name.as_str()) {
            return Err(config_error(format!(
                "workflow '{}' is defined more than once",
                wf.name
            )));
        }
        ensure_non_negative(&format!("workflow '{}' budget", wf.name), wf.budget)?;
        ensure_positive(&format!("workflow '{}' deadline", wf.name), wf.deadline)?;
        ensure_non_negative(
            &format!("workflow '{}' submit_time", wf.name),
            wf.submit_time,
        )?;
        validate_workflow_tasks(wf)?;
        validate_workflow_files(wf)?;
        validate_dag(wf)?;
    }
    Ok(())
}

fn validate_workflow_tasks(wf: &WorkflowConfig) -> Result<()> {
    if wf.task.is_empty() {
        return Err(config_error(format!(
            "workflow '{}' must contain at least one [[workflow.task]]",
            wf.name
        )));
    }

    let names: HashSet<&str> = wf.task.iter().map(|t| t.name.as_str()).collect();
    if names.len() != wf.task.len() {
        return Err(config_error(format!(
            "workflow '{}' has duplicate task names",
            wf.name
        )));
    }

    for task in &wf.task {
        ensure_non_negative(
            &format!("task '{}' of workflow '{}' size", task.name, wf.name),
            task.size,
        )?;
        for parent in &task.parents {
            if !names.contains(parent.as_str()) {
                return Err(SimError::TaskNotFound {
                    dag: wf.name.clone(),
                    task: parent.clone(),
                });
            }
            if parent == &task.name {
                return Err(SimError::DagCycle(format!(
                    "task '{}' of workflow '{}' cannot depend on itself",
                    task.name, wf.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_workflow_files(wf: &WorkflowConfig) -> Result<()> {
    let mut files = HashSet::new();
    for file in &wf.files {
        if !files.insert(file.name.as_str()) {
            return Err(config_error(format!(
                "file '{}' is declared twice in workflow '{}'",
                file.name, wf.name
            )));
        }
        if file.size < 0 {
            return Err(config_error(format!(
                "file '{}' in workflow '{}' has negative size {}",
                file.name, wf.name, file.size
            )));
        }
    }

    for task in &wf.task {
        for file in task.inputs.iter().chain(task.outputs.iter()) {
            if !files.contains(file.as_str()) {
                return Err(config_error(format!(
                    "task '{}' of workflow '{}' references unknown file '{}'",
                    task.name, wf.name, file
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(wf: &WorkflowConfig) -> Result<()> {
    // Edge direction: parent -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for task in &wf.task {
        graph.add_node(task.name.as_str());
    }
    for task in &wf.task {
        for parent in &task.parents {
            graph.add_edge(parent.as_str(), task.name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(SimError::DagCycle(format!(
            "cycle in workflow '{}' involving task '{}'",
            wf.name,
            cycle.node_id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(text)?;
        ConfigFile::try_from(raw)
    }

    const CATALOG: &str = r#"
[[vm_type]]
name = "small"
mips = 1.0
price = 1.0
"#;

    fn with_catalog(workflow: &str) -> String {
        format!("{CATALOG}\n{workflow}")
    }

    #[test]
    fn builds_dags_with_absolute_deadlines() {
        let cfg = parse(&with_catalog(
            r#"
[[workflow]]
name = "chain"
budget = 4.0
deadline = 100.0
submit_time = 50.0
files = [{ name = "a.out", size = 10 }]
[[workflow.task]]
name = "A"
size = 3600.0
outputs = ["a.out"]
[[workflow.task]]
name = "B"
size = 3600.0
parents = ["A"]
inputs = ["a.out"]
"#,
        ))
        .unwrap();

        assert_eq!(cfg.workflows.len(), 1);
        let dag = &cfg.workflows[0];
        assert_eq!(dag.deadline(), 150.0);
        assert_eq!(dag.submit_time(), 50.0);
        assert_eq!(dag.len(), 2);
        let b = dag.task_id("B").unwrap();
        assert_eq!(dag.task(b).parents, vec![dag.task_id("A").unwrap()]);
        assert_eq!(cfg.environment.vm_types().len(), 1);
        assert_eq!(cfg.total_tasks(), 2);
    }

    #[test]
    fn rejects_cycles() {
        let err = parse(&with_catalog(
            r#"
[[workflow]]
name = "loop"
budget = 1.0
deadline = 10.0
[[workflow.task]]
name = "A"
size = 1.0
parents = ["B"]
[[workflow.task]]
name = "B"
size = 1.0
parents = ["A"]
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, SimError::DagCycle(_)));
    }

    #[test]
    fn rejects_unknown_parent() {
        let err = parse(&with_catalog(
            r#"
[[workflow]]
name = "w"
budget = 1.0
deadline = 10.0
[[workflow.task]]
name = "A"
size = 1.0
parents = ["Z"]
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, SimError::TaskNotFound { ref task, .. } if task == "Z"));
    }

    #[test]
    fn rejects_empty_catalog() {
        let err = parse(
            r#"
[[workflow]]
name = "w"
budget = 1.0
deadline = 10.0
[[workflow.task]]
name = "A"
size = 1.0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::ConfigError(ref m) if m.contains("vm_type")));
    }

    #[test]
    fn rejects_out_of_range_failure_rate() {
        let err = parse(&with_catalog(
            r#"
[variation]
failure_rate = 1.5

[[workflow]]
name = "w"
budget = 1.0
deadline = 10.0
[[workflow.task]]
name = "A"
size = 1.0
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, SimError::ConfigError(ref m) if m.contains("failure_rate")));
    }

    #[test]
    fn rejects_unknown_file_reference() {
        let err = parse(&with_catalog(
            r#"
[[workflow]]
name = "w"
budget = 1.0
deadline = 10.0
[[workflow.task]]
name = "A"
size = 1.0
inputs = ["missing.dat"]
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, SimError::ConfigError(ref m) if m.contains("missing.dat")));
    }

    #[test]
    fn unknown_keys_are_toml_errors() {
        let err = parse(&with_catalog("[simulation]\nsead = 3\n")).unwrap_err();
        assert!(matches!(err, SimError::TomlError(_)));
    }
}
