// src/dag/graph.rs

use std::collections::HashMap;
use std::fmt;

use crate::errors::{Result, SimError};

/// Index of a task inside its [`Dag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Index of a file inside its [`Dag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct DagFile {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// One unit of work. Immutable once its DAG is built; per-run scheduling data
/// lives in [`crate::dag::Annotations`].
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Work in million instructions; runtime on a VM is `size / mips`.
    pub size: f64,
    pub memory: u64,
    pub parents: Vec<TaskId>,
    pub children: Vec<TaskId>,
    pub inputs: Vec<FileId>,
    pub outputs: Vec<FileId>,
}

impl Task {
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Workflow graph stored as an arena of tasks with index edges.
///
/// Edges can only be added between tasks that already exist. Acyclicity is
/// checked by [`crate::dag::topological_order`] and by config validation.
#[derive(Debug, Clone)]
pub struct Dag {
    id: String,
    name: String,
    /// Absolute deadline (simulation time).
    deadline: f64,
    budget: f64,
    submit_time: f64,
    files: Vec<DagFile>,
    file_index: HashMap<String, FileId>,
    tasks: Vec<Task>,
    task_index: HashMap<String, TaskId>,
}

impl Dag {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            deadline: f64::INFINITY,
            budget: 0.0,
            submit_time: 0.0,
            files: Vec::new(),
            file_index: HashMap::new(),
            tasks: Vec::new(),
            task_index: HashMap::new(),
        }
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_deadline(mut self, deadline: f64) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_submit_time(mut self, submit_time: f64) -> Self {
        self.submit_time = submit_time;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deadline(&self) -> f64 {
        self.deadline
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn submit_time(&self) -> f64 {
        self.submit_time
    }

    /// Register a file. Sizes are signed on input so that bad workload data
    /// surfaces as an error instead of wrapping.
    pub fn add_file(&mut self, name: &str, size: i64) -> Result<FileId> {
        if size < 0 {
            return Err(SimError::ConfigError(format!(
                "file '{}' in DAG '{}' has negative size {}",
                name, self.name, size
            )));
        }
        if let Some(id) = self.file_index.get(name) {
            return Ok(*id);
        }
        let id = FileId(self.files.len());
        self.files.push(DagFile {
            name: name.to_string(),
            size: size as u64,
        });
        self.file_index.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_task(&mut self, name: &str, size: f64, memory: u64) -> Result<TaskId> {
        if self.task_index.contains_key(name) {
            return Err(SimError::ConfigError(format!(
                "task '{}' added twice to DAG '{}'",
                name, self.name
            )));
        }
        let id = TaskId(self.tasks.len());
        self.tasks.push(Task {
            id,
            name: name.to_string(),
            size,
            memory,
            parents: Vec::new(),
            children: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        self.task_index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add the edge `parent -> child`. Both endpoints must already exist.
    pub fn add_edge(&mut self, parent: &str, child: &str) -> Result<()> {
        let p = self.lookup(parent)?;
        let c = self.lookup(child)?;
        if p == c {
            return Err(SimError::DagCycle(format!(
                "task '{}' of DAG '{}' cannot depend on itself",
                parent, self.name
            )));
        }
        if self.tasks[c.0].parents.contains(&p) {
            return Ok(());
        }
        self.tasks[p.0].children.push(c);
        self.tasks[c.0].parents.push(p);
        Ok(())
    }

    pub fn add_input(&mut self, task: &str, file: &str) -> Result<()> {
        let t = self.lookup(task)?;
        let f = self.lookup_file(file)?;
        self.tasks[t.0].inputs.push(f);
        Ok(())
    }

    pub fn add_output(&mut self, task: &str, file: &str) -> Result<()> {
        let t = self.lookup(task)?;
        let f = self.lookup_file(file)?;
        self.tasks[t.0].outputs.push(f);
        Ok(())
    }

    fn lookup(&self, task: &str) -> Result<TaskId> {
        self.task_index
            .get(task)
            .copied()
            .ok_or_else(|| SimError::TaskNotFound {
                dag: self.name.clone(),
                task: task.to_string(),
            })
    }

    fn lookup_file(&self, file: &str) -> Result<FileId> {
        self.file_index.get(file).copied().ok_or_else(|| {
            SimError::ConfigError(format!(
                "file '{}' is not registered in DAG '{}'",
                file, self.name
            ))
        })
    }

    pub fn task_id(&self, name: &str) -> Option<TaskId> {
        self.task_index.get(name).copied()
    }

    /// Panics on ids from another DAG; ids are only minted by `add_task`.
    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().map(|t| t.id)
    }

    pub fn roots(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().filter(|t| t.is_root()).map(|t| t.id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn file(&self, id: FileId) -> &DagFile {
        &self.files[id.0]
    }

    pub fn files(&self) -> &[DagFile] {
        &self.files
    }

    /// First two characters of the name, used as a soft workflow-affinity tag.
    pub fn affinity_tag(&self) -> String {
        self.name.chars().take(2).collect()
    }
}
