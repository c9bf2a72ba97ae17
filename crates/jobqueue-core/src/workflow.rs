//! In-memory DAG builder that submits its jobs as a linked batch.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::error::{JobQueueError, Result};
use crate::model::JobDefinition;
use crate::queue::Queue;

struct Entry {
    def: JobDefinition,
    depends_on: Vec<String>,
}

/// Builds a dependency DAG of named job definitions in memory, then submits
/// them as one workflow-tagged batch. Names must be unique within a single
/// `Workflow`; they are a builder-time convenience only — the persisted
/// `Job.dependencies` field is rewritten to hold assigned job ids before
/// submission.
pub struct Workflow {
    id: String,
    order: Vec<String>,
    entries: HashMap<String, Entry>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Opaque id tagging this whole batch (`executing_workflow_id` on every
    /// submitted job), enabling listing/cleanup by workflow.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Appends a job definition. `depends_on` must name jobs already added
    /// to this workflow, or this fails with `UnknownDependency`.
    pub fn add_job(&mut self, job: JobDefinition, depends_on: &[&str]) -> Result<()> {
        if self.entries.contains_key(&job.name) {
            return Err(JobQueueError::InvalidJob(format!(
                "duplicate job name in workflow: {}",
                job.name
            )));
        }
        for dep in depends_on {
            if !self.entries.contains_key(*dep) {
                return Err(JobQueueError::UnknownDependency(dep.to_string()));
            }
        }

        let name = job.name.clone();
        self.entries.insert(
            name.clone(),
            Entry {
                def: job,
                depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            },
        );
        self.order.push(name);
        Ok(())
    }

    /// Assigns ids in topological order, rewrites each job's dependencies
    /// to the assigned ids, and submits each job tagged with this
    /// workflow's id. Fails with `CycleDetected` if the graph is not a DAG.
    pub async fn submit_all(&self, queue: &Queue) -> Result<HashMap<String, String>> {
        let topo = self.topological_order()?;

        let mut assigned: HashMap<String, String> = HashMap::with_capacity(self.entries.len());
        for name in topo {
            let entry = &self.entries[&name];
            let mut def = entry.def.clone();
            def.dependencies = entry
                .depends_on
                .iter()
                .map(|dep_name| assigned[dep_name].clone())
                .collect();

            let id = queue.submit(def, Some(&self.id)).await?;
            assigned.insert(name, id);
        }

        Ok(assigned)
    }

    /// Kahn's algorithm: forward edges run dependency -> dependent, so a
    /// job only becomes ready once every job it depends on has been
    /// ordered before it.
    fn topological_order(&self) -> Result<Vec<String>> {
        let mut indegree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for name in &self.order {
            indegree.entry(name).or_insert(0);
        }
        for name in &self.order {
            let entry = &self.entries[name];
            *indegree.get_mut(name.as_str()).unwrap() += entry.depends_on.len();
            for dep in &entry.depends_on {
                dependents.entry(dep.as_str()).or_default().push(name);
            }
        }

        let mut ready: VecDeque<&str> = self
            .order
            .iter()
            .map(|s| s.as_str())
            .filter(|name| indegree[name] == 0)
            .collect();

        let mut ordered = Vec::with_capacity(self.order.len());
        while let Some(name) = ready.pop_front() {
            ordered.push(name.to_string());
            if let Some(children) = dependents.get(name) {
                for child in children {
                    let remaining = indegree.get_mut(child).unwrap();
                    *remaining -= 1;
                    if *remaining == 0 {
                        ready.push_back(child);
                    }
                }
            }
        }

        if ordered.len() != self.order.len() {
            let remaining: Vec<String> = self
                .order
                .iter()
                .filter(|name| !ordered.contains(name))
                .cloned()
                .collect();
            return Err(JobQueueError::CycleDetected(remaining));
        }

        Ok(ordered)
    }
}
