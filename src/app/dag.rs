//! Static task graph: tasks plus their upstream edges, validated on build.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::error::DagError;
use crate::tasks::Task;

/// Per-task defaults, applied to every task of a DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultArgs {
    pub owner: String,
    pub depends_on_past: bool,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for DefaultArgs {
    fn default() -> Self {
        Self {
            owner: "airflow".to_string(),
            depends_on_past: false,
            retries: 1,
            retry_delay: Duration::from_secs(60),
        }
    }
}

pub struct Dag {
    pub dag_id: String,
    pub description: String,
    pub tags: Vec<String>,
    pub default_args: DefaultArgs,
    tasks: HashMap<String, Arc<dyn Task>>,
    upstream: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl std::fmt::Debug for Dag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dag")
            .field("dag_id", &self.dag_id)
            .field("order", &self.order)
            .field("upstream", &self.upstream)
            .finish_non_exhaustive()
    }
}

impl Dag {
    /// Task ids in execution order.
    pub fn task_ids(&self) -> &[String] {
        &self.order
    }

    pub fn task(&self, task_id: &str) -> Option<&Arc<dyn Task>> {
        self.tasks.get(task_id)
    }

    pub fn upstream_of(&self, task_id: &str) -> &[String] {
        self.upstream.get(task_id).map_or(&[], Vec::as_slice)
    }
}

pub struct DagBuilder {
    dag_id: String,
    description: String,
    tags: Vec<String>,
    default_args: DefaultArgs,
    tasks: Vec<Arc<dyn Task>>,
    edges: Vec<(String, String)>,
}

impl DagBuilder {
    pub fn new(dag_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            description: String::new(),
            tags: Vec::new(),
            default_args: DefaultArgs::default(),
            tasks: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_args(mut self, default_args: DefaultArgs) -> Self {
        self.default_args = default_args;
        self
    }

    pub fn task(mut self, task: impl Task + 'static) -> Self {
        self.tasks.push(Arc::new(task));
        self
    }

    /// `upstream` must finish before `downstream` starts.
    pub fn edge(mut self, upstream: impl Into<String>, downstream: impl Into<String>) -> Self {
        self.edges.push((upstream.into(), downstream.into()));
        self
    }

    /// `a >> b >> c`: each id depends on the one before it.
    pub fn chain(mut self, ids: &[&str]) -> Self {
        for pair in ids.windows(2) {
            self.edges.push((pair[0].to_string(), pair[1].to_string()));
        }
        self
    }

    pub fn build(self) -> Result<Dag, DagError> {
        let mut tasks = HashMap::new();
        let mut declared = Vec::new();
        for task in self.tasks {
            let id = task.task_id().to_string();
            if tasks.insert(id.clone(), task).is_some() {
                return Err(DagError::DuplicateTask(id));
            }
            declared.push(id);
        }

        let mut upstream: HashMap<String, Vec<String>> = HashMap::new();
        for (up, down) in self.edges {
            if !tasks.contains_key(&down) {
                return Err(DagError::UnknownTask(down));
            }
            if !tasks.contains_key(&up) {
                return Err(DagError::UnknownDependency { task: down, upstream: up });
            }
            let entry = upstream.entry(down).or_default();
            if !entry.contains(&up) {
                entry.push(up);
            }
        }

        let order = topological_order(&declared, &upstream)?;

        Ok(Dag {
            dag_id: self.dag_id,
            description: self.description,
            tags: self.tags,
            default_args: self.default_args,
            tasks,
            upstream,
            order,
        })
    }
}

/// Kahn's algorithm; ties resolve in declaration order so a chain comes out
/// exactly as declared.
fn topological_order(
    declared: &[String],
    upstream: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, DagError> {
    let position: HashMap<&str, usize> = declared
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut in_degree: HashMap<&str, usize> =
        declared.iter().map(|id| (id.as_str(), 0)).collect();
    let mut downstream: HashMap<&str, Vec<&str>> = HashMap::new();
    for (task, ups) in upstream {
        *in_degree.entry(task.as_str()).or_default() += ups.len();
        for up in ups {
            downstream.entry(up.as_str()).or_default().push(task.as_str());
        }
    }

    let mut ready: BTreeMap<usize, &str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| (position[id], *id))
        .collect();
    let mut order = Vec::with_capacity(declared.len());

    while let Some((_, current)) = ready.pop_first() {
        order.push(current.to_string());
        for &next in downstream.get(current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(position[next], next);
                }
            }
        }
    }

    if order.len() == declared.len() {
        return Ok(order);
    }

    let mut stuck: Vec<String> = in_degree
        .into_iter()
        .filter(|(_, degree)| *degree > 0)
        .map(|(id, _)| id.to_string())
        .collect();
    stuck.sort_by_key(|id| position[id.as_str()]);
    Err(DagError::Cycle(stuck))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::tasks::TaskContext;
    use async_trait::async_trait;

    struct Noop(&'static str);

    #[async_trait]
    impl Task for Noop {
        fn task_id(&self) -> &str {
            self.0
        }

        async fn execute(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
            Ok(())
        }
    }

    #[test]
    fn chain_orders_tasks_as_declared() {
        let dag = DagBuilder::new("d")
            .task(Noop("c"))
            .task(Noop("a"))
            .task(Noop("b"))
            .chain(&["a", "b", "c"])
            .build()
            .unwrap();

        assert_eq!(dag.task_ids(), ["a", "b", "c"]);
        assert_eq!(dag.upstream_of("c"), ["b"]);
        assert!(dag.upstream_of("a").is_empty());
    }

    #[test]
    fn independent_tasks_keep_declaration_order() {
        let dag = DagBuilder::new("d")
            .task(Noop("x"))
            .task(Noop("y"))
            .build()
            .unwrap();

        assert_eq!(dag.task_ids(), ["x", "y"]);
    }

    #[test]
    fn duplicate_task_is_rejected() {
        let err = DagBuilder::new("d")
            .task(Noop("a"))
            .task(Noop("a"))
            .build()
            .unwrap_err();

        assert_eq!(err, DagError::DuplicateTask("a".to_string()));
    }

    #[test]
    fn unknown_upstream_is_rejected() {
        let err = DagBuilder::new("d")
            .task(Noop("a"))
            .edge("ghost", "a")
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            DagError::UnknownDependency {
                task: "a".to_string(),
                upstream: "ghost".to_string()
            }
        );
    }

    #[test]
    fn edge_to_undeclared_task_is_rejected() {
        let err = DagBuilder::new("d")
            .task(Noop("a"))
            .edge("a", "ghost")
            .build()
            .unwrap_err();

        assert_eq!(err, DagError::UnknownTask("ghost".to_string()));
    }

    #[test]
    fn cycle_is_rejected() {
        let err = DagBuilder::new("d")
            .task(Noop("a"))
            .task(Noop("b"))
            .task(Noop("c"))
            .chain(&["a", "b", "c"])
            .edge("c", "b")
            .build()
            .unwrap_err();

        assert_eq!(err, DagError::Cycle(vec!["b".to_string(), "c".to_string()]));
    }

    #[test]
    fn default_args_retry_once_after_a_minute() {
        let args = DefaultArgs::default();
        assert_eq!(args.retries, 1);
        assert_eq!(args.retry_delay, Duration::from_secs(60));
        assert!(!args.depends_on_past);
    }
}
