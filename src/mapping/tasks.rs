//! Control-flow lowering: task entry points and precedence ordering

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::warn;

use crate::error::{Diagnostic, ManualInputRequired, StructureWarning};
use crate::models::package::normalize_executable_path;
use crate::models::{ControlFlowTask, PackageModel, TaskKind};

use super::python::{comment_text, py_str};
use super::types::{ImportSet, TaskFragment};

/// Executable ref paths in precedence order
///
/// Constraints between containers also order everything nested inside
/// them. Ties keep declaration order; a cycle falls back to declaration
/// order with a warning.
pub fn control_flow_order(package: &PackageModel) -> (Vec<String>, Vec<Diagnostic>) {
    let nodes = package.executables_in_order();
    let normalized: Vec<String> = nodes.iter().map(|p| normalize_executable_path(p)).collect();
    let mut diagnostics = Vec::new();

    let resolve = |reference: &str| -> Option<usize> {
        let wanted = normalize_executable_path(reference);
        normalized.iter().position(|p| *p == wanted).or_else(|| {
            let id = reference.trim();
            package
                .control_flow_tasks
                .iter()
                .find(|t| t.task_id.eq_ignore_ascii_case(id))
                .map(|t| normalize_executable_path(&t.ref_path))
                .or_else(|| {
                    package
                        .data_flow_components
                        .iter()
                        .find(|f| f.id.eq_ignore_ascii_case(id))
                        .map(|f| normalize_executable_path(&f.ref_path))
                })
                .and_then(|path| normalized.iter().position(|p| *p == path))
        })
    };
    let with_descendants = |index: usize| -> Vec<usize> {
        let prefix = format!("{}\\", normalized[index]);
        std::iter::once(index)
            .chain((0..normalized.len()).filter(|j| normalized[*j].starts_with(&prefix)))
            .collect()
    };

    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let indices: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();
    for constraint in &package.precedence_constraints {
        let (Some(from), Some(to)) = (resolve(&constraint.from), resolve(&constraint.to)) else {
            let warning = StructureWarning::new(
                format!(
                    "precedence constraint {} -> {} references an unknown executable",
                    constraint.from, constraint.to
                ),
                Some(constraint.from.clone()),
            );
            warn!("{}", warning);
            diagnostics.push(warning.into());
            continue;
        };
        for f in with_descendants(from) {
            for t in with_descendants(to) {
                if f != t {
                    graph.update_edge(indices[f], indices[t], ());
                }
            }
        }
    }

    if is_cyclic_directed(&graph) {
        let warning = StructureWarning::new(
            "precedence constraints form a cycle; declaration order is used",
            Some(package.name.clone()),
        );
        warn!(package = %package.name, "{}", warning);
        diagnostics.push(warning.into());
        return (nodes, diagnostics);
    }

    let mut in_degree: Vec<usize> = indices
        .iter()
        .map(|n| graph.neighbors_directed(*n, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(nodes[i].clone());
        for next in graph.neighbors_directed(indices[i], Direction::Outgoing) {
            let j = graph[next];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }
    (order, diagnostics)
}

/// Lower one task into the body of its entry point
///
/// Containers have no body and yield `None`.
pub fn lower_task(
    package: &PackageModel,
    task: &ControlFlowTask,
    slug: &str,
) -> Option<(TaskFragment, Vec<Diagnostic>)> {
    let mut lowering = TaskLowering {
        fragment: TaskFragment {
            ref_path: task.ref_path.clone(),
            name: task.name.clone(),
            slug: slug.to_string(),
            task_type: task.task_type.clone(),
            code: Vec::new(),
            imports: ImportSet::new(),
            dependencies: BTreeSet::new(),
            manual_review: Vec::new(),
        },
        diagnostics: Vec::new(),
        task,
    };
    match task.kind() {
        TaskKind::Container => return None,
        TaskKind::ExecuteSql => lowering.execute_sql(package),
        TaskKind::Script | TaskKind::Other => lowering.stub(),
    }
    Some((lowering.fragment, lowering.diagnostics))
}

struct TaskLowering<'a> {
    fragment: TaskFragment,
    diagnostics: Vec<Diagnostic>,
    task: &'a ControlFlowTask,
}

impl TaskLowering<'_> {
    fn line(&mut self, line: impl Into<String>) {
        self.fragment.code.push(line.into());
    }

    fn review(&mut self, reason: String) {
        self.line(format!("# MANUAL REVIEW: {}", comment_text(&reason)));
        self.diagnostics
            .push(ManualInputRequired::new(self.task.ref_path.clone(), reason.clone()).into());
        self.fragment.manual_review.push(reason);
    }

    fn execute_sql(&mut self, package: &PackageModel) {
        let task = self.task;
        let properties = &task.properties;
        let source_type = properties
            .text("SqlStatementSourceType")
            .unwrap_or_default()
            .to_ascii_lowercase();
        let raw_statement = properties
            .text("sql_statement")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let statement = match (source_type.as_str(), raw_statement) {
            ("variable", Some(variable)) => {
                let qualified = if variable.contains("::") { variable } else { format!("User::{}", variable) };
                Some(format!("VARIABLES[{}]", py_str(&qualified)))
            }
            ("fileconnection", Some(file)) => {
                self.review(format!("statement is read from file connection '{}'", file));
                None
            }
            (_, Some(statement)) => Some(py_str(&statement)),
            (_, None) => {
                self.review("SQL task has no statement".to_string());
                None
            }
        };

        let reference = properties
            .text("connection")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let connection = match reference {
            Some(reference) => match package.connection(&reference) {
                Some(manager) => Some(manager.name.clone()),
                None => {
                    self.review(format!(
                        "connection reference '{}' does not resolve to a connection manager",
                        reference
                    ));
                    Some(reference)
                }
            },
            None => {
                self.review("SQL task has no connection".to_string());
                None
            }
        };

        if let Some(result_type) = properties.text("result_type") {
            let result_type = result_type.trim();
            if !result_type.is_empty() && !result_type.eq_ignore_ascii_case("ResultSetType_None") {
                self.review(format!("result set binding ({}) is not translated", result_type));
            }
        }

        let (Some(statement), Some(connection)) = (statement, connection) else {
            self.line("return None");
            return;
        };

        self.fragment
            .imports
            .runtime("bind_placeholders")
            .runtime("execute_sql")
            .config("VARIABLES");
        self.fragment.dependencies.insert("sqlalchemy".to_string());

        self.line(format!("statement = bind_placeholders({}, VARIABLES)", statement));
        let parameters: Vec<String> = properties
            .text("parameter_bindings")
            .map(|b| {
                b.split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("VARIABLES[{}]", py_str(v)))
                    .collect()
            })
            .unwrap_or_default();
        if parameters.is_empty() {
            self.line(format!("return execute_sql(engines[{}], statement)", py_str(&connection)));
        } else {
            self.line(format!("parameters = [{}]", parameters.join(", ")));
            self.line(format!(
                "return execute_sql(engines[{}], statement, parameters)",
                py_str(&connection)
            ));
        }
    }

    fn stub(&mut self) {
        let task = self.task;
        self.review(format!(
            "no automatic translation for {} task '{}'",
            task.task_type, task.name
        ));
        let names: Vec<&str> = task
            .properties
            .iter()
            .filter(|(_, v)| !v.is_sealed())
            .map(|(k, _)| k)
            .collect();
        if !names.is_empty() {
            self.line(format!("# task properties: {}", names.join(", ")));
        }
        self.line(format!(
            "logger.warning(\"Task %s requires manual translation\", {})",
            py_str(&task.name)
        ));
        self.line("return None");
    }
}
