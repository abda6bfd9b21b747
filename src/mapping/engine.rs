//! Mapping engine: orders each data flow and dispatches to the rule table

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{debug, warn};

use crate::error::{ConversionError, Diagnostic};
use crate::models::package::normalize_executable_path;
use crate::models::{DataFlow, OperatorType, PackageModel, TaskKind};

use super::python::SlugAllocator;
use super::rules::{map_passthrough, output_key, MappingRule, RuleContext, DEFAULT_RULES};
use super::tasks::{control_flow_order, lower_task};
use super::types::{DataFlowMapping, ExecutionStep, FailedDataFlow, PackageMapping, StepTarget};

/// Rule-table driven lowering of data flows and tasks
#[derive(Debug, Clone)]
pub struct MappingEngine {
    rules: HashMap<OperatorType, MappingRule>,
}

impl Default for MappingEngine {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl MappingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rule registered for an operator type
    pub fn with_rule(mut self, operator_type: OperatorType, rule: MappingRule) -> Self {
        self.rules.insert(operator_type, rule);
        self
    }

    fn rule(&self, operator_type: OperatorType) -> MappingRule {
        self.rules
            .get(&operator_type)
            .or_else(|| self.rules.get(&OperatorType::Unknown))
            .copied()
            .unwrap_or(map_passthrough)
    }

    /// Component indices in topological order, ties broken by declaration order
    pub fn topological_order(flow: &DataFlow) -> Result<Vec<usize>, ConversionError> {
        let positions: HashMap<_, _> = flow
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.key(), i))
            .collect();
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..flow.components.len()).map(|i| graph.add_node(i)).collect();
        for edge in &flow.edges {
            match (positions.get(&edge.start), positions.get(&edge.end)) {
                (Some(&start), Some(&end)) => {
                    graph.update_edge(nodes[start], nodes[end], ());
                }
                _ => debug!(data_flow = %flow.ref_path, start = %edge.start, end = %edge.end, "Edge outside the flow ignored"),
            }
        }

        if is_cyclic_directed(&graph) {
            let mut members: Vec<usize> = tarjan_scc(&graph)
                .into_iter()
                .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
                .flatten()
                .map(|n| graph[n])
                .collect();
            members.sort_unstable();
            return Err(ConversionError::CycleDetected {
                data_flow: flow.ref_path.clone(),
                members: members.into_iter().map(|i| flow.components[i].name.clone()).collect(),
            });
        }

        let mut in_degree: Vec<usize> = nodes
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
            order.push(i);
            for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
                let j = graph[next];
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }
        Ok(order)
    }

    /// Map one data flow; any `ConversionError` fails the whole flow
    pub fn map_data_flow(
        &self,
        package: &PackageModel,
        flow: &DataFlow,
        slug: &str,
    ) -> Result<DataFlowMapping, ConversionError> {
        let order = Self::topological_order(flow)?;
        let frames = frame_keys(flow);

        let mut mapping = DataFlowMapping {
            ref_path: flow.ref_path.clone(),
            name: flow.name.clone(),
            slug: slug.to_string(),
            fragments: Vec::with_capacity(order.len()),
            diagnostics: Vec::new(),
        };
        for index in order {
            let component = &flow.components[index];
            let ctx = RuleContext {
                package,
                flow,
                component,
                inputs: upstream_frames(flow, index, &frames),
                frame: frames[index].clone(),
            };
            let mut fragment = (self.rule(component.operator_type))(&ctx)?;
            let label = component
                .type_label
                .clone()
                .unwrap_or_else(|| component.operator_type.to_string());
            fragment.code.insert(0, format!("# {} ({})", component.name, label));
            debug!(
                data_flow = %flow.ref_path,
                component = %component.name,
                operator = %component.operator_type,
                lines = fragment.code.len(),
                "Mapped component"
            );
            mapping.diagnostics.append(&mut fragment.diagnostics);
            mapping.fragments.push(fragment);
        }
        Ok(mapping)
    }

    /// Map every data flow and task of a package
    ///
    /// A flow that fails lowering is recorded in `failed_flows` and as a
    /// diagnostic; its siblings are still mapped.
    pub fn map_package(&self, package: &PackageModel) -> PackageMapping {
        let mut mapping = PackageMapping::default();
        let (order, diagnostics) = control_flow_order(package);
        mapping.diagnostics.extend(diagnostics);

        let mut slugs = SlugAllocator::new();
        let mut slug_by_path: HashMap<String, String> = HashMap::new();
        for path in package.executables_in_order() {
            let name = package
                .data_flow_at(&path)
                .map(|f| f.name.clone())
                .or_else(|| package.task_at(&path).map(|t| t.name.clone()))
                .unwrap_or_else(|| path.clone());
            slug_by_path.insert(normalize_executable_path(&path), slugs.allocate(&name));
        }
        let slug_for = |path: &str| slug_by_path.get(&normalize_executable_path(path)).cloned();

        for flow in &package.data_flow_components {
            let slug = slug_for(&flow.ref_path).unwrap_or_else(|| slugs.allocate(&flow.name));
            match self.map_data_flow(package, flow, &slug) {
                Ok(flow_mapping) => mapping.data_flows.push(flow_mapping),
                Err(error) => {
                    warn!(data_flow = %flow.ref_path, "{}", error);
                    mapping.diagnostics.push(Diagnostic::Conversion(error.clone()));
                    mapping.failed_flows.push(FailedDataFlow {
                        ref_path: flow.ref_path.clone(),
                        name: flow.name.clone(),
                        slug,
                        error,
                    });
                }
            }
        }

        for task in &package.control_flow_tasks {
            let slug = slug_for(&task.ref_path).unwrap_or_else(|| slugs.allocate(&task.name));
            if let Some((fragment, diagnostics)) = lower_task(package, task, &slug) {
                mapping.diagnostics.extend(diagnostics);
                mapping.tasks.push(fragment);
            }
        }

        for path in order {
            let wanted = normalize_executable_path(&path);
            let step = if let Some(flow) = mapping.data_flows.iter().find(|f| normalize_executable_path(&f.ref_path) == wanted) {
                Some(ExecutionStep {
                    ref_path: flow.ref_path.clone(),
                    name: flow.name.clone(),
                    target: StepTarget::DataFlow { slug: flow.slug.clone() },
                    disabled: false,
                })
            } else if let Some(failed) = mapping
                .failed_flows
                .iter()
                .find(|f| normalize_executable_path(&f.ref_path) == wanted)
            {
                Some(ExecutionStep {
                    ref_path: failed.ref_path.clone(),
                    name: failed.name.clone(),
                    target: StepTarget::FailedDataFlow {
                        slug: failed.slug.clone(),
                        reason: failed.error.to_string(),
                    },
                    disabled: false,
                })
            } else {
                package.task_at(&path).map(|task| ExecutionStep {
                    ref_path: task.ref_path.clone(),
                    name: task.name.clone(),
                    target: match task.kind() {
                        TaskKind::Container => StepTarget::Container,
                        _ => StepTarget::Task {
                            slug: slug_for(&task.ref_path).unwrap_or_default(),
                        },
                    },
                    disabled: task.metadata.get("disabled").is_some_and(|d| d == "true"),
                })
            };
            mapping.steps.extend(step);
        }

        debug!(
            package = %package.name,
            data_flows = mapping.data_flows.len(),
            failed = mapping.failed_flows.len(),
            tasks = mapping.tasks.len(),
            "Mapped package"
        );
        mapping
    }
}

/// Frame key per component: its name, made unique with the local id
fn frame_keys(flow: &DataFlow) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for component in &flow.components {
        *counts.entry(component.name.trim()).or_default() += 1;
    }
    flow.components
        .iter()
        .map(|c| {
            let name = c.name.trim();
            if name.is_empty() {
                c.id.clone()
            } else if counts.get(name).copied().unwrap_or(0) > 1 {
                format!("{}#{}", name, c.id)
            } else {
                name.to_string()
            }
        })
        .collect()
}

/// Frames feeding a component, one per distinct incoming edge
fn upstream_frames(flow: &DataFlow, index: usize, frames: &[String]) -> Vec<String> {
    let key = flow.components[index].key();
    let mut inputs: Vec<String> = Vec::new();
    for edge in flow.incoming(&key) {
        let Some(start) = flow.components.iter().position(|c| c.key() == edge.start) else {
            continue;
        };
        let upstream = &flow.components[start];
        let output = edge
            .start_output
            .clone()
            .or_else(|| upstream.data_outputs().next().map(|o| o.name.clone()));
        let frame = match output {
            Some(output) => output_key(&frames[start], upstream, &output),
            None => frames[start].clone(),
        };
        if !inputs.contains(&frame) {
            inputs.push(frame);
        }
    }
    inputs
}
