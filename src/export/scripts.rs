//! Rendering of the data-flow, task and main modules

use crate::mapping::python::{comment_text, doc_text, py_str};
use crate::mapping::{DataFlowMapping, FailedDataFlow, ImportSet, PackageMapping, StepTarget, TaskFragment};
use crate::models::PackageModel;

/// Module names shared by every rendered artifact of one package
#[derive(Debug, Clone)]
pub struct ModuleNames {
    /// Prefix derived from the package name
    pub package: String,
    pub runtime: String,
}

impl ModuleNames {
    pub fn config(&self) -> String {
        format!("{}_config", self.package)
    }

    pub fn main(&self) -> String {
        format!("{}_main", self.package)
    }

    pub fn data_flow(&self, slug: &str) -> String {
        format!("{}_dataflow_{}", self.package, slug)
    }

    pub fn task(&self, slug: &str) -> String {
        format!("{}_task_{}", self.package, slug)
    }
}

fn indent(lines: &mut Vec<String>, body: &[String]) {
    for line in body {
        if line.trim().is_empty() {
            lines.push(String::new());
        } else {
            lines.push(format!("    {}", line));
        }
    }
}

fn finish(lines: Vec<String>) -> String {
    let mut source = lines.join("\n");
    source.push('\n');
    source
}

/// Render the module of one mapped data flow
pub fn render_data_flow(names: &ModuleNames, package: &PackageModel, flow: &DataFlowMapping) -> String {
    let mut imports = flow.imports();
    imports.module("logging");
    let mut lines = vec![
        format!(
            "\"\"\"Data flow '{}' of package {}\"\"\"",
            doc_text(&flow.name),
            doc_text(&package.name)
        ),
        String::new(),
    ];
    lines.extend(imports.render(&names.runtime, &names.config()));
    lines.push(String::new());
    lines.push("logger = logging.getLogger(__name__)".to_string());
    lines.push(String::new());
    lines.push(String::new());

    lines.push(format!("def run_{}(engines, frames=None):", flow.slug));
    lines.push(format!(
        "    \"\"\"Run '{}' and return the frames it produced\"\"\"",
        doc_text(&flow.name)
    ));
    let mut body = vec![
        "frames = {} if frames is None else frames".to_string(),
        format!("logger.info(\"Starting data flow %s\", {})", py_str(&flow.name)),
    ];
    for fragment in &flow.fragments {
        body.push(String::new());
        body.extend(fragment.code.iter().cloned());
    }
    body.push(String::new());
    body.push(format!("logger.info(\"Finished data flow %s\", {})", py_str(&flow.name)));
    body.push("return frames".to_string());
    indent(&mut lines, &body);
    lines.push(String::new());
    lines.push(String::new());

    lines.push(format!("def validate_{}(frames):", flow.slug));
    lines.push("    \"\"\"Check the column layout of the produced frames\"\"\"".to_string());
    let assertions: Vec<String> = flow
        .fragments
        .iter()
        .flat_map(|f| f.assertions.iter().cloned())
        .collect();
    if assertions.is_empty() {
        lines.push("    return None".to_string());
    } else {
        indent(&mut lines, &assertions);
    }
    finish(lines)
}

/// Render the module of one lowered task
pub fn render_task(names: &ModuleNames, package: &PackageModel, task: &TaskFragment) -> String {
    let mut imports = task.imports.clone();
    imports.module("logging");
    let mut lines = vec![
        format!(
            "\"\"\"Task '{}' ({}) of package {}\"\"\"",
            doc_text(&task.name),
            doc_text(&task.task_type),
            doc_text(&package.name)
        ),
        String::new(),
    ];
    lines.extend(imports.render(&names.runtime, &names.config()));
    lines.push(String::new());
    lines.push("logger = logging.getLogger(__name__)".to_string());
    lines.push(String::new());
    lines.push(String::new());
    lines.push(format!("def run_{}(engines):", task.slug));
    lines.push(format!("    \"\"\"Run task '{}'\"\"\"", doc_text(&task.name)));
    let mut body = vec![format!("logger.info(\"Starting task %s\", {})", py_str(&task.name))];
    body.extend(task.code.iter().cloned());
    indent(&mut lines, &body);
    finish(lines)
}

fn failed_entry_point(lines: &mut Vec<String>, failed: &FailedDataFlow) {
    lines.push(String::new());
    lines.push(String::new());
    lines.push(format!("def run_{}(engines, frames=None):", failed.slug));
    lines.push(format!(
        "    \"\"\"Data flow '{}' could not be converted\"\"\"",
        doc_text(&failed.name)
    ));
    lines.push(format!(
        "    raise NotImplementedError({})",
        py_str(&format!("data flow '{}' was not converted: {}", failed.name, failed.error))
    ));
}

/// Render the entry-point module running the control flow
pub fn render_main(names: &ModuleNames, package: &PackageModel, mapping: &PackageMapping) -> String {
    let mut imports = ImportSet::new();
    imports
        .module("logging")
        .module("sys")
        .runtime("create_engines")
        .config("CONNECTIONS")
        .config("PACKAGE_METADATA")
        .config("VARIABLES")
        .config("resolve_bindings");

    let mut lines = vec![
        format!("\"\"\"Entry point for package {}\"\"\"", doc_text(&package.name)),
        String::new(),
    ];
    lines.extend(imports.render(&names.runtime, &names.config()));
    for step in &mapping.steps {
        let (module, slug) = match &step.target {
            StepTarget::DataFlow { slug } => (names.data_flow(slug), slug),
            StepTarget::Task { slug } => (names.task(slug), slug),
            StepTarget::FailedDataFlow { .. } | StepTarget::Container => continue,
        };
        lines.push(format!("from {} import run_{}", module, slug));
    }
    lines.push(String::new());
    lines.push(format!("logger = logging.getLogger({})", py_str(&names.main())));
    lines.push(String::new());
    lines.push(String::new());
    lines.push("def setup_logging(level=logging.INFO):".to_string());
    lines.push("    logging.basicConfig(".to_string());
    lines.push("        level=level,".to_string());
    lines.push("        format=\"%(asctime)s - %(name)s - %(levelname)s - %(message)s\",".to_string());
    lines.push("        stream=sys.stdout,".to_string());
    lines.push("    )".to_string());

    for failed in &mapping.failed_flows {
        failed_entry_point(&mut lines, failed);
    }

    lines.push(String::new());
    lines.push(String::new());
    lines.push("def run_package(engines):".to_string());
    lines.push("    \"\"\"Run the control flow in precedence order\"\"\"".to_string());
    let mut body = Vec::new();
    for step in &mapping.steps {
        let name = comment_text(&step.name);
        if step.disabled {
            body.push(format!("# {} (disabled)", name));
            continue;
        }
        match &step.target {
            StepTarget::Container => body.push(format!("# {} (container)", name)),
            StepTarget::DataFlow { slug } | StepTarget::FailedDataFlow { slug, .. } => {
                body.push(format!("# {}", name));
                body.push(format!("run_{}(engines)", slug));
            }
            StepTarget::Task { slug } => {
                body.push(format!("# {}", name));
                body.push(format!("run_{}(engines)", slug));
            }
        }
    }
    if !body.iter().any(|l| !l.starts_with('#')) {
        body.push("return None".to_string());
    }
    indent(&mut lines, &body);

    lines.push(String::new());
    lines.push(String::new());
    for line in MAIN_BODY.lines() {
        lines.push(line.to_string());
    }
    finish(lines)
}

const MAIN_BODY: &str = r#"def main():
    setup_logging()
    name = PACKAGE_METADATA["name"]
    logger.info("Starting package %s", name)
    try:
        resolve_bindings()
        engines = create_engines(CONNECTIONS, VARIABLES)
        run_package(engines)
    except Exception:
        logger.exception("Package %s failed", name)
        return 1
    logger.info("Package %s finished", name)
    return 0


if __name__ == "__main__":
    sys.exit(main())"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use crate::mapping::{ExecutionStep, MappedFragment};
    use crate::models::{ComponentKey, OperatorType};

    fn names() -> ModuleNames {
        ModuleNames {
            package: "orders".to_string(),
            runtime: "etl_runtime".to_string(),
        }
    }

    fn flow() -> DataFlowMapping {
        let mut fragment = MappedFragment::new(ComponentKey::new("Package\\Load", "1"), "Orders", OperatorType::Source);
        fragment.imports.module("pandas as pd");
        fragment.line("# Orders (source)");
        fragment.line("df = pd.DataFrame()");
        fragment.line("frames[\"Orders\"] = df");
        fragment.assertions.push("assert_columns(frames[\"Orders\"], [\"Id\"])".to_string());
        fragment.imports.runtime("assert_columns");
        DataFlowMapping {
            ref_path: "Package\\Load".to_string(),
            name: "Load".to_string(),
            slug: "load".to_string(),
            fragments: vec![fragment],
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_render_data_flow_module() {
        let source = render_data_flow(&names(), &PackageModel::new("Orders"), &flow());
        assert!(source.contains("import logging\nimport pandas as pd\n\nfrom etl_runtime import assert_columns\n"));
        assert!(source.contains("def run_load(engines, frames=None):\n"));
        assert!(source.contains("\n    df = pd.DataFrame()\n"));
        assert!(source.contains("def validate_load(frames):\n"));
        assert!(source.contains("    assert_columns(frames[\"Orders\"], [\"Id\"])\n"));
        assert!(source.ends_with('\n'));
    }

    #[test]
    fn test_render_main_orders_steps() {
        let mut mapping = PackageMapping::default();
        mapping.steps = vec![
            ExecutionStep {
                ref_path: "Package\\Truncate".to_string(),
                name: "Truncate".to_string(),
                target: StepTarget::Task { slug: "truncate".to_string() },
                disabled: false,
            },
            ExecutionStep {
                ref_path: "Package\\Load".to_string(),
                name: "Load".to_string(),
                target: StepTarget::DataFlow { slug: "load".to_string() },
                disabled: false,
            },
            ExecutionStep {
                ref_path: "Package\\Archive".to_string(),
                name: "Archive".to_string(),
                target: StepTarget::Task { slug: "archive".to_string() },
                disabled: true,
            },
        ];
        mapping.failed_flows.push(FailedDataFlow {
            ref_path: "Package\\Broken".to_string(),
            name: "Broken".to_string(),
            slug: "broken".to_string(),
            error: ConversionError::CycleDetected {
                data_flow: "Package\\Broken".to_string(),
                members: vec!["A".to_string(), "B".to_string()],
            },
        });

        let source = render_main(&names(), &PackageModel::new("Orders"), &mapping);
        assert!(source.contains("from orders_task_truncate import run_truncate\n"));
        assert!(source.contains("from orders_dataflow_load import run_load\n"));
        let truncate = source.find("    run_truncate(engines)").unwrap();
        let load = source.find("    run_load(engines)").unwrap();
        assert!(truncate < load);
        assert!(source.contains("    # Archive (disabled)\n"));
        assert!(source.contains("def run_broken(engines, frames=None):"));
        assert!(source.contains("cycle detected"));
        assert!(source.contains("if __name__ == \"__main__\":\n    sys.exit(main())\n"));
    }

    #[test]
    fn test_render_main_without_steps() {
        let source = render_main(&names(), &PackageModel::new("Empty"), &PackageMapping::default());
        assert!(source.contains("def run_package(engines):\n    \"\"\"Run the control flow in precedence order\"\"\"\n    return None\n"));
    }
}
