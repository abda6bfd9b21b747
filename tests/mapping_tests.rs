//! Mapping engine tests

mod common;

use common::{CYCLIC_PACKAGE, ORDERS_PACKAGE, SPLIT_PACKAGE, orders_with_self_loop};
use ssis_migration_sdk::error::ConversionError;
use ssis_migration_sdk::import::DtsxImporter;
use ssis_migration_sdk::mapping::{MappingEngine, StepTarget, map_package};
use ssis_migration_sdk::models::PackageModel;

fn orders() -> PackageModel {
    DtsxImporter::new().parse_str(ORDERS_PACKAGE).unwrap().model
}

mod data_flow_mapping_tests {
    use super::*;

    #[test]
    fn test_fragments_follow_paths_not_declaration() {
        let mapping = map_package(&orders());
        assert!(mapping.failed_flows.is_empty());

        let flow = mapping.data_flow("Load").unwrap();
        let names: Vec<&str> = flow.fragments.iter().map(|f| f.component_name.as_str()).collect();
        assert_eq!(names, vec!["Read Orders", "Add Load Date", "Write Orders"]);
    }

    #[test]
    fn test_fragment_code() {
        let mapping = map_package(&orders());
        let flow = mapping.data_flow("Load").unwrap();

        let source = flow.fragment("Read Orders").unwrap().code.join("\n");
        assert!(source.contains("# Read Orders (OLE DB Source)"));
        assert!(source.contains("bind_placeholders(\"SELECT OrderId, Amount FROM @[User::SourceTable]\", VARIABLES)"));
        assert!(source.contains("engines[\"Warehouse\"]"));

        let derived = flow.fragment("Add Load Date").unwrap();
        assert_eq!(derived.reads, vec!["Read Orders"]);
        assert!(derived.code.iter().any(|l| l == "df[\"LoadDate\"] = pd.Timestamp.now()"));

        let destination = flow.fragment("Write Orders").unwrap();
        assert_eq!(destination.reads, vec!["Add Load Date"]);
        let code = destination.code.join("\n");
        assert!(code.contains("split_table_name(bind_placeholders(\"@[User::DestinationTable]\", VARIABLES))"));
        assert!(code.contains("if_exists=\"append\""));
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let package = orders();
        let engine = MappingEngine::new();
        assert_eq!(engine.map_package(&package), engine.map_package(&package));
    }

    #[test]
    fn test_cycle_reported_with_members() {
        let package = DtsxImporter::new().parse_str(CYCLIC_PACKAGE).unwrap().model;
        let err = MappingEngine::topological_order(&package.data_flow_components[0]).unwrap_err();
        match &err {
            ConversionError::CycleDetected { data_flow, members } => {
                assert!(data_flow.ends_with("Spin"));
                assert_eq!(members, &vec!["Stage".to_string(), "Stamp".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().contains("cycle detected"));
    }

    #[test]
    fn test_cyclic_flow_fails_alone() {
        let package = DtsxImporter::new().parse_str(CYCLIC_PACKAGE).unwrap().model;
        let mapping = map_package(&package);
        assert!(mapping.data_flows.is_empty());
        assert_eq!(mapping.failed_flows.len(), 1);
        assert!(mapping.failed_flows[0].error.to_string().contains("cycle detected"));
        assert!(matches!(mapping.steps[0].target, StepTarget::FailedDataFlow { .. }));
    }

    #[test]
    fn test_split_outputs_feeding_one_target() {
        let package = DtsxImporter::new().parse_str(SPLIT_PACKAGE).unwrap().model;
        let edges: Vec<Option<&str>> = package.data_flow_components[0]
            .edges
            .iter()
            .map(|e| e.start_output.as_deref())
            .collect();
        assert_eq!(edges, vec![Some("OLE DB Source Output"), Some("Big"), Some("Small")]);

        let mapping = map_package(&package);
        assert!(mapping.failed_flows.is_empty());
        let union = mapping.data_flow("Route").unwrap().fragment("Union").unwrap();
        assert_eq!(union.reads, vec!["Split.Big", "Split.Small"]);
        assert!(union
            .code
            .iter()
            .any(|l| l == "df = pd.concat([frames[\"Split.Big\"], frames[\"Split.Small\"]], ignore_index=True)"));
    }

    #[test]
    fn test_self_loop_fails_the_flow() {
        let package = DtsxImporter::new().parse_str(&orders_with_self_loop()).unwrap().model;
        let mapping = map_package(&package);

        assert!(mapping.data_flows.is_empty());
        match &mapping.failed_flows[0].error {
            ConversionError::CycleDetected { members, .. } => assert_eq!(members, &vec!["Add Load Date".to_string()]),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(mapping.steps[0].target, StepTarget::Task { slug: "truncate".to_string() });
        assert!(matches!(mapping.steps[1].target, StepTarget::FailedDataFlow { .. }));
    }
}

mod control_flow_mapping_tests {
    use super::*;

    #[test]
    fn test_steps_follow_precedence() {
        let mapping = map_package(&orders());
        let steps: Vec<&str> = mapping.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(steps, vec!["Truncate", "Load"]);
        assert_eq!(mapping.steps[0].target, StepTarget::Task { slug: "truncate".to_string() });
        assert_eq!(mapping.steps[1].target, StepTarget::DataFlow { slug: "load".to_string() });
    }

    #[test]
    fn test_execute_sql_task_lowered() {
        let mapping = map_package(&orders());
        assert_eq!(mapping.tasks.len(), 1);
        let code = mapping.tasks[0].code.join("\n");
        assert!(code.contains("TRUNCATE TABLE stg.Orders"));
        assert!(code.contains("execute_sql(engines[\"Warehouse\"], statement)"));
    }
}
