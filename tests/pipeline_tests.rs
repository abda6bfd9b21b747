//! End-to-end conversion tests

mod common;

use std::fs;

use common::{ORDERS_CONFIG, ORDERS_PACKAGE, SEALED_STATEMENT_CONFIG, SECRET, write_file};
use ssis_migration_sdk::error::Diagnostic;
use ssis_migration_sdk::overlay::BindingKind;
use ssis_migration_sdk::pipeline::{BatchRunner, MigrationConfig, MigrationPipeline, convert_package};
use tempfile::TempDir;

mod single_package_tests {
    use super::*;

    #[test]
    fn test_convert_orders_package() {
        let temp = TempDir::new().unwrap();
        let package = write_file(temp.path(), "orders.dtsx", ORDERS_PACKAGE);
        let output = temp.path().join("out");

        let conversion = convert_package(&package, MigrationConfig::new().with_output_dir(&output)).unwrap();

        assert_eq!(
            conversion.artifacts.names(),
            vec![
                "etl_runtime.py",
                "load_orders_config.py",
                "load_orders_dataflow_load.py",
                "load_orders_main.py",
                "load_orders_task_truncate.py",
                "requirements.txt",
            ]
        );
        let written = output.join("orders");
        assert_eq!(conversion.output_dir.as_deref(), Some(written.as_path()));
        for name in conversion.artifacts.names() {
            assert!(written.join(name).exists(), "{} not written", name);
        }
        assert!(!output.join("orders.partial").exists());

        let requirements = fs::read_to_string(written.join("requirements.txt")).unwrap();
        assert_eq!(requirements, "pandas\npyodbc\nsqlalchemy\n");
    }

    #[test]
    fn test_generated_flow_and_main() {
        let temp = TempDir::new().unwrap();
        let package = write_file(temp.path(), "orders.dtsx", ORDERS_PACKAGE);
        let config = MigrationConfig::new().with_write_artifacts(false);
        let conversion = MigrationPipeline::new(config).unwrap().convert_file(&package).unwrap();

        let flow = &conversion.artifacts.get("load_orders_dataflow_load.py").unwrap().content;
        assert!(flow.contains("def run_load(engines, frames=None):"));
        assert!(flow.contains("def validate_load(frames):"));
        let source = flow.find("# Read Orders").unwrap();
        let derived = flow.find("# Add Load Date").unwrap();
        let destination = flow.find("# Write Orders").unwrap();
        assert!(source < derived && derived < destination);
        assert!(flow.contains("pd.Timestamp.now()"));

        let main = &conversion.artifacts.get("load_orders_main.py").unwrap().content;
        let truncate = main.find("run_truncate(engines)").unwrap();
        let load = main.find("run_load(engines").unwrap();
        assert!(truncate < load);
        assert!(main.contains("if __name__ == \"__main__\":"));
    }

    #[test]
    fn test_bindings_collected() {
        let temp = TempDir::new().unwrap();
        let package = write_file(temp.path(), "orders.dtsx", ORDERS_PACKAGE);
        let config = MigrationConfig::new().with_write_artifacts(false);
        let conversion = convert_package(&package, config).unwrap();

        let source_table = conversion.bindings.get("SourceTable").unwrap();
        assert_eq!(source_table.kind, BindingKind::PackageVariable);
        assert!(conversion.bindings.contains("DestinationTable"));
        assert_eq!(conversion.bindings.get("SQL_SERVER").unwrap().kind, BindingKind::Environment);

        let config_module = &conversion.artifacts.get("load_orders_config.py").unwrap().content;
        assert!(config_module.contains("REQUIRED_BINDINGS"));
        assert!(config_module.contains("\"SQL_SERVER\""));
    }

    #[test]
    fn test_encrypted_values_never_emitted() {
        let temp = TempDir::new().unwrap();
        let package = write_file(temp.path(), "orders.dtsx", ORDERS_PACKAGE);
        write_file(temp.path(), "orders.dtsConfig", ORDERS_CONFIG);
        let output = temp.path().join("out");

        let conversion = convert_package(&package, MigrationConfig::new().with_output_dir(&output)).unwrap();

        assert!(conversion.needs_review());
        for artifact in conversion.artifacts.iter() {
            assert!(!artifact.content.contains(SECRET), "ciphertext leaked into {}", artifact.name);
        }
        for entry in fs::read_dir(output.join("orders")).unwrap() {
            let content = fs::read_to_string(entry.unwrap().path()).unwrap();
            assert!(!content.contains(SECRET));
        }
        let config_module = &conversion.artifacts.get("load_orders_config.py").unwrap().content;
        assert!(config_module.contains("ManualInput("));
        assert!(config_module.contains("\"dbo.Orders_%REGION%\""));
    }

    #[test]
    fn test_encrypted_component_property_becomes_placeholder() {
        let temp = TempDir::new().unwrap();
        let package = write_file(temp.path(), "orders.dtsx", ORDERS_PACKAGE);
        write_file(temp.path(), "orders.dtsConfig", SEALED_STATEMENT_CONFIG);
        let config = MigrationConfig::new().with_write_artifacts(false);

        let conversion = convert_package(&package, config).unwrap();

        assert!(conversion.mapping.failed_flows.is_empty());
        let flow = &conversion.artifacts.get("load_orders_dataflow_load.py").unwrap().content;
        assert!(flow.contains(
            "require(ManualInput(\"Package\\\\Load.Properties[[Read Orders].[SqlCommand]]\", \"encrypted value requires manual decryption\"), \"SqlCommand\")"
        ));
        assert!(flow.contains("ManualInput"));
        for artifact in conversion.artifacts.iter() {
            assert!(!artifact.content.contains(SECRET), "ciphertext leaked into {}", artifact.name);
        }
        let notes = conversion
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::ManualInput(_)))
            .count();
        assert!(notes >= 2);
        assert!(conversion.needs_review());
    }

    #[test]
    fn test_rerun_replaces_previous_output() {
        let temp = TempDir::new().unwrap();
        let package = write_file(temp.path(), "orders.dtsx", ORDERS_PACKAGE);
        let output = temp.path().join("out");
        let config = MigrationConfig::new().with_output_dir(&output);

        convert_package(&package, config.clone()).unwrap();
        fs::write(output.join("orders").join("leftover.py"), "x = 1").unwrap();
        convert_package(&package, config).unwrap();

        assert!(!output.join("orders").join("leftover.py").exists());
        assert!(output.join("orders").join("load_orders_main.py").exists());
    }

    #[test]
    fn test_unreadable_package_is_fatal() {
        let temp = TempDir::new().unwrap();
        let package = write_file(temp.path(), "broken.dtsx", "<Package/>");
        let output = temp.path().join("out");

        let err = convert_package(&package, MigrationConfig::new().with_output_dir(&output)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.stage_name(), "parse");
        assert!(!output.join("broken").exists());
    }
}

mod batch_tests {
    use super::*;

    #[test]
    fn test_batch_isolates_failures() {
        let temp = TempDir::new().unwrap();
        let east = temp.path().join("east");
        let west = temp.path().join("west");
        fs::create_dir_all(&east).unwrap();
        fs::create_dir_all(&west).unwrap();
        let paths = vec![
            write_file(&east, "orders.dtsx", ORDERS_PACKAGE),
            write_file(temp.path(), "broken.dtsx", "<Package/>"),
            write_file(&west, "orders.dtsx", &ORDERS_PACKAGE.replace("Load Orders", "Load Returns")),
        ];
        let output = temp.path().join("out");

        let runner = BatchRunner::new(MigrationConfig::new().with_output_dir(&output).with_max_workers(2)).unwrap();
        let report = runner.run(&paths);

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
        assert_eq!(report.outcomes[1].path, paths[1]);
        assert!(report.outcomes[1].result.is_err());

        assert!(output.join("orders").join("load_orders_main.py").exists());
        assert!(output.join("orders_2").join("load_returns_main.py").exists());

        assert_eq!(report.shared_connections.len(), 1);
        assert_eq!(report.shared_connections[0].name, "Warehouse");
        assert_eq!(report.shared_connections[0].packages, vec!["Load Orders", "Load Returns"]);
    }
}
