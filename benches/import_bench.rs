//! Extraction and mapping benchmarks over synthetic packages

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ssis_migration_sdk::import::DtsxImporter;
use ssis_migration_sdk::mapping::map_package;

const DERIVED_COLUMN: &str = "{C9C7375C-8340-4F56-A550-919B1E4F4C66}";

/// A package with one data flow: a source followed by a chain of derived columns
fn package_with_chain(length: usize) -> String {
    let mut components = String::from(
        r#"<component id="1" name="Read" componentClassID="Microsoft.OLEDBSource">
  <properties><property name="SqlCommand">SELECT Id, Amount FROM dbo.Orders</property></properties>
  <connections><connection id="9" connectionManagerID="{CM-1}"/></connections>
  <outputs><output id="2" name="Read Output">
    <outputColumns><outputColumn id="3" name="Amount" lineageId="3" dataType="r8"/></outputColumns>
  </output></outputs>
</component>
"#,
    );
    let mut paths = String::new();
    let mut upstream_output = 2;
    for step in 0..length {
        let base = 100 + step * 10;
        components.push_str(&format!(
            r#"<component id="{base}" name="Step {step}" componentClassID="{DERIVED_COLUMN}">
  <inputs><input id="{input}" name="Step {step} Input">
    <inputColumns><inputColumn id="{column}" lineageId="3"/></inputColumns>
  </input></inputs>
  <outputs><output id="{output}" name="Step {step} Output">
    <outputColumns><outputColumn id="{derived}" name="Value{step}" lineageId="{derived}" dataType="r8">
      <properties><property name="FriendlyExpression">[Amount] * 2 + {step}</property></properties>
    </outputColumn></outputColumns>
  </output></outputs>
</component>
"#,
            input = base + 1,
            column = base + 2,
            output = base + 3,
            derived = base + 4,
        ));
        paths.push_str(&format!(
            "<path id=\"{}\" startId=\"{}\" endId=\"{}\"/>\n",
            base + 5,
            upstream_output,
            base + 1
        ));
        upstream_output = base + 3;
    }

    format!(
        r#"<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts" DTS:ObjectName="Bench">
  <DTS:ConnectionManagers>
    <DTS:ConnectionManager DTS:ObjectName="Warehouse" DTS:DTSID="{{CM-1}}" DTS:CreationName="OLEDB"
        DTS:ConnectionString="Data Source=db;Initial Catalog=Sales;Provider=SQLNCLI11.1;"/>
  </DTS:ConnectionManagers>
  <DTS:Executables>
    <DTS:Executable DTS:refId="Package\Flow" DTS:ObjectName="Flow" DTS:ExecutableType="Microsoft.Pipeline">
      <DTS:ObjectData><pipeline version="1">
        <components>{components}</components>
        <paths>{paths}</paths>
      </pipeline></DTS:ObjectData>
    </DTS:Executable>
  </DTS:Executables>
</DTS:Executable>"#
    )
}

fn bench_extract(c: &mut Criterion) {
    let importer = DtsxImporter::new();
    let mut group = c.benchmark_group("extract");
    for length in [10, 100, 500] {
        let xml = package_with_chain(length);
        group.bench_with_input(BenchmarkId::from_parameter(length), &xml, |b, xml| {
            b.iter(|| importer.parse_str(black_box(xml)))
        });
    }
    group.finish();
}

fn bench_map(c: &mut Criterion) {
    let importer = DtsxImporter::new();
    let mut group = c.benchmark_group("map");
    for length in [10, 100, 500] {
        let model = match importer.parse_str(&package_with_chain(length)) {
            Ok(outcome) => outcome.model,
            Err(e) => panic!("benchmark package failed to parse: {}", e),
        };
        group.bench_with_input(BenchmarkId::from_parameter(length), &model, |b, model| {
            b.iter(|| map_package(black_box(model)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_extract, bench_map);
criterion_main!(benches);
