//! Shared package fixtures

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Truncate task followed by a Source -> Derived Column -> Destination flow
///
/// Components are declared destination first so ordering comes from the
/// paths, not from the document.
pub const ORDERS_PACKAGE: &str = r#"<?xml version="1.0"?>
<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts"
    DTS:refId="Package"
    DTS:ObjectName="Load Orders"
    DTS:DTSID="{PKG-ORDERS}"
    DTS:VersionMajor="2" DTS:VersionMinor="0" DTS:VersionBuild="14"
    DTS:ExecutableType="Microsoft.Package">
  <DTS:ConnectionManagers>
    <DTS:ConnectionManager DTS:ObjectName="Warehouse" DTS:DTSID="{CM-WH}" DTS:CreationName="OLEDB">
      <DTS:ObjectData>
        <DTS:ConnectionManager DTS:ConnectionString="Data Source=$(SQL_SERVER);Initial Catalog=Sales;Provider=SQLNCLI11.1;Integrated Security=SSPI;"/>
      </DTS:ObjectData>
    </DTS:ConnectionManager>
  </DTS:ConnectionManagers>
  <DTS:Variables>
    <DTS:Variable DTS:ObjectName="SourceTable" DTS:Namespace="User">
      <DTS:VariableValue DTS:DataType="8">dbo.Orders</DTS:VariableValue>
    </DTS:Variable>
    <DTS:Variable DTS:ObjectName="DestinationTable" DTS:Namespace="User">
      <DTS:VariableValue DTS:DataType="8">stg.Orders</DTS:VariableValue>
    </DTS:Variable>
  </DTS:Variables>
  <DTS:Executables>
    <DTS:Executable DTS:refId="Package\Truncate" DTS:ObjectName="Truncate" DTS:ExecutableType="Microsoft.ExecuteSQLTask">
      <DTS:ObjectData>
        <SQLTask:SqlTaskData xmlns:SQLTask="www.microsoft.com/sqlserver/dts/tasks/sqltask"
            SQLTask:Connection="{CM-WH}" SQLTask:SqlStatementSource="TRUNCATE TABLE stg.Orders"/>
      </DTS:ObjectData>
    </DTS:Executable>
    <DTS:Executable DTS:refId="Package\Load" DTS:ObjectName="Load" DTS:ExecutableType="Microsoft.Pipeline">
      <DTS:ObjectData>
        <pipeline version="1">
          <components>
            <component id="30" name="Write Orders" componentClassID="{E9216C7C-4A8A-4F77-8948-60C5D8C75F70}" description="OLE DB Destination">
              <properties>
                <property name="AccessMode" dataType="System.Int32">0</property>
                <property name="OpenRowset" dataType="System.String">@[User::DestinationTable]</property>
              </properties>
              <connections>
                <connection id="35" name="OleDbConnection" connectionManagerID="{CM-WH}"/>
              </connections>
              <inputs>
                <input id="31" name="OLE DB Destination Input">
                  <inputColumns>
                    <inputColumn id="32" lineageId="3"/>
                    <inputColumn id="33" lineageId="14"/>
                  </inputColumns>
                </input>
              </inputs>
            </component>
            <component id="1" name="Read Orders" componentClassID="{E9216C7C-4A8A-4F77-8948-60C5D8C75F70}" description="OLE DB Source">
              <properties>
                <property name="AccessMode" dataType="System.Int32">2</property>
                <property name="SqlCommand" dataType="System.String">SELECT OrderId, Amount FROM @[User::SourceTable]</property>
              </properties>
              <connections>
                <connection id="5" name="OleDbConnection" connectionManagerID="{CM-WH}"/>
              </connections>
              <outputs>
                <output id="2" name="OLE DB Source Output">
                  <outputColumns>
                    <outputColumn id="3" name="Amount" lineageId="3" dataType="r8"/>
                    <outputColumn id="4" name="OrderId" lineageId="4" dataType="i4"/>
                  </outputColumns>
                </output>
              </outputs>
            </component>
            <component id="10" name="Add Load Date" componentClassID="{C9C7375C-8340-4F56-A550-919B1E4F4C66}">
              <inputs>
                <input id="11" name="Derived Column Input">
                  <inputColumns>
                    <inputColumn id="12" lineageId="3"/>
                  </inputColumns>
                </input>
              </inputs>
              <outputs>
                <output id="13" name="Derived Column Output">
                  <outputColumns>
                    <outputColumn id="14" name="LoadDate" lineageId="14" dataType="dbTimeStamp">
                      <properties>
                        <property name="Expression">GETDATE()</property>
                        <property name="FriendlyExpression">GETDATE()</property>
                      </properties>
                    </outputColumn>
                  </outputColumns>
                </output>
              </outputs>
            </component>
          </components>
          <paths>
            <path id="20" name="Source to Derived" startId="2" endId="11"/>
            <path id="21" name="Derived to Destination" startId="13" endId="31"/>
          </paths>
        </pipeline>
      </DTS:ObjectData>
    </DTS:Executable>
  </DTS:Executables>
  <DTS:PrecedenceConstraints>
    <DTS:PrecedenceConstraint DTS:From="Package\Truncate" DTS:To="Package\Load" DTS:Value="0"/>
  </DTS:PrecedenceConstraints>
</DTS:Executable>"#;

/// Two derived columns feeding each other
pub const CYCLIC_PACKAGE: &str = r#"<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts" DTS:ObjectName="Looping">
  <DTS:Executables>
    <DTS:Executable DTS:refId="Package\Spin" DTS:ObjectName="Spin" DTS:ExecutableType="Microsoft.Pipeline">
      <DTS:ObjectData>
        <pipeline version="1">
          <components>
            <component id="1" name="Stage" componentClassID="{C9C7375C-8340-4F56-A550-919B1E4F4C66}">
              <inputs><input id="2" name="Stage Input"/></inputs>
              <outputs><output id="3" name="Stage Output"/></outputs>
            </component>
            <component id="4" name="Stamp" componentClassID="{C9C7375C-8340-4F56-A550-919B1E4F4C66}">
              <inputs><input id="5" name="Stamp Input"/></inputs>
              <outputs><output id="6" name="Stamp Output"/></outputs>
            </component>
          </components>
          <paths>
            <path id="7" startId="3" endId="5"/>
            <path id="8" startId="6" endId="2"/>
          </paths>
        </pipeline>
      </DTS:ObjectData>
    </DTS:Executable>
  </DTS:Executables>
</DTS:Executable>"#;

/// A conditional split whose two outputs both feed one Union All
pub const SPLIT_PACKAGE: &str = r#"<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts" DTS:ObjectName="Route Orders">
  <DTS:ConnectionManagers>
    <DTS:ConnectionManager DTS:ObjectName="Warehouse" DTS:DTSID="{CM-WH}" DTS:CreationName="OLEDB"
        DTS:ConnectionString="Data Source=db01;Initial Catalog=Sales;Provider=SQLNCLI11.1;"/>
  </DTS:ConnectionManagers>
  <DTS:Executables>
    <DTS:Executable DTS:refId="Package\Route" DTS:ObjectName="Route" DTS:ExecutableType="Microsoft.Pipeline">
      <DTS:ObjectData>
        <pipeline version="1">
          <components>
            <component id="1" name="Read Orders" componentClassID="Microsoft.OLEDBSource">
              <properties>
                <property name="SqlCommand">SELECT OrderId, Amount FROM dbo.Orders</property>
              </properties>
              <connections>
                <connection id="5" name="OleDbConnection" connectionManagerID="{CM-WH}"/>
              </connections>
              <outputs>
                <output id="2" name="OLE DB Source Output">
                  <outputColumns>
                    <outputColumn id="3" name="Amount" lineageId="3" dataType="r8"/>
                  </outputColumns>
                </output>
              </outputs>
            </component>
            <component id="10" name="Split" componentClassID="Microsoft.ConditionalSplit">
              <inputs><input id="11" name="Conditional Split Input"/></inputs>
              <outputs>
                <output id="12" name="Big">
                  <properties>
                    <property name="EvaluationOrder" dataType="System.Int32">0</property>
                    <property name="FriendlyExpression">[Amount] &gt; 100</property>
                  </properties>
                </output>
                <output id="13" name="Small" isDefaultOut="true"/>
              </outputs>
            </component>
            <component id="20" name="Union" componentClassID="Microsoft.UnionAll">
              <inputs>
                <input id="21" name="Union All Input 1"/>
                <input id="22" name="Union All Input 2"/>
              </inputs>
              <outputs><output id="23" name="Union All Output 1"/></outputs>
            </component>
          </components>
          <paths>
            <path id="30" startId="2" endId="11"/>
            <path id="31" startId="12" endId="21"/>
            <path id="32" startId="13" endId="22"/>
          </paths>
        </pipeline>
      </DTS:ObjectData>
    </DTS:Executable>
  </DTS:Executables>
</DTS:Executable>"#;

/// [`ORDERS_PACKAGE`] with a path from the derived column back into itself
pub fn orders_with_self_loop() -> String {
    ORDERS_PACKAGE.replace(
        r#"<path id="21" name="Derived to Destination" startId="13" endId="31"/>"#,
        r#"<path id="21" name="Derived to Destination" startId="13" endId="31"/>
            <path id="22" name="Loop" startId="13" endId="11"/>"#,
    )
}

/// Encrypted override of the source statement of [`ORDERS_PACKAGE`]
pub const SEALED_STATEMENT_CONFIG: &str = r#"<?xml version="1.0"?>
<DTSConfiguration>
  <Configuration ConfiguredType="Property" Path="\Package\Load.Properties[[Read Orders].[SqlCommand]]" ValueType="String" Encrypted="1">
    <ConfiguredValue>AQAAANCMnd8BFdERjHoAwE_SECRET</ConfiguredValue>
  </Configuration>
</DTSConfiguration>"#;

/// Overrides for [`ORDERS_PACKAGE`], one of them encrypted
pub const ORDERS_CONFIG: &str = r#"<?xml version="1.0"?>
<DTSConfiguration>
  <DTSConfigurationHeading>
    <DTSConfigurationFileInfo GeneratedBy="CORP\etl" GeneratedFromPackageName="Load Orders" GeneratedFromPackageID="{PKG-ORDERS}"/>
  </DTSConfigurationHeading>
  <Configuration ConfiguredType="Property" Path="\Package.Variables[User::SourceTable].Properties[Value]" ValueType="String">
    <ConfiguredValue>dbo.Orders_%REGION%</ConfiguredValue>
  </Configuration>
  <Configuration ConfiguredType="Property" Path="\Package.Connections[Warehouse].Properties[Password]" ValueType="String" Encrypted="1">
    <ConfiguredValue>AQAAANCMnd8BFdERjHoAwE_SECRET</ConfiguredValue>
  </Configuration>
</DTSConfiguration>"#;

pub const SECRET: &str = "AQAAANCMnd8BFdERjHoAwE_SECRET";

/// Write `content` to `dir/name` and return the path
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}
