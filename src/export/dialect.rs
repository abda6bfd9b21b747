//! SQLAlchemy dialect hints for connection managers

use once_cell::sync::Lazy;

use crate::models::ConnectionManager;

/// SQLAlchemy dialect and the driver package it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Dialect and driver, e.g. `mssql+pyodbc`
    pub name: &'static str,
    /// Pip requirement for the driver, if any
    pub requirement: Option<&'static str>,
}

/// Provider prefixes (upper-cased) and the dialect they select, most specific first
static PROVIDERS: Lazy<Vec<(&'static str, Dialect)>> = Lazy::new(|| {
    let mssql = Dialect { name: "mssql+pyodbc", requirement: Some("pyodbc") };
    let oracle = Dialect { name: "oracle+cx_oracle", requirement: Some("cx_Oracle") };
    let mysql = Dialect { name: "mysql+pymysql", requirement: Some("pymysql") };
    let postgres = Dialect { name: "postgresql+psycopg2", requirement: Some("psycopg2-binary") };
    let sqlite = Dialect { name: "sqlite", requirement: None };
    vec![
        ("SQLNCLI", mssql),
        ("MSOLEDBSQL", mssql),
        ("SQLOLEDB", mssql),
        ("SYSTEM.DATA.SQLCLIENT", mssql),
        ("ORAOLEDB", oracle),
        ("MSDAORA", oracle),
        ("ORACLE", oracle),
        ("SYSTEM.DATA.ORACLECLIENT", oracle),
        ("MYSQL", mysql),
        ("POSTGRESQL", postgres),
        ("PGNP", postgres),
        ("NPGSQL", postgres),
        ("SQLITE", sqlite),
    ]
});

fn lookup(hint: &str) -> Option<Dialect> {
    let hint = hint.trim().to_ascii_uppercase();
    if hint.is_empty() {
        return None;
    }
    PROVIDERS
        .iter()
        .find(|(prefix, _)| hint.starts_with(prefix))
        .map(|(_, dialect)| *dialect)
}

/// Dialect for a connection manager
///
/// The `Provider` of the connection string is consulted first, then the
/// provider named in an ADO.NET creation name. File connections and sealed
/// connection strings without a usable creation name have no dialect.
pub fn dialect_for(manager: &ConnectionManager) -> Option<Dialect> {
    if manager.is_file_based() {
        return None;
    }
    let parameters = manager.parameters();
    parameters
        .get("provider")
        .and_then(|p| lookup(p))
        .or_else(|| {
            manager
                .creation_name
                .split_once(':')
                .and_then(|(_, provider)| lookup(provider))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropertyValue;

    #[test]
    fn test_provider_table() {
        let sql = ConnectionManager::new("{1}", "Warehouse", "OLEDB")
            .with_connection_string("Data Source=db01;Initial Catalog=DW;Provider=SQLNCLI11.1;");
        assert_eq!(dialect_for(&sql).unwrap().name, "mssql+pyodbc");

        let oracle = ConnectionManager::new("{2}", "Ledger", "OLEDB")
            .with_connection_string("Provider=OraOLEDB.Oracle.1;Data Source=LEDGER");
        let dialect = dialect_for(&oracle).unwrap();
        assert_eq!(dialect.name, "oracle+cx_oracle");
        assert_eq!(dialect.requirement, Some("cx_Oracle"));

        let ado = ConnectionManager::new("{3}", "Crm", "ADO.NET:System.Data.SqlClient.SqlConnection, System.Data");
        assert_eq!(dialect_for(&ado).unwrap().name, "mssql+pyodbc");
    }

    #[test]
    fn test_no_dialect() {
        let file = ConnectionManager::new("{1}", "Extract", "FLATFILE").with_connection_string("C:\\out\\orders.csv");
        assert!(dialect_for(&file).is_none());

        let mut sealed = ConnectionManager::new("{2}", "Secret", "OLEDB");
        sealed.connection_string = PropertyValue::sealed("Provider=SQLNCLI11;Password=x");
        assert!(dialect_for(&sealed).is_none());
    }
}
