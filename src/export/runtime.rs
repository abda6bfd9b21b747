//! Source of the runtime helper module shared by every generated artifact

/// Body of the runtime helper module
pub const RUNTIME_SOURCE: &str = r#""""Runtime helpers shared by the generated ETL modules"""

import logging
import os
import re
from urllib.parse import quote_plus

import sqlalchemy
from sqlalchemy import text

logger = logging.getLogger(__name__)

_VARIABLE = re.compile(r"@\[(\$?[A-Za-z_][A-Za-z0-9_]*)::([A-Za-z_][A-Za-z0-9_]*)\]")
_DOLLAR = re.compile(r"\$\(([A-Za-z_][A-Za-z0-9_]*)\)")
_PERCENT = re.compile(r"%([A-Za-z_][A-Za-z0-9_]*)%")


class ManualInput:
    """A value that has to be supplied before the package can run"""

    def __init__(self, location, reason):
        self.location = location
        self.reason = reason

    def __repr__(self):
        return "ManualInput(%r, %r)" % (self.location, self.reason)


class DataConversionError(Exception):
    """A column could not be coerced to its target type"""

    def __init__(self, component, column, target_type):
        super().__init__(
            "%s: column %r cannot be converted to %s" % (component, column, target_type)
        )
        self.component = component
        self.column = column
        self.target_type = target_type


class LookupNoMatchError(Exception):
    """Rows without a reference match reached a lookup configured to fail"""

    def __init__(self, component, count):
        super().__init__("%s: %d row(s) without a lookup match" % (component, count))
        self.component = component
        self.count = count


def require(value, name):
    """Return `value`, raising when it still needs manual input"""
    if isinstance(value, ManualInput):
        raise ValueError(
            "manual input required for %s (%s): %s" % (name, value.location, value.reason)
        )
    return value


def bind_placeholders(statement, variables, environ=None):
    """Substitute variable and environment placeholders in `statement`

    `@[Namespace::Name]` reads `variables`, `$(NAME)` reads the environment.
    `%NAME%` is replaced only when the environment defines NAME.
    """
    environ = os.environ if environ is None else environ

    def variable(match):
        name = "%s::%s" % (match.group(1), match.group(2))
        if name not in variables:
            raise KeyError("unbound variable %s" % name)
        return str(require(variables[name], name))

    def environment(match):
        name = match.group(1)
        if name not in environ:
            raise KeyError("unbound environment value %s" % name)
        return environ[name]

    def optional_environment(match):
        return environ.get(match.group(1), match.group(0))

    statement = _VARIABLE.sub(variable, statement)
    statement = _DOLLAR.sub(environment, statement)
    return _PERCENT.sub(optional_environment, statement)


def split_table_name(name):
    """Split `[schema].[table]` into (schema, table); schema may be None"""
    parts = [part.strip().strip('[]"`') for part in name.split(".")]
    parts = [part for part in parts if part]
    if not parts:
        raise ValueError("empty table name")
    if len(parts) == 1:
        return None, parts[0]
    return parts[-2], parts[-1]


def _url(name, connection, variables):
    parameters = {
        key: bind_placeholders(str(require(value, name)), variables)
        for key, value in connection.get("parameters", {}).items()
    }
    dialect = connection["dialect"]
    server = parameters.get("data source") or parameters.get("server")
    database = parameters.get("initial catalog") or parameters.get("database")
    user = parameters.get("user id") or parameters.get("uid")
    password = parameters.get("password") or parameters.get("pwd")
    if dialect == "sqlite":
        return "sqlite:///" + (database or server or "")
    if dialect == "mssql+pyodbc":
        odbc = "DRIVER={ODBC Driver 17 for SQL Server};SERVER=%s;DATABASE=%s;" % (
            server or "",
            database or "",
        )
        if user:
            odbc += "UID=%s;PWD=%s;" % (user, password or "")
        else:
            odbc += "Trusted_Connection=yes;"
        return "mssql+pyodbc:///?odbc_connect=" + quote_plus(odbc)
    return sqlalchemy.engine.URL.create(
        dialect, username=user, password=password, host=server, database=database
    )


def create_engines(connections, variables=None):
    """Create one SQLAlchemy engine per connection with a known dialect

    An explicit `url` entry wins over the parsed connection string.
    """
    variables = {} if variables is None else variables
    engines = {}
    for name, connection in connections.items():
        if connection.get("dialect") is None:
            logger.info("Connection %s has no SQL dialect; no engine created", name)
            continue
        require(connection.get("connection_string"), name)
        url = connection.get("url") or _url(name, connection, variables)
        engines[name] = sqlalchemy.create_engine(url)
    return engines


def execute_sql(engine, statement, parameters=None):
    """Run a statement and return the affected row count

    `?` markers bind the positional `parameters`.
    """
    bound = {}
    if parameters:
        pieces = statement.split("?")
        if len(pieces) - 1 != len(parameters):
            raise ValueError(
                "statement has %d marker(s) but %d parameter(s) were given"
                % (len(pieces) - 1, len(parameters))
            )
        rebuilt = [pieces[0]]
        for index, piece in enumerate(pieces[1:]):
            key = "p%d" % index
            rebuilt.append(":" + key + piece)
            bound[key] = require(parameters[index], key)
        statement = "".join(rebuilt)
    with engine.begin() as connection:
        result = connection.execute(text(statement), bound)
        return result.rowcount


def assert_columns(frame, columns):
    """Fail when `frame` lacks any of `columns`"""
    missing = [column for column in columns if column not in frame.columns]
    if missing:
        raise AssertionError("missing columns: %s" % ", ".join(missing))
"#;
