//! Reverse engineering: read a live database's tables and render them as DSL
//! source. The mapping back to DSL types is best-effort; anything the DSL
//! cannot express is left out rather than guessed at.

use crate::adapter::{DbAdapter, Row};
use crate::codegen::Dialect;
use crate::error::{Error, Result};

/// Render every user table in the database (or the named PostgreSQL schema)
/// as DSL text.
pub async fn pull_schema(
    adapter: &dyn DbAdapter,
    dialect: Dialect,
    schema: Option<&str>,
) -> Result<String> {
    let tables = match dialect {
        Dialect::Postgres => postgres_tables(adapter, schema.unwrap_or("public")).await?,
        Dialect::Mysql => mysql_tables(adapter).await?,
        Dialect::Sqlite => sqlite_tables(adapter).await?,
    };

    let mut out = String::new();
    for table in &tables {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("model {} {{\n", table.name));
        for column in &table.columns {
            out.push_str("  ");
            out.push_str(&column.render());
            out.push('\n');
        }
        out.push_str("}\n");
    }
    Ok(out)
}

struct TableInfo {
    name: String,
    columns: Vec<ColumnInfo>,
}

struct ColumnInfo {
    name: String,
    dsl_type: String,
    primary_key: bool,
    not_null: bool,
    default: Option<String>,
}

impl ColumnInfo {
    fn render(&self) -> String {
        let mut line = format!("{} {}", self.name, self.dsl_type);
        if self.primary_key {
            line.push_str(" @pk");
        }
        if self.not_null && !self.primary_key {
            line.push_str(" @notnull");
        }
        if let Some(default) = &self.default {
            line.push_str(&format!(" @default({})", default));
        }
        line
    }
}

fn text(row: &Row, key: &str) -> String {
    row.get(key).and_then(|v| v.clone()).unwrap_or_default()
}

async fn postgres_tables(adapter: &dyn DbAdapter, schema: &str) -> Result<Vec<TableInfo>> {
    let schema_lit = schema.replace('\'', "''");
    let table_rows = adapter
        .query(&format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = '{}' AND table_type = 'BASE TABLE' ORDER BY table_name",
            schema_lit
        ))
        .await?;

    let mut tables = Vec::new();
    for table_row in &table_rows {
        let table_name = text(table_row, "table_name");
        let pk_rows = adapter
            .query(&format!(
                "SELECT kcu.column_name FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                 ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = '{}' \
                 AND tc.table_name = '{}'",
                schema_lit,
                table_name.replace('\'', "''")
            ))
            .await?;
        let pk_columns: Vec<String> = pk_rows.iter().map(|r| text(r, "column_name")).collect();

        let column_rows = adapter
            .query(&format!(
                "SELECT column_name, data_type, is_nullable, column_default, \
                 character_maximum_length, numeric_precision, numeric_scale \
                 FROM information_schema.columns \
                 WHERE table_schema = '{}' AND table_name = '{}' ORDER BY ordinal_position",
                schema_lit,
                table_name.replace('\'', "''")
            ))
            .await?;

        let mut columns = Vec::new();
        for row in &column_rows {
            let name = text(row, "column_name");
            let data_type = text(row, "data_type").to_lowercase();
            let default = row.get("column_default").and_then(|v| v.clone());
            let serial = default
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("));
            let dsl_type = if serial {
                "Serial".to_string()
            } else {
                postgres_dsl_type(&data_type, row)
            };
            columns.push(ColumnInfo {
                primary_key: pk_columns.contains(&name),
                not_null: text(row, "is_nullable") == "NO",
                default: if serial {
                    None
                } else {
                    default.as_deref().and_then(simple_default)
                },
                name,
                dsl_type,
            });
        }
        tables.push(TableInfo {
            name: table_name,
            columns,
        });
    }
    Ok(tables)
}

fn postgres_dsl_type(data_type: &str, row: &Row) -> String {
    match data_type {
        "integer" => "Int".to_string(),
        "bigint" => "BigInt".to_string(),
        "smallint" => "SmallInt".to_string(),
        "character varying" => match text(row, "character_maximum_length").as_str() {
            "" => "VarChar".to_string(),
            len => format!("VarChar({})", len),
        },
        "character" => match text(row, "character_maximum_length").as_str() {
            "" => "Char".to_string(),
            len => format!("Char({})", len),
        },
        "text" => "Text".to_string(),
        "boolean" => "Boolean".to_string(),
        "timestamp without time zone" | "timestamp with time zone" => "Timestamp".to_string(),
        "date" => "Date".to_string(),
        "time without time zone" | "time with time zone" => "Time".to_string(),
        "numeric" => {
            let precision = text(row, "numeric_precision");
            let scale = text(row, "numeric_scale");
            if precision.is_empty() {
                "Numeric".to_string()
            } else {
                format!("Decimal({}, {})", precision, scale)
            }
        }
        "real" => "Real".to_string(),
        "double precision" => "DoublePrecision".to_string(),
        "json" => "Json".to_string(),
        "jsonb" => "Jsonb".to_string(),
        "uuid" => "Uuid".to_string(),
        _ => "Text".to_string(),
    }
}

async fn mysql_tables(adapter: &dyn DbAdapter) -> Result<Vec<TableInfo>> {
    let table_rows = adapter
        .query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name",
        )
        .await?;

    let mut tables = Vec::new();
    for table_row in &table_rows {
        let table_name = first_value(table_row);
        let column_rows = adapter
            .query(&format!("SHOW COLUMNS FROM `{}`", table_name))
            .await?;
        let mut columns = Vec::new();
        for row in &column_rows {
            let column_type = text(row, "Type").to_lowercase();
            columns.push(ColumnInfo {
                name: text(row, "Field"),
                dsl_type: mysql_dsl_type(&column_type),
                primary_key: text(row, "Key") == "PRI",
                not_null: text(row, "Null") == "NO",
                default: row
                    .get("Default")
                    .and_then(|v| v.as_deref())
                    .and_then(simple_default),
            });
        }
        tables.push(TableInfo {
            name: table_name,
            columns,
        });
    }
    Ok(tables)
}

fn mysql_dsl_type(column_type: &str) -> String {
    if let Some(rest) = column_type.strip_prefix("enum(") {
        let variants = rest
            .trim_end_matches(')')
            .split(',')
            .map(|v| v.trim().trim_matches('\'').to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return format!("Enum({})", variants);
    }
    if column_type == "char(36)" {
        return "Uuid".to_string();
    }
    if let Some(len) = between(column_type, "varchar(", ")") {
        return format!("VarChar({})", len);
    }
    if let Some(len) = between(column_type, "char(", ")") {
        return format!("Char({})", len);
    }
    if let Some(args) = between(column_type, "decimal(", ")") {
        return format!("Decimal({})", args);
    }
    match column_type.split('(').next().unwrap_or(column_type) {
        "bigint" => "BigInt".to_string(),
        "smallint" => "SmallInt".to_string(),
        "int" | "mediumint" => "Int".to_string(),
        "tinyint" | "boolean" | "bool" => "Boolean".to_string(),
        "text" | "mediumtext" | "longtext" => "Text".to_string(),
        "timestamp" | "datetime" => "Timestamp".to_string(),
        "date" => "Date".to_string(),
        "time" => "Time".to_string(),
        "float" => "Real".to_string(),
        "double" => "DoublePrecision".to_string(),
        "json" => "Json".to_string(),
        _ => "Text".to_string(),
    }
}

async fn sqlite_tables(adapter: &dyn DbAdapter) -> Result<Vec<TableInfo>> {
    let table_rows = adapter
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .await?;

    let mut tables = Vec::new();
    for table_row in &table_rows {
        let table_name = text(table_row, "name");
        if !table_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Validation(format!(
                "refusing to introspect table with unusual name '{}'",
                table_name
            )));
        }
        let column_rows = adapter
            .query(&format!("PRAGMA table_info(\"{}\")", table_name))
            .await?;
        let mut columns = Vec::new();
        for row in &column_rows {
            let data_type = text(row, "type").to_lowercase();
            columns.push(ColumnInfo {
                name: text(row, "name"),
                dsl_type: sqlite_dsl_type(&data_type),
                primary_key: text(row, "pk") != "0" && !text(row, "pk").is_empty(),
                not_null: text(row, "notnull") == "1",
                default: row
                    .get("dflt_value")
                    .and_then(|v| v.as_deref())
                    .and_then(simple_default),
            });
        }
        tables.push(TableInfo {
            name: table_name,
            columns,
        });
    }
    Ok(tables)
}

fn sqlite_dsl_type(data_type: &str) -> String {
    match data_type {
        "integer" | "int" => "Int".to_string(),
        "real" | "numeric" => "Real".to_string(),
        _ => "Text".to_string(),
    }
}

/// Keep only defaults the DSL can round-trip: `CURRENT_TIMESTAMP` as `now`,
/// bare numbers, and plain quoted strings (with any PostgreSQL cast suffix
/// stripped). Everything else is dropped.
fn simple_default(raw: &str) -> Option<String> {
    let raw = raw.split("::").next().unwrap_or(raw).trim();
    if raw.eq_ignore_ascii_case("current_timestamp") || raw.eq_ignore_ascii_case("now()") {
        return Some("now".to_string());
    }
    if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false") {
        return Some(raw.to_lowercase());
    }
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Some(raw.to_string());
    }
    let inner = raw.strip_prefix('\'')?.strip_suffix('\'')?;
    if inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Some(inner.to_string());
    }
    None
}

fn between<'a>(haystack: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    haystack.strip_prefix(prefix)?.strip_suffix(suffix)
}

fn first_value(row: &Row) -> String {
    row.values()
        .next()
        .and_then(|v| v.clone())
        .unwrap_or_default()
}
