//! SQLite DDL generation.
//!
//! SQLite enforces foreign keys only when the pragma is on, so both UP and
//! DOWN lead with `PRAGMA foreign_keys = ON;`. An integer primary key becomes
//! `INTEGER PRIMARY KEY AUTOINCREMENT`; any other `@pk` type gets a plain
//! `PRIMARY KEY` and nothing further is implied for it.

use super::{
    check_decorators, enum_variants, foreign_key_clause, format_default, quote_ident, Dialect,
    SqlGenerator,
};
use crate::ast::{Column, Model, Schema};
use crate::error::{Error, Result};

const FOREIGN_KEYS_PRAGMA: &str = "PRAGMA foreign_keys = ON;";

pub struct SqliteGenerator;

impl SqlGenerator for SqliteGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn generate_up(&self, schema: &Schema) -> Result<Vec<String>> {
        let mut statements = vec![FOREIGN_KEYS_PRAGMA.to_string()];
        for model in &schema.models {
            statements.push(self.create_table(model)?);
        }
        for raw in &schema.raw_sql {
            statements.push(raw.sql.clone());
        }
        Ok(statements)
    }

    fn generate_down(&self, schema: &Schema) -> Result<Vec<String>> {
        let mut statements = vec![FOREIGN_KEYS_PRAGMA.to_string()];
        for model in schema.models.iter().rev() {
            let table = quote_ident(Dialect::Sqlite, &model.name)?;
            statements.push(format!("DROP TABLE IF EXISTS {};", table));
        }
        Ok(statements)
    }
}

impl SqliteGenerator {
    fn create_table(&self, model: &Model) -> Result<String> {
        let table = quote_ident(Dialect::Sqlite, &model.name)?;
        let mut lines = Vec::new();
        for column in &model.columns {
            check_decorators(model, column)?;
            lines.push(self.column_def(column)?);
        }
        for column in &model.columns {
            if column.has_decorator("ref") {
                lines.push(foreign_key_clause(Dialect::Sqlite, column)?);
            }
        }
        Ok(format!(
            "CREATE TABLE {} (\n  {}\n);",
            table,
            lines.join(",\n  ")
        ))
    }

    fn column_def(&self, column: &Column) -> Result<String> {
        let name = quote_ident(Dialect::Sqlite, &column.name)?;
        let base = self.type_sql(column, &name)?;
        let integer_pk = base == "INTEGER" && column.has_decorator("pk");

        let mut def = format!("{} {}", name, base);
        if column.type_name == "Serial" || integer_pk {
            // Serial already implies the rowid alias; an explicit integer @pk
            // gets the same treatment.
            def.push_str(" PRIMARY KEY AUTOINCREMENT");
        } else if column.has_decorator("pk") {
            def.push_str(" PRIMARY KEY");
        }
        if column.has_decorator("unique") {
            def.push_str(" UNIQUE");
        }
        if column.has_decorator("notnull") {
            def.push_str(" NOT NULL");
        }
        if let Some(dec) = column.decorator("default") {
            if let Some(value) = dec.single_arg() {
                def.push_str(" DEFAULT ");
                def.push_str(&format_default(Dialect::Sqlite, value));
            }
        }
        Ok(def)
    }

    fn type_sql(&self, column: &Column, quoted_name: &str) -> Result<String> {
        Ok(match column.type_name.as_str() {
            "Serial" | "Int" | "BigInt" | "SmallInt" | "Boolean" => "INTEGER".to_string(),
            "VarChar" | "Char" | "Text" | "Timestamp" | "Date" | "Time" | "Json" | "Jsonb"
            | "Uuid" => "TEXT".to_string(),
            "Decimal" | "Numeric" | "Real" | "DoublePrecision" => "REAL".to_string(),
            "Enum" => format!(
                "TEXT CHECK ({} IN ({}))",
                quoted_name,
                enum_variants(column)?.join(", ")
            ),
            other => {
                return Err(Error::Generator(format!(
                    "unknown type '{}' on column '{}'",
                    other, column.name
                )));
            }
        })
    }
}
