//! PostgreSQL DDL generation.

use super::{
    check_decorators, enum_variants, foreign_key_clause, format_default, length_arg,
    precision_args, quote_ident, Dialect, SqlGenerator,
};
use crate::ast::{Column, Model, Schema};
use crate::error::{Error, Result};

pub struct PostgresGenerator;

impl SqlGenerator for PostgresGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn generate_up(&self, schema: &Schema) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for model in &schema.models {
            statements.push(self.create_table(model)?);
        }
        for raw in &schema.raw_sql {
            statements.push(raw.sql.clone());
        }
        Ok(statements)
    }

    fn generate_down(&self, schema: &Schema) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for model in schema.models.iter().rev() {
            let table = quote_ident(Dialect::Postgres, &model.name)?;
            statements.push(format!("DROP TABLE IF EXISTS {} CASCADE;", table));
        }
        Ok(statements)
    }
}

impl PostgresGenerator {
    fn create_table(&self, model: &Model) -> Result<String> {
        let table = quote_ident(Dialect::Postgres, &model.name)?;
        let mut lines = Vec::new();
        for column in &model.columns {
            check_decorators(model, column)?;
            lines.push(self.column_def(column)?);
        }
        for column in &model.columns {
            if column.has_decorator("ref") {
                lines.push(foreign_key_clause(Dialect::Postgres, column)?);
            }
        }
        Ok(format!(
            "CREATE TABLE {} (\n  {}\n);",
            table,
            lines.join(",\n  ")
        ))
    }

    fn column_def(&self, column: &Column) -> Result<String> {
        let name = quote_ident(Dialect::Postgres, &column.name)?;
        let mut def = format!("{} {}", name, self.type_sql(column, &name)?);
        if column.has_decorator("pk") {
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
                def.push_str(&format_default(Dialect::Postgres, value));
            }
        }
        Ok(def)
    }

    fn type_sql(&self, column: &Column, quoted_name: &str) -> Result<String> {
        Ok(match column.type_name.as_str() {
            "Serial" => "SERIAL".to_string(),
            "Int" => "INTEGER".to_string(),
            "BigInt" => "BIGINT".to_string(),
            "SmallInt" => "SMALLINT".to_string(),
            "VarChar" => format!("VARCHAR({})", length_arg(column, 255)?),
            "Char" => format!("CHAR({})", length_arg(column, 1)?),
            "Text" => "TEXT".to_string(),
            "Boolean" => "BOOLEAN".to_string(),
            "Timestamp" => "TIMESTAMP".to_string(),
            "Date" => "DATE".to_string(),
            "Time" => "TIME".to_string(),
            "Decimal" | "Numeric" => {
                let (precision, scale) = precision_args(column)?;
                format!("NUMERIC({}, {})", precision, scale)
            }
            "Real" => "REAL".to_string(),
            "DoublePrecision" => "DOUBLE PRECISION".to_string(),
            "Json" => "JSON".to_string(),
            "Jsonb" => "JSONB".to_string(),
            "Uuid" => "UUID".to_string(),
            "Enum" => format!(
                "VARCHAR(50) CHECK ({} IN ({}))",
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
