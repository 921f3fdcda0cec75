//! MySQL / MariaDB DDL generation.

use super::{
    check_decorators, enum_variants, foreign_key_clause, format_default, length_arg,
    precision_args, quote_ident, Dialect, SqlGenerator,
};
use crate::ast::{Column, Model, Schema};
use crate::error::{Error, Result};

/// MySQL generator. Table storage options are caller-overridable and default
/// to `InnoDB` / `utf8mb4` / `utf8mb4_unicode_ci`.
pub struct MysqlGenerator {
    pub engine: String,
    pub charset: String,
    pub collation: String,
}

impl Default for MysqlGenerator {
    fn default() -> Self {
        MysqlGenerator {
            engine: "InnoDB".to_string(),
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_unicode_ci".to_string(),
        }
    }
}

impl MysqlGenerator {
    pub fn with_table_options(engine: &str, charset: &str, collation: &str) -> Self {
        MysqlGenerator {
            engine: engine.to_string(),
            charset: charset.to_string(),
            collation: collation.to_string(),
        }
    }
}

impl SqlGenerator for MysqlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
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
            let table = quote_ident(Dialect::Mysql, &model.name)?;
            statements.push(format!("DROP TABLE IF EXISTS {};", table));
        }
        Ok(statements)
    }
}

impl MysqlGenerator {
    fn create_table(&self, model: &Model) -> Result<String> {
        let table = quote_ident(Dialect::Mysql, &model.name)?;
        let mut lines = Vec::new();
        for column in &model.columns {
            check_decorators(model, column)?;
            lines.push(self.column_def(column)?);
        }
        for column in &model.columns {
            if column.has_decorator("ref") {
                lines.push(foreign_key_clause(Dialect::Mysql, column)?);
            }
        }
        Ok(format!(
            "CREATE TABLE {} (\n  {}\n) ENGINE={} DEFAULT CHARSET={} COLLATE={};",
            table,
            lines.join(",\n  "),
            self.engine,
            self.charset,
            self.collation
        ))
    }

    /// `AUTO_INCREMENT` must sit immediately after the type, before
    /// `PRIMARY KEY`.
    fn column_def(&self, column: &Column) -> Result<String> {
        let name = quote_ident(Dialect::Mysql, &column.name)?;
        let mut def = format!("{} {}", name, self.type_sql(column)?);
        if column.type_name == "Serial" {
            def.push_str(" AUTO_INCREMENT");
        }
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
                def.push_str(&format_default(Dialect::Mysql, value));
            }
        }
        Ok(def)
    }

    fn type_sql(&self, column: &Column) -> Result<String> {
        Ok(match column.type_name.as_str() {
            "Serial" | "Int" => "INT".to_string(),
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
                format!("DECIMAL({}, {})", precision, scale)
            }
            "Real" => "FLOAT".to_string(),
            "DoublePrecision" => "DOUBLE".to_string(),
            "Json" | "Jsonb" => "JSON".to_string(),
            "Uuid" => "CHAR(36)".to_string(),
            "Enum" => format!("ENUM({})", enum_variants(column)?.join(", ")),
            other => {
                return Err(Error::Generator(format!(
                    "unknown type '{}' on column '{}'",
                    other, column.name
                )));
            }
        })
    }
}
