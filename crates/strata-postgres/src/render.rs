//! PostgreSQL DDL for schema actions.

use crate::sql::{Ident, Lit, TableRef};
use strata::{
    Action, DatabaseFunction, DefaultValue, Field, ForeignKey, Index, Table, TypeRegistry,
    UnsupportedDdlOperation, Value, sql_types,
};

/// Renders [`Action`]s as PostgreSQL statements.
#[derive(Debug, Clone)]
pub struct PgRenderer<'r> {
    registry: &'r TypeRegistry,
    schema: Option<String>,
}

impl<'r> PgRenderer<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            schema: None,
        }
    }

    /// Qualify table and index names with `schema`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn render(&self, action: &Action) -> Result<Vec<String>, UnsupportedDdlOperation> {
        let unsupported = |reason: String| UnsupportedDdlOperation::new(action, reason);
        match action {
            Action::Create(table) => self.create_table(table).map_err(unsupported),
            Action::Drop(table) => Ok(vec![format!("DROP TABLE {}", self.table(&table.name))]),
            Action::AddColumn { table, field } => {
                let mut definition = self.column_definition(field).map_err(unsupported)?;
                if field.primary_key {
                    definition.push_str(" PRIMARY KEY");
                }
                Ok(vec![format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    self.table(table),
                    definition
                )])
            }
            Action::ChangeColumn { table, from, to } => {
                self.change_column(table, from, to).map_err(unsupported)
            }
            Action::DropColumn { table, field } => Ok(vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.table(table),
                Ident(&field.name)
            )]),
            Action::AddKey(fk) => Ok(vec![format!(
                "ALTER TABLE {} ADD {}",
                self.table(&fk.domestic_table),
                self.foreign_key(fk)
            )]),
            Action::DropKey(fk) => Ok(vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.table(&fk.domestic_table),
                Ident(constraint_name(fk))
            )]),
            Action::CreateIndex(index) => Ok(vec![self.create_index(index)]),
            Action::DropIndex(index) => {
                let name = TableRef {
                    schema: self.schema.as_deref(),
                    name: &index.name(),
                }
                .to_string();
                Ok(vec![format!("DROP INDEX {}", name)])
            }
        }
    }

    fn table<'a>(&'a self, name: &'a str) -> TableRef<'a> {
        TableRef {
            schema: self.schema.as_deref(),
            name,
        }
    }

    fn create_table(&self, table: &Table) -> Result<Vec<String>, String> {
        let mut lines = Vec::new();
        for field in &table.fields {
            lines.push(self.column_definition(field)?);
        }
        let primary_keys: Vec<String> = table
            .primary_keys()
            .map(|f| Ident(&f.name).to_string())
            .collect();
        if !primary_keys.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", primary_keys.join(", ")));
        }
        for fk in &table.foreign_keys {
            lines.push(self.foreign_key(fk));
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.table(&table.name),
            lines.join(",\n    ")
        )];
        statements.extend(table.indexes.iter().map(|index| self.create_index(index)));
        Ok(statements)
    }

    /// `"name" TYPE [NOT NULL] [UNIQUE] [DEFAULT ...]`
    fn column_definition(&self, field: &Field) -> Result<String, String> {
        if field.on_update.is_some() {
            return Err("PostgreSQL has no ON UPDATE column clause".to_owned());
        }
        let mut definition = format!("{} {}", Ident(&field.name), self.column_type(field)?);
        if field.not_null && !field.primary_key {
            definition.push_str(" NOT NULL");
        }
        if field.unique {
            definition.push_str(" UNIQUE");
        }
        if let Some(default) = &field.default_value {
            definition.push_str(" DEFAULT ");
            definition.push_str(&default_literal(default));
        }
        Ok(definition)
    }

    fn column_type(&self, field: &Field) -> Result<String, String> {
        let code = self
            .registry
            .sql_type(field.logical_type)
            .map_err(|e| e.to_string())?;
        if field.auto_increment {
            return match code {
                sql_types::INTEGER => Ok("SERIAL".to_owned()),
                sql_types::BIGINT => Ok("BIGSERIAL".to_owned()),
                _ => Err(format!(
                    "auto-increment needs an integer column, `{}` is {}",
                    field.name, field.logical_type
                )),
            };
        }
        let name = match code {
            sql_types::INTEGER => "INTEGER",
            sql_types::BIGINT => "BIGINT",
            sql_types::FLOAT => "REAL",
            sql_types::DOUBLE => "DOUBLE PRECISION",
            sql_types::BOOLEAN => "BOOLEAN",
            sql_types::VARCHAR => {
                return Ok(match field.effective_precision(self.registry) {
                    0 => "VARCHAR".to_owned(),
                    n => format!("VARCHAR({})", n),
                });
            }
            sql_types::CLOB => "TEXT",
            sql_types::TIMESTAMP => "TIMESTAMP",
            sql_types::DATE => "DATE",
            sql_types::TIME => "TIME",
            sql_types::BLOB => "BYTEA",
            other => {
                return Err(format!(
                    "no PostgreSQL type for {} (native code {})",
                    field.logical_type, other
                ));
            }
        };
        Ok(name.to_owned())
    }

    fn change_column(&self, table: &str, from: &Field, to: &Field) -> Result<Vec<String>, String> {
        if from.auto_increment != to.auto_increment {
            return Err("changing auto-increment needs a sequence rewrite".to_owned());
        }
        if to.on_update.is_some() {
            return Err("PostgreSQL has no ON UPDATE column clause".to_owned());
        }

        let alter = format!("ALTER TABLE {} ALTER COLUMN {}", self.table(table), Ident(&to.name));
        let mut statements = Vec::new();

        let to_type = self.column_type(to)?;
        if !to.auto_increment && self.column_type(from).ok().as_deref() != Some(to_type.as_str()) {
            statements.push(format!(
                "{alter} TYPE {ty} USING {col}::{ty}",
                ty = to_type,
                col = Ident(&to.name)
            ));
        }
        if from.not_null != to.not_null {
            let verb = if to.not_null { "SET" } else { "DROP" };
            statements.push(format!("{} {} NOT NULL", alter, verb));
        }
        if !self.registry.defaults_equal(
            to.logical_type,
            from.default_value.as_ref(),
            to.default_value.as_ref(),
        ) {
            match to.default_value.as_ref().filter(|d| !matches!(d, DefaultValue::Null)) {
                Some(default) => {
                    statements.push(format!("{} SET DEFAULT {}", alter, default_literal(default)))
                }
                None => statements.push(format!("{} DROP DEFAULT", alter)),
            }
        }
        if from.unique != to.unique {
            let constraint = Ident(format!("{}_{}_key", table, to.name));
            statements.push(if to.unique {
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                    self.table(table),
                    constraint,
                    Ident(&to.name)
                )
            } else {
                format!(
                    "ALTER TABLE {} DROP CONSTRAINT {}",
                    self.table(table),
                    constraint
                )
            });
        }
        Ok(statements)
    }

    fn foreign_key(&self, fk: &ForeignKey) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            Ident(constraint_name(fk)),
            Ident(&fk.field),
            self.table(&fk.foreign_table),
            Ident(&fk.foreign_field)
        )
    }

    fn create_index(&self, index: &Index) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            Ident(index.name()),
            self.table(&index.table),
            Ident(&index.field)
        )
    }
}

/// `fk_<table>_<field>_<foreign table>_<foreign field>`
pub fn constraint_name(fk: &ForeignKey) -> String {
    format!(
        "fk_{}_{}_{}_{}",
        fk.domestic_table, fk.field, fk.foreign_table, fk.foreign_field
    )
}

fn default_literal(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Null => "NULL".to_owned(),
        DefaultValue::Function(DatabaseFunction::CurrentTimestamp) => "CURRENT_TIMESTAMP".to_owned(),
        DefaultValue::Function(DatabaseFunction::CurrentDate) => "CURRENT_DATE".to_owned(),
        DefaultValue::Value(value) => match value {
            Value::Null => "NULL".to_owned(),
            Value::Bool(_) | Value::I32(_) | Value::I64(_) | Value::F32(_) | Value::F64(_) => {
                value.to_string()
            }
            Value::String(_)
            | Value::Bytes(_)
            | Value::Timestamp(_)
            | Value::Date(_)
            | Value::Time(_) => Lit(value.to_string()).to_string(),
        },
    }
}
