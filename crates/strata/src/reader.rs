//! Schema introspection - build a snapshot of the live database.
//!
//! Column types, precision, scale, auto-increment and nullability come from
//! the result metadata of a probe query; defaults, uniqueness and keys come
//! from catalog metadata.
//!
//! ## Foreign columns
//!
//! The referenced column of a foreign key is taken from the catalog when it
//! reports one. Otherwise the reader assumes the key points at the referenced
//! table's primary key, logs a warning, and fails if that table doesn't have
//! exactly one.

use crate::catalog::{Catalog, ColumnMetadata, ImportedKey, ProbedColumn};
use crate::error::SchemaIntrospectionError;
use strata_db_schema::{Field, ForeignKey, Index, Schema, Table, TypeRegistry};
use tracing::Instrument;

/// Reads the current-state snapshot from a [`Catalog`].
#[derive(Debug, Clone, Copy)]
pub struct SchemaReader<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> SchemaReader<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// Read every table the catalog lists.
    pub async fn read<C: Catalog>(&self, catalog: &C) -> Result<Schema, SchemaIntrospectionError> {
        let span = tracing::debug_span!("schema.read", tables = tracing::field::Empty);
        let schema = async {
            let names = catalog
                .table_names()
                .await
                .map_err(|e| SchemaIntrospectionError::Catalog {
                    operation: "table_names",
                    source: Box::new(e),
                })?;

            let mut schema = Schema::new();
            let mut imported = Vec::with_capacity(names.len());
            for name in names {
                let table = self.read_table(catalog, &name).await?;
                let keys = catalog
                    .imported_keys(&name)
                    .await
                    .map_err(|e| table_error(&name, "imported_keys", e))?;
                tracing::debug!(
                    table = %name,
                    fields = table.fields.len(),
                    indexes = table.indexes.len(),
                    "read table"
                );
                schema.insert(table);
                imported.push((name, keys));
            }

            let mut resolved = Vec::with_capacity(imported.len());
            for (table, keys) in imported {
                let foreign_keys = keys
                    .into_iter()
                    .map(|key| resolve_foreign_key(&schema, &table, key))
                    .collect::<Result<Vec<_>, _>>()?;
                resolved.push((table, foreign_keys));
            }
            for (table, foreign_keys) in resolved {
                if let Some(table) = schema.tables.get_mut(&table) {
                    table.foreign_keys = foreign_keys;
                }
            }

            Ok::<_, SchemaIntrospectionError>(schema)
        }
        .instrument(span.clone())
        .await?;
        span.record("tables", schema.len());
        Ok(schema)
    }

    async fn read_table<C: Catalog>(
        &self,
        catalog: &C,
        name: &str,
    ) -> Result<Table, SchemaIntrospectionError> {
        let probed = catalog
            .probe_columns(name)
            .await
            .map_err(|e| table_error(name, "probe_columns", e))?;
        let mut table = Table::new(name);
        table.fields = probed.into_iter().map(|c| self.probed_field(c)).collect();

        let metadata = catalog
            .column_metadata(name)
            .await
            .map_err(|e| table_error(name, "column_metadata", e))?;
        for meta in metadata {
            self.apply_metadata(catalog, &mut table, meta)?;
        }

        let primary_keys = catalog
            .primary_keys(name)
            .await
            .map_err(|e| table_error(name, "primary_keys", e))?;
        for column in primary_keys {
            let field = field_mut(&mut table, &column, "primary_keys")?;
            field.primary_key = true;
            field.not_null = true;
        }

        let indexes = catalog
            .indexes(name)
            .await
            .map_err(|e| table_error(name, "indexes", e))?;
        for index in indexes {
            let Some(field) = table.field(&index.field) else {
                return Err(SchemaIntrospectionError::UnknownColumn {
                    table: name.to_owned(),
                    column: index.field,
                    operation: "indexes",
                });
            };
            let candidate = Index::new(name, &field.name, field.logical_type);
            let expected = candidate.name();
            // Indexes not named by convention aren't ours to diff.
            if truncate_identifier(&expected, catalog.max_identifier_len()) != index.name {
                tracing::debug!(table = %name, index = %index.name, "skipping unmanaged index");
                continue;
            }
            if !table.indexes.contains(&candidate) {
                table.indexes.push(candidate);
            }
        }

        Ok(table)
    }

    fn probed_field(&self, column: ProbedColumn) -> Field {
        let mut field = Field::new(column.name, self.registry.resolve_sql_type(column.sql_type))
            .precision(column.precision)
            .scale(column.scale);
        field.not_null = column.not_null;
        if column.auto_increment {
            field = field.auto_increment();
        }
        field
    }

    fn apply_metadata<C: Catalog>(
        &self,
        catalog: &C,
        table: &mut Table,
        meta: ColumnMetadata,
    ) -> Result<(), SchemaIntrospectionError> {
        let registry = self.registry;
        let table_name = table.name.clone();
        let field = field_mut(table, &meta.name, "column_metadata")?;
        let parse = |raw: &str| {
            catalog
                .normalize_default(raw)
                .map(|text| registry.parse_default(field.logical_type, &text))
                .transpose()
                .map_err(|source| SchemaIntrospectionError::Type {
                    table: table_name.clone(),
                    column: meta.name.clone(),
                    source,
                })
        };

        let default_value = match meta.default.as_deref() {
            Some(raw) if !field.auto_increment => parse(raw)?,
            _ => None,
        };
        let on_update = match meta.on_update.as_deref() {
            Some(raw) => parse(raw)?,
            None => None,
        };

        field.default_value = default_value;
        field.on_update = on_update;
        field.not_null |= meta.not_null;
        field.unique = meta.unique;
        Ok(())
    }
}

fn table_error<E: std::error::Error + Send + Sync + 'static>(
    table: &str,
    operation: &'static str,
    source: E,
) -> SchemaIntrospectionError {
    SchemaIntrospectionError::Table {
        table: table.to_owned(),
        operation,
        source: Box::new(source),
    }
}

fn field_mut<'t>(
    table: &'t mut Table,
    column: &str,
    operation: &'static str,
) -> Result<&'t mut Field, SchemaIntrospectionError> {
    let table_name = table.name.clone();
    table
        .fields
        .iter_mut()
        .find(|f| f.name == column)
        .ok_or_else(|| SchemaIntrospectionError::UnknownColumn {
            table: table_name,
            column: column.to_owned(),
            operation,
        })
}

/// `name` cut to at most `limit` bytes, on a char boundary.
fn truncate_identifier(name: &str, limit: Option<usize>) -> &str {
    let Some(limit) = limit else {
        return name;
    };
    if name.len() <= limit {
        return name;
    }
    let mut end = limit;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn resolve_foreign_key(
    schema: &Schema,
    table: &str,
    key: ImportedKey,
) -> Result<ForeignKey, SchemaIntrospectionError> {
    let foreign_field = match key.foreign_field {
        Some(field) => field,
        None => {
            let mut primary_keys = schema
                .get_table(&key.foreign_table)
                .into_iter()
                .flat_map(|t| t.primary_keys());
            match (primary_keys.next(), primary_keys.next()) {
                (Some(pk), None) => {
                    tracing::warn!(
                        table = %table,
                        column = %key.field,
                        foreign_table = %key.foreign_table,
                        assumed = %pk.name,
                        "catalog doesn't report the referenced column; assuming the primary key"
                    );
                    pk.name.clone()
                }
                _ => {
                    return Err(SchemaIntrospectionError::UnresolvedForeignColumn {
                        table: table.to_owned(),
                        column: key.field,
                        foreign_table: key.foreign_table,
                    });
                }
            }
        }
    };
    Ok(ForeignKey::new(table, key.field, key.foreign_table, foreign_field))
}
