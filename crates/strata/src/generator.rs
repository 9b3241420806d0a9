//! Schema generation - compile entity descriptors into a desired-state snapshot.
//!
//! Layout rules:
//!
//! - tables follow descriptor order, implicit join tables come last,
//! - primary-key fields come first, then declared fields, then implicit
//!   foreign-key fields,
//! - a reference column takes the referenced primary key's type and
//!   precision, and is always indexed.

use crate::descriptor::{EntityDescriptor, FieldDescriptor, FieldType, Relation};
use crate::error::SchemaGenerationError;
use crate::naming::NamingStrategy;
use indexmap::IndexMap;
use std::collections::HashSet;
use strata_db_schema::{
    DefaultValue, Field, ForeignKey, Index, LogicalType, Schema, Table, TypeRegistry,
};

/// The primary key an entity exposes to its referrers.
#[derive(Debug, Clone)]
struct KeyInfo {
    table: String,
    field: String,
    logical_type: LogicalType,
    precision: u32,
}

/// Builds the desired-state snapshot.
#[derive(Debug, Clone)]
pub struct SchemaGenerator<'r, N> {
    registry: &'r TypeRegistry,
    naming: N,
}

impl<'r, N: NamingStrategy> SchemaGenerator<'r, N> {
    pub fn new(registry: &'r TypeRegistry, naming: N) -> Self {
        Self { registry, naming }
    }

    pub fn generate(&self, entities: &[EntityDescriptor]) -> Result<Schema, SchemaGenerationError> {
        let mut by_name: IndexMap<&str, &EntityDescriptor> = IndexMap::new();
        for entity in entities {
            if by_name.insert(entity.name.as_str(), entity).is_some() {
                return Err(SchemaGenerationError::DuplicateTable {
                    table: self.naming.table_name(entity),
                });
            }
        }
        let context = Context {
            generator: self,
            entities: by_name,
        };

        let mut schema = Schema::new();
        for entity in entities {
            let table = context.entity_table(entity)?;
            insert_table(&mut schema, table)?;
        }
        for table in context.join_tables()? {
            tracing::debug!(table = %table.name, "implicit join table");
            insert_table(&mut schema, table)?;
        }
        Ok(schema)
    }
}

fn insert_table(schema: &mut Schema, table: Table) -> Result<(), SchemaGenerationError> {
    if schema.get_table(&table.name).is_some() {
        return Err(SchemaGenerationError::DuplicateTable { table: table.name });
    }
    schema.insert(table);
    Ok(())
}

struct Context<'g, 'r, N> {
    generator: &'g SchemaGenerator<'r, N>,
    entities: IndexMap<&'g str, &'g EntityDescriptor>,
}

impl<'g, 'r, N: NamingStrategy> Context<'g, 'r, N> {
    fn naming(&self) -> &N {
        &self.generator.naming
    }

    fn entity(&self, from: &str, name: &str) -> Result<&'g EntityDescriptor, SchemaGenerationError> {
        self.entities
            .get(name)
            .copied()
            .ok_or_else(|| SchemaGenerationError::UnknownEntity {
                entity: from.to_owned(),
                referenced: name.to_owned(),
            })
    }

    fn primary_key(&self, entity: &'g EntityDescriptor) -> Result<KeyInfo, SchemaGenerationError> {
        self.key_through(entity, &mut Vec::new())
    }

    /// The key of `entity`, following keys that are themselves references
    /// down to the column type they bottom out in.
    fn key_through(
        &self,
        entity: &'g EntityDescriptor,
        visiting: &mut Vec<&'g str>,
    ) -> Result<KeyInfo, SchemaGenerationError> {
        let field = entity
            .primary_key()
            .ok_or_else(|| SchemaGenerationError::MissingPrimaryKey {
                entity: entity.name.clone(),
            })?;
        if visiting.contains(&entity.name.as_str()) {
            return Err(SchemaGenerationError::KeyCycle {
                entity: entity.name.clone(),
            });
        }
        visiting.push(&entity.name);

        let (logical_type, precision) = match &field.ty {
            FieldType::Reference(target) => {
                let key = self.key_through(self.entity(&entity.name, target)?, visiting)?;
                let precision = field.constraints.precision.unwrap_or(key.precision);
                (key.logical_type, precision)
            }
            _ => {
                let ty = self.field_type(entity, field)?;
                (ty, self.precision(field, ty))
            }
        };
        Ok(KeyInfo {
            table: self.naming().table_name(entity),
            field: self.naming().field_name(field),
            logical_type,
            precision,
        })
    }

    fn field_type(
        &self,
        entity: &EntityDescriptor,
        field: &FieldDescriptor,
    ) -> Result<LogicalType, SchemaGenerationError> {
        let type_error = |source| SchemaGenerationError::Type {
            entity: entity.name.clone(),
            field: field.name.clone(),
            source,
        };
        match &field.ty {
            FieldType::Logical(ty) => {
                self.generator.registry.handler(*ty).map_err(type_error)?;
                Ok(*ty)
            }
            FieldType::Value(value_type) => self
                .generator
                .registry
                .resolve_value_type(value_type)
                .map_err(type_error),
            FieldType::Reference(target) => {
                let target = self.entity(&entity.name, target)?;
                Ok(self.primary_key(target)?.logical_type)
            }
        }
    }

    fn precision(&self, field: &FieldDescriptor, ty: LogicalType) -> u32 {
        field
            .constraints
            .precision
            .unwrap_or_else(|| self.generator.registry.default_precision(ty))
    }

    fn parse_default(
        &self,
        entity: &EntityDescriptor,
        field: &FieldDescriptor,
        ty: LogicalType,
        input: Option<&str>,
    ) -> Result<Option<DefaultValue>, SchemaGenerationError> {
        input
            .map(|input| self.generator.registry.parse_default(ty, input))
            .transpose()
            .map_err(|source| SchemaGenerationError::Type {
                entity: entity.name.clone(),
                field: field.name.clone(),
                source,
            })
    }

    fn entity_table(&self, entity: &EntityDescriptor) -> Result<Table, SchemaGenerationError> {
        let mut table = Table::new(self.naming().table_name(entity));

        let ordered = entity
            .fields
            .iter()
            .filter(|f| f.constraints.primary_key)
            .chain(entity.fields.iter().filter(|f| !f.constraints.primary_key));
        for descriptor in ordered {
            let field = self.field(entity, descriptor)?;
            push_field(&mut table, field.clone())?;

            if let FieldType::Reference(target) = &descriptor.ty {
                let key = self.primary_key(self.entity(&entity.name, target)?)?;
                self.link(&mut table, &field, &key);
            } else if descriptor.constraints.indexed {
                let index = Index::new(&table.name, &field.name, field.logical_type);
                push_index(&mut table, index);
            }
        }

        for one in self.one_to_many_sources(entity) {
            let already_declared = entity
                .fields
                .iter()
                .any(|f| matches!(&f.ty, FieldType::Reference(target) if *target == one.name));
            if already_declared {
                continue;
            }
            let key = self.primary_key(one)?;
            let field = Field::new(self.naming().reference_name(&one.name), key.logical_type)
                .precision(key.precision);
            tracing::debug!(table = %table.name, field = %field.name, references = %key.table, "implicit foreign key");
            push_field(&mut table, field.clone())?;
            self.link(&mut table, &field, &key);
        }

        Ok(table)
    }

    fn field(
        &self,
        entity: &EntityDescriptor,
        descriptor: &FieldDescriptor,
    ) -> Result<Field, SchemaGenerationError> {
        let c = &descriptor.constraints;
        let ty = self.field_type(entity, descriptor)?;

        let precision = match &descriptor.ty {
            FieldType::Reference(target) => match c.precision {
                Some(precision) => precision,
                None => self.primary_key(self.entity(&entity.name, target)?)?.precision,
            },
            _ => self.precision(descriptor, ty),
        };

        let mut field = Field::new(self.naming().field_name(descriptor), ty)
            .precision(precision)
            .scale(c.scale.unwrap_or(0));
        if c.primary_key {
            field = field.primary_key();
        }
        if c.not_null {
            field = field.not_null();
        }
        if c.unique {
            field = field.unique();
        }
        if c.auto_increment {
            field = field.auto_increment();
        } else if let Some(default) =
            self.parse_default(entity, descriptor, ty, c.default.as_deref())?
        {
            field = field.default_value(default);
        }
        if let Some(on_update) =
            self.parse_default(entity, descriptor, ty, c.on_update.as_deref())?
        {
            field = field.on_update(on_update);
        }
        Ok(field)
    }

    /// Add the foreign key and index backing a reference column.
    fn link(&self, table: &mut Table, field: &Field, key: &KeyInfo) {
        let fk = ForeignKey::new(&table.name, &field.name, &key.table, &key.field);
        if !table.foreign_keys.contains(&fk) {
            table.foreign_keys.push(fk);
        }
        let index = Index::new(&table.name, &field.name, field.logical_type);
        push_index(table, index);
    }

    /// Entities declaring a one-to-many relation targeting `entity`.
    fn one_to_many_sources(&self, entity: &EntityDescriptor) -> Vec<&'g EntityDescriptor> {
        self.entities
            .values()
            .copied()
            .filter(|source| {
                source.relations.iter().any(|r| {
                    matches!(r, Relation::OneToMany { target } if *target == entity.name)
                })
            })
            .collect()
    }

    fn join_tables(&self) -> Result<Vec<Table>, SchemaGenerationError> {
        let mut seen = HashSet::new();
        let mut tables = Vec::new();

        for entity in self.entities.values().copied() {
            for relation in &entity.relations {
                let Relation::ManyToMany { target, through } = relation else {
                    continue;
                };
                let other = self.entity(&entity.name, target)?;
                if let Some(through) = through {
                    self.entity(&entity.name, through)?;
                    continue;
                }

                let mut ends = [entity, other];
                ends.sort_by_key(|e| self.naming().table_name(e));
                let names = [
                    self.naming().table_name(ends[0]),
                    self.naming().table_name(ends[1]),
                ];
                if !seen.insert(names.clone()) {
                    continue;
                }

                let columns = if entity.name == other.name {
                    self.naming().self_join_column_names(&entity.name)
                } else {
                    [
                        self.naming().reference_name(&ends[0].name),
                        self.naming().reference_name(&ends[1].name),
                    ]
                };

                let mut table = Table::new(self.naming().join_table_name(&names[0], &names[1]));
                for (end, column) in ends.into_iter().zip(columns) {
                    let key = self.primary_key(end)?;
                    let field = Field::new(column, key.logical_type)
                        .precision(key.precision)
                        .not_null();
                    push_field(&mut table, field.clone())?;
                    self.link(&mut table, &field, &key);
                }
                tables.push(table);
            }
        }
        Ok(tables)
    }
}

fn push_field(table: &mut Table, field: Field) -> Result<(), SchemaGenerationError> {
    if table.field(&field.name).is_some() {
        return Err(SchemaGenerationError::DuplicateField {
            table: table.name.clone(),
            field: field.name,
        });
    }
    table.fields.push(field);
    Ok(())
}

fn push_index(table: &mut Table, index: Index) {
    if !table.indexes.contains(&index) {
        table.indexes.push(index);
    }
}

#[cfg(test)]
mod tests;
