//! Schema diffing - compare the live snapshot against the desired one.
//!
//! Tables are matched by name. A table missing on one side becomes a single
//! CREATE or DROP carrying the full definition; shared tables are compared
//! column by column, then by foreign key, then by index.
//!
//! Columns are paired by name. When both sides store the same native type
//! (for instance an `ENTITY_REFERENCE` column read back as `INTEGER`) the
//! pair counts as the same column. A genuine type change is reported as a
//! column change rather than a drop and re-add, so data survives it.
//!
//! The output is deterministic but not executable as-is: hand it to
//! [`order_actions`](crate::solver::order_actions) first.

use std::collections::HashSet;
use std::fmt;
use strata_db_schema::{
    Action, DefaultValue, Field, ForeignKey, Index, Schema, Table, TypeRegistry,
};

/// The actions turning one snapshot into another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    pub actions: Vec<Action>,
}

impl SchemaDiff {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Count total number of changes.
    pub fn change_count(&self) -> usize {
        self.actions.len()
    }

    /// Number of actions that remove structure.
    pub fn destructive_count(&self) -> usize {
        self.actions.iter().filter(|a| a.is_destructive()).count()
    }
}

impl IntoIterator for SchemaDiff {
    type Item = Action;
    type IntoIter = std::vec::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            writeln!(f, "No changes detected.")?;
        } else {
            for action in &self.actions {
                writeln!(f, "{}", action)?;
            }
        }
        Ok(())
    }
}

/// Compares snapshots using a type registry to decide column equivalence.
#[derive(Debug, Clone, Copy)]
pub struct SchemaDiffer<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> SchemaDiffer<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// Compute the actions turning `current` into `desired`.
    pub fn diff(&self, current: &Schema, desired: &Schema) -> SchemaDiff {
        let mut actions = Vec::new();

        for table in desired.iter_tables() {
            if current.get_table(&table.name).is_none() {
                actions.push(Action::Create(table.clone()));
            }
        }
        for table in current.iter_tables() {
            if desired.get_table(&table.name).is_none() {
                actions.push(Action::Drop(table.clone()));
            }
        }
        for desired_table in desired.iter_tables() {
            if let Some(current_table) = current.get_table(&desired_table.name) {
                actions.extend(self.diff_table(current_table, desired_table));
            }
        }

        SchemaDiff { actions }
    }

    /// Diff two tables with the same name.
    fn diff_table(&self, current: &Table, desired: &Table) -> Vec<Action> {
        let mut actions = self.diff_fields(current, desired);
        actions.extend(diff_foreign_keys(&current.foreign_keys, &desired.foreign_keys));
        actions.extend(diff_indexes(&current.indexes, &desired.indexes));
        actions
    }

    fn diff_fields(&self, current: &Table, desired: &Table) -> Vec<Action> {
        let table = &desired.name;
        let mut adds = Vec::new();
        let mut changes = Vec::new();
        let mut drops = Vec::new();

        for field in &desired.fields {
            match current.field(&field.name) {
                None => adds.push(Action::AddColumn {
                    table: table.clone(),
                    field: field.clone(),
                }),
                Some(existing) if self.field_changed(existing, field) => {
                    changes.push(Action::ChangeColumn {
                        table: table.clone(),
                        from: existing.clone(),
                        to: field.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        for field in &current.fields {
            if desired.field(&field.name).is_none() {
                drops.push(Action::DropColumn {
                    table: table.clone(),
                    field: field.clone(),
                });
            }
        }

        adds.extend(changes);
        adds.extend(drops);
        adds
    }

    /// Whether a column needs altering.
    fn field_changed(&self, current: &Field, desired: &Field) -> bool {
        let registry = self.registry;
        let same_storage = current.logical_type == desired.logical_type
            || registry.storage_equivalent(current.logical_type, desired.logical_type);
        if !same_storage {
            return true;
        }

        let precision = (
            current.effective_precision(registry),
            desired.effective_precision(registry),
        );
        let scale = (current.scale, desired.scale);

        specified_differ(precision)
            || specified_differ(scale)
            || current.not_null != desired.not_null
            || current.unique != desired.unique
            || current.auto_increment != desired.auto_increment
            || !registry.defaults_equal(
                desired.logical_type,
                effective_default(current),
                effective_default(desired),
            )
            || !registry.defaults_equal(
                desired.logical_type,
                current.on_update.as_ref(),
                desired.on_update.as_ref(),
            )
    }
}

/// Zero means "unspecified" and matches anything.
fn specified_differ((a, b): (u32, u32)) -> bool {
    a > 0 && b > 0 && a != b
}

/// An explicit NULL default is the same as no default.
fn effective_default(field: &Field) -> Option<&DefaultValue> {
    field
        .default_value
        .as_ref()
        .filter(|d| !matches!(d, DefaultValue::Null))
}

/// Diff foreign keys. Keys are compared as whole tuples.
fn diff_foreign_keys(current: &[ForeignKey], desired: &[ForeignKey]) -> Vec<Action> {
    let current_keys: HashSet<&ForeignKey> = current.iter().collect();
    let desired_keys: HashSet<&ForeignKey> = desired.iter().collect();

    let mut actions = Vec::new();
    for fk in desired {
        if !current_keys.contains(fk) {
            actions.push(Action::AddKey(fk.clone()));
        }
    }
    for fk in current {
        if !desired_keys.contains(fk) {
            actions.push(Action::DropKey(fk.clone()));
        }
    }
    actions
}

/// Diff indexes by (table, field).
fn diff_indexes(current: &[Index], desired: &[Index]) -> Vec<Action> {
    let current_indexes: HashSet<&Index> = current.iter().collect();
    let desired_indexes: HashSet<&Index> = desired.iter().collect();

    let mut actions = Vec::new();
    for index in desired {
        if !current_indexes.contains(index) {
            actions.push(Action::CreateIndex(index.clone()));
        }
    }
    for index in current {
        if !desired_indexes.contains(index) {
            actions.push(Action::DropIndex(index.clone()));
        }
    }
    actions
}

#[cfg(test)]
mod tests;
