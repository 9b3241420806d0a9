//! Schema model and type registry for strata.
//!
//! This crate contains the value types shared by every stage of a migration
//! run: the [`TypeRegistry`], the snapshot types ([`Schema`], [`Table`],
//! [`Field`], [`ForeignKey`], [`Index`]) and the [`Action`]s a diff produces.
//!
//! Snapshot values are built once, by the reader or the generator, and never
//! mutated afterwards.

use indexmap::IndexMap;
use std::fmt;
use std::hash::{Hash, Hasher};

mod types;
mod value;

pub use types::{
    LogicalType, RowCursor, StatementSink, TypeHandler, TypeRegistry, TypeResolutionError,
    ValueType, sql_types,
};
pub use value::{DatabaseFunction, DefaultValue, Value};

/// A column.
///
/// Two fields are equal when their names and logical types are equal. The
/// remaining attributes are compared separately by the differ.
#[derive(Debug, Clone)]
pub struct Field {
    /// Column name (case-sensitive)
    pub name: String,
    /// Logical type
    pub logical_type: LogicalType,
    /// Precision, 0 if unspecified
    pub precision: u32,
    /// Scale, 0 if unspecified
    pub scale: u32,
    /// Part of the primary key
    pub primary_key: bool,
    /// Value generated by the database on insert
    pub auto_increment: bool,
    /// NOT NULL constraint
    pub not_null: bool,
    /// Single-column UNIQUE constraint
    pub unique: bool,
    /// Default applied on insert
    pub default_value: Option<DefaultValue>,
    /// Value applied on every update
    pub on_update: Option<DefaultValue>,
}

impl Field {
    /// A nullable field with no constraints.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            precision: 0,
            scale: 0,
            primary_key: false,
            auto_increment: false,
            not_null: false,
            unique: false,
            default_value: None,
            on_update: None,
        }
    }

    /// Mark as primary key. Primary keys are always NOT NULL.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Mark as auto-increment. Drops any default.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self.default_value = None;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        if !self.auto_increment {
            self.default_value = Some(value);
        }
        self
    }

    pub fn on_update(mut self, value: DefaultValue) -> Self {
        self.on_update = Some(value);
        self
    }

    /// Precision, falling back to the type's default.
    pub fn effective_precision(&self, registry: &TypeRegistry) -> u32 {
        if self.precision > 0 {
            self.precision
        } else {
            registry.default_precision(self.logical_type)
        }
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.logical_type == other.logical_type
    }
}

impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.logical_type.hash(state);
    }
}

/// A single-column foreign key.
///
/// Has no mutable attributes: a changed key is a drop followed by an add.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    /// Table holding the referencing column
    pub domestic_table: String,
    /// Referencing column
    pub field: String,
    /// Referenced table
    pub foreign_table: String,
    /// Referenced column
    pub foreign_field: String,
}

impl ForeignKey {
    pub fn new(
        domestic_table: impl Into<String>,
        field: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            domestic_table: domestic_table.into(),
            field: field.into(),
            foreign_table: foreign_table.into(),
            foreign_field: foreign_field.into(),
        }
    }

    /// Whether `table.field` is either end of this key.
    pub fn touches(&self, table: &str, field: &str) -> bool {
        (self.domestic_table == table && self.field == field)
            || (self.foreign_table == table && self.foreign_field == field)
    }

    /// Whether `table` is either end of this key.
    pub fn involves(&self, table: &str) -> bool {
        self.domestic_table == table || self.foreign_table == table
    }

    pub fn is_self_reference(&self) -> bool {
        self.domestic_table == self.foreign_table
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.domestic_table, self.field, self.foreign_table, self.foreign_field
        )
    }
}

/// A single-column secondary index.
///
/// The name is always derived from the table and field, see [`Index::name`].
/// Two indexes are equal when they cover the same `(table, field)`.
#[derive(Debug, Clone)]
pub struct Index {
    pub table: String,
    pub field: String,
    pub logical_type: LogicalType,
}

impl Index {
    pub fn new(table: impl Into<String>, field: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            logical_type,
        }
    }

    /// `index_<table>_<field>`, lowercased.
    pub fn name(&self) -> String {
        format!(
            "index_{}_{}",
            self.table.to_lowercase(),
            self.field.to_lowercase()
        )
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.field == other.field
    }
}

impl Eq for Index {}

impl Hash for Index {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.field.hash(state);
    }
}

/// A table.
///
/// Tables are identified by name only.
#[derive(Debug, Clone)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, names unique
    pub fields: Vec<Field>,
    /// Foreign keys declared on this table
    pub foreign_keys: Vec<ForeignKey>,
    /// Secondary indexes
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Primary-key fields, in column order.
    pub fn primary_keys(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.primary_key)
    }

    /// Copy of this table without the given foreign keys.
    pub fn without_foreign_keys(&self, keys: &[ForeignKey]) -> Table {
        Table {
            foreign_keys: self
                .foreign_keys
                .iter()
                .filter(|fk| !keys.contains(fk))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Table {}

/// A snapshot: every table of a schema at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Tables keyed by name, in insertion order.
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, returning the one it replaced if the name was taken.
    pub fn insert(&mut self, table: Table) -> Option<Table> {
        self.tables.insert(table.name.clone(), table)
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Iterate over all tables.
    pub fn iter_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<Table> for Schema {
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        let mut schema = Schema::new();
        for table in iter {
            schema.insert(table);
        }
        schema
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for table in self.iter_tables() {
            writeln!(f, "{}", table.name)?;
            for field in &table.fields {
                let pk = if field.primary_key { " PK" } else { "" };
                let not_null = if field.not_null { " NOT NULL" } else { "" };
                writeln!(f, "  {}: {}{}{}", field.name, field.logical_type, pk, not_null)?;
            }
            for fk in &table.foreign_keys {
                writeln!(f, "  FK {}", fk)?;
            }
            for index in &table.indexes {
                writeln!(f, "  INDEX {}", index.name())?;
            }
        }
        Ok(())
    }
}

/// The kind of an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Create,
    Drop,
    AlterAddColumn,
    AlterChangeColumn,
    AlterDropColumn,
    AlterAddKey,
    AlterDropKey,
    CreateIndex,
    DropIndex,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Create => "CREATE",
            ActionKind::Drop => "DROP",
            ActionKind::AlterAddColumn => "ALTER_ADD_COLUMN",
            ActionKind::AlterChangeColumn => "ALTER_CHANGE_COLUMN",
            ActionKind::AlterDropColumn => "ALTER_DROP_COLUMN",
            ActionKind::AlterAddKey => "ALTER_ADD_KEY",
            ActionKind::AlterDropKey => "ALTER_DROP_KEY",
            ActionKind::CreateIndex => "CREATE_INDEX",
            ActionKind::DropIndex => "DROP_INDEX",
        };
        write!(f, "{}", s)
    }
}

/// A single structural change.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Create a table with its fields, keys and indexes inline.
    Create(Table),
    /// Drop a table.
    Drop(Table),
    /// Add a column to an existing table.
    AddColumn { table: String, field: Field },
    /// Change a column's type or attributes.
    ChangeColumn {
        table: String,
        from: Field,
        to: Field,
    },
    /// Drop a column.
    DropColumn { table: String, field: Field },
    /// Add a foreign key to an existing table.
    AddKey(ForeignKey),
    /// Drop a foreign key.
    DropKey(ForeignKey),
    /// Create an index.
    CreateIndex(Index),
    /// Drop an index.
    DropIndex(Index),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Create(_) => ActionKind::Create,
            Action::Drop(_) => ActionKind::Drop,
            Action::AddColumn { .. } => ActionKind::AlterAddColumn,
            Action::ChangeColumn { .. } => ActionKind::AlterChangeColumn,
            Action::DropColumn { .. } => ActionKind::AlterDropColumn,
            Action::AddKey(_) => ActionKind::AlterAddKey,
            Action::DropKey(_) => ActionKind::AlterDropKey,
            Action::CreateIndex(_) => ActionKind::CreateIndex,
            Action::DropIndex(_) => ActionKind::DropIndex,
        }
    }

    /// Name of the table this action alters.
    pub fn table_name(&self) -> &str {
        match self {
            Action::Create(t) | Action::Drop(t) => &t.name,
            Action::AddColumn { table, .. }
            | Action::ChangeColumn { table, .. }
            | Action::DropColumn { table, .. } => table,
            Action::AddKey(fk) | Action::DropKey(fk) => &fk.domestic_table,
            Action::CreateIndex(idx) | Action::DropIndex(idx) => &idx.table,
        }
    }

    /// Whether executing this action removes structure (and possibly data).
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Action::Drop(_) | Action::DropColumn { .. } | Action::DropKey(_) | Action::DropIndex(_)
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create(t) => write!(f, "+ table {}", t.name),
            Action::Drop(t) => write!(f, "- table {}", t.name),
            Action::AddColumn { table, field } => {
                write!(f, "+ {}.{}: {}", table, field.name, field.logical_type)
            }
            Action::ChangeColumn { table, from, to } => {
                if from.logical_type == to.logical_type {
                    write!(f, "~ {}.{}", table, to.name)
                } else {
                    write!(
                        f,
                        "~ {}.{}: {} -> {}",
                        table, to.name, from.logical_type, to.logical_type
                    )
                }
            }
            Action::DropColumn { table, field } => write!(f, "- {}.{}", table, field.name),
            Action::AddKey(fk) => write!(f, "+ FOREIGN KEY {}", fk),
            Action::DropKey(fk) => write!(f, "- FOREIGN KEY {}", fk),
            Action::CreateIndex(idx) => write!(f, "+ INDEX {}", idx.name()),
            Action::DropIndex(idx) => write!(f, "- INDEX {}", idx.name()),
        }
    }
}
