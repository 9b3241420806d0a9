//! Database-agnostic schema migrations.
//!
//! strata compares two snapshots of a relational schema and works out the
//! ordered list of structural changes that turns one into the other:
//!
//! - the *current* snapshot is read from a live database through a
//!   [`Catalog`] by the [`SchemaReader`],
//! - the *desired* snapshot is compiled from [`EntityDescriptor`]s by the
//!   [`SchemaGenerator`], naming tables and columns with a
//!   [`NamingStrategy`],
//! - the [`SchemaDiffer`] produces the actions between them, and
//!   [`order_actions`] sorts them so each one can run after the previous,
//!   breaking foreign-key cycles along the way.
//!
//! Executing the result is left to a [`Provider`], which renders actions in
//! its SQL dialect. The [`Migrator`] strings the whole pipeline together.
//!
//! # Destructive actions
//!
//! Dropping tables, columns, keys or indexes is part of a plan like any other
//! action, but [`Migrator::apply`] only executes those when
//! [`MigrationConfig::allow_drops`] is set.

mod catalog;
pub mod config;
mod descriptor;
mod diff;
mod error;
mod generator;
mod migrate;
pub mod naming;
mod provider;
mod reader;
pub mod solver;

pub use catalog::{Catalog, CatalogIndex, ColumnMetadata, ImportedKey, ProbedColumn};
pub use config::{ConfigError, MigrationConfig};
pub use descriptor::{Constraints, EntityDescriptor, FieldDescriptor, FieldType, Relation};
pub use diff::{SchemaDiff, SchemaDiffer};
pub use error::{
    BoxError, Error, SchemaGenerationError, SchemaIntrospectionError, UnsupportedDdlOperation,
};
pub use generator::SchemaGenerator;
pub use migrate::{MigrationPlan, MigrationReport, Migrator};
pub use naming::{CamelCaseNaming, NamingStrategy, UnderscoreNaming};
pub use provider::Provider;
pub use reader::SchemaReader;
pub use solver::order_actions;

// Re-export the model so most users need a single dependency
pub use strata_db_schema::{
    Action, ActionKind, DatabaseFunction, DefaultValue, Field, ForeignKey, Index, LogicalType,
    Schema, Table, TypeHandler, TypeRegistry, TypeResolutionError, Value, ValueType, sql_types,
};

pub type Result<T> = std::result::Result<T, Error>;
