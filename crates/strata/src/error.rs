use strata_db_schema::TypeResolutionError;
use thiserror::Error;

use crate::config::ConfigError;

/// Boxed error returned by a catalog or provider implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Introspection(#[from] SchemaIntrospectionError),

    #[error(transparent)]
    Generation(#[from] SchemaGenerationError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedDdlOperation),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to execute `{statement}`: {source}")]
    Execution {
        statement: String,
        #[source]
        source: BoxError,
    },
}

/// Reading the live schema failed. No partial snapshot is returned.
#[derive(Debug, Error)]
pub enum SchemaIntrospectionError {
    #[error("catalog query `{operation}` failed: {source}")]
    Catalog {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("catalog query `{operation}` failed for table `{table}`: {source}")]
    Table {
        table: String,
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("catalog reports column `{table}.{column}` in `{operation}` but the table has no such column")]
    UnknownColumn {
        table: String,
        column: String,
        operation: &'static str,
    },

    #[error("cannot interpret metadata of `{table}.{column}`: {source}")]
    Type {
        table: String,
        column: String,
        #[source]
        source: TypeResolutionError,
    },

    #[error(
        "cannot resolve the column `{table}.{column}` references in `{foreign_table}`: \
         the catalog doesn't name it and `{foreign_table}` has no single primary key"
    )]
    UnresolvedForeignColumn {
        table: String,
        column: String,
        foreign_table: String,
    },
}

/// The entity descriptors don't describe a valid schema.
#[derive(Debug, Error)]
pub enum SchemaGenerationError {
    #[error("table `{table}` is produced by more than one descriptor")]
    DuplicateTable { table: String },

    #[error("field `{field}` appears more than once in table `{table}`")]
    DuplicateField { table: String, field: String },

    #[error("entity `{entity}` refers to unknown entity `{referenced}`")]
    UnknownEntity { entity: String, referenced: String },

    #[error("entity `{entity}` is referenced but declares no primary key")]
    MissingPrimaryKey { entity: String },

    #[error("the primary key of `{entity}` refers back to itself through other keys")]
    KeyCycle { entity: String },

    #[error("cannot resolve the type of `{entity}.{field}`: {source}")]
    Type {
        entity: String,
        field: String,
        #[source]
        source: TypeResolutionError,
    },
}

/// A provider cannot express an action in its dialect.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot express `{action}`: {reason}")]
pub struct UnsupportedDdlOperation {
    /// Display form of the action
    pub action: String,
    pub reason: String,
}

impl UnsupportedDdlOperation {
    pub fn new(action: &strata_db_schema::Action, reason: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            reason: reason.into(),
        }
    }
}
