//! The live database's introspection interface, as consumed by the reader.

use std::future::Future;

/// A column as described by the result metadata of a probe query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedColumn {
    pub name: String,
    /// Native SQL type code (see [`strata_db_schema::sql_types`])
    pub sql_type: i32,
    /// 0 when the type has no precision
    pub precision: u32,
    /// 0 when the type has no scale
    pub scale: u32,
    pub auto_increment: bool,
    pub not_null: bool,
}

/// Catalog column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnMetadata {
    pub name: String,
    /// Default expression, as the catalog reports it
    pub default: Option<String>,
    pub not_null: bool,
    /// Covered by a single-column unique constraint
    pub unique: bool,
    /// On-update expression, for dialects that have one
    pub on_update: Option<String>,
}

/// An imported (foreign) key on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedKey {
    /// Referencing column
    pub field: String,
    /// Referenced table
    pub foreign_table: String,
    /// Referenced column, when the catalog reports it
    pub foreign_field: Option<String>,
}

/// A single-column, non-unique secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogIndex {
    pub name: String,
    pub field: String,
}

/// Catalog metadata source.
///
/// Implementations should answer every call from the same session so that
/// the reader sees one consistent view of the schema.
pub trait Catalog: Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Names of every table in scope.
    fn table_names(&self) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send;

    /// Column metadata from the result of `SELECT * FROM <table> LIMIT 1`.
    fn probe_columns(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<ProbedColumn>, Self::Error>> + Send;

    fn column_metadata(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<ColumnMetadata>, Self::Error>> + Send;

    /// Primary-key columns, in key order.
    fn primary_keys(&self, table: &str)
    -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send;

    fn imported_keys(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<ImportedKey>, Self::Error>> + Send;

    fn indexes(&self, table: &str)
    -> impl Future<Output = Result<Vec<CatalogIndex>, Self::Error>> + Send;

    /// Turn a dialect default expression into the textual form the type
    /// registry parses. `None` means "no default" (e.g. a sequence).
    fn normalize_default(&self, raw: &str) -> Option<String> {
        Some(raw.to_owned())
    }

    /// Longest identifier the database keeps, in bytes. Longer names are
    /// stored truncated, so derived names are compared truncated too.
    fn max_identifier_len(&self) -> Option<usize> {
        None
    }
}
