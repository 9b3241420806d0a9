//! Catalog metadata from `information_schema` and `pg_catalog`.

use crate::sql::TableRef;
use crate::traced::{Connection, ConnectionExt, TracedConn};
use std::collections::{HashMap, HashSet};
use strata::{CatalogIndex, ColumnMetadata, ImportedKey, ProbedColumn, sql_types};
use tokio_postgres::types::Type;
use tokio_postgres::{Error, Row};

const TABLES: &str = "\
SELECT table_name::text
FROM information_schema.tables
WHERE table_schema = $1::text AND table_type = 'BASE TABLE'
ORDER BY table_name";

const COLUMNS: &str = "\
SELECT column_name::text,
       data_type::text,
       character_maximum_length::int4,
       numeric_precision::int4,
       numeric_scale::int4,
       (is_nullable = 'NO') AS not_null,
       column_default::text,
       (is_identity = 'YES') AS identity
FROM information_schema.columns
WHERE table_schema = $1::text AND table_name = $2::text
ORDER BY ordinal_position";

const UNIQUE_COLUMNS: &str = "\
SELECT a.attname::text
FROM pg_index i
JOIN pg_class c ON c.oid = i.indrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = i.indkey[0]
WHERE n.nspname = $1::text AND c.relname = $2::text
  AND i.indisunique AND NOT i.indisprimary AND i.indnatts = 1";

const PRIMARY_KEYS: &str = "\
SELECT a.attname::text
FROM pg_index i
JOIN pg_class c ON c.oid = i.indrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey)
WHERE n.nspname = $1::text AND c.relname = $2::text AND i.indisprimary
ORDER BY array_position(i.indkey::int2[], a.attnum)";

const IMPORTED_KEYS: &str = "\
SELECT a.attname::text, fc.relname::text, fa.attname::text
FROM pg_constraint con
JOIN pg_class c ON c.oid = con.conrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
JOIN pg_class fc ON fc.oid = con.confrelid
JOIN LATERAL unnest(con.conkey, con.confkey) AS k(attnum, fattnum) ON true
JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
LEFT JOIN pg_attribute fa ON fa.attrelid = con.confrelid AND fa.attnum = k.fattnum
WHERE con.contype = 'f' AND n.nspname = $1::text AND c.relname = $2::text
ORDER BY con.conname, a.attnum";

const INDEXES: &str = "\
SELECT ic.relname::text, a.attname::text
FROM pg_index i
JOIN pg_class c ON c.oid = i.indrelid
JOIN pg_class ic ON ic.oid = i.indexrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = i.indkey[0]
WHERE n.nspname = $1::text AND c.relname = $2::text
  AND i.indnatts = 1 AND NOT i.indisunique AND NOT i.indisprimary
ORDER BY ic.relname";

/// `NAMEDATALEN - 1`: PostgreSQL truncates longer identifiers.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// One row of `information_schema.columns`.
struct ColumnInfo {
    name: String,
    data_type: String,
    character_length: Option<i32>,
    numeric_precision: Option<i32>,
    numeric_scale: Option<i32>,
    not_null: bool,
    default: Option<String>,
    identity: bool,
}

impl ColumnInfo {
    fn from_row(row: &Row) -> Result<Self, Error> {
        Ok(Self {
            name: row.try_get(0)?,
            data_type: row.try_get(1)?,
            character_length: row.try_get(2)?,
            numeric_precision: row.try_get(3)?,
            numeric_scale: row.try_get(4)?,
            not_null: row.try_get(5)?,
            default: row.try_get(6)?,
            identity: row.try_get(7)?,
        })
    }

    fn auto_increment(&self) -> bool {
        self.identity
            || self
                .default
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("))
    }

    fn precision(&self) -> u32 {
        match self.data_type.as_str() {
            "character varying" | "character" => non_negative(self.character_length),
            "numeric" => non_negative(self.numeric_precision),
            _ => 0,
        }
    }

    fn scale(&self) -> u32 {
        match self.data_type.as_str() {
            "numeric" => non_negative(self.numeric_scale),
            _ => 0,
        }
    }
}

fn non_negative(value: Option<i32>) -> u32 {
    value.and_then(|v| u32::try_from(v).ok()).unwrap_or(0)
}

/// The schema of one PostgreSQL namespace.
///
/// Every query goes through the same connection, so the reader sees one
/// session's view of the catalog.
pub struct PgCatalog<'a, C: Connection> {
    conn: TracedConn<'a, C>,
    schema: String,
}

impl<'a, C: Connection> PgCatalog<'a, C> {
    pub fn new(conn: &'a C, schema: impl Into<String>) -> Self {
        Self {
            conn: conn.traced(),
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, Error> {
        self.conn
            .query(COLUMNS, &[&self.schema, &table])
            .await?
            .iter()
            .map(ColumnInfo::from_row)
            .collect()
    }

    async fn names(&self, sql: &str, table: &str) -> Result<Vec<String>, Error> {
        self.conn
            .query(sql, &[&self.schema, &table])
            .await?
            .iter()
            .map(|row| row.try_get(0))
            .collect()
    }
}

impl<C: Connection> strata::Catalog for PgCatalog<'_, C> {
    type Error = Error;

    async fn table_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .query(TABLES, &[&self.schema])
            .await?
            .iter()
            .map(|row| row.try_get(0))
            .collect()
    }

    async fn probe_columns(&self, table: &str) -> Result<Vec<ProbedColumn>, Error> {
        let probe = format!(
            "SELECT * FROM {} LIMIT 1",
            TableRef {
                schema: Some(self.schema()),
                name: table,
            }
        );
        let statement = self.conn.prepare(&probe).await?;
        let info: HashMap<String, ColumnInfo> = self
            .columns(table)
            .await?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        Ok(statement
            .columns()
            .iter()
            .map(|column| {
                let info = info.get(column.name());
                ProbedColumn {
                    name: column.name().to_owned(),
                    sql_type: sql_type_code(column.type_()),
                    precision: info.map_or(0, ColumnInfo::precision),
                    scale: info.map_or(0, ColumnInfo::scale),
                    auto_increment: info.is_some_and(ColumnInfo::auto_increment),
                    not_null: info.is_some_and(|i| i.not_null),
                }
            })
            .collect())
    }

    async fn column_metadata(&self, table: &str) -> Result<Vec<ColumnMetadata>, Error> {
        let unique: HashSet<String> = self
            .names(UNIQUE_COLUMNS, table)
            .await?
            .into_iter()
            .collect();
        Ok(self
            .columns(table)
            .await?
            .into_iter()
            .map(|c| ColumnMetadata {
                unique: unique.contains(&c.name),
                name: c.name,
                default: c.default,
                not_null: c.not_null,
                on_update: None,
            })
            .collect())
    }

    async fn primary_keys(&self, table: &str) -> Result<Vec<String>, Error> {
        self.names(PRIMARY_KEYS, table).await
    }

    async fn imported_keys(&self, table: &str) -> Result<Vec<ImportedKey>, Error> {
        self.conn
            .query(IMPORTED_KEYS, &[&self.schema, &table])
            .await?
            .iter()
            .map(|row| {
                Ok(ImportedKey {
                    field: row.try_get(0)?,
                    foreign_table: row.try_get(1)?,
                    foreign_field: row.try_get(2)?,
                })
            })
            .collect()
    }

    async fn indexes(&self, table: &str) -> Result<Vec<CatalogIndex>, Error> {
        self.conn
            .query(INDEXES, &[&self.schema, &table])
            .await?
            .iter()
            .map(|row| {
                Ok(CatalogIndex {
                    name: row.try_get(0)?,
                    field: row.try_get(1)?,
                })
            })
            .collect()
    }

    fn normalize_default(&self, raw: &str) -> Option<String> {
        normalize_default(raw)
    }

    fn max_identifier_len(&self) -> Option<usize> {
        Some(MAX_IDENTIFIER_LEN)
    }
}

/// Native type code for a PostgreSQL column type.
pub fn sql_type_code(ty: &Type) -> i32 {
    let known = [
        (Type::INT2, sql_types::INTEGER),
        (Type::INT4, sql_types::INTEGER),
        (Type::INT8, sql_types::BIGINT),
        (Type::FLOAT4, sql_types::FLOAT),
        (Type::FLOAT8, sql_types::DOUBLE),
        (Type::BOOL, sql_types::BOOLEAN),
        (Type::VARCHAR, sql_types::VARCHAR),
        (Type::BPCHAR, sql_types::VARCHAR),
        (Type::TEXT, sql_types::CLOB),
        (Type::TIMESTAMP, sql_types::TIMESTAMP),
        (Type::TIMESTAMPTZ, sql_types::TIMESTAMP),
        (Type::DATE, sql_types::DATE),
        (Type::TIME, sql_types::TIME),
        (Type::BYTEA, sql_types::BLOB),
    ];
    known
        .iter()
        .find(|(known, _)| known == ty)
        .map_or(sql_types::OTHER, |(_, code)| *code)
}

/// Turn a `column_default` expression into the form the type registry parses.
///
/// Sequence defaults mean "no default". Casts and wrapping parentheses are
/// stripped and string literals unquoted:
///
/// ```
/// use strata_postgres::normalize_default;
/// assert_eq!(normalize_default("'it''s'::character varying").as_deref(), Some("it's"));
/// assert_eq!(normalize_default("(-1)").as_deref(), Some("-1"));
/// assert_eq!(normalize_default("nextval('person_id_seq'::regclass)"), None);
/// ```
pub fn normalize_default(raw: &str) -> Option<String> {
    let mut text = raw.trim();
    if text.starts_with("nextval(") {
        return None;
    }
    if text.eq_ignore_ascii_case("now()") {
        return Some("CURRENT_TIMESTAMP".to_owned());
    }

    if let Some(pos) = text.rfind("::") {
        if !text[pos..].contains('\'') {
            text = text[..pos].trim_end();
        }
    }
    while let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        text = inner.trim();
    }

    match text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        Some(quoted) => Some(quoted.replace("''", "'")),
        None => Some(text.to_owned()),
    }
}
