//! PostgreSQL support for strata.
//!
//! - [`PgCatalog`] reads the live schema of one namespace through
//!   `information_schema` and `pg_catalog`, for the schema reader.
//! - [`PgRenderer`] turns actions into PostgreSQL DDL, and [`PgProvider`]
//!   executes it, in a single transaction by default.
//!
//! Reading and executing use separate borrows of the client, so a run plans
//! first and applies second:
//!
//! ```ignore
//! let mut client = strata_postgres::connect(&config).await?;
//! let migrator = Migrator::new(&registry, CamelCaseNaming).with_config(config.clone());
//! let plan = migrator
//!     .plan(&PgCatalog::new(&client, &config.schema), &entities)
//!     .await?;
//! let renderer = PgRenderer::new(&registry).with_schema(&config.schema);
//! migrator.apply(&plan, &mut PgProvider::new(&mut client, renderer)).await?;
//! ```

mod catalog;
mod provider;
mod render;
mod sql;
mod traced;

pub use catalog::{MAX_IDENTIFIER_LEN, PgCatalog, normalize_default, sql_type_code};
pub use provider::PgProvider;
pub use render::{PgRenderer, constraint_name};
pub use sql::{Ident, Lit};
pub use traced::{Connection, ConnectionExt, TracedConn};

use strata::MigrationConfig;
use tokio_postgres::{Client, NoTls};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("no database URL: set DATABASE_URL or `database_url` in .config/strata.toml")]
    MissingUrl,

    #[error("failed to connect: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

/// Connect with the configured URL. The connection task is spawned on the
/// current tokio runtime.
pub async fn connect(config: &MigrationConfig) -> Result<Client, ConnectError> {
    let url = config.database_url().ok_or(ConnectError::MissingUrl)?;
    let (client, connection) = tokio_postgres::connect(&url, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "postgres connection closed");
        }
    });
    Ok(client)
}
