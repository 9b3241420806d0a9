//! Traced database connection wrapper.
//!
//! Wraps a tokio-postgres connection and logs all queries via tracing.

use std::future::Future;
use std::pin::Pin;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row, Statement};
use tracing::Instrument;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// Trait for database connections that can run catalog queries.
///
/// This is implemented for `tokio_postgres::Client` and `deadpool_postgres::Object`.
pub trait Connection: Send + Sync {
    /// Execute a query, returning all rows.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Vec<Row>>;

    /// Prepare a statement without running it.
    fn prepare<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Statement>;
}

impl Connection for tokio_postgres::Client {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Vec<Row>> {
        Box::pin(tokio_postgres::Client::query(self, sql, params))
    }

    fn prepare<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Statement> {
        Box::pin(tokio_postgres::Client::prepare(self, sql))
    }
}

impl Connection for deadpool_postgres::Object {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Vec<Row>> {
        // Deref to the underlying Client to avoid recursion
        use std::ops::Deref;
        let client: &tokio_postgres::Client = self.deref();
        Box::pin(client.query(sql, params))
    }

    fn prepare<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Statement> {
        use std::ops::Deref;
        let client: &tokio_postgres::Client = self.deref();
        Box::pin(client.prepare(sql))
    }
}

/// A wrapper around a database connection that logs all queries via tracing.
///
/// ```ignore
/// let traced = client.traced();
/// let rows = traced.query("SELECT relname FROM pg_class", &[]).await?;
/// ```
pub struct TracedConn<'a, C: Connection> {
    conn: &'a C,
}

impl<'a, C: Connection> TracedConn<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Execute a query, returning all rows.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self
            .conn
            .query(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    /// Prepare a statement, returning its result columns.
    pub async fn prepare(&self, sql: &str) -> Result<Statement, Error> {
        let span = tracing::debug_span!(
            "db.prepare",
            sql = %sql,
            columns = tracing::field::Empty,
        );
        let statement = self.conn.prepare(sql).instrument(span.clone()).await?;
        span.record("columns", statement.columns().len());
        Ok(statement)
    }
}

/// Extension trait to get a traced wrapper from a connection.
pub trait ConnectionExt: Connection + Sized {
    /// Wrap this connection in a `TracedConn` for query logging.
    fn traced(&self) -> TracedConn<'_, Self> {
        TracedConn::new(self)
    }
}

impl<C: Connection> ConnectionExt for C {}
