//! Executes rendered DDL on a tokio-postgres client.

use crate::render::PgRenderer;
use strata::{Action, Provider, UnsupportedDdlOperation};
use tokio_postgres::{Client, Error};
use tracing::Instrument;

/// A [`Provider`] over a PostgreSQL client.
///
/// PostgreSQL has transactional DDL, so a transactional run either applies
/// every statement or none.
pub struct PgProvider<'a, 'r> {
    client: &'a mut Client,
    renderer: PgRenderer<'r>,
}

impl<'a, 'r> PgProvider<'a, 'r> {
    pub fn new(client: &'a mut Client, renderer: PgRenderer<'r>) -> Self {
        Self { client, renderer }
    }
}

fn execution_error(statement: &str, source: Error) -> strata::Error {
    strata::Error::Execution {
        statement: statement.to_owned(),
        source: Box::new(source),
    }
}

impl Provider for PgProvider<'_, '_> {
    type Error = Error;

    fn render(&self, action: &Action) -> Result<Vec<String>, UnsupportedDdlOperation> {
        self.renderer.render(action)
    }

    async fn execute(&mut self, sql: &str) -> Result<(), Error> {
        let span = tracing::debug_span!("db.execute", sql = %sql);
        self.client.batch_execute(sql).instrument(span).await
    }

    async fn execute_all(
        &mut self,
        statements: &[String],
        transactional: bool,
    ) -> Result<(), strata::Error> {
        if !transactional {
            for statement in statements {
                self.execute(statement)
                    .await
                    .map_err(|e| execution_error(statement, e))?;
            }
            return Ok(());
        }

        let transaction = self
            .client
            .transaction()
            .await
            .map_err(|e| execution_error("BEGIN", e))?;
        for statement in statements {
            let span = tracing::debug_span!("db.execute", sql = %statement);
            transaction
                .batch_execute(statement)
                .instrument(span)
                .await
                .map_err(|e| execution_error(statement, e))?;
        }
        transaction
            .commit()
            .await
            .map_err(|e| execution_error("COMMIT", e))
    }
}
