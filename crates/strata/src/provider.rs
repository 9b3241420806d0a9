//! The dialect boundary: turning actions into SQL and running it.

use crate::error::{Error, UnsupportedDdlOperation};
use std::future::Future;
use strata_db_schema::Action;

/// Renders actions in one SQL dialect and executes the result.
///
/// Rendering is synchronous and side-effect free; only [`execute`] and
/// [`execute_all`] touch the database.
///
/// [`execute`]: Provider::execute
/// [`execute_all`]: Provider::execute_all
pub trait Provider: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// SQL statements implementing `action`, in execution order.
    fn render(&self, action: &Action) -> Result<Vec<String>, UnsupportedDdlOperation>;

    /// Execute one statement.
    fn execute(&mut self, sql: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Execute statements in order, stopping at the first failure.
    ///
    /// The default runs them one by one and ignores `transactional`;
    /// providers whose dialect has transactional DDL should override it.
    fn execute_all(
        &mut self,
        statements: &[String],
        transactional: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            if transactional {
                tracing::debug!("provider has no transaction support, executing one by one");
            }
            for statement in statements {
                self.execute(statement)
                    .await
                    .map_err(|source| Error::Execution {
                        statement: statement.clone(),
                        source: Box::new(source),
                    })?;
            }
            Ok(())
        }
    }
}
