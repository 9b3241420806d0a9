//! The migration pipeline: read, generate, diff, sort, then apply.
//!
//! Planning never touches the database beyond catalog reads, so a plan can be
//! shown to a human before anything runs:
//!
//! ```ignore
//! let migrator = Migrator::new(&registry, CamelCaseNaming).with_config(config);
//! let plan = migrator.plan(&catalog, &entities).await?;
//! println!("{plan}");
//! let report = migrator.apply(&plan, &mut provider).await?;
//! ```

use crate::catalog::Catalog;
use crate::config::MigrationConfig;
use crate::descriptor::EntityDescriptor;
use crate::diff::SchemaDiffer;
use crate::generator::SchemaGenerator;
use crate::naming::NamingStrategy;
use crate::provider::Provider;
use crate::reader::SchemaReader;
use crate::solver::{depends_on, order_actions};
use std::fmt;
use strata_db_schema::{Action, Schema, TypeRegistry};

/// Ordered actions bringing the live schema in line with the descriptors.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Live snapshot the plan was computed against
    pub current: Schema,
    /// Snapshot the descriptors describe
    pub desired: Schema,
    /// Actions in execution order
    pub actions: Vec<Action>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn destructive(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| a.is_destructive())
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "Schema is up to date.");
        }
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "{}. {}", i + 1, action)?;
        }
        Ok(())
    }
}

/// What [`Migrator::apply`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    /// Actions executed, in order
    pub executed: Vec<Action>,
    /// Destructive actions left out because drops are not allowed
    pub skipped: Vec<Action>,
    /// SQL statements executed
    pub statements: Vec<String>,
}

/// Runs the pipeline with one registry, naming strategy and configuration.
#[derive(Debug, Clone)]
pub struct Migrator<'r, N> {
    registry: &'r TypeRegistry,
    naming: N,
    config: MigrationConfig,
}

impl<'r, N: NamingStrategy> Migrator<'r, N> {
    pub fn new(registry: &'r TypeRegistry, naming: N) -> Self {
        Self {
            registry,
            naming,
            config: MigrationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Compute the ordered actions for `entities` against the live schema.
    ///
    /// Descriptors are compiled before the catalog is read, so an invalid
    /// descriptor fails without any database round trip.
    pub async fn plan<C: Catalog>(
        &self,
        catalog: &C,
        entities: &[EntityDescriptor],
    ) -> crate::Result<MigrationPlan> {
        let desired = SchemaGenerator::new(self.registry, &self.naming).generate(entities)?;
        let current = SchemaReader::new(self.registry).read(catalog).await?;
        Ok(self.plan_between(current, desired))
    }

    /// Diff and order two snapshots.
    pub fn plan_between(&self, current: Schema, desired: Schema) -> MigrationPlan {
        let diff = SchemaDiffer::new(self.registry).diff(&current, &desired);
        let actions = order_actions(diff.actions);
        for action in &actions {
            tracing::info!(kind = %action.kind(), table = %action.table_name(), "planned {}", action);
        }
        MigrationPlan {
            current,
            desired,
            actions,
        }
    }

    /// Render and execute a plan.
    ///
    /// Unless drops are allowed, destructive actions are skipped, along with
    /// every action that depends on a skipped one.
    ///
    /// Every action is rendered before the first statement runs, so an
    /// action the dialect can't express aborts the run untouched.
    pub async fn apply<P: Provider>(
        &self,
        plan: &MigrationPlan,
        provider: &mut P,
    ) -> crate::Result<MigrationReport> {
        let mut report = MigrationReport::default();
        for action in &plan.actions {
            if action.is_destructive() && !self.config.allow_drops {
                tracing::warn!(action = %action, "skipping destructive action, drops are not allowed");
                report.skipped.push(action.clone());
                continue;
            }
            // Skipping a drop also skips whatever was ordered after it.
            let blocker = report
                .skipped
                .iter()
                .find(|skipped| depends_on(action, skipped))
                .map(|skipped| skipped.to_string());
            if let Some(blocker) = blocker {
                tracing::warn!(action = %action, blocked_by = %blocker, "skipping action that needs a skipped drop");
                report.skipped.push(action.clone());
                continue;
            }
            report.statements.extend(provider.render(action)?);
            report.executed.push(action.clone());
        }

        if report.statements.is_empty() {
            tracing::info!("nothing to execute");
            return Ok(report);
        }
        provider
            .execute_all(&report.statements, self.config.transactional)
            .await?;
        tracing::info!(
            actions = report.executed.len(),
            statements = report.statements.len(),
            skipped = report.skipped.len(),
            "migration applied"
        );
        Ok(report)
    }

    /// [`plan`](Self::plan) then [`apply`](Self::apply).
    pub async fn migrate<C: Catalog, P: Provider>(
        &self,
        catalog: &C,
        provider: &mut P,
        entities: &[EntityDescriptor],
    ) -> crate::Result<MigrationReport> {
        let plan = self.plan(catalog, entities).await?;
        self.apply(&plan, provider).await
    }
}
