//! Migrations against a live PostgreSQL server.
//!
//! Set `STRATA_TEST_DATABASE_URL` to run these; without it every test
//! returns early. Each test works in its own throwaway schema.

use std::sync::Once;
use std::time::{SystemTime, UNIX_EPOCH};
use strata::{
    CamelCaseNaming, EntityDescriptor, FieldDescriptor, LogicalType, MigrationConfig, Migrator,
    TypeRegistry, UnderscoreNaming,
};
use strata_postgres::{PgCatalog, PgProvider, PgRenderer};
use tokio_postgres::Client;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// A connection and a fresh schema, or `None` when no server is configured.
async fn scratch(name: &str) -> Option<(Client, MigrationConfig)> {
    let url = std::env::var("STRATA_TEST_DATABASE_URL").ok()?;
    init_tracing();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    let config = MigrationConfig {
        schema: format!("strata_{}_{}_{}", name, std::process::id(), nanos),
        database_url: Some(url),
        ..MigrationConfig::default()
    };
    let client = strata_postgres::connect(&config).await.unwrap();
    client
        .batch_execute(&format!("CREATE SCHEMA {}", strata_postgres::Ident(&config.schema)))
        .await
        .unwrap();
    Some((client, config))
}

async fn drop_schema(client: &Client, config: &MigrationConfig) {
    client
        .batch_execute(&format!(
            "DROP SCHEMA {} CASCADE",
            strata_postgres::Ident(&config.schema)
        ))
        .await
        .unwrap();
}

fn entities() -> Vec<EntityDescriptor> {
    vec![
        EntityDescriptor::new("Person")
            .field(FieldDescriptor::logical("id", LogicalType::Long).primary_key().auto_increment())
            .field(FieldDescriptor::logical("firstName", LogicalType::Varchar))
            .field(FieldDescriptor::logical("age", LogicalType::Integer).default_value("0"))
            .field(FieldDescriptor::reference("company", "Company")),
        EntityDescriptor::new("Company")
            .field(
                FieldDescriptor::logical("companyID", LogicalType::Long)
                    .primary_key()
                    .auto_increment(),
            )
            .field(FieldDescriptor::logical("name", LogicalType::Varchar).not_null())
            .field(FieldDescriptor::logical("cool", LogicalType::Boolean).default_value("false"))
            .field(FieldDescriptor::logical("motivation", LogicalType::Clob)),
    ]
}

#[tokio::test]
async fn migrate_then_nothing_left() {
    let Some((mut client, config)) = scratch("roundtrip").await else {
        return;
    };
    let registry = TypeRegistry::with_builtins();
    let migrator = Migrator::new(&registry, CamelCaseNaming).with_config(config.clone());

    let plan = migrator
        .plan(&PgCatalog::new(&client, &config.schema), &entities())
        .await
        .unwrap();
    insta::assert_snapshot!(plan.to_string(), @r###"
    1. + table company
    2. + table person
    "###);

    let renderer = PgRenderer::new(&registry).with_schema(&config.schema);
    let report = migrator
        .apply(&plan, &mut PgProvider::new(&mut client, renderer))
        .await
        .unwrap();
    assert_eq!(report.executed.len(), 2);

    let again = migrator
        .plan(&PgCatalog::new(&client, &config.schema), &entities())
        .await
        .unwrap();
    assert!(again.is_empty(), "{again}\n{}", again.current);

    let person = again.current.get_table("person").unwrap();
    assert_eq!(
        person.foreign_keys[0].to_string(),
        "person.companyID -> company.companyID"
    );
    assert_eq!(person.indexes[0].name(), "index_person_companyid");

    drop_schema(&client, &config).await;
}

#[tokio::test]
async fn added_and_changed_columns() {
    let Some((mut client, config)) = scratch("alter").await else {
        return;
    };
    let registry = TypeRegistry::with_builtins();
    let migrator = Migrator::new(&registry, CamelCaseNaming).with_config(config.clone());
    let renderer = PgRenderer::new(&registry).with_schema(&config.schema);

    let v1 = vec![
        EntityDescriptor::new("Note")
            .field(FieldDescriptor::logical("id", LogicalType::Integer).primary_key())
            .field(FieldDescriptor::logical("body", LogicalType::Clob)),
    ];
    let plan = migrator
        .plan(&PgCatalog::new(&client, &config.schema), &v1)
        .await
        .unwrap();
    migrator
        .apply(&plan, &mut PgProvider::new(&mut client, renderer.clone()))
        .await
        .unwrap();

    let v2 = vec![
        EntityDescriptor::new("Note")
            .field(FieldDescriptor::logical("id", LogicalType::Integer).primary_key())
            .field(FieldDescriptor::logical("body", LogicalType::Varchar).precision(500).not_null())
            .field(FieldDescriptor::logical("pinned", LogicalType::Boolean).default_value("true")),
    ];
    let plan = migrator
        .plan(&PgCatalog::new(&client, &config.schema), &v2)
        .await
        .unwrap();
    insta::assert_snapshot!(plan.to_string(), @r###"
    1. + note.pinned: BOOLEAN
    2. ~ note.body: CLOB -> VARCHAR
    "###);
    migrator
        .apply(&plan, &mut PgProvider::new(&mut client, renderer))
        .await
        .unwrap();

    let again = migrator
        .plan(&PgCatalog::new(&client, &config.schema), &v2)
        .await
        .unwrap();
    assert!(again.is_empty(), "{again}");

    drop_schema(&client, &config).await;
}

#[tokio::test]
async fn mutual_references_apply_cleanly() {
    let Some((mut client, config)) = scratch("cycle").await else {
        return;
    };
    let registry = TypeRegistry::with_builtins();
    let entities = vec![
        EntityDescriptor::new("Husband")
            .field(FieldDescriptor::logical("id", LogicalType::Integer).primary_key())
            .field(FieldDescriptor::reference("wife", "Wife")),
        EntityDescriptor::new("Wife")
            .field(FieldDescriptor::logical("id", LogicalType::Integer).primary_key())
            .field(FieldDescriptor::reference("husband", "Husband")),
    ];
    let migrator =
        Migrator::new(&registry, UnderscoreNaming::default()).with_config(config.clone());

    let plan = migrator
        .plan(&PgCatalog::new(&client, &config.schema), &entities)
        .await
        .unwrap();
    let renderer = PgRenderer::new(&registry).with_schema(&config.schema);
    migrator
        .apply(&plan, &mut PgProvider::new(&mut client, renderer))
        .await
        .unwrap();

    let again = migrator
        .plan(&PgCatalog::new(&client, &config.schema), &entities)
        .await
        .unwrap();
    assert!(again.is_empty(), "{again}");
    assert_eq!(again.current.get_table("husband").unwrap().foreign_keys.len(), 1);
    assert_eq!(again.current.get_table("wife").unwrap().foreign_keys.len(), 1);

    drop_schema(&client, &config).await;
}

#[tokio::test]
async fn failed_statement_rolls_back() {
    let Some((mut client, config)) = scratch("rollback").await else {
        return;
    };
    let registry = TypeRegistry::with_builtins();
    client
        .batch_execute(&format!(
            "CREATE TABLE {}.\"person\" (\"id\" INTEGER PRIMARY KEY)",
            strata_postgres::Ident(&config.schema)
        ))
        .await
        .unwrap();

    let mut provider = PgProvider::new(&mut client, PgRenderer::new(&registry));
    let statements = vec![
        format!(
            "CREATE TABLE {}.\"company\" (\"id\" INTEGER)",
            strata_postgres::Ident(&config.schema)
        ),
        format!(
            "CREATE TABLE {}.\"person\" (\"id\" INTEGER)",
            strata_postgres::Ident(&config.schema)
        ),
    ];
    let err = strata::Provider::execute_all(&mut provider, &statements, true)
        .await
        .unwrap_err();
    assert!(matches!(err, strata::Error::Execution { .. }), "{err}");

    let tables = strata::Catalog::table_names(&PgCatalog::new(&client, &config.schema))
        .await
        .unwrap();
    assert_eq!(tables, ["person"]);

    drop_schema(&client, &config).await;
}

#[tokio::test]
async fn pooled_connection_reads_schema() {
    let Some((mut client, config)) = scratch("pooled").await else {
        return;
    };
    let registry = TypeRegistry::with_builtins();
    let migrator = Migrator::new(&registry, CamelCaseNaming).with_config(config.clone());
    let plan = migrator
        .plan(&PgCatalog::new(&client, &config.schema), &entities())
        .await
        .unwrap();
    let renderer = PgRenderer::new(&registry).with_schema(&config.schema);
    migrator
        .apply(&plan, &mut PgProvider::new(&mut client, renderer))
        .await
        .unwrap();

    let mut pool_config = deadpool_postgres::Config::new();
    pool_config.url = config.database_url.clone();
    let pool = pool_config
        .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
        .unwrap();
    let object = pool.get().await.unwrap();

    let again = migrator
        .plan(&PgCatalog::new(&object, &config.schema), &entities())
        .await
        .unwrap();
    assert!(again.is_empty(), "{again}");
    assert_eq!(again.current.len(), 2);

    drop_schema(&client, &config).await;
}

#[tokio::test]
async fn long_index_names_stay_managed() {
    let Some((mut client, config)) = scratch("longnames").await else {
        return;
    };
    let registry = TypeRegistry::with_builtins();
    let migrator = Migrator::new(&registry, CamelCaseNaming).with_config(config.clone());
    let entities = vec![
        EntityDescriptor::new("SubscriptionRenewalReminderSettings")
            .field(FieldDescriptor::logical("id", LogicalType::Integer).primary_key())
            .field(
                FieldDescriptor::logical("notificationDeliveryChannelPreference", LogicalType::Integer)
                    .indexed(),
            ),
    ];

    let catalog = PgCatalog::new(&client, &config.schema);
    assert_eq!(catalog.schema(), config.schema);
    let plan = migrator.plan(&catalog, &entities).await.unwrap();
    let renderer = PgRenderer::new(&registry).with_schema(&config.schema);
    migrator
        .apply(&plan, &mut PgProvider::new(&mut client, renderer))
        .await
        .unwrap();

    let again = migrator
        .plan(&PgCatalog::new(&client, &config.schema), &entities)
        .await
        .unwrap();
    assert!(again.is_empty(), "{again}");
    let index = &again.current.iter_tables().next().unwrap().indexes[0];
    assert!(index.name().len() > strata_postgres::MAX_IDENTIFIER_LEN);

    drop_schema(&client, &config).await;
}
