use super::*;
use proptest::prelude::*;
use strata_db_schema::{DatabaseFunction, LogicalType, Value};

fn registry() -> TypeRegistry {
    TypeRegistry::with_builtins()
}

fn company() -> Table {
    let mut table = Table::new("company");
    table.fields = vec![
        Field::new("companyID", LogicalType::Long).primary_key().auto_increment(),
        Field::new("name", LogicalType::Varchar).precision(255).not_null(),
        Field::new("cool", LogicalType::Boolean),
        Field::new("motivation", LogicalType::Clob),
    ];
    table
}

fn person() -> Table {
    let mut table = Table::new("person");
    table.fields = vec![
        Field::new("id", LogicalType::Long).primary_key().auto_increment(),
        Field::new("firstName", LogicalType::Varchar).precision(255),
        Field::new("lastName", LogicalType::Varchar).precision(255),
        Field::new("companyID", LogicalType::Long),
    ];
    table.foreign_keys = vec![ForeignKey::new("person", "companyID", "company", "companyID")];
    table.indexes = vec![Index::new("person", "companyID", LogicalType::Long)];
    table
}

fn schema(tables: impl IntoIterator<Item = Table>) -> Schema {
    tables.into_iter().collect()
}

fn diff(current: &Schema, desired: &Schema) -> SchemaDiff {
    let registry = registry();
    SchemaDiffer::new(&registry).diff(current, desired)
}

fn with_field(mut table: Table, name: &str, f: impl FnOnce(Field) -> Field) -> Table {
    let field = table.fields.iter_mut().find(|c| c.name == name).unwrap();
    *field = f(field.clone());
    table
}

// ==================== Tables ====================

#[test]
fn test_diff_empty_schemas() {
    let diff = diff(&Schema::new(), &Schema::new());
    assert!(diff.is_empty());
    assert_eq!(diff.to_string(), "No changes detected.\n");
}

#[test]
fn test_full_creation() {
    let desired = schema([company(), person()]);
    let diff = diff(&Schema::new(), &desired);
    assert_eq!(
        diff.actions,
        vec![Action::Create(company()), Action::Create(person())]
    );
    // the table travels whole
    let Action::Create(person) = &diff.actions[1] else {
        panic!("expected a create");
    };
    assert_eq!(person.fields.len(), 4);
    assert_eq!(person.foreign_keys.len(), 1);
    assert_eq!(person.indexes.len(), 1);
}

#[test]
fn test_diff_drop_table() {
    let diff = diff(&schema([company(), person()]), &schema([company()]));
    assert_eq!(diff.actions, vec![Action::Drop(person())]);
    assert_eq!(diff.destructive_count(), 1);
}

#[test]
fn test_diff_no_changes() {
    let x = schema([company(), person()]);
    assert!(diff(&x, &x.clone()).is_empty());
}

// ==================== Columns ====================

#[test]
fn test_identity_vs_attribute_change() {
    let current = Field::new("age", LogicalType::Integer);
    let desired = Field::new("age", LogicalType::Integer).not_null().precision(3);
    assert_eq!(current, desired);

    let mut before = Table::new("person");
    before.fields = vec![current.clone()];
    let mut after = Table::new("person");
    after.fields = vec![desired.clone()];

    let diff = diff(&schema([before]), &schema([after]));
    assert_eq!(
        diff.actions,
        vec![Action::ChangeColumn {
            table: "person".into(),
            from: current,
            to: desired,
        }]
    );
}

#[test]
fn test_columns_added_changed_dropped() {
    let current = schema([company()]);
    let mut desired_company = with_field(company(), "cool", |f| f.not_null());
    desired_company.fields.retain(|f| f.name != "motivation");
    desired_company
        .fields
        .push(Field::new("founded", LogicalType::Date));

    let diff = diff(&current, &schema([desired_company]));
    insta::assert_snapshot!(diff.to_string(), @r###"
    + company.founded: DATE
    ~ company.cool
    - company.motivation
    "###);
}

#[test]
fn test_type_change_is_a_change_not_a_drop() {
    let current = schema([company()]);
    let desired = schema([with_field(company(), "motivation", |f| {
        Field::new(f.name, LogicalType::Varchar).precision(1000)
    })]);
    let diff = diff(&current, &desired);
    insta::assert_snapshot!(diff.to_string(), @"~ company.motivation: CLOB -> VARCHAR");
}

#[test]
fn test_storage_equivalent_types_match() {
    let mut current = person();
    current.fields[3] = Field::new("companyID", LogicalType::Integer);
    let mut desired = person();
    desired.fields[3] = Field::new("companyID", LogicalType::EntityReference);
    desired.indexes[0].logical_type = LogicalType::EntityReference;

    assert!(diff(&schema([current]), &schema([desired])).is_empty());
}

#[test]
fn test_unspecified_precision_and_scale_match() {
    let current = schema([with_field(company(), "cool", |f| f.scale(2))]);
    assert!(diff(&current, &schema([company()])).is_empty());

    let widened = schema([with_field(company(), "name", |f| f.precision(80))]);
    assert_eq!(diff(&schema([company()]), &widened).change_count(), 1);
}

#[test]
fn test_defaults_compare_by_value() {
    let live = schema([with_field(company(), "cool", |f| {
        f.default_value(DefaultValue::Value(Value::I32(1)))
    })]);
    let desired = schema([with_field(company(), "cool", |f| {
        f.default_value(DefaultValue::Value(Value::Bool(true)))
    })]);
    assert!(diff(&live, &desired).is_empty());

    let explicit_null = schema([with_field(company(), "cool", |f| {
        f.default_value(DefaultValue::Null)
    })]);
    assert!(diff(&schema([company()]), &explicit_null).is_empty());

    let stamped = schema([with_field(company(), "motivation", |f| {
        f.on_update(DefaultValue::Function(DatabaseFunction::CurrentTimestamp))
    })]);
    assert_eq!(diff(&schema([company()]), &stamped).change_count(), 1);
}

// ==================== Keys and indexes ====================

#[test]
fn test_changed_key_is_drop_and_add() {
    let mut retargeted = person();
    retargeted.foreign_keys = vec![ForeignKey::new("person", "companyID", "company", "name")];

    let diff = diff(
        &schema([company(), person()]),
        &schema([company(), retargeted]),
    );
    insta::assert_snapshot!(diff.to_string(), @r###"
    + FOREIGN KEY person.companyID -> company.name
    - FOREIGN KEY person.companyID -> company.companyID
    "###);
}

#[test]
fn test_indexes_match_on_table_and_field() {
    let mut retyped = person();
    retyped.indexes = vec![Index::new("person", "companyID", LogicalType::Integer)];
    assert!(diff(&schema([person()]), &schema([retyped])).is_empty());

    let mut moved = person();
    moved.indexes = vec![Index::new("person", "lastName", LogicalType::Varchar)];
    let diff = diff(&schema([person()]), &schema([moved]));
    insta::assert_snapshot!(diff.to_string(), @r###"
    + INDEX index_person_lastname
    - INDEX index_person_companyid
    "###);
}

#[test]
fn test_output_order() {
    let mut current_person = person();
    current_person.indexes.clear();
    current_person.fields.push(Field::new("nickname", LogicalType::Varchar));
    let current = schema([current_person, Table::new("legacy")]);

    let mut desired_person = person();
    desired_person.foreign_keys.clear();
    desired_person.fields[1] = desired_person.fields[1].clone().not_null();
    let desired = schema([company(), desired_person]);

    let diff = diff(&current, &desired);
    insta::assert_snapshot!(diff.to_string(), @r###"
    + table company
    - table legacy
    ~ person.firstName
    - person.nickname
    - FOREIGN KEY person.companyID -> company.companyID
    + INDEX index_person_companyid
    "###);
}

// ==================== Properties ====================

const TYPES: [LogicalType; 6] = [
    LogicalType::Integer,
    LogicalType::Long,
    LogicalType::Varchar,
    LogicalType::Boolean,
    LogicalType::Timestamp,
    LogicalType::EntityReference,
];

fn arb_field() -> impl Strategy<Value = Field> {
    (
        "[a-e]{1,2}",
        0..TYPES.len(),
        0u32..3,
        any::<bool>(),
        any::<bool>(),
        proptest::option::of(-5i32..5),
    )
        .prop_map(|(name, ty, precision, not_null, unique, default)| {
            let mut field = Field::new(name, TYPES[ty]).precision(precision * 10);
            if not_null {
                field = field.not_null();
            }
            if unique {
                field = field.unique();
            }
            if let Some(v) = default.filter(|_| TYPES[ty] == LogicalType::Integer) {
                field = field.default_value(DefaultValue::Value(Value::I32(v)));
            }
            field
        })
}

fn arb_schema() -> impl Strategy<Value = Schema> {
    proptest::collection::vec(
        (
            "t[0-5]",
            proptest::collection::vec(arb_field(), 1..5),
            proptest::collection::vec((0usize..5, "t[0-5]"), 0..3),
        ),
        0..6,
    )
    .prop_map(|tables| {
        let mut schema = Schema::new();
        for (name, fields, keys) in tables {
            if schema.get_table(&name).is_some() {
                continue;
            }
            let mut table = Table::new(name.clone());
            for field in fields {
                if table.field(&field.name).is_none() {
                    table.fields.push(field);
                }
            }
            for (i, target) in keys {
                let field = &table.fields[i % table.fields.len()];
                let fk = ForeignKey::new(&name, &field.name, &target, "id");
                let index = Index::new(&name, &field.name, field.logical_type);
                if !table.foreign_keys.contains(&fk) {
                    table.foreign_keys.push(fk);
                }
                if !table.indexes.contains(&index) {
                    table.indexes.push(index);
                }
            }
            schema.insert(table);
        }
        schema
    })
}

proptest! {
    #[test]
    fn diff_with_itself_is_empty(x in arb_schema()) {
        prop_assert!(diff(&x, &x).is_empty());
    }

    #[test]
    fn diff_from_nothing_creates_every_table(x in arb_schema()) {
        let diff = diff(&Schema::new(), &x);
        prop_assert_eq!(diff.change_count(), x.len());
        for (action, table) in diff.actions.iter().zip(x.iter_tables()) {
            prop_assert_eq!(action, &Action::Create(table.clone()));
        }
    }
}
