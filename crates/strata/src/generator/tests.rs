use super::*;
use crate::descriptor::FieldDescriptor;
use crate::naming::{CamelCaseNaming, UnderscoreNaming};
use strata_db_schema::{DatabaseFunction, TypeResolutionError, Value, ValueType};

fn id(ty: LogicalType) -> FieldDescriptor {
    FieldDescriptor::logical("id", ty).primary_key().auto_increment()
}

fn company() -> EntityDescriptor {
    EntityDescriptor::new("Company")
        .field(id(LogicalType::Long))
        .field(FieldDescriptor::logical("name", LogicalType::Varchar).not_null())
}

fn person() -> EntityDescriptor {
    EntityDescriptor::new("Person")
        .field(FieldDescriptor::logical("name", LogicalType::Varchar))
        .field(id(LogicalType::Long))
        .field(FieldDescriptor::reference("company", "Company"))
}

fn generate(entities: &[EntityDescriptor]) -> Result<Schema, SchemaGenerationError> {
    let registry = TypeRegistry::with_builtins();
    SchemaGenerator::new(&registry, CamelCaseNaming).generate(entities)
}

// ==================== Layout ====================

#[test]
fn company_and_person() {
    let schema = generate(&[company(), person()]).unwrap();
    insta::assert_snapshot!(schema.to_string(), @r###"
    company
      id: LONG PK NOT NULL
      name: VARCHAR NOT NULL
    person
      id: LONG PK NOT NULL
      name: VARCHAR
      companyID: LONG
      FK person.companyID -> company.id
      INDEX index_person_companyid
    "###);
}

#[test]
fn reference_takes_key_precision() {
    let country = EntityDescriptor::new("Country")
        .field(FieldDescriptor::logical("code", LogicalType::Varchar).primary_key().precision(2));
    let city = EntityDescriptor::new("City")
        .field(id(LogicalType::Integer))
        .field(FieldDescriptor::reference("country", "Country"));

    let schema = generate(&[country, city]).unwrap();
    let field = schema.get_table("city").unwrap().field("countryID").unwrap();
    assert_eq!(field.logical_type, LogicalType::Varchar);
    assert_eq!(field.precision, 2);
}

#[test]
fn varchar_gets_default_precision() {
    let schema = generate(&[company()]).unwrap();
    let name = schema.get_table("company").unwrap().field("name").unwrap();
    assert_eq!(name.precision, 255);
}

#[test]
fn reference_key_type_reaches_referrers() {
    let passport = EntityDescriptor::new("Passport")
        .field(FieldDescriptor::reference("holder", "Person").primary_key());
    let visa = EntityDescriptor::new("Visa")
        .field(id(LogicalType::Integer))
        .field(FieldDescriptor::reference("passport", "Passport"));

    let schema = generate(&[company(), person(), passport, visa]).unwrap();
    let key = schema.get_table("passport").unwrap().field("holderID").unwrap();
    let column = schema.get_table("visa").unwrap().field("passportID").unwrap();
    assert_eq!(key.logical_type, LogicalType::Long);
    assert_eq!(column.logical_type, key.logical_type);
    assert_eq!(column.precision, key.precision);
    assert_eq!(
        schema.get_table("visa").unwrap().foreign_keys,
        vec![ForeignKey::new("visa", "passportID", "passport", "holderID")]
    );
}

#[test]
fn reference_keys_in_a_loop() {
    let egg = EntityDescriptor::new("Egg").field(FieldDescriptor::reference("hen", "Hen").primary_key());
    let hen = EntityDescriptor::new("Hen").field(FieldDescriptor::reference("egg", "Egg").primary_key());
    let err = generate(&[egg, hen]).unwrap_err();
    assert!(
        matches!(&err, SchemaGenerationError::KeyCycle { entity } if entity == "Egg" || entity == "Hen"),
        "{err:?}"
    );
}

#[test]
fn indexed_fields() {
    let tag = EntityDescriptor::new("Tag")
        .field(id(LogicalType::Integer))
        .field(FieldDescriptor::logical("label", LogicalType::Varchar).indexed());
    let schema = generate(&[tag]).unwrap();
    let indexes = &schema.get_table("tag").unwrap().indexes;
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name(), "index_tag_label");
}

#[test]
fn underscore_naming() {
    let entity = EntityDescriptor::new("PersonSuit")
        .field(FieldDescriptor::logical("suitId", LogicalType::Integer).primary_key())
        .field(FieldDescriptor::reference("owner", "Person"));
    let registry = TypeRegistry::with_builtins();
    let schema = SchemaGenerator::new(&registry, UnderscoreNaming { uppercase: true })
        .generate(&[company(), person(), entity])
        .unwrap();
    insta::assert_snapshot!(schema.to_string(), @r###"
    COMPANY
      ID: LONG PK NOT NULL
      NAME: VARCHAR NOT NULL
    PERSON
      ID: LONG PK NOT NULL
      NAME: VARCHAR
      COMPANY_ID: LONG
      FK PERSON.COMPANY_ID -> COMPANY.ID
      INDEX index_person_company_id
    PERSON_SUIT
      SUIT_ID: INTEGER PK NOT NULL
      OWNER_ID: LONG
      FK PERSON_SUIT.OWNER_ID -> PERSON.ID
      INDEX index_person_suit_owner_id
    "###);
}

// ==================== Defaults and types ====================

#[test]
fn defaults_are_parsed() {
    let event = EntityDescriptor::new("Event")
        .field(id(LogicalType::Integer).default_value("7"))
        .field(FieldDescriptor::logical("active", LogicalType::Boolean).default_value("yes"))
        .field(
            FieldDescriptor::logical("modified", LogicalType::Timestamp)
                .default_value("current_timestamp")
                .on_update("CURRENT_TIMESTAMP"),
        );
    let schema = generate(&[event]).unwrap();
    let table = schema.get_table("event").unwrap();

    // auto-increment wins over the default
    assert_eq!(table.field("id").unwrap().default_value, None);
    assert_eq!(
        table.field("active").unwrap().default_value,
        Some(DefaultValue::Value(Value::Bool(true)))
    );
    let modified = table.field("modified").unwrap();
    assert_eq!(
        modified.default_value,
        Some(DefaultValue::Function(DatabaseFunction::CurrentTimestamp))
    );
    assert_eq!(modified.on_update, modified.default_value);
}

#[test]
fn bad_default() {
    let entity = EntityDescriptor::new("Counter")
        .field(id(LogicalType::Integer))
        .field(FieldDescriptor::logical("hits", LogicalType::Integer).default_value("lots"));
    let err = generate(&[entity]).unwrap_err();
    assert!(
        matches!(&err, SchemaGenerationError::Type { entity, field, source: TypeResolutionError::Parse { .. } }
            if entity == "Counter" && field == "hits"),
        "{err:?}"
    );
}

#[test]
fn value_types_resolve_through_registry() {
    let entity = EntityDescriptor::new("Sample")
        .field(FieldDescriptor::of::<i64>("id").primary_key())
        .field(FieldDescriptor::of::<String>("label"))
        .field(FieldDescriptor::new(
            "blob",
            FieldType::Value(ValueType::named("my::Unknown")),
        ));
    let err = generate(&[entity]).unwrap_err();
    assert!(
        matches!(&err, SchemaGenerationError::Type { field, source: TypeResolutionError::UnknownValueType(_), .. } if field == "blob"),
        "{err:?}"
    );
}

// ==================== Relations ====================

#[test]
fn one_to_many_adds_implicit_column() {
    let team = EntityDescriptor::new("Team")
        .field(id(LogicalType::Integer))
        .relation(Relation::one_to_many("Player"));
    let player = EntityDescriptor::new("Player").field(id(LogicalType::Integer));

    let schema = generate(&[team, player]).unwrap();
    insta::assert_snapshot!(schema.get_table("player").map(|t| Schema::from_iter([t.clone()])).unwrap().to_string(), @r###"
    player
      id: INTEGER PK NOT NULL
      teamID: INTEGER
      FK player.teamID -> team.id
      INDEX index_player_teamid
    "###);
}

#[test]
fn one_to_many_skipped_when_reference_declared() {
    let company = company().relation(Relation::one_to_many("Person"));
    let schema = generate(&[company, person()]).unwrap();
    let person = schema.get_table("person").unwrap();
    assert_eq!(person.fields.len(), 3);
    assert_eq!(person.foreign_keys.len(), 1);
}

#[test]
fn many_to_many_join_table() {
    let student = EntityDescriptor::new("Student")
        .field(id(LogicalType::Integer))
        .relation(Relation::many_to_many("Course"));
    let course = EntityDescriptor::new("Course")
        .field(FieldDescriptor::logical("code", LogicalType::Varchar).primary_key().precision(12))
        .relation(Relation::many_to_many("Student"));

    let schema = generate(&[student, course]).unwrap();
    let names: Vec<_> = schema.iter_tables().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["student", "course", "course_student"]);

    insta::assert_snapshot!(schema.to_string(), @r###"
    student
      id: INTEGER PK NOT NULL
    course
      code: VARCHAR PK NOT NULL
    course_student
      courseID: VARCHAR NOT NULL
      studentID: INTEGER NOT NULL
      FK course_student.courseID -> course.code
      FK course_student.studentID -> student.id
      INDEX index_course_student_courseid
      INDEX index_course_student_studentid
    "###);
    let join = schema.get_table("course_student").unwrap();
    assert_eq!(join.field("courseID").unwrap().precision, 12);
}

#[test]
fn many_to_many_through_entity() {
    let student = EntityDescriptor::new("Student")
        .field(id(LogicalType::Integer))
        .relation(Relation::many_to_many_through("Course", "Enrollment"));
    let course = EntityDescriptor::new("Course").field(id(LogicalType::Integer));
    let enrollment = EntityDescriptor::new("Enrollment")
        .field(id(LogicalType::Integer))
        .field(FieldDescriptor::reference("student", "Student"))
        .field(FieldDescriptor::reference("course", "Course"));

    let schema = generate(&[student, course, enrollment]).unwrap();
    assert_eq!(schema.len(), 3);
    assert!(schema.get_table("course_student").is_none());
}

#[test]
fn self_many_to_many_gets_two_columns() {
    let user = EntityDescriptor::new("User")
        .field(id(LogicalType::Integer))
        .relation(Relation::many_to_many("User"));
    let schema = generate(&[user]).unwrap();
    insta::assert_snapshot!(schema.to_string(), @r###"
    user
      id: INTEGER PK NOT NULL
    user_user
      user1ID: INTEGER NOT NULL
      user2ID: INTEGER NOT NULL
      FK user_user.user1ID -> user.id
      FK user_user.user2ID -> user.id
      INDEX index_user_user_user1id
      INDEX index_user_user_user2id
    "###);
}

// ==================== Errors ====================

#[test]
fn unknown_reference() {
    let err = generate(&[person()]).unwrap_err();
    assert!(
        matches!(&err, SchemaGenerationError::UnknownEntity { entity, referenced } if entity == "Person" && referenced == "Company"),
        "{err:?}"
    );
}

#[test]
fn referenced_entity_needs_key() {
    let keyless = EntityDescriptor::new("Company")
        .field(FieldDescriptor::logical("name", LogicalType::Varchar));
    let err = generate(&[keyless, person()]).unwrap_err();
    assert!(
        matches!(&err, SchemaGenerationError::MissingPrimaryKey { entity } if entity == "Company"),
        "{err:?}"
    );
}

#[test]
fn duplicate_names() {
    let err = generate(&[company(), company()]).unwrap_err();
    assert!(matches!(&err, SchemaGenerationError::DuplicateTable { table } if table == "company"));

    let twice = company().field(FieldDescriptor::logical("name", LogicalType::Clob));
    let err = generate(&[twice]).unwrap_err();
    assert!(matches!(&err, SchemaGenerationError::DuplicateField { table, field } if table == "company" && field == "name"));
}
