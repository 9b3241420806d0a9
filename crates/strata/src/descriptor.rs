//! Declarative entity descriptors, the generator's input.
//!
//! Descriptors are plain values built ahead of time (by hand, a build
//! script, or a derive); nothing here inspects live objects.

use strata_db_schema::{LogicalType, ValueType};

/// One entity: a future table.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    /// Entity name, referenced by [`FieldType::Reference`] and [`Relation`]s.
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub relations: Vec<Relation>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.constraints.primary_key)
    }
}

/// How a field's logical type is determined.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Explicit logical type.
    Logical(LogicalType),
    /// Resolved through the type registry.
    Value(ValueType),
    /// Many-to-one reference to another entity, by entity name.
    Reference(String),
}

/// Column constraints and attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    pub primary_key: bool,
    pub auto_increment: bool,
    pub not_null: bool,
    pub unique: bool,
    pub indexed: bool,
    /// Default, in the textual form the type registry parses
    pub default: Option<String>,
    pub on_update: Option<String>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: FieldType,
    pub constraints: Constraints,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            constraints: Constraints::default(),
        }
    }

    /// A field holding values of the Rust type `T`.
    pub fn of<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Value(ValueType::of::<T>()))
    }

    pub fn logical(name: impl Into<String>, ty: LogicalType) -> Self {
        Self::new(name, FieldType::Logical(ty))
    }

    pub fn reference(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(name, FieldType::Reference(entity.into()))
    }

    pub fn primary_key(mut self) -> Self {
        self.constraints.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.constraints.auto_increment = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.constraints.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.constraints.unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.constraints.indexed = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.constraints.default = Some(value.into());
        self
    }

    pub fn on_update(mut self, value: impl Into<String>) -> Self {
        self.constraints.on_update = Some(value.into());
        self
    }

    pub fn precision(mut self, precision: u32) -> Self {
        self.constraints.precision = Some(precision);
        self
    }

    pub fn scale(mut self, scale: u32) -> Self {
        self.constraints.scale = Some(scale);
        self
    }
}

/// A to-many relation declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// The target holds a reference back to this entity.
    OneToMany { target: String },
    /// Linked through a join table. With `through`, the named entity is the
    /// join table and nothing is generated implicitly.
    ManyToMany {
        target: String,
        through: Option<String>,
    },
}

impl Relation {
    pub fn one_to_many(target: impl Into<String>) -> Self {
        Relation::OneToMany {
            target: target.into(),
        }
    }

    pub fn many_to_many(target: impl Into<String>) -> Self {
        Relation::ManyToMany {
            target: target.into(),
            through: None,
        }
    }

    pub fn many_to_many_through(target: impl Into<String>, through: impl Into<String>) -> Self {
        Relation::ManyToMany {
            target: target.into(),
            through: Some(through.into()),
        }
    }
}
