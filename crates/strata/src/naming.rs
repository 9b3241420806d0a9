//! Table and column naming strategies.

use crate::descriptor::{EntityDescriptor, FieldDescriptor, FieldType};

/// Maps descriptors to table and column names.
///
/// Implementations must be pure: the same input always yields the same name.
pub trait NamingStrategy {
    fn table_name(&self, entity: &EntityDescriptor) -> String;

    fn field_name(&self, field: &FieldDescriptor) -> String;

    /// Column referencing the entity called `entity`, for implicit foreign keys.
    fn reference_name(&self, entity: &str) -> String;

    /// Join table linking two tables, given in sorted order.
    fn join_table_name(&self, first: &str, second: &str) -> String {
        format!("{}_{}", first, second)
    }

    /// The two columns of a join table linking `entity` to itself.
    fn self_join_column_names(&self, entity: &str) -> [String; 2] {
        [
            self.reference_name(&format!("{}1", entity)),
            self.reference_name(&format!("{}2", entity)),
        ]
    }
}

impl<N: NamingStrategy + ?Sized> NamingStrategy for &N {
    fn table_name(&self, entity: &EntityDescriptor) -> String {
        (**self).table_name(entity)
    }

    fn field_name(&self, field: &FieldDescriptor) -> String {
        (**self).field_name(field)
    }

    fn reference_name(&self, entity: &str) -> String {
        (**self).reference_name(entity)
    }

    fn join_table_name(&self, first: &str, second: &str) -> String {
        (**self).join_table_name(first, second)
    }

    fn self_join_column_names(&self, entity: &str) -> [String; 2] {
        (**self).self_join_column_names(entity)
    }
}

/// `PersonSuit` -> `personSuit`; reference columns get an `ID` suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct CamelCaseNaming;

impl NamingStrategy for CamelCaseNaming {
    fn table_name(&self, entity: &EntityDescriptor) -> String {
        lower_first(&entity.name)
    }

    fn field_name(&self, field: &FieldDescriptor) -> String {
        match field.ty {
            FieldType::Reference(_) => format!("{}ID", field.name),
            _ => field.name.clone(),
        }
    }

    fn reference_name(&self, entity: &str) -> String {
        format!("{}ID", lower_first(entity))
    }
}

/// `PersonSuit` -> `person_suit`; reference columns get an `_id` suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnderscoreNaming {
    /// Upper-case every name.
    pub uppercase: bool,
}

impl UnderscoreNaming {
    fn finish(&self, name: String) -> String {
        if self.uppercase {
            name.to_uppercase()
        } else {
            name.to_lowercase()
        }
    }
}

impl NamingStrategy for UnderscoreNaming {
    fn table_name(&self, entity: &EntityDescriptor) -> String {
        self.finish(split_camel(&entity.name))
    }

    fn field_name(&self, field: &FieldDescriptor) -> String {
        match field.ty {
            FieldType::Reference(_) => self.finish(format!("{}_id", split_camel(&field.name))),
            _ => self.finish(split_camel(&field.name)),
        }
    }

    fn reference_name(&self, entity: &str) -> String {
        self.finish(format!("{}_id", split_camel(entity)))
    }

    fn join_table_name(&self, first: &str, second: &str) -> String {
        self.finish(format!("{}_{}", first, second))
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Insert `_` between a lowercase letter or digit and a following uppercase
/// letter or digit. Pairs don't overlap: `a1B` becomes `a_1B`.
fn split_camel(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match chars.get(i + 1) {
            Some(&next)
                if (c.is_lowercase() || c.is_ascii_digit())
                    && (next.is_uppercase() || next.is_ascii_digit()) =>
            {
                out.push(c);
                out.push('_');
                out.push(next);
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}
