//! Quoting helpers.

use std::fmt;

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// ```
/// use strata_postgres::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0.as_ref().replace('\'', "''"))
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Identifiers are always quoted: entity names like `user` or `order` are
/// reserved words, and camel-case names would otherwise be folded to lower
/// case.
///
/// ```
/// use strata_postgres::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.as_ref().replace('"', "\"\""))
    }
}

/// A table name, schema-qualified when a schema is given.
pub(crate) struct TableRef<'a> {
    pub schema: Option<&'a str>,
    pub name: &'a str,
}

impl fmt::Display for TableRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = self.schema {
            write!(f, "{}.", Ident(schema))?;
        }
        write!(f, "{}", Ident(self.name))
    }
}
