//! SQL dialect differences that matter to generated statements.
//!
//! SQLite is the bundled driver. `Postgres` stays for connections that
//! report `$n` placeholders through [`crate::Connection::dialect`].

/// SQL dialect for generating dialect-specific SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite dialect (uses ?1, ?2 placeholders)
    #[default]
    Sqlite,
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    Postgres,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Postgres => format!("${index}"),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled, so any table or column name
    /// is safe to splice into statement text.
    pub fn quote_identifier(self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_sqlite() {
        assert_eq!(Dialect::default(), Dialect::Sqlite);
        assert_eq!(Dialect::default().placeholder(1), "?1");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::Sqlite.placeholder(2), "?2");
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(Dialect::Sqlite.quote_identifier("products"), "\"products\"");
        assert_eq!(
            Dialect::Postgres.quote_identifier("we\"ird"),
            "\"we\"\"ird\""
        );
        assert_eq!(
            Dialect::Sqlite.quote_identifier("x\"; DROP TABLE products; --"),
            "\"x\"\"; DROP TABLE products; --\""
        );
    }
}
