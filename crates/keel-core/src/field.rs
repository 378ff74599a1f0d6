//! Field and column declarations.

/// Metadata about one persisted field of a model.
///
/// Produced by `#[derive(Model)]` as a `static` slice; hand-written models
/// build it with the `const` builder below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name
    pub name: &'static str,
    /// Database column name (may differ from field name)
    pub column_name: &'static str,
    /// Whether this is the primary key
    pub primary_key: bool,
}

impl FieldInfo {
    /// Create a field whose column name is given explicitly.
    pub const fn new(name: &'static str, column_name: &'static str) -> Self {
        Self {
            name,
            column_name,
            primary_key: false,
        }
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column_name = name;
        self
    }

    /// Mark this field as the primary key.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }
}
