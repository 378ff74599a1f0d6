//! Attribute parsing for the Model derive macro.
//!
//! Turns a `DeriveInput` into a [`ModelDef`] holding the table name and one
//! [`FieldDef`] per struct field. Structural checks that need the whole
//! definition live in `validate`.

use proc_macro2::Span;
use syn::{Attribute, Data, DeriveInput, Error, Field, Fields, Ident, Lit, Result};

/// Parsed model definition.
#[derive(Debug)]
pub struct ModelDef {
    pub name: Ident,
    /// `None` when the struct carries no `#[keel(table = "...")]`.
    pub table_name: Option<String>,
    pub fields: Vec<FieldDef>,
    pub generics: syn::Generics,
}

/// Parsed field definition.
#[derive(Debug)]
pub struct FieldDef {
    pub name: Ident,
    pub column_name: String,
    pub primary_key: bool,
    pub skip: bool,
}

impl ModelDef {
    /// Fields that map to a column.
    pub fn persisted_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.skip)
    }

    pub fn primary_key_fields(&self) -> Vec<&FieldDef> {
        self.persisted_fields().filter(|f| f.primary_key).collect()
    }
}

/// Parse a derive input into a model definition.
pub fn parse_model(input: &DeriveInput) -> Result<ModelDef> {
    let name = input.ident.clone();
    let generics = input.generics.clone();
    let table_name = parse_struct_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Model can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Model can only be derived for structs, not unions",
            ));
        }
    };

    Ok(ModelDef {
        name,
        table_name,
        fields,
        generics,
    })
}

/// Parse struct-level `#[keel(...)]` attributes. Only `table = "name"` is accepted.
fn parse_struct_attrs(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table_name: Option<String> = None;

    for attr in attrs {
        if !attr.path().is_ident("keel") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                if table_name.is_some() {
                    return Err(Error::new_spanned(
                        meta.path,
                        "duplicate keel attribute: table",
                    ));
                }
                let value: Lit = meta.value()?.parse()?;
                match value {
                    Lit::Str(lit_str) => {
                        table_name = Some(lit_str.value());
                        Ok(())
                    }
                    other => Err(Error::new_spanned(
                        other,
                        "expected string literal for table name",
                    )),
                }
            } else {
                Err(Error::new_spanned(
                    meta.path,
                    "unknown keel struct attribute (supported: table)",
                ))
            }
        })?;
    }

    Ok(table_name)
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Model requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Model requires a struct with fields, not a unit struct",
        )),
    }
}

fn parse_field(field: &Field) -> Result<FieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;
    let attrs = parse_field_attrs(&field.attrs)?;

    Ok(FieldDef {
        column_name: attrs.column.unwrap_or_else(|| name.to_string()),
        primary_key: attrs.primary_key,
        skip: attrs.skip,
        name,
    })
}

#[derive(Default)]
struct FieldAttrs {
    column: Option<String>,
    primary_key: bool,
    skip: bool,
}

/// Parse all `#[keel(...)]` attributes on a field.
fn parse_field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("keel") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("primary_key") {
                result.primary_key = true;
            } else if path.is_ident("skip") {
                result.skip = true;
            } else if path.is_ident("column") {
                let value: Lit = meta.value()?.parse()?;
                if let Lit::Str(lit_str) = value {
                    result.column = Some(lit_str.value());
                } else {
                    return Err(Error::new_spanned(
                        value,
                        "expected string literal for column name",
                    ));
                }
            } else {
                return Err(Error::new_spanned(
                    path,
                    "unknown keel field attribute (supported: primary_key, column, skip)",
                ));
            }
            Ok(())
        })?;
    }

    Ok(result)
}
