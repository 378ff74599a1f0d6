//! Compile-time validation for the Model derive macro.
//!
//! Mirrors the runtime checks of `MappingDescriptor::build` so that a
//! derived model which compiles always resolves. All problems are reported
//! together.

use std::collections::HashSet;

use syn::Error;

use crate::parse::ModelDef;

/// Validate a parsed model definition.
pub fn validate_model(model: &ModelDef) -> Result<(), Error> {
    let mut errors = Vec::new();

    validate_table_name(model, &mut errors);
    validate_has_fields(model, &mut errors);
    validate_columns(model, &mut errors);
    validate_primary_key(model, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let mut combined = errors.remove(0);
        for err in errors {
            combined.combine(err);
        }
        Err(combined)
    }
}

fn validate_table_name(model: &ModelDef, errors: &mut Vec<Error>) {
    match model.table_name.as_deref() {
        None => errors.push(Error::new(
            model.name.span(),
            "Model requires a table name: add #[keel(table = \"...\")]",
        )),
        Some(name) if name.trim().is_empty() => errors.push(Error::new(
            model.name.span(),
            "table name cannot be empty",
        )),
        Some(_) => {}
    }
}

fn validate_has_fields(model: &ModelDef, errors: &mut Vec<Error>) {
    if model.persisted_fields().next().is_none() {
        errors.push(Error::new(
            model.name.span(),
            "Model struct must have at least one persisted field",
        ));
    }
}

fn validate_columns(model: &ModelDef, errors: &mut Vec<Error>) {
    let mut seen = HashSet::new();
    for field in model.persisted_fields() {
        if field.column_name.trim().is_empty() {
            errors.push(Error::new(
                field.name.span(),
                "column name cannot be empty",
            ));
        } else if !seen.insert(field.column_name.as_str()) {
            errors.push(Error::new(
                field.name.span(),
                format!(
                    "duplicate column name '{}' (check #[keel(column = ...)] attributes)",
                    field.column_name
                ),
            ));
        }
    }
}

fn validate_primary_key(model: &ModelDef, errors: &mut Vec<Error>) {
    for field in model.fields.iter().filter(|f| f.skip && f.primary_key) {
        errors.push(Error::new(
            field.name.span(),
            "a skipped field cannot be the primary key",
        ));
    }

    let keys = model.primary_key_fields();
    match keys.len() {
        1 => {}
        0 => errors.push(Error::new(
            model.name.span(),
            "Model requires exactly one #[keel(primary_key)] field",
        )),
        _ => {
            for extra in &keys[1..] {
                errors.push(Error::new(
                    extra.name.span(),
                    "only one #[keel(primary_key)] field is supported",
                ));
            }
        }
    }
}
