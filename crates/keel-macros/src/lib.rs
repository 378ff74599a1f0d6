//! Procedural macros for Keel.
//!
//! `keel-macros` turns plain structs into mapped entities by generating a
//! `keel_core::Model` implementation: static field metadata plus the
//! conversions between the struct and a database row. Application crates
//! use it through the `keel` facade.

use proc_macro::TokenStream;

mod parse;
mod validate;

use parse::{ModelDef, parse_model};

/// Derive macro for the `Model` trait.
///
/// # Attributes
///
/// - `#[keel(table = "name")]` - Table the entity maps to (required)
/// - `#[keel(primary_key)]` - Mark the single identifying field
/// - `#[keel(column = "name")]` - Override column name (defaults to the field name)
/// - `#[keel(skip)]` - Not persisted; filled with `Default::default()` on load
///
/// `Option<T>` fields map NULL to `None`.
///
/// # Example
///
/// ```ignore
/// use keel::Model;
///
/// #[derive(Model, Debug)]
/// #[keel(table = "products")]
/// struct Product {
///     #[keel(primary_key)]
///     id: i64,
///     name: String,
/// }
/// ```
#[proc_macro_derive(Model, attributes(keel))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let model = match parse_model(&input) {
        Ok(m) => m,
        Err(e) => return e.to_compile_error().into(),
    };

    if let Err(e) = validate::validate_model(&model) {
        return e.to_compile_error().into();
    }

    generate_model_impl(&model).into()
}

fn generate_model_impl(model: &ModelDef) -> proc_macro2::TokenStream {
    let name = &model.name;
    let (impl_generics, ty_generics, where_clause) = model.generics.split_for_impl();
    let table_name = model.table_name.as_deref().unwrap_or_default();

    let field_infos = generate_field_infos(model);
    let to_row_body = generate_to_row(model);
    let from_row_body = generate_from_row(model);
    let pk_value_body = generate_primary_key_value(model);

    quote::quote! {
        impl #impl_generics keel_core::Model for #name #ty_generics #where_clause {
            const TABLE_NAME: &'static str = #table_name;

            fn fields() -> &'static [keel_core::FieldInfo] {
                static FIELDS: &[keel_core::FieldInfo] = &[#(#field_infos),*];
                FIELDS
            }

            fn to_row(&self) -> Vec<(&'static str, keel_core::Value)> {
                #to_row_body
            }

            fn from_row(row: &keel_core::Row) -> keel_core::Result<Self> {
                #from_row_body
            }

            fn primary_key_value(&self) -> keel_core::Value {
                #pk_value_body
            }
        }
    }
}

fn generate_field_infos(model: &ModelDef) -> Vec<proc_macro2::TokenStream> {
    model
        .persisted_fields()
        .map(|field| {
            let field_name = field.name.to_string();
            let column_name = &field.column_name;
            let primary_key = field.primary_key;
            quote::quote! {
                keel_core::FieldInfo::new(#field_name, #column_name)
                    .primary_key(#primary_key)
            }
        })
        .collect()
}

fn generate_to_row(model: &ModelDef) -> proc_macro2::TokenStream {
    let conversions = model.persisted_fields().map(|field| {
        let field_name = &field.name;
        let column_name = &field.column_name;
        quote::quote! {
            (#column_name, keel_core::Value::from(self.#field_name.clone()))
        }
    });

    quote::quote! {
        vec![#(#conversions),*]
    }
}

fn generate_from_row(model: &ModelDef) -> proc_macro2::TokenStream {
    let name = &model.name;

    // Option<T> reads NULL as None; a missing column is still an error.
    let extractions = model.persisted_fields().map(|field| {
        let field_name = &field.name;
        let column_name = &field.column_name;
        quote::quote! { #field_name: row.get_named(#column_name)? }
    });

    let skipped = model.fields.iter().filter(|f| f.skip).map(|f| {
        let field_name = &f.name;
        quote::quote! { #field_name: Default::default() }
    });

    quote::quote! {
        Ok(#name {
            #(#extractions,)*
            #(#skipped,)*
        })
    }
}

fn generate_primary_key_value(model: &ModelDef) -> proc_macro2::TokenStream {
    match model.primary_key_fields().first() {
        Some(field) => {
            let field_name = &field.name;
            quote::quote! { keel_core::Value::from(self.#field_name.clone()) }
        }
        None => quote::quote! { keel_core::Value::Null },
    }
}
