mod schema;

use proc_macro::TokenStream;

/// Derive macro for declaring a record kind.
///
/// Each `#[schema(...)]` entry overrides one hook of `recordset::Schema`;
/// everything left out keeps the trait default.
///
/// # Usage
///
/// ```ignore
/// #[derive(Schema)]
/// #[schema(
///     url_root = "/persons",
///     id_attribute = "_id",
///     defaults = r#"{"active": true}"#,
///     query = r#"{"expand": "@author.id"}"#,
///     serialize = ["author"],
///     validate = Person::check,
/// )]
/// struct Person;
///
/// impl Person {
///     fn check(&self, attrs: &Attributes) -> Option<ValidationError> {
///         attrs.get("name").is_none().then(|| ValidationError::new("name is required"))
///     }
/// }
/// ```
///
/// Supported entries:
/// - `name = "..."`: kind name for logs (defaults to the type name)
/// - `url_root = "..."`, `id_attribute = "..."`
/// - `defaults = "<json object>"`, `query = "<json object>"`: checked at compile time
/// - `serialize = ["key", ...]`: embedded values included in `to_json`
/// - `validate = path`, `parse = path`, `initialize = path`: functions taking `&Self` first
#[proc_macro_derive(Schema, attributes(schema))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    schema::derive_schema(input)
}
