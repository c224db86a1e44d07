use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, Expr, ExprArray, Lit, LitStr, Path};

#[derive(Default)]
struct SchemaArgs {
    name: Option<LitStr>,
    url_root: Option<LitStr>,
    id_attribute: Option<LitStr>,
    defaults: Option<LitStr>,
    query: Option<LitStr>,
    serialize: Vec<LitStr>,
    validate: Option<Path>,
    parse: Option<Path>,
    initialize: Option<Path>,
}

pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &input.ident;
    let args = parse_args(input)?;

    let name = args
        .name
        .map(|lit| lit.value())
        .unwrap_or_else(|| ident.to_string());

    let url_root = args.url_root.map(|root| {
        quote! {
            fn url_root(&self) -> ::std::option::Option<::std::string::String> {
                ::std::option::Option::Some(::std::string::String::from(#root))
            }
        }
    });

    let id_attribute = args.id_attribute.map(|attr| {
        quote! {
            fn id_attribute(&self) -> &str {
                #attr
            }
        }
    });

    let defaults = args.defaults.map(|json| {
        quote! {
            fn defaults(&self) -> ::recordset::Attributes {
                ::recordset::__private::serde_json::from_str(#json).unwrap_or_default()
            }
        }
    });

    let query = args.query.map(|json| {
        quote! {
            fn query_params(&self) -> ::recordset::Attributes {
                ::recordset::__private::serde_json::from_str(#json).unwrap_or_default()
            }
        }
    });

    let serialize = (!args.serialize.is_empty()).then(|| {
        let keys = &args.serialize;
        quote! {
            fn serialize_nested(&self) -> ::std::vec::Vec<::std::string::String> {
                ::std::vec![#(::std::string::String::from(#keys)),*]
            }
        }
    });

    let validate = args.validate.map(|path| {
        quote! {
            fn validate(
                &self,
                attrs: &::recordset::Attributes,
            ) -> ::std::option::Option<::recordset::ValidationError> {
                #path(self, attrs)
            }
        }
    });

    let parse = args.parse.map(|path| {
        quote! {
            fn parse(
                &self,
                response: ::recordset::__private::serde_json::Value,
            ) -> ::recordset::__private::serde_json::Value {
                #path(self, response)
            }
        }
    });

    let initialize = args.initialize.map(|path| {
        quote! {
            fn initialize(&self, record: &::recordset::Record) {
                #path(self, record)
            }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::recordset::Schema for #ident #ty_generics #where_clause {
            fn name(&self) -> &str {
                #name
            }

            #url_root
            #id_attribute
            #defaults
            #query
            #serialize
            #validate
            #parse
            #initialize
        }
    })
}

fn parse_args(input: &DeriveInput) -> syn::Result<SchemaArgs> {
    let mut args = SchemaArgs::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("schema") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                args.name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("url_root") {
                args.url_root = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("id_attribute") {
                args.id_attribute = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("defaults") {
                args.defaults = Some(json_object(meta.value()?.parse()?)?);
            } else if meta.path.is_ident("query") {
                args.query = Some(json_object(meta.value()?.parse()?)?);
            } else if meta.path.is_ident("serialize") {
                let keys: ExprArray = meta.value()?.parse()?;
                for key in keys.elems {
                    match key {
                        Expr::Lit(expr) => match expr.lit {
                            Lit::Str(lit) => args.serialize.push(lit),
                            other => {
                                return Err(syn::Error::new_spanned(other, "expected a string key"))
                            }
                        },
                        other => {
                            return Err(syn::Error::new_spanned(other, "expected a string key"))
                        }
                    }
                }
            } else if meta.path.is_ident("validate") {
                args.validate = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("parse") {
                args.parse = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("initialize") {
                args.initialize = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unknown schema attribute"));
            }
            Ok(())
        })?;
    }

    Ok(args)
}

/// Reject anything that is not a JSON object at expansion time.
fn json_object(lit: LitStr) -> syn::Result<LitStr> {
    match serde_json::from_str::<serde_json::Value>(&lit.value()) {
        Ok(serde_json::Value::Object(_)) => Ok(lit),
        Ok(_) => Err(syn::Error::new_spanned(&lit, "expected a JSON object")),
        Err(err) => Err(syn::Error::new_spanned(
            &lit,
            format!("invalid JSON: {err}"),
        )),
    }
}
