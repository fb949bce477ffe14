//! # srcarc derive macros
//!
//! Provides `#[derive(Representable)]`, which implements the
//! `srcarc::Representable` protocol for a struct by rendering a
//! keyword-argument constructor call over its fields:
//!
//! ```text
//! #[derive(Debug, Representable)]
//! #[representable(module = "mypkg.models")]
//! struct Point { x: f64, y: f64 }
//! // renders as:  Point(x=..., y=...)
//! ```
//!
//! Field values convert through `srcarc::to_value`, so every field must be
//! `serde::Serialize`. Fields marked `#[representable(skip)]` are left out
//! of the emitted constructor call.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, LitStr};

/// Derives the `Representable` protocol for a named-field struct.
#[proc_macro_derive(Representable, attributes(representable))]
pub fn derive_representable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = input.ident;

    // 1. Validation: only structs with named fields are supported.
    let fields = match input.data {
        Data::Struct(ref ds) => match &ds.fields {
            syn::Fields::Named(named) => named.named.clone(),
            _ => {
                return syn::Error::new(
                    ident.span(),
                    "Representable requires named fields",
                )
                .to_compile_error()
                .into()
            }
        },
        _ => {
            return syn::Error::new(ident.span(), "Representable only supports structs")
                .to_compile_error()
                .into()
        }
    };

    // 2. Struct-level attributes: the module path the class imports from,
    //    and optionally the exported class name.
    let (module, class) = match parse_struct_attrs(&input.attrs) {
        Ok((module, class)) => (module, class.unwrap_or_else(|| ident.to_string())),
        Err(e) => return e.to_compile_error().into(),
    };

    // 3. Field classification.
    let mut kept = Vec::new();
    for field in fields {
        match field_is_skipped(&field.attrs) {
            Ok(true) => {}
            Ok(false) => {
                if let Some(ident) = field.ident {
                    kept.push(ident);
                }
            }
            Err(e) => return e.to_compile_error().into(),
        }
    }

    // 4. Code generation. The import alias comes from the qualified
    //    name's last segment so nested-class names like `Outer.Inner`
    //    still yield a flat, importable identifier.
    let alias_base = class
        .rsplit('.')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(class.as_str());
    let alias = format!("_{alias_base}");
    let keyvals = kept
        .iter()
        .map(|f| format!("{f}={f}"))
        .collect::<Vec<_>>()
        .join(", ");
    let expr = format!("{alias}({keyvals})");
    let field_names: Vec<String> = kept.iter().map(|f| f.to_string()).collect();

    let expanded = quote! {
        impl ::srcarc::Representable for #ident {
            fn type_symbol(&self) -> ::srcarc::Symbol {
                ::srcarc::Symbol::new(#module, #class)
            }

            fn persistent_rep(
                &self,
            ) -> ::std::option::Option<::srcarc::Result<::srcarc::Rep>> {
                let build = || -> ::srcarc::Result<::srcarc::Rep> {
                    let mut args: ::std::vec::Vec<(
                        ::std::string::String,
                        ::srcarc::Value,
                    )> = ::std::vec::Vec::new();
                    #(
                        args.push((
                            #field_names.to_string(),
                            ::srcarc::to_value(&self.#kept)?,
                        ));
                    )*
                    ::std::result::Result::Ok(::srcarc::Rep {
                        expr: #expr.to_string(),
                        args,
                        imports: ::std::vec![::srcarc::Import::from_module(
                            #module, #class, #alias,
                        )],
                        post: ::std::vec::Vec::new(),
                    })
                };
                ::std::option::Option::Some(build())
            }
        }
    };

    TokenStream::from(expanded)
}

// --- Parsing logic (syn 2.0) ---

/// Parses `#[representable(module = "...", name = "...")]`.
fn parse_struct_attrs(attrs: &[Attribute]) -> syn::Result<(String, Option<String>)> {
    let mut module = "__main__".to_string();
    let mut name = None;

    for attr in attrs {
        if attr.path().is_ident("representable") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("module") {
                    let value = meta.value()?;
                    let s: LitStr = value.parse()?;
                    module = s.value();
                    return Ok(());
                }
                if meta.path.is_ident("name") {
                    let value = meta.value()?;
                    let s: LitStr = value.parse()?;
                    name = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("unknown representable attribute key"))
            })?;
        }
    }
    Ok((module, name))
}

/// Parses field-level `#[representable(skip)]`.
fn field_is_skipped(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut skipped = false;
    for attr in attrs {
        if attr.path().is_ident("representable") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skipped = true;
                    return Ok(());
                }
                Err(meta.error("unknown representable attribute key"))
            })?;
        }
    }
    Ok(skipped)
}
