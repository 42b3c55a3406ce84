//! Derive support for `metaroute` type descriptors.
//!
//! `#[derive(Describe)]` emits a `metaroute::descriptor::Describe` impl for a
//! struct with named fields or a fieldless enum. Structs carrying a field
//! annotated with `#[meta(...)]` additionally get a `metaroute::meta::ApiRequest`
//! impl pointing at that field.
//!
//! Annotation blocks use the `key:"value"` form and are written straight into
//! the attribute:
//!
//! ```rust,ignore
//! #[derive(Describe, Deserialize)]
//! struct ListUsersReq {
//!     #[meta(path:"/users" method:"GET" summary:"List users" tags:"user")]
//!     meta: Meta,
//!     #[tag(p:"q" v:"required" dc:"search text")]
//!     query: String,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::{TokenStream as TokenStream2, TokenTree};
use quote::quote;
use syn::{
    parse_macro_input, spanned::Spanned, Attribute, Data, DeriveInput, Expr, ExprLit, Fields,
    GenericParam, Lit, LitStr, Meta,
};

#[proc_macro_derive(Describe, attributes(meta, tag))]
pub fn derive_describe(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if let Some(lt) = input.generics.lifetimes().next() {
        return Err(syn::Error::new(
            lt.span(),
            "Describe cannot be derived for types with lifetime parameters",
        ));
    }
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => expand_struct(input, named.named.iter().collect()),
            other => Err(syn::Error::new(
                other.span(),
                "Describe requires a struct with named fields",
            )),
        },
        Data::Enum(data) => expand_enum(input, data),
        Data::Union(u) => Err(syn::Error::new(
            u.union_token.span(),
            "Describe cannot be derived for unions",
        )),
    }
}

struct FieldSpec {
    ident: syn::Ident,
    ty: syn::Type,
    serde_name: String,
    tag: Option<String>,
    doc: Option<String>,
    flatten: bool,
    marker: bool,
}

fn expand_struct(input: &DeriveInput, fields: Vec<&syn::Field>) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let name_str = name.to_string();
    let rename_all = serde_value(&input.attrs, "rename_all");
    let type_doc = doc_comment(&input.attrs);

    let mut specs = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        if serde_flag(&field.attrs, "skip") || serde_flag(&field.attrs, "skip_deserializing") {
            // Invisible on the wire, unless it is the marker which is tracked separately.
            if find_attr(&field.attrs, "meta").is_none() {
                continue;
            }
        }
        let raw = ident.to_string();
        let raw = raw.strip_prefix("r#").unwrap_or(&raw).to_string();
        let serde_name = serde_value(&field.attrs, "rename").unwrap_or_else(|| match &rename_all {
            Some(rule) => rename_field(&raw, rule),
            None => raw.clone(),
        });

        let meta_attr = find_attr(&field.attrs, "meta");
        let tag_attr = find_attr(&field.attrs, "tag");
        if meta_attr.is_some() && tag_attr.is_some() {
            return Err(syn::Error::new(
                field.span(),
                "a field cannot carry both #[meta(...)] and #[tag(...)]",
            ));
        }
        let (tag, marker) = match (meta_attr, tag_attr) {
            (Some(attr), _) => (Some(annotation_text(attr)?), true),
            (None, Some(attr)) => (Some(annotation_text(attr)?), false),
            (None, None) => (None, false),
        };

        specs.push(FieldSpec {
            ident,
            ty: field.ty.clone(),
            serde_name,
            tag,
            doc: doc_comment(&field.attrs),
            flatten: serde_flag(&field.attrs, "flatten"),
            marker,
        });
    }

    let markers: Vec<&FieldSpec> = specs.iter().filter(|f| f.marker).collect();
    if markers.len() > 1 {
        return Err(syn::Error::new(
            markers[1].ident.span(),
            "only one #[meta(...)] marker field is allowed per request type",
        ));
    }

    let field_exprs = specs.iter().map(|f| {
        let ident_str = f.ident.to_string();
        let ident_str = ident_str.strip_prefix("r#").unwrap_or(&ident_str).to_string();
        let serde_name = &f.serde_name;
        let ty = &f.ty;
        let mut expr = quote! {
            ::metaroute::descriptor::FieldDef::new(
                #ident_str,
                #serde_name,
                <#ty as ::metaroute::descriptor::Describe>::descriptor,
            )
        };
        if let Some(tag) = &f.tag {
            expr = quote! { #expr.with_tag(#tag) };
        }
        if let Some(doc) = &f.doc {
            expr = quote! { #expr.with_doc(#doc) };
        }
        if f.flatten {
            expr = quote! { #expr.flattened() };
        }
        if f.marker {
            expr = quote! { #expr.marker() };
        }
        expr
    });

    let generics = add_describe_bounds(input.generics.clone());
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let doc_expr = match &type_doc {
        Some(doc) => quote! { .with_doc(#doc) },
        None => quote! {},
    };

    let api_request = markers.first().map(|m| {
        let field = &m.ident;
        quote! {
            impl #impl_generics ::metaroute::meta::ApiRequest for #name #ty_generics #where_clause {
                fn meta(&self) -> &::metaroute::meta::Meta {
                    &self.#field
                }
                fn meta_mut(&mut self) -> &mut ::metaroute::meta::Meta {
                    &mut self.#field
                }
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::metaroute::descriptor::Describe for #name #ty_generics #where_clause {
            fn descriptor() -> &'static ::metaroute::descriptor::TypeDescriptor {
                ::metaroute::descriptor::cached::<Self>(|| {
                    ::metaroute::descriptor::TypeDescriptor::structure::<Self>(
                        #name_str,
                        ::std::vec![#(#field_exprs),*],
                    )
                    #doc_expr
                })
            }
        }
        #api_request
    })
}

fn expand_enum(input: &DeriveInput, data: &syn::DataEnum) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let name_str = name.to_string();
    let rename_all = serde_value(&input.attrs, "rename_all");

    let mut values = Vec::with_capacity(data.variants.len());
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new(
                variant.span(),
                "Describe supports only enums whose variants carry no data",
            ));
        }
        if serde_flag(&variant.attrs, "skip") {
            continue;
        }
        let raw = variant.ident.to_string();
        let value = serde_value(&variant.attrs, "rename").unwrap_or_else(|| match &rename_all {
            Some(rule) => rename_variant(&raw, rule),
            None => raw.clone(),
        });
        values.push(value);
    }

    let generics = add_describe_bounds(input.generics.clone());
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let doc_expr = match doc_comment(&input.attrs) {
        Some(doc) => quote! { .with_doc(#doc) },
        None => quote! {},
    };

    Ok(quote! {
        impl #impl_generics ::metaroute::descriptor::Describe for #name #ty_generics #where_clause {
            fn descriptor() -> &'static ::metaroute::descriptor::TypeDescriptor {
                ::metaroute::descriptor::cached::<Self>(|| {
                    ::metaroute::descriptor::TypeDescriptor::enumeration::<Self>(
                        #name_str,
                        ::std::vec![#(#values),*],
                    )
                    #doc_expr
                })
            }
        }
    })
}

fn add_describe_bounds(mut generics: syn::Generics) -> syn::Generics {
    for param in &mut generics.params {
        if let GenericParam::Type(ty) = param {
            ty.bounds
                .push(syn::parse_quote!(::metaroute::descriptor::Describe));
            ty.bounds.push(syn::parse_quote!('static));
        }
    }
    generics
}

fn find_attr<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attrs.iter().find(|a| a.path().is_ident(name))
}

/// Re-serializes `#[meta(k:"v" ...)]` tokens into the `k:"v" ...` text form.
fn annotation_text(attr: &Attribute) -> syn::Result<String> {
    let list = attr.meta.require_list()?;
    let mut out = String::new();
    render_tokens(list.tokens.clone(), &mut out)?;
    Ok(out.trim_end().to_string())
}

fn render_tokens(tokens: TokenStream2, out: &mut String) -> syn::Result<()> {
    for tree in tokens {
        match tree {
            TokenTree::Literal(lit) => {
                let parsed: LitStr = syn::parse2(TokenTree::Literal(lit.clone()).into())
                    .map_err(|_| {
                        syn::Error::new(lit.span(), "annotation values must be string literals")
                    })?;
                out.push('"');
                for ch in parsed.value().chars() {
                    match ch {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        other => out.push(other),
                    }
                }
                out.push_str("\" ");
            }
            TokenTree::Ident(ident) => out.push_str(&ident.to_string()),
            TokenTree::Punct(p) => {
                if p.as_char() == ',' {
                    continue;
                }
                out.push(p.as_char());
            }
            TokenTree::Group(g) => {
                return Err(syn::Error::new(
                    g.span(),
                    "unexpected group in annotation; expected key:\"value\" pairs",
                ))
            }
        }
    }
    Ok(())
}

fn doc_comment(attrs: &[Attribute]) -> Option<String> {
    let mut lines = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        if let Meta::NameValue(nv) = &attr.meta {
            if let Expr::Lit(ExprLit {
                lit: Lit::Str(s), ..
            }) = &nv.value
            {
                let line = s.value();
                lines.push(line.strip_prefix(' ').unwrap_or(&line).to_string());
            }
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n").trim().to_string())
    }
}

fn serde_value(attrs: &[Attribute], key: &str) -> Option<String> {
    let mut found = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(key) {
                if let Ok(value) = meta.value() {
                    if let Ok(s) = value.parse::<LitStr>() {
                        found = Some(s.value());
                    }
                }
            } else if meta.input.peek(syn::Token![=]) {
                let _ = meta.value().and_then(|v| v.parse::<Expr>());
            } else if meta.input.peek(syn::token::Paren) {
                let _ = meta.parse_nested_meta(|inner| {
                    if inner.input.peek(syn::Token![=]) {
                        let _ = inner.value().and_then(|v| v.parse::<Expr>());
                    }
                    Ok(())
                });
            }
            Ok(())
        });
        if found.is_some() {
            break;
        }
    }
    found
}

fn serde_flag(attrs: &[Attribute], flag: &str) -> bool {
    let mut found = false;
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(flag) && !meta.input.peek(syn::Token![=]) {
                found = true;
            } else if meta.input.peek(syn::Token![=]) {
                let _ = meta.value().and_then(|v| v.parse::<Expr>());
            } else if meta.input.peek(syn::token::Paren) {
                let _ = meta.parse_nested_meta(|inner| {
                    if inner.input.peek(syn::Token![=]) {
                        let _ = inner.value().and_then(|v| v.parse::<Expr>());
                    }
                    Ok(())
                });
            }
            Ok(())
        });
    }
    found
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// serde's `rename_all` applied to a snake_case field name.
fn rename_field(field: &str, rule: &str) -> String {
    match rule {
        "lowercase" | "snake_case" => field.to_string(),
        "UPPERCASE" | "SCREAMING_SNAKE_CASE" => field.to_ascii_uppercase(),
        "PascalCase" => field.split('_').map(capitalize).collect(),
        "camelCase" => {
            let pascal: String = field.split('_').map(capitalize).collect();
            let mut chars = pascal.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        "kebab-case" => field.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => field.replace('_', "-").to_ascii_uppercase(),
        _ => field.to_string(),
    }
}

/// serde's `rename_all` applied to a PascalCase variant name.
fn rename_variant(variant: &str, rule: &str) -> String {
    let snake = {
        let mut s = String::with_capacity(variant.len() + 4);
        for (i, ch) in variant.char_indices() {
            if ch.is_uppercase() && i > 0 {
                s.push('_');
            }
            s.push(ch.to_ascii_lowercase());
        }
        s
    };
    match rule {
        "lowercase" => variant.to_ascii_lowercase(),
        "UPPERCASE" => variant.to_ascii_uppercase(),
        "camelCase" => {
            let mut chars = variant.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        "snake_case" => snake,
        "SCREAMING_SNAKE_CASE" => snake.to_ascii_uppercase(),
        "kebab-case" => snake.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => snake.replace('_', "-").to_ascii_uppercase(),
        _ => variant.to_string(),
    }
}
