//! Attribute macros that remove the derive boilerplate of rajada's `Metric` and
//! `Aggregate` traits.
//!
//! Both macros accept an optional path to the rajada crate, for crates that
//! re-export or rename it: `#[metric(my_facade::rajada)]`. The default is `::rajada`.
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{ItemStruct, Path, parse_macro_input};

extern crate proc_macro;

fn crate_path(attr: TokenStream) -> syn::Result<Path> {
    if attr.is_empty() {
        Ok(syn::parse_quote!(::rajada))
    } else {
        syn::parse(attr)
    }
}

/// Derives shared by metrics and aggregates. Serde is resolved through rajada's
/// re-export so the user crate does not need its own serde dependency.
fn derives(krate: &Path) -> TokenStream2 {
    let serde_path = format!("{}::__private::serde", quote!(#krate)).replace(' ', "");
    quote! {
        #[derive(
            #krate::__private::serde::Serialize,
            #krate::__private::serde::Deserialize,
            ::std::cmp::PartialOrd,
            ::std::cmp::PartialEq,
            ::std::fmt::Debug,
            ::std::clone::Clone
        )]
        #[serde(crate = #serde_path)]
    }
}

#[proc_macro_attribute]
pub fn metric(attr: TokenStream, item: TokenStream) -> TokenStream {
    let krate = match crate_path(attr) {
        Ok(path) => path,
        Err(e) => return e.to_compile_error().into(),
    };
    let ast = parse_macro_input!(item as ItemStruct);
    let ident = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let derives = derives(&krate);

    let expanded = quote! {
        #derives
        #ast

        impl #impl_generics #krate::Metric for #ident #ty_generics #where_clause {}
    };

    TokenStream::from(expanded)
}

#[proc_macro_attribute]
pub fn aggregate(attr: TokenStream, item: TokenStream) -> TokenStream {
    let krate = match crate_path(attr) {
        Ok(path) => path,
        Err(e) => return e.to_compile_error().into(),
    };
    let ast = parse_macro_input!(item as ItemStruct);
    let derives = derives(&krate);

    let expanded = quote! {
        #derives
        #ast
    };

    TokenStream::from(expanded)
}
