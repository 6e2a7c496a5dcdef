use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Ident, ItemFn, LitStr};

/// Proc macro to denote an Action
///
/// Turns an `async fn` taking `&mut UserContext` and returning `ActionResult` into a
/// constructor of the same name returning a `swarmer::Action`, ready to be placed in a
/// `TaskSet`. The action is named after the function unless a name is given.
///
/// # Example
/// ```ignore
/// use swarmer::prelude::*;
///
/// #[action]
/// async fn fetch_vacancies(ctx: &mut UserContext) -> ActionResult {
///     ...
/// }
///
/// #[action("create vacancy")]
/// async fn create(ctx: &mut UserContext) -> ActionResult {
///     ...
/// }
///
/// let tasks = TaskSet::sequential("load").step(fetch_vacancies()).step(create());
/// ```
#[proc_macro_attribute]
pub fn action(attr: TokenStream, item: TokenStream) -> TokenStream {
    action_internal(attr, item).into()
}

fn action_internal(attr: TokenStream, item: TokenStream) -> TokenStream2 {
    let input = match syn::parse::<ItemFn>(item) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    let name = if attr.is_empty() {
        None
    } else {
        match syn::parse::<LitStr>(attr) {
            Ok(name) => Some(name),
            Err(err) => return err.to_compile_error(),
        }
    };

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(sig.fn_token, "#[action] functions must be async")
            .to_compile_error();
    }
    if sig.inputs.len() != 1 {
        return syn::Error::new_spanned(
            &sig.inputs,
            "#[action] functions take exactly one `&mut UserContext` argument",
        )
        .to_compile_error();
    }

    let action_name = sig.ident.clone();
    let name = name.unwrap_or_else(|| LitStr::new(&action_name.to_string(), action_name.span()));

    let body_name = Ident::new(&format!("__swarmer_{}", action_name), Span::call_site());
    let mut body_sig = sig.clone();
    body_sig.ident = body_name.clone();

    let ctx_ty = match sig.inputs.first() {
        Some(syn::FnArg::Typed(pat)) => pat.ty.clone(),
        _ => {
            return syn::Error::new_spanned(&sig.inputs, "#[action] functions cannot take self")
                .to_compile_error()
        }
    };
    let stmts = &block.stmts;

    quote! {
        #(#attrs)* #vis fn #action_name() -> ::swarmer::Action {
            #body_sig {
                #(#stmts)*
            }

            fn __call(ctx: #ctx_ty) -> ::swarmer::BoxFuture<'_, ::swarmer::ActionResult> {
                ::std::boxed::Box::pin(#body_name(ctx))
            }

            ::swarmer::Action::new(#name, __call)
        }
    }
}
