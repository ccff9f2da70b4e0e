extern crate proc_macro;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::spanned::Spanned;
use syn::visit_mut::{self, VisitMut};
use syn::{
    parse_macro_input, parse_quote, Expr, ExprClosure, FnArg, GenericArgument, GenericParam, Ident,
    Item, ItemFn, LitStr, Macro, Path, PathArguments, ReturnType, Stmt, Type,
};

#[derive(Default)]
struct Options {
    handle: Option<Ident>,
    krate: Option<Path>,
}

impl Options {
    fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("handle") {
            self.handle = Some(meta.value()?.parse()?);
            return Ok(());
        }

        if meta.path.is_ident("crate") {
            let path: LitStr = meta.value()?.parse()?;
            self.krate = Some(path.parse()?);
            return Ok(());
        }

        Err(meta.error("unsupported sequence option, expected `handle = ident` or `crate = \"path\"`"))
    }
}

/// Rewrites the marker macros of a `#[sequence]` body into awaits on the producer handle:
///
/// - `emit!(value)` into `handle.emit(value).await`;
///
/// - `finish!()` into `handle.finish().await`;
///
/// - `delegate!(seq)` into `handle.delegate_to(seq).await`.
///
/// Closures and nested items are left alone: they are not resumed by the engine,
/// so the markers inside them hit the fallback `macro_rules!` and fail to compile.
struct MarkerRewriter<'a> {
    handle: &'a Ident,
    errors: Vec<syn::Error>,
}

impl MarkerRewriter<'_> {
    fn rewrite(&mut self, mac: &Macro) -> Option<Expr> {
        let name = mac.path.segments.last()?.ident.to_string();
        let handle = self.handle;
        let rewritten = match name.as_str() {
            "emit" => mac
                .parse_body::<Expr>()
                .map(|value| parse_quote!(#handle.emit(#value).await)),
            "delegate" => mac
                .parse_body::<Expr>()
                .map(|nested| parse_quote!(#handle.delegate_to(#nested).await)),
            "finish" if mac.tokens.is_empty() => Ok(parse_quote!(#handle.finish().await)),
            "finish" => Err(syn::Error::new(mac.tokens.span(), "`finish!` takes no arguments")),
            _ => return None,
        };

        Some(rewritten.unwrap_or_else(|err| {
            let tokens = err.to_compile_error();
            self.errors.push(err);
            Expr::Verbatim(tokens)
        }))
    }
}

impl VisitMut for MarkerRewriter<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if let Expr::Macro(expr_macro) = expr {
            if let Some(rewritten) = self.rewrite(&expr_macro.mac) {
                *expr = rewritten;
                return;
            }
        }

        visit_mut::visit_expr_mut(self, expr);
    }

    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        if let Stmt::Macro(stmt_macro) = stmt {
            if let Some(rewritten) = self.rewrite(&stmt_macro.mac) {
                *stmt = Stmt::Expr(rewritten, Some(stmt_macro.semi_token.unwrap_or_default()));
                return;
            }
        }

        visit_mut::visit_stmt_mut(self, stmt);
    }

    fn visit_expr_closure_mut(&mut self, _closure: &mut ExprClosure) {}

    fn visit_item_mut(&mut self, _item: &mut Item) {}
}

/// Splits the declared return type into the item type and the type the producer body returns.
///
/// `T` gives `(T, ())`. Any `Result<T, ..>`, aliases such as `io::Result<T>` included,
/// gives `(T, Result<(), ..>)`.
fn split_return_type(ty: &Type) -> (Type, Type) {
    if let Type::Path(type_path) = ty {
        if let Some(last) = type_path.path.segments.last() {
            if last.ident == "Result" {
                if let PathArguments::AngleBracketed(args) = &last.arguments {
                    if let Some(GenericArgument::Type(item)) = args.args.first() {
                        let item = item.clone();
                        let mut body_ty = type_path.clone();
                        if let Some(last) = body_ty.path.segments.last_mut() {
                            if let PathArguments::AngleBracketed(args) = &mut last.arguments {
                                args.args[0] = GenericArgument::Type(parse_quote!(()));
                            }
                        }

                        return (item, Type::Path(body_ty));
                    }
                }
            }
        }
    }

    (ty.clone(), parse_quote!(()))
}

fn expand(options: Options, input: ItemFn) -> syn::Result<TokenStream2> {
    let ItemFn { attrs, vis, sig, block } = input;

    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.fn_token.span(), "a #[sequence] function must be `async`"));
    }

    let declared = match &sig.output {
        ReturnType::Type(_, ty) => ty.as_ref().clone(),
        ReturnType::Default => {
            return Err(syn::Error::new(
                sig.ident.span(),
                "a #[sequence] function must declare the item type as its return type",
            ));
        }
    };
    let (item, body_ty) = split_return_type(&declared);

    let krate = options.krate.unwrap_or_else(|| parse_quote!(::seq_engine));
    let handle = options
        .handle
        .unwrap_or_else(|| Ident::new("__sequence_co", Span::mixed_site()));

    let mut outer_args = Vec::new();
    let mut arg_names = Vec::new();
    for (i, input) in sig.inputs.iter().enumerate() {
        match input {
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new(
                    receiver.span(),
                    "a #[sequence] function cannot take `self`; pass the receiver as a regular argument",
                ));
            }
            FnArg::Typed(pat_type) => {
                let name = format_ident!("__sequence_arg{}", i, span = Span::mixed_site());
                let ty = &pat_type.ty;
                outer_args.push(quote!(#name: #ty));
                arg_names.push(name);
            }
        }
    }

    let mut block = block;
    let mut rewriter = MarkerRewriter { handle: &handle, errors: Vec::new() };
    rewriter.visit_block_mut(&mut block);
    if let Some(mut combined) = rewriter.errors.pop() {
        for err in rewriter.errors {
            combined.combine(err);
        }

        return Err(combined);
    }

    let ident = &sig.ident;
    let generics = &sig.generics;
    let where_clause = &sig.generics.where_clause;
    let inputs = &sig.inputs;
    let producer = Ident::new("__sequence_producer", Span::mixed_site());

    let turbofish_args: Vec<TokenStream2> = generics
        .params
        .iter()
        .filter_map(|param| match param {
            GenericParam::Type(param) => {
                let ident = &param.ident;
                Some(quote!(#ident))
            }
            GenericParam::Const(param) => {
                let ident = &param.ident;
                Some(quote!(#ident))
            }
            GenericParam::Lifetime(_) => None,
        })
        .collect();
    let turbofish = if turbofish_args.is_empty() {
        quote!()
    } else {
        quote!(::<#(#turbofish_args),*>)
    };

    let co = Ident::new("__sequence_handle", Span::mixed_site());

    Ok(quote! {
        #(#attrs)*
        #vis fn #ident #generics (#(#outer_args),*) -> #krate::Sequence<#item> #where_clause {
            #[allow(unused_mut, unused_variables)]
            async fn #producer #generics (#handle: #krate::Co<#item>, #inputs) -> #body_ty #where_clause #block

            #krate::Sequence::new(move |#co: #krate::Co<#item>| #producer #turbofish (#co, #(#arg_names),*))
        }
    })
}

/// A macro that turns an `async fn` into a sequence constructor.
/// In general, we can say that this macro allows the user to write producers as "usual" async functions.
///
/// # What this macro does
///
/// - The declared return type becomes the item type, and the function returns `Sequence<Item>`.
///   A declared `Result<T, E>` makes `T` the item type and lets the body fail with `?`.
///
/// - Inside the body, `emit!(value)`, `finish!()` and `delegate!(seq)` suspend the producer.
///
/// - Nothing of the body runs until the first pull.
///
/// # Options
///
/// - `handle = co` names the producer handle, so the body can pass it around or call
///   [`Co`](../seq_engine/struct.Co.html) methods directly.
///
/// - `crate = "path"` names the `seq_engine` crate if it was renamed.
///
/// # Limitations
///
/// - Arguments must be `Send + 'static`, as the body may be resumed on any thread.
///
/// - `return` ends the sequence; use `return Ok(())` in a fallible body.
///
/// - Marker macros inside closures are not rewritten and fail to compile.
///
/// # Example
///
/// ```ignore
/// use seq_engine::{sequence, Sequence};
///
/// #[sequence]
/// async fn countdown(from: u32) -> u32 {
///     for i in (1..=from).rev() {
///         emit!(i);
///     }
/// }
///
/// #[sequence]
/// async fn twice(from: u32) -> u32 {
///     delegate!(countdown(from));
///     delegate!(countdown(from));
/// }
/// ```
#[proc_macro_attribute]
pub fn sequence(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut options = Options::default();
    let parser = syn::meta::parser(|meta| options.parse(meta));
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as ItemFn);

    expand(options, input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
