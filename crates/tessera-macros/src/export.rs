use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Expr, FnArg, Ident, ItemFn, LitStr, Path, ReturnType, parse_macro_input};

/// Parsed `#[export(...)]` arguments.
#[derive(Default)]
struct ExportArgs {
    name: Option<LitStr>,
    priority: Option<Expr>,
    contract: Option<Path>,
    service_type: Option<LitStr>,
    value: bool,
    fallible: bool,
}

impl ExportArgs {
    fn parse_meta(&mut self, meta: syn::meta::ParseNestedMeta<'_>) -> syn::Result<()> {
        if meta.path.is_ident("name") {
            self.name = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("priority") {
            self.priority = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("contract") {
            self.contract = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("service_type") {
            self.service_type = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("value") {
            self.value = true;
        } else if meta.path.is_ident("fallible") {
            self.fallible = true;
        } else {
            return Err(meta.error(
                "unsupported export property, \
                 expected one of: name, priority, contract, service_type, value, fallible",
            ));
        }
        Ok(())
    }
}

/// Implementation of the `#[export(...)]` attribute macro.
///
/// Leaves the decorated `fn` unchanged and appends a
/// `#[::tessera_core::linkme::distributed_slice(EXPORTS)]` static that builds
/// its capability descriptor.
pub fn export(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = ExportArgs::default();
    let parser = syn::meta::parser(|meta| args.parse_meta(meta));
    parse_macro_input!(attr with parser);
    let func = parse_macro_input!(item as ItemFn);

    if let Some(err) = check_signature(&func, &args) {
        return err.into_compile_error().into();
    }

    let fn_name = &func.sig.ident;
    let fn_name_str = fn_name.to_string();
    let fn_name_upper = fn_name_str.to_uppercase();
    let static_name = Ident::new(
        &format!("_TESSERA_EXPORT_{fn_name_upper}"),
        Span::call_site(),
    );

    let name_expr = match (&args.name, &args.contract) {
        (Some(name), _) => quote!(#name),
        (None, Some(contract)) => quote!(::tessera_core::TypeInfo::name(&#contract)),
        (None, None) => quote!(#fn_name_str),
    };
    let contract_call = args
        .contract
        .as_ref()
        .map(|contract| quote!(.with_contract_type(&#contract)));
    let priority_call = args
        .priority
        .as_ref()
        .map(|priority| quote!(.with_priority(#priority)));
    let service_type_call = args
        .service_type
        .as_ref()
        .map(|ty| quote!(.with_metadata(::tessera_core::SERVICE_TYPE_KEY, #ty)));

    let (support, payload) = if args.value {
        let produce = if args.fallible {
            quote! {
                #fn_name()
                    .map(::tessera_core::Instance::new)
                    .map_err(::std::convert::Into::into)
            }
        } else {
            quote!(::std::result::Result::Ok(::tessera_core::Instance::new(#fn_name())))
        };
        (
            quote!(),
            quote!(::tessera_core::Payload::factory(|| #produce)),
        )
    } else {
        callable_parts(&func, &fn_name_upper)
    };

    quote! {
        #func

        #support

        #[::tessera_core::linkme::distributed_slice(::tessera_core::EXPORTS)]
        #[linkme(crate = ::tessera_core::linkme)]
        static #static_name: ::tessera_core::ExportFn = || {
            ::tessera_core::CapabilityDescriptor::new(#name_expr, #payload)
                #contract_call
                #priority_call
                #service_type_call
        };
    }
    .into()
}

fn check_signature(func: &ItemFn, args: &ExportArgs) -> Option<syn::Error> {
    let sig = &func.sig;
    if sig.asyncness.is_some() {
        return Some(syn::Error::new_spanned(sig.fn_token, "exported functions cannot be async"));
    }
    if !sig.generics.params.is_empty() {
        return Some(syn::Error::new_spanned(&sig.generics, "exported functions cannot be generic"));
    }
    if let Some(FnArg::Receiver(receiver)) = sig.inputs.first() {
        return Some(syn::Error::new_spanned(receiver, "exported functions cannot take self"));
    }
    if args.value && !sig.inputs.is_empty() {
        return Some(syn::Error::new_spanned(
            &sig.inputs,
            "value exports are constructors and cannot take arguments",
        ));
    }
    if args.fallible && !args.value {
        return Some(syn::Error::new(Span::call_site(), "`fallible` requires `value`"));
    }
    None
}

/// Emits the function type descriptor of a callable export and its payload.
///
/// The descriptor is a static named `<FN>_TYPE` with the function's
/// visibility, so callers can request the export by its function type.
fn callable_parts(
    func: &ItemFn,
    fn_name_upper: &str,
) -> (proc_macro2::TokenStream, proc_macro2::TokenStream) {
    let vis = &func.vis;
    let fn_name = &func.sig.ident;
    let fn_name_str = fn_name.to_string();
    let type_static = Ident::new(&format!("{fn_name_upper}_TYPE"), Span::call_site());
    let params_static = Ident::new(
        &format!("_TESSERA_PARAMS_{fn_name_upper}"),
        Span::call_site(),
    );

    let param_tys: Vec<_> = func
        .sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(pat_type) => Some(&*pat_type.ty),
            FnArg::Receiver(_) => None,
        })
        .collect();
    let arity = param_tys.len();
    let ret = match &func.sig.output {
        ReturnType::Default => quote!(()),
        ReturnType::Type(_, ty) => quote!(#ty),
    };

    let support = quote! {
        static #params_static: [::tessera_core::TypeFn; #arity] =
            [#(<#param_tys as ::tessera_core::Typed>::type_info),*];

        #vis static #type_static: ::tessera_core::TypeInfo = ::tessera_core::TypeInfo::function(
            ::std::concat!(::std::module_path!(), "::", #fn_name_str),
            ::tessera_core::Signature::new(
                &#params_static,
                <#ret as ::tessera_core::Typed>::type_info,
            ),
        );
    };
    let payload = quote! {
        ::tessera_core::Payload::Callable(::tessera_core::Callable::new(
            &#type_static,
            #fn_name as fn(#(#param_tys),*) -> #ret,
        ))
    };
    (support, payload)
}
