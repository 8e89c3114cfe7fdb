use crate::utils::{apply_derives, ensure_leading_fields};
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::ext::IdentExt;
use syn::spanned::Spanned;
use syn::{
    Item, ItemStruct, LitStr, Result, Token, Type, parse::Parse, parse::ParseStream,
    parse_macro_input,
};

/// 簿记字段占用的文档键，业务字段不得使用
const RESERVED_KEYS: &[&str] = &[
    "id",
    "_id",
    "__doc__",
    "__meta__",
    "partitionKey",
    "create_datetime",
    "update_datetime",
];

const META_FIELD: &str = "meta";

/// #[document_entity] 宏实现
/// - 若缺失则追加字段 `meta: ::docrepo::entity::EntityMeta` 并置于字段最前
/// - 合并/追加派生：Default、Debug（可通过 `debug = false` 关闭）
/// - 为结构体实现 `::docrepo::entity::DocumentEntity`，字段列表在编译期确定
/// - 支持参数：`#[document_entity(partition_key = "...", debug = true|false)]`，
///   `partition_key` 默认 `"id"`
/// - 字段属性：`#[document(skip)]` 不参与导出/吸收；`#[document(rename = "...")]` 指定文档键
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as DocumentEntityAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[document_entity] only on struct")
                .to_compile_error()
                .into();
        }
    };

    match expand_struct(cfg, &mut st) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct DataField {
    ident: syn::Ident,
    ty: Type,
    key: String,
}

fn expand_struct(
    cfg: DocumentEntityAttrConfig,
    st: &mut ItemStruct,
) -> Result<proc_macro2::TokenStream> {
    let st_span = st.span();
    let fields_named = match &mut st.fields {
        syn::Fields::Named(f) => f,
        _ => return Err(syn::Error::new(st_span, "only supports named-field struct")),
    };

    let meta_ty: Type = syn::parse_quote! { ::docrepo::entity::EntityMeta };
    ensure_leading_fields(fields_named, &[(META_FIELD, &meta_ty)]);

    // 收集业务字段，并剥离 #[document(...)] 字段属性
    let mut data_fields: Vec<DataField> = Vec::new();
    for field in fields_named.named.iter_mut() {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let field_cfg = parse_field_attrs(&field.attrs)?;
        field.attrs.retain(|a| !a.path().is_ident("document"));

        if ident == META_FIELD || field_cfg.skip {
            continue;
        }

        let key = field_cfg.rename.unwrap_or_else(|| ident.unraw().to_string());
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(syn::Error::new(
                ident.span(),
                format!("document key '{key}' is reserved for entity bookkeeping"),
            ));
        }
        if data_fields.iter().any(|f| f.key == key) {
            return Err(syn::Error::new(
                ident.span(),
                format!("duplicate document key '{key}'"),
            ));
        }

        data_fields.push(DataField {
            ident,
            ty: field.ty.clone(),
            key,
        });
    }

    let partition_key = cfg
        .partition_key
        .map(|lit| lit.value())
        .unwrap_or_else(|| "id".to_string());

    let mut required: Vec<syn::Path> = vec![syn::parse_quote!(Default)];
    if cfg.derive_debug.unwrap_or(true) {
        required.insert(0, syn::parse_quote!(Debug));
    }
    apply_derives(&mut st.attrs, required);

    let ident = &st.ident;
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let keys: Vec<&str> = data_fields.iter().map(|f| f.key.as_str()).collect();
    let idents: Vec<&syn::Ident> = data_fields.iter().map(|f| &f.ident).collect();
    let tys: Vec<&Type> = data_fields.iter().map(|f| &f.ty).collect();
    let staged: Vec<syn::Ident> = data_fields
        .iter()
        .map(|f| format_ident!("__staged_{}", f.ident))
        .collect();

    Ok(quote! {
        #st

        #[allow(unused_variables)]
        impl #impl_generics ::docrepo::entity::DocumentEntity for #ident #ty_generics #where_clause {
            const PARTITION_KEY: &'static str = #partition_key;

            const FIELDS: &'static [&'static str] = &[#(#keys),*];

            fn meta(&self) -> &::docrepo::entity::EntityMeta { &self.meta }

            fn meta_mut(&mut self) -> &mut ::docrepo::entity::EntityMeta { &mut self.meta }

            fn field_value(
                &self,
                name: &str,
            ) -> ::std::option::Option<::docrepo::error::RepoResult<::docrepo::document::Value>> {
                match name {
                    #( #keys => ::std::option::Option::Some(
                        ::docrepo::document::field_to_value(&self.#idents)
                    ), )*
                    _ => ::std::option::Option::None,
                }
            }

            fn write_fields(
                &self,
                document: &mut ::docrepo::document::Document,
            ) -> ::docrepo::error::RepoResult<()> {
                #(
                    let value = ::docrepo::document::field_to_value(&self.#idents)?;
                    if !value.is_null() {
                        document.insert(::std::string::String::from(#keys), value);
                    }
                )*
                ::std::result::Result::Ok(())
            }

            fn merge_fields(
                &mut self,
                document: &::docrepo::document::Document,
            ) -> ::docrepo::error::RepoResult<()> {
                // 先全部转换，再统一赋值：任一字段失败时实体保持不变
                #(
                    let #staged: ::std::option::Option<#tys> =
                        ::docrepo::document::take_field(document, #keys)?;
                )*
                #(
                    if let ::std::option::Option::Some(value) = #staged {
                        self.#idents = value;
                    }
                )*
                ::std::result::Result::Ok(())
            }
        }
    })
}

// -------- parsing --------

#[derive(Default)]
struct FieldConfig {
    skip: bool,
    rename: Option<String>,
}

fn parse_field_attrs(attrs: &[syn::Attribute]) -> Result<FieldConfig> {
    let mut cfg = FieldConfig::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("document")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                cfg.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                if cfg.rename.is_some() {
                    return Err(meta.error("duplicate key 'rename' in attribute"));
                }
                let lit: LitStr = meta.value()?.parse()?;
                cfg.rename = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unknown key in attribute; expected 'skip' or 'rename'"))
            }
        })?;
    }
    Ok(cfg)
}

struct DocumentEntityAttrConfig {
    partition_key: Option<LitStr>,
    derive_debug: Option<bool>,
}

impl Parse for DocumentEntityAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut partition_key: Option<LitStr> = None;
        let mut derive_debug: Option<bool> = None;

        let elems: Punctuated<DocumentEntityAttrElem, Token![,]> =
            Punctuated::<DocumentEntityAttrElem, Token![,]>::parse_terminated(input)?;

        for elem in elems.into_iter() {
            match elem {
                DocumentEntityAttrElem::PartitionKey(lit) => {
                    if partition_key.is_some() {
                        return Err(syn::Error::new(
                            lit.span(),
                            "duplicate key 'partition_key' in attribute",
                        ));
                    }
                    if lit.value().is_empty() {
                        return Err(syn::Error::new(lit.span(), "partition_key must not be empty"));
                    }
                    partition_key = Some(lit);
                }
                DocumentEntityAttrElem::Debug(b) => {
                    if derive_debug.is_some() {
                        return Err(syn::Error::new(
                            proc_macro2::Span::call_site(),
                            "duplicate key 'debug' in attribute",
                        ));
                    }
                    derive_debug = Some(b);
                }
            }
        }

        Ok(Self {
            partition_key,
            derive_debug,
        })
    }
}

enum DocumentEntityAttrElem {
    PartitionKey(LitStr),
    Debug(bool),
}

impl Parse for DocumentEntityAttrElem {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: syn::Ident = input.parse()?;
        let _eq: Token![=] = input.parse()?;
        if key == "partition_key" {
            Ok(Self::PartitionKey(input.parse()?))
        } else if key == "debug" {
            let expr: syn::Expr = input.parse()?;
            match expr {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Bool(b),
                    ..
                }) => Ok(Self::Debug(b.value())),
                other => Err(syn::Error::new(
                    other.span(),
                    "expected boolean literal for 'debug'",
                )),
            }
        } else {
            Err(syn::Error::new(
                key.span(),
                "unknown key in attribute; expected 'partition_key' or 'debug'",
            ))
        }
    }
}
