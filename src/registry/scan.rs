use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::registry::unit::{ParamKind, ParamSpec, ToolDescriptor, RESERVED_METHODS};

/// Source-level view of one unit type found in a plugin file. The tree is
/// deliberately generic: descriptor extraction works on these tagged
/// nodes, not on the parser's own types.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDecl {
    pub type_name: String,
    /// String literal returned by the unit's `name` method, when present.
    pub declared_name: Option<String>,
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub is_async: bool,
    pub is_public: bool,
    pub doc: Option<String>,
    pub params: Vec<ParamDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

impl UnitDecl {
    /// Effective unit name: the declared literal, else the file stem the
    /// caller supplies.
    pub fn unit_name(&self, file_stem: &str) -> String {
        self.declared_name
            .clone()
            .unwrap_or_else(|| file_stem.to_string())
    }
}

pub fn scan_plugin_source(path: &Path) -> Result<Vec<UnitDecl>> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("read plugin source {}", path.display()))?;
    parse_source(&source).with_context(|| format!("scan plugin source {}", path.display()))
}

/// Builds the generic tree for every type in `source` that implements the
/// unit contract. Tool candidates come from the type's inherent impl
/// blocks; the contract impl itself only contributes the declared name.
pub fn parse_source(source: &str) -> Result<Vec<UnitDecl>> {
    let file = syn::parse_file(source).context("parse plugin source")?;
    let mut units: Vec<UnitDecl> = Vec::new();

    for item in &file.items {
        let syn::Item::Impl(item_impl) = item else {
            continue;
        };
        let Some((_, trait_path, _)) = &item_impl.trait_ else {
            continue;
        };
        if !path_ends_with(trait_path, "ToolUnit") {
            continue;
        }
        let Some(type_name) = self_type_name(&item_impl.self_ty) else {
            continue;
        };
        let declared_name = item_impl.items.iter().find_map(|it| match it {
            syn::ImplItem::Fn(f) if f.sig.ident == "name" => literal_name_return(f),
            _ => None,
        });
        units.push(UnitDecl {
            type_name,
            declared_name,
            methods: Vec::new(),
        });
    }

    for item in &file.items {
        let syn::Item::Impl(item_impl) = item else {
            continue;
        };
        if item_impl.trait_.is_some() {
            continue;
        }
        let Some(type_name) = self_type_name(&item_impl.self_ty) else {
            continue;
        };
        let Some(unit) = units.iter_mut().find(|u| u.type_name == type_name) else {
            continue;
        };
        for it in &item_impl.items {
            if let syn::ImplItem::Fn(f) = it {
                unit.methods.push(method_decl(f));
            }
        }
    }

    Ok(units)
}

/// Descriptor extraction under the same filters as the live path: public
/// async methods only, no `_`-prefixed names, no reserved contract names.
pub fn descriptors_from_unit(unit: &UnitDecl) -> Vec<ToolDescriptor> {
    unit.methods
        .iter()
        .filter(|m| m.is_async && m.is_public)
        .filter(|m| !m.name.starts_with('_'))
        .filter(|m| !RESERVED_METHODS.contains(&m.name.as_str()))
        .map(|m| ToolDescriptor {
            name: m.name.clone(),
            description: m.doc.clone().unwrap_or_else(|| m.name.clone()),
            params: m
                .params
                .iter()
                .map(|p| ParamSpec {
                    name: p.name.clone(),
                    kind: p.kind,
                    required: p.required,
                    default: None,
                })
                .collect(),
        })
        .collect()
}

fn method_decl(f: &syn::ImplItemFn) -> MethodDecl {
    MethodDecl {
        name: f.sig.ident.to_string(),
        is_async: f.sig.asyncness.is_some(),
        is_public: matches!(f.vis, syn::Visibility::Public(_)),
        doc: doc_first_line(&f.attrs),
        params: f.sig.inputs.iter().filter_map(param_decl).collect(),
    }
}

fn param_decl(arg: &syn::FnArg) -> Option<ParamDecl> {
    let syn::FnArg::Typed(pt) = arg else {
        return None;
    };
    let syn::Pat::Ident(ident) = pt.pat.as_ref() else {
        return None;
    };
    let (kind, required) = classify_type(&pt.ty);
    Some(ParamDecl {
        name: ident.ident.to_string(),
        kind,
        required,
    })
}

fn classify_type(ty: &syn::Type) -> (ParamKind, bool) {
    match ty {
        syn::Type::Reference(r) => classify_type(&r.elem),
        syn::Type::Path(tp) => {
            let Some(seg) = tp.path.segments.last() else {
                return (ParamKind::String, true);
            };
            match seg.ident.to_string().as_str() {
                "Option" => {
                    let inner = option_inner(seg)
                        .map(|t| classify_type(t).0)
                        .unwrap_or(ParamKind::String);
                    (inner, false)
                }
                "String" | "str" => (ParamKind::String, true),
                "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32"
                | "u64" | "u128" | "usize" => (ParamKind::Integer, true),
                "f32" | "f64" => (ParamKind::Number, true),
                "bool" => (ParamKind::Boolean, true),
                "Vec" => (ParamKind::Array, true),
                "Map" | "BTreeMap" | "HashMap" => (ParamKind::Object, true),
                // Anything unrecognized degrades to a generic string.
                _ => (ParamKind::String, true),
            }
        }
        _ => (ParamKind::String, true),
    }
}

fn option_inner(seg: &syn::PathSegment) -> Option<&syn::Type> {
    let syn::PathArguments::AngleBracketed(ab) = &seg.arguments else {
        return None;
    };
    ab.args.iter().find_map(|a| match a {
        syn::GenericArgument::Type(t) => Some(t),
        _ => None,
    })
}

fn path_ends_with(path: &syn::Path, suffix: &str) -> bool {
    path.segments
        .last()
        .map(|s| s.ident == suffix)
        .unwrap_or(false)
}

fn self_type_name(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Path(tp) => tp.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn literal_name_return(f: &syn::ImplItemFn) -> Option<String> {
    f.block.stmts.iter().find_map(|stmt| match stmt {
        syn::Stmt::Expr(expr, _) => literal_str(expr),
        _ => None,
    })
}

fn literal_str(expr: &syn::Expr) -> Option<String> {
    match expr {
        syn::Expr::Lit(el) => match &el.lit {
            syn::Lit::Str(s) => Some(s.value()),
            _ => None,
        },
        syn::Expr::Return(r) => r.expr.as_deref().and_then(literal_str),
        _ => None,
    }
}

fn doc_first_line(attrs: &[syn::Attribute]) -> Option<String> {
    for attr in attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        let syn::Meta::NameValue(nv) = &attr.meta else {
            continue;
        };
        let syn::Expr::Lit(el) = &nv.value else {
            continue;
        };
        let syn::Lit::Str(s) = &el.lit else {
            continue;
        };
        let line = s.value().trim().to_string();
        if !line.is_empty() {
            return Some(line);
        }
    }
    None
}
