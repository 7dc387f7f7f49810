//! Canonical layout descriptors built from runtime metadata.
//!
//! A descriptor is a compact structural rendering of a type, stable across
//! runtime upgrades that do not change the layout (type ids and doc
//! comments are ignored). Its sha256 is the fingerprint handlers match
//! their known versions against.
//!
//! Rendering rules:
//!
//! - primitives: `u8`, `u128`, `bool`, `str`, ...
//! - `Compact<T>`, `[T;n]`, `Vec<T>`, `(A,B)`, `BitVec`
//! - composites with one unnamed field are transparent (`AccountId32` is
//!   `[u8;32]`), named composites are `{a:T,b:U}`, other unnamed ones are
//!   tuples and empty ones `()`
//! - enums are nominal: last path segment plus type parameters, e.g.
//!   `Option<[u8;20]>` or `Data`

use scale_info::form::PortableForm;
use scale_info::{Field, PortableRegistry, TypeDef, TypeDefPrimitive};

use sluice_core::models::SchemaFingerprint;

/// Descriptor of an event's or call's field list.
///
/// Unlike nested composites, a single field is never unwrapped here, so
/// `(log)` and `{log}` stay distinguishable.
pub fn fields_descriptor(types: &PortableRegistry, fields: &[Field<PortableForm>]) -> String {
    let mut visiting = Vec::new();
    render_fields(types, fields, &mut visiting)
}

/// Descriptor of a single type, e.g. a storage value.
pub fn type_descriptor(types: &PortableRegistry, type_id: u32) -> String {
    let mut visiting = Vec::new();
    render_type(types, type_id, &mut visiting)
}

/// Fingerprint of an event's or call's field list.
pub fn fields_fingerprint(
    types: &PortableRegistry,
    fields: &[Field<PortableForm>],
) -> SchemaFingerprint {
    SchemaFingerprint::of_descriptor(&fields_descriptor(types, fields))
}

fn render_fields(
    types: &PortableRegistry,
    fields: &[Field<PortableForm>],
    visiting: &mut Vec<u32>,
) -> String {
    let named = !fields.is_empty() && fields.iter().all(|f| f.name.is_some());
    let parts: Vec<String> = fields
        .iter()
        .map(|field| {
            let ty = render_type(types, field.ty.id, visiting);
            match (&field.name, named) {
                (Some(name), true) => format!("{}:{}", name, ty),
                _ => ty,
            }
        })
        .collect();

    if named {
        format!("{{{}}}", parts.join(","))
    } else {
        format!("({})", parts.join(","))
    }
}

fn render_type(types: &PortableRegistry, type_id: u32, visiting: &mut Vec<u32>) -> String {
    let Some(ty) = types.resolve(type_id) else {
        return format!("#{}", type_id);
    };

    // Recursive types (e.g. nested calls) are cut at the second visit
    if visiting.contains(&type_id) {
        return match ty.path.segments.last() {
            Some(name) => format!("#{}", name),
            None => format!("#{}", type_id),
        };
    }
    visiting.push(type_id);

    let rendered = match &ty.type_def {
        TypeDef::Primitive(primitive) => primitive_name(primitive).to_string(),
        TypeDef::Compact(compact) => {
            format!("Compact<{}>", render_type(types, compact.type_param.id, visiting))
        }
        TypeDef::Array(array) => format!(
            "[{};{}]",
            render_type(types, array.type_param.id, visiting),
            array.len
        ),
        TypeDef::Sequence(sequence) => {
            format!("Vec<{}>", render_type(types, sequence.type_param.id, visiting))
        }
        TypeDef::Tuple(tuple) => {
            let parts: Vec<String> = tuple
                .fields
                .iter()
                .map(|f| render_type(types, f.id, visiting))
                .collect();
            format!("({})", parts.join(","))
        }
        TypeDef::BitSequence(_) => "BitVec".to_string(),
        TypeDef::Composite(composite) => match composite.fields.as_slice() {
            [] => "()".to_string(),
            [single] if single.name.is_none() => render_type(types, single.ty.id, visiting),
            fields => render_fields(types, fields, visiting),
        },
        TypeDef::Variant(_) => {
            let name = ty.path.segments.last().map(String::as_str).unwrap_or("enum");
            let params: Vec<String> = ty
                .type_params
                .iter()
                .filter_map(|p| p.ty.as_ref())
                .map(|p| render_type(types, p.id, visiting))
                .collect();
            if params.is_empty() {
                name.to_string()
            } else {
                format!("{}<{}>", name, params.join(","))
            }
        }
    };

    visiting.pop();
    rendered
}

fn primitive_name(primitive: &TypeDefPrimitive) -> &'static str {
    match primitive {
        TypeDefPrimitive::Bool => "bool",
        TypeDefPrimitive::Char => "char",
        TypeDefPrimitive::Str => "str",
        TypeDefPrimitive::U8 => "u8",
        TypeDefPrimitive::U16 => "u16",
        TypeDefPrimitive::U32 => "u32",
        TypeDefPrimitive::U64 => "u64",
        TypeDefPrimitive::U128 => "u128",
        TypeDefPrimitive::U256 => "u256",
        TypeDefPrimitive::I8 => "i8",
        TypeDefPrimitive::I16 => "i16",
        TypeDefPrimitive::I32 => "i32",
        TypeDefPrimitive::I64 => "i64",
        TypeDefPrimitive::I128 => "i128",
        TypeDefPrimitive::I256 => "i256",
    }
}
