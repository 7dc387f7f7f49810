//! Calls dispatched by other calls.
//!
//! `Utility.batch*` and `Proxy.proxy` carry the calls they dispatch as
//! `RuntimeCall` arguments, decoded as `Pallet(call { fields })` variants.
//! An extrinsic's call tree is walked depth first, each call addressed by
//! its path from the root.

use subxt::ext::scale_value::{Composite, Primitive, Value, ValueDef};

use sluice_core::models::AccountId;
use sluice_core::ports::CallOrigin;

/// One call of an extrinsic's call tree.
#[derive(Debug)]
pub struct CallNode<'a, T> {
    pub pallet: &'a str,
    pub name: &'a str,
    pub fields: &'a Composite<T>,
    pub address: Vec<u32>,
    pub origin: Option<CallOrigin>,
}

/// Whether a call dispatches other calls.
pub fn wraps_calls(pallet: &str, name: &str) -> bool {
    matches!(
        (pallet, name),
        ("Utility", "batch" | "batch_all" | "force_batch") | ("Proxy", "proxy")
    )
}

/// All calls of the tree rooted at an extrinsic's call, root first.
pub fn flatten_calls<'a, T>(
    pallet: &'a str,
    name: &'a str,
    fields: &'a Composite<T>,
    origin: Option<CallOrigin>,
) -> Vec<CallNode<'a, T>> {
    let mut calls = Vec::new();
    visit(
        CallNode {
            pallet,
            name,
            fields,
            address: Vec::new(),
            origin,
        },
        &mut calls,
    );
    calls
}

fn visit<'a, T>(node: CallNode<'a, T>, out: &mut Vec<CallNode<'a, T>>) {
    let children = dispatched(node.pallet, node.name, node.fields, &node.origin);
    let address = node.address.clone();
    out.push(node);

    for (index, (value, origin)) in children.into_iter().enumerate() {
        let Some((pallet, name, fields)) = as_call(value) else {
            continue;
        };
        let mut child_address = address.clone();
        child_address.push(index as u32);
        visit(
            CallNode {
                pallet,
                name,
                fields,
                address: child_address,
                origin,
            },
            out,
        );
    }
}

/// Calls dispatched by `pallet.name`, each with the origin it runs under.
fn dispatched<'a, T>(
    pallet: &str,
    name: &str,
    fields: &'a Composite<T>,
    origin: &Option<CallOrigin>,
) -> Vec<(&'a Value<T>, Option<CallOrigin>)> {
    match (pallet, name) {
        ("Utility", "batch" | "batch_all" | "force_batch") => match field(fields, "calls", 0) {
            Some(Value {
                value: ValueDef::Composite(Composite::Unnamed(calls)),
                ..
            }) => calls.iter().map(|c| (c, origin.clone())).collect(),
            _ => Vec::new(),
        },
        ("Proxy", "proxy") => {
            let real = field(fields, "real", 0)
                .and_then(account_id)
                .map(CallOrigin::Signed)
                .or_else(|| origin.clone());
            field(fields, "call", 2)
                .map(|call| vec![(call, real)])
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

fn field<'a, T>(fields: &'a Composite<T>, name: &str, index: usize) -> Option<&'a Value<T>> {
    match fields {
        Composite::Named(named) => named.iter().find(|(n, _)| n == name).map(|(_, v)| v),
        Composite::Unnamed(values) => values.get(index),
    }
}

fn single<T>(composite: &Composite<T>) -> Option<&Value<T>> {
    match composite {
        Composite::Unnamed(values) if values.len() == 1 => values.first(),
        Composite::Named(fields) if fields.len() == 1 => fields.first().map(|(_, v)| v),
        _ => None,
    }
}

/// `(pallet, call, fields)` of a decoded `RuntimeCall`.
fn as_call<T>(value: &Value<T>) -> Option<(&str, &str, &Composite<T>)> {
    let ValueDef::Variant(pallet) = &value.value else {
        return None;
    };
    let ValueDef::Variant(call) = &single(&pallet.values)?.value else {
        return None;
    };
    Some((&pallet.name, &call.name, &call.values))
}

/// Account behind an `AccountId32` or a `MultiAddress::Id`.
fn account_id<T>(value: &Value<T>) -> Option<AccountId> {
    match &value.value {
        ValueDef::Variant(variant) if variant.name == "Id" => single(&variant.values).and_then(account_id),
        ValueDef::Composite(Composite::Unnamed(bytes)) if bytes.len() == 32 => {
            let mut key = [0u8; 32];
            for (byte, value) in key.iter_mut().zip(bytes) {
                let ValueDef::Primitive(Primitive::U128(n)) = &value.value else {
                    return None;
                };
                *byte = u8::try_from(*n).ok()?;
            }
            Some(AccountId(key))
        }
        ValueDef::Composite(composite) => single(composite).and_then(account_id),
        _ => None,
    }
}
