//! The intrinsic function registry.
//!
//! Intrinsics are the primitive callables implemented by the virtual
//! processor. Bytecode refers to them by 1-based position in this table,
//! so the ordering is part of the binary contract between the compiler
//! and any processor version that executes its output: entries are
//! alphabetical by symbol and index 0 is reserved and unused.

use crate::error::{VellumError, VellumResult};
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

/// An entry in the intrinsic registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intrinsic {
    /// The intrinsic's symbol, including the leading `$`.
    pub name: &'static str,
    /// The fewest arguments the intrinsic accepts.
    pub min_arguments: u8,
    /// The most arguments the intrinsic accepts.
    pub max_arguments: u8,
}

const fn intrinsic(name: &'static str, min_arguments: u8, max_arguments: u8) -> Intrinsic {
    Intrinsic {
        name,
        min_arguments,
        max_arguments,
    }
}

/// The registry. Position is the 1-based index; entry 0 is the reserved
/// placeholder.
pub static REGISTRY: &[Intrinsic] = &[
    intrinsic("<reserved>", 0, 0),
    intrinsic("$addItem", 2, 2),
    intrinsic("$and", 2, 2),
    intrinsic("$association", 2, 2),
    intrinsic("$catalog", 0, 1),
    intrinsic("$complement", 1, 1),
    intrinsic("$concatenation", 2, 2),
    intrinsic("$conjugate", 1, 1),
    intrinsic("$default", 2, 2),
    intrinsic("$difference", 2, 2),
    intrinsic("$exponential", 2, 2),
    intrinsic("$factorial", 1, 1),
    intrinsic("$inverse", 1, 1),
    intrinsic("$isEqualTo", 2, 2),
    intrinsic("$isLessThan", 2, 2),
    intrinsic("$isMatchedBy", 2, 2),
    intrinsic("$isMoreThan", 2, 2),
    intrinsic("$isSameAs", 2, 2),
    intrinsic("$list", 0, 1),
    intrinsic("$magnitude", 1, 1),
    intrinsic("$or", 2, 2),
    intrinsic("$parameters", 1, 1),
    intrinsic("$product", 2, 2),
    intrinsic("$queue", 0, 1),
    intrinsic("$quotient", 2, 2),
    intrinsic("$range", 2, 3),
    intrinsic("$reciprocal", 1, 1),
    intrinsic("$remainder", 2, 2),
    intrinsic("$sans", 2, 2),
    intrinsic("$set", 0, 1),
    intrinsic("$setParameters", 2, 2),
    intrinsic("$stack", 0, 1),
    intrinsic("$sum", 2, 2),
    intrinsic("$xor", 2, 2),
];

fn lookup() -> &'static FxHashMap<&'static str, u16> {
    static LOOKUP: OnceLock<FxHashMap<&'static str, u16>> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        REGISTRY
            .iter()
            .enumerate()
            .skip(1)
            .map(|(position, entry)| (entry.name, position as u16))
            .collect()
    })
}

/// Look up the 1-based index of an intrinsic by symbol.
pub fn index(name: &str) -> Option<u16> {
    lookup().get(name).copied()
}

/// Retrieve the registry entry at a 1-based index.
pub fn get(index: u16) -> Option<&'static Intrinsic> {
    if index == 0 {
        return None;
    }
    REGISTRY.get(index as usize)
}

/// Validate an invocation's argument count against the registry.
pub fn validate_arguments(name: &str, count: u8) -> VellumResult<()> {
    let index = index(name).ok_or_else(|| {
        VellumError::invalid_reference(name, "unknown intrinsic function")
    })?;
    let entry = &REGISTRY[index as usize];
    if count < entry.min_arguments || count > entry.max_arguments {
        return Err(VellumError::argument_value(
            name,
            format!(
                "expected {}..{} arguments, got {}",
                entry.min_arguments, entry.max_arguments, count
            ),
        ));
    }
    Ok(())
}
