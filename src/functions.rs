//! The standard library function registry.
//!
//! Scalar functions are resolved by name from this fixed table; the
//! expression lowerer fails with `UnknownFunction` for anything not listed.
//! Lookup is case-insensitive; the registered (uppercase) name is what SQL
//! generation emits.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::model::types::ValueType;
use crate::semantic::error::SemanticErrorKind;

/// The signature of a standard library function.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    /// Canonical (SQL) name.
    pub name: &'static str,
    pub min_args: usize,
    /// `None` means variadic.
    pub max_args: Option<usize>,
    pub return_type: ValueType,
}

impl FunctionSig {
    const fn new(
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        return_type: ValueType,
    ) -> Self {
        Self {
            name,
            min_args,
            max_args,
            return_type,
        }
    }

    /// Check an argument count against this signature.
    pub fn check_arity(&self, count: usize) -> Result<(), SemanticErrorKind> {
        let ok = count >= self.min_args && self.max_args.map(|m| count <= m).unwrap_or(true);
        if ok {
            Ok(())
        } else {
            Err(SemanticErrorKind::InvalidReference {
                message: match self.max_args {
                    Some(max) if max == self.min_args => {
                        format!("{} takes {} argument(s), got {}", self.name, max, count)
                    }
                    Some(max) => format!(
                        "{} takes {}..{} arguments, got {}",
                        self.name, self.min_args, max, count
                    ),
                    None => format!(
                        "{} takes at least {} argument(s), got {}",
                        self.name, self.min_args, count
                    ),
                },
            })
        }
    }
}

static REGISTRY: Lazy<HashMap<&'static str, FunctionSig>> = Lazy::new(|| {
    let sigs = [
        FunctionSig::new("CONCAT", 1, None, ValueType::String),
        FunctionSig::new("STDDEV", 1, Some(1), ValueType::Number),
        FunctionSig::new("ROUND", 1, Some(2), ValueType::Number),
        FunctionSig::new("FLOOR", 1, Some(1), ValueType::Number),
        FunctionSig::new("UPPER", 1, Some(1), ValueType::String),
        FunctionSig::new("LOWER", 1, Some(1), ValueType::String),
        FunctionSig::new("SUBSTR", 2, Some(3), ValueType::String),
        FunctionSig::new("REGEXP_EXTRACT", 2, Some(2), ValueType::String),
        FunctionSig::new("REPLACE", 3, Some(3), ValueType::String),
        FunctionSig::new("LENGTH", 1, Some(1), ValueType::Number),
    ];
    sigs.into_iter().map(|s| (s.name, s)).collect()
});

/// Look up a function by name, case-insensitively.
pub fn lookup(name: &str) -> Option<&'static FunctionSig> {
    let upper = name.to_uppercase();
    REGISTRY.get(upper.as_str())
}
