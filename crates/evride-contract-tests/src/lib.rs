#![warn(missing_docs)]
//! # evride-contract-tests
//!
//! Frozen JSON schemas for the rental snapshot and the pickup, return and
//! payment request bodies live in the workspace `contracts/` directory. This
//! crate loads them; its tests check fixtures and encoder output against them.

use std::path::PathBuf;

use jsonschema::JSONSchema;
use serde_json::Value;

/// Absolute path of `relative` inside the workspace `contracts/` directory.
pub fn contract_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../contracts")
        .join(relative)
}

/// Reads and parses a JSON document from `contracts/`.
///
/// # Errors
/// Returns a message naming the file when it cannot be read or parsed.
pub fn load_contract(relative: &str) -> Result<Value, String> {
    let path = contract_path(relative);
    let raw = std::fs::read_to_string(&path)
        .map_err(|error| format!("{}: {error}", path.display()))?;
    serde_json::from_str(&raw).map_err(|error| format!("{}: {error}", path.display()))
}

/// Compiles the schema stored at `relative` inside `contracts/`.
///
/// # Errors
/// Returns a message when the file is unreadable or the schema is invalid.
pub fn compile_schema(relative: &str) -> Result<JSONSchema, String> {
    let schema = load_contract(relative)?;
    JSONSchema::compile(&schema).map_err(|error| format!("{relative}: {error}"))
}
