// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! AutoLISP source generation.
//!
//! Every value that crosses into a script goes through these helpers; nothing is spliced into
//! script text unquoted.

use std::fmt::Write as _;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

mod library;

pub use library::LIBRARY;

const SIGNIFICANT_DIGITS: i32 = 15;

/// Stored in place of a null value; the library reads it back as JSON `null`.
pub const NULL_SENTINEL: &str = "*MCPNULL*";

/// Escape `text` for use inside an AutoLISP string literal.
pub fn quote_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

pub fn lisp_string(text: &str) -> String {
    format!("\"{}\"", quote_string(text))
}

pub fn lisp_bool(value: bool) -> &'static str {
    if value {
        "T"
    } else {
        "nil"
    }
}

/// `(load "...")` for `path`, made absolute with forward slashes.
pub fn load_command(path: &Path) -> Result<String, BridgeError> {
    let absolute = if path.is_absolute() { path.to_path_buf() } else { std::env::current_dir()?.join(path) };
    let normalized = absolute.display().to_string().replace('\\', "/");
    Ok(format!("(load {})", lisp_string(&normalized)))
}

/// Rendering with at most 15 significant digits, trailing zeros trimmed.
///
/// Plain decimals for ordinary magnitudes, exponent notation (`1.5e20`) below 1e-5 and from
/// 1e15 up. Matches what the script library prints for reals, so values read back compare equal.
pub fn format_real(value: f64) -> String {
    if !value.is_finite() || value == 0.0 {
        return "0".to_owned();
    }
    let magnitude = value.abs().log10().floor() as i32;
    if !(-5..SIGNIFICANT_DIGITS).contains(&magnitude) {
        let precision = (SIGNIFICANT_DIGITS - 1) as usize;
        let text = format!("{value:.precision$e}");
        let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
        return format!("{}e{exponent}", trim_fraction(mantissa));
    }
    let decimals = (SIGNIFICANT_DIGITS - 1 - magnitude).max(0) as usize;
    let text = format!("{value:.decimals$}");
    let text = trim_fraction(&text);
    if text == "-0" || text.is_empty() {
        return "0".to_owned();
    }
    text.to_owned()
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// A real literal; always carries a decimal point so the reader does not produce an integer.
pub fn lisp_real(value: f64) -> String {
    let mut text = format_real(value);
    if !text.contains('.') {
        match text.find('e') {
            Some(pos) => text.insert_str(pos, ".0"),
            None => text.push_str(".0"),
        }
    }
    text
}

/// Value half of a DXF group pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    /// Point or other numeric list.
    Point(Vec<f64>),
}

impl TypedValue {
    fn validate(&self, code: i32) -> Result<(), BridgeError> {
        match self {
            Self::Int(value) if i32::try_from(*value).is_err() => Err(BridgeError::Validation(
                format!("value for code {code} does not fit a 32-bit integer"),
            )),
            Self::Real(value) if !value.is_finite() => {
                Err(BridgeError::Validation(format!("value for code {code} is not a finite number")))
            }
            Self::Point(items) if items.is_empty() => {
                Err(BridgeError::Validation(format!("point for code {code} is empty")))
            }
            Self::Point(items) if items.iter().any(|item| !item.is_finite()) => {
                Err(BridgeError::Validation(format!("point for code {code} is not finite")))
            }
            _ => Ok(()),
        }
    }

    fn numbers(items: &[f64]) -> String {
        items.iter().map(|item| lisp_real(*item)).collect::<Vec<_>>().join(" ")
    }

    /// Expression evaluating to this value. Group values cannot be `nil` or `T`, so booleans are
    /// stored as 0/1 and null as [`NULL_SENTINEL`].
    fn expr(&self) -> String {
        match self {
            Self::Null => lisp_string(NULL_SENTINEL),
            Self::Bool(value) => u8::from(*value).to_string(),
            Self::Int(value) => value.to_string(),
            Self::Real(value) => lisp_real(*value),
            Self::Text(value) => lisp_string(value),
            Self::Point(items) => format!("(list {})", Self::numbers(items)),
        }
    }
}

/// One `(code . value)` group of an xrecord or selection filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DxfPair {
    pub code: i32,
    pub value: TypedValue,
}

impl DxfPair {
    pub fn new(code: i32, value: TypedValue) -> Self {
        Self { code, value }
    }

    /// Expression building the pair at run time, e.g. `(cons 10 (list 1.0 2.0))`.
    fn expr(&self) -> String {
        format!("(cons {} {})", self.code, self.value.expr())
    }

    /// Quoted data form of the pair, e.g. `(0 . "LINE")` or `(10 1.0 2.0 0.0)`.
    fn datum(&self) -> String {
        match &self.value {
            TypedValue::Point(items) => format!("({} {})", self.code, TypedValue::numbers(items)),
            other => format!("({} . {})", self.code, other.expr()),
        }
    }
}

fn validate_pairs(pairs: &[DxfPair]) -> Result<(), BridgeError> {
    pairs.iter().try_for_each(|pair| pair.value.validate(pair.code))
}

/// Expression building an xrecord value list; empty input yields the empty list.
pub fn values_list(pairs: &[DxfPair]) -> Result<String, BridgeError> {
    validate_pairs(pairs)?;
    if pairs.is_empty() {
        return Ok("'()".to_owned());
    }
    let parts: Vec<String> = pairs.iter().map(DxfPair::expr).collect();
    Ok(format!("(list {})", parts.join(" ")))
}

/// Quoted selection filter list, or `nil` for no restriction.
pub fn filter_list(pairs: Option<&[DxfPair]>) -> Result<String, BridgeError> {
    let Some(pairs) = pairs.filter(|pairs| !pairs.is_empty()) else {
        return Ok("nil".to_owned());
    };
    validate_pairs(pairs)?;
    let mut out = String::from("'(");
    for (idx, pair) in pairs.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        out.push_str(&pair.datum());
    }
    out.push(')');
    Ok(out)
}

/// Script that makes sure the library is defined and then evaluates `call`.
pub fn with_library(call: &str) -> String {
    let mut out = String::with_capacity(LIBRARY.len() + call.len() + 2);
    out.push_str(LIBRARY);
    let _ = write!(out, "\n{call}\n");
    out
}

pub fn setvar(name: &str, value: &str) -> String {
    format!("(setvar {} {value})\n(princ)", lisp_string(name))
}

pub fn dict_list_call() -> String {
    with_library("(mcp-dict-list)")
}

pub fn dict_keys_call(dict_name: &str) -> String {
    with_library(&format!("(mcp-dict-keys {})", lisp_string(dict_name)))
}

pub fn xrecord_get_call(dict_name: &str, key: &str) -> String {
    with_library(&format!("(mcp-xrecord-get {} {})", lisp_string(dict_name), lisp_string(key)))
}

pub fn xrecord_set_call(
    dict_name: &str,
    key: &str,
    values: &[DxfPair],
    overwrite: bool,
) -> Result<String, BridgeError> {
    Ok(with_library(&format!(
        "(mcp-xrecord-set {} {} {} {})",
        lisp_string(dict_name),
        lisp_string(key),
        values_list(values)?,
        lisp_bool(overwrite)
    )))
}

pub fn xrecord_delete_call(dict_name: &str, key: &str) -> String {
    with_library(&format!("(mcp-xrecord-delete {} {})", lisp_string(dict_name), lisp_string(key)))
}

pub fn dict_delete_call(dict_name: &str, recursive: bool) -> String {
    with_library(&format!("(mcp-dict-delete {} {})", lisp_string(dict_name), lisp_bool(recursive)))
}

pub fn selection_implied_call(
    req_id: &str,
    filter: Option<&[DxfPair]>,
    max_objects: u32,
) -> Result<String, BridgeError> {
    Ok(with_library(&format!(
        "(mcp-selection-implied-lite {} {} {max_objects})",
        lisp_string(req_id),
        filter_list(filter)?
    )))
}

pub fn selection_prompt_call(
    req_id: &str,
    prompt: &str,
    filter: Option<&[DxfPair]>,
    max_objects: u32,
) -> Result<String, BridgeError> {
    Ok(with_library(&format!(
        "(mcp-selection-prompt {} {} {} {max_objects})",
        lisp_string(req_id),
        lisp_string(prompt),
        filter_list(filter)?
    )))
}
