//! Selector expressions
//!
//! A selector is a comma-separated list of alternatives tried in order; the
//! first one producing a non-empty value wins. An alternative is a
//! `+`-separated list of parts whose values are concatenated. A part is either
//! a quoted literal (`'web-'`, `"-"`), a tag reference (`tags/Name`) or a field
//! path (`placement.availabilityZone`).
//!
//! In [`SelectorMode::TagMerge`] each comma-separated group may hold
//! `|`-separated alternatives, and every one of them that resolves is joined
//! with commas.

use crate::fields::field_value;
use crate::model::EnrichedInstance;
use thiserror::Error;

const TAG_PREFIX: &str = "tags/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("unknown field path: {0}")]
    UnknownField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    FirstMatch,
    TagMerge,
}

/// Resolves `selector` against `inst`, returning `default` when nothing matches.
pub fn resolve(
    inst: &EnrichedInstance,
    selector: &str,
    default: Option<&str>,
) -> Result<Option<String>, SelectorError> {
    apply_selector(inst, selector, default, SelectorMode::FirstMatch)
}

pub fn apply_selector(
    inst: &EnrichedInstance,
    selector: &str,
    default: Option<&str>,
    mode: SelectorMode,
) -> Result<Option<String>, SelectorError> {
    for group in selector.split(',') {
        let value = match mode {
            SelectorMode::FirstMatch => resolve_alternative(inst, group)?,
            SelectorMode::TagMerge => {
                let mut merged: Vec<String> = Vec::new();
                for alternative in group.split('|') {
                    if let Some(v) = resolve_alternative(inst, alternative)? {
                        merged.push(v);
                    }
                }
                (!merged.is_empty()).then(|| merged.join(","))
            }
        };
        if value.is_some() {
            return Ok(value);
        }
    }
    Ok(default.map(str::to_string))
}

fn resolve_alternative(inst: &EnrichedInstance, alternative: &str) -> Result<Option<String>, SelectorError> {
    let mut out = String::new();
    for part in alternative.split('+') {
        if let Some(v) = resolve_part(inst, part)? {
            out.push_str(&v);
        }
    }
    Ok((!out.is_empty()).then_some(out))
}

fn resolve_part(inst: &EnrichedInstance, part: &str) -> Result<Option<String>, SelectorError> {
    let part = part.trim();
    if part.is_empty() {
        return Ok(None);
    }
    if let Some(lit) = literal(part) {
        return Ok(Some(lit.to_string()));
    }
    let value = match part.strip_prefix(TAG_PREFIX) {
        Some(key) => inst.instance.tags.get(key).cloned(),
        None => field_value(inst, part)?,
    };
    Ok(value.filter(|v| !v.is_empty()))
}

fn literal(part: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|q| {
        (part.len() >= 2 && part.starts_with(q) && part.ends_with(q)).then(|| &part[1..part.len() - 1])
    })
}
