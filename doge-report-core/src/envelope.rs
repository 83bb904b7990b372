//! Wire types for the API's response envelope.
//!
//! Every reply is shaped `{success, message?, result, meta: {pages}}`. Missing
//! pieces read as their empty value instead of failing the decode, so a
//! response without `result` simply yields no items and one without
//! `meta.pages` stops pagination after the current page.
//!
//! Bodies are decoded with [`decode`], which also accepts unpaired UTF-16
//! surrogate escapes (`"\ud800"`). Each one becomes U+FFFD, which the CSV
//! exporter treats as lost text and routes through its replacement pass.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

/// One item of a collection. Field order is kept as received.
pub type Record = Map<String, Value>;

/// Records for one endpoint or dimension, in page-arrival order.
pub type Dataset = Vec<Record>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<Map<String, Value>>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub pages: Option<i64>,
}

impl PageResponse {
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("Unknown error")
    }

    /// Declared page count; absent or null reads as 0.
    pub fn total_pages(&self) -> i64 {
        self.meta.as_ref().and_then(|m| m.pages).unwrap_or(0)
    }

    /// Items stored under `key` in `result`. Absent or null reads as empty.
    pub fn items(&self, key: &str) -> Result<Dataset, serde_json::Error> {
        match self.result.as_ref().and_then(|r| r.get(key)) {
            None | Some(Value::Null) => Ok(Dataset::new()),
            Some(value) => Dataset::deserialize(value),
        }
    }
}

/// Decode a response body, repairing unpaired surrogate escapes if that is
/// the only thing stopping it from parsing.
pub fn decode(body: &[u8]) -> Result<PageResponse, serde_json::Error> {
    let strict = match serde_json::from_slice(body) {
        Ok(page) => return Ok(page),
        Err(e) => e,
    };
    let Some(repaired) = repair_lone_surrogates(body) else {
        return Err(strict);
    };
    let page = serde_json::from_slice(&repaired).map_err(|_| strict)?;
    warn!("Response contained unpaired surrogate escapes; replaced with U+FFFD");
    Ok(page)
}

const REPLACEMENT_ESCAPE: &[u8] = br"\uFFFD";

/// Rewrites `\uD800`-`\uDFFF` escapes that are not part of a valid pair.
/// `None` when there was nothing to rewrite.
fn repair_lone_surrogates(body: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len());
    let mut in_string = false;
    let mut repaired = false;
    let mut i = 0;

    while i < body.len() {
        let b = body[i];
        if !in_string {
            in_string = b == b'"';
            out.push(b);
            i += 1;
            continue;
        }
        match b {
            b'"' => {
                in_string = false;
                out.push(b);
                i += 1;
            }
            b'\\' => match unicode_escape(body, i) {
                Some(0xD800..=0xDBFF) => {
                    if matches!(unicode_escape(body, i + 6), Some(0xDC00..=0xDFFF)) {
                        out.extend_from_slice(&body[i..i + 12]);
                        i += 12;
                    } else {
                        out.extend_from_slice(REPLACEMENT_ESCAPE);
                        repaired = true;
                        i += 6;
                    }
                }
                Some(0xDC00..=0xDFFF) => {
                    out.extend_from_slice(REPLACEMENT_ESCAPE);
                    repaired = true;
                    i += 6;
                }
                Some(_) => {
                    out.extend_from_slice(&body[i..i + 6]);
                    i += 6;
                }
                None => {
                    // Two-character escape such as `\\` or `\"`.
                    out.extend_from_slice(&body[i..body.len().min(i + 2)]);
                    i += 2;
                }
            },
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }

    repaired.then_some(out)
}

/// The code unit of a `\uXXXX` escape starting at `at`.
fn unicode_escape(body: &[u8], at: usize) -> Option<u16> {
    let escape = body.get(at..at + 6)?;
    if !escape.starts_with(br"\u") || !escape[2..].iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let hex = std::str::from_utf8(&escape[2..]).ok()?;
    u16::from_str_radix(hex, 16).ok()
}
