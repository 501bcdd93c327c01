// crates/kashi-core/src/annotation.rs
//! Structured linguistic annotation: types, permissive decoding, and the
//! format-detection entry point used on every annotated line.
//!
//! Two competing encodings arrive from the model. The JSON structured form is
//! decoded permissively — a missing or null `words` field is an empty line,
//! not a failure, and each word's missing sub-fields default to empty. The
//! compact pipe-delimited form is validated by [`crate::compact`] and kept as
//! a raw string either way so the client can recover best-effort.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compact::parse_compact_line;
use crate::sanitize::{repair_pitch_literals, strip_fences};
use crate::types::LineAnnotation;

/// One pitch-accent timing unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Mora {
    pub text: String,
    pub is_high: bool,
}

/// Reading for a single kanji character within a word.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KanjiReading {
    pub kanji: String,
    pub reading: String,
}

/// One annotated word.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WordAnnotation {
    /// Word surface; the kanji form when the model supplied a valid one.
    pub word: String,
    /// Phonetic reading in kana. Empty for non-Japanese tokens.
    pub reading: String,
    /// Pitch-marked mora. Empty for non-Japanese tokens.
    pub mora: Vec<Mora>,
    /// Per-kanji-character readings, positional against `word`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kanji_readings: Vec<KanjiReading>,
}

/// One annotated lyric line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnotatedLine {
    pub words: Vec<WordAnnotation>,
}

/// CJK ideograph check used to validate declared kanji surfaces.
pub fn is_cjk_ideograph(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2A6DF}')
}

fn contains_cjk(s: &str) -> bool {
    s.chars().any(is_cjk_ideograph)
}

fn str_field(obj: &Value, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Permissive decode of one mora object. Non-boolean pitch flags that
/// survived [`repair_pitch_literals`] still decode ("high"/"low" strings).
fn decode_mora(value: &Value) -> Mora {
    let is_high = match value.get("isHigh") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "high",
        _ => false,
    };
    Mora {
        text: str_field(value, "text"),
        is_high,
    }
}

fn decode_kanji_reading(value: &Value) -> KanjiReading {
    KanjiReading {
        kanji: str_field(value, "kanji"),
        reading: str_field(value, "reading"),
    }
}

/// Permissive decode of one word object. Missing sub-fields default to empty
/// rather than aborting the word.
fn decode_word(value: &Value) -> WordAnnotation {
    let mut word = str_field(value, "kanji");
    let reading = str_field(value, "reading");

    // A declared kanji surface with no CJK ideograph in it is a model error;
    // drop it rather than propagate bad data.
    if !word.is_empty() && !contains_cjk(word.as_str()) {
        tracing::debug!(surface = %word, "clearing non-CJK kanji surface");
        word.clear();
    }
    // Kana-only words carry no kanji field; the reading is the surface.
    if word.is_empty() {
        word = reading.clone();
    }

    let mora = value
        .get("mora")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(decode_mora).collect())
        .unwrap_or_default();

    let kanji_readings = value
        .get("kanjiReadings")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(decode_kanji_reading).collect())
        .unwrap_or_default();

    WordAnnotation {
        word,
        reading,
        mora,
        kanji_readings,
    }
}

/// Permissive decode of one line object: a missing or null `words` field
/// decodes to an empty line rather than failing.
pub fn decode_line(value: &Value) -> AnnotatedLine {
    let words = value
        .get("words")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(decode_word).collect())
        .unwrap_or_default();
    AnnotatedLine { words }
}

/// Parse one annotated line, detecting which encoding the model used.
///
/// A line containing `|` and neither `{` nor `[` is the compact format and is
/// stored raw (validation failures are logged but never drop the line). Any
/// other line is attempted as structured JSON, falling back to literal text.
pub fn parse_annotation_line(input: &str) -> LineAnnotation {
    let s = strip_fences(input);
    if s.contains('|') && !s.contains('{') && !s.contains('[') {
        if let Err(e) = parse_compact_line(s) {
            tracing::warn!(error = %e, line = %s, "compact annotation failed validation; storing raw");
        }
        return LineAnnotation::Raw(s.to_string());
    }

    let repaired = repair_pitch_literals(s);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) if value.is_object() => LineAnnotation::Structured(decode_line(&value)),
        _ => LineAnnotation::Raw(s.to_string()),
    }
}

/// Parse the whole annotation response into per-line entries.
///
/// Accepts either a JSON object of line-index → line (values may themselves
/// be structured objects or compact strings), or plain text with one compact
/// line per lyric line. A line that fails to parse is dropped — it
/// contributes no entry — rather than failing the job.
pub fn parse_annotations(raw: &str) -> BTreeMap<u32, LineAnnotation> {
    let body = strip_fences(raw);
    let repaired = repair_pitch_literals(body);

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&repaired) {
        let mut out = BTreeMap::new();
        for (key, value) in map {
            let Ok(idx) = key.parse::<u32>() else {
                tracing::warn!(key = %key, "non-numeric line index in annotation output; dropping");
                continue;
            };
            match value {
                Value::Object(_) => {
                    out.insert(idx, LineAnnotation::Structured(decode_line(&value)));
                }
                Value::String(s) => {
                    out.insert(idx, parse_annotation_line(&s));
                }
                other => {
                    tracing::warn!(line = idx, value = %other, "unusable annotation line; dropping");
                }
            }
        }
        return out;
    }

    // Plain-text compact output: one line per lyric line, in order.
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(idx, line)| (idx as u32, parse_annotation_line(line)))
        .collect()
}

/// Parse the translation response: a JSON object of line-index → string.
/// Non-string values are skipped with a warning rather than failing the job.
pub fn parse_translations(raw: &str) -> BTreeMap<u32, String> {
    let body = strip_fences(raw);
    let mut out = BTreeMap::new();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for (key, value) in map {
            let Ok(idx) = key.parse::<u32>() else {
                tracing::warn!(key = %key, "non-numeric line index in translation output; dropping");
                continue;
            };
            match value {
                Value::String(s) => {
                    out.insert(idx, s);
                }
                other => {
                    tracing::warn!(line = idx, value = %other, "non-string translation; dropping");
                }
            }
        }
    } else {
        tracing::warn!("translation output is not a JSON object; no translations recovered");
    }
    out
}
