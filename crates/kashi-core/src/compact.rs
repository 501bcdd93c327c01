// crates/kashi-core/src/compact.rs
//! The compact pipe-delimited annotation wire format.
//!
//! One line encodes a sequence of words joined by `_`; each word is
//! `Surface|Reading|PitchBits[|KanjiReadings]`:
//! - `Surface` is never empty.
//! - `Reading` and `PitchBits` are both empty (a non-Japanese token, rendered
//!   as-is with no mora) or both non-empty.
//! - `PitchBits` is `0`/`1` only; its length is the authoritative mora count
//!   and is trusted over the segmentation heuristic.
//! - The optional fourth field is comma-separated per-kanji readings consumed
//!   positionally against the kanji characters of `Surface`. Extra readings
//!   are ignored; a shortfall leaves trailing kanji without a reading.

use crate::annotation::{is_cjk_ideograph, KanjiReading, WordAnnotation};
use crate::error::CompactError;
use crate::mora::mora_with_pitch;

/// Parse one compact-format line into word annotations.
pub fn parse_compact_line(line: &str) -> Result<Vec<WordAnnotation>, CompactError> {
    line.split('_')
        .enumerate()
        .map(|(i, seg)| parse_segment(i, seg))
        .collect()
}

fn parse_segment(segment: usize, raw: &str) -> Result<WordAnnotation, CompactError> {
    let fields: Vec<&str> = raw.split('|').collect();
    if fields.len() < 3 || fields.len() > 4 {
        return Err(CompactError::FieldCount {
            segment,
            got: fields.len(),
        });
    }

    let surface = fields[0];
    if surface.is_empty() {
        return Err(CompactError::EmptySurface { segment });
    }

    let reading = fields[1];
    let bits = fields[2];
    if reading.is_empty() != bits.is_empty() {
        return Err(CompactError::ReadingPitchMismatch { segment });
    }
    if !bits.chars().all(|c| c == '0' || c == '1') {
        return Err(CompactError::NonBinaryPitchBits {
            segment,
            bits: bits.to_string(),
        });
    }

    let mora = if reading.is_empty() {
        Vec::new()
    } else {
        mora_with_pitch(reading, bits)
    };

    let kanji_readings = match fields.get(3) {
        Some(kr) if !kr.is_empty() => {
            let readings = kr.split(',');
            surface
                .chars()
                .filter(|c| is_cjk_ideograph(*c))
                .zip(readings)
                .map(|(kanji, reading)| KanjiReading {
                    kanji: kanji.to_string(),
                    reading: reading.to_string(),
                })
                .collect()
        }
        _ => Vec::new(),
    };

    Ok(WordAnnotation {
        word: surface.to_string(),
        reading: reading.to_string(),
        mora,
        kanji_readings,
    })
}
