// crates/kashi-core/src/mora.rs
//! Mora segmentation for kana readings.
//!
//! A mora is the timing unit pitch accent is marked over. Most kana are one
//! mora each; a small vowel/glide kana (ゃ ゅ ょ ぁ ...) combines with the
//! character before it. The geminate marker っ/ッ is always its own mora.

use crate::annotation::Mora;

/// Small kana that attach to the preceding character when counting mora.
/// The geminate marker (っ/ッ) is deliberately excluded.
fn is_combining_kana(c: char) -> bool {
    matches!(
        c,
        'ぁ' | 'ぃ' | 'ぅ' | 'ぇ' | 'ぉ' | 'ゃ' | 'ゅ' | 'ょ' | 'ゎ'
            | 'ァ' | 'ィ' | 'ゥ' | 'ェ' | 'ォ' | 'ャ' | 'ュ' | 'ョ' | 'ヮ'
    )
}

/// Segment a reading into mora using the combining heuristic.
pub fn segment_reading(reading: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in reading.chars() {
        if is_combining_kana(c) {
            if let Some(last) = out.last_mut() {
                last.push(c);
                continue;
            }
        }
        out.push(c.to_string());
    }
    out
}

/// Build a pitch-marked mora list from a reading and an authoritative pitch
/// bit string (`'1'` = high).
///
/// The bit string length is trusted as the mora count. When the heuristic
/// segmentation disagrees with it, the reading is split character by
/// character instead, then padded (empty text) or truncated to the
/// authoritative length.
pub fn mora_with_pitch(reading: &str, bits: &str) -> Vec<Mora> {
    let want = bits.chars().count();
    let mut texts = segment_reading(reading);
    if texts.len() != want {
        texts = reading.chars().map(|c| c.to_string()).collect();
        texts.truncate(want);
        while texts.len() < want {
            texts.push(String::new());
        }
    }
    texts
        .into_iter()
        .zip(bits.chars())
        .map(|(text, bit)| Mora {
            text,
            is_high: bit == '1',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_kana_one_mora_each() {
        assert_eq!(segment_reading("とうきょう"), vec!["と", "う", "きょ", "う"]);
    }

    #[test]
    fn small_kana_combine() {
        assert_eq!(segment_reading("しゃしん"), vec!["しゃ", "し", "ん"]);
        assert_eq!(segment_reading("キャク"), vec!["キャ", "ク"]);
    }

    #[test]
    fn geminate_is_its_own_mora() {
        assert_eq!(segment_reading("きって"), vec!["き", "っ", "て"]);
        assert_eq!(segment_reading("ロック"), vec!["ロ", "ッ", "ク"]);
    }

    #[test]
    fn leading_small_kana_does_not_panic() {
        assert_eq!(segment_reading("ゃあ"), vec!["ゃ", "あ"]);
    }

    #[test]
    fn pitch_bits_agree_with_heuristic() {
        let mora = mora_with_pitch("とうきょう", "0111");
        assert_eq!(mora.len(), 4);
        assert_eq!(mora[0].text, "と");
        assert!(!mora[0].is_high);
        assert_eq!(mora[2].text, "きょ");
        assert!(mora[2].is_high);
    }

    #[test]
    fn pitch_bits_override_heuristic_count() {
        // Heuristic says 3 mora ("しゃ","し","ん"), bits insist on 4:
        // fall back to char-by-char split of the 4-char reading.
        let mora = mora_with_pitch("しゃしん", "0101");
        assert_eq!(mora.len(), 4);
        assert_eq!(mora[0].text, "し");
        assert_eq!(mora[1].text, "ゃ");
    }

    #[test]
    fn short_reading_pads_to_authoritative_length() {
        let mora = mora_with_pitch("と", "010");
        assert_eq!(mora.len(), 3);
        assert_eq!(mora[0].text, "と");
        assert_eq!(mora[1].text, "");
        assert_eq!(mora[2].text, "");
        assert!(mora[1].is_high);
    }

    #[test]
    fn long_reading_truncates_to_authoritative_length() {
        let mora = mora_with_pitch("とうきょう", "01");
        assert_eq!(mora.len(), 2);
        assert_eq!(mora[0].text, "と");
        assert_eq!(mora[1].text, "う");
    }
}
