// crates/kashi-core/src/sanitize.rs
//! Normalization applied to raw generation output before anything trusts it.

/// Strip surrounding whitespace and Markdown code-fence markers.
///
/// Models wrap JSON payloads in ```json ... ``` fences often enough that this
/// runs before every structural parse.
pub fn strip_fences(input: &str) -> &str {
    let mut s = input.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the fence line including any language tag ("```json").
        s = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
        if let Some(body) = s.trim_end().strip_suffix("```") {
            s = body;
        }
    }
    s.trim()
}

/// Repair a known model error: `"isHigh": "high"` / `"isHigh": low` and
/// friends in place of a boolean. Targeted substitution so ordinary string
/// values elsewhere in the payload are untouched. Only relevant to the JSON
/// structured form; runs before JSON parsing.
pub fn repair_pitch_literals(input: &str) -> String {
    const FIELD: &str = "\"isHigh\"";
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(FIELD) {
        let after_field = pos + FIELD.len();
        out.push_str(&rest[..after_field]);
        let mut tail = &rest[after_field..];

        // Expect optional whitespace, a colon, optional whitespace.
        let ws1 = tail.len() - tail.trim_start().len();
        if !tail[ws1..].starts_with(':') {
            rest = tail;
            continue;
        }
        out.push_str(&tail[..ws1 + 1]);
        tail = &tail[ws1 + 1..];
        let ws2 = tail.len() - tail.trim_start().len();
        out.push_str(&tail[..ws2]);
        tail = &tail[ws2..];

        // Replace the malformed literal if present, quoted or bare.
        let replaced = [
            ("\"high\"", "true"),
            ("\"low\"", "false"),
            ("high", "true"),
            ("low", "false"),
        ]
        .iter()
        .find_map(|(bad, good)| tail.strip_prefix(bad).map(|after| (*good, after)));

        match replaced {
            Some((good, after)) => {
                out.push_str(good);
                rest = after;
            }
            None => rest = tail,
        }
    }
    out.push_str(rest);
    out
}
