//! SQL Normalizer
//!
//! Turns raw LLM output into one canonical SQL string: no code fences,
//! no leading labels, no line wrapping, single-spaced. The result is what
//! the validator and translator operate on.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    // Leading labels the models like to prepend ("SQL Query:", "Query:", "SQL:")
    static ref LABEL_RE: Regex = Regex::new(r"(?i)^\s*(?:sql\s*query|query|sql)\s*:\s*").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    static ref COMMA_RE: Regex = Regex::new(r"\s*,\s*").unwrap();
}

/// Normalize raw generated text into a canonical SQL string.
///
/// Never fails: unusable input normalizes to an empty string, which the
/// validator then rejects with a clear reason. Idempotent by construction:
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    // Remove markdown code fences and an optional language tag. Replacing
    // with a newline keeps the fence from gluing two lines together.
    let defenced = text
        .replace("```sql", "\n")
        .replace("```SQL", "\n")
        .replace("```", "\n");

    // Models sometimes stack labels ("SQL Query: Query: SELECT ...");
    // strip until none remain so a single pass is canonical.
    let mut unlabeled = defenced;
    while LABEL_RE.is_match(&unlabeled) {
        unlabeled = LABEL_RE.replace(&unlabeled, "").into_owned();
    }

    // Multi-line output: keep everything from the first SELECT line on.
    // If no line starts with SELECT, join everything and let validation
    // produce the rejection.
    let lines: Vec<&str> = unlabeled.lines().map(str::trim).collect();
    let start = lines
        .iter()
        .position(|line| line.to_lowercase().starts_with("select"));
    let joined = match start {
        Some(idx) => lines[idx..].join(" "),
        None => {
            if !unlabeled.trim().is_empty() {
                debug!("no SELECT line found during normalization, joining all lines");
            }
            lines.join(" ")
        }
    };

    let collapsed = WHITESPACE_RE.replace_all(&joined, " ");
    let canonical = COMMA_RE.replace_all(&collapsed, ", ");
    canonical.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_code_fence_with_language_tag() {
        let raw = "```sql\nSELECT * FROM view_tts_users\n```";
        assert_eq!(normalize(raw), "SELECT * FROM view_tts_users");
    }

    #[test]
    fn strips_leading_label() {
        assert_eq!(
            normalize("SQL Query: SELECT id FROM view_tts_fees"),
            "SELECT id FROM view_tts_fees"
        );
        assert_eq!(
            normalize("query:  SELECT id FROM view_tts_fees"),
            "SELECT id FROM view_tts_fees"
        );
    }

    #[test]
    fn strips_stacked_labels_in_one_pass() {
        assert_eq!(
            normalize("SQL Query: Query: SELECT * FROM view_tts_users"),
            "SELECT * FROM view_tts_users"
        );
    }

    #[test]
    fn joins_from_first_select_line() {
        let raw = "Here is the query you asked for:\nSELECT name,\n  role\nFROM view_tts_users\nORDER BY name";
        assert_eq!(
            normalize(raw),
            "SELECT name, role FROM view_tts_users ORDER BY name"
        );
    }

    #[test]
    fn joins_all_lines_when_no_select_found() {
        let raw = "DELETE\nFROM view_tts_users";
        assert_eq!(normalize(raw), "DELETE FROM view_tts_users");
    }

    #[test]
    fn collapses_whitespace_and_spaces_commas() {
        let raw = "SELECT  a ,b,   c   FROM view_tts_fees";
        assert_eq!(normalize(raw), "SELECT a, b, c FROM view_tts_fees");
    }

    #[test]
    fn empty_input_normalizes_to_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n  "), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            "```sql\nSELECT * FROM view_tts_users\n```",
            "SQL Query: SELECT a,b FROM view_tts_fees",
            "SQL Query: Query: SELECT a,b FROM view_tts_fees",
            "sql: sql: sql: SELECT 1 FROM view_tts_users",
            "Some explanation\nSELECT x\nFROM y\nLIMIT 5",
            "",
            "not sql at all",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }
}
