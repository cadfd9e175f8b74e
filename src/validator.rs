//! SQL Safety Validator
//!
//! Admits or rejects a canonical SQL string before it gets anywhere near
//! translation or the backend. The verdict is final: a rejected query is
//! never executed, and an accepted query is treated as trusted downstream.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Keywords that mutate data. Any whole-word occurrence is grounds for
/// rejection, regardless of position.
const MUTATION_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "create", "alter", "truncate",
];

/// Privilege and procedural keywords.
const PROCEDURAL_KEYWORDS: &[&str] = &[
    "grant",
    "revoke",
    "exec",
    "execute",
    "declare",
    "cursor",
    "procedure",
    "function",
    "trigger",
];

/// Compound DDL forms, checked before the single keywords so the rejection
/// reason names the full phrase.
const DDL_VERBS: &[&str] = &["create", "drop", "alter"];
const DDL_OBJECTS: &[&str] = &["database", "schema", "view", "table", "index"];

lazy_static! {
    static ref LINE_COMMENT_RE: Regex = Regex::new(r"--[^\n]*").unwrap();
    static ref BLOCK_COMMENT_RE: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref RELATION_RE: Regex =
        Regex::new(r"\b(?:from|join)\s+([a-z_][a-z0-9_.]*)").unwrap();
    static ref DDL_PHRASE_RES: Vec<(String, Regex)> = DDL_VERBS
        .iter()
        .flat_map(|verb| DDL_OBJECTS.iter().map(move |object| {
            let phrase = format!("{verb} {object}");
            let re = Regex::new(&format!(r"\b{verb}\s+{object}\b")).unwrap();
            (phrase, re)
        }))
        .collect();
    static ref KEYWORD_RES: Vec<(&'static str, Regex)> = MUTATION_KEYWORDS
        .iter()
        .chain(PROCEDURAL_KEYWORDS)
        .map(|token| (*token, Regex::new(&format!(r"\b{token}\b")).unwrap()))
        .collect();
}

/// The closed set of relation names queries may reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationAllowList {
    relations: BTreeSet<String>,
}

impl RelationAllowList {
    pub fn new<I, S>(relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            relations: relations
                .into_iter()
                .map(|r| r.into().to_lowercase())
                .collect(),
        }
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.relations.contains(&relation.to_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        self.relations.iter().cloned().collect()
    }
}

/// Outcome of validation. `Accepted` carries the original canonical query,
/// not the comment-stripped analysis copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationVerdict {
    Accepted(String),
    Rejected { reason: String },
}

impl ValidationVerdict {
    fn rejected(reason: impl Into<String>) -> Self {
        ValidationVerdict::Rejected {
            reason: reason.into(),
        }
    }
}

/// Validate a canonical SQL string against the allow-list.
///
/// Checks run in order and short-circuit on the first failure. Comments are
/// stripped for analysis only; the accepted query is the input verbatim.
/// Never panics: every failure path is a `Rejected` with a reason the caller
/// can show to the user.
pub fn validate(query: &str, allowed: &RelationAllowList) -> ValidationVerdict {
    let stripped = strip_comments(query);
    let lowered = stripped.trim().to_lowercase();

    if !lowered.starts_with("select") {
        warn!("rejected non-SELECT query");
        return ValidationVerdict::rejected(
            "Only SELECT queries are allowed. The generated SQL did not start with SELECT.",
        );
    }

    let semicolons = lowered.matches(';').count();
    if semicolons > 1 || (semicolons == 1 && !lowered.trim_end().ends_with(';')) {
        warn!("rejected query containing multiple statements");
        return ValidationVerdict::rejected(
            "Multiple SQL statements are not allowed: found a ';' that does not terminate the query.",
        );
    }

    if let Some(token) = find_forbidden_keyword(&lowered) {
        warn!(token = %token, "rejected query containing forbidden keyword");
        return ValidationVerdict::rejected(format!(
            "Forbidden SQL keyword '{token}' detected. Only read-only SELECT queries are allowed."
        ));
    }

    for relation in extract_relations(&lowered) {
        if !allowed.contains(&relation) {
            warn!(relation = %relation, "rejected query referencing unknown relation");
            return ValidationVerdict::rejected(format!(
                "Relation '{}' is not queryable. Allowed relations: {}.",
                relation,
                allowed.names().join(", ")
            ));
        }
    }

    debug!("query passed validation");
    ValidationVerdict::Accepted(query.to_string())
}

/// Remove SQL comments so a payload hidden behind `--` or `/* */` cannot
/// dodge the keyword checks.
fn strip_comments(query: &str) -> String {
    let no_blocks = BLOCK_COMMENT_RE.replace_all(query, " ");
    LINE_COMMENT_RE.replace_all(&no_blocks, " ").to_string()
}

fn find_forbidden_keyword(lowered: &str) -> Option<String> {
    for (phrase, re) in DDL_PHRASE_RES.iter() {
        if re.is_match(lowered) {
            return Some(phrase.clone());
        }
    }
    for (token, re) in KEYWORD_RES.iter() {
        if re.is_match(lowered) {
            return Some((*token).to_string());
        }
    }
    None
}

/// Every relation name following a FROM or JOIN keyword.
pub fn extract_relations(lowered: &str) -> Vec<String> {
    RELATION_RE
        .captures_iter(lowered)
        .map(|cap| cap[1].to_string())
        .collect()
}
