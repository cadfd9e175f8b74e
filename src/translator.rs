//! Clause Extractor / Translator
//!
//! Compiles a validated SELECT statement into a `QueryPlan`: the structured
//! intent the executor can run against the constrained backend. The backend
//! has no arbitrary-SQL entry point, so GROUP BY / COUNT shapes are
//! recognized here and emulated downstream; SUM/AVG/MIN/MAX/HAVING are
//! flagged as unsupported rather than parsed.
//!
//! This is deliberately pattern-based, not a SQL grammar. The generation
//! prompt is designed to produce a narrow subset of SQL, and each supported
//! shape is matched with a fixed pattern. New aggregate shapes get new
//! patterns, not a parser.

use crate::error::{NlqError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Hard cap on rows a plan may request, whatever the query asked for.
pub const MAX_LIMIT: u32 = 1000;

/// Limit applied when a plain (non-aggregate) query carries no LIMIT.
pub const DEFAULT_LIMIT: u32 = 50;

lazy_static! {
    static ref COLUMNS_RE: Regex =
        Regex::new(r"(?i)^select\s+(.+?)\s+from\b").unwrap();
    static ref RELATION_RE: Regex =
        Regex::new(r"(?i)\bfrom\s+([A-Za-z_][\w.]*)").unwrap();
    static ref ALIAS_RE: Regex = Regex::new(r"(?i)\s+as\s+[A-Za-z_]\w*\s*$").unwrap();
    static ref COUNT_STAR_RE: Regex = Regex::new(r"(?i)\bcount\s*\(\s*\*\s*\)").unwrap();
    static ref COUNT_ALIAS_RE: Regex =
        Regex::new(r"(?i)\bcount\s*\(\s*\*\s*\)\s+as\s+([A-Za-z_]\w*)").unwrap();
    static ref GROUP_BY_RE: Regex = Regex::new(r"(?i)\bgroup\s+by\b").unwrap();
    static ref GROUPED_COUNT_RE: Regex = Regex::new(
        r"(?i)^select\s+(.+?)\s+from\s+([A-Za-z_][\w.]*)\s+group\s+by\s+([A-Za-z_]\w*)\s*;?\s*$"
    )
    .unwrap();
    static ref ADVANCED_AGG_RE: Regex =
        Regex::new(r"(?i)\b(?:sum|avg|min|max)\s*\(|\bhaving\b").unwrap();
    static ref WHERE_RE: Regex = Regex::new(
        r"(?i)\bwhere\s+(.+?)(?:\s+order\s+by\b|\s+group\s+by\b|\s+limit\b|\s*;|$)"
    )
    .unwrap();
    static ref CONNECTIVE_RE: Regex = Regex::new(r"(?i)\s+(?:and|or)\s+").unwrap();
    static ref ILIKE_RE: Regex =
        Regex::new(r"(?i)^([A-Za-z_][\w.]*)\s+ilike\s+'([^']*)'").unwrap();
    static ref LIKE_RE: Regex =
        Regex::new(r"(?i)^([A-Za-z_][\w.]*)\s+like\s+'([^']*)'").unwrap();
    static ref EQ_RE: Regex = Regex::new(r"^([A-Za-z_][\w.]*)\s*=\s*'([^']*)'").unwrap();
    static ref IS_TRUE_RE: Regex =
        Regex::new(r"(?i)^([A-Za-z_][\w.]*)\s*(?:=\s*true\b|is\s+true\b)").unwrap();
    static ref IS_FALSE_RE: Regex =
        Regex::new(r"(?i)^([A-Za-z_][\w.]*)\s*(?:=\s*false\b|is\s+false\b)").unwrap();
    static ref NUMERIC_CMP_RE: Regex =
        Regex::new(r"^([A-Za-z_][\w.]*)\s*(<=|>=|<|>)\s*(-?\d+(?:\.\d+)?)").unwrap();
    static ref SINGLE_EQ_FILTER_RE: Regex =
        Regex::new(r"(?i)\bwhere\s+([A-Za-z_][\w.]*)\s*=\s*'([^']*)'").unwrap();
    static ref ORDER_BY_RE: Regex =
        Regex::new(r"(?i)\border\s+by\s+([A-Za-z_][\w.]*)(?:\s+(asc|desc))?").unwrap();
    static ref LIMIT_RE: Regex = Regex::new(r"(?i)\blimit\s+(\d+)").unwrap();
}

/// Comparison operators the constrained backend can apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PredicateOp {
    Eq,
    Like,
    ILike,
    Lt,
    Gt,
    Lte,
    Gte,
    IsTrue,
    IsFalse,
}

/// One WHERE condition: column, operator, literal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: PredicateOp,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSpec {
    pub column: String,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ColumnSelection {
    All,
    Columns(Vec<String>),
}

/// How the plan must be executed. COUNT shapes are emulated by the executor;
/// `Unsupported` is a recognized capability boundary, not a parse failure,
/// and stops the pipeline before any backend call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AggregateMode {
    None,
    CountAll,
    CountGroupedBy(String),
    Unsupported(String),
}

/// The compiled intent of one validated SELECT statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    pub relation: String,
    pub columns: ColumnSelection,
    pub predicates: Vec<Predicate>,
    pub order: Option<OrderSpec>,
    pub limit: Option<u32>,
    pub aggregate: AggregateMode,
    /// Column name for synthesized COUNT output; the source alias when one
    /// was written (`COUNT(*) as teacher_count`), otherwise "count".
    pub count_column: String,
}

/// Compile a validated canonical SELECT into a `QueryPlan`.
///
/// Must only be called on queries the validator accepted. Unsupported
/// aggregate shapes come back as `AggregateMode::Unsupported`, not as
/// errors; an error here means the statement lacked even the fixed
/// `SELECT ... FROM <relation>` skeleton.
pub fn translate(query: &str) -> Result<QueryPlan> {
    let relation = RELATION_RE
        .captures(query)
        .map(|cap| cap[1].to_lowercase())
        .ok_or_else(|| {
            NlqError::Translation("Could not find a FROM clause in the query.".to_string())
        })?;

    let columns = extract_columns(query)?;
    let count_column = COUNT_ALIAS_RE
        .captures(query)
        .map(|cap| cap[1].to_string())
        .unwrap_or_else(|| "count".to_string());

    let has_count_star = COUNT_STAR_RE.is_match(query);
    let has_group_by = GROUP_BY_RE.is_match(query);
    let has_advanced_agg = ADVANCED_AGG_RE.is_match(query);
    let has_any_aggregate = has_count_star || has_group_by || has_advanced_agg;

    // Aggregate detection comes first: it changes how every other clause
    // is treated downstream.
    let aggregate = if has_group_by && has_count_star {
        match GROUPED_COUNT_RE.captures(query) {
            Some(cap) => AggregateMode::CountGroupedBy(cap[3].to_lowercase()),
            None => {
                warn!("GROUP BY present but query does not match the supported shape");
                AggregateMode::Unsupported("unrecognized GROUP BY shape".to_string())
            }
        }
    } else if has_count_star {
        AggregateMode::CountAll
    } else if has_advanced_agg {
        AggregateMode::Unsupported("requires advanced aggregate support".to_string())
    } else {
        AggregateMode::None
    };

    let predicates = match aggregate {
        AggregateMode::None => extract_predicates(query),
        // COUNT(*) supports a single pre-aggregation equality filter.
        AggregateMode::CountAll => SINGLE_EQ_FILTER_RE
            .captures(query)
            .map(|cap| {
                vec![Predicate {
                    column: cap[1].to_lowercase(),
                    op: PredicateOp::Eq,
                    value: serde_json::Value::String(cap[2].to_string()),
                }]
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let order = match aggregate {
        AggregateMode::None => extract_order(query),
        _ => None,
    };

    let limit = extract_limit(query, has_any_aggregate, &aggregate);

    let plan = QueryPlan {
        relation,
        columns,
        predicates,
        order,
        limit,
        aggregate,
        count_column,
    };
    debug!(plan = ?plan, "translated query plan");
    Ok(plan)
}

fn extract_columns(query: &str) -> Result<ColumnSelection> {
    let body = COLUMNS_RE
        .captures(query)
        .map(|cap| cap[1].trim().to_string())
        .ok_or_else(|| {
            NlqError::Translation("Could not find a column list between SELECT and FROM.".to_string())
        })?;

    if body == "*" {
        return Ok(ColumnSelection::All);
    }

    let columns = body
        .split(',')
        .map(|col| ALIAS_RE.replace(col.trim(), "").trim().to_string())
        .filter(|col| !col.is_empty())
        .collect();
    Ok(ColumnSelection::Columns(columns))
}

/// Split the WHERE clause on AND/OR into independent fragments and pattern
/// match each into a predicate. The connective is not retained: mixed
/// AND/OR flatten into one list (source-behavior parity). Fragments that
/// match no supported pattern are dropped with a warning, never a failure.
fn extract_predicates(query: &str) -> Vec<Predicate> {
    let clause = match WHERE_RE.captures(query) {
        Some(cap) => cap[1].to_string(),
        None => return Vec::new(),
    };

    let mut predicates = Vec::new();
    for fragment in CONNECTIVE_RE.split(&clause) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        match parse_fragment(fragment) {
            Some(predicate) => predicates.push(predicate),
            None => {
                warn!(fragment = %fragment, "dropping unrecognized WHERE fragment");
            }
        }
    }
    predicates
}

fn parse_fragment(fragment: &str) -> Option<Predicate> {
    // Priority order matters: ILIKE before LIKE, boolean tests before the
    // numeric comparisons, quoted equality before everything numeric.
    if let Some(cap) = ILIKE_RE.captures(fragment) {
        return Some(predicate(&cap[1], PredicateOp::ILike, cap[2].into()));
    }
    if let Some(cap) = LIKE_RE.captures(fragment) {
        return Some(predicate(&cap[1], PredicateOp::Like, cap[2].into()));
    }
    if let Some(cap) = EQ_RE.captures(fragment) {
        return Some(predicate(&cap[1], PredicateOp::Eq, cap[2].into()));
    }
    if let Some(cap) = IS_TRUE_RE.captures(fragment) {
        return Some(predicate(&cap[1], PredicateOp::IsTrue, true.into()));
    }
    if let Some(cap) = IS_FALSE_RE.captures(fragment) {
        return Some(predicate(&cap[1], PredicateOp::IsFalse, false.into()));
    }
    if let Some(cap) = NUMERIC_CMP_RE.captures(fragment) {
        let op = match &cap[2] {
            "<=" => PredicateOp::Lte,
            ">=" => PredicateOp::Gte,
            "<" => PredicateOp::Lt,
            _ => PredicateOp::Gt,
        };
        let number: f64 = cap[3].parse().ok()?;
        return Some(predicate(&cap[1], op, serde_json::json!(number)));
    }
    None
}

fn predicate(column: &str, op: PredicateOp, value: serde_json::Value) -> Predicate {
    Predicate {
        column: column.to_lowercase(),
        op,
        value,
    }
}

fn extract_order(query: &str) -> Option<OrderSpec> {
    ORDER_BY_RE.captures(query).map(|cap| OrderSpec {
        column: cap[1].to_lowercase(),
        direction: match cap.get(2).map(|m| m.as_str().to_lowercase()) {
            Some(dir) if dir == "desc" => OrderDirection::Desc,
            _ => OrderDirection::Asc,
        },
    })
}

fn extract_limit(query: &str, has_any_aggregate: bool, aggregate: &AggregateMode) -> Option<u32> {
    if let Some(cap) = LIMIT_RE.captures(query) {
        let requested: u32 = cap[1].parse().unwrap_or(MAX_LIMIT);
        if requested > MAX_LIMIT {
            warn!(requested, capped = MAX_LIMIT, "capping requested LIMIT");
        }
        return Some(requested.min(MAX_LIMIT));
    }
    // Plain reads get a default bound; aggregates must see every row.
    if matches!(aggregate, AggregateMode::None) && !has_any_aggregate {
        Some(DEFAULT_LIMIT)
    } else {
        None
    }
}
