// FROM-clause structural parser
//
// Extracts the base table, aliases, and the ordered JOIN list from a raw
// FROM fragment via pattern matching. This is deliberately not a SQL
// grammar: only the structural metadata needed for validation and preview
// is recovered, and callers never see a parse error. A fragment the parser
// cannot make sense of yields an empty result instead.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

lazy_static! {
    static ref FROM_KEYWORD_RE: Regex = Regex::new(r"(?i)\bFROM\b").unwrap();
    static ref JOIN_HEAD_RE: Regex =
        Regex::new(r"(?i)\b(?:(INNER|LEFT|RIGHT|FULL|CROSS)\s+)?JOIN\b").unwrap();
    static ref SELECT_ALIAS_USE_RE: Regex = Regex::new(r"\b([a-zA-Z_]\w*)\.\w+").unwrap();
}

/// The kind of a JOIN, defaulting to INNER when the keyword is omitted
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Right => write!(f, "RIGHT"),
            JoinType::Full => write!(f, "FULL"),
            JoinType::Cross => write!(f, "CROSS"),
        }
    }
}

impl FromStr for JoinType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INNER" => Ok(JoinType::Inner),
            "LEFT" => Ok(JoinType::Left),
            "RIGHT" => Ok(JoinType::Right),
            "FULL" => Ok(JoinType::Full),
            "CROSS" => Ok(JoinType::Cross),
            _ => Err(()),
        }
    }
}

/// One JOIN entry, in source order. `condition` is `None` only for CROSS
/// joins (or when the author omitted a required ON, which validation
/// reports separately).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Join {
    #[serde(rename = "type")]
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub condition: Option<String>,
}

/// Structural metadata recovered from a FROM fragment
#[derive(Debug, Clone, Serialize, Default)]
pub struct ParsedFrom {
    pub base_table: Option<String>,
    pub base_alias: Option<String>,
    pub joins: Vec<Join>,
}

impl ParsedFrom {
    /// All table names in source order, base first
    pub fn all_tables(&self) -> Vec<&str> {
        let mut tables = Vec::new();
        if let Some(base) = &self.base_table {
            tables.push(base.as_str());
        }
        tables.extend(self.joins.iter().map(|j| j.table.as_str()));
        tables
    }
}

const RESERVED_AFTER_TABLE: &[&str] = &[
    "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "JOIN", "ON", "AS", "WHERE", "GROUP", "ORDER",
];

fn is_reserved(token: &str) -> bool {
    let upper = token.to_uppercase();
    RESERVED_AFTER_TABLE.iter().any(|kw| *kw == upper)
}

/// Parse one table reference segment: `table [AS] [alias] [ON condition]`.
/// Returns (table, alias, condition); `None` table when the segment does
/// not start with an identifier.
fn parse_table_segment(segment: &str) -> (Option<String>, Option<String>, Option<String>) {
    let mut rest = segment.trim();

    let table_end = rest
        .find(|c: char| c.is_whitespace())
        .unwrap_or(rest.len());
    let table = &rest[..table_end];
    if table.is_empty() || !table.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_') {
        return (None, None, None);
    }
    rest = rest[table_end..].trim_start();

    // Optional AS keyword before the alias. Token boundaries are found per
    // character; table and alias names are not restricted to ASCII.
    if let Some((head, tail)) = rest.split_once(char::is_whitespace) {
        if head.eq_ignore_ascii_case("as") {
            rest = tail.trim_start();
        }
    }

    // Optional bare alias token, unless the next token is a keyword
    let mut alias = None;
    let token_end = rest
        .find(|c: char| c.is_whitespace())
        .unwrap_or(rest.len());
    let token = &rest[..token_end];
    if !token.is_empty() && !is_reserved(token) {
        alias = Some(token.to_string());
        rest = rest[token_end..].trim_start();
    }

    // Optional ON condition, running to the end of the segment
    let mut condition = None;
    if let Some((head, tail)) = rest.split_once(char::is_whitespace) {
        if head.eq_ignore_ascii_case("on") {
            let cond = tail.trim();
            if !cond.is_empty() {
                condition = Some(cond.to_string());
            }
        }
    }

    (Some(table.to_string()), alias, condition)
}

/// Decompose a FROM fragment into base table, base alias, and the ordered
/// JOIN list. Never fails: a fragment without a recognizable FROM keyword
/// yields an empty `ParsedFrom` and downstream preview code handles it.
pub fn parse_from_clause(from_clause: &str) -> ParsedFrom {
    let from_clause = from_clause.trim();

    let Some(from_match) = FROM_KEYWORD_RE.find(from_clause) else {
        return ParsedFrom::default();
    };

    // Slice the fragment at JOIN boundaries: the text between the FROM
    // keyword and the first JOIN holds the base table, each following
    // slice holds one joined table with its ON condition
    let heads: Vec<_> = JOIN_HEAD_RE.captures_iter(from_clause).collect();

    let base_end = heads
        .first()
        .map(|cap| cap.get(0).map(|m| m.start()).unwrap_or(from_clause.len()))
        .unwrap_or(from_clause.len());
    let base_segment = &from_clause[from_match.end()..base_end];
    let (base_table, base_alias, _) = parse_table_segment(base_segment);

    let mut joins = Vec::new();
    for (i, cap) in heads.iter().enumerate() {
        let join_type = cap
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(JoinType::Inner);

        let segment_start = cap.get(0).map(|m| m.end()).unwrap_or(from_clause.len());
        let segment_end = heads
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(from_clause.len());
        let segment = &from_clause[segment_start..segment_end];

        let (table, alias, condition) = parse_table_segment(segment);
        if let Some(table) = table {
            joins.push(Join {
                join_type,
                table,
                alias,
                condition,
            });
        }
    }

    ParsedFrom {
        base_table,
        base_alias,
        joins,
    }
}

/// Map every alias defined in the FROM fragment to its table (base + joins)
pub fn all_aliases(from_clause: &str) -> HashMap<String, String> {
    let parsed = parse_from_clause(from_clause);
    let mut aliases = HashMap::new();

    if let (Some(alias), Some(table)) = (&parsed.base_alias, &parsed.base_table) {
        aliases.insert(alias.clone(), table.clone());
    }

    for join in &parsed.joins {
        if let Some(alias) = &join.alias {
            aliases.insert(alias.clone(), join.table.clone());
        }
    }

    aliases
}

/// Result of checking SELECT alias references against FROM definitions
#[derive(Debug, Clone, Serialize)]
pub struct AliasCheck {
    pub valid: bool,
    pub undefined_aliases: Vec<String>,
    pub defined_aliases: Vec<String>,
}

/// Flag `alias.column` references in SELECT whose alias is not defined in
/// FROM. Used upstream as a non-blocking warning, not a hard failure.
pub fn validate_aliases_in_select(select_clause: &str, from_clause: &str) -> AliasCheck {
    let defined = all_aliases(from_clause);

    let mut used: Vec<String> = SELECT_ALIAS_USE_RE
        .captures_iter(select_clause)
        .map(|cap| cap[1].to_string())
        .collect();
    used.sort();
    used.dedup();

    let undefined: Vec<String> = used
        .into_iter()
        .filter(|alias| !defined.contains_key(alias))
        .collect();

    let mut defined_aliases: Vec<String> = defined.into_keys().collect();
    defined_aliases.sort();

    AliasCheck {
        valid: undefined.is_empty(),
        undefined_aliases: undefined,
        defined_aliases,
    }
}
