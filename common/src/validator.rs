// Safety validation for stored SQL fragments
//
// Pure predicates applied when a report definition is created or edited.
// Fragments are trusted once validated and stored; the scan does not run
// again on every execution.

use crate::errors::ValidationError;
use crate::from_parser;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// SQL commands that are never allowed in any fragment. EXECUTE precedes
/// EXEC so the full keyword is reported when both could match.
const DANGEROUS_COMMANDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "TRUNCATE", "EXECUTE", "EXEC", "CREATE",
    "GRANT", "REVOKE", "DENY", "BACKUP", "RESTORE", "SHUTDOWN",
];

/// Common injection markers rejected anywhere in a fragment
const SUSPICIOUS_PATTERNS: &[&str] = &["';", "--", "/*", "*/", "@@", "xp_", "sp_"];

lazy_static! {
    static ref DANGEROUS_RE: Regex =
        Regex::new(&format!(r"\b({})\b", DANGEROUS_COMMANDS.join("|"))).unwrap();
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"%(\d+)").unwrap();
    static ref JOIN_RE: Regex = Regex::new(r"(?:INNER|LEFT|RIGHT|FULL|CROSS)?\s*JOIN").unwrap();
    static ref ON_RE: Regex = Regex::new(r"\bON\b").unwrap();
    static ref TABLE_NAME_RE: Regex =
        Regex::new(r"^[a-zA-Z_]\w*(\.[a-zA-Z_]\w*)?$").unwrap();
}

/// Scan a fragment for denylisted SQL commands, matched as whole words,
/// case-insensitively. Empty input is safe.
pub fn validate_sql_safety(sql_text: &str) -> Result<(), ValidationError> {
    if sql_text.is_empty() {
        return Ok(());
    }

    let sql_upper = sql_text.to_uppercase();

    if let Some(hit) = DANGEROUS_RE.find(&sql_upper) {
        return Err(ValidationError::DangerousCommand {
            keyword: hit.as_str().to_string(),
        });
    }

    Ok(())
}

/// Reject fragments containing common injection markers: a quote followed
/// by a semicolon, comment delimiters, system-variable sigils, and system
/// or extended procedure prefixes.
pub fn check_injection_patterns(text: &str) -> Result<(), ValidationError> {
    if text.is_empty() {
        return Ok(());
    }

    let lowered = text.to_lowercase();
    for pattern in SUSPICIOUS_PATTERNS {
        if lowered.contains(pattern) {
            return Err(ValidationError::SuspiciousPattern {
                pattern: (*pattern).to_string(),
            });
        }
    }

    Ok(())
}

/// Validate the SELECT list: non-empty, safe, and free of FROM/WHERE
/// tokens, which belong in their own fields.
pub fn validate_select_clause(select_clause: &str) -> Result<(), ValidationError> {
    if select_clause.trim().is_empty() {
        return Err(ValidationError::EmptyClause {
            clause: "SELECT".to_string(),
        });
    }

    validate_sql_safety(select_clause)?;

    let select_upper = select_clause.to_uppercase();
    if select_upper.contains("FROM") || select_upper.contains("WHERE") {
        return Err(ValidationError::MisplacedKeyword);
    }

    Ok(())
}

/// Validate the FROM clause: non-empty, safe, starting with the FROM
/// keyword, and with an ON condition for every non-CROSS JOIN.
pub fn validate_from_clause(from_clause: &str) -> Result<(), ValidationError> {
    if from_clause.trim().is_empty() {
        return Err(ValidationError::EmptyClause {
            clause: "FROM".to_string(),
        });
    }

    validate_sql_safety(from_clause)?;

    let from_upper = from_clause.trim().to_uppercase();
    if !from_upper.starts_with("FROM") {
        return Err(ValidationError::MissingFromKeyword);
    }

    if from_upper.contains("JOIN") {
        let joins = JOIN_RE.find_iter(&from_upper).count();
        let ons = ON_RE.find_iter(&from_upper).count();

        // CROSS JOIN carries no ON condition
        let cross_joins = from_upper.matches("CROSS JOIN").count();
        let required_ons = joins.saturating_sub(cross_joins);

        if ons < required_ons {
            return Err(ValidationError::JoinOnMismatch { joins, ons });
        }
    }

    Ok(())
}

/// Validate the WHERE template. An empty WHERE is valid (the clause is
/// optional). Placeholder positions, when present, must start at %1;
/// gaps after the first position are advisory only and never rejected.
pub fn validate_where_clause(where_clause: &str) -> Result<(), ValidationError> {
    if where_clause.trim().is_empty() {
        return Ok(());
    }

    validate_sql_safety(where_clause)?;

    let positions = extract_parameter_positions(where_clause);
    if let Some(first) = positions.first() {
        if *first != 1 {
            return Err(ValidationError::PlaceholderNotStartingAtOne);
        }
    }

    Ok(())
}

/// Extract the unique %N placeholder positions of a WHERE template, sorted
pub fn extract_parameter_positions(where_clause: &str) -> Vec<i32> {
    let mut positions: Vec<i32> = PLACEHOLDER_RE
        .captures_iter(where_clause)
        .filter_map(|cap| cap[1].parse().ok())
        .collect();
    positions.sort_unstable();
    positions.dedup();
    positions
}

/// Validate a table reference: `schema.table` or bare `table`, identifier
/// characters only.
pub fn validate_table_name(table_name: &str) -> Result<(), ValidationError> {
    let trimmed = table_name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyClause {
            clause: "table name".to_string(),
        });
    }

    if !TABLE_NAME_RE.is_match(trimmed) {
        return Err(ValidationError::InvalidTableName(table_name.to_string()));
    }

    Ok(())
}

/// Aggregate result of validating a full definition
#[derive(Debug, Clone, Serialize, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub parameter_positions: Vec<i32>,
}

/// Validate a complete definition. All checks run; errors are collected as
/// field-tagged messages so the technician can fix every problem at once.
/// Saving is all-or-nothing: any error rejects the definition.
pub fn validate_full_query(
    select_clause: &str,
    from_clause: &str,
    where_clause: &str,
) -> ValidationReport {
    let mut report = ValidationReport {
        valid: true,
        ..Default::default()
    };

    if let Err(e) = validate_select_clause(select_clause) {
        report.valid = false;
        report.errors.push(format!("SELECT: {}", e));
    }

    if let Err(e) = validate_from_clause(from_clause) {
        report.valid = false;
        report.errors.push(format!("FROM: {}", e));
    }

    match validate_where_clause(where_clause) {
        Ok(()) => {
            report.parameter_positions = extract_parameter_positions(where_clause);
        }
        Err(e) => {
            report.valid = false;
            report.errors.push(format!("WHERE: {}", e));
        }
    }

    // Injection markers are checked over the concatenation as well, so a
    // pattern split across fields cannot slip through
    let full_query = format!("{} {} {}", select_clause, from_clause, where_clause);
    if let Err(e) = check_injection_patterns(&full_query) {
        report.valid = false;
        report.errors.push(e.to_string());
    }

    // Non-blocking advisories
    for window in report.parameter_positions.windows(2) {
        if window[1] != window[0] + 1 {
            report.warnings.push(format!(
                "Placeholder positions are not consecutive: %{} is followed by %{}",
                window[0], window[1]
            ));
        }
    }

    let alias_check = from_parser::validate_aliases_in_select(select_clause, from_clause);
    for alias in alias_check.undefined_aliases {
        report.warnings.push(format!(
            "Alias '{}' is used in SELECT but not defined in FROM",
            alias
        ));
    }

    report
}
