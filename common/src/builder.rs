// Query assembly engine
//
// Combines the stored SELECT/FROM fragments with a WHERE clause built from
// the parameter values the caller actually supplied. Conjuncts whose
// parameters were not all provided are dropped entirely, which is what
// makes optional filters work: an unfilled form field silently removes its
// predicate instead of erroring.

use crate::errors::ValidationError;
use crate::formatter;
use crate::models::{QueryParameter, ReportQuery};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    static ref GROUP_BY_RE: Regex = Regex::new(r"(?i)\bGROUP BY\b").unwrap();
    static ref ORDER_BY_RE: Regex = Regex::new(r"(?i)\bORDER BY\b").unwrap();
    static ref AND_SPLIT_RE: Regex = Regex::new(r"(?i)\s+AND\s+").unwrap();
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"%(\d+)").unwrap();
}

/// The three segments of a stored WHERE template
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct SeparatedClauses {
    pub where_part: String,
    pub group_by: String,
    pub order_by: String,
}

/// Split a stored WHERE template into predicate, GROUP BY, and ORDER BY
/// segments. Internal whitespace and newlines are normalized to single
/// spaces first so markers are found even when the author spread the
/// template over several lines.
pub fn separate_clauses(where_clause: &str) -> SeparatedClauses {
    let text = WHITESPACE_RE
        .replace_all(where_clause.trim(), " ")
        .into_owned();
    if text.is_empty() {
        return SeparatedClauses::default();
    }

    let group_by_at = GROUP_BY_RE.find(&text).map(|m| m.start());
    let order_by_at = ORDER_BY_RE.find(&text).map(|m| m.start());

    match (group_by_at, order_by_at) {
        (Some(g), Some(o)) if o > g => SeparatedClauses {
            where_part: text[..g].trim().to_string(),
            group_by: text[g..o].trim().to_string(),
            order_by: text[o..].trim().to_string(),
        },
        (Some(g), _) => SeparatedClauses {
            where_part: text[..g].trim().to_string(),
            group_by: text[g..].trim().to_string(),
            order_by: String::new(),
        },
        (None, Some(o)) => SeparatedClauses {
            where_part: text[..o].trim().to_string(),
            group_by: String::new(),
            order_by: text[o..].trim().to_string(),
        },
        (None, None) => SeparatedClauses {
            where_part: text,
            group_by: String::new(),
            order_by: String::new(),
        },
    }
}

/// Split a WHERE template into its AND-separated conjuncts. Deliberately
/// blind to OR and parentheses: only flat AND-conjunctions of independent
/// predicates are supported.
pub fn split_conjuncts(where_template: &str) -> Vec<String> {
    AND_SPLIT_RE
        .split(where_template)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract the %N placeholder positions referenced by one conjunct, in
/// order of appearance
pub fn extract_param_positions(conjunct: &str) -> Vec<i32> {
    PLACEHOLDER_RE
        .captures_iter(conjunct)
        .filter_map(|cap| cap[1].parse().ok())
        .collect()
}

fn strip_where_prefix(template: &str) -> &str {
    let trimmed = template.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) if head.eq_ignore_ascii_case("where") => rest.trim_start(),
        None if trimmed.eq_ignore_ascii_case("where") => "",
        _ => trimmed,
    }
}

/// Build the WHERE conditions from the template and the supplied values.
///
/// A conjunct is kept only when every position it references is present
/// with a non-empty value; kept conjuncts have their placeholders replaced
/// with type-formatted literals and are re-joined with ` AND `. Returns an
/// empty string when nothing survives.
fn build_where_conditions(
    parameters: &[QueryParameter],
    values: &HashMap<i32, String>,
    where_template: &str,
) -> Result<String, ValidationError> {
    if where_template.is_empty() {
        return Ok(String::new());
    }

    let by_position: HashMap<i32, &QueryParameter> = parameters
        .iter()
        .map(|p| (p.where_position, p))
        .collect();

    let mut active = Vec::new();

    for conjunct in split_conjuncts(strip_where_prefix(where_template)) {
        let positions = extract_param_positions(&conjunct);

        let all_supplied = positions.iter().all(|pos| {
            values
                .get(pos)
                .is_some_and(|value| !value.is_empty())
        });
        if !all_supplied {
            continue;
        }

        // Format each referenced value up front; a None literal aborts
        // this conjunct only (cannot normally happen after the check above)
        let mut literals: HashMap<i32, String> = HashMap::new();
        let mut complete = true;
        for pos in &positions {
            let Some(param) = by_position.get(pos) else {
                complete = false;
                break;
            };
            let raw = values.get(pos).map(String::as_str).unwrap_or("");
            match formatter::format_value(param.data_type, raw)? {
                Some(literal) => {
                    literals.insert(*pos, literal);
                }
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }

        let replaced = PLACEHOLDER_RE.replace_all(&conjunct, |cap: &regex::Captures| {
            let pos: i32 = cap[1].parse().unwrap_or(0);
            literals
                .get(&pos)
                .cloned()
                .unwrap_or_else(|| cap[0].to_string())
        });

        active.push(replaced.into_owned());
    }

    Ok(active.join(" AND "))
}

/// Assemble the final executable SQL from a stored definition and the
/// caller-supplied parameter values.
///
/// WHERE is included only when the caller supplied at least one value and
/// at least one conjunct survived filtering; GROUP BY and ORDER BY
/// segments of the template are carried over untouched, each on its own
/// line.
pub fn build_query(
    query: &ReportQuery,
    parameters: &[QueryParameter],
    values: &HashMap<i32, String>,
) -> Result<String, ValidationError> {
    let select_clause = query.select_clause.trim();
    let from_clause = query.from_clause.trim();

    let separated = separate_clauses(&query.where_clause);

    let mut sql_parts = vec![format!("SELECT {}", select_clause), from_clause.to_string()];

    // WHERE applies only when the caller supplied at least one value.
    // Parameter-less conjuncts are therefore never emitted on their own,
    // matching the behavior end users already rely on.
    if !separated.where_part.is_empty() && !values.is_empty() {
        let conditions = build_where_conditions(parameters, values, &separated.where_part)?;
        if !conditions.is_empty() {
            sql_parts.push(format!("WHERE {}", conditions));
        }
    }

    if !separated.group_by.is_empty() {
        sql_parts.push(separated.group_by);
    }

    if !separated.order_by.is_empty() {
        sql_parts.push(separated.order_by);
    }

    Ok(sql_parts.join("\n"))
}

/// Parameters the end user must fill, ordered by display order
pub fn required_parameters(parameters: &[QueryParameter]) -> Vec<&QueryParameter> {
    let mut required: Vec<&QueryParameter> = parameters.iter().filter(|p| p.required).collect();
    required.sort_by_key(|p| p.orden);
    required
}

/// Parameters shown on the generated form, ordered by display order
pub fn visible_parameters(parameters: &[QueryParameter]) -> Vec<&QueryParameter> {
    let mut visible: Vec<&QueryParameter> = parameters.iter().filter(|p| p.visible).collect();
    visible.sort_by_key(|p| p.orden);
    visible
}

/// Result of checking supplied values against required parameters
#[derive(Debug, Clone, Serialize)]
pub struct ParameterCheck {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Check that every required parameter is present and non-empty. Each
/// failure produces one message naming the parameter's user-facing label.
pub fn validate_parameters(
    parameters: &[QueryParameter],
    values: &HashMap<i32, String>,
) -> ParameterCheck {
    let mut check = ParameterCheck {
        valid: true,
        errors: Vec::new(),
    };

    for param in required_parameters(parameters) {
        match values.get(&param.where_position) {
            None => {
                check.valid = false;
                check
                    .errors
                    .push(ValidationError::MissingParameter(param.label.clone()).to_string());
            }
            Some(value) if value.is_empty() => {
                check.valid = false;
                check
                    .errors
                    .push(ValidationError::EmptyParameter(param.label.clone()).to_string());
            }
            Some(_) => {}
        }
    }

    check
}

/// Synthesize per-parameter test values: the declared default when present,
/// otherwise a representative value for the declared type
pub fn generate_test_values(parameters: &[QueryParameter]) -> HashMap<i32, String> {
    parameters
        .iter()
        .map(|param| {
            let value = param
                .default_value
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| formatter::test_value(param.data_type).to_string());
            (param.where_position, value)
        })
        .collect()
}

/// Build a test-mode query, synthesizing values when none were given
pub fn build_test_query(
    query: &ReportQuery,
    parameters: &[QueryParameter],
    test_values: Option<HashMap<i32, String>>,
) -> Result<String, ValidationError> {
    let values = test_values.unwrap_or_else(|| generate_test_values(parameters));
    build_query(query, parameters, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParameterType;
    use uuid::Uuid;

    fn query(select: &str, from: &str, where_clause: &str) -> ReportQuery {
        ReportQuery::new(
            "test".to_string(),
            None,
            select.to_string(),
            from.to_string(),
            where_clause.to_string(),
            None,
        )
    }

    fn param(position: i32, data_type: ParameterType, label: &str) -> QueryParameter {
        QueryParameter {
            id: Uuid::new_v4(),
            query_id: Uuid::new_v4(),
            internal_name: label.to_lowercase().replace(' ', "_"),
            label: label.to_string(),
            data_type,
            orden: position,
            visible: true,
            required: false,
            default_value: None,
            placeholder: None,
            where_position: position,
        }
    }

    fn values(pairs: &[(i32, &str)]) -> HashMap<i32, String> {
        pairs
            .iter()
            .map(|(pos, value)| (*pos, (*value).to_string()))
            .collect()
    }

    #[test]
    fn test_separate_clauses_all_three_segments() {
        let separated = separate_clauses(
            "WHERE a.Estado = %1\nGROUP BY a.Estado\nORDER BY a.Nombre DESC",
        );
        assert_eq!(separated.where_part, "WHERE a.Estado = %1");
        assert_eq!(separated.group_by, "GROUP BY a.Estado");
        assert_eq!(separated.order_by, "ORDER BY a.Nombre DESC");
    }

    #[test]
    fn test_separate_clauses_order_by_only() {
        let separated = separate_clauses("WHERE a.Estado = %1 ORDER BY a.Nombre");
        assert_eq!(separated.where_part, "WHERE a.Estado = %1");
        assert_eq!(separated.group_by, "");
        assert_eq!(separated.order_by, "ORDER BY a.Nombre");
    }

    #[test]
    fn test_separate_clauses_no_markers() {
        let separated = separate_clauses("WHERE a.Estado = %1");
        assert_eq!(separated.where_part, "WHERE a.Estado = %1");
        assert!(separated.group_by.is_empty());
        assert!(separated.order_by.is_empty());
    }

    #[test]
    fn test_separate_clauses_idempotent_on_where_part() {
        let first = separate_clauses("WHERE a = %1 AND b = %2 GROUP BY a ORDER BY b");
        let second = separate_clauses(&first.where_part);
        assert_eq!(second.where_part, first.where_part);
        assert!(second.group_by.is_empty());
        assert!(second.order_by.is_empty());
    }

    #[test]
    fn test_split_conjuncts_case_insensitive() {
        let conjuncts = split_conjuncts("a.Estado = %1 and p.Precio > %2 AND b = 1");
        assert_eq!(conjuncts, vec!["a.Estado = %1", "p.Precio > %2", "b = 1"]);
    }

    #[test]
    fn test_extract_param_positions_in_order() {
        assert_eq!(extract_param_positions("x BETWEEN %2 AND %1"), vec![2, 1]);
        assert!(extract_param_positions("x = 1").is_empty());
    }

    #[test]
    fn test_partial_values_drop_unsatisfied_conjuncts() {
        let q = query(
            "a.Nombre AS Producto, p.Precio",
            "FROM dbo.Precios AS p INNER JOIN dbo.Articulos AS a ON p.id_articulo = a.id",
            "WHERE a.Estado = %1 AND p.Precio > %2",
        );
        let params = vec![
            param(1, ParameterType::Text, "Estado"),
            param(2, ParameterType::Decimal, "PrecioMinimo"),
        ];

        let sql = build_query(&q, &params, &values(&[(1, "Activo")])).unwrap();
        assert!(sql.contains("WHERE a.Estado = 'Activo'"));
        assert!(!sql.contains("Precio >"));
    }

    #[test]
    fn test_full_values_substitute_all_conjuncts() {
        let q = query(
            "a.Nombre AS Producto, p.Precio",
            "FROM dbo.Precios AS p INNER JOIN dbo.Articulos AS a ON p.id_articulo = a.id",
            "WHERE a.Estado = %1 AND p.Precio > %2",
        );
        let params = vec![
            param(1, ParameterType::Text, "Estado"),
            param(2, ParameterType::Decimal, "PrecioMinimo"),
        ];

        let sql = build_query(&q, &params, &values(&[(1, "Activo"), (2, "100")])).unwrap();
        assert_eq!(
            sql,
            "SELECT a.Nombre AS Producto, p.Precio\n\
             FROM dbo.Precios AS p INNER JOIN dbo.Articulos AS a ON p.id_articulo = a.id\n\
             WHERE a.Estado = 'Activo' AND p.Precio > 100.0"
        );
    }

    #[test]
    fn test_empty_values_omit_where_entirely() {
        let q = query(
            "a.Nombre",
            "FROM dbo.Articulos a",
            "WHERE a.Estado = %1",
        );
        let params = vec![param(1, ParameterType::Text, "Estado")];

        let sql = build_query(&q, &params, &HashMap::new()).unwrap();
        assert_eq!(sql, "SELECT a.Nombre\nFROM dbo.Articulos a");
    }

    #[test]
    fn test_group_and_order_by_survive_without_where() {
        let q = query(
            "a.Estado, COUNT(a.id) AS Total",
            "FROM dbo.Articulos a",
            "WHERE a.Estado = %1 GROUP BY a.Estado ORDER BY Total DESC",
        );
        let params = vec![param(1, ParameterType::Text, "Estado")];

        let sql = build_query(&q, &params, &HashMap::new()).unwrap();
        assert_eq!(
            sql,
            "SELECT a.Estado, COUNT(a.id) AS Total\n\
             FROM dbo.Articulos a\n\
             GROUP BY a.Estado\n\
             ORDER BY Total DESC"
        );
    }

    #[test]
    fn test_between_predicates_split_at_and_boundaries() {
        let q = query(
            "p.Precio",
            "FROM dbo.Precios p",
            "WHERE p.Precio BETWEEN %1 AND %2 AND p.Activo = %3",
        );
        let params = vec![
            param(1, ParameterType::Decimal, "Desde"),
            param(2, ParameterType::Decimal, "Hasta"),
            param(3, ParameterType::Boolean, "Activo"),
        ];

        // The AND splitter cuts BETWEEN %1 AND %2 into the fragments
        // "p.Precio BETWEEN %1" and "%2". With %1 supplied the first
        // fragment is kept, with %2 absent the bare "%2" fragment drops.
        // Flat conjunctions are the supported model; paired >= / <=
        // predicates are the way to express ranges.
        let sql = build_query(&q, &params, &values(&[(1, "10"), (3, "si")])).unwrap();
        assert!(sql.contains("p.Precio BETWEEN 10.0"));
        assert!(!sql.contains("%2"));
        assert!(sql.contains("p.Activo = 1"));

        // With both range bounds supplied the full predicate reassembles
        let sql = build_query(&q, &params, &values(&[(1, "10"), (2, "20"), (3, "si")])).unwrap();
        assert!(sql.contains("p.Precio BETWEEN 10.0 AND 20.0"));
    }

    #[test]
    fn test_non_ascii_where_template_builds() {
        let q = query("a.Nombre", "FROM dbo.Artículos a", "WHERE a.Año = %1");
        let params = vec![param(1, ParameterType::Integer, "Año")];

        let sql = build_query(&q, &params, &values(&[(1, "2025")])).unwrap();
        assert!(sql.contains("WHERE a.Año = 2025"));

        // A template shorter than the WHERE keyword, in non-ASCII text
        let q = query("a.Nombre", "FROM dbo.Artículos a", "Añoñ = %1");
        let sql = build_query(&q, &params, &values(&[(1, "2025")])).unwrap();
        assert!(sql.contains("WHERE Añoñ = 2025"));
    }

    #[test]
    fn test_text_value_is_escaped_during_substitution() {
        let q = query("c.Name", "FROM dbo.Customers c", "WHERE c.Name = %1");
        let params = vec![param(1, ParameterType::Text, "Nombre")];

        let sql = build_query(&q, &params, &values(&[(1, "O'Brien")])).unwrap();
        assert!(sql.contains("WHERE c.Name = 'O''Brien'"));
    }

    #[test]
    fn test_repeated_placeholder_substituted_everywhere() {
        let q = query(
            "a.Nombre",
            "FROM dbo.Articulos a",
            "WHERE (a.Estado = %1 OR a.EstadoAnterior = %1)",
        );
        let params = vec![param(1, ParameterType::Text, "Estado")];

        let sql = build_query(&q, &params, &values(&[(1, "Activo")])).unwrap();
        assert!(sql.contains("a.Estado = 'Activo' OR a.EstadoAnterior = 'Activo'"));
    }

    #[test]
    fn test_two_digit_positions_do_not_collide() {
        let q = query(
            "a.Nombre",
            "FROM dbo.Articulos a",
            "WHERE a.C1 = %1 AND a.C10 = %10",
        );
        let mut params: Vec<QueryParameter> =
            vec![param(1, ParameterType::Integer, "Uno")];
        params.push(param(10, ParameterType::Integer, "Diez"));

        let mut supplied = values(&[(1, "5"), (10, "50")]);
        let sql = build_query(&q, &params, &supplied).unwrap();
        assert!(sql.contains("a.C1 = 5"));
        assert!(sql.contains("a.C10 = 50"));

        supplied.remove(&10);
        let sql = build_query(&q, &params, &supplied).unwrap();
        assert!(sql.contains("a.C1 = 5"));
        assert!(!sql.contains("C10"));
    }

    #[test]
    fn test_unparseable_integer_propagates_error() {
        let q = query("a.id", "FROM dbo.Articulos a", "WHERE a.id = %1");
        let params = vec![param(1, ParameterType::Integer, "Id")];

        let err = build_query(&q, &params, &values(&[(1, "not-a-number")])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    }

    #[test]
    fn test_required_and_visible_parameters_ordered() {
        let mut p1 = param(1, ParameterType::Text, "B");
        p1.orden = 2;
        p1.required = true;
        let mut p2 = param(2, ParameterType::Text, "A");
        p2.orden = 1;
        p2.required = true;
        let mut p3 = param(3, ParameterType::Text, "Hidden");
        p3.orden = 0;
        p3.visible = false;

        let params = vec![p1, p2, p3];
        let required: Vec<&str> = required_parameters(&params)
            .iter()
            .map(|p| p.label.as_str())
            .collect();
        assert_eq!(required, vec!["A", "B"]);

        let visible: Vec<&str> = visible_parameters(&params)
            .iter()
            .map(|p| p.label.as_str())
            .collect();
        assert_eq!(visible, vec!["A", "B"]);
    }

    #[test]
    fn test_validate_parameters_names_labels() {
        let mut p1 = param(1, ParameterType::Text, "Estado del Artículo");
        p1.required = true;
        let mut p2 = param(2, ParameterType::Decimal, "Precio Mínimo");
        p2.required = true;

        let check = validate_parameters(&[p1, p2], &values(&[(2, "")]));
        assert!(!check.valid);
        assert_eq!(check.errors.len(), 2);
        assert!(check.errors[0].contains("Estado del Artículo"));
        assert!(check.errors[1].contains("Precio Mínimo"));
    }

    #[test]
    fn test_validate_parameters_ok_when_all_supplied() {
        let mut p1 = param(1, ParameterType::Text, "Estado");
        p1.required = true;

        let check = validate_parameters(&[p1], &values(&[(1, "Activo")]));
        assert!(check.valid);
        assert!(check.errors.is_empty());
    }

    #[test]
    fn test_generate_test_values_prefers_defaults() {
        let mut p1 = param(1, ParameterType::Text, "Estado");
        p1.default_value = Some("Activo".to_string());
        let p2 = param(2, ParameterType::Decimal, "Precio");

        let generated = generate_test_values(&[p1, p2]);
        assert_eq!(generated.get(&1).map(String::as_str), Some("Activo"));
        assert_eq!(generated.get(&2).map(String::as_str), Some("1.0"));
    }

    #[test]
    fn test_build_test_query_synthesizes_values() {
        let q = query(
            "a.Nombre",
            "FROM dbo.Articulos a",
            "WHERE a.Estado = %1 AND a.Cantidad > %2",
        );
        let params = vec![
            param(1, ParameterType::Text, "Estado"),
            param(2, ParameterType::Integer, "Cantidad"),
        ];

        let sql = build_test_query(&q, &params, None).unwrap();
        assert!(sql.contains("WHERE a.Estado = 'TEST' AND a.Cantidad > 1"));
    }
}
