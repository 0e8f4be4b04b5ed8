use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Report Query Models
// ============================================================================

/// ReportQuery represents a technician-authored parameterized SQL report.
///
/// The query is stored as three fragments (SELECT list, FROM clause with
/// JOINs, WHERE template with %N placeholders) that are validated on save
/// and assembled into a final statement at execution time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReportQuery {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub select_clause: String,
    pub from_clause: String,
    pub where_clause: String,
    pub active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportQuery {
    /// Create a new report query definition
    pub fn new(
        name: String,
        description: Option<String>,
        select_clause: String,
        from_clause: String,
        where_clause: String,
        created_by: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            select_clause,
            from_clause,
            where_clause,
            active: true,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Render the stored fragments without parameter substitution, for preview
    pub fn full_preview(&self) -> String {
        let mut parts = vec![
            format!("SELECT {}", self.select_clause.trim()),
            self.from_clause.trim().to_string(),
        ];

        let where_clause = self.where_clause.trim();
        if !where_clause.is_empty() {
            parts.push(where_clause.to_string());
        }

        parts.join("\n")
    }

    /// Extract the column aliases declared in the SELECT list
    pub fn column_aliases(&self) -> Vec<String> {
        extract_select_aliases(&self.select_clause)
    }
}

lazy_static! {
    static ref SELECT_ALIAS_RE: Regex = Regex::new(r"(?i)\bAS\s+([a-zA-Z_]\w*)").unwrap();
}

/// Extract column names from a SELECT list: declared `AS` aliases when
/// present, otherwise the last identifier of each comma-separated expression.
pub fn extract_select_aliases(select_clause: &str) -> Vec<String> {
    let aliases: Vec<String> = SELECT_ALIAS_RE
        .captures_iter(select_clause)
        .map(|cap| cap[1].to_string())
        .collect();

    if !aliases.is_empty() {
        return aliases;
    }

    select_clause
        .split(',')
        .filter_map(|part| {
            let field = part.trim().rsplit('.').next()?.split_whitespace().last()?;
            if field.is_empty() {
                None
            } else {
                Some(field.to_string())
            }
        })
        .collect()
}

// ============================================================================
// Parameter Models
// ============================================================================

/// ParameterType is the closed set of data types a query parameter can take.
///
/// The type drives SQL literal formatting, default-value validation, and
/// test-value synthesis with exhaustive matching.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    Text,
    Integer,
    Decimal,
    Date,
    Boolean,
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterType::Text => write!(f, "text"),
            ParameterType::Integer => write!(f, "integer"),
            ParameterType::Decimal => write!(f, "decimal"),
            ParameterType::Date => write!(f, "date"),
            ParameterType::Boolean => write!(f, "boolean"),
        }
    }
}

impl FromStr for ParameterType {
    type Err = crate::errors::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ParameterType::Text),
            "integer" => Ok(ParameterType::Integer),
            "decimal" => Ok(ParameterType::Decimal),
            "date" => Ok(ParameterType::Date),
            "boolean" => Ok(ParameterType::Boolean),
            _ => Err(crate::errors::ValidationError::UnknownDataType(
                s.to_string(),
            )),
        }
    }
}

impl TryFrom<String> for ParameterType {
    type Error = crate::errors::ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// QueryParameter defines one typed, named input bound to a WHERE
/// placeholder position (%N) of its owning report query.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueryParameter {
    pub id: Uuid,
    pub query_id: Uuid,
    pub internal_name: String,
    pub label: String,
    #[sqlx(try_from = "String")]
    pub data_type: ParameterType,
    pub orden: i32,
    pub visible: bool,
    pub required: bool,
    pub default_value: Option<String>,
    pub placeholder: Option<String>,
    pub where_position: i32,
}

impl QueryParameter {
    /// Map the data type to the HTML input type used by generated forms
    pub fn form_field_type(&self) -> &'static str {
        match self.data_type {
            ParameterType::Text => "text",
            ParameterType::Integer | ParameterType::Decimal => "number",
            ParameterType::Date => "date",
            ParameterType::Boolean => "checkbox",
        }
    }
}

// ============================================================================
// Execution Audit Models
// ============================================================================

/// QueryExecution is the append-only audit record written for every
/// execution attempt, successful or not. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueryExecution {
    pub id: Uuid,
    pub query_id: Uuid,
    pub executed_by: String,
    #[sqlx(json)]
    pub parameters: serde_json::Value,
    pub total_rows: i64,
    pub execution_time: f64,
    pub success: bool,
    pub error_message: Option<String>,
    pub executed_sql: String,
    pub executed_at: DateTime<Utc>,
}

impl QueryExecution {
    /// Build an audit record for one execution attempt
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        query_id: Uuid,
        executed_by: String,
        parameters: &HashMap<i32, String>,
        total_rows: i64,
        execution_time: f64,
        success: bool,
        error_message: Option<String>,
        executed_sql: String,
    ) -> Self {
        let parameters_json: serde_json::Map<String, serde_json::Value> = parameters
            .iter()
            .map(|(pos, value)| (pos.to_string(), serde_json::Value::String(value.clone())))
            .collect();

        Self {
            id: Uuid::new_v4(),
            query_id,
            executed_by,
            parameters: serde_json::Value::Object(parameters_json),
            total_rows,
            execution_time,
            success,
            error_message,
            executed_sql,
            executed_at: Utc::now(),
        }
    }

    /// Human-readable rendering of the supplied parameters
    pub fn parameters_display(&self) -> String {
        match self.parameters.as_object() {
            Some(map) if !map.is_empty() => map
                .iter()
                .map(|(k, v)| match v.as_str() {
                    Some(s) => format!("{}: {}", k, s),
                    None => format!("{}: {}", k, v),
                })
                .collect::<Vec<_>>()
                .join(", "),
            _ => "No parameters".to_string(),
        }
    }

    /// Elapsed time formatted for display (ms below one second)
    pub fn time_display(&self) -> String {
        if self.execution_time < 1.0 {
            format!("{:.0} ms", self.execution_time * 1000.0)
        } else {
            format!("{:.2} s", self.execution_time)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_preview_includes_where() {
        let query = ReportQuery::new(
            "products".to_string(),
            None,
            "a.Nombre AS Producto".to_string(),
            "FROM dbo.Articulos AS a".to_string(),
            "WHERE a.Estado = %1".to_string(),
            None,
        );
        let preview = query.full_preview();
        assert_eq!(
            preview,
            "SELECT a.Nombre AS Producto\nFROM dbo.Articulos AS a\nWHERE a.Estado = %1"
        );
    }

    #[test]
    fn test_full_preview_omits_empty_where() {
        let query = ReportQuery::new(
            "products".to_string(),
            None,
            "a.Nombre".to_string(),
            "FROM dbo.Articulos AS a".to_string(),
            String::new(),
            None,
        );
        assert!(!query.full_preview().contains("WHERE"));
    }

    #[test]
    fn test_column_aliases_from_as_keywords() {
        let aliases = extract_select_aliases("a.Nombre AS Producto, p.Precio AS PrecioUnitario");
        assert_eq!(aliases, vec!["Producto", "PrecioUnitario"]);
    }

    #[test]
    fn test_column_aliases_fallback_to_field_names() {
        let aliases = extract_select_aliases("a.Nombre, p.Precio");
        assert_eq!(aliases, vec!["Nombre", "Precio"]);
    }

    #[test]
    fn test_parameter_type_round_trip() {
        for s in ["text", "integer", "decimal", "date", "boolean"] {
            let parsed: ParameterType = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("varchar".parse::<ParameterType>().is_err());
    }

    #[test]
    fn test_form_field_type_mapping() {
        let mut param = QueryParameter {
            id: Uuid::new_v4(),
            query_id: Uuid::new_v4(),
            internal_name: "estado".to_string(),
            label: "Estado".to_string(),
            data_type: ParameterType::Text,
            orden: 0,
            visible: true,
            required: false,
            default_value: None,
            placeholder: None,
            where_position: 1,
        };
        assert_eq!(param.form_field_type(), "text");
        param.data_type = ParameterType::Decimal;
        assert_eq!(param.form_field_type(), "number");
        param.data_type = ParameterType::Boolean;
        assert_eq!(param.form_field_type(), "checkbox");
    }

    #[test]
    fn test_execution_record_parameters_display() {
        let mut values = HashMap::new();
        values.insert(1, "Activo".to_string());
        let record = QueryExecution::record(
            Uuid::new_v4(),
            "system".to_string(),
            &values,
            10,
            0.123,
            true,
            None,
            "SELECT 1".to_string(),
        );
        assert_eq!(record.parameters_display(), "1: Activo");
        assert_eq!(record.time_display(), "123 ms");
    }

    #[test]
    fn test_execution_record_empty_parameters() {
        let record = QueryExecution::record(
            Uuid::new_v4(),
            "system".to_string(),
            &HashMap::new(),
            0,
            1.5,
            false,
            Some("timeout".to_string()),
            String::new(),
        );
        assert_eq!(record.parameters_display(), "No parameters");
        assert_eq!(record.time_display(), "1.50 s");
    }
}
