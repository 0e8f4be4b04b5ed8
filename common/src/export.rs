// Result export to XLSX and CSV

use crate::errors::ExportError;
use crate::executor::ExecutionOutcome;
use chrono::Local;
use csv::WriterBuilder;
use rust_xlsxwriter::{Format, Workbook};
use serde_json::Value;
use tracing::instrument;

/// Export file formats offered to end users
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv",
        }
    }
}

/// A generated export ready to be sent as a download
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Build the download filename from the report name and a local timestamp
pub fn export_filename(query_name: &str, format: ExportFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.{}", query_name, timestamp, format.extension())
}

/// Render an execution result as a downloadable file.
/// Fails when the execution itself failed; exports never carry partial
/// results of a broken run.
#[instrument(skip(outcome), fields(format = ?format))]
pub fn export_outcome(
    query_name: &str,
    outcome: &ExecutionOutcome,
    format: ExportFormat,
) -> Result<ExportFile, ExportError> {
    if !outcome.success {
        return Err(ExportError::ExecutionFailed(
            outcome
                .error
                .clone()
                .unwrap_or_else(|| "Execution failed".to_string()),
        ));
    }

    let bytes = match format {
        ExportFormat::Xlsx => to_xlsx(query_name, outcome)?,
        ExportFormat::Csv => to_csv(outcome)?,
    };

    Ok(ExportFile {
        filename: export_filename(query_name, format),
        mime_type: format.mime_type().to_string(),
        bytes,
    })
}

fn to_xlsx(query_name: &str, outcome: &ExecutionOutcome) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    // Sheet names are capped at 31 characters
    let sheet_name: String = query_name.chars().take(31).collect();
    worksheet
        .set_name(&sheet_name)
        .map_err(|e| ExportError::SpreadsheetFailed(format!("Invalid sheet name: {}", e)))?;

    let header_format = Format::new().set_bold();
    for (col, header) in outcome.columns.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header, &header_format)
            .map_err(|e| ExportError::SpreadsheetFailed(format!("Failed to write header: {}", e)))?;
    }

    for (row_idx, row) in outcome.data.iter().enumerate() {
        let row_num = (row_idx + 1) as u32;
        for (col_idx, cell) in row.iter().enumerate() {
            let col_num = col_idx as u16;
            let written = match cell {
                Value::Number(n) => {
                    worksheet.write_number(row_num, col_num, n.as_f64().unwrap_or(0.0))
                }
                Value::String(s) => worksheet.write_string(row_num, col_num, s),
                Value::Bool(b) => worksheet.write_boolean(row_num, col_num, *b),
                Value::Null => worksheet.write_blank(row_num, col_num, &Format::new()),
                other => worksheet.write_string(row_num, col_num, &other.to_string()),
            };
            written
                .map_err(|e| ExportError::SpreadsheetFailed(format!("Failed to write cell: {}", e)))?;
        }
    }

    workbook
        .save_to_buffer()
        .map_err(|e| ExportError::SpreadsheetFailed(format!("Failed to save workbook: {}", e)))
}

fn to_csv(outcome: &ExecutionOutcome) -> Result<Vec<u8>, ExportError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    writer
        .write_record(&outcome.columns)
        .map_err(|e| ExportError::CsvFailed(format!("Failed to write header: {}", e)))?;

    for row in &outcome.data {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();

        writer
            .write_record(&cells)
            .map_err(|e| ExportError::CsvFailed(format!("Failed to write record: {}", e)))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::CsvFailed(format!("Failed to flush writer: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(success: bool) -> ExecutionOutcome {
        ExecutionOutcome {
            success,
            data: vec![
                vec![json!("Tornillo"), json!(12), json!(true)],
                vec![json!("Tuerca, M8"), json!(3.5), json!(null)],
            ],
            columns: vec![
                "Producto".to_string(),
                "Cantidad".to_string(),
                "Activo".to_string(),
            ],
            total_rows: 2,
            execution_time: 0.042,
            error: if success {
                None
            } else {
                Some("boom".to_string())
            },
            sql: "SELECT 1".to_string(),
            page: 1,
            page_size: 50,
            has_next: false,
            has_previous: false,
        }
    }

    #[test]
    fn test_export_filename_shape() {
        let name = export_filename("ventas_mensuales", ExportFormat::Xlsx);
        assert!(name.starts_with("ventas_mensuales_"));
        assert!(name.ends_with(".xlsx"));
    }

    #[test]
    fn test_csv_export_quotes_embedded_commas() {
        let file = export_outcome("ventas", &outcome(true), ExportFormat::Csv).unwrap();
        let text = String::from_utf8(file.bytes).unwrap();
        assert!(text.starts_with("Producto,Cantidad,Activo"));
        assert!(text.contains("\"Tuerca, M8\""));
        assert!(file.filename.ends_with(".csv"));
        assert_eq!(file.mime_type, "text/csv");
    }

    #[test]
    fn test_xlsx_export_produces_zip_container() {
        let file = export_outcome("ventas", &outcome(true), ExportFormat::Xlsx).unwrap();
        // XLSX files are ZIP archives
        assert_eq!(&file.bytes[..2], b"PK");
    }

    #[test]
    fn test_failed_execution_is_not_exportable() {
        let err = export_outcome("ventas", &outcome(false), ExportFormat::Csv).unwrap_err();
        assert!(matches!(err, ExportError::ExecutionFailed(_)));
    }

    #[test]
    fn test_long_report_name_fits_sheet_limit() {
        let long_name = "a".repeat(64);
        let file = export_outcome(&long_name, &outcome(true), ExportFormat::Xlsx);
        assert!(file.is_ok());
    }
}
