//! Tabular payload returned by a successful executeQueries call

use crate::execution_loop::error_classifier::{error_object_message, AttemptFailure, FailureKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Row = Map<String, Value>;

/// One table of a DAX result; column names are keys of each row (`[count]`,
/// `'Reports'[ReportName]`), null cells are kept as JSON null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Structured result of one executed query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularPayload {
    pub tables: Vec<ResultTable>,
}

impl TabularPayload {
    /// Single-table payload, mostly for callers that build results by hand.
    pub fn from_rows(rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Self {
            tables: vec![ResultTable { rows }],
        }
    }

    /// Rows of the first table (a single EVALUATE yields exactly one)
    pub fn rows(&self) -> &[Row] {
        self.tables.first().map(|t| t.rows.as_slice()).unwrap_or(&[])
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteQueriesResponse {
    results: Vec<QueryResultEntry>,
}

#[derive(Debug, Deserialize)]
struct QueryResultEntry {
    #[serde(default)]
    tables: Option<Vec<ResultTable>>,
    #[serde(default)]
    error: Option<Value>,
}

/// Parse a 2xx executeQueries body.
///
/// Power BI can answer 200 and still report a query error inside
/// `results[0].error`; that is surfaced as an `InvalidQuery` failure.
pub fn parse_execute_response(body: &str) -> Result<TabularPayload, AttemptFailure> {
    let response: ExecuteQueriesResponse = serde_json::from_str(body).map_err(|e| {
        AttemptFailure::new(
            FailureKind::Unknown,
            format!("Malformed executeQueries response: {}", e),
        )
    })?;

    let entry = response.results.into_iter().next().ok_or_else(|| {
        AttemptFailure::new(FailureKind::Unknown, "executeQueries returned no results")
    })?;

    if let Some(error) = entry.error {
        let message = error_object_message(&error).unwrap_or_else(|| error.to_string());
        return Err(AttemptFailure::new(FailureKind::InvalidQuery, message));
    }

    match entry.tables {
        Some(tables) => Ok(TabularPayload { tables }),
        None => Err(AttemptFailure::new(
            FailureKind::Unknown,
            "executeQueries result carried neither tables nor an error",
        )),
    }
}
