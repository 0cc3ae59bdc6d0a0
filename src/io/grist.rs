use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use chrono::DateTime;
use indexmap::IndexMap;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::error::{ClientError, ClientResult};
use crate::io::{BULK_TIMEOUT, METADATA_TIMEOUT, SourceStore};
use crate::model::{Fields, RecordId, SourceRecord, SourceType, Value};

/// REST client for a Grist document.
///
/// Column types are fetched once per table and cached for the lifetime of
/// the client; [`SourceStore::list_records`] refreshes them.
pub struct GristClient {
    http: Client,
    base_url: String,
    doc_id: String,
    token: String,
    column_cache: RefCell<HashMap<String, HashMap<String, SourceType>>>,
}

#[derive(Debug, Deserialize)]
struct RecordsPage {
    records: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    id: RecordId,
    #[serde(default)]
    fields: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ColumnsPage {
    #[serde(default)]
    columns: Vec<RawColumn>,
}

#[derive(Debug, Deserialize)]
struct RawColumn {
    id: String,
    #[serde(default)]
    fields: Option<ColumnFields>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColumnFields {
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl RawColumn {
    fn source_type(&self) -> SourceType {
        self.fields
            .as_ref()
            .and_then(|fields| fields.kind.as_deref())
            .or(self.kind.as_deref())
            .map(SourceType::parse)
            .unwrap_or(SourceType::Text)
    }
}

impl GristClient {
    /// Creates a client for the document `doc_id` served under `base_url`
    /// (for example `https://docs.getgrist.com/api`).
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        doc_id: impl Into<String>,
    ) -> ClientResult<Self> {
        let http = Client::builder().timeout(BULK_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            doc_id: doc_id.into(),
            token: token.into(),
            column_cache: RefCell::new(HashMap::new()),
        })
    }

    fn doc_url(&self) -> String {
        format!("{}/docs/{}", self.base_url, self.doc_id)
    }

    fn table_url(&self, table: &str, resource: &str) -> String {
        format!("{}/tables/{table}/{resource}", self.doc_url())
    }

    fn send(&self, request: RequestBuilder, timeout: Duration) -> ClientResult<Response> {
        let response = request.bearer_auth(&self.token).timeout(timeout).send()?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            Err(ClientError::Status {
                status,
                body: truncate(body, 200),
            })
        }
    }

    fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder, timeout: Duration) -> ClientResult<T> {
        let response = self.send(request, timeout)?;
        response
            .json()
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// Fetches the column types of a table and refreshes the cache.
    #[instrument(level = "debug", skip(self))]
    pub fn column_types(&self, table: &str) -> ClientResult<HashMap<String, SourceType>> {
        let page: ColumnsPage = self.get_json(
            self.http.get(self.table_url(table, "columns")),
            METADATA_TIMEOUT,
        )?;
        let types: HashMap<String, SourceType> = page
            .columns
            .iter()
            .map(|column| (column.id.clone(), column.source_type()))
            .collect();
        self.column_cache
            .borrow_mut()
            .insert(table.to_string(), types.clone());
        Ok(types)
    }

    fn cached_column_type(&self, table: &str, column: &str) -> Option<SourceType> {
        self.column_cache
            .borrow()
            .get(table)
            .map(|types| types.get(column).cloned().unwrap_or(SourceType::Text))
    }
}

impl SourceStore for GristClient {
    fn test_connection(&self) -> ClientResult<()> {
        let _: serde_json::Value =
            self.get_json(self.http.get(self.doc_url()), METADATA_TIMEOUT)?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn list_records(&self, table: &str, limit: Option<usize>) -> ClientResult<Vec<SourceRecord>> {
        let mut request = self.http.get(self.table_url(table, "records"));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let page: RecordsPage = self.get_json(request, BULK_TIMEOUT)?;

        let types = self.column_types(table).unwrap_or_else(|err| {
            warn!(table, error = %err, "column types unavailable, dates are kept as raw numbers");
            HashMap::new()
        });

        let records: Vec<SourceRecord> = page
            .records
            .into_iter()
            .map(|raw| {
                let fields = raw
                    .fields
                    .into_iter()
                    .map(|(column, cell)| {
                        let value = cell_to_value(cell, types.get(&column));
                        (column, value)
                    })
                    .collect();
                SourceRecord::new(raw.id, fields)
            })
            .collect();
        debug!(count = records.len(), "fetched Grist records");
        Ok(records)
    }

    #[instrument(level = "debug", skip(self, fields))]
    fn update_record(&self, table: &str, id: RecordId, fields: &Fields) -> ClientResult<()> {
        let body = json!({ "records": [{ "id": id, "fields": fields }] });
        self.send(
            self.http.patch(self.table_url(table, "records")).json(&body),
            BULK_TIMEOUT,
        )?;
        Ok(())
    }

    fn column_type(&self, table: &str, column: &str) -> SourceType {
        if let Some(kind) = self.cached_column_type(table, column) {
            return kind;
        }
        match self.column_types(table) {
            Ok(mut types) => types.remove(column).unwrap_or(SourceType::Text),
            Err(err) => {
                warn!(table, column, error = %err, "column type lookup failed, assuming Text");
                SourceType::Text
            }
        }
    }
}

/// Grist stores dates as epoch seconds; they are exposed as ISO literals.
fn cell_to_value(cell: serde_json::Value, column_type: Option<&SourceType>) -> Value {
    let epoch = match (&cell, column_type) {
        (serde_json::Value::Number(number), Some(SourceType::Date | SourceType::DateTime)) => {
            number.as_f64()
        }
        _ => None,
    };

    let Some(epoch) = epoch else {
        return Value::from(cell);
    };
    match DateTime::from_timestamp(epoch.trunc() as i64, 0) {
        Some(moment) if column_type == Some(&SourceType::Date) => {
            Value::Temporal(moment.format("%Y-%m-%d").to_string())
        }
        Some(moment) => Value::Temporal(moment.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        None => Value::Number(epoch),
    }
}

fn truncate(mut text: String, max: usize) -> String {
    if let Some((index, _)) = text.char_indices().nth(max) {
        text.truncate(index);
    }
    text
}
