use std::cell::RefCell;
use std::path::{Path, PathBuf};

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_xlsxwriter::{Format, Workbook};
use tracing::{debug, info, instrument};

use crate::error::{ClientError, ClientResult};
use crate::io::SourceStore;
use crate::model::{Fields, RecordId, SourceRecord, SourceType, Value};

const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Source store backed by a local `.xlsx` workbook.
///
/// Each table is a sheet whose first row holds the column ids; the data row
/// `n` (1-based, below the header) has record id `n`. Edits are kept in memory
/// and the whole workbook is rewritten by [`SourceStore::flush`]. Only cell
/// values survive the rewrite, formatting does not.
pub struct WorkbookStore {
    path: PathBuf,
    state: RefCell<Option<LoadedWorkbook>>,
}

#[derive(Debug)]
struct LoadedWorkbook {
    sheets: Vec<Sheet>,
    dirty: bool,
}

#[derive(Debug)]
struct Sheet {
    name: String,
    headers: Vec<String>,
    types: Vec<SourceType>,
    rows: Vec<Vec<Value>>,
}

impl WorkbookStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_workbook<T>(&self, f: impl FnOnce(&mut LoadedWorkbook) -> ClientResult<T>) -> ClientResult<T> {
        let mut state = self.state.borrow_mut();
        if state.is_none() {
            *state = Some(load(&self.path)?);
        }
        match state.as_mut() {
            Some(workbook) => f(workbook),
            None => Err(ClientError::InvalidWorkbook("workbook not loaded".into())),
        }
    }
}

impl LoadedWorkbook {
    fn sheet(&self, name: &str) -> ClientResult<&Sheet> {
        self.sheets
            .iter()
            .find(|sheet| sheet.name == name)
            .ok_or_else(|| ClientError::InvalidWorkbook(format!("missing sheet '{name}'")))
    }

    fn sheet_mut(&mut self, name: &str) -> ClientResult<&mut Sheet> {
        self.sheets
            .iter_mut()
            .find(|sheet| sheet.name == name)
            .ok_or_else(|| ClientError::InvalidWorkbook(format!("missing sheet '{name}'")))
    }
}

impl Sheet {
    fn column_index(&mut self, column: &str) -> usize {
        match self.headers.iter().position(|header| header == column) {
            Some(index) => index,
            None => {
                self.headers.push(column.to_string());
                self.types.push(SourceType::Text);
                self.headers.len() - 1
            }
        }
    }

    fn record(&self, index: usize) -> SourceRecord {
        let fields: Fields = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty())
            .map(|(col, header)| {
                let value = self.rows[index].get(col).cloned().unwrap_or(Value::Null);
                (header.clone(), value)
            })
            .collect();
        SourceRecord::new(index as RecordId + 1, fields)
    }
}

impl SourceStore for WorkbookStore {
    fn test_connection(&self) -> ClientResult<()> {
        self.with_workbook(|_| Ok(()))
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn list_records(&self, table: &str, limit: Option<usize>) -> ClientResult<Vec<SourceRecord>> {
        self.with_workbook(|workbook| {
            let sheet = workbook.sheet(table)?;
            let count = limit.unwrap_or(sheet.rows.len()).min(sheet.rows.len());
            let records: Vec<SourceRecord> = (0..count).map(|index| sheet.record(index)).collect();
            debug!(count = records.len(), "read workbook records");
            Ok(records)
        })
    }

    fn update_record(&self, table: &str, id: RecordId, fields: &Fields) -> ClientResult<()> {
        self.with_workbook(|workbook| {
            let sheet = workbook.sheet_mut(table)?;
            let index = usize::try_from(id - 1)
                .ok()
                .filter(|index| *index < sheet.rows.len())
                .ok_or_else(|| ClientError::NotFound(format!("record {id} in sheet '{table}'")))?;

            for (column, value) in fields {
                let col = sheet.column_index(column);
                let row = &mut sheet.rows[index];
                if row.len() <= col {
                    row.resize(col + 1, Value::Null);
                }
                row[col] = value.clone();
            }
            workbook.dirty = true;
            Ok(())
        })
    }

    fn column_type(&self, table: &str, column: &str) -> SourceType {
        self.with_workbook(|workbook| {
            let sheet = workbook.sheet(table)?;
            Ok(sheet
                .headers
                .iter()
                .position(|header| header == column)
                .and_then(|index| sheet.types.get(index).cloned())
                .unwrap_or(SourceType::Text))
        })
        .unwrap_or(SourceType::Text)
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn flush(&self) -> ClientResult<()> {
        let mut state = self.state.borrow_mut();
        let Some(workbook) = state.as_mut().filter(|workbook| workbook.dirty) else {
            return Ok(());
        };
        save(&self.path, &workbook.sheets)?;
        workbook.dirty = false;
        info!(path = %self.path.display(), "workbook saved");
        Ok(())
    }
}

fn load(path: &Path) -> ClientResult<LoadedWorkbook> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let names = workbook.sheet_names().to_vec();

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .ok_or_else(|| ClientError::InvalidWorkbook(format!("missing sheet '{name}'")))??;
        sheets.push(read_sheet(name, &range));
    }

    Ok(LoadedWorkbook {
        sheets,
        dirty: false,
    })
}

fn read_sheet(name: String, range: &Range<DataType>) -> Sheet {
    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(|cell| cell_to_value(cell).to_string()).collect())
        .unwrap_or_default();

    let rows: Vec<Vec<Value>> = rows
        .map(|row| row.iter().map(cell_to_value).collect())
        .collect();

    let types = (0..headers.len())
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .find(|value| !value.is_empty())
                .map(infer_type)
                .unwrap_or(SourceType::Text)
        })
        .collect();

    Sheet {
        name,
        headers,
        types,
        rows,
    }
}

fn cell_to_value(cell: &DataType) -> Value {
    match cell {
        DataType::String(value) => Value::Text(value.clone()),
        DataType::Float(value) => Value::Number(*value),
        DataType::Int(value) => Value::Number(*value as f64),
        DataType::Bool(value) => Value::Bool(*value),
        DataType::DateTime(serial) => serial_to_temporal(*serial),
        DataType::Empty => Value::Null,
        other => Value::Text(other.to_string()),
    }
}

fn infer_type(value: &Value) -> SourceType {
    match value {
        Value::Number(_) => SourceType::Numeric,
        Value::Bool(_) => SourceType::Bool,
        Value::Temporal(literal) if literal.contains('T') => SourceType::DateTime,
        Value::Temporal(_) => SourceType::Date,
        Value::Text(_) | Value::Null => SourceType::Text,
    }
}

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Serials outside chrono's calendar are kept as plain numbers.
fn serial_to_temporal(serial: f64) -> Value {
    let seconds = (serial * SECONDS_PER_DAY).round();
    if !seconds.is_finite() || seconds >= i64::MAX as f64 || seconds < i64::MIN as f64 {
        return Value::Number(serial);
    }
    let seconds = seconds as i64;
    let Some(moment) = Duration::try_seconds(seconds)
        .and_then(|offset| excel_epoch().checked_add_signed(offset))
    else {
        return Value::Number(serial);
    };
    if seconds % 86_400 == 0 {
        Value::Temporal(moment.format("%Y-%m-%d").to_string())
    } else {
        Value::Temporal(moment.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

fn temporal_to_serial(literal: &str) -> Option<(f64, &'static str)> {
    let trimmed = literal.trim_end_matches('Z');
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let days = (date - excel_epoch().date()).num_days();
        return Some((days as f64, DATE_FORMAT));
    }
    let moment = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    let seconds = (moment - excel_epoch()).num_seconds();
    Some((seconds as f64 / SECONDS_PER_DAY, DATETIME_FORMAT))
}

fn save(path: &Path, sheets: &[Sheet]) -> ClientResult<()> {
    let mut writer = Workbook::new();
    let date_format = Format::new().set_num_format(DATE_FORMAT);
    let datetime_format = Format::new().set_num_format(DATETIME_FORMAT);

    for sheet in sheets {
        let worksheet = writer.add_worksheet();
        worksheet.set_name(&sheet.name)?;

        for (col, header) in sheet.headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, header)?;
        }

        for (row_idx, row) in sheet.rows.iter().enumerate() {
            let excel_row = (row_idx + 1) as u32;
            for (col, value) in row.iter().enumerate() {
                let col = col as u16;
                match value {
                    Value::Null => {}
                    Value::Bool(flag) => {
                        worksheet.write_boolean(excel_row, col, *flag)?;
                    }
                    Value::Number(number) => {
                        worksheet.write_number(excel_row, col, *number)?;
                    }
                    Value::Text(text) => {
                        worksheet.write_string(excel_row, col, text)?;
                    }
                    Value::Temporal(literal) => match temporal_to_serial(literal) {
                        Some((serial, DATE_FORMAT)) => {
                            worksheet.write_number_with_format(excel_row, col, serial, &date_format)?;
                        }
                        Some((serial, _)) => {
                            worksheet.write_number_with_format(
                                excel_row,
                                col,
                                serial,
                                &datetime_format,
                            )?;
                        }
                        None => {
                            worksheet.write_string(excel_row, col, literal)?;
                        }
                    },
                }
            }
        }
    }

    writer.save(path)?;
    Ok(())
}
