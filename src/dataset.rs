use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Cursor, ErrorKind};
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use polars::prelude::{Column, DataFrame, DataType};
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::domain::{DashboardConfig, PainelError};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

/// A spreadsheet cell after decoding, before the column gets a dtype.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    fn text(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

/// One loaded spreadsheet. Columns are fixed at load time.
#[derive(Debug)]
pub struct Dataset {
    name: String,
    frame: DataFrame,
    // Parsed date columns, filled on first use.
    parsed_dates: RefCell<HashMap<String, Rc<[Option<NaiveDateTime>]>>>,
}

impl Dataset {
    pub fn from_frame(name: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            name: name.into(),
            frame,
            parsed_dates: RefCell::new(HashMap::new()),
        }
    }

    pub fn from_path(path: &Path, skip_rows: usize) -> Result<Self, PainelError> {
        let metadata = fs::metadata(path).map_err(path_error)?;
        if !metadata.is_file() {
            return Err(PainelError::LoadingFailed("Not a file!".into()));
        }
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string();
        let bytes = fs::read(path).map_err(path_error)?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Self::from_bytes(name, bytes, skip_rows)
    }

    /// Decodes the first worksheet of a spreadsheet payload. Rows before
    /// `skip_rows` are ignored and the next row is the header.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: Vec<u8>,
        skip_rows: usize,
    ) -> Result<Self, PainelError> {
        let name = name.into();
        let start_time = Instant::now();

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| PainelError::UnreadableFile(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| PainelError::UnreadableFile("workbook has no worksheets".into()))?
            .map_err(|e| PainelError::UnreadableFile(e.to_string()))?;

        // Keep absolute row positions so the skip count refers to sheet rows.
        let (start_row, _) = range.start().unwrap_or((0, 0));
        let mut grid: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];
        grid.extend(
            range
                .rows()
                .map(|row| row.iter().map(convert_cell).collect::<Vec<Cell>>()),
        );

        let frame = frame_from_grid(grid, skip_rows)?;
        info!(
            "Loaded {name}: {} rows x {} columns in {}ms",
            frame.height(),
            frame.width(),
            start_time.elapsed().as_millis()
        );
        Ok(Self::from_frame(name, frame))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    pub fn missing_columns(&self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter(|n| !self.has_column(n))
            .map(|n| n.to_string())
            .collect()
    }

    /// Fails with `MissingExpectedColumns` naming `view` if any column is absent.
    pub fn require(&self, view: &str, names: &[&str]) -> Result<(), PainelError> {
        let columns = self.missing_columns(names);
        if columns.is_empty() {
            Ok(())
        } else {
            Err(PainelError::MissingExpectedColumns {
                view: view.to_string(),
                columns,
            })
        }
    }

    /// Checks every column any view reads.
    pub fn validate(&self, config: &DashboardConfig) -> Result<(), PainelError> {
        let result = self.require("Dataset", &config.required_columns());
        if let Err(e) = &result {
            warn!("{} is incomplete: {e}", self.name);
        }
        result
    }

    /// Parses a column into date-times. Values that do not parse are `None`.
    /// The result is computed once per column and shared afterwards.
    pub fn parsed_dates(&self, column: &str) -> Result<Rc<[Option<NaiveDateTime>]>, PainelError> {
        if let Some(hit) = self.parsed_dates.borrow().get(column) {
            trace!("Reusing parsed dates for {column}");
            return Ok(Rc::clone(hit));
        }

        let values = self.frame.column(column)?.cast(&DataType::String)?;
        let parsed: Rc<[Option<NaiveDateTime>]> =
            values.str()?.into_iter().map(|v| v.and_then(parse_date)).collect();
        debug!(
            "Parsed {}/{} dates in {column}",
            parsed.iter().flatten().count(),
            parsed.len()
        );

        self.parsed_dates
            .borrow_mut()
            .insert(column.to_string(), Rc::clone(&parsed));
        Ok(parsed)
    }
}

/// Accepts ISO dates and date-times, RFC 3339 and day-first dates.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    // Offsets are folded into local time, the clock expiry is checked against.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn path_error(e: io::Error) -> PainelError {
    match e.kind() {
        ErrorKind::NotFound => PainelError::FileNotFound,
        ErrorKind::PermissionDenied => PainelError::PermissionDenied,
        _ => PainelError::Io(e),
    }
}

fn convert_cell(value: &Data) -> Cell {
    match value {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::text(s),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_text(dt.as_f64())
            .map(Cell::Text)
            .unwrap_or(Cell::Empty),
        other => Cell::text(&other.to_string()),
    }
}

/// Renders an Excel serial date (1900 date system) as text.
fn excel_serial_to_text(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let delta = TimeDelta::try_milliseconds((serial * 86_400_000.0).round() as i64)?;
    let dt = base.checked_add_signed(delta)?;
    if dt.time() == NaiveTime::MIN {
        Some(dt.format("%Y-%m-%d").to_string())
    } else {
        Some(dt.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn header_names(header: &[Cell], width: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(width);
    for idx in 0..width {
        let base = match header.get(idx) {
            Some(Cell::Text(s)) => s.clone(),
            Some(Cell::Number(n)) => format_number(*n),
            _ => format!("Unnamed: {idx}"),
        };
        let mut name = base.clone();
        let mut suffix = 0;
        while seen.contains(&name) {
            suffix += 1;
            name = format!("{base}.{suffix}");
        }
        seen.insert(name.clone());
        names.push(name);
    }
    names
}

fn frame_from_grid(mut grid: Vec<Vec<Cell>>, skip_rows: usize) -> Result<DataFrame, PainelError> {
    if grid.len() <= skip_rows {
        return Err(PainelError::UnreadableFile(format!(
            "no header row after skipping {skip_rows} rows"
        )));
    }
    let mut body = grid.split_off(skip_rows);
    let header = body.remove(0);
    body.retain(|row| !row.iter().all(Cell::is_empty));

    let width = body
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);
    let names = header_names(&header, width);

    // Each column is typed in its own task.
    let columns: Vec<Column> = (0..width)
        .into_par_iter()
        .filter(|&idx| {
            !header.get(idx).is_none_or(Cell::is_empty)
                || body.iter().any(|row| row.get(idx).is_some_and(|c| !c.is_empty()))
        })
        .map(|idx| build_column(&names[idx], idx, &body))
        .collect();

    Ok(DataFrame::new(columns)?)
}

fn build_column(name: &str, idx: usize, body: &[Vec<Cell>]) -> Column {
    let cells: Vec<&Cell> = body
        .iter()
        .map(|row| row.get(idx).unwrap_or(&Cell::Empty))
        .collect();

    let numeric = cells.iter().any(|c| !c.is_empty())
        && cells
            .iter()
            .all(|c| matches!(c, Cell::Empty | Cell::Number(_)));

    if numeric {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Number(n) => Some(*n),
                _ => None,
            })
            .collect();
        let integral = values
            .iter()
            .flatten()
            .all(|v| v.fract() == 0.0 && v.abs() < 1e15);
        if integral {
            let ints: Vec<Option<i64>> = values.iter().map(|v| v.map(|f| f as i64)).collect();
            Column::new(name.into(), ints)
        } else {
            Column::new(name.into(), values)
        }
    } else {
        let values: Vec<Option<String>> = cells
            .iter()
            .map(|c| match c {
                Cell::Empty => None,
                Cell::Number(n) => Some(format_number(*n)),
                Cell::Text(s) => Some(s.clone()),
            })
            .collect();
        Column::new(name.into(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    use crate::views::expired_compliance;

    enum X {
        S(&'static str),
        N(f64),
        B(bool),
        // Date cell shown as dd/mm/yyyy.
        D(u16, u8, u8),
        E,
    }

    /// Writes a banner block of four rows, then `header` and `rows`.
    fn workbook(header: &[&str], rows: &[Vec<X>]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("dd/mm/yyyy");
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Relatório de processos").unwrap();
        sheet.write_string(1, 0, "Gerado em 01/02/2024").unwrap();
        for (col, name) in header.iter().enumerate() {
            sheet.write_string(4, col as u16, *name).unwrap();
        }
        for (r, row) in rows.iter().enumerate() {
            let r = 5 + r as u32;
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    X::S(s) => {
                        sheet.write_string(r, c as u16, *s).unwrap();
                    }
                    X::N(n) => {
                        sheet.write_number(r, c as u16, *n).unwrap();
                    }
                    X::B(b) => {
                        sheet.write_boolean(r, c as u16, *b).unwrap();
                    }
                    X::D(y, m, d) => {
                        let date = ExcelDateTime::from_ymd(*y, *m, *d).unwrap();
                        sheet
                            .write_datetime_with_format(r, c as u16, &date, &date_format)
                            .unwrap();
                    }
                    X::E => {}
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn header_follows_banner_rows() {
        let bytes = workbook(
            &["Nº PROCESSO", "Ano-Sanfom", "ANALISTA"],
            &[
                vec![X::S("001/2024"), X::N(2024.0), X::S("Ana")],
                vec![X::S("002/2024"), X::N(2023.0), X::E],
                vec![X::S("003/2024"), X::N(2024.0), X::S("   ")],
            ],
        );
        let ds = Dataset::from_bytes("processos.xlsx", bytes, 4).unwrap();
        let frame = ds.frame();

        assert_eq!(ds.name(), "processos.xlsx");
        assert_eq!(ds.height(), 3);
        let names: Vec<&str> = frame.get_column_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["Nº PROCESSO", "Ano-Sanfom", "ANALISTA"]);
        assert_eq!(frame.column("Ano-Sanfom").unwrap().dtype(), &DataType::Int64);
        assert_eq!(frame.column("ANALISTA").unwrap().dtype(), &DataType::String);
        // Absent and whitespace-only cells both load as missing.
        assert_eq!(frame.column("ANALISTA").unwrap().null_count(), 2);
    }

    #[test]
    fn mixed_column_becomes_text() {
        let bytes = workbook(
            &["CÓDIGO SANFOM"],
            &[vec![X::N(1234.0)], vec![X::S("AB-7")], vec![X::N(2.5)]],
        );
        let ds = Dataset::from_bytes("x.xlsx", bytes, 4).unwrap();
        let col = ds.frame().column("CÓDIGO SANFOM").unwrap();
        let values: Vec<Option<&str>> = col.str().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some("1234"), Some("AB-7"), Some("2.5")]);
    }

    #[test]
    fn date_and_boolean_cells_load_as_text() {
        let bytes = workbook(
            &["VENCIMENTO DA ADIMPLÊNCIA", "ATIVO"],
            &[
                vec![X::D(2020, 1, 1), X::B(true)],
                vec![X::D(2030, 12, 31), X::B(false)],
            ],
        );
        let ds = Dataset::from_bytes("datas.xlsx", bytes, 4).unwrap();
        let frame = ds.frame();

        let dates: Vec<Option<&str>> = frame
            .column("VENCIMENTO DA ADIMPLÊNCIA")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(dates, vec![Some("2020-01-01"), Some("2030-12-31")]);
        let flags: Vec<Option<&str>> =
            frame.column("ATIVO").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(flags, vec![Some("true"), Some("false")]);
    }

    #[test]
    fn date_cells_feed_the_expiry_view() {
        let bytes = workbook(
            &[
                "Nº PROCESSO",
                "TÍTULO DO PROJETO",
                "CÓDIGO SANFOM",
                "VENCIMENTO DA ADIMPLÊNCIA",
            ],
            &[
                vec![X::S("001/2024"), X::S("T1"), X::S("S1"), X::D(2020, 1, 1)],
                vec![X::S("002/2024"), X::S("T2"), X::S("S2"), X::D(2030, 12, 31)],
            ],
        );
        let ds = Dataset::from_bytes("datas.xlsx", bytes, 4).unwrap();
        let reference = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);
        let expired = expired_compliance(&ds, &DashboardConfig::default(), reference).unwrap();
        assert_eq!(expired.count(), 1);
        let number = expired.frame.column("Nº PROCESSO").unwrap();
        assert_eq!(number.str().unwrap().get(0), Some("001/2024"));
    }

    #[test]
    fn error_cells_load_as_missing() {
        assert_eq!(convert_cell(&Data::Error(CellErrorType::Div0)), Cell::Empty);
        assert_eq!(convert_cell(&Data::Bool(true)), Cell::text("true"));

        let grid = vec![
            vec![Cell::text("VALOR")],
            vec![Cell::Number(1.0)],
            vec![convert_cell(&Data::Error(CellErrorType::NA))],
            vec![Cell::Number(3.0)],
        ];
        let frame = frame_from_grid(grid, 0).unwrap();
        let values: Vec<Option<i64>> = frame
            .column("VALOR")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(1), None, Some(3)]);
    }

    #[test]
    fn non_spreadsheet_payload_is_unreadable() {
        let err = Dataset::from_bytes("notes.txt", b"just some text".to_vec(), 4).unwrap_err();
        assert!(matches!(err, PainelError::UnreadableFile(_)));
    }

    #[test]
    fn sheet_without_header_row_is_unreadable() {
        let mut wb = Workbook::new();
        wb.add_worksheet().write_string(0, 0, "banner").unwrap();
        let bytes = wb.save_to_buffer().unwrap();
        let err = Dataset::from_bytes("short.xlsx", bytes, 4).unwrap_err();
        assert!(matches!(err, PainelError::UnreadableFile(_)));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Dataset::from_path(Path::new("/nonexistent/processos.xlsx"), 4).unwrap_err();
        assert!(matches!(err, PainelError::FileNotFound));
    }

    #[test]
    fn directory_is_not_a_file() {
        let err = Dataset::from_path(&std::env::temp_dir(), 4).unwrap_err();
        assert!(matches!(err, PainelError::LoadingFailed(msg) if msg == "Not a file!"));
    }

    #[test]
    fn io_errors_map_to_path_errors() {
        let denied = path_error(io::Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(denied, PainelError::PermissionDenied));
        let missing = path_error(io::Error::from(ErrorKind::NotFound));
        assert!(matches!(missing, PainelError::FileNotFound));
        let other = path_error(io::Error::from(ErrorKind::InvalidData));
        assert!(matches!(other, PainelError::Io(_)));
    }

    #[test]
    fn blank_and_duplicate_headers_are_renamed() {
        let grid = vec![
            vec![Cell::text("ANALISTA"), Cell::Empty, Cell::text("ANALISTA")],
            vec![Cell::text("Ana"), Cell::Number(1.0), Cell::text("Bia")],
            vec![Cell::Empty, Cell::Empty, Cell::Empty],
            vec![Cell::text("Caio"), Cell::Empty, Cell::Empty],
            vec![Cell::Empty, Cell::Empty, Cell::Empty],
        ];
        let frame = frame_from_grid(grid, 0).unwrap();
        let names: Vec<&str> = frame.get_column_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["ANALISTA", "Unnamed: 1", "ANALISTA.1"]);
        // Blank rows are dropped wherever they are.
        assert_eq!(frame.height(), 2);
    }

    #[test]
    fn unnamed_empty_columns_are_dropped() {
        let grid = vec![
            vec![Cell::text("A"), Cell::Empty],
            vec![Cell::text("x"), Cell::Empty],
        ];
        let frame = frame_from_grid(grid, 0).unwrap();
        assert_eq!(frame.width(), 1);
    }

    #[test]
    fn validate_lists_missing_columns() {
        let frame = frame_from_grid(vec![vec![Cell::text("ANALISTA")]], 0).unwrap();
        let ds = Dataset::from_frame("t", frame);
        let err = ds.validate(&DashboardConfig::default()).unwrap_err();
        match err {
            PainelError::MissingExpectedColumns { view, columns } => {
                assert_eq!(view, "Dataset");
                assert_eq!(columns.len(), 8);
                assert!(!columns.contains(&"ANALISTA".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parse_date_is_permissive() {
        let jan1 = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);
        assert_eq!(parse_date("2020-01-01"), Some(jan1));
        assert_eq!(parse_date(" 01/01/2020 "), Some(jan1));
        assert_eq!(parse_date("01.01.2020"), Some(jan1));
        assert_eq!(parse_date("2020-01-01 00:00:00"), Some(jan1));
        let local = DateTime::parse_from_rfc3339("2020-01-01T03:00:00+03:00")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(parse_date("2020-01-01T03:00:00+03:00"), Some(local));
        assert_eq!(parse_date("not-a-date"), None);
        assert_eq!(parse_date("2024"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn excel_serials_render_as_iso_text() {
        assert_eq!(excel_serial_to_text(43831.0).as_deref(), Some("2020-01-01"));
        assert_eq!(
            excel_serial_to_text(43831.5).as_deref(),
            Some("2020-01-01 12:00:00")
        );
        assert_eq!(excel_serial_to_text(-1.0), None);
    }

    #[test]
    fn parsed_dates_are_memoized() {
        let frame = frame_from_grid(
            vec![
                vec![Cell::text("VENCIMENTO")],
                vec![Cell::text("2020-01-01")],
                vec![Cell::text("amanhã")],
            ],
            0,
        )
        .unwrap();
        let ds = Dataset::from_frame("t", frame);
        let first = ds.parsed_dates("VENCIMENTO").unwrap();
        let second = ds.parsed_dates("VENCIMENTO").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(first[0].is_some());
        assert!(first[1].is_none());
    }
}
