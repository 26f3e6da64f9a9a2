use std::io::Error;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use thiserror::Error;

pub const HELP_TEXT: &str = "\
Tabs
  Tab / Shift-Tab   next / previous view
  1 .. 6            jump to view
Scrolling
  Up / Down         one row
  PageUp / PageDown one page
  Home / End        first / last row
Analysts
  [ / ]             previous / next analyst
Other
  o                 open another spreadsheet
  r                 recompute views
  ?                 this help
  Esc               close popup / cancel input
  q                 quit";

#[derive(Debug, Error)]
pub enum PainelError {
    #[error("I/O error: {0}")]
    Io(#[from] Error),
    #[error("data error: {0}")]
    Polars(#[from] PolarsError),
    #[error("unreadable spreadsheet: {0}")]
    UnreadableFile(String),
    #[error("{view}: missing columns {}", columns.join(", "))]
    MissingExpectedColumns { view: String, columns: Vec<String> },
    #[error("loading failed: {0}")]
    LoadingFailed(String),
    #[error("file not found")]
    FileNotFound,
    #[error("permission denied")]
    PermissionDenied,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    NextTab,
    PrevTab,
    SelectTab(usize),
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    NextAnalyst,
    PrevAnalyst,
    OpenFile,
    Refresh,
    Help,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

/// Which optional columns the distribution queue carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Variant {
    /// Project title and process number.
    #[default]
    A,
    /// Project title, process number and SANFOM code.
    B,
}

impl Variant {
    pub fn queue_includes_sanfom(self) -> bool {
        matches!(self, Variant::B)
    }
}

/// Spreadsheet header names the views read from.
#[derive(Debug, Clone, Setters)]
#[setters(into)]
pub struct ColumnNames {
    pub status: String,
    pub responsible: String,
    pub year: String,
    pub process_complete: String,
    pub assignee: String,
    pub project_title: String,
    pub process_number: String,
    pub sanfom: String,
    pub expiry_date: String,
    pub analyst: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            status: "Adimplência (última emissão)".into(),
            responsible: "RESPONSÁVEL".into(),
            year: "Ano-Sanfom".into(),
            process_complete: "INSTRUÇÃO PROCESSUAL CONCLUÍDA?".into(),
            assignee: "ANALISTA".into(),
            project_title: "TÍTULO DO PROJETO".into(),
            process_number: "Nº PROCESSO".into(),
            sanfom: "CÓDIGO SANFOM".into(),
            expiry_date: "VENCIMENTO DA ADIMPLÊNCIA".into(),
            analyst: "ANALISTA".into(),
        }
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(into)]
pub struct QueueConfig {
    pub target_year: i64,
    pub flag_value: String,
    pub variant: Variant,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            target_year: 2024,
            flag_value: "SIM".into(),
            variant: Variant::A,
        }
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(into)]
pub struct AnalystConfig {
    /// Selector entry meaning "no filter".
    pub all_label: String,
    /// Whether the "no filter" entry keeps rows without an analyst.
    pub include_unassigned: bool,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            all_label: "Todos".into(),
            include_unassigned: false,
        }
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(into)]
pub struct UiConfig {
    pub page_title: String,
    pub page_icon: String,
    pub wide_layout: bool,
    pub event_poll_time: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            page_title: "Automatizador de Painéis".into(),
            page_icon: "📊".into(),
            wide_layout: true,
            event_poll_time: 100,
        }
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(into)]
pub struct DashboardConfig {
    pub columns: ColumnNames,
    pub allowed_statuses: Vec<String>,
    pub queue: QueueConfig,
    pub analyst: AnalystConfig,
    pub header_skip_rows: usize,
    pub ui: UiConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            allowed_statuses: vec!["Solicitado".into(), "Inadimplente".into()],
            queue: QueueConfig::default(),
            analyst: AnalystConfig::default(),
            header_skip_rows: 4,
            ui: UiConfig::default(),
        }
    }
}

impl DashboardConfig {
    /// Every column some view reads, deduplicated, in view order.
    pub fn required_columns(&self) -> Vec<&str> {
        let c = &self.columns;
        let mut out: Vec<&str> = Vec::new();
        for name in [
            &c.status,
            &c.responsible,
            &c.year,
            &c.process_complete,
            &c.assignee,
            &c.project_title,
            &c.process_number,
            &c.sanfom,
            &c.expiry_date,
            &c.analyst,
        ] {
            if !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_columns_are_deduplicated() {
        let cfg = DashboardConfig::default();
        let cols = cfg.required_columns();
        // assignee and analyst share a header by default
        assert_eq!(cols.len(), 9);
        assert_eq!(cols.iter().filter(|c| **c == "ANALISTA").count(), 1);
    }

    #[test]
    fn missing_columns_message_names_view() {
        let err = PainelError::MissingExpectedColumns {
            view: "Status".into(),
            columns: vec!["A".into(), "B".into()],
        };
        assert_eq!(err.to_string(), "Status: missing columns A, B");
    }

    #[test]
    fn setters_override_defaults() {
        let cfg = DashboardConfig::default()
            .header_skip_rows(0usize)
            .queue(QueueConfig::default().variant(Variant::B).target_year(2025));
        assert_eq!(cfg.header_skip_rows, 0);
        assert!(cfg.queue.variant.queue_includes_sanfom());
        assert_eq!(cfg.queue.target_year, 2025);
    }
}
