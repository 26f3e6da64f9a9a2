use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, info, trace, warn};

use crate::dataset::Dataset;
use crate::domain::{DashboardConfig, HELP_TEXT, Message, PainelError};
use crate::prompt::{Prompt, PromptState};
use crate::table::TableData;
use crate::views::{AnalystSelection, DashboardViews};

// Rows taken by borders, headers and the status line around a table.
const TABLE_CHROME_HEIGHT: usize = 8;

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Dataset,
    Status,
    Breakdown,
    Queue,
    Expired,
    Analyst,
}

impl Tab {
    pub const ALL: [Tab; 6] = [
        Tab::Dataset,
        Tab::Status,
        Tab::Breakdown,
        Tab::Queue,
        Tab::Expired,
        Tab::Analyst,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Dataset => "Dados",
            Tab::Status => "Status",
            Tab::Breakdown => "Responsáveis",
            Tab::Queue => "Distribuição",
            Tab::Expired => "Vencidos",
            Tab::Analyst => "Analistas",
        }
    }

    pub fn index(self) -> usize {
        Tab::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    fn prev(self) -> Self {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    DASHBOARD,
    POPUP,
    CMDINPUT,
}

/// Expands `~` and environment variables in a user supplied path.
pub fn expand_path(raw: &str) -> Result<PathBuf, PainelError> {
    let expanded =
        shellexpand::full(raw.trim()).map_err(|e| PainelError::LoadingFailed(e.to_string()))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

pub struct Model {
    config: DashboardConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    dataset: Option<Dataset>,
    views: Option<DashboardViews>,
    tables: HashMap<Tab, TableData>,
    summary_table: TableData,
    tab: Tab,
    offsets: HashMap<Tab, usize>,
    selection: AnalystSelection,
    input: Prompt,
    last_input: PromptState,
    page_height: usize,
    status_message: String,
    last_status_message_update: Instant,
}

impl Model {
    pub fn init(config: &DashboardConfig, ui_height: usize) -> Self {
        Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::DASHBOARD,
            previous_modus: Modus::DASHBOARD,
            dataset: None,
            views: None,
            tables: HashMap::new(),
            summary_table: TableData::default(),
            tab: Tab::Dataset,
            offsets: HashMap::new(),
            selection: AnalystSelection::All,
            input: Prompt::default(),
            last_input: PromptState::default(),
            page_height: ui_height.saturating_sub(TABLE_CHROME_HEIGHT).max(1),
            status_message: "Started painel!".to_string(),
            last_status_message_update: Instant::now(),
        }
    }

    /// Loads a spreadsheet from disk. On failure the current dataset stays.
    pub fn load_file(&mut self, path: PathBuf) -> Result<(), PainelError> {
        self.set_status_message(format!("Loading {} ...", path.display()));
        match Dataset::from_path(&path, self.config.header_skip_rows) {
            Ok(dataset) => {
                self.set_dataset(dataset);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load {}: {e}", path.display());
                self.set_status_message(format!("Failed to load {}: {e}", path.display()));
                Err(e)
            }
        }
    }

    /// Replaces the current dataset and all derived views.
    pub fn set_dataset(&mut self, dataset: Dataset) {
        let start_time = Instant::now();
        let message = match dataset.validate(&self.config) {
            Ok(()) => format!("Loaded {} ({} rows)", dataset.name(), dataset.height()),
            Err(e) => format!("Loaded {} ({} rows), {e}", dataset.name(), dataset.height()),
        };
        self.dataset = Some(dataset);
        self.selection = AnalystSelection::All;
        self.offsets.clear();
        self.status = Status::READY;
        self.recompute();
        info!("Dataset ready in {}ms", start_time.elapsed().as_millis());
        self.set_status_message(message);
    }

    fn recompute(&mut self) {
        self.recompute_at(Local::now().naive_local());
    }

    fn recompute_at(&mut self, now: NaiveDateTime) {
        let Some(dataset) = &self.dataset else {
            return;
        };
        let views = DashboardViews::compute(dataset, &self.config, &self.selection, now);

        let mut tables = HashMap::new();
        let mut render = |tab: Tab, frame: Option<&polars::prelude::DataFrame>| {
            if let Some(frame) = frame {
                match TableData::from_frame(frame) {
                    Ok(table) => {
                        tables.insert(tab, table);
                    }
                    Err(e) => warn!("Could not render {}: {e}", tab.title()),
                }
            }
        };
        render(Tab::Dataset, Some(dataset.frame()));
        render(Tab::Breakdown, views.breakdown.as_ref().ok());
        render(Tab::Queue, views.queue.as_ref().ok().map(|v| &v.frame));
        render(Tab::Expired, views.expired.as_ref().ok().map(|v| &v.frame));
        render(Tab::Analyst, views.analyst.as_ref().ok().map(|v| &v.frame));

        self.summary_table = TableData::from_summary(&views.summary);
        self.tables = tables;
        self.views = Some(views);
        self.clamp_offsets();
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn views(&self) -> Option<&DashboardViews> {
        self.views.as_ref()
    }

    pub fn table(&self, tab: Tab) -> Option<&TableData> {
        self.tables.get(&tab)
    }

    pub fn summary_table(&self) -> &TableData {
        &self.summary_table
    }

    pub fn offset(&self, tab: Tab) -> usize {
        self.offsets.get(&tab).copied().unwrap_or(0)
    }

    pub fn selection(&self) -> &AnalystSelection {
        &self.selection
    }

    /// Selector entries: the "all" label followed by every analyst.
    pub fn analyst_options(&self) -> Vec<String> {
        let mut options = vec![self.config.analyst.all_label.clone()];
        if let Some(Ok(choices)) = self.views.as_ref().map(|v| &v.analyst_choices) {
            options.extend(choices.iter().cloned());
        }
        options
    }

    /// Index of the current selection in `analyst_options`.
    pub fn analyst_position(&self) -> usize {
        match &self.selection {
            AnalystSelection::All => 0,
            AnalystSelection::Only(name) => self
                .analyst_options()
                .iter()
                .skip(1)
                .position(|o| o == name)
                .map_or(0, |p| p + 1),
        }
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn status_message_age(&self) -> Duration {
        self.last_status_message_update.elapsed()
    }

    pub fn show_popup(&self) -> bool {
        self.modus == Modus::POPUP
    }

    pub fn popup_message(&self) -> &str {
        HELP_TEXT
    }

    pub fn prompt(&self) -> Option<&PromptState> {
        (self.modus == Modus::CMDINPUT).then_some(&self.last_input)
    }

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::CMDINPUT
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), PainelError> {
        let Some(msg) = message else {
            return Ok(());
        };
        trace!("Update: Modus {:?}, Message {:?}", self.modus, msg);
        match self.modus {
            Modus::DASHBOARD => match msg {
                Message::Quit => self.quit(),
                Message::NextTab => self.tab = self.tab.next(),
                Message::PrevTab => self.tab = self.tab.prev(),
                Message::SelectTab(idx) => {
                    if let Some(tab) = Tab::ALL.get(idx) {
                        self.tab = *tab;
                    }
                }
                Message::MoveUp => self.scroll_up(1),
                Message::MoveDown => self.scroll_down(1),
                Message::MovePageUp => self.scroll_up(self.page_height),
                Message::MovePageDown => self.scroll_down(self.page_height),
                Message::MoveBeginning => {
                    self.offsets.insert(self.tab, 0);
                }
                Message::MoveEnd => self.scroll_down(usize::MAX),
                Message::NextAnalyst => self.cycle_analyst(1),
                Message::PrevAnalyst => self.cycle_analyst(-1),
                Message::OpenFile => self.enter_cmd_mode(),
                Message::Refresh => self.refresh(),
                Message::Help => self.show_help(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
            Modus::POPUP => match msg {
                Message::Quit => self.quit(),
                Message::Exit | Message::Help => self.exit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
            Modus::CMDINPUT => match msg {
                Message::RawKey(key) => self.raw_input(key),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
        }
        Ok(())
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!("UI was resized to {width}x{height}");
        self.page_height = height.saturating_sub(TABLE_CHROME_HEIGHT).max(1);
    }

    fn refresh(&mut self) {
        if self.dataset.is_some() {
            self.recompute();
            self.set_status_message("Views recomputed");
        }
    }

    fn current_rows(&self) -> usize {
        self.tables.get(&self.tab).map(TableData::nrows).unwrap_or(0)
    }

    fn scroll_up(&mut self, size: usize) {
        let offset = self.offsets.entry(self.tab).or_insert(0);
        *offset = offset.saturating_sub(size);
    }

    fn scroll_down(&mut self, size: usize) {
        let last = self.current_rows().saturating_sub(1);
        let offset = self.offsets.entry(self.tab).or_insert(0);
        *offset = offset.saturating_add(size).min(last);
    }

    fn clamp_offsets(&mut self) {
        for (tab, offset) in self.offsets.iter_mut() {
            let rows = self.tables.get(tab).map(TableData::nrows).unwrap_or(0);
            *offset = (*offset).min(rows.saturating_sub(1));
        }
    }

    fn cycle_analyst(&mut self, step: isize) {
        if self.dataset.is_none() {
            return;
        }
        let options = self.analyst_options();
        let idx = self.analyst_position() as isize;
        let next = (idx + step).rem_euclid(options.len() as isize) as usize;
        self.selection = match next {
            0 => AnalystSelection::All,
            n => AnalystSelection::Only(options[n].clone()),
        };
        debug!("Analyst selection: {:?}", self.selection);
        self.offsets.insert(Tab::Analyst, 0);
        self.recompute();
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
    }

    fn exit(&mut self) {
        if self.modus == Modus::POPUP {
            trace!("Close popup ...");
            self.modus = self.previous_modus;
            self.previous_modus = Modus::POPUP;
        }
    }

    fn enter_cmd_mode(&mut self) {
        trace!("Entering command mode ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.input.reset();
        self.last_input = self.input.state();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if self.last_input.finished() {
            self.modus = self.previous_modus;
            self.previous_modus = Modus::CMDINPUT;
            if self.last_input.submitted {
                self.handle_cmd_input();
            }
        }
    }

    fn handle_cmd_input(&mut self) {
        let raw = self.last_input.text.clone();
        trace!("Handle cmd input {raw}");
        if raw.trim().is_empty() {
            return;
        }
        if let Err(e) = self.open_path(&raw) {
            debug!("Open command failed: {e}");
        }
    }

    /// Expands a user supplied path and loads it. Every failure ends up in
    /// the status line.
    pub fn open_path(&mut self, raw: &str) -> Result<(), PainelError> {
        match expand_path(raw) {
            Ok(path) => self.load_file(path),
            Err(e) => {
                warn!("Could not expand {raw}: {e}");
                self.set_status_message(format!("Failed to load {raw}: {e}"));
                Err(e)
            }
        }
    }
}
