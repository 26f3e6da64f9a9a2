use std::collections::HashSet;

use chrono::NaiveDateTime;
use polars::prelude::*;
use tracing::{debug, warn};

use crate::dataset::Dataset;
use crate::domain::{DashboardConfig, PainelError};

pub const VIEW_STATUS: &str = "Status";
pub const VIEW_BREAKDOWN: &str = "Responsáveis";
pub const VIEW_QUEUE: &str = "Distribuição";
pub const VIEW_EXPIRED: &str = "Vencidos";
pub const VIEW_ANALYST: &str = "Analistas";

/// Row counts per category, in allow-list order. Categories that never
/// occur are left out and read back as 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryCount {
    counts: Vec<(String, u64)>,
}

impl CategoryCount {
    pub fn get(&self, category: &str) -> u64 {
        self.counts
            .iter()
            .find(|(k, _)| k == category)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.counts.iter().map(|(k, _)| k.as_str())
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, v)| v).sum()
    }
}

/// A row and column subset of the dataset.
#[derive(Debug, Clone)]
pub struct FilteredView {
    pub frame: DataFrame,
}

impl FilteredView {
    pub fn count(&self) -> usize {
        self.frame.height()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnalystSelection {
    #[default]
    All,
    Only(String),
}

impl AnalystSelection {
    pub fn label<'a>(&'a self, config: &'a DashboardConfig) -> &'a str {
        match self {
            AnalystSelection::All => &config.analyst.all_label,
            AnalystSelection::Only(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: String,
    pub non_null: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
}

fn text(name: &str) -> Expr {
    col(name).cast(DataType::String)
}

/// Absent cells and empty strings are both missing.
fn is_missing(name: &str) -> Expr {
    col(name).is_null().or(text(name).eq(lit("")))
}

fn in_allow_list(name: &str, allowed: &[String]) -> Expr {
    allowed
        .iter()
        .map(|v| text(name).eq(lit(v.as_str())))
        .reduce(|a, b| a.or(b))
        .unwrap_or(lit(false))
}

fn unique_statuses(config: &DashboardConfig) -> Vec<&str> {
    let mut seen = HashSet::new();
    config
        .allowed_statuses
        .iter()
        .map(String::as_str)
        .filter(|s| seen.insert(*s))
        .collect()
}

fn first_u64(frame: &DataFrame, name: &str) -> PolarsResult<u64> {
    let values = frame.column(name)?.cast(&DataType::UInt64)?;
    Ok(values.u64()?.get(0).unwrap_or(0))
}

pub fn summarize(dataset: &Dataset) -> DatasetSummary {
    let frame = dataset.frame();
    let columns = frame
        .get_columns()
        .iter()
        .map(|c| ColumnSummary {
            name: c.name().to_string(),
            dtype: c.dtype().to_string(),
            non_null: c.len() - c.null_count(),
        })
        .collect();
    DatasetSummary {
        rows: frame.height(),
        columns,
    }
}

/// Counts allow-listed values of the compliance-status column.
pub fn status_counts(
    dataset: &Dataset,
    config: &DashboardConfig,
) -> Result<CategoryCount, PainelError> {
    let status = config.columns.status.as_str();
    dataset.require(VIEW_STATUS, &[status])?;

    Ok(count_statuses(dataset.frame().clone().lazy(), status, config)?)
}

fn count_statuses(
    rows: LazyFrame,
    status: &str,
    config: &DashboardConfig,
) -> PolarsResult<CategoryCount> {
    let statuses = unique_statuses(config);
    if statuses.is_empty() {
        return Ok(CategoryCount::default());
    }
    let sums: Vec<Expr> = statuses
        .iter()
        .map(|s| text(status).eq(lit(*s)).sum().alias(*s))
        .collect();
    let frame = rows.select(sums).collect()?;

    let mut counts = Vec::new();
    for s in statuses {
        let n = first_u64(&frame, s)?;
        if n > 0 {
            counts.push((s.to_string(), n));
        }
    }
    Ok(CategoryCount { counts })
}

/// One row per responsible party, one count column per allow-listed status
/// present among the rows. Rows without a responsible party are dropped.
pub fn responsible_breakdown(
    dataset: &Dataset,
    config: &DashboardConfig,
) -> Result<DataFrame, PainelError> {
    let responsible = config.columns.responsible.as_str();
    let status = config.columns.status.as_str();
    dataset.require(VIEW_BREAKDOWN, &[responsible, status])?;

    let rows = dataset
        .frame()
        .clone()
        .lazy()
        .filter(
            in_allow_list(status, &config.allowed_statuses).and(is_missing(responsible).not()),
        );
    let present = count_statuses(rows.clone(), status, config)?;

    if present.total() == 0 {
        return Ok(rows.select([col(responsible)]).collect()?);
    }

    let aggs: Vec<Expr> = present
        .categories()
        .map(|s| {
            text(status)
                .eq(lit(s))
                .cast(DataType::UInt32)
                .sum()
                .alias(s)
        })
        .collect();
    Ok(rows.group_by_stable([col(responsible)]).agg(aggs).collect()?)
}

/// Rows from the target year whose instruction is complete and that have
/// no assignee yet.
pub fn queue_predicate(config: &DashboardConfig) -> Expr {
    let c = &config.columns;
    col(c.year.as_str())
        .cast(DataType::Float64)
        .eq(lit(config.queue.target_year as f64))
        .and(text(&c.process_complete).eq(lit(config.queue.flag_value.as_str())))
        .and(is_missing(&c.assignee))
}

pub fn queue_columns(config: &DashboardConfig) -> Vec<&str> {
    let c = &config.columns;
    let mut out = vec![c.project_title.as_str(), c.process_number.as_str()];
    if config.queue.variant.queue_includes_sanfom() {
        out.push(c.sanfom.as_str());
    }
    out
}

pub fn distribution_queue(
    dataset: &Dataset,
    config: &DashboardConfig,
) -> Result<FilteredView, PainelError> {
    let c = &config.columns;
    let output = queue_columns(config);
    let mut required = vec![c.year.as_str(), c.process_complete.as_str(), c.assignee.as_str()];
    required.extend(output.iter().copied());
    dataset.require(VIEW_QUEUE, &required)?;

    let frame = dataset
        .frame()
        .clone()
        .lazy()
        .filter(queue_predicate(config))
        .select(output.iter().map(|name| col(*name)).collect::<Vec<_>>())
        .collect()?;
    Ok(FilteredView { frame })
}

fn listing_columns(config: &DashboardConfig) -> [&str; 3] {
    let c = &config.columns;
    [
        c.process_number.as_str(),
        c.project_title.as_str(),
        c.sanfom.as_str(),
    ]
}

/// Rows whose expiry date parses and lies strictly before `reference`.
pub fn expired_compliance(
    dataset: &Dataset,
    config: &DashboardConfig,
    reference: NaiveDateTime,
) -> Result<FilteredView, PainelError> {
    let date = config.columns.expiry_date.as_str();
    let output = listing_columns(config);
    let mut required = vec![date];
    required.extend(output);
    dataset.require(VIEW_EXPIRED, &required)?;

    let dates = dataset.parsed_dates(date)?;
    let mask: Vec<bool> = dates
        .iter()
        .map(|d| d.is_some_and(|d| d < reference))
        .collect();
    let mask = BooleanChunked::from_slice(PlSmallStr::from_static("expired"), &mask);
    let frame = dataset.frame().filter(&mask)?.select(output)?;
    Ok(FilteredView { frame })
}

/// Distinct analysts in first-appearance order, without missing values.
pub fn analyst_choices(
    dataset: &Dataset,
    config: &DashboardConfig,
) -> Result<Vec<String>, PainelError> {
    let analyst = config.columns.analyst.as_str();
    dataset.require(VIEW_ANALYST, &[analyst])?;

    let values = dataset.frame().column(analyst)?.cast(&DataType::String)?;
    let mut seen = HashSet::new();
    let choices = values
        .str()?
        .into_iter()
        .flatten()
        .filter(|v| !v.is_empty() && seen.insert(*v))
        .map(str::to_string)
        .collect();
    Ok(choices)
}

pub fn select_analyst(
    dataset: &Dataset,
    config: &DashboardConfig,
    selection: &AnalystSelection,
) -> Result<FilteredView, PainelError> {
    let analyst = config.columns.analyst.as_str();
    let output = listing_columns(config);
    let mut required = vec![analyst];
    required.extend(output);
    dataset.require(VIEW_ANALYST, &required)?;

    let assigned = is_missing(analyst).not();
    let predicate = match selection {
        AnalystSelection::All if config.analyst.include_unassigned => lit(true),
        AnalystSelection::All => assigned,
        AnalystSelection::Only(name) => assigned.and(text(analyst).eq(lit(name.as_str()))),
    };
    let frame = dataset
        .frame()
        .clone()
        .lazy()
        .filter(predicate)
        .select(output.map(col))
        .collect()?;
    Ok(FilteredView { frame })
}

/// Everything the renderer shows for one dataset. Each view fails on its own.
#[derive(Debug)]
pub struct DashboardViews {
    pub summary: DatasetSummary,
    pub status: Result<CategoryCount, PainelError>,
    pub breakdown: Result<DataFrame, PainelError>,
    pub queue: Result<FilteredView, PainelError>,
    pub expired: Result<FilteredView, PainelError>,
    pub analyst_choices: Result<Vec<String>, PainelError>,
    pub analyst: Result<FilteredView, PainelError>,
    pub computed_at: NaiveDateTime,
}

impl DashboardViews {
    pub fn compute(
        dataset: &Dataset,
        config: &DashboardConfig,
        selection: &AnalystSelection,
        now: NaiveDateTime,
    ) -> Self {
        let views = Self {
            summary: summarize(dataset),
            status: status_counts(dataset, config),
            breakdown: responsible_breakdown(dataset, config),
            queue: distribution_queue(dataset, config),
            expired: expired_compliance(dataset, config, now),
            analyst_choices: analyst_choices(dataset, config),
            analyst: select_analyst(dataset, config, selection),
            computed_at: now,
        };
        views.log();
        views
    }

    fn log(&self) {
        match &self.status {
            Ok(c) => debug!("{VIEW_STATUS}: {:?}", c),
            Err(e) => warn!("{e}"),
        }
        match &self.breakdown {
            Ok(f) => debug!("{VIEW_BREAKDOWN}: {} responsible parties", f.height()),
            Err(e) => warn!("{e}"),
        }
        for (view, result) in [
            (VIEW_QUEUE, &self.queue),
            (VIEW_EXPIRED, &self.expired),
            (VIEW_ANALYST, &self.analyst),
        ] {
            match result {
                Ok(v) => debug!("{view}: {} rows", v.count()),
                Err(e) => warn!("{e}"),
            }
        }
    }
}
