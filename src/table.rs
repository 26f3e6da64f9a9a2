use polars::prelude::*;
use rayon::prelude::*;

use crate::views::DatasetSummary;

pub const NULL_MARKER: &str = "∅";

/// One column prepared for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

/// A frame rendered to strings, column by column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    pub columns: Vec<ColumnView>,
}

impl TableData {
    pub fn from_frame(frame: &DataFrame) -> PolarsResult<Self> {
        // Each column is converted in its own thread.
        let columns: PolarsResult<Vec<ColumnView>> = frame
            .get_columns()
            .par_iter()
            .map(load_column)
            .collect();
        Ok(Self { columns: columns? })
    }

    pub fn from_summary(summary: &DatasetSummary) -> Self {
        let names = summary.columns.iter().map(|c| c.name.clone()).collect();
        let dtypes = summary.columns.iter().map(|c| c.dtype.clone()).collect();
        let counts = summary
            .columns
            .iter()
            .map(|c| format!("{}/{}", c.non_null, summary.rows))
            .collect();
        Self {
            columns: vec![
                ColumnView::new("Coluna", names),
                ColumnView::new("Tipo", dtypes),
                ColumnView::new("Preenchidas", counts),
            ],
        }
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn row(&self, idx: usize) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.data.get(idx).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

impl ColumnView {
    fn new(name: &str, data: Vec<String>) -> Self {
        let width = data
            .iter()
            .map(|s| s.chars().count())
            .chain(std::iter::once(name.chars().count()))
            .max()
            .unwrap_or(0);
        Self {
            name: name.to_string(),
            width,
            data,
        }
    }
}

fn load_column(column: &Column) -> PolarsResult<ColumnView> {
    let values = column.cast(&DataType::String)?;
    let data = values
        .str()?
        .into_iter()
        .map(|value| match value {
            Some(s) => s.replace("\r\n", " ↵ ").replace('\n', " ↵ "),
            None => NULL_MARKER.to_string(),
        })
        .collect();
    Ok(ColumnView::new(column.name().as_str(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::ColumnSummary;

    #[test]
    fn nulls_and_newlines_are_rendered() {
        let frame = df!(
            "Nº PROCESSO" => [Some("001\n2024"), None],
            "Ano-Sanfom" => [2024i64, 2023]
        )
        .unwrap();
        let table = TableData::from_frame(&frame).unwrap();

        assert_eq!(table.nrows(), 2);
        assert_eq!(table.headers().collect::<Vec<_>>(), vec!["Nº PROCESSO", "Ano-Sanfom"]);
        assert_eq!(table.row(0), vec!["001 ↵ 2024", "2024"]);
        assert_eq!(table.row(1), vec![NULL_MARKER, "2023"]);
        // Width counts characters, not bytes.
        assert_eq!(table.columns[0].width, 11);
    }

    #[test]
    fn summary_table_lists_columns() {
        let summary = DatasetSummary {
            rows: 4,
            columns: vec![ColumnSummary {
                name: "ANALISTA".into(),
                dtype: "str".into(),
                non_null: 3,
            }],
        };
        let table = TableData::from_summary(&summary);
        assert_eq!(table.row(0), vec!["ANALISTA", "str", "3/4"]);
        assert_eq!(table.row(5), vec!["", "", ""]);
    }
}
