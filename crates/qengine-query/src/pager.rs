//! Windowed reads of a hypercube into [`DataPage`]s.

use std::time::{Duration, Instant};

use futures::future::try_join_all;
use qengine_client::ObjectHandle;
use qengine_common::protocol::error::{QengineError, Result};
use qengine_common::protocol::hypercube::{NxCell, NxPage, MAX_CELLS_PER_PAGE};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::builder::HypercubeQuery;

/// One unwrapped cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Null,
}

impl CellValue {
    /// Prefer a finite number, then the formatted text.
    pub fn from_cell(cell: &NxCell) -> Self {
        let number = cell
            .num
            .as_ref()
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite());

        match (number, &cell.text) {
            (Some(n), _) => CellValue::Number(n),
            (None, Some(text)) => CellValue::Text(text.clone()),
            (None, None) => CellValue::Null,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CellValue::Text(text) => Value::String(text.clone()),
            CellValue::Null => Value::Null,
        }
    }
}

/// One page of rows plus pagination facts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub page: u32,
    pub page_size: u32,
    pub total_rows: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl DataPage {
    pub fn new(
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
        page: u32,
        page_size: u32,
        total_rows: u64,
    ) -> Self {
        let total_pages = total_rows.div_ceil(u64::from(page_size.max(1)));
        Self {
            columns,
            rows,
            page,
            page_size,
            total_rows,
            total_pages,
            has_next: u64::from(page) < total_pages,
            has_previous: page > 1,
            elapsed: Duration::ZERO,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(CellValue::to_json))
                    .collect()
            })
            .collect()
    }
}

/// Largest row count one `GetHyperCubeData` call may ask for at `width`.
pub fn rows_per_call(width: u32, max_rows_per_call: u32) -> u32 {
    let by_cells = MAX_CELLS_PER_PAGE / width.max(1);
    max_rows_per_call.min(by_cells).max(1)
}

/// Split `height` rows starting at `top` into windows of at most `cap` rows.
pub fn plan_windows(top: u32, height: u32, width: u32, cap: u32) -> Vec<NxPage> {
    let cap = cap.max(1);
    let mut windows = Vec::new();
    let mut offset = 0;
    while offset < height {
        let rows = cap.min(height - offset);
        windows.push(NxPage {
            top: top + offset,
            left: 0,
            width,
            height: rows,
        });
        offset += rows;
    }
    windows
}

/// Reads one page of a hypercube object.
#[derive(Debug, Clone, Copy)]
pub struct Pager {
    max_rows_per_call: u32,
}

impl Pager {
    pub fn new(max_rows_per_call: u32) -> Self {
        Self { max_rows_per_call }
    }

    /// Fetch `query`'s page from `object`.
    ///
    /// A page past the last row is empty, not an error. Windows larger than
    /// one call can carry are split and requested together, then joined back
    /// in window order.
    pub async fn fetch_page(
        &self,
        object: &ObjectHandle<'_>,
        query: &HypercubeQuery,
    ) -> Result<DataPage> {
        let frame = PageFrame {
            page: query.page,
            page_size: query.page_size,
            width: Some(query.width()),
            labels: query.labels(),
        };
        self.read(object, frame).await
    }

    /// Fetch a page of an existing object, shaped by the object's own layout.
    pub async fn fetch_object_page(
        &self,
        object: &ObjectHandle<'_>,
        page: u32,
        page_size: u32,
    ) -> Result<DataPage> {
        let frame = PageFrame {
            page,
            page_size,
            width: None,
            labels: Vec::new(),
        };
        self.read(object, frame).await
    }

    async fn read(&self, object: &ObjectHandle<'_>, frame: PageFrame) -> Result<DataPage> {
        let started = Instant::now();
        let layout = object.hypercube_layout().await?;
        let total_rows = layout.size.qcy;
        let width = frame.width.unwrap_or(layout.size.qcx);

        let titles = layout.column_titles();
        let columns = if frame.labels.is_empty() {
            titles
        } else if titles.len() == frame.labels.len() {
            titles
                .into_iter()
                .zip(frame.labels)
                .map(|(title, label)| if title.is_empty() { label } else { title })
                .collect()
        } else {
            frame.labels
        };

        let top = u64::from(frame.page - 1) * u64::from(frame.page_size);
        if top >= total_rows {
            tracing::debug!(page = frame.page, total_rows, "Page is past the last row");
            let mut page =
                DataPage::new(columns, Vec::new(), frame.page, frame.page_size, total_rows);
            page.elapsed = started.elapsed();
            return Ok(page);
        }

        let height = u64::from(frame.page_size).min(total_rows - top) as u32;
        let top = u32::try_from(top).map_err(|_| {
            QengineError::validation(format!("row offset {} is beyond the Engine's range", top))
        })?;
        let cap = rows_per_call(width, self.max_rows_per_call);
        let windows = plan_windows(top, height, width, cap);

        tracing::debug!(
            object_id = %object.object_id(),
            top,
            height,
            width,
            calls = windows.len(),
            "Requesting hypercube data"
        );

        let chunks = try_join_all(
            windows
                .iter()
                .map(|window| object.hypercube_data(std::slice::from_ref(window))),
        )
        .await?;

        let rows: Vec<Vec<CellValue>> = chunks
            .iter()
            .flatten()
            .flat_map(|data| data.matrix.iter())
            .map(|row| row.iter().map(CellValue::from_cell).collect())
            .collect();

        let mut page = DataPage::new(columns, rows, frame.page, frame.page_size, total_rows);
        page.elapsed = started.elapsed();
        Ok(page)
    }
}

/// What one read asks of a hypercube.
struct PageFrame {
    page: u32,
    page_size: u32,
    /// Columns to request; the layout's width when unset.
    width: Option<u32>,
    /// Fallback column names, in cube order.
    labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cell(value: serde_json::Value) -> NxCell {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_cell_prefers_finite_number() {
        assert_eq!(
            CellValue::from_cell(&cell(json!({"qText": "1,234.50", "qNum": 1234.5}))),
            CellValue::Number(1234.5)
        );
        assert_eq!(
            CellValue::from_cell(&cell(json!({"qText": "Alice", "qNum": "NaN"}))),
            CellValue::Text("Alice".into())
        );
        assert_eq!(
            CellValue::from_cell(&cell(json!({"qText": "42"}))),
            CellValue::Text("42".into())
        );
        assert_eq!(
            CellValue::from_cell(&cell(json!({"qIsNull": true, "qNum": "NaN"}))),
            CellValue::Null
        );
    }

    #[test]
    fn test_pagination_math() {
        let page = DataPage::new(vec![], vec![], 5, 10, 45);
        assert_eq!(page.total_pages, 5);
        assert!(!page.has_next);
        assert!(page.has_previous);

        let first = DataPage::new(vec![], vec![], 1, 10, 45);
        assert!(first.has_next);
        assert!(!first.has_previous);

        let empty = DataPage::new(vec![], vec![], 1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }

    #[test]
    fn test_rows_per_call() {
        assert_eq!(rows_per_call(4, 10_000), 2_500);
        assert_eq!(rows_per_call(1, 10_000), 10_000);
        assert_eq!(rows_per_call(2, 100), 100);
        assert_eq!(rows_per_call(20_000, 100), 1);
    }

    #[test]
    fn test_plan_windows() {
        let windows = plan_windows(40, 25, 3, 10);
        let spans: Vec<(u32, u32)> = windows.iter().map(|w| (w.top, w.height)).collect();
        assert_eq!(spans, vec![(40, 10), (50, 10), (60, 5)]);
        assert!(windows.iter().all(|w| w.width == 3 && w.left == 0));

        assert_eq!(plan_windows(0, 5, 1, 10).len(), 1);
        assert!(plan_windows(0, 0, 1, 10).is_empty());
    }

    #[test]
    fn test_to_records() {
        let page = DataPage::new(
            vec!["Name".into(), "Age".into()],
            vec![
                vec![CellValue::Text("Alice".into()), CellValue::Number(31.0)],
                vec![CellValue::Text("Bob".into()), CellValue::Null],
            ],
            1,
            10,
            2,
        );
        let records = page.to_records();
        assert_eq!(records[0]["Name"], json!("Alice"));
        assert_eq!(records[0]["Age"], json!(31.0));
        assert_eq!(records[1]["Age"], Value::Null);

        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["rows"][0][1], json!(31.0));
        assert_eq!(value["rows"][1][1], Value::Null);
        assert!(value.get("elapsed").is_none());
    }
}
