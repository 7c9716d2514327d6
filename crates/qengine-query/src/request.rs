use std::fmt;
use std::str::FromStr;

use qengine_common::protocol::error::QengineError;
use serde::{Deserialize, Serialize};

/// Rows per page when the caller does not say.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortOrder {
    /// Engine sort direction: `1` or `-1`.
    pub fn direction(&self) -> i8 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

impl FromStr for SortOrder {
    type Err = QengineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(QengineError::validation(format!(
                "sort order must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl Sort {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

/// Keep only rows whose `field` takes one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(field: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            field: field.into(),
            values,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, vec![value.into()])
    }
}

/// An aggregation expression such as `Sum(Amount)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub expression: String,
    pub label: String,
}

impl Measure {
    pub fn new(expression: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// One row per data-model row.
    Flat,
    /// One row per distinct combination of the grouping fields.
    Aggregated,
}

/// A page of one table, as a caller asks for it.
///
/// `columns` are the listed fields in a flat read (all of the table's
/// fields when empty), or the grouping fields of an aggregated read.
///
/// ```
/// use qengine_query::{Filter, Sort, SortOrder, TablePageRequest};
///
/// let request = TablePageRequest::new("Sales Analysis", "Employees")
///     .with_page(2, 25)
///     .with_filter(Filter::eq("Department", "Sales"))
///     .with_sort(Sort::new("EmployeeID", SortOrder::Descending));
/// assert_eq!(request.page_size, 25);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePageRequest {
    pub app: String,
    pub table: String,
    pub page: u32,
    pub page_size: u32,
    #[serde(default)]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub sort: Option<Sort>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub mode: Option<QueryMode>,
}

impl TablePageRequest {
    pub fn new(app: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            table: table.into(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            filter: None,
            sort: None,
            columns: Vec::new(),
            measures: Vec::new(),
            mode: None,
        }
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_measures(mut self, measures: Vec<Measure>) -> Self {
        self.measures = measures;
        self
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// True when nothing reshapes the table: no filter, sort, column pick,
    /// measures or mode. Only such reads may use a configured object as is.
    pub fn is_unshaped(&self) -> bool {
        self.filter.is_none()
            && self.sort.is_none()
            && self.columns.is_empty()
            && self.measures.is_empty()
            && self.mode.is_none()
    }
}
