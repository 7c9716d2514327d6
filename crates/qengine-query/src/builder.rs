//! Turns a [`TablePageRequest`] into a validated hypercube query.
//!
//! Everything here is synchronous and runs before a session is opened, so a
//! request that names an unknown field never reaches the network.

use std::collections::HashSet;

use qengine_common::protocol::error::{QengineError, Result};
use qengine_common::protocol::hypercube::{
    HyperCubeDef, HyperCubeObjectProperties, InlineDimensionDef, InlineMeasureDef, NxDimension,
    NxInfo, NxMeasure, SortCriteria, HYPERCUBE_OBJECT_TYPE, MAX_CELLS_PER_PAGE,
};

use crate::metadata::AppMetadata;
use crate::request::{Filter, Measure, QueryMode, Sort, TablePageRequest};

/// Straight table mode.
const STRAIGHT_MODE: &str = "S";

/// The columns a query produces.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryShape {
    /// One dimension per column, one row per data-model row.
    Flat { columns: Vec<String> },
    /// One dimension per grouping field plus the measures.
    Aggregated {
        group_by: Vec<String>,
        measures: Vec<Measure>,
    },
}

/// An immutable, validated query over one table.
#[derive(Debug, Clone, PartialEq)]
pub struct HypercubeQuery {
    pub table: String,
    pub shape: QueryShape,
    pub filter: Option<Filter>,
    pub sort: Option<Sort>,
    pub page: u32,
    pub page_size: u32,
}

/// Reject a page or page size outside `1..` and `1..=max_page_size`.
pub fn validate_page(page: u32, page_size: u32, max_page_size: u32) -> Result<()> {
    if page == 0 {
        return Err(QengineError::validation("page must be >= 1"));
    }
    if page_size == 0 || page_size > max_page_size {
        return Err(QengineError::validation(format!(
            "page_size must be between 1 and {}, got {}",
            max_page_size, page_size
        )));
    }
    Ok(())
}

impl HypercubeQuery {
    /// Validate `request` against `metadata` and fix the query shape.
    ///
    /// `table` is the resolved data-model table name.
    pub fn build(request: &TablePageRequest, table: &str, metadata: &AppMetadata) -> Result<Self> {
        let shape_table = metadata.table(table).ok_or_else(|| {
            QengineError::NotFound(format!(
                "table '{}' not found in app {}",
                table, metadata.app_id
            ))
        })?;

        let mode = match (request.mode, request.measures.is_empty()) {
            (Some(QueryMode::Flat), false) => {
                return Err(QengineError::validation(
                    "measures cannot be combined with a flat listing",
                ))
            }
            (Some(QueryMode::Aggregated), true) => {
                return Err(QengineError::validation(
                    "an aggregated query needs at least one measure",
                ))
            }
            (Some(mode), _) => mode,
            (None, true) => QueryMode::Flat,
            (None, false) => QueryMode::Aggregated,
        };

        let dimensions = match mode {
            QueryMode::Flat if request.columns.is_empty() => shape_table.fields.clone(),
            _ => request.columns.clone(),
        };

        let mut seen = HashSet::new();
        for column in &dimensions {
            if metadata.field(column).is_none() {
                return Err(QengineError::validation(format!(
                    "unknown column '{}'",
                    column
                )));
            }
            if !seen.insert(column.as_str()) {
                return Err(QengineError::validation(format!(
                    "column '{}' listed twice",
                    column
                )));
            }
        }

        for measure in &request.measures {
            if measure.expression.trim().is_empty() {
                return Err(QengineError::validation("measure expression is empty"));
            }
        }

        if let Some(filter) = &request.filter {
            if metadata.field(&filter.field).is_none() {
                return Err(QengineError::validation(format!(
                    "unknown filter field '{}'",
                    filter.field
                )));
            }
            if filter.values.is_empty() {
                return Err(QengineError::validation(format!(
                    "filter on '{}' has no values",
                    filter.field
                )));
            }
        }

        if let Some(sort) = &request.sort {
            if metadata.field(&sort.field).is_none() {
                return Err(QengineError::validation(format!(
                    "unknown sort field '{}'",
                    sort.field
                )));
            }
            if !dimensions.contains(&sort.field) {
                return Err(QengineError::validation(format!(
                    "sort field '{}' is not one of the query's columns",
                    sort.field
                )));
            }
        }

        let width = dimensions.len() + request.measures.len();
        if width == 0 {
            return Err(QengineError::validation(format!(
                "table '{}' has no columns to read",
                table
            )));
        }
        if width > MAX_CELLS_PER_PAGE as usize {
            return Err(QengineError::validation(format!(
                "{} columns exceed the Engine's {} cells per page",
                width, MAX_CELLS_PER_PAGE
            )));
        }

        let shape = match mode {
            QueryMode::Flat => QueryShape::Flat {
                columns: dimensions,
            },
            QueryMode::Aggregated => QueryShape::Aggregated {
                group_by: dimensions,
                measures: request.measures.clone(),
            },
        };

        Ok(Self {
            table: table.to_string(),
            shape,
            filter: request.filter.clone(),
            sort: request.sort.clone(),
            page: request.page,
            page_size: request.page_size,
        })
    }

    pub fn dimensions(&self) -> &[String] {
        match &self.shape {
            QueryShape::Flat { columns } => columns,
            QueryShape::Aggregated { group_by, .. } => group_by,
        }
    }

    pub fn measures(&self) -> &[Measure] {
        match &self.shape {
            QueryShape::Flat { .. } => &[],
            QueryShape::Aggregated { measures, .. } => measures,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.shape, QueryShape::Flat { .. })
    }

    /// Number of columns per row.
    pub fn width(&self) -> u32 {
        (self.dimensions().len() + self.measures().len()) as u32
    }

    /// Column labels in output order.
    pub fn labels(&self) -> Vec<String> {
        self.dimensions()
            .iter()
            .cloned()
            .chain(self.measures().iter().map(|m| m.label.clone()))
            .collect()
    }

    /// The `qHyperCubeDef` for this query, bound to `state_name` when given.
    pub fn definition(&self, state_name: Option<&str>) -> HyperCubeDef {
        let sort_column = self
            .sort
            .as_ref()
            .and_then(|sort| self.dimensions().iter().position(|d| *d == sort.field));

        let dimensions = self
            .dimensions()
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let criteria = match (&self.sort, sort_column) {
                    (Some(sort), Some(column)) if column == i => {
                        SortCriteria::by_value(sort.order.direction())
                    }
                    _ => SortCriteria::load_order(),
                };
                NxDimension {
                    def: InlineDimensionDef {
                        field_defs: vec![field.clone()],
                        field_labels: vec![field.clone()],
                        sort_criterias: vec![criteria],
                    },
                    null_suppression: false,
                }
            })
            .collect();

        let measures = self
            .measures()
            .iter()
            .map(|measure| NxMeasure {
                def: InlineMeasureDef {
                    expression: measure.expression.clone(),
                    label: measure.label.clone(),
                },
                sort_by: SortCriteria::default(),
            })
            .collect();

        let mut order: Vec<usize> = (0..self.width() as usize).collect();
        if let Some(column) = sort_column {
            order.retain(|&i| i != column);
            order.insert(0, column);
        }

        HyperCubeDef {
            state_name: state_name.map(str::to_string),
            dimensions,
            measures,
            inter_column_sort_order: order,
            suppress_zero: false,
            suppress_missing: !self.is_flat(),
            mode: STRAIGHT_MODE.to_string(),
            initial_data_fetch: Vec::new(),
        }
    }

    /// Session object properties carrying [`definition`](Self::definition).
    pub fn object_properties(
        &self,
        object_id: &str,
        state_name: Option<&str>,
    ) -> HyperCubeObjectProperties {
        HyperCubeObjectProperties {
            info: NxInfo {
                id: object_id.to_string(),
                object_type: HYPERCUBE_OBJECT_TYPE.to_string(),
            },
            hypercube_def: self.definition(state_name),
        }
    }
}
