//! Typed hypercube structures.
//!
//! Outgoing definitions (`qHyperCubeDef` and friends) are built from these
//! structs rather than from ad hoc JSON. Incoming layouts and data pages are
//! deserialized leniently: the Engine omits `false`, `0` and empty values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object type used for the session objects this client creates.
pub const HYPERCUBE_OBJECT_TYPE: &str = "qengine-hypercube";

/// Path of the hypercube definition inside generic object properties.
pub const HYPERCUBE_DEF_PATH: &str = "/qHyperCubeDef";

/// The Engine refuses data pages larger than this many cells.
pub const MAX_CELLS_PER_PAGE: u32 = 10_000;

/// Sort flags of one dimension or measure. `1` ascending, `-1` descending, `0` off.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortCriteria {
    #[serde(rename = "qSortByState")]
    pub by_state: i8,
    #[serde(rename = "qSortByFrequency")]
    pub by_frequency: i8,
    #[serde(rename = "qSortByNumeric")]
    pub by_numeric: i8,
    #[serde(rename = "qSortByAscii")]
    pub by_ascii: i8,
    #[serde(rename = "qSortByLoadOrder")]
    pub by_load_order: i8,
    #[serde(rename = "qSortByExpression")]
    pub by_expression: i8,
}

impl SortCriteria {
    /// Natural row order of the data model.
    pub fn load_order() -> Self {
        Self {
            by_load_order: 1,
            ..Self::default()
        }
    }

    /// Value order in `direction` (1 or -1), load order breaking ties.
    pub fn by_value(direction: i8) -> Self {
        Self {
            by_numeric: direction,
            by_ascii: direction,
            by_load_order: 1,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InlineDimensionDef {
    #[serde(rename = "qFieldDefs")]
    pub field_defs: Vec<String>,
    #[serde(rename = "qFieldLabels")]
    pub field_labels: Vec<String>,
    #[serde(rename = "qSortCriterias")]
    pub sort_criterias: Vec<SortCriteria>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NxDimension {
    #[serde(rename = "qDef")]
    pub def: InlineDimensionDef,
    #[serde(rename = "qNullSuppression")]
    pub null_suppression: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InlineMeasureDef {
    #[serde(rename = "qDef")]
    pub expression: String,
    #[serde(rename = "qLabel")]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NxMeasure {
    #[serde(rename = "qDef")]
    pub def: InlineMeasureDef,
    #[serde(rename = "qSortBy")]
    pub sort_by: SortCriteria,
}

/// Rectangular window over a hypercube.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NxPage {
    #[serde(rename = "qTop", default)]
    pub top: u32,
    #[serde(rename = "qLeft", default)]
    pub left: u32,
    #[serde(rename = "qWidth", default)]
    pub width: u32,
    #[serde(rename = "qHeight", default)]
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HyperCubeDef {
    #[serde(rename = "qStateName", skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,
    #[serde(rename = "qDimensions")]
    pub dimensions: Vec<NxDimension>,
    #[serde(rename = "qMeasures")]
    pub measures: Vec<NxMeasure>,
    #[serde(rename = "qInterColumnSortOrder")]
    pub inter_column_sort_order: Vec<usize>,
    #[serde(rename = "qSuppressZero")]
    pub suppress_zero: bool,
    #[serde(rename = "qSuppressMissing")]
    pub suppress_missing: bool,
    /// `"S"` is the straight (table) mode.
    #[serde(rename = "qMode")]
    pub mode: String,
    #[serde(rename = "qInitialDataFetch")]
    pub initial_data_fetch: Vec<NxPage>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NxInfo {
    #[serde(rename = "qId")]
    pub id: String,
    #[serde(rename = "qType")]
    pub object_type: String,
}

/// Properties passed to `CreateSessionObject`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HyperCubeObjectProperties {
    #[serde(rename = "qInfo")]
    pub info: NxInfo,
    #[serde(rename = "qHyperCubeDef")]
    pub hypercube_def: HyperCubeDef,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct CubeSize {
    #[serde(default)]
    pub qcx: u32,
    #[serde(default)]
    pub qcy: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NxDimensionInfo {
    #[serde(rename = "qFallbackTitle", default)]
    pub fallback_title: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NxMeasureInfo {
    #[serde(rename = "qFallbackTitle", default)]
    pub fallback_title: String,
}

/// `qHyperCube` section of an object layout.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct HyperCubeLayout {
    #[serde(rename = "qSize", default)]
    pub size: CubeSize,
    #[serde(rename = "qDimensionInfo", default)]
    pub dimension_info: Vec<NxDimensionInfo>,
    #[serde(rename = "qMeasureInfo", default)]
    pub measure_info: Vec<NxMeasureInfo>,
    #[serde(rename = "qStateName", default)]
    pub state_name: Option<String>,
}

impl HyperCubeLayout {
    pub fn column_titles(&self) -> Vec<String> {
        self.dimension_info
            .iter()
            .map(|d| d.fallback_title.clone())
            .chain(self.measure_info.iter().map(|m| m.fallback_title.clone()))
            .collect()
    }
}

/// One cell of a data matrix, in its dual text/number form.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NxCell {
    #[serde(rename = "qText", default)]
    pub text: Option<String>,
    /// A JSON number, or the string `"NaN"` when the value has no numeric form.
    #[serde(rename = "qNum", default)]
    pub num: Option<Value>,
    #[serde(rename = "qElemNumber", default)]
    pub elem_number: i64,
    #[serde(rename = "qState", default)]
    pub state: Option<String>,
    #[serde(rename = "qIsNull", default)]
    pub is_null: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NxDataPage {
    #[serde(rename = "qMatrix", default)]
    pub matrix: Vec<Vec<NxCell>>,
    #[serde(rename = "qArea", default)]
    pub area: NxPage,
}
