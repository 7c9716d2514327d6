//! Result shape of `GetTablesAndKeys`.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TablesAndKeys {
    #[serde(default)]
    pub qtr: Vec<TableRecord>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TableRecord {
    #[serde(rename = "qName", default)]
    pub name: String,
    #[serde(rename = "qNoOfRows", default)]
    pub row_count: u64,
    #[serde(rename = "qIsSystem", default)]
    pub is_system: bool,
    #[serde(rename = "qFields", default)]
    pub fields: Vec<FieldInTable>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FieldInTable {
    #[serde(rename = "qName", default)]
    pub name: String,
    #[serde(rename = "qIsKey", default)]
    pub is_key: bool,
    #[serde(rename = "qIsSystem", default)]
    pub is_system: bool,
    #[serde(rename = "qIsHidden", default)]
    pub is_hidden: bool,
    #[serde(rename = "qnTotalDistinctValues", default)]
    pub total_distinct_values: u64,
    #[serde(rename = "qnRows", default)]
    pub rows: u64,
    #[serde(rename = "qTags", default)]
    pub tags: Vec<String>,
}
