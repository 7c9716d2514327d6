//! Mapping caller-facing names onto Engine identifiers.

use std::collections::HashMap;
use std::path::Path;

use qengine_common::protocol::error::{QengineError, Result};
use serde::{Deserialize, Serialize};

/// Where a caller's table name points inside an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTarget {
    /// Data-model table read through a generated hypercube.
    pub table: String,
    /// Existing object to read first, when one is configured.
    pub object_id: Option<String>,
}

impl TableTarget {
    pub fn model(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            object_id: None,
        }
    }
}

/// One configured app.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AppEntry {
    pub name: String,
    pub id: String,
}

/// Turns app and table names into the ids the Engine knows them by.
pub trait IdentifierResolver: Send + Sync {
    fn resolve_app_id(&self, app_name: &str) -> Result<String>;

    /// Object and data-model table behind `table_name` within `app_id`.
    fn resolve_object_id(&self, app_id: &str, table_name: &str) -> Result<TableTarget>;

    /// Table name read when a caller names only the app.
    fn default_table(&self, _app_id: &str) -> Option<String> {
        None
    }

    /// Configured apps, sorted by name.
    fn apps(&self) -> Vec<AppEntry> {
        Vec::new()
    }
}

/// A mapping file:
///
/// ```json
/// {
///   "apps": {"Sales Analysis": "0b8e-4c1f"},
///   "tables": {"Sales Analysis": {"staff": "Employees"}},
///   "objects": {"Sales Analysis": {"staff": "dvWAj"}},
///   "defaults": {"Sales Analysis": "staff"}
/// }
/// ```
///
/// Every section is optional, and the per-app sections may be keyed by app
/// name or by app id.
#[derive(Debug, Default, Deserialize)]
struct MappingFile {
    #[serde(default)]
    apps: HashMap<String, String>,
    #[serde(default)]
    tables: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    objects: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    defaults: HashMap<String, String>,
}

/// Fixed name maps, loaded once.
///
/// App names resolve through `apps`; a name that is already one of the
/// mapped ids resolves to itself. In pass-through mode every unmapped name
/// is taken to be an id. Unmapped table names are the model table names.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    apps: HashMap<String, String>,
    /// Keyed by app id.
    tables: HashMap<String, HashMap<String, String>>,
    /// Keyed by app id.
    objects: HashMap<String, HashMap<String, String>>,
    /// Keyed by app id.
    defaults: HashMap<String, String>,
    passthrough: bool,
}

impl StaticResolver {
    pub fn new(
        apps: HashMap<String, String>,
        tables: HashMap<String, HashMap<String, String>>,
    ) -> Self {
        let tables = by_app_id(&apps, tables);
        Self {
            apps,
            tables,
            ..Self::default()
        }
    }

    /// Treat every app name as an id.
    pub fn passthrough() -> Self {
        Self {
            passthrough: true,
            ..Self::default()
        }
    }

    pub fn with_passthrough(mut self, passthrough: bool) -> Self {
        self.passthrough = passthrough;
        self
    }

    /// Existing objects to read for table names, per app.
    pub fn with_objects(mut self, objects: HashMap<String, HashMap<String, String>>) -> Self {
        self.objects = by_app_id(&self.apps, objects);
        self
    }

    /// Default table name per app.
    pub fn with_defaults(mut self, defaults: HashMap<String, String>) -> Self {
        self.defaults = by_app_id(&self.apps, defaults);
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let file: MappingFile = serde_json::from_str(text)
            .map_err(|e| QengineError::Config(format!("invalid mapping file: {}", e)))?;
        Ok(Self::new(file.apps, file.tables)
            .with_objects(file.objects)
            .with_defaults(file.defaults))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            QengineError::Config(format!("cannot read mappings {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// App map from `APP_MAPPINGS_JSON` and default tables from
    /// `DEFAULT_TABLE_MAPPINGS_JSON`; pass-through when the app map is unset.
    pub fn from_env() -> Result<Self> {
        let defaults = match std::env::var("DEFAULT_TABLE_MAPPINGS_JSON") {
            Ok(text) => env_map("DEFAULT_TABLE_MAPPINGS_JSON", &text)?,
            Err(_) => HashMap::new(),
        };
        let resolver = match std::env::var("APP_MAPPINGS_JSON") {
            Ok(text) => Self::new(env_map("APP_MAPPINGS_JSON", &text)?, HashMap::new()),
            Err(_) => Self::passthrough(),
        };
        Ok(resolver.with_defaults(defaults))
    }
}

fn env_map(name: &str, text: &str) -> Result<HashMap<String, String>> {
    serde_json::from_str(text)
        .map_err(|e| QengineError::Config(format!("{} is not a JSON object: {}", name, e)))
}

/// Re-key a per-app map from app names to app ids.
fn by_app_id<V>(apps: &HashMap<String, String>, map: HashMap<String, V>) -> HashMap<String, V> {
    map.into_iter()
        .map(|(app, value)| (apps.get(&app).cloned().unwrap_or(app), value))
        .collect()
}

impl IdentifierResolver for StaticResolver {
    fn resolve_app_id(&self, app_name: &str) -> Result<String> {
        if let Some(id) = self.apps.get(app_name) {
            return Ok(id.clone());
        }
        if self.passthrough || self.apps.values().any(|id| id == app_name) {
            return Ok(app_name.to_string());
        }
        Err(QengineError::NotFound(format!("app '{}'", app_name)))
    }

    fn resolve_object_id(&self, app_id: &str, table_name: &str) -> Result<TableTarget> {
        if table_name.trim().is_empty() {
            return Err(QengineError::validation("table name is empty"));
        }
        let table = self
            .tables
            .get(app_id)
            .and_then(|map| map.get(table_name))
            .cloned()
            .unwrap_or_else(|| table_name.to_string());
        let object_id = self
            .objects
            .get(app_id)
            .and_then(|map| map.get(table_name))
            .cloned();
        Ok(TableTarget { table, object_id })
    }

    fn default_table(&self, app_id: &str) -> Option<String> {
        self.defaults.get(app_id).cloned()
    }

    fn apps(&self) -> Vec<AppEntry> {
        let mut apps: Vec<AppEntry> = self
            .apps
            .iter()
            .map(|(name, id)| AppEntry {
                name: name.clone(),
                id: id.clone(),
            })
            .collect();
        apps.sort();
        apps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qengine_common::protocol::ErrorKind;

    fn resolver() -> StaticResolver {
        StaticResolver::from_json(
            r#"{
                "apps": {"Sales Analysis": "0b8e-4c1f", "Finance": "77aa-0f01"},
                "tables": {"Sales Analysis": {"staff": "Employees"}},
                "objects": {"0b8e-4c1f": {"staff": "dvWAj"}},
                "defaults": {"Sales Analysis": "staff"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_app() {
        let resolver = resolver();
        assert_eq!(resolver.resolve_app_id("Sales Analysis").unwrap(), "0b8e-4c1f");
        assert_eq!(resolver.resolve_app_id("0b8e-4c1f").unwrap(), "0b8e-4c1f");
        assert_eq!(
            resolver.resolve_app_id("Payroll").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            resolver.with_passthrough(true).resolve_app_id("Payroll").unwrap(),
            "Payroll"
        );
    }

    #[test]
    fn test_resolve_table() {
        let resolver = resolver();
        assert_eq!(
            resolver.resolve_object_id("0b8e-4c1f", "staff").unwrap(),
            TableTarget {
                table: "Employees".into(),
                object_id: Some("dvWAj".into()),
            }
        );
        assert_eq!(
            resolver.resolve_object_id("0b8e-4c1f", "Sales").unwrap(),
            TableTarget::model("Sales")
        );
        assert_eq!(
            resolver.resolve_object_id("77aa-0f01", "staff").unwrap(),
            TableTarget::model("staff")
        );
        assert!(resolver.resolve_object_id("0b8e-4c1f", " ").is_err());
    }

    #[test]
    fn test_default_table_and_app_listing() {
        let resolver = resolver();
        assert_eq!(resolver.default_table("0b8e-4c1f").as_deref(), Some("staff"));
        assert_eq!(resolver.default_table("77aa-0f01"), None);
        let apps: Vec<(String, String)> =
            resolver.apps().into_iter().map(|app| (app.name, app.id)).collect();
        assert_eq!(
            apps,
            vec![
                ("Finance".to_string(), "77aa-0f01".to_string()),
                ("Sales Analysis".to_string(), "0b8e-4c1f".to_string()),
            ]
        );
        assert!(StaticResolver::passthrough().apps().is_empty());
    }

    #[test]
    fn test_invalid_mapping_is_config_error() {
        let err = StaticResolver::from_json("[1, 2]").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = env_map("DEFAULT_TABLE_MAPPINGS_JSON", "\"Employees\"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
