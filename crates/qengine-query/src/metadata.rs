//! Data-model metadata: what fields and tables an app has.
//!
//! Metadata is read with `GetTablesAndKeys` and cached per app id. A cold or
//! expired entry is refreshed before the caller gets an answer, and any
//! number of concurrent callers for the same app share one refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use mini_moka::sync::Cache;
use qengine_client::ConnectionManager;
use qengine_common::protocol::error::Result;
use qengine_common::protocol::tables::TablesAndKeys;
use serde::Serialize;

/// Value type of a field, derived from the Engine's `$` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Numeric,
    Integer,
    Text,
    Date,
    Timestamp,
    Mixed,
}

impl FieldType {
    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> Self {
        let has = |tag: &str| tags.iter().any(|t| t.as_ref() == tag);

        if has("$timestamp") {
            FieldType::Timestamp
        } else if has("$date") {
            FieldType::Date
        } else if has("$numeric") && has("$text") {
            FieldType::Mixed
        } else if has("$integer") {
            FieldType::Integer
        } else if has("$numeric") {
            FieldType::Numeric
        } else if has("$text") || has("$ascii") {
            FieldType::Text
        } else {
            FieldType::Mixed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMetadata {
    pub name: String,
    /// Tables the field occurs in, in model order.
    pub tables: Vec<String>,
    pub data_type: FieldType,
    /// Distinct values in the field.
    pub cardinality: u64,
    /// The field links two or more tables.
    pub is_key: bool,
    pub is_system: bool,
    pub is_hidden: bool,
    pub tags: Vec<String>,
}

/// A data-model table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableShape {
    pub name: String,
    pub row_count: u64,
    pub fields: Vec<String>,
    pub is_system: bool,
}

/// Fields and tables of one app at one point in time.
#[derive(Debug, Clone)]
pub struct AppMetadata {
    pub app_id: String,
    pub fields: Vec<FieldMetadata>,
    pub tables: Vec<TableShape>,
    pub loaded_at: Instant,
}

impl AppMetadata {
    pub fn from_tables(app_id: impl Into<String>, listing: TablesAndKeys) -> Self {
        let mut fields: Vec<FieldMetadata> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut tables = Vec::with_capacity(listing.qtr.len());

        for table in listing.qtr {
            for field in &table.fields {
                match index.get(&field.name) {
                    Some(&i) => {
                        let known = &mut fields[i];
                        known.tables.push(table.name.clone());
                        known.is_key |= field.is_key;
                        known.cardinality = known.cardinality.max(field.total_distinct_values);
                    }
                    None => {
                        index.insert(field.name.clone(), fields.len());
                        fields.push(FieldMetadata {
                            name: field.name.clone(),
                            tables: vec![table.name.clone()],
                            data_type: FieldType::from_tags(&field.tags),
                            cardinality: field.total_distinct_values,
                            is_key: field.is_key,
                            is_system: field.is_system,
                            is_hidden: field.is_hidden,
                            tags: field.tags.clone(),
                        });
                    }
                }
            }

            tables.push(TableShape {
                fields: table.fields.iter().map(|f| f.name.clone()).collect(),
                name: table.name,
                row_count: table.row_count,
                is_system: table.is_system,
            });
        }

        Self {
            app_id: app_id.into(),
            fields,
            tables,
            loaded_at: Instant::now(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn table(&self, name: &str) -> Option<&TableShape> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Where metadata comes from on a cache miss.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn load(&self, app_id: &str) -> Result<AppMetadata>;
}

/// Reads metadata from the Engine on a session of its own.
pub struct EngineMetadataSource {
    connections: Arc<ConnectionManager>,
}

impl EngineMetadataSource {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl MetadataSource for EngineMetadataSource {
    async fn load(&self, app_id: &str) -> Result<AppMetadata> {
        let session = self.connections.acquire_session().await?;
        let listing = async {
            let app = session.open_app(app_id, false).await?;
            app.tables_and_keys().await
        }
        .await;
        session.close().await;

        let metadata = AppMetadata::from_tables(app_id, listing?);
        tracing::debug!(
            app_id,
            tables = metadata.tables.len(),
            fields = metadata.fields.len(),
            "Loaded app metadata"
        );
        Ok(metadata)
    }
}

type Refresh = Shared<BoxFuture<'static, Result<Arc<AppMetadata>>>>;

/// TTL cache of [`AppMetadata`] keyed by app id, with single-flight refresh.
pub struct MetadataCache {
    source: Arc<dyn MetadataSource>,
    entries: Cache<String, Arc<AppMetadata>>,
    inflight: Arc<tokio::sync::Mutex<HashMap<String, Refresh>>>,
}

impl MetadataCache {
    pub fn new(source: Arc<dyn MetadataSource>, ttl: Duration, capacity: u64) -> Self {
        Self {
            source,
            entries: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
            inflight: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Metadata for `app_id`, refreshed first if missing or expired.
    ///
    /// A failed refresh is returned as is; nothing stale is served.
    pub async fn get(&self, app_id: &str) -> Result<Arc<AppMetadata>> {
        if let Some(metadata) = self.entries.get(&app_id.to_string()) {
            return Ok(metadata);
        }

        // The refresh clears its own in-flight entry when it completes.
        let refresh = {
            let mut inflight = self.inflight.lock().await;
            // A refresh may have landed while we waited for the lock.
            if let Some(metadata) = self.entries.get(&app_id.to_string()) {
                return Ok(metadata);
            }
            match inflight.get(app_id) {
                Some(refresh) => refresh.clone(),
                None => {
                    let refresh = self.start_refresh(app_id);
                    inflight.insert(app_id.to_string(), refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    pub async fn fields(&self, app_id: &str) -> Result<Vec<FieldMetadata>> {
        Ok(self.get(app_id).await?.fields.clone())
    }

    pub async fn tables(&self, app_id: &str) -> Result<Vec<TableShape>> {
        Ok(self.get(app_id).await?.tables.clone())
    }

    pub fn invalidate(&self, app_id: &str) {
        self.entries.invalidate(&app_id.to_string());
    }

    fn start_refresh(&self, app_id: &str) -> Refresh {
        let source = self.source.clone();
        let entries = self.entries.clone();
        let inflight = self.inflight.clone();
        let app_id = app_id.to_string();

        async move {
            tracing::debug!(app_id = %app_id, "Refreshing app metadata");
            let outcome = source.load(&app_id).await.map(Arc::new);
            if let Ok(metadata) = &outcome {
                entries.insert(app_id.clone(), metadata.clone());
            }
            inflight.lock().await.remove(&app_id);
            outcome
        }
        .boxed()
        .shared()
    }
}
