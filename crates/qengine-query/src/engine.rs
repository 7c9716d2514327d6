use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use qengine_client::{AppHandle, ConnectionManager, Session};
use qengine_common::config::EngineConfig;
use qengine_common::protocol::error::{ErrorKind, QengineError, Result};
use uuid::Uuid;

use crate::builder::{validate_page, HypercubeQuery};
use crate::metadata::{EngineMetadataSource, FieldMetadata, MetadataCache, TableShape};
use crate::pager::{DataPage, Pager};
use crate::request::TablePageRequest;
use crate::resolver::{AppEntry, IdentifierResolver, TableTarget};
use crate::state::{FetchState, FetchTracker};

/// Prefix of the private selection states created for filtered reads.
pub const STATE_PREFIX: &str = "qengine-";

/// Entry point for paged table reads.
///
/// Holds the connection manager, the metadata cache, the name resolver and
/// the configuration. Build one at startup, share it by reference, and call
/// [`shutdown`](Self::shutdown) on the way out.
///
/// Every fetch runs on a session of its own: open the app, create a
/// hypercube session object, read one page, close. A table name mapped to
/// an existing object is read through that object when the request does not
/// reshape it, falling back to the data-model table if the object cannot be
/// read. A filter is applied in a
/// fresh alternate state that only this fetch's hypercube looks through, and
/// the state is removed before the session closes, so concurrent reads of
/// the same app never see each other's selections.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use qengine_common::config::EngineConfig;
/// use qengine_query::{Filter, QueryEngine, StaticResolver, TablePageRequest};
///
/// # #[tokio::main]
/// # async fn main() -> qengine_common::Result<()> {
/// let engine = QueryEngine::from_config(
///     EngineConfig::from_env()?,
///     Arc::new(StaticResolver::from_env()?),
/// )?;
///
/// let page = engine
///     .fetch_table_page(
///         TablePageRequest::new("Sales Analysis", "Employees")
///             .with_page(1, 50)
///             .with_filter(Filter::eq("Department", "Sales")),
///     )
///     .await?;
/// println!("{} of {} rows", page.rows.len(), page.total_rows);
///
/// engine.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct QueryEngine {
    config: EngineConfig,
    connections: Arc<ConnectionManager>,
    metadata: MetadataCache,
    resolver: Arc<dyn IdentifierResolver>,
    pager: Pager,
}

impl QueryEngine {
    pub fn new(
        config: EngineConfig,
        connections: Arc<ConnectionManager>,
        metadata: MetadataCache,
        resolver: Arc<dyn IdentifierResolver>,
    ) -> Self {
        let pager = Pager::new(config.max_rows_per_call);
        Self {
            config,
            connections,
            metadata,
            resolver,
            pager,
        }
    }

    /// WebSocket transport, PEM certificates and Engine-backed metadata, all
    /// from `config`.
    pub fn from_config(
        config: EngineConfig,
        resolver: Arc<dyn IdentifierResolver>,
    ) -> Result<Self> {
        config.validate()?;
        let connections = Arc::new(ConnectionManager::from_config(config.clone()));
        let metadata = MetadataCache::new(
            Arc::new(EngineMetadataSource::new(connections.clone())),
            config.metadata_ttl,
            config.metadata_capacity,
        );
        Ok(Self::new(config, connections, metadata, resolver))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Read one page of a table.
    ///
    /// Page bounds, field names and query mode are checked before any
    /// session is opened. The whole fetch is bounded by `fetch_timeout`;
    /// on expiry the session is dropped, failing whatever was in flight.
    pub async fn fetch_table_page(&self, request: TablePageRequest) -> Result<DataPage> {
        let started = Instant::now();
        let mut tracker = FetchTracker::new(request.app.clone());

        let outcome = self.bounded(self.run_fetch(&request, &mut tracker)).await;

        match outcome {
            Ok(mut page) => {
                tracker.advance(FetchState::Done);
                page.elapsed = started.elapsed();
                tracing::info!(
                    app = %request.app,
                    table = %request.table,
                    page = page.page,
                    rows = page.rows.len(),
                    total_rows = page.total_rows,
                    elapsed_ms = page.elapsed_ms(),
                    "Fetched table page"
                );
                Ok(page)
            }
            Err(e) => {
                tracker.fail(&e);
                tracing::warn!(
                    app = %request.app,
                    table = %request.table,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Table page fetch failed"
                );
                Err(e)
            }
        }
    }

    pub async fn list_fields(&self, app_name: &str) -> Result<Vec<FieldMetadata>> {
        let app_id = self.resolver.resolve_app_id(app_name)?;
        self.bounded(self.metadata.fields(&app_id)).await
    }

    pub async fn list_tables(&self, app_name: &str) -> Result<Vec<TableShape>> {
        let app_id = self.resolver.resolve_app_id(app_name)?;
        self.bounded(self.metadata.tables(&app_id)).await
    }

    /// Apps the resolver knows by name.
    pub fn list_apps(&self) -> Vec<AppEntry> {
        self.resolver.apps()
    }

    /// Table read for `app_name` when no table is named.
    pub fn default_table(&self, app_name: &str) -> Result<String> {
        let app_id = self.resolver.resolve_app_id(app_name)?;
        self.resolver.default_table(&app_id).ok_or_else(|| {
            QengineError::NotFound(format!("default table for app '{}'", app_name))
        })
    }

    /// Close any session still open.
    pub fn shutdown(&self) {
        self.connections.shutdown();
    }

    /// Run `work` under `fetch_timeout`.
    async fn bounded<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.fetch_timeout, work)
            .await
            .unwrap_or_else(|_| Err(QengineError::timeout(self.config.fetch_timeout)))
    }

    async fn run_fetch(
        &self,
        request: &TablePageRequest,
        tracker: &mut FetchTracker,
    ) -> Result<DataPage> {
        tracker.advance(FetchState::Resolving);
        validate_page(request.page, request.page_size, self.config.max_page_size)?;

        let app_id = self.resolver.resolve_app_id(&request.app)?;
        let target = self.resolver.resolve_object_id(&app_id, &request.table)?;
        if let Some(object_id) = target.object_id.as_deref() {
            if request.is_unshaped() {
                tracker.advance(FetchState::SessionAcquiring);
                let session = self.connections.acquire_session().await?;
                let outcome = self
                    .fetch_object(&session, &app_id, object_id, &target, request, tracker)
                    .await;
                session.close().await;
                return outcome;
            }
            tracing::debug!(
                table = %request.table,
                object_id,
                "Request reshapes the table, reading the model table"
            );
        }

        let metadata = self.metadata.get(&app_id).await?;
        let query = HypercubeQuery::build(request, &target.table, &metadata)?;

        tracker.advance(FetchState::SessionAcquiring);
        let session = self.connections.acquire_session().await?;

        let outcome = self.fetch_on_session(&session, &app_id, &query, tracker).await;
        session.close().await;
        outcome
    }

    /// Read a configured object as is, or the model table behind it when
    /// the object cannot be read.
    async fn fetch_object(
        &self,
        session: &Session,
        app_id: &str,
        object_id: &str,
        target: &TableTarget,
        request: &TablePageRequest,
        tracker: &mut FetchTracker,
    ) -> Result<DataPage> {
        tracker.advance(FetchState::AppOpening);
        let app = session.open_app(app_id, true).await?;

        tracker.advance(FetchState::ObjectResolving);
        let read = match app.get_object(object_id).await {
            Ok(object) => {
                self.pager
                    .fetch_object_page(&object, request.page, request.page_size)
                    .await
            }
            Err(e) => Err(e),
        };
        match read {
            Ok(page) => {
                tracker.advance(FetchState::Querying);
                tracker.advance(FetchState::Paging);
                return Ok(page);
            }
            Err(e) if matches!(e.kind(), ErrorKind::Protocol | ErrorKind::NotFound) => {
                tracing::warn!(
                    app_id,
                    object_id,
                    table = %target.table,
                    error = %e,
                    "Object unreadable, falling back to the model table"
                );
            }
            Err(e) => return Err(e),
        }

        let metadata = self.metadata.get(app_id).await?;
        let query = HypercubeQuery::build(request, &target.table, &metadata)?;
        self.query_table(&app, &query, tracker).await
    }

    async fn fetch_on_session(
        &self,
        session: &Session,
        app_id: &str,
        query: &HypercubeQuery,
        tracker: &mut FetchTracker,
    ) -> Result<DataPage> {
        tracker.advance(FetchState::AppOpening);
        let app = session.open_app(app_id, true).await?;

        tracker.advance(FetchState::ObjectResolving);
        self.query_table(&app, query, tracker).await
    }

    /// Read `query` through a fresh session object, inside a private state
    /// when it carries a filter.
    async fn query_table(
        &self,
        app: &AppHandle<'_>,
        query: &HypercubeQuery,
        tracker: &mut FetchTracker,
    ) -> Result<DataPage> {
        let state = match &query.filter {
            Some(_) => {
                let name = format!("{}{}", STATE_PREFIX, Uuid::new_v4());
                app.add_alternate_state(&name).await?;
                Some(name)
            }
            None => None,
        };

        let outcome = self
            .query_in_state(app, query, state.as_deref(), tracker)
            .await;

        if let Some(state) = &state {
            if let Err(e) = app.remove_alternate_state(state).await {
                tracing::warn!(app_id = %app.app_id(), state = %state, error = %e, "Failed to remove alternate state");
            }
        }
        outcome
    }

    async fn query_in_state(
        &self,
        app: &AppHandle<'_>,
        query: &HypercubeQuery,
        state: Option<&str>,
        tracker: &mut FetchTracker,
    ) -> Result<DataPage> {
        let object_id = format!("{}{}", STATE_PREFIX, Uuid::new_v4());
        let object = app
            .create_session_object(&query.object_properties(&object_id, state))
            .await?;

        let outcome = async {
            tracker.advance(FetchState::Querying);
            if let (Some(filter), Some(state)) = (&query.filter, state) {
                let field = app.field(&filter.field, state).await?;
                if !field.select_values(&filter.values).await? {
                    tracing::debug!(field = %filter.field, "No filter value matched");
                    tracker.advance(FetchState::Paging);
                    return Ok(DataPage::new(
                        query.labels(),
                        Vec::new(),
                        query.page,
                        query.page_size,
                        0,
                    ));
                }
            }

            tracker.advance(FetchState::Paging);
            self.pager.fetch_page(&object, query).await
        }
        .await;

        if let Err(e) = app.destroy_session_object(object.object_id()).await {
            tracing::warn!(object_id = %object.object_id(), error = %e, "Failed to destroy session object");
        }
        outcome
    }
}
