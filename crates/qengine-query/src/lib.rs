//! Paged table reads over Engine hypercubes.
//!
//! A [`TablePageRequest`] names an app, a table, a page and optionally a
//! filter, a sort, a column list or measures. [`QueryEngine`] resolves the
//! names, checks the request against cached [`AppMetadata`], builds a
//! hypercube, and reads just the requested rows into a [`DataPage`].
//!
//! ```text
//! TablePageRequest
//!   -> IdentifierResolver   (app name -> app id, table -> object or model table)
//!   -> GetObject            (configured object, read as is when the request is unshaped)
//!   -> MetadataCache        (fields and tables, TTL, single-flight)
//!   -> HypercubeQuery       (validation + qHyperCubeDef)
//!   -> Session              (OpenDoc, alternate state, CreateSessionObject)
//!   -> Pager                (GetLayout, GetHyperCubeData windows)
//!   -> DataPage
//! ```

pub mod builder;
pub mod engine;
pub mod metadata;
pub mod pager;
pub mod request;
pub mod resolver;
pub mod state;

pub use builder::{validate_page, HypercubeQuery, QueryShape};
pub use engine::{QueryEngine, STATE_PREFIX};
pub use metadata::{
    AppMetadata, EngineMetadataSource, FieldMetadata, FieldType, MetadataCache, MetadataSource,
    TableShape,
};
pub use pager::{CellValue, DataPage, Pager};
pub use request::{
    Filter, Measure, QueryMode, Sort, SortOrder, TablePageRequest, DEFAULT_PAGE_SIZE,
};
pub use resolver::{AppEntry, IdentifierResolver, StaticResolver, TableTarget};
pub use state::{FetchState, FetchTracker};
