//! JSON documents printed by the subcommands.

use qengine_query::{DataPage, TablePageRequest};
use serde_json::{json, Value};

/// `{data, pagination, metadata}` for one fetched page.
///
/// `data` holds one object per row keyed by column name.
pub fn page_document(request: &TablePageRequest, page: &DataPage) -> Value {
    json!({
        "data": page.to_records(),
        "pagination": {
            "page": page.page,
            "page_size": page.page_size,
            "total_rows": page.total_rows,
            "total_pages": page.total_pages,
            "has_next": page.has_next,
            "has_previous": page.has_previous,
        },
        "metadata": {
            "app": request.app,
            "table": request.table,
            "columns": page.columns,
            "filter": request.filter,
            "sort": request.sort,
            "elapsed_ms": page.elapsed_ms(),
        },
    })
}
