//! Typed Engine API calls on top of a [`Session`].
//!
//! Handles borrow the session they were opened on, so an [`ObjectHandle`]
//! can never outlive its [`AppHandle`]'s connection.

use std::time::Instant;

use qengine_common::protocol::envelope::APP_ALREADY_OPEN;
use qengine_common::protocol::error::{QengineError, Result};
use qengine_common::protocol::hypercube::{
    HyperCubeLayout, HyperCubeObjectProperties, NxDataPage, NxPage, HYPERCUBE_DEF_PATH,
};
use qengine_common::protocol::tables::TablesAndKeys;
use qengine_common::protocol::{Handle, GLOBAL_HANDLE};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::session::Session;

/// Largest window requested from `GetTablesAndKeys`.
const TABLES_WINDOW: u32 = 1000;
/// Maximum number of tables `GetTablesAndKeys` reports.
const TABLES_LIMIT: u32 = 30;

/// An application opened on a session.
#[derive(Debug)]
pub struct AppHandle<'s> {
    session: &'s Session,
    app_id: String,
    handle: Handle,
    opened_at: Instant,
}

/// A generic object inside an opened application.
#[derive(Debug)]
pub struct ObjectHandle<'s> {
    session: &'s Session,
    object_id: String,
    handle: Handle,
}

/// A field object, optionally bound to an alternate state.
#[derive(Debug)]
pub struct FieldHandle<'s> {
    session: &'s Session,
    name: String,
    handle: Handle,
}

impl Session {
    /// Open `app_id` with `OpenDoc`.
    ///
    /// Without `load_data` only the data model is opened, which is enough for
    /// metadata. If the app is already open in this session, the Engine
    /// answers with error 1002 and the active document is used instead, but
    /// only when it is `app_id`; otherwise the 1002 error is returned.
    pub async fn open_app(&self, app_id: &str, load_data: bool) -> Result<AppHandle<'_>> {
        let params = if load_data {
            json!([app_id])
        } else {
            json!([app_id, "", "", "", true])
        };

        let result = match self.call(GLOBAL_HANDLE, "OpenDoc", params).await {
            Ok(result) => result,
            Err(e) if e.engine_code() == Some(APP_ALREADY_OPEN) => {
                let active = self.call(GLOBAL_HANDLE, "GetActiveDoc", json!([])).await?;
                let active_id = active["qReturn"]["qGenericId"].as_str();
                if active_id != Some(app_id) {
                    tracing::warn!(
                        app_id,
                        active = ?active_id,
                        "Another app is active in this session"
                    );
                    return Err(e);
                }
                tracing::debug!(app_id, "App already open, using active document");
                active
            }
            Err(e) => return Err(e),
        };

        let handle = return_handle(&result, "OpenDoc")?;
        tracing::debug!(app_id, handle, "App opened");

        Ok(AppHandle {
            session: self,
            app_id: app_id.to_string(),
            handle,
            opened_at: Instant::now(),
        })
    }
}

impl<'s> AppHandle<'s> {
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Data-model tables and their fields, system tables included and
    /// hidden fields left out.
    pub async fn tables_and_keys(&self) -> Result<TablesAndKeys> {
        let window = json!({"qcx": TABLES_WINDOW, "qcy": TABLES_WINDOW});
        let result = self
            .session
            .call(
                self.handle,
                "GetTablesAndKeys",
                json!([window, {"qcx": 0, "qcy": 0}, TABLES_LIMIT, true, false]),
            )
            .await?;
        parse(result, "GetTablesAndKeys")
    }

    pub async fn add_alternate_state(&self, name: &str) -> Result<()> {
        self.session
            .call(self.handle, "AddAlternateState", json!([name]))
            .await?;
        Ok(())
    }

    pub async fn remove_alternate_state(&self, name: &str) -> Result<()> {
        self.session
            .call(self.handle, "RemoveAlternateState", json!([name]))
            .await?;
        Ok(())
    }

    /// `field`, seen through selection state `state` (`"$"` is the default).
    pub async fn field(&self, field: &str, state: &str) -> Result<FieldHandle<'s>> {
        let result = self
            .session
            .call(self.handle, "GetField", json!([field, state]))
            .await?;
        Ok(FieldHandle {
            session: self.session,
            name: field.to_string(),
            handle: return_handle(&result, "GetField")?,
        })
    }

    /// An existing object of the app, such as a table visualization.
    pub async fn get_object(&self, object_id: &str) -> Result<ObjectHandle<'s>> {
        let result = self
            .session
            .call(self.handle, "GetObject", json!([object_id]))
            .await?;
        Ok(ObjectHandle {
            session: self.session,
            object_id: object_id.to_string(),
            handle: return_handle(&result, "GetObject")?,
        })
    }

    /// Create a hypercube session object. It lives until destroyed or until
    /// the session ends.
    pub async fn create_session_object(
        &self,
        properties: &HyperCubeObjectProperties,
    ) -> Result<ObjectHandle<'s>> {
        let result = self
            .session
            .call(self.handle, "CreateSessionObject", json!([properties]))
            .await?;
        let handle = return_handle(&result, "CreateSessionObject")?;
        let object_id = result["qReturn"]["qGenericId"]
            .as_str()
            .unwrap_or(&properties.info.id)
            .to_string();

        Ok(ObjectHandle {
            session: self.session,
            object_id,
            handle,
        })
    }

    pub async fn destroy_session_object(&self, object_id: &str) -> Result<bool> {
        let result = self
            .session
            .call(self.handle, "DestroySessionObject", json!([object_id]))
            .await?;
        Ok(result["qSuccess"].as_bool().unwrap_or(false))
    }
}

impl FieldHandle<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the field's selection with `values`, matched by text.
    ///
    /// Returns the Engine's verdict: `false` when nothing could be selected.
    pub async fn select_values(&self, values: &[String]) -> Result<bool> {
        let values: Vec<Value> = values.iter().map(|v| json!({"qText": v})).collect();
        let result = self
            .session
            .call(self.handle, "SelectValues", json!([values, false, true]))
            .await?;
        Ok(result["qReturn"].as_bool().unwrap_or(false))
    }
}

impl ObjectHandle<'_> {
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The object's hypercube layout: size and column info.
    pub async fn hypercube_layout(&self) -> Result<HyperCubeLayout> {
        let mut result = self
            .session
            .call(self.handle, "GetLayout", json!([]))
            .await?;
        let cube = result
            .get_mut("qLayout")
            .and_then(|layout| layout.get_mut("qHyperCube"))
            .map(Value::take)
            .ok_or_else(|| {
                QengineError::InvalidResponse("GetLayout: layout has no qHyperCube".into())
            })?;
        parse(cube, "GetLayout")
    }

    /// Data for each window in `pages`, in the same order.
    pub async fn hypercube_data(&self, pages: &[NxPage]) -> Result<Vec<NxDataPage>> {
        let mut result = self
            .session
            .call(
                self.handle,
                "GetHyperCubeData",
                json!([HYPERCUBE_DEF_PATH, pages]),
            )
            .await?;
        let pages = result.get_mut("qDataPages").map(Value::take).ok_or_else(|| {
            QengineError::InvalidResponse("GetHyperCubeData: result has no qDataPages".into())
        })?;
        parse(pages, "GetHyperCubeData")
    }
}

/// `qReturn.qHandle` of a call that returns an object interface.
fn return_handle(result: &Value, method: &str) -> Result<Handle> {
    result["qReturn"]["qHandle"].as_i64().ok_or_else(|| {
        QengineError::InvalidResponse(format!("{}: result has no qReturn.qHandle", method))
    })
}

fn parse<T: DeserializeOwned>(value: Value, method: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| QengineError::InvalidResponse(format!("{}: {}", method, e)))
}
