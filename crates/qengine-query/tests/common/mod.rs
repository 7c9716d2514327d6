//! An in-memory Engine serving one small app over memory duplexes.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use qengine_client::ConnectionManager;
use qengine_common::auth::PemBytesProvider;
use qengine_common::config::EngineConfig;
use qengine_common::protocol::error::Result;
use qengine_common::protocol::RpcError;
use qengine_common::transport::{memory_duplex, Connector, Duplex, Endpoint, MemoryPeer};
use qengine_query::{EngineMetadataSource, MetadataCache, QueryEngine, StaticResolver};
use serde_json::{json, Value};

pub const APP_NAME: &str = "HR";
pub const APP_ID: &str = "5a1e6f0c-hr";
pub const FIELDS: [&str; 4] = ["EmployeeID", "Name", "Department", "Salary"];
pub const DEPARTMENTS: [&str; 3] = ["Sales", "Engineering", "Support"];
/// A table visualization over `EmployeeID` and `Name`.
pub const STAFF_OBJECT: &str = "dvWAj";
/// A text object with no hypercube.
pub const NOTES_OBJECT: &str = "txt01";

/// Name mappings the fake app is reached through.
pub const MAPPINGS: &str = r#"{
    "apps": {"HR": "5a1e6f0c-hr"},
    "tables": {"HR": {"Staff": "Employees", "Roster": "Employees", "Notes": "Employees"}},
    "objects": {"HR": {"Staff": "dvWAj", "Roster": "gone1", "Notes": "txt01"}},
    "defaults": {"HR": "Staff"}
}"#;

/// Everything the fake Engine saw, across all connections.
#[derive(Debug, Default)]
pub struct Journal {
    pub connects: usize,
    pub calls: Vec<(String, Value)>,
    pub created_states: Vec<String>,
    pub live_states: HashSet<String>,
    pub live_objects: HashSet<String>,
    /// `(qTop, qHeight)` of every requested data window.
    pub windows: Vec<(u64, u64)>,
}

impl Journal {
    pub fn count(&self, method: &str) -> usize {
        self.calls.iter().filter(|(m, _)| m == method).count()
    }

    pub fn params_of(&self, method: &str) -> Vec<Value> {
        self.calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Every `GetHyperCubeData` fails with Engine error 15.
    pub fail_data: bool,
    pub data_delay: Option<Duration>,
    pub metadata_delay: Option<Duration>,
}

/// The "Employees" table: 45 rows, three departments in rotation.
pub fn employee_rows() -> Vec<Vec<Value>> {
    (1..=45u32)
        .map(|i| {
            vec![
                json!(i),
                json!(format!("Employee {:02}", i)),
                json!(DEPARTMENTS[((i - 1) % 3) as usize]),
                json!(40_000 + 1_000 * i),
            ]
        })
        .collect()
}

/// Connector that serves every session from one shared [`Model`].
pub struct FakeEngine {
    model: Arc<Model>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Self::with_faults(Faults::default())
    }

    pub fn with_faults(faults: Faults) -> Arc<Self> {
        Arc::new(Self {
            model: Arc::new(Model {
                rows: employee_rows(),
                faults,
                journal: Mutex::new(Journal::default()),
            }),
        })
    }

    pub fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.model.journal()
    }
}

pub struct Model {
    rows: Vec<Vec<Value>>,
    faults: Faults,
    journal: Mutex<Journal>,
}

impl Model {
    fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }

    async fn serve(self: Arc<Self>, mut peer: MemoryPeer) {
        let mut conn = Connection::default();
        while let Some(request) = peer.recv_request().await {
            self.journal()
                .calls
                .push((request.method.clone(), request.params.clone()));
            let sent = match self
                .answer(&mut conn, &request.method, request.handle, &request.params)
                .await
            {
                Ok(result) => peer.reply(request.id, result),
                Err(error) => peer.reply_error(request.id, error),
            };
            if sent.is_err() {
                break;
            }
        }
    }

    async fn answer(
        &self,
        conn: &mut Connection,
        method: &str,
        handle: i64,
        params: &Value,
    ) -> std::result::Result<Value, RpcError> {
        match method {
            "OpenDoc" => {
                if params[0] != APP_ID {
                    return Err(engine_error(1003, "App not found"));
                }
                Ok(json!({"qReturn": {"qType": "Doc", "qHandle": 1}}))
            }
            "GetTablesAndKeys" => {
                if let Some(delay) = self.faults.metadata_delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(json!({
                    "qtr": [{
                        "qName": "Employees",
                        "qNoOfRows": self.rows.len(),
                        "qFields": [
                            {"qName": "EmployeeID", "qnTotalDistinctValues": 45, "qTags": ["$numeric", "$integer"]},
                            {"qName": "Name", "qnTotalDistinctValues": 45, "qTags": ["$text", "$ascii"]},
                            {"qName": "Department", "qnTotalDistinctValues": 3, "qTags": ["$text", "$ascii"]},
                            {"qName": "Salary", "qnTotalDistinctValues": 45, "qTags": ["$numeric", "$integer"]}
                        ]
                    }],
                    "qk": []
                }))
            }
            "AddAlternateState" => {
                let name = text(&params[0]);
                let mut journal = self.journal();
                journal.created_states.push(name.clone());
                journal.live_states.insert(name);
                Ok(json!({}))
            }
            "RemoveAlternateState" => {
                let name = text(&params[0]);
                conn.selections.remove(&name);
                self.journal().live_states.remove(&name);
                Ok(json!({}))
            }
            "GetField" => {
                let handle = conn.next_handle();
                conn.fields
                    .insert(handle, (text(&params[0]), text(&params[1])));
                Ok(json!({"qReturn": {"qType": "Field", "qHandle": handle}}))
            }
            "SelectValues" => {
                let (field, state) = conn
                    .fields
                    .get(&handle)
                    .cloned()
                    .ok_or_else(|| engine_error(-32602, "Invalid handle"))?;
                let column = column_of(&field).ok_or_else(|| engine_error(2, "Field not found"))?;
                let wanted: Vec<String> = params[0]
                    .as_array()
                    .map(|values| values.iter().map(|v| text(&v["qText"])).collect())
                    .unwrap_or_default();
                let matched: Vec<String> = wanted
                    .into_iter()
                    .filter(|v| self.rows.iter().any(|row| cell_text(&row[column]) == *v))
                    .collect();
                if matched.is_empty() {
                    return Ok(json!({"qReturn": false}));
                }
                conn.selections.insert(state, (column, matched));
                Ok(json!({"qReturn": true}))
            }
            "CreateSessionObject" => {
                let properties = &params[0];
                let id = text(&properties["qInfo"]["qId"]);
                let handle = conn.next_handle();
                conn.objects
                    .insert(handle, properties["qHyperCubeDef"].clone());
                self.journal().live_objects.insert(id.clone());
                Ok(json!({"qReturn": {"qType": "GenericObject", "qHandle": handle, "qGenericId": id}}))
            }
            "DestroySessionObject" => {
                let removed = self.journal().live_objects.remove(&text(&params[0]));
                Ok(json!({"qSuccess": removed}))
            }
            "GetObject" => {
                let id = text(&params[0]);
                let def = match id.as_str() {
                    STAFF_OBJECT => json!({
                        "qDimensions": [
                            {"qDef": {"qFieldDefs": ["EmployeeID"]}},
                            {"qDef": {"qFieldDefs": ["Name"]}}
                        ],
                        "qMeasures": []
                    }),
                    NOTES_OBJECT => Value::Null,
                    _ => return Err(engine_error(2, "Object not found")),
                };
                let handle = conn.next_handle();
                conn.objects.insert(handle, def);
                Ok(json!({"qReturn": {"qType": "GenericObject", "qHandle": handle, "qGenericId": id}}))
            }
            "GetLayout" => {
                let def = conn
                    .objects
                    .get(&handle)
                    .ok_or_else(|| engine_error(-32602, "Invalid handle"))?;
                if def.is_null() {
                    return Ok(json!({"qLayout": {"qInfo": {"qType": "text-image"}}}));
                }
                let rows = self.visible_rows(conn, def);
                let dimension_info: Vec<Value> = dimension_fields(def)
                    .iter()
                    .map(|f| json!({"qFallbackTitle": f}))
                    .collect();
                let measure_info: Vec<Value> = def["qMeasures"]
                    .as_array()
                    .map(|ms| {
                        ms.iter()
                            .map(|m| json!({"qFallbackTitle": m["qDef"]["qLabel"]}))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(json!({"qLayout": {"qHyperCube": {
                    "qSize": {"qcx": dimension_info.len() + measure_info.len(), "qcy": rows.len()},
                    "qDimensionInfo": dimension_info,
                    "qMeasureInfo": measure_info,
                    "qStateName": def["qStateName"]
                }}}))
            }
            "GetHyperCubeData" => {
                if let Some(delay) = self.faults.data_delay {
                    tokio::time::sleep(delay).await;
                }
                if self.faults.fail_data {
                    return Err(engine_error(15, "Object is not valid"));
                }
                let def = conn
                    .objects
                    .get(&handle)
                    .ok_or_else(|| engine_error(-32602, "Invalid handle"))?;
                let rows = self.visible_rows(conn, def);
                let columns: Vec<Option<usize>> = dimension_fields(def)
                    .iter()
                    .map(|f| column_of(f))
                    .collect();
                let measures = def["qMeasures"].as_array().map_or(0, Vec::len);

                let mut pages = Vec::new();
                for page in params[1].as_array().cloned().unwrap_or_default() {
                    let top = page["qTop"].as_u64().unwrap_or(0);
                    let height = page["qHeight"].as_u64().unwrap_or(0);
                    self.journal().windows.push((top, height));

                    let matrix: Vec<Vec<Value>> = rows
                        .iter()
                        .skip(top as usize)
                        .take(height as usize)
                        .map(|row| {
                            columns
                                .iter()
                                .map(|c| match c {
                                    Some(c) => cell(&row[*c]),
                                    None => json!({"qText": "-", "qNum": "NaN", "qIsNull": true}),
                                })
                                .chain((0..measures).map(|_| json!({"qText": "0", "qNum": 0})))
                                .collect()
                        })
                        .collect();
                    pages.push(json!({"qMatrix": matrix, "qArea": page}));
                }
                Ok(json!({"qDataPages": pages}))
            }
            other => Err(engine_error(-32601, &format!("Method not found: {}", other))),
        }
    }

    /// Rows left after the object's state selection, in the cube's sort order.
    fn visible_rows(&self, conn: &Connection, def: &Value) -> Vec<Vec<Value>> {
        let selection = def["qStateName"]
            .as_str()
            .and_then(|state| conn.selections.get(state));
        let mut rows: Vec<Vec<Value>> = self
            .rows
            .iter()
            .filter(|row| match selection {
                Some((column, values)) => values.contains(&cell_text(&row[*column])),
                None => true,
            })
            .cloned()
            .collect();

        let first = def["qInterColumnSortOrder"][0].as_u64().unwrap_or(0) as usize;
        let dimension = &def["qDimensions"][first];
        let direction = dimension["qDef"]["qSortCriterias"][0]["qSortByNumeric"]
            .as_i64()
            .unwrap_or(0);
        if direction != 0 {
            if let Some(column) = dimension["qDef"]["qFieldDefs"][0].as_str().and_then(column_of) {
                rows.sort_by(|a, b| {
                    let ordering = compare(&a[column], &b[column]);
                    if direction < 0 {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                });
            }
        }
        rows
    }
}

#[async_trait]
impl Connector for FakeEngine {
    async fn connect(
        &self,
        _endpoint: &Endpoint,
        _tls: Arc<rustls::ClientConfig>,
    ) -> Result<Duplex> {
        self.model.journal().connects += 1;
        let (duplex, peer) = memory_duplex();
        tokio::spawn(self.model.clone().serve(peer));
        Ok(duplex)
    }
}

#[derive(Default)]
struct Connection {
    handles: i64,
    fields: HashMap<i64, (String, String)>,
    objects: HashMap<i64, Value>,
    /// State name to (column, selected texts).
    selections: HashMap<String, (usize, Vec<String>)>,
}

impl Connection {
    fn next_handle(&mut self) -> i64 {
        self.handles += 1;
        100 + self.handles
    }
}

fn engine_error(code: i64, message: &str) -> RpcError {
    RpcError {
        code,
        message: message.to_string(),
        parameter: None,
    }
}

fn text(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

fn column_of(field: &str) -> Option<usize> {
    FIELDS.iter().position(|f| *f == field)
}

fn dimension_fields(def: &Value) -> Vec<String> {
    def["qDimensions"]
        .as_array()
        .map(|dims| dims.iter().map(|d| text(&d["qDef"]["qFieldDefs"][0])).collect())
        .unwrap_or_default()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell(value: &Value) -> Value {
    match value {
        Value::Number(n) => json!({"qText": n.to_string(), "qNum": n}),
        other => json!({"qText": cell_text(other), "qNum": "NaN"}),
    }
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => cell_text(a).cmp(&cell_text(b)),
    }
}

pub fn certificates() -> Arc<PemBytesProvider> {
    let cert = rcgen::generate_simple_self_signed(vec!["engine.test".to_string()]).unwrap();
    let pem = cert.cert.pem();
    Arc::new(PemBytesProvider::new(
        pem.clone(),
        cert.key_pair.serialize_pem(),
        pem,
    ))
}

pub fn config() -> EngineConfig {
    EngineConfig::new("engine.test")
}

/// A [`QueryEngine`] whose every session lands on `fake`.
pub fn query_engine(fake: Arc<FakeEngine>, config: EngineConfig) -> QueryEngine {
    let connections = Arc::new(ConnectionManager::new(
        config.clone(),
        fake,
        certificates(),
    ));
    let metadata = MetadataCache::new(
        Arc::new(EngineMetadataSource::new(connections.clone())),
        config.metadata_ttl,
        config.metadata_capacity,
    );
    let resolver = StaticResolver::from_json(MAPPINGS).unwrap();
    QueryEngine::new(config, connections, metadata, Arc::new(resolver))
}
