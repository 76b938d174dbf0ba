use serde::{Deserialize, Serialize};

/// The envelope a guest sandbox sends on every `CallHostJsFunction` callback
/// targeting the `api` module. `api_token` proves the call came from the
/// execution it claims to, not from some other tenant's concurrently
/// running script.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackRequest {
    pub exec_id: String,
    pub api_token: String,
    #[serde(rename = "type")]
    pub capability: Capability,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The four capability surfaces a script may invoke. `utils` never reaches
/// the broker at all — it's implemented sandbox-side — so it has no
/// corresponding op type here; a request naming it is simply invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Database,
    Http,
    Events,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOp {
    Query,
    Select,
    Insert,
    Update,
    Delete,
}

impl DbOp {
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "query" => Some(Self::Query),
            "select" => Some(Self::Select),
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub const fn is_write(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

/// A parsed `database.*` call: the table it targets plus the operation's raw
/// JSON parameters, which the configured [`crate::db::DbExecutor`]
/// interprets (filters, columns, values, etc.).
#[derive(Debug, Clone)]
pub struct DbRequest {
    pub op: DbOp,
    pub table: String,
    pub params: serde_json::Value,
}

/// A parsed `http.*` call.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpRequest {
    pub url: String,
    #[serde(default = "default_http_method")]
    pub method: String,
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

fn default_http_method() -> String {
    "GET".to_string()
}

/// A parsed `events.dispatch` call.
#[derive(Debug, Clone, Deserialize)]
pub struct EventDispatch {
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}
