//! Route table binding HTTP method and path suffix to facade operations.
//!
//! Routes are transport-agnostic: a handler receives the decoded request
//! body and produces a [`Reply`]. The transport mounts each suffix under
//! `/plugins`.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;
use trellis_plugins::PluginId;

use super::{MANAGER_TARGET, ManagerError, PluginManager};

/// HTTP methods used by the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read-only listing.
    Get,
    /// State-changing operation with a JSON body.
    Post,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Operation invoked for a route with the decoded request body.
pub type Handler = fn(&PluginManager, &Value) -> Result<Value, ManagerError>;

/// One entry in the route table.
#[derive(Clone, Copy)]
pub struct Route {
    /// Method the route answers.
    pub method: Method,
    /// Path below the mount point; empty for the mount point itself.
    pub suffix: &'static str,
    handler: Handler,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("suffix", &self.suffix)
            .finish_non_exhaustive()
    }
}

/// Status and JSON body produced by a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Value,
}

impl Reply {
    fn from_error(error: &ManagerError) -> Self {
        let mut body = Map::new();
        body.insert(String::from("error"), Value::String(error.public_message()));
        Self {
            status: error.status(),
            body: Value::Object(body),
        }
    }
}

impl Route {
    /// Runs the handler, mapping failures to an error reply.
    #[must_use]
    pub fn invoke(&self, manager: &PluginManager, params: &Value) -> Reply {
        match (self.handler)(manager, params) {
            Ok(body) => Reply { status: 200, body },
            Err(error) => {
                warn!(
                    target: MANAGER_TARGET,
                    method = self.method.as_str(),
                    route = self.suffix,
                    status = error.status(),
                    error = %error,
                    "request failed"
                );
                Reply::from_error(&error)
            }
        }
    }
}

pub(super) const ROUTES: [Route; 8] = [
    Route {
        method: Method::Get,
        suffix: "",
        handler: list,
    },
    Route {
        method: Method::Post,
        suffix: "install",
        handler: install,
    },
    Route {
        method: Method::Post,
        suffix: "uninstall",
        handler: uninstall,
    },
    Route {
        method: Method::Post,
        suffix: "activate",
        handler: activate,
    },
    Route {
        method: Method::Post,
        suffix: "deactivate",
        handler: deactivate,
    },
    Route {
        method: Method::Post,
        suffix: "token",
        handler: update_token,
    },
    Route {
        method: Method::Post,
        suffix: "enable",
        handler: enable,
    },
    Route {
        method: Method::Post,
        suffix: "disable",
        handler: disable,
    },
];

fn encode(value: &impl Serialize) -> Result<Value, ManagerError> {
    serde_json::to_value(value).map_err(|err| ManagerError::Encode {
        message: err.to_string(),
    })
}

fn string_field<'a>(params: &'a Value, field: &str) -> Result<&'a str, ManagerError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ManagerError::missing_field(field))
}

fn plugin_id(params: &Value) -> Result<PluginId, ManagerError> {
    string_field(params, "id").map(PluginId::new)
}

fn empty() -> Value {
    Value::Object(Map::new())
}

fn list(manager: &PluginManager, _params: &Value) -> Result<Value, ManagerError> {
    encode(&manager.list())
}

fn install(manager: &PluginManager, params: &Value) -> Result<Value, ManagerError> {
    encode(&manager.install(&plugin_id(params)?)?)
}

fn uninstall(manager: &PluginManager, params: &Value) -> Result<Value, ManagerError> {
    encode(&manager.uninstall(&plugin_id(params)?)?)
}

fn activate(manager: &PluginManager, params: &Value) -> Result<Value, ManagerError> {
    manager.activate(&plugin_id(params)?)?;
    Ok(empty())
}

fn deactivate(manager: &PluginManager, params: &Value) -> Result<Value, ManagerError> {
    manager.deactivate(&plugin_id(params)?)?;
    Ok(empty())
}

fn update_token(manager: &PluginManager, params: &Value) -> Result<Value, ManagerError> {
    let id = plugin_id(params)?;
    manager.descriptor(&id)?;
    let token = string_field(params, "token")?;
    encode(&manager.update_token(&id, token)?)
}

fn enable(manager: &PluginManager, params: &Value) -> Result<Value, ManagerError> {
    encode(&manager.enable(&plugin_id(params)?)?)
}

fn disable(manager: &PluginManager, params: &Value) -> Result<Value, ManagerError> {
    encode(&manager.disable(&plugin_id(params)?)?)
}
