//! MCP client flows on top of a [`Session`].
//!
//! | Flow             | Method           | Deadline             |
//! |------------------|------------------|----------------------|
//! | list tools       | `tools/list`     | `request_seconds`    |
//! | call a tool      | `tools/call`     | `call_seconds`       |
//! | list resources   | `resources/list` | `request_seconds`    |
//! | read a resource  | `resources/read` | `call_seconds`       |
//! | list prompts     | `prompts/list`   | `request_seconds`    |
//! | get a prompt     | `prompts/get`    | `call_seconds`       |
//!
//! None of these flows is extendable; only the handshake is.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::info;

use crate::config::InspectorSettings;
use crate::observer::Observer;
use crate::rpc::orchestrator::{CallOptions, CallOutcome};
use crate::rpc::policy::DeadlinePolicy;
use crate::servers::ServerRegistry;
use crate::session::Session;
use crate::{AppError, Result};

/// Connected, initialised MCP client.
pub struct McpClient {
    registry: ServerRegistry,
    settings: InspectorSettings,
    observer: Arc<dyn Observer>,
    policy: Arc<dyn DeadlinePolicy>,
    session: Session,
    server_info: Value,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server", &self.session.name())
            .field("servers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Start the selected server and complete the handshake.
    ///
    /// # Errors
    ///
    /// Returns the launch error, `AppError::NotFound` for an unknown server
    /// name, or `AppError::Handshake`.
    pub async fn connect(
        registry: ServerRegistry,
        server: Option<&str>,
        settings: InspectorSettings,
        observer: Arc<dyn Observer>,
        policy: Arc<dyn DeadlinePolicy>,
    ) -> Result<Self> {
        let (session, server_info) =
            open_session(&registry, server, &settings, &observer, &policy).await?;
        Ok(Self {
            registry,
            settings,
            observer,
            policy,
            session,
            server_info,
        })
    }

    /// Result of the last `initialize`.
    #[must_use]
    pub fn server_info(&self) -> &Value {
        &self.server_info
    }

    /// The live session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The server registry the client picks from.
    #[must_use]
    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    /// Stop the current server and connect to `server` instead.
    ///
    /// The old session is fully stopped before the new one starts. On
    /// failure the client is left without a usable session; every later
    /// call fails until a switch succeeds.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn switch(&mut self, server: &str) -> Result<()> {
        info!(from = %self.session.name(), to = server, "switching server");
        self.session.stop().await;
        self.observer.server_changed(server);
        let (session, server_info) = open_session(
            &self.registry,
            Some(server),
            &self.settings,
            &self.observer,
            &self.policy,
        )
        .await?;
        self.session = session;
        self.server_info = server_info;
        Ok(())
    }

    /// Stop the server.
    pub async fn shutdown(&mut self) {
        self.session.stop().await;
    }

    fn listing(&self) -> CallOptions {
        CallOptions::fixed(self.settings.timeouts.request())
    }

    fn invocation(&self) -> CallOptions {
        CallOptions::fixed(self.settings.timeouts.call())
    }

    /// `tools/list`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Write` or `AppError::Handshake` from the session.
    pub async fn list_tools(&self) -> Result<CallOutcome> {
        self.session.request("tools/list", None, self.listing()).await
    }

    /// `tools/call` with an `arguments` object.
    ///
    /// # Errors
    ///
    /// Same as [`list_tools`](Self::list_tools).
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallOutcome> {
        let params = json!({ "name": name, "arguments": arguments });
        self.session
            .request("tools/call", Some(params), self.invocation())
            .await
    }

    /// Look up one tool definition by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the server does not list it, or
    /// `AppError::Rpc` if listing failed.
    pub async fn find_tool(&self, name: &str) -> Result<Value> {
        let listed = self.list_tools().await?.into_result()?;
        result_items(&listed, "tools")
            .into_iter()
            .find(|tool| tool.get("name").and_then(Value::as_str) == Some(name))
            .ok_or_else(|| AppError::NotFound(format!("tool {name} not offered by server")))
    }

    /// `resources/list`.
    ///
    /// # Errors
    ///
    /// Same as [`list_tools`](Self::list_tools).
    pub async fn list_resources(&self) -> Result<CallOutcome> {
        self.session
            .request("resources/list", None, self.listing())
            .await
    }

    /// `resources/read`.
    ///
    /// # Errors
    ///
    /// Same as [`list_tools`](Self::list_tools).
    pub async fn read_resource(&self, uri: &str) -> Result<CallOutcome> {
        self.session
            .request("resources/read", Some(json!({ "uri": uri })), self.invocation())
            .await
    }

    /// `prompts/list`.
    ///
    /// # Errors
    ///
    /// Same as [`list_tools`](Self::list_tools).
    pub async fn list_prompts(&self) -> Result<CallOutcome> {
        self.session
            .request("prompts/list", None, self.listing())
            .await
    }

    /// `prompts/get`; `arguments` is omitted when empty.
    ///
    /// # Errors
    ///
    /// Same as [`list_tools`](Self::list_tools).
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallOutcome> {
        let mut params = Map::new();
        params.insert("name".into(), Value::from(name));
        if !arguments.is_empty() {
            params.insert("arguments".into(), Value::Object(arguments));
        }
        self.session
            .request("prompts/get", Some(Value::Object(params)), self.invocation())
            .await
    }
}

async fn open_session(
    registry: &ServerRegistry,
    server: Option<&str>,
    settings: &InspectorSettings,
    observer: &Arc<dyn Observer>,
    policy: &Arc<dyn DeadlinePolicy>,
) -> Result<(Session, Value)> {
    let entry = registry.select(server)?;
    let mut session = Session::start_with_fallback(
        registry,
        entry,
        settings,
        Arc::clone(observer),
        Arc::clone(policy),
    )?;
    match session.initialize().await {
        Ok(info) => Ok((session, info)),
        Err(err) => {
            session.stop().await;
            Err(err)
        }
    }
}

/// The array under `key` in a listing result, empty when absent.
#[must_use]
pub fn result_items(result: &Value, key: &str) -> Vec<Value> {
    result
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
