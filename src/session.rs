//! One live server session: the child process plus its transport.
//!
//! A session is created by [`Session::start`], becomes usable after
//! [`Session::initialize`] and is torn down by [`Session::stop`]. Starting a
//! new server always goes through a fresh `Session`, so histories and the
//! pending table never leak across servers.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, info_span, warn, Instrument};

use crate::config::InspectorSettings;
use crate::observer::Observer;
use crate::rpc::history::{Histories, HistorySnapshot};
use crate::rpc::orchestrator::{CallOptions, CallOutcome, Orchestrator};
use crate::rpc::policy::DeadlinePolicy;
use crate::rpc::process::{spawn_server, LaunchSpec, ServerProcess};
use crate::servers::{ServerEntry, ServerRegistry};
use crate::{AppError, Result};

/// Method name of the handshake request.
pub const INITIALIZE_METHOD: &str = "initialize";

/// Notification sent once the handshake succeeded.
pub const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

/// A running server with its orchestrator.
#[derive(Debug)]
pub struct Session {
    name: String,
    process: ServerProcess,
    orchestrator: Orchestrator,
    settings: InspectorSettings,
    initialized: bool,
    stopped: bool,
}

impl Session {
    /// Spawn the server and attach the transport.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CommandNotFound` or `AppError::Spawn` when the
    /// process cannot be launched.
    pub fn start(
        spec: &LaunchSpec,
        settings: &InspectorSettings,
        observer: Arc<dyn Observer>,
        policy: Arc<dyn DeadlinePolicy>,
    ) -> Result<Self> {
        let (process, streams) = spawn_server(spec)?;
        let orchestrator = Orchestrator::attach(
            spec.name.clone(),
            streams.stdin,
            streams.stdout,
            streams.stderr,
            settings.stream_limits(),
            observer,
            policy,
        );
        Ok(Self {
            name: spec.name.clone(),
            process,
            orchestrator,
            settings: settings.clone(),
            initialized: false,
            stopped: false,
        })
    }

    /// Start `entry`, falling back to `settings.fallback_command` when the
    /// entry's program does not exist and it is the only configured server.
    ///
    /// With several servers configured the error is returned so the caller
    /// can pick another one.
    ///
    /// # Errors
    ///
    /// Returns the launch error of the entry, or of the fallback command.
    pub fn start_with_fallback(
        registry: &ServerRegistry,
        entry: &ServerEntry,
        settings: &InspectorSettings,
        observer: Arc<dyn Observer>,
        policy: Arc<dyn DeadlinePolicy>,
    ) -> Result<Self> {
        let spec = entry.to_launch_spec()?;
        match Self::start(&spec, settings, Arc::clone(&observer), Arc::clone(&policy)) {
            Err(err) if err.is_command_not_found() && registry.is_single() => {
                let fallback = fallback_spec(&entry.name, registry, settings)?;
                warn!(
                    server = %entry.name,
                    %err,
                    fallback = %fallback.command_line(),
                    "command not found, falling back"
                );
                Self::start(&fallback, settings, observer, policy)
            }
            other => other,
        }
    }

    /// Name of the server.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id of the server, while it runs.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.id()
    }

    /// Whether the handshake has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Perform the `initialize` handshake and send `notifications/initialized`.
    ///
    /// The request uses the initialize deadline with extension enabled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Handshake` if the server does not answer with a
    /// result, or if the session is already stopped.
    pub async fn initialize(&mut self) -> Result<Value> {
        if self.stopped {
            return Err(AppError::Handshake("session already stopped".into()));
        }
        let span = info_span!("initialize", server = %self.name);

        async {
            let params = json!({
                "protocolVersion": self.settings.protocol_version,
                "capabilities": {},
                "clientInfo": {
                    "name": self.settings.client_name,
                    "version": self.settings.client_version,
                },
            });
            let options = CallOptions::extendable(
                self.settings.timeouts.initialize(),
                self.settings.timeouts.extension(),
            );

            let outcome = self
                .orchestrator
                .request(INITIALIZE_METHOD, Some(params), options)
                .await
                .map_err(|err| AppError::Handshake(format!("initialize not sent: {err}")))?;

            let result = match outcome {
                CallOutcome::Resolved(result) => result,
                CallOutcome::ProtocolError(error) => {
                    return Err(AppError::Handshake(format!("initialize rejected: {error}")));
                }
                CallOutcome::TimedOut if self.orchestrator.reply_stream_closed() => {
                    return Err(AppError::Handshake("server exited before handshake".into()));
                }
                CallOutcome::TimedOut => {
                    return Err(AppError::Handshake("initialize timed out".into()));
                }
                CallOutcome::Abandoned => {
                    return Err(AppError::Handshake("initialize abandoned".into()));
                }
            };

            self.orchestrator
                .notify(INITIALIZED_NOTIFICATION, None)
                .await
                .map_err(|err| AppError::Handshake(format!("initialized not sent: {err}")))?;

            self.initialized = true;
            info!("handshake complete");
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Send a correlated request after the handshake.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Handshake` before [`initialize`](Self::initialize)
    /// succeeded, and `AppError::Write` if the request could not be written.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<CallOutcome> {
        self.ensure_ready(method)?;
        self.orchestrator.request(method, params, options).await
    }

    /// Send a notification after the handshake.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.ensure_ready(method)?;
        self.orchestrator.notify(method, params).await
    }

    fn ensure_ready(&self, method: &str) -> Result<()> {
        if self.stopped {
            return Err(AppError::Write(format!("{method}: session already stopped")));
        }
        if !self.initialized {
            return Err(AppError::Handshake(format!(
                "{method} refused: handshake not completed"
            )));
        }
        Ok(())
    }

    /// The underlying orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Live history buffers.
    #[must_use]
    pub fn histories(&self) -> &Histories {
        self.orchestrator.histories()
    }

    /// Copy of both histories.
    #[must_use]
    pub fn snapshot(&self) -> HistorySnapshot {
        self.orchestrator.snapshot()
    }

    /// Close stdin, stop the process within the grace period and join the
    /// readers, letting them drain what the server wrote before exiting.
    /// Idempotent.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.orchestrator.close_input().await;
        self.process.stop(self.settings.stop_grace()).await;
        self.orchestrator.shutdown(self.settings.stop_grace()).await;
        info!(server = %self.name, "session stopped");
    }
}

fn fallback_spec(
    name: &str,
    registry: &ServerRegistry,
    settings: &InspectorSettings,
) -> Result<LaunchSpec> {
    let (program, args) = settings
        .fallback_command
        .split_first()
        .ok_or_else(|| AppError::Config("fallback_command is empty".into()))?;
    let mut spec = LaunchSpec::new(name, program.clone(), args.to_vec());
    spec.working_dir = Some(registry.base_dir().to_path_buf());
    Ok(spec)
}
