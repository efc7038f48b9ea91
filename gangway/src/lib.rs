// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authorizing gateway for workspace deployments
//!
//! gangway fronts the per-deployment services of a multi-tenant system.
//! It does three things:
//!
//! 1. Keeps a permission record for every user, maintained against user
//!    and workspace lifecycle events (see [`gangway_authz`]).
//! 2. Gates every incoming request on the actions its route requires.
//! 3. Forwards authorized HTTP and WebSocket traffic to the deployment's
//!    backend service, addressed by a DNS name derived from the
//!    workspace and deployment ids.
//!
//! Callers are identified by a spoof bearer token carrying their user
//! id; see [`authn`] for the scheme and its limits.

pub mod authn;
mod config;
mod context;
mod gate;
mod http_entrypoints;
mod proxy;

pub use config::Config;
pub use config::LoadError;
pub use config::ProxyConfig;

use anyhow::anyhow;
use anyhow::Context;
use gangway_authz::Dispatcher;
use gangway_authz::Engine;
use gangway_authz::EventSender;
use gangway_authz::LifecycleSynchronizer;
use gangway_authz::MemoryStore;
use gangway_authz::PermissionStore;
use slog::info;
use slog::o;
use slog::Logger;
use std::net::SocketAddr;
use std::sync::Arc;

/// A running gangway server
pub struct Server {
    dispatcher: Dispatcher,
    http_server: dropshot::HttpServer<context::ServerContext>,
}

impl Server {
    /// Starts a gangway server with an empty permission store.
    ///
    /// Records are populated through lifecycle events published on the
    /// handle returned by [`Server::event_sender()`].
    pub async fn start(
        config: Config,
        log: &Logger,
    ) -> Result<Server, anyhow::Error> {
        let log = log.new(o!("component" => "gangway"));
        info!(log, "starting gangway server");

        let store: Arc<dyn PermissionStore> = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::start(
            LifecycleSynchronizer::new(store.clone(), &log),
            &log,
        );
        let gate = gate::Gate::new(Engine::new(store.clone()));
        let forwarder = proxy::Forwarder::new(config.proxy)
            .context("initializing backend forwarder")?;

        let http_server = dropshot::ServerBuilder::new(
            http_entrypoints::api(),
            context::ServerContext { store, gate, forwarder },
            log.new(o!("component" => "dropshot")),
        )
        .config(config.dropshot)
        .start()
        .map_err(|error| anyhow!("setting up HTTP server: {:#}", error))?;

        info!(
            log,
            "gangway server listening";
            "local_addr" => %http_server.local_addr(),
        );

        Ok(Server { dispatcher, http_server })
    }

    /// Address the HTTP server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.http_server.local_addr()
    }

    /// Returns a handle for publishing lifecycle events to this server.
    pub fn event_sender(&self) -> EventSender {
        self.dispatcher.sender()
    }

    /// Waits until every lifecycle event published so far has been
    /// applied to the permission store.
    pub async fn flush_events(&self) {
        self.dispatcher.flush().await
    }

    /// Blocks until the server stops.  Normally it runs forever.
    pub async fn wait_for_finish(self) -> Result<(), anyhow::Error> {
        self.http_server
            .await
            .map_err(|error_message| anyhow!("server exited: {error_message}"))
    }

    /// Shuts the server down gracefully.
    pub async fn close(self) -> Result<(), anyhow::Error> {
        self.http_server
            .close()
            .await
            .map_err(|error_message| anyhow!("closing server: {error_message}"))
    }
}

/// A gangway server listening on localhost on an ephemeral port.
///
/// Intended to be used for testing only.
pub struct TransientServer {
    pub server: Server,
}

impl TransientServer {
    pub async fn new(log: &Logger) -> Result<TransientServer, anyhow::Error> {
        Self::new_with_proxy_config(log, ProxyConfig::default()).await
    }

    /// Starts a server whose proxied traffic all goes to `backend`
    /// instead of the derived per-deployment names.
    pub async fn new_with_backend(
        log: &Logger,
        backend: SocketAddr,
    ) -> Result<TransientServer, anyhow::Error> {
        Self::new_with_proxy_config(
            log,
            ProxyConfig { backend_override: Some(backend), ..Default::default() },
        )
        .await
    }

    async fn new_with_proxy_config(
        log: &Logger,
        proxy: ProxyConfig,
    ) -> Result<TransientServer, anyhow::Error> {
        let config = Config {
            dropshot: dropshot::ConfigDropshot {
                bind_address: "[::1]:0".parse().unwrap(),
                default_request_body_max_bytes: 4 * 1024 * 1024,
                default_handler_task_mode: dropshot::HandlerTaskMode::Detached,
                log_headers: vec![],
            },
            log: dropshot::ConfigLogging::StderrTerminal {
                level: dropshot::ConfigLoggingLevel::Info,
            },
            proxy,
        };
        let server = Server::start(config, log).await?;
        Ok(TransientServer { server })
    }
}
