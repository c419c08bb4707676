//! `ParlorServer` builder and accept loop.
//!
//! This is the entry point for running a Parlor server. It ties the
//! layers together: transport → protocol → gateway → room registry.

use std::sync::Arc;

use parlor_protocol::JsonCodec;
use parlor_room::{RoomRegistry, RulesOracle};
use parlor_transport::{Transport, WebSocketTransport};
use parlor_vault::SecretVault;
use tokio::sync::Mutex;

use crate::gateway::handle_connection;
use crate::ParlorError;

/// Shared server state passed to each connection handler task.
///
/// The registry lock guards only the code→handle map; room operations
/// happen on cloned-out handles with the lock released.
pub(crate) struct ServerState {
    pub(crate) registry: Mutex<RoomRegistry>,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a Parlor server.
///
/// # Example
///
/// ```rust,ignore
/// use parlor::prelude::*;
///
/// let server = ParlorServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(my_oracle)
///     .await?;
/// server.run().await
/// ```
pub struct ParlorServerBuilder {
    bind_addr: String,
    vault: Option<Arc<SecretVault>>,
}

impl ParlorServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            vault: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the secret vault. Defaults to [`SecretVault::from_env`].
    pub fn vault(mut self, vault: SecretVault) -> Self {
        self.vault = Some(Arc::new(vault));
        self
    }

    /// Builds and starts the server with the given rules oracle.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport` as defaults.
    pub async fn build(
        self,
        oracle: impl RulesOracle + 'static,
    ) -> Result<ParlorServer, ParlorError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let vault = self
            .vault
            .unwrap_or_else(|| Arc::new(SecretVault::from_env()));

        let state = Arc::new(ServerState {
            registry: Mutex::new(RoomRegistry::new(vault, Arc::new(oracle))),
            codec: JsonCodec,
        });

        Ok(ParlorServer { transport, state })
    }
}

impl Default for ParlorServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Parlor server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ParlorServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
}

impl ParlorServer {
    /// Creates a new builder.
    pub fn builder() -> ParlorServerBuilder {
        ParlorServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a gateway task for each.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), ParlorError> {
        tracing::info!("Parlor server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await
                        {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
