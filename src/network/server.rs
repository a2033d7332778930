//! Admin RPC Server
//!
//! Answers `Admin.*` requests from peers using the local runner.

use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::{read_message, write_message};
use crate::error::{Error, Result};
use crate::node::ServiceSignal;
use crate::rpc::{AdminReply, AdminRequest, Credential, RpcMessage};
use crate::runner::{CommandRunner, LocalRunner};

/// RPC server exposing this node's admin operations
pub struct AdminRpcServer {
    /// Bind address
    bind_address: String,
    /// Credential every request must carry
    credential: Credential,
    /// Executes requests locally
    runner: Arc<LocalRunner>,
    /// Shutdown signal
    shutdown: watch::Sender<bool>,
}

impl AdminRpcServer {
    /// Create a new server
    pub fn new(bind_address: String, credential: Credential, runner: Arc<LocalRunner>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            bind_address,
            credential,
            runner,
            shutdown: shutdown_tx,
        }
    }

    /// Bind the listener
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        tracing::info!("Admin RPC server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and serve until stopped
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// After [`stop`](Self::stop), open connections finish the request they
    /// are handling and write its reply before this returns.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut connections = JoinSet::new();

        while !*shutdown_rx.borrow() {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let peer_addr = addr.to_string();
                            let credential = self.credential.clone();
                            let runner = Arc::clone(&self.runner);
                            let shutdown = self.shutdown.subscribe();

                            connections.spawn(async move {
                                if let Err(e) = handle_connection(socket, &peer_addr, &credential, runner, shutdown).await {
                                    tracing::warn!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_rx.changed() => {}
            }
        }

        drop(listener);
        while connections.join_next().await.is_some() {}

        tracing::info!("Admin RPC server stopped");
        Ok(())
    }

    /// Stop the server
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Handle a single connection
async fn handle_connection(
    socket: TcpStream,
    peer_addr: &str,
    credential: &Credential,
    runner: Arc<LocalRunner>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    socket.set_nodelay(true)?;
    let (mut reader, mut writer) = socket.into_split();

    while !*shutdown.borrow_and_update() {
        // Only waiting for a request is cancelled by shutdown; a request
        // already read is answered
        let read = tokio::select! {
            read = read_message(&mut reader) => read,
            _ = shutdown.changed() => break,
        };
        let message = match read {
            Ok(message) => message,
            Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Connection closed
                break;
            }
            Err(e) => return Err(e),
        };

        let reply = match message {
            RpcMessage::Request { credential: given, request } => {
                tracing::debug!("Received {} from {}", request.method(), peer_addr);
                if given != *credential {
                    tracing::warn!("Rejected {} from {}: bad credential", request.method(), peer_addr);
                    AdminReply::from_error(&Error::Unauthorized)
                } else {
                    dispatch(&runner, request).await
                }
            }
            RpcMessage::Reply(reply) => {
                return Err(Error::Network(format!(
                    "unsolicited {} reply",
                    reply.type_name()
                )));
            }
        };

        write_message(&mut writer, &RpcMessage::Reply(reply)).await?;
    }

    Ok(())
}

/// Execute one request on this node
async fn dispatch(runner: &LocalRunner, request: AdminRequest) -> AdminReply {
    let result = match request {
        AdminRequest::Restart => runner.restart().await.map(|_| AdminReply::Ack),
        AdminRequest::ListLocks {
            namespace,
            prefix,
            min_age,
        } => runner
            .list_locks(&namespace, &prefix, min_age)
            .await
            .map(AdminReply::Locks),
        AdminRequest::ReInitDisks => runner
            .context()
            .send_signal(ServiceSignal::ReinitDisks)
            .map(|_| AdminReply::Ack),
        AdminRequest::Uptime => runner.uptime().await.map(AdminReply::Uptime),
        AdminRequest::GetConfig => runner.get_config().await.map(AdminReply::Config),
    };

    result.unwrap_or_else(|e| AdminReply::from_error(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::{LockRegistry, LockType};
    use crate::network::{AuthRpcClient, RpcTransport};
    use crate::node::NodeContext;
    use crate::reconcile::ConfigSnapshot;
    use crate::runner::RemoteRunner;
    use std::time::Duration;

    fn credential() -> Credential {
        Credential::new("admin", "secret123")
    }

    #[tokio::test]
    async fn test_remote_runner_over_loopback() {
        let registry = Arc::new(LockRegistry::new());
        registry.acquire("photos", "2024/a.jpg", LockType::Write, "put");
        registry.acquire("photos", "2024/b.jpg", LockType::Read, "get");

        let snapshot = ConfigSnapshot::new(serde_json::json!({ "region": "a" }));
        let (ctx, mut signals) = NodeContext::new(registry, Some(snapshot.clone()));
        ctx.mark_booted();
        let runner = Arc::new(LocalRunner::new(Arc::new(ctx)));

        let server = Arc::new(AdminRpcServer::new("127.0.0.1:0".into(), credential(), runner));
        let listener = server.bind().await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let serving = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };

        let client = Arc::new(AuthRpcClient::new(
            address,
            credential(),
            Duration::from_secs(1),
            Duration::from_secs(2),
        ));
        let remote = RemoteRunner::new(client);

        let locks = remote.list_locks("photos", "2024/", Duration::ZERO).await.unwrap();
        assert_eq!(locks.len(), 2);

        assert!(remote.uptime().await.is_ok());

        let bytes = remote.get_config().await.unwrap();
        assert_eq!(ConfigSnapshot::from_bytes(&bytes).unwrap(), snapshot);

        remote.reinit_disks().await.unwrap();
        assert_eq!(signals.recv().await, Some(ServiceSignal::ReinitDisks));

        remote.restart().await.unwrap();
        assert_eq!(signals.recv().await, Some(ServiceSignal::Restart));

        server.stop();
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bad_credential_rejected() {
        let (ctx, _signals) = NodeContext::new(Arc::new(LockRegistry::new()), None);
        let runner = Arc::new(LocalRunner::new(Arc::new(ctx)));
        let server = Arc::new(AdminRpcServer::new("127.0.0.1:0".into(), credential(), runner));
        let listener = server.bind().await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await });
        }

        let client = AuthRpcClient::new(
            address,
            Credential::new("admin", "wrong"),
            Duration::from_secs(1),
            Duration::from_secs(2),
        );
        let reply = client.call(AdminRequest::Uptime).await.unwrap();
        match reply {
            AdminReply::Error { code, .. } => assert_eq!(code, crate::rpc::ErrorCode::Unauthorized),
            other => panic!("unexpected reply: {:?}", other),
        }

        server.stop();
    }

    #[tokio::test]
    async fn test_stop_answers_restart_then_closes_connections() {
        let (ctx, mut signals) = NodeContext::new(Arc::new(LockRegistry::new()), None);
        let runner = Arc::new(LocalRunner::new(Arc::new(ctx)));
        let server = Arc::new(AdminRpcServer::new("127.0.0.1:0".into(), credential(), runner));
        let listener = server.bind().await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let serving = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };

        let client = AuthRpcClient::new(
            address,
            credential(),
            Duration::from_secs(1),
            Duration::from_secs(2),
        );

        // Stop as soon as the restart is requested, like the supervisor does
        let supervisor = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let signal = signals.recv().await;
                server.stop();
                signal
            })
        };

        let reply = client.call(AdminRequest::Restart).await.unwrap();
        assert!(matches!(reply, AdminReply::Ack));
        assert_eq!(supervisor.await.unwrap(), Some(ServiceSignal::Restart));

        // serve returns although the client still holds its connection
        tokio::time::timeout(Duration::from_secs(2), serving)
            .await
            .expect("serve did not drain connections")
            .unwrap()
            .unwrap();

        assert!(client.call(AdminRequest::Uptime).await.is_err());
    }
}
