//! Command Runners
//!
//! Local and remote execution of the admin operations behind one trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::locks::LockRecord;
use crate::network::RpcTransport;
use crate::node::{NodeContext, ServiceSignal};
use crate::rpc::{AdminReply, AdminRequest};

/// Admin operations every peer supports
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Ask the node to restart itself
    async fn restart(&self) -> Result<()>;

    /// Locks held in `namespace` under `prefix` for at least `min_age`
    async fn list_locks(
        &self,
        namespace: &str,
        prefix: &str,
        min_age: Duration,
    ) -> Result<Vec<LockRecord>>;

    /// Reinitialize the node's disks and storage layer
    async fn reinit_disks(&self) -> Result<()>;

    /// Time since the node finished booting
    async fn uptime(&self) -> Result<Duration>;

    /// The node's serialized config document
    async fn get_config(&self) -> Result<Vec<u8>>;
}

/// Runs admin operations in this process
pub struct LocalRunner {
    ctx: Arc<NodeContext>,
}

impl LocalRunner {
    pub fn new(ctx: Arc<NodeContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn restart(&self) -> Result<()> {
        self.ctx.send_signal(ServiceSignal::Restart)
    }

    async fn list_locks(
        &self,
        namespace: &str,
        prefix: &str,
        min_age: Duration,
    ) -> Result<Vec<LockRecord>> {
        Ok(self.ctx.locks().list_locks(namespace, prefix, min_age))
    }

    async fn reinit_disks(&self) -> Result<()> {
        // The heal path that triggered the broadcast already reformatted
        // the local disks.
        Ok(())
    }

    async fn uptime(&self) -> Result<Duration> {
        self.ctx.uptime()
    }

    async fn get_config(&self) -> Result<Vec<u8>> {
        self.ctx.config().get().ok_or(Error::ConfigAbsent)?.to_bytes()
    }
}

/// Runs admin operations on another node over RPC
pub struct RemoteRunner {
    transport: Arc<dyn RpcTransport>,
}

impl RemoteRunner {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    pub fn address(&self) -> &str {
        self.transport.address()
    }

    async fn call(&self, request: AdminRequest) -> Result<AdminReply> {
        let method = request.method();
        let result = match self.transport.call(request).await {
            Ok(AdminReply::Error { code, message }) => Err(code.into_error(message)),
            other => other,
        };
        if let Err(ref e) = result {
            tracing::debug!("{} to {} failed: {}", method, self.address(), e);
        }
        result
    }
}

fn unexpected(method: &str, reply: &AdminReply) -> Error {
    Error::Network(format!(
        "unexpected {} reply to {}",
        reply.type_name(),
        method
    ))
}

#[async_trait]
impl CommandRunner for RemoteRunner {
    async fn restart(&self) -> Result<()> {
        match self.call(AdminRequest::Restart).await? {
            AdminReply::Ack => Ok(()),
            other => Err(unexpected("Admin.Restart", &other)),
        }
    }

    async fn list_locks(
        &self,
        namespace: &str,
        prefix: &str,
        min_age: Duration,
    ) -> Result<Vec<LockRecord>> {
        let request = AdminRequest::ListLocks {
            namespace: namespace.to_string(),
            prefix: prefix.to_string(),
            min_age,
        };
        match self.call(request).await? {
            AdminReply::Locks(locks) => Ok(locks),
            other => Err(unexpected("Admin.ListLocks", &other)),
        }
    }

    async fn reinit_disks(&self) -> Result<()> {
        match self.call(AdminRequest::ReInitDisks).await? {
            AdminReply::Ack => Ok(()),
            other => Err(unexpected("Admin.ReInitDisks", &other)),
        }
    }

    async fn uptime(&self) -> Result<Duration> {
        match self.call(AdminRequest::Uptime).await? {
            AdminReply::Uptime(uptime) => Ok(uptime),
            other => Err(unexpected("Admin.Uptime", &other)),
        }
    }

    async fn get_config(&self) -> Result<Vec<u8>> {
        match self.call(AdminRequest::GetConfig).await? {
            AdminReply::Config(bytes) => Ok(bytes),
            other => Err(unexpected("Admin.GetConfig", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::{LockRegistry, LockType};
    use crate::reconcile::ConfigSnapshot;
    use crate::rpc::ErrorCode;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Transport that answers every call with a canned reply
    struct CannedTransport {
        reply: Mutex<Option<Result<AdminReply>>>,
        seen: Mutex<Vec<&'static str>>,
    }

    impl CannedTransport {
        fn new(reply: Result<AdminReply>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RpcTransport for CannedTransport {
        fn address(&self) -> &str {
            "node-2:9000"
        }

        async fn call(&self, request: AdminRequest) -> Result<AdminReply> {
            self.seen.lock().unwrap().push(request.method());
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(Error::Network("no reply".into())))
        }
    }

    fn local() -> (LocalRunner, mpsc::UnboundedReceiver<ServiceSignal>) {
        let registry = Arc::new(LockRegistry::new());
        registry.acquire("photos", "a.jpg", LockType::Write, "put");
        let (ctx, rx) = NodeContext::new(registry, None);
        (LocalRunner::new(Arc::new(ctx)), rx)
    }

    #[tokio::test]
    async fn test_local_restart_enqueues_signal() {
        let (runner, mut rx) = local();
        runner.restart().await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), ServiceSignal::Restart);
    }

    #[tokio::test]
    async fn test_local_operations() {
        let (runner, _rx) = local();

        assert!(runner.reinit_disks().await.is_ok());
        assert!(matches!(runner.uptime().await, Err(Error::NotInitialized)));
        assert!(matches!(runner.get_config().await, Err(Error::ConfigAbsent)));

        let locks = runner.list_locks("photos", "", Duration::ZERO).await.unwrap();
        assert_eq!(locks.len(), 1);

        runner.context().mark_booted();
        assert!(runner.uptime().await.is_ok());

        let snapshot = ConfigSnapshot::new(serde_json::json!({ "region": "a" }));
        runner.context().config().set(snapshot.clone());
        let bytes = runner.get_config().await.unwrap();
        assert_eq!(ConfigSnapshot::from_bytes(&bytes).unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_remote_uptime() {
        let transport = CannedTransport::new(Ok(AdminReply::Uptime(Duration::from_secs(90))));
        let runner = RemoteRunner::new(transport.clone());

        assert_eq!(runner.uptime().await.unwrap(), Duration::from_secs(90));
        assert_eq!(*transport.seen.lock().unwrap(), vec!["Admin.Uptime"]);
    }

    #[tokio::test]
    async fn test_remote_passes_transport_error_through() {
        let transport = CannedTransport::new(Err(Error::ConnectionTimeout("node-2:9000".into())));
        let runner = RemoteRunner::new(transport);

        match runner.restart().await {
            Err(Error::ConnectionTimeout(addr)) => assert_eq!(addr, "node-2:9000"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_error_reply() {
        let transport = CannedTransport::new(Ok(AdminReply::Error {
            code: ErrorCode::ConfigAbsent,
            message: "Config not present".into(),
        }));
        let runner = RemoteRunner::new(transport);
        assert!(matches!(runner.get_config().await, Err(Error::ConfigAbsent)));
    }

    #[tokio::test]
    async fn test_remote_unexpected_reply() {
        let transport = CannedTransport::new(Ok(AdminReply::Ack));
        let runner = RemoteRunner::new(transport);
        assert!(matches!(runner.uptime().await, Err(Error::Network(_))));
    }
}
