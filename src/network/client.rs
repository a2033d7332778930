//! Admin RPC Client
//!
//! TCP client bound to one peer and the shared cluster credential.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{read_message, write_message, RpcTransport};
use crate::error::{Error, Result};
use crate::rpc::{AdminReply, AdminRequest, Credential, RpcMessage};

/// Authenticated RPC client for one peer
pub struct AuthRpcClient {
    /// Peer address (host:port)
    address: String,
    /// Credential sent with every request
    credential: Credential,
    /// Cached connection, reused between calls
    conn: Mutex<Option<TcpStream>>,
    /// Connection timeout
    connect_timeout: Duration,
    /// Request timeout
    request_timeout: Duration,
}

impl AuthRpcClient {
    /// Create a new client; no connection is made until the first call
    pub fn new(
        address: String,
        credential: Credential,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            address,
            credential,
            conn: Mutex::new(None),
            connect_timeout,
            request_timeout,
        }
    }

    /// Send without timeout wrapper.
    ///
    /// A request is resent on a fresh connection only when writing it to
    /// the cached one failed. Once the request is written, a lost reply is
    /// returned as an error; the peer may already have acted on it.
    async fn call_inner(&self, message: RpcMessage) -> Result<AdminReply> {
        let mut conn = self.conn.lock().await;

        let cached = conn.take().filter(|stream| {
            let open = is_open(stream);
            if !open {
                tracing::debug!("Dropping closed connection to {}", self.address);
            }
            open
        });

        let mut stream = match cached {
            Some(mut stream) => match write_message(&mut stream, &message).await {
                Ok(()) => stream,
                Err(e) => {
                    tracing::debug!("Dropping stale connection to {}: {}", self.address, e);
                    self.connect_and_send(&message).await?
                }
            },
            None => self.connect_and_send(&message).await?,
        };

        let reply = receive(&mut stream).await?;
        *conn = Some(stream);
        Ok(reply)
    }

    async fn connect_and_send(&self, message: &RpcMessage) -> Result<TcpStream> {
        let mut stream = self.connect().await?;
        write_message(&mut stream, message).await?;
        Ok(stream)
    }

    /// Connect to the peer
    async fn connect(&self) -> Result<TcpStream> {
        let result = timeout(self.connect_timeout, TcpStream::connect(&self.address)).await;

        match result {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                address: self.address.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionTimeout(self.address.clone())),
        }
    }
}

/// Whether a cached stream still looks usable: no EOF or error pending
fn is_open(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 1];
    match stream.try_read(&mut buf) {
        Err(e) => e.kind() == std::io::ErrorKind::WouldBlock,
        // EOF, or bytes nobody asked for
        Ok(_) => false,
    }
}

/// Wait for the reply to a request already written to `stream`
async fn receive(stream: &mut TcpStream) -> Result<AdminReply> {
    match read_message(stream).await? {
        RpcMessage::Reply(reply) => Ok(reply),
        RpcMessage::Request { .. } => Err(Error::Network("peer answered with a request".into())),
    }
}

#[async_trait]
impl RpcTransport for AuthRpcClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, request: AdminRequest) -> Result<AdminReply> {
        tracing::trace!("Calling {} on {}", request.method(), self.address);

        let message = RpcMessage::Request {
            credential: self.credential.clone(),
            request,
        };

        match timeout(self.request_timeout, self.call_inner(message)).await {
            Ok(inner) => inner,
            // the stream in flight was taken out of the cache and is dropped here
            Err(_) => Err(Error::ConnectionTimeout(self.address.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn client(address: String) -> AuthRpcClient {
        AuthRpcClient::new(
            address,
            Credential::new("admin", "secret123"),
            Duration::from_millis(500),
            Duration::from_secs(2),
        )
    }

    /// Peer that acks `replies_per_conn` requests per connection, then hangs
    /// up. Restarts are counted and never answered.
    async fn flaky_peer(replies_per_conn: usize) -> (String, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let connections = Arc::new(AtomicUsize::new(0));
        let restarts = Arc::new(AtomicUsize::new(0));

        let (conns, execs) = (Arc::clone(&connections), Arc::clone(&restarts));
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                conns.fetch_add(1, Ordering::SeqCst);
                let execs = Arc::clone(&execs);
                tokio::spawn(async move {
                    for _ in 0..replies_per_conn {
                        match read_message(&mut socket).await {
                            Ok(RpcMessage::Request { request: AdminRequest::Restart, .. }) => {
                                execs.fetch_add(1, Ordering::SeqCst);
                                return;
                            }
                            Ok(_) => {
                                let ack = RpcMessage::Reply(AdminReply::Ack);
                                write_message(&mut socket, &ack).await.unwrap();
                            }
                            Err(_) => return,
                        }
                    }
                });
            }
        });

        (address, connections, restarts)
    }

    #[tokio::test]
    async fn test_lost_reply_is_not_resent() {
        let (address, connections, restarts) = flaky_peer(2).await;
        let client = client(address);

        assert!(matches!(client.call(AdminRequest::ReInitDisks).await, Ok(AdminReply::Ack)));

        // Written on the cached connection, which closes without an answer
        assert!(client.call(AdminRequest::Restart).await.is_err());
        assert_eq!(restarts.load(Ordering::SeqCst), 1);
        assert_eq!(connections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_connection_is_replaced() {
        let (address, connections, _) = flaky_peer(1).await;
        let client = client(address);

        assert!(matches!(client.call(AdminRequest::Uptime).await, Ok(AdminReply::Ack)));
        // let the peer's hang-up reach us
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(matches!(client.call(AdminRequest::Uptime).await, Ok(AdminReply::Ack)));
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let client = AuthRpcClient::new(
            "127.0.0.1:1".to_string(),
            Credential::new("admin", "secret123"),
            Duration::from_millis(200),
            Duration::from_millis(500),
        );

        let result = client.call(AdminRequest::Uptime).await;
        assert!(matches!(
            result,
            Err(Error::ConnectionFailed { .. }) | Err(Error::ConnectionTimeout(_))
        ));
        assert_eq!(client.address(), "127.0.0.1:1");
    }

    #[tokio::test]
    async fn test_request_timeout() {
        // Accepts but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let _accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = AuthRpcClient::new(
            address.clone(),
            Credential::new("admin", "secret123"),
            Duration::from_millis(500),
            Duration::from_millis(200),
        );

        match client.call(AdminRequest::Uptime).await {
            Err(Error::ConnectionTimeout(addr)) => assert_eq!(addr, address),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
