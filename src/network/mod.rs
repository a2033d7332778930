//! Network Module
//!
//! Framed TCP transport for admin RPC between nodes.

mod client;
mod server;

pub use client::AuthRpcClient;
pub use server::AdminRpcServer;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::rpc::{AdminReply, AdminRequest, FrameHeader, RpcMessage};

/// Request/reply channel to one peer.
///
/// Implementations own authentication and any timeout policy; errors are
/// returned to the caller unchanged.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Address of the peer this transport is bound to
    fn address(&self) -> &str;

    /// Issue one admin request and wait for the reply
    async fn call(&self, request: AdminRequest) -> Result<AdminReply>;
}

/// Read one frame and decode the message inside it.
///
/// Oversized frames are refused before the body is read; a checksum
/// mismatch is reported as a network error.
pub async fn read_message<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Result<RpcMessage> {
    use tokio::io::AsyncReadExt;

    let mut prefix = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut prefix).await?;
    let header = FrameHeader::from_bytes(&prefix);
    let length = FrameHeader::check_length(header.length as usize)?;

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body).await?;

    if crc32fast::hash(&body) != header.checksum {
        return Err(Error::Network("Message checksum mismatch".into()));
    }

    Ok(RpcMessage::deserialize(&body)?)
}

/// Encode a message and write it as one frame.
///
/// Nothing is written when the encoded body is over the frame limit.
pub async fn write_message<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    message: &RpcMessage,
) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let body = message.serialize()?;
    let header = FrameHeader::new(&body)?;

    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}
