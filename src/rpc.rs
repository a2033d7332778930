//! Admin RPC Protocol
//!
//! Defines the messages exchanged between admin peers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Error;
use crate::locks::LockRecord;

/// Shared cluster credential carried by every admin request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_key: String,
    pub secret_key: String,
}

impl Credential {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

/// Admin operations a peer can be asked to perform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdminRequest {
    Restart,
    ListLocks {
        namespace: String,
        prefix: String,
        min_age: Duration,
    },
    ReInitDisks,
    Uptime,
    GetConfig,
}

impl AdminRequest {
    /// RPC method name (for logging)
    pub fn method(&self) -> &'static str {
        match self {
            AdminRequest::Restart => "Admin.Restart",
            AdminRequest::ListLocks { .. } => "Admin.ListLocks",
            AdminRequest::ReInitDisks => "Admin.ReInitDisks",
            AdminRequest::Uptime => "Admin.Uptime",
            AdminRequest::GetConfig => "Admin.GetConfig",
        }
    }
}

/// Replies to admin requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdminReply {
    /// Plain acknowledgement (Restart, ReInitDisks)
    Ack,
    Locks(Vec<LockRecord>),
    Uptime(Duration),
    Config(Vec<u8>),
    Error { code: ErrorCode, message: String },
}

impl AdminReply {
    /// Build an error reply from a local failure
    pub fn from_error(err: &Error) -> Self {
        let code = match err {
            Error::NotInitialized => ErrorCode::NotInitialized,
            Error::ConfigAbsent => ErrorCode::ConfigAbsent,
            Error::Unauthorized => ErrorCode::Unauthorized,
            _ => ErrorCode::Internal,
        };
        AdminReply::Error {
            code,
            message: err.to_string(),
        }
    }

    /// Get the reply type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            AdminReply::Ack => "Ack",
            AdminReply::Locks(_) => "Locks",
            AdminReply::Uptime(_) => "Uptime",
            AdminReply::Config(_) => "Config",
            AdminReply::Error { .. } => "Error",
        }
    }
}

/// Error codes for admin replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotInitialized,
    ConfigAbsent,
    Unauthorized,
    Internal,
}

impl ErrorCode {
    /// Map a reply error back onto the local error taxonomy
    pub fn into_error(self, message: String) -> Error {
        match self {
            ErrorCode::NotInitialized => Error::NotInitialized,
            ErrorCode::ConfigAbsent => Error::ConfigAbsent,
            ErrorCode::Unauthorized => Error::Unauthorized,
            ErrorCode::Internal => Error::Remote(message),
        }
    }
}

/// Envelope sent over the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcMessage {
    Request {
        credential: Credential,
        request: AdminRequest,
    },
    Reply(AdminReply),
}

impl RpcMessage {
    /// Serialize message to bytes
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Prefix of every admin RPC frame: body length and CRC32 of the
/// bincode-encoded [`RpcMessage`] that follows.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Body length in bytes, never above [`FrameHeader::MAX_BODY`]
    pub length: u32,
    /// CRC32 of the body
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Largest body either side will send or accept
    pub const MAX_BODY: u32 = 64 * 1024 * 1024;

    /// Frame an encoded message body; fails if the body is over the limit
    pub fn new(body: &[u8]) -> crate::Result<Self> {
        Ok(Self {
            length: Self::check_length(body.len())?,
            checksum: crc32fast::hash(body),
        })
    }

    /// Check a body length against [`FrameHeader::MAX_BODY`]
    pub fn check_length(len: usize) -> crate::Result<u32> {
        match u32::try_from(len) {
            Ok(length) if length <= Self::MAX_BODY => Ok(length),
            _ => Err(Error::Network(format!(
                "Message of {} bytes exceeds frame limit",
                len
            ))),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let [l0, l1, l2, l3, c0, c1, c2, c3] = *bytes;
        Self {
            length: u32::from_le_bytes([l0, l1, l2, l3]),
            checksum: u32::from_le_bytes([c0, c1, c2, c3]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let msg = RpcMessage::Request {
            credential: Credential::new("admin", "secret123"),
            request: AdminRequest::ListLocks {
                namespace: "photos".to_string(),
                prefix: "2024/".to_string(),
                min_age: Duration::from_secs(30),
            },
        };

        let bytes = msg.serialize().unwrap();
        match RpcMessage::deserialize(&bytes).unwrap() {
            RpcMessage::Request { credential, request } => {
                assert_eq!(credential.access_key, "admin");
                assert_eq!(request.method(), "Admin.ListLocks");
                match request {
                    AdminRequest::ListLocks { namespace, prefix, min_age } => {
                        assert_eq!(namespace, "photos");
                        assert_eq!(prefix, "2024/");
                        assert_eq!(min_age, Duration::from_secs(30));
                    }
                    _ => panic!("Wrong request type"),
                }
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_error_reply_mapping() {
        let reply = AdminReply::from_error(&Error::NotInitialized);
        match reply {
            AdminReply::Error { code, message } => {
                assert_eq!(code, ErrorCode::NotInitialized);
                assert!(matches!(code.into_error(message), Error::NotInitialized));
            }
            _ => panic!("Wrong reply type"),
        }

        let reply = AdminReply::from_error(&Error::Internal("disk full".into()));
        match reply {
            AdminReply::Error { code, message } => {
                assert_eq!(code, ErrorCode::Internal);
                assert!(matches!(code.into_error(message), Error::Remote(_)));
            }
            _ => panic!("Wrong reply type"),
        }
    }

    #[test]
    fn test_frame_header() {
        let data = b"test message data";
        let header = FrameHeader::new(data).unwrap();
        let restored = FrameHeader::from_bytes(&header.to_bytes());

        assert_eq!(header.length, restored.length);
        assert_eq!(header.checksum, restored.checksum);
    }

    #[test]
    fn test_frame_length_limit() {
        let max = FrameHeader::MAX_BODY as usize;
        assert_eq!(FrameHeader::check_length(max).unwrap(), FrameHeader::MAX_BODY);
        assert!(matches!(FrameHeader::check_length(max + 1), Err(Error::Network(_))));
        assert!(FrameHeader::check_length(u32::MAX as usize + 1).is_err());
    }
}
