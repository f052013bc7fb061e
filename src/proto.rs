use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client offers AES-256-GCM in its encryption mask.
pub const ENCRYPTION_AES256_GCM: u32 = 1;
/// Client offers ChaCha20-Poly1305 in its encryption mask.
pub const ENCRYPTION_CHACHA20_POLY1305: u32 = 2;

/// Interactive desktop session.
pub const SESSION_TYPE_DESKTOP: u32 = 1;
/// File transfer session.
pub const SESSION_TYPE_FILE_TRANSFER: u32 = 2;
/// System information session.
pub const SESSION_TYPE_SYSTEM_INFO: u32 = 4;

/// Packet request carries no flags.
pub const PACKET_REQUEST_NO_FLAGS: u32 = 0;
/// Packet request asks the reader to close the file and finish immediately.
pub const PACKET_REQUEST_CANCEL: u32 = 1;

/// First packet of a file; carries the total file size.
pub const PACKET_FLAG_FIRST: u32 = 1;
/// Last packet of a file.
pub const PACKET_FLAG_LAST: u32 = 2;

/// Failure encoding or decoding a wire message.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("failed to encode wire message: {0}")]
    Encode(#[source] bincode::Error),
    #[error("malformed wire message: {0}")]
    Decode(#[source] bincode::Error),
}

/// Encodes a wire message for framing.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtoError> {
    bincode::serialize(message).map_err(ProtoError::Encode)
}

/// Decodes a framed payload into the expected message type.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, ProtoError> {
    bincode::deserialize(bytes).map_err(ProtoError::Decode)
}

/// How the client wants to identify itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum IdentifyMethod {
    Srp,
    Anonymous,
}

/// Build version triple exchanged during the session challenge.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// First handshake message, sent by the client in plaintext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientHello {
    pub encryption: u32,
    pub identify: IdentifyMethod,
    /// Ephemeral public key; empty when the client has no key agreement leg.
    pub public_key: Vec<u8>,
    /// Client decrypt IV; empty alongside an empty public key.
    pub iv: Vec<u8>,
}

/// Server's cipher selection, carrying its encrypt IV when a session key exists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerHello {
    pub encryption: u32,
    pub iv: Vec<u8>,
}

/// SRP user identification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SrpIdentify {
    pub username: String,
}

/// Server's SRP group parameters and ephemeral.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SrpServerKeyExchange {
    pub number: Vec<u8>,
    pub generator: Vec<u8>,
    pub salt: Vec<u8>,
    pub b: Vec<u8>,
    pub iv: Vec<u8>,
}

/// Client's SRP ephemeral and fresh decrypt IV.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SrpClientKeyExchange {
    pub a: Vec<u8>,
    pub iv: Vec<u8>,
}

/// Session types offered to the authenticated peer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SessionChallenge {
    pub session_types: u32,
    pub version: Version,
}

/// Peer's chosen session type; exactly one bit must be set.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_type: u32,
    pub version: Version,
}

/// Outcome codes for filesystem operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FileError {
    Success,
    InvalidRequest,
    Unknown,
    PathNotFound,
    PathAlreadyExists,
    InvalidPathName,
    AccessDenied,
    FileOpenError,
    FileCreateError,
    FileReadError,
    FileWriteError,
    NoDrivesFound,
}

/// A chunk of file content in flight.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FilePacket {
    pub flags: u32,
    /// Total file size; meaningful only on the first packet.
    pub file_size: u64,
    pub data: Vec<u8>,
}

impl FilePacket {
    pub fn is_first(&self) -> bool {
        self.flags & PACKET_FLAG_FIRST != 0
    }

    pub fn is_last(&self) -> bool {
        self.flags & PACKET_FLAG_LAST != 0
    }
}

/// Kinds of entries reported by a drive list.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DriveKind {
    Fixed,
    HomeFolder,
    DesktopFolder,
}

/// One mount point or well-known folder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriveListItem {
    pub kind: DriveKind,
    pub path: String,
    pub name: String,
    pub total_space: i64,
    pub free_space: i64,
}

/// Reply payload for a drive list request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DriveList {
    pub items: Vec<DriveListItem>,
}

/// One directory entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileListItem {
    pub name: String,
    pub size: u64,
    pub modification_time: u64,
    pub is_directory: bool,
}

/// Reply payload for a directory listing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileList {
    pub items: Vec<FileListItem>,
}

/// A filesystem operation addressed to an executor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum FileRequest {
    DriveList,
    FileList { path: String },
    CreateDirectory { path: String },
    Rename { old_path: String, new_path: String },
    Remove { path: String },
    Download { path: String },
    Upload { path: String, overwrite: bool },
    PacketRequest { flags: u32 },
    Packet(FilePacket),
}

/// Typed payload of a [`FileReply`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum FileReplyData {
    None,
    DriveList(DriveList),
    FileList(FileList),
    Packet(FilePacket),
}

/// Executor's answer to a [`FileRequest`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileReply {
    pub error_code: FileError,
    pub data: FileReplyData,
}

impl FileReply {
    /// Reply carrying only an error code.
    pub fn status(error_code: FileError) -> Self {
        Self {
            error_code,
            data: FileReplyData::None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code == FileError::Success
    }
}
