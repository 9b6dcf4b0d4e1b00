//! Protocol data types and constants.
//!
//! One protocol unit is a [`Message`]: a header tag followed by an ordered
//! sequence of typed [`Value`]s. The value set is closed: anything a remote
//! call can carry is one of these shapes.

use bitflags::bitflags;
use enum_primitive::*;

use crate::error::Error;
use crate::utils::Result;

/// Default server port.
pub const DEFAULT_PORT: u16 = 1337;

/// Upper bound on a single frame. Anything larger is a protocol violation.
pub const MAX_FRAME: u32 = 64 << 20;

enum_from_primitive! {
    #[doc = "Header tag, the first byte of every decoded message"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub enum Header {
        // Historical fire-and-forget variant of MethodCall. Still accepted
        // on receive; both block for exactly one response.
        Call        = 0x01,
        Return      = 0x02,
        Handshake   = 0x03,
        MethodCall  = 0x04,
        Error       = 0x05,
    }
}

enum_from_primitive! {
    #[doc = "Filesystem result codes, the normal return value of every remote primitive"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub enum Status {
        Success             = 0x0000_0000,
        ObjectNameExists    = 0x4000_0000,
        Error               = 0xC000_0001,
        NotImplemented      = 0xC000_0002,
        AccessDenied        = 0xC000_0022,
        ObjectNameNotFound  = 0xC000_0034,
        ObjectNameCollision = 0xC000_0035,
        ObjectPathNotFound  = 0xC000_003A,
    }
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(*self, Status::Success)
    }
}

bitflags! {
    /// File attribute bits carried in metadata records.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
    pub struct FileAttributes: u32 {
        const READONLY  = 0x0001;
        const HIDDEN    = 0x0002;
        const SYSTEM    = 0x0004;
        const DIRECTORY = 0x0010;
        const ARCHIVE   = 0x0020;
        const NORMAL    = 0x0080;
        const OFFLINE   = 0x1000;
    }
}

impl FileAttributes {
    pub fn is_directory(&self) -> bool {
        self.contains(FileAttributes::DIRECTORY)
    }
}

/// Unix-epoch timestamp.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: u32,
}

impl Timestamp {
    pub fn from_unix(sec: i64, nsec: u32) -> Timestamp {
        Timestamp { sec, nsec }
    }
}

/// One file or directory as reported by metadata and enumeration calls.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Metadata {
    /// Last path element, not the full path.
    pub name: String,
    pub attr: FileAttributes,
    pub created: Option<Timestamp>,
    pub accessed: Option<Timestamp>,
    pub modified: Option<Timestamp>,
    /// Logical length in bytes. Zero for directories.
    pub len: i64,
}

/// Raw byte block carried by `Read`, `Write` and handshake messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Data(pub Vec<u8>);

/// A single typed value inside a message.
///
/// The set is closed by construction; the codec refuses anything else on
/// the wire with a codec error rather than guessing.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    Str(String),
    Bytes(Data),
    Time(Option<Timestamp>),
    Attr(FileAttributes),
    Status(Status),
    Meta(Metadata),
    MetaList(Vec<Metadata>),
}

impl Value {
    /// Wire tag for this value shape.
    pub fn tag(&self) -> u8 {
        match *self {
            Value::Bool(..) => 0x01,
            Value::I32(..) => 0x02,
            Value::I64(..) => 0x03,
            Value::U32(..) => 0x04,
            Value::U64(..) => 0x05,
            Value::Str(..) => 0x06,
            Value::Bytes(..) => 0x07,
            Value::Time(..) => 0x08,
            Value::Attr(..) => 0x09,
            Value::Status(..) => 0x0A,
            Value::Meta(..) => 0x0B,
            Value::MetaList(..) => 0x0C,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match *self {
            Value::Bool(..) => "bool",
            Value::I32(..) => "i32",
            Value::I64(..) => "i64",
            Value::U32(..) => "u32",
            Value::U64(..) => "u64",
            Value::Str(..) => "str",
            Value::Bytes(..) => "bytes",
            Value::Time(..) => "time",
            Value::Attr(..) => "attr",
            Value::Status(..) => "status",
            Value::Meta(..) => "meta",
            Value::MetaList(..) => "meta-list",
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(v),
            other => Err(type_mismatch("bool", &other)),
        }
    }

    pub fn into_i32(self) -> Result<i32> {
        match self {
            Value::I32(v) => Ok(v),
            other => Err(type_mismatch("i32", &other)),
        }
    }

    pub fn into_i64(self) -> Result<i64> {
        match self {
            Value::I64(v) => Ok(v),
            other => Err(type_mismatch("i64", &other)),
        }
    }

    pub fn into_str(self) -> Result<String> {
        match self {
            Value::Str(v) => Ok(v),
            other => Err(type_mismatch("str", &other)),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Value::Bytes(Data(v)) => Ok(v),
            other => Err(type_mismatch("bytes", &other)),
        }
    }

    pub fn into_time(self) -> Result<Option<Timestamp>> {
        match self {
            Value::Time(v) => Ok(v),
            other => Err(type_mismatch("time", &other)),
        }
    }

    pub fn into_attr(self) -> Result<FileAttributes> {
        match self {
            Value::Attr(v) => Ok(v),
            other => Err(type_mismatch("attr", &other)),
        }
    }

    pub fn into_status(self) -> Result<Status> {
        match self {
            Value::Status(v) => Ok(v),
            other => Err(type_mismatch("status", &other)),
        }
    }

    pub fn into_meta(self) -> Result<Metadata> {
        match self {
            Value::Meta(v) => Ok(v),
            other => Err(type_mismatch("meta", &other)),
        }
    }

    pub fn into_meta_list(self) -> Result<Vec<Metadata>> {
        match self {
            Value::MetaList(v) => Ok(v),
            other => Err(type_mismatch("meta-list", &other)),
        }
    }
}

fn type_mismatch(wanted: &str, got: &Value) -> Error {
    Error::Codec(format!("expected {}, got {}", wanted, got.type_name()))
}

/// One protocol unit: a header tag plus its operation-specific values.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Message {
    pub header: Header,
    pub values: Vec<Value>,
}

impl Message {
    pub fn new(header: Header, values: Vec<Value>) -> Message {
        Message { header, values }
    }

    /// A handshake message carrying public key material.
    pub fn handshake(key: Vec<u8>) -> Message {
        Message::new(Header::Handshake, vec![Value::Bytes(Data(key))])
    }

    /// A successful response carrying the method's result.
    pub fn ret(value: Value) -> Message {
        Message::new(Header::Return, vec![value])
    }

    /// An opaque error response. Deliberately carries no detail.
    pub fn error() -> Message {
        Message::new(Header::Error, Vec::new())
    }
}
