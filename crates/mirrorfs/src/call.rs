//! The remote method registry.
//!
//! Every primitive the protocol can invoke is one variant of [`Call`], with
//! typed fields. Dispatch on either end is a plain `match`; there is no
//! name-based reflection, the string identifier exists only on the wire.

use crate::error::Error;
use crate::message::{Data, FileAttributes, Header, Message, Timestamp, Value};
use crate::utils::Result;

/// One remote filesystem primitive with its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    /// Bind this session to a subdirectory of the export. All later paths
    /// are resolved relative to it.
    RegisterRoot {
        root: String,
    },
    Exists {
        path: String,
        is_dir: bool,
    },
    GetAttributes {
        path: String,
    },
    GetMetadata {
        path: String,
    },
    GetFileSize {
        path: String,
    },
    Create {
        path: String,
        is_dir: bool,
    },
    Read {
        path: String,
        offset: i64,
        len: i32,
    },
    Write {
        path: String,
        offset: i64,
        data: Vec<u8>,
    },
    SetAttributes {
        path: String,
        attr: FileAttributes,
    },
    /// Absent timestamps are left untouched on the target.
    SetTimes {
        path: String,
        created: Option<Timestamp>,
        accessed: Option<Timestamp>,
        modified: Option<Timestamp>,
    },
    DeleteFile {
        path: String,
    },
    DeleteDirectory {
        path: String,
    },
    Move {
        old: String,
        new: String,
        replace: bool,
        is_dir: bool,
    },
    ListChildren {
        path: String,
        pattern: String,
    },
}

impl Call {
    /// The wire name of this primitive.
    pub fn identifier(&self) -> &'static str {
        match *self {
            Call::RegisterRoot { .. } => "RegisterClientRoot",
            Call::Exists { .. } => "Exists",
            Call::GetAttributes { .. } => "GetAttributes",
            Call::GetMetadata { .. } => "GetMetadata",
            Call::GetFileSize { .. } => "GetFileSize",
            Call::Create { .. } => "Create",
            Call::Read { .. } => "Read",
            Call::Write { .. } => "Write",
            Call::SetAttributes { .. } => "SetAttributes",
            Call::SetTimes { .. } => "SetTimes",
            Call::DeleteFile { .. } => "DeleteFile",
            Call::DeleteDirectory { .. } => "DeleteDirectory",
            Call::Move { .. } => "MoveFile",
            Call::ListChildren { .. } => "FindFiles",
        }
    }

    /// Lower this call into its wire message.
    pub fn into_message(self) -> Message {
        let id = Value::Str(self.identifier().to_owned());
        let mut values = vec![id];
        match self {
            Call::RegisterRoot { root } => {
                values.push(Value::Str(root));
            }
            Call::Exists { path, is_dir } | Call::Create { path, is_dir } => {
                values.push(Value::Str(path));
                values.push(Value::Bool(is_dir));
            }
            Call::GetAttributes { path }
            | Call::GetMetadata { path }
            | Call::GetFileSize { path }
            | Call::DeleteFile { path }
            | Call::DeleteDirectory { path } => {
                values.push(Value::Str(path));
            }
            Call::Read { path, offset, len } => {
                values.push(Value::Str(path));
                values.push(Value::I64(offset));
                values.push(Value::I32(len));
            }
            Call::Write { path, offset, data } => {
                values.push(Value::Str(path));
                values.push(Value::I64(offset));
                values.push(Value::Bytes(Data(data)));
            }
            Call::SetAttributes { path, attr } => {
                values.push(Value::Str(path));
                values.push(Value::Attr(attr));
            }
            Call::SetTimes {
                path,
                created,
                accessed,
                modified,
            } => {
                values.push(Value::Str(path));
                values.push(Value::Time(created));
                values.push(Value::Time(accessed));
                values.push(Value::Time(modified));
            }
            Call::Move {
                old,
                new,
                replace,
                is_dir,
            } => {
                values.push(Value::Str(old));
                values.push(Value::Str(new));
                values.push(Value::Bool(replace));
                values.push(Value::Bool(is_dir));
            }
            Call::ListChildren { path, pattern } => {
                values.push(Value::Str(path));
                values.push(Value::Str(pattern));
            }
        }
        Message::new(Header::MethodCall, values)
    }

    /// Parse and type-check a received call message.
    ///
    /// The historical `Call` header is accepted alongside `MethodCall`;
    /// both carry identical payloads and both expect one response.
    pub fn from_message(msg: Message) -> Result<Call> {
        match msg.header {
            Header::Call | Header::MethodCall => {}
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "expected a method call, got {other:?}"
                )));
            }
        }

        let mut args = Args::new(msg.values);
        let id = args.str()?;
        let call = match id.as_str() {
            "RegisterClientRoot" => Call::RegisterRoot { root: args.str()? },
            "Exists" => Call::Exists {
                path: args.str()?,
                is_dir: args.bool()?,
            },
            "GetAttributes" => Call::GetAttributes { path: args.str()? },
            "GetMetadata" => Call::GetMetadata { path: args.str()? },
            "GetFileSize" => Call::GetFileSize { path: args.str()? },
            "Create" => Call::Create {
                path: args.str()?,
                is_dir: args.bool()?,
            },
            "Read" => Call::Read {
                path: args.str()?,
                offset: args.i64()?,
                len: args.i32()?,
            },
            "Write" => Call::Write {
                path: args.str()?,
                offset: args.i64()?,
                data: args.bytes()?,
            },
            "SetAttributes" => Call::SetAttributes {
                path: args.str()?,
                attr: args.attr()?,
            },
            "SetTimes" => Call::SetTimes {
                path: args.str()?,
                created: args.time()?,
                accessed: args.time()?,
                modified: args.time()?,
            },
            "DeleteFile" => Call::DeleteFile { path: args.str()? },
            "DeleteDirectory" => Call::DeleteDirectory { path: args.str()? },
            "MoveFile" => Call::Move {
                old: args.str()?,
                new: args.str()?,
                replace: args.bool()?,
                is_dir: args.bool()?,
            },
            "FindFiles" => Call::ListChildren {
                path: args.str()?,
                pattern: args.str()?,
            },
            unknown => {
                return Err(Error::ProtocolViolation(format!(
                    "unknown method {unknown:?}"
                )));
            }
        };
        args.finish()?;
        Ok(call)
    }
}

/// Ordered argument cursor over a message's values.
struct Args {
    values: std::vec::IntoIter<Value>,
}

impl Args {
    fn new(values: Vec<Value>) -> Args {
        Args {
            values: values.into_iter(),
        }
    }

    fn next(&mut self) -> Result<Value> {
        self.values
            .next()
            .ok_or_else(|| Error::Codec("method call is missing arguments".to_owned()))
    }

    fn str(&mut self) -> Result<String> {
        self.next()?.into_str()
    }

    fn bool(&mut self) -> Result<bool> {
        self.next()?.into_bool()
    }

    fn i32(&mut self) -> Result<i32> {
        self.next()?.into_i32()
    }

    fn i64(&mut self) -> Result<i64> {
        self.next()?.into_i64()
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        self.next()?.into_bytes()
    }

    fn time(&mut self) -> Result<Option<Timestamp>> {
        self.next()?.into_time()
    }

    fn attr(&mut self) -> Result<FileAttributes> {
        self.next()?.into_attr()
    }

    fn finish(mut self) -> Result<()> {
        if self.values.next().is_some() {
            return Err(Error::Codec("method call has surplus arguments".to_owned()));
        }
        Ok(())
    }
}
