//! RPC engine, client half.
//!
//! A [`Client`] owns one secured session and blocks each caller for the
//! full request/response round trip. The protocol admits one in-flight
//! call per session, so the session lives behind a mutex that is held
//! from send to receive.

use log::debug;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;

use crate::call::Call;
use crate::error::Error;
use crate::message::{FileAttributes, Header, Metadata, Status, Timestamp, Value};
use crate::session::Session;
use crate::utils::Result;

/// The remote primitive set, one method per wire call.
///
/// [`Client`] is the production implementation; the translator in
/// [`crate::vfs`] is generic over this trait so its resolution logic can
/// be exercised without a live server.
pub trait RemoteOps {
    fn exists(&self, path: &str, is_dir: bool) -> Result<bool>;
    fn get_attributes(&self, path: &str) -> Result<FileAttributes>;
    fn get_metadata(&self, path: &str) -> Result<Metadata>;
    fn get_file_size(&self, path: &str) -> Result<i64>;
    fn create(&self, path: &str, is_dir: bool) -> Result<bool>;
    fn read(&self, path: &str, offset: i64, len: i32) -> Result<Vec<u8>>;
    fn write(&self, path: &str, offset: i64, data: Vec<u8>) -> Result<i32>;
    fn set_attributes(&self, path: &str, attr: FileAttributes) -> Result<Status>;
    fn set_times(
        &self,
        path: &str,
        created: Option<Timestamp>,
        accessed: Option<Timestamp>,
        modified: Option<Timestamp>,
    ) -> Result<Status>;
    fn delete_file(&self, path: &str) -> Result<Status>;
    fn delete_directory(&self, path: &str) -> Result<Status>;
    fn move_entry(&self, old: &str, new: &str, replace: bool, is_dir: bool) -> Result<Status>;
    fn list_children(&self, path: &str, pattern: &str) -> Result<Vec<Metadata>>;
}

/// A connected, secured client session.
pub struct Client {
    session: Mutex<Session<TcpStream>>,
}

impl Client {
    /// Connect, run the handshake, and bind the session to `root` on the
    /// server's export.
    pub fn connect<A: ToSocketAddrs>(addr: A, root: &str) -> Result<Client> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| Error::Connection(format!("connect failed: {e}")))?;
        let mut session = Session::new(stream);
        session.secure_client()?;

        let client = Client {
            session: Mutex::new(session),
        };
        client.register_root(root)?;
        Ok(client)
    }

    /// Bind every subsequent path argument under `root`.
    pub fn register_root(&self, root: &str) -> Result<bool> {
        self.call(Call::RegisterRoot {
            root: root.to_owned(),
        })?
        .into_bool()
    }

    /// One full round trip: send the call, block for its response.
    fn call(&self, call: Call) -> Result<Value> {
        debug!("call {}", call.identifier());
        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Connection("session poisoned by an earlier failure".to_owned()))?;

        session.send(&call.into_message())?;
        let reply = session.recv()?;
        match reply.header {
            Header::Return => reply
                .values
                .into_iter()
                .next()
                .ok_or_else(|| Error::Codec("return carried no value".to_owned())),
            Header::Error => Err(Error::RemoteExecution),
            other => Err(Error::ProtocolViolation(format!(
                "expected a return, got {other:?}"
            ))),
        }
    }
}

impl RemoteOps for Client {
    fn exists(&self, path: &str, is_dir: bool) -> Result<bool> {
        self.call(Call::Exists {
            path: path.to_owned(),
            is_dir,
        })?
        .into_bool()
    }

    fn get_attributes(&self, path: &str) -> Result<FileAttributes> {
        self.call(Call::GetAttributes {
            path: path.to_owned(),
        })?
        .into_attr()
    }

    fn get_metadata(&self, path: &str) -> Result<Metadata> {
        self.call(Call::GetMetadata {
            path: path.to_owned(),
        })?
        .into_meta()
    }

    fn get_file_size(&self, path: &str) -> Result<i64> {
        self.call(Call::GetFileSize {
            path: path.to_owned(),
        })?
        .into_i64()
    }

    fn create(&self, path: &str, is_dir: bool) -> Result<bool> {
        self.call(Call::Create {
            path: path.to_owned(),
            is_dir,
        })?
        .into_bool()
    }

    fn read(&self, path: &str, offset: i64, len: i32) -> Result<Vec<u8>> {
        self.call(Call::Read {
            path: path.to_owned(),
            offset,
            len,
        })?
        .into_bytes()
    }

    fn write(&self, path: &str, offset: i64, data: Vec<u8>) -> Result<i32> {
        self.call(Call::Write {
            path: path.to_owned(),
            offset,
            data,
        })?
        .into_i32()
    }

    fn set_attributes(&self, path: &str, attr: FileAttributes) -> Result<Status> {
        self.call(Call::SetAttributes {
            path: path.to_owned(),
            attr,
        })?
        .into_status()
    }

    fn set_times(
        &self,
        path: &str,
        created: Option<Timestamp>,
        accessed: Option<Timestamp>,
        modified: Option<Timestamp>,
    ) -> Result<Status> {
        self.call(Call::SetTimes {
            path: path.to_owned(),
            created,
            accessed,
            modified,
        })?
        .into_status()
    }

    fn delete_file(&self, path: &str) -> Result<Status> {
        self.call(Call::DeleteFile {
            path: path.to_owned(),
        })?
        .into_status()
    }

    fn delete_directory(&self, path: &str) -> Result<Status> {
        self.call(Call::DeleteDirectory {
            path: path.to_owned(),
        })?
        .into_status()
    }

    fn move_entry(&self, old: &str, new: &str, replace: bool, is_dir: bool) -> Result<Status> {
        self.call(Call::Move {
            old: old.to_owned(),
            new: new.to_owned(),
            replace,
            is_dir,
        })?
        .into_status()
    }

    fn list_children(&self, path: &str, pattern: &str) -> Result<Vec<Metadata>> {
        self.call(Call::ListChildren {
            path: path.to_owned(),
            pattern: pattern.to_owned(),
        })?
        .into_meta_list()
    }
}
