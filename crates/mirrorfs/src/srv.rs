//! RPC engine, server half: the accept loop, per-session state and the
//! remote primitive handlers.
//!
//! Handlers never let a raw storage error cross the wire. Faults either
//! collapse into the operation's in-band failure value (`false`, `-1`,
//! an offline attribute) or into the bare `Error` header; the detail
//! stays in the server log.

use log::{debug, error, info, warn};
use std::io;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

use crate::call::Call;
use crate::error::Error;
use crate::message::{FileAttributes, Message, Metadata, Status, Timestamp, Value};
use crate::pattern;
use crate::session::Session;
use crate::utils::Result;

/// The local file store the primitive handlers run against.
///
/// All paths are session-scoped relative paths; resolution against real
/// storage (and containment inside it) is the implementation's problem.
pub trait Store: Send + Sync + 'static {
    fn exists(&self, path: &str, is_dir: bool) -> bool;
    fn attributes(&self, path: &str) -> io::Result<FileAttributes>;
    fn metadata(&self, path: &str) -> io::Result<Metadata>;
    fn create(&self, path: &str, is_dir: bool) -> io::Result<()>;
    fn read(&self, path: &str, offset: i64, len: i32) -> io::Result<Vec<u8>>;
    fn write(&self, path: &str, offset: i64, data: &[u8]) -> io::Result<i32>;
    fn set_attributes(&self, path: &str, attr: FileAttributes) -> io::Result<()>;
    fn set_times(
        &self,
        path: &str,
        created: Option<Timestamp>,
        accessed: Option<Timestamp>,
        modified: Option<Timestamp>,
    ) -> io::Result<()>;
    fn delete_file(&self, path: &str) -> io::Result<()>;
    fn delete_directory(&self, path: &str) -> io::Result<()>;
    fn rename(&self, old: &str, new: &str) -> io::Result<()>;
    fn list_children(&self, path: &str) -> io::Result<Vec<Metadata>>;
}

/// Per-connection state. One per session, never shared.
#[derive(Default)]
struct SessionCtx {
    root: Option<String>,
}

impl SessionCtx {
    /// Resolve a client path against the registered session root.
    fn scoped(&self, path: &str) -> String {
        let path = path.replace('\\', "/");
        let rel = path.trim_start_matches('/');
        match self.root {
            Some(ref root) if !root.is_empty() => format!("{root}/{rel}"),
            _ => rel.to_owned(),
        }
    }
}

/// Map a storage failure on a status-returning primitive.
fn status_of(result: io::Result<()>, dir_op: bool) -> Status {
    match result {
        Ok(()) => Status::Success,
        Err(e) => {
            warn!("primitive failed: {e}");
            match e.kind() {
                io::ErrorKind::PermissionDenied => Status::AccessDenied,
                io::ErrorKind::NotFound if dir_op => Status::ObjectPathNotFound,
                io::ErrorKind::NotFound => Status::ObjectNameNotFound,
                _ => Status::Error,
            }
        }
    }
}

/// Execute one parsed call against the store.
fn dispatch<S: Store>(call: Call, ctx: &mut SessionCtx, store: &S) -> Message {
    debug!("dispatch {}", call.identifier());
    match call {
        Call::RegisterRoot { root } => {
            let root = root.replace('\\', "/");
            let root = root.trim_matches('/').to_owned();
            info!("session root registered: {root:?}");
            ctx.root = Some(root);
            Message::ret(Value::Bool(true))
        }

        Call::Exists { path, is_dir } => {
            Message::ret(Value::Bool(store.exists(&ctx.scoped(&path), is_dir)))
        }

        Call::GetAttributes { path } => match store.attributes(&ctx.scoped(&path)) {
            Ok(attr) => Message::ret(Value::Attr(attr)),
            // An unreadable entry is reported as present but offline.
            Err(e) => {
                warn!("attributes failed: {e}");
                Message::ret(Value::Attr(FileAttributes::OFFLINE))
            }
        },

        Call::GetMetadata { path } => match store.metadata(&ctx.scoped(&path)) {
            Ok(meta) => Message::ret(Value::Meta(meta)),
            Err(e) => {
                warn!("metadata failed: {e}");
                Message::error()
            }
        },

        Call::GetFileSize { path } => match store.metadata(&ctx.scoped(&path)) {
            Ok(meta) => Message::ret(Value::I64(meta.len)),
            Err(e) => {
                warn!("file size failed: {e}");
                Message::error()
            }
        },

        Call::Create { path, is_dir } => match store.create(&ctx.scoped(&path), is_dir) {
            Ok(()) => Message::ret(Value::Bool(true)),
            Err(e) => {
                warn!("create failed: {e}");
                Message::ret(Value::Bool(false))
            }
        },

        Call::Read { path, offset, len } => match store.read(&ctx.scoped(&path), offset, len) {
            Ok(data) => Message::ret(Value::Bytes(crate::message::Data(data))),
            Err(e) => {
                warn!("read failed: {e}");
                Message::error()
            }
        },

        Call::Write { path, offset, data } => {
            match store.write(&ctx.scoped(&path), offset, &data) {
                Ok(written) => Message::ret(Value::I32(written)),
                Err(e) => {
                    warn!("write failed: {e}");
                    Message::ret(Value::I32(-1))
                }
            }
        }

        Call::SetAttributes { path, attr } => Message::ret(Value::Status(status_of(
            store.set_attributes(&ctx.scoped(&path), attr),
            false,
        ))),

        Call::SetTimes {
            path,
            created,
            accessed,
            modified,
        } => Message::ret(Value::Status(status_of(
            store.set_times(&ctx.scoped(&path), created, accessed, modified),
            false,
        ))),

        Call::DeleteFile { path } => {
            let path = ctx.scoped(&path);
            let status = if store.exists(&path, true) {
                Status::AccessDenied
            } else if !store.exists(&path, false) {
                Status::ObjectNameNotFound
            } else {
                status_of(store.delete_file(&path), false)
            };
            Message::ret(Value::Status(status))
        }

        Call::DeleteDirectory { path } => {
            let path = ctx.scoped(&path);
            let status = if store.exists(&path, false) {
                Status::AccessDenied
            } else if !store.exists(&path, true) {
                Status::ObjectPathNotFound
            } else {
                status_of(store.delete_directory(&path), true)
            };
            Message::ret(Value::Status(status))
        }

        Call::Move {
            old,
            new,
            replace,
            is_dir,
        } => {
            let old = ctx.scoped(&old);
            let new = ctx.scoped(&new);
            let dest_taken = store.exists(&new, false) || store.exists(&new, true);
            let status = if !dest_taken {
                status_of(store.rename(&old, &new), false)
            } else if replace && !is_dir {
                match store.delete_file(&new) {
                    Ok(()) => status_of(store.rename(&old, &new), false),
                    Err(e) => {
                        warn!("replace-move failed: {e}");
                        Status::Error
                    }
                }
            } else if replace {
                // Directories never replace an existing destination.
                Status::AccessDenied
            } else {
                Status::ObjectNameExists
            };
            Message::ret(Value::Status(status))
        }

        Call::ListChildren { path, pattern } => {
            match store.list_children(&ctx.scoped(&path)) {
                Ok(children) => {
                    let matched: Vec<Metadata> = children
                        .into_iter()
                        .filter(|m| pattern::is_match(&m.name, &pattern))
                        .collect();
                    Message::ret(Value::MetaList(matched))
                }
                Err(e) => {
                    warn!("list failed: {e}");
                    Message::error()
                }
            }
        }
    }
}

/// Drive one connection to completion: handshake, then the strict
/// request/response alternation until the peer disconnects.
pub fn serve_conn<S: Store>(stream: TcpStream, store: Arc<S>) -> Result<()> {
    let mut session = Session::new(stream);
    session.secure_server()?;

    let mut ctx = SessionCtx::default();
    loop {
        let msg = match session.recv() {
            Ok(msg) => msg,
            // Peer hung up between calls.
            Err(Error::Connection(_)) => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("unreadable request: {e}");
                session.send(&Message::error())?;
                continue;
            }
        };

        let reply = match Call::from_message(msg) {
            Ok(call) => dispatch(call, &mut ctx, &*store),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("malformed call: {e}");
                Message::error()
            }
        };
        session.send(&reply)?;
    }
}

/// Accept loop. Each connection gets its own thread and its own session
/// state; a failed connection never takes the listener down.
pub fn serve<S: Store>(listener: TcpListener, store: Arc<S>) -> Result<()> {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_owned());
        info!("connection from {peer}");

        let store = store.clone();
        thread::spawn(move || {
            if let Err(e) = serve_conn(stream, store) {
                error!("session with {peer} ended: {e}");
            }
        });
    }
    Ok(())
}

/// Bind and serve.
pub fn serve_addr<A: ToSocketAddrs, S: Store>(addr: A, store: Arc<S>) -> Result<()> {
    let listener =
        TcpListener::bind(addr).map_err(|e| Error::Connection(format!("bind failed: {e}")))?;
    if let Ok(local) = listener.local_addr() {
        info!("listening on {local}");
    }
    serve(listener, store)
}
