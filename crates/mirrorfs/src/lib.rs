#![forbid(unsafe_code)]
//! Remote filesystem mirroring protocol library.
//!
//! This crate implements both halves of a simple encrypted RPC protocol
//! for mounting a remote directory as a local filesystem: a client engine
//! that turns filesystem callbacks into remote calls, and a server engine
//! that answers them against a pluggable local store.
//!
//! # Overview
//!
//! A session is one TCP connection. It opens unsecured (payloads are
//! gzip-compressed) and is upgraded exactly once by an ephemeral x25519
//! handshake to AES-256-GCM. After securing, the client registers a root
//! directory and then drives a strict request/response alternation: one
//! call in flight per session, no call identifiers, no pipelining.
//!
//! # Layers
//!
//! - [`frame`]: length-prefixed framing over any `Read + Write` stream
//! - [`serialize`]: the typed value codec ([`Message`] to bytes and back)
//! - [`session`]: compression/encryption transforms and the handshake
//! - [`call`]: the typed method registry ([`Call`])
//! - [`client`] / [`srv`]: the two engine halves
//! - [`vfs`]: the filesystem callback contract and its remote-backed
//!   implementation
//! - [`pattern`]: wildcard matching for directory enumeration
//!
//! # Server Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mirrorfs::srv::serve_addr;
//! # struct MyStore;
//! # impl mirrorfs::srv::Store for MyStore {
//! #     fn exists(&self, _: &str, _: bool) -> bool { false }
//! #     fn attributes(&self, _: &str) -> std::io::Result<mirrorfs::FileAttributes> { unimplemented!() }
//! #     fn metadata(&self, _: &str) -> std::io::Result<mirrorfs::Metadata> { unimplemented!() }
//! #     fn create(&self, _: &str, _: bool) -> std::io::Result<()> { unimplemented!() }
//! #     fn read(&self, _: &str, _: i64, _: i32) -> std::io::Result<Vec<u8>> { unimplemented!() }
//! #     fn write(&self, _: &str, _: i64, _: &[u8]) -> std::io::Result<i32> { unimplemented!() }
//! #     fn set_attributes(&self, _: &str, _: mirrorfs::FileAttributes) -> std::io::Result<()> { unimplemented!() }
//! #     fn set_times(&self, _: &str, _: Option<mirrorfs::Timestamp>, _: Option<mirrorfs::Timestamp>, _: Option<mirrorfs::Timestamp>) -> std::io::Result<()> { unimplemented!() }
//! #     fn delete_file(&self, _: &str) -> std::io::Result<()> { unimplemented!() }
//! #     fn delete_directory(&self, _: &str) -> std::io::Result<()> { unimplemented!() }
//! #     fn rename(&self, _: &str, _: &str) -> std::io::Result<()> { unimplemented!() }
//! #     fn list_children(&self, _: &str) -> std::io::Result<Vec<mirrorfs::Metadata>> { unimplemented!() }
//! # }
//!
//! fn main() -> mirrorfs::Result<()> {
//!     serve_addr("0.0.0.0:1337", Arc::new(MyStore))
//! }
//! ```
//!
//! # Client Example
//!
//! ```no_run
//! use mirrorfs::client::Client;
//! use mirrorfs::vfs::{FsHandler, OpenMode, RemoteFs};
//!
//! fn main() -> mirrorfs::Result<()> {
//!     let client = Client::connect("127.0.0.1:1337", "exports/alpha")?;
//!     let fs = RemoteFs::new(client);
//!     let status = fs.open("/readme.txt", OpenMode::Open, false);
//!     println!("{status:?}");
//!     Ok(())
//! }
//! ```
pub mod call;
pub mod client;
pub mod error;
pub mod frame;
pub mod message;
pub mod pattern;
pub mod serialize;
pub mod session;
pub mod srv;
pub mod utils;
pub mod vfs;

pub use crate::call::Call;
pub use crate::client::{Client, RemoteOps};
pub use crate::error::Error;
pub use crate::message::{
    Data, FileAttributes, Header, Message, Metadata, Status, Timestamp, Value, DEFAULT_PORT,
};
pub use crate::session::Session;
pub use crate::utils::Result;
