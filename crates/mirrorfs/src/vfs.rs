//! Filesystem callback contract and its remote-backed implementation.
//!
//! [`FsHandler`] is the shape a host filesystem driver consumes: one
//! callback per file operation, returning [`Status`] values rather than
//! errors. [`RemoteFs`] implements it purely in terms of remote calls;
//! the only local state is the session itself.

use log::warn;

use crate::client::RemoteOps;
use crate::message::{FileAttributes, Metadata, Status, Timestamp};
use crate::utils::Result;

/// How an open request wants the target to come into being.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing entry.
    Open,
    /// Create, failing if the entry already exists.
    CreateNew,
    /// Create unconditionally, replacing any existing file.
    Create,
    /// Open if present, create otherwise.
    OpenOrCreate,
    /// Open an existing file and discard its contents.
    Truncate,
    /// Open for appending, creating if absent.
    Append,
}

/// Reported free space. The values are fixed; the remote side's real
/// capacity is not queried.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DiskSpace {
    pub available: u64,
    pub total: u64,
    pub free: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeInfo {
    pub label: String,
    pub filesystem: String,
}

const GIB: u64 = 1 << 30;

/// The callback contract a host driver invokes.
///
/// The defaulted methods are intentional stubs: locking, allocation
/// sizing, security descriptors and alternate streams are unsupported
/// and answer with a fixed result.
pub trait FsHandler {
    fn open(&self, path: &str, mode: OpenMode, is_dir: bool) -> Status;
    fn read(&self, path: &str, offset: i64, len: i32) -> (Status, Vec<u8>);
    fn write(&self, path: &str, offset: i64, data: &[u8]) -> (Status, i32);
    fn flush(&self, path: &str) -> Status;
    fn get_metadata(&self, path: &str) -> (Status, Option<Metadata>);
    fn find_files(&self, path: &str, pattern: &str) -> (Status, Vec<Metadata>);
    fn set_attributes(&self, path: &str, attr: FileAttributes) -> Status;
    fn set_times(
        &self,
        path: &str,
        created: Option<Timestamp>,
        accessed: Option<Timestamp>,
        modified: Option<Timestamp>,
    ) -> Status;
    fn delete_file(&self, path: &str) -> Status;
    fn delete_directory(&self, path: &str) -> Status;
    fn move_entry(&self, old: &str, new: &str, replace: bool, is_dir: bool) -> Status;

    fn lock(&self, _path: &str, _offset: i64, _len: i64) -> Status {
        Status::Success
    }

    fn unlock(&self, _path: &str, _offset: i64, _len: i64) -> Status {
        Status::Success
    }

    fn set_end_of_file(&self, _path: &str, _len: i64) -> Status {
        Status::Success
    }

    fn set_allocation_size(&self, _path: &str, _len: i64) -> Status {
        Status::Success
    }

    fn get_disk_free_space(&self) -> DiskSpace {
        DiskSpace {
            available: 10 * GIB,
            total: 20 * GIB,
            free: 10 * GIB,
        }
    }

    fn get_volume_information(&self) -> VolumeInfo {
        VolumeInfo {
            label: "mirrorfs".to_owned(),
            filesystem: "NTFS".to_owned(),
        }
    }

    fn get_file_security(&self, _path: &str) -> Status {
        Status::Error
    }

    fn set_file_security(&self, _path: &str) -> Status {
        Status::Error
    }

    fn find_streams(&self, _path: &str) -> (Status, Vec<Metadata>) {
        (Status::NotImplemented, Vec::new())
    }
}

/// [`FsHandler`] backed entirely by a remote session.
pub struct RemoteFs<C> {
    remote: C,
}

impl<C: RemoteOps> RemoteFs<C> {
    pub fn new(remote: C) -> RemoteFs<C> {
        RemoteFs { remote }
    }

    pub fn remote(&self) -> &C {
        &self.remote
    }

    /// Collapse a transport failure into the callback's generic error.
    /// Status outcomes are data, never errors, so they pass through here.
    fn run<T>(&self, op: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("{op} failed: {e}");
                None
            }
        }
    }

    fn create_as(&self, path: &str, is_dir: bool) -> Status {
        match self.run("create", self.remote.create(path, is_dir)) {
            Some(true) => Status::Success,
            Some(false) | None => Status::Error,
        }
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Status {
        let exists = match self.run("exists", self.remote.exists(path, false)) {
            Some(v) => v,
            None => return Status::Error,
        };
        match mode {
            OpenMode::Open => {
                if exists {
                    Status::Success
                } else {
                    Status::ObjectNameNotFound
                }
            }
            OpenMode::CreateNew => {
                if exists {
                    Status::ObjectNameCollision
                } else {
                    self.create_as(path, false)
                }
            }
            // Create always (re)creates, clobbering prior contents.
            OpenMode::Create => self.create_as(path, false),
            OpenMode::OpenOrCreate | OpenMode::Append => {
                if exists {
                    Status::Success
                } else {
                    self.create_as(path, false)
                }
            }
            OpenMode::Truncate => {
                if exists {
                    self.create_as(path, false)
                } else {
                    Status::ObjectNameNotFound
                }
            }
        }
    }

    fn open_dir(&self, path: &str, mode: OpenMode) -> Status {
        let exists = match self.run("exists", self.remote.exists(path, true)) {
            Some(v) => v,
            None => return Status::Error,
        };
        match mode {
            OpenMode::Open => {
                if exists {
                    Status::Success
                } else {
                    Status::ObjectPathNotFound
                }
            }
            OpenMode::CreateNew => {
                if exists {
                    Status::ObjectNameCollision
                } else {
                    self.create_as(path, true)
                }
            }
            // The remaining modes have no directory meaning.
            _ => Status::Error,
        }
    }

    /// Shared pre-check for byte I/O: directories are not readable or
    /// writable, and the target must already exist.
    fn check_io_target(&self, path: &str) -> Option<Status> {
        match self.run("exists", self.remote.exists(path, true)) {
            Some(true) => return Some(Status::Error),
            Some(false) => {}
            None => return Some(Status::Error),
        }
        match self.run("exists", self.remote.exists(path, false)) {
            Some(true) => None,
            Some(false) => Some(Status::ObjectNameNotFound),
            None => Some(Status::Error),
        }
    }
}

impl<C: RemoteOps> FsHandler for RemoteFs<C> {
    fn open(&self, path: &str, mode: OpenMode, is_dir: bool) -> Status {
        if is_dir {
            self.open_dir(path, mode)
        } else {
            self.open_file(path, mode)
        }
    }

    fn read(&self, path: &str, offset: i64, len: i32) -> (Status, Vec<u8>) {
        if let Some(status) = self.check_io_target(path) {
            return (status, Vec::new());
        }
        match self.run("read", self.remote.read(path, offset, len)) {
            // A short result is a short read at end of file, not a fault.
            Some(data) => (Status::Success, data),
            None => (Status::Error, Vec::new()),
        }
    }

    fn write(&self, path: &str, offset: i64, data: &[u8]) -> (Status, i32) {
        if let Some(status) = self.check_io_target(path) {
            return (status, 0);
        }
        match self.run("write", self.remote.write(path, offset, data.to_vec())) {
            Some(-1) | None => (Status::Error, 0),
            Some(written) => (Status::Success, written),
        }
    }

    fn flush(&self, _path: &str) -> Status {
        // Writes are applied remotely as they arrive; nothing is buffered.
        Status::Success
    }

    fn get_metadata(&self, path: &str) -> (Status, Option<Metadata>) {
        match self.remote.get_metadata(path) {
            Ok(meta) => (Status::Success, Some(meta)),
            Err(crate::error::Error::RemoteExecution) => (Status::ObjectNameNotFound, None),
            Err(e) => {
                warn!("get_metadata failed: {e}");
                (Status::Error, None)
            }
        }
    }

    fn find_files(&self, path: &str, pattern: &str) -> (Status, Vec<Metadata>) {
        match self.run("find_files", self.remote.list_children(path, pattern)) {
            Some(children) => (Status::Success, children),
            None => (Status::Error, Vec::new()),
        }
    }

    fn set_attributes(&self, path: &str, attr: FileAttributes) -> Status {
        self.run("set_attributes", self.remote.set_attributes(path, attr))
            .unwrap_or(Status::Error)
    }

    fn set_times(
        &self,
        path: &str,
        created: Option<Timestamp>,
        accessed: Option<Timestamp>,
        modified: Option<Timestamp>,
    ) -> Status {
        self.run(
            "set_times",
            self.remote.set_times(path, created, accessed, modified),
        )
        .unwrap_or(Status::Error)
    }

    fn delete_file(&self, path: &str) -> Status {
        self.run("delete_file", self.remote.delete_file(path))
            .unwrap_or(Status::Error)
    }

    fn delete_directory(&self, path: &str) -> Status {
        self.run("delete_directory", self.remote.delete_directory(path))
            .unwrap_or(Status::Error)
    }

    fn move_entry(&self, old: &str, new: &str, replace: bool, is_dir: bool) -> Status {
        self.run(
            "move_entry",
            self.remote.move_entry(old, new, replace, is_dir),
        )
        .unwrap_or(Status::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone, PartialEq, Eq)]
    enum Entry {
        File(Vec<u8>),
        Dir,
    }

    /// In-memory remote with the three canonical fixtures: an existing
    /// file, an existing directory, and (implicitly) any absent path.
    struct FakeRemote {
        entries: Mutex<HashMap<String, Entry>>,
        /// When set, every call fails as if the transport died.
        broken: bool,
    }

    impl FakeRemote {
        fn with_fixtures() -> FakeRemote {
            let mut entries = HashMap::new();
            entries.insert(
                "/file.txt".to_owned(),
                Entry::File(b"0123456789abcdefghij".to_vec()),
            );
            entries.insert("/dir".to_owned(), Entry::Dir);
            FakeRemote {
                entries: Mutex::new(entries),
                broken: false,
            }
        }

        fn broken() -> FakeRemote {
            FakeRemote {
                entries: Mutex::new(HashMap::new()),
                broken: true,
            }
        }

        fn check(&self) -> Result<()> {
            if self.broken {
                Err(Error::Connection("wire cut".to_owned()))
            } else {
                Ok(())
            }
        }

        fn lookup(&self, path: &str) -> Option<Entry> {
            self.entries.lock().unwrap().get(path).cloned()
        }
    }

    impl RemoteOps for FakeRemote {
        fn exists(&self, path: &str, is_dir: bool) -> Result<bool> {
            self.check()?;
            Ok(match self.lookup(path) {
                Some(Entry::Dir) => is_dir,
                Some(Entry::File(_)) => !is_dir,
                None => false,
            })
        }

        fn get_attributes(&self, path: &str) -> Result<FileAttributes> {
            self.check()?;
            Ok(match self.lookup(path) {
                Some(Entry::Dir) => FileAttributes::DIRECTORY,
                _ => FileAttributes::NORMAL,
            })
        }

        fn get_metadata(&self, path: &str) -> Result<Metadata> {
            self.check()?;
            match self.lookup(path) {
                Some(Entry::File(data)) => Ok(Metadata {
                    name: path.rsplit('/').next().unwrap_or(path).to_owned(),
                    len: data.len() as i64,
                    ..Metadata::default()
                }),
                Some(Entry::Dir) => Ok(Metadata {
                    attr: FileAttributes::DIRECTORY,
                    ..Metadata::default()
                }),
                None => Err(Error::RemoteExecution),
            }
        }

        fn get_file_size(&self, path: &str) -> Result<i64> {
            self.check()?;
            match self.lookup(path) {
                Some(Entry::File(data)) => Ok(data.len() as i64),
                _ => Ok(0),
            }
        }

        fn create(&self, path: &str, is_dir: bool) -> Result<bool> {
            self.check()?;
            let entry = if is_dir {
                Entry::Dir
            } else {
                Entry::File(Vec::new())
            };
            self.entries
                .lock()
                .unwrap()
                .insert(path.to_owned(), entry);
            Ok(true)
        }

        fn read(&self, path: &str, offset: i64, len: i32) -> Result<Vec<u8>> {
            self.check()?;
            match self.lookup(path) {
                Some(Entry::File(data)) => {
                    let start = (offset as usize).min(data.len());
                    let end = (start + len as usize).min(data.len());
                    Ok(data[start..end].to_vec())
                }
                _ => Err(Error::RemoteExecution),
            }
        }

        fn write(&self, path: &str, offset: i64, data: Vec<u8>) -> Result<i32> {
            self.check()?;
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(path) {
                Some(Entry::File(content)) => {
                    let end = offset as usize + data.len();
                    if content.len() < end {
                        content.resize(end, 0);
                    }
                    content[offset as usize..end].copy_from_slice(&data);
                    Ok(data.len() as i32)
                }
                _ => Ok(-1),
            }
        }

        fn set_attributes(&self, _path: &str, _attr: FileAttributes) -> Result<Status> {
            self.check()?;
            Ok(Status::Success)
        }

        fn set_times(
            &self,
            _path: &str,
            _created: Option<Timestamp>,
            _accessed: Option<Timestamp>,
            _modified: Option<Timestamp>,
        ) -> Result<Status> {
            self.check()?;
            Ok(Status::Success)
        }

        fn delete_file(&self, path: &str) -> Result<Status> {
            self.check()?;
            let mut entries = self.entries.lock().unwrap();
            Ok(match entries.get(path) {
                Some(Entry::Dir) => Status::AccessDenied,
                Some(Entry::File(_)) => {
                    entries.remove(path);
                    Status::Success
                }
                None => Status::ObjectNameNotFound,
            })
        }

        fn delete_directory(&self, path: &str) -> Result<Status> {
            self.check()?;
            let mut entries = self.entries.lock().unwrap();
            Ok(match entries.get(path) {
                Some(Entry::File(_)) => Status::AccessDenied,
                Some(Entry::Dir) => {
                    entries.remove(path);
                    Status::Success
                }
                None => Status::ObjectPathNotFound,
            })
        }

        fn move_entry(&self, old: &str, new: &str, replace: bool, is_dir: bool) -> Result<Status> {
            self.check()?;
            let mut entries = self.entries.lock().unwrap();
            if entries.contains_key(new) {
                if !replace {
                    return Ok(Status::ObjectNameExists);
                }
                if is_dir {
                    return Ok(Status::AccessDenied);
                }
                entries.remove(new);
            }
            Ok(match entries.remove(old) {
                Some(entry) => {
                    entries.insert(new.to_owned(), entry);
                    Status::Success
                }
                None => Status::Error,
            })
        }

        fn list_children(&self, _path: &str, _pattern: &str) -> Result<Vec<Metadata>> {
            self.check()?;
            Ok(Vec::new())
        }
    }

    fn fs() -> RemoteFs<FakeRemote> {
        RemoteFs::new(FakeRemote::with_fixtures())
    }

    const FILE: &str = "/file.txt";
    const DIR: &str = "/dir";
    const ABSENT: &str = "/nope";

    #[test]
    fn open_existing() {
        let fs = fs();
        assert_eq!(fs.open(FILE, OpenMode::Open, false), Status::Success);
        assert_eq!(fs.open(DIR, OpenMode::Open, true), Status::Success);
    }

    #[test]
    fn open_absent() {
        let fs = fs();
        assert_eq!(
            fs.open(ABSENT, OpenMode::Open, false),
            Status::ObjectNameNotFound
        );
        assert_eq!(
            fs.open(ABSENT, OpenMode::Open, true),
            Status::ObjectPathNotFound
        );
    }

    #[test]
    fn create_new_collides_with_existing() {
        let fs = fs();
        assert_eq!(
            fs.open(FILE, OpenMode::CreateNew, false),
            Status::ObjectNameCollision
        );
        assert_eq!(
            fs.open(DIR, OpenMode::CreateNew, true),
            Status::ObjectNameCollision
        );
    }

    #[test]
    fn create_new_creates_absent() {
        let fs = fs();
        assert_eq!(fs.open(ABSENT, OpenMode::CreateNew, false), Status::Success);
        assert!(fs.remote().exists(ABSENT, false).unwrap());

        let fs = self::fs();
        assert_eq!(fs.open(ABSENT, OpenMode::CreateNew, true), Status::Success);
        assert!(fs.remote().exists(ABSENT, true).unwrap());
    }

    #[test]
    fn create_always_recreates() {
        let fs = fs();
        assert_eq!(fs.open(FILE, OpenMode::Create, false), Status::Success);
        assert_eq!(fs.open(ABSENT, OpenMode::Create, false), Status::Success);
        // No directory meaning.
        assert_eq!(fs.open(DIR, OpenMode::Create, true), Status::Error);
    }

    #[test]
    fn open_or_create() {
        let fs = fs();
        assert_eq!(fs.open(FILE, OpenMode::OpenOrCreate, false), Status::Success);
        assert_eq!(
            fs.open(ABSENT, OpenMode::OpenOrCreate, false),
            Status::Success
        );
        assert!(fs.remote().exists(ABSENT, false).unwrap());
        assert_eq!(fs.open(DIR, OpenMode::OpenOrCreate, true), Status::Error);
    }

    #[test]
    fn truncate_requires_existing() {
        let fs = fs();
        assert_eq!(fs.open(FILE, OpenMode::Truncate, false), Status::Success);
        assert_eq!(
            fs.open(ABSENT, OpenMode::Truncate, false),
            Status::ObjectNameNotFound
        );
        assert_eq!(fs.open(DIR, OpenMode::Truncate, true), Status::Error);
    }

    #[test]
    fn append_opens_or_creates() {
        let fs = fs();
        assert_eq!(fs.open(FILE, OpenMode::Append, false), Status::Success);
        assert_eq!(fs.open(ABSENT, OpenMode::Append, false), Status::Success);
        assert_eq!(fs.open(DIR, OpenMode::Append, true), Status::Error);
    }

    #[test]
    fn read_rejects_directories_and_absent_paths() {
        let fs = fs();
        assert_eq!(fs.read(DIR, 0, 8).0, Status::Error);
        assert_eq!(fs.read(ABSENT, 0, 8).0, Status::ObjectNameNotFound);
    }

    #[test]
    fn short_read_reported_faithfully() {
        let fs = fs();
        // Fixture content is 20 bytes; ask for 100 starting 10 from the end.
        let (status, data) = fs.read(FILE, 10, 100);
        assert_eq!(status, Status::Success);
        assert_eq!(data, b"abcdefghij");
    }

    #[test]
    fn write_precondition_and_failure_mapping() {
        let fs = fs();
        assert_eq!(fs.write(DIR, 0, b"x").0, Status::Error);
        assert_eq!(fs.write(ABSENT, 0, b"x").0, Status::ObjectNameNotFound);

        let (status, written) = fs.write(FILE, 0, b"new!");
        assert_eq!(status, Status::Success);
        assert_eq!(written, 4);
    }

    #[test]
    fn metadata_absent_maps_to_not_found() {
        let fs = fs();
        assert_eq!(fs.get_metadata(ABSENT).0, Status::ObjectNameNotFound);
        let (status, meta) = fs.get_metadata(FILE);
        assert_eq!(status, Status::Success);
        assert_eq!(meta.unwrap().len, 20);
    }

    #[test]
    fn transport_failure_becomes_generic_error() {
        let fs = RemoteFs::new(FakeRemote::broken());
        assert_eq!(fs.open(FILE, OpenMode::Open, false), Status::Error);
        assert_eq!(fs.read(FILE, 0, 1).0, Status::Error);
        assert_eq!(fs.delete_file(FILE), Status::Error);
        assert_eq!(fs.move_entry(FILE, ABSENT, false, false), Status::Error);
    }

    #[test]
    fn stubs_stay_stubbed() {
        let fs = fs();
        assert_eq!(fs.lock(FILE, 0, 10), Status::Success);
        assert_eq!(fs.unlock(FILE, 0, 10), Status::Success);
        assert_eq!(fs.set_end_of_file(FILE, 5), Status::Success);
        assert_eq!(fs.set_allocation_size(FILE, 5), Status::Success);
        assert_eq!(fs.get_file_security(FILE), Status::Error);
        assert_eq!(fs.set_file_security(FILE), Status::Error);
        assert_eq!(fs.find_streams(FILE), (Status::NotImplemented, Vec::new()));

        let space = fs.get_disk_free_space();
        assert_eq!(space.total, 2 * space.free);
        assert_eq!(fs.get_volume_information().filesystem, "NTFS");
    }
}
