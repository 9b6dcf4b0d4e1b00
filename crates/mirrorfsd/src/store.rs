//! On-disk store backing the daemon.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use filetime::FileTime;
use log::debug;
use mirrorfs::srv::Store;
use mirrorfs::{FileAttributes, Metadata, Timestamp};

/// A directory exported over the protocol.
pub struct DiskStore {
    root: PathBuf,
    read_only: bool,
}

impl DiskStore {
    pub fn new(root: PathBuf, read_only: bool) -> DiskStore {
        DiskStore { root, read_only }
    }

    /// Resolve a session-relative path inside the export root.
    ///
    /// Parent and root components are refused outright, so no request can
    /// name anything outside the export, symlinks aside.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        "path escapes the export root",
                    ));
                }
            }
        }
        Ok(resolved)
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "export is read-only",
            ));
        }
        Ok(())
    }
}

fn to_timestamp(t: SystemTime) -> Option<Timestamp> {
    t.duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| Timestamp::from_unix(d.as_secs() as i64, d.subsec_nanos()))
}

fn attributes_of(meta: &fs::Metadata) -> FileAttributes {
    let mut attr = if meta.is_dir() {
        FileAttributes::DIRECTORY
    } else {
        FileAttributes::NORMAL
    };
    if meta.permissions().readonly() {
        attr |= FileAttributes::READONLY;
    }
    attr
}

impl Store for DiskStore {
    fn exists(&self, path: &str, is_dir: bool) -> bool {
        let Ok(resolved) = self.resolve(path) else {
            return false;
        };
        match fs::metadata(&resolved) {
            Ok(meta) => meta.is_dir() == is_dir,
            Err(_) => false,
        }
    }

    fn attributes(&self, path: &str) -> io::Result<FileAttributes> {
        let meta = fs::metadata(self.resolve(path)?)?;
        Ok(attributes_of(&meta))
    }

    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        let resolved = self.resolve(path)?;
        let meta = fs::metadata(&resolved)?;
        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Metadata {
            name,
            attr: attributes_of(&meta),
            created: meta.created().ok().and_then(to_timestamp),
            accessed: meta.accessed().ok().and_then(to_timestamp),
            modified: meta.modified().ok().and_then(to_timestamp),
            len: if meta.is_dir() { 0 } else { meta.len() as i64 },
        })
    }

    fn create(&self, path: &str, is_dir: bool) -> io::Result<()> {
        self.check_writable()?;
        let resolved = self.resolve(path)?;
        debug!("create {:?} dir={is_dir}", resolved);
        if is_dir {
            fs::create_dir_all(resolved)
        } else {
            // Truncates an existing file, which is what (re)create means.
            File::create(resolved).map(|_| ())
        }
    }

    fn read(&self, path: &str, offset: i64, len: i32) -> io::Result<Vec<u8>> {
        let mut file = File::open(self.resolve(path)?)?;
        file.seek(SeekFrom::Start(offset.max(0) as u64))?;
        let mut data = Vec::new();
        file.take(len.max(0) as u64).read_to_end(&mut data)?;
        Ok(data)
    }

    fn write(&self, path: &str, offset: i64, data: &[u8]) -> io::Result<i32> {
        self.check_writable()?;
        let mut file = OpenOptions::new().write(true).open(self.resolve(path)?)?;
        file.seek(SeekFrom::Start(offset.max(0) as u64))?;
        file.write_all(data)?;
        Ok(data.len() as i32)
    }

    fn set_attributes(&self, path: &str, attr: FileAttributes) -> io::Result<()> {
        self.check_writable()?;
        let resolved = self.resolve(path)?;
        // Only the read-only bit has a portable on-disk meaning here.
        let mut perms = fs::metadata(&resolved)?.permissions();
        perms.set_readonly(attr.contains(FileAttributes::READONLY));
        fs::set_permissions(resolved, perms)
    }

    fn set_times(
        &self,
        path: &str,
        _created: Option<Timestamp>,
        accessed: Option<Timestamp>,
        modified: Option<Timestamp>,
    ) -> io::Result<()> {
        self.check_writable()?;
        let resolved = self.resolve(path)?;
        // Creation time is not settable through std; absent values leave
        // the current timestamps alone.
        if let Some(t) = accessed {
            filetime::set_file_atime(&resolved, FileTime::from_unix_time(t.sec, t.nsec))?;
        }
        if let Some(t) = modified {
            filetime::set_file_mtime(&resolved, FileTime::from_unix_time(t.sec, t.nsec))?;
        }
        Ok(())
    }

    fn delete_file(&self, path: &str) -> io::Result<()> {
        self.check_writable()?;
        fs::remove_file(self.resolve(path)?)
    }

    fn delete_directory(&self, path: &str) -> io::Result<()> {
        self.check_writable()?;
        fs::remove_dir_all(self.resolve(path)?)
    }

    fn rename(&self, old: &str, new: &str) -> io::Result<()> {
        self.check_writable()?;
        fs::rename(self.resolve(old)?, self.resolve(new)?)
    }

    fn list_children(&self, path: &str) -> io::Result<Vec<Metadata>> {
        let resolved = self.resolve(path)?;
        let mut children = Vec::new();
        for entry in fs::read_dir(resolved)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            children.push(Metadata {
                name: entry.file_name().to_string_lossy().into_owned(),
                attr: attributes_of(&meta),
                created: meta.created().ok().and_then(to_timestamp),
                accessed: meta.accessed().ok().and_then(to_timestamp),
                modified: meta.modified().ok().and_then(to_timestamp),
                len: if meta.is_dir() { 0 } else { meta.len() as i64 },
            });
        }
        Ok(children)
    }
}
