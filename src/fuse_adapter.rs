//! The `fuser::Filesystem` boundary (spec.md §4.5): translates kernel VFS
//! calls into `namespace`/`dispatcher` operations and `CoreError`s into
//! negative-errno replies. Inode numbers are a presentation-layer-only
//! concept — the core model is entirely path-keyed — so this module owns
//! the only inode⟷path mapping in the crate.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType as FuseFileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};
use parking_lot::Mutex;
use tracing::{instrument, warn};

use crate::context::AppContext;
use crate::dispatcher::Dispatcher;
use crate::error::CoreError;
use crate::models::{FileRecord, FileType};
use crate::namespace;

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;
const GENERATION: u64 = 0;

/// Bidirectional inode⟷path table, grown lazily as paths are looked up.
/// Inode 1 is always the root; every other path gets the next free inode
/// the first time this adapter sees it, and keeps it for the life of the
/// process (spec.md's data model has no notion of inode reuse/recycling).
struct Inodes {
    next: AtomicU64,
    path_to_ino: Mutex<HashMap<String, u64>>,
    ino_to_path: Mutex<HashMap<u64, String>>,
}

impl Inodes {
    fn new() -> Self {
        let mut path_to_ino = HashMap::new();
        let mut ino_to_path = HashMap::new();
        path_to_ino.insert("/".to_string(), ROOT_INO);
        ino_to_path.insert(ROOT_INO, "/".to_string());
        Self {
            next: AtomicU64::new(ROOT_INO + 1),
            path_to_ino: Mutex::new(path_to_ino),
            ino_to_path: Mutex::new(ino_to_path),
        }
    }

    fn ino_for(&self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_ino.lock().get(path) {
            return ino;
        }
        let ino = self.next.fetch_add(1, Ordering::Relaxed);
        self.path_to_ino.lock().insert(path.to_string(), ino);
        self.ino_to_path.lock().insert(ino, path.to_string());
        ino
    }

    fn path_for(&self, ino: u64) -> Option<String> {
        self.ino_to_path.lock().get(&ino).cloned()
    }
}

fn to_fuse_kind(file_type: FileType) -> FuseFileType {
    match file_type {
        FileType::Regular => FuseFileType::RegularFile,
        FileType::Directory => FuseFileType::Directory,
        FileType::CharacterSpecial => FuseFileType::CharDevice,
        FileType::SymbolicLink => FuseFileType::Symlink,
        FileType::UnixSocket => FuseFileType::Socket,
        FileType::FifoSpecial => FuseFileType::NamedPipe,
    }
}

pub struct OriginFs {
    dispatcher: Dispatcher,
    inodes: Inodes,
}

impl OriginFs {
    pub fn new(ctx: AppContext) -> Self {
        Self { dispatcher: Dispatcher::new(ctx), inodes: Inodes::new() }
    }

    fn ctx(&self) -> &AppContext {
        self.dispatcher.context()
    }

    fn path_of(&self, ino: u64) -> Result<String, libc::c_int> {
        self.inodes.path_for(ino).ok_or(libc::ENOENT)
    }

    fn to_attr(&self, record: &FileRecord) -> FileAttr {
        let ino = self.inodes.ino_for(&record.path);
        let atime = UNIX_EPOCH + Duration::from_secs(record.atime.max(0) as u64);
        FileAttr {
            ino,
            size: record.size,
            blocks: (record.size + 511) / 512,
            atime,
            mtime: atime,
            ctime: atime,
            crtime: atime,
            kind: to_fuse_kind(record.file_type),
            perm: record.mode as u16,
            nlink: record.nlink,
            uid: self.ctx().settings().fuse.uid,
            gid: self.ctx().settings().fuse.gid,
            rdev: 0,
            blksize: self.ctx().settings().store.segment_size,
            flags: 0,
        }
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<(String, String), libc::c_int> {
        let parent_path = self.path_of(parent)?;
        let name = name.to_str().ok_or(libc::EINVAL)?.to_string();
        Ok((parent_path, name))
    }
}

impl Filesystem for OriginFs {
    #[instrument(skip(self, _req, reply))]
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let (parent_path, name) = match self.child_path(parent, name) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        let child_path = if parent_path == "/" { format!("/{name}") } else { format!("{parent_path}/{name}") };
        match namespace::getattr(self.ctx(), &child_path) {
            Ok(record) => reply.entry(&TTL, &self.to_attr(&record), GENERATION),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    #[instrument(skip(self, _req, reply))]
    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match namespace::getattr(self.ctx(), &path) {
            Ok(record) => reply.attr(&TTL, &self.to_attr(&record)),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };

        if let Some(mode) = mode {
            if let Err(err) = namespace::chmod(self.ctx(), &path, mode) {
                return reply.error(err.into_errno());
            }
        }
        if let Some(length) = size {
            if let Err(err) = self.dispatcher.truncate(&path, length) {
                return reply.error(err.into_errno());
            }
        }
        if let Some(atime) = atime {
            let secs = match atime {
                fuser::TimeOrNow::SpecificTime(t) => {
                    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
                }
                fuser::TimeOrNow::Now => chrono::Utc::now().timestamp(),
            };
            if let Err(err) = namespace::utimens(self.ctx(), &path, secs) {
                return reply.error(err.into_errno());
            }
        }

        match namespace::getattr(self.ctx(), &path) {
            Ok(record) => reply.attr(&TTL, &self.to_attr(&record)),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyData) {
        reply.error(CoreError::Unsupported.into_errno());
    }

    #[instrument(skip(self, _req, reply))]
    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let (parent_path, name) = match self.child_path(parent, name) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        match namespace::mknod(self.ctx(), &parent_path, &name, mode) {
            Ok(record) => reply.entry(&TTL, &self.to_attr(&record), GENERATION),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    #[instrument(skip(self, _req, reply))]
    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        let (parent_path, name) = match self.child_path(parent, name) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        match namespace::mkdir(self.ctx(), &parent_path, &name, mode) {
            Ok(record) => reply.entry(&TTL, &self.to_attr(&record), GENERATION),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    #[instrument(skip(self, _req, reply))]
    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let (parent_path, name) = match self.child_path(parent, name) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        let path = if parent_path == "/" { format!("/{name}") } else { format!("{parent_path}/{name}") };
        match namespace::unlink(self.ctx(), &path) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    #[instrument(skip(self, _req, reply))]
    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let (parent_path, name) = match self.child_path(parent, name) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        let path = if parent_path == "/" { format!("/{name}") } else { format!("{parent_path}/{name}") };
        match namespace::rmdir(self.ctx(), &path) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    fn symlink(&mut self, _req: &Request<'_>, _parent: u64, _link_name: &OsStr, _target: &std::path::Path, reply: ReplyEntry) {
        reply.error(CoreError::Unsupported.into_errno());
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all)]
    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (parent_path, name) = match self.child_path(parent, name) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        let (new_parent_path, newname) = match self.child_path(newparent, newname) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        let from = if parent_path == "/" { format!("/{name}") } else { format!("{parent_path}/{name}") };
        let to = if new_parent_path == "/" { format!("/{newname}") } else { format!("{new_parent_path}/{newname}") };

        match namespace::rename(self.ctx(), &from, &to) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    fn link(&mut self, _req: &Request<'_>, _ino: u64, _newparent: u64, _newname: &OsStr, reply: ReplyEntry) {
        reply.error(CoreError::Unsupported.into_errno());
    }

    #[instrument(skip(self, _req, reply))]
    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.dispatcher.open(&path, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, _req, reply))]
    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let offset = offset.max(0) as u64;
        match self.dispatcher.read(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, _req, data, reply), fields(len = data.len()))]
    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let offset = offset.max(0) as u64;
        match self.dispatcher.write(fh, offset, data) {
            Ok(written) => reply.written(written),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok()
    }

    #[instrument(skip(self, _req, reply))]
    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.dispatcher.release(fh) {
            Ok(()) => reply.ok(),
            Err(err) => {
                warn!(error = ?err, fh, "release failed to promote staged writes");
                reply.error(err.into_errno());
            }
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        reply.ok()
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0)
    }

    #[instrument(skip(self, _req, reply))]
    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };

        let children = match namespace::readdir(self.ctx(), &path) {
            Ok(children) => children,
            Err(err) => return reply.error(err.into_errno()),
        };

        let mut entries = vec![(ino, FuseFileType::Directory, ".".to_string())];
        entries.push((ino, FuseFileType::Directory, "..".to_string()));
        for child in &children {
            let name = child.path.rsplit('/').next().unwrap_or(&child.path).to_string();
            entries.push((self.inodes.ino_for(&child.path), to_fuse_kind(child.file_type), name));
        }

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok()
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok()
    }

    #[instrument(skip(self, _req, reply))]
    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match namespace::statfs(self.ctx()) {
            Ok(info) => reply.statfs(
                0,
                0,
                0,
                info.files as u64,
                0,
                info.block_size,
                255,
                info.block_size,
            ),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        reply.ok()
    }

    fn getxattr(&mut self, _req: &Request<'_>, _ino: u64, _name: &OsStr, _size: u32, reply: fuser::ReplyXattr) {
        reply.error(libc::ENODATA);
    }

    fn listxattr(&mut self, _req: &Request<'_>, _ino: u64, _size: u32, reply: fuser::ReplyXattr) {
        reply.size(0);
    }

    fn removexattr(&mut self, _req: &Request<'_>, _ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.ok()
    }

    #[instrument(skip(self, _req, reply))]
    fn access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match namespace::access(self.ctx(), &path) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.into_errno()),
        }
    }

    #[instrument(skip(self, _req, reply))]
    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let (parent_path, name) = match self.child_path(parent, name) {
            Ok(v) => v,
            Err(errno) => return reply.error(errno),
        };
        let record = match namespace::mknod(self.ctx(), &parent_path, &name, mode) {
            Ok(record) => record,
            Err(err) => return reply.error(err.into_errno()),
        };
        match self.dispatcher.open(&record.path, flags) {
            Ok(fh) => reply.created(&TTL, &self.to_attr(&record), GENERATION, fh, 0),
            Err(err) => reply.error(err.into_errno()),
        }
    }
}
