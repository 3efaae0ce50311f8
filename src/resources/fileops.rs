//! Filesystem operations driven by the `files`, `copy`, `directories`,
//! `tidy` and `links` actions.
//!
//! Every mutation is announced through the [`FlowMonitor`] first, so a
//! dry-run observer can veto it and leave the system untouched.
use std::fs::Metadata;
use std::io;
use std::os::unix::fs::{MetadataExt as _, PermissionsExt as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::ResourceChange;
use super::editor::BACKUP_SUFFIX;
use super::error::ResourceError;
use crate::engine::options::{FsOption, FsOptions, Recursion};
use crate::monitor::FlowMonitor;
use crate::platform;

/// Ownership and permission change requested by `files:` and `copy:`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    /// User name or numeric uid.
    pub owner: Option<String>,
    /// Group name or numeric gid.
    pub group: Option<String>,
    /// Permission bits.
    pub mode: Option<u32>,
}

impl Ownership {
    /// Whether nothing is requested.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.owner.is_none() && self.group.is_none() && self.mode.is_none()
    }

    /// Take the owner, group and mode out of `options`.
    #[must_use]
    pub fn take(options: &mut FsOptions) -> Self {
        let mut values = options
            .pop(&[FsOption::Owner, FsOption::Group, FsOption::Mode])
            .into_iter();
        let mut next = || values.next().flatten();
        let owner = next().map(|v| v.to_string());
        let group = next().map(|v| v.to_string());
        let mode = next().and_then(|v| v.as_mode());
        Self { owner, group, mode }
    }
}

/// Filesystem collaborator used by the runtime builtins.
#[cfg_attr(test, mockall::automock)]
pub trait FilesystemOps: Send + Sync {
    /// Create `path` (and its parents with `makeparent`), then apply the
    /// requested ownership.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or changed.
    fn mkdir(&self, path: &Path, ownership: &Ownership, options: &FsOptions) -> Result<ResourceChange, ResourceError>;

    /// Apply `ownership` to `path` and, with recursion, to the entries below
    /// it that pass the `glob`, `filesonly` and `directoriesonly` filters.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] when `path` matches nothing.
    fn chown_mod(&self, path: &Path, ownership: &Ownership, options: &FsOptions) -> Result<ResourceChange, ResourceError>;

    /// Copy `src` to `dest`, keeping the previous destination as
    /// `<dest>.cfsaved` with `backup`, and skipping identical content with
    /// `onlyonchange`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] for a missing source and
    /// [`ResourceError::InvalidState`] when `dest` exists and `force` is off.
    fn copy(&self, src: &Path, dest: &Path, ownership: &Ownership, options: &FsOptions) -> Result<ResourceChange, ResourceError>;

    /// Remove `target`, or the entries below it selected by recursion,
    /// `glob`, `olderthan` and `filesonly`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] when `target` matches nothing.
    fn delete(&self, target: &Path, options: &FsOptions) -> Result<ResourceChange, ResourceError>;

    /// Make `linkname` a symlink to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidState`] when `linkname` is a real file
    /// and `force` is off.
    fn link(&self, target: &Path, linkname: &Path, force: bool) -> Result<ResourceChange, ResourceError>;

    /// Whether `path` exists (following symlinks).
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is a directory (following symlinks).
    fn is_dir(&self, path: &Path) -> bool;

    /// Where the symlink at `path` points, if it is one.
    fn read_link(&self, path: &Path) -> Option<PathBuf>;

    /// Permission bits of `path`.
    fn mode(&self, path: &Path) -> Option<u32>;
}

/// Whether `path` contains glob metacharacters.
#[must_use]
pub fn has_glob(path: &Path) -> bool {
    path.to_string_lossy().contains(['*', '?', '['])
}

/// Expand a path that may contain glob metacharacters.
///
/// # Errors
///
/// Returns [`ResourceError::Pattern`] for a malformed glob and
/// [`ResourceError::NotFound`] when nothing matches.
pub fn expand(path: &Path) -> Result<Vec<PathBuf>, ResourceError> {
    if !has_glob(path) {
        return if path.symlink_metadata().is_ok() {
            Ok(vec![path.to_path_buf()])
        } else {
            Err(ResourceError::NotFound {
                path: path.to_path_buf(),
            })
        };
    }
    let text = path.to_string_lossy();
    let matches: Vec<PathBuf> = glob::glob(&text)
        .map_err(|e| ResourceError::Pattern {
            pattern: text.to_string(),
            reason: e.to_string(),
        })?
        .filter_map(Result::ok)
        .collect();
    if matches.is_empty() {
        return Err(ResourceError::NotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(matches)
}

/// SHA-256 of a file's content.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn file_digest(path: &Path) -> Result<Vec<u8>, ResourceError> {
    let mut file = std::fs::File::open(path).map_err(|e| ResourceError::io("reading", path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| ResourceError::io("reading", path, e))?;
    Ok(hasher.finalize().to_vec())
}

/// Combine two outcomes: any applied change wins, then any skip.
fn merge(current: ResourceChange, next: ResourceChange) -> ResourceChange {
    if current.changed() || next == ResourceChange::AlreadyCorrect {
        current
    } else {
        next
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Filters applied to entries found below a target.
#[derive(Debug)]
struct Selection {
    recursion: Recursion,
    glob: Option<glob::Pattern>,
    files_only: bool,
    directories_only: bool,
    older_than: Option<i64>,
    follow_symlinks: bool,
}

impl Selection {
    fn new(options: &FsOptions) -> Result<Self, ResourceError> {
        let glob = options
            .glob()
            .map(|g| {
                glob::Pattern::new(g).map_err(|e| ResourceError::Pattern {
                    pattern: g.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            recursion: options.recursion(),
            glob,
            files_only: options.flag(FsOption::FilesOnly),
            directories_only: options.flag(FsOption::DirectoriesOnly),
            older_than: options.older_than(),
            follow_symlinks: options.flag(FsOption::FollowSymlinks),
        })
    }

    const fn descends(&self, depth: usize) -> bool {
        match self.recursion {
            Recursion::None => false,
            Recursion::Depth(max) => depth < max,
            Recursion::Unbounded => true,
        }
    }

    fn accepts(&self, path: &Path, meta: &Metadata) -> bool {
        if self.files_only && !meta.is_file() {
            return false;
        }
        if self.directories_only && !meta.is_dir() {
            return false;
        }
        if let Some(pattern) = &self.glob {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if !pattern.matches(&name) {
                return false;
            }
        }
        self.older_than.is_none_or(|cutoff| meta.mtime() < cutoff)
    }

    /// Entries below `root`, children listed before their parent.
    fn walk(&self, root: &Path) -> Result<Vec<(PathBuf, Metadata)>, ResourceError> {
        let mut found = Vec::new();
        self.walk_into(root, 0, &mut found)?;
        Ok(found)
    }

    fn walk_into(&self, dir: &Path, depth: usize, found: &mut Vec<(PathBuf, Metadata)>) -> Result<(), ResourceError> {
        if !self.descends(depth) {
            return Ok(());
        }
        let entries = std::fs::read_dir(dir).map_err(|e| ResourceError::io("reading directory", dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ResourceError::io("reading directory", dir, e))?;
            let path = entry.path();
            let Ok(meta) = path.symlink_metadata() else {
                continue;
            };
            let is_dir = if meta.is_symlink() {
                self.follow_symlinks && path.is_dir()
            } else {
                meta.is_dir()
            };
            if is_dir {
                self.walk_into(&path, depth + 1, found)?;
            }
            found.push((path, meta));
        }
        Ok(())
    }
}

/// [`FilesystemOps`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct SystemFileOps {
    monitor: Arc<FlowMonitor>,
}

impl SystemFileOps {
    /// Operations reporting through `monitor`.
    #[must_use]
    pub const fn new(monitor: Arc<FlowMonitor>) -> Self {
        Self { monitor }
    }

    fn attempt(
        &self,
        intention: String,
        tag: &str,
        action: impl FnOnce() -> Result<(), ResourceError>,
    ) -> Result<ResourceChange, ResourceError> {
        let outcome = self.monitor.attempt(intention, &[tag], action)?;
        Ok(ResourceChange::from_attempt(outcome.map(|()| ResourceChange::Applied)))
    }

    /// Apply `ownership` to one entry if it differs.
    fn set_ownership(&self, path: &Path, meta: &Metadata, ownership: &Ownership) -> Result<ResourceChange, ResourceError> {
        let mut change = ResourceChange::AlreadyCorrect;

        if let Some(mode) = ownership.mode {
            if meta.mode() & 0o7777 != mode & 0o7777 {
                change = self.attempt(format!("chmod {mode:o} {}", path.display()), "files", || {
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
                        .map_err(|e| ResourceError::io("changing mode of", path, e))
                })?;
            }
        }

        let uid = ownership
            .owner
            .as_deref()
            .map(|name| {
                platform::lookup_uid(name).ok_or_else(|| ResourceError::InvalidState {
                    resource: path.display().to_string(),
                    reason: format!("unknown user '{name}'"),
                })
            })
            .transpose()?
            .filter(|uid| *uid != meta.uid());
        let gid = ownership
            .group
            .as_deref()
            .map(|name| {
                platform::lookup_gid(name).ok_or_else(|| ResourceError::InvalidState {
                    resource: path.display().to_string(),
                    reason: format!("unknown group '{name}'"),
                })
            })
            .transpose()?
            .filter(|gid| *gid != meta.gid());

        if uid.is_some() || gid.is_some() {
            let who = format!(
                "{}:{}",
                uid.map(|u| u.to_string()).unwrap_or_default(),
                gid.map(|g| g.to_string()).unwrap_or_default()
            );
            let chown = self.attempt(format!("chown {who} {}", path.display()), "files", || {
                nix::unistd::chown(
                    path,
                    uid.map(nix::unistd::Uid::from_raw),
                    gid.map(nix::unistd::Gid::from_raw),
                )
                .map_err(|errno| ResourceError::io("changing owner of", path, io::Error::from(errno)))
            })?;
            change = merge(change, chown);
        }
        Ok(change)
    }

    fn copy_file(&self, src: &Path, dest: &Path, options: &FsOptions) -> Result<ResourceChange, ResourceError> {
        let dest_exists = dest.symlink_metadata().is_ok();
        if dest_exists && options.flag(FsOption::OnlyOnChange) && file_digest(src)? == file_digest(dest)? {
            tracing::debug!("{} is up to date", dest.display());
            return Ok(ResourceChange::AlreadyCorrect);
        }
        if dest_exists && !options.flag(FsOption::Force) {
            return Err(ResourceError::InvalidState {
                resource: dest.display().to_string(),
                reason: "destination exists and force is off".to_string(),
            });
        }

        let backup = dest_exists && options.flag(FsOption::Backup);
        self.attempt(format!("copy {} to {}", src.display(), dest.display()), "copy", || {
            if backup {
                std::fs::copy(dest, backup_path(dest)).map_err(|e| ResourceError::io("backing up", dest, e))?;
            }
            if options.flag(FsOption::MakeParent) {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| ResourceError::io("creating", parent, e))?;
                }
            }
            std::fs::copy(src, dest).map_err(|e| ResourceError::io("copying", src, e))?;
            Ok(())
        })
    }

    fn copy_tree(&self, src: &Path, dest: &Path, options: &FsOptions) -> Result<ResourceChange, ResourceError> {
        let mut change = if dest.is_dir() {
            ResourceChange::AlreadyCorrect
        } else {
            self.attempt(format!("create directory {}", dest.display()), "copy", || {
                std::fs::create_dir_all(dest).map_err(|e| ResourceError::io("creating", dest, e))
            })?
        };
        let entries = std::fs::read_dir(src).map_err(|e| ResourceError::io("reading directory", src, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ResourceError::io("reading directory", src, e))?;
            let from = entry.path();
            let to = dest.join(entry.file_name());
            let result = if from.is_dir() {
                self.copy_tree(&from, &to, options)?
            } else {
                self.copy_file(&from, &to, options)?
            };
            change = merge(change, result);
        }
        Ok(change)
    }

    fn remove(&self, path: &Path, meta: &Metadata, tree: bool) -> Result<ResourceChange, ResourceError> {
        let is_dir = meta.is_dir();
        self.attempt(format!("delete {}", path.display()), "delete", || {
            let result = match (is_dir, tree) {
                (false, _) => std::fs::remove_file(path),
                (true, true) => std::fs::remove_dir_all(path),
                (true, false) => std::fs::remove_dir(path),
            };
            result.map_err(|e| ResourceError::io("deleting", path, e))
        })
    }
}

impl FilesystemOps for SystemFileOps {
    fn mkdir(&self, path: &Path, ownership: &Ownership, options: &FsOptions) -> Result<ResourceChange, ResourceError> {
        let created = if path.is_dir() {
            ResourceChange::AlreadyCorrect
        } else {
            let parents = options.flag(FsOption::MakeParent);
            self.attempt(format!("create directory {}", path.display()), "directories", || {
                let result = if parents {
                    std::fs::create_dir_all(path)
                } else {
                    std::fs::create_dir(path)
                };
                result.map_err(|e| ResourceError::io("creating", path, e))
            })?
        };
        let Ok(meta) = path.metadata() else {
            // Vetoed creation.
            return Ok(created);
        };
        Ok(merge(created, self.set_ownership(path, &meta, ownership)?))
    }

    fn chown_mod(&self, path: &Path, ownership: &Ownership, options: &FsOptions) -> Result<ResourceChange, ResourceError> {
        let selection = Selection::new(options)?;
        let mut change = ResourceChange::AlreadyCorrect;
        for root in expand(path)? {
            let meta = root
                .metadata()
                .map_err(|e| ResourceError::io("inspecting", &root, e))?;
            let mut targets = Vec::new();
            if meta.is_dir() {
                targets.extend(
                    selection
                        .walk(&root)?
                        .into_iter()
                        .filter(|(entry, meta)| !meta.is_symlink() && selection.accepts(entry, meta)),
                );
            }
            // A name pattern selects entries below a directory, not the directory itself.
            let include_root = !(meta.is_dir() && selection.glob.is_some());
            if include_root && selection.accepts(&root, &meta) {
                targets.push((root, meta));
            }
            for (entry, meta) in targets {
                change = merge(change, self.set_ownership(&entry, &meta, ownership)?);
            }
        }
        Ok(change)
    }

    fn copy(&self, src: &Path, dest: &Path, ownership: &Ownership, options: &FsOptions) -> Result<ResourceChange, ResourceError> {
        let src_meta = src.metadata().map_err(|e| ResourceError::io("reading", src, e))?;
        let dest = if dest.is_dir() && !src_meta.is_dir() {
            src.file_name().map_or_else(|| dest.to_path_buf(), |name| dest.join(name))
        } else {
            dest.to_path_buf()
        };

        let copied = if src_meta.is_dir() {
            self.copy_tree(src, &dest, options)?
        } else {
            self.copy_file(src, &dest, options)?
        };
        let Ok(meta) = dest.metadata() else {
            return Ok(copied);
        };
        Ok(merge(copied, self.set_ownership(&dest, &meta, ownership)?))
    }

    fn delete(&self, target: &Path, options: &FsOptions) -> Result<ResourceChange, ResourceError> {
        let selection = Selection::new(options)?;
        let force = options.flag(FsOption::Force);
        let mut change = ResourceChange::AlreadyCorrect;

        for root in expand(target)? {
            let meta = root
                .symlink_metadata()
                .map_err(|e| ResourceError::io("inspecting", &root, e))?;

            if !meta.is_dir() {
                if selection.accepts(&root, &meta) {
                    change = merge(change, self.remove(&root, &meta, false)?);
                }
                continue;
            }

            if selection.recursion == Recursion::None && selection.glob.is_none() {
                if !force {
                    return Err(ResourceError::InvalidState {
                        resource: root.display().to_string(),
                        reason: "is a directory; set rmdirs to remove it".to_string(),
                    });
                }
                change = merge(change, self.remove(&root, &meta, true)?);
                continue;
            }

            for (entry, meta) in selection.walk(&root)? {
                if !selection.accepts(&entry, &meta) || meta.is_dir() && !(force && is_empty_dir(&entry)) {
                    continue;
                }
                change = merge(change, self.remove(&entry, &meta, false)?);
            }
        }
        Ok(change)
    }

    fn link(&self, target: &Path, linkname: &Path, force: bool) -> Result<ResourceChange, ResourceError> {
        if let Ok(meta) = linkname.symlink_metadata() {
            if meta.is_symlink() {
                if std::fs::read_link(linkname).is_ok_and(|current| current == target) {
                    return Ok(ResourceChange::AlreadyCorrect);
                }
                self.remove(linkname, &meta, false)?;
            } else if force && !meta.is_dir() {
                self.remove(linkname, &meta, false)?;
            } else {
                return Err(ResourceError::InvalidState {
                    resource: linkname.display().to_string(),
                    reason: "exists and is not a symlink".to_string(),
                });
            }
        }
        self.attempt(format!("link {} -> {}", linkname.display(), target.display()), "link", || {
            std::os::unix::fs::symlink(target, linkname).map_err(|e| ResourceError::io("linking", linkname, e))
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_link(&self, path: &Path) -> Option<PathBuf> {
        std::fs::read_link(path).ok()
    }

    fn mode(&self, path: &Path) -> Option<u32> {
        path.metadata().ok().map(|m| m.mode() & 0o7777)
    }
}
