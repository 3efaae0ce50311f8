//! Host introspection: the facts that seed the automatic classes.
use std::fmt;

use crate::error::PlatformError;

/// Operating system family the engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// Linux kernels.
    Linux,
    /// FreeBSD, OpenBSD, NetBSD.
    Bsd,
    /// macOS.
    Darwin,
    /// Anything else.
    Other,
}

impl Os {
    /// Detect the compile-target operating system.
    #[must_use]
    pub const fn detect() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(any(
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd"
        )) {
            Self::Bsd
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Bsd => write!(f, "bsd"),
            Self::Darwin => write!(f, "darwin"),
            Self::Other => write!(f, "{}", std::env::consts::OS),
        }
    }
}

/// Facts about the current host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Short host name.
    pub hostname: String,
    /// Operating system name, e.g. `linux`.
    pub os_name: String,
    /// Distribution identifier from `/etc/os-release`, e.g. `debian`.
    pub distribution: Option<String>,
    /// Name of the effective user.
    pub user: String,
    /// Name of the effective group.
    pub group: String,
}

impl HostInfo {
    /// Detect the facts of the running host.
    ///
    /// # Errors
    ///
    /// Returns an error if the host name cannot be read.
    pub fn detect() -> Result<Self, PlatformError> {
        use nix::unistd::{Group, User, getegid, geteuid, gethostname};

        let hostname = gethostname()
            .map_err(|e| PlatformError::DetectionFailed(format!("hostname: {e}")))?
            .to_string_lossy()
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();

        let uid = geteuid();
        let user = User::from_uid(uid)
            .ok()
            .flatten()
            .map_or_else(|| uid.to_string(), |u| u.name);
        let gid = getegid();
        let group = Group::from_gid(gid)
            .ok()
            .flatten()
            .map_or_else(|| gid.to_string(), |g| g.name);

        let distribution = std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| parse_os_release(&content));

        Ok(Self {
            hostname,
            os_name: Os::detect().to_string(),
            distribution,
            user,
            group,
        })
    }
}

/// Extract the `ID=` field from `/etc/os-release` content.
#[must_use]
pub fn parse_os_release(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let value = line.trim().strip_prefix("ID=")?;
        let value = value.trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_lowercase())
    })
}

/// Whether a user account named `name` exists.
#[must_use]
pub fn user_exists(name: &str) -> bool {
    nix::unistd::User::from_name(name).ok().flatten().is_some()
}

/// Resolve a user name (or numeric id) to a uid.
#[must_use]
pub fn lookup_uid(name: &str) -> Option<u32> {
    if let Ok(uid) = name.parse::<u32>() {
        return Some(uid);
    }
    nix::unistd::User::from_name(name)
        .ok()
        .flatten()
        .map(|u| u.uid.as_raw())
}

/// Resolve a group name (or numeric id) to a gid.
#[must_use]
pub fn lookup_gid(name: &str) -> Option<u32> {
    if let Ok(gid) = name.parse::<u32>() {
        return Some(gid);
    }
    nix::unistd::Group::from_name(name)
        .ok()
        .flatten()
        .map(|g| g.gid.as_raw())
}

/// The home directory of the invoking user.
#[must_use]
pub fn home_dir() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(std::path::PathBuf::from)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn detect_returns_hostname() {
        let host = HostInfo::detect().unwrap();
        assert!(!host.hostname.is_empty());
        assert!(!host.hostname.contains('.'));
        assert!(!host.user.is_empty());
    }

    #[test]
    fn os_release_id() {
        let content = "NAME=\"Debian GNU/Linux\"\nID=debian\nVERSION_ID=\"12\"\n";
        assert_eq!(parse_os_release(content), Some("debian".to_string()));
    }

    #[test]
    fn os_release_quoted_id() {
        assert_eq!(
            parse_os_release("ID=\"Arch\"\n"),
            Some("arch".to_string())
        );
    }

    #[test]
    fn os_release_ignores_id_like() {
        assert_eq!(parse_os_release("ID_LIKE=debian\n"), None);
    }

    #[test]
    fn numeric_ids_resolve_directly() {
        assert_eq!(lookup_uid("0"), Some(0));
        assert_eq!(lookup_gid("0"), Some(0));
    }

    #[test]
    fn unknown_user_is_absent() {
        assert!(!user_exists("no-such-user-cfenjin-test"));
        assert_eq!(lookup_uid("no-such-user-cfenjin-test"), None);
    }

    #[test]
    fn os_display() {
        assert_eq!(Os::Linux.to_string(), "linux");
        assert_eq!(Os::Darwin.to_string(), "darwin");
    }
}
