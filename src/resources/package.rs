//! Installed-package queries.
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::exec::Executor;

/// Answers whether a package is installed.
#[cfg_attr(test, mockall::automock)]
pub trait PackageQuery: Send + Sync {
    /// Whether `name` is installed.
    fn has_package(&self, name: &str) -> bool;
}

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// Arch Linux (`pacman`).
    Pacman,
    /// Debian and derivatives (`dpkg-query`).
    Dpkg,
    /// Red Hat, SUSE and derivatives (`rpm`).
    Rpm,
}

impl PackageManager {
    /// Managers in detection order.
    pub const ALL: [Self; 3] = [Self::Pacman, Self::Dpkg, Self::Rpm];

    /// The program that lists installed packages.
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Pacman => "pacman",
            Self::Dpkg => "dpkg-query",
            Self::Rpm => "rpm",
        }
    }

    /// Arguments that make [`program`](Self::program) print one package name
    /// per line.
    #[must_use]
    pub const fn list_args(self) -> &'static [&'static str] {
        match self {
            Self::Pacman => &["-Qq"],
            Self::Dpkg => &["-W", "--showformat=${Package}\\n"],
            Self::Rpm => &["-qa", "--qf", "%{NAME}\\n"],
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Query the set of installed package names for `manager`.
///
/// An unavailable or failing manager yields an empty set.
#[must_use]
pub fn installed_packages(manager: PackageManager, executor: &dyn Executor) -> HashSet<String> {
    match executor.run_unchecked(manager.program(), manager.list_args()) {
        Ok(result) if result.success => result
            .stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(String::from)
            .collect(),
        Ok(result) => {
            tracing::debug!(
                "{manager} exited with {:?}: {}",
                result.code,
                result.stderr.trim()
            );
            HashSet::new()
        }
        Err(e) => {
            tracing::debug!("{manager} unavailable: {e}");
            HashSet::new()
        }
    }
}

/// [`PackageQuery`] backed by the system package manager.
///
/// On hosts without a supported manager, names are looked up as programs on
/// `PATH` instead, so `haspackage?('rsync')` still answers there.
pub struct SystemPackages {
    manager: Option<PackageManager>,
    installed: HashSet<String>,
    executor: Arc<dyn Executor>,
}

impl fmt::Debug for SystemPackages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemPackages")
            .field("manager", &self.manager)
            .field("installed", &self.installed.len())
            .finish_non_exhaustive()
    }
}

impl SystemPackages {
    /// Detect the first available package manager and load its package list.
    #[must_use]
    pub fn detect(executor: Arc<dyn Executor>) -> Self {
        let manager = PackageManager::ALL
            .into_iter()
            .find(|m| executor.which(m.program()));
        let installed = manager
            .map(|m| installed_packages(m, executor.as_ref()))
            .unwrap_or_default();
        tracing::debug!(
            "package manager {}: {} packages installed",
            manager.map_or_else(|| "none".to_string(), |m| m.to_string()),
            installed.len()
        );
        Self {
            manager,
            installed,
            executor,
        }
    }

    /// The detected package manager, if any.
    #[must_use]
    pub const fn manager(&self) -> Option<PackageManager> {
        self.manager
    }
}

impl PackageQuery for SystemPackages {
    fn has_package(&self, name: &str) -> bool {
        match self.manager {
            Some(_) => self.installed.contains(name),
            None => self.executor.which(name),
        }
    }
}
