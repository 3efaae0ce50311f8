//! Class (group) membership for the current host.
//!
//! A class maps to an ordered set of members, each either a host name or the
//! name of another class. Membership of the current host is decided by
//! recursive expansion, so `mailer = ( server )` makes every member of
//! `server` a mailer too.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::platform::HostInfo;

/// Class table for one run.
#[derive(Debug, Clone)]
pub struct ClassSet {
    hostname: String,
    classes: BTreeMap<String, Vec<String>>,
    undefines: BTreeSet<String>,
}

impl ClassSet {
    /// A table with no classes at all, for `hostname`.
    #[must_use]
    pub fn empty(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            classes: BTreeMap::new(),
            undefines: BTreeSet::new(),
        }
    }

    /// Build the table for `host`, seeding the automatic classes.
    ///
    /// The host joins `any`, its OS name, its distribution, its effective
    /// user and group, and every entry of `defines`. Classes listed in
    /// `undefines` are never created.
    #[must_use]
    pub fn new(host: &HostInfo, defines: &[String], undefines: &[String]) -> Self {
        let mut set = Self::empty(host.hostname.clone());
        set.undefines = undefines.iter().cloned().collect();

        let hostname = host.hostname.clone();
        let mut automatic = vec!["any".to_string(), host.os_name.to_lowercase()];
        if let Some(distribution) = &host.distribution {
            automatic.push(distribution.to_lowercase());
        }
        automatic.push(host.user.clone());
        automatic.push(host.group.clone());
        automatic.extend(defines.iter().cloned());

        for class in automatic.iter().filter(|c| !c.is_empty()) {
            set.add(class, [hostname.as_str()]);
        }
        set
    }

    /// Name of the current host.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Add `members` to `class`, creating it if needed.
    ///
    /// Returns `false` without touching the table when `class` was undefined
    /// on the command line. Members already present are not duplicated.
    pub fn add<I, S>(&mut self, class: &str, members: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.undefines.contains(class) {
            tracing::debug!("class {class} is undefined, ignoring members");
            return false;
        }
        let entry = self.classes.entry(class.to_string()).or_default();
        for member in members {
            let member = member.into();
            if !entry.contains(&member) {
                tracing::debug!("adding {member} to class {class}");
                entry.push(member);
            }
        }
        true
    }

    /// Whether `name` is a defined class.
    #[must_use]
    pub fn contains_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Direct members of `class`, in insertion order.
    #[must_use]
    pub fn members(&self, class: &str) -> Option<&[String]> {
        self.classes.get(class).map(Vec::as_slice)
    }

    /// Flatten `name` into its host members.
    ///
    /// Members naming another class are replaced by that class's expansion.
    /// A class reached again while it is still being expanded is skipped
    /// with a warning, so cyclic definitions terminate.
    #[must_use]
    pub fn expand(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        self.expand_into(name, &mut path, &mut out);
        out
    }

    fn expand_into<'a>(&'a self, name: &'a str, path: &mut Vec<&'a str>, out: &mut Vec<String>) {
        let Some(members) = self.classes.get(name) else {
            return;
        };
        path.push(name);
        for member in members {
            if path.contains(&member.as_str()) {
                tracing::warn!("class cycle: {} -> {member}", path.join(" -> "));
            } else if self.classes.contains_key(member) {
                self.expand_into(member, path, out);
            } else {
                out.push(member.clone());
            }
        }
        path.pop();
    }

    /// Whether the current host belongs to `name`.
    #[must_use]
    pub fn isa(&self, name: &str) -> bool {
        name == self.hostname || self.expand(name).iter().any(|m| *m == self.hostname)
    }

    /// Put the current host into `class` unless it already belongs.
    pub fn isa_add(&mut self, class: &str) -> bool {
        if self.isa(class) {
            return false;
        }
        let hostname = self.hostname.clone();
        self.add(class, [hostname])
    }

    /// Sorted names of every class the current host belongs to.
    #[must_use]
    pub fn member_classes(&self) -> Vec<&str> {
        self.classes
            .keys()
            .filter(|class| self.isa(class))
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for ClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Computer \"{}\" belongs to classes \"{}\"",
            self.hostname,
            self.member_classes().join(", ")
        )
    }
}
