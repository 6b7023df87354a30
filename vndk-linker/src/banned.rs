//! The banned-library policy.

use std::collections::BTreeMap;

/// What to do when a banned library is depended upon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BannedAction {
    /// Diagnose the dependency but keep analyzing.
    Warn,
    /// Exclude the library from the analysis.
    Exclude,
}

/// One banned library and the reason for the ban.
#[derive(Clone, Debug)]
pub struct BannedLib {
    /// Library base name, e.g. `libbinder.so`.
    pub name: String,
    /// Human readable justification.
    pub reason: String,
    /// Action taken on offending dependencies.
    pub action: BannedAction,
}

/// Base-name-keyed dictionary of libraries vendor code must not use.
#[derive(Clone, Debug, Default)]
pub struct BannedLibDict {
    banned_libs: BTreeMap<String, BannedLib>,
}

impl BannedLibDict {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in policy.
    pub fn create_default() -> Self {
        let mut dict = BannedLibDict::new();
        dict.add("libbinder.so", "un-versioned IPC", BannedAction::Warn);
        dict.add(
            "libselinux.so",
            "policydb might be incompatible",
            BannedAction::Warn,
        );
        dict
    }

    /// Registers a banned library, replacing any earlier entry of that name.
    pub fn add(&mut self, name: &str, reason: &str, action: BannedAction) {
        self.banned_libs.insert(
            name.to_owned(),
            BannedLib {
                name: name.to_owned(),
                reason: reason.to_owned(),
                action,
            },
        );
    }

    /// Looks up a library base name.
    pub fn get(&self, name: &str) -> Option<&BannedLib> {
        self.banned_libs.get(name)
    }
}
