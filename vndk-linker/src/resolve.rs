//! First-match lookup of `DT_NEEDED` names.

use std::collections::BTreeMap;

use crate::graph::LibIdx;

/// Resolves needed-library names against one word-size map.
///
/// Candidate paths are tried in loader order: `DT_RPATH` directories, then
/// `DT_RUNPATH` directories, then the default search path of the word size.
/// The first candidate present in the map wins.
pub struct Resolver<'a> {
    lib_set: &'a BTreeMap<String, LibIdx>,
    default_search_path: &'a [&'a str],
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `lib_set` with the given default search path.
    pub fn new(lib_set: &'a BTreeMap<String, LibIdx>, default_search_path: &'a [&'a str]) -> Self {
        Resolver {
            lib_set,
            default_search_path,
        }
    }

    /// Returns every candidate path for `name`, in search order.
    pub fn candidates(&self, name: &str, dt_rpath: &[String], dt_runpath: &[String]) -> Vec<String> {
        dt_rpath
            .iter()
            .map(String::as_str)
            .chain(dt_runpath.iter().map(String::as_str))
            .chain(self.default_search_path.iter().copied())
            .map(|dir| format!("{}/{name}", dir.trim_end_matches('/')))
            .collect()
    }

    /// Returns the first candidate present in the map, if any.
    pub fn resolve(&self, name: &str, dt_rpath: &[String], dt_runpath: &[String]) -> Option<LibIdx> {
        self.candidates(name, dt_rpath, dt_runpath)
            .iter()
            .find_map(|path| self.lib_set.get(path).copied())
    }
}
