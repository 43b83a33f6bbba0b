use std::collections::HashMap;

use crate::linked_data::Cid;

/// Bidirectional map between root-relative paths and their content ids.
///
/// Identical files share a cid, so the cid side only remembers the most
/// recently indexed path for it.
#[derive(Debug, Default, Clone)]
pub struct WatcherIndex {
    path_to_cid: HashMap<String, Cid>,
    cid_to_path: HashMap<Cid, String>,
}

impl WatcherIndex {
    pub fn insert(&mut self, path: &str, cid: Cid) {
        self.path_to_cid.insert(path.to_string(), cid);
        self.cid_to_path.insert(cid, path.to_string());
    }

    /// Drop `path` from both directions, returning its last known cid.
    /// The cid side is only cleared if it still points at `path`.
    pub fn remove(&mut self, path: &str) -> Option<Cid> {
        let cid = self.path_to_cid.remove(path)?;
        if self.cid_to_path.get(&cid).map(String::as_str) == Some(path) {
            self.cid_to_path.remove(&cid);
        }
        Some(cid)
    }

    pub fn cid_for(&self, path: &str) -> Option<Cid> {
        self.path_to_cid.get(path).copied()
    }

    pub fn lookup(&self, cid: &Cid) -> Option<&str> {
        self.cid_to_path.get(cid).map(String::as_str)
    }

    pub fn cid_map(&self) -> HashMap<Cid, String> {
        self.cid_to_path.clone()
    }

    /// Every indexed path with its cid, including paths whose content
    /// duplicates another file
    pub fn entries(&self) -> Vec<(String, Cid)> {
        let mut entries: Vec<_> = self
            .path_to_cid
            .iter()
            .map(|(path, cid)| (path.clone(), *cid))
            .collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.path_to_cid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path_to_cid.is_empty()
    }
}
