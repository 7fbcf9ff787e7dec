//! Core type definitions

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

/// Compiled artifacts of one group, keyed by internal artifact name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an artifact, returning the payload it replaced (if any)
    pub fn insert(&mut self, name: impl Into<String>, payload: Vec<u8>) -> Option<Vec<u8>> {
        self.artifacts.insert(name.into(), payload)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.artifacts.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Total payload size in bytes
    pub fn payload_size(&self) -> usize {
        self.artifacts.values().map(Vec::len).sum()
    }
}

impl<'a> IntoIterator for &'a ArtifactSet {
    type Item = (&'a String, &'a Vec<u8>);
    type IntoIter = btree_map::Iter<'a, String, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.iter()
    }
}

/// Derive the internal artifact name for a script unit.
///
/// Leading path separators and a trailing `.zs` are dropped, every character
/// outside `[A-Za-z0-9_]` becomes `_`, and names starting with a digit get a
/// leading `_`.
///
/// ```
/// use tweaker_core::artifact_name;
///
/// assert_eq!(artifact_name("recipes/Tools.zs"), "recipes_Tools");
/// assert_eq!(artifact_name("/1st pass.zs"), "_1st_pass");
/// ```
pub fn artifact_name(unit_name: &str) -> String {
    let trimmed = unit_name.trim_start_matches(['/', '\\']);
    let stem = match trimmed.len().checked_sub(3) {
        Some(cut) if trimmed.is_char_boundary(cut) && trimmed[cut..].eq_ignore_ascii_case(".zs") => {
            &trimmed[..cut]
        }
        _ => trimmed,
    };

    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if name.is_empty() {
        return "__script".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Build configuration shared by every group of a run.
///
/// Holds the debug flag and the set of unit names whose bracket errors are
/// tolerated. Both only ever grow: there is no way to turn debug off or to
/// drop a suppressed unit again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSettings {
    debug: bool,
    suppressed: BTreeSet<String>,
}

impl BuildSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every following group with debug artifacts
    pub fn enable_debug(&mut self) {
        self.debug = true;
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Tolerate malformed bracket expressions in the unit with this exact name
    pub fn suppress_bracket_errors(&mut self, unit_name: impl Into<String>) {
        self.suppressed.insert(unit_name.into());
    }

    pub fn ignores_bracket_errors(&self, unit_name: &str) -> bool {
        self.suppressed.contains(unit_name)
    }

    pub fn suppressed_units(&self) -> impl Iterator<Item = &str> {
        self.suppressed.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name_strips_extension() {
        assert_eq!(artifact_name("main.zs"), "main");
        assert_eq!(artifact_name("MAIN.ZS"), "MAIN");
        assert_eq!(artifact_name("notes.txt"), "notes_txt");
    }

    #[test]
    fn test_artifact_name_sanitizes() {
        assert_eq!(artifact_name("/scripts/my file.zs"), "scripts_my_file");
        assert_eq!(artifact_name("\\win\\path.zs"), "win_path");
        assert_eq!(artifact_name("9lives.zs"), "_9lives");
        assert_eq!(artifact_name("é.zs"), "_");
    }

    #[test]
    fn test_artifact_name_empty() {
        assert_eq!(artifact_name(".zs"), "__script");
        assert_eq!(artifact_name("/"), "__script");
    }

    #[test]
    fn test_build_settings_suppression_is_exact() {
        let mut settings = BuildSettings::new();
        assert!(!settings.debug());

        settings.suppress_bracket_errors("A.zs");
        settings.enable_debug();

        assert!(settings.debug());
        assert!(settings.ignores_bracket_errors("A.zs"));
        assert!(!settings.ignores_bracket_errors("B.zs"));
        assert!(!settings.ignores_bracket_errors("a.zs"));
        assert_eq!(settings.suppressed_units().collect::<Vec<_>>(), vec!["A.zs"]);
    }

    #[test]
    fn test_artifact_set() {
        let mut set = ArtifactSet::new();
        assert!(set.is_empty());

        assert!(set.insert("a", vec![1, 2]).is_none());
        assert_eq!(set.insert("a", vec![3]), Some(vec![1, 2]));
        set.insert("b", vec![4, 5]);

        assert_eq!(set.get("a"), Some(&[3u8][..]));
        assert!(set.contains("b"));
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(set.payload_size(), 3);
    }
}
