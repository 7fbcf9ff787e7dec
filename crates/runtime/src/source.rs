//! Script sources
//!
//! A source enumerates groups; a group is an ordered list of units; a unit
//! is a name plus a stream that can be opened any number of times.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use tweaker_core::{Result, TweakerError};

/// A named, readable script unit
pub trait ScriptUnit: Send + Sync {
    fn name(&self) -> &str;

    /// Open a fresh stream over the unit's content
    fn open(&self) -> io::Result<Box<dyn Read + '_>>;
}

/// A named bundle of units compiled together
#[derive(Clone)]
pub struct ScriptGroup {
    pub name: String,
    pub units: Vec<Arc<dyn ScriptUnit>>,
}

impl ScriptGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: Vec::new(),
        }
    }

    /// Append a unit
    pub fn with_unit(mut self, unit: impl ScriptUnit + 'static) -> Self {
        self.units.push(Arc::new(unit));
        self
    }
}

impl fmt::Debug for ScriptGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units: Vec<_> = self.units.iter().map(|unit| unit.name()).collect();
        f.debug_struct("ScriptGroup")
            .field("name", &self.name)
            .field("units", &units)
            .finish()
    }
}

/// Enumerates script groups in load order
pub trait ScriptSource {
    fn groups(&self) -> Result<Vec<ScriptGroup>>;
}

/// Unit held in memory
#[derive(Debug, Clone)]
pub struct MemoryUnit {
    name: String,
    content: Vec<u8>,
}

impl MemoryUnit {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

impl ScriptUnit for MemoryUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.content.as_slice()))
    }
}

/// Groups held in memory, yielded in insertion order
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    groups: Vec<ScriptGroup>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group
    pub fn with_group(mut self, group: ScriptGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Add a group of text units
    pub fn with_text_group<'a>(
        self,
        name: &str,
        units: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let group = units
            .into_iter()
            .fold(ScriptGroup::new(name), |group, (unit, text)| {
                group.with_unit(MemoryUnit::new(unit, text))
            });
        self.with_group(group)
    }
}

impl ScriptSource for MemorySource {
    fn groups(&self) -> Result<Vec<ScriptGroup>> {
        Ok(self.groups.clone())
    }
}

/// Unit backed by a file on disk
#[derive(Debug, Clone)]
pub struct FileUnit {
    name: String,
    path: PathBuf,
}

impl FileUnit {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScriptUnit for FileUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(BufReader::new(File::open(&self.path)?)))
    }
}

/// Scripts below a root directory.
///
/// Each `.zs` file in the root is its own group. Each sub-directory is one
/// group holding every `.zs` file beneath it, in path order. Symlinked
/// directories inside a bundle are not followed.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bundle(&self, dir: &Path) -> Result<Vec<FileUnit>> {
        let mut units = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for path in sorted_entries(&dir)? {
                if path.is_dir() {
                    // Linked directories can loop back into the bundle
                    if path.is_symlink() {
                        debug!("Skipping linked directory {}", path.display());
                        continue;
                    }
                    pending.push(path);
                } else if is_script(&path) {
                    let relative = path.strip_prefix(&self.root).unwrap_or(&path);
                    let name = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    units.push(FileUnit::new(name, path));
                }
            }
        }

        units.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(units)
    }
}

impl ScriptSource for DirectorySource {
    fn groups(&self) -> Result<Vec<ScriptGroup>> {
        if !self.root.exists() {
            warn!("Script directory {} does not exist", self.root.display());
            return Ok(Vec::new());
        }

        let mut groups = Vec::new();
        for path in sorted_entries(&self.root)? {
            let name = file_name(&path);

            if path.is_dir() {
                let units = self.bundle(&path)?;
                if units.is_empty() {
                    debug!("Skipping {}: no scripts", path.display());
                    continue;
                }
                groups.push(
                    units
                        .into_iter()
                        .fold(ScriptGroup::new(name), |group, unit| group.with_unit(unit)),
                );
            } else if is_script(&path) {
                groups.push(ScriptGroup::new(name.clone()).with_unit(FileUnit::new(name, path)));
            }
        }

        debug!("Found {} script groups in {}", groups.len(), self.root.display());
        Ok(groups)
    }
}

/// Several sources, one after the other
#[derive(Default)]
pub struct CascadeSource {
    sources: Vec<Box<dyn ScriptSource>>,
}

impl CascadeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl ScriptSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ScriptSource for CascadeSource {
    fn groups(&self) -> Result<Vec<ScriptGroup>> {
        let mut groups = Vec::new();
        for source in &self.sources {
            groups.extend(source.groups()?);
        }
        Ok(groups)
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .and_then(|entries| entries.map(|e| e.map(|e| e.path())).collect::<io::Result<Vec<_>>>())
        .map_err(|e| TweakerError::Source(format!("Could not read {}: {}", dir.display(), e)))?;
    entries.sort();
    Ok(entries)
}

fn is_script(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zs"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_all(unit: &dyn ScriptUnit) -> String {
        let mut text = String::new();
        unit.open().unwrap().read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new()
            .with_text_group("a.zs", [("a.zs", "print(1);")])
            .with_text_group("bundle", [("bundle/x.zs", "x"), ("bundle/y.zs", "y")]);

        let groups = source.groups().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].name, "bundle");
        assert_eq!(groups[1].units[1].name(), "bundle/y.zs");
        assert_eq!(read_all(groups[0].units[0].as_ref()), "print(1);");
        // Units can be opened more than once
        assert_eq!(read_all(groups[0].units[0].as_ref()), "print(1);");
    }

    #[test]
    fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("b.zs"), "print('b');").unwrap();
        fs::write(root.join("a.ZS"), "print('a');").unwrap();
        fs::write(root.join("readme.txt"), "not a script").unwrap();
        fs::create_dir_all(root.join("recipes/nested")).unwrap();
        fs::write(root.join("recipes/tools.zs"), "tools").unwrap();
        fs::write(root.join("recipes/nested/armor.zs"), "armor").unwrap();
        fs::write(root.join("recipes/notes.md"), "notes").unwrap();
        fs::create_dir(root.join("empty")).unwrap();

        let groups = DirectorySource::new(root).groups().unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["a.ZS", "b.zs", "recipes"]);

        let units: Vec<_> = groups[2].units.iter().map(|u| u.name()).collect();
        assert_eq!(units, vec!["recipes/nested/armor.zs", "recipes/tools.zs"]);
        assert_eq!(read_all(groups[2].units[1].as_ref()), "tools");
    }

    #[cfg(unix)]
    #[test]
    fn test_bundle_skips_linked_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("bundle")).unwrap();
        fs::write(root.join("bundle/a.zs"), "a").unwrap();
        std::os::unix::fs::symlink(root.join("bundle"), root.join("bundle/loop")).unwrap();

        let groups = DirectorySource::new(root).groups().unwrap();
        assert_eq!(groups.len(), 1);
        let units: Vec<_> = groups[0].units.iter().map(|u| u.name()).collect();
        assert_eq!(units, vec!["bundle/a.zs"]);
    }

    #[test]
    fn test_missing_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let groups = DirectorySource::new(dir.path().join("missing")).groups().unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_file_unit_open_error() {
        let unit = FileUnit::new("gone.zs", "/definitely/not/here/gone.zs");
        assert!(unit.open().is_err());
    }

    #[test]
    fn test_cascade_source() {
        let cascade = CascadeSource::new()
            .with_source(MemorySource::new().with_text_group("shared", [("one.zs", "1")]))
            .with_source(MemorySource::new().with_text_group("shared", [("two.zs", "2")]));

        assert_eq!(cascade.len(), 2);
        let groups = cascade.groups().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].units[0].name(), "one.zs");
        assert_eq!(groups[1].units[0].name(), "two.zs");
    }
}
