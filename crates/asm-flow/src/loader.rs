//! Source loading for the top-level file and `!source` inclusions.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Resolves a file name and returns its full text.
///
/// Implementations read the whole file at once; the assembler never keeps a
/// handle open while parsing.
pub trait SourceLoader: fmt::Debug {
    /// Load `name`. `includer` is the path of the file containing the
    /// `!source` statement, or `None` for the top-level file.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of the first candidate path if no candidate
    /// could be read.
    fn load(&mut self, name: &Path, includer: Option<&Path>) -> io::Result<(PathBuf, Vec<u8>)>;
}

/// Candidate paths in search order: as given, next to the includer, then in
/// each search directory.
fn candidates(name: &Path, includer: Option<&Path>, dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = vec![name.to_path_buf()];
    if name.is_absolute() {
        return out;
    }
    let mut push = |path: PathBuf| {
        if !out.contains(&path) {
            out.push(path);
        }
    };
    if let Some(dir) = includer.and_then(Path::parent) {
        push(dir.join(name));
    }
    for dir in dirs {
        push(dir.join(name));
    }
    out
}

/// Loads sources from the file system.
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    include_dirs: Vec<PathBuf>,
}

impl FsLoader {
    /// A loader without search directories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory to search for included files.
    #[must_use]
    pub fn include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    /// Configured search directories.
    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }
}

impl SourceLoader for FsLoader {
    fn load(&mut self, name: &Path, includer: Option<&Path>) -> io::Result<(PathBuf, Vec<u8>)> {
        let mut first_err = None;
        for path in candidates(name, includer, &self.include_dirs) {
            match fs::read(&path) {
                Ok(text) => return Ok((path, text)),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        Err(first_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotFound)))
    }
}

/// Serves sources from memory. Used by [`assemble_str`](crate::assemble_str)
/// and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryLoader {
    /// An empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file.
    #[must_use]
    pub fn file(mut self, name: impl Into<PathBuf>, text: impl Into<Vec<u8>>) -> Self {
        self.insert(name, text);
        self
    }

    /// Add (or replace) a file in place.
    pub fn insert(&mut self, name: impl Into<PathBuf>, text: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), text.into());
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&mut self, name: &Path, includer: Option<&Path>) -> io::Result<(PathBuf, Vec<u8>)> {
        candidates(name, includer, &[])
            .into_iter()
            .find_map(|path| self.files.get(&path).map(|text| (path, text.clone())))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_order() {
        let dirs = [PathBuf::from("inc"), PathBuf::from("lib")];
        let found = candidates(Path::new("x.a"), Some(Path::new("src/main.a")), &dirs);
        assert_eq!(
            found,
            [
                PathBuf::from("x.a"),
                PathBuf::from("src/x.a"),
                PathBuf::from("inc/x.a"),
                PathBuf::from("lib/x.a"),
            ]
        );
    }

    #[test]
    fn candidates_skip_duplicates() {
        let found = candidates(Path::new("x.a"), Some(Path::new("main.a")), &[]);
        assert_eq!(found, [PathBuf::from("x.a")]);
    }

    #[test]
    fn memory_loader_resolves_next_to_includer() {
        let mut loader = MemoryLoader::new().file("src/util.a", "nop");
        let (path, text) = loader
            .load(Path::new("util.a"), Some(Path::new("src/main.a")))
            .unwrap();
        assert_eq!(path, PathBuf::from("src/util.a"));
        assert_eq!(text, b"nop");
    }

    #[test]
    fn memory_loader_missing_file() {
        let mut loader = MemoryLoader::new();
        let err = loader.load(Path::new("gone.a"), None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn fs_loader_reads_from_include_dir() {
        let dir = std::env::temp_dir().join(format!("asm-flow-loader-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("inc.a"), "x = 1\n").unwrap();
        let mut loader = FsLoader::new().include_dir(&dir);
        let (path, text) = loader.load(Path::new("inc.a"), None).unwrap();
        assert_eq!(path, dir.join("inc.a"));
        assert_eq!(text, b"x = 1\n");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn fs_loader_reports_first_error() {
        let mut loader = FsLoader::new().include_dir("/nonexistent-asm-flow-dir");
        let err = loader
            .load(Path::new("definitely-missing-file.a"), None)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
