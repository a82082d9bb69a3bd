//! Source files, include resolution and the source map used by diagnostics.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A loaded source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: Rc<str>,
}

impl SourceFile {
    /// The text of a 1-based line, without its line terminator.
    pub fn line(&self, line: usize) -> Option<&str> {
        line.checked_sub(1)
            .and_then(|idx| self.text.lines().nth(idx))
    }
}

/// Every source file that contributed tokens, indexed by `Span::source`.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, text: impl Into<Rc<str>>) -> u16 {
        let index = self.files.len() as u16;
        self.files.push(SourceFile {
            name: name.into(),
            text: text.into(),
        });
        index
    }

    pub fn get(&self, index: u16) -> Option<&SourceFile> {
        self.files.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter()
    }
}

/// Resolves and reads the targets of `include` statements.
pub trait SourceLoader {
    /// Turn the name written after `include` into a canonical name.
    fn resolve(&self, name: &str) -> io::Result<String>;

    /// Read a previously resolved source.
    fn read(&self, resolved: &str) -> io::Result<String>;
}

/// Loads includes from disk, relative to the main script's directory.
///
/// `include util` tries `util` and then `util.cj`.
#[derive(Debug, Clone)]
pub struct FileLoader {
    base: PathBuf,
}

impl FileLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// A loader rooted at the directory containing `script`.
    pub fn for_script(script: &Path) -> Self {
        let base = script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self { base }
    }
}

impl SourceLoader for FileLoader {
    fn resolve(&self, name: &str) -> io::Result<String> {
        let direct = self.base.join(name);
        if direct.is_file() {
            return Ok(direct.to_string_lossy().into_owned());
        }
        if direct.extension().is_none() {
            let with_ext = direct.with_extension("cj");
            if with_ext.is_file() {
                return Ok(with_ext.to_string_lossy().into_owned());
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such file: {}", direct.display()),
        ))
    }

    fn read(&self, resolved: &str) -> io::Result<String> {
        std::fs::read_to_string(resolved)
    }
}

/// Serves includes from memory; used for embedded programs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.files.insert(name.into(), text.into());
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn resolve(&self, name: &str) -> io::Result<String> {
        if self.files.contains_key(name) {
            return Ok(name.to_string());
        }
        let with_ext = format!("{}.cj", name);
        if self.files.contains_key(&with_ext) {
            return Ok(with_ext);
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such file: {}", name),
        ))
    }

    fn read(&self, resolved: &str) -> io::Result<String> {
        self.files.get(resolved).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", resolved))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_line_lookup() {
        let mut map = SourceMap::new();
        let idx = map.add("main.cj", "first\nsecond\nthird");
        let file = map.get(idx).unwrap();
        assert_eq!(file.line(2), Some("second"));
        assert_eq!(file.line(0), None);
        assert_eq!(file.line(9), None);
    }

    #[test]
    fn test_memory_loader_tries_extension() {
        let loader = MemoryLoader::new().with_file("util.cj", "x");
        assert_eq!(loader.resolve("util").unwrap(), "util.cj");
        assert!(loader.resolve("missing").is_err());
    }

    #[test]
    fn test_file_loader_resolves_relative_to_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("helpers.cj"), "function h() { return 1; }").unwrap();
        let loader = FileLoader::for_script(&dir.path().join("main.cj"));
        let resolved = loader.resolve("helpers").unwrap();
        assert!(resolved.ends_with("helpers.cj"));
        assert!(loader.read(&resolved).unwrap().contains("function h"));
    }
}
