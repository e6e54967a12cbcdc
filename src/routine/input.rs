use std::path::{Path, PathBuf};

use crate::error::Result;

/// Raw catalog input. Read once, then closed.
pub trait InputSource: Send {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    fn read_to_string(&mut self) -> Result<String>;

    /// Release the underlying resource. Called exactly once per source.
    fn close(&mut self) {}
}

/// A catalog file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.to_string_lossy().replace('\\', "/");
        Self { path, name }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_to_string(&mut self) -> Result<String> {
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

/// In-memory input.
#[derive(Debug, Clone)]
pub struct StringSource {
    name: String,
    content: String,
}

impl StringSource {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

impl InputSource for StringSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_to_string(&mut self) -> Result<String> {
        Ok(self.content.clone())
    }
}

/// Owns a source for the duration of one read and closes it on drop.
pub struct InputGuard {
    source: Box<dyn InputSource>,
}

impl InputGuard {
    #[must_use]
    pub fn new(source: Box<dyn InputSource>) -> Self {
        Self { source }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn read_to_string(&mut self) -> Result<String> {
        self.source.read_to_string()
    }
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        tracing::debug!(input = self.source.name(), "closing input");
        self.source.close();
    }
}
