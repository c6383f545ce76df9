//! Template loading and caching.
//!
//! An [`Engine`][`crate::Engine`] resolves a template name in this order:
//!
//! 1. Templates added with [`add_template`][`crate::Engine::add_template()`].
//! 2. The [`Cache`], unless the [`Loader`] reports a different modification time.
//! 3. The [`Loader`], after which the compiled template is put in the cache.
use crate::{
    compile::Template,
    log::{Error, ErrorKind},
};
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Component, Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
    time::SystemTime,
};

/// Source text of a template returned by a [`Loader`].
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub text: String,
    /// Time the source was last changed, if known.
    pub modified: Option<SystemTime>,
}

impl Source {
    /// Create a new [`Source`] with no modification time.
    pub fn new<T>(text: T) -> Self
    where
        T: Into<String>,
    {
        Self {
            text: text.into(),
            modified: None,
        }
    }
}

/// Describes a type which can resolve a template name to its source.
pub trait Loader: Send + Sync {
    /// Return the source of the named template, or `None` if it does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the template exists but cannot be read.
    fn load(&self, name: &str) -> Result<Option<Source>, Error>;

    /// Return the time the named template was last changed.
    ///
    /// Used to decide whether a cached template is stale. Returning `None`
    /// means a cached template is always used.
    fn modified(&self, _name: &str) -> Option<SystemTime> {
        None
    }
}

/// A [`Loader`] that holds template sources in memory.
///
/// # Examples
///
/// ```
/// use kiln::{loader::MemoryLoader, Engine, Store};
///
/// let loader = MemoryLoader::new()
///     .with_template("base", "<h1>{% block title %}{% endblock %}</h1>")
///     .with_template("page", "{% extends 'base' %}{% block title %}Hi{% endblock %}");
///
/// let engine = Engine::default().with_loader(loader);
/// let output = engine.render_named("page", &Store::new());
///
/// assert_eq!(output.unwrap(), "<h1>Hi</h1>");
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    /// Create a new, empty [`MemoryLoader`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the source of a template.
    pub fn insert<S, T>(&mut self, name: S, text: T)
    where
        S: Into<String>,
        T: Into<String>,
    {
        self.templates.insert(name.into(), text.into());
    }

    /// Add the source of a template.
    ///
    /// Returns the `MemoryLoader`, so additional methods may be chained.
    pub fn with_template<S, T>(mut self, name: S, text: T) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        self.insert(name, text);
        self
    }
}

impl Loader for MemoryLoader {
    fn load(&self, name: &str) -> Result<Option<Source>, Error> {
        Ok(self.templates.get(name).map(Source::new))
    }
}

/// A [`Loader`] that reads templates from one or more directories.
///
/// Names use `/` as a separator on every platform. Directories are searched
/// in the order they were added, and names that would leave a directory,
/// such as `../secret`, are never resolved.
#[derive(Debug, Default, Clone)]
pub struct FileSystemLoader {
    paths: Vec<PathBuf>,
}

impl FileSystemLoader {
    /// Create a new [`FileSystemLoader`] searching a single directory.
    pub fn new<P>(path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            paths: vec![path.into()],
        }
    }

    /// Add another directory to search.
    ///
    /// Returns the `FileSystemLoader`, so additional methods may be chained.
    pub fn with_path<P>(mut self, path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        self.paths.push(path.into());
        self
    }

    /// Return the path of the named template within each directory.
    fn candidates<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = PathBuf> + 'a> {
        let relative = name
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<PathBuf>();
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || relative.as_os_str().is_empty() {
            log::debug!("refusing to resolve template name `{name}`");
            return None;
        }

        Some(self.paths.iter().map(move |base| base.join(&relative)))
    }
}

impl Loader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<Option<Source>, Error> {
        let Some(candidates) = self.candidates(name) else {
            return Ok(None);
        };

        for path in candidates {
            match fs::read_to_string(&path) {
                Ok(text) => {
                    log::debug!("loaded template `{name}` from {}", path.display());
                    return Ok(Some(Source {
                        text,
                        modified: modified(&path),
                    }));
                }
                Err(e) if e.kind() == IoErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::new(
                        ErrorKind::Runtime,
                        format!("failed to read template `{name}`: {e}"),
                    ))
                }
            }
        }

        Ok(None)
    }

    fn modified(&self, name: &str) -> Option<SystemTime> {
        self.candidates(name)?
            .find(|path| path.is_file())
            .and_then(|path| modified(&path))
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Describes a store of compiled templates.
pub trait Cache: Send + Sync {
    /// Return the compiled template with the given name.
    fn get(&self, name: &str) -> Option<Arc<Template>>;

    /// Store a compiled template.
    fn put(&self, name: &str, template: Arc<Template>);

    /// Remove a compiled template.
    fn invalidate(&self, name: &str);
}

/// A [`Cache`] that keeps every compiled template in memory.
#[derive(Debug, Default)]
pub struct MemoryCache {
    templates: RwLock<HashMap<String, Arc<Template>>>,
}

impl MemoryCache {
    /// Create a new, empty [`MemoryCache`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of cached templates.
    pub fn len(&self) -> usize {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Return true if no template is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, name: &str) -> Option<Arc<Template>> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn put(&self, name: &str, template: Arc<Template>) {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), template);
    }

    fn invalidate(&self, name: &str) {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::{Cache, FileSystemLoader, Loader, MemoryCache, MemoryLoader};
    use crate::Engine;
    use std::fs;

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with_template("a", "text");
        assert_eq!(loader.load("a").unwrap().unwrap().text, "text");
        assert!(loader.load("b").unwrap().is_none());
    }

    #[test]
    fn test_file_system_loader() {
        let dir = std::env::temp_dir().join(format!("kiln-loader-{}", std::process::id()));
        fs::create_dir_all(dir.join("pages")).unwrap();
        fs::write(dir.join("pages/index.html"), "hello").unwrap();

        let loader = FileSystemLoader::new(dir.join("missing")).with_path(&dir);
        let source = loader.load("pages/index.html").unwrap().unwrap();
        assert_eq!(source.text, "hello");
        assert!(source.modified.is_some());
        assert!(loader.modified("pages/index.html").is_some());
        assert!(loader.load("pages/other.html").unwrap().is_none());
        assert!(loader.load("../index.html").unwrap().is_none());
        assert!(loader.load("pages/../../index.html").unwrap().is_none());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::new();
        let template = Engine::default().compile("x").unwrap();

        cache.put("x", template);
        assert!(cache.get("x").is_some());
        assert_eq!(cache.len(), 1);

        cache.invalidate("x");
        assert!(cache.get("x").is_none());
        assert!(cache.is_empty());
    }
}
