/*!
 * Library Loading
 * Resolves library names to paths and caches loaded handles
 *
 * Loading a library runs its initializers inside this process. Callers that
 * cannot trust a library should bind it behind process isolation.
 */

use super::types::{FfiError, FfiResult};
use libloading::Library;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Library loader with caching and platform-specific path resolution
pub struct LibraryLoader {
    /// Loaded libraries by canonical path
    loaded: HashMap<PathBuf, Arc<Library>>,
    search_paths: Vec<PathBuf>,
}

impl LibraryLoader {
    pub fn new() -> Self {
        Self {
            loaded: HashMap::new(),
            search_paths: Self::default_search_paths(),
        }
    }

    /// Current directory first, then the platform's standard library directories
    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/lib"));
            if cfg!(target_pointer_width = "64") {
                paths.push(PathBuf::from("/usr/lib64"));
                paths.push(PathBuf::from("/lib64"));
            }
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/opt/homebrew/lib"));
        }

        #[cfg(target_os = "windows")]
        {
            if let Ok(system_root) = std::env::var("SystemRoot") {
                paths.push(PathBuf::from(format!("{}\\System32", system_root)));
            }
        }

        paths
    }

    /// Resolve a path or a short name (`m` -> `libm.so`)
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_file() {
            return Some(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
        }
        if path.components().count() > 1 {
            return None;
        }

        let extensions: &[&str] = if cfg!(target_os = "windows") {
            &["dll"]
        } else if cfg!(target_os = "macos") {
            &["dylib", "so"]
        } else {
            &["so"]
        };
        let prefixes: &[&str] = if cfg!(target_os = "windows") {
            &["", "lib"]
        } else {
            &["lib", ""]
        };

        self.search_paths.iter().find_map(|dir| {
            prefixes.iter().find_map(|prefix| {
                extensions.iter().find_map(|ext| {
                    let candidate = dir.join(format!("{}{}.{}", prefix, name, ext));
                    candidate.is_file().then_some(candidate)
                })
            })
        })
    }

    /// Load a library, returning the cached handle when already loaded
    pub fn load(&mut self, name: &str) -> FfiResult<Arc<Library>> {
        let path = self
            .resolve(name)
            .ok_or_else(|| FfiError::LibraryNotFound(name.to_string()))?;

        if let Some(library) = self.loaded.get(&path) {
            return Ok(Arc::clone(library));
        }

        // Safety: the library's initializers run here; see module docs
        let library = unsafe { Library::new(&path) }.map_err(|e| FfiError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "native library loaded");

        let library = Arc::new(library);
        self.loaded.insert(path, Arc::clone(&library));
        Ok(library)
    }

    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.insert(0, path);
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide loader shared by every in-process binding
pub fn shared_loader() -> &'static Mutex<LibraryLoader> {
    static LOADER: OnceLock<Mutex<LibraryLoader>> = OnceLock::new();
    LOADER.get_or_init(|| Mutex::new(LibraryLoader::new()))
}
