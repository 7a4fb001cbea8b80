//! Utility functions shared across the harness.

use crate::error::{HarnessError, Result};
use cfg_if::cfg_if;
use std::{
    collections::HashSet,
    fs,
    path::{Component, Path, PathBuf},
    sync::RwLock,
};

/// Package separator in binary names (`com.example.Foo`).
pub const PACKAGE_SEPARATOR: char = '.';

/// Default similarity threshold for fuzzy suggestions.
pub const FUZZY_THRESHOLD: f64 = 0.6;

/// Maximum number of fuzzy suggestions surfaced in failure messages.
pub const FUZZY_LIMIT: usize = 3;

/// Returns true if `name` is a valid identifier segment of a binary name.
///
/// The accepted character set is closed: ASCII letters, digits, `_`, and `$`,
/// with no leading digit and no reserved path names.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Returns true if every `.`-separated segment of `name` is a valid identifier.
pub fn is_binary_name(name: &str) -> bool {
    !name.is_empty() && name.split(PACKAGE_SEPARATOR).all(is_identifier)
}

/// Convert a dotted package name into a relative path.
///
/// The empty package maps to the empty path.
pub fn package_to_path(package: &str) -> PathBuf {
    if package.is_empty() {
        PathBuf::new()
    } else {
        package.split(PACKAGE_SEPARATOR).collect()
    }
}

/// Convert a binary name and file kind into the relative path of the
/// corresponding file, e.g. `com.example.Foo` + `CLASS` into
/// `com/example/Foo.class`.
pub fn binary_name_to_path(binary_name: &str, extension: &str) -> PathBuf {
    let (package, class) = split_binary_name(binary_name);
    let mut path = package_to_path(package);
    path.push(format!("{class}{extension}"));
    path
}

/// Split a binary name at the last package separator into
/// `(package, class_name)`. Names without a package yield an empty package.
pub fn split_binary_name(binary_name: &str) -> (&str, &str) {
    match binary_name.rsplit_once(PACKAGE_SEPARATOR) {
        Some((package, class)) => (package, class),
        None => ("", binary_name),
    }
}

/// Inverse of [`binary_name_to_path`]: decode a path relative to a container
/// root back into a binary name, provided every intermediate component is a
/// valid identifier and the basename carries the given extension.
pub fn path_to_binary_name(relative: &Path, extension: &str) -> Option<String> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(os) => segments.push(os.to_str()?),
            // anything non-normal (.., leading /, prefixes) cannot decode
            _ => return None,
        }
    }
    let file_name = segments.pop()?;
    let stem = file_name.strip_suffix(extension)?;
    if !is_identifier(stem) || !segments.iter().all(|s| is_identifier(s)) {
        return None;
    }
    let mut name = String::new();
    for segment in segments {
        name.push_str(segment);
        name.push(PACKAGE_SEPARATOR);
    }
    name.push_str(stem);
    Some(name)
}

/// Resolve a `(package, relative_name)` pair into a relative path, rejecting
/// absolute relative names.
pub fn resource_path(package: &str, relative_name: &str) -> Result<PathBuf> {
    let relative = Path::new(relative_name);
    if relative.is_absolute() {
        return Err(HarnessError::config(format!(
            "resource name \"{relative_name}\" must be relative"
        )));
    }
    let mut path = package_to_path(package);
    path.push(relative);
    Ok(path)
}

/// Sanitise a user-supplied root name into a filesystem-safe identifier.
pub fn sanitize_root_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "root".into()
    } else {
        sanitized
    }
}

/// Canonicalize a path on the host filesystem, avoiding UNC paths on Windows.
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    dunce::canonicalize(path).map_err(|io| HarnessError::io(io, path))
}

cfg_if! {
    if #[cfg(windows)] {
        fn try_link(target: &Path, link: &Path) -> bool {
            fs::hard_link(target, link).is_ok()
        }
    } else if #[cfg(unix)] {
        fn try_link(target: &Path, link: &Path) -> bool {
            std::os::unix::fs::symlink(target, link).is_ok()
        }
    } else {
        fn try_link(_target: &Path, _link: &Path) -> bool {
            false
        }
    }
}

/// Create `link` pointing at `target`, or fall back to a byte copy.
///
/// The strategy is a function of the OS name alone: hard links on Windows,
/// symbolic links on POSIX, a plain copy elsewhere. Any link failure also
/// falls back to copying.
pub fn link_or_copy(target: &Path, link: &Path) -> Result<()> {
    if !try_link(target, link) {
        fs::copy(target, link).map_err(|io| HarnessError::io(io, link))?;
    }
    Ok(())
}

/// Discover the host process class path from the conventional `CLASSPATH`
/// variable: split on the platform separator, drop duplicates and entries
/// that no longer exist.
pub fn host_class_path() -> Vec<PathBuf> {
    let Ok(raw) = std::env::var("CLASSPATH") else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    std::env::split_paths(&raw)
        .filter(|p| !p.as_os_str().is_empty())
        .filter(|p| seen.insert(p.clone()))
        .filter(|p| p.exists())
        .collect()
}

/// Discover the platform class path of the host runtime, if any.
///
/// Modern runtimes ship modules rather than a class path, so this is usually
/// empty; legacy layouts surface the jars under `$JAVA_HOME/lib`.
pub fn host_platform_class_path() -> Vec<PathBuf> {
    let Some(lib) = java_home().map(|home| home.join("lib")) else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(&lib) else {
        return Vec::new();
    };
    let mut jars: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("jar")))
        .collect();
    jars.sort();
    jars
}

/// Discover the runtime module roots of the host runtime (`$JAVA_HOME/jmods`).
pub fn host_system_modules() -> Vec<PathBuf> {
    java_home()
        .map(|home| home.join("jmods"))
        .filter(|jmods| jmods.is_dir())
        .map(|jmods| vec![jmods])
        .unwrap_or_default()
}

fn java_home() -> Option<PathBuf> {
    std::env::var_os("JAVA_HOME").map(PathBuf::from).filter(|p| p.is_dir())
}

/// A lazily-initialised, destroyable slot.
///
/// The first [`LazyOnce::get_or_init`] runs the producer under the write lock;
/// steady-state reads take the read lock only. [`LazyOnce::destroy`]
/// invalidates the slot, after which the next access re-runs the producer.
#[derive(Debug, Default)]
pub struct LazyOnce<T> {
    slot: RwLock<Option<T>>,
}

impl<T: Clone> LazyOnce<T> {
    pub fn new() -> Self {
        Self { slot: RwLock::new(None) }
    }

    pub fn get_or_init<F>(&self, producer: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.slot.read().expect("lazy slot poisoned").as_ref() {
            return Ok(value.clone());
        }
        let mut slot = self.slot.write().expect("lazy slot poisoned");
        // double-checked: another thread may have initialised while we waited
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }
        let value = producer()?;
        *slot = Some(value.clone());
        Ok(value)
    }

    /// Invalidate the slot. Returns the previous value, if any.
    pub fn destroy(&self) -> Option<T> {
        self.slot.write().expect("lazy slot poisoned").take()
    }

    /// Run `consumer` iff the slot is currently initialised.
    pub fn if_initialized<F>(&self, consumer: F)
    where
        F: FnOnce(&T),
    {
        if let Some(value) = self.slot.read().expect("lazy slot poisoned").as_ref() {
            consumer(value);
        }
    }
}

/// Return up to `limit` candidates similar to `query`, ordered by descending
/// similarity, filtered by `threshold` on the normalised edit-distance ratio.
pub fn fuzzy_suggestions<'a, I>(query: &str, candidates: I, limit: usize, threshold: f64) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .map(|candidate| (strsim::normalized_levenshtein(query, candidate), candidate))
        .filter(|(score, _)| *score >= threshold)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(b.1)));
    scored.into_iter().take(limit).map(|(_, c)| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identifiers_follow_source_language_rules() {
        assert!(is_identifier("Foo"));
        assert!(is_identifier("_internal"));
        assert!(is_identifier("Money$Builder"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("with-dash"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn binary_names_round_trip_through_paths() {
        for name in ["com.example.Foo", "Foo", "a.b.c.D$E"] {
            let path = binary_name_to_path(name, ".class");
            assert_eq!(path_to_binary_name(&path, ".class").as_deref(), Some(name));
        }
    }

    #[test]
    fn invalid_paths_do_not_decode() {
        assert_eq!(path_to_binary_name(Path::new("com/exa-mple/Foo.class"), ".class"), None);
        assert_eq!(path_to_binary_name(Path::new("com/example/Foo.txt"), ".class"), None);
        assert_eq!(path_to_binary_name(Path::new("../Foo.class"), ".class"), None);
    }

    #[test]
    fn resource_paths_reject_absolute_names() {
        assert!(resource_path("com.example", "/etc/passwd").is_err());
        assert_eq!(
            resource_path("com.example", "app.properties").unwrap(),
            Path::new("com/example/app.properties")
        );
    }

    #[test]
    fn root_names_are_sanitised() {
        assert_eq!(sanitize_root_name("my root!"), "my_root_");
        assert_eq!(sanitize_root_name(""), "root");
        assert_eq!(sanitize_root_name("ok-1.2_3"), "ok-1.2_3");
    }

    #[test]
    fn lazy_once_initialises_exactly_once_per_cycle() {
        let lazy = LazyOnce::new();
        let mut calls = 0;
        let first: i32 = lazy
            .get_or_init(|| {
                calls += 1;
                Ok(7)
            })
            .unwrap();
        let second = lazy
            .get_or_init(|| {
                calls += 1;
                Ok(8)
            })
            .unwrap();
        assert_eq!((first, second, calls), (7, 7, 1));

        assert_eq!(lazy.destroy(), Some(7));
        let third = lazy
            .get_or_init(|| {
                calls += 1;
                Ok(9)
            })
            .unwrap();
        assert_eq!((third, calls), (9, 2));
    }

    #[test]
    fn lazy_once_consumer_is_a_noop_when_uninitialised() {
        let lazy: LazyOnce<i32> = LazyOnce::new();
        let mut ran = false;
        lazy.if_initialized(|_| ran = true);
        assert!(!ran);
    }

    #[test]
    fn fuzzy_suggestions_filter_and_order() {
        let candidates = ["foo.baz", "foo.bork", "org.example"];
        let suggestions = fuzzy_suggestions("foo.bar", candidates, 3, FUZZY_THRESHOLD);
        assert_eq!(suggestions, vec!["foo.baz".to_string(), "foo.bork".to_string()]);
    }

    #[test]
    fn fuzzy_suggestions_respect_the_limit() {
        let candidates = ["aaaa", "aaab", "aaac", "aaad"];
        assert_eq!(fuzzy_suggestions("aaaa", candidates, 2, 0.5).len(), 2);
    }
}
