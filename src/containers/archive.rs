use super::Container;
use crate::{
    error::{HarnessError, Result},
    files::{ByteSource, FileKind, FileObject},
    location::Location,
    utils,
    vfs::{FileSystem, ReadSeek},
};
use path_slash::PathExt;
use std::{
    collections::{BTreeMap, HashMap},
    io::{self, Cursor, Read, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use zip::{result::ZipError, write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

const VERSIONS_PREFIX: &str = "META-INF/versions/";

type ZipReader = ZipArchive<Box<dyn ReadSeek + Send>>;

/// Shared read handle over one archive. Every [`ArchiveContainer`] owns its
/// own handle; file objects surfaced by the container keep the handle alive.
pub(crate) struct ArchiveReader {
    display: String,
    zip: Mutex<Option<ZipReader>>,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("display", &self.display)
            .field("zip", &self.zip.lock().map(|g| g.is_some()))
            .finish()
    }
}

impl ArchiveReader {
    fn closed_error(&self) -> HarnessError {
        HarnessError::ClosedContainer { container: self.display.clone() }
    }

    fn is_closed(&self) -> bool {
        self.zip.lock().expect("archive handle poisoned").is_none()
    }

    fn close(&self) {
        self.zip.lock().expect("archive handle poisoned").take();
    }
}

impl ByteSource for ArchiveReader {
    fn read_entry(&self, entry: &str) -> Result<Vec<u8>> {
        let mut guard = self.zip.lock().expect("archive handle poisoned");
        let zip = guard.as_mut().ok_or_else(|| self.closed_error())?;
        let mut file = zip
            .by_name(entry)
            .map_err(|e| HarnessError::io(io::Error::from(e), &self.display))?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)
            .map_err(|io| HarnessError::io(io, &self.display))?;
        Ok(bytes)
    }
}

#[derive(Debug)]
struct LogicalEntry {
    version: u32,
    physical: String,
}

/// A read-only container over a `.jar`/`.zip`/`.war` archive.
///
/// The entry and package indexes are built eagerly at open time; lookups
/// afterwards are O(1) on the package. Multi-release archives resolve
/// `META-INF/versions/<n>` overlays for `n` up to the effective release, the
/// highest such `n` winning per entry.
#[derive(Debug)]
pub struct ArchiveContainer {
    location: Location,
    archive_path: PathBuf,
    uri_base: String,
    reader: Arc<ArchiveReader>,
    entries: BTreeMap<String, LogicalEntry>,
    package_index: HashMap<String, String>,
}

impl ArchiveContainer {
    /// Open an archive. `release` is the effective release used to resolve
    /// multi-release overlays; `None` disables them.
    pub fn open(
        location: Location,
        fs: Arc<dyn FileSystem>,
        archive_path: impl Into<PathBuf>,
        release: Option<&str>,
    ) -> Result<Self> {
        let archive_path = archive_path.into();
        let reader = fs.open_read(&archive_path)?;
        let mut zip = ZipArchive::new(reader)
            .map_err(|e| HarnessError::io(io::Error::from(e), &archive_path))?;

        let names: Vec<String> = zip.file_names().map(str::to_owned).collect();
        let release = release.and_then(|r| r.parse::<u32>().ok());
        let multi_release = release.is_some() && manifest_is_multi_release(&mut zip);

        let mut entries: BTreeMap<String, LogicalEntry> = BTreeMap::new();
        for name in names {
            if name.ends_with('/') {
                continue;
            }
            if let Some(rest) = name.strip_prefix(VERSIONS_PREFIX) {
                if multi_release {
                    let Some((version, path)) = rest.split_once('/') else {
                        continue;
                    };
                    let Ok(version) = version.parse::<u32>() else {
                        continue;
                    };
                    if version > release.unwrap_or(0) {
                        continue;
                    }
                    let slot = entries
                        .entry(path.to_owned())
                        .or_insert_with(|| LogicalEntry { version: 0, physical: String::new() });
                    if slot.physical.is_empty() || version > slot.version {
                        slot.version = version;
                        slot.physical = name.clone();
                    }
                    continue;
                }
            }
            // base entry wins its slot only if no overlay claimed it yet
            entries
                .entry(name.clone())
                .and_modify(|slot| {
                    if slot.version == 0 {
                        slot.physical = name.clone();
                    }
                })
                .or_insert(LogicalEntry { version: 0, physical: name.clone() });
        }

        let mut package_index = HashMap::new();
        for logical in entries.keys() {
            let Some((dir, _)) = logical.rsplit_once('/') else {
                continue;
            };
            let mut package = String::new();
            let mut prefix = String::new();
            for segment in dir.split('/') {
                // entries under non-identifier directories (META-INF etc.)
                // never contribute packages
                if !utils::is_identifier(segment) {
                    break;
                }
                if !package.is_empty() {
                    package.push('.');
                    prefix.push('/');
                }
                package.push_str(segment);
                prefix.push_str(segment);
                package_index.entry(package.clone()).or_insert_with(|| prefix.clone());
            }
        }

        let uri_base = format!("jar:{}!", fs.uri(&archive_path));
        let display = format!("{}({})", fs.display_name(), archive_path.display());
        trace!(
            archive = %archive_path.display(),
            entries = entries.len(),
            packages = package_index.len(),
            multi_release,
            "indexed archive"
        );

        Ok(Self {
            location,
            archive_path,
            uri_base,
            reader: Arc::new(ArchiveReader { display, zip: Mutex::new(Some(zip)) }),
            entries,
            package_index,
        })
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    fn guard(&self) -> Result<()> {
        if self.reader.is_closed() {
            Err(self.reader.closed_error())
        } else {
            Ok(())
        }
    }

    fn entry_object(&self, logical: &str, entry: &LogicalEntry) -> FileObject {
        FileObject::for_entry(
            self.reader.clone() as Arc<dyn ByteSource>,
            format!("{}/{}", self.uri_base, logical),
            logical,
            entry.physical.clone(),
        )
    }

    fn lookup(&self, relative_name: &str) -> Result<Option<FileObject>> {
        self.guard()?;
        if Path::new(relative_name).is_absolute() {
            return Err(HarnessError::config(format!(
                "resource name \"{relative_name}\" must be relative"
            )));
        }
        Ok(self.entries.get(relative_name).map(|entry| self.entry_object(relative_name, entry)))
    }

    fn read_only(&self) -> HarnessError {
        HarnessError::ReadOnlyContainer { container: self.display_name() }
    }
}

impl Container for ArchiveContainer {
    fn location(&self) -> &Location {
        &self.location
    }

    fn display_name(&self) -> String {
        self.reader.display.clone()
    }

    fn find_file(&self, relative_name: &str) -> Result<Option<FileObject>> {
        self.lookup(relative_name)
    }

    fn file_for_input(&self, package: &str, relative_name: &str) -> Result<Option<FileObject>> {
        let relative = utils::resource_path(package, relative_name)?;
        self.lookup(&relative.to_slash_lossy())
    }

    fn file_for_output(&self, _package: &str, _relative_name: &str) -> Result<Option<FileObject>> {
        Err(self.read_only())
    }

    fn java_file_for_input(&self, binary_name: &str, kind: FileKind) -> Result<Option<FileObject>> {
        let relative = utils::binary_name_to_path(binary_name, kind.extension());
        self.lookup(&relative.to_slash_lossy())
    }

    fn java_file_for_output(
        &self,
        _binary_name: &str,
        _kind: FileKind,
    ) -> Result<Option<FileObject>> {
        Err(self.read_only())
    }

    fn list(&self, package: &str, kinds: &[FileKind], recurse: bool) -> Result<Vec<FileObject>> {
        self.guard()?;
        let prefix = if package.is_empty() {
            String::new()
        } else {
            match self.package_index.get(package) {
                Some(dir) => format!("{dir}/"),
                None => return Ok(Vec::new()),
            }
        };
        let mut out = Vec::new();
        for (logical, entry) in self.entries.range(prefix.clone()..) {
            if !logical.starts_with(&prefix) {
                break;
            }
            let rest = &logical[prefix.len()..];
            if !recurse && rest.contains('/') {
                continue;
            }
            if kinds.contains(&FileKind::from_name(logical)) {
                out.push(self.entry_object(logical, entry));
            }
        }
        Ok(out)
    }

    fn infer_binary_name(&self, file: &FileObject) -> Option<String> {
        if file.kind() == FileKind::Other
            || !file.uri().starts_with(&self.uri_base)
        {
            return None;
        }
        utils::path_to_binary_name(Path::new(file.name()), file.kind().extension())
    }

    fn contains(&self, file: &FileObject) -> bool {
        file.uri().strip_prefix(&self.uri_base).is_some_and(|rest| {
            rest.strip_prefix('/').is_some_and(|logical| self.entries.contains_key(logical))
        })
    }

    fn read_resource(&self, relative_name: &str) -> Result<Option<Vec<u8>>> {
        match self.lookup(relative_name)? {
            Some(file) => Ok(Some(file.read_bytes()?)),
            None => Ok(None),
        }
    }

    fn close(&self) -> Result<()> {
        self.reader.close();
        Ok(())
    }
}

/// Whether the archive's manifest opts into multi-release resolution.
fn manifest_is_multi_release(zip: &mut ZipReader) -> bool {
    let mut manifest = String::new();
    match zip.by_name("META-INF/MANIFEST.MF") {
        Ok(mut file) => {
            if file.read_to_string(&mut manifest).is_err() {
                return false;
            }
        }
        Err(_) => return false,
    }
    manifest_main_attribute(&manifest, "Multi-Release")
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

/// Read `key` from the main section of a jar manifest. Long values fold onto
/// continuation lines starting with a single space.
fn manifest_main_attribute(manifest: &str, key: &str) -> Option<String> {
    let mut current_key: Option<&str> = None;
    let mut current_value = String::new();

    for line in manifest.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix(' ') {
            if current_key.is_some() {
                current_value.push_str(rest);
            }
            continue;
        }
        if let Some(k) = current_key.take() {
            if k.trim().eq_ignore_ascii_case(key) {
                return Some(current_value.trim().to_owned());
            }
        }
        current_value.clear();
        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        current_key = Some(k);
        current_value.push_str(v.trim_start());
    }

    current_key
        .filter(|k| k.trim().eq_ignore_ascii_case(key))
        .map(|_| current_value.trim().to_owned())
}

/// Serialise entries into an archive image, stored (uncompressed), in the
/// order given.
pub fn write_jar<I, S>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (S, Vec<u8>)>,
    S: Into<String>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, bytes) in entries {
        let name = name.into();
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| jar_write_error(e, &name))?;
        writer
            .write_all(&bytes)
            .map_err(|io| HarnessError::io(io, &name))?;
    }
    let cursor = writer.finish().map_err(|e| jar_write_error(e, "<central directory>"))?;
    Ok(cursor.into_inner())
}

fn jar_write_error(e: ZipError, entry: &str) -> HarnessError {
    HarnessError::io(io::Error::from(e), entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{location::StandardLocation, vfs::MemoryFileSystem};
    use pretty_assertions::assert_eq;

    fn fixture_jar() -> Vec<u8> {
        write_jar([
            ("com/example/Foo.class".to_owned(), b"foo-base".to_vec()),
            ("com/example/util/Util.class".to_owned(), b"util".to_vec()),
            ("META-INF/MANIFEST.MF".to_owned(), b"Manifest-Version: 1.0\r\n\r\n".to_vec()),
            ("banner.txt".to_owned(), b"hi".to_vec()),
        ])
        .unwrap()
    }

    fn multi_release_jar() -> Vec<u8> {
        write_jar([
            (
                "META-INF/MANIFEST.MF".to_owned(),
                b"Manifest-Version: 1.0\r\nMulti-Release: true\r\n\r\n".to_vec(),
            ),
            ("com/example/Foo.class".to_owned(), b"base".to_vec()),
            ("META-INF/versions/11/com/example/Foo.class".to_owned(), b"v11".to_vec()),
            ("META-INF/versions/17/com/example/Foo.class".to_owned(), b"v17".to_vec()),
            ("META-INF/versions/21/com/example/Foo.class".to_owned(), b"v21".to_vec()),
        ])
        .unwrap()
    }

    fn open(bytes: Vec<u8>, release: Option<&str>) -> ArchiveContainer {
        let fs = MemoryFileSystem::new();
        fs.write(Path::new("/libs.jar"), &bytes).unwrap();
        ArchiveContainer::open(
            StandardLocation::ClassPath.into(),
            fs,
            "/libs.jar",
            release,
        )
        .unwrap()
    }

    #[test]
    fn indexes_packages_eagerly() {
        let container = open(fixture_jar(), None);
        let classes = container.list("com.example", &[FileKind::Class], true).unwrap();
        assert_eq!(classes.len(), 2);
        let flat = container.list("com.example", &[FileKind::Class], false).unwrap();
        assert_eq!(flat.len(), 1);
        assert!(container.list("com.missing", &[FileKind::Class], true).unwrap().is_empty());
    }

    #[test]
    fn reads_entries_through_file_objects() {
        let container = open(fixture_jar(), None);
        let file = container
            .java_file_for_input("com.example.Foo", FileKind::Class)
            .unwrap()
            .unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"foo-base");
        assert_eq!(
            container.infer_binary_name(&file).as_deref(),
            Some("com.example.Foo")
        );
        assert!(container.contains(&file));
    }

    #[test]
    fn writes_are_rejected() {
        let container = open(fixture_jar(), None);
        assert!(matches!(
            container.java_file_for_output("com.example.New", FileKind::Class),
            Err(HarnessError::ReadOnlyContainer { .. })
        ));
    }

    #[test]
    fn multi_release_overlays_resolve_highest_at_or_below_release() {
        let container = open(multi_release_jar(), Some("17"));
        let file = container
            .java_file_for_input("com.example.Foo", FileKind::Class)
            .unwrap()
            .unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"v17");
    }

    #[test]
    fn multi_release_is_ignored_without_an_effective_release() {
        let container = open(multi_release_jar(), None);
        let file = container
            .java_file_for_input("com.example.Foo", FileKind::Class)
            .unwrap()
            .unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"base");
    }

    #[test]
    fn closed_containers_fail_lookups_and_reads() {
        let container = open(fixture_jar(), None);
        let file = container
            .java_file_for_input("com.example.Foo", FileKind::Class)
            .unwrap()
            .unwrap();
        container.close().unwrap();
        assert!(matches!(
            container.find_file("banner.txt"),
            Err(HarnessError::ClosedContainer { .. })
        ));
        assert!(matches!(file.read_bytes(), Err(HarnessError::ClosedContainer { .. })));
    }

    #[test]
    fn two_containers_share_one_archive_independently() {
        let fs = MemoryFileSystem::new();
        fs.write(Path::new("/libs.jar"), &fixture_jar()).unwrap();
        let first = ArchiveContainer::open(
            StandardLocation::ClassPath.into(),
            fs.clone(),
            "/libs.jar",
            None,
        )
        .unwrap();
        let second = ArchiveContainer::open(
            StandardLocation::ClassPath.into(),
            fs,
            "/libs.jar",
            None,
        )
        .unwrap();
        first.close().unwrap();
        let file = second
            .java_file_for_input("com.example.Foo", FileKind::Class)
            .unwrap()
            .unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"foo-base");
    }
}
