use super::{DirEntry, FileMetadata, FileSystem, FileType, ReadSeek};
use crate::error::{HarnessError, Result};
use once_cell::sync::Lazy;
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    io::{self, Cursor, Write},
    path::{Component, Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, RwLock, Weak,
    },
    time::SystemTime,
};

/// Reserved URI scheme for in-memory workspaces. Deliberately not a standard
/// scheme so harness URIs can never collide with real resources.
pub const RAM_URI_SCHEME: &str = "javacram";

const MAX_LINK_HOPS: usize = 40;

static NEXT_FS_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide id → filesystem map, the single global registration the
/// harness performs. Entries are weak; a filesystem disappears from here as
/// soon as the last owner drops it.
static REGISTRY: Lazy<Mutex<HashMap<u64, Weak<MemoryFileSystem>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Resolve a `javacram` filesystem id back to a live filesystem, if any.
pub fn lookup_ram_filesystem(id: u64) -> Option<Arc<MemoryFileSystem>> {
    REGISTRY.lock().expect("registry poisoned").get(&id)?.upgrade()
}

#[derive(Debug)]
struct FileData {
    bytes: Vec<u8>,
    modified: SystemTime,
}

#[derive(Debug)]
enum Entry {
    Dir,
    /// Hard links are additional entries sharing the same data handle.
    File(Arc<RwLock<FileData>>),
    Symlink(PathBuf),
}

#[derive(Debug, Default)]
struct State {
    /// Canonical absolute path → entry. The root `/` is always a `Dir`.
    entries: BTreeMap<PathBuf, Entry>,
}

/// An isolated in-memory filesystem with POSIX-flavoured semantics:
/// directories, regular files, hard links (shared bytes), symbolic links
/// (followed with a hop budget), and deterministic sorted directory streams.
///
/// Each instance gets a process-unique id and serves URIs under the
/// [`RAM_URI_SCHEME`] scheme. One filesystem backs one workspace; closing the
/// workspace closes the filesystem.
#[derive(Debug)]
pub struct MemoryFileSystem {
    id: u64,
    state: Arc<RwLock<State>>,
    closed: AtomicBool,
}

impl MemoryFileSystem {
    pub fn new() -> Arc<Self> {
        let id = NEXT_FS_ID.fetch_add(1, Ordering::Relaxed);
        let mut entries = BTreeMap::new();
        entries.insert(PathBuf::from("/"), Entry::Dir);
        let fs = Arc::new(Self {
            id,
            state: Arc::new(RwLock::new(State { entries })),
            closed: AtomicBool::new(false),
        });
        REGISTRY.lock().expect("registry poisoned").insert(id, Arc::downgrade(&fs));
        trace!(id, "created in-memory filesystem");
        fs
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Release all contents. Idempotent; subsequent operations fail.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.write().expect("state poisoned").entries.clear();
            REGISTRY.lock().expect("registry poisoned").remove(&self.id);
            trace!(id = self.id, "closed in-memory filesystem");
        }
    }

    fn guard(&self, path: &Path) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(HarnessError::io(
                io::Error::new(io::ErrorKind::BrokenPipe, "in-memory filesystem is closed"),
                path,
            ))
        } else {
            Ok(())
        }
    }
}

impl Drop for MemoryFileSystem {
    fn drop(&mut self) {
        REGISTRY.lock().expect("registry poisoned").remove(&self.id);
    }
}

enum Step {
    Root,
    Up,
    Down(String),
}

fn steps_of(path: &Path) -> Vec<Step> {
    let mut steps = Vec::new();
    for component in path.components() {
        match component {
            Component::RootDir => steps.push(Step::Root),
            Component::ParentDir => steps.push(Step::Up),
            Component::CurDir | Component::Prefix(_) => {}
            Component::Normal(os) => steps.push(Step::Down(os.to_string_lossy().into_owned())),
        }
    }
    steps
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file or directory: {}", path.display()))
}

/// Walk `path` from the root, following symlinks (the terminal one only when
/// `follow_last`), and return the canonical path. Missing trailing components
/// resolve lexically; existence is the caller's concern.
fn resolve(state: &State, path: &Path, follow_last: bool) -> io::Result<PathBuf> {
    let mut pending: VecDeque<Step> = steps_of(path).into();
    let mut resolved = PathBuf::from("/");
    let mut hops = 0usize;

    while let Some(step) = pending.pop_front() {
        match step {
            Step::Root => resolved = PathBuf::from("/"),
            Step::Up => {
                resolved.pop();
            }
            Step::Down(name) => {
                let candidate = resolved.join(&name);
                match state.entries.get(&candidate) {
                    Some(Entry::Symlink(target)) if follow_last || !pending.is_empty() => {
                        hops += 1;
                        if hops > MAX_LINK_HOPS {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!(
                                    "too many levels of symbolic links: {}",
                                    path.display()
                                ),
                            ));
                        }
                        let target_steps = steps_of(target);
                        for step in target_steps.into_iter().rev() {
                            pending.push_front(step);
                        }
                    }
                    _ => resolved = candidate,
                }
            }
        }
    }
    Ok(resolved)
}

fn file_data(state: &State, canonical: &Path) -> io::Result<Arc<RwLock<FileData>>> {
    match state.entries.get(canonical) {
        Some(Entry::File(data)) => Ok(data.clone()),
        Some(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a regular file: {}", canonical.display()),
        )),
        None => Err(not_found(canonical)),
    }
}

fn write_into(state: &mut State, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let canonical = resolve(state, path, true)?;
    match state.entries.get(&canonical) {
        Some(Entry::File(data)) => {
            let mut data = data.write().expect("file data poisoned");
            data.bytes = bytes.to_vec();
            data.modified = SystemTime::now();
            Ok(())
        }
        Some(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a regular file: {}", canonical.display()),
        )),
        None => {
            let parent = canonical.parent().ok_or_else(|| not_found(&canonical))?;
            match state.entries.get(parent) {
                Some(Entry::Dir) => {}
                _ => return Err(not_found(parent)),
            }
            state.entries.insert(
                canonical,
                Entry::File(Arc::new(RwLock::new(FileData {
                    bytes: bytes.to_vec(),
                    modified: SystemTime::now(),
                }))),
            );
            Ok(())
        }
    }
}

/// Writer returned by [`MemoryFileSystem::open_write`]; contents land in the
/// tree on flush and on drop.
struct MemWriter {
    state: Arc<RwLock<State>>,
    path: PathBuf,
    buf: Vec<u8>,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.state.write().expect("state poisoned");
        write_into(&mut state, &self.path, &self.buf)
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl FileSystem for MemoryFileSystem {
    fn scheme(&self) -> &str {
        RAM_URI_SCHEME
    }

    fn display_name(&self) -> String {
        format!("ram-{}", self.id)
    }

    fn uri(&self, path: &Path) -> String {
        use path_slash::PathExt;
        format!("{}://fs-{}{}", RAM_URI_SCHEME, self.id, path.to_slash_lossy())
    }

    fn exists(&self, path: &Path) -> bool {
        if self.guard(path).is_err() {
            return false;
        }
        let state = self.state.read().expect("state poisoned");
        resolve(&state, path, true)
            .is_ok_and(|canonical| state.entries.contains_key(&canonical))
    }

    fn is_file(&self, path: &Path) -> bool {
        if self.guard(path).is_err() {
            return false;
        }
        let state = self.state.read().expect("state poisoned");
        resolve(&state, path, true)
            .ok()
            .and_then(|canonical| state.entries.get(&canonical).map(|e| matches!(e, Entry::File(_))))
            .unwrap_or(false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        if self.guard(path).is_err() {
            return false;
        }
        let state = self.state.read().expect("state poisoned");
        resolve(&state, path, true)
            .ok()
            .and_then(|canonical| state.entries.get(&canonical).map(|e| matches!(e, Entry::Dir)))
            .unwrap_or(false)
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        self.guard(path)?;
        let state = self.state.read().expect("state poisoned");
        let canonical = resolve(&state, path, true).map_err(|io| HarnessError::io(io, path))?;
        match state.entries.get(&canonical) {
            Some(Entry::File(data)) => {
                let data = data.read().expect("file data poisoned");
                Ok(FileMetadata {
                    file_type: FileType::File,
                    len: data.bytes.len() as u64,
                    modified: Some(data.modified),
                })
            }
            Some(_) => Ok(FileMetadata { file_type: FileType::Dir, len: 0, modified: None }),
            None => Err(HarnessError::io(not_found(&canonical), path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        self.guard(path)?;
        let state = self.state.read().expect("state poisoned");
        let canonical = resolve(&state, path, true).map_err(|io| HarnessError::io(io, path))?;
        if state.entries.contains_key(&canonical) {
            Ok(canonical)
        } else {
            Err(HarnessError::io(not_found(&canonical), path))
        }
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.guard(path)?;
        let state = self.state.read().expect("state poisoned");
        let canonical = resolve(&state, path, true).map_err(|io| HarnessError::io(io, path))?;
        let data = file_data(&state, &canonical).map_err(|io| HarnessError::io(io, path))?;
        let data = data.read().expect("file data poisoned");
        Ok(data.bytes.clone())
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek + Send>> {
        Ok(Box::new(Cursor::new(self.read(path)?)))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        self.guard(path)?;
        {
            // validate the parent up front so failures surface at open time
            let state = self.state.read().expect("state poisoned");
            let canonical = resolve(&state, path, true).map_err(|io| HarnessError::io(io, path))?;
            let parent = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
            if !matches!(state.entries.get(&parent), Some(Entry::Dir)) {
                return Err(HarnessError::io(not_found(&parent), path));
            }
        }
        Ok(Box::new(MemWriter {
            state: self.state.clone(),
            path: path.to_path_buf(),
            buf: Vec::new(),
        }))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.guard(path)?;
        let mut state = self.state.write().expect("state poisoned");
        write_into(&mut state, path, bytes).map_err(|io| HarnessError::io(io, path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.guard(path)?;
        let mut state = self.state.write().expect("state poisoned");
        let canonical = resolve(&state, path, true).map_err(|io| HarnessError::io(io, path))?;
        let mut current = PathBuf::from("/");
        let components: Vec<PathBuf> = canonical
            .components()
            .filter_map(|c| match c {
                Component::Normal(os) => Some(PathBuf::from(os)),
                _ => None,
            })
            .collect();
        for component in components {
            current.push(component);
            match state.entries.get(&current) {
                Some(Entry::Dir) => {}
                Some(_) => {
                    return Err(HarnessError::io(
                        io::Error::new(
                            io::ErrorKind::AlreadyExists,
                            format!("not a directory: {}", current.display()),
                        ),
                        path,
                    ));
                }
                None => {
                    state.entries.insert(current.clone(), Entry::Dir);
                }
            }
        }
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.guard(path)?;
        let state = self.state.read().expect("state poisoned");
        let canonical = resolve(&state, path, true).map_err(|io| HarnessError::io(io, path))?;
        match state.entries.get(&canonical) {
            Some(Entry::Dir) => {}
            Some(_) => {
                return Err(HarnessError::io(
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("not a directory: {}", canonical.display()),
                    ),
                    path,
                ));
            }
            None => return Err(HarnessError::io(not_found(&canonical), path)),
        }
        let entries = state
            .entries
            .iter()
            .filter(|(key, _)| key.parent() == Some(canonical.as_path()))
            .map(|(key, entry)| DirEntry {
                path: key.clone(),
                file_type: match entry {
                    Entry::Dir => FileType::Dir,
                    Entry::File(_) => FileType::File,
                    Entry::Symlink(_) => FileType::Symlink,
                },
            })
            .collect();
        Ok(entries)
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        self.guard(link)?;
        let mut state = self.state.write().expect("state poisoned");
        let canonical = resolve(&state, link, false).map_err(|io| HarnessError::io(io, link))?;
        if state.entries.contains_key(&canonical) {
            return Err(HarnessError::io(
                io::Error::new(io::ErrorKind::AlreadyExists, "link name already exists"),
                link,
            ));
        }
        let parent = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
        if !matches!(state.entries.get(&parent), Some(Entry::Dir)) {
            return Err(HarnessError::io(not_found(&parent), link));
        }
        state.entries.insert(canonical, Entry::Symlink(target.to_path_buf()));
        Ok(())
    }

    fn hard_link(&self, target: &Path, link: &Path) -> Result<()> {
        self.guard(link)?;
        let mut state = self.state.write().expect("state poisoned");
        let target_canonical =
            resolve(&state, target, true).map_err(|io| HarnessError::io(io, target))?;
        let data = file_data(&state, &target_canonical).map_err(|io| HarnessError::io(io, target))?;
        let canonical = resolve(&state, link, false).map_err(|io| HarnessError::io(io, link))?;
        if state.entries.contains_key(&canonical) {
            return Err(HarnessError::io(
                io::Error::new(io::ErrorKind::AlreadyExists, "link name already exists"),
                link,
            ));
        }
        let parent = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
        if !matches!(state.entries.get(&parent), Some(Entry::Dir)) {
            return Err(HarnessError::io(not_found(&parent), link));
        }
        state.entries.insert(canonical, Entry::File(data));
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.guard(path)?;
        let mut state = self.state.write().expect("state poisoned");
        let canonical = resolve(&state, path, true).map_err(|io| HarnessError::io(io, path))?;
        if !state.entries.contains_key(&canonical) {
            return Err(HarnessError::io(not_found(&canonical), path));
        }
        state
            .entries
            .retain(|key, _| key != &canonical && !key.starts_with(&canonical));
        Ok(())
    }
}
