//! Class and service loading over container sets.
//!
//! The JVM original reflects a `ClassLoader` over NIO paths; here the
//! capability is explicit: byte-level class/resource lookup composed over the
//! containers of one group, first hit winning.

use crate::{containers::Container, error::Result, files::FileKind, utils};
use path_slash::PathExt;
use std::{fmt, sync::Arc};

/// The classloader capability: resolve classes and resources to bytes.
pub trait ClassLoading: Send + Sync + fmt::Debug {
    /// Resolve a binary name to class-file bytes.
    fn load_class(&self, binary_name: &str) -> Result<Option<Vec<u8>>>;

    /// Resolve a relative resource name to its bytes, first hit winning.
    fn get_resource(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// All hits for a relative resource name, in container order.
    fn get_resources(&self, name: &str) -> Result<Vec<Vec<u8>>>;
}

/// A classloader over a snapshot of a group's containers.
#[derive(Debug)]
pub struct ContainerClassLoader {
    containers: Vec<Arc<dyn Container>>,
}

impl ContainerClassLoader {
    pub fn new(containers: Vec<Arc<dyn Container>>) -> Self {
        Self { containers }
    }
}

impl ClassLoading for ContainerClassLoader {
    fn load_class(&self, binary_name: &str) -> Result<Option<Vec<u8>>> {
        let relative = utils::binary_name_to_path(binary_name, FileKind::Class.extension());
        self.get_resource(&relative.to_slash_lossy())
    }

    fn get_resource(&self, name: &str) -> Result<Option<Vec<u8>>> {
        for container in &self.containers {
            if let Some(bytes) = container.read_resource(name)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    fn get_resources(&self, name: &str) -> Result<Vec<Vec<u8>>> {
        let mut all = Vec::new();
        for container in &self.containers {
            if let Some(bytes) = container.read_resource(name)? {
                all.push(bytes);
            }
        }
        Ok(all)
    }
}

/// Providers of one service, discovered from `META-INF/services/<service>`
/// resources across a group's containers.
#[derive(Clone, Debug)]
pub struct ServiceLoader {
    service: String,
    providers: Vec<String>,
}

impl ServiceLoader {
    pub fn discover(loader: &dyn ClassLoading, service: &str) -> Result<Self> {
        let resource = format!("META-INF/services/{service}");
        let mut providers = Vec::new();
        for bytes in loader.get_resources(&resource)? {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            for line in text.lines() {
                let line = line.split('#').next().unwrap_or("").trim();
                if !line.is_empty() && !providers.iter().any(|p| p == line) {
                    providers.push(line.to_owned());
                }
            }
        }
        Ok(Self { service: service.to_owned(), providers })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        containers::DirectoryContainer,
        location::StandardLocation,
        vfs::{FileSystem, MemoryFileSystem},
    };
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn container_with(files: &[(&str, &[u8])]) -> Arc<dyn Container> {
        let fs = MemoryFileSystem::new();
        for (name, bytes) in files {
            let path = Path::new("/root").join(name);
            fs.create_dir_all(path.parent().unwrap()).unwrap();
            fs.write(&path, bytes).unwrap();
        }
        Arc::new(DirectoryContainer::new(
            StandardLocation::ClassPath.into(),
            fs,
            "/root",
        ))
    }

    #[test]
    fn first_container_wins_class_lookup() {
        let first = container_with(&[("com/example/Foo.class", b"first")]);
        let second = container_with(&[("com/example/Foo.class", b"second")]);
        let loader = ContainerClassLoader::new(vec![first, second]);
        assert_eq!(loader.load_class("com.example.Foo").unwrap().unwrap(), b"first");
        assert!(loader.load_class("com.example.Missing").unwrap().is_none());
    }

    #[test]
    fn service_files_merge_across_containers() {
        let first = container_with(&[(
            "META-INF/services/com.example.Processor",
            b"com.example.First\n# a comment\ncom.example.Shared\n" as &[u8],
        )]);
        let second = container_with(&[(
            "META-INF/services/com.example.Processor",
            b"com.example.Shared\ncom.example.Second # trailing\n" as &[u8],
        )]);
        let loader = ContainerClassLoader::new(vec![first, second]);
        let services = ServiceLoader::discover(&loader, "com.example.Processor").unwrap();
        assert_eq!(
            services.providers(),
            &[
                "com.example.First".to_owned(),
                "com.example.Shared".to_owned(),
                "com.example.Second".to_owned(),
            ]
        );
    }
}
