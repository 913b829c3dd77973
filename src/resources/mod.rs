//! All logic for turning raw bytes from external files into CPU-side assets.
//! Nothing in here touches the GPU.

use std::{
    fmt,
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{progress::LoadProgress, resources::texture::extension_of};

pub mod assign;
pub mod bundle;
pub mod gltf;
pub mod mesh;
pub mod obj;
pub mod stl;
pub mod texture;

const READ_CHUNK: usize = 64 * 1024;

/// Looks up files an asset refers to by name (material manifests, textures, buffers).
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Vec<u8>>;

    /// Directory relative references are anchored at, if there is one on disk.
    fn base_dir(&self) -> Option<&Path> {
        None
    }
}

/// Resolves references relative to the directory the asset was read from.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceResolver for DirectoryResolver {
    fn resolve(&self, name: &str) -> Option<Vec<u8>> {
        // Manifests written on windows keep their backslashes
        let relative: PathBuf = name.split(['/', '\\']).collect();
        let path = self.root.join(relative);
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("Could not read {}: {e}", path.display());
                None
            }
        }
    }

    fn base_dir(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

/// The bytes of one asset plus the name its format is inferred from.
#[derive(Clone)]
pub struct AssetSource {
    pub name: String,
    pub bytes: Vec<u8>,
    pub resolver: Option<Arc<dyn ResourceResolver>>,
}

impl fmt::Debug for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetSource")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl AssetSource {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Reads a file in chunks, reporting byte progress into `[0, 20]`.
    ///
    /// The file's directory becomes the resolver for anything it references.
    pub fn from_path(path: impl AsRef<Path>, progress: &LoadProgress) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut file = std::fs::File::open(path)?;
        let total = file.metadata().map(|m| m.len()).unwrap_or(0);

        let mut bytes = Vec::with_capacity(total as usize);
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let read = file.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..read]);
            progress.report_fraction(0, 20, bytes.len() as u64, total);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::from_bytes(name, bytes).with_resolver(Arc::new(DirectoryResolver::new(dir))))
    }

    /// Lower-cased extension of the source name.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }

    pub fn resolver(&self) -> Option<&dyn ResourceResolver> {
        self.resolver.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lower_cased() {
        let source = AssetSource::from_bytes("Models/Chair.GLB", Vec::new());
        assert_eq!(source.extension().as_deref(), Some("glb"));
        assert_eq!(AssetSource::from_bytes("README", Vec::new()).extension(), None);
    }

    #[test]
    fn reading_a_file_reports_progress_and_resolves_siblings() {
        let dir = std::env::temp_dir().join(format!("asset-viewer-source-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        std::fs::write(dir.join("cube.obj"), b"v 0 0 0\n").expect("write obj");
        std::fs::write(dir.join("cube.mtl"), b"newmtl a\n").expect("write mtl");

        let progress = LoadProgress::new();
        let source = AssetSource::from_path(dir.join("cube.obj"), &progress).expect("reads");
        assert_eq!(source.name, "cube.obj");
        assert_eq!(source.bytes, b"v 0 0 0\n");
        assert_eq!(progress.percent(), 20);
        assert_eq!(
            source.resolver().and_then(|r| r.resolve("cube.mtl")).as_deref(),
            Some(&b"newmtl a\n"[..])
        );
        assert!(source.resolver().and_then(|r| r.resolve("missing.png")).is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
