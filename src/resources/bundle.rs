//! Zip bundles: one mesh text, maybe a material manifest, loose textures and
//! possibly more zips inside.

use std::{
    io::{Cursor, Read},
    sync::Arc,
};

use zip::ZipArchive;

use crate::{
    data_structures::asset::{AssetFormat, MaterialRef, ParsedAsset},
    error::{LoadError, LoadResult},
    progress::{LoadPhase, LoadProgress},
    resources::{
        assign::{PartKey, assign_textures},
        obj::{self, MaterialMode},
        texture::{
            DecodedTextures, SamplerConfig, TextureIndex, TextureResource, extension_of,
            file_name, is_texture_name,
        },
    },
};

/// What a leaf entry of a bundle is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    MeshDefinition,
    MaterialDefinition,
    TextureImage,
    Archive,
    Other,
}

impl EntryKind {
    pub fn classify(path: &str) -> Self {
        match extension_of(path).as_deref() {
            Some("obj") => EntryKind::MeshDefinition,
            Some("mtl") => EntryKind::MaterialDefinition,
            Some("zip") => EntryKind::Archive,
            _ if is_texture_name(path) => EntryKind::TextureImage,
            _ => EntryKind::Other,
        }
    }
}

/// One file taken out of a (possibly nested) archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Path inside the bundle; entries of nested archives are prefixed with the archive's path.
    pub path: String,
    pub kind: EntryKind,
    pub bytes: Vec<u8>,
}

/// Shared handle to the extracted bytes of one bundle load.
///
/// The scene keeps this alive for a short grace period after the asset is
/// shown and drops it afterwards.
#[derive(Clone, Debug, Default)]
pub struct ExtractedEntries(Arc<Vec<ExtractedEntry>>);

impl ExtractedEntries {
    pub fn new(entries: Vec<ExtractedEntry>) -> Self {
        Self(Arc::new(entries))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractedEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.0.iter().map(|e| e.bytes.len()).sum()
    }

    /// Number of live handles to the same extraction.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

/// Caps on what unpacking a bundle may produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnpackLimits {
    /// How many archives deep nested zips may go below the outer one.
    pub max_depth: usize,
    /// Largest single entry after decompression.
    pub max_entry_bytes: u64,
    /// Sum of all decompressed entries, nested archives included.
    pub max_total_bytes: u64,
}

impl UnpackLimits {
    pub const DEFAULT_ENTRY_BYTES: u64 = 256 * 1024 * 1024;
    pub const DEFAULT_TOTAL_BYTES: u64 = 1024 * 1024 * 1024;

    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            max_entry_bytes: Self::DEFAULT_ENTRY_BYTES,
            max_total_bytes: Self::DEFAULT_TOTAL_BYTES,
        }
    }
}

/// Knobs the bundle parser takes from the viewer configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BundleOptions {
    pub default_color: [f32; 4],
    pub limits: UnpackLimits,
}

pub struct BundleOutput {
    pub asset: ParsedAsset,
    pub warnings: Vec<LoadError>,
}

fn is_platform_noise(path: &str) -> bool {
    path.starts_with("__MACOSX/") || path.contains("/__MACOSX/") || file_name(path).starts_with("._")
}

struct Unpacker<'l> {
    limits: &'l UnpackLimits,
    total: u64,
    out: Vec<ExtractedEntry>,
}

impl Unpacker<'_> {
    fn read_entry(&mut self, file: &mut impl Read, declared: u64, path: &str) -> Result<Vec<u8>, String> {
        let max_entry = self.limits.max_entry_bytes;
        if declared > max_entry {
            return Err(format!(
                "{path}: declares {declared} bytes, more than the {max_entry} allowed per entry"
            ));
        }
        // Headers can lie; never read more than the cap allows
        let mut bytes = Vec::new();
        file.take(max_entry + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| format!("{path}: {e}"))?;
        let read = bytes.len() as u64;
        if read > max_entry {
            return Err(format!("{path}: expands beyond {max_entry} bytes"));
        }

        self.total += read;
        if self.total > self.limits.max_total_bytes {
            return Err(format!(
                "bundle expands beyond {} bytes",
                self.limits.max_total_bytes
            ));
        }
        Ok(bytes)
    }

    fn unpack(&mut self, data: &[u8], prefix: &str, depth: usize) -> Result<(), String> {
        let mut archive = ZipArchive::new(Cursor::new(data)).map_err(|e| format!("{prefix}: {e}"))?;

        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(|e| format!("{prefix}: {e}"))?;
            if file.is_dir() {
                continue;
            }
            let path = format!("{prefix}{}", file.name());
            if is_platform_noise(&path) {
                log::debug!("Skipping metadata entry {path}");
                continue;
            }

            let declared = file.size();
            let bytes = self.read_entry(&mut file, declared, &path)?;
            drop(file);

            match EntryKind::classify(&path) {
                EntryKind::Archive => {
                    if depth >= self.limits.max_depth {
                        return Err(format!(
                            "{path}: archives nested deeper than {} levels",
                            self.limits.max_depth
                        ));
                    }
                    self.unpack(&bytes, &format!("{path}/"), depth + 1)?;
                }
                kind => self.out.push(ExtractedEntry { path, kind, bytes }),
            }
        }
        Ok(())
    }
}

/// Flattens a bundle and every archive nested in it into leaf entries, in traversal order.
pub fn unpack(data: &[u8], limits: &UnpackLimits) -> LoadResult<Vec<ExtractedEntry>> {
    let mut unpacker = Unpacker {
        limits,
        total: 0,
        out: Vec::new(),
    };
    unpacker
        .unpack(data, "", 0)
        .map_err(|cause| LoadError::parse(AssetFormat::Bundle, cause))?;
    Ok(unpacker.out)
}

/**
 * A bundle load split into steps: unpacking, one step per texture and the
 * final mesh parse with texture assignment. [`load`] runs all of them in a
 * row; callers that have to stay responsive can interleave other work
 * between the steps.
 */
pub struct BundleJob<'p> {
    options: BundleOptions,
    progress: &'p LoadProgress,
    entries: Vec<ExtractedEntry>,
    mesh: usize,
    textures: Vec<usize>,
    decoded: DecodedTextures,
    warnings: Vec<LoadError>,
}

impl<'p> BundleJob<'p> {
    /// Unpacks the bundle and picks its mesh definition.
    pub fn unpack(data: &[u8], options: &BundleOptions, progress: &'p LoadProgress) -> LoadResult<Self> {
        progress.set_phase(LoadPhase::Unpacking, 5);
        let entries = unpack(data, &options.limits)?;
        log::info!("Unpacked {} bundle entries", entries.len());

        let mut meshes = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == EntryKind::MeshDefinition)
            .map(|(i, _)| i);
        let mesh = meshes
            .next()
            .ok_or_else(|| LoadError::missing("mesh definition (.obj) in bundle"))?;
        for ignored in meshes {
            log::warn!(
                "Bundle has more than one mesh definition, ignoring {}",
                entries[ignored].path
            );
        }

        let textures: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == EntryKind::TextureImage)
            .map(|(i, _)| i)
            .collect();
        progress.set_phase(LoadPhase::DecodingTextures, 20);

        Ok(Self {
            options: *options,
            progress,
            decoded: Vec::with_capacity(textures.len()),
            entries,
            mesh,
            textures,
            warnings: Vec::new(),
        })
    }

    pub fn remaining_textures(&self) -> usize {
        self.textures.len() - self.decoded.len()
    }

    /// Decodes the next texture; `false` once all are done.
    pub fn decode_next(&mut self) -> bool {
        let Some(&index) = self.textures.get(self.decoded.len()) else {
            return false;
        };
        let entry = &self.entries[index];
        let decoded = TextureResource::decode(file_name(&entry.path), &entry.bytes).map(Arc::new);
        if let Err(e) = &decoded {
            log::warn!("{e}");
            self.warnings.push(e.clone());
        }
        self.decoded.push(decoded);
        self.progress.report_fraction(
            20,
            60,
            self.decoded.len() as u64,
            self.textures.len() as u64,
        );
        true
    }

    /// Parses the mesh and assigns the decoded textures to its parts.
    ///
    /// The bundle's own material manifest is never read.
    pub fn finish(mut self) -> LoadResult<BundleOutput> {
        while self.decode_next() {}

        self.progress.set_phase(LoadPhase::ParsingMesh, 65);
        let mesh = &self.entries[self.mesh];
        let obj::ObjOutput {
            mut asset,
            warnings: mesh_warnings,
        } = obj::load(&mesh.bytes, MaterialMode::Bypass, self.options.default_color)
            .map_err(|e| LoadError::parse(AssetFormat::Bundle, format!("{}: {e}", mesh.path)))?;
        self.warnings.extend(mesh_warnings);

        self.progress.set_phase(LoadPhase::AssigningTextures, 85);
        let index = TextureIndex::new(self.textures.iter().map(|&i| self.entries[i].path.as_str()));
        let names: Vec<(String, Option<String>)> = {
            let mut names = Vec::new();
            asset
                .content
                .for_each_part(|part, _| names.push((part.name.clone(), part.material_name.clone())));
            names
        };
        let keys: Vec<PartKey<'_>> = names
            .iter()
            .map(|(name, material)| PartKey::new(name, material.as_deref()))
            .collect();
        let mut assignments = assign_textures(&keys, &index).into_iter();

        let decoded = &self.decoded;
        let default_color = self.options.default_color;
        asset.content.for_each_part_mut(|part| {
            let texture = assignments
                .next()
                .and_then(|a| a.texture())
                .and_then(|t| decoded.get(t))
                .and_then(|d| d.as_ref().ok());
            part.material = match texture {
                Some(texture) => MaterialRef::Texture {
                    texture: Arc::clone(texture),
                    sampler: SamplerConfig::default(),
                },
                None => MaterialRef::Color(default_color),
            };
        });

        asset.format = AssetFormat::Bundle;
        asset.scratch = Some(ExtractedEntries::new(self.entries));
        Ok(BundleOutput {
            asset,
            warnings: self.warnings,
        })
    }
}

/// Parses a bundle into textured parts in one go.
pub fn load(data: &[u8], options: &BundleOptions, progress: &LoadProgress) -> LoadResult<BundleOutput> {
    BundleJob::unpack(data, options, progress)?.finish()
}
