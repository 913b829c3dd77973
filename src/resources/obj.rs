use std::{
    borrow::Cow,
    io::{BufReader, Cursor},
    path::Path,
    sync::Arc,
};

use crate::{
    data_structures::asset::{AssetContent, AssetFormat, Geometry, MaterialRef, MeshPart, ParsedAsset},
    error::{LoadError, LoadResult},
    resources::{
        ResourceResolver,
        mesh::ensure_normals,
        texture::{SamplerConfig, TextureResource},
    },
};

const STAND_IN_MANIFEST: &str = "__declared_materials.mtl";

/// What to do with `mtllib` references.
#[derive(Clone, Copy)]
pub enum MaterialMode<'a> {
    /// Read referenced manifests through the resolver and apply colours/textures.
    Follow(Option<&'a dyn ResourceResolver>),
    /// Never read a manifest; only keep the declared `usemtl` names on the parts.
    Bypass,
}

/// Parsed mesh text plus non-fatal texture problems.
pub struct ObjOutput {
    pub asset: ParsedAsset,
    pub warnings: Vec<LoadError>,
}

/**
 * Without a manifest tobj can't resolve `usemtl` names to material ids. Declaring every
 * name in a stand-in manifest keeps the names without reading any real material file.
 */
fn declared_material_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in text.lines() {
        if let Some(name) = line.trim_start().strip_prefix("usemtl") {
            let name = name.trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn stand_in_materials(names: &[String]) -> tobj::MTLLoadResult {
    let text: String = names.iter().map(|name| format!("newmtl {name}\n")).collect();
    tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(text)))
}

fn load_materials(path: &Path, mode: MaterialMode<'_>, names: &[String]) -> tobj::MTLLoadResult {
    let MaterialMode::Follow(Some(resolver)) = mode else {
        return stand_in_materials(names);
    };
    if path == Path::new(STAND_IN_MANIFEST) {
        return stand_in_materials(names);
    }
    let reference = path.to_string_lossy();
    match resolver.resolve(&reference) {
        Some(bytes) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(bytes))),
        None => {
            log::warn!("Material manifest {reference} could not be resolved, keeping names only.");
            stand_in_materials(names)
        }
    }
}

fn chunked<const N: usize>(flat: &[f32], count: usize) -> Option<Vec<[f32; N]>> {
    if flat.len() != count * N || count == 0 {
        return None;
    }
    Some(
        flat.chunks_exact(N)
            .map(|c| {
                let mut out = [0.0; N];
                out.copy_from_slice(c);
                out
            })
            .collect(),
    )
}

fn material_for(
    material: Option<&tobj::Material>,
    has_colors: bool,
    mode: MaterialMode<'_>,
    default_color: [f32; 4],
    warnings: &mut Vec<LoadError>,
) -> MaterialRef {
    if has_colors {
        return MaterialRef::VertexColors;
    }
    let (MaterialMode::Follow(resolver), Some(material)) = (mode, material) else {
        return MaterialRef::Color(default_color);
    };

    if let (Some(texture_name), Some(resolver)) = (&material.diffuse_texture, resolver) {
        match resolver.resolve(texture_name) {
            Some(bytes) => match TextureResource::decode(texture_name, &bytes) {
                Ok(texture) => {
                    return MaterialRef::Texture {
                        texture: Arc::new(texture),
                        sampler: SamplerConfig::default(),
                    };
                }
                Err(e) => {
                    log::warn!("{e}");
                    warnings.push(e);
                }
            },
            None => log::warn!(
                "Texture {texture_name} of material {} could not be resolved.",
                material.name
            ),
        }
    }

    match material.diffuse {
        Some([r, g, b]) => MaterialRef::Color([r, g, b, material.dissolve.unwrap_or(1.0)]),
        None => MaterialRef::Color(default_color),
    }
}

/// Parses mesh text into one part per object/group.
pub fn load(data: &[u8], mode: MaterialMode<'_>, default_color: [f32; 4]) -> LoadResult<ObjOutput> {
    let text = std::str::from_utf8(data).map_err(|e| LoadError::parse(AssetFormat::MeshText, e))?;
    let names = declared_material_names(text);

    // tobj only binds `usemtl` names once some manifest has been loaded
    let has_manifest = text.lines().any(|l| l.trim_start().starts_with("mtllib"));
    let source: Cow<str> = if has_manifest || names.is_empty() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("mtllib {STAND_IN_MANIFEST}\n{text}"))
    };

    let (models, materials) = tobj::load_obj_buf(
        &mut BufReader::new(Cursor::new(source.as_bytes())),
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |path| load_materials(path, mode, &names),
    )
    .map_err(|e| LoadError::parse(AssetFormat::MeshText, e))?;

    let materials = materials.unwrap_or_else(|e| {
        log::warn!("Material manifest could not be parsed: {e}");
        Vec::new()
    });

    if models.is_empty() {
        return Err(LoadError::parse(AssetFormat::MeshText, "no geometry"));
    }

    let mut warnings = Vec::new();
    let parts = models
        .into_iter()
        .map(|m| {
            let count = m.mesh.positions.len() / 3;
            let colors = chunked::<3>(&m.mesh.vertex_color, count);
            let mut geometry = Geometry {
                positions: chunked::<3>(&m.mesh.positions, count).unwrap_or_default(),
                normals: chunked::<3>(&m.mesh.normals, count).unwrap_or_default(),
                // Text meshes put the texture origin bottom-left, wgpu top-left
                tex_coords: chunked::<2>(&m.mesh.texcoords, count)
                    .map(|uvs| uvs.into_iter().map(|[u, v]| [u, 1.0 - v]).collect()),
                colors,
                indices: m.mesh.indices,
            };
            ensure_normals(&mut geometry);

            let material = m.mesh.material_id.and_then(|id| materials.get(id));
            let shading = material_for(
                material,
                geometry.colors.is_some(),
                mode,
                default_color,
                &mut warnings,
            );
            let mut part = MeshPart::new(m.name, geometry, shading);
            part.material_name = material.map(|mat| mat.name.clone());
            part
        })
        .collect::<Vec<_>>();

    Ok(ObjOutput {
        asset: ParsedAsset::new(AssetFormat::MeshText, AssetContent::Parts(parts)),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const DEFAULT: [f32; 4] = [0.7, 0.7, 0.7, 1.0];

    const TWO_TILES: &str = "mtllib model.mtl
o tile_1_1
v 0 0 0
v 1 0 0
v 0 1 0
usemtl mat_u1_v1
f 1 2 3
o tile_2_1
v 1 0 0
v 2 0 0
v 1 1 0
usemtl mat_u2_v1
f 4 5 6
";

    struct MapResolver(HashMap<String, Vec<u8>>);

    impl ResourceResolver for MapResolver {
        fn resolve(&self, name: &str) -> Option<Vec<u8>> {
            self.0.get(name).cloned()
        }
    }

    fn parts(output: &ObjOutput) -> &[MeshPart] {
        match &output.asset.content {
            AssetContent::Parts(parts) => parts,
            AssetContent::Scene(_) => panic!("mesh text is flat"),
        }
    }

    #[test]
    fn bypass_keeps_material_names_without_reading_manifest() {
        let output = load(TWO_TILES.as_bytes(), MaterialMode::Bypass, DEFAULT).expect("parses");
        let parts = parts(&output);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "tile_1_1");
        assert_eq!(parts[0].material_name.as_deref(), Some("mat_u1_v1"));
        assert_eq!(parts[1].material_name.as_deref(), Some("mat_u2_v1"));
        assert!(parts.iter().all(|p| p.material.is_color(DEFAULT)));
        assert!(parts.iter().all(|p| p.geometry.has_normals()));
    }

    #[test]
    fn follow_applies_diffuse_colour() {
        let mtl = "newmtl mat_u1_v1\nKd 1 0 0\nnewmtl mat_u2_v1\nKd 0 0 1\nd 0.5\n";
        let resolver = MapResolver(HashMap::from([(
            "model.mtl".to_string(),
            mtl.as_bytes().to_vec(),
        )]));
        let output = load(
            TWO_TILES.as_bytes(),
            MaterialMode::Follow(Some(&resolver)),
            DEFAULT,
        )
        .expect("parses");
        let parts = parts(&output);
        assert!(parts[0].material.is_color([1.0, 0.0, 0.0, 1.0]));
        assert!(parts[1].material.is_color([0.0, 0.0, 1.0, 0.5]));
    }

    #[test]
    fn vertex_colours_win_over_default() {
        let text = "v 0 0 0 1 0 0\nv 1 0 0 0 1 0\nv 0 1 0 0 0 1\nf 1 2 3\n";
        let output = load(text.as_bytes(), MaterialMode::Follow(None), DEFAULT).expect("parses");
        let parts = parts(&output);
        assert_eq!(parts[0].material, MaterialRef::VertexColors);
        assert_eq!(
            parts[0].geometry.colors.as_deref(),
            Some(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]][..])
        );
    }

    #[test]
    fn unresolvable_texture_falls_back_to_colour() {
        let text = "mtllib m.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl wood\nf 1 2 3\n";
        let mtl = "newmtl wood\nKd 0.2 0.3 0.4\nmap_Kd wood.png\n";
        let resolver = MapResolver(HashMap::from([
            ("m.mtl".to_string(), mtl.as_bytes().to_vec()),
            ("wood.png".to_string(), b"not a png".to_vec()),
        ]));
        let output = load(text.as_bytes(), MaterialMode::Follow(Some(&resolver)), DEFAULT)
            .expect("parses");
        assert!(parts(&output)[0].material.is_color([0.2, 0.3, 0.4, 1.0]));
        assert!(matches!(output.warnings.as_slice(), [LoadError::DecodeFailure { .. }]));
    }
}
