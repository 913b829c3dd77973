use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use cgmath::{Quaternion, Vector3};
use gltf::{
    Document,
    image::Source,
    mesh::Mode,
    texture::{MagFilter, MinFilter, WrappingMode},
};

use crate::{
    data_structures::{
        asset::{AssetContent, AssetFormat, Geometry, MaterialRef, MeshPart, ParsedAsset, SceneNode},
        instance::Instance,
    },
    error::{LoadError, LoadResult},
    resources::{
        ResourceResolver,
        mesh::ensure_normals,
        texture::{ColorSpace, DecodedTextures, FilterMode, SamplerConfig, TextureResource, WrapMode},
    },
};

pub struct GltfOutput {
    pub asset: ParsedAsset,
    pub warnings: Vec<LoadError>,
}

fn fail(cause: impl std::fmt::Display) -> LoadError {
    LoadError::parse(AssetFormat::SceneBinary, cause)
}

fn indexed_image_name(index: usize, mime_type: &str) -> String {
    let ext = mime_type.rsplit('/').next().filter(|e| !e.is_empty()).unwrap_or("png");
    format!("image{index}.{ext}")
}

fn image_name(image: &gltf::Image<'_>) -> String {
    if let Some(name) = image.name() {
        return name.to_string();
    }
    match image.source() {
        Source::Uri { uri, .. } => match uri.strip_prefix("data:") {
            Some(rest) => indexed_image_name(image.index(), rest.split([';', ',']).next().unwrap_or_default()),
            None => uri.to_string(),
        },
        Source::View { mime_type, .. } => indexed_image_name(image.index(), mime_type),
    }
}

/// Payload of an embedded `data:` URI, `None` for references to other files.
fn data_uri_payload(uri: &str) -> Option<Result<Vec<u8>, String>> {
    let rest = uri.strip_prefix("data:")?;
    Some(match rest.split_once(',') {
        Some((header, payload)) if header.ends_with(";base64") => {
            STANDARD.decode(payload).map_err(|e| format!("embedded image: {e}"))
        }
        Some(_) => Err("embedded image is not base64 encoded".to_string()),
        None => Err("malformed data URI".to_string()),
    })
}

/// Decodes every image of the document once; failures keep their slot as an error.
fn decode_images(
    document: &Document,
    buffers: &[gltf::buffer::Data],
    resolver: Option<&dyn ResourceResolver>,
) -> DecodedTextures {
    document
        .images()
        .map(|image| {
            let name = image_name(&image);
            let bytes = match image.source() {
                Source::View { view, .. } => {
                    let start = view.offset();
                    let end = start + view.length();
                    buffers
                        .get(view.buffer().index())
                        .and_then(|data| data.0.get(start..end))
                        .map(<[u8]>::to_vec)
                        .ok_or_else(|| LoadError::decode(&name, "buffer view out of range"))?
                }
                Source::Uri { uri, .. } => match data_uri_payload(uri) {
                    Some(payload) => payload.map_err(|cause| LoadError::decode(&name, cause))?,
                    None => resolver
                        .and_then(|r| r.resolve(uri))
                        .ok_or_else(|| LoadError::decode(&name, "external image could not be resolved"))?,
                },
            };
            TextureResource::decode(&name, &bytes).map(Arc::new)
        })
        .collect()
}

fn sampler_for(texture: &gltf::Texture<'_>) -> SamplerConfig {
    let sampler = texture.sampler();
    let wrap = |mode| match mode {
        WrappingMode::Repeat => WrapMode::Repeat,
        WrappingMode::MirroredRepeat => WrapMode::MirrorRepeat,
        WrappingMode::ClampToEdge => WrapMode::ClampToEdge,
    };
    let mag_filter = match sampler.mag_filter() {
        Some(MagFilter::Nearest) => FilterMode::Nearest,
        _ => FilterMode::Linear,
    };
    let (min_filter, mipmap_filter, generate_mipmaps) = match sampler.min_filter() {
        Some(MinFilter::Nearest) => (FilterMode::Nearest, FilterMode::Nearest, false),
        Some(MinFilter::Linear) => (FilterMode::Linear, FilterMode::Nearest, false),
        Some(MinFilter::NearestMipmapNearest) => (FilterMode::Nearest, FilterMode::Nearest, true),
        Some(MinFilter::LinearMipmapNearest) => (FilterMode::Linear, FilterMode::Nearest, true),
        Some(MinFilter::NearestMipmapLinear) => (FilterMode::Nearest, FilterMode::Linear, true),
        Some(MinFilter::LinearMipmapLinear) | None => (FilterMode::Linear, FilterMode::Linear, true),
    };
    SamplerConfig {
        wrap_u: wrap(sampler.wrap_s()),
        wrap_v: wrap(sampler.wrap_t()),
        mag_filter,
        min_filter,
        mipmap_filter,
        generate_mipmaps,
        // Base colour is always sRGB encoded
        color_space: ColorSpace::Srgb,
    }
}

fn material_for(primitive: &gltf::Primitive<'_>, has_colors: bool, images: &DecodedTextures) -> MaterialRef {
    let pbr = primitive.material().pbr_metallic_roughness();
    if let Some(info) = pbr.base_color_texture() {
        let texture = info.texture();
        if let Some(Ok(resource)) = images.get(texture.source().index()) {
            return MaterialRef::Texture {
                texture: Arc::clone(resource),
                sampler: sampler_for(&texture),
            };
        }
    }
    if has_colors {
        MaterialRef::VertexColors
    } else {
        MaterialRef::Color(pbr.base_color_factor())
    }
}

fn to_parts(
    mesh: &gltf::Mesh<'_>,
    buffers: &[gltf::buffer::Data],
    images: &DecodedTextures,
) -> Vec<MeshPart> {
    let name = mesh.name().unwrap_or_default();
    mesh.primitives()
        .filter_map(|primitive| {
            if primitive.mode() != Mode::Triangles {
                log::warn!(
                    "Skipping {:?} primitive of mesh {name:?}, only triangles are drawn.",
                    primitive.mode()
                );
                return None;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
            let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            let mut geometry = Geometry {
                normals: reader.read_normals().map(|n| n.collect()).unwrap_or_default(),
                tex_coords: reader.read_tex_coords(0).map(|t| t.into_f32().collect()),
                colors: reader.read_colors(0).map(|c| c.into_rgb_f32().collect()),
                positions,
                indices,
            };
            ensure_normals(&mut geometry);

            let material = material_for(&primitive, geometry.colors.is_some(), images);
            let mut part = MeshPart::new(name, geometry, material);
            part.material_name = primitive.material().name().map(str::to_string);
            Some(part)
        })
        .collect()
}

fn to_scene_node(
    node: gltf::Node<'_>,
    buffers: &[gltf::buffer::Data],
    images: &DecodedTextures,
) -> SceneNode {
    let (translation, [x, y, z, w], scale) = node.transform().decomposed();
    SceneNode {
        name: node.name().unwrap_or_default().to_string(),
        local: Instance {
            position: Vector3::from(translation),
            rotation: Quaternion::new(w, x, y, z),
            scale: Vector3::from(scale),
        },
        parts: node
            .mesh()
            .map(|mesh| to_parts(&mesh, buffers, images))
            .unwrap_or_default(),
        children: node
            .children()
            .map(|child| to_scene_node(child, buffers, images))
            .collect(),
    }
}

/// Parses `.glb` or `.gltf` bytes into a scene tree rooted at the default scene.
///
/// External buffers are looked up relative to the resolver's base directory,
/// external images through the resolver itself.
pub fn load(data: &[u8], resolver: Option<&dyn ResourceResolver>) -> LoadResult<GltfOutput> {
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(data).map_err(fail)?;
    let base = resolver.and_then(|r| r.base_dir());
    let buffers = gltf::import_buffers(&document, base, blob).map_err(fail)?;

    let images = decode_images(&document, &buffers, resolver);
    let warnings: Vec<LoadError> = images
        .iter()
        .filter_map(|image| image.as_ref().err().cloned())
        .inspect(|e| log::warn!("{e}"))
        .collect();

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| fail("document has no scene"))?;
    let root = SceneNode {
        name: scene.name().unwrap_or_default().to_string(),
        children: scene
            .nodes()
            .map(|node| to_scene_node(node, &buffers, &images))
            .collect(),
        ..Default::default()
    };

    let content = AssetContent::Scene(root);
    if content.part_count() == 0 {
        return Err(fail("scene contains no triangle meshes"));
    }
    Ok(GltfOutput {
        asset: ParsedAsset::new(AssetFormat::SceneBinary, content),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use cgmath::Matrix4;
    use cgmath::SquareMatrix;

    use super::*;

    fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
        let mut json = json.as_bytes().to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = bin.to_vec();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json.len() + 8 + bin.len();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    fn triangle_bin() -> Vec<u8> {
        [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect()
    }

    const TRIANGLE: &str = r#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"name": "main", "nodes": [0]}],
        "nodes": [
            {"name": "root", "translation": [0, 1, 0], "children": [1]},
            {"name": "tri", "mesh": 0}
        ],
        "meshes": [{"name": "tri", "primitives": [{"attributes": {"POSITION": 0}, "material": 0}]}],
        "materials": [{"name": "red", "pbrMetallicRoughness": {"baseColorFactor": [1, 0, 0, 1]}}],
        "buffers": [{"byteLength": 36}],
        "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
        "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                       "min": [0, 0, 0], "max": [1, 1, 0]}]
    }"#;

    #[test]
    fn hierarchy_and_material_survive() {
        let output = load(&glb(TRIANGLE, &triangle_bin()), None).expect("parses");
        let AssetContent::Scene(root) = &output.asset.content else {
            panic!("scene binaries keep their hierarchy");
        };
        assert_eq!(root.name, "main");
        assert_eq!(root.children[0].name, "root");
        assert_eq!(root.children[0].local.position, Vector3::new(0.0, 1.0, 0.0));

        let tri = &root.children[0].children[0];
        assert_eq!(tri.parts.len(), 1);
        assert!(tri.parts[0].material.is_color([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(tri.parts[0].material_name.as_deref(), Some("red"));
        assert!(tri.parts[0].geometry.has_normals());
        assert_eq!(tri.parts[0].geometry.indices, vec![0, 1, 2]);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn node_transforms_apply_to_bounds() {
        let output = load(&glb(TRIANGLE, &triangle_bin()), None).expect("parses");
        let bounds = output.asset.content.bounds_with(&Matrix4::identity());
        assert!((bounds.min.y - 1.0).abs() < 1e-6);
        assert!((bounds.max.y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn garbage_is_a_parse_failure() {
        assert!(matches!(
            load(b"{ not json", None),
            Err(LoadError::ParseFailure { format: AssetFormat::SceneBinary, .. })
        ));
    }

    #[test]
    fn scene_without_meshes_fails() {
        let json = r#"{"asset": {"version": "2.0"}, "scenes": [{"nodes": [0]}], "nodes": [{"name": "empty"}]}"#;
        assert!(matches!(
            load(json.as_bytes(), None),
            Err(LoadError::ParseFailure { .. })
        ));
    }

    fn png_2x2() -> Vec<u8> {
        let mut bytes = Vec::new();
        image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255]))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    fn embedded_textured_gltf(image_uri: &str) -> String {
        let mut bin = triangle_bin();
        bin.extend([0.0f32, 0.0, 1.0, 0.0, 0.0, 1.0].iter().flat_map(|f| f.to_le_bytes()));
        format!(
            r#"{{
            "asset": {{"version": "2.0"}},
            "scenes": [{{"nodes": [0]}}],
            "nodes": [{{"name": "tri", "mesh": 0}}],
            "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0, "TEXCOORD_0": 1}}, "material": 0}}]}}],
            "materials": [{{"name": "grass", "pbrMetallicRoughness": {{"baseColorTexture": {{"index": 0}}}}}}],
            "textures": [{{"source": 0}}],
            "images": [{{"uri": "{image_uri}"}}],
            "buffers": [{{"byteLength": 60, "uri": "data:application/octet-stream;base64,{buffer}"}}],
            "bufferViews": [
                {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
                {{"buffer": 0, "byteOffset": 36, "byteLength": 24}}
            ],
            "accessors": [
                {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                  "min": [0, 0, 0], "max": [1, 1, 0]}},
                {{"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC2"}}
            ]
        }}"#,
            buffer = STANDARD.encode(&bin),
        )
    }

    #[test]
    fn embedded_data_uri_texture_is_decoded() {
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(png_2x2()));
        let output = load(embedded_textured_gltf(&uri).as_bytes(), None).expect("parses");
        assert!(output.warnings.is_empty(), "{:?}", output.warnings);

        let AssetContent::Scene(root) = &output.asset.content else {
            panic!("scene binaries keep their hierarchy");
        };
        let texture = root.children[0].parts[0]
            .material
            .texture()
            .expect("base colour texture is bound");
        assert_eq!(texture.key, "image0.png");
        assert_eq!(texture.dimensions(), (2, 2));
    }

    #[test]
    fn broken_data_uri_is_a_decode_warning() {
        let output = load(
            embedded_textured_gltf("data:image/png;base64,@@@@").as_bytes(),
            None,
        )
        .expect("the mesh still loads");
        assert!(matches!(
            output.warnings.as_slice(),
            [LoadError::DecodeFailure { texture, .. }] if texture == "image0.png"
        ));
    }
}
