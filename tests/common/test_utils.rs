use std::{
    io::{Cursor, Write},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use asset_viewer::{
    Asset, ViewerConfig,
    scene::{AssetBackend, Dispose, SceneManager},
};
use zip::{ZipWriter, write::SimpleFileOptions};

/// ASCII STL of an axis-aligned cube, two triangles per face.
pub fn ascii_cube(center: [f32; 3], half: f32) -> String {
    let corner = |x: f32, y: f32, z: f32| {
        [
            center[0] + x * half,
            center[1] + y * half,
            center[2] + z * half,
        ]
    };
    let faces = [
        [(-1., -1., -1.), (1., -1., -1.), (1., 1., -1.), (-1., 1., -1.)],
        [(-1., -1., 1.), (1., -1., 1.), (1., 1., 1.), (-1., 1., 1.)],
        [(-1., -1., -1.), (1., -1., -1.), (1., -1., 1.), (-1., -1., 1.)],
        [(-1., 1., -1.), (1., 1., -1.), (1., 1., 1.), (-1., 1., 1.)],
        [(-1., -1., -1.), (-1., 1., -1.), (-1., 1., 1.), (-1., -1., 1.)],
        [(1., -1., -1.), (1., 1., -1.), (1., 1., 1.), (1., -1., 1.)],
    ];

    let mut out = String::from("solid cube\n");
    for face in faces {
        let [a, b, c, d] = face.map(|(x, y, z)| corner(x, y, z));
        for tri in [[a, b, c], [a, c, d]] {
            out.push_str("  facet normal 0 0 0\n    outer loop\n");
            for [x, y, z] in tri {
                out.push_str(&format!("      vertex {x} {y} {z}\n"));
            }
            out.push_str("    endloop\n  endfacet\n");
        }
    }
    out.push_str("endsolid cube\n");
    out
}

/// Binary STL with the given triangles and zero normals.
pub fn binary_stl(triangles: &[[[f32; 3]; 3]]) -> Vec<u8> {
    let mut out = vec![0u8; 80];
    out.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
    for tri in triangles {
        out.extend(std::iter::repeat_n(0u8, 12));
        for v in tri.iter().flatten() {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&[0, 0]);
    }
    out
}

/// A solid-colour PNG.
pub fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

pub fn zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(bytes).expect("write entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// An OBJ with one unit triangle per object name, each shifted along X.
pub fn obj_with_objects(names: &[&str]) -> Vec<u8> {
    let mut out = String::new();
    for (i, name) in names.iter().enumerate() {
        let x = i as f32 * 2.0;
        out.push_str(&format!("o {name}\n"));
        out.push_str(&format!("v {x} 0 0\nv {} 0 0\nv {x} 1 0\n", x + 1.0));
        out.push_str("vt 0 0\nvt 1 0\nvt 0 1\n");
        let base = i * 3;
        out.push_str(&format!(
            "f {}/{} {}/{} {}/{}\n",
            base + 1,
            base + 1,
            base + 2,
            base + 2,
            base + 3,
            base + 3
        ));
    }
    out.into_bytes()
}

/// Packs a glTF JSON chunk and a binary chunk into a `.glb` container.
pub fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
    let pad = |mut chunk: Vec<u8>, fill: u8| {
        while chunk.len() % 4 != 0 {
            chunk.push(fill);
        }
        chunk
    };
    let json = pad(json.as_bytes().to_vec(), b' ');
    let bin = pad(bin.to_vec(), 0);
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

/// A unit right triangle in the XY plane under a node scaled by (2, 3, 1)
/// and turned 90 degrees about X, so it ends up spanning 2 along X and 3 along Z.
pub fn transformed_triangle_glb() -> Vec<u8> {
    let json = r#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [{
            "name": "turned",
            "mesh": 0,
            "scale": [2, 3, 1],
            "rotation": [0.7071068, 0, 0, 0.7071068]
        }],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
        "buffers": [{"byteLength": 36}],
        "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
        "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                       "min": [0, 0, 0], "max": [1, 1, 0]}]
    }"#;
    let bin: Vec<u8> = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
        .iter()
        .flat_map(|f| f.to_le_bytes())
        .collect();
    glb(json, &bin)
}

/// Upload and dispose counts shared between a [`CountingBackend`] and the test.
#[derive(Default, Clone)]
pub struct Counters {
    pub uploads: Arc<AtomicUsize>,
    pub disposals: Arc<AtomicUsize>,
}

impl Counters {
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

pub struct CountingHandle {
    disposals: Arc<AtomicUsize>,
}

impl Dispose for CountingHandle {
    fn dispose(&mut self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Backend that uploads nothing and only counts.
pub struct CountingBackend {
    counters: Counters,
}

impl AssetBackend for CountingBackend {
    type Handle = CountingHandle;

    fn upload(&mut self, _asset: &Asset) -> anyhow::Result<CountingHandle> {
        self.counters.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(CountingHandle {
            disposals: Arc::clone(&self.counters.disposals),
        })
    }
}

pub fn counting_scene(config: &ViewerConfig) -> (SceneManager<CountingBackend>, Counters) {
    let counters = Counters::default();
    let backend = CountingBackend {
        counters: counters.clone(),
    };
    (SceneManager::new(backend, config), counters)
}

pub fn assert_close(a: f32, b: f32) {
    assert!((a - b).abs() < 1e-4, "{a} != {b}");
}
