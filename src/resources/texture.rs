use std::{collections::HashMap, path::Path, sync::Arc};

use image::{ImageFormat, RgbaImage, load_from_memory_with_format};
use nom::{
    IResult,
    bytes::complete::{tag, tag_no_case},
    character::complete::digit1,
    combinator::map_res,
    sequence::{preceded, separated_pair},
};

use crate::error::{LoadError, LoadResult};

/// Image extensions a bundle entry may carry to be treated as a texture.
pub const TEXTURE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "gif", "webp", "tga", "tif", "tiff",
];

pub fn is_texture_name(name: &str) -> bool {
    extension_of(name)
        .map(|ext| TEXTURE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Lower-cased extension of a file name or archive path.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// File name without directories and without extension.
pub fn file_stem(name: &str) -> &str {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match file.rfind('.') {
        Some(0) | None => file,
        Some(dot) => &file[..dot],
    }
}

/// File name without directories.
pub fn file_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    MirrorRepeat,
    ClampToEdge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// How texel values are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    /// Display-referred, gamma encoded.
    Srgb,
    Linear,
}

/// Sampling parameters carried with every texture material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerConfig {
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub generate_mipmaps: bool,
    pub color_space: ColorSpace,
}

impl Default for SamplerConfig {
    /// Repeat on both axes, linear filtering with linear mip blending, sRGB.
    fn default() -> Self {
        Self {
            wrap_u: WrapMode::Repeat,
            wrap_v: WrapMode::Repeat,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            generate_mipmaps: true,
            color_space: ColorSpace::Srgb,
        }
    }
}

/// A decoded image plus the names it is looked up by.
#[derive(Clone, Debug)]
pub struct TextureResource {
    /// Original file name, case preserved.
    pub key: String,
    pub lower_key: String,
    /// Tile coordinate parsed from a `u<N>_v<M>` file name.
    pub tile: Option<(u32, u32)>,
    pub image: RgbaImage,
}

impl TextureResource {
    pub fn from_image(name: &str, image: RgbaImage) -> Self {
        Self {
            key: name.to_string(),
            lower_key: name.to_lowercase(),
            tile: parse_tile(file_stem(name)),
            image,
        }
    }

    /// Decode raw image bytes; the extension of `name` is used as a format hint.
    pub fn decode(name: &str, bytes: &[u8]) -> LoadResult<Self> {
        let img = match ImageFormat::from_path(name) {
            Ok(format) => load_from_memory_with_format(bytes, format)
                .or_else(|_| image::load_from_memory(bytes)),
            Err(_) => image::load_from_memory(bytes),
        }
        .map_err(|e| LoadError::decode(name, e))?;
        Ok(Self::from_image(name, img.to_rgba8()))
    }

    /// A one-texel texture, used to draw flat colours through the texture path.
    pub fn solid(name: &str, rgba: [f32; 4]) -> Self {
        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let pixel = image::Rgba(rgba.map(to_u8));
        Self::from_image(name, RgbaImage::from_pixel(1, 1, pixel))
    }

    pub fn stem(&self) -> &str {
        file_stem(&self.key)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse::<u32>)(input)
}

fn uv_tile(input: &str) -> IResult<&str, (u32, u32)> {
    separated_pair(
        preceded(tag_no_case("u"), number),
        tag("_"),
        preceded(tag_no_case("v"), number),
    )(input)
}

fn digit_pair(input: &str) -> IResult<&str, (u32, u32)> {
    separated_pair(number, tag("_"), number)(input)
}

/// Runs `parser` at every position of `name` that is not preceded by `blocked`.
fn scan<'a>(
    name: &'a str,
    blocked: impl Fn(char) -> bool,
    parser: impl Fn(&'a str) -> IResult<&'a str, (u32, u32)>,
) -> Vec<(u32, u32)> {
    let mut found = Vec::new();
    let mut previous: Option<char> = None;
    for (i, c) in name.char_indices() {
        if !previous.is_some_and(&blocked) {
            if let Ok((rest, pair)) = parser(&name[i..]) {
                if !rest.starts_with(|c: char| c.is_ascii_digit()) {
                    found.push(pair);
                }
            }
        }
        previous = Some(c);
    }
    found
}

/// Extracts the first `u<N>_v<M>` tile coordinate from a name.
pub fn parse_tile(name: &str) -> Option<(u32, u32)> {
    scan(name, |c| c.is_ascii_alphabetic(), uv_tile)
        .into_iter()
        .next()
}

/// Whether `name` refers to `tile`, either as `u<N>_v<M>` or as a bare `<N>_<M>` pair.
pub fn mentions_tile(name: &str, tile: (u32, u32)) -> bool {
    scan(name, |c| c.is_ascii_alphabetic(), uv_tile).contains(&tile)
        || scan(name, |c| c.is_ascii_digit(), digit_pair).contains(&tile)
}

/// One indexed texture name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureEntry {
    pub key: String,
    pub lower_key: String,
    /// Lower-cased file stem used for substring matching.
    pub stem: String,
    pub tile: Option<(u32, u32)>,
}

/// Texture names in archive traversal order, searchable by original and lower-cased name.
#[derive(Clone, Debug, Default)]
pub struct TextureIndex {
    entries: Vec<TextureEntry>,
    by_name: HashMap<String, usize>,
}

impl TextureIndex {
    pub fn new<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut index = Self::default();
        for name in names {
            index.push(name.as_ref());
        }
        index
    }

    pub fn push(&mut self, name: &str) -> usize {
        let key = file_name(name).to_string();
        let lower_key = key.to_lowercase();
        let idx = self.entries.len();
        self.by_name.entry(key.clone()).or_insert(idx);
        self.by_name.entry(lower_key.clone()).or_insert(idx);
        self.entries.push(TextureEntry {
            stem: file_stem(&key).to_lowercase(),
            tile: parse_tile(file_stem(&key)),
            key,
            lower_key,
        });
        idx
    }

    /// Looks up by exact name first, then by its lower-cased form.
    pub fn get(&self, name: &str) -> Option<usize> {
        let name = file_name(name);
        self.by_name
            .get(name)
            .or_else(|| self.by_name.get(&name.to_lowercase()))
            .copied()
    }

    pub fn entries(&self) -> &[TextureEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decoded textures aligned with a [`TextureIndex`]; failed decodes keep their slot.
pub type DecodedTextures = Vec<LoadResult<Arc<TextureResource>>>;
