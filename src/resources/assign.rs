//! Matching loose bundle textures to mesh parts.
//!
//! Bundles rarely ship a trustworthy material manifest, so textures are
//! matched by name. For every part the first rule that produces a texture
//! wins:
//!
//! 1. tile match: a texture named `..u<N>_v<M>..` goes to the part whose name
//!    or declared material name mentions the same pair,
//! 2. substring match between the texture's file stem and the part name,
//! 3. round robin over the textures in archive order,
//! 4. the default colour when there are no textures at all.
//!
//! Everything here works on names only and never touches pixels or the GPU.

use crate::resources::texture::{TextureEntry, TextureIndex, mentions_tile};

/// The names of one part as seen by the heuristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartKey<'a> {
    pub name: &'a str,
    pub material_name: Option<&'a str>,
}

impl<'a> PartKey<'a> {
    pub fn new(name: &'a str, material_name: Option<&'a str>) -> Self {
        Self { name, material_name }
    }
}

/// Which rule matched, and the index into the [`TextureIndex`] it chose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assignment {
    Tile(usize),
    Substring(usize),
    RoundRobin(usize),
    DefaultColor,
}

impl Assignment {
    pub fn texture(self) -> Option<usize> {
        match self {
            Assignment::Tile(i) | Assignment::Substring(i) | Assignment::RoundRobin(i) => Some(i),
            Assignment::DefaultColor => None,
        }
    }
}

/// A tile named by the part itself outranks one named by its material.
fn tile_match(part: &PartKey<'_>, entries: &[TextureEntry]) -> Option<usize> {
    let named_by = |name: &str| {
        entries
            .iter()
            .position(|entry| entry.tile.is_some_and(|tile| mentions_tile(name, tile)))
    };
    named_by(part.name).or_else(|| part.material_name.and_then(named_by))
}

/**
 * Exact stem matches beat containment, longer overlaps beat shorter ones and
 * the remaining ties go to the lexicographically smaller stem. The outcome
 * thus doesn't depend on the order the textures came out of the archive.
 */
fn substring_match(part: &PartKey<'_>, entries: &[TextureEntry]) -> Option<usize> {
    let name = part.name.to_lowercase();
    if name.is_empty() {
        return None;
    }

    let rank = |entry: &TextureEntry| (entry.stem == name, entry.stem.len().min(name.len()));
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| {
            !entry.stem.is_empty() && (name.contains(&entry.stem) || entry.stem.contains(&name))
        })
        .max_by(|(_, a), (_, b)| {
            rank(a)
                .cmp(&rank(b))
                .then_with(|| b.stem.cmp(&a.stem))
                .then_with(|| b.lower_key.cmp(&a.lower_key))
        })
        .map(|(i, _)| i)
}

/// Assigns one texture (or the default colour) to every part, keeping part order.
pub fn assign_textures(parts: &[PartKey<'_>], index: &TextureIndex) -> Vec<Assignment> {
    let entries = index.entries();
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if entries.is_empty() {
                return Assignment::DefaultColor;
            }
            let assignment = tile_match(part, entries)
                .map(Assignment::Tile)
                .or_else(|| substring_match(part, entries).map(Assignment::Substring))
                .unwrap_or(Assignment::RoundRobin(i % entries.len()));
            log::debug!(
                "part {:?} ({:?}) -> {:?} {}",
                part.name,
                part.material_name,
                assignment,
                assignment
                    .texture()
                    .map(|t| entries[t].key.as_str())
                    .unwrap_or("default colour")
            );
            assignment
        })
        .collect()
}
