/// Triangle-soup (STL) parser for binary and ASCII framing
use nom::{
    IResult,
    bytes::complete::tag_no_case,
    character::complete::{multispace0, multispace1, not_line_ending},
    multi::many0,
    number::complete::float,
    sequence::preceded,
};

use crate::{
    data_structures::asset::{AssetContent, AssetFormat, Geometry, MaterialRef, MeshPart, ParsedAsset},
    error::{LoadError, LoadResult},
    resources::mesh::{compute_smooth_normals, weld},
};

const HEADER_LEN: usize = 80;
const TRIANGLE_LEN: usize = 50;

type Triangle = [[f32; 3]; 3];

/// How the bytes are framed, decided from the header and length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    Binary,
    Ascii,
}

/// A binary file declares its triangle count, so a matching total length is
/// decisive even when the 80-byte header happens to start with `solid`.
pub fn detect_framing(data: &[u8]) -> Framing {
    if data.len() >= HEADER_LEN + 4 {
        let count = u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
        if count
            .checked_mul(TRIANGLE_LEN)
            .and_then(|body| body.checked_add(HEADER_LEN + 4))
            == Some(data.len())
        {
            return Framing::Binary;
        }
    }
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    if data[start..].get(..5).is_some_and(|word| word.eq_ignore_ascii_case(b"solid")) {
        Framing::Ascii
    } else {
        Framing::Binary
    }
}

fn read_vec3(data: &[u8], offset: usize) -> [f32; 3] {
    let f = |o: usize| f32::from_le_bytes([data[o], data[o + 1], data[o + 2], data[o + 3]]);
    [f(offset), f(offset + 4), f(offset + 8)]
}

/// Parse a binary STL body; facet normals are ignored in favour of smooth ones.
pub fn parse_binary(data: &[u8]) -> Result<Vec<Triangle>, String> {
    if data.len() < HEADER_LEN + 4 {
        return Err("file too small to be a valid binary STL".to_string());
    }

    let count = u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
    let body = &data[HEADER_LEN + 4..];
    if body.len() / TRIANGLE_LEN < count {
        return Err(format!(
            "header declares {count} triangles but only {} fit in the file",
            body.len() / TRIANGLE_LEN
        ));
    }

    let triangles = body
        .chunks_exact(TRIANGLE_LEN)
        .take(count)
        .map(|chunk| {
            // 12 bytes facet normal, 3 * 12 bytes corners, 2 bytes attribute count
            [read_vec3(chunk, 12), read_vec3(chunk, 24), read_vec3(chunk, 36)]
        })
        .collect();
    Ok(triangles)
}

/// Parse an ASCII STL file, returning the solid's name and its facets.
///
/// Keywords match regardless of case.
pub fn parse_ascii(input: &str) -> Result<(String, Vec<Triangle>), String> {
    match ascii_solid(input) {
        Ok((_, solid)) => Ok(solid),
        Err(e) => Err(format!("malformed ASCII STL: {e:?}")),
    }
}

fn ascii_solid(input: &str) -> IResult<&str, (String, Vec<Triangle>)> {
    let (input, _) = preceded(multispace0, tag_no_case("solid"))(input)?;
    let (input, name) = not_line_ending(input)?;
    let (input, triangles) = many0(facet)(input)?;
    let (input, _) = preceded(multispace0, tag_no_case("endsolid"))(input)?;

    Ok((input, (name.trim().to_string(), triangles)))
}

fn facet(input: &str) -> IResult<&str, Triangle> {
    let (input, _) = preceded(multispace0, tag_no_case("facet"))(input)?;
    let (input, _) = preceded(multispace1, tag_no_case("normal"))(input)?;
    let (input, _normal) = vector3(input)?;
    let (input, _) = preceded(multispace0, tag_no_case("outer"))(input)?;
    let (input, _) = preceded(multispace1, tag_no_case("loop"))(input)?;
    let (input, v1) = vertex(input)?;
    let (input, v2) = vertex(input)?;
    let (input, v3) = vertex(input)?;
    let (input, _) = preceded(multispace0, tag_no_case("endloop"))(input)?;
    let (input, _) = preceded(multispace0, tag_no_case("endfacet"))(input)?;

    Ok((input, [v1, v2, v3]))
}

fn vertex(input: &str) -> IResult<&str, [f32; 3]> {
    preceded(preceded(multispace0, tag_no_case("vertex")), vector3)(input)
}

fn vector3(input: &str) -> IResult<&str, [f32; 3]> {
    let (input, x) = preceded(multispace1, float)(input)?;
    let (input, y) = preceded(multispace1, float)(input)?;
    let (input, z) = preceded(multispace1, float)(input)?;
    Ok((input, [x, y, z]))
}

/// Parses either framing into a single flat-coloured part with smooth normals.
pub fn load(data: &[u8], color: [f32; 4]) -> LoadResult<ParsedAsset> {
    let fail = |cause: String| LoadError::parse(AssetFormat::TriangleSoup, cause);

    let (name, triangles) = match detect_framing(data) {
        Framing::Binary => (String::new(), parse_binary(data).map_err(fail)?),
        Framing::Ascii => {
            let ascii = std::str::from_utf8(data)
                .map_err(|e| e.to_string())
                .and_then(parse_ascii);
            match ascii {
                Ok(solid) => solid,
                // Exporters write `solid` into binary headers and sometimes pad the body
                Err(ascii_err) if data.len() >= HEADER_LEN + 4 => {
                    log::warn!("Not readable as ASCII STL, trying binary framing: {ascii_err}");
                    let triangles = parse_binary(data)
                        .map_err(|binary_err| fail(format!("{ascii_err}; as binary: {binary_err}")))?;
                    (String::new(), triangles)
                }
                Err(ascii_err) => return Err(fail(ascii_err)),
            }
        }
    };
    if triangles.is_empty() {
        return Err(fail("no triangles".to_string()));
    }

    let (positions, indices) = weld(&triangles);
    let normals = compute_smooth_normals(&positions, &indices);
    log::debug!(
        "triangle soup {name:?}: {} facets welded into {} vertices",
        triangles.len(),
        positions.len()
    );

    let geometry = Geometry {
        positions,
        normals,
        tex_coords: None,
        colors: None,
        indices,
    };
    let part = MeshPart::new(name, geometry, MaterialRef::Color(color));
    Ok(ParsedAsset::new(
        AssetFormat::TriangleSoup,
        AssetContent::Parts(vec![part]),
    ))
}
