//! STL mesh writing.
//!
//! Binary files are an 80 byte header, a little-endian `u32` triangle count and
//! 50 bytes per triangle (normal, three vertices, attribute word).

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// On-disk STL flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StlFormat {
    #[default]
    Binary,
    Ascii,
}

const HEADER_LEN: usize = 80;

/// Unit normal of a triangle from its winding; zero for degenerate triangles.
pub fn triangle_normal(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> [f32; 3] {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > f32::EPSILON {
        [n[0] / len, n[1] / len, n[2] / len]
    } else {
        [0.0; 3]
    }
}

/// Size in bytes of a binary STL with `triangles` facets.
pub fn binary_stl_len(triangles: usize) -> u64 {
    (HEADER_LEN + 4 + 50 * triangles) as u64
}

fn triangles<'a>(vertices: &'a [[f32; 3]], faces: &'a [[u32; 3]]) -> impl Iterator<Item = Result<[[f32; 3]; 3]>> + 'a {
    faces.iter().map(move |face| {
        let mut corners = [[0.0; 3]; 3];
        for (corner, index) in corners.iter_mut().zip(face) {
            *corner = *vertices
                .get(*index as usize)
                .with_context(|| format!("Face references missing vertex {index}"))?;
        }
        Ok(corners)
    })
}

pub fn write_binary_stl<W: Write>(writer: &mut W, name: &str, vertices: &[[f32; 3]], faces: &[[u32; 3]]) -> Result<()> {
    let mut header = [0u8; HEADER_LEN];
    let label = format!("binary STL {name}");
    let n = label.len().min(HEADER_LEN);
    header[..n].copy_from_slice(&label.as_bytes()[..n]);
    writer.write_all(&header)?;

    let count = u32::try_from(faces.len()).context("Too many triangles for binary STL")?;
    writer.write_all(&count.to_le_bytes())?;

    for triangle in triangles(vertices, faces) {
        let [a, b, c] = triangle?;
        for value in triangle_normal(a, b, c).iter().chain(&a).chain(&b).chain(&c) {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}

pub fn write_ascii_stl<W: Write>(writer: &mut W, name: &str, vertices: &[[f32; 3]], faces: &[[u32; 3]]) -> Result<()> {
    writeln!(writer, "solid {name}")?;
    for triangle in triangles(vertices, faces) {
        let [a, b, c] = triangle?;
        let n = triangle_normal(a, b, c);
        writeln!(writer, "  facet normal {:e} {:e} {:e}", n[0], n[1], n[2])?;
        writeln!(writer, "    outer loop")?;
        for v in [a, b, c] {
            writeln!(writer, "      vertex {:e} {:e} {:e}", v[0], v[1], v[2])?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid {name}")?;
    Ok(())
}

/// Write a triangle mesh to `path`, replacing any existing file.
pub fn write_stl<P: AsRef<Path>>(path: P, vertices: &[[f32; 3]], faces: &[[u32; 3]], format: StlFormat) -> Result<()> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mesh")
        .to_string();

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    match format {
        StlFormat::Binary => write_binary_stl(&mut writer, &name, vertices, faces)?,
        StlFormat::Ascii => write_ascii_stl(&mut writer, &name, vertices, faces)?,
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tetrahedron() -> (Vec<[f32; 3]>, Vec<[u32; 3]>) {
        let vertices = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let faces = vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];
        (vertices, faces)
    }

    #[test]
    fn test_normal_follows_winding() {
        let n = triangle_normal([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        assert_eq!(n, [0.0, 0.0, 1.0]);
        let n = triangle_normal([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]);
        assert_eq!(n, [0.0, 0.0, -1.0]);
        assert_eq!(triangle_normal([1.0; 3], [1.0; 3], [2.0; 3]), [0.0; 3]);
    }

    #[test]
    fn test_binary_layout() -> Result<()> {
        let (vertices, faces) = tetrahedron();
        let mut bytes = Vec::new();
        write_binary_stl(&mut bytes, "tet", &vertices, &faces)?;

        assert_eq!(bytes.len() as u64, binary_stl_len(4));
        assert_eq!(u32::from_le_bytes(bytes[80..84].try_into()?), 4);

        // Second facet: normal (0, -1, 0), then vertex 0, 1, 3.
        let facet = &bytes[84 + 50..84 + 100];
        let floats: Vec<f32> = facet[..48]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[..3], &[0.0, -1.0, 0.0]);
        assert_eq!(&floats[3..12], &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_ascii_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("7_1.stl");
        let (vertices, faces) = tetrahedron();
        write_stl(&path, &vertices, &faces, StlFormat::Ascii)?;

        let text = std::fs::read_to_string(&path)?;
        assert!(text.starts_with("solid 7_1"));
        assert!(text.trim_end().ends_with("endsolid 7_1"));
        assert_eq!(text.matches("facet normal").count(), 4);
        assert_eq!(text.matches("vertex").count(), 12);
        Ok(())
    }

    #[test]
    fn test_binary_file_overwrites() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mesh.stl");
        let (vertices, faces) = tetrahedron();
        write_stl(&path, &vertices, &faces, StlFormat::Binary)?;
        write_stl(&path, &vertices, &faces[..1], StlFormat::Binary)?;
        assert_eq!(std::fs::metadata(&path)?.len(), binary_stl_len(1));
        Ok(())
    }

    #[test]
    fn test_missing_vertex_is_an_error() {
        let mut bytes = Vec::new();
        let result = write_binary_stl(&mut bytes, "bad", &[[0.0; 3]], &[[0, 1, 2]]);
        assert!(result.is_err());
    }
}
