//! Iso-surface extraction from prediction volumes.
//!
//! Marching tetrahedra: every voxel cube is split into six tetrahedra sharing
//! the diagonal from corner `(0, 0, 0)` to `(1, 1, 1)`. The split is the same
//! in every cube, so neighbouring cubes agree on the shared face diagonals and
//! the surface has no cracks. Vertices lie on lattice edges and are shared
//! between triangles through an edge-keyed map.

use std::collections::HashMap;

use burn::tensor::backend::Backend;
use segmesh_core::image::{ImageMetadata, VolumeStack};
use segmesh_core::spatial::Point;

use crate::error::{PipelineError, Result};

/// Corner offsets `(x, y, z)`; bit 0 is x, bit 1 is y, bit 2 is z.
const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// One tetrahedron per axis order, each a monotone path from corner 0 to 7.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// Triangle mesh with vertices in `(x, y, z)` order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceMesh {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl SurfaceMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Axis-aligned `(min, max)` corners, `None` for an empty mesh.
    pub fn bounding_box(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(mut lo, mut hi), v| {
            for i in 0..3 {
                lo[i] = lo[i].min(v[i]);
                hi[i] = hi[i].max(v[i]);
            }
            (lo, hi)
        }))
    }

    /// Map voxel-index vertices to world coordinates.
    pub fn to_world(mut self, metadata: &ImageMetadata<3>) -> Self {
        for v in &mut self.vertices {
            let index = Point::new([v[0] as f64, v[1] as f64, v[2] as f64]);
            let world = metadata.index_to_physical(&index);
            *v = [world[0] as f32, world[1] as f32, world[2] as f32];
        }
        self
    }
}

/// Extracts the surface where a scalar field crosses `level`.
#[derive(Debug, Clone, Copy)]
pub struct MeshExtractor {
    level: f32,
}

impl MeshExtractor {
    pub fn new(level: f32) -> Self {
        Self { level }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Lazily extract one mesh per channel of `prediction`.
    ///
    /// A channel that never crosses the level yields
    /// [`PipelineError::EmptyIsoSurface`].
    pub fn extract<'a, B: Backend>(
        &'a self,
        prediction: &'a VolumeStack<B>,
    ) -> impl Iterator<Item = (usize, Result<SurfaceMesh>)> + 'a {
        let [nz, ny, nx] = prediction.spatial_shape();
        (0..prediction.num_channels()).map(move |class| {
            let mesh = prediction
                .channel(class)
                .into_data()
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| PipelineError::DimensionMismatch(format!("reading class {class}: {e:?}")))
                .and_then(|values| self.extract_field(class, &values, [nz, ny, nx]));
            (class, mesh)
        })
    }

    /// Surface of a row-major `[z, y, x]` field.
    pub fn extract_field(&self, class: usize, values: &[f32], shape: [usize; 3]) -> Result<SurfaceMesh> {
        let mesh = march(values, shape, self.level)?;
        if mesh.is_empty() {
            return Err(PipelineError::EmptyIsoSurface {
                class,
                level: self.level,
            });
        }
        tracing::debug!(class, vertices = mesh.vertex_count(), triangles = mesh.triangle_count(), "extracted surface");
        Ok(mesh)
    }
}

struct Builder<'a> {
    values: &'a [f32],
    shape: [usize; 3],
    level: f32,
    edges: HashMap<(usize, usize), u32>,
    max_vertices: usize,
    mesh: SurfaceMesh,
}

impl Builder<'_> {
    fn index(&self, [x, y, z]: [usize; 3]) -> usize {
        let [_, ny, nx] = self.shape;
        (z * ny + y) * nx + x
    }

    fn position(&self, flat: usize) -> [f32; 3] {
        let [_, ny, nx] = self.shape;
        [(flat % nx) as f32, ((flat / nx) % ny) as f32, (flat / (nx * ny)) as f32]
    }

    /// Vertex where the level crosses the lattice edge `a`-`b`.
    fn vertex(&mut self, a: usize, b: usize) -> Result<u32> {
        let key = (a.min(b), a.max(b));
        if let Some(&id) = self.edges.get(&key) {
            return Ok(id);
        }
        let count = self.mesh.vertices.len();
        let id = u32::try_from(count)
            .ok()
            .filter(|_| count < self.max_vertices)
            .ok_or_else(|| PipelineError::MeshTooLarge {
                limit: self.max_vertices.min(u32::MAX as usize),
            })?;

        let (va, vb) = (self.values[key.0], self.values[key.1]);
        let t = if (vb - va).abs() > f32::EPSILON {
            ((self.level - va) / (vb - va)).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let (pa, pb) = (self.position(key.0), self.position(key.1));
        let p = [
            pa[0] + t * (pb[0] - pa[0]),
            pa[1] + t * (pb[1] - pa[1]),
            pa[2] + t * (pb[2] - pa[2]),
        ];
        self.mesh.vertices.push(p);
        self.edges.insert(key, id);
        Ok(id)
    }

    /// Add a triangle facing `outward` (from high to low values).
    fn triangle(&mut self, mut tri: [u32; 3], outward: [f32; 3]) {
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return;
        }
        let [a, b, c] = tri.map(|i| self.mesh.vertices[i as usize]);
        let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        let n = [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ];
        if n[0] * outward[0] + n[1] * outward[1] + n[2] * outward[2] < 0.0 {
            tri.swap(1, 2);
        }
        self.mesh.faces.push(tri);
    }

    fn tetrahedron(&mut self, corners: [usize; 4]) -> Result<()> {
        let (inside, outside): (Vec<usize>, Vec<usize>) =
            corners.into_iter().partition(|&c| self.values[c] >= self.level);
        if inside.is_empty() || outside.is_empty() {
            return Ok(());
        }

        // Points from the high side towards the low side.
        let centroid = |set: &[usize]| {
            let mut sum = [0.0f32; 3];
            for &c in set {
                let p = self.position(c);
                for i in 0..3 {
                    sum[i] += p[i];
                }
            }
            sum.map(|s| s / set.len() as f32)
        };
        let (hi, lo) = (centroid(&inside), centroid(&outside));
        let outward = [lo[0] - hi[0], lo[1] - hi[1], lo[2] - hi[2]];

        match (inside.len(), outside.len()) {
            (1, 3) => {
                let a = inside[0];
                let tri = [self.vertex(a, outside[0])?, self.vertex(a, outside[1])?, self.vertex(a, outside[2])?];
                self.triangle(tri, outward);
            }
            (3, 1) => {
                let a = outside[0];
                let tri = [self.vertex(a, inside[0])?, self.vertex(a, inside[1])?, self.vertex(a, inside[2])?];
                self.triangle(tri, outward);
            }
            _ => {
                // Two on each side: the crossing is the quad a-c, a-d, b-d, b-c.
                let (a, b) = (inside[0], inside[1]);
                let (c, d) = (outside[0], outside[1]);
                let ac = self.vertex(a, c)?;
                let ad = self.vertex(a, d)?;
                let bd = self.vertex(b, d)?;
                let bc = self.vertex(b, c)?;
                self.triangle([ac, ad, bd], outward);
                self.triangle([ac, bd, bc], outward);
            }
        }
        Ok(())
    }
}

/// Marching tetrahedra over a row-major `[z, y, x]` field.
///
/// Fails with [`PipelineError::MeshTooLarge`] if the surface needs more
/// vertices than a `u32` face index can address.
pub fn march(values: &[f32], shape: [usize; 3], level: f32) -> Result<SurfaceMesh> {
    march_bounded(values, shape, level, usize::MAX)
}

fn march_bounded(values: &[f32], shape: [usize; 3], level: f32, max_vertices: usize) -> Result<SurfaceMesh> {
    let [nz, ny, nx] = shape;
    let mut builder = Builder {
        values,
        shape,
        level,
        edges: HashMap::new(),
        max_vertices,
        mesh: SurfaceMesh::default(),
    };
    if nz < 2 || ny < 2 || nx < 2 || values.len() != nz * ny * nx {
        return Ok(builder.mesh);
    }

    for z in 0..nz - 1 {
        for y in 0..ny - 1 {
            for x in 0..nx - 1 {
                let cube = CORNERS.map(|[dx, dy, dz]| builder.index([x + dx, y + dy, z + dz]));

                let above = cube.iter().filter(|&&i| values[i] >= level).count();
                if above == 0 || above == 8 {
                    continue;
                }
                for tet in TETRAHEDRA {
                    builder.tetrahedron(tet.map(|c| cube[c]))?;
                }
            }
        }
    }
    Ok(builder.mesh)
}
