// static triangle mesh plus the vertex -> incident triangle table
use glam::Vec3;

use crate::error::FluidError;

/// Vertices and flattened triangle indices supplied by a mesh provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshInput {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<u32>,
}

impl MeshInput {
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<u32>) -> Self {
        Self { vertices, triangles }
    }

    /// Two triangles spanning the axis-aligned square `[-half, half]^2` at height `y`, facing +y.
    pub fn floor_quad(y: f32, half: f32) -> Self {
        let vertices = vec![
            Vec3::new(-half, y, -half),
            Vec3::new(half, y, -half),
            Vec3::new(half, y, half),
            Vec3::new(-half, y, half),
        ];
        Self::new(vertices, vec![0, 2, 1, 0, 3, 2])
    }

    /// Square floor at height `y` split into `divisions x divisions` quads, facing +y.
    ///
    /// Contacts are found through vertices hashed near a particle, so a floor
    /// meant to catch particles needs edges no longer than the smoothing radius.
    pub fn floor_grid(y: f32, half: f32, divisions: u32) -> Self {
        let n = divisions.max(1);
        let step = 2.0 * half / n as f32;
        let row = n + 1;
        let mut vertices = Vec::with_capacity((row * row) as usize);
        for iz in 0..row {
            for ix in 0..row {
                vertices.push(Vec3::new(-half + ix as f32 * step, y, -half + iz as f32 * step));
            }
        }
        let mut triangles = Vec::with_capacity((n * n * 6) as usize);
        for iz in 0..n {
            for ix in 0..n {
                let v0 = iz * row + ix;
                let v1 = v0 + 1;
                let v3 = v0 + row;
                let v2 = v3 + 1;
                triangles.extend_from_slice(&[v0, v2, v1, v0, v3, v2]);
            }
        }
        Self::new(vertices, triangles)
    }
}

/// Source of collision geometry.
pub trait MeshProvider {
    fn mesh(&self) -> MeshInput;
}

impl MeshProvider for MeshInput {
    fn mesh(&self) -> MeshInput {
        self.clone()
    }
}

/// Triangle by corner positions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    /// Unit normal following the winding, or `None` for a zero-area triangle.
    pub fn normal(&self) -> Option<Vec3> {
        (self.b - self.a).cross(self.c - self.a).try_normalize()
    }
}

#[derive(Clone, Debug)]
pub struct MeshTopology {
    vertices: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    /// Triangle ids touching each vertex, in triangle order.
    adjacency: Vec<Vec<u32>>,
}

impl MeshTopology {
    pub fn new(input: &MeshInput) -> Result<Self, FluidError> {
        if input.vertices.is_empty() {
            return Err(FluidError::NoMeshVertices);
        }
        if input.triangles.len() % 3 != 0 {
            return Err(FluidError::TriangleIndexCount {
                len: input.triangles.len(),
            });
        }

        let vertex_count = input.vertices.len();
        let mut triangles = Vec::with_capacity(input.triangles.len() / 3);
        for (t, tri) in input.triangles.chunks_exact(3).enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(FluidError::TriangleIndexOutOfRange {
                    triangle: t,
                    index,
                    vertex_count,
                });
            }
            triangles.push([tri[0], tri[1], tri[2]]);
        }

        let mut adjacency = vec![Vec::new(); vertex_count];
        for (t, tri) in triangles.iter().enumerate() {
            for (corner, &v) in tri.iter().enumerate() {
                // a triangle naming the same vertex twice is listed once
                if tri[..corner].contains(&v) {
                    continue;
                }
                adjacency[v as usize].push(t as u32);
            }
        }

        Ok(Self {
            vertices: input.vertices.clone(),
            triangles,
            adjacency,
        })
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle(&self, id: u32) -> Triangle {
        let [a, b, c] = self.triangles[id as usize];
        Triangle {
            a: self.vertices[a as usize],
            b: self.vertices[b as usize],
            c: self.vertices[c as usize],
        }
    }

    /// Triangle ids incident to `vertex`; empty for an unknown vertex.
    pub fn incident_triangles(&self, vertex: usize) -> &[u32] {
        self.adjacency.get(vertex).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Move the vertices. Topology, and therefore adjacency, is unchanged.
    pub fn set_vertex_positions(&mut self, positions: &[Vec3]) -> Result<(), FluidError> {
        if positions.len() != self.vertices.len() {
            return Err(FluidError::LengthMismatch {
                what: "mesh vertex positions",
                expected: self.vertices.len(),
                actual: positions.len(),
            });
        }
        self.vertices.copy_from_slice(positions);
        Ok(())
    }
}
