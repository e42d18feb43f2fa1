// particle vs triangle mesh, found through a hash over the mesh vertices
use glam::Vec3;

use super::mesh::{MeshInput, MeshTopology, Triangle};
use super::spatial_hash::SpatialHashGrid;
use crate::error::{check_smoothing_radius, FluidError};

/// Contact between a particle and the mesh surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshContact {
    /// Closest point on the surface.
    pub point: Vec3,
    /// Unit vector from the surface towards the particle.
    pub normal: Vec3,
    pub distance: f32,
    /// `radius - distance`, always positive.
    pub penetration: f32,
    pub triangle: u32,
}

/// Closest point to `p` on triangle `tri` (Voronoi region walk).
pub fn closest_point_on_triangle(p: Vec3, tri: &Triangle) -> Vec3 {
    let Triangle { a, b, c } = *tri;
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Sphere-vs-triangle test. Zero-area triangles never collide.
pub fn sphere_triangle_contact(
    center: Vec3,
    radius: f32,
    tri: &Triangle,
    id: u32,
) -> Option<MeshContact> {
    let face_normal = tri.normal()?;
    let point = closest_point_on_triangle(center, tri);
    let offset = center - point;
    let distance = offset.length();
    if distance >= radius {
        return None;
    }
    // a centre lying exactly on the surface is pushed out along the winding normal
    let normal = if distance > 1e-6 {
        offset / distance
    } else {
        face_normal
    };
    Some(MeshContact {
        point,
        normal,
        distance,
        penetration: radius - distance,
        triangle: id,
    })
}

/// Mesh plus its vertex hash, shared read-only by every particle task.
#[derive(Clone, Debug)]
pub struct MeshCollider {
    topology: MeshTopology,
    grid: SpatialHashGrid,
    radius: f32,
}

impl MeshCollider {
    pub fn new(input: &MeshInput, radius: f32) -> Result<Self, FluidError> {
        check_smoothing_radius(radius)?;
        let topology = MeshTopology::new(input)?;
        let mut grid = SpatialHashGrid::new(topology.vertex_count(), radius)?;
        grid.rebuild(topology.vertices())?;
        Ok(Self {
            topology,
            grid,
            radius,
        })
    }

    pub fn topology(&self) -> &MeshTopology {
        &self.topology
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Change the contact radius and re-hash with it as cell size.
    pub fn set_radius(&mut self, radius: f32) -> Result<(), FluidError> {
        self.grid.set_cell_size(radius)?;
        self.radius = radius;
        self.grid.rebuild(self.topology.vertices())
    }

    /// Replace the vertex positions of a deforming mesh and re-hash them.
    pub fn update_vertices(&mut self, positions: &[Vec3]) -> Result<(), FluidError> {
        self.topology.set_vertex_positions(positions)?;
        self.grid.rebuild(self.topology.vertices())
    }

    /// Nearest contact within the collision radius of `position`, if any.
    /// Equal distances go to the lower triangle id.
    pub fn query(&self, position: Vec3) -> Option<MeshContact> {
        let mut best: Option<MeshContact> = None;
        // a triangle shared by several nearby vertices is tested again, which
        // cannot change the pick
        self.grid.for_each_neighbor(position, |vertex| {
            for &id in self.topology.incident_triangles(vertex) {
                let tri = self.topology.triangle(id);
                let Some(contact) = sphere_triangle_contact(position, self.radius, &tri, id) else {
                    continue;
                };
                let closer = match &best {
                    None => true,
                    Some(current) => {
                        contact.distance < current.distance
                            || (contact.distance == current.distance
                                && contact.triangle < current.triangle)
                    }
                };
                if closer {
                    best = Some(contact);
                }
            }
        });
        best
    }
}
