//! Reference cells.
//!
//! The set of shapes is closed and its order is part of the binary contract: adding a shape
//! changes the meaning of every stored shape index.
use itertools::Itertools;
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellShape {
    Interval,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
    Vertex,
}

/// Index used for "no shape" in the plain element record.
pub const NO_SHAPE_INDEX: i32 = 6;

const INTERVAL_VERTICES: [[f64; 3]; 2] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
const TRIANGLE_VERTICES: [[f64; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
const QUADRILATERAL_VERTICES: [[f64; 3]; 4] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]];
const TETRAHEDRON_VERTICES: [[f64; 3]; 4] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
#[rustfmt::skip]
const HEXAHEDRON_VERTICES: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0],
    [0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0], [1.0, 1.0, 1.0],
];
const VERTEX_VERTICES: [[f64; 3]; 1] = [[0.0, 0.0, 0.0]];

// Entity-to-vertex tables, indexed by [dimension][entity].
//
// Simplex sub-entities are numbered by the vertex (or edge) they are opposite to:
//
// ```text
// 2
// | \
// |   \          edge 0: (1, 2)
// 1     0        edge 1: (0, 2)
// |       \      edge 2: (0, 1)
// 0 ---2--- 1
// ```
//
// Box sub-entities are sorted lexicographically by their vertex tuples.
const INTERVAL_ENTITIES: &[&[&[usize]]] = &[&[&[0], &[1]], &[&[0, 1]]];
const TRIANGLE_ENTITIES: &[&[&[usize]]] = &[&[&[0], &[1], &[2]], &[&[1, 2], &[0, 2], &[0, 1]], &[&[0, 1, 2]]];
const QUADRILATERAL_ENTITIES: &[&[&[usize]]] = &[
    &[&[0], &[1], &[2], &[3]],
    &[&[0, 1], &[0, 2], &[1, 3], &[2, 3]],
    &[&[0, 1, 2, 3]],
];
const TETRAHEDRON_ENTITIES: &[&[&[usize]]] = &[
    &[&[0], &[1], &[2], &[3]],
    &[&[2, 3], &[1, 3], &[1, 2], &[0, 3], &[0, 2], &[0, 1]],
    &[&[1, 2, 3], &[0, 2, 3], &[0, 1, 3], &[0, 1, 2]],
    &[&[0, 1, 2, 3]],
];
const HEXAHEDRON_ENTITIES: &[&[&[usize]]] = &[
    &[&[0], &[1], &[2], &[3], &[4], &[5], &[6], &[7]],
    &[
        &[0, 1],
        &[0, 2],
        &[0, 4],
        &[1, 3],
        &[1, 5],
        &[2, 3],
        &[2, 6],
        &[3, 7],
        &[4, 5],
        &[4, 6],
        &[5, 7],
        &[6, 7],
    ],
    &[
        &[0, 1, 2, 3],
        &[0, 1, 4, 5],
        &[0, 2, 4, 6],
        &[1, 3, 5, 7],
        &[2, 3, 6, 7],
        &[4, 5, 6, 7],
    ],
    &[&[0, 1, 2, 3, 4, 5, 6, 7]],
];
const VERTEX_ENTITIES: &[&[&[usize]]] = &[&[&[0]]];

impl CellShape {
    /// All shapes, in the order of their binary indices.
    pub const ALL: [CellShape; 6] = [
        CellShape::Interval,
        CellShape::Triangle,
        CellShape::Quadrilateral,
        CellShape::Tetrahedron,
        CellShape::Hexahedron,
        CellShape::Vertex,
    ];

    /// The index of the shape in the fixed binary enumeration.
    pub fn index(&self) -> i32 {
        match self {
            CellShape::Interval => 0,
            CellShape::Triangle => 1,
            CellShape::Quadrilateral => 2,
            CellShape::Tetrahedron => 3,
            CellShape::Hexahedron => 4,
            CellShape::Vertex => 5,
        }
    }

    /// Inverse of [`CellShape::index`]. The "none" sentinel and any unknown index map to `None`.
    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i))
            .copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            CellShape::Interval => "interval",
            CellShape::Triangle => "triangle",
            CellShape::Quadrilateral => "quadrilateral",
            CellShape::Tetrahedron => "tetrahedron",
            CellShape::Hexahedron => "hexahedron",
            CellShape::Vertex => "vertex",
        }
    }

    pub fn topological_dimension(&self) -> usize {
        match self {
            CellShape::Vertex => 0,
            CellShape::Interval => 1,
            CellShape::Triangle | CellShape::Quadrilateral => 2,
            CellShape::Tetrahedron | CellShape::Hexahedron => 3,
        }
    }

    pub fn is_simplex(&self) -> bool {
        matches!(
            self,
            CellShape::Vertex | CellShape::Interval | CellShape::Triangle | CellShape::Tetrahedron
        )
    }

    fn vertex_table(&self) -> &'static [[f64; 3]] {
        match self {
            CellShape::Interval => &INTERVAL_VERTICES,
            CellShape::Triangle => &TRIANGLE_VERTICES,
            CellShape::Quadrilateral => &QUADRILATERAL_VERTICES,
            CellShape::Tetrahedron => &TETRAHEDRON_VERTICES,
            CellShape::Hexahedron => &HEXAHEDRON_VERTICES,
            CellShape::Vertex => &VERTEX_VERTICES,
        }
    }

    fn entity_table(&self) -> &'static [&'static [&'static [usize]]] {
        match self {
            CellShape::Interval => INTERVAL_ENTITIES,
            CellShape::Triangle => TRIANGLE_ENTITIES,
            CellShape::Quadrilateral => QUADRILATERAL_ENTITIES,
            CellShape::Tetrahedron => TETRAHEDRON_ENTITIES,
            CellShape::Hexahedron => HEXAHEDRON_ENTITIES,
            CellShape::Vertex => VERTEX_ENTITIES,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertex_table().len()
    }

    /// The number of sub-entities of dimension `d`. Returns zero for `d` above the
    /// topological dimension.
    pub fn num_entities(&self, d: usize) -> usize {
        self.entity_table().get(d).map(|e| e.len()).unwrap_or(0)
    }

    pub fn num_facets(&self) -> usize {
        match self.topological_dimension() {
            0 => 0,
            tdim => self.num_entities(tdim - 1),
        }
    }

    /// Local vertex indices of sub-entity `i` of dimension `d`.
    ///
    /// # Panics
    ///
    /// Panics if the entity does not exist.
    pub fn entity_vertices(&self, d: usize, i: usize) -> &'static [usize] {
        self.entity_table()[d][i]
    }

    /// The coordinates of reference vertex `i`, truncated to the topological dimension.
    pub fn reference_vertex(&self, i: usize) -> &'static [f64] {
        &self.vertex_table()[i][..self.topological_dimension()]
    }

    /// All reference vertex coordinates, laid out `[num_vertices][tdim]`.
    pub fn reference_vertices(&self) -> Vec<f64> {
        (0..self.num_vertices())
            .flat_map(|i| self.reference_vertex(i).iter().copied())
            .collect()
    }

    /// The barycenter of the vertices of sub-entity `i` of dimension `d`.
    pub fn entity_midpoint(&self, d: usize, i: usize) -> Vec<f64> {
        let tdim = self.topological_dimension();
        let vertices = self.entity_vertices(d, i);
        let mut midpoint = vec![0.0; tdim];
        for &v in vertices {
            for (m, x) in midpoint.iter_mut().zip(self.reference_vertex(v)) {
                *m += x / vertices.len() as f64;
            }
        }
        midpoint
    }

    pub fn midpoint(&self) -> Vec<f64> {
        self.entity_midpoint(self.topological_dimension(), 0)
    }

    /// All sub-entities `(d', i')` contained in the closure of sub-entity `(d, i)`,
    /// ordered by dimension and then by local index.
    pub fn entity_closure(&self, d: usize, i: usize) -> Vec<(usize, usize)> {
        let vertices = self.entity_vertices(d, i);
        (0..=d)
            .flat_map(|sub_dim| (0..self.num_entities(sub_dim)).map(move |sub| (sub_dim, sub)))
            .filter(|&(sub_dim, sub)| {
                self.entity_vertices(sub_dim, sub)
                    .iter()
                    .all(|v| vertices.contains(v))
            })
            .collect()
    }

    /// The volume (length, area) of the reference cell.
    pub fn reference_volume(&self) -> f64 {
        match self {
            CellShape::Vertex | CellShape::Interval | CellShape::Quadrilateral | CellShape::Hexahedron => 1.0,
            CellShape::Triangle => 0.5,
            CellShape::Tetrahedron => 1.0 / 6.0,
        }
    }

    /// The volume of reference facet `facet` (1 for the point facets of an interval).
    pub fn reference_facet_volume(&self, facet: usize) -> f64 {
        let tdim = self.topological_dimension();
        let vertices = self.entity_vertices(tdim - 1, facet);
        let point = |i: usize| Vector3::from_iterator(self.vertex_table()[vertices[i]].iter().copied());
        match tdim {
            1 => 1.0,
            2 => (point(1) - point(0)).norm(),
            _ => {
                let area = (point(1) - point(0)).cross(&(point(2) - point(0))).norm();
                if self.is_simplex() {
                    area / 2.0
                } else {
                    area
                }
            }
        }
    }

    /// The outward unit normal of reference facet `facet`.
    ///
    /// # Panics
    ///
    /// Panics for a vertex cell, which has no facets.
    pub fn reference_facet_normal(&self, facet: usize) -> Vec<f64> {
        let tdim = self.topological_dimension();
        assert!(tdim > 0, "A vertex has no facets.");
        let vertices = self.entity_vertices(tdim - 1, facet);
        let point = |i: usize| Vector3::from_iterator(self.vertex_table()[vertices[i]].iter().copied());
        let normal = match tdim {
            1 => Vector3::x(),
            2 => {
                let tangent = point(1) - point(0);
                Vector3::new(tangent.y, -tangent.x, 0.0)
            }
            _ => (point(1) - point(0)).cross(&(point(2) - point(0))),
        };
        let normal = normal.normalize();

        let to_facet = DVector::from_vec(self.entity_midpoint(tdim - 1, facet)) - DVector::from_vec(self.midpoint());
        let outward = normal
            .iter()
            .zip(to_facet.iter())
            .map(|(n, t)| n * t)
            .sum::<f64>()
            > 0.0;
        normal
            .iter()
            .take(tdim)
            .map(|&n| if outward { n } else { -n })
            .collect_vec()
    }
}

/// A reference cell shape together with the dimension of the space it is embedded in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    shape: CellShape,
    geometric_dimension: usize,
}

impl Cell {
    /// A cell whose geometric dimension equals its topological dimension.
    pub fn new(shape: CellShape) -> Self {
        Self {
            shape,
            geometric_dimension: shape.topological_dimension(),
        }
    }

    /// A cell embedded in a space of dimension `geometric_dimension`.
    ///
    /// # Panics
    ///
    /// Panics if the geometric dimension is smaller than the topological dimension.
    pub fn embedded(shape: CellShape, geometric_dimension: usize) -> Self {
        assert!(
            geometric_dimension >= shape.topological_dimension(),
            "Geometric dimension must not be smaller than topological dimension."
        );
        Self {
            shape,
            geometric_dimension,
        }
    }

    pub fn shape(&self) -> CellShape {
        self.shape
    }

    pub fn topological_dimension(&self) -> usize {
        self.shape.topological_dimension()
    }

    pub fn geometric_dimension(&self) -> usize {
        self.geometric_dimension
    }

    /// Whether the cell is embedded in a higher-dimensional space.
    pub fn is_manifold(&self) -> bool {
        self.geometric_dimension > self.topological_dimension()
    }
}

impl From<CellShape> for Cell {
    fn from(shape: CellShape) -> Self {
        Self::new(shape)
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_manifold() {
            write!(f, "Cell('{}', {})", self.shape.name(), self.geometric_dimension)
        } else {
            write!(f, "{}", self.shape.name())
        }
    }
}

/// Orientation of a cell relative to the orientation of its embedding space.
///
/// Only meaningful for manifold cells. `Flipped` corresponds to the flag value `1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellOrientation {
    #[default]
    Preserved,
    Flipped,
}

impl CellOrientation {
    /// Interprets an integer orientation flag. Any non-zero value means flipped.
    pub fn from_flag(flag: i32) -> Self {
        if flag == 0 {
            CellOrientation::Preserved
        } else {
            CellOrientation::Flipped
        }
    }

    pub fn flag(&self) -> i32 {
        match self {
            CellOrientation::Preserved => 0,
            CellOrientation::Flipped => 1,
        }
    }

    /// `1` for a preserved cell, `-1` for a flipped one.
    pub fn sign(&self) -> f64 {
        match self {
            CellOrientation::Preserved => 1.0,
            CellOrientation::Flipped => -1.0,
        }
    }
}
