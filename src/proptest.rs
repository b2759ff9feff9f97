//! Proptest strategies for reference points and physical cells.
use crate::cell::{Cell, CellShape};
use crate::element::{lagrange, FiniteElement};
use ::proptest::collection::vec;
use ::proptest::prelude::*;

/// Shapes with a non-trivial reference cell, i.e. every shape except the vertex.
pub fn cell_shape() -> impl Strategy<Value = CellShape> {
    prop_oneof![
        Just(CellShape::Interval),
        Just(CellShape::Triangle),
        Just(CellShape::Quadrilateral),
        Just(CellShape::Tetrahedron),
        Just(CellShape::Hexahedron),
    ]
}

/// A point in the closed reference cell of `shape`, laid out `[tdim]`.
pub fn reference_point(shape: CellShape) -> impl Strategy<Value = Vec<f64>> {
    let tdim = shape.topological_dimension();
    vec(0.0..=1.0, tdim + 1).prop_map(move |mut weights| {
        if shape.is_simplex() {
            // Normalized weights are barycentric coordinates, the first one belongs to the origin
            let total: f64 = weights.iter().sum();
            if total > 0.0 {
                weights.iter_mut().for_each(|w| *w /= total);
            } else {
                weights[0] = 1.0;
            }
            weights[1..].to_vec()
        } else {
            weights.truncate(tdim);
            weights
        }
    })
}

/// `num_points` reference points of `shape`, flattened to `[num_points][tdim]`.
pub fn reference_points(shape: CellShape, num_points: usize) -> impl Strategy<Value = Vec<f64>> {
    vec(reference_point(shape), num_points).prop_map(|points| points.concat())
}

/// A well-conditioned affine map `x = s (I + E) X + b` with `|E_ij| <= 0.2`, returned as
/// `(A, b)` with `A` row-major. The determinant is always positive.
pub fn affine_map(dim: usize) -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    (vec(-0.2..0.2, dim * dim), 0.5..2.0, vec(-10.0..10.0, dim)).prop_map(move |(mut a, scale, b)| {
        for i in 0..dim {
            a[i * dim + i] += 1.0;
        }
        a.iter_mut().for_each(|a_ij| *a_ij *= scale);
        (a, b)
    })
}

/// Geometry nodes of a Lagrange cell of degree `degree` with `gdim == tdim`, laid out
/// `[num_dofs][gdim]`.
///
/// The nodes are an affine image of the reference nodes, each displaced by at most
/// `max_perturbation` times the scale of the map in every coordinate.
pub fn coordinate_dofs(shape: CellShape, degree: usize, max_perturbation: f64) -> BoxedStrategy<Vec<f64>> {
    let tdim = shape.topological_dimension();
    let nodes = match lagrange(Cell::new(shape), degree) {
        Ok(element) => {
            let mut nodes = vec![0.0; element.space_dimension() * tdim];
            match element.tabulate_reference_dof_coordinates(&mut nodes) {
                Ok(()) => nodes,
                Err(_) => return Just(Vec::new()).boxed(),
            }
        }
        Err(_) => return Just(Vec::new()).boxed(),
    };
    let num_nodes = nodes.len() / tdim.max(1);
    let perturbation = if max_perturbation > 0.0 {
        vec(-max_perturbation..max_perturbation, num_nodes * tdim).boxed()
    } else {
        Just(vec![0.0; num_nodes * tdim]).boxed()
    };

    (affine_map(tdim), perturbation)
        .prop_map(move |((a, b), perturbation)| {
            let mut x = vec![0.0; nodes.len()];
            for k in 0..num_nodes {
                for i in 0..tdim {
                    x[k * tdim + i] = b[i]
                        + (0..tdim)
                            .map(|j| a[i * tdim + j] * (nodes[k * tdim + j] + perturbation[k * tdim + j]))
                            .sum::<f64>();
                }
            }
            x
        })
        .boxed()
}
