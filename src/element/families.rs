//! Concrete element families expressed as [`ElementDefinition`]s.
use crate::cell::{Cell, CellShape};
use crate::element::{BasisFunction, BasisMapping, DofEntity, DofFunctional, ElementDefinition, ElementError};
use crate::polynomial::{barycentric_coordinates, Polynomial};

pub const LAGRANGE: &str = "Lagrange";
pub const DISCONTINUOUS_LAGRANGE: &str = "Discontinuous Lagrange";
pub const REAL: &str = "Real";
pub const RAVIART_THOMAS: &str = "Raviart-Thomas";
pub const NEDELEC_FIRST_KIND: &str = "Nedelec 1st kind H(curl)";

/// A nodal scalar basis function with its node and the entity owning the node.
struct Node {
    function: Polynomial,
    point: Vec<f64>,
    entity: (usize, usize),
}

fn unsupported(family: &str, shape: CellShape, degree: usize) -> ElementError {
    ElementError::Unsupported {
        family: family.to_string(),
        shape,
        degree,
    }
}

fn element_signature(family: &str, cell: &Cell, degree: usize) -> String {
    format!("FiniteElement('{}', {}, {})", family, cell, degree)
}

/// Nodal basis of full polynomial degree `degree` on a simplex, or tensor-product degree on a box.
fn nodal_basis(shape: CellShape, degree: usize) -> Option<Vec<Node>> {
    let tdim = shape.topological_dimension();
    match (shape, degree) {
        (_, 0) => Some(vec![Node {
            function: Polynomial::constant(tdim, 1.0),
            point: shape.midpoint(),
            entity: (tdim, 0),
        }]),
        (CellShape::Vertex, 1) => Some(vec![Node {
            function: Polynomial::constant(0, 1.0),
            point: Vec::new(),
            entity: (0, 0),
        }]),
        (CellShape::Interval | CellShape::Triangle | CellShape::Tetrahedron, 1) => {
            let lambda = barycentric_coordinates(tdim);
            Some(
                lambda
                    .into_iter()
                    .enumerate()
                    .map(|(i, function)| Node {
                        function,
                        point: shape.reference_vertex(i).to_vec(),
                        entity: (0, i),
                    })
                    .collect(),
            )
        }
        (CellShape::Interval | CellShape::Triangle | CellShape::Tetrahedron, 2) => {
            let lambda = barycentric_coordinates(tdim);
            let one = Polynomial::constant(tdim, 1.0);
            let vertex_nodes = lambda.iter().enumerate().map(|(i, l)| Node {
                // lambda_i (2 lambda_i - 1)
                function: l * &(&(l * 2.0) - &one),
                point: shape.reference_vertex(i).to_vec(),
                entity: (0, i),
            });
            let edge_nodes = (0..shape.num_entities(1)).map(|e| {
                let vertices = shape.entity_vertices(1, e);
                Node {
                    function: &(&lambda[vertices[0]] * &lambda[vertices[1]]) * 4.0,
                    point: shape.entity_midpoint(1, e),
                    entity: (1, e),
                }
            });
            Some(vertex_nodes.chain(edge_nodes).collect())
        }
        (CellShape::Quadrilateral | CellShape::Hexahedron, 1) => Some(
            (0..shape.num_vertices())
                .map(|v| {
                    let vertex = shape.reference_vertex(v);
                    let one = Polynomial::constant(tdim, 1.0);
                    let function = (0..tdim).fold(one.clone(), |product, k| {
                        let x_k = Polynomial::variable(tdim, k);
                        let factor = if vertex[k] > 0.5 { x_k } else { &one - &x_k };
                        &product * &factor
                    });
                    Node {
                        function,
                        point: vertex.to_vec(),
                        entity: (0, v),
                    }
                })
                .collect(),
        ),
        _ => None,
    }
}

fn scalar_element(family: &str, cell: Cell, degree: usize, nodes: Vec<Node>, interior: bool) -> ElementDefinition {
    let tdim = cell.topological_dimension();
    let basis = nodes
        .into_iter()
        .map(|node| BasisFunction {
            components: vec![node.function],
            mapping: BasisMapping::Affine,
            reference_offset: 0,
            physical_offset: 0,
            point: node.point,
            functional: DofFunctional::PointEvaluation,
            entity: if interior {
                DofEntity::Entity { dim: tdim, index: 0 }
            } else {
                DofEntity::Entity {
                    dim: node.entity.0,
                    index: node.entity.1,
                }
            },
        })
        .collect();
    ElementDefinition {
        signature: element_signature(family, &cell, degree),
        family: family.to_string(),
        shape: cell.shape(),
        geometric_dimension: cell.geometric_dimension(),
        degree,
        value_shape: Vec::new(),
        reference_value_shape: Vec::new(),
        basis,
        sub_elements: Vec::new(),
    }
}

/// Continuous Lagrange element with nodal degrees of freedom.
///
/// Available for degrees 1 and 2 on simplices, degree 1 on quadrilaterals and hexahedra and
/// degrees 0 and 1 on a vertex.
pub fn lagrange(cell: impl Into<Cell>, degree: usize) -> Result<ElementDefinition, ElementError> {
    let cell = cell.into();
    let shape = cell.shape();
    if degree == 0 && shape != CellShape::Vertex {
        return Err(unsupported(LAGRANGE, shape, degree));
    }
    let nodes = nodal_basis(shape, degree).ok_or_else(|| unsupported(LAGRANGE, shape, degree))?;
    Ok(scalar_element(LAGRANGE, cell, degree, nodes, false))
}

/// Discontinuous Lagrange element. All degrees of freedom belong to the cell interior.
pub fn discontinuous_lagrange(cell: impl Into<Cell>, degree: usize) -> Result<ElementDefinition, ElementError> {
    let cell = cell.into();
    let shape = cell.shape();
    let nodes = nodal_basis(shape, degree).ok_or_else(|| unsupported(DISCONTINUOUS_LAGRANGE, shape, degree))?;
    Ok(scalar_element(DISCONTINUOUS_LAGRANGE, cell, degree, nodes, true))
}

/// The space of global constants: a single mesh-independent degree of freedom.
pub fn real(cell: impl Into<Cell>) -> ElementDefinition {
    let cell = cell.into();
    let tdim = cell.topological_dimension();
    let mut element = scalar_element(
        REAL,
        cell,
        0,
        vec![Node {
            function: Polynomial::constant(tdim, 1.0),
            point: cell.shape().midpoint(),
            entity: (tdim, 0),
        }],
        true,
    );
    element.basis[0].entity = DofEntity::Global;
    element
}

/// The lowest-order Raviart-Thomas basis `phi_i = (x - v_i) / (tdim |T|)` on a simplex.
///
/// `phi_i` has unit flux through facet `i` and zero flux through the others.
fn raviart_thomas_functions(shape: CellShape) -> Vec<Vec<Polynomial>> {
    let tdim = shape.topological_dimension();
    let scale = 1.0 / (tdim as f64 * shape.reference_volume());
    (0..shape.num_vertices())
        .map(|i| {
            let vertex = shape.reference_vertex(i);
            (0..tdim)
                .map(|c| {
                    let shifted = &Polynomial::variable(tdim, c) - &Polynomial::constant(tdim, vertex[c]);
                    shifted.scale(scale)
                })
                .collect()
        })
        .collect()
}

fn vector_valued_element(
    family: &str,
    cell: Cell,
    degree: usize,
    mapping: BasisMapping,
    basis: Vec<(Vec<Polynomial>, DofFunctional, Vec<f64>, (usize, usize))>,
) -> ElementDefinition {
    ElementDefinition {
        signature: element_signature(family, &cell, degree),
        family: family.to_string(),
        shape: cell.shape(),
        geometric_dimension: cell.geometric_dimension(),
        degree,
        value_shape: vec![cell.geometric_dimension()],
        reference_value_shape: vec![cell.topological_dimension()],
        basis: basis
            .into_iter()
            .map(|(components, functional, point, (dim, index))| BasisFunction {
                components,
                mapping,
                reference_offset: 0,
                physical_offset: 0,
                point,
                functional,
                entity: DofEntity::Entity { dim, index },
            })
            .collect(),
        sub_elements: Vec::new(),
    }
}

/// H(div)-conforming Raviart-Thomas element of degree 1 on triangles and tetrahedra.
pub fn raviart_thomas(cell: impl Into<Cell>, degree: usize) -> Result<ElementDefinition, ElementError> {
    let cell = cell.into();
    let shape = cell.shape();
    if degree != 1 || !matches!(shape, CellShape::Triangle | CellShape::Tetrahedron) {
        return Err(unsupported(RAVIART_THOMAS, shape, degree));
    }
    let facet_dim = shape.topological_dimension() - 1;
    let basis = raviart_thomas_functions(shape)
        .into_iter()
        .enumerate()
        .map(|(facet, components)| {
            let functional = DofFunctional::NormalMoment {
                normal: shape.reference_facet_normal(facet),
                scale: shape.reference_facet_volume(facet),
            };
            (components, functional, shape.entity_midpoint(facet_dim, facet), (facet_dim, facet))
        })
        .collect();
    Ok(vector_valued_element(
        RAVIART_THOMAS,
        cell,
        degree,
        BasisMapping::ContravariantPiola,
        basis,
    ))
}

/// H(curl)-conforming Nédélec element of the first kind, degree 1, on triangles.
///
/// Obtained from Raviart-Thomas by a quarter rotation `R(a, b) = (-b, a)` of both the basis
/// and the facet normals.
pub fn nedelec_first_kind(cell: impl Into<Cell>, degree: usize) -> Result<ElementDefinition, ElementError> {
    let cell = cell.into();
    let shape = cell.shape();
    if degree != 1 || shape != CellShape::Triangle {
        return Err(unsupported(NEDELEC_FIRST_KIND, shape, degree));
    }
    let basis = raviart_thomas_functions(shape)
        .into_iter()
        .enumerate()
        .map(|(edge, rt)| {
            let components = vec![-&rt[1], rt[0].clone()];
            let normal = shape.reference_facet_normal(edge);
            let functional = DofFunctional::TangentMoment {
                tangent: vec![-normal[1], normal[0]],
                scale: shape.reference_facet_volume(edge),
            };
            (components, functional, shape.entity_midpoint(1, edge), (1, edge))
        })
        .collect();
    Ok(vector_valued_element(
        NEDELEC_FIRST_KIND,
        cell,
        degree,
        BasisMapping::CovariantPiola,
        basis,
    ))
}

/// Creates an element by family name, accepting the short names used in form files.
pub fn create_element(family: &str, cell: impl Into<Cell>, degree: usize) -> Result<ElementDefinition, ElementError> {
    let cell = cell.into();
    match family {
        "Lagrange" | "P" | "CG" | "Q" => lagrange(cell, degree),
        "Discontinuous Lagrange" | "DG" | "DP" | "DQ" => discontinuous_lagrange(cell, degree),
        "Real" | "R" if degree == 0 => Ok(real(cell)),
        "Raviart-Thomas" | "RT" => raviart_thomas(cell, degree),
        "Nedelec 1st kind H(curl)" | "N1curl" => nedelec_first_kind(cell, degree),
        _ => Err(unsupported(family, cell.shape(), degree)),
    }
}
