use fenris_form::cell::{Cell, CellOrientation, CellShape};
use fenris_form::coordinate_mapping::{CoordinateMapping, LagrangeCoordinateMapping};
use fenris_form::element::{
    derivative_combinations, discontinuous_lagrange, lagrange, mixed, nedelec_first_kind, num_derivatives,
    raviart_thomas, real, tensor, vector, BasisEvaluationError, ElementDefinition, ElementError, FiniteElement,
};
use fenris_form::proptest::{coordinate_dofs, reference_point, reference_points};
use paste::paste;
use proptest::prelude::*;
use util::assert_approx_slice_eq;

#[allow(non_snake_case)]
fn evaluate(element: &dyn FiniteElement, num_points: usize, X: &[f64]) -> Vec<f64> {
    let mut values = vec![0.0; num_points * element.space_dimension() * element.reference_value_size()];
    element
        .evaluate_reference_basis(&mut values, num_points, X)
        .unwrap();
    values
}

#[allow(non_snake_case)]
fn evaluate_derivatives(element: &dyn FiniteElement, order: usize, num_points: usize, X: &[f64]) -> Vec<f64> {
    let tdim = element.topological_dimension();
    let mut values = vec![
        0.0;
        num_points * element.space_dimension() * num_derivatives(tdim, order) * element.reference_value_size()
    ];
    element
        .evaluate_reference_basis_derivatives(&mut values, order, num_points, X)
        .unwrap();
    values
}

#[allow(non_snake_case)]
fn dof_coordinates(element: &dyn FiniteElement) -> Vec<f64> {
    let mut X = vec![0.0; element.space_dimension() * element.topological_dimension()];
    element.tabulate_reference_dof_coordinates(&mut X).unwrap();
    X
}

/// Physical basis values of order `order` at `X` on the cell given by `coordinate_dofs`.
#[allow(non_snake_case)]
fn physical_values(
    element: &dyn FiniteElement,
    mapping: &dyn CoordinateMapping,
    order: usize,
    X: &[f64],
    coordinate_dofs: &[f64],
) -> Vec<f64> {
    let tdim = element.topological_dimension();
    let gdim = element.geometric_dimension();
    let num_points = X.len() / tdim;
    let mut x = vec![0.0; num_points * gdim];
    let mut J = vec![0.0; num_points * gdim * tdim];
    let mut detJ = vec![0.0; num_points];
    let mut K = vec![0.0; num_points * tdim * gdim];
    mapping.compute_geometry(
        &mut x,
        &mut J,
        &mut detJ,
        &mut K,
        num_points,
        X,
        coordinate_dofs,
        CellOrientation::Preserved,
    );
    let reference_values = evaluate_derivatives(element, order, num_points, X);
    let mut values =
        vec![0.0; num_points * element.space_dimension() * num_derivatives(gdim, order) * element.value_size()];
    element
        .transform_reference_basis_derivatives(
            &mut values,
            order,
            num_points,
            &reference_values,
            X,
            &J,
            &detJ,
            &K,
            CellOrientation::Preserved,
        )
        .unwrap();
    values
}

#[test]
fn derivative_combinations_are_in_odometer_order() {
    assert_eq!(derivative_combinations(2, 0), vec![Vec::<usize>::new()]);
    assert_eq!(derivative_combinations(3, 1), vec![vec![0], vec![1], vec![2]]);
    assert_eq!(
        derivative_combinations(2, 2),
        vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
    );
    assert_eq!(num_derivatives(3, 2), 9);
    assert_eq!(num_derivatives(0, 1), 0);
    assert_eq!(num_derivatives(0, 0), 1);
}

macro_rules! element_invariant_tests {
    ($($name:ident => $element:expr),* $(,)?) => {
        $(
            paste! {
                #[test]
                fn [<$name _value_size_is_product_of_value_dimensions>]() {
                    let element: ElementDefinition = $element;
                    let value_size: usize = (0..element.value_rank()).map(|i| element.value_dimension(i)).product();
                    assert_eq!(element.value_size(), value_size);
                    let reference_value_size: usize = (0..element.reference_value_rank())
                        .map(|i| element.reference_value_dimension(i))
                        .product();
                    assert_eq!(element.reference_value_size(), reference_value_size);
                    assert_eq!(element.value_dimension(element.value_rank()), 1);
                    assert_eq!(element.reference_value_dimension(element.reference_value_rank() + 2), 1);
                }

                #[test]
                fn [<$name _sub_elements_partition_space_dimension>]() {
                    let element: ElementDefinition = $element;
                    let n = element.num_sub_elements();
                    if n > 0 {
                        let sub_dims: usize = (0..n)
                            .map(|i| element.create_sub_element(i).unwrap().space_dimension())
                            .sum();
                        assert_eq!(sub_dims, element.space_dimension());
                    }
                    assert!(element.create_sub_element(n).is_none());
                }

                #[test]
                fn [<$name _create_yields_equivalent_element>]() {
                    let element: ElementDefinition = $element;
                    let created = element.create();
                    assert_eq!(created.signature(), element.signature());
                    assert_eq!(created.space_dimension(), element.space_dimension());
                    let midpoint = element.cell_shape().midpoint();
                    assert_eq!(evaluate(created.as_ref(), 1, &midpoint), evaluate(&element, 1, &midpoint));
                }

                #[test]
                fn [<$name _order_zero_derivatives_are_values>]() {
                    let element: ElementDefinition = $element;
                    let mut points = element.cell_shape().midpoint();
                    points.extend(element.cell_shape().reference_vertex(0));
                    assert_eq!(evaluate_derivatives(&element, 0, 2, &points), evaluate(&element, 2, &points));
                }
            }
        )*
    };
}

element_invariant_tests! {
    p1_interval => lagrange(CellShape::Interval, 1).unwrap(),
    p2_triangle => lagrange(CellShape::Triangle, 2).unwrap(),
    p2_tetrahedron => lagrange(CellShape::Tetrahedron, 2).unwrap(),
    q1_hexahedron => lagrange(CellShape::Hexahedron, 1).unwrap(),
    dg0_quadrilateral => discontinuous_lagrange(CellShape::Quadrilateral, 0).unwrap(),
    real_triangle => real(CellShape::Triangle),
    rt1_tetrahedron => raviart_thomas(CellShape::Tetrahedron, 1).unwrap(),
    n1curl_triangle => nedelec_first_kind(CellShape::Triangle, 1).unwrap(),
    vector_p1_triangle => vector(lagrange(CellShape::Triangle, 1).unwrap(), 2).unwrap(),
    tensor_q1_quadrilateral => tensor(lagrange(CellShape::Quadrilateral, 1).unwrap(), [2, 2]).unwrap(),
    taylor_hood => mixed(vec![
        vector(lagrange(CellShape::Triangle, 2).unwrap(), 2).unwrap(),
        lagrange(CellShape::Triangle, 1).unwrap(),
    ]).unwrap(),
    rt_dg_mixed => mixed(vec![
        raviart_thomas(CellShape::Triangle, 1).unwrap(),
        discontinuous_lagrange(CellShape::Triangle, 0).unwrap(),
    ]).unwrap(),
}

fn nodal_elements() -> Vec<ElementDefinition> {
    let mut elements = Vec::new();
    for (shape, degrees) in [
        (CellShape::Interval, 1..=2),
        (CellShape::Triangle, 1..=2),
        (CellShape::Tetrahedron, 1..=2),
        (CellShape::Quadrilateral, 1..=1),
        (CellShape::Hexahedron, 1..=1),
        (CellShape::Vertex, 0..=1),
    ] {
        for degree in degrees {
            elements.push(lagrange(shape, degree).unwrap());
            elements.push(discontinuous_lagrange(shape, degree).unwrap());
        }
    }
    elements
}

#[test]
fn lagrange_bases_are_nodal() {
    for element in nodal_elements() {
        let n = element.space_dimension();
        let values = evaluate(&element, n, &dof_coordinates(&element));
        for i in 0..n {
            for j in 0..n {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (values[i * n + j] - expected).abs() <= 1e-14,
                    "{}: basis function {} at node {}",
                    element.signature(),
                    j,
                    i
                );
            }
        }
    }
}

#[test]
fn lagrange_space_dimensions() {
    let dims = [
        (CellShape::Interval, 1, 2),
        (CellShape::Interval, 2, 3),
        (CellShape::Triangle, 1, 3),
        (CellShape::Triangle, 2, 6),
        (CellShape::Tetrahedron, 1, 4),
        (CellShape::Tetrahedron, 2, 10),
        (CellShape::Quadrilateral, 1, 4),
        (CellShape::Hexahedron, 1, 8),
        (CellShape::Vertex, 1, 1),
    ];
    for (shape, degree, dim) in dims {
        let element = lagrange(shape, degree).unwrap();
        assert_eq!(element.space_dimension(), dim);
        assert_eq!(element.degree(), degree);
        assert_eq!(element.family(), "Lagrange");
        assert_eq!(element.value_rank(), 0);
        assert_eq!(element.num_sub_elements(), 0);
    }
}

#[test]
fn unsupported_elements_are_rejected() {
    assert_eq!(
        lagrange(CellShape::Hexahedron, 2),
        Err(ElementError::Unsupported {
            family: "Lagrange".to_string(),
            shape: CellShape::Hexahedron,
            degree: 2
        })
    );
    assert!(lagrange(CellShape::Triangle, 0).is_err());
    assert!(lagrange(CellShape::Triangle, 3).is_err());
    assert!(raviart_thomas(CellShape::Quadrilateral, 1).is_err());
    assert!(raviart_thomas(CellShape::Triangle, 2).is_err());
    assert!(nedelec_first_kind(CellShape::Tetrahedron, 1).is_err());
    assert!(mixed(vec![]).is_err());
    assert!(mixed(vec![
        lagrange(CellShape::Triangle, 1).unwrap(),
        lagrange(CellShape::Quadrilateral, 1).unwrap()
    ])
    .is_err());
    assert!(vector(raviart_thomas(CellShape::Triangle, 1).unwrap(), 2).is_err());
}

#[test]
fn unsupported_derivative_order_is_reported() {
    let element = lagrange(CellShape::Triangle, 1).unwrap();
    let mut values = vec![0.0; 3 * 32];
    assert_eq!(
        element.evaluate_reference_basis_derivatives(&mut values, 5, 1, &[0.2, 0.2]),
        Err(BasisEvaluationError::UnsupportedDerivativeOrder { order: 5, max_order: 4 })
    );
}

#[test]
fn higher_derivatives_of_quadratic_basis() {
    let element = lagrange(CellShape::Interval, 2).unwrap();
    // Second derivatives of 2 l0^2 - l0, 2 l1^2 - l1 and 4 l0 l1 are 4, 4 and -8
    assert_approx_slice_eq!(evaluate_derivatives(&element, 2, 1, &[0.3]), [4.0, 4.0, -8.0], abstol = 1e-12);
    assert_approx_slice_eq!(evaluate_derivatives(&element, 3, 1, &[0.3]), [0.0, 0.0, 0.0], abstol = 1e-12);
}

#[test]
fn signatures() {
    let p1 = lagrange(CellShape::Triangle, 1).unwrap();
    insta::assert_snapshot!(p1.signature(), @"FiniteElement('Lagrange', triangle, 1)");
    let manifold = lagrange(Cell::embedded(CellShape::Triangle, 3), 2).unwrap();
    insta::assert_snapshot!(manifold.signature(), @"FiniteElement('Lagrange', Cell('triangle', 3), 2)");
    let v = vector(p1.clone(), 2).unwrap();
    insta::assert_snapshot!(v.signature(), @"VectorElement(FiniteElement('Lagrange', triangle, 1), dim=2)");
    let t = tensor(p1.clone(), [2, 3]).unwrap();
    insta::assert_snapshot!(t.signature(), @"TensorElement(FiniteElement('Lagrange', triangle, 1), shape=(2, 3))");
    let m = mixed(vec![v, real(CellShape::Triangle)]).unwrap();
    assert_eq!(
        m.signature(),
        concat!(
            "MixedElement(VectorElement(FiniteElement('Lagrange', triangle, 1), dim=2), ",
            "FiniteElement('Real', triangle, 0))"
        )
    );
}

#[test]
fn composite_values_occupy_separate_components() {
    let p1 = lagrange(CellShape::Triangle, 1).unwrap();
    let element = mixed(vec![vector(p1.clone(), 2).unwrap(), p1.clone()]).unwrap();
    assert_eq!(element.space_dimension(), 9);
    assert_eq!(element.value_size(), 3);
    assert_eq!(element.reference_value_size(), 3);
    assert_eq!(element.num_sub_elements(), 2);
    assert_eq!(element.create_sub_element(0).unwrap().num_sub_elements(), 2);

    let lambda = [0.5, 0.2, 0.3];
    let values = evaluate(&element, 1, &[0.2, 0.3]);
    for (i, row) in values.chunks(3).enumerate() {
        let mut expected = [0.0; 3];
        expected[i / 3] = lambda[i % 3];
        assert_approx_slice_eq!(row, expected, abstol = 1e-14);
    }
}

#[test]
fn tensor_element_shape() {
    let element = tensor(lagrange(CellShape::Quadrilateral, 1).unwrap(), [2, 3]).unwrap();
    assert_eq!(element.value_rank(), 2);
    assert_eq!(element.value_dimension(0), 2);
    assert_eq!(element.value_dimension(1), 3);
    assert_eq!(element.value_size(), 6);
    assert_eq!(element.space_dimension(), 24);
    assert_eq!(element.family(), "Lagrange");
}

#[test]
fn raviart_thomas_dofs_are_facet_fluxes() {
    for shape in [CellShape::Triangle, CellShape::Tetrahedron] {
        let element = raviart_thomas(shape, 1).unwrap();
        let tdim = shape.topological_dimension();
        let n = element.space_dimension();
        assert_eq!(n, tdim + 1);
        for facet in 0..shape.num_facets() {
            let values = evaluate(&element, 1, &shape.entity_midpoint(tdim - 1, facet));
            let normal = shape.reference_facet_normal(facet);
            let area = shape.reference_facet_volume(facet);
            for i in 0..n {
                let flux: f64 = (0..tdim).map(|c| values[i * tdim + c] * normal[c]).sum::<f64>() * area;
                let expected = if i == facet { 1.0 } else { 0.0 };
                assert!((flux - expected).abs() <= 1e-14, "{}: flux of {} through {}", shape.name(), i, facet);
            }
        }
    }
}

#[test]
fn nedelec_dofs_are_edge_circulations() {
    let shape = CellShape::Triangle;
    let element = nedelec_first_kind(shape, 1).unwrap();
    for edge in 0..3 {
        let values = evaluate(&element, 1, &shape.entity_midpoint(1, edge));
        let normal = shape.reference_facet_normal(edge);
        let tangent = [-normal[1], normal[0]];
        let length = shape.reference_facet_volume(edge);
        for i in 0..3 {
            let circulation = (values[2 * i] * tangent[0] + values[2 * i + 1] * tangent[1]) * length;
            let expected = if i == edge { 1.0 } else { 0.0 };
            assert!((circulation - expected).abs() <= 1e-14);
        }
    }
}

#[test]
fn dof_coordinates_of_quadratic_triangle() {
    let element = lagrange(CellShape::Triangle, 2).unwrap();
    assert_eq!(
        dof_coordinates(&element),
        vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.5, 0.5, 0.0, 0.5, 0.5, 0.0]
    );
    let rt = raviart_thomas(CellShape::Triangle, 1).unwrap();
    assert_eq!(dof_coordinates(&rt), vec![0.5, 0.5, 0.0, 0.5, 0.5, 0.0]);
}

#[test]
fn map_dofs_of_nodal_element_picks_point_values() {
    let element = vector(lagrange(CellShape::Triangle, 1).unwrap(), 2).unwrap();
    let mapping = LagrangeCoordinateMapping::new(CellShape::Triangle, 1).unwrap();
    let coordinate_dofs = [1.0, 1.0, 3.0, 1.0, 1.0, 2.0];
    // Row i holds the function value at the node of dof i
    let vals: Vec<f64> = (0..6).flat_map(|i| [10.0 * i as f64, 10.0 * i as f64 + 1.0]).collect();
    let mut dof_values = vec![0.0; 6];
    element.map_dofs(&mut dof_values, &vals, &coordinate_dofs, CellOrientation::Preserved, &mapping);
    assert_eq!(dof_values, vec![0.0, 10.0, 20.0, 31.0, 41.0, 51.0]);
}

proptest! {
    #[test]
    fn lagrange_bases_are_partitions_of_unity(
        (element, points) in (0..nodal_elements().len())
            .prop_flat_map(|i| {
                let element = nodal_elements().swap_remove(i);
                let points = reference_points(element.cell_shape(), 3);
                (Just(element), points)
            })
    ) {
        let n = element.space_dimension();
        let values = evaluate(&element, 3, &points);
        for row in values.chunks(n) {
            prop_assert!((row.iter().sum::<f64>() - 1.0).abs() <= 1e-12);
        }

        if element.topological_dimension() > 0 {
            let tdim = element.topological_dimension();
            let gradients = evaluate_derivatives(&element, 1, 3, &points);
            for point_gradients in gradients.chunks(n * tdim) {
                for t in 0..tdim {
                    let sum: f64 = (0..n).map(|i| point_gradients[i * tdim + t]).sum();
                    prop_assert!(sum.abs() <= 1e-12);
                }
            }
        }
    }

    #[test]
    fn p1_gradients_reproduce_linear_functions(
        coordinate_dofs in coordinate_dofs(CellShape::Triangle, 1, 0.0),
        point in reference_point(CellShape::Triangle),
        a in proptest::collection::vec(-5.0..5.0f64, 2),
        c in -5.0..5.0f64,
    ) {
        let element = lagrange(CellShape::Triangle, 1).unwrap();
        let mapping = LagrangeCoordinateMapping::new(CellShape::Triangle, 1).unwrap();
        let gradients = physical_values(&element, &mapping, 1, &point, &coordinate_dofs);
        let f = |x: &[f64]| a[0] * x[0] + a[1] * x[1] + c;
        let mut gradient = [0.0; 2];
        for i in 0..3 {
            let f_i = f(&coordinate_dofs[2 * i..2 * i + 2]);
            gradient[0] += f_i * gradients[2 * i];
            gradient[1] += f_i * gradients[2 * i + 1];
        }
        prop_assert!((gradient[0] - a[0]).abs() <= 1e-9 * (1.0 + a[0].abs()));
        prop_assert!((gradient[1] - a[1]).abs() <= 1e-9 * (1.0 + a[1].abs()));
    }

    #[test]
    fn map_dofs_inverts_piola_transforms(
        coordinate_dofs in coordinate_dofs(CellShape::Triangle, 1, 0.0),
        point in reference_point(CellShape::Triangle),
        v in proptest::collection::vec(-5.0..5.0f64, 2),
    ) {
        // Both spaces contain the constants, so interpolating a constant field reproduces it
        let mapping = LagrangeCoordinateMapping::new(CellShape::Triangle, 1).unwrap();
        for element in [
            raviart_thomas(CellShape::Triangle, 1).unwrap(),
            nedelec_first_kind(CellShape::Triangle, 1).unwrap(),
        ] {
            let vals: Vec<f64> = (0..3).flat_map(|_| v.clone()).collect();
            let mut dof_values = vec![0.0; 3];
            element.map_dofs(&mut dof_values, &vals, &coordinate_dofs, CellOrientation::Preserved, &mapping);

            let basis = physical_values(&element, &mapping, 0, &point, &coordinate_dofs);
            let mut u = [0.0; 2];
            for i in 0..3 {
                u[0] += dof_values[i] * basis[2 * i];
                u[1] += dof_values[i] * basis[2 * i + 1];
            }
            prop_assert!((u[0] - v[0]).abs() <= 1e-8 * (1.0 + v[0].abs()), "{}", element.signature());
            prop_assert!((u[1] - v[1]).abs() <= 1e-8 * (1.0 + v[1].abs()), "{}", element.signature());
        }
    }
}
