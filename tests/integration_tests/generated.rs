//! Hand-written stand-in for the output of a form compiler: P1 kernels on triangles.
//!
//! - `mass_stiffness`: `a(u, v) = u v dx + grad u . grad v dx(1)`
//! - `load`: `L(v; g, f) = f v dx + g v ds`, with `f` in P1 and `g` in R
//! - `measures`: the functional of cell areas, facet lengths, point values of `u` and custom
//!   quadrature volumes
use fenris_form::cell::{CellOrientation, CellShape};
use fenris_form::coordinate_mapping::{CoordinateMapping, LagrangeCoordinateMapping};
use fenris_form::dofmap::{Dofmap, ElementDofmap};
use fenris_form::element::{lagrange, real, FiniteElement};
use fenris_form::form::{CompiledForm, Form, FormBuilder};
use fenris_form::integral::{
    check_coefficients, CellIntegral, Coefficients, CustomIntegral, CustomQuadrature, ExteriorFacetIntegral, Integral,
    InteriorFacetIntegral, VertexIntegral,
};
use fenris_form::registry::{FormRecord, FunctionSpaceRecord, GeneratedUnit};
use fenris_form::version::version_string;

/// The Jacobian `[[x1 - x0, x2 - x0], [y1 - y0, y2 - y0]]` of a P1 triangle and its determinant.
#[allow(non_snake_case)]
fn triangle_jacobian(coordinate_dofs: &[f64]) -> ([f64; 4], f64) {
    let x = coordinate_dofs;
    let J = [x[2] - x[0], x[4] - x[0], x[3] - x[1], x[5] - x[1]];
    (J, J[0] * J[3] - J[1] * J[2])
}

/// Physical gradients of the barycentric basis, `[vertex][2]`.
#[allow(non_snake_case)]
fn basis_gradients(coordinate_dofs: &[f64]) -> [[f64; 2]; 3] {
    let (J, detJ) = triangle_jacobian(coordinate_dofs);
    let K = [J[3] / detJ, -J[1] / detJ, -J[2] / detJ, J[0] / detJ];
    let reference = [[-1.0, -1.0], [1.0, 0.0], [0.0, 1.0]];
    reference.map(|g| [K[0] * g[0] + K[2] * g[1], K[1] * g[0] + K[3] * g[1]])
}

fn facet_length(coordinate_dofs: &[f64], facet: usize) -> f64 {
    let vertices = CellShape::Triangle.entity_vertices(1, facet);
    let (a, b) = (vertices[0], vertices[1]);
    let dx = coordinate_dofs[2 * b] - coordinate_dofs[2 * a];
    let dy = coordinate_dofs[2 * b + 1] - coordinate_dofs[2 * a + 1];
    (dx * dx + dy * dy).sqrt()
}

#[allow(non_snake_case)]
fn mass_matrix(coordinate_dofs: &[f64]) -> [f64; 9] {
    let (_, detJ) = triangle_jacobian(coordinate_dofs);
    let mut M = [0.0; 9];
    for i in 0..3 {
        for j in 0..3 {
            M[3 * i + j] = detJ.abs() / 24.0 * if i == j { 2.0 } else { 1.0 };
        }
    }
    M
}

pub struct MassKernel;

impl Integral for MassKernel {
    fn enabled_coefficients(&self) -> &[bool] {
        &[]
    }
}

#[allow(non_snake_case)]
impl CellIntegral for MassKernel {
    fn tabulate_tensor(&self, A: &mut [f64], w: &Coefficients, coordinate_dofs: &[f64], _: CellOrientation) {
        check_coefficients(self.enabled_coefficients(), w);
        A.copy_from_slice(&mass_matrix(coordinate_dofs));
    }
}

pub struct StiffnessKernel;

impl Integral for StiffnessKernel {
    fn enabled_coefficients(&self) -> &[bool] {
        &[]
    }
}

#[allow(non_snake_case)]
impl CellIntegral for StiffnessKernel {
    fn tabulate_tensor(&self, A: &mut [f64], w: &Coefficients, coordinate_dofs: &[f64], _: CellOrientation) {
        check_coefficients(self.enabled_coefficients(), w);
        let (_, detJ) = triangle_jacobian(coordinate_dofs);
        let gradients = basis_gradients(coordinate_dofs);
        for i in 0..3 {
            for j in 0..3 {
                let dot = gradients[i][0] * gradients[j][0] + gradients[i][1] * gradients[j][1];
                A[3 * i + j] = 0.5 * detJ.abs() * dot;
            }
        }
    }
}

/// `f v dx`, reading coefficient 0.
pub struct SourceKernel;

impl Integral for SourceKernel {
    fn enabled_coefficients(&self) -> &[bool] {
        &[true, false]
    }
}

#[allow(non_snake_case)]
impl CellIntegral for SourceKernel {
    fn tabulate_tensor(&self, A: &mut [f64], w: &Coefficients, coordinate_dofs: &[f64], _: CellOrientation) {
        check_coefficients(self.enabled_coefficients(), w);
        let f = w[0].unwrap_or_default();
        let M = mass_matrix(coordinate_dofs);
        for i in 0..3 {
            A[i] = (0..3).map(|j| M[3 * i + j] * f[j]).sum();
        }
    }
}

/// `g v ds`, reading coefficient 1.
pub struct BoundaryKernel;

impl Integral for BoundaryKernel {
    fn enabled_coefficients(&self) -> &[bool] {
        &[false, true]
    }
}

#[allow(non_snake_case)]
impl ExteriorFacetIntegral for BoundaryKernel {
    fn tabulate_tensor(
        &self,
        A: &mut [f64],
        w: &Coefficients,
        coordinate_dofs: &[f64],
        facet: usize,
        _: CellOrientation,
    ) {
        check_coefficients(self.enabled_coefficients(), w);
        let g = w[1].unwrap_or_default()[0];
        let length = facet_length(coordinate_dofs, facet);
        for (i, a) in A.iter_mut().enumerate() {
            // The vertex opposite to the facet does not touch it
            *a = if i == facet { 0.0 } else { 0.5 * g * length };
        }
    }
}

pub struct AreaKernel;

impl Integral for AreaKernel {
    fn enabled_coefficients(&self) -> &[bool] {
        &[false]
    }
}

#[allow(non_snake_case)]
impl CellIntegral for AreaKernel {
    fn tabulate_tensor(&self, A: &mut [f64], w: &Coefficients, coordinate_dofs: &[f64], _: CellOrientation) {
        check_coefficients(self.enabled_coefficients(), w);
        A[0] = 0.5 * triangle_jacobian(coordinate_dofs).1.abs();
    }
}

pub struct FacetLengthKernel;

impl Integral for FacetLengthKernel {
    fn enabled_coefficients(&self) -> &[bool] {
        &[false]
    }
}

#[allow(non_snake_case)]
impl ExteriorFacetIntegral for FacetLengthKernel {
    fn tabulate_tensor(
        &self,
        A: &mut [f64],
        w: &Coefficients,
        coordinate_dofs: &[f64],
        facet: usize,
        _: CellOrientation,
    ) {
        check_coefficients(self.enabled_coefficients(), w);
        A[0] = facet_length(coordinate_dofs, facet);
    }
}

/// The length of an interior facet, averaged over both sides.
pub struct SharedFacetKernel;

impl Integral for SharedFacetKernel {
    fn enabled_coefficients(&self) -> &[bool] {
        &[false]
    }
}

#[allow(non_snake_case)]
impl InteriorFacetIntegral for SharedFacetKernel {
    fn tabulate_tensor(
        &self,
        A: &mut [f64],
        w: &Coefficients,
        coordinate_dofs_0: &[f64],
        coordinate_dofs_1: &[f64],
        facet_0: usize,
        facet_1: usize,
        _: CellOrientation,
        _: CellOrientation,
    ) {
        check_coefficients(self.enabled_coefficients(), w);
        A[0] = 0.5 * (facet_length(coordinate_dofs_0, facet_0) + facet_length(coordinate_dofs_1, facet_1));
    }
}

/// The value of `u` at a vertex.
pub struct PointValueKernel;

impl Integral for PointValueKernel {
    fn enabled_coefficients(&self) -> &[bool] {
        &[true]
    }
}

#[allow(non_snake_case)]
impl VertexIntegral for PointValueKernel {
    fn tabulate_tensor(&self, A: &mut [f64], w: &Coefficients, _: &[f64], vertex: usize, _: CellOrientation) {
        check_coefficients(self.enabled_coefficients(), w);
        A[0] = w[0].unwrap_or_default()[vertex];
    }
}

/// The volume covered by a caller-supplied quadrature rule.
pub struct QuadratureVolumeKernel;

impl Integral for QuadratureVolumeKernel {
    fn enabled_coefficients(&self) -> &[bool] {
        &[false]
    }
}

#[allow(non_snake_case)]
impl CustomIntegral for QuadratureVolumeKernel {
    fn num_cells(&self) -> usize {
        1
    }

    fn tabulate_tensor(
        &self,
        A: &mut [f64],
        w: &Coefficients,
        coordinate_dofs: &[f64],
        quadrature: &CustomQuadrature,
        _: CellOrientation,
    ) {
        check_coefficients(self.enabled_coefficients(), w);
        let detJ = triangle_jacobian(coordinate_dofs).1.abs();
        A[0] = quadrature.weights.iter().map(|w| w * detJ).sum();
    }
}

fn mass_kernel() -> Box<dyn CellIntegral> {
    Box::new(MassKernel)
}

fn stiffness_kernel() -> Box<dyn CellIntegral> {
    Box::new(StiffnessKernel)
}

fn source_kernel() -> Box<dyn CellIntegral> {
    Box::new(SourceKernel)
}

fn boundary_kernel() -> Box<dyn ExteriorFacetIntegral> {
    Box::new(BoundaryKernel)
}

fn area_kernel() -> Box<dyn CellIntegral> {
    Box::new(AreaKernel)
}

fn facet_length_kernel() -> Box<dyn ExteriorFacetIntegral> {
    Box::new(FacetLengthKernel)
}

fn shared_facet_kernel() -> Box<dyn InteriorFacetIntegral> {
    Box::new(SharedFacetKernel)
}

fn point_value_kernel() -> Box<dyn VertexIntegral> {
    Box::new(PointValueKernel)
}

fn quadrature_volume_kernel() -> Box<dyn CustomIntegral> {
    Box::new(QuadratureVolumeKernel)
}

pub fn coordinate_mapping() -> LagrangeCoordinateMapping {
    LagrangeCoordinateMapping::new(CellShape::Triangle, 1).unwrap()
}

fn create_p1_element() -> Box<dyn FiniteElement> {
    Box::new(lagrange(CellShape::Triangle, 1).unwrap())
}

fn create_p1_dofmap() -> Box<dyn Dofmap> {
    Box::new(ElementDofmap::new(&lagrange(CellShape::Triangle, 1).unwrap()))
}

fn create_coordinate_mapping() -> Box<dyn CoordinateMapping> {
    Box::new(coordinate_mapping())
}

pub const P1_SPACE: FunctionSpaceRecord = FunctionSpaceRecord {
    create_finite_element: create_p1_element,
    create_dofmap: create_p1_dofmap,
    create_coordinate_mapping,
};

pub fn mass_stiffness_form() -> CompiledForm {
    FormBuilder::new("mass_stiffness")
        .with_coordinate_mapping(coordinate_mapping())
        .with_argument_space(P1_SPACE)
        .with_argument_space(P1_SPACE)
        .with_cell_integral(None, mass_kernel)
        .with_cell_integral(Some(1), stiffness_kernel)
        .build()
        .unwrap()
}

pub fn load_form() -> CompiledForm {
    FormBuilder::new("load")
        .with_coordinate_mapping(coordinate_mapping())
        .with_argument_space(P1_SPACE)
        .with_coefficient_space(1, P1_SPACE)
        .with_coefficient(0, real(CellShape::Triangle))
        .with_cell_integral(None, source_kernel)
        .with_exterior_facet_integral(None, boundary_kernel)
        .build()
        .unwrap()
}

pub fn measures_form() -> CompiledForm {
    FormBuilder::new("measures")
        .with_coordinate_mapping(coordinate_mapping())
        .with_coefficient_space(0, P1_SPACE)
        .with_cell_integral(None, area_kernel)
        .with_exterior_facet_integral(None, facet_length_kernel)
        .with_interior_facet_integral(None, shared_facet_kernel)
        .with_vertex_integral(None, point_value_kernel)
        .with_custom_integral(Some(0), quadrature_volume_kernel)
        .build()
        .unwrap()
}

fn create_mass_stiffness_form() -> Box<dyn Form> {
    Box::new(mass_stiffness_form())
}

fn create_load_form() -> Box<dyn Form> {
    Box::new(load_form())
}

fn create_measures_form() -> Box<dyn Form> {
    Box::new(measures_form())
}

fn no_coefficient_name(_: usize) -> Option<&'static str> {
    None
}

fn no_coefficient_number(_: &str) -> Option<usize> {
    None
}

fn load_coefficient_name(i: usize) -> Option<&'static str> {
    match i {
        0 => Some("f"),
        1 => Some("g"),
        _ => None,
    }
}

fn load_coefficient_number(name: &str) -> Option<usize> {
    match name {
        "f" => Some(0),
        "g" => Some(1),
        _ => None,
    }
}

fn measures_coefficient_name(i: usize) -> Option<&'static str> {
    (i == 0).then_some("u")
}

fn measures_coefficient_number(name: &str) -> Option<usize> {
    (name == "u").then_some(0)
}

pub const MASS_STIFFNESS: FormRecord = FormRecord {
    create_form: create_mass_stiffness_form,
    coefficient_name_map: no_coefficient_name,
    coefficient_number_map: no_coefficient_number,
};

pub const LOAD: FormRecord = FormRecord {
    create_form: create_load_form,
    coefficient_name_map: load_coefficient_name,
    coefficient_number_map: load_coefficient_number,
};

pub const MEASURES: FormRecord = FormRecord {
    create_form: create_measures_form,
    coefficient_name_map: measures_coefficient_name,
    coefficient_number_map: measures_coefficient_number,
};

pub fn unit() -> GeneratedUnit {
    GeneratedUnit {
        version: version_string(),
        function_spaces: vec![("p1_triangle", P1_SPACE)],
        forms: vec![("mass_stiffness", MASS_STIFFNESS), ("load", LOAD), ("measures", MEASURES)],
    }
}

/// A uniform mesh of the unit square with `2 n^2` positively oriented triangles.
pub struct UnitSquare {
    pub n: usize,
    pub vertices: Vec<[f64; 2]>,
    pub cells: Vec<[usize; 3]>,
}

impl UnitSquare {
    pub fn new(n: usize) -> Self {
        let h = 1.0 / n as f64;
        let index = |i: usize, j: usize| j * (n + 1) + i;
        let vertices = (0..=n)
            .flat_map(|j| (0..=n).map(move |i| [i as f64 * h, j as f64 * h]))
            .collect();
        let cells = (0..n)
            .flat_map(|j| (0..n).map(move |i| (i, j)))
            .flat_map(|(i, j)| {
                let (v00, v10, v01, v11) = (index(i, j), index(i + 1, j), index(i, j + 1), index(i + 1, j + 1));
                [[v00, v10, v01], [v10, v11, v01]]
            })
            .collect();
        Self { n, vertices, cells }
    }

    pub fn coordinate_dofs(&self, cell: usize) -> Vec<f64> {
        self.cells[cell]
            .iter()
            .flat_map(|&v| self.vertices[v])
            .collect()
    }

    /// Gathers the values of a P1 field at the vertices of `cell`.
    pub fn restrict(&self, cell: usize, field: &[f64]) -> Vec<f64> {
        self.cells[cell].iter().map(|&v| field[v]).collect()
    }
}
