use crate::cell::{CellOrientation, CellShape};
use crate::coordinate_mapping::CoordinateMapping;
use crate::element::{
    derivative_combinations, num_derivatives, BasisEvaluationError, BasisMapping, FiniteElement, MAX_DERIVATIVE_ORDER,
};
use crate::polynomial::Polynomial;
use itertools::izip;

/// The mesh entity a degree of freedom is attached to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DofEntity {
    /// Sub-entity `index` of dimension `dim` of the reference cell.
    Entity { dim: usize, index: usize },
    /// A mesh-independent, global degree of freedom.
    Global,
}

/// The linear functional defining a degree of freedom.
#[derive(Debug, Clone, PartialEq)]
pub enum DofFunctional {
    /// Evaluation of one physical component at a point.
    PointEvaluation,
    /// Flux `|f| v.n` through a facet with unit normal `n` and volume `|f|`.
    NormalMoment { normal: Vec<f64>, scale: f64 },
    /// Circulation `|e| v.t` along an edge with unit tangent `t` and length `|e|`.
    TangentMoment { tangent: Vec<f64>, scale: f64 },
}

/// One basis function of an [`ElementDefinition`] together with its dual functional.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisFunction {
    /// Reference components, placed starting at `reference_offset`.
    pub components: Vec<Polynomial>,
    pub mapping: BasisMapping,
    pub reference_offset: usize,
    /// First physical component written by the pulled-back function.
    pub physical_offset: usize,
    /// Reference point at which the dof functional is evaluated.
    pub point: Vec<f64>,
    pub functional: DofFunctional,
    pub entity: DofEntity,
}

impl BasisFunction {
    /// The number of physical components produced by the mapping of this function.
    pub fn num_physical_components(&self, gdim: usize) -> usize {
        match self.mapping {
            BasisMapping::Affine => self.components.len(),
            BasisMapping::ContravariantPiola | BasisMapping::CovariantPiola => gdim,
        }
    }
}

/// A finite element described by explicit polynomial basis functions.
///
/// Composite elements (mixed, vector, tensor) flatten the bases of their sub-elements with
/// shifted component offsets and keep the sub-elements around for
/// [`FiniteElement::create_sub_element`].
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDefinition {
    pub(crate) signature: String,
    pub(crate) family: String,
    pub(crate) shape: CellShape,
    pub(crate) geometric_dimension: usize,
    pub(crate) degree: usize,
    pub(crate) value_shape: Vec<usize>,
    pub(crate) reference_value_shape: Vec<usize>,
    pub(crate) basis: Vec<BasisFunction>,
    pub(crate) sub_elements: Vec<ElementDefinition>,
}

impl ElementDefinition {
    pub fn basis(&self) -> &[BasisFunction] {
        &self.basis
    }

    pub fn sub_elements(&self) -> &[ElementDefinition] {
        &self.sub_elements
    }

    pub fn value_shape(&self) -> &[usize] {
        &self.value_shape
    }

    pub fn reference_value_shape(&self) -> &[usize] {
        &self.reference_value_shape
    }

    pub fn is_composite(&self) -> bool {
        !self.sub_elements.is_empty()
    }

    /// Tabulates derivatives for the given derivative combinations without checking the order.
    ///
    /// The layout of `reference_values` is
    /// `[num_points][space_dimension][combinations.len()][reference_value_size]`.
    #[allow(non_snake_case)]
    pub(crate) fn tabulate_into(
        &self,
        reference_values: &mut [f64],
        combinations: &[Vec<usize>],
        num_points: usize,
        X: &[f64],
    ) {
        let tdim = self.shape.topological_dimension();
        let space_dim = self.space_dimension();
        let ref_size = self.reference_value_size();
        let num_derivs = combinations.len();
        assert_eq!(X.len(), num_points * tdim, "Reference points must have length num_points * tdim.");
        assert_eq!(
            reference_values.len(),
            num_points * space_dim * num_derivs * ref_size,
            "Reference value buffer has wrong length."
        );

        reference_values.fill(0.0);
        let derivatives: Vec<Vec<Polynomial>> = self
            .basis
            .iter()
            .map(|phi| {
                combinations
                    .iter()
                    .flat_map(|comb| phi.components.iter().map(move |p| p.mixed_derivative(comb)))
                    .collect()
            })
            .collect();

        for p in 0..num_points {
            let point = &X[p * tdim..(p + 1) * tdim];
            for (d, (phi, dphi)) in self.basis.iter().zip(&derivatives).enumerate() {
                let n_comp = phi.components.len();
                for s in 0..num_derivs {
                    let base = ((p * space_dim + d) * num_derivs + s) * ref_size + phi.reference_offset;
                    for c in 0..n_comp {
                        reference_values[base + c] = dphi[s * n_comp + c].evaluate(point);
                    }
                }
            }
        }
    }
}

#[allow(non_snake_case)]
impl FiniteElement for ElementDefinition {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn cell_shape(&self) -> CellShape {
        self.shape
    }

    fn topological_dimension(&self) -> usize {
        self.shape.topological_dimension()
    }

    fn geometric_dimension(&self) -> usize {
        self.geometric_dimension
    }

    fn space_dimension(&self) -> usize {
        self.basis.len()
    }

    fn value_rank(&self) -> usize {
        self.value_shape.len()
    }

    fn value_dimension(&self, i: usize) -> usize {
        self.value_shape.get(i).copied().unwrap_or(1)
    }

    fn reference_value_rank(&self) -> usize {
        self.reference_value_shape.len()
    }

    fn reference_value_dimension(&self, i: usize) -> usize {
        self.reference_value_shape.get(i).copied().unwrap_or(1)
    }

    fn degree(&self) -> usize {
        self.degree
    }

    fn family(&self) -> &str {
        &self.family
    }

    fn evaluate_reference_basis(
        &self,
        reference_values: &mut [f64],
        num_points: usize,
        X: &[f64],
    ) -> Result<(), BasisEvaluationError> {
        self.tabulate_into(reference_values, &derivative_combinations(0, 0), num_points, X);
        Ok(())
    }

    fn evaluate_reference_basis_derivatives(
        &self,
        reference_values: &mut [f64],
        order: usize,
        num_points: usize,
        X: &[f64],
    ) -> Result<(), BasisEvaluationError> {
        if order > MAX_DERIVATIVE_ORDER {
            return Err(BasisEvaluationError::UnsupportedDerivativeOrder {
                order,
                max_order: MAX_DERIVATIVE_ORDER,
            });
        }
        let combinations = derivative_combinations(self.topological_dimension(), order);
        self.tabulate_into(reference_values, &combinations, num_points, X);
        Ok(())
    }

    fn transform_reference_basis_derivatives(
        &self,
        values: &mut [f64],
        order: usize,
        num_points: usize,
        reference_values: &[f64],
        _X: &[f64],
        J: &[f64],
        detJ: &[f64],
        K: &[f64],
        _cell_orientation: CellOrientation,
    ) -> Result<(), BasisEvaluationError> {
        if order > MAX_DERIVATIVE_ORDER {
            return Err(BasisEvaluationError::UnsupportedDerivativeOrder {
                order,
                max_order: MAX_DERIVATIVE_ORDER,
            });
        }

        let tdim = self.topological_dimension();
        let gdim = self.geometric_dimension;
        let space_dim = self.space_dimension();
        let ref_size = self.reference_value_size();
        let phys_size = self.value_size();
        let combinations_t = derivative_combinations(tdim, order);
        let combinations_g = derivative_combinations(gdim, order);
        let num_derivs_t = num_derivatives(tdim, order);
        let num_derivs_g = num_derivatives(gdim, order);

        assert_eq!(J.len(), num_points * gdim * tdim, "J must have length num_points * gdim * tdim.");
        assert_eq!(K.len(), num_points * tdim * gdim, "K must have length num_points * tdim * gdim.");
        assert_eq!(detJ.len(), num_points, "detJ must have length num_points.");
        assert_eq!(
            reference_values.len(),
            num_points * space_dim * num_derivs_t * ref_size,
            "Reference value buffer has wrong length."
        );
        assert_eq!(
            values.len(),
            num_points * space_dim * num_derivs_g * phys_size,
            "Physical value buffer has wrong length."
        );

        values.fill(0.0);
        let mut transform = vec![1.0; num_derivs_g * num_derivs_t];
        for ip in 0..num_points {
            let J = &J[ip * gdim * tdim..(ip + 1) * gdim * tdim];
            let K = &K[ip * tdim * gdim..(ip + 1) * tdim * gdim];
            let detJ = detJ[ip];

            // Each entry is a product of K entries, one factor per derivative direction
            for (r, comb_g) in combinations_g.iter().enumerate() {
                for (s, comb_t) in combinations_t.iter().enumerate() {
                    transform[r * num_derivs_t + s] = izip!(comb_t, comb_g)
                        .map(|(&t, &g)| K[t * gdim + g])
                        .product();
                }
            }

            for (d, phi) in self.basis.iter().enumerate() {
                let n_ref = phi.components.len();
                for s in 0..num_derivs_t {
                    let reference = &reference_values[((ip * space_dim + d) * num_derivs_t + s) * ref_size..]
                        [phi.reference_offset..phi.reference_offset + n_ref];
                    for i in 0..phi.num_physical_components(gdim) {
                        let mapped_value = match phi.mapping {
                            BasisMapping::Affine => reference[i],
                            BasisMapping::ContravariantPiola => {
                                (0..tdim).map(|j| J[i * tdim + j] * reference[j]).sum::<f64>() / detJ
                            }
                            BasisMapping::CovariantPiola => (0..tdim).map(|j| K[j * gdim + i] * reference[j]).sum(),
                        };
                        for r in 0..num_derivs_g {
                            let index = ((ip * space_dim + d) * num_derivs_g + r) * phys_size + phi.physical_offset + i;
                            values[index] += transform[r * num_derivs_t + s] * mapped_value;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn map_dofs(
        &self,
        values: &mut [f64],
        vals: &[f64],
        coordinate_dofs: &[f64],
        cell_orientation: CellOrientation,
        coordinate_mapping: &dyn CoordinateMapping,
    ) {
        let tdim = self.topological_dimension();
        let gdim = self.geometric_dimension;
        let value_size = self.value_size();
        assert_eq!(values.len(), self.space_dimension(), "Dof value buffer has wrong length.");
        assert_eq!(
            vals.len(),
            self.space_dimension() * value_size,
            "Function value buffer must have length space_dimension * value_size."
        );
        assert_eq!(coordinate_mapping.topological_dimension(), tdim);
        assert_eq!(coordinate_mapping.geometric_dimension(), gdim);

        let mut jacobian = vec![0.0; gdim * tdim];
        let mut inverse = vec![0.0; tdim * gdim];
        let mut determinant = [0.0];
        for (i, (phi, value)) in self.basis.iter().zip(values.iter_mut()).enumerate() {
            let v = &vals[i * value_size + phi.physical_offset..];
            *value = match &phi.functional {
                DofFunctional::PointEvaluation => v[0],
                DofFunctional::NormalMoment { normal, scale } => {
                    coordinate_mapping.compute_jacobians(&mut jacobian, 1, &phi.point, coordinate_dofs);
                    coordinate_mapping.compute_jacobian_determinants(&mut determinant, 1, &jacobian, cell_orientation);
                    coordinate_mapping.compute_jacobian_inverses(&mut inverse, 1, &jacobian, &determinant);
                    // v.(K^T n)
                    let flux: f64 = (0..gdim)
                        .map(|g| v[g] * (0..tdim).map(|t| inverse[t * gdim + g] * normal[t]).sum::<f64>())
                        .sum();
                    scale * determinant[0] * flux
                }
                DofFunctional::TangentMoment { tangent, scale } => {
                    coordinate_mapping.compute_jacobians(&mut jacobian, 1, &phi.point, coordinate_dofs);
                    // v.(J t)
                    let circulation: f64 = (0..gdim)
                        .map(|g| v[g] * (0..tdim).map(|t| jacobian[g * tdim + t] * tangent[t]).sum::<f64>())
                        .sum();
                    scale * circulation
                }
            };
        }
    }

    fn tabulate_reference_dof_coordinates(
        &self,
        reference_dof_coordinates: &mut [f64],
    ) -> Result<(), BasisEvaluationError> {
        let tdim = self.topological_dimension();
        assert_eq!(
            reference_dof_coordinates.len(),
            self.space_dimension() * tdim,
            "Dof coordinate buffer must have length space_dimension * tdim."
        );
        for (phi, coords) in self
            .basis
            .iter()
            .zip(reference_dof_coordinates.chunks_exact_mut(tdim.max(1)))
        {
            coords[..tdim].copy_from_slice(&phi.point);
        }
        Ok(())
    }

    fn num_sub_elements(&self) -> usize {
        self.sub_elements.len()
    }

    fn create_sub_element(&self, i: usize) -> Option<Box<dyn FiniteElement>> {
        self.sub_elements
            .get(i)
            .map(|element| Box::new(element.clone()) as Box<dyn FiniteElement>)
    }

    fn create(&self) -> Box<dyn FiniteElement> {
        Box::new(self.clone())
    }
}
