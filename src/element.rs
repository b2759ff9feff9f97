//! Finite elements: local function-space bases, independent of any mesh.
use crate::cell::{CellOrientation, CellShape};
use crate::coordinate_mapping::CoordinateMapping;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

mod definition;
mod families;
mod mixed;

pub use definition::*;
pub use families::*;
pub use mixed::*;

/// The highest derivative order the elements in this crate tabulate.
pub const MAX_DERIVATIVE_ORDER: usize = 4;

/// Errors reported by basis evaluation requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasisEvaluationError {
    /// The requested derivative order is not supported by the element.
    UnsupportedDerivativeOrder { order: usize, max_order: usize },
    /// The element does not associate reference points with its degrees of freedom.
    DofCoordinatesUndefined { signature: String },
}

impl Display for BasisEvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BasisEvaluationError::UnsupportedDerivativeOrder { order, max_order } => write!(
                f,
                "Derivatives of order {} requested, but at most order {} is supported.",
                order, max_order
            ),
            BasisEvaluationError::DofCoordinatesUndefined { signature } => {
                write!(f, "Reference dof coordinates are not defined for element {}.", signature)
            }
        }
    }
}

impl Error for BasisEvaluationError {}

/// Errors produced when constructing element definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementError {
    Unsupported {
        family: String,
        shape: CellShape,
        degree: usize,
    },
    InvalidComposite(String),
}

impl Display for ElementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementError::Unsupported { family, shape, degree } => write!(
                f,
                "No {} element of degree {} is available on a {}.",
                family,
                degree,
                shape.name()
            ),
            ElementError::InvalidComposite(msg) => write!(f, "Invalid composite element: {}", msg),
        }
    }
}

impl Error for ElementError {}

/// How reference basis values are pulled back to the physical cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasisMapping {
    /// Values are copied unchanged.
    Affine,
    /// `v = (1 / detJ) J V`, preserving normal components (H(div)).
    ContravariantPiola,
    /// `v = K^T V`, preserving tangential components (H(curl)).
    CovariantPiola,
}

impl BasisMapping {
    pub fn name(&self) -> &'static str {
        match self {
            BasisMapping::Affine => "affine",
            BasisMapping::ContravariantPiola => "contravariant Piola",
            BasisMapping::CovariantPiola => "covariant Piola",
        }
    }
}

/// The number of derivatives of order `order` in `dim` variables, counting every ordered
/// index tuple.
pub fn num_derivatives(dim: usize, order: usize) -> usize {
    dim.pow(order as u32)
}

/// All ordered index tuples of length `order` with entries in `0 .. dim`, last index varying
/// fastest.
///
/// Order zero yields a single empty tuple.
pub fn derivative_combinations(dim: usize, order: usize) -> Vec<Vec<usize>> {
    if order == 0 {
        vec![Vec::new()]
    } else {
        (0..order)
            .map(|_| 0..dim)
            .multi_cartesian_product()
            .collect()
    }
}

/// A local function-space basis on a reference cell.
///
/// All buffers are flat, row-major `f64` slices whose layout is given per method. Buffer
/// lengths are checked and a wrong length is a programming error that panics.
///
/// Implementations must be free of shared mutable state, so that independently created
/// instances can be used concurrently.
#[allow(non_snake_case)]
pub trait FiniteElement: Send {
    /// A string uniquely identifying the element definition.
    fn signature(&self) -> &str;

    fn cell_shape(&self) -> CellShape;

    fn topological_dimension(&self) -> usize;

    fn geometric_dimension(&self) -> usize;

    /// The number of local basis functions.
    fn space_dimension(&self) -> usize;

    fn value_rank(&self) -> usize;

    /// The extent of the value shape along axis `i`. Axes beyond the rank have extent 1.
    fn value_dimension(&self, i: usize) -> usize;

    fn value_size(&self) -> usize {
        (0..self.value_rank())
            .map(|i| self.value_dimension(i))
            .product()
    }

    fn reference_value_rank(&self) -> usize;

    fn reference_value_dimension(&self, i: usize) -> usize;

    fn reference_value_size(&self) -> usize {
        (0..self.reference_value_rank())
            .map(|i| self.reference_value_dimension(i))
            .product()
    }

    /// The maximum polynomial degree of the basis.
    fn degree(&self) -> usize;

    fn family(&self) -> &str;

    /// Evaluates all basis functions at `num_points` reference points.
    ///
    /// `X` is laid out `[num_points][tdim]` and `reference_values` as
    /// `[num_points][space_dimension][reference_value_size]`.
    fn evaluate_reference_basis(
        &self,
        reference_values: &mut [f64],
        num_points: usize,
        X: &[f64],
    ) -> Result<(), BasisEvaluationError>;

    /// Evaluates all partial derivatives of exactly order `order`.
    ///
    /// `reference_values` is laid out
    /// `[num_points][space_dimension][tdim^order][reference_value_size]`, with derivatives
    /// enumerated as in [`derivative_combinations`].
    fn evaluate_reference_basis_derivatives(
        &self,
        reference_values: &mut [f64],
        order: usize,
        num_points: usize,
        X: &[f64],
    ) -> Result<(), BasisEvaluationError>;

    /// Pulls reference derivatives of order `order` back to the physical cell.
    ///
    /// `reference_values` is the output of
    /// [`evaluate_reference_basis_derivatives`](Self::evaluate_reference_basis_derivatives).
    /// `values` is laid out `[num_points][space_dimension][gdim^order][value_size]`.
    /// `J` is `[num_points][gdim][tdim]`, `detJ` is `[num_points]` and `K` is
    /// `[num_points][tdim][gdim]`.
    #[allow(clippy::too_many_arguments)]
    fn transform_reference_basis_derivatives(
        &self,
        values: &mut [f64],
        order: usize,
        num_points: usize,
        reference_values: &[f64],
        X: &[f64],
        J: &[f64],
        detJ: &[f64],
        K: &[f64],
        cell_orientation: CellOrientation,
    ) -> Result<(), BasisEvaluationError>;

    /// Applies the degrees of freedom to a physical function.
    ///
    /// `vals` is laid out `[space_dimension][value_size]`, row `i` being the function value at
    /// the physical image of the reference point of dof `i`. The resulting dof values are
    /// written to `values`, which has length `space_dimension`.
    fn map_dofs(
        &self,
        values: &mut [f64],
        vals: &[f64],
        coordinate_dofs: &[f64],
        cell_orientation: CellOrientation,
        coordinate_mapping: &dyn CoordinateMapping,
    );

    /// Writes the reference point associated with each dof, laid out `[space_dimension][tdim]`.
    ///
    /// Elements whose dofs are not associated with points report
    /// [`BasisEvaluationError::DofCoordinatesUndefined`].
    fn tabulate_reference_dof_coordinates(
        &self,
        _reference_dof_coordinates: &mut [f64],
    ) -> Result<(), BasisEvaluationError> {
        Err(BasisEvaluationError::DofCoordinatesUndefined {
            signature: self.signature().to_string(),
        })
    }

    /// The number of sub-elements. Zero for an element that is not a composite.
    fn num_sub_elements(&self) -> usize;

    fn create_sub_element(&self, i: usize) -> Option<Box<dyn FiniteElement>>;

    /// Creates a new, independently owned instance of the same element.
    fn create(&self) -> Box<dyn FiniteElement>;
}
