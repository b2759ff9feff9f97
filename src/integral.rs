//! Local tensor kernels.
//!
//! Each kernel declares which coefficients it reads through
//! [`Integral::enabled_coefficients`]. The coefficient array `w` passed to `tabulate_tensor` must
//! have exactly that many entries; entries whose mask is `false` may be `None` and are never read.
use crate::cell::CellOrientation;
use eyre::eyre;
use serde::{Deserialize, Serialize};

/// The kinds of integrals a form may contain, in dispatch order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntegralKind {
    Cell,
    ExteriorFacet,
    InteriorFacet,
    Vertex,
    Custom,
}

impl IntegralKind {
    pub const ALL: [IntegralKind; 5] = [
        IntegralKind::Cell,
        IntegralKind::ExteriorFacet,
        IntegralKind::InteriorFacet,
        IntegralKind::Vertex,
        IntegralKind::Custom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            IntegralKind::Cell => "cell",
            IntegralKind::ExteriorFacet => "exterior_facet",
            IntegralKind::InteriorFacet => "interior_facet",
            IntegralKind::Vertex => "vertex",
            IntegralKind::Custom => "custom",
        }
    }
}

/// Per-coefficient values of one cell, `None` for coefficients the kernel does not read.
pub type Coefficients<'a> = [Option<&'a [f64]>];

/// Functionality shared by all integral kinds.
pub trait Integral: Send {
    /// For each coefficient of the form, whether this kernel reads it.
    fn enabled_coefficients(&self) -> &[bool];

    fn num_coefficients(&self) -> usize {
        self.enabled_coefficients().len()
    }
}

/// Checks a coefficient array against the mask of an integral.
///
/// # Panics
///
/// Panics if the length differs from the mask or an enabled coefficient is missing.
pub fn check_coefficients(enabled_coefficients: &[bool], w: &Coefficients) {
    assert_eq!(
        w.len(),
        enabled_coefficients.len(),
        "Coefficient array must have one entry per coefficient of the form."
    );
    for (i, (&enabled, value)) in enabled_coefficients.iter().zip(w).enumerate() {
        assert!(!enabled || value.is_some(), "Coefficient {} is enabled but missing.", i);
    }
}

/// Collects the values of enabled coefficients into an array suitable for `tabulate_tensor`,
/// taking disabled entries as `None`.
pub fn gather_coefficients<'a>(
    enabled_coefficients: &[bool],
    values: &[Option<&'a [f64]>],
) -> eyre::Result<Vec<Option<&'a [f64]>>> {
    if values.len() != enabled_coefficients.len() {
        return Err(eyre!(
            "expected values for {} coefficients, got {}",
            enabled_coefficients.len(),
            values.len()
        ));
    }
    enabled_coefficients
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (&enabled, value))| match (enabled, value) {
            (true, None) => Err(eyre!("coefficient {} is read by the integral but no values were given", i)),
            (true, Some(value)) => Ok(Some(*value)),
            (false, _) => Ok(None),
        })
        .collect()
}

/// Integral over a cell.
#[allow(non_snake_case)]
pub trait CellIntegral: Integral {
    /// Overwrites `A` with the local tensor of the cell.
    fn tabulate_tensor(
        &self,
        A: &mut [f64],
        w: &Coefficients,
        coordinate_dofs: &[f64],
        cell_orientation: CellOrientation,
    );
}

/// Integral over a boundary facet of a cell.
#[allow(non_snake_case)]
pub trait ExteriorFacetIntegral: Integral {
    fn tabulate_tensor(
        &self,
        A: &mut [f64],
        w: &Coefficients,
        coordinate_dofs: &[f64],
        facet: usize,
        cell_orientation: CellOrientation,
    );
}

/// Integral over a facet shared by two cells.
///
/// Coefficient values of the two cells are concatenated per coefficient, cell 0 first. The
/// local tensor couples the dofs of both cells, with the dofs of cell 0 first along every axis.
#[allow(non_snake_case)]
pub trait InteriorFacetIntegral: Integral {
    #[allow(clippy::too_many_arguments)]
    fn tabulate_tensor(
        &self,
        A: &mut [f64],
        w: &Coefficients,
        coordinate_dofs_0: &[f64],
        coordinate_dofs_1: &[f64],
        facet_0: usize,
        facet_1: usize,
        cell_orientation_0: CellOrientation,
        cell_orientation_1: CellOrientation,
    );
}

/// Point evaluation at a vertex of a cell.
#[allow(non_snake_case)]
pub trait VertexIntegral: Integral {
    fn tabulate_tensor(
        &self,
        A: &mut [f64],
        w: &Coefficients,
        coordinate_dofs: &[f64],
        vertex: usize,
        cell_orientation: CellOrientation,
    );
}

/// A quadrature rule supplied by the caller of a custom integral.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CustomQuadrature<'a> {
    pub num_points: usize,
    /// Reference points, `[num_points][tdim]`.
    pub points: &'a [f64],
    pub weights: &'a [f64],
    /// Facet normals at the points, `[num_points][gdim]`, or empty if not used.
    pub facet_normals: &'a [f64],
}

impl<'a> CustomQuadrature<'a> {
    pub fn new(points: &'a [f64], weights: &'a [f64], facet_normals: &'a [f64]) -> Self {
        Self {
            num_points: weights.len(),
            points,
            weights,
            facet_normals,
        }
    }
}

/// Integral over a domain described by an explicit quadrature rule, e.g. a cut cell.
#[allow(non_snake_case)]
pub trait CustomIntegral: Integral {
    /// The number of cells whose data the kernel consumes.
    fn num_cells(&self) -> usize;

    fn tabulate_tensor(
        &self,
        A: &mut [f64],
        w: &Coefficients,
        coordinate_dofs: &[f64],
        quadrature: &CustomQuadrature,
        cell_orientation: CellOrientation,
    );
}

/// An owned integral of any kind.
pub enum AnyIntegral {
    Cell(Box<dyn CellIntegral>),
    ExteriorFacet(Box<dyn ExteriorFacetIntegral>),
    InteriorFacet(Box<dyn InteriorFacetIntegral>),
    Vertex(Box<dyn VertexIntegral>),
    Custom(Box<dyn CustomIntegral>),
}

impl AnyIntegral {
    pub fn kind(&self) -> IntegralKind {
        match self {
            AnyIntegral::Cell(_) => IntegralKind::Cell,
            AnyIntegral::ExteriorFacet(_) => IntegralKind::ExteriorFacet,
            AnyIntegral::InteriorFacet(_) => IntegralKind::InteriorFacet,
            AnyIntegral::Vertex(_) => IntegralKind::Vertex,
            AnyIntegral::Custom(_) => IntegralKind::Custom,
        }
    }

    pub fn enabled_coefficients(&self) -> &[bool] {
        match self {
            AnyIntegral::Cell(integral) => integral.enabled_coefficients(),
            AnyIntegral::ExteriorFacet(integral) => integral.enabled_coefficients(),
            AnyIntegral::InteriorFacet(integral) => integral.enabled_coefficients(),
            AnyIntegral::Vertex(integral) => integral.enabled_coefficients(),
            AnyIntegral::Custom(integral) => integral.enabled_coefficients(),
        }
    }

    pub fn into_cell(self) -> Option<Box<dyn CellIntegral>> {
        match self {
            AnyIntegral::Cell(integral) => Some(integral),
            _ => None,
        }
    }

    pub fn into_exterior_facet(self) -> Option<Box<dyn ExteriorFacetIntegral>> {
        match self {
            AnyIntegral::ExteriorFacet(integral) => Some(integral),
            _ => None,
        }
    }

    pub fn into_interior_facet(self) -> Option<Box<dyn InteriorFacetIntegral>> {
        match self {
            AnyIntegral::InteriorFacet(integral) => Some(integral),
            _ => None,
        }
    }

    pub fn into_vertex(self) -> Option<Box<dyn VertexIntegral>> {
        match self {
            AnyIntegral::Vertex(integral) => Some(integral),
            _ => None,
        }
    }

    pub fn into_custom(self) -> Option<Box<dyn CustomIntegral>> {
        match self {
            AnyIntegral::Custom(integral) => Some(integral),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AnyIntegral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyIntegral")
            .field("kind", &self.kind())
            .field("enabled_coefficients", &self.enabled_coefficients())
            .finish()
    }
}
