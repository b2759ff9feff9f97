//! Mappings between reference and physical cell coordinates.
//!
//! All batch operations treat points independently: evaluating a batch gives the same result
//! as evaluating each point on its own.
use crate::cell::{Cell, CellOrientation, CellShape};
use crate::dofmap::{Dofmap, ElementDofmap};
use crate::element::{derivative_combinations, lagrange, vector, ElementDefinition, ElementError, FiniteElement};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ReferenceCoordinatesError {
    /// The iteration for point `point` did not converge. The last iterate is still written.
    MaximumIterationsReached { point: usize, iterations: usize },
    /// The Jacobian at the current iterate for point `point` could not be inverted.
    SingularJacobian { point: usize },
}

impl Display for ReferenceCoordinatesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceCoordinatesError::MaximumIterationsReached { point, iterations } => write!(
                f,
                "Reference coordinates of point {} did not converge within the maximum number of iterations ({}).",
                point, iterations
            ),
            ReferenceCoordinatesError::SingularJacobian { point } => {
                write!(f, "Singular Jacobian encountered while inverting point {}.", point)
            }
        }
    }
}

impl Error for ReferenceCoordinatesError {}

/// The determinant of the `gdim x tdim` Jacobian `J`, stored row-major.
///
/// For `gdim > tdim` this is the pseudo-determinant `sqrt(det(J^T J))`, negated if the cell is
/// flipped. A vertex cell has determinant 1.
#[allow(non_snake_case)]
pub fn jacobian_determinant(J: &[f64], gdim: usize, tdim: usize, cell_orientation: CellOrientation) -> f64 {
    assert_eq!(J.len(), gdim * tdim, "Jacobian must have length gdim * tdim.");
    if tdim == 0 {
        return 1.0;
    }
    let J = DMatrix::from_row_slice(gdim, tdim, J);
    if gdim == tdim {
        J.determinant()
    } else {
        let gram = J.transpose() * &J;
        cell_orientation.sign() * gram.determinant().max(0.0).sqrt()
    }
}

/// Writes the (pseudo-)inverse of the `gdim x tdim` Jacobian `J` to the `tdim x gdim` buffer `K`.
///
/// For `gdim > tdim` the Moore-Penrose inverse `(J^T J)^{-1} J^T` is used. If the matrix cannot
/// be inverted, `K` is filled with NaN.
#[allow(non_snake_case)]
pub fn jacobian_inverse(K: &mut [f64], J: &[f64], gdim: usize, tdim: usize, detJ: f64) {
    assert_eq!(J.len(), gdim * tdim, "Jacobian must have length gdim * tdim.");
    assert_eq!(K.len(), tdim * gdim, "Inverse must have length tdim * gdim.");
    if tdim == 0 {
        return;
    }
    let J = DMatrix::from_row_slice(gdim, tdim, J);
    let inverse = if detJ == 0.0 {
        None
    } else if gdim == tdim {
        J.try_inverse()
    } else {
        let J_t = J.transpose();
        (&J_t * &J).try_inverse().map(|gram_inverse| gram_inverse * J_t)
    };
    match inverse {
        // nalgebra is column-major, the buffer is row-major
        Some(inverse) => {
            for (k, value) in K.iter_mut().enumerate() {
                *value = inverse[(k / gdim, k % gdim)];
            }
        }
        None => K.fill(f64::NAN),
    }
}

/// Converts between reference and physical coordinates for one cell shape.
///
/// `coordinate_dofs` holds the physical positions of the geometry nodes of a cell, laid out
/// `[num_dofs][gdim]`. Reference points `X` are `[num_points][tdim]`, physical points `x` are
/// `[num_points][gdim]`, Jacobians `J = dx/dX` are `[num_points][gdim][tdim]`, determinants
/// `detJ` are `[num_points]` and (pseudo-)inverses `K` are `[num_points][tdim][gdim]`.
#[allow(non_snake_case)]
pub trait CoordinateMapping: Send {
    fn signature(&self) -> &str;

    fn geometric_dimension(&self) -> usize;

    fn topological_dimension(&self) -> usize;

    fn cell_shape(&self) -> CellShape;

    /// The element describing the coordinate field.
    fn create_coordinate_finite_element(&self) -> Box<dyn FiniteElement>;

    fn create_coordinate_dofmap(&self) -> Box<dyn Dofmap>;

    fn create(&self) -> Box<dyn CoordinateMapping>;

    fn compute_physical_coordinates(&self, x: &mut [f64], num_points: usize, X: &[f64], coordinate_dofs: &[f64]);

    /// Computes reference coordinates of physical points.
    ///
    /// On manifolds, points off the cell are projected onto it. The projection through the
    /// pseudo-inverse `(J^T J)^{-1} J^T` does not depend on the sign of `detJ`, so
    /// `cell_orientation` does not change the result of [`LagrangeCoordinateMapping`].
    fn compute_reference_coordinates(
        &self,
        X: &mut [f64],
        num_points: usize,
        x: &[f64],
        coordinate_dofs: &[f64],
        cell_orientation: CellOrientation,
    ) -> Result<(), ReferenceCoordinatesError>;

    fn compute_jacobians(&self, J: &mut [f64], num_points: usize, X: &[f64], coordinate_dofs: &[f64]);

    fn compute_jacobian_determinants(
        &self,
        detJ: &mut [f64],
        num_points: usize,
        J: &[f64],
        cell_orientation: CellOrientation,
    ) {
        let gdim = self.geometric_dimension();
        let tdim = self.topological_dimension();
        assert_eq!(detJ.len(), num_points, "detJ must have length num_points.");
        assert_eq!(J.len(), num_points * gdim * tdim, "J must have length num_points * gdim * tdim.");
        for (ip, det) in detJ.iter_mut().enumerate() {
            *det = jacobian_determinant(&J[ip * gdim * tdim..(ip + 1) * gdim * tdim], gdim, tdim, cell_orientation);
        }
    }

    fn compute_jacobian_inverses(&self, K: &mut [f64], num_points: usize, J: &[f64], detJ: &[f64]) {
        let gdim = self.geometric_dimension();
        let tdim = self.topological_dimension();
        let size = gdim * tdim;
        assert_eq!(K.len(), num_points * size, "K must have length num_points * tdim * gdim.");
        assert_eq!(J.len(), num_points * size, "J must have length num_points * gdim * tdim.");
        assert_eq!(detJ.len(), num_points, "detJ must have length num_points.");
        for ip in 0..num_points {
            let range = ip * size..(ip + 1) * size;
            jacobian_inverse(&mut K[range.clone()], &J[range], gdim, tdim, detJ[ip]);
        }
    }

    /// Computes `X`, `J`, `detJ` and `K` from physical points `x`.
    ///
    /// The geometry is written even if inverting the coordinates fails for some point.
    fn compute_reference_geometry(
        &self,
        X: &mut [f64],
        J: &mut [f64],
        detJ: &mut [f64],
        K: &mut [f64],
        num_points: usize,
        x: &[f64],
        coordinate_dofs: &[f64],
        cell_orientation: CellOrientation,
    ) -> Result<(), ReferenceCoordinatesError> {
        let result = self.compute_reference_coordinates(X, num_points, x, coordinate_dofs, cell_orientation);
        self.compute_jacobians(J, num_points, X, coordinate_dofs);
        self.compute_jacobian_determinants(detJ, num_points, J, cell_orientation);
        self.compute_jacobian_inverses(K, num_points, J, detJ);
        result
    }

    /// Computes `x`, `J`, `detJ` and `K` at reference points `X`.
    fn compute_geometry(
        &self,
        x: &mut [f64],
        J: &mut [f64],
        detJ: &mut [f64],
        K: &mut [f64],
        num_points: usize,
        X: &[f64],
        coordinate_dofs: &[f64],
        cell_orientation: CellOrientation,
    ) {
        self.compute_physical_coordinates(x, num_points, X, coordinate_dofs);
        self.compute_jacobians(J, num_points, X, coordinate_dofs);
        self.compute_jacobian_determinants(detJ, num_points, J, cell_orientation);
        self.compute_jacobian_inverses(K, num_points, J, detJ);
    }

    /// Computes `x` (`[gdim]`) and `J` (`[gdim][tdim]`) at the reference cell midpoint.
    fn compute_midpoint_geometry(&self, x: &mut [f64], J: &mut [f64], coordinate_dofs: &[f64]) {
        let X = self.cell_shape().midpoint();
        self.compute_physical_coordinates(x, 1, &X, coordinate_dofs);
        self.compute_jacobians(J, 1, &X, coordinate_dofs);
    }
}

/// Tunables for the iterative inversion of non-affine coordinate maps.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ReferenceCoordinateSettings {
    pub max_iterations: usize,
    /// Convergence tolerance, relative to the cell diameter for the residual and absolute for
    /// the reference-coordinate update.
    pub tolerance: f64,
}

impl Default for ReferenceCoordinateSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: 1e-12,
        }
    }
}

/// An isoparametric coordinate mapping whose coordinate field is a vector Lagrange element.
#[derive(Debug, Clone, PartialEq)]
pub struct LagrangeCoordinateMapping {
    signature: String,
    cell: Cell,
    scalar_element: ElementDefinition,
    coordinate_element: ElementDefinition,
    settings: ReferenceCoordinateSettings,
}

#[allow(non_snake_case)]
impl LagrangeCoordinateMapping {
    pub fn new(cell: impl Into<Cell>, degree: usize) -> Result<Self, ElementError> {
        let cell = cell.into();
        let scalar_element = lagrange(cell, degree)?;
        let coordinate_element = vector(scalar_element.clone(), cell.geometric_dimension())?;
        Ok(Self {
            signature: format!("CoordinateMapping({})", coordinate_element.signature()),
            cell,
            scalar_element,
            coordinate_element,
            settings: ReferenceCoordinateSettings::default(),
        })
    }

    pub fn with_settings(self, settings: ReferenceCoordinateSettings) -> Self {
        Self { settings, ..self }
    }

    pub fn settings(&self) -> &ReferenceCoordinateSettings {
        &self.settings
    }

    pub fn cell(&self) -> Cell {
        self.cell
    }

    /// The number of geometry nodes per cell.
    pub fn num_coordinate_dofs(&self) -> usize {
        self.scalar_element.space_dimension()
    }

    /// Whether the Jacobian is constant over the cell.
    pub fn is_affine(&self) -> bool {
        self.cell.shape().is_simplex() && self.scalar_element.degree() <= 1
    }

    fn check_coordinate_dofs(&self, coordinate_dofs: &[f64]) {
        assert_eq!(
            coordinate_dofs.len(),
            self.num_coordinate_dofs() * self.cell.geometric_dimension(),
            "Coordinate dofs must have length num_coordinate_dofs * gdim."
        );
    }

    /// The largest distance between two geometry nodes.
    fn diameter(&self, coordinate_dofs: &[f64]) -> f64 {
        let gdim = self.cell.geometric_dimension().max(1);
        let nodes: Vec<_> = coordinate_dofs.chunks_exact(gdim).collect();
        let mut diameter: f64 = 0.0;
        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                let distance = a
                    .iter()
                    .zip(b.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt();
                diameter = diameter.max(distance);
            }
        }
        diameter
    }

    /// `x(X)` and `J(X)` at a single reference point.
    fn point_geometry(&self, X: &[f64], coordinate_dofs: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
        let gdim = self.cell.geometric_dimension();
        let tdim = self.cell.topological_dimension();
        let mut x = vec![0.0; gdim];
        let mut J = vec![0.0; gdim * tdim];
        self.compute_physical_coordinates(&mut x, 1, X, coordinate_dofs);
        self.compute_jacobians(&mut J, 1, X, coordinate_dofs);
        (DVector::from_vec(x), DMatrix::from_row_slice(gdim, tdim, &J))
    }

    fn pseudo_inverse(&self, J: &DMatrix<f64>) -> Option<DMatrix<f64>> {
        let (gdim, tdim) = J.shape();
        if gdim == tdim {
            J.clone().try_inverse()
        } else {
            let J_t = J.transpose();
            (&J_t * J).try_inverse().map(|gram_inverse| gram_inverse * J_t)
        }
    }

    /// Gauss-Newton iteration `X <- X - K(X) (x(X) - x)` started at the cell midpoint.
    fn invert_point(
        &self,
        point: usize,
        X: &mut [f64],
        x: &[f64],
        coordinate_dofs: &[f64],
        diameter: f64,
    ) -> Result<(), ReferenceCoordinatesError> {
        let target = DVector::from_column_slice(x);
        let mut X_k = DVector::from_vec(self.cell.shape().midpoint());
        let residual_tolerance = self.settings.tolerance * diameter;

        for iteration in 0..self.settings.max_iterations {
            let (x_k, J_k) = self.point_geometry(X_k.as_slice(), coordinate_dofs);
            let residual = x_k - &target;
            let K_k = self
                .pseudo_inverse(&J_k)
                .ok_or(ReferenceCoordinatesError::SingularJacobian { point })?;
            let step = K_k * &residual;
            X_k -= &step;
            debug!(
                "Point {}: iteration {}, residual {:e}, step {:e}",
                point,
                iteration,
                residual.norm(),
                step.norm()
            );
            if residual.norm() <= residual_tolerance || step.norm() <= self.settings.tolerance {
                X.copy_from_slice(X_k.as_slice());
                return Ok(());
            }
        }

        X.copy_from_slice(X_k.as_slice());
        warn!(
            "Reference coordinates of point {} did not converge in {} iterations.",
            point, self.settings.max_iterations
        );
        Err(ReferenceCoordinatesError::MaximumIterationsReached {
            point,
            iterations: self.settings.max_iterations,
        })
    }
}

#[allow(non_snake_case)]
impl CoordinateMapping for LagrangeCoordinateMapping {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn geometric_dimension(&self) -> usize {
        self.cell.geometric_dimension()
    }

    fn topological_dimension(&self) -> usize {
        self.cell.topological_dimension()
    }

    fn cell_shape(&self) -> CellShape {
        self.cell.shape()
    }

    fn create_coordinate_finite_element(&self) -> Box<dyn FiniteElement> {
        self.coordinate_element.create()
    }

    fn create_coordinate_dofmap(&self) -> Box<dyn Dofmap> {
        Box::new(ElementDofmap::new(&self.coordinate_element))
    }

    fn create(&self) -> Box<dyn CoordinateMapping> {
        Box::new(self.clone())
    }

    fn compute_physical_coordinates(&self, x: &mut [f64], num_points: usize, X: &[f64], coordinate_dofs: &[f64]) {
        let gdim = self.cell.geometric_dimension();
        let num_dofs = self.num_coordinate_dofs();
        self.check_coordinate_dofs(coordinate_dofs);
        assert_eq!(x.len(), num_points * gdim, "x must have length num_points * gdim.");

        let mut phi = vec![0.0; num_points * num_dofs];
        self.scalar_element
            .tabulate_into(&mut phi, &derivative_combinations(0, 0), num_points, X);

        x.fill(0.0);
        for ip in 0..num_points {
            for k in 0..num_dofs {
                for g in 0..gdim {
                    x[ip * gdim + g] += phi[ip * num_dofs + k] * coordinate_dofs[k * gdim + g];
                }
            }
        }
    }

    fn compute_reference_coordinates(
        &self,
        X: &mut [f64],
        num_points: usize,
        x: &[f64],
        coordinate_dofs: &[f64],
        _cell_orientation: CellOrientation,
    ) -> Result<(), ReferenceCoordinatesError> {
        let gdim = self.cell.geometric_dimension();
        let tdim = self.cell.topological_dimension();
        self.check_coordinate_dofs(coordinate_dofs);
        assert_eq!(X.len(), num_points * tdim, "X must have length num_points * tdim.");
        assert_eq!(x.len(), num_points * gdim, "x must have length num_points * gdim.");
        if tdim == 0 {
            return Ok(());
        }

        if self.is_affine() {
            // X = K (x - x_0), with x_0 the image of the reference origin
            let origin = vec![0.0; tdim];
            let (x_0, J) = self.point_geometry(&origin, coordinate_dofs);
            let K = self
                .pseudo_inverse(&J)
                .ok_or(ReferenceCoordinatesError::SingularJacobian { point: 0 })?;
            for ip in 0..num_points {
                let x_p = DVector::from_column_slice(&x[ip * gdim..(ip + 1) * gdim]);
                let X_p = &K * (x_p - &x_0);
                X[ip * tdim..(ip + 1) * tdim].copy_from_slice(X_p.as_slice());
            }
            return Ok(());
        }

        let diameter = self.diameter(coordinate_dofs);
        let mut result = Ok(());
        for ip in 0..num_points {
            let outcome = self.invert_point(
                ip,
                &mut X[ip * tdim..(ip + 1) * tdim],
                &x[ip * gdim..(ip + 1) * gdim],
                coordinate_dofs,
                diameter,
            );
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }

    fn compute_jacobians(&self, J: &mut [f64], num_points: usize, X: &[f64], coordinate_dofs: &[f64]) {
        let gdim = self.cell.geometric_dimension();
        let tdim = self.cell.topological_dimension();
        let num_dofs = self.num_coordinate_dofs();
        self.check_coordinate_dofs(coordinate_dofs);
        assert_eq!(J.len(), num_points * gdim * tdim, "J must have length num_points * gdim * tdim.");

        // Gradients laid out [point][dof][tdim]
        let mut dphi = vec![0.0; num_points * num_dofs * tdim];
        self.scalar_element
            .tabulate_into(&mut dphi, &derivative_combinations(tdim, 1), num_points, X);

        J.fill(0.0);
        for ip in 0..num_points {
            for k in 0..num_dofs {
                for g in 0..gdim {
                    for t in 0..tdim {
                        J[(ip * gdim + g) * tdim + t] +=
                            coordinate_dofs[k * gdim + g] * dphi[(ip * num_dofs + k) * tdim + t];
                    }
                }
            }
        }
    }
}
