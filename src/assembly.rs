//! Host-side integral dispatch and batch evaluation of local tensors.
//!
//! A form is shared between threads by reference, while every worker creates its own
//! integrals through an [`IntegralDispatcher`].
use crate::cell::CellOrientation;
use crate::form::Form;
use crate::integral::{
    gather_coefficients, AnyIntegral, CellIntegral, CustomIntegral, ExteriorFacetIntegral, IntegralKind,
    InteriorFacetIntegral, VertexIntegral,
};
use eyre::WrapErr;
use log::debug;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// Resolves the integral responsible for a subdomain and caches the created instances.
///
/// The integral of a subdomain is used if the form has one; otherwise the default integral of
/// the kind is used. Subdomain ids at or beyond the form's bound and unmarked entities
/// (`None`) go straight to the default. If neither exists, the entity does not contribute.
pub struct IntegralDispatcher<'a> {
    form: &'a dyn Form,
    cache: FxHashMap<(IntegralKind, Option<usize>), Option<AnyIntegral>>,
}

impl<'a> IntegralDispatcher<'a> {
    pub fn new(form: &'a dyn Form) -> Self {
        Self {
            form,
            cache: FxHashMap::default(),
        }
    }

    pub fn form(&self) -> &'a dyn Form {
        self.form
    }

    fn ensure_cached(&mut self, kind: IntegralKind, subdomain_id: Option<usize>) {
        let form = self.form;
        self.cache.entry((kind, subdomain_id)).or_insert_with(|| {
            debug!(
                "Creating {} integral of form {} for subdomain {:?}",
                kind.name(),
                form.signature(),
                subdomain_id
            );
            match subdomain_id {
                Some(id) => form.create_integral(kind, id),
                None => form.create_default_integral(kind),
            }
        });
    }

    /// The integral of kind `kind` responsible for `subdomain_id`, if any.
    pub fn integral(&mut self, kind: IntegralKind, subdomain_id: Option<usize>) -> Option<&AnyIntegral> {
        let subdomain_id = subdomain_id.filter(|&id| id < self.form.max_subdomain_id(kind));
        if let Some(id) = subdomain_id {
            self.ensure_cached(kind, Some(id));
            if matches!(self.cache.get(&(kind, Some(id))), Some(Some(_))) {
                return self.cache.get(&(kind, Some(id))).and_then(Option::as_ref);
            }
        }
        self.ensure_cached(kind, None);
        self.cache.get(&(kind, None)).and_then(Option::as_ref)
    }

    pub fn cell_integral(&mut self, subdomain_id: Option<usize>) -> Option<&dyn CellIntegral> {
        match self.integral(IntegralKind::Cell, subdomain_id) {
            Some(AnyIntegral::Cell(integral)) => Some(integral.as_ref()),
            _ => None,
        }
    }

    pub fn exterior_facet_integral(&mut self, subdomain_id: Option<usize>) -> Option<&dyn ExteriorFacetIntegral> {
        match self.integral(IntegralKind::ExteriorFacet, subdomain_id) {
            Some(AnyIntegral::ExteriorFacet(integral)) => Some(integral.as_ref()),
            _ => None,
        }
    }

    pub fn interior_facet_integral(&mut self, subdomain_id: Option<usize>) -> Option<&dyn InteriorFacetIntegral> {
        match self.integral(IntegralKind::InteriorFacet, subdomain_id) {
            Some(AnyIntegral::InteriorFacet(integral)) => Some(integral.as_ref()),
            _ => None,
        }
    }

    pub fn vertex_integral(&mut self, subdomain_id: Option<usize>) -> Option<&dyn VertexIntegral> {
        match self.integral(IntegralKind::Vertex, subdomain_id) {
            Some(AnyIntegral::Vertex(integral)) => Some(integral.as_ref()),
            _ => None,
        }
    }

    pub fn custom_integral(&mut self, subdomain_id: Option<usize>) -> Option<&dyn CustomIntegral> {
        match self.integral(IntegralKind::Custom, subdomain_id) {
            Some(AnyIntegral::Custom(integral)) => Some(integral.as_ref()),
            _ => None,
        }
    }
}

/// The number of entries of a local tensor of `form` for integrals of kind `kind`.
///
/// Interior-facet tensors couple the dofs of both adjacent cells.
pub fn local_tensor_size(form: &dyn Form, kind: IntegralKind) -> usize {
    let cells_per_entity = match kind {
        IntegralKind::InteriorFacet => 2,
        _ => 1,
    };
    (0..form.rank())
        .filter_map(|i| form.create_finite_element(i))
        .map(|element| cells_per_entity * element.space_dimension())
        .product()
}

/// The data of one cell needed to evaluate its local tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct CellData<'a> {
    /// Subdomain marker of the cell, `None` if unmarked.
    pub subdomain_id: Option<usize>,
    pub coordinate_dofs: &'a [f64],
    pub cell_orientation: CellOrientation,
    /// Values of every coefficient on the cell, indexed by generated coefficient index.
    pub coefficients: Vec<Option<&'a [f64]>>,
}

/// A boundary facet, given by its cell and its local index in that cell.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetData<'a> {
    pub cell: CellData<'a>,
    pub facet: usize,
    /// Subdomain marker of the facet, `None` if unmarked.
    pub subdomain_id: Option<usize>,
}

/// Evaluates the cell integrals of `form` on every cell in parallel.
///
/// Entry `i` of the result is the local tensor of cell `i`, or `None` if no integral
/// contributes on it.
pub fn tabulate_cell_tensors(form: &dyn Form, cells: &[CellData]) -> eyre::Result<Vec<Option<Vec<f64>>>> {
    let size = local_tensor_size(form, IntegralKind::Cell);
    cells
        .par_iter()
        .enumerate()
        .map_init(
            || IntegralDispatcher::new(form),
            |dispatcher, (i, cell)| -> eyre::Result<Option<Vec<f64>>> {
                let integral = match dispatcher.cell_integral(cell.subdomain_id) {
                    Some(integral) => integral,
                    None => return Ok(None),
                };
                let w = gather_coefficients(integral.enabled_coefficients(), &cell.coefficients)
                    .wrap_err_with(|| format!("invalid coefficients on cell {}", i))?;
                let mut a = vec![0.0; size];
                integral.tabulate_tensor(&mut a, &w, cell.coordinate_dofs, cell.cell_orientation);
                Ok(Some(a))
            },
        )
        .collect()
}

/// Evaluates the exterior facet integrals of `form` on every facet in parallel.
pub fn tabulate_exterior_facet_tensors(
    form: &dyn Form,
    facets: &[FacetData],
) -> eyre::Result<Vec<Option<Vec<f64>>>> {
    let size = local_tensor_size(form, IntegralKind::ExteriorFacet);
    facets
        .par_iter()
        .enumerate()
        .map_init(
            || IntegralDispatcher::new(form),
            |dispatcher, (i, facet)| -> eyre::Result<Option<Vec<f64>>> {
                let integral = match dispatcher.exterior_facet_integral(facet.subdomain_id) {
                    Some(integral) => integral,
                    None => return Ok(None),
                };
                let cell = &facet.cell;
                let w = gather_coefficients(integral.enabled_coefficients(), &cell.coefficients)
                    .wrap_err_with(|| format!("invalid coefficients on facet {}", i))?;
                let mut a = vec![0.0; size];
                integral.tabulate_tensor(&mut a, &w, cell.coordinate_dofs, facet.facet, cell.cell_orientation);
                Ok(Some(a))
            },
        )
        .collect()
}
