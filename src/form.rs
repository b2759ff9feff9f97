//! Forms: the top-level aggregate owning all factories of a multilinear functional.
use crate::cell::CellShape;
use crate::coordinate_mapping::CoordinateMapping;
use crate::dofmap::{Dofmap, ElementDofmap};
use crate::element::{ElementDefinition, FiniteElement};
use crate::integral::{
    AnyIntegral, CellIntegral, CustomIntegral, ExteriorFacetIntegral, IntegralKind, InteriorFacetIntegral,
    VertexIntegral,
};
use crate::registry::FunctionSpaceRecord;
use eyre::eyre;
use itertools::Itertools;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A multilinear form `a(v_1, ..., v_r; w_1, ..., w_n)` with `r` arguments and `n`
/// coefficients.
///
/// Element and dofmap indices run over the arguments first and then the coefficients.
/// Integrals are looked up per kind and subdomain id; ids at or beyond
/// [`max_subdomain_id`](Self::max_subdomain_id) have no subdomain integral, and callers should
/// fall back to the default integral of the kind. `None` means the form has no contribution.
pub trait Form: Send + Sync {
    fn signature(&self) -> &str;

    /// The number of arguments, i.e. the rank of the global tensor.
    fn rank(&self) -> usize;

    fn num_coefficients(&self) -> usize;

    /// The position in the user-facing form of the coefficient with generated index `i`.
    fn original_coefficient_position(&self, i: usize) -> usize;

    fn create_coordinate_mapping(&self) -> Box<dyn CoordinateMapping>;

    fn create_coordinate_finite_element(&self) -> Box<dyn FiniteElement> {
        self.create_coordinate_mapping().create_coordinate_finite_element()
    }

    fn create_coordinate_dofmap(&self) -> Box<dyn Dofmap> {
        self.create_coordinate_mapping().create_coordinate_dofmap()
    }

    /// The element of argument or coefficient `i`, for `i < rank + num_coefficients`.
    fn create_finite_element(&self, i: usize) -> Option<Box<dyn FiniteElement>>;

    fn create_dofmap(&self, i: usize) -> Option<Box<dyn Dofmap>>;

    /// Exclusive upper bound on the subdomain ids with an integral of kind `kind`.
    fn max_subdomain_id(&self, kind: IntegralKind) -> usize;

    fn has_integrals(&self, kind: IntegralKind) -> bool;

    fn create_integral(&self, kind: IntegralKind, subdomain_id: usize) -> Option<AnyIntegral>;

    fn create_default_integral(&self, kind: IntegralKind) -> Option<AnyIntegral>;

    fn max_cell_subdomain_id(&self) -> usize {
        self.max_subdomain_id(IntegralKind::Cell)
    }

    fn max_exterior_facet_subdomain_id(&self) -> usize {
        self.max_subdomain_id(IntegralKind::ExteriorFacet)
    }

    fn max_interior_facet_subdomain_id(&self) -> usize {
        self.max_subdomain_id(IntegralKind::InteriorFacet)
    }

    fn max_vertex_subdomain_id(&self) -> usize {
        self.max_subdomain_id(IntegralKind::Vertex)
    }

    fn max_custom_subdomain_id(&self) -> usize {
        self.max_subdomain_id(IntegralKind::Custom)
    }

    fn has_cell_integrals(&self) -> bool {
        self.has_integrals(IntegralKind::Cell)
    }

    fn has_exterior_facet_integrals(&self) -> bool {
        self.has_integrals(IntegralKind::ExteriorFacet)
    }

    fn has_interior_facet_integrals(&self) -> bool {
        self.has_integrals(IntegralKind::InteriorFacet)
    }

    fn has_vertex_integrals(&self) -> bool {
        self.has_integrals(IntegralKind::Vertex)
    }

    fn has_custom_integrals(&self) -> bool {
        self.has_integrals(IntegralKind::Custom)
    }

    fn create_cell_integral(&self, subdomain_id: usize) -> Option<Box<dyn CellIntegral>> {
        self.create_integral(IntegralKind::Cell, subdomain_id)
            .and_then(AnyIntegral::into_cell)
    }

    fn create_exterior_facet_integral(&self, subdomain_id: usize) -> Option<Box<dyn ExteriorFacetIntegral>> {
        self.create_integral(IntegralKind::ExteriorFacet, subdomain_id)
            .and_then(AnyIntegral::into_exterior_facet)
    }

    fn create_interior_facet_integral(&self, subdomain_id: usize) -> Option<Box<dyn InteriorFacetIntegral>> {
        self.create_integral(IntegralKind::InteriorFacet, subdomain_id)
            .and_then(AnyIntegral::into_interior_facet)
    }

    fn create_vertex_integral(&self, subdomain_id: usize) -> Option<Box<dyn VertexIntegral>> {
        self.create_integral(IntegralKind::Vertex, subdomain_id)
            .and_then(AnyIntegral::into_vertex)
    }

    fn create_custom_integral(&self, subdomain_id: usize) -> Option<Box<dyn CustomIntegral>> {
        self.create_integral(IntegralKind::Custom, subdomain_id)
            .and_then(AnyIntegral::into_custom)
    }

    fn create_default_cell_integral(&self) -> Option<Box<dyn CellIntegral>> {
        self.create_default_integral(IntegralKind::Cell)
            .and_then(AnyIntegral::into_cell)
    }

    fn create_default_exterior_facet_integral(&self) -> Option<Box<dyn ExteriorFacetIntegral>> {
        self.create_default_integral(IntegralKind::ExteriorFacet)
            .and_then(AnyIntegral::into_exterior_facet)
    }

    fn create_default_interior_facet_integral(&self) -> Option<Box<dyn InteriorFacetIntegral>> {
        self.create_default_integral(IntegralKind::InteriorFacet)
            .and_then(AnyIntegral::into_interior_facet)
    }

    fn create_default_vertex_integral(&self) -> Option<Box<dyn VertexIntegral>> {
        self.create_default_integral(IntegralKind::Vertex)
            .and_then(AnyIntegral::into_vertex)
    }

    fn create_default_custom_integral(&self) -> Option<Box<dyn CustomIntegral>> {
        self.create_default_integral(IntegralKind::Custom)
            .and_then(AnyIntegral::into_custom)
    }
}

/// Orders user-supplied coefficients by generated coefficient index.
///
/// `user_coefficients[j]` is the coefficient at position `j` of the user-facing form. The
/// result holds, for each generated index `i`, the coefficient at
/// `original_coefficient_position(i)`.
pub fn bind_coefficients<'a, T>(form: &dyn Form, user_coefficients: &'a [T]) -> eyre::Result<Vec<&'a T>> {
    (0..form.num_coefficients())
        .map(|i| {
            let position = form.original_coefficient_position(i);
            user_coefficients.get(position).ok_or_else(|| {
                eyre!(
                    "coefficient {} of form {} refers to original position {}, but only {} coefficients were supplied",
                    i,
                    form.signature(),
                    position,
                    user_coefficients.len()
                )
            })
        })
        .collect()
}

type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

#[derive(Clone)]
struct SpaceFactories {
    element: Factory<Box<dyn FiniteElement>>,
    dofmap: Factory<Box<dyn Dofmap>>,
}

impl SpaceFactories {
    fn from_element(element: ElementDefinition) -> Self {
        let dofmap = ElementDofmap::new(&element);
        Self {
            element: Arc::new(move || element.create()),
            dofmap: Arc::new(move || dofmap.create()),
        }
    }

    fn from_record(record: FunctionSpaceRecord) -> Self {
        Self {
            element: Arc::new(record.create_finite_element),
            dofmap: Arc::new(record.create_dofmap),
        }
    }
}

/// Integral factories of one kind.
#[derive(Clone, Default)]
struct IntegralTable {
    subdomains: Vec<Option<Factory<AnyIntegral>>>,
    default: Option<Factory<AnyIntegral>>,
}

impl IntegralTable {
    fn factories(&self) -> impl Iterator<Item = &Factory<AnyIntegral>> {
        self.subdomains.iter().flatten().chain(self.default.iter())
    }
}

/// A [`Form`] assembled from factories at run time, typically by generated code.
#[derive(Clone)]
pub struct CompiledForm {
    signature: String,
    rank: usize,
    original_coefficient_positions: Vec<usize>,
    coordinate_mapping: Factory<Box<dyn CoordinateMapping>>,
    spaces: Vec<SpaceFactories>,
    integrals: FxHashMap<IntegralKind, IntegralTable>,
}

impl std::fmt::Debug for CompiledForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledForm")
            .field("signature", &self.signature)
            .field("rank", &self.rank)
            .field("original_coefficient_positions", &self.original_coefficient_positions)
            .finish_non_exhaustive()
    }
}

impl Form for CompiledForm {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn num_coefficients(&self) -> usize {
        self.original_coefficient_positions.len()
    }

    /// # Panics
    ///
    /// Panics if `i` is not a valid coefficient index.
    fn original_coefficient_position(&self, i: usize) -> usize {
        self.original_coefficient_positions[i]
    }

    fn create_coordinate_mapping(&self) -> Box<dyn CoordinateMapping> {
        (self.coordinate_mapping)()
    }

    fn create_finite_element(&self, i: usize) -> Option<Box<dyn FiniteElement>> {
        self.spaces.get(i).map(|space| (space.element)())
    }

    fn create_dofmap(&self, i: usize) -> Option<Box<dyn Dofmap>> {
        self.spaces.get(i).map(|space| (space.dofmap)())
    }

    fn max_subdomain_id(&self, kind: IntegralKind) -> usize {
        self.integrals
            .get(&kind)
            .map(|table| table.subdomains.len())
            .unwrap_or(0)
    }

    fn has_integrals(&self, kind: IntegralKind) -> bool {
        self.integrals
            .get(&kind)
            .map(|table| table.factories().next().is_some())
            .unwrap_or(false)
    }

    fn create_integral(&self, kind: IntegralKind, subdomain_id: usize) -> Option<AnyIntegral> {
        let factory = self.integrals.get(&kind)?.subdomains.get(subdomain_id)?.as_ref()?;
        Some(factory())
    }

    fn create_default_integral(&self, kind: IntegralKind) -> Option<AnyIntegral> {
        let factory = self.integrals.get(&kind)?.default.as_ref()?;
        Some(factory())
    }
}

/// Builds a [`CompiledForm`].
///
/// Arguments must be added in order, and coefficients in generated order together with their
/// original position in the user-facing form.
pub struct FormBuilder {
    signature: String,
    coordinate_mapping: Option<Factory<Box<dyn CoordinateMapping>>>,
    arguments: Vec<SpaceFactories>,
    coefficients: Vec<(usize, SpaceFactories)>,
    integrals: FxHashMap<IntegralKind, IntegralTable>,
    duplicates: Vec<(IntegralKind, Option<usize>)>,
}

impl FormBuilder {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            coordinate_mapping: None,
            arguments: Vec::new(),
            coefficients: Vec::new(),
            integrals: FxHashMap::default(),
            duplicates: Vec::new(),
        }
    }

    pub fn with_coordinate_mapping<M>(mut self, mapping: M) -> Self
    where
        M: CoordinateMapping + Sync + 'static,
    {
        self.coordinate_mapping = Some(Arc::new(move || mapping.create()));
        self
    }

    pub fn with_argument(mut self, element: ElementDefinition) -> Self {
        self.arguments.push(SpaceFactories::from_element(element));
        self
    }

    pub fn with_argument_space(mut self, space: FunctionSpaceRecord) -> Self {
        self.arguments.push(SpaceFactories::from_record(space));
        self
    }

    pub fn with_coefficient(mut self, original_position: usize, element: ElementDefinition) -> Self {
        self.coefficients
            .push((original_position, SpaceFactories::from_element(element)));
        self
    }

    pub fn with_coefficient_space(mut self, original_position: usize, space: FunctionSpaceRecord) -> Self {
        self.coefficients
            .push((original_position, SpaceFactories::from_record(space)));
        self
    }

    /// Registers an integral factory for `subdomain`, or as the default of its kind for `None`.
    fn with_integral(mut self, kind: IntegralKind, subdomain: Option<usize>, factory: Factory<AnyIntegral>) -> Self {
        let table = self.integrals.entry(kind).or_default();
        let slot = match subdomain {
            Some(id) => {
                if table.subdomains.len() <= id {
                    table.subdomains.resize(id + 1, None);
                }
                &mut table.subdomains[id]
            }
            None => &mut table.default,
        };
        if slot.replace(factory).is_some() {
            self.duplicates.push((kind, subdomain));
        }
        self
    }

    pub fn with_cell_integral<F>(self, subdomain: Option<usize>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn CellIntegral> + Send + Sync + 'static,
    {
        self.with_integral(IntegralKind::Cell, subdomain, Arc::new(move || AnyIntegral::Cell(factory())))
    }

    pub fn with_exterior_facet_integral<F>(self, subdomain: Option<usize>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ExteriorFacetIntegral> + Send + Sync + 'static,
    {
        self.with_integral(
            IntegralKind::ExteriorFacet,
            subdomain,
            Arc::new(move || AnyIntegral::ExteriorFacet(factory())),
        )
    }

    pub fn with_interior_facet_integral<F>(self, subdomain: Option<usize>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn InteriorFacetIntegral> + Send + Sync + 'static,
    {
        self.with_integral(
            IntegralKind::InteriorFacet,
            subdomain,
            Arc::new(move || AnyIntegral::InteriorFacet(factory())),
        )
    }

    pub fn with_vertex_integral<F>(self, subdomain: Option<usize>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn VertexIntegral> + Send + Sync + 'static,
    {
        self.with_integral(IntegralKind::Vertex, subdomain, Arc::new(move || AnyIntegral::Vertex(factory())))
    }

    pub fn with_custom_integral<F>(self, subdomain: Option<usize>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn CustomIntegral> + Send + Sync + 'static,
    {
        self.with_integral(IntegralKind::Custom, subdomain, Arc::new(move || AnyIntegral::Custom(factory())))
    }

    /// Validates the collected factories and builds the form.
    ///
    /// Every factory is invoked once to check that elements live on the cell of the coordinate
    /// mapping and that every integral declares one mask entry per coefficient.
    pub fn build(self) -> eyre::Result<CompiledForm> {
        let coordinate_mapping = self
            .coordinate_mapping
            .ok_or_else(|| eyre!("form {} has no coordinate mapping", self.signature))?;
        let shape: CellShape = coordinate_mapping().cell_shape();

        if let Some((kind, subdomain)) = self.duplicates.first() {
            return Err(eyre!(
                "form {} registers more than one {} integral for {}",
                self.signature,
                kind.name(),
                subdomain.map_or_else(|| "the default domain".to_string(), |id| format!("subdomain {}", id))
            ));
        }

        let positions = self.coefficients.iter().map(|(position, _)| *position).collect_vec();
        if let Some(position) = positions.iter().duplicates().next() {
            return Err(eyre!(
                "form {} maps two coefficients to original position {}",
                self.signature,
                position
            ));
        }

        let rank = self.arguments.len();
        let spaces = self
            .arguments
            .into_iter()
            .chain(self.coefficients.into_iter().map(|(_, space)| space))
            .collect_vec();
        for (i, space) in spaces.iter().enumerate() {
            let element = (space.element)();
            if element.cell_shape() != shape {
                return Err(eyre!(
                    "element {} of form {} is defined on a {}, but the coordinate mapping is defined on a {}",
                    element.signature(),
                    self.signature,
                    element.cell_shape().name(),
                    shape.name()
                ));
            }
            let dofmap = (space.dofmap)();
            if dofmap.num_element_dofs() != element.space_dimension() {
                return Err(eyre!(
                    "dofmap of space {} of form {} has {} element dofs, but its element has dimension {}",
                    i,
                    self.signature,
                    dofmap.num_element_dofs(),
                    element.space_dimension()
                ));
            }
        }

        let num_coefficients = positions.len();
        for (kind, table) in &self.integrals {
            for factory in table.factories() {
                let integral = factory();
                if integral.enabled_coefficients().len() != num_coefficients {
                    return Err(eyre!(
                        "{} integral of form {} declares {} coefficients, but the form has {}",
                        kind.name(),
                        self.signature,
                        integral.enabled_coefficients().len(),
                        num_coefficients
                    ));
                }
            }
        }

        Ok(CompiledForm {
            signature: self.signature,
            rank,
            original_coefficient_positions: positions,
            coordinate_mapping,
            spaces,
            integrals: self.integrals,
        })
    }
}
