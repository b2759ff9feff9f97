//! Local-to-global numbering of degrees of freedom.
use crate::cell::CellShape;
use crate::element::{DofEntity, ElementDefinition, FiniteElement};

/// Maps the local degrees of freedom of one element to global indices on a mesh.
///
/// All tabulation methods are pure functions of their arguments. Entity dimensions passed in
/// must lie in `0 ..= topological_dimension`; violating this is a programming error and panics.
pub trait Dofmap: Send {
    fn signature(&self) -> &str;

    fn topological_dimension(&self) -> usize;

    /// The number of dofs not associated with any mesh entity (e.g. global constants).
    fn num_global_support_dofs(&self) -> usize;

    /// The number of dofs associated with mesh entities of the cell.
    fn num_element_support_dofs(&self) -> usize;

    /// The total number of local dofs on a cell, including global-support dofs.
    fn num_element_dofs(&self) -> usize;

    /// The number of dofs in the closure of a facet.
    fn num_facet_dofs(&self) -> usize;

    /// The number of dofs owned by each entity of dimension `d`.
    fn num_entity_dofs(&self, d: usize) -> usize;

    /// The number of dofs in the closure of each entity of dimension `d`.
    fn num_entity_closure_dofs(&self, d: usize) -> usize;

    /// Computes the global index of every local dof of a cell.
    ///
    /// `num_global_entities[d]` is the number of entities of dimension `d` in the mesh and
    /// `entity_indices[d][i]` the global index of local entity `i` of dimension `d` of the cell.
    /// `dofs` must have length `num_element_dofs`.
    fn tabulate_dofs(&self, dofs: &mut [usize], num_global_entities: &[usize], entity_indices: &[&[usize]]);

    /// Local dofs in the closure of facet `facet`, `num_facet_dofs` in total.
    fn tabulate_facet_dofs(&self, dofs: &mut [usize], facet: usize);

    /// Local dofs owned by entity `i` of dimension `d`, `num_entity_dofs(d)` in total.
    fn tabulate_entity_dofs(&self, dofs: &mut [usize], d: usize, i: usize);

    /// Local dofs in the closure of entity `i` of dimension `d`.
    fn tabulate_entity_closure_dofs(&self, dofs: &mut [usize], d: usize, i: usize);

    fn num_sub_dofmaps(&self) -> usize;

    fn create_sub_dofmap(&self, i: usize) -> Option<Box<dyn Dofmap>>;

    fn create(&self) -> Box<dyn Dofmap>;

    /// The number of global dofs on a mesh with `num_global_entities[d]` entities of dimension `d`.
    fn global_dimension(&self, num_global_entities: &[usize]) -> usize {
        let entity_dofs: usize = (0..=self.topological_dimension())
            .map(|d| self.num_entity_dofs(d) * num_global_entities[d])
            .sum();
        entity_dofs + self.num_global_support_dofs()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Layout {
    /// Local dofs owned by each entity, indexed `[d][entity]`, and the global-support dofs.
    Primitive {
        entity_dofs: Vec<Vec<Vec<usize>>>,
        global_dofs: Vec<usize>,
    },
    /// Sub-dofmaps whose local dofs follow each other.
    Composite(Vec<ElementDofmap>),
}

/// The dofmap induced by the dof-to-entity association of an [`ElementDefinition`].
///
/// Dofs on entities of dimension `d` are numbered after all dofs of lower dimension, as
/// `offset_d + global_entity * num_entity_dofs(d) + k`, and global-support dofs come last. A
/// composite element yields a composite dofmap stacking its sub-dofmaps.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDofmap {
    signature: String,
    shape: CellShape,
    num_element_dofs: usize,
    layout: Layout,
}

impl ElementDofmap {
    pub fn new(element: &ElementDefinition) -> Self {
        let shape = element.cell_shape();
        let layout = if element.is_composite() {
            Layout::Composite(element.sub_elements().iter().map(ElementDofmap::new).collect())
        } else {
            let tdim = shape.topological_dimension();
            let mut entity_dofs: Vec<Vec<Vec<usize>>> = (0..=tdim)
                .map(|d| vec![Vec::new(); shape.num_entities(d)])
                .collect();
            let mut global_dofs = Vec::new();
            for (local, phi) in element.basis().iter().enumerate() {
                match phi.entity {
                    DofEntity::Entity { dim, index } => entity_dofs[dim][index].push(local),
                    DofEntity::Global => global_dofs.push(local),
                }
            }
            Layout::Primitive {
                entity_dofs,
                global_dofs,
            }
        };

        Self {
            signature: format!("Dofmap for {}", element.signature()),
            shape,
            num_element_dofs: element.space_dimension(),
            layout,
        }
    }

    pub fn cell_shape(&self) -> CellShape {
        self.shape
    }

    fn check_dimension(&self, d: usize) {
        assert!(
            d <= self.shape.topological_dimension(),
            "Entity dimension {} exceeds topological dimension {}.",
            d,
            self.shape.topological_dimension()
        );
    }

    fn sub_dofmaps(&self) -> &[ElementDofmap] {
        match &self.layout {
            Layout::Composite(subs) => subs,
            Layout::Primitive { .. } => &[],
        }
    }

    /// Calls `f` with each sub-dofmap and the local index of its first dof.
    fn for_each_sub(&self, mut f: impl FnMut(&ElementDofmap, usize)) {
        let mut offset = 0;
        for sub in self.sub_dofmaps() {
            f(sub, offset);
            offset += sub.num_element_dofs;
        }
    }

    /// Writes local dofs produced per sub-dofmap, shifting them to composite-local indices.
    fn tabulate_local_composite(
        &self,
        dofs: &mut [usize],
        count: impl Fn(&ElementDofmap) -> usize,
        tabulate: impl Fn(&ElementDofmap, &mut [usize]),
    ) {
        let mut position = 0;
        self.for_each_sub(|sub, offset| {
            let n = count(sub);
            let block = &mut dofs[position..position + n];
            tabulate(sub, block);
            block.iter_mut().for_each(|dof| *dof += offset);
            position += n;
        });
    }
}

impl Dofmap for ElementDofmap {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn topological_dimension(&self) -> usize {
        self.shape.topological_dimension()
    }

    fn num_global_support_dofs(&self) -> usize {
        match &self.layout {
            Layout::Primitive { global_dofs, .. } => global_dofs.len(),
            Layout::Composite(subs) => subs.iter().map(|s| s.num_global_support_dofs()).sum(),
        }
    }

    fn num_element_support_dofs(&self) -> usize {
        self.num_element_dofs - self.num_global_support_dofs()
    }

    fn num_element_dofs(&self) -> usize {
        self.num_element_dofs
    }

    fn num_facet_dofs(&self) -> usize {
        match self.topological_dimension() {
            0 => 0,
            tdim => self.num_entity_closure_dofs(tdim - 1),
        }
    }

    fn num_entity_dofs(&self, d: usize) -> usize {
        self.check_dimension(d);
        match &self.layout {
            Layout::Primitive { entity_dofs, .. } => entity_dofs[d]
                .iter()
                .map(|dofs| dofs.len())
                .max()
                .unwrap_or(0),
            Layout::Composite(subs) => subs.iter().map(|s| s.num_entity_dofs(d)).sum(),
        }
    }

    fn num_entity_closure_dofs(&self, d: usize) -> usize {
        self.check_dimension(d);
        match &self.layout {
            Layout::Primitive { entity_dofs, .. } => self
                .shape
                .entity_closure(d, 0)
                .into_iter()
                .map(|(sub_dim, sub)| entity_dofs[sub_dim][sub].len())
                .sum(),
            Layout::Composite(subs) => subs.iter().map(|s| s.num_entity_closure_dofs(d)).sum(),
        }
    }

    fn tabulate_dofs(&self, dofs: &mut [usize], num_global_entities: &[usize], entity_indices: &[&[usize]]) {
        let tdim = self.topological_dimension();
        assert_eq!(dofs.len(), self.num_element_dofs, "Dof buffer must have length num_element_dofs.");
        assert!(
            num_global_entities.len() > tdim,
            "Global entity counts must be given for every dimension up to the topological dimension."
        );

        match &self.layout {
            Layout::Primitive {
                entity_dofs,
                global_dofs,
            } => {
                let mut offset = 0;
                for d in 0..=tdim {
                    let n_d = self.num_entity_dofs(d);
                    for (i, local_dofs) in entity_dofs[d].iter().enumerate() {
                        for (k, &local) in local_dofs.iter().enumerate() {
                            dofs[local] = offset + entity_indices[d][i] * n_d + k;
                        }
                    }
                    offset += n_d * num_global_entities[d];
                }
                for (k, &local) in global_dofs.iter().enumerate() {
                    dofs[local] = offset + k;
                }
            }
            Layout::Composite(subs) => {
                let mut global_offset = 0;
                let mut local_offset = 0;
                for sub in subs {
                    let block = &mut dofs[local_offset..local_offset + sub.num_element_dofs];
                    sub.tabulate_dofs(block, num_global_entities, entity_indices);
                    block.iter_mut().for_each(|dof| *dof += global_offset);
                    global_offset += sub.global_dimension(num_global_entities);
                    local_offset += sub.num_element_dofs;
                }
            }
        }
    }

    fn tabulate_facet_dofs(&self, dofs: &mut [usize], facet: usize) {
        let tdim = self.topological_dimension();
        assert!(tdim > 0, "A vertex cell has no facets.");
        self.tabulate_entity_closure_dofs(dofs, tdim - 1, facet);
    }

    fn tabulate_entity_dofs(&self, dofs: &mut [usize], d: usize, i: usize) {
        self.check_dimension(d);
        assert_eq!(dofs.len(), self.num_entity_dofs(d), "Dof buffer must have length num_entity_dofs(d).");
        match &self.layout {
            Layout::Primitive { entity_dofs, .. } => dofs.copy_from_slice(&entity_dofs[d][i]),
            Layout::Composite(_) => self.tabulate_local_composite(
                dofs,
                |sub| sub.num_entity_dofs(d),
                |sub, block| sub.tabulate_entity_dofs(block, d, i),
            ),
        }
    }

    fn tabulate_entity_closure_dofs(&self, dofs: &mut [usize], d: usize, i: usize) {
        self.check_dimension(d);
        assert_eq!(
            dofs.len(),
            self.num_entity_closure_dofs(d),
            "Dof buffer must have length num_entity_closure_dofs(d)."
        );
        match &self.layout {
            Layout::Primitive { entity_dofs, .. } => {
                let closure_dofs = self
                    .shape
                    .entity_closure(d, i)
                    .into_iter()
                    .flat_map(|(sub_dim, sub)| entity_dofs[sub_dim][sub].iter().copied());
                for (dof, local) in dofs.iter_mut().zip(closure_dofs) {
                    *dof = local;
                }
            }
            Layout::Composite(_) => self.tabulate_local_composite(
                dofs,
                |sub| sub.num_entity_closure_dofs(d),
                |sub, block| sub.tabulate_entity_closure_dofs(block, d, i),
            ),
        }
    }

    fn num_sub_dofmaps(&self) -> usize {
        self.sub_dofmaps().len()
    }

    fn create_sub_dofmap(&self, i: usize) -> Option<Box<dyn Dofmap>> {
        self.sub_dofmaps()
            .get(i)
            .map(|sub| Box::new(sub.clone()) as Box<dyn Dofmap>)
    }

    fn create(&self) -> Box<dyn Dofmap> {
        Box::new(self.clone())
    }
}
