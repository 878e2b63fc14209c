//! Beam state carried between rounds, with persistent ancestry.
//!
//! Ancestry is a parent-linked structure rather than a per-element list:
//! when several accepted candidates share one origin, each child holds a
//! reference to the parent's node and its own `(polyhedron, reward)` pair,
//! so siblings never alias a shared list. The full root path is
//! materialized only on demand.

use std::rc::Rc;

use crate::station::PolyId;

/// One node of the parent-linked ancestry chain.
#[derive(Debug)]
pub struct Ancestry {
    parent: Option<Rc<Ancestry>>,
    poly: PolyId,
    reward: f64,
}

impl Ancestry {
    /// Chain of length one, for the root part.
    pub fn root(poly: PolyId) -> Rc<Self> {
        Rc::new(Self {
            parent: None,
            poly,
            reward: 0.0,
        })
    }

    /// Extend the chain by one accepted cut.
    pub fn child(self: &Rc<Self>, poly: PolyId, reward: f64) -> Rc<Self> {
        Rc::new(Self {
            parent: Some(Rc::clone(self)),
            poly,
            reward,
        })
    }

    /// Number of nodes from the root to this one, inclusive. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        let mut n = 1;
        let mut cur = self.parent.as_deref();
        while let Some(node) = cur {
            n += 1;
            cur = node.parent.as_deref();
        }
        n
    }

    /// Root-to-self path as `(polyhedron, reward)` pairs.
    pub fn path(&self) -> Vec<(PolyId, f64)> {
        let mut out = Vec::with_capacity(self.len());
        let mut cur = Some(self);
        while let Some(node) = cur {
            out.push((node.poly, node.reward));
            cur = node.parent.as_deref();
        }
        out.reverse();
        out
    }
}

/// One retained decomposition state: the current remainder polyhedron, its
/// cumulative reward and residual, and its ancestry chain.
#[derive(Clone, Debug)]
pub struct BeamElement {
    pub poly: PolyId,
    pub reward: f64,
    pub residual: f64,
    pub ancestry: Rc<Ancestry>,
}

impl BeamElement {
    /// Seed element for the whole part.
    pub fn root(poly: PolyId) -> Self {
        Self {
            poly,
            reward: 0.0,
            residual: 0.0,
            ancestry: Ancestry::root(poly),
        }
    }
}

/// The bounded frontier of best-so-far decomposition states.
#[derive(Clone, Debug, Default)]
pub struct Beam {
    elems: Vec<BeamElement>,
}

impl Beam {
    pub fn seeded(root: PolyId) -> Self {
        Self {
            elems: vec![BeamElement::root(root)],
        }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn get(&self, i: usize) -> &BeamElement {
        &self.elems[i]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BeamElement> {
        self.elems.iter()
    }

    /// Best cumulative reward currently on the beam (0 when empty).
    pub fn best_reward(&self) -> f64 {
        self.elems.iter().map(|e| e.reward).fold(0.0, f64::max)
    }

    /// Commit the next round's elements, dropping the previous frontier.
    pub fn replace(&mut self, elems: Vec<BeamElement>) {
        self.elems = elems;
    }
}
