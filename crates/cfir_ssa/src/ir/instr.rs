use std::fmt;

use crate::{
    effects::Effects,
    error::{Error, Result},
    ir::{inst::Payload, ty::Ty, BlockId, InstId, NodeId},
    FxIndexMap,
};

// ---------------------------------------------------------------------------
// Instr
// ---------------------------------------------------------------------------

/// What changed when an instruction's cached data was recomputed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Invalidated {
    pub tys: bool,
    pub effects: bool,
}

impl Invalidated {
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.tys && !self.effects
    }
}

/// A payload together with the data derived from it.
///
/// Output types and effects are cached, and recomputed whenever the payload
/// or its arguments change. The number of outputs is fixed when the
/// instruction is created.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr<P> {
    payload: P,
    tys: Vec<Ty>,
    effects: Effects,
    generation: u32,
}

impl<P: Payload> Instr<P> {
    pub(crate) fn new(payload: P, ty_of: &dyn Fn(&NodeId) -> Ty) -> Self {
        let tys = payload.output_tys(ty_of);
        let effects = payload.effects();
        Self {
            payload,
            tys,
            effects,
            generation: 0,
        }
    }

    #[inline]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    #[inline]
    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Output types, primary output first.
    #[inline]
    pub fn tys(&self) -> &[Ty] {
        &self.tys
    }

    /// Type of the primary output, `Void` if there is none.
    #[inline]
    pub fn ty(&self) -> Ty {
        self.tys.first().copied().unwrap_or(Ty::Void)
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.tys.len()
    }

    #[inline]
    pub fn effects(&self) -> &Effects {
        &self.effects
    }

    /// Bumped every time the payload or its arguments change.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn args(&self) -> Vec<&NodeId> {
        self.payload.args()
    }

    /// Swaps the payload, keeping the output arity. Returns the old payload.
    ///
    /// `tys` are the output types of the new payload.
    pub(crate) fn replace_payload(&mut self, id: &InstId, payload: P, tys: Vec<Ty>) -> Result<P> {
        if tys.len() != self.tys.len() {
            return Err(Error::ArityChanged {
                id: id.clone(),
                expected: self.tys.len(),
                found: tys.len(),
            });
        }
        let old = std::mem::replace(&mut self.payload, payload);
        self.tys = tys;
        self.effects = self.payload.effects();
        self.generation += 1;
        Ok(old)
    }

    /// Overwrites the arguments positionally. Returns the old arguments.
    pub(crate) fn set_args(&mut self, args: &[NodeId]) -> Vec<NodeId> {
        let mut slots = Vec::new();
        self.payload.get_args_mut(&mut slots);
        let mut old = Vec::with_capacity(slots.len());
        for (slot, arg) in slots.into_iter().zip(args) {
            old.push(std::mem::replace(slot, arg.clone()));
        }
        self.generation += 1;
        old
    }

    /// Recomputes the cached data, given freshly computed output types.
    pub(crate) fn refresh(&mut self, tys: Vec<Ty>) -> Invalidated {
        let effects = self.payload.effects();
        let invalidated = Invalidated {
            // Arity is fixed, only the types themselves may move.
            tys: tys.len() == self.tys.len() && tys != self.tys,
            effects: effects != self.effects,
        };
        if invalidated.tys {
            self.tys = tys;
        }
        if invalidated.effects {
            self.effects = effects;
        }
        invalidated
    }

    pub(crate) fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }
}

impl<P: Payload> fmt::Display for Instr<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.payload, f)
    }
}

// ---------------------------------------------------------------------------
// Phi
// ---------------------------------------------------------------------------

/// How many inputs a phi currently has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhiState {
    Empty,
    Single,
    Multi(usize),
}

/// A merge of values flowing in from predecessor blocks.
///
/// Inputs are keyed by incoming block and always mirror the predecessors of
/// the owning block. An input that has not been provided yet is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Phi {
    class: Ty,
    inputs: FxIndexMap<BlockId, Option<NodeId>>,
}

impl Phi {
    pub fn new(class: Ty) -> Self {
        Self {
            class,
            inputs: FxIndexMap::default(),
        }
    }

    pub(crate) fn with_inputs(
        class: Ty,
        inputs: impl IntoIterator<Item = (BlockId, Option<NodeId>)>,
    ) -> Self {
        Self {
            class,
            inputs: inputs.into_iter().collect(),
        }
    }

    /// The type of the phi's output; every input must be a subtype of it.
    #[inline]
    pub fn class(&self) -> Ty {
        self.class
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn state(&self) -> PhiState {
        match self.inputs.len() {
            0 => PhiState::Empty,
            1 => PhiState::Single,
            n => PhiState::Multi(n),
        }
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&BlockId, Option<&NodeId>)> {
        self.inputs.iter().map(|(block, node)| (block, node.as_ref()))
    }

    /// `None` if `block` is not an incoming block, `Some(None)` if it is but
    /// its input is unset.
    pub fn input(&self, block: &BlockId) -> Option<Option<&NodeId>> {
        self.inputs.get(block).map(Option::as_ref)
    }

    pub fn has_incoming(&self, block: &BlockId) -> bool {
        self.inputs.contains_key(block)
    }

    /// The set inputs, in incoming block order.
    pub fn args(&self) -> Vec<&NodeId> {
        self.inputs.values().flatten().collect()
    }

    pub fn is_complete(&self) -> bool {
        self.inputs.values().all(Option::is_some)
    }

    /// The value every input agrees on, ignoring references to the phi
    /// itself. `None` if inputs disagree or any input is unset.
    pub fn unique_input(&self, this: &NodeId) -> Option<&NodeId> {
        let mut unique = None;
        for node in self.inputs.values() {
            let node = node.as_ref()?;
            if node == this {
                continue;
            }
            match unique {
                None => unique = Some(node),
                Some(seen) if seen == node => {}
                Some(_) => return None,
            }
        }
        unique
    }

    pub(crate) fn set_input(
        &mut self,
        id: &InstId,
        block: &BlockId,
        node: Option<NodeId>,
    ) -> Result<Option<NodeId>> {
        match self.inputs.get_mut(block) {
            Some(slot) => Ok(std::mem::replace(slot, node)),
            None => Err(Error::NoSuchPredecessor {
                phi: id.clone(),
                block: block.clone(),
            }),
        }
    }

    /// Overwrites the set inputs positionally.
    pub(crate) fn set_args(&mut self, args: &[NodeId]) -> Vec<NodeId> {
        let slots = self.inputs.values_mut().flatten();
        let mut old = Vec::new();
        for (slot, arg) in slots.zip(args) {
            old.push(std::mem::replace(slot, arg.clone()));
        }
        old
    }

    pub(crate) fn add_unset_input(&mut self, block: BlockId) {
        self.inputs.entry(block).or_insert(None);
    }

    pub(crate) fn remove_input(&mut self, block: &BlockId) -> Option<Option<NodeId>> {
        self.inputs.shift_remove(block)
    }

    /// Re-keys the input coming from `from` to each block of `to`, in place.
    pub(crate) fn rekey_input(&mut self, from: &BlockId, to: &[BlockId]) {
        if !self.inputs.contains_key(from) {
            return;
        }
        let inputs = std::mem::take(&mut self.inputs);
        for (block, node) in inputs {
            if &block == from {
                for new in to {
                    self.inputs.insert(new.clone(), node.clone());
                }
            } else {
                self.inputs.insert(block, node);
            }
        }
    }
}

impl fmt::Display for Phi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phi {} [", self.class)?;
        let mut inputs: Vec<_> = self.inputs.iter().collect();
        inputs.sort_by(|a, b| a.0.cmp(b.0));
        for (i, (block, node)) in inputs.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match node {
                Some(node) => write!(f, "{}: {}", block, node)?,
                None => write!(f, "{}: _", block)?,
            }
        }
        write!(f, "]")
    }
}
