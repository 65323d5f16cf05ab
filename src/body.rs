//! Method bodies as arenas of instruction nodes. A node's [`InstrId`] is
//! its identity for the lifetime of the body: insertion and redirection
//! edit the order list or rewrite nodes in place, so branch operands
//! survive any amount of splicing without offset fix-ups.

use crate::il::{InstrId, Instruction, LocalIndex};
use crate::types::CilType;

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub ty: CilType,
    pub name: Option<String>,
}

/// An exception-handling region. Bounds are node identities, inclusive
/// on both ends of the protected range and the handler range. Weaving
/// never moves the covered nodes, so regions need no adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedRegion {
    pub try_start: InstrId,
    pub try_end: InstrId,
    pub handler_start: InstrId,
    pub handler_end: InstrId,
}

#[derive(Debug, Clone)]
pub struct MethodBody {
    /// The arena. Never reordered, never shrunk.
    nodes: Vec<Instruction>,
    /// Execution order: a permutation of a subset of arena ids. Nodes
    /// allocated but not yet placed do not appear here.
    order: Vec<InstrId>,
    locals: Vec<Local>,
    pub init_locals: bool,
    pub max_stack: usize,
    pub protected_regions: Vec<ProtectedRegion>,
}

impl MethodBody {
    /// Build a body from an instruction sequence. The initial
    /// instructions receive ids `0..len` in order, so branch operands in
    /// hand-written sequences may name targets by initial position.
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let order = (0..instructions.len()).map(InstrId).collect();
        MethodBody {
            nodes: instructions,
            order,
            locals: vec![],
            init_locals: false,
            max_stack: 8,
            protected_regions: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn first(&self) -> Option<InstrId> {
        self.order.first().copied()
    }

    pub fn last(&self) -> Option<InstrId> {
        self.order.last().copied()
    }

    pub fn instruction(&self, id: InstrId) -> &Instruction {
        &self.nodes[id.0]
    }

    /// Rewrite a node in place, preserving its identity. Everything that
    /// targeted the node still targets it afterwards.
    pub fn replace(&mut self, id: InstrId, instruction: Instruction) {
        self.nodes[id.0] = instruction;
    }

    /// Allocate nodes for a group without placing them in the order.
    pub fn alloc_group(&mut self, group: Vec<Instruction>) -> Vec<InstrId> {
        group
            .into_iter()
            .map(|instruction| {
                self.nodes.push(instruction);
                InstrId(self.nodes.len() - 1)
            })
            .collect()
    }

    pub fn position_of(&self, id: InstrId) -> Option<usize> {
        self.order.iter().position(|placed| *placed == id)
    }

    /// Place allocated nodes immediately before `target` in the order.
    pub fn insert_before(&mut self, target: InstrId, ids: &[InstrId]) {
        let position = self
            .position_of(target)
            .expect("insertion target must be placed in the body");
        self.order.splice(position..position, ids.iter().copied());
    }

    /// Place allocated nodes at the end of the order.
    pub fn append(&mut self, ids: &[InstrId]) {
        self.order.extend_from_slice(ids);
    }

    /// Iterate placed instructions in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instruction)> {
        self.order.iter().map(|id| (*id, &self.nodes[id.0]))
    }

    /// Ids of all placed return instructions, in execution order.
    pub fn return_sites(&self) -> Vec<InstrId> {
        self.iter()
            .filter(|(_, instruction)| instruction.is_return())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn locals(&self) -> &[Local] {
        &self.locals
    }

    /// Append a typed local slot. Existing slot indices are preserved.
    pub fn add_local(&mut self, ty: CilType, name: Option<&str>) -> LocalIndex {
        self.locals.push(Local {
            ty,
            name: name.map(str::to_string),
        });
        LocalIndex(self.locals.len() - 1)
    }

    /// Expand every compact encoding into its canonical long form and
    /// mark locals as zero-initialized. After this, insertion and
    /// branch-target reasoning never has to consider operand widths.
    pub fn normalize(&mut self) {
        for id in &self.order {
            self.nodes[id.0] = self.nodes[id.0].normalized();
        }
        self.init_locals = true;
    }

    /// Re-introduce compact encodings where operands fit. Branch forms
    /// are chosen by a layout fixed point: all branches start short and
    /// are widened until every displacement fits its encoding.
    pub fn compact(&mut self) {
        for id in self.order.clone() {
            let compacted = self.nodes[id.0].compacted();
            self.nodes[id.0] = compacted;
        }

        use Instruction::*;
        for id in self.order.clone() {
            let shortened = match &self.nodes[id.0] {
                Branch(t) => Some(BranchShort(*t)),
                BranchTruthy(t) => Some(BranchTruthyShort(*t)),
                BranchFalsy(t) => Some(BranchFalsyShort(*t)),
                _ => None,
            };
            if let Some(short) = shortened {
                self.nodes[id.0] = short;
            }
        }

        loop {
            let offsets = self.layout_offsets();
            let mut widened = false;
            for (position, id) in self.order.clone().into_iter().enumerate() {
                let instruction = &self.nodes[id.0];
                let Some(target) = instruction.branch_target() else {
                    continue;
                };
                let long = match instruction {
                    BranchShort(t) => Branch(*t),
                    BranchTruthyShort(t) => BranchTruthy(*t),
                    BranchFalsyShort(t) => BranchFalsy(*t),
                    _ => continue,
                };
                let target_position = self
                    .position_of(target)
                    .expect("branch target must be placed in the body");
                let next = offsets[position] + instruction.encoded_size();
                let displacement = offsets[target_position] as isize - next as isize;
                if i8::try_from(displacement).is_err() {
                    self.nodes[id.0] = long;
                    widened = true;
                }
            }
            if !widened {
                break;
            }
        }
    }

    /// Byte offset of each placed instruction under the current choice
    /// of encodings.
    fn layout_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.order.len());
        let mut offset = 0;
        for id in &self.order {
            offsets.push(offset);
            offset += self.nodes[id.0].encoded_size();
        }
        offsets
    }
}

impl std::ops::Index<InstrId> for MethodBody {
    type Output = Instruction;
    fn index(&self, id: InstrId) -> &Instruction {
        &self.nodes[id.0]
    }
}

/// Bodies compare by their observable program: locals, flags, regions,
/// and the placed instruction sequence with branch targets canonicalized
/// to order positions. Unplaced arena leftovers are ignored.
impl PartialEq for MethodBody {
    fn eq(&self, other: &Self) -> bool {
        if self.locals != other.locals
            || self.init_locals != other.init_locals
            || self.max_stack != other.max_stack
            || self.order.len() != other.order.len()
        {
            return false;
        }
        let region_positions = |body: &MethodBody| -> Vec<[Option<usize>; 4]> {
            body.protected_regions
                .iter()
                .map(|r| {
                    [
                        body.position_of(r.try_start),
                        body.position_of(r.try_end),
                        body.position_of(r.handler_start),
                        body.position_of(r.handler_end),
                    ]
                })
                .collect()
        };
        if region_positions(self) != region_positions(other) {
            return false;
        }
        let canonical = |body: &MethodBody, id: InstrId| {
            let mut instruction = body.nodes[id.0].clone();
            if let Some(target) = instruction.branch_target_mut() {
                *target = InstrId(body.position_of(*target).unwrap_or(usize::MAX));
            }
            instruction
        };
        self.order
            .iter()
            .zip(other.order.iter())
            .all(|(a, b)| canonical(self, *a) == canonical(other, *b))
    }
}
