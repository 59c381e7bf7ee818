//! Basic blocks.

use std::cell::Cell;

use smallvec::SmallVec;

use crate::{
    SymbolStr,
    base::{SlabList, SlabListNode, SlabListNodeHead, SlabListNodeRef, SlabRef},
    impl_slabref,
    ir::{GlobalRef, IRAllocs, InstData, InstRef, ValueSSA},
};

/// A basic block: a label plus an ordered instruction list ending in one
/// terminator. Instruction order is load-bearing; the memory rules rely on
/// program order within the block.
#[derive(Debug)]
pub struct BlockData {
    pub(crate) node_head: Cell<SlabListNodeHead>,
    pub(crate) parent: Cell<GlobalRef>,
    pub name: SymbolStr,
    pub insts: SlabList<InstRef>,
}

impl SlabListNode for BlockData {
    fn new_guide() -> Self {
        Self {
            node_head: Cell::new(SlabListNodeHead::new()),
            parent: Cell::new(GlobalRef::new_null()),
            name: SymbolStr::default(),
            insts: SlabList::new_null(),
        }
    }
    fn load_node_head(&self) -> SlabListNodeHead {
        self.node_head.get()
    }
    fn store_node_head(&self, node_head: SlabListNodeHead) {
        self.node_head.set(node_head);
    }
}

impl BlockData {
    pub fn get_parent(&self) -> Option<GlobalRef> {
        let parent = self.parent.get();
        if parent.is_null() { None } else { Some(parent) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRef(usize);
impl_slabref!(BlockRef, BlockData);
impl SlabListNodeRef for BlockRef {}

impl BlockRef {
    /// Allocates a detached block with an empty instruction list.
    pub fn new(allocs: &mut IRAllocs, name: impl Into<SymbolStr>) -> BlockRef {
        let insts = SlabList::from_slab(&mut allocs.insts);
        let data = BlockData {
            node_head: Cell::new(SlabListNodeHead::new()),
            parent: Cell::new(GlobalRef::new_null()),
            name: name.into(),
            insts,
        };
        let block = BlockRef::from_handle(allocs.blocks.insert(data));
        // guide nodes report the block as their parent so cursor code can
        // always find the owning list
        let guides = {
            let insts = &block.to_data(&allocs.blocks).insts;
            [insts.head_guide(), insts.tail_guide()]
        };
        for guide in guides {
            guide.to_data(&allocs.insts).set_parent(block);
        }
        block
    }

    pub fn get_parent(self, allocs: &IRAllocs) -> Option<GlobalRef> {
        self.to_data(&allocs.blocks).get_parent()
    }
    pub fn set_parent(self, allocs: &IRAllocs, parent: GlobalRef) {
        self.to_data(&allocs.blocks).parent.set(parent);
    }

    pub fn first_inst(self, allocs: &IRAllocs) -> Option<InstRef> {
        self.to_data(&allocs.blocks).insts.front(&allocs.insts)
    }
    pub fn last_inst(self, allocs: &IRAllocs) -> Option<InstRef> {
        self.to_data(&allocs.blocks).insts.back(&allocs.insts)
    }
    pub fn inst_count(self, allocs: &IRAllocs) -> usize {
        self.to_data(&allocs.blocks).insts.len()
    }
    pub fn insts_vec(self, allocs: &IRAllocs) -> Vec<InstRef> {
        self.to_data(&allocs.blocks).insts.collect_refs(&allocs.insts)
    }

    /// The block terminator, when the last instruction is one.
    pub fn terminator(self, allocs: &IRAllocs) -> Option<InstRef> {
        let last = self.last_inst(allocs)?;
        if last.is_terminator(allocs) { Some(last) } else { None }
    }

    /// Successor blocks in terminator operand order. Duplicate edges are
    /// kept as written.
    pub fn successors(self, allocs: &IRAllocs) -> SmallVec<[BlockRef; 2]> {
        let Some(term) = self.terminator(allocs) else {
            return SmallVec::new();
        };
        let mut succs = SmallVec::new();
        for value in term.operand_values(allocs) {
            if let ValueSSA::Block(block) = value {
                succs.push(block);
            }
        }
        succs
    }

    /// Appends an instruction at the block's end.
    pub fn push_inst_back(self, allocs: &IRAllocs, inst: InstRef) {
        inst.to_data(&allocs.insts).set_parent(self);
        self.to_data(&allocs.blocks)
            .insts
            .push_back_ref(&allocs.insts, inst)
            .expect("block instruction list must accept nodes");
    }
    /// Inserts an instruction at the block's front (phi insertion point).
    pub fn push_inst_front(self, allocs: &IRAllocs, inst: InstRef) {
        inst.to_data(&allocs.insts).set_parent(self);
        self.to_data(&allocs.blocks)
            .insts
            .push_front_ref(&allocs.insts, inst)
            .expect("block instruction list must accept nodes");
    }
    /// Inserts `inst` right before `before`, which must live in this block.
    pub fn insert_inst_before(self, allocs: &IRAllocs, inst: InstRef, before: InstRef) {
        debug_assert_eq!(before.get_parent(allocs), Some(self));
        inst.to_data(&allocs.insts).set_parent(self);
        self.to_data(&allocs.blocks)
            .insts
            .node_add_prev(&allocs.insts, before, inst)
            .expect("block instruction list must accept nodes");
    }
}

/// Iterates instruction data of a block without materializing a vector.
pub(crate) fn block_insts<'a>(
    block: BlockRef,
    allocs: &'a IRAllocs,
) -> impl Iterator<Item = (InstRef, &'a InstData)> + 'a {
    block
        .to_data(&allocs.blocks)
        .insts
        .iter(&allocs.insts)
        .map(move |inst| (inst, inst.to_data(&allocs.insts)))
}
