//! Use-def edges.
//!
//! Every operand slot of an instruction is a `UseData` node in the uses
//! arena. A node whose operand is an instruction result is linked into that
//! instruction's user list, so redirecting all uses of a value is
//! proportional to its user count, never to the module size.

use std::cell::Cell;

use slab::Slab;

use crate::{
    base::{SlabListNode, SlabListNodeHead, SlabListNodeRef, SlabRef},
    impl_slabref,
    ir::{IRAllocs, InstRef, ValueSSA},
};

#[derive(Debug)]
pub struct UseData {
    pub(crate) node_head: Cell<SlabListNodeHead>,
    pub(crate) user: Cell<InstRef>,
    pub(crate) operand: Cell<ValueSSA>,
}

impl SlabListNode for UseData {
    fn new_guide() -> Self {
        Self {
            node_head: Cell::new(SlabListNodeHead::new()),
            user: Cell::new(InstRef::new_null()),
            operand: Cell::new(ValueSSA::None),
        }
    }
    fn load_node_head(&self) -> SlabListNodeHead {
        self.node_head.get()
    }
    fn store_node_head(&self, node_head: SlabListNodeHead) {
        self.node_head.set(node_head);
    }
}

impl UseData {
    pub fn new(user: InstRef, operand: ValueSSA) -> Self {
        Self {
            node_head: Cell::new(SlabListNodeHead::new()),
            user: Cell::new(user),
            operand: Cell::new(operand),
        }
    }

    pub fn get_user(&self) -> InstRef {
        self.user.get()
    }
    pub fn get_operand(&self) -> ValueSSA {
        self.operand.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UseRef(usize);
impl_slabref!(UseRef, UseData);
impl SlabListNodeRef for UseRef {}

impl UseRef {
    pub fn get_user(self, alloc: &Slab<UseData>) -> InstRef {
        self.to_data(alloc).get_user()
    }
    pub fn get_operand(self, alloc: &Slab<UseData>) -> ValueSSA {
        self.to_data(alloc).get_operand()
    }

    /// Rewrites this operand slot, maintaining the user list of the old and
    /// new operand values.
    pub fn set_operand(self, allocs: &IRAllocs, operand: ValueSSA) {
        let data = self.to_data(&allocs.uses);
        let old = data.operand.get();
        if old == operand {
            return;
        }
        if let ValueSSA::Inst(old_inst) = old {
            old_inst
                .to_data(&allocs.insts)
                .common
                .users
                .unplug_node(&allocs.uses, self)
                .expect("use node must be linked into its operand's user list");
        }
        data.operand.set(operand);
        if let ValueSSA::Inst(new_inst) = operand {
            new_inst
                .to_data(&allocs.insts)
                .common
                .users
                .push_back_ref(&allocs.uses, self)
                .expect("user list of a live instruction must accept nodes");
        }
    }

    /// Detaches this slot from whatever it referenced and leaves it empty.
    pub fn clear_operand(self, allocs: &IRAllocs) {
        self.set_operand(allocs, ValueSSA::None);
    }
}
