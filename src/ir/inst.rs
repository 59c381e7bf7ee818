//! Instructions.

use std::cell::Cell;

use smallvec::SmallVec;

use crate::{
    base::{SlabList, SlabListNode, SlabListNodeHead, SlabListNodeRef, SlabRef},
    impl_slabref,
    ir::{BlockRef, CmpCond, IRAllocs, Opcode, UseData, UseRef, ValueSSA},
    typing::ValTypeID,
};

/// State shared by every instruction: list linkage, parent block, opcode,
/// result type, operand slots and the user list of the result.
#[derive(Debug)]
pub struct InstCommon {
    pub(crate) node_head: Cell<SlabListNodeHead>,
    pub(crate) parent: Cell<BlockRef>,
    pub opcode: Opcode,
    pub ret_type: ValTypeID,
    pub operands: SmallVec<[UseRef; 4]>,
    pub users: SlabList<UseRef>,
}

impl InstCommon {
    fn new_guide() -> Self {
        Self {
            node_head: Cell::new(SlabListNodeHead::new()),
            parent: Cell::new(BlockRef::new_null()),
            opcode: Opcode::Guide,
            ret_type: ValTypeID::Void,
            operands: SmallVec::new(),
            users: SlabList::new_null(),
        }
    }
}

/// Opcode-specific state. Payloads take part in instruction identity
/// alongside the opcode, result type and operand sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstKind {
    Guide,
    /// Integer/float arithmetic, bit logic and shifts. `Fneg` uses this
    /// kind with a single operand.
    Binary,
    Cmp(CmpCond),
    Cast,
    Phi,
    Select,
    /// Pointer arithmetic; `elem_ty` is the indexed element type.
    Gep { elem_ty: ValTypeID },
    /// Pointer operand is operand 0.
    Load { volatile: bool, align: u32 },
    /// Value operand is operand 0, pointer operand is operand 1.
    Store { volatile: bool, align: u32 },
    Alloca { alloc_ty: ValTypeID, align: u32 },
    /// Callee is operand 0, arguments follow.
    Call,
    VaArg,
    Ret,
    Jump,
    Br,
    Switch,
    Unreachable,
}

#[derive(Debug)]
pub struct InstData {
    pub common: InstCommon,
    pub kind: InstKind,
}

impl SlabListNode for InstData {
    fn new_guide() -> Self {
        Self { common: InstCommon::new_guide(), kind: InstKind::Guide }
    }
    fn load_node_head(&self) -> SlabListNodeHead {
        self.common.node_head.get()
    }
    fn store_node_head(&self, node_head: SlabListNodeHead) {
        self.common.node_head.set(node_head);
    }
}

impl InstData {
    pub fn is_guide(&self) -> bool {
        matches!(self.kind, InstKind::Guide)
    }
    pub fn get_opcode(&self) -> Opcode {
        self.common.opcode
    }
    pub fn get_valtype(&self) -> ValTypeID {
        self.common.ret_type
    }
    pub fn get_parent(&self) -> Option<BlockRef> {
        let parent = self.common.parent.get();
        if parent.is_null() { None } else { Some(parent) }
    }
    pub fn set_parent(&self, parent: BlockRef) {
        self.common.parent.set(parent);
    }

    pub fn is_terminator(&self) -> bool {
        self.common.opcode.is_terminator()
    }
    pub fn is_phi(&self) -> bool {
        self.common.opcode == Opcode::Phi
    }

    pub fn is_volatile(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Load { volatile: true, .. } | InstKind::Store { volatile: true, .. }
        )
    }

    /// Conservative side-effect query: stores, calls, va_arg, volatile
    /// loads and terminators may have observable effects beyond their
    /// result value.
    pub fn may_have_side_effects(&self) -> bool {
        match self.kind {
            InstKind::Store { .. } | InstKind::Call | InstKind::VaArg => true,
            InstKind::Load { volatile, .. } => volatile,
            _ => self.is_terminator(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstRef(usize);
impl_slabref!(InstRef, InstData);
impl SlabListNodeRef for InstRef {}

impl InstRef {
    /// Allocates a new, detached instruction. Operand slots are created in
    /// order and linked into the user lists of the referenced values.
    pub fn new(
        allocs: &mut IRAllocs,
        opcode: Opcode,
        ret_type: ValTypeID,
        kind: InstKind,
        operands: &[ValueSSA],
    ) -> InstRef {
        debug_assert_ne!(opcode, Opcode::Guide, "cannot allocate a guide instruction");
        let users = SlabList::from_slab(&mut allocs.uses);
        let data = InstData {
            common: InstCommon {
                node_head: Cell::new(SlabListNodeHead::new()),
                parent: Cell::new(BlockRef::new_null()),
                opcode,
                ret_type,
                operands: SmallVec::new(),
                users,
            },
            kind,
        };
        let inst = InstRef::from_handle(allocs.insts.insert(data));
        for &value in operands {
            let use_ref = UseRef::from_handle(
                allocs.uses.insert(UseData::new(inst, ValueSSA::None)),
            );
            inst.to_data_mut(&mut allocs.insts).common.operands.push(use_ref);
            use_ref.set_operand(allocs, value);
        }
        inst
    }

    pub fn get_opcode(self, allocs: &IRAllocs) -> Opcode {
        self.to_data(&allocs.insts).get_opcode()
    }
    pub fn get_valtype(self, allocs: &IRAllocs) -> ValTypeID {
        self.to_data(&allocs.insts).get_valtype()
    }
    pub fn get_parent(self, allocs: &IRAllocs) -> Option<BlockRef> {
        self.to_data(&allocs.insts).get_parent()
    }
    pub fn get_kind(self, allocs: &IRAllocs) -> InstKind {
        self.to_data(&allocs.insts).kind
    }

    pub fn num_operands(self, allocs: &IRAllocs) -> usize {
        self.to_data(&allocs.insts).common.operands.len()
    }
    pub fn operand_use(self, allocs: &IRAllocs, index: usize) -> UseRef {
        self.to_data(&allocs.insts).common.operands[index]
    }
    pub fn get_operand(self, allocs: &IRAllocs, index: usize) -> ValueSSA {
        self.operand_use(allocs, index).get_operand(&allocs.uses)
    }
    pub fn set_operand(self, allocs: &IRAllocs, index: usize, value: ValueSSA) {
        self.operand_use(allocs, index).set_operand(allocs, value);
    }
    pub fn operand_values(self, allocs: &IRAllocs) -> SmallVec<[ValueSSA; 4]> {
        self.to_data(&allocs.insts)
            .common
            .operands
            .iter()
            .map(|u| u.get_operand(&allocs.uses))
            .collect()
    }

    pub fn is_terminator(self, allocs: &IRAllocs) -> bool {
        self.to_data(&allocs.insts).is_terminator()
    }
    pub fn is_volatile(self, allocs: &IRAllocs) -> bool {
        self.to_data(&allocs.insts).is_volatile()
    }
    pub fn may_have_side_effects(self, allocs: &IRAllocs) -> bool {
        self.to_data(&allocs.insts).may_have_side_effects()
    }

    pub fn has_users(self, allocs: &IRAllocs) -> bool {
        !self.to_data(&allocs.insts).common.users.is_empty()
    }
    pub fn is_use_empty(self, allocs: &IRAllocs) -> bool {
        !self.has_users(allocs)
    }
    pub fn user_count(self, allocs: &IRAllocs) -> usize {
        self.to_data(&allocs.insts).common.users.len()
    }
    /// Use nodes currently consuming this instruction's result.
    pub fn user_uses(self, allocs: &IRAllocs) -> Vec<UseRef> {
        self.to_data(&allocs.insts)
            .common
            .users
            .collect_refs(&allocs.uses)
    }

    /// Pointer operand of a Load.
    pub fn load_ptr(self, allocs: &IRAllocs) -> ValueSSA {
        debug_assert_eq!(self.get_opcode(allocs), Opcode::Load);
        self.get_operand(allocs, 0)
    }
    /// Value operand of a Store.
    pub fn store_value(self, allocs: &IRAllocs) -> ValueSSA {
        debug_assert_eq!(self.get_opcode(allocs), Opcode::Store);
        self.get_operand(allocs, 0)
    }
    /// Pointer operand of a Store.
    pub fn store_ptr(self, allocs: &IRAllocs) -> ValueSSA {
        debug_assert_eq!(self.get_opcode(allocs), Opcode::Store);
        self.get_operand(allocs, 1)
    }

    /// Structural identity: same opcode, same result type, same
    /// opcode-specific payload and the same ordered operand references.
    pub fn identical_to(self, other: InstRef, allocs: &IRAllocs) -> bool {
        let a = self.to_data(&allocs.insts);
        let b = other.to_data(&allocs.insts);
        if a.common.opcode != b.common.opcode
            || a.common.ret_type != b.common.ret_type
            || a.kind != b.kind
            || a.common.operands.len() != b.common.operands.len()
        {
            return false;
        }
        a.common
            .operands
            .iter()
            .zip(b.common.operands.iter())
            .all(|(&ua, &ub)| ua.get_operand(&allocs.uses) == ub.get_operand(&allocs.uses))
    }

    /// Next instruction in the parent block, `None` at the block's end.
    pub fn next_in_block(self, allocs: &IRAllocs) -> Option<InstRef> {
        let parent = self.get_parent(allocs)?;
        parent
            .to_data(&allocs.blocks)
            .insts
            .next_of(&allocs.insts, self)
    }

    /// Redirects every use of this instruction's result to `new_value`.
    /// O(user count): each use node is rewritten in place and moved to the
    /// new value's user list when it has one.
    pub fn replace_all_uses_with(self, allocs: &IRAllocs, new_value: ValueSSA) {
        assert_ne!(
            new_value,
            ValueSSA::Inst(self),
            "replace_all_uses_with: instruction cannot replace itself"
        );
        let users = &self.to_data(&allocs.insts).common.users;
        while let Some(use_ref) = users.front(&allocs.uses) {
            users
                .unplug_node(&allocs.uses, use_ref)
                .expect("user list front must be unpluggable");
            use_ref.to_data(&allocs.uses).operand.set(new_value);
            if let ValueSSA::Inst(new_inst) = new_value {
                new_inst
                    .to_data(&allocs.insts)
                    .common
                    .users
                    .push_back_ref(&allocs.uses, use_ref)
                    .expect("user list of a live instruction must accept nodes");
            }
        }
    }

    /// Unlinks this instruction from its block and releases its storage.
    ///
    /// The use list must be empty: erasing an instruction that still has
    /// consumers is a programming error. Operand slots are detached from
    /// their operands' user lists before the storage is freed.
    pub fn erase_from_parent(self, allocs: &mut IRAllocs) {
        let IRAllocs { insts, blocks, uses, .. } = allocs;
        {
            let data = self.to_data(insts);
            assert!(
                data.common.users.is_empty(),
                "erase_from_parent: instruction still has users"
            );
            for &use_ref in &data.common.operands {
                if let ValueSSA::Inst(target) = use_ref.get_operand(uses) {
                    target
                        .to_data(insts)
                        .common
                        .users
                        .unplug_node(uses, use_ref)
                        .expect("operand use must be linked into the target's user list");
                }
            }
            if let Some(parent) = data.get_parent() {
                parent
                    .to_data(blocks)
                    .insts
                    .unplug_node(insts, self)
                    .expect("instruction must be linked into its parent block");
            }
        }
        let data = insts.remove(self.get_handle());
        for use_ref in data.common.operands {
            uses.remove(use_ref.get_handle());
        }
        uses.remove(data.common.users.head_guide().get_handle());
        uses.remove(data.common.users.tail_guide().get_handle());
    }
}
