//! Focus-based IR construction.
//!
//! The builder keeps a focused block; instruction constructors append there
//! (before the terminator once one exists). The reader and the test cases
//! are the main clients.

use crate::{
    SymbolStr,
    base::{SlabList, SlabRef},
    ir::{
        BlockRef, CmpCond, ConstData, Func, GlobalData, GlobalRef, InstKind, InstRef, Module,
        Opcode, ValueSSA, Var,
    },
    typing::ValTypeID,
};

pub struct IRBuilder<'ir> {
    pub module: &'ir mut Module,
    focus: BlockRef,
}

impl<'ir> IRBuilder<'ir> {
    pub fn new(module: &'ir mut Module) -> Self {
        Self { module, focus: BlockRef::new_null() }
    }

    pub fn set_focus(&mut self, block: BlockRef) {
        self.focus = block;
    }
    pub fn focus(&self) -> BlockRef {
        self.focus
    }

    pub fn declare_func(
        &mut self,
        name: impl Into<SymbolStr>,
        ret_type: ValTypeID,
        params: &[ValTypeID],
    ) -> GlobalRef {
        self.module.insert_global(GlobalData::Func(Func {
            name: name.into(),
            ret_type,
            params: params.to_vec(),
            body: None,
        }))
    }

    pub fn define_func(
        &mut self,
        name: impl Into<SymbolStr>,
        ret_type: ValTypeID,
        params: &[ValTypeID],
    ) -> GlobalRef {
        let body = SlabList::from_slab(&mut self.module.allocs.blocks);
        self.module.insert_global(GlobalData::Func(Func {
            name: name.into(),
            ret_type,
            params: params.to_vec(),
            body: Some(body),
        }))
    }

    pub fn declare_var(&mut self, name: impl Into<SymbolStr>, value_ty: ValTypeID) -> GlobalRef {
        self.module
            .insert_global(GlobalData::Var(Var { name: name.into(), value_ty }))
    }

    /// Appends a new block to `func` and returns it. Does not move focus.
    pub fn append_block(&mut self, func: GlobalRef, name: impl Into<SymbolStr>) -> BlockRef {
        let block = BlockRef::new(&mut self.module.allocs, name);
        block.set_parent(&self.module.allocs, func);
        let allocs = &self.module.allocs;
        func.expect_func(allocs)
            .body()
            .push_back_ref(&allocs.blocks, block)
            .expect("function body list must accept blocks");
        block
    }

    fn insert(
        &mut self,
        opcode: Opcode,
        ret_type: ValTypeID,
        kind: InstKind,
        operands: &[ValueSSA],
    ) -> InstRef {
        assert!(self.focus.is_nonnull(), "builder has no focused block");
        let inst = InstRef::new(&mut self.module.allocs, opcode, ret_type, kind, operands);
        let allocs = &self.module.allocs;
        match self.focus.terminator(allocs) {
            Some(term) => self.focus.insert_inst_before(allocs, inst, term),
            None => self.focus.push_inst_back(allocs, inst),
        }
        inst
    }

    fn insert_terminator(
        &mut self,
        opcode: Opcode,
        kind: InstKind,
        operands: &[ValueSSA],
    ) -> InstRef {
        assert!(
            self.focus.is_nonnull() && self.focus.terminator(&self.module.allocs).is_none(),
            "focused block already has a terminator"
        );
        let inst = InstRef::new(&mut self.module.allocs, opcode, ValTypeID::Void, kind, operands);
        self.focus.push_inst_back(&self.module.allocs, inst);
        inst
    }

    pub fn build_binop(
        &mut self,
        opcode: Opcode,
        ty: ValTypeID,
        lhs: ValueSSA,
        rhs: ValueSSA,
    ) -> InstRef {
        debug_assert!(
            opcode.is_int_arith()
                || opcode.is_float_arith()
                || opcode.is_logic_op()
                || opcode.is_shift_op()
        );
        self.insert(opcode, ty, InstKind::Binary, &[lhs, rhs])
    }

    pub fn build_fneg(&mut self, ty: ValTypeID, value: ValueSSA) -> InstRef {
        self.insert(Opcode::Fneg, ty, InstKind::Binary, &[value])
    }

    pub fn build_icmp(&mut self, cond: CmpCond, lhs: ValueSSA, rhs: ValueSSA) -> InstRef {
        debug_assert!(cond.is_int());
        self.insert(Opcode::Icmp, ValTypeID::new_boolean(), InstKind::Cmp(cond), &[lhs, rhs])
    }
    pub fn build_fcmp(&mut self, cond: CmpCond, lhs: ValueSSA, rhs: ValueSSA) -> InstRef {
        debug_assert!(cond.is_float());
        self.insert(Opcode::Fcmp, ValTypeID::new_boolean(), InstKind::Cmp(cond), &[lhs, rhs])
    }

    pub fn build_cast(&mut self, opcode: Opcode, value: ValueSSA, to_ty: ValTypeID) -> InstRef {
        debug_assert!(opcode.is_cast());
        self.insert(opcode, to_ty, InstKind::Cast, &[value])
    }

    pub fn build_load(
        &mut self,
        ty: ValTypeID,
        ptr: ValueSSA,
        volatile: bool,
        align: u32,
    ) -> InstRef {
        self.insert(Opcode::Load, ty, InstKind::Load { volatile, align }, &[ptr])
    }

    pub fn build_store(
        &mut self,
        value: ValueSSA,
        ptr: ValueSSA,
        volatile: bool,
        align: u32,
    ) -> InstRef {
        self.insert(
            Opcode::Store,
            ValTypeID::Void,
            InstKind::Store { volatile, align },
            &[value, ptr],
        )
    }

    pub fn build_alloca(&mut self, alloc_ty: ValTypeID, align: u32) -> InstRef {
        self.insert(Opcode::Alloca, ValTypeID::Ptr, InstKind::Alloca { alloc_ty, align }, &[])
    }

    pub fn build_gep(
        &mut self,
        elem_ty: ValTypeID,
        base: ValueSSA,
        indices: &[ValueSSA],
    ) -> InstRef {
        let mut operands = Vec::with_capacity(indices.len() + 1);
        operands.push(base);
        operands.extend_from_slice(indices);
        self.insert(Opcode::Gep, ValTypeID::Ptr, InstKind::Gep { elem_ty }, &operands)
    }

    pub fn build_select(
        &mut self,
        ty: ValTypeID,
        cond: ValueSSA,
        then_val: ValueSSA,
        else_val: ValueSSA,
    ) -> InstRef {
        self.insert(Opcode::Select, ty, InstKind::Select, &[cond, then_val, else_val])
    }

    pub fn build_call(
        &mut self,
        ret_type: ValTypeID,
        callee: ValueSSA,
        args: &[ValueSSA],
    ) -> InstRef {
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend_from_slice(args);
        self.insert(Opcode::Call, ret_type, InstKind::Call, &operands)
    }

    pub fn build_vaarg(&mut self, ret_type: ValTypeID, ap: ValueSSA) -> InstRef {
        self.insert(Opcode::VaArg, ret_type, InstKind::VaArg, &[ap])
    }

    /// Phi operands alternate `[value, block]` pairs in incoming order.
    pub fn build_phi(&mut self, ty: ValTypeID, incomings: &[(ValueSSA, BlockRef)]) -> InstRef {
        let mut operands = Vec::with_capacity(incomings.len() * 2);
        for &(value, block) in incomings {
            operands.push(value);
            operands.push(ValueSSA::Block(block));
        }
        self.insert(Opcode::Phi, ty, InstKind::Phi, &operands)
    }

    pub fn set_ret(&mut self, value: Option<ValueSSA>) -> InstRef {
        match value {
            Some(value) => self.insert_terminator(Opcode::Ret, InstKind::Ret, &[value]),
            None => self.insert_terminator(Opcode::Ret, InstKind::Ret, &[]),
        }
    }
    pub fn set_jump(&mut self, target: BlockRef) -> InstRef {
        self.insert_terminator(Opcode::Jump, InstKind::Jump, &[ValueSSA::Block(target)])
    }
    pub fn set_branch(&mut self, cond: ValueSSA, then_bb: BlockRef, else_bb: BlockRef) -> InstRef {
        self.insert_terminator(
            Opcode::Br,
            InstKind::Br,
            &[cond, ValueSSA::Block(then_bb), ValueSSA::Block(else_bb)],
        )
    }
    /// Switch operands: `[value, default, case-const, case-block, ...]`.
    pub fn set_switch(
        &mut self,
        value: ValueSSA,
        default: BlockRef,
        cases: &[(ConstData, BlockRef)],
    ) -> InstRef {
        let mut operands = vec![value, ValueSSA::Block(default)];
        for &(case_val, case_bb) in cases {
            operands.push(ValueSSA::ConstData(case_val));
            operands.push(ValueSSA::Block(case_bb));
        }
        self.insert_terminator(Opcode::Switch, InstKind::Switch, &operands)
    }
    pub fn set_unreachable(&mut self) -> InstRef {
        self.insert_terminator(Opcode::Unreachable, InstKind::Unreachable, &[])
    }
}
