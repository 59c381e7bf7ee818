use crate::{base::SlabRef, typing::ValTypeID};

mod block;
mod cmp_cond;
mod constant;
mod global;
mod inst;
mod module;
mod opcode;
mod usedef;

pub mod builder;
pub mod checking;
pub mod reader;
pub mod writer;

pub(crate) use self::block::block_insts;
pub use self::{
    block::{BlockData, BlockRef},
    cmp_cond::CmpCond,
    constant::ConstData,
    global::{Func, GlobalData, GlobalRef, Var},
    inst::{InstCommon, InstData, InstKind, InstRef},
    module::{IRAllocs, Module},
    opcode::Opcode,
    usedef::{UseData, UseRef},
};

/// An SSA value: the operand universe of the IR.
///
/// Constants carry value semantics (two equal constants are the same
/// operand); instructions, blocks, globals and function arguments carry
/// reference semantics through their arena handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSSA {
    None,

    /// Constant data: integers, floats, null pointers, undef.
    ConstData(ConstData),

    /// Argument `index` of the function behind the global handle.
    FuncArg(GlobalRef, u32),

    /// A basic block, used as a jump target operand.
    Block(BlockRef),

    /// The result of an instruction.
    Inst(InstRef),

    /// A global object (function or variable), always pointer-typed.
    Global(GlobalRef),
}

impl ValueSSA {
    pub fn get_valtype(self, allocs: &IRAllocs) -> ValTypeID {
        match self {
            ValueSSA::None => ValTypeID::Void,
            ValueSSA::ConstData(data) => data.get_valtype(),
            ValueSSA::FuncArg(func, index) => {
                let GlobalData::Func(func) = func.to_data(&allocs.globals) else {
                    panic!("FuncArg value does not reference a function");
                };
                func.params[index as usize]
            }
            ValueSSA::Block(_) => ValTypeID::Void,
            ValueSSA::Inst(inst) => inst.to_data(&allocs.insts).common.ret_type,
            ValueSSA::Global(_) => ValTypeID::Ptr,
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self, ValueSSA::None)
    }
    pub fn is_const(self) -> bool {
        matches!(self, ValueSSA::ConstData(_))
    }
    pub fn as_inst(self) -> Option<InstRef> {
        match self {
            ValueSSA::Inst(inst) => Some(inst),
            _ => None,
        }
    }
    pub fn as_block(self) -> Option<BlockRef> {
        match self {
            ValueSSA::Block(block) => Some(block),
            _ => None,
        }
    }
    pub fn as_const(self) -> Option<ConstData> {
        match self {
            ValueSSA::ConstData(data) => Some(data),
            _ => None,
        }
    }
}

impl From<ConstData> for ValueSSA {
    fn from(data: ConstData) -> Self {
        ValueSSA::ConstData(data)
    }
}
impl From<InstRef> for ValueSSA {
    fn from(inst: InstRef) -> Self {
        ValueSSA::Inst(inst)
    }
}
impl From<BlockRef> for ValueSSA {
    fn from(block: BlockRef) -> Self {
        ValueSSA::Block(block)
    }
}
