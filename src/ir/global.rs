//! Global objects: functions and global variables.

use crate::{
    SymbolStr,
    base::{SlabList, SlabRef},
    impl_slabref,
    ir::{BlockRef, IRAllocs},
    typing::ValTypeID,
};

#[derive(Debug)]
pub enum GlobalData {
    Func(Func),
    Var(Var),
}

/// A function. `body` is `None` for external declarations; a defined
/// function owns an ordered block list whose first block is the entry.
#[derive(Debug)]
pub struct Func {
    pub name: SymbolStr,
    pub ret_type: ValTypeID,
    pub params: Vec<ValTypeID>,
    pub body: Option<SlabList<BlockRef>>,
}

/// A global variable; referenced by address, always pointer-typed as a
/// value.
#[derive(Debug)]
pub struct Var {
    pub name: SymbolStr,
    pub value_ty: ValTypeID,
}

impl GlobalData {
    pub fn name(&self) -> &SymbolStr {
        match self {
            GlobalData::Func(func) => &func.name,
            GlobalData::Var(var) => &var.name,
        }
    }
    pub fn as_func(&self) -> Option<&Func> {
        match self {
            GlobalData::Func(func) => Some(func),
            GlobalData::Var(_) => None,
        }
    }
}

impl Func {
    pub fn is_extern(&self) -> bool {
        self.body.is_none()
    }
    pub fn body(&self) -> &SlabList<BlockRef> {
        self.body
            .as_ref()
            .expect("function body requested on an external declaration")
    }
    pub fn entry(&self, allocs: &IRAllocs) -> Option<BlockRef> {
        self.body.as_ref()?.front(&allocs.blocks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalRef(usize);
impl_slabref!(GlobalRef, GlobalData);

impl GlobalRef {
    pub fn as_func(self, allocs: &IRAllocs) -> Option<&Func> {
        self.to_data(&allocs.globals).as_func()
    }
    pub fn expect_func(self, allocs: &IRAllocs) -> &Func {
        self.as_func(allocs)
            .expect("global handle does not reference a function")
    }
    pub fn name(self, allocs: &IRAllocs) -> SymbolStr {
        self.to_data(&allocs.globals).name().clone()
    }

    /// Blocks of a defined function, in layout order.
    pub fn blocks_vec(self, allocs: &IRAllocs) -> Vec<BlockRef> {
        match &self.expect_func(allocs).body {
            Some(body) => body.collect_refs(&allocs.blocks),
            None => Vec::new(),
        }
    }
}
