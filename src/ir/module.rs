use std::collections::HashMap;

use slab::Slab;

use crate::{
    SymbolStr,
    base::SlabRef,
    ir::{BlockData, GlobalData, GlobalRef, InstData, UseData},
    typing::DataLayout,
};

/// The arenas every IR entity lives in. Handles index into these slabs;
/// erasure returns the slot to the arena immediately.
#[derive(Debug)]
pub struct IRAllocs {
    pub insts: Slab<InstData>,
    pub blocks: Slab<BlockData>,
    pub globals: Slab<GlobalData>,
    pub uses: Slab<UseData>,
}

impl IRAllocs {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }
    pub fn with_capacity(base_capacity: usize) -> Self {
        Self {
            insts: Slab::with_capacity(base_capacity * 8),
            blocks: Slab::with_capacity(base_capacity),
            globals: Slab::with_capacity(16),
            uses: Slab::with_capacity(base_capacity * 16),
        }
    }
}

impl Default for IRAllocs {
    fn default() -> Self {
        Self::new()
    }
}

/// A compilation module: an ordered sequence of global objects plus the
/// arenas backing them. Identity-stable while a pass runs.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub layout: DataLayout,
    pub allocs: IRAllocs,
    globals: Vec<GlobalRef>,
    global_names: HashMap<SymbolStr, GlobalRef>,
}

impl Module {
    pub fn new(name: impl Into<String>, layout: DataLayout) -> Self {
        Self {
            name: name.into(),
            layout,
            allocs: IRAllocs::new(),
            globals: Vec::new(),
            global_names: HashMap::new(),
        }
    }
    pub fn new_host_arch(name: impl Into<String>) -> Self {
        Self::new(name, DataLayout::new_host())
    }

    /// Registers a global object, keeping declaration order.
    pub fn insert_global(&mut self, data: GlobalData) -> GlobalRef {
        let name = data.name().clone();
        let global = GlobalRef::from_handle(self.allocs.globals.insert(data));
        self.globals.push(global);
        self.global_names.insert(name, global);
        global
    }

    pub fn get_global_by_name(&self, name: &str) -> Option<GlobalRef> {
        self.global_names.get(name).copied()
    }

    /// Global objects in declaration order.
    pub fn globals(&self) -> &[GlobalRef] {
        &self.globals
    }

    /// Defined functions in declaration order.
    pub fn defined_funcs(&self) -> Vec<GlobalRef> {
        self.globals
            .iter()
            .copied()
            .filter(|g| {
                g.as_func(&self.allocs)
                    .is_some_and(|func| !func.is_extern())
            })
            .collect()
    }
}
