//! Memory-to-register promotion.
//!
//! Promotes entry-block allocas whose every user is a same-typed load or a
//! store writing to the slot. Cheap shapes are handled directly (never
//! stored, stored once, used in a single block); everything else gets phis
//! over the iterated dominance frontier and a rename walk down the
//! dominator tree.

use std::collections::{HashMap, HashSet};

use log::debug;
use smallvec::SmallVec;

use crate::{
    base::SlabRef,
    ir::{
        BlockRef, ConstData, GlobalRef, IRAllocs, InstKind, InstRef, Module, Opcode, ValueSSA,
    },
    opt::analysis::{
        cfg,
        dominance::{DominanceFrontier, DominatorTree},
    },
    typing::ValTypeID,
};

pub fn mem2reg_pass(module: &mut Module) {
    for func in module.defined_funcs() {
        promote_func(&mut module.allocs, func);
    }
}

#[derive(Debug)]
struct PromoteInfo {
    alloca: InstRef,
    valty: ValTypeID,
    loads: SmallVec<[InstRef; 4]>,
    stores: SmallVec<[InstRef; 4]>,
}

fn promote_func(allocs: &mut IRAllocs, func: GlobalRef) {
    let dt = DominatorTree::compute(allocs, func);
    let infos = dump_promotable_allocas(allocs, func, &dt);
    if infos.is_empty() {
        return;
    }
    debug!(
        "mem2reg: function @{}, {} promotable allocas",
        func.name(allocs),
        infos.len()
    );
    let df = DominanceFrontier::compute(&dt, allocs);
    let preds = cfg::preds_map(allocs, func);
    for info in infos {
        promote_one_alloca(allocs, &dt, &df, &preds, info);
    }
}

fn dump_promotable_allocas(
    allocs: &IRAllocs,
    func: GlobalRef,
    dt: &DominatorTree,
) -> Vec<PromoteInfo> {
    let Some(entry) = func.expect_func(allocs).entry(allocs) else {
        return Vec::new();
    };
    let mut infos = Vec::new();
    for inst in entry.insts_vec(allocs) {
        let InstKind::Alloca { alloc_ty, .. } = inst.get_kind(allocs) else {
            continue;
        };
        if let Some(info) = alloca_as_promotable(allocs, dt, inst, alloc_ty) {
            infos.push(info);
        }
    }
    infos
}

/// An alloca is promotable when every user is a non-volatile load of the
/// slot's type or a non-volatile store *to* the slot of a same-typed value,
/// and every user sits in reachable code.
fn alloca_as_promotable(
    allocs: &IRAllocs,
    dt: &DominatorTree,
    alloca: InstRef,
    valty: ValTypeID,
) -> Option<PromoteInfo> {
    let mut loads = SmallVec::new();
    let mut stores = SmallVec::new();
    for use_ref in alloca.user_uses(allocs) {
        let user = use_ref.get_user(&allocs.uses);
        let data = user.to_data(&allocs.insts);
        let parent = data.get_parent()?;
        if dt.node_of(parent).is_none() {
            // the rename walk never reaches unreachable code
            return None;
        }
        match data.common.opcode {
            Opcode::Load => {
                if data.is_volatile() || data.common.ret_type != valty {
                    return None;
                }
                loads.push(user);
            }
            Opcode::Store => {
                // storing the slot address itself lets it escape
                let slot = data.common.operands.iter().position(|&u| u == use_ref)?;
                if slot != 1 || data.is_volatile() {
                    return None;
                }
                if user.store_value(allocs).get_valtype(allocs) != valty {
                    return None;
                }
                stores.push(user);
            }
            _ => return None,
        }
    }
    Some(PromoteInfo { alloca, valty, loads, stores })
}

fn promote_one_alloca(
    allocs: &mut IRAllocs,
    dt: &DominatorTree,
    df: &DominanceFrontier,
    preds: &HashMap<BlockRef, Vec<BlockRef>>,
    info: PromoteInfo,
) {
    if info.stores.is_empty() {
        return promote_nostore(allocs, info);
    }
    if info.stores.len() == 1 {
        return promote_single_store(allocs, dt, info);
    }
    if let Some(local_bb) = info_as_local(allocs, &info) {
        return promote_local(allocs, local_bb, info);
    }
    promote_general(allocs, dt, df, preds, info);
}

/// Never stored: every load produces undef.
fn promote_nostore(allocs: &mut IRAllocs, info: PromoteInfo) {
    let undef = ValueSSA::ConstData(ConstData::Undef(info.valty));
    for &load in &info.loads {
        load.replace_all_uses_with(allocs, undef);
        load.erase_from_parent(allocs);
    }
    info.alloca.erase_from_parent(allocs);
}

/// One store: loads it dominates read the stored value. Loads it does not
/// dominate keep the memory slot alive.
fn promote_single_store(allocs: &mut IRAllocs, dt: &DominatorTree, info: PromoteInfo) {
    let store = info.stores[0];
    let stored = store.store_value(allocs);
    let mut all_replaced = true;
    for &load in &info.loads {
        if !dt.inst_dominates(allocs, store, load) {
            all_replaced = false;
            continue;
        }
        load.replace_all_uses_with(allocs, stored);
        load.erase_from_parent(allocs);
    }
    if all_replaced {
        store.erase_from_parent(allocs);
        info.alloca.erase_from_parent(allocs);
    }
}

/// The block every load and store lives in, if it is just one block.
fn info_as_local(allocs: &IRAllocs, info: &PromoteInfo) -> Option<BlockRef> {
    let mut local = None;
    for inst in info.stores.iter().chain(info.loads.iter()) {
        let parent = inst.get_parent(allocs)?;
        match local {
            None => local = Some(parent),
            Some(bb) if bb != parent => return None,
            _ => {}
        }
    }
    local
}

/// All accesses in one block: a single ordered walk threads the value.
fn promote_local(allocs: &mut IRAllocs, local_bb: BlockRef, info: PromoteInfo) {
    let stores: HashSet<InstRef> = info.stores.iter().copied().collect();
    let loads: HashSet<InstRef> = info.loads.iter().copied().collect();
    let mut value = ValueSSA::ConstData(ConstData::Undef(info.valty));

    let mut cursor = local_bb.first_inst(allocs);
    while let Some(inst) = cursor {
        cursor = inst.next_in_block(allocs);
        if stores.contains(&inst) {
            value = inst.store_value(allocs);
        } else if loads.contains(&inst) {
            inst.replace_all_uses_with(allocs, value);
            inst.erase_from_parent(allocs);
        }
    }
    for &store in &info.stores {
        store.erase_from_parent(allocs);
    }
    info.alloca.erase_from_parent(allocs);
}

fn promote_general(
    allocs: &mut IRAllocs,
    dt: &DominatorTree,
    df: &DominanceFrontier,
    preds: &HashMap<BlockRef, Vec<BlockRef>>,
    info: PromoteInfo,
) {
    let dfn_phi = insert_phis(allocs, dt, df, preds, &info);

    let undef = ValueSSA::ConstData(ConstData::Undef(info.valty));
    let mut renamer = Renamer {
        allocs: &mut *allocs,
        dt,
        dfn_phi: &dfn_phi,
        stores: info.stores.iter().copied().collect(),
        loads: info.loads.iter().copied().collect(),
    };
    renamer.rename_one(0, undef);

    for &store in &info.stores {
        store.erase_from_parent(allocs);
    }
    info.alloca.erase_from_parent(allocs);
    cleanup_phis(allocs, &dfn_phi);
}

/// Phis land on the iterated dominance frontier of the store blocks, one
/// incoming slot per predecessor, initialized to undef until renaming.
fn insert_phis(
    allocs: &mut IRAllocs,
    dt: &DominatorTree,
    df: &DominanceFrontier,
    preds: &HashMap<BlockRef, Vec<BlockRef>>,
    info: &PromoteInfo,
) -> HashMap<usize, InstRef> {
    let mut phi_dfns: HashSet<usize> = HashSet::new();
    let mut worklist: Vec<usize> = Vec::new();
    for &store in &info.stores {
        let parent = store
            .get_parent(allocs)
            .expect("store users are attached by construction");
        if let Some(dfn) = dt.node_of(parent) {
            worklist.push(dfn);
        }
    }
    while let Some(dfn) = worklist.pop() {
        for &frontier in &df.df[dfn] {
            if phi_dfns.insert(frontier) {
                worklist.push(frontier);
            }
        }
    }

    let undef = ValueSSA::ConstData(ConstData::Undef(info.valty));
    let mut sorted: Vec<usize> = phi_dfns.into_iter().collect();
    sorted.sort_unstable();
    let mut dfn_phi = HashMap::new();
    for dfn in sorted {
        let block = dt.block_of(dfn);
        let pred_list = preds.get(&block).cloned().unwrap_or_default();
        let mut operands = Vec::with_capacity(pred_list.len() * 2);
        for &pred in &pred_list {
            operands.push(undef);
            operands.push(ValueSSA::Block(pred));
        }
        let phi = InstRef::new(allocs, Opcode::Phi, info.valty, InstKind::Phi, &operands);
        block.push_inst_front(allocs, phi);
        dfn_phi.insert(dfn, phi);
    }
    dfn_phi
}

struct Renamer<'r> {
    allocs: &'r mut IRAllocs,
    dt: &'r DominatorTree,
    dfn_phi: &'r HashMap<usize, InstRef>,
    stores: HashSet<InstRef>,
    loads: HashSet<InstRef>,
}

impl Renamer<'_> {
    /// Preorder walk of the dominator tree carrying the reaching value.
    fn rename_one(&mut self, dfn: usize, mut value: ValueSSA) {
        if let Some(&phi) = self.dfn_phi.get(&dfn) {
            value = ValueSSA::Inst(phi);
        }
        let block = self.dt.block_of(dfn);

        let mut cursor = block.first_inst(self.allocs);
        while let Some(inst) = cursor {
            cursor = inst.next_in_block(self.allocs);
            if self.stores.contains(&inst) {
                value = inst.store_value(self.allocs);
            } else if self.loads.contains(&inst) {
                inst.replace_all_uses_with(self.allocs, value);
                inst.erase_from_parent(self.allocs);
                self.loads.remove(&inst);
            }
        }

        for succ in block.successors(self.allocs) {
            let Some(succ_dfn) = self.dt.node_of(succ) else { continue };
            let Some(&phi) = self.dfn_phi.get(&succ_dfn) else { continue };
            set_phi_incoming(self.allocs, phi, block, value);
        }

        for &child in self.dt.children(dfn) {
            self.rename_one(child, value);
        }
    }
}

fn set_phi_incoming(allocs: &IRAllocs, phi: InstRef, pred: BlockRef, value: ValueSSA) {
    let count = phi.num_operands(allocs);
    for slot in (0..count).step_by(2) {
        if phi.get_operand(allocs, slot + 1) == ValueSSA::Block(pred) {
            phi.set_operand(allocs, slot, value);
            return;
        }
    }
    panic!("phi has no incoming slot for its predecessor");
}

/// Inserted phis that turned out to agree on one value collapse into it.
/// Collapsing one phi can expose another, so iterate to a fixed point.
fn cleanup_phis(allocs: &mut IRAllocs, dfn_phi: &HashMap<usize, InstRef>) {
    let mut live: Vec<InstRef> = {
        let mut phis: Vec<(usize, InstRef)> = dfn_phi.iter().map(|(&d, &p)| (d, p)).collect();
        phis.sort_unstable();
        phis.into_iter().map(|(_, p)| p).collect()
    };
    let mut changed = true;
    while changed {
        changed = false;
        let mut kept = Vec::with_capacity(live.len());
        for &phi in &live {
            match phi_single_value(allocs, phi) {
                Some(value) => {
                    phi.replace_all_uses_with(allocs, value);
                    phi.erase_from_parent(allocs);
                    changed = true;
                }
                None => kept.push(phi),
            }
        }
        live = kept;
    }
}

fn phi_single_value(allocs: &IRAllocs, phi: InstRef) -> Option<ValueSSA> {
    let ops = phi.operand_values(allocs);
    let mut unique = None;
    for pair in ops.chunks(2) {
        let incoming = pair[0];
        if incoming == ValueSSA::Inst(phi) {
            continue;
        }
        match unique {
            None => unique = Some(incoming),
            Some(seen) if seen == incoming => {}
            Some(_) => return None,
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::checking::verify_module, testing::cases::parse_or_panic};

    fn count_opcode(module: &Module, func: &str, opcode: Opcode) -> usize {
        let func = module.get_global_by_name(func).unwrap();
        func.blocks_vec(&module.allocs)
            .iter()
            .flat_map(|b| b.insts_vec(&module.allocs))
            .filter(|inst| inst.get_opcode(&module.allocs) == opcode)
            .count()
    }

    #[test]
    fn promotes_single_block_slot() {
        let mut module = parse_or_panic(
            r#"
            define i32 @f(i32 %x) {
            entry:
              %p = alloca i32
              store i32 %x, ptr %p
              %v = load i32, ptr %p
              %w = add i32 %v, 1
              ret i32 %w
            }
            "#,
        );
        mem2reg_pass(&mut module);
        verify_module(&module).expect("promoted module must verify");
        assert_eq!(count_opcode(&module, "f", Opcode::Alloca), 0);
        assert_eq!(count_opcode(&module, "f", Opcode::Load), 0);
        assert_eq!(count_opcode(&module, "f", Opcode::Store), 0);
    }

    #[test]
    fn promotes_branchy_slot_with_phi() {
        let mut module = parse_or_panic(
            r#"
            define i32 @f(i1 %c, i32 %x, i32 %y) {
            entry:
              %p = alloca i32
              br i1 %c, label %then, label %else
            then:
              store i32 %x, ptr %p
              br label %merge
            else:
              store i32 %y, ptr %p
              br label %merge
            merge:
              %v = load i32, ptr %p
              ret i32 %v
            }
            "#,
        );
        mem2reg_pass(&mut module);
        verify_module(&module).expect("promoted module must verify");
        assert_eq!(count_opcode(&module, "f", Opcode::Alloca), 0);
        assert_eq!(count_opcode(&module, "f", Opcode::Load), 0);
        assert_eq!(count_opcode(&module, "f", Opcode::Store), 0);
        assert_eq!(count_opcode(&module, "f", Opcode::Phi), 1);
    }

    #[test]
    fn promotes_loop_counter() {
        let mut module = parse_or_panic(
            r#"
            define i32 @f(i32 %n) {
            entry:
              %p = alloca i32
              store i32 0, ptr %p
              br label %header
            header:
              %i = load i32, ptr %p
              %c = icmp slt i32 %i, %n
              br i1 %c, label %body, label %exit
            body:
              %next = add i32 %i, 1
              store i32 %next, ptr %p
              br label %header
            exit:
              %r = load i32, ptr %p
              ret i32 %r
            }
            "#,
        );
        mem2reg_pass(&mut module);
        verify_module(&module).expect("promoted module must verify");
        assert_eq!(count_opcode(&module, "f", Opcode::Alloca), 0);
        assert_eq!(count_opcode(&module, "f", Opcode::Load), 0);
        assert_eq!(count_opcode(&module, "f", Opcode::Store), 0);
        assert!(count_opcode(&module, "f", Opcode::Phi) >= 1);
    }

    #[test]
    fn never_stored_slot_reads_undef() {
        let mut module = parse_or_panic(
            r#"
            define i32 @f() {
            entry:
              %p = alloca i32
              %v = load i32, ptr %p
              ret i32 %v
            }
            "#,
        );
        mem2reg_pass(&mut module);
        verify_module(&module).expect("promoted module must verify");
        assert_eq!(count_opcode(&module, "f", Opcode::Alloca), 0);
        assert_eq!(count_opcode(&module, "f", Opcode::Load), 0);
    }

    #[test]
    fn escaping_slot_is_left_alone() {
        let mut module = parse_or_panic(
            r#"
            declare void @sink(ptr)
            define void @f() {
            entry:
              %p = alloca i32
              call void @sink(ptr %p)
              ret void
            }
            "#,
        );
        mem2reg_pass(&mut module);
        verify_module(&module).expect("module must verify");
        assert_eq!(count_opcode(&module, "f", Opcode::Alloca), 1);
    }

    #[test]
    fn stored_address_is_left_alone() {
        let mut module = parse_or_panic(
            r#"
            define void @f(ptr %q) {
            entry:
              %p = alloca i32
              store ptr %p, ptr %q
              ret void
            }
            "#,
        );
        mem2reg_pass(&mut module);
        verify_module(&module).expect("module must verify");
        assert_eq!(count_opcode(&module, "f", Opcode::Alloca), 1);
        assert_eq!(count_opcode(&module, "f", Opcode::Store), 1);
    }

    #[test]
    fn volatile_access_blocks_promotion() {
        let mut module = parse_or_panic(
            r#"
            define i32 @f(i32 %x) {
            entry:
              %p = alloca i32
              store i32 %x, ptr %p
              %v = load volatile i32, ptr %p
              ret i32 %v
            }
            "#,
        );
        mem2reg_pass(&mut module);
        verify_module(&module).expect("module must verify");
        assert_eq!(count_opcode(&module, "f", Opcode::Alloca), 1);
        assert_eq!(count_opcode(&module, "f", Opcode::Load), 1);
    }
}
