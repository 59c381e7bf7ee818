//! IR well-formedness checks.
//!
//! Run after the rewrite passes by default. Any failure here points at a bug
//! in a pass, never at user input: the reader only produces well-formed
//! modules.

use thiserror::Error;

use crate::{
    base::SlabRef,
    ir::{BlockRef, GlobalRef, IRAllocs, InstRef, Module, UseRef, ValueSSA, block_insts},
    opt::analysis::{cfg, dominance::DominatorTree},
};

#[derive(Debug, Clone, Error)]
pub enum CheckError {
    #[error("function @{func}: block %{block} is empty")]
    EmptyBlock { func: String, block: String },

    #[error("function @{func}: block %{block} does not end in a terminator")]
    MissingTerminator { func: String, block: String },

    #[error("function @{func}: block %{block} has a terminator before its end")]
    TerminatorNotLast { func: String, block: String },

    #[error("function @{func}: block %{block} has a phi after a non-phi instruction")]
    PhiNotLeading { func: String, block: String },

    #[error("function @{func}: the entry block has predecessors")]
    EntryHasPredecessors { func: String },

    #[error("function @{func}: instruction operand references a freed handle")]
    DanglingOperand { func: String },

    #[error("function @{func}: use-list of an instruction disagrees with its operands")]
    UseListBroken { func: String },

    #[error("function @{func}: phi in %{block} does not cover its predecessors")]
    PhiIncomingMismatch { func: String, block: String },

    #[error("function @{func}: a use in %{block} is not dominated by its definition")]
    UseNotDominated { func: String, block: String },
}

pub fn verify_module(module: &Module) -> Result<(), CheckError> {
    for &global in module.globals() {
        if let Some(func) = global.as_func(&module.allocs) {
            if !func.is_extern() {
                verify_func(module, global)?;
            }
        }
    }
    Ok(())
}

fn verify_func(module: &Module, global: GlobalRef) -> Result<(), CheckError> {
    let allocs = &module.allocs;
    let func_name = global.name(allocs).to_string();
    let blocks = global.blocks_vec(allocs);

    for &block in &blocks {
        verify_block_shape(allocs, &func_name, block)?;
    }
    verify_use_lists(allocs, &func_name, &blocks)?;

    let dt = DominatorTree::compute(allocs, global);
    let preds = cfg::preds_map(allocs, global);
    if let Some(&entry) = blocks.first() {
        if preds.get(&entry).is_some_and(|p| !p.is_empty()) {
            return Err(CheckError::EntryHasPredecessors { func: func_name });
        }
    }
    for &block in &blocks {
        // SSA dominance only binds reachable code
        if !dt.dfs.is_reachable(block) {
            continue;
        }
        verify_block_ssa(allocs, &func_name, block, &dt, &preds)?;
    }
    Ok(())
}

fn block_name(allocs: &IRAllocs, block: BlockRef) -> String {
    block.to_data(&allocs.blocks).name.to_string()
}

fn verify_block_shape(
    allocs: &IRAllocs,
    func: &str,
    block: BlockRef,
) -> Result<(), CheckError> {
    let name = || block_name(allocs, block);
    let insts = block.insts_vec(allocs);
    let Some(&last) = insts.last() else {
        return Err(CheckError::EmptyBlock { func: func.into(), block: name() });
    };
    if !last.is_terminator(allocs) {
        return Err(CheckError::MissingTerminator { func: func.into(), block: name() });
    }
    let mut seen_non_phi = false;
    for &inst in &insts[..insts.len() - 1] {
        if inst.is_terminator(allocs) {
            return Err(CheckError::TerminatorNotLast { func: func.into(), block: name() });
        }
        let data = inst.to_data(&allocs.insts);
        if data.is_phi() {
            if seen_non_phi {
                return Err(CheckError::PhiNotLeading { func: func.into(), block: name() });
            }
        } else {
            seen_non_phi = true;
        }
    }
    Ok(())
}

/// Checks the two directions of use-list integrity: every operand slot that
/// names an instruction is linked into that instruction's user list, and
/// every user-list node points back at a live operand slot naming it.
fn verify_use_lists(
    allocs: &IRAllocs,
    func: &str,
    blocks: &[BlockRef],
) -> Result<(), CheckError> {
    let broken = || CheckError::UseListBroken { func: func.into() };
    for &block in blocks {
        for (inst, data) in block_insts(block, allocs) {
            for &use_ref in &data.common.operands {
                if !use_ref.is_alive(&allocs.uses) {
                    return Err(CheckError::DanglingOperand { func: func.into() });
                }
                let use_data = use_ref.to_data(&allocs.uses);
                if use_data.get_user() != inst {
                    return Err(broken());
                }
                if let ValueSSA::Inst(target) = use_data.get_operand() {
                    if !target.is_alive(&allocs.insts) {
                        return Err(CheckError::DanglingOperand { func: func.into() });
                    }
                    let listed = target
                        .to_data(&allocs.insts)
                        .common
                        .users
                        .iter(&allocs.uses)
                        .any(|u: UseRef| u == use_ref);
                    if !listed {
                        return Err(broken());
                    }
                }
            }
            for user in inst.user_uses(allocs) {
                let use_data = user.to_data(&allocs.uses);
                if use_data.get_operand() != ValueSSA::Inst(inst) {
                    return Err(broken());
                }
                let owner = use_data.get_user();
                if !owner.is_alive(&allocs.insts) {
                    return Err(broken());
                }
                let owned = owner
                    .to_data(&allocs.insts)
                    .common
                    .operands
                    .contains(&user);
                if !owned {
                    return Err(broken());
                }
            }
        }
    }
    Ok(())
}

fn verify_block_ssa(
    allocs: &IRAllocs,
    func: &str,
    block: BlockRef,
    dt: &DominatorTree,
    preds: &std::collections::HashMap<BlockRef, Vec<BlockRef>>,
) -> Result<(), CheckError> {
    let name = || block_name(allocs, block);
    for (inst, data) in block_insts(block, allocs) {
        if data.is_phi() {
            verify_phi(allocs, func, block, inst, dt, preds)?;
            continue;
        }
        for value in inst.operand_values(allocs) {
            let ValueSSA::Inst(def) = value else { continue };
            if !dt.inst_dominates(allocs, def, inst) {
                return Err(CheckError::UseNotDominated { func: func.into(), block: name() });
            }
        }
    }
    Ok(())
}

/// A phi must have exactly one incoming entry per predecessor block, and
/// each incoming instruction value must dominate the end of its edge.
fn verify_phi(
    allocs: &IRAllocs,
    func: &str,
    block: BlockRef,
    phi: InstRef,
    dt: &DominatorTree,
    preds: &std::collections::HashMap<BlockRef, Vec<BlockRef>>,
) -> Result<(), CheckError> {
    let name = || block_name(allocs, block);
    let mismatch = || CheckError::PhiIncomingMismatch { func: func.into(), block: name() };
    let pred_list = preds.get(&block).cloned().unwrap_or_default();

    let ops = phi.operand_values(allocs);
    let mut incoming_blocks = Vec::new();
    for pair in ops.chunks(2) {
        let &[value, block_value] = pair else { return Err(mismatch()) };
        let Some(incoming) = block_value.as_block() else { return Err(mismatch()) };
        if incoming_blocks.contains(&incoming) {
            return Err(mismatch());
        }
        incoming_blocks.push(incoming);

        if let ValueSSA::Inst(def) = value {
            let Some(term) = incoming.terminator(allocs) else {
                return Err(CheckError::MissingTerminator {
                    func: func.into(),
                    block: block_name(allocs, incoming),
                });
            };
            if dt.dfs.is_reachable(incoming) && !dt.inst_dominates(allocs, def, term) {
                return Err(CheckError::UseNotDominated { func: func.into(), block: name() });
            }
        }
    }
    let mut expected = pred_list;
    expected.sort();
    incoming_blocks.sort();
    if expected != incoming_blocks {
        return Err(mismatch());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::cases::parse_or_panic;

    #[test]
    fn accepts_well_formed_module() {
        let module = parse_or_panic(
            r#"
            define i32 @f(i32 %n) {
            entry:
              br label %header
            header:
              %i = phi i32 [ 0, %entry ], [ %next, %body ]
              %c = icmp slt i32 %i, %n
              br i1 %c, label %body, label %exit
            body:
              %next = add i32 %i, 1
              br label %header
            exit:
              ret i32 %i
            }
            "#,
        );
        verify_module(&module).expect("module should verify");
    }

    #[test]
    fn rejects_missing_terminator() {
        use crate::{
            ir::builder::IRBuilder,
            ir::Module,
            typing::ValTypeID,
        };
        let mut module = Module::new_host_arch("t");
        let mut b = IRBuilder::new(&mut module);
        let func = b.define_func("f", ValTypeID::Void, &[]);
        let entry = b.append_block(func, "entry");
        let _ = entry; // no terminator added
        let error = verify_module(&module).unwrap_err();
        assert!(matches!(error, CheckError::EmptyBlock { .. }), "{error}");
    }

    #[test]
    fn rejects_use_before_def_in_straight_line() {
        use crate::{
            ir::{InstKind, InstRef, Module, Opcode, builder::IRBuilder},
            typing::ValTypeID,
        };
        let mut module = Module::new_host_arch("t");
        let mut b = IRBuilder::new(&mut module);
        let func = b.define_func("f", ValTypeID::Int(32), &[]);
        let entry = b.append_block(func, "entry");
        b.set_focus(entry);
        let add = b.build_binop(
            Opcode::Add,
            ValTypeID::Int(32),
            ValueSSA::ConstData(crate::ir::ConstData::int(32, 1)),
            ValueSSA::None,
        );
        b.set_ret(Some(ValueSSA::Inst(add)));
        // a second add placed *after* ret's position but used by the first
        let late = InstRef::new(
            &mut b.module.allocs,
            Opcode::Add,
            ValTypeID::Int(32),
            InstKind::Binary,
            &[
                ValueSSA::ConstData(crate::ir::ConstData::int(32, 2)),
                ValueSSA::ConstData(crate::ir::ConstData::int(32, 3)),
            ],
        );
        entry.push_inst_back(&b.module.allocs, late);
        add.set_operand(&b.module.allocs, 1, ValueSSA::Inst(late));
        let error = verify_module(&module).unwrap_err();
        // the stray instruction trails the terminator, which is the first
        // violation the checker meets
        assert!(
            matches!(
                error,
                CheckError::MissingTerminator { .. } | CheckError::UseNotDominated { .. }
            ),
            "{error}"
        );
    }
}
