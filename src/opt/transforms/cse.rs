//! Common subexpression elimination.
//!
//! One forward sweep per function, block by block in layout order. At every
//! cursor position the rules fire in a fixed priority: dead-instruction
//! removal, algebraic simplification, identical-expression elimination
//! (same block, then immediately dominated blocks), redundant-load
//! elimination, and dead-store elimination with store-to-load forwarding.
//!
//! Iterator discipline: every scan advances past an instruction before
//! erasing it. The only rule that erases the cursor's own instruction and
//! has scanned past it is the dead-store rule; it hands the driver the
//! replacement cursor explicitly.

use log::debug;

use crate::{
    ir::{GlobalRef, IRAllocs, InstRef, Module, Opcode, ValueSSA},
    opt::analysis::{dominance::DominatorTree, simplify::simplify_inst},
    stats::Statistics,
    typing::DataLayout,
};

pub fn cse_pass(module: &mut Module, stats: &mut Statistics) {
    stats.register("CSEDead", "CSE found dead instructions");
    stats.register("CSEElim", "CSE redundant instructions");
    stats.register("CSESimplify", "CSE simplified instructions");
    stats.register("CSELdElim", "CSE redundant loads");
    stats.register("CSEStore2Load", "CSE forwarded store to load");
    stats.register("CSEStElim", "CSE redundant stores");

    let layout = module.layout;
    for func in module.defined_funcs() {
        let mut ctx = CseContext { allocs: &mut module.allocs, layout, stats };
        ctx.run_on_func(func);
    }
}

struct CseContext<'p> {
    allocs: &'p mut IRAllocs,
    layout: DataLayout,
    stats: &'p mut Statistics,
}

impl CseContext<'_> {
    fn run_on_func(&mut self, func: GlobalRef) {
        // recomputed fresh per function; the pass only deletes instructions,
        // so the tree stays valid for the whole visit
        let dt = DominatorTree::compute(self.allocs, func);
        let blocks = func.blocks_vec(self.allocs);
        let name = func.name(self.allocs);
        debug!("cse: function @{name}, {} blocks", blocks.len());

        for block in blocks {
            let mut cursor = block.first_inst(self.allocs);
            while let Some(inst) = cursor {
                let opcode = inst.get_opcode(self.allocs);

                if opcode.is_trivially_dead_safe() && inst.is_use_empty(self.allocs) {
                    let next = inst.next_in_block(self.allocs);
                    inst.erase_from_parent(self.allocs);
                    self.stats.bump("CSEDead");
                    cursor = next;
                    continue;
                }

                if let Some(replacement) = simplify_inst(self.allocs, &self.layout, inst) {
                    let next = inst.next_in_block(self.allocs);
                    inst.replace_all_uses_with(self.allocs, replacement);
                    inst.erase_from_parent(self.allocs);
                    self.stats.bump("CSESimplify");
                    cursor = next;
                    continue;
                }

                if opcode.is_cse_eligible() {
                    let start = inst.next_in_block(self.allocs);
                    self.eliminate_identical(inst, start);
                    self.eliminate_identical_in_dominated(&dt, inst);
                }

                if opcode == Opcode::Load {
                    self.eliminate_redundant_loads(inst);
                }

                if opcode == Opcode::Store {
                    if let Some(next) = self.eliminate_dead_store(inst) {
                        // the store under the cursor is gone; the rule
                        // already picked the live successor
                        cursor = next;
                        continue;
                    }
                }

                cursor = inst.next_in_block(self.allocs);
            }
        }
    }

    /// Merges every instruction identical to `curr` into it, scanning from
    /// `start` to the end of the containing block.
    fn eliminate_identical(&mut self, curr: InstRef, start: Option<InstRef>) {
        let mut it = start;
        while let Some(inst) = it {
            it = inst.next_in_block(self.allocs);
            if inst.identical_to(curr, self.allocs) {
                inst.replace_all_uses_with(self.allocs, ValueSSA::Inst(curr));
                inst.erase_from_parent(self.allocs);
                self.stats.bump("CSEElim");
            }
        }
    }

    /// The dominated-block scan descends exactly one dominator-tree level:
    /// each immediately dominated block is swept in full, but their own
    /// subtrees are left to their turn.
    fn eliminate_identical_in_dominated(&mut self, dt: &DominatorTree, curr: InstRef) {
        let Some(block) = curr.get_parent(self.allocs) else { return };
        let Some(dfn) = dt.node_of(block) else { return };
        for &child in dt.children(dfn) {
            let child_block = dt.block_of(child);
            let start = child_block.first_inst(self.allocs);
            self.eliminate_identical(curr, start);
        }
    }

    /// Later loads of the same pointer and type reuse `curr`'s value until
    /// a store (which may alias the cell) ends the window. Calls and other
    /// non-memory instructions do not end it.
    fn eliminate_redundant_loads(&mut self, curr: InstRef) {
        if curr.is_volatile(self.allocs) {
            return;
        }
        let ptr = curr.load_ptr(self.allocs);
        let ty = curr.get_valtype(self.allocs);
        let mut it = curr.next_in_block(self.allocs);
        while let Some(inst) = it {
            it = inst.next_in_block(self.allocs);
            match inst.get_opcode(self.allocs) {
                Opcode::Load => {
                    if !inst.is_volatile(self.allocs)
                        && inst.load_ptr(self.allocs) == ptr
                        && inst.get_valtype(self.allocs) == ty
                    {
                        inst.replace_all_uses_with(self.allocs, ValueSSA::Inst(curr));
                        inst.erase_from_parent(self.allocs);
                        self.stats.bump("CSELdElim");
                    }
                }
                Opcode::Store => break,
                _ => {}
            }
        }
    }

    /// Forwards the stored value into later same-cell loads; a later store
    /// to the same cell makes `curr` dead. Any other memory access, call or
    /// side effect ends the window — this rule moves a concrete value
    /// through memory, so it is stricter than the load rule.
    ///
    /// Returns `Some(next cursor)` when `curr` itself was erased.
    fn eliminate_dead_store(&mut self, curr: InstRef) -> Option<Option<InstRef>> {
        let ptr = curr.store_ptr(self.allocs);
        let value = curr.store_value(self.allocs);
        let value_ty = value.get_valtype(self.allocs);
        let curr_volatile = curr.is_volatile(self.allocs);

        let mut it = curr.next_in_block(self.allocs);
        while let Some(inst) = it {
            it = inst.next_in_block(self.allocs);
            let opcode = inst.get_opcode(self.allocs);

            if opcode == Opcode::Load
                && !inst.is_volatile(self.allocs)
                && inst.load_ptr(self.allocs) == ptr
                && inst.get_valtype(self.allocs) == value_ty
            {
                inst.replace_all_uses_with(self.allocs, value);
                inst.erase_from_parent(self.allocs);
                self.stats.bump("CSEStore2Load");
                continue;
            }

            if opcode == Opcode::Store
                && !curr_volatile
                && inst.store_ptr(self.allocs) == ptr
                && inst.store_value(self.allocs).get_valtype(self.allocs) == value_ty
            {
                // compute the successor now: forwarding above may have
                // erased the instruction right after curr
                let next = curr.next_in_block(self.allocs);
                curr.erase_from_parent(self.allocs);
                self.stats.bump("CSEStElim");
                return Some(next);
            }

            if opcode == Opcode::Load
                || opcode == Opcode::Store
                || opcode == Opcode::Call
                || inst.may_have_side_effects(self.allocs)
            {
                break;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::checking::verify_module,
        stats::summarize_module,
        testing::cases::parse_or_panic,
    };

    fn run_cse(src: &str) -> (Module, Statistics) {
        let mut module = parse_or_panic(src);
        let mut stats = Statistics::new();
        cse_pass(&mut module, &mut stats);
        verify_module(&module).expect("pass must leave well-formed IR");
        (module, stats)
    }

    fn inst_count(module: &Module, func: &str) -> usize {
        let func = module.get_global_by_name(func).unwrap();
        func.blocks_vec(&module.allocs)
            .iter()
            .map(|b| b.inst_count(&module.allocs))
            .sum()
    }

    #[test]
    fn trivially_dead_arithmetic() {
        let (module, stats) = run_cse(
            r#"
            define void @f(i32 %a, i32 %b) {
            entry:
              %t = add i32 %a, %b
              ret void
            }
            "#,
        );
        assert_eq!(stats.get("CSEDead"), 1);
        assert_eq!(inst_count(&module, "f"), 1);
    }

    #[test]
    fn dead_load_is_kept() {
        let (module, stats) = run_cse(
            r#"
            define void @f(ptr %p) {
            entry:
              %t = load i32, ptr %p
              ret void
            }
            "#,
        );
        assert_eq!(stats.get("CSEDead"), 0);
        assert_eq!(inst_count(&module, "f"), 2);
    }

    #[test]
    fn constant_fold() {
        let (module, stats) = run_cse(
            r#"
            define i32 @f() {
            entry:
              %t = add i32 3, 4
              ret i32 %t
            }
            "#,
        );
        assert_eq!(stats.get("CSESimplify"), 1);
        // the return now uses the constant directly
        let func = module.get_global_by_name("f").unwrap();
        let entry = func.blocks_vec(&module.allocs)[0];
        let ret = entry.terminator(&module.allocs).unwrap();
        assert_eq!(
            ret.get_operand(&module.allocs, 0),
            ValueSSA::ConstData(crate::ir::ConstData::int(32, 7))
        );
    }

    #[test]
    fn intra_block_cse() {
        let (module, stats) = run_cse(
            r#"
            define i32 @f(i32 %a, i32 %b) {
            entry:
              %x = mul i32 %a, %b
              %y = mul i32 %a, %b
              %z = add i32 %x, %y
              ret i32 %z
            }
            "#,
        );
        assert_eq!(stats.get("CSEElim"), 1);
        // %z must now add %x to itself
        let func = module.get_global_by_name("f").unwrap();
        let entry = func.blocks_vec(&module.allocs)[0];
        let insts = entry.insts_vec(&module.allocs);
        assert_eq!(insts.len(), 3);
        let add = insts[1];
        assert_eq!(
            add.get_operand(&module.allocs, 0),
            add.get_operand(&module.allocs, 1)
        );
    }

    #[test]
    fn dominated_block_cse() {
        let (module, stats) = run_cse(
            r#"
            define i32 @f(i32 %a, i32 %b, i1 %c) {
            entry:
              %x = mul i32 %a, %b
              br i1 %c, label %t, label %e
            t:
              %y = mul i32 %a, %b
              ret i32 %y
            e:
              ret i32 %x
            }
            "#,
        );
        assert_eq!(stats.get("CSEElim"), 1);
        assert_eq!(inst_count(&module, "f"), 4);
    }

    #[test]
    fn dominated_scan_is_one_level_only() {
        let (module, stats) = run_cse(
            r#"
            define i32 @f(i32 %a, i32 %b, i1 %c) {
            entry:
              %x = mul i32 %a, %b
              br label %mid
            mid:
              %y = mul i32 %a, %b
              br i1 %c, label %leaf, label %out
            leaf:
              %z = mul i32 %a, %b
              ret i32 %z
            out:
              ret i32 %y
            }
            "#,
        );
        // entry's scan reaches %mid and kills %y. %leaf is immediately
        // dominated by %mid, not by entry, and %mid has no duplicate left
        // when the driver gets there, so %z survives the sweep.
        assert_eq!(stats.get("CSEElim"), 1);
        assert_eq!(inst_count(&module, "f"), 6);
    }

    #[test]
    fn redundant_load_elimination() {
        let (module, stats) = run_cse(
            r#"
            define i32 @f(ptr %p) {
            entry:
              %l1 = load i32, ptr %p
              %t = add i32 %l1, 1
              %l2 = load i32, ptr %p
              %u = add i32 %l2, %t
              ret i32 %u
            }
            "#,
        );
        assert_eq!(stats.get("CSELdElim"), 1);
        assert_eq!(inst_count(&module, "f"), 4);
    }

    #[test]
    fn load_window_ends_at_store() {
        let (module, stats) = run_cse(
            r#"
            define i32 @f(ptr %p, ptr %q, i32 %v) {
            entry:
              %l1 = load i32, ptr %p
              store i32 %v, ptr %q
              %l2 = load i32, ptr %p
              %u = add i32 %l1, %l2
              ret i32 %u
            }
            "#,
        );
        assert_eq!(stats.get("CSELdElim"), 0);
        assert_eq!(inst_count(&module, "f"), 5);
    }

    #[test]
    fn load_window_survives_calls() {
        // mirrors the source behavior: calls do not end the load window
        let (_, stats) = run_cse(
            r#"
            declare void @ext()
            define i32 @f(ptr %p) {
            entry:
              %l1 = load i32, ptr %p
              call void @ext()
              %l2 = load i32, ptr %p
              %u = add i32 %l1, %l2
              ret i32 %u
            }
            "#,
        );
        assert_eq!(stats.get("CSELdElim"), 1);
    }

    #[test]
    fn store_forwarding_feeds_later_loads() {
        let (module, stats) = run_cse(
            r#"
            define i32 @f() {
            entry:
              %p = alloca i32
              store i32 42, ptr %p
              %l1 = load i32, ptr %p
              %t = add i32 %l1, 1
              %l2 = load i32, ptr %p
              ret i32 %l2
            }
            "#,
        );
        // the store rule reaches both loads: %l1 forwards, the add is not a
        // barrier, then %l2 forwards too
        assert_eq!(stats.get("CSEStore2Load"), 2);
        assert_eq!(stats.get("CSELdElim"), 0);
        let func = module.get_global_by_name("f").unwrap();
        let entry = func.blocks_vec(&module.allocs)[0];
        let ret = entry.terminator(&module.allocs).unwrap();
        assert_eq!(
            ret.get_operand(&module.allocs, 0),
            ValueSSA::ConstData(crate::ir::ConstData::int(32, 42))
        );
    }

    #[test]
    fn store_forwarding_stops_at_call() {
        let (_, stats) = run_cse(
            r#"
            declare void @ext()
            define i32 @f(ptr %p) {
            entry:
              store i32 42, ptr %p
              call void @ext()
              %l = load i32, ptr %p
              ret i32 %l
            }
            "#,
        );
        assert_eq!(stats.get("CSEStore2Load"), 0);
    }

    #[test]
    fn dead_store_elimination() {
        let (module, stats) = run_cse(
            r#"
            define void @f(ptr %p) {
            entry:
              store i32 1, ptr %p
              store i32 2, ptr %p
              ret void
            }
            "#,
        );
        assert_eq!(stats.get("CSEStElim"), 1);
        assert_eq!(inst_count(&module, "f"), 2);
        // the surviving store writes 2
        let func = module.get_global_by_name("f").unwrap();
        let entry = func.blocks_vec(&module.allocs)[0];
        let store = entry.first_inst(&module.allocs).unwrap();
        assert_eq!(
            store.store_value(&module.allocs),
            ValueSSA::ConstData(crate::ir::ConstData::int(32, 2))
        );
    }

    #[test]
    fn volatile_loads_are_untouched() {
        let (module, stats) = run_cse(
            r#"
            define i32 @f(ptr %p) {
            entry:
              %l1 = load volatile i32, ptr %p
              %l2 = load volatile i32, ptr %p
              %u = add i32 %l1, %l2
              ret i32 %u
            }
            "#,
        );
        assert_eq!(stats.get("CSELdElim"), 0);
        assert_eq!(stats.get("CSEStore2Load"), 0);
        assert_eq!(stats.get("CSEDead"), 0);
        assert_eq!(inst_count(&module, "f"), 4);
    }

    #[test]
    fn volatile_store_is_not_killed() {
        let (_, stats) = run_cse(
            r#"
            define void @f(ptr %p) {
            entry:
              store volatile i32 1, ptr %p
              store i32 2, ptr %p
              ret void
            }
            "#,
        );
        assert_eq!(stats.get("CSEStElim"), 0);
    }

    #[test]
    fn phi_duplicates_merge() {
        let (_, stats) = run_cse(
            r#"
            define i32 @f(i32 %a, i32 %b, i1 %c) {
            entry:
              br i1 %c, label %l, label %r
            l:
              br label %m
            r:
              br label %m
            m:
              %p1 = phi i32 [ %a, %l ], [ %b, %r ]
              %p2 = phi i32 [ %a, %l ], [ %b, %r ]
              %s = add i32 %p1, %p2
              ret i32 %s
            }
            "#,
        );
        assert_eq!(stats.get("CSEElim"), 1);
    }

    #[test]
    fn fcmp_is_not_merged() {
        let (_, stats) = run_cse(
            r#"
            define void @f(double %a, double %b) {
            entry:
              %c1 = fcmp olt double %a, %b
              %c2 = fcmp olt double %a, %b
              %k = and i1 %c1, %c2
              ret void
            }
            "#,
        );
        assert_eq!(stats.get("CSEElim"), 0);
        // %k is dead; the compares only become dead after %k goes, which a
        // single forward sweep no longer sees
        assert_eq!(stats.get("CSEDead"), 1);
    }

    #[test]
    fn second_run_finds_nothing_more() {
        let src = r#"
            define i32 @f(i32 %a, i32 %b) {
            entry:
              %x = mul i32 %a, %b
              %y = mul i32 %a, %b
              %dead = sub i32 %a, %b
              %z = add i32 %x, %y
              %w = add i32 %z, 0
              ret i32 %w
            }
        "#;
        let mut module = parse_or_panic(src);
        let mut stats = Statistics::new();
        cse_pass(&mut module, &mut stats);
        verify_module(&module).expect("first run must leave well-formed IR");
        let first_total: u64 = stats.iter().map(|c| c.value).sum();
        assert!(first_total > 0);

        let mut stats2 = Statistics::new();
        cse_pass(&mut module, &mut stats2);
        verify_module(&module).expect("second run must leave well-formed IR");
        let second_total: u64 = stats2.iter().map(|c| c.value).sum();
        assert_eq!(second_total, 0, "the pass should reach a fixed point here");
    }

    #[test]
    fn counters_match_removed_instructions() {
        let src = r#"
            define i32 @f(i32 %a, i32 %b) {
            entry:
              %x = mul i32 %a, %b
              %y = mul i32 %a, %b
              %z = add i32 %x, %y
              ret i32 %z
            }
        "#;
        let mut module = parse_or_panic(src);
        let mut before = Statistics::new();
        summarize_module(&module, &mut before);

        let mut stats = Statistics::new();
        cse_pass(&mut module, &mut stats);
        let mut after = Statistics::new();
        summarize_module(&module, &mut after);

        let removed = before.get("Instructions") - after.get("Instructions");
        let cse_total: u64 = ["CSEDead", "CSEElim", "CSESimplify", "CSELdElim", "CSEStore2Load", "CSEStElim"]
            .iter()
            .map(|name| stats.get(name))
            .sum();
        assert_eq!(removed, cse_total);
    }
}
