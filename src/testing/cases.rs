//! Test-case construction helpers.

use crate::{
    ir::{GlobalRef, Module, ValueSSA, builder::IRBuilder, reader::parse_module},
    typing::ValTypeID,
};

/// Parses a textual module, panicking with the diagnostic on failure.
pub fn parse_or_panic(src: &str) -> Module {
    match parse_module("testcase", src) {
        Ok(module) => module,
        Err(error) => panic!("test case failed to parse: {error}"),
    }
}

/// Builder-constructed diamond with a duplicated multiply on both arms:
///
/// ```text
/// entry:  %x = mul %a, %b ; br %c, then, else
/// then:   %y = mul %a, %b ; br merge
/// else:   br merge
/// merge:  %m = phi [ %y, then ], [ %x, else ] ; ret %m
/// ```
#[allow(unused)]
pub fn case_diamond_with_duplicate_mul() -> (Module, GlobalRef) {
    let i32t = ValTypeID::Int(32);
    let mut module = Module::new_host_arch("case_diamond");
    let mut b = IRBuilder::new(&mut module);
    let func = b.define_func("main", i32t, &[i32t, i32t, ValTypeID::new_boolean()]);
    let a = ValueSSA::FuncArg(func, 0);
    let bv = ValueSSA::FuncArg(func, 1);
    let c = ValueSSA::FuncArg(func, 2);

    let entry = b.append_block(func, "entry");
    let then_bb = b.append_block(func, "then");
    let else_bb = b.append_block(func, "else");
    let merge = b.append_block(func, "merge");

    b.set_focus(entry);
    let x = b.build_binop(crate::ir::Opcode::Mul, i32t, a, bv);
    b.set_branch(c, then_bb, else_bb);

    b.set_focus(then_bb);
    let y = b.build_binop(crate::ir::Opcode::Mul, i32t, a, bv);
    b.set_jump(merge);

    b.set_focus(else_bb);
    b.set_jump(merge);

    b.set_focus(merge);
    let phi = b.build_phi(
        i32t,
        &[(ValueSSA::Inst(y), then_bb), (ValueSSA::Inst(x), else_bb)],
    );
    b.set_ret(Some(ValueSSA::Inst(phi)));

    (module, func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::checking::verify_module;

    #[test]
    fn builder_case_is_well_formed() {
        let (module, func) = case_diamond_with_duplicate_mul();
        verify_module(&module).expect("builder case must verify");
        assert_eq!(func.blocks_vec(&module.allocs).len(), 4);
    }
}
