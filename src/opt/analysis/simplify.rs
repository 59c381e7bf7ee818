//! Pure instruction simplifier.
//!
//! `simplify_inst` answers "does this instruction compute a value that is
//! already available?" — a constant fold or an operand that is in scope at
//! the instruction's position. It never mutates IR; the calling pass decides
//! what to do with the replacement.

use std::cmp::Ordering;

use crate::{
    base::SlabRef,
    ir::{CmpCond, ConstData, IRAllocs, InstKind, InstRef, Opcode, ValueSSA},
    typing::{DataLayout, ValTypeID},
};

pub fn simplify_inst(
    allocs: &IRAllocs,
    layout: &DataLayout,
    inst: InstRef,
) -> Option<ValueSSA> {
    let data = inst.to_data(&allocs.insts);
    if !data.common.ret_type.makes_instance() {
        return None;
    }
    let ty = data.common.ret_type;
    let ops = inst.operand_values(allocs);
    match data.kind {
        InstKind::Binary if data.common.opcode == Opcode::Fneg => {
            let value = ops[0].as_const()?.as_float()?;
            let ValTypeID::Float(kind) = ty else { return None };
            Some(ConstData::float(kind, -value).into())
        }
        InstKind::Binary => simplify_binop(data.common.opcode, ty, ops[0], ops[1]),
        InstKind::Cmp(cond) => simplify_cmp(cond, ops[0], ops[1]),
        InstKind::Cast => simplify_cast(data.common.opcode, ops[0], ty, layout),
        InstKind::Select => {
            if let Some(cond) = ops[0].as_const() {
                return Some(if cond.is_zero() { ops[2] } else { ops[1] });
            }
            if ops[1] == ops[2] { Some(ops[1]) } else { None }
        }
        InstKind::Phi => simplify_phi(inst, &ops),
        InstKind::Gep { .. } => {
            let all_zero = ops[1..]
                .iter()
                .all(|idx| idx.as_const().is_some_and(|c| c.is_zero()));
            if all_zero { Some(ops[0]) } else { None }
        }
        _ => None,
    }
}

/// A phi whose incomings agree on a single value (ignoring self-references)
/// computes that value.
fn simplify_phi(inst: InstRef, ops: &[ValueSSA]) -> Option<ValueSSA> {
    let mut unique = None;
    for pair in ops.chunks(2) {
        let incoming = pair[0];
        if incoming == ValueSSA::Inst(inst) {
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

fn simplify_binop(
    opcode: Opcode,
    ty: ValTypeID,
    lhs: ValueSSA,
    rhs: ValueSSA,
) -> Option<ValueSSA> {
    if let ValTypeID::Float(_) = ty {
        return fold_float_binop(opcode, ty, lhs, rhs);
    }
    let ValTypeID::Int(bits) = ty else { return None };

    let lhs_const = lhs.as_const();
    let rhs_const = rhs.as_const();
    if let (Some(a), Some(b)) = (lhs_const, rhs_const) {
        if let Some(folded) = fold_int_binop(opcode, bits, a, b) {
            return Some(folded.into());
        }
    }

    let zero = || ConstData::int(bits, 0).into();
    let lhs_is = |v: i64| lhs_const.is_some_and(|c| c.is_int_value(v));
    let rhs_is = |v: i64| rhs_const.is_some_and(|c| c.is_int_value(v));
    let same = lhs == rhs;

    match opcode {
        Opcode::Add => {
            if rhs_is(0) {
                return Some(lhs);
            }
            if lhs_is(0) {
                return Some(rhs);
            }
        }
        Opcode::Sub => {
            if rhs_is(0) {
                return Some(lhs);
            }
            if same {
                return Some(zero());
            }
        }
        Opcode::Mul => {
            if rhs_is(0) || lhs_is(0) {
                return Some(zero());
            }
            if rhs_is(1) {
                return Some(lhs);
            }
            if lhs_is(1) {
                return Some(rhs);
            }
        }
        Opcode::Sdiv | Opcode::Udiv => {
            if rhs_is(1) {
                return Some(lhs);
            }
            if lhs_is(0) {
                return Some(zero());
            }
        }
        Opcode::Srem | Opcode::Urem => {
            if rhs_is(1) || lhs_is(0) || same {
                return Some(zero());
            }
        }
        Opcode::And => {
            if lhs_is(0) || rhs_is(0) {
                return Some(zero());
            }
            if rhs_const.is_some_and(|c| c.is_all_ones()) || same {
                return Some(lhs);
            }
            if lhs_const.is_some_and(|c| c.is_all_ones()) {
                return Some(rhs);
            }
        }
        Opcode::Or => {
            if rhs_is(0) || same {
                return Some(lhs);
            }
            if lhs_is(0) {
                return Some(rhs);
            }
            if rhs_const.is_some_and(|c| c.is_all_ones()) {
                return Some(rhs);
            }
            if lhs_const.is_some_and(|c| c.is_all_ones()) {
                return Some(lhs);
            }
        }
        Opcode::Xor => {
            if rhs_is(0) {
                return Some(lhs);
            }
            if lhs_is(0) {
                return Some(rhs);
            }
            if same {
                return Some(zero());
            }
        }
        Opcode::Shl | Opcode::Lshr | Opcode::Ashr => {
            if rhs_is(0) {
                return Some(lhs);
            }
            if lhs_is(0) {
                return Some(zero());
            }
        }
        _ => {}
    }
    None
}

fn fold_int_binop(opcode: Opcode, bits: u8, a: ConstData, b: ConstData) -> Option<ConstData> {
    let sa = a.as_signed()?;
    let sb = b.as_signed()?;
    let ua = a.as_unsigned()?;
    let ub = b.as_unsigned()?;
    let value = match opcode {
        Opcode::Add => sa.wrapping_add(sb),
        Opcode::Sub => sa.wrapping_sub(sb),
        Opcode::Mul => sa.wrapping_mul(sb),
        // division by zero and INT_MIN / -1 are undefined; leave them alone
        Opcode::Sdiv => {
            if sb == 0 || (sa == i64::MIN && sb == -1) {
                return None;
            }
            sa.wrapping_div(sb)
        }
        Opcode::Srem => {
            if sb == 0 || (sa == i64::MIN && sb == -1) {
                return None;
            }
            sa.wrapping_rem(sb)
        }
        Opcode::Udiv => {
            if ub == 0 {
                return None;
            }
            (ua / ub) as i64
        }
        Opcode::Urem => {
            if ub == 0 {
                return None;
            }
            (ua % ub) as i64
        }
        Opcode::And => sa & sb,
        Opcode::Or => sa | sb,
        Opcode::Xor => sa ^ sb,
        // shift amounts at or past the width are undefined; leave them alone
        Opcode::Shl => {
            if ub >= bits as u64 {
                return None;
            }
            ((ua << ub) & mask(bits)) as i64
        }
        Opcode::Lshr => {
            if ub >= bits as u64 {
                return None;
            }
            (ua >> ub) as i64
        }
        Opcode::Ashr => {
            if ub >= bits as u64 {
                return None;
            }
            sa >> ub
        }
        _ => return None,
    };
    Some(ConstData::int(bits, value))
}

fn mask(bits: u8) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

fn fold_float_binop(
    opcode: Opcode,
    ty: ValTypeID,
    lhs: ValueSSA,
    rhs: ValueSSA,
) -> Option<ValueSSA> {
    let ValTypeID::Float(kind) = ty else { return None };
    let a = lhs.as_const()?.as_float()?;
    let b = rhs.as_const()?.as_float()?;
    let value = match opcode {
        Opcode::Fadd => a + b,
        Opcode::Fsub => a - b,
        Opcode::Fmul => a * b,
        Opcode::Fdiv => a / b,
        Opcode::Frem => a % b,
        _ => return None,
    };
    Some(ConstData::float(kind, value).into())
}

fn simplify_cmp(cond: CmpCond, lhs: ValueSSA, rhs: ValueSSA) -> Option<ValueSSA> {
    if cond.is_int() {
        // identical operands decide an integer compare outright
        if lhs == rhs && !lhs.is_none() {
            return Some(ConstData::bool(cond.holds(Ordering::Equal)).into());
        }
        let (a, b) = (lhs.as_const()?, rhs.as_const()?);
        let ord = if cond.is_signed_ordered() {
            a.as_signed()?.cmp(&b.as_signed()?)
        } else {
            a.as_unsigned()?.cmp(&b.as_unsigned()?)
        };
        return Some(ConstData::bool(cond.holds(ord)).into());
    }
    // float: only constant operands fold; NaN makes identity unusable
    let a = lhs.as_const()?.as_float()?;
    let b = rhs.as_const()?.as_float()?;
    let result = match a.partial_cmp(&b) {
        Some(ord) => cond.holds(ord),
        // unordered: exactly the unordered predicates hold
        None => !cond.is_signed_ordered(),
    };
    Some(ConstData::bool(result).into())
}

fn simplify_cast(
    opcode: Opcode,
    value: ValueSSA,
    to_ty: ValTypeID,
    layout: &DataLayout,
) -> Option<ValueSSA> {
    if opcode == Opcode::Bitcast && value.get_valtype_is(to_ty) {
        return Some(value);
    }
    let data = value.as_const()?;
    match opcode {
        Opcode::Trunc | Opcode::Zext | Opcode::Sext => {
            let ValTypeID::Int(to_bits) = to_ty else { return None };
            let result = match opcode {
                Opcode::Trunc => data.as_signed()?,
                Opcode::Zext => data.as_unsigned()? as i64,
                _ => data.as_signed()?,
            };
            Some(ConstData::int(to_bits, result).into())
        }
        Opcode::Sitofp | Opcode::Uitofp => {
            let ValTypeID::Float(kind) = to_ty else { return None };
            let result = if opcode == Opcode::Sitofp {
                data.as_signed()? as f64
            } else {
                data.as_unsigned()? as f64
            };
            Some(ConstData::float(kind, result).into())
        }
        Opcode::Fptosi | Opcode::Fptoui => {
            let ValTypeID::Int(to_bits) = to_ty else { return None };
            let v = data.as_float()?;
            if !v.is_finite() {
                return None;
            }
            let truncated = v.trunc();
            // out-of-range conversions are undefined; leave them alone
            if truncated < -(2f64.powi(63)) || truncated >= 2f64.powi(63) {
                return None;
            }
            Some(ConstData::int(to_bits, truncated as i64).into())
        }
        Opcode::Fptrunc | Opcode::Fpext => {
            let ValTypeID::Float(kind) = to_ty else { return None };
            Some(ConstData::float(kind, data.as_float()?).into())
        }
        Opcode::Ptrtoint => {
            let ValTypeID::Int(to_bits) = to_ty else { return None };
            match data {
                ConstData::PtrNull => Some(ConstData::int(to_bits, 0).into()),
                _ => None,
            }
        }
        Opcode::Inttoptr => {
            let _ = layout;
            if data.is_zero() && to_ty == ValTypeID::Ptr {
                Some(ConstData::PtrNull.into())
            } else {
                None
            }
        }
        _ => None,
    }
}

impl ValueSSA {
    /// Type check that avoids the arenas: only constant-carried types can be
    /// answered without them, which is all the cast simplifier needs.
    fn get_valtype_is(self, ty: ValTypeID) -> bool {
        match self {
            ValueSSA::ConstData(data) => data.get_valtype() == ty,
            ValueSSA::Global(_) => ty == ValTypeID::Ptr,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Module, builder::IRBuilder},
        testing::cases::parse_or_panic,
    };

    fn first_block_insts(module: &Module, func_name: &str) -> Vec<InstRef> {
        let func = module.get_global_by_name(func_name).unwrap();
        let entry = func.blocks_vec(&module.allocs)[0];
        entry.insts_vec(&module.allocs)
    }

    #[test]
    fn folds_constant_add() {
        let module = parse_or_panic(
            "define i32 @f() {\nentry:\n  %t = add i32 3, 4\n  ret i32 %t\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        let folded = simplify_inst(&module.allocs, &module.layout, insts[0]);
        assert_eq!(folded, Some(ConstData::int(32, 7).into()));
    }

    #[test]
    fn folds_wrapped_arithmetic() {
        let module = parse_or_panic(
            "define i8 @f() {\nentry:\n  %t = add i8 127, 1\n  ret i8 %t\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        let folded = simplify_inst(&module.allocs, &module.layout, insts[0]);
        assert_eq!(folded, Some(ConstData::int(8, -128).into()));
    }

    #[test]
    fn add_zero_is_identity() {
        let module = parse_or_panic(
            "define i32 @f(i32 %x) {\nentry:\n  %t = add i32 %x, 0\n  ret i32 %t\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        let func = module.get_global_by_name("f").unwrap();
        let folded = simplify_inst(&module.allocs, &module.layout, insts[0]);
        assert_eq!(folded, Some(ValueSSA::FuncArg(func, 0)));
    }

    #[test]
    fn sub_self_is_zero() {
        let module = parse_or_panic(
            "define i32 @f(i32 %x) {\nentry:\n  %t = sub i32 %x, %x\n  ret i32 %t\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        let folded = simplify_inst(&module.allocs, &module.layout, insts[0]);
        assert_eq!(folded, Some(ConstData::int(32, 0).into()));
    }

    #[test]
    fn rem_self_is_zero() {
        let module = parse_or_panic(
            "define i32 @f(i32 %x) {\nentry:\n  %a = srem i32 %x, %x\n  %b = urem i32 %x, %x\n  ret i32 %a\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[0]),
            Some(ConstData::int(32, 0).into())
        );
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[1]),
            Some(ConstData::int(32, 0).into())
        );
    }

    #[test]
    fn division_by_zero_is_left_alone() {
        let module = parse_or_panic(
            "define i32 @f() {\nentry:\n  %t = sdiv i32 5, 0\n  ret i32 %t\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        assert_eq!(simplify_inst(&module.allocs, &module.layout, insts[0]), None);
    }

    #[test]
    fn icmp_folds() {
        let module = parse_or_panic(
            "define i1 @f(i32 %x) {\nentry:\n  %a = icmp slt i32 3, 4\n  %b = icmp eq i32 %x, %x\n  ret i1 %a\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[0]),
            Some(ConstData::bool(true).into())
        );
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[1]),
            Some(ConstData::bool(true).into())
        );
    }

    #[test]
    fn unsigned_compare_uses_unsigned_order() {
        // -1 as unsigned i32 is the maximum value
        let module = parse_or_panic(
            "define i1 @f() {\nentry:\n  %t = icmp ult i32 -1, 1\n  ret i1 %t\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[0]),
            Some(ConstData::bool(false).into())
        );
    }

    #[test]
    fn casts_fold() {
        let module = parse_or_panic(
            "define i32 @f() {\nentry:\n  %a = zext i8 -1 to i32\n  %b = sext i8 -1 to i32\n  ret i32 %a\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[0]),
            Some(ConstData::int(32, 255).into())
        );
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[1]),
            Some(ConstData::int(32, -1).into())
        );
    }

    #[test]
    fn select_and_gep_simplify() {
        let module = parse_or_panic(
            "define i32 @f(ptr %p, i32 %x, i32 %y) {\nentry:\n  %s = select i1 true, i32 %x, i32 %y\n  %g = getelementptr i32, ptr %p, i64 0\n  %l = load i32, ptr %g\n  ret i32 %s\n}\n",
        );
        let func = module.get_global_by_name("f").unwrap();
        let insts = first_block_insts(&module, "f");
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[0]),
            Some(ValueSSA::FuncArg(func, 1))
        );
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[1]),
            Some(ValueSSA::FuncArg(func, 0))
        );
    }

    #[test]
    fn phi_with_single_value_simplifies() {
        let mut module = Module::new_host_arch("t");
        let mut b = IRBuilder::new(&mut module);
        let func = b.define_func("f", ValTypeID::Int(32), &[ValTypeID::Int(32)]);
        let entry = b.append_block(func, "entry");
        let next = b.append_block(func, "next");
        b.set_focus(entry);
        b.set_jump(next);
        b.set_focus(next);
        let arg = ValueSSA::FuncArg(func, 0);
        let phi = b.build_phi(ValTypeID::Int(32), &[(arg, entry)]);
        b.set_ret(Some(ValueSSA::Inst(phi)));
        assert_eq!(simplify_inst(&module.allocs, &module.layout, phi), Some(arg));
    }

    #[test]
    fn loads_never_simplify() {
        let module = parse_or_panic(
            "define i32 @f(ptr %p) {\nentry:\n  %l = load i32, ptr %p\n  ret i32 %l\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        assert_eq!(simplify_inst(&module.allocs, &module.layout, insts[0]), None);
    }

    #[test]
    fn fneg_and_float_fold() {
        let module = parse_or_panic(
            "define double @f() {\nentry:\n  %a = fneg double 2.5\n  %b = fadd double 1.5, 2.0\n  ret double %b\n}\n",
        );
        let insts = first_block_insts(&module, "f");
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[0]),
            Some(ConstData::float(crate::typing::FloatKind::Ieee64, -2.5).into())
        );
        assert_eq!(
            simplify_inst(&module.allocs, &module.layout, insts[1]),
            Some(ConstData::float(crate::typing::FloatKind::Ieee64, 3.5).into())
        );
    }
}
