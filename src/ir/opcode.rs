use std::{collections::HashMap, str::FromStr};

/// Closed enumeration of the Cinder-IR instruction opcodes.
///
/// `Guide` is the pseudo-opcode of instruction-list guide nodes and never
/// appears on a real instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Guide,
    // integer arithmetic
    Add, Sub, Mul, Sdiv, Udiv, Srem, Urem,
    // float arithmetic
    Fneg, Fadd, Fsub, Fmul, Fdiv, Frem,
    // bit logic and shifts
    And, Or, Xor, Shl, Lshr, Ashr,
    // casts
    Trunc, Zext, Sext, Fptosi, Fptoui, Sitofp, Uitofp, Fptrunc, Fpext,
    Ptrtoint, Inttoptr, Bitcast,
    // compares
    Icmp, Fcmp,
    // data selection
    Phi, Select, Gep,
    // aggregate element ops
    ExtractElem, InsertElem, ShuffleVec, ExtractValue, InsertValue,
    // memory
    Load, Store, Alloca,
    // calls and varargs
    Call, VaArg,
    // terminators
    Ret, Jump, Br, Switch, Unreachable,
}

impl Opcode {
    pub fn is_int_arith(self) -> bool {
        use Opcode::*;
        matches!(self, Add | Sub | Mul | Sdiv | Udiv | Srem | Urem)
    }
    pub fn is_float_arith(self) -> bool {
        use Opcode::*;
        matches!(self, Fneg | Fadd | Fsub | Fmul | Fdiv | Frem)
    }
    pub fn is_logic_op(self) -> bool {
        matches!(self, Opcode::And | Opcode::Or | Opcode::Xor)
    }
    pub fn is_shift_op(self) -> bool {
        matches!(self, Opcode::Shl | Opcode::Lshr | Opcode::Ashr)
    }
    pub fn is_divrem_op(self) -> bool {
        use Opcode::*;
        matches!(self, Sdiv | Udiv | Srem | Urem | Fdiv | Frem)
    }
    pub fn is_cast(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Trunc | Zext | Sext | Fptosi | Fptoui | Sitofp | Uitofp | Fptrunc | Fpext
                | Ptrtoint | Inttoptr | Bitcast
        )
    }
    pub fn is_cmp(self) -> bool {
        matches!(self, Opcode::Icmp | Opcode::Fcmp)
    }
    pub fn is_aggregate_op(self) -> bool {
        use Opcode::*;
        matches!(self, ExtractElem | InsertElem | ShuffleVec | ExtractValue | InsertValue)
    }
    pub fn is_terminator(self) -> bool {
        use Opcode::*;
        matches!(self, Ret | Jump | Br | Switch | Unreachable)
    }

    /// True for opcodes whose instructions can be deleted outright once the
    /// use list is empty: pure arithmetic, casts, compares, Phi, Select,
    /// Gep and the aggregate element ops. Memory accesses, calls, allocas,
    /// va_arg and terminators never qualify.
    pub fn is_trivially_dead_safe(self) -> bool {
        use Opcode::*;
        self.is_int_arith()
            || self.is_float_arith()
            || self.is_logic_op()
            || self.is_shift_op()
            || self.is_cast()
            || self.is_cmp()
            || self.is_aggregate_op()
            || matches!(self, Phi | Select | Gep)
    }

    /// True for opcodes whose instructions may be merged with an identical
    /// earlier instruction. Loads and stores are handled by the dedicated
    /// memory rules; Fcmp is kept out because of NaN ordering subtleties;
    /// allocas, calls, va_arg and terminators have effects that operand
    /// identity does not capture.
    pub fn is_cse_eligible(self) -> bool {
        use Opcode::*;
        !matches!(self, Guide | Load | Store | Fcmp | Alloca | VaArg | Call)
            && !self.is_terminator()
    }

    pub fn get_name(self) -> &'static str {
        OPCODE_NAMES[self as usize]
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.get_name())
    }
}

impl FromStr for Opcode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OPCODE_NAME_MAP.get(s).copied().ok_or(())
    }
}

static OPCODE_NAMES: [&str; 52] = [
    "<guide>",
    "add", "sub", "mul", "sdiv", "udiv", "srem", "urem",
    "fneg", "fadd", "fsub", "fmul", "fdiv", "frem",
    "and", "or", "xor", "shl", "lshr", "ashr",
    "trunc", "zext", "sext", "fptosi", "fptoui", "sitofp", "uitofp", "fptrunc", "fpext",
    "ptrtoint", "inttoptr", "bitcast",
    "icmp", "fcmp",
    "phi", "select", "getelementptr",
    "extractelement", "insertelement", "shufflevector", "extractvalue", "insertvalue",
    "load", "store", "alloca",
    "call", "va_arg",
    "ret", "jmp", "br", "switch", "unreachable",
];

static OPCODE_TABLE: [Opcode; 52] = {
    use Opcode::*;
    [
        Guide,
        Add, Sub, Mul, Sdiv, Udiv, Srem, Urem,
        Fneg, Fadd, Fsub, Fmul, Fdiv, Frem,
        And, Or, Xor, Shl, Lshr, Ashr,
        Trunc, Zext, Sext, Fptosi, Fptoui, Sitofp, Uitofp, Fptrunc, Fpext,
        Ptrtoint, Inttoptr, Bitcast,
        Icmp, Fcmp,
        Phi, Select, Gep,
        ExtractElem, InsertElem, ShuffleVec, ExtractValue, InsertValue,
        Load, Store, Alloca,
        Call, VaArg,
        Ret, Jump, Br, Switch, Unreachable,
    ]
};

lazy_static::lazy_static! {
    static ref OPCODE_NAME_MAP: HashMap<&'static str, Opcode> = {
        let mut m = HashMap::new();
        for (i, &name) in OPCODE_NAMES.iter().enumerate() {
            m.insert(name, OPCODE_TABLE[i]);
        }
        m
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for &op in OPCODE_TABLE.iter() {
            if op == Opcode::Guide {
                continue;
            }
            assert_eq!(Opcode::from_str(op.get_name()), Ok(op), "{op:?}");
        }
        assert!(Opcode::from_str("frobnicate").is_err());
    }

    #[test]
    fn table_is_aligned() {
        assert_eq!(OPCODE_TABLE[Opcode::Gep as usize], Opcode::Gep);
        assert_eq!(OPCODE_NAMES[Opcode::Gep as usize], "getelementptr");
        assert_eq!(OPCODE_TABLE[Opcode::Unreachable as usize], Opcode::Unreachable);
        for (i, &op) in OPCODE_TABLE.iter().enumerate() {
            assert_eq!(op as usize, i);
        }
    }

    #[test]
    fn dead_safe_set_excludes_effects() {
        use Opcode::*;
        for op in [Add, Fneg, Xor, Trunc, Icmp, Fcmp, Phi, Select, Gep, ExtractValue] {
            assert!(op.is_trivially_dead_safe(), "{op:?}");
        }
        for op in [Load, Store, Call, Alloca, VaArg, Ret, Br, Unreachable] {
            assert!(!op.is_trivially_dead_safe(), "{op:?}");
        }
    }

    #[test]
    fn cse_eligible_set() {
        use Opcode::*;
        for op in [Add, Mul, Icmp, Phi, Select, Gep, Zext] {
            assert!(op.is_cse_eligible(), "{op:?}");
        }
        for op in [Load, Store, Fcmp, Alloca, VaArg, Call, Ret, Jump, Br, Switch, Unreachable] {
            assert!(!op.is_cse_eligible(), "{op:?}");
        }
    }
}
