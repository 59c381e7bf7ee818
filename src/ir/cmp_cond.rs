use bitflags::bitflags;

bitflags! {
    /// Comparison condition of `icmp` / `fcmp` instructions.
    ///
    /// The three low bits encode the base relation; `SIGNED_ORDERED` selects
    /// signed (int) or ordered (float) semantics, `FLOAT_SWITCH` selects the
    /// float interpretation of the other bits.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
    pub struct CmpCond: u8 {
        const LT = 0b00_001;
        const EQ = 0b00_010;
        const GT = 0b00_100;
        const LE = 0b00_011;
        const NE = 0b00_101;
        const GE = 0b00_110;

        const ALWAYS = 0b00_111;
        const NEVER  = 0b00_000;

        /// Signed comparison for integers, ordered comparison for floats.
        const SIGNED_ORDERED = 0b01_000;

        /// Set on float comparisons, clear on integer comparisons.
        const FLOAT_SWITCH = 0b10_000;
    }
}

impl CmpCond {
    pub fn is_float(&self) -> bool {
        self.contains(Self::FLOAT_SWITCH)
    }
    pub fn is_int(&self) -> bool {
        !self.contains(Self::FLOAT_SWITCH)
    }
    pub fn is_signed_ordered(&self) -> bool {
        self.contains(Self::SIGNED_ORDERED)
    }

    /// Base relation with the signedness and float bits removed.
    pub fn basic_cond(&self) -> Self {
        *self & Self::ALWAYS
    }

    /// Evaluates the base relation over an `Ordering`-like comparison of the
    /// two operands. The caller is responsible for choosing signed, unsigned
    /// or float comparison of the raw values.
    pub fn holds(&self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        let basic = self.basic_cond();
        match ord {
            Less => basic.contains(Self::LT),
            Equal => basic.contains(Self::EQ),
            Greater => basic.contains(Self::GT),
        }
    }

    /// Condition name as written in the textual format: `eq`, `ne`,
    /// `slt`/`ult` and friends for icmp, `oeq`/`une` and friends for fcmp.
    pub fn cond_name(&self) -> &'static str {
        let names_int_unsigned: [&str; 8] =
            ["false", "ult", "eq", "ule", "ugt", "ne", "uge", "true"];
        let names_int_signed: [&str; 8] =
            ["false", "slt", "eq", "sle", "sgt", "ne", "sge", "true"];
        let names_float_ordered: [&str; 8] =
            ["false", "olt", "oeq", "ole", "ogt", "one", "oge", "ord"];
        let names_float_unordered: [&str; 8] =
            ["uno", "ult", "ueq", "ule", "ugt", "une", "uge", "true"];
        let idx = self.basic_cond().bits() as usize;
        match (self.is_float(), self.is_signed_ordered()) {
            (false, false) => names_int_unsigned[idx],
            (false, true) => names_int_signed[idx],
            (true, true) => names_float_ordered[idx],
            (true, false) => names_float_unordered[idx],
        }
    }

    pub fn parse_icmp(name: &str) -> Option<Self> {
        let cond = match name {
            "eq" => Self::EQ | Self::SIGNED_ORDERED,
            "ne" => Self::NE | Self::SIGNED_ORDERED,
            "slt" => Self::LT | Self::SIGNED_ORDERED,
            "sle" => Self::LE | Self::SIGNED_ORDERED,
            "sgt" => Self::GT | Self::SIGNED_ORDERED,
            "sge" => Self::GE | Self::SIGNED_ORDERED,
            "ult" => Self::LT,
            "ule" => Self::LE,
            "ugt" => Self::GT,
            "uge" => Self::GE,
            _ => return None,
        };
        Some(cond)
    }

    pub fn parse_fcmp(name: &str) -> Option<Self> {
        let (base, ordered) = match name {
            "oeq" => (Self::EQ, true),
            "one" => (Self::NE, true),
            "olt" => (Self::LT, true),
            "ole" => (Self::LE, true),
            "ogt" => (Self::GT, true),
            "oge" => (Self::GE, true),
            "ord" => (Self::ALWAYS, true),
            "ueq" => (Self::EQ, false),
            "une" => (Self::NE, false),
            "ult" => (Self::LT, false),
            "ule" => (Self::LE, false),
            "ugt" => (Self::GT, false),
            "uge" => (Self::GE, false),
            "uno" => (Self::NEVER, false),
            _ => return None,
        };
        let mut cond = base | Self::FLOAT_SWITCH;
        if ordered {
            cond |= Self::SIGNED_ORDERED;
        }
        Some(cond)
    }
}

impl std::fmt::Display for CmpCond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cond_name())
    }
}
