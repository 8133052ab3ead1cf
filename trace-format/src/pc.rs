/// Identity of a static load/store or allocation site: `(function id, instruction id)`.
///
/// The all-ones pair is the null sentinel for accesses that cannot be
/// attributed to a static instruction (the instrumentation writes these
/// out as `-1 -1`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pc {
    pub func: u16,
    pub inst: u16,
}

impl Pc {
    pub const fn new(func: u16, inst: u16) -> Self {
        Pc { func, inst }
    }

    pub const fn null() -> Self {
        Pc {
            func: u16::MAX,
            inst: u16::MAX,
        }
    }

    pub const fn is_null(&self) -> bool {
        self.func == u16::MAX && self.inst == u16::MAX
    }

    /// Build a [`Pc`] from the signed on-disk representation, where a
    /// function id of `-1` marks the null sentinel.
    pub fn from_signed(func: i32, inst: i32) -> Option<Self> {
        if func == -1 {
            Some(Pc::null())
        } else {
            let func = u16::try_from(func).ok()?;
            let inst = u16::try_from(inst).ok()?;
            Some(Pc { func, inst })
        }
    }
}

impl std::fmt::Display for Pc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{} {}", self.func, self.inst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Pc::new(1, 9) < Pc::new(2, 0));
        assert!(Pc::new(2, 0) < Pc::new(2, 1));
        assert!(Pc::new(2, 1) < Pc::null());
    }

    #[test]
    fn signed_repr() {
        assert_eq!(Pc::from_signed(-1, -1), Some(Pc::null()));
        assert_eq!(Pc::from_signed(-1, 7), Some(Pc::null()));
        assert_eq!(Pc::from_signed(3, 7), Some(Pc::new(3, 7)));
        assert_eq!(Pc::from_signed(0x10000, 0), None);
        assert_eq!(Pc::from_signed(3, -2), None);
    }
}
