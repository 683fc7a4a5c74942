//! Dense arena ids for the MIR, mirroring `scatha_ir::ids`'s
//! arena-plus-index strategy (spec §9 Design Notes) at the machine level.

use std::fmt;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(VRegId);
arena_id!(MirBlockId);
arena_id!(MirInstId);
arena_id!(MirFunctionId);
arena_id!(StackSlotId);
