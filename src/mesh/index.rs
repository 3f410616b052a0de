//! Index and flag types for chart elements.
//!
//! Charts are arenas: vertices, edges and faces live in `Vec`s and refer to
//! each other through the type-safe indices defined here. Optional links
//! (such as an edge's `pair`) are expressed as `Option<EdgeId>` rather than
//! sentinel values.

use std::fmt::{self, Debug};

/// Host-side key identifying a face or a vertex of the input mesh.
pub type ParamKey = u64;

/// A type-safe vertex index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VertId(u32);

/// A type-safe (half-)edge index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct EdgeId(u32);

/// A type-safe face index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FaceId(u32);

macro_rules! impl_index_type {
    ($name:ident, $display:literal) => {
        impl $name {
            /// Create a new index from a raw value.
            #[inline]
            pub fn new(index: usize) -> Self {
                debug_assert!(index < u32::MAX as usize, "index {} too large", index);
                Self(index as u32)
            }

            /// Get the raw index value.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $display, self.0)
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }
    };
}

impl_index_type!(VertId, "V");
impl_index_type!(EdgeId, "E");
impl_index_type!(FaceId, "F");

macro_rules! impl_flags {
    ($(#[$sdoc:meta])* $name:ident { $($(#[$doc:meta])* $flag:ident = $bit:expr,)* }) => {
        $(#[$sdoc])*
        #[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
        #[repr(transparent)]
        pub struct $name(u8);

        impl $name {
            $(
                $(#[$doc])*
                pub const $flag: Self = Self($bit);
            )*

            /// No flags set.
            #[inline]
            pub const fn empty() -> Self {
                Self(0)
            }

            /// True if every bit of `other` is set.
            #[inline]
            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// True if any bit of `other` is set.
            #[inline]
            pub fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            /// Set the bits of `other`.
            #[inline]
            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            /// Clear the bits of `other`.
            #[inline]
            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            /// Set or clear the bits of `other`.
            #[inline]
            pub fn set(&mut self, other: Self, value: bool) {
                if value {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut list = f.debug_set();
                $(
                    if self.contains(Self::$flag) {
                        list.entry(&stringify!($flag));
                    }
                )*
                list.finish()
            }
        }
    };
}

impl_flags!(
    /// Per-vertex state bits.
    VertFlags {
        /// The vertex is pinned to its loaded UV.
        PIN = 1,
        /// At least one corner of the vertex is selected.
        SELECT = 2,
        /// The vertex is surrounded by faces (ABF bookkeeping).
        INTERIOR = 4,
        /// The vertex was duplicated while splitting non-manifold fans.
        SPLIT = 16,
    }
);

impl_flags!(
    /// Per-edge state bits.
    EdgeFlags {
        /// Never pair this edge with a neighbour.
        SEAM = 1,
        /// The edge's fan has been visited by the vertex splitter.
        VERTEX_SPLIT = 2,
        /// The corner starting at this edge is pinned.
        PIN = 4,
        /// The corner starting at this edge is selected.
        SELECT = 8,
        /// Scratch flag for traversals.
        DONE = 16,
        /// The edge was created by hole filling.
        FILLED = 32,
    }
);

impl_flags!(
    /// Per-face state bits.
    FaceFlags {
        /// The face has been reached by the pair-connecting flood fill.
        CONNECTED = 1,
        /// The face was created by hole filling.
        FILLED = 2,
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vert_id() {
        let v = VertId::new(42);
        assert_eq!(v.index(), 42);
        assert_eq!(VertId::from(42), v);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", VertId::new(42)), "V(42)");
        assert_eq!(format!("{:?}", EdgeId::new(3)), "E(3)");
        assert_eq!(format!("{:?}", FaceId::new(0)), "F(0)");
    }

    #[test]
    fn test_flags() {
        let mut f = EdgeFlags::empty();
        f.insert(EdgeFlags::SEAM | EdgeFlags::PIN);
        assert!(f.contains(EdgeFlags::SEAM));
        assert!(f.intersects(EdgeFlags::PIN | EdgeFlags::DONE));
        assert!(!f.contains(EdgeFlags::PIN | EdgeFlags::DONE));

        f.remove(EdgeFlags::SEAM);
        assert!(!f.contains(EdgeFlags::SEAM));

        f.set(EdgeFlags::DONE, true);
        assert_eq!(format!("{:?}", f), "{\"PIN\", \"DONE\"}");
    }
}
