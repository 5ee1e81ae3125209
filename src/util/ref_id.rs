use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Wrapper type whose "identity" for equality, ordering, and hashing is determined from the
/// reference itself (ie. the pointer) and not from the underlying data.
///
/// Instruction nodes are compared this way: two nodes holding the same opcode and operand are
/// still different nodes unless they are the same allocation.
pub struct RefId<'a, T: ?Sized>(pub &'a T);

impl<'a, T: ?Sized> RefId<'a, T> {
    /// Address of the referenced value (only meaningful for identity and debugging)
    pub fn address(&self) -> usize {
        self.0 as *const T as *const () as usize
    }
}

impl<'a, T: ?Sized> Clone for RefId<'a, T> {
    fn clone(&self) -> Self {
        RefId(self.0)
    }
}

impl<'a, T: ?Sized> Copy for RefId<'a, T> {}

impl<'a, T: ?Sized> Hash for RefId<'a, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state)
    }
}

impl<'a, 'b, T: ?Sized> PartialEq<RefId<'b, T>> for RefId<'a, T> {
    fn eq(&self, other: &RefId<'b, T>) -> bool {
        self.address() == other.address()
    }
}

impl<'a, T: ?Sized> Eq for RefId<'a, T> {}

impl<'a, 'b, T: ?Sized> PartialOrd<RefId<'b, T>> for RefId<'a, T> {
    fn partial_cmp(&self, other: &RefId<'b, T>) -> Option<Ordering> {
        Some(self.address().cmp(&other.address()))
    }
}

impl<'a, T: ?Sized> Ord for RefId<'a, T> {
    fn cmp(&self, other: &RefId<'a, T>) -> Ordering {
        self.address().cmp(&other.address())
    }
}

impl<'a, T: ?Sized> Deref for RefId<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

impl<'a, T: ?Sized + fmt::Debug> fmt::Debug for RefId<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:x} ", self.address())?;
        self.0.fmt(f)
    }
}
