//! The per-block attribute algebra carried by every graph element.

/// Client-supplied payload attached to every block of a network.
///
/// Structural mutations (merge, split, collapse) repartition and recombine
/// component values so that the fold of [`add`](Component::add) over all
/// graph elements always equals the fold over
/// [`from_length(1)`](Component::from_length) applied per block. For that to
/// hold, implementations must satisfy:
///
/// - `add` is associative and `add(a, from_length(0)) == a`
/// - `del(add(a, b), b) == a` whenever `b` was previously added into `a`
/// - `add(partition(a, l, r).0, partition(a, l, r).1) == a` for `l + r >= 1`;
///   when one side is `0` the other side equals `a` and the zero side equals
///   `from_length(0)`
///
/// `del` with a component that was never added, and `partition` with both
/// sides zero, are outside the contract: the core never produces such calls
/// (zero-length halves are guarded before partitioning), and the algebra's
/// behavior on misuse is its own business.
pub trait Component: Clone + std::fmt::Debug {
    /// The canonical component representing `n` lattice cells (`n` may be 0).
    fn from_length(n: usize) -> Self;

    /// Combine two components (merging edges or nodes).
    #[must_use]
    fn add(&self, other: &Self) -> Self;

    /// Remove `other`'s previously-added contribution (detaching a block or
    /// sub-segment).
    #[must_use]
    fn del(&self, other: &Self) -> Self;

    /// Split into two parts sized proportionally to `left : right`.
    #[must_use]
    fn partition(&self, left: usize, right: usize) -> (Self, Self);
}

/// The trivial algebra: a component is the number of blocks it stands for.
///
/// Used as the default in unit tests; real networks supply their own
/// capacity/fluid/charge types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockCount(pub usize);

impl Component for BlockCount {
    fn from_length(n: usize) -> Self {
        BlockCount(n)
    }

    fn add(&self, other: &Self) -> Self {
        BlockCount(self.0 + other.0)
    }

    fn del(&self, other: &Self) -> Self {
        BlockCount(self.0.saturating_sub(other.0))
    }

    fn partition(&self, left: usize, right: usize) -> (Self, Self) {
        if left == 0 {
            return (BlockCount(0), *self);
        }
        if right == 0 {
            return (*self, BlockCount(0));
        }
        // round half up on the left share, remainder goes right
        let total = left + right;
        let l = (self.0 * left + total / 2) / total;
        (BlockCount(l), BlockCount(self.0 - l))
    }
}
