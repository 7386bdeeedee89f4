//! Structural hashing.
//!
//! Every node gets a digest computed bottom-up from its kind, its label and the
//! digests of its children, in order. Two subtrees with the same shape, kinds and
//! labels always hash the same, wherever they sit, which lets the top-down
//! matcher find isomorphic candidates without walking them.
//!
//! The default generator is a rolling hash: the subtree is seen as the sequence
//! `open(node) child_1 .. child_n close(node)` and folded with a fixed base, so
//! a parent's digest can be derived from its children's digests and sizes alone.

use core::fmt;
use core::hash::Hasher;

use rapidhash::RapidHasher;

use crate::tree::NodeKind;

/// Base of the rolling polynomial.
pub const BASE: i32 = 33;

const OPEN_SYMBOL: &str = "[(";
const CLOSE_SYMBOL: &str = ")]";
const SEPARATE_SYMBOL: &str = "@@";

/// Structural digest of a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeHash(pub i32);

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash and size of one child, as seen by its parent.
#[derive(Debug, Clone, Copy)]
pub struct ChildDigest {
    /// The child's structural hash
    pub hash: NodeHash,
    /// Number of nodes in the child's subtree (itself included)
    pub size: usize,
}

/// Computes a node's structural hash from its own content and its children.
///
/// Implementations must be pure: the same kind, label and child digests always
/// produce the same hash.
pub trait HashGenerator: Sync {
    /// Hash one node. `label` is empty for unlabeled nodes.
    fn hash_node(&self, kind: NodeKind, label: &str, children: &[ChildDigest]) -> NodeHash;
}

/// String hash used for the opening and closing seeds of a node.
pub trait SeedHash: Sync {
    /// Hash a seed string to 32 bits.
    fn hash_seed(&self, seed: &str) -> i32;
}

/// `java.lang.String#hashCode`: `s[0]*31^(n-1) + ... + s[n-1]` over UTF-16 units.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaStringHash;

impl SeedHash for JavaStringHash {
    fn hash_seed(&self, seed: &str) -> i32 {
        seed.encode_utf16()
            .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
    }
}

/// rapidhash over the seed bytes, truncated to 32 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RapidSeedHash;

impl SeedHash for RapidSeedHash {
    fn hash_seed(&self, seed: &str) -> i32 {
        let mut hasher = RapidHasher::default();
        hasher.write(seed.as_bytes());
        hasher.finish() as i32
    }
}

/// Rolling structural hash parameterized by the seed hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingHash<S = JavaStringHash> {
    seed: S,
}

impl RollingHash<JavaStringHash> {
    /// Rolling hash over Java string hashes. This is the default generator.
    pub fn java() -> Self {
        Self {
            seed: JavaStringHash,
        }
    }
}

impl RollingHash<RapidSeedHash> {
    /// Rolling hash over rapidhash seeds, with better spread on long labels.
    pub fn rapid() -> Self {
        Self {
            seed: RapidSeedHash,
        }
    }
}

fn open_seed(kind: NodeKind, label: &str) -> String {
    format!("{OPEN_SYMBOL}{label}{SEPARATE_SYMBOL}{kind}")
}

fn close_seed(kind: NodeKind, label: &str) -> String {
    format!("{kind}{SEPARATE_SYMBOL}{label}{CLOSE_SYMBOL}")
}

impl<S: SeedHash> HashGenerator for RollingHash<S> {
    fn hash_node(&self, kind: NodeKind, label: &str, children: &[ChildDigest]) -> NodeHash {
        let size: usize = 1 + children.iter().map(|c| c.size).sum::<usize>();
        // Each node contributes an open and a close symbol to the sequence.
        let mut exponent = 2 * size - 1;

        let mut hash = self
            .seed
            .hash_seed(&open_seed(kind, label))
            .wrapping_mul(BASE.wrapping_pow(exponent as u32));
        for child in children {
            exponent -= 2 * child.size;
            hash = hash.wrapping_add(child.hash.0.wrapping_mul(BASE.wrapping_pow(exponent as u32)));
        }
        hash = hash.wrapping_add(self.seed.hash_seed(&close_seed(kind, label)));

        NodeHash(hash)
    }
}
