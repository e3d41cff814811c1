use crate::hasher::Digest;

/// Binary Merkle tree over transaction hashes.
///
/// The root is committed to by the unit header as its transaction root.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    root: Digest,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a Merkle tree from leaf digests.
    ///
    /// An empty list produces an all-zero root. A single leaf is its own root.
    pub fn from_leaves(leaves: &[Digest]) -> Self {
        if leaves.is_empty() {
            return Self {
                root: [0u8; 32],
                leaf_count: 0,
            };
        }

        let mut current = leaves.to_vec();
        while current.len() > 1 {
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            let mut pairs = current.chunks_exact(2);
            for pair in &mut pairs {
                next.push(hash_pair(&pair[0], &pair[1]));
            }
            // An odd node moves up unchanged.
            next.extend_from_slice(pairs.remainder());
            current = next;
        }

        Self {
            root: current[0],
            leaf_count: leaves.len(),
        }
    }

    /// The root hash of the tree.
    pub fn root(&self) -> Digest {
        self.root
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }
}

fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"udl-merkle-v1:");
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}
