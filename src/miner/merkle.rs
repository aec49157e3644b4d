//! Coinbase assembly and merkle root derivation from a Stratum branch.
//!
//! A Stratum pool never sends the transaction list. It sends the coinbase
//! split around the extranonce slot plus the sibling hashes on the path
//! from the coinbase leaf to the root, so the root is a left fold.

use crate::miner::hash::double_sha256;

/// `coinbasePart1 || extraNonce1 || extraNonce2 || coinbasePart2`
pub fn build_coinbase(
    coinbase_part1: &[u8],
    extranonce1: &[u8],
    extranonce2: &[u8],
    coinbase_part2: &[u8],
) -> Vec<u8> {
    let mut tx = Vec::with_capacity(
        coinbase_part1.len() + extranonce1.len() + extranonce2.len() + coinbase_part2.len(),
    );
    tx.extend_from_slice(coinbase_part1);
    tx.extend_from_slice(extranonce1);
    tx.extend_from_slice(extranonce2);
    tx.extend_from_slice(coinbase_part2);
    tx
}

/// Fold the branch over the coinbase txid.
///
/// Returns the root in internal byte order (raw digest output), which is
/// what the header carries. With an empty branch this is the coinbase txid.
pub fn merkle_root(coinbase_tx: &[u8], branch: &[[u8; 32]]) -> [u8; 32] {
    let mut root = double_sha256(coinbase_tx);
    let mut node = [0u8; 64];

    for sibling in branch {
        node[..32].copy_from_slice(&root);
        node[32..].copy_from_slice(sibling);
        root = double_sha256(&node);
    }

    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // Genesis coinbase split so that extranonce1/extranonce2 land on real bytes.
    const COINB1: [u8; 42] = hex!(
        "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d"
    );
    const EXTRANONCE1: [u8; 4] = hex!("04ffff00");
    const EXTRANONCE2: [u8; 4] = hex!("1d010445");

    fn coinb2() -> Vec<u8> {
        hex::decode(concat!(
            "5468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b",
            "206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a0100000043",
            "4104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4",
            "f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000"
        ))
        .unwrap()
    }

    #[test]
    fn coinbase_is_concatenation() {
        let tx = build_coinbase(&[1, 2], &[3], &[4, 5], &[6]);
        assert_eq!(tx, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn empty_branch_root_is_coinbase_txid() {
        let tx = build_coinbase(&COINB1, &EXTRANONCE1, &EXTRANONCE2, &coinb2());
        assert_eq!(tx.len(), 204);

        let root = merkle_root(&tx, &[]);
        assert_eq!(root, double_sha256(&tx));
        assert_eq!(
            root,
            hex!("3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a")
        );
    }

    #[test]
    fn branch_is_folded_in_order() {
        let tx = build_coinbase(&COINB1, &EXTRANONCE1, &EXTRANONCE2, &coinb2());
        let sibling = [0x11u8; 32];

        let root = merkle_root(&tx, &[sibling]);
        assert_eq!(
            root,
            hex!("db7dd36f6a7b6b6a990dcf42c2703243034a1e6a944fb702708f64b71205711c")
        );

        let a = [0x22u8; 32];
        let b = [0x33u8; 32];
        assert_ne!(merkle_root(&tx, &[a, b]), merkle_root(&tx, &[b, a]));
    }
}
