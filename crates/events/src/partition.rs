use ledgerflow_core::AccountId;

/// Messages that carry a partition key.
///
/// The key is the account whose ordering the message must respect. Brokers
/// deliver same-key messages in publish order; nothing is promised across keys.
///
/// ## Transfers
///
/// A transfer is a single message keyed by its **source** account. Every debit
/// against an account (withdrawals and outgoing transfers) therefore shares that
/// account's key and is applied in publish order. The credit leg rides the source
/// partition as well; it is not ordered against the destination's own traffic,
/// which is harmless because credits are unconditional and commute.
pub trait Partitioned {
    fn partition_key(&self) -> AccountId;
}

/// Map a partition key onto one of `partitions` shards.
///
/// Uses FNV-1a over the key bytes so the mapping is stable across processes and
/// toolchain versions (brokers and consumers must agree on it).
pub fn shard_for(key: AccountId, partitions: u32) -> u32 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    if partitions <= 1 {
        return 0;
    }

    let mut hash = OFFSET;
    for byte in key.as_uuid().as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    (hash % u64::from(partitions)) as u32
}
