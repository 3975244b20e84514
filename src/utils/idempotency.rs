/// Batch key generation
use sha2::{Digest, Sha256};

use crate::types::{Candle, Partition};

pub fn generate_idempotency_key(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for component in components {
        hasher.update(component.as_bytes());
        hasher.update([0u8]);
    }
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Deterministic fingerprint of one write batch: same partition, symbol and keys give the same key
pub fn batch_key(partition: &Partition, symbol: &str, batch: &[Candle]) -> String {
    let table = partition.table_name();
    let open_times: Vec<String> = batch.iter().map(|c| c.open_time.to_string()).collect();

    let mut components: Vec<&str> = Vec::with_capacity(open_times.len() + 2);
    components.push(&table);
    components.push(symbol);
    components.extend(open_times.iter().map(String::as_str));

    // Short form is enough for log correlation
    generate_idempotency_key(&components)[..16].to_string()
}
