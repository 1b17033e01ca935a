//! Initial frontier: host addresses around each seed, sampled and shuffled
//! reproducibly.

use ipnetwork::IpNetwork;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, warn};

/// Expand every seed to the usable hosts of its `/prefix` network.
///
/// Unparsable seeds are skipped. Networks larger than two addresses lose
/// their first address, and IPv4 networks also lose their broadcast address. When a network yields more than
/// `max_per_seed` hosts, a subset keyed by the seed is drawn. The combined
/// pool is shuffled with a key derived from all inputs, so identical
/// arguments always produce the identical sequence.
pub fn generate_pool(seeds: &[String], prefix: u8, max_per_seed: Option<usize>) -> Vec<String> {
    let cap = max_per_seed.filter(|cap| *cap > 0);
    let mut pool = Vec::new();

    for seed in seeds {
        let Ok(ip) = seed.trim().parse::<IpAddr>() else {
            warn!(seed = %seed, "skipping unparsable seed");
            continue;
        };
        let network = match IpNetwork::new(ip, prefix) {
            Ok(net) => net,
            Err(err) => {
                warn!(seed = %seed, prefix, error = %err, "skipping seed");
                continue;
            }
        };
        let before = pool.len();
        extend_with_hosts(&mut pool, seed, network, cap);
        debug!(seed = %seed, network = %network, hosts = pool.len() - before, "expanded seed");
    }

    let mut rng = ChaCha8Rng::from_seed(shuffle_key(seeds, prefix, max_per_seed));
    pool.shuffle(&mut rng);
    pool
}

fn extend_with_hosts(pool: &mut Vec<String>, seed: &str, network: IpNetwork, cap: Option<usize>) {
    let (bits, base) = match network.network() {
        IpAddr::V4(addr) => (32u32, u128::from(u32::from(addr))),
        IpAddr::V6(addr) => (128u32, u128::from(addr)),
    };
    let host_bits = bits - u32::from(network.prefix());
    let size = if host_bits >= 128 {
        u128::MAX
    } else {
        1u128 << host_bits
    };
    // IPv4 drops network and broadcast. IPv6 has no broadcast and only drops
    // the Subnet-Router anycast address at offset 0.
    let (first, count) = match network {
        _ if size <= 2 => (0, size),
        IpNetwork::V4(_) => (1, size - 2),
        IpNetwork::V6(_) => (1, size - 1),
    };

    let offsets: Vec<u128> = match cap {
        Some(cap) if count > cap as u128 => sample_offsets(seed, count, cap),
        _ => (0..count).collect(),
    };

    for offset in offsets {
        let value = base + first + offset;
        let addr = match network {
            IpNetwork::V4(_) => IpAddr::V4(Ipv4Addr::from(value as u32)),
            IpNetwork::V6(_) => IpAddr::V6(Ipv6Addr::from(value)),
        };
        pool.push(addr.to_string());
    }
}

fn sample_offsets(seed: &str, count: u128, cap: usize) -> Vec<u128> {
    let mut rng = ChaCha8Rng::from_seed(Sha256::digest(seed.as_bytes()).into());

    if let Ok(length) = usize::try_from(count) {
        return index::sample(&mut rng, length, cap)
            .into_iter()
            .map(|i| i as u128)
            .collect();
    }

    // Ranges past usize (large IPv6 networks): draw until `cap` distinct.
    let mut picked = HashSet::with_capacity(cap);
    let mut offsets = Vec::with_capacity(cap);
    while offsets.len() < cap {
        let offset = rng.gen_range(0..count);
        if picked.insert(offset) {
            offsets.push(offset);
        }
    }
    offsets
}

fn shuffle_key(seeds: &[String], prefix: u8, max_per_seed: Option<usize>) -> [u8; 32] {
    let cap = max_per_seed.map_or_else(|| "none".to_string(), |cap| cap.to_string());
    let material = format!("{}|{prefix}|{cap}", seeds.join(","));
    Sha256::digest(material.as_bytes()).into()
}
