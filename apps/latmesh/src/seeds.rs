use latmesh_scan::DEFAULT_SEEDS;
use std::fs;
use std::net::Ipv4Addr;

const ROUTE_TABLE: &str = "/proc/net/route";

/// Default IPv4 gateway from the kernel routing table, if there is one.
pub fn detect_default_gateway() -> Option<Ipv4Addr> {
    let table = fs::read_to_string(ROUTE_TABLE).ok()?;
    parse_default_gateway(&table)
}

/// Find the `00000000` destination row and decode its little-endian hex
/// gateway.
pub fn parse_default_gateway(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "00000000" {
            return None;
        }
        let raw = u32::from_str_radix(fields[2], 16).ok()?;
        Some(Ipv4Addr::from(raw.to_le_bytes()))
    })
}

/// Gateway (when detectable) followed by the default public seeds.
pub fn auto_seeds() -> Vec<String> {
    let gateway = detect_default_gateway().map(|gw| gw.to_string());
    dedup(gateway.into_iter().chain(DEFAULT_SEEDS.iter().map(|s| s.to_string())))
}

/// Keep the first occurrence of every seed.
pub fn dedup(seeds: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for seed in seeds {
        if !out.contains(&seed) {
            out.push(seed);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0000A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
";

    #[test]
    fn gateway_is_decoded_from_the_default_route() {
        assert_eq!(
            parse_default_gateway(TABLE),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
    }

    #[test]
    fn tables_without_a_default_route_yield_nothing() {
        let header_only = TABLE.lines().take(2).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_default_gateway(&header_only), None);
        assert_eq!(parse_default_gateway(""), None);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let seeds = dedup(
            ["8.8.8.8", "1.1.1.1", "8.8.8.8", "192.0.2.1"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(seeds, vec!["8.8.8.8", "1.1.1.1", "192.0.2.1"]);
    }

    #[test]
    fn auto_seeds_end_with_the_defaults() {
        let seeds = auto_seeds();
        assert!(seeds.ends_with(&[
            "1.1.1.1".to_string(),
            "8.8.8.8".to_string(),
            "9.9.9.9".to_string()
        ]));
    }
}
