use latmesh_model::Hop;
use std::net::IpAddr;

/// Parse every hop line of a numeric single-probe traceroute (`-n -q 1`),
/// in print order. Header lines, timeouts and garbage are skipped.
pub fn parse_traceroute(text: &str) -> Vec<Hop> {
    text.lines().filter_map(parse_hop_line).collect()
}

/// Parse one `<ttl> <address> <rtt> ms` line.
///
/// Returns `None` for `*` hops, the `traceroute to ...` banner and any line
/// whose address is not a literal IPv4/IPv6 address.
pub fn parse_hop_line(line: &str) -> Option<Hop> {
    let mut tokens = line.split_whitespace();

    let ttl = tokens.next()?;
    if ttl.is_empty() || !ttl.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let addr = tokens.next()?;
    if addr == "*" || addr.parse::<IpAddr>().is_err() {
        return None;
    }

    let rtt_token = tokens.next()?;
    let rtt_ms = parse_rtt(rtt_token, tokens.next())?;

    Some(Hop::new(addr, rtt_ms))
}

fn parse_rtt(token: &str, next: Option<&str>) -> Option<f64> {
    if let Some(num) = token.strip_suffix("ms") {
        return parse_decimal(num);
    }

    match next {
        Some(unit) if unit.starts_with("ms") => parse_decimal(token),
        _ => None,
    }
}

fn parse_decimal(token: &str) -> Option<f64> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    token.parse::<f64>().ok()
}
