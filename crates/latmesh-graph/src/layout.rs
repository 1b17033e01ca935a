use crate::store::GraphStore;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

pub type Positions = BTreeMap<String, [f64; 2]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Distance from the origin is the node's RTT, angle a hash of its address.
    #[default]
    Radial,
    /// Hop depth from each component's lowest-latency node along x.
    Layered,
    /// Force-directed placement from hashed starting points.
    Spring,
}

impl Layout {
    pub fn name(self) -> &'static str {
        match self {
            Layout::Radial => "radial",
            Layout::Layered => "layered",
            Layout::Spring => "spring",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "radial" => Ok(Layout::Radial),
            "layered" => Ok(Layout::Layered),
            // No planar embedding is computed; spring placement stands in.
            "spring" | "planar" => Ok(Layout::Spring),
            other => Err(format!(
                "unknown layout: {other} (expected radial, layered, spring or planar)"
            )),
        }
    }
}

pub fn compute_positions(graph: &GraphStore, layout: Layout) -> Positions {
    match layout {
        Layout::Radial => radial(graph),
        Layout::Layered => layered(graph),
        Layout::Spring => spring(graph),
    }
}

/// Deterministic angle in `[0, 2π)` for an address.
pub fn address_angle(addr: &str) -> f64 {
    unit_hash(0, addr) * TAU
}

fn radial(graph: &GraphStore) -> Positions {
    graph
        .nodes()
        .map(|(id, attrs)| {
            let r = attrs.rtt.unwrap_or(1.0);
            let theta = address_angle(id);
            (id.to_string(), [r * theta.cos(), r * theta.sin()])
        })
        .collect()
}

fn layered(graph: &GraphStore) -> Positions {
    if graph.is_empty() {
        return Positions::new();
    }

    // Roots: closest node of each component, visited in RTT order.
    let mut order: Vec<(&str, f64)> = graph
        .nodes()
        .map(|(id, attrs)| (id, attrs.rtt.unwrap_or(f64::INFINITY)))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

    let mut depth: HashMap<&str, u32> = HashMap::new();
    let mut component: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for (index, &(start, _)) in order.iter().enumerate() {
        if depth.contains_key(start) {
            continue;
        }
        depth.insert(start, 0);
        component.insert(start, index);
        queue.push_back(start);

        while let Some(node) = queue.pop_front() {
            let next_depth = depth.get(node).copied().unwrap_or(0) + 1;
            for neighbor in graph.neighbors(node) {
                if !depth.contains_key(neighbor) {
                    depth.insert(neighbor, next_depth);
                    component.insert(neighbor, index);
                    queue.push_back(neighbor);
                }
            }
        }
    }

    let mut layers: BTreeMap<u32, Vec<(usize, &str)>> = BTreeMap::new();
    for (node, d) in &depth {
        let comp = component.get(node).copied().unwrap_or(0);
        layers.entry(*d).or_default().push((comp, *node));
    }

    let lane_spacing = 1.0_f64;
    let jitter_scale = 0.25_f64;
    let mut positions = Positions::new();

    for (d, mut members) in layers {
        members.sort();
        let center = (members.len() as f64 - 1.0) / 2.0;
        for (slot, (_, id)) in members.into_iter().enumerate() {
            let x = f64::from(d) + (unit_hash(1, id) * 2.0 - 1.0) * jitter_scale;
            let y = (slot as f64 - center) * lane_spacing;
            positions.insert(id.to_string(), [x, y]);
        }
    }

    positions
}

const SPRING_ITERATIONS: usize = 50;

// Fruchterman-Reingold in the unit square with linear cooling.
fn spring(graph: &GraphStore) -> Positions {
    let ids: Vec<&str> = graph.nodes().map(|(id, _)| id).collect();
    let n = ids.len();
    if n == 0 {
        return Positions::new();
    }

    let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let edges: Vec<(usize, usize)> = graph
        .edges()
        .filter_map(|(a, b, _)| Some((*index.get(a)?, *index.get(b)?)))
        .collect();
    let mut pos: Vec<[f64; 2]> = ids
        .iter()
        .map(|id| [unit_hash(2, id), unit_hash(3, id)])
        .collect();

    let k = (1.0 / n as f64).sqrt();
    let mut temperature = 0.1_f64;
    let cooling = temperature / (SPRING_ITERATIONS as f64 + 1.0);

    for _ in 0..SPRING_ITERATIONS {
        let mut disp = vec![[0.0_f64; 2]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = pos[i][0] - pos[j][0];
                let dy = pos[i][1] - pos[j][1];
                let dist = (dx * dx + dy * dy).sqrt().max(0.01);
                let force = k * k / dist;
                let (fx, fy) = (dx / dist * force, dy / dist * force);
                disp[i][0] += fx;
                disp[i][1] += fy;
                disp[j][0] -= fx;
                disp[j][1] -= fy;
            }
        }
        for &(a, b) in &edges {
            let dx = pos[a][0] - pos[b][0];
            let dy = pos[a][1] - pos[b][1];
            let dist = (dx * dx + dy * dy).sqrt().max(0.01);
            let force = dist * dist / k;
            let (fx, fy) = (dx / dist * force, dy / dist * force);
            disp[a][0] -= fx;
            disp[a][1] -= fy;
            disp[b][0] += fx;
            disp[b][1] += fy;
        }
        for (point, [dx, dy]) in pos.iter_mut().zip(disp) {
            let length = (dx * dx + dy * dy).sqrt();
            if length > 0.0 {
                let step = length.min(temperature);
                point[0] += dx / length * step;
                point[1] += dy / length * step;
            }
        }
        temperature -= cooling;
    }

    ids.into_iter()
        .zip(pos)
        .map(|(id, point)| (id.to_string(), point))
        .collect()
}

// FNV-1a over the address bytes, scaled to [0, 1).
fn unit_hash(seed: u64, id: &str) -> f64 {
    let mut hash = 0xcbf29ce484222325u64 ^ seed;
    for byte in id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use latmesh_model::Hop;

    fn chain() -> GraphStore {
        let mut graph = GraphStore::new();
        graph.observe(&[
            Hop::new("192.168.1.1", 1.0),
            Hop::new("10.0.0.1", 4.0),
            Hop::new("10.0.0.2", 9.0),
        ]);
        graph.observe(&[Hop::new("192.168.1.1", 1.0), Hop::new("10.9.9.9", 6.0)]);
        graph
    }

    #[test]
    fn angle_is_deterministic_and_in_range() {
        let first = address_angle("192.0.2.1");
        assert_eq!(first, address_angle("192.0.2.1"));
        assert!((0.0..TAU).contains(&first));
    }

    #[test]
    fn radial_distance_is_rtt() {
        let positions = compute_positions(&chain(), Layout::Radial);
        let [x, y] = positions["10.0.0.2"];
        assert!(((x * x + y * y).sqrt() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn layered_depth_follows_hops() {
        let positions = compute_positions(&chain(), Layout::Layered);
        assert_eq!(positions.len(), 4);
        assert!(positions["192.168.1.1"][0].abs() <= 0.25);
        assert!((positions["10.0.0.1"][0] - 1.0).abs() <= 0.25);
        assert!((positions["10.0.0.2"][0] - 2.0).abs() <= 0.25);
        assert_ne!(positions["10.0.0.1"][1], positions["10.9.9.9"][1]);
    }

    #[test]
    fn spring_is_deterministic_and_pulls_neighbors_together() {
        let graph = chain();
        let first = compute_positions(&graph, Layout::Spring);
        assert_eq!(first, compute_positions(&graph, Layout::Spring));
        assert_eq!(first.len(), 4);
        assert!(first.values().all(|[x, y]| x.is_finite() && y.is_finite()));

        let dist = |a: &str, b: &str| {
            let ([ax, ay], [bx, by]) = (first[a], first[b]);
            ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
        };
        assert!(dist("10.0.0.1", "10.0.0.2") < dist("10.0.0.2", "10.9.9.9"));
    }

    #[test]
    fn layout_names_parse() {
        assert_eq!("Layered".parse::<Layout>().unwrap(), Layout::Layered);
        assert_eq!("planar".parse::<Layout>().unwrap(), Layout::Spring);
        assert_eq!(Layout::Spring.to_string(), "spring");
        assert!("spring".parse::<Layout>().is_err());
        assert_eq!(Layout::default().to_string(), "radial");
    }
}
