//! Traceroute collection and parsing.

pub mod parser;
pub mod runner;

pub use parser::{parse_hop_line, parse_traceroute};
pub use runner::{SystemTraceroute, TraceSettings, Tracer};
