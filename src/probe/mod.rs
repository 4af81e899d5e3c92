pub mod parser;
pub mod producer;

pub use parser::{LineParser, ParsedLine, PingLineParser};
pub use producer::{ProbeCommand, ProbeCounters, ProbeHandle, ProbeProducer};
