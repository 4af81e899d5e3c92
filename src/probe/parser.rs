use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::types::Latency;

/// `<bytes> bytes from <ipv4>: icmp_seq=<n> ttl=<n> time=<ms> ms`
static PING_REPLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+ bytes from \d+\.\d+\.\d+\.\d+: icmp_seq=\d+ ttl=\d+ time=(\d+(?:\.\d+)?) ms$")
        .expect("valid ping reply pattern")
});

/// Classification of one line of probe output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedLine {
    /// Blank line or startup banner.
    Ignored,
    Sample(Latency),
    /// Anything else. Dropped by the producer, never an error.
    Unrecognized,
}

/// Turns probe output lines into samples. Swap the implementation to support
/// another probe dialect without touching the producer or the engine.
pub trait LineParser: Send + Sync {
    fn parse(&self, line: &str) -> ParsedLine;
}

/// Parser for the iputils / BSD `ping` reply format.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingLineParser;

impl LineParser for PingLineParser {
    fn parse(&self, line: &str) -> ParsedLine {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with("PING") {
            return ParsedLine::Ignored;
        }

        PING_REPLY
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_millis(m.as_str()))
            .map_or(ParsedLine::Unrecognized, ParsedLine::Sample)
    }
}

/// Converts a decimal millisecond string (`"23.4"`, `"123"`) into a Duration
/// without going through floating point. Digits past nanosecond precision are
/// truncated.
fn parse_millis(s: &str) -> Option<Duration> {
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let whole: u64 = whole.parse().ok()?;

    let mut frac_ns: u64 = 0;
    let mut scale: u64 = 100_000;
    for c in frac.chars().take(6) {
        frac_ns += u64::from(c.to_digit(10)?) * scale;
        scale /= 10;
    }

    let nanos = whole.checked_mul(1_000_000)?.checked_add(frac_ns)?;
    Some(Duration::from_nanos(nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ParsedLine {
        PingLineParser.parse(line)
    }

    #[test]
    fn extracts_latency_from_reply() {
        assert_eq!(
            parse("64 bytes from 1.2.3.4: icmp_seq=1 ttl=64 time=23.4 ms"),
            ParsedLine::Sample(Duration::from_micros(23_400))
        );
    }

    #[test]
    fn keeps_sub_millisecond_precision() {
        assert_eq!(
            parse("64 bytes from 142.250.187.227: icmp_seq=12 ttl=117 time=0.042 ms"),
            ParsedLine::Sample(Duration::from_micros(42))
        );
        assert_eq!(
            parse("64 bytes from 10.0.0.1: icmp_seq=3 ttl=63 time=1.2345678 ms"),
            ParsedLine::Sample(Duration::from_nanos(1_234_567))
        );
    }

    #[test]
    fn accepts_integer_latency() {
        assert_eq!(
            parse("64 bytes from 8.8.8.8: icmp_seq=7 ttl=55 time=123 ms"),
            ParsedLine::Sample(Duration::from_millis(123))
        );
    }

    #[test]
    fn banner_and_blank_lines_are_ignored() {
        assert_eq!(parse(""), ParsedLine::Ignored);
        assert_eq!(parse("   "), ParsedLine::Ignored);
        assert_eq!(
            parse("PING google.co.uk (142.250.187.227) 56(84) bytes of data."),
            ParsedLine::Ignored
        );
    }

    #[test]
    fn other_lines_are_unrecognized() {
        for line in [
            "Request timeout for icmp_seq 4",
            "From 192.168.1.1 icmp_seq=2 Destination Host Unreachable",
            "--- google.co.uk ping statistics ---",
            "5 packets transmitted, 5 received, 0% packet loss, time 4006ms",
            "64 bytes from lhr25s34-in-f3.1e100.net (142.250.187.227): icmp_seq=1 ttl=117 time=9.87 ms",
            "64 bytes from 1.2.3.4: icmp_seq=1 ttl=64 time=abc ms",
        ] {
            assert_eq!(parse(line), ParsedLine::Unrecognized, "{line}");
        }
    }

    #[test]
    fn trailing_carriage_return_is_tolerated() {
        assert_eq!(
            parse("64 bytes from 1.2.3.4: icmp_seq=1 ttl=64 time=5.0 ms\r"),
            ParsedLine::Sample(Duration::from_millis(5))
        );
    }
}
