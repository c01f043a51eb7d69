//! Parsing for Redis and Sentinel `INFO` text output.
//!
//! Every parser is a pure function over the raw reply so it can be tested
//! without a live server.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

/// Errors that can occur during parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to compile regex: {0}")]
    RegexCompilation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Parse key-value pairs from INFO command output.
///
/// INFO output format: `key:value` per line, with optional section headers starting with `#`.
///
/// # Example
/// ```
/// use redis_sentinel_operator::client::parsing::parse_info_output;
///
/// let info = "# Replication\nrole:master\nconnected_slaves:2\n";
/// let parsed = parse_info_output(info).unwrap();
/// assert_eq!(parsed.get("role"), Some(&"master".to_string()));
/// ```
pub fn parse_info_output(info: &str) -> Result<HashMap<String, String>, ParseError> {
    let kv_regex =
        Regex::new(r"^([\w-]+):(.+)$").map_err(|e| ParseError::RegexCompilation(e.to_string()))?;

    let mut result = HashMap::new();

    for line in info.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(caps) = kv_regex.captures(line)
            && let (Some(key), Some(value)) = (caps.get(1), caps.get(2))
        {
            result.insert(key.as_str().to_string(), value.as_str().trim().to_string());
        }
    }

    Ok(result)
}

/// Role reported by `INFO replication`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationRole {
    Master,
    Slave,
}

/// Replication state from `INFO replication`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationInfo {
    /// Role of the node.
    pub role: ReplicationRole,
    /// Host this node replicates from (replicas only).
    pub master_host: Option<String>,
    /// Port this node replicates from (replicas only).
    pub master_port: Option<u16>,
}

impl ReplicationInfo {
    /// Parse from INFO REPLICATION output string.
    pub fn parse(info: &str) -> Result<Self, ParseError> {
        let parsed = parse_info_output(info)?;

        let role = match parsed.get("role").map(String::as_str) {
            Some("master") => ReplicationRole::Master,
            Some("slave") | Some("replica") => ReplicationRole::Slave,
            Some(other) => return Err(ParseError::Parse(format!("unknown role: {other}"))),
            None => return Err(ParseError::MissingField("role".to_string())),
        };

        Ok(ReplicationInfo {
            role,
            master_host: parsed.get("master_host").cloned(),
            master_port: parsed.get("master_port").and_then(|v| v.parse().ok()),
        })
    }

    /// Whether this node replicates from `master_ip`.
    pub fn replicates_from(&self, master_ip: &str) -> bool {
        self.role == ReplicationRole::Slave && self.master_host.as_deref() == Some(master_ip)
    }
}

/// One monitored master as reported by `INFO sentinel`.
///
/// Sentinel reports each master on a `masterN:` line:
/// `master0:name=mymaster,status=ok,address=10.0.0.1:6379,slaves=2,sentinels=3`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelMasterInfo {
    pub name: String,
    pub status: String,
    /// IP of the monitored master.
    pub ip: String,
    pub port: u16,
    /// Replicas this sentinel currently believes in.
    pub slaves: u32,
    /// Sentinels this sentinel knows about, itself included.
    pub sentinels: u32,
}

/// Parse every `masterN:` line from `INFO sentinel` output.
pub fn parse_sentinel_masters(info: &str) -> Result<Vec<SentinelMasterInfo>, ParseError> {
    let parsed = parse_info_output(info)?;

    let mut keys: Vec<&String> = parsed
        .keys()
        .filter(|k| {
            k.strip_prefix("master")
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
        .collect();
    keys.sort();

    keys.into_iter()
        .filter_map(|k| parsed.get(k))
        .map(|line| parse_sentinel_master_line(line.as_str()))
        .collect()
}

/// Parse the value part of a `masterN:` line.
pub fn parse_sentinel_master_line(line: &str) -> Result<SentinelMasterInfo, ParseError> {
    let fields: HashMap<&str, &str> = line
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .collect();

    let field = |name: &str| -> Result<&str, ParseError> {
        fields
            .get(name)
            .copied()
            .ok_or_else(|| ParseError::MissingField(name.to_string()))
    };
    let number = |name: &str| -> Result<u32, ParseError> {
        field(name)?
            .parse()
            .map_err(|_| ParseError::Parse(format!("invalid {name} in '{line}'")))
    };

    let address = field("address")?;
    let (ip, port) = address
        .rsplit_once(':')
        .ok_or_else(|| ParseError::Parse(format!("invalid address '{address}'")))?;
    let port = port
        .parse()
        .map_err(|_| ParseError::Parse(format!("invalid port in '{address}'")))?;

    Ok(SentinelMasterInfo {
        name: field("name")?.to_string(),
        status: field("status")?.to_string(),
        ip: ip.to_string(),
        port,
        slaves: number("slaves")?,
        sentinels: number("sentinels")?,
    })
}
