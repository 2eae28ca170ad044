//! Proxy URI decoding into canonical records
//!
//! Decoding is total: any malformed input yields `None`, never an error. The
//! caller simply drops tokens that do not decode.

use crate::collector::encoding::{b64_decode_standard, b64_decode_tolerant};
use crate::collector::models::{Protocol, ProtocolOptions, ProtocolTag, ProxyRecord};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

/// Parses raw proxy URIs into [`ProxyRecord`]s
pub struct LinkParser;

impl LinkParser {
    /// Decode a single raw URI.
    ///
    /// Returns `None` for anything that is not a well-formed token of a
    /// supported dialect: bad base64, bad JSON, missing authority, bad port,
    /// empty identifier. The tag records which extractor bucket produced the
    /// token and only influences labeling.
    pub fn parse(uri: &str, tag: ProtocolTag) -> Option<ProxyRecord> {
        let uri = uri.trim();
        if uri.len() < 10 || uri.contains("...") {
            return None;
        }

        let mut record = if let Some(body) = uri.strip_prefix("vmess://") {
            Self::parse_vmess(body)
        } else if uri.starts_with("vless://") {
            Self::parse_vless(uri)
        } else if let Some(body) = uri.strip_prefix("ss://") {
            Self::parse_shadowsocks(body)
        } else if uri.starts_with("hy2://") || uri.starts_with("hysteria2://") {
            Self::parse_hysteria2(uri)
        } else {
            None
        }?;

        record.source_tag = tag;
        Self::validated(record)
    }

    /// Identity fields must be present: non-empty host and identifier, port
    /// in 1-65535
    fn validated(record: ProxyRecord) -> Option<ProxyRecord> {
        if record.host.is_empty() || record.port == 0 || record.identifier.is_empty() {
            return None;
        }
        Some(record)
    }

    fn parse_vmess(body: &str) -> Option<ProxyRecord> {
        let json_text = b64_decode_standard(body)?;
        let value: Value = serde_json::from_str(&json_text).ok()?;
        let obj = value.as_object()?;

        // ps, add, id, port and net are required; the rest defaults.
        let remarks = obj.get("ps")?.as_str()?.trim().to_string();
        let host = obj.get("add")?.as_str()?.trim().to_string();
        let identifier = obj.get("id")?.as_str()?.trim().to_string();
        let port = json_port(obj.get("port")?)?;
        let network = obj.get("net")?.as_str()?.trim().to_string();

        let version = match obj.get("v") {
            None => "2".to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => "2".to_string(),
        };
        let alter_id = match obj.get("aid") {
            None => 0,
            Some(v) => json_u32(v)?,
        };
        let cipher = json_str_or(obj, "scy", "auto")?;
        let header_type = json_str_or(obj, "type", "none")?;
        let tls = json_str_or(obj, "tls", "")?;
        let security = if tls.is_empty() { "none".to_string() } else { tls };

        Some(ProxyRecord {
            protocol: Protocol::Vmess,
            host,
            port,
            identifier,
            remarks,
            network,
            security,
            path: opt_json_str(obj, "path"),
            sni: opt_json_str(obj, "sni"),
            fingerprint: None,
            options: ProtocolOptions::Vmess {
                version,
                alter_id,
                cipher,
                header_type,
            },
            source_tag: ProtocolTag::Vmess,
            resolved_ip: None,
            country: "XX".to_string(),
            asn_org: None,
            ping_ms: None,
        })
    }

    fn parse_vless(uri: &str) -> Option<ProxyRecord> {
        let url = Url::parse(uri).ok()?;
        let host = host_of(&url)?;
        let port = url.port()?;
        let identifier = url.username().to_string();
        let params = query_map(&url);

        let remarks = match url.fragment() {
            Some(fragment) if !fragment.is_empty() => percent_decode(fragment),
            _ => format!("{host}:{port}"),
        };

        Some(ProxyRecord {
            protocol: Protocol::Vless,
            host,
            port,
            identifier,
            remarks,
            network: params.get("type").cloned().unwrap_or_else(|| "tcp".to_string()),
            security: params
                .get("security")
                .cloned()
                .unwrap_or_else(|| "none".to_string()),
            path: params.get("path").map(|p| percent_decode(p)),
            sni: params.get("sni").cloned(),
            fingerprint: params.get("fp").cloned(),
            options: ProtocolOptions::Vless {
                flow: params.get("flow").cloned(),
                public_key: params.get("pbk").cloned(),
                short_id: params.get("sid").cloned(),
                host_header: params.get("host").cloned(),
                mode: params.get("mode").cloned(),
            },
            source_tag: ProtocolTag::Vless,
            resolved_ip: None,
            country: "XX".to_string(),
            asn_org: None,
            ping_ms: None,
        })
    }

    fn parse_shadowsocks(body: &str) -> Option<ProxyRecord> {
        let (main, remarks_part) = match body.split_once('#') {
            Some((main, rest)) => (main, rest),
            None => (body, ""),
        };
        let (user_info, host_port) = main.split_once('@')?;
        let decoded = b64_decode_tolerant(user_info)?;
        let (method, password) = decoded.split_once(':')?;
        let (host, port_str) = host_port.rsplit_once(':')?;
        let host = host
            .trim_matches(|c| c == '[' || c == ']')
            .to_string();
        let port: u16 = port_str.parse().ok()?;

        Some(ProxyRecord {
            protocol: Protocol::Shadowsocks,
            host,
            port,
            identifier: password.to_string(),
            remarks: percent_decode(remarks_part),
            network: "tcp".to_string(),
            security: "none".to_string(),
            path: None,
            sni: None,
            fingerprint: None,
            options: ProtocolOptions::Shadowsocks {
                method: method.to_string(),
            },
            source_tag: ProtocolTag::Shadowsocks,
            resolved_ip: None,
            country: "XX".to_string(),
            asn_org: None,
            ping_ms: None,
        })
    }

    fn parse_hysteria2(uri: &str) -> Option<ProxyRecord> {
        // hy2:// is an alias prefix for hysteria2://
        let normalized = match uri.strip_prefix("hy2://") {
            Some(rest) => format!("hysteria2://{rest}"),
            None => uri.to_string(),
        };
        let url = Url::parse(&normalized).ok()?;
        let host = host_of(&url)?;
        let port = url.port()?;
        let identifier = url.username().to_string();
        let params = query_map(&url);

        let insecure = match params.get("insecure") {
            None => 0,
            Some(raw) => raw.trim().parse::<u32>().ok()?,
        };

        Some(ProxyRecord {
            protocol: Protocol::Hysteria2,
            host,
            port,
            identifier,
            remarks: percent_decode(url.fragment().unwrap_or_default()),
            network: "tcp".to_string(),
            security: "none".to_string(),
            path: None,
            sni: params.get("sni").cloned(),
            fingerprint: None,
            options: ProtocolOptions::Hysteria2 {
                insecure,
                obfs: params.get("obfs").cloned(),
                obfs_password: params.get("obfs-password").cloned(),
            },
            source_tag: ProtocolTag::Hysteria2,
            resolved_ip: None,
            country: "XX".to_string(),
            asn_org: None,
            ping_ms: None,
        })
    }
}

/// Host without IPv6 brackets
fn host_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(host.trim_matches(|c| c == '[' || c == ']').to_string())
}

/// First occurrence wins and empty values count as absent, matching common
/// query-string semantics
fn query_map(url: &Url) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (k, v) in url.query_pairs() {
        if v.is_empty() {
            continue;
        }
        params.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
    params
}

fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Accept a JSON number or numeric string as a port in 1-65535
fn json_port(value: &Value) -> Option<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    if (1..=65535).contains(&port) {
        Some(port as u16)
    } else {
        None
    }
}

/// Accept a JSON number or numeric string
fn json_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => u32::try_from(n.as_u64()?).ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String field with a default when absent; present non-strings fail
fn json_str_or(obj: &serde_json::Map<String, Value>, key: &str, default: &str) -> Option<String> {
    match obj.get(key) {
        None => Some(default.to_string()),
        Some(v) => Some(v.as_str()?.trim().to_string()),
    }
}

/// Optional string field, empty collapsed to absent
fn opt_json_str(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
