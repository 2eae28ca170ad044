//! Canonical proxy config models
//!
//! Every supported URI dialect is normalized into [`ProxyRecord`]. The
//! protocol-specific leftovers live in a tagged [`ProtocolOptions`] payload so
//! encoders and converters switch on the discriminant instead of downcasting.

use crate::collector::encoding::b64_encode_standard_nopad;
use serde::Serialize;
use std::fmt;

/// Proxy protocol variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Vmess,
    Vless,
    Shadowsocks,
    Hysteria2,
}

impl Protocol {
    /// Lowercase protocol name, used for stats keys and output file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Hysteria2 => "hysteria2",
        }
    }

    /// Uppercase label used in formatted remarks
    pub fn label(&self) -> &'static str {
        match self {
            Protocol::Vmess => "VMESS",
            Protocol::Vless => "VLESS",
            Protocol::Shadowsocks => "SHADOWSOCKS",
            Protocol::Hysteria2 => "HYSTERIA2",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extractor bucket a raw token was matched under.
///
/// Reality is a VLess sub-variant with its own bucket; it only affects the
/// security label of the formatted remarks, not the record identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolTag {
    Shadowsocks,
    Vmess,
    Vless,
    Reality,
    Hysteria2,
}

impl ProtocolTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolTag::Shadowsocks => "ss",
            ProtocolTag::Vmess => "vmess",
            ProtocolTag::Vless => "vless",
            ProtocolTag::Reality => "reality",
            ProtocolTag::Hysteria2 => "hysteria2",
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Protocol-specific fields, tagged by the same discriminant as
/// [`ProxyRecord::protocol`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOptions {
    Vmess {
        version: String,
        alter_id: u32,
        cipher: String,
        header_type: String,
    },
    Vless {
        flow: Option<String>,
        public_key: Option<String>,
        short_id: Option<String>,
        host_header: Option<String>,
        mode: Option<String>,
    },
    Shadowsocks {
        method: String,
    },
    Hysteria2 {
        insecure: u32,
        obfs: Option<String>,
        obfs_password: Option<String>,
    },
}

/// Identity four-tuple deciding record uniqueness
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub identifier: String,
}

/// Canonical record for one proxy endpoint description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRecord {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// UUID or password, depending on the protocol; never empty
    pub identifier: String,
    /// Display label; rewritten by the formatting stage before output
    pub remarks: String,
    pub network: String,
    pub security: String,
    pub path: Option<String>,
    pub sni: Option<String>,
    pub fingerprint: Option<String>,
    pub options: ProtocolOptions,
    /// Which extractor bucket produced the raw token
    pub source_tag: ProtocolTag,
    // Enrichment fields, not part of identity and never re-encoded.
    pub resolved_ip: Option<String>,
    pub country: String,
    pub asn_org: Option<String>,
    pub ping_ms: Option<u64>,
}

impl ProxyRecord {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            protocol: self.protocol,
            host: self.host.clone(),
            port: self.port,
            identifier: self.identifier.clone(),
        }
    }

    /// Security label used in formatted remarks
    pub fn security_label(&self) -> String {
        if self.source_tag == ProtocolTag::Reality || self.security == "reality" {
            "RLT".to_string()
        } else if self.security == "tls" {
            "TLS".to_string()
        } else if self.security == "xtls" {
            "XTLS".to_string()
        } else if self.security.is_empty() || self.security == "none" {
            "NTLS".to_string()
        } else {
            self.security.to_uppercase()
        }
    }

    /// Re-encode the record into its wire URI
    pub fn to_uri(&self) -> String {
        match &self.options {
            ProtocolOptions::Vmess {
                version,
                alter_id,
                cipher,
                header_type,
            } => self.vmess_uri(version, *alter_id, cipher, header_type),
            ProtocolOptions::Vless {
                flow,
                public_key,
                short_id,
                host_header,
                mode,
            } => self.vless_uri(flow, public_key, short_id, host_header, mode),
            ProtocolOptions::Shadowsocks { method } => self.shadowsocks_uri(method),
            ProtocolOptions::Hysteria2 {
                insecure,
                obfs,
                obfs_password,
            } => self.hysteria2_uri(*insecure, obfs, obfs_password),
        }
    }

    fn vmess_uri(&self, version: &str, alter_id: u32, cipher: &str, header_type: &str) -> String {
        // Field order matters for bit-compatible output; empty optionals are
        // omitted and the ws host header is taken from the SNI.
        #[derive(Serialize)]
        struct VmessWire<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            v: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            ps: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            add: Option<&'a str>,
            port: u16,
            #[serde(skip_serializing_if = "Option::is_none")]
            id: Option<&'a str>,
            aid: u32,
            #[serde(skip_serializing_if = "Option::is_none")]
            scy: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            net: Option<&'a str>,
            #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
            header_type: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            host: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            path: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            tls: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            sni: Option<&'a str>,
        }

        fn non_empty(s: &str) -> Option<&str> {
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        }

        let tls = if self.security == "none" {
            ""
        } else {
            self.security.as_str()
        };
        let wire = VmessWire {
            v: non_empty(version),
            ps: non_empty(&self.remarks),
            add: non_empty(&self.host),
            port: self.port,
            id: non_empty(&self.identifier),
            aid: alter_id,
            scy: non_empty(cipher),
            net: non_empty(&self.network),
            header_type: non_empty(header_type),
            host: self.sni.as_deref().and_then(non_empty),
            path: self.path.as_deref().and_then(non_empty),
            tls: non_empty(tls),
            sni: self.sni.as_deref().and_then(non_empty),
        };
        let json = serde_json::to_string(&wire).unwrap_or_default();
        format!("vmess://{}", b64_encode_standard_nopad(&json))
    }

    fn vless_uri(
        &self,
        flow: &Option<String>,
        public_key: &Option<String>,
        short_id: &Option<String>,
        host_header: &Option<String>,
        mode: &Option<String>,
    ) -> String {
        let params = [
            ("type", Some(self.network.as_str())),
            ("security", Some(self.security.as_str())),
            ("path", self.path.as_deref()),
            ("sni", self.sni.as_deref()),
            ("fp", self.fingerprint.as_deref()),
            ("flow", flow.as_deref()),
            ("pbk", public_key.as_deref()),
            ("sid", short_id.as_deref()),
            ("host", host_header.as_deref()),
            ("mode", mode.as_deref()),
        ];
        let query = join_query(&params);
        format!(
            "vless://{}@{}:{}?{}#{}",
            self.identifier,
            self.uri_host(),
            self.port,
            query,
            self.remarks
        )
    }

    fn shadowsocks_uri(&self, method: &str) -> String {
        let user_info = b64_encode_standard_nopad(&format!("{}:{}", method, self.identifier));
        format!(
            "ss://{}@{}:{}#{}",
            user_info,
            self.uri_host(),
            self.port,
            self.remarks
        )
    }

    fn hysteria2_uri(
        &self,
        insecure: u32,
        obfs: &Option<String>,
        obfs_password: &Option<String>,
    ) -> String {
        let insecure = insecure.to_string();
        let params = [
            ("sni", self.sni.as_deref()),
            ("insecure", Some(insecure.as_str())),
            ("obfs", obfs.as_deref()),
            ("obfs-password", obfs_password.as_deref()),
        ];
        let query = join_query(&params);
        format!(
            "hysteria2://{}@{}:{}?{}#{}",
            self.identifier,
            self.uri_host(),
            self.port,
            query,
            self.remarks
        )
    }

    /// IPv6 hosts are stored bracketless and re-wrapped for the authority
    fn uri_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

/// Join present, non-empty query params as `k=v&k=v`
fn join_query(params: &[(&str, Option<&str>)]) -> String {
    params
        .iter()
        .filter_map(|(k, v)| match v {
            Some(v) if !v.is_empty() => Some(format!("{k}={v}")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Emoji flag for an ISO 3166-1 alpha-2 country code.
///
/// The `XX` sentinel and anything that is not two ASCII letters map to the
/// white flag.
pub fn country_flag(code: &str) -> String {
    let code = code.trim().to_ascii_uppercase();
    let valid = code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase());
    if !valid || code == "XX" {
        return "🏳️".to_string();
    }
    code.bytes()
        .filter_map(|b| char::from_u32(0x1F1E6 + (b - b'A') as u32))
        .collect()
}
