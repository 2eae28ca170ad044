//! Downstream output encoding
//!
//! Builds the base64 subscription body (decorative header entries followed by
//! every record's URI) and the Clash / sing-box client documents.

use crate::collector::encoding::b64_encode_urlsafe_nopad;
use crate::collector::models::{ProtocolOptions, ProxyRecord};
use chrono::{DateTime, FixedOffset, Utc};
use once_cell::sync::Lazy;
use serde_json::json;
use uuid::Uuid;

/// Reports and headers are stamped in the audience's local time (UTC+3:30)
static LOCAL_OFFSET: Lazy<FixedOffset> =
    Lazy::new(|| FixedOffset::east_opt(3 * 3600 + 30 * 60).expect("valid offset"));

pub fn tehran_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&*LOCAL_OFFSET)
}

/// A syntactically valid VLess entry pointing at a loopback placeholder,
/// carrying only a display label
fn header_entry(label: &str) -> String {
    format!(
        "vless://{}@127.0.0.1:1080?security=tls&type=tcp&encryption=none#{label}",
        Uuid::new_v4()
    )
}

/// Base64 subscription body: a dated header entry, one entry per configured
/// signature, then every record's re-encoded URI, newline-joined
pub fn subscription_content(records: &[ProxyRecord], signatures: &[String]) -> String {
    let stamp = tehran_now().format("%Y/%m/%d %H:%M");
    let mut lines = vec![header_entry(&format!("📅 Update: {stamp}"))];
    lines.extend(signatures.iter().map(|signature| header_entry(signature)));
    lines.extend(records.iter().map(ProxyRecord::to_uri));
    b64_encode_urlsafe_nopad(&lines.join("\n"))
}

/// Plain newline-joined URI list
pub fn raw_uri_list(records: &[ProxyRecord]) -> String {
    records
        .iter()
        .map(ProxyRecord::to_uri)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Clash proxy list (VMess and VLess only, as the downstream client expects)
pub fn to_clash_yaml(records: &[ProxyRecord]) -> String {
    let mut proxies = String::new();
    for record in records {
        match &record.options {
            ProtocolOptions::Vmess { alter_id, .. } => {
                proxies.push_str(&format!(
                    "  - name: \"{}\"\n    type: vmess\n    server: {}\n    port: {}\n    uuid: {}\n    alterId: {}\n    cipher: auto\n    tls: {}\n    skip-cert-verify: true\n    network: {}\n    servername: {}\n    ws-opts:\n      path: {}\n",
                    record.remarks,
                    record.host,
                    record.port,
                    record.identifier,
                    alter_id,
                    record.security == "tls",
                    record.network,
                    record.sni.as_deref().unwrap_or(""),
                    record.path.as_deref().unwrap_or("/"),
                ));
            }
            ProtocolOptions::Vless { .. } => {
                proxies.push_str(&format!(
                    "  - name: \"{}\"\n    type: vless\n    server: {}\n    port: {}\n    uuid: {}\n    tls: {}\n    network: {}\n    servername: {}\n    client-fingerprint: {}\n    skip-cert-verify: true\n    ws-opts:\n      path: {}\n",
                    record.remarks,
                    record.host,
                    record.port,
                    record.identifier,
                    record.security == "tls",
                    record.network,
                    record.sni.as_deref().unwrap_or(""),
                    record.fingerprint.as_deref().unwrap_or("chrome"),
                    record.path.as_deref().unwrap_or("/"),
                ));
            }
            _ => {}
        }
    }
    format!("proxies:\n{proxies}")
}

/// Sing-box outbound list (VMess and VLess only)
pub fn to_singbox_json(records: &[ProxyRecord]) -> String {
    let mut outbounds = Vec::new();
    for record in records {
        let mut base = json!({
            "tag": record.remarks,
            "server": record.host,
            "server_port": record.port,
            "tls": {
                "enabled": record.security == "tls" || record.security == "reality",
                "insecure": true,
                "server_name": record.sni.clone().unwrap_or_else(|| record.host.clone()),
            },
            "transport": {},
        });

        if record.network == "ws" {
            base["transport"] = json!({
                "type": "ws",
                "path": record.path.clone().unwrap_or_else(|| "/".to_string()),
            });
        }

        match &record.options {
            ProtocolOptions::Vmess { alter_id, .. } => {
                base["type"] = json!("vmess");
                base["uuid"] = json!(record.identifier);
                base["security"] = json!("auto");
                base["alter_id"] = json!(alter_id);
                outbounds.push(base);
            }
            ProtocolOptions::Vless { flow, .. } => {
                base["type"] = json!("vless");
                base["uuid"] = json!(record.identifier);
                if let Some(flow) = flow {
                    base["flow"] = json!(flow);
                }
                outbounds.push(base);
            }
            _ => {}
        }
    }
    serde_json::to_string_pretty(&json!({ "outbounds": outbounds }))
        .unwrap_or_else(|_| "{}".to_string())
}
