//! Sandbox resolver configuration.

use crate::cri::DnsConfig;
use crate::error::{Error, Result};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, warn};

/// Renders `search`, `nameserver` and `options` lines.
pub fn render_resolv_conf(dns: &DnsConfig) -> String {
    let mut out = String::new();
    if !dns.searches.is_empty() {
        let _ = writeln!(out, "search {}", dns.searches.join(" "));
    }
    for server in &dns.servers {
        let _ = writeln!(out, "nameserver {}", server);
    }
    if !dns.options.is_empty() {
        let _ = writeln!(out, "options {}", dns.options.join(" "));
    }
    out
}

/// Writes the sandbox's `resolv.conf` to `path`.
///
/// With no settings (or only empty lists) the host file at `host` is copied.
/// A partially written file is removed before the error is returned.
pub fn write_resolv_conf(dns: Option<&DnsConfig>, host: &Path, path: &Path) -> Result<()> {
    let configured = dns.filter(|d| {
        !(d.servers.is_empty() && d.searches.is_empty() && d.options.is_empty())
    });

    let result = match configured {
        Some(dns) => std::fs::write(path, render_resolv_conf(dns)),
        None => {
            debug!("copying {} to {}", host.display(), path.display());
            std::fs::copy(host, path).map(|_| ())
        }
    };

    result.map_err(|e| {
        if path.exists()
            && let Err(rm) = std::fs::remove_file(path)
        {
            warn!("failed to remove {}: {}", path.display(), rm);
        }
        Error::Storage {
            operation: "write resolv.conf".to_string(),
            id: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}
