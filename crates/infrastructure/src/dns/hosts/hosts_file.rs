//! `/etc/hosts` style static name table with modification-time reloads.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Parsed name and address tables.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostsMap {
    v4: HashMap<String, Vec<Ipv4Addr>>,
    v6: HashMap<String, Vec<Ipv6Addr>>,
    names: HashMap<IpAddr, Vec<String>>,
    entries: Vec<(IpAddr, String)>,
}

impl HostsMap {
    /// Lines whose first field is not an IP address are ignored, as is
    /// anything after `#`.
    pub fn parse(text: &str) -> Self {
        let mut map = Self::default();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let Some(addr) = fields.next().and_then(parse_addr) else {
                continue;
            };
            for name in fields {
                map.insert(addr, &fqdn(name));
            }
        }
        map
    }

    fn insert(&mut self, addr: IpAddr, name: &str) {
        let names = self.names.entry(addr).or_default();
        if names.iter().any(|n| n == name) {
            return;
        }
        names.push(name.to_string());
        self.entries.push((addr, name.to_string()));
        match addr {
            IpAddr::V4(v4) => push_unique(self.v4.entry(name.to_string()).or_default(), v4),
            IpAddr::V6(v6) => push_unique(self.v6.entry(name.to_string()).or_default(), v6),
        }
    }

    /// Adds every entry of `other` after the entries already present.
    fn extend(&mut self, other: &HostsMap) {
        for (addr, name) in &other.entries {
            self.insert(*addr, name);
        }
    }

    pub fn lookup_v4(&self, name: &str) -> &[Ipv4Addr] {
        self.v4.get(&fqdn(name)).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn lookup_v6(&self, name: &str) -> &[Ipv6Addr] {
        self.v6.get(&fqdn(name)).map(Vec::as_slice).unwrap_or_default()
    }

    /// Names for `addr`, in file order.
    pub fn lookup_addr(&self, addr: IpAddr) -> &[String] {
        self.names
            .get(&normalize_addr(addr))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        let name = fqdn(name);
        self.v4.contains_key(&name) || self.v6.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, value: T) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn parse_addr(field: &str) -> Option<IpAddr> {
    // Zone indices (fe80::1%eth0) are not usable in answers.
    let field = field.split('%').next()?;
    field.parse::<IpAddr>().ok().map(normalize_addr)
}

fn normalize_addr(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

fn fqdn(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with('.') {
        lower
    } else {
        format!("{}.", lower)
    }
}

/// Parses a reverse lookup name (`in-addr.arpa.` or `ip6.arpa.`).
pub fn reverse_name_to_addr(name: &str) -> Option<IpAddr> {
    let name = fqdn(name);
    if let Some(labels) = name.strip_suffix(".in-addr.arpa.") {
        let mut octets: Vec<u8> = labels
            .split('.')
            .map(|l| l.parse::<u8>().ok())
            .collect::<Option<_>>()?;
        if octets.len() != 4 {
            return None;
        }
        octets.reverse();
        return Some(IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3])));
    }
    if let Some(labels) = name.strip_suffix(".ip6.arpa.") {
        let nibbles: Vec<u8> = labels
            .split('.')
            .map(|l| match l.len() {
                1 => u8::from_str_radix(l, 16).ok(),
                _ => None,
            })
            .collect::<Option<_>>()?;
        if nibbles.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, pair) in nibbles.rchunks(2).enumerate() {
            bytes[i] = (pair[1] << 4) | pair[0];
        }
        return Some(normalize_addr(IpAddr::V6(Ipv6Addr::from(bytes))));
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

/// Hosts table built from inline entries plus an optional file.
///
/// Inline entries come first in every lookup. The file part is swapped
/// atomically on reload, so readers never see a partial table.
pub struct HostsFile {
    path: Option<PathBuf>,
    inline: HostsMap,
    current: ArcSwap<HostsMap>,
    stamp: Mutex<Option<FileStamp>>,
}

impl HostsFile {
    pub fn new(path: Option<PathBuf>, inline: &[String]) -> Self {
        let inline = HostsMap::parse(&inline.join("\n"));
        let hosts = Self {
            path,
            current: ArcSwap::from_pointee(inline.clone()),
            inline,
            stamp: Mutex::new(None),
        };

        if let Some(path) = &hosts.path {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    hosts.install(&text, stamp_of(std::fs::metadata(path).ok()));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to read hosts file"),
            }
        }
        hosts
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            path: None,
            inline: HostsMap::default(),
            current: ArcSwap::from_pointee(HostsMap::parse(text)),
            stamp: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> Arc<HostsMap> {
        self.current.load_full()
    }

    fn install(&self, text: &str, stamp: Option<FileStamp>) -> usize {
        let mut map = self.inline.clone();
        map.extend(&HostsMap::parse(text));
        let entries = map.len();
        self.current.store(Arc::new(map));
        *self.stamp.lock().unwrap_or_else(|p| p.into_inner()) = stamp;
        entries
    }

    /// Re-reads the file when its modification time or size changed.
    /// Returns true when a new table was installed.
    pub async fn reload_if_changed(&self) -> bool {
        let Some(path) = &self.path else {
            return false;
        };

        let stamp = stamp_of(tokio::fs::metadata(path).await.ok());
        let previous = *self.stamp.lock().unwrap_or_else(|p| p.into_inner());
        if stamp.is_some() && stamp == previous {
            return false;
        }

        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let entries = self.install(&text, stamp);
                info!(path = %path.display(), entries, "Hosts file reloaded");
                true
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Hosts file not readable");
                false
            }
        }
    }

    pub fn spawn_reloader(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if self.path.is_none() || interval.is_zero() {
            return None;
        }
        let hosts = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                hosts.reload_if_changed().await;
            }
        }))
    }
}

fn stamp_of(metadata: Option<std::fs::Metadata>) -> Option<FileStamp> {
    let metadata = metadata?;
    Some(FileStamp {
        modified: metadata.modified().ok()?,
        len: metadata.len(),
    })
}
