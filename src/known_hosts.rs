//! OpenSSH `known_hosts` store.
//!
//! The file is read once at startup and consulted whenever a session
//! binding arrives: the bound hostname and host key are checked against the
//! recorded entries, and the outcome travels with the binding so the
//! approval prompt can tell the user whether the host is the one on record.
//!
//! Both plaintext entries (comma-separated names, `[host]:port` for
//! non-default ports) and `|1|salt|hash` hashed entries are understood.
//! Hashed names use HMAC-SHA1 keyed by the salt; SHA-1 is long deprecated
//! elsewhere but remains what OpenSSH writes.

use std::path::Path;
use std::{fs, io};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use log::debug;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Outcome of checking a host and its offered key against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostVerification {
    /// The host is on record with exactly this key.
    Verified(String),

    /// The host is on record, but with a different key.
    Mismatch(String),

    /// The host does not appear in the store.
    Unknown(String),
}

impl HostVerification {
    /// Hostname this verdict is about.
    pub fn hostname(&self) -> &str {
        match self {
            Self::Verified(hostname) | Self::Mismatch(hostname) | Self::Unknown(hostname) => {
                hostname
            }
        }
    }
}

/// How an entry names its hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    /// Comma-separated cleartext names.
    Plain(Vec<String>),

    /// `|1|salt|hash`: the name survives only as `HMAC-SHA1(salt, name)`.
    Hashed { salt: Vec<u8>, hmac: Vec<u8> },
}

impl HostPattern {
    fn matches_any(&self, names: &[String]) -> bool {
        match self {
            Self::Plain(patterns) => names.iter().any(|name| patterns.contains(name)),
            Self::Hashed { salt, hmac } => names.iter().any(|name| {
                let Ok(mut mac) = HmacSha1::new_from_slice(salt) else {
                    return false;
                };
                mac.update(name.as_bytes());
                mac.verify_slice(hmac).is_ok()
            }),
        }
    }
}

/// One `known_hosts` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownHostEntry {
    host: HostPattern,
    key_type: String,
    key_blob: Vec<u8>,
}

/// Parsed `known_hosts` file. Read-only after load.
#[derive(Debug, Clone, Default)]
pub struct KnownHosts {
    entries: Vec<KnownHostEntry>,
}

impl KnownHosts {
    /// An empty store; every lookup answers `Unknown`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load and parse a `known_hosts` file.
    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Parse `known_hosts` text. Unparseable lines are skipped, matching
    /// how OpenSSH treats files shared across versions.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(host), Some(key_type), Some(key)) =
                (fields.next(), fields.next(), fields.next())
            else {
                debug!("known_hosts: skipping malformed line {}", index + 1);
                continue;
            };

            let Ok(key_blob) = STANDARD.decode(key) else {
                debug!("known_hosts: skipping undecodable key on line {}", index + 1);
                continue;
            };

            let Some(host) = Self::parse_host_field(host) else {
                debug!("known_hosts: skipping malformed host field on line {}", index + 1);
                continue;
            };

            entries.push(KnownHostEntry {
                host,
                key_type: key_type.to_string(),
                key_blob,
            });
        }

        Self { entries }
    }

    fn parse_host_field(field: &str) -> Option<HostPattern> {
        let Some(hashed) = field.strip_prefix("|1|") else {
            return Some(HostPattern::Plain(
                field.split(',').map(str::to_string).collect(),
            ));
        };

        let (salt, hmac) = hashed.split_once('|')?;
        Some(HostPattern::Hashed {
            salt: STANDARD.decode(salt).ok()?,
            hmac: STANDARD.decode(hmac).ok()?,
        })
    }

    /// Names under which `(hostname, port)` may appear in the file.
    fn lookup_names(hostname: &str, port: u16) -> Vec<String> {
        if port == 22 {
            vec![hostname.to_string()]
        } else {
            vec![hostname.to_string(), format!("[{hostname}]:{port}")]
        }
    }

    /// Check whether `candidate` is the recorded key for `(hostname, port)`.
    pub fn verify(&self, hostname: &str, port: u16, candidate: &[u8]) -> HostVerification {
        let names = Self::lookup_names(hostname, port);
        let mut host_matched = false;

        for entry in &self.entries {
            if !entry.host.matches_any(&names) {
                continue;
            }
            if entry.key_blob == candidate {
                return HostVerification::Verified(hostname.to_string());
            }
            host_matched = true;
        }

        if host_matched {
            HostVerification::Mismatch(hostname.to_string())
        } else {
            HostVerification::Unknown(hostname.to_string())
        }
    }

    /// All cleartext names recorded for a key. Hashed entries cannot be
    /// reversed and are left out.
    pub fn hostnames_for_key(&self, key_blob: &[u8]) -> Vec<String> {
        let mut hostnames = Vec::new();

        for entry in &self.entries {
            if entry.key_blob != key_blob {
                continue;
            }
            if let HostPattern::Plain(names) = &entry.host {
                for name in names {
                    if !hostnames.contains(name) {
                        hostnames.push(name.clone());
                    }
                }
            }
        }

        hostnames
    }

    /// Number of usable entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries were loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
