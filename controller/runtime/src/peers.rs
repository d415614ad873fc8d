use std::{collections::BTreeMap, path::PathBuf, time::Duration};
use tracing::warn;

const ENV_PREFIX: &str = "TOOC_CHILDREN_";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A downstream controller whose configuration is merged into ours.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    /// Namespace tag applied to the peer's configuration. Never empty.
    pub name: String,
    pub url: String,
    pub timeout: Duration,
    pub root_ca_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct PeerEnv {
    name: Option<String>,
    url: Option<String>,
    timeout: Option<String>,
    root_ca_file: Option<String>,
}

// === impl Peer ===

impl Peer {
    /// Builds a peer, deriving its name from the URL host when none is given.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
        root_ca_file: Option<PathBuf>,
    ) -> Self {
        let url = url.into();
        let mut name = name.into().trim().to_string();
        if name.is_empty() {
            name = tag_from_url(&url);
        }
        Self {
            name,
            url,
            timeout,
            root_ca_file,
        }
    }

    /// Reads peers from `TOOC_CHILDREN_{i}_{NAME,URL,TIMEOUT,ROOTCAFILE}`
    /// variables, in index order. Entries without a URL are dropped.
    pub fn from_env(vars: impl IntoIterator<Item = (String, String)>) -> Vec<Self> {
        let mut entries = BTreeMap::<usize, PeerEnv>::new();
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let Some((index, field)) = rest.split_once('_') else {
                continue;
            };
            let Ok(index) = index.parse::<usize>() else {
                continue;
            };
            let entry = entries.entry(index).or_default();
            match field {
                "NAME" => entry.name = Some(value),
                "URL" => entry.url = Some(value),
                "TIMEOUT" => entry.timeout = Some(value),
                "ROOTCAFILE" => entry.root_ca_file = Some(value),
                _ => {}
            }
        }

        entries
            .into_iter()
            .filter_map(|(index, env)| {
                let url = match env.url.as_deref().map(str::trim) {
                    Some(url) if !url.is_empty() => url.to_string(),
                    _ => {
                        warn!(index, "Ignoring child controller without a URL");
                        return None;
                    }
                };
                let timeout = match env.timeout.as_deref().map(str::trim) {
                    None | Some("") => DEFAULT_TIMEOUT,
                    Some(secs) => match secs.parse::<u64>() {
                        Ok(secs) if secs > 0 => Duration::from_secs(secs),
                        _ => {
                            warn!(index, timeout = %secs, "Invalid child controller timeout");
                            DEFAULT_TIMEOUT
                        }
                    },
                };
                let root_ca_file = env
                    .root_ca_file
                    .filter(|p| !p.trim().is_empty())
                    .map(PathBuf::from);
                Some(Peer::new(
                    env.name.unwrap_or_default(),
                    url,
                    timeout,
                    root_ca_file,
                ))
            })
            .collect()
    }
}

fn tag_from_url(url: &str) -> String {
    let authority = match url.parse::<http::Uri>() {
        Ok(uri) => match (uri.host(), uri.port_u16()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => url.to_string(),
        },
        Err(_) => url.to_string(),
    };
    authority
        .trim_matches(|c| c == '[' || c == ']')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_indexed_env() {
        let peers = Peer::from_env(vars(&[
            ("TOOC_CHILDREN_1_URL", "https://west.example.com/"),
            ("TOOC_CHILDREN_1_NAME", "west"),
            ("TOOC_CHILDREN_0_NAME", "east"),
            ("TOOC_CHILDREN_0_URL", "https://east.example.com:8443/"),
            ("TOOC_CHILDREN_0_TIMEOUT", "3"),
            ("TOOC_CHILDREN_0_ROOTCAFILE", "/etc/ca/east.crt"),
            ("TOOC_LOG", "debug"),
        ]));

        assert_eq!(
            peers,
            vec![
                Peer {
                    name: "east".to_string(),
                    url: "https://east.example.com:8443/".to_string(),
                    timeout: Duration::from_secs(3),
                    root_ca_file: Some(PathBuf::from("/etc/ca/east.crt")),
                },
                Peer {
                    name: "west".to_string(),
                    url: "https://west.example.com/".to_string(),
                    timeout: DEFAULT_TIMEOUT,
                    root_ca_file: None,
                },
            ]
        );
    }

    #[test]
    fn drops_entries_without_url() {
        let peers = Peer::from_env(vars(&[
            ("TOOC_CHILDREN_0_NAME", "east"),
            ("TOOC_CHILDREN_1_URL", " "),
            ("TOOC_CHILDREN_2_URL", "https://c.example.com/"),
            ("TOOC_CHILDREN_X_URL", "https://ignored.example.com/"),
        ]));
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].url, "https://c.example.com/");
    }

    #[test]
    fn invalid_timeout_uses_default() {
        let peers = Peer::from_env(vars(&[
            ("TOOC_CHILDREN_0_URL", "https://a.example.com/"),
            ("TOOC_CHILDREN_0_TIMEOUT", "soon"),
        ]));
        assert_eq!(peers[0].timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn derives_name_from_url() {
        let peer = Peer::new("", "https://west.example.com:8443/config", DEFAULT_TIMEOUT, None);
        assert_eq!(peer.name, "west-example-com-8443");

        let peer = Peer::new("  ", "http://10.1.2.3/", DEFAULT_TIMEOUT, None);
        assert_eq!(peer.name, "10-1-2-3");

        let peer = Peer::new("east", "http://10.1.2.3/", DEFAULT_TIMEOUT, None);
        assert_eq!(peer.name, "east");
    }
}
