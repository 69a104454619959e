use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use url::Url;

use crate::types::Target;

/// Parse a target file into an ordered list of targets.
///
/// Supported formats per line:
/// - `Name URL`: the URL is the last whitespace-separated field, the name is
///   everything before it (names may contain spaces)
/// - `URL` alone: the host is used as the name
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
///
/// URLs must use `http` or `https`. A URL seen twice keeps its first entry.
pub fn parse_targets_str(s: &str) -> Result<Vec<Target>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        let (name, raw_url) = match line.rsplit_once(char::is_whitespace) {
            Some((name, url)) => (name.trim().to_string(), url),
            None => (String::new(), line),
        };

        let url = parse_target_url(raw_url)
            .with_context(|| format!("line {line_no}: invalid URL: {raw_url}"))?;
        let name = if name.is_empty() {
            url.host_str().unwrap_or(raw_url).to_string()
        } else {
            name
        };

        if seen.insert(url.as_str().to_string()) {
            out.push(Target::new(name, raw_url));
        }
    }

    Ok(out)
}

/// Load targets from a file path. Errors if the file cannot be read, fails to
/// parse, or contains no targets.
pub fn load_targets_from_path(path: impl AsRef<Path>) -> Result<Vec<Target>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read targets file: {}", path.as_ref().display()))?;
    let targets = parse_targets_str(&content)
        .with_context(|| format!("failed to parse targets file: {}", path.as_ref().display()))?;
    if targets.is_empty() {
        bail!("targets file contains no targets: {}", path.as_ref().display());
    }
    Ok(targets)
}

/// Well-known sites probed when no target file is given.
pub fn default_targets() -> Vec<Target> {
    const DEFAULT: &[(&str, &str)] = &[
        ("Wikipedia", "https://www.wikipedia.org"),
        ("Google", "https://www.google.com"),
        ("Facebook", "https://www.facebook.com"),
        ("YouTube", "https://www.youtube.com"),
        ("Netflix", "https://www.netflix.com"),
        ("GitHub", "https://github.com"),
        ("Cloudflare", "https://www.cloudflare.com"),
        ("Akamai", "https://www.akamai.com"),
        ("Microsoft", "https://www.microsoft.com"),
        ("Apple", "https://www.apple.com"),
        ("Amazon", "https://www.amazon.com"),
        ("Reddit", "https://www.reddit.com"),
        ("Twitter/X", "https://www.x.com"),
        ("Cisco", "https://www.cisco.com"),
        ("Yahoo", "https://www.yahoo.com"),
        ("Yandex", "https://www.yandex.com"),
        ("Zoom", "https://zoom.us"),
        ("CNN", "https://www.cnn.com"),
        ("ESPN", "https://www.espn.com"),
        ("Spotify", "https://www.spotify.com"),
        ("Gitlab", "https://gitlab.com"),
        ("Codeberg", "https://codeberg.org"),
        ("Dockerhub", "https://hub.docker.com"),
    ];
    DEFAULT
        .iter()
        .map(|(name, url)| Target::new(*name, *url))
        .collect()
}

fn parse_target_url(s: &str) -> Result<Url> {
    let url = Url::parse(s)?;
    match url.scheme() {
        "http" | "https" => {}
        other => bail!("unsupported scheme: {other}"),
    }
    if url.host_str().is_none() {
        bail!("missing host");
    }
    Ok(url)
}
