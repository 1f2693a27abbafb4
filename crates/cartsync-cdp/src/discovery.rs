//! Target discovery over the HTTP `/json` listing.

use std::time::Duration;

use serde::Deserialize;

use crate::error::RemoteError;

/// One debuggable target as listed by the endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target id.
    #[serde(default)]
    pub id: String,
    /// `page`, `service_worker`, `iframe`, ...
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Current URL.
    #[serde(default)]
    pub url: String,
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Control channel URL; absent when another client already attached.
    pub web_socket_debugger_url: Option<String>,
}

impl TargetInfo {
    /// Whether this target is a regular page with an attachable channel.
    pub fn is_attachable_page(&self) -> bool {
        self.kind == "page" && self.web_socket_debugger_url.is_some()
    }
}

/// List the targets open at `endpoint`.
pub async fn discover_targets(
    http: &reqwest::Client,
    endpoint: &str,
    timeout: Duration,
) -> Result<Vec<TargetInfo>, RemoteError> {
    let url = format!("{endpoint}/json");
    let unreachable = |reason: String| RemoteError::EndpointUnreachable {
        endpoint: endpoint.to_string(),
        reason,
    };

    let resp = http
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| unreachable(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(unreachable(format!("HTTP {}", resp.status())));
    }

    let targets: Vec<TargetInfo> = resp
        .json()
        .await
        .map_err(|e| unreachable(format!("invalid target listing: {e}")))?;
    tracing::debug!(count = targets.len(), "discovered targets");
    Ok(targets)
}

/// First attachable page on `domain` (or a subdomain) whose path contains
/// `path`.
pub fn select_target<'a>(targets: &'a [TargetInfo], domain: &str, path: &str) -> Option<&'a TargetInfo> {
    targets
        .iter()
        .find(|t| t.is_attachable_page() && host_matches(&t.url, domain) && t.url.contains(path))
}

fn host_matches(url: &str, domain: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    parsed
        .host_str()
        .is_some_and(|host| host == domain || host.ends_with(&format!(".{domain}")))
}

/// First attachable page of any URL.
pub fn first_page(targets: &[TargetInfo]) -> Option<&TargetInfo> {
    targets.iter().find(|t| t.is_attachable_page())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(kind: &str, url: &str, ws: Option<&str>) -> TargetInfo {
        TargetInfo {
            id: "T".into(),
            kind: kind.into(),
            url: url.into(),
            title: String::new(),
            web_socket_debugger_url: ws.map(String::from),
        }
    }

    #[test]
    fn parses_chrome_listing() {
        let raw = r#"[{
            "description": "",
            "devtoolsFrontendUrl": "/devtools/inspector.html?ws=localhost:9222/devtools/page/AB",
            "id": "AB",
            "title": "Shopping List",
            "type": "page",
            "url": "https://www.amazon.com/alexaquantum/sp/alexaShoppingList",
            "webSocketDebuggerUrl": "ws://localhost:9222/devtools/page/AB"
        }]"#;
        let targets: Vec<TargetInfo> = serde_json::from_str(raw).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].kind, "page");
        assert_eq!(
            targets[0].web_socket_debugger_url.as_deref(),
            Some("ws://localhost:9222/devtools/page/AB")
        );
    }

    #[test]
    fn select_matches_pattern_on_pages_only() {
        let targets = vec![
            target("service_worker", "https://amazon.com/list", Some("ws://a")),
            target("page", "https://example.com/list", Some("ws://b")),
            target("page", "https://www.amazon.com/list?ref=nav", Some("ws://c")),
        ];
        let t = select_target(&targets, "amazon.com", "/list").unwrap();
        assert_eq!(t.web_socket_debugger_url.as_deref(), Some("ws://c"));
    }

    #[test]
    fn select_distinguishes_regions() {
        let targets = vec![
            target("page", "https://www.amazon.com.br/list", Some("ws://br")),
            target("page", "https://www.amazon.com/list", Some("ws://us")),
        ];
        let t = select_target(&targets, "amazon.com", "/list").unwrap();
        assert_eq!(t.web_socket_debugger_url.as_deref(), Some("ws://us"));
        assert!(select_target(&targets, "amazon.de", "/list").is_none());
    }

    #[test]
    fn select_skips_pages_without_channel() {
        let targets = vec![target("page", "https://amazon.com/list", None)];
        assert!(select_target(&targets, "amazon.com", "/list").is_none());
    }

    #[test]
    fn first_page_ignores_non_pages() {
        let targets = vec![
            target("iframe", "x", Some("ws://a")),
            target("page", "about:blank", Some("ws://b")),
        ];
        assert_eq!(first_page(&targets).unwrap().url, "about:blank");
    }
}
