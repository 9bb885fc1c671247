/// Descriptive fields captured from the request that authenticated a device.
///
/// Only coarse browser/OS families are extracted; the raw user agent is not kept.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDetails {
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub ip: Option<String>,
}

// Order matters: Edge and Opera also advertise Chrome, Chrome advertises Safari.
const BROWSERS: &[(&str, &str)] = &[
    ("Edg/", "Edge"),
    ("OPR/", "Opera"),
    ("Firefox/", "Firefox"),
    ("Chrome/", "Chrome"),
    ("Version/", "Safari"),
];

const OPERATING_SYSTEMS: &[(&str, &str)] = &[
    ("Windows", "Windows"),
    ("Android", "Android"),
    ("iPhone", "iOS"),
    ("iPad", "iOS"),
    ("Mac OS X", "macOS"),
    ("CrOS", "Chrome OS"),
    ("Linux", "Linux"),
];

impl RequestDetails {
    pub fn from_parts(user_agent: Option<&str>, ip: Option<&str>) -> Self {
        let mut details = user_agent.map(Self::parse_user_agent).unwrap_or_default();
        details.ip = ip.filter(|ip| !ip.is_empty()).map(strip_port);
        details
    }

    fn parse_user_agent(user_agent: &str) -> Self {
        let (browser, browser_version) = BROWSERS
            .iter()
            .find_map(|(marker, name)| {
                user_agent.find(marker).map(|pos| {
                    let version = user_agent[pos + marker.len()..]
                        .split(|c: char| c.is_whitespace() || c == ';' || c == ')')
                        .next()
                        .filter(|v| !v.is_empty())
                        .map(str::to_string);
                    (Some(name.to_string()), version)
                })
            })
            .unwrap_or((None, None));

        let os = OPERATING_SYSTEMS
            .iter()
            .find(|(marker, _)| user_agent.contains(marker))
            .map(|(_, name)| name.to_string());

        Self {
            browser,
            browser_version,
            os,
            ip: None,
        }
    }

    /// Display label such as "Firefox 121 on Linux"
    pub fn device_name(&self) -> Option<String> {
        let browser = self.browser.as_ref().filter(|name| !name.is_empty()).map(|name| {
            match self
                .browser_version
                .as_deref()
                .and_then(|version| version.split('.').next())
                .filter(|major| !major.is_empty())
            {
                Some(major) => format!("{} {}", name, major),
                None => name.clone(),
            }
        });

        match (browser, self.os.as_deref().filter(|os| !os.is_empty())) {
            (Some(browser), Some(os)) => Some(format!("{} on {}", browser, os)),
            (Some(browser), None) => Some(browser),
            (None, Some(os)) => Some(os.to_string()),
            (None, None) => None,
        }
    }
}

fn strip_port(address: &str) -> String {
    // "[::1]:8080" -> "::1"
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest).to_string();
    }
    // "1.2.3.4:5678" -> "1.2.3.4"; bare IPv6 addresses contain several colons
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            host.to_string()
        }
        _ => address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const EDGE: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.61";

    #[test]
    fn parses_common_browsers() {
        let chrome = RequestDetails::from_parts(Some(CHROME_WINDOWS), None);
        assert_eq!(chrome.browser.as_deref(), Some("Chrome"));
        assert_eq!(chrome.browser_version.as_deref(), Some("120.0.0.0"));
        assert_eq!(chrome.os.as_deref(), Some("Windows"));

        let firefox = RequestDetails::from_parts(Some(FIREFOX_LINUX), None);
        assert_eq!(firefox.browser.as_deref(), Some("Firefox"));
        assert_eq!(firefox.os.as_deref(), Some("Linux"));

        let safari = RequestDetails::from_parts(Some(SAFARI_IPHONE), None);
        assert_eq!(safari.browser.as_deref(), Some("Safari"));
        assert_eq!(safari.os.as_deref(), Some("iOS"));

        let edge = RequestDetails::from_parts(Some(EDGE), None);
        assert_eq!(edge.browser.as_deref(), Some("Edge"));
    }

    #[test]
    fn unknown_agent_yields_empty_details() {
        let details = RequestDetails::from_parts(Some("curl/8.4.0"), None);
        assert_eq!(details, RequestDetails::default());
        assert_eq!(details.device_name(), None);
    }

    #[test]
    fn device_name_uses_major_version_and_os() {
        let firefox = RequestDetails::from_parts(Some(FIREFOX_LINUX), None);
        assert_eq!(firefox.device_name().as_deref(), Some("Firefox 121 on Linux"));

        let safari = RequestDetails::from_parts(Some(SAFARI_IPHONE), None);
        assert_eq!(safari.device_name().as_deref(), Some("Safari 17 on iOS"));

        let os_only = RequestDetails {
            os: Some("Linux".to_string()),
            ..RequestDetails::default()
        };
        assert_eq!(os_only.device_name().as_deref(), Some("Linux"));
    }

    #[test]
    fn ip_port_is_stripped() {
        let v4 = RequestDetails::from_parts(None, Some("203.0.113.7:51234"));
        assert_eq!(v4.ip.as_deref(), Some("203.0.113.7"));

        let v6 = RequestDetails::from_parts(None, Some("2001:db8::1"));
        assert_eq!(v6.ip.as_deref(), Some("2001:db8::1"));
    }
}
