//! Exchange filters: request host, request URI and response status.

use super::message::RequestHead;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Set of status codes, written as `200`, `200-299` or `200:300-399`
/// (items separated by `:` or `,`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSet {
    ranges: Vec<RangeInclusive<u16>>,
}

impl StatusSet {
    pub fn contains(&self, code: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(&code))
    }
}

impl FromStr for StatusSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ranges = Vec::new();
        for item in s.split([':', ',']) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let range = match item.split_once('-') {
                None => {
                    let code = parse_code(item)?;
                    code..=code
                }
                Some((start, end)) => {
                    let start = parse_code(start)?;
                    let end = parse_code(end)?;
                    if start > end {
                        return Err(format!("empty status range {:?}", item));
                    }
                    start..=end
                }
            };
            ranges.push(range);
        }
        if ranges.is_empty() {
            return Err("empty status set".into());
        }
        Ok(StatusSet { ranges })
    }
}

fn parse_code(s: &str) -> Result<u16, String> {
    s.trim()
        .parse::<u16>()
        .map_err(|_| format!("invalid status code {:?}", s.trim()))
}

impl fmt::Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            if range.start() == range.end() {
                write!(f, "{}", range.start())?;
            } else {
                write!(f, "{}-{}", range.start(), range.end())?;
            }
        }
        Ok(())
    }
}

/// Glob match with `*` (any run) and `?` (any one character).
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeFilter {
    /// Without wildcards this is a suffix match on the host, so `example.com`
    /// also matches `api.example.com`.
    pub host: Option<String>,
    /// Without wildcards this is a substring match on the URI.
    pub uri: Option<String>,
    pub status: Option<StatusSet>,
}

impl ExchangeFilter {
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.uri.is_none() && self.status.is_none()
    }

    pub fn matches_request(&self, head: &RequestHead) -> bool {
        if let Some(pattern) = &self.host {
            let host = head.host().map(strip_port).unwrap_or("").to_ascii_lowercase();
            let pattern = pattern.to_ascii_lowercase();
            let ok = if has_wildcard(&pattern) {
                wildcard_match(&pattern, &host)
            } else {
                host.ends_with(&pattern)
            };
            if !ok {
                return false;
            }
        }
        if let Some(pattern) = &self.uri {
            let ok = if has_wildcard(pattern) {
                wildcard_match(pattern, &head.uri)
            } else {
                head.uri.contains(pattern.as_str())
            };
            if !ok {
                return false;
            }
        }
        true
    }

    pub fn matches_status(&self, code: u16) -> bool {
        self.status.as_ref().map_or(true, |set| set.contains(code))
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [v6]:port
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::message::read_request;
    use std::io::BufReader;

    fn request(host: &str, uri: &str) -> RequestHead {
        let raw = format!("GET {} HTTP/1.1\r\nHost: {}\r\n\r\n", uri, host);
        let mut reader = BufReader::new(raw.as_bytes());
        read_request(&mut reader).unwrap().unwrap()
    }

    #[test]
    fn status_set_parsing() {
        let set: StatusSet = "200".parse().unwrap();
        assert!(set.contains(200));
        assert!(!set.contains(201));

        let set: StatusSet = "200:300-399".parse().unwrap();
        assert!(set.contains(200));
        assert!(set.contains(302));
        assert!(set.contains(399));
        assert!(!set.contains(404));
        assert_eq!(set.to_string(), "200:300-399");

        let set: StatusSet = "200-299, 404".parse().unwrap();
        assert!(set.contains(404));

        assert!("abc".parse::<StatusSet>().is_err());
        assert!("300-200".parse::<StatusSet>().is_err());
        assert!("".parse::<StatusSet>().is_err());
        assert!("1-2-3".parse::<StatusSet>().is_err());
    }

    #[test]
    fn wildcard() {
        assert!(wildcard_match("*.example.com", "api.example.com"));
        assert!(!wildcard_match("*.example.com", "example.com"));
        assert!(wildcard_match("/api/*/items", "/api/v1/items"));
        assert!(wildcard_match("/a?c", "/abc"));
        assert!(!wildcard_match("/a?c", "/abbc"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn host_filter() {
        let filter = ExchangeFilter {
            host: Some("example.com".into()),
            ..ExchangeFilter::default()
        };
        assert!(filter.matches_request(&request("example.com", "/")));
        assert!(filter.matches_request(&request("API.example.com:8080", "/")));
        assert!(!filter.matches_request(&request("other.com", "/")));

        let filter = ExchangeFilter {
            host: Some("*.example.?om".into()),
            ..ExchangeFilter::default()
        };
        assert!(filter.matches_request(&request("www.example.com", "/")));
        assert!(!filter.matches_request(&request("example.com", "/")));
    }

    #[test]
    fn uri_filter() {
        let filter = ExchangeFilter {
            uri: Some("/login".into()),
            ..ExchangeFilter::default()
        };
        assert!(filter.matches_request(&request("h", "/user/login?next=/")));
        assert!(!filter.matches_request(&request("h", "/logout")));

        let filter = ExchangeFilter {
            uri: Some("/api/*".into()),
            ..ExchangeFilter::default()
        };
        assert!(filter.matches_request(&request("h", "/api/v2")));
        assert!(!filter.matches_request(&request("h", "/v2/api/x")));
    }

    #[test]
    fn status_filter_defaults_to_everything() {
        let filter = ExchangeFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches_status(500));

        let filter = ExchangeFilter {
            status: Some("200-299".parse().unwrap()),
            ..ExchangeFilter::default()
        };
        assert!(filter.matches_status(204));
        assert!(!filter.matches_status(404));
    }

    #[test]
    fn strips_ports() {
        assert_eq!(strip_port("a.com:80"), "a.com");
        assert_eq!(strip_port("a.com"), "a.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }
}
