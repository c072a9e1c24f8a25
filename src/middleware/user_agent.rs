//! Best-effort `User-Agent` parsing into `{ua, browser, engine, os, device, cpu}`.
//!
//! Never fails: a missing or empty string yields `{}`, an unrecognized one yields
//! the raw `ua` plus empty sections.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;
use tracing::warn;

struct Rule {
    pattern: Regex,
    name: &'static str,
}

struct UserAgentParser {
    browsers: Vec<Rule>,
    webkit: Regex,
    gecko: Regex,
    trident: Regex,
    windows: Regex,
    mac_os: Regex,
    ios: Regex,
    android: Regex,
    ubuntu: Regex,
}

impl UserAgentParser {
    fn new() -> Result<Self, regex::Error> {
        let rule = |pattern: &str, name: &'static str| -> Result<Rule, regex::Error> {
            Ok(Rule {
                pattern: Regex::new(pattern)?,
                name,
            })
        };
        Ok(Self {
            // order matters: Chromium-based browsers also announce Chrome and Safari
            browsers: vec![
                rule(r"Edge?/([\w.]+)", "Edge")?,
                rule(r"OPR/([\w.]+)", "Opera")?,
                rule(r"Chromium/([\w.]+)", "Chromium")?,
                rule(r"(?:Chrome|CriOS)/([\w.]+)", "Chrome")?,
                rule(r"(?:Firefox|FxiOS)/([\w.]+)", "Firefox")?,
                rule(r"Version/([\w.]+).*Safari/", "Safari")?,
                rule(r"MSIE ([\w.]+)", "IE")?,
                rule(r"Trident/.*rv:([\w.]+)", "IE")?,
            ],
            webkit: Regex::new(r"AppleWebKit/([\w.]+)")?,
            gecko: Regex::new(r"rv:([\w.]+)\).*Gecko/")?,
            trident: Regex::new(r"Trident/([\w.]+)")?,
            windows: Regex::new(r"Windows NT ([\d.]+)")?,
            mac_os: Regex::new(r"Mac OS X ([\d_.]+)")?,
            ios: Regex::new(r"(?:iPhone|CPU) OS ([\d_]+)")?,
            android: Regex::new(r"Android ([\d.]+)")?,
            ubuntu: Regex::new(r"Ubuntu/([\d.]+)")?,
        })
    }

    fn parse(&self, ua: &str) -> Value {
        let mut browser = Map::new();
        let mut major_version = None;
        for rule in &self.browsers {
            if let Some(version) = capture(&rule.pattern, ua) {
                let major = version.split('.').next().unwrap_or_default().to_string();
                major_version = major.parse::<u32>().ok().map(|m| (rule.name, m));
                browser.insert("name".into(), json!(rule.name));
                browser.insert("version".into(), json!(version));
                browser.insert("major".into(), json!(major));
                break;
            }
        }

        json!({
            "ua": ua,
            "browser": browser,
            "engine": self.engine(ua, major_version),
            "os": self.os(ua),
            "device": device(ua),
            "cpu": cpu(ua),
        })
    }

    fn engine(&self, ua: &str, browser: Option<(&str, u32)>) -> Value {
        let blink = match browser {
            Some(("Chrome", major)) | Some(("Chromium", major)) => major >= 28,
            Some(("Edge", major)) => major >= 79,
            Some(("Opera", _)) => true,
            _ => false,
        };
        if blink {
            let version = capture(&self.browsers[3].pattern, ua)
                .or_else(|| capture(&self.browsers[2].pattern, ua));
            return section(&[("name", Some("Blink".to_string())), ("version", version)]);
        }
        if let Some(version) = capture(&self.webkit, ua) {
            return section(&[("name", Some("WebKit".to_string())), ("version", Some(version))]);
        }
        if let Some(version) = capture(&self.trident, ua) {
            return section(&[("name", Some("Trident".to_string())), ("version", Some(version))]);
        }
        if let Some(version) = capture(&self.gecko, ua) {
            return section(&[("name", Some("Gecko".to_string())), ("version", Some(version))]);
        }
        json!({})
    }

    fn os(&self, ua: &str) -> Value {
        if let Some(version) = capture(&self.windows, ua) {
            let named = match version.as_str() {
                "10.0" => "10",
                "6.3" => "8.1",
                "6.2" => "8",
                "6.1" => "7",
                "6.0" => "Vista",
                "5.1" | "5.2" => "XP",
                other => other,
            };
            return section(&[("name", Some("Windows".into())), ("version", Some(named.into()))]);
        }
        if ua.contains("iPhone") || ua.contains("iPad") {
            let version = capture(&self.ios, ua).map(|v| v.replace('_', "."));
            return section(&[("name", Some("iOS".into())), ("version", version)]);
        }
        if let Some(version) = capture(&self.mac_os, ua) {
            return section(&[
                ("name", Some("Mac OS".into())),
                ("version", Some(version.replace('_', "."))),
            ]);
        }
        if let Some(version) = capture(&self.android, ua) {
            return section(&[("name", Some("Android".into())), ("version", Some(version))]);
        }
        if let Some(version) = capture(&self.ubuntu, ua) {
            return section(&[("name", Some("Ubuntu".into())), ("version", Some(version))]);
        }
        if ua.contains("Linux") {
            return section(&[("name", Some("Linux".into())), ("version", None)]);
        }
        json!({})
    }
}

fn capture(pattern: &Regex, ua: &str) -> Option<String> {
    pattern
        .captures(ua)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Object with only the fields that are known
fn section(fields: &[(&str, Option<String>)]) -> Value {
    let object: Map<String, Value> = fields
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), json!(v))))
        .collect();
    Value::Object(object)
}

fn device(ua: &str) -> Value {
    if ua.contains("iPad") {
        json!({"vendor": "Apple", "model": "iPad", "type": "tablet"})
    } else if ua.contains("iPhone") {
        json!({"vendor": "Apple", "model": "iPhone", "type": "mobile"})
    } else if ua.contains("Android") && ua.contains("Mobile") {
        json!({"type": "mobile"})
    } else if ua.contains("Android") {
        json!({"type": "tablet"})
    } else {
        json!({})
    }
}

fn cpu(ua: &str) -> Value {
    let architecture = if ua.contains("x86_64") || ua.contains("amd64") || ua.contains("Win64") || ua.contains("WOW64") {
        Some("amd64")
    } else if ua.contains("aarch64") || ua.contains("arm64") {
        Some("arm64")
    } else if ua.contains("i686") || ua.contains("i386") {
        Some("ia32")
    } else if ua.contains("armv7") || ua.contains("armv8") {
        Some("arm")
    } else {
        None
    };
    match architecture {
        Some(architecture) => json!({ "architecture": architecture }),
        None => json!({}),
    }
}

fn parser() -> Option<&'static UserAgentParser> {
    static PARSER: OnceLock<Option<UserAgentParser>> = OnceLock::new();
    PARSER
        .get_or_init(|| match UserAgentParser::new() {
            Ok(parser) => Some(parser),
            Err(err) => {
                warn!(error = %err, "User-Agent parser unavailable");
                None
            }
        })
        .as_ref()
}

/// Parse a `User-Agent` header value
pub fn parse_user_agent(user_agent: Option<&str>) -> Value {
    match user_agent.map(str::trim).filter(|ua| !ua.is_empty()) {
        None => json!({}),
        Some(ua) => match parser() {
            Some(parser) => parser.parse(ua),
            None => json!({ "ua": ua }),
        },
    }
}
