//! `.gitmodules` parsing and submodule URL resolution

use crate::error::{Error, Result};
use crate::platform::PathUtil;

/// One `[submodule "name"]` section with both `path` and `url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleEntry {
    /// Section name
    pub name: String,
    /// Path inside the parent tree
    pub path: String,
    /// Configured URL, possibly relative to the parent's URL
    pub url: String,
}

/// Parsed `.gitmodules` blob
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmodulesConfig {
    entries: Vec<SubmoduleEntry>,
}

#[derive(Default)]
struct Section {
    name: String,
    path: Option<String>,
    url: Option<String>,
}

impl SubmodulesConfig {
    /// Parse gitconfig-formatted text.
    ///
    /// Only `submodule` sections are kept; sections lacking `path` or `url`
    /// are skipped. A malformed section header is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut current: Option<Section> = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') {
                if let Some(section) = current.take() {
                    push_section(&mut entries, section);
                }
                current = parse_header(line)
                    .map_err(|msg| Error::Config(format!(".gitmodules line {}: {}", lineno + 1, msg)))?
                    .map(|name| Section {
                        name,
                        ..Section::default()
                    });
                continue;
            }

            let Some(section) = current.as_mut() else {
                continue;
            };
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), parse_value(value)),
                None => (line, "true".to_string()),
            };
            match key.to_ascii_lowercase().as_str() {
                "path" => section.path = Some(PathUtil::to_posix(&value).trim_end_matches('/').to_string()),
                "url" => section.url = Some(value),
                _ => {}
            }
        }
        if let Some(section) = current.take() {
            push_section(&mut entries, section);
        }

        Ok(Self { entries })
    }

    /// All complete entries in file order
    pub fn entries(&self) -> &[SubmoduleEntry] {
        &self.entries
    }

    /// Entry whose path is exactly `path`
    pub fn find(&self, path: &str) -> Option<&SubmoduleEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Whether some submodule lives strictly below the directory `path`
    pub fn is_submodule_prefix(&self, path: &str) -> bool {
        let dir = path.trim_end_matches('/');
        if dir.is_empty() {
            return !self.entries.is_empty();
        }
        self.entries
            .iter()
            .any(|e| e.path != dir && PathUtil::is_within(&e.path, dir))
    }
}

fn push_section(entries: &mut Vec<SubmoduleEntry>, section: Section) {
    match (section.path, section.url) {
        (Some(path), Some(url)) => entries.push(SubmoduleEntry {
            name: section.name,
            path,
            url,
        }),
        _ => tracing::debug!(submodule = %section.name, "incomplete .gitmodules section skipped"),
    }
}

/// `Some(name)` for a `[submodule "name"]` header, `None` for other sections
fn parse_header(line: &str) -> std::result::Result<Option<String>, String> {
    let close = line
        .rfind(']')
        .ok_or_else(|| format!("unterminated section header '{}'", line))?;
    let rest = line[close + 1..].trim();
    if !rest.is_empty() && !rest.starts_with('#') && !rest.starts_with(';') {
        return Err(format!("trailing text after section header '{}'", line));
    }
    let inner = line[1..close].trim();
    let (section, sub) = match inner.find(char::is_whitespace) {
        Some(ws) => (&inner[..ws], Some(inner[ws..].trim())),
        None => (inner, None),
    };
    if section.is_empty() {
        return Err("empty section name".to_string());
    }
    // Legacy `[submodule.name]` form
    let (section, legacy) = match section.split_once('.') {
        Some((section, name)) => (section, Some(name)),
        None => (section, None),
    };
    if !section.eq_ignore_ascii_case("submodule") {
        return Ok(None);
    }
    match (sub, legacy) {
        (Some(quoted), _) if quoted.len() >= 2 && quoted.starts_with('"') && quoted.ends_with('"') => {
            Ok(Some(unescape(&quoted[1..quoted.len() - 1])))
        }
        (Some(other), _) => Err(format!("submodule name must be quoted, got {}", other)),
        (None, legacy) => Ok(legacy.map(str::to_string)),
    }
}

/// Value with quotes, escapes and trailing comments handled
fn parse_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_quotes = false;
    let mut chars = raw.trim().chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            },
            '#' | ';' if !in_quotes => break,
            c => out.push(c),
        }
    }
    out.trim_end().to_string()
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Resolve a submodule URL against its parent's fetch URL.
///
/// Only `./` and `../` URLs are relative; anything else is returned as is.
pub fn resolve_submodule_url(parent_url: &str, url: &str) -> String {
    if !(url.starts_with("./") || url.starts_with("../")) {
        return url.to_string();
    }

    let mut base = parent_url.trim_end_matches('/').to_string();
    let mut rest = url;
    loop {
        if let Some(r) = rest.strip_prefix("./") {
            rest = r;
        } else if let Some(r) = rest.strip_prefix("../") {
            rest = r;
            pop_segment(&mut base);
        } else {
            break;
        }
    }
    if rest.is_empty() {
        return base;
    }
    if base.ends_with(':') {
        format!("{}{}", base, rest)
    } else {
        format!("{}/{}", base, rest)
    }
}

fn pop_segment(base: &mut String) {
    let scheme_end = base.find("://").map(|i| i + 3).unwrap_or(0);
    let tail = &base[scheme_end..];
    match tail.rfind('/') {
        Some(slash) => base.truncate(scheme_end + slash),
        // scp-like `host:repo`; a bare URL host is never climbed above
        None if scheme_end == 0 => {
            if let Some(colon) = tail.rfind(':') {
                base.truncate(colon + 1);
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const GITMODULES: &str = r#"
# top comment
[submodule "lib"]
	path = lib
	url = ../lib.git
[submodule "vendor/tools"]
	path = vendor/tools/
	url = "https://example.com/tools.git" ; trailing comment
	branch = main
[core]
	bare = false
[submodule "incomplete"]
	url = https://example.com/x.git
"#;

    #[test]
    fn test_parse_entries() {
        let config = SubmodulesConfig::parse(GITMODULES).unwrap();
        assert_eq!(config.entries().len(), 2);
        let lib = config.find("lib").unwrap();
        assert_eq!(lib.name, "lib");
        assert_eq!(lib.url, "../lib.git");
        let tools = config.find("vendor/tools").unwrap();
        assert_eq!(tools.url, "https://example.com/tools.git");
        assert!(config.find("incomplete").is_none());
    }

    #[test]
    fn test_is_submodule_prefix() {
        let config = SubmodulesConfig::parse(GITMODULES).unwrap();
        assert!(config.is_submodule_prefix("vendor"));
        assert!(config.is_submodule_prefix("vendor/"));
        assert!(config.is_submodule_prefix(""));
        assert!(!config.is_submodule_prefix("lib"));
        assert!(!config.is_submodule_prefix("vend"));
    }

    #[test]
    fn test_escaped_names_and_values() {
        let config =
            SubmodulesConfig::parse("[submodule \"a \\\"b\\\"\"]\npath = a b\nurl = x\\\\y\n")
                .unwrap();
        let entry = &config.entries()[0];
        assert_eq!(entry.name, "a \"b\"");
        assert_eq!(entry.path, "a b");
        assert_eq!(entry.url, "x\\y");
    }

    #[test]
    fn test_malformed_header_is_error() {
        assert_matches!(
            SubmodulesConfig::parse("[submodule \"lib\"\npath = lib\n"),
            Err(Error::Config(_))
        );
        assert_matches!(
            SubmodulesConfig::parse("[submodule lib]\n"),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_legacy_dotted_header() {
        let config = SubmodulesConfig::parse("[submodule.lib]\npath = lib\nurl = ../lib\n").unwrap();
        assert_eq!(config.find("lib").unwrap().name, "lib");
    }

    #[test]
    fn test_empty_config() {
        assert!(SubmodulesConfig::parse("").unwrap().entries().is_empty());
    }

    #[test]
    fn test_resolve_relative_urls() {
        let parent = "https://example.com/org/app.git";
        assert_eq!(
            resolve_submodule_url(parent, "../lib.git"),
            "https://example.com/org/lib.git"
        );
        assert_eq!(
            resolve_submodule_url(parent, "../../other/lib.git"),
            "https://example.com/other/lib.git"
        );
        assert_eq!(
            resolve_submodule_url(parent, "./sub"),
            "https://example.com/org/app.git/sub"
        );
        assert_eq!(
            resolve_submodule_url("git@host:org/app.git", "../lib.git"),
            "git@host:org/lib.git"
        );
        assert_eq!(resolve_submodule_url("/srv/git/app", "../lib"), "/srv/git/lib");
    }

    #[test]
    fn test_absolute_urls_unchanged() {
        assert_eq!(
            resolve_submodule_url("https://a/b", "https://c/d.git"),
            "https://c/d.git"
        );
        assert_eq!(resolve_submodule_url("https://a/b", "/srv/lib"), "/srv/lib");
    }
}
