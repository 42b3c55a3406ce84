use std::fmt;

/// Parsed `key:"value"` annotation block.
///
/// Keys keep their declaration order. When a key repeats, the first
/// occurrence wins on lookup; `iter` still yields every pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pairs: Vec<(String, String)>,
}

/// Failure to parse an annotation block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagError {
    pub input: String,
    /// Byte offset where parsing stopped
    pub position: usize,
    pub reason: &'static str,
}

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed annotation `{}` at byte {}: {}",
            self.input, self.position, self.reason
        )
    }
}

impl std::error::Error for TagError {}

impl Tag {
    /// Parse an annotation block, rejecting anything outside the grammar.
    pub fn parse(input: &str) -> Result<Self, TagError> {
        let mut pairs = Vec::new();
        let bytes = input.as_bytes();
        let mut pos = 0;
        let fail = |position: usize, reason: &'static str| TagError {
            input: input.to_string(),
            position,
            reason,
        };

        loop {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }

            let key_start = pos;
            while pos < bytes.len() && bytes[pos] != b':' && !bytes[pos].is_ascii_whitespace() {
                if bytes[pos] == b'"' {
                    return Err(fail(pos, "unexpected quote in key"));
                }
                pos += 1;
            }
            if pos == key_start {
                return Err(fail(pos, "empty key"));
            }
            let key = &input[key_start..pos];
            if pos >= bytes.len() || bytes[pos] != b':' {
                return Err(fail(pos, "expected ':' after key"));
            }
            pos += 1;
            if pos >= bytes.len() || bytes[pos] != b'"' {
                return Err(fail(pos, "expected '\"' to open value"));
            }
            pos += 1;

            let mut value = String::new();
            let mut closed = false;
            let mut chars = input[pos..].char_indices();
            while let Some((offset, ch)) = chars.next() {
                match ch {
                    '"' => {
                        pos += offset + 1;
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some((_, 'n')) => value.push('\n'),
                        Some((_, 't')) => value.push('\t'),
                        Some((_, other)) => value.push(other),
                        None => return Err(fail(input.len(), "dangling escape")),
                    },
                    other => value.push(other),
                }
            }
            if !closed {
                return Err(fail(input.len(), "unterminated value"));
            }
            pairs.push((key.to_string(), value));

            if pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
                return Err(fail(pos, "expected whitespace between pairs"));
            }
        }

        Ok(Self { pairs })
    }

    /// Parse as much of the block as possible; a malformed tail is dropped.
    ///
    /// Used for field tags that only feed optional behaviour (descriptions,
    /// lookup names), where a typo should not take the whole type down.
    #[must_use]
    pub fn lenient(input: &str) -> Self {
        match Self::parse(input) {
            Ok(tag) => tag,
            Err(err) => {
                let head = input.get(..err.position).unwrap_or("");
                let mut tag = Self::default();
                // Re-parse successively shorter prefixes ending at a closing quote.
                for (idx, _) in head.rmatch_indices('"') {
                    if let Ok(parsed) = Self::parse(&head[..=idx]) {
                        tag = parsed;
                        break;
                    }
                }
                tag
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Rules from the `v` key: `required|min:1#name is required|too small`.
    ///
    /// Messages after `#` pair up with rules by position.
    #[must_use]
    pub fn rules(&self) -> Vec<Rule<'_>> {
        let Some(raw) = self.get("v") else {
            return Vec::new();
        };
        let (rules, messages) = match raw.split_once('#') {
            Some((rules, messages)) => (rules, Some(messages)),
            None => (raw, None),
        };
        let mut messages = messages.map(|m| m.split('|'));
        rules
            .split('|')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|rule| {
                let (name, args) = match rule.split_once(':') {
                    Some((name, args)) => (name.trim(), Some(args.trim())),
                    None => (rule, None),
                };
                let message = messages
                    .as_mut()
                    .and_then(Iterator::next)
                    .map(str::trim)
                    .filter(|m| !m.is_empty());
                Rule {
                    name,
                    args,
                    message,
                }
            })
            .collect()
    }

    /// Whether the `v` rules include `required`.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.rules().iter().any(|r| r.name == "required")
    }
}

/// One validation rule from a `v` annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule<'a> {
    pub name: &'a str,
    pub args: Option<&'a str>,
    /// Custom failure message
    pub message: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_marker_block() {
        let tag = Tag::parse(r#"path:"/list" method:"GET" summary:"List things" tags:"a,b""#).unwrap();
        assert_eq!(tag.get("path"), Some("/list"));
        assert_eq!(tag.get("method"), Some("GET"));
        assert_eq!(tag.get("summary"), Some("List things"));
        assert_eq!(tag.get("tags"), Some("a,b"));
        assert_eq!(tag.get("missing"), None);
    }

    #[test]
    fn test_parse_escapes_and_whitespace() {
        let tag = Tag::parse("  dc:\"say \\\"hi\\\"\"\n\tv:\"required\"  ").unwrap();
        assert_eq!(tag.get("dc"), Some("say \"hi\""));
        assert_eq!(tag.get("v"), Some("required"));
    }

    #[test]
    fn test_first_duplicate_wins() {
        let tag = Tag::parse(r#"p:"a" p:"b""#).unwrap();
        assert_eq!(tag.get("p"), Some("a"));
        assert_eq!(tag.iter().count(), 2);
    }

    #[test]
    fn test_empty_block() {
        assert!(Tag::parse("").unwrap().is_empty());
        assert!(Tag::parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Tag::parse(r#"path"/x""#).is_err());
        assert!(Tag::parse(r#"path:/x"#).is_err());
        assert!(Tag::parse(r#"path:"/x"#).is_err());
        assert!(Tag::parse(r#"path:"/x"method:"GET""#).is_err());
        let err = Tag::parse(r#":"x""#).unwrap_err();
        assert_eq!(err.position, 0);
        assert!(err.to_string().contains("empty key"));
    }

    #[test]
    fn test_rules_with_messages() {
        let tag = Tag::parse(r#"v:"required|length:2,8#name is required|bad length""#).unwrap();
        let rules = tag.rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "required");
        assert_eq!(rules[0].message, Some("name is required"));
        assert_eq!(rules[1].name, "length");
        assert_eq!(rules[1].args, Some("2,8"));
        assert_eq!(rules[1].message, Some("bad length"));
        assert!(tag.is_required());
        assert!(!Tag::parse(r#"v:"min:1""#).unwrap().is_required());
    }

    #[test]
    fn test_lenient_keeps_valid_prefix() {
        let tag = Tag::lenient(r#"p:"name" dc:"broken"#);
        assert_eq!(tag.get("p"), Some("name"));
        assert_eq!(tag.get("dc"), None);
    }
}
