//! Shell-style filename wildcards.

use regex_lite::Regex;

use super::DiscoveryError;

/// A compiled shell wildcard matched against a single file name.
///
/// Supports `*`, `?` and bracket classes (`[abc]`, `[a-z]`, `[!abc]`). As in a
/// shell, wildcards do not match a leading `.` unless the pattern itself
/// starts with one.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    regex: Regex,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Result<Self, DiscoveryError> {
        if pattern.is_empty() {
            return Err(DiscoveryError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }
        if pattern.contains('/') {
            return Err(DiscoveryError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern matches file names and cannot contain '/'".to_string(),
            });
        }

        let regex = Regex::new(&translate(pattern)).map_err(|e| DiscoveryError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `file_name` matches.
    pub fn matches(&self, file_name: &str) -> bool {
        if file_name.starts_with('.') && !self.source.starts_with('.') {
            return false;
        }
        self.regex.is_match(file_name)
    }
}

/// Translates a wildcard into an anchored regex.
fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut re = String::from("(?s)^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    push_class(&mut re, &chars[i + 1..end]);
                    i = end;
                }
                None => re.push_str(r"\["),
            },
            c => re.push_str(&regex_lite::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }

    re.push('$');
    re
}

/// Index of the `]` closing the class opened at `start`. A `]` directly after
/// `[` or `[!` is a literal member.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    chars[j.min(chars.len())..]
        .iter()
        .position(|&c| c == ']')
        .map(|offset| j + offset)
}

fn push_class(re: &mut String, body: &[char]) {
    re.push('[');
    let body = match body.first() {
        Some('!') => {
            re.push('^');
            &body[1..]
        }
        _ => body,
    };
    for &c in body {
        if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
            re.push('\\');
        }
        re.push(c);
    }
    re.push(']');
}
