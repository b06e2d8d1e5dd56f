//! Glob pattern matching for `search` and directory listings.
//!
//! Supports `*` (within a segment), `?`, `**` (across segments), `{a,b}`
//! alternation, and a leading `!` that negates the whole pattern. Patterns
//! compile to anchored regular expressions.

use regex::RegexBuilder;

use crate::error::{FsError, FsResult};

#[derive(Debug, Clone)]
pub struct GlobMatcher {
    regex: regex::Regex,
    negated: bool,
    has_slash: bool,
}

impl GlobMatcher {
    /// Whether the pattern constrains directory components. Patterns without
    /// a `/` are matched against basenames, with one against full paths.
    pub fn matches_full_path(&self) -> bool {
        self.has_slash
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate) != self.negated
    }
}

/// Compile a glob into a matcher. Invalid alternations fail `EINVAL`.
pub fn compile(pattern: &str, case_sensitive: bool) -> FsResult<GlobMatcher> {
    let (negated, body) = match pattern.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };
    if body.is_empty() {
        return Err(FsError::invalid("glob pattern must not be empty"));
    }

    let regex_src = translate(body)?;
    let regex = RegexBuilder::new(&regex_src)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| FsError::invalid(format!("invalid glob pattern: {e}")))?;

    Ok(GlobMatcher { regex, negated, has_slash: body.contains('/') })
}

fn translate(glob: &str) -> FsResult<String> {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    let mut brace_depth = 0usize;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    // `**/` may also match zero directories.
                    if chars.get(i + 2) == Some(&'/') {
                        out.push_str("(?:.*/)?");
                        i += 3;
                    } else {
                        out.push_str(".*");
                        i += 2;
                    }
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
                i += 1;
            }
            '}' => {
                if brace_depth == 0 {
                    return Err(FsError::invalid("unbalanced '}' in glob pattern"));
                }
                brace_depth -= 1;
                out.push(')');
                i += 1;
            }
            ',' if brace_depth > 0 => {
                out.push('|');
                i += 1;
            }
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    if brace_depth != 0 {
        return Err(FsError::invalid("unbalanced '{' in glob pattern"));
    }
    out.push('$');
    Ok(out)
}
