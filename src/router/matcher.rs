//! Route pattern compilation.
//!
//! A pattern is split on `/` into segments. Each segment is either a literal,
//! a named parameter `:name`, or an optional parameter `:name?`. Patterns
//! without parameters compile to an exact string comparison; everything else
//! compiles to an anchored regex, built the same way the HTTP router turned
//! `/users/{id}` into `^/users/([^/]+)$`.

use crate::envelope::Params;
use crate::error::IpcError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Path segment separator.
pub const SEPARATOR: char = '/';

static PARAM_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("param name regex should be valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Param { name: &'a str, optional: bool },
}

fn parse_segment<'a>(pattern: &str, segment: &'a str) -> Result<Segment<'a>, IpcError> {
    let Some(rest) = segment.strip_prefix(':') else {
        return Ok(Segment::Literal(segment));
    };
    let (name, optional) = match rest.strip_suffix('?') {
        Some(name) => (name, true),
        None => (rest, false),
    };
    if !PARAM_NAME_REGEX.is_match(name) {
        return Err(IpcError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: format!("parameter segment '{segment}' needs a name made of [A-Za-z0-9_]"),
        });
    }
    Ok(Segment::Param { name, optional })
}

#[derive(Debug, Clone)]
enum MatcherKind {
    /// No parameters: compare the path literally.
    Exact,
    /// Capture groups line up with `param_names`.
    Regex {
        regex: Regex,
        param_names: Vec<String>,
    },
}

/// Compiled route pattern.
///
/// Compiled once at registration time; `test` and `extract` are pure.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    kind: MatcherKind,
}

impl PathMatcher {
    /// Compile a route pattern.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::InvalidPattern`] when a `:` segment has no valid
    /// parameter name.
    ///
    /// # Example
    ///
    /// ```rust
    /// use brrtbus::router::PathMatcher;
    ///
    /// let m = PathMatcher::compile("user/:id/:tab?").unwrap();
    /// assert!(m.test("user/7"));
    /// assert_eq!(m.extract("user/7/posts").get("tab").map(String::as_str), Some("posts"));
    /// assert!(m.extract("user/7").get("tab").is_none());
    /// ```
    pub fn compile(pattern: &str) -> Result<Self, IpcError> {
        let segments = pattern
            .split(SEPARATOR)
            .map(|segment| parse_segment(pattern, segment))
            .collect::<Result<Vec<_>, _>>()?;

        if segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
        {
            return Ok(Self {
                pattern: pattern.to_string(),
                kind: MatcherKind::Exact,
            });
        }

        let (regex, param_names) = Self::segments_to_regex(pattern, &segments)?;
        Ok(Self {
            pattern: pattern.to_string(),
            kind: MatcherKind::Regex { regex, param_names },
        })
    }

    /// Build the anchored regex for a parameterized pattern.
    ///
    /// `a/:id1/:id2?` becomes `^a/([^/]+)(?:/([^/]+))?/?$`: an optional
    /// parameter swallows its leading separator so `a/x` still matches, and a
    /// single trailing separator is tolerated.
    fn segments_to_regex(
        source: &str,
        segments: &[Segment<'_>],
    ) -> Result<(Regex, Vec<String>), IpcError> {
        let mut pattern = String::with_capacity(segments.len() * 12 + 4);
        pattern.push('^');
        let mut param_names = Vec::with_capacity(segments.len());

        for (idx, segment) in segments.iter().enumerate() {
            let sep = if idx == 0 { "" } else { "/" };
            match segment {
                Segment::Literal(text) => {
                    pattern.push_str(sep);
                    pattern.push_str(&regex::escape(text));
                }
                Segment::Param {
                    name,
                    optional: false,
                } => {
                    pattern.push_str(sep);
                    pattern.push_str("([^/]+)");
                    param_names.push((*name).to_string());
                }
                Segment::Param {
                    name,
                    optional: true,
                } => {
                    pattern.push_str("(?:");
                    pattern.push_str(sep);
                    pattern.push_str("([^/]+))?");
                    param_names.push((*name).to_string());
                }
            }
        }

        pattern.push_str("/?$");
        let regex = Regex::new(&pattern).map_err(|e| IpcError::InvalidPattern {
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok((regex, param_names))
    }

    /// The source pattern string.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Names of the parameters in this pattern, in order.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        match &self.kind {
            MatcherKind::Exact => &[],
            MatcherKind::Regex { param_names, .. } => param_names,
        }
    }

    /// Whether `path` matches this pattern.
    #[inline]
    #[must_use]
    pub fn test(&self, path: &str) -> bool {
        match &self.kind {
            MatcherKind::Exact => {
                path == self.pattern
                    || path
                        .strip_suffix(SEPARATOR)
                        .is_some_and(|trimmed| trimmed == self.pattern)
            }
            MatcherKind::Regex { regex, .. } => regex.is_match(path),
        }
    }

    /// Extract named parameters from `path`.
    ///
    /// Returns an empty map for literal patterns and for paths that do not
    /// match. Optional parameters absent from `path` are left out of the map.
    #[must_use]
    pub fn extract(&self, path: &str) -> Params {
        let mut params = Params::new();
        let MatcherKind::Regex { regex, param_names } = &self.kind else {
            return params;
        };
        if let Some(caps) = regex.captures(path) {
            for (idx, name) in param_names.iter().enumerate() {
                if let Some(value) = caps.get(idx + 1) {
                    params.insert(name.clone(), value.as_str().to_string());
                }
            }
        }
        params
    }

    /// Test and extract in one pass.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<Params> {
        match &self.kind {
            MatcherKind::Exact => self.test(path).then(Params::new),
            MatcherKind::Regex { regex, param_names } => {
                let caps = regex.captures(path)?;
                Some(
                    param_names
                        .iter()
                        .enumerate()
                        .filter_map(|(idx, name)| {
                            caps.get(idx + 1)
                                .map(|value| (name.clone(), value.as_str().to_string()))
                        })
                        .collect(),
                )
            }
        }
    }
}

/// Strip leading and trailing separators from a prefix or path fragment.
#[must_use]
pub fn normalize(fragment: &str) -> &str {
    fragment.trim_matches(SEPARATOR)
}

/// Join a normalized scope and a path with exactly one separator.
///
/// An empty scope leaves `path` untouched; an empty path yields the scope.
#[must_use]
pub fn join(scope: &str, path: &str) -> String {
    if scope.is_empty() {
        return path.to_string();
    }
    let path = path.trim_start_matches(SEPARATOR);
    if path.is_empty() {
        return scope.to_string();
    }
    let mut joined = String::with_capacity(scope.len() + 1 + path.len());
    joined.push_str(scope);
    joined.push(SEPARATOR);
    joined.push_str(path);
    joined
}

/// Strip `scope` plus one separator from `name`.
///
/// Returns `None` for names outside the scope. A name must continue with a
/// separator after the scope, so scope `B` does not see `Bx/y`. The scope
/// itself maps to `""`, which is what `view.on("", ..)` registered.
#[must_use]
pub fn strip_scope<'a>(scope: &str, name: &'a str) -> Option<&'a str> {
    if scope.is_empty() {
        return Some(name);
    }
    let rest = name.strip_prefix(scope)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix(SEPARATOR)
}
