//! Ordered source-path → target-path rules.
//!
//! A rule pairs a regular expression over the request URL's path with a
//! target template. Templates substitute capture groups positionally:
//!
//! ```text
//! template = *( literal / "{{" / "}}" / "{" [ index ] "}" )
//! index    = 1*DIGIT            ; zero-based over the capture groups
//! ```
//!
//! `{}` takes the next group in order; automatic and explicit numbering
//! cannot be mixed. Patterns are anchored at the start of the path only.

use std::fmt;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::constants::{DEFAULT_SOURCE_PATTERN, DEFAULT_TARGET_TEMPLATE};
use crate::error::{ConfigurationError, MappingError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Group(usize),
}

/// A parsed target template such as `{0}/index.html`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTemplate {
    source: String,
    pieces: Vec<Piece>,
}

impl TargetTemplate {
    /// Parses a template.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidTemplate` for unbalanced braces,
    /// non-numeric field names, format specifications, or mixed automatic
    /// and explicit numbering.
    pub fn parse(template: &str) -> Result<Self, ConfigurationError> {
        let invalid = |reason| ConfigurationError::InvalidTemplate {
            template: template.to_string(),
            reason,
        };

        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut next_auto = 0usize;
        let mut saw_auto = false;
        let mut saw_manual = false;
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(invalid("single '}' encountered")),
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err(invalid("unexpected '{' in field name")),
                            Some(ch) => field.push(ch),
                            None => return Err(invalid("single '{' encountered")),
                        }
                    }

                    let index = if field.is_empty() {
                        saw_auto = true;
                        next_auto += 1;
                        next_auto - 1
                    } else if field.chars().all(|ch| ch.is_ascii_digit()) {
                        saw_manual = true;
                        field
                            .parse()
                            .map_err(|_| invalid("group index out of range"))?
                    } else if field.contains([':', '!']) {
                        return Err(invalid("format specifications are not supported"));
                    } else {
                        return Err(invalid("field names must be positional group indices"));
                    };

                    if saw_auto && saw_manual {
                        return Err(invalid(
                            "cannot switch between automatic and manual field numbering",
                        ));
                    }

                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Group(index));
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            pieces,
        })
    }

    /// Returns the template as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns the highest group index the template refers to, if any.
    #[must_use]
    pub fn max_group(&self) -> Option<usize> {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                Piece::Group(i) => Some(*i),
                Piece::Literal(_) => None,
            })
            .max()
    }

    /// Renders the template with the given capture groups.
    ///
    /// Groups that did not participate in the match render as empty text.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if the template refers to a
    /// group the pattern does not have.
    pub fn render(&self, groups: &[Option<&str>]) -> Result<String, String> {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Group(index) => {
                    let group = groups.get(*index).ok_or_else(|| {
                        format!(
                            "template refers to group {index} but the pattern captures {}",
                            groups.len()
                        )
                    })?;
                    out.push_str(group.unwrap_or_default());
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for TargetTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// One source pattern → target template rule.
#[derive(Debug, Clone)]
pub struct PathRule {
    source: String,
    regex: Regex,
    template: TargetTemplate,
}

impl PathRule {
    /// Compiles a rule.
    ///
    /// The pattern only has to match a prefix of the path; add `$` to
    /// require a full match.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidPattern` if the pattern does not
    /// compile and `ConfigurationError::InvalidTemplate` if the template is
    /// malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use interposition::PathRule;
    ///
    /// let rule = PathRule::new(r".*(/pkg)/$", "{0}/index.html").unwrap();
    /// assert_eq!(rule.apply("/pkg/").unwrap().as_deref(), Some("/pkg/index.html"));
    /// assert_eq!(rule.apply("/other").unwrap(), None);
    /// ```
    pub fn new(pattern: &str, template: &str) -> Result<Self, ConfigurationError> {
        let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
            ConfigurationError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        let template = TargetTemplate::parse(template)?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            template,
        })
    }

    /// Returns the source pattern as written.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// Returns the target template.
    #[must_use]
    pub const fn template(&self) -> &TargetTemplate {
        &self.template
    }

    /// Returns the number of capture groups in the pattern.
    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.regex.captures_len() - 1
    }

    /// Applies the rule to a URL path.
    ///
    /// Returns `Ok(None)` if the pattern does not match.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::TemplateSubstitution` if the pattern matches
    /// but the template cannot be rendered.
    pub fn apply(&self, path: &str) -> Result<Option<String>, MappingError> {
        let Some(captures) = self.regex.captures(path) else {
            return Ok(None);
        };

        let groups: Vec<Option<&str>> = captures
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str()))
            .collect();

        self.template
            .render(&groups)
            .map(Some)
            .map_err(|reason| MappingError::TemplateSubstitution {
                pattern: self.source.clone(),
                template: self.template.as_str().to_string(),
                reason,
            })
    }
}

impl PartialEq for PathRule {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.template == other.template
    }
}

impl Eq for PathRule {}

/// Ordered rule list; the first matching rule decides the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMap {
    rules: Vec<PathRule>,
}

impl TargetMap {
    /// Creates a map from rules in evaluation order.
    #[must_use]
    pub fn new(rules: Vec<PathRule>) -> Self {
        Self { rules }
    }

    /// The map used when a configuration declares no rules: every path maps
    /// to itself.
    ///
    /// # Panics
    ///
    /// Never in practice; the built-in identity rule is a constant.
    #[must_use]
    pub fn identity() -> Self {
        let rule = PathRule::new(DEFAULT_SOURCE_PATTERN, DEFAULT_TARGET_TEMPLATE)
            .expect("identity rule is valid");
        Self::new(vec![rule])
    }

    /// Returns the rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    /// Maps a URL path to a target path.
    ///
    /// Returns `Ok(None)` when no rule matches.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::TemplateSubstitution` if the first matching
    /// rule cannot be rendered. Later rules are never consulted in that case.
    pub fn map_path(&self, path: &str) -> Result<Option<String>, MappingError> {
        for rule in &self.rules {
            if let Some(target) = rule.apply(path)? {
                debug!(path, pattern = rule.pattern(), %target, "path matched rule");
                return Ok(Some(target));
            }
        }
        Ok(None)
    }

    /// Maps a request URL to a target path using the URL's path component.
    ///
    /// # Errors
    ///
    /// - `InvalidUrl` if the URL does not parse
    /// - `NoPatternMatch` if no rule matches
    /// - `TemplateSubstitution` if the matching rule cannot be rendered
    pub fn map_url(&self, url: &str) -> Result<String, MappingError> {
        let parsed = Url::parse(url).map_err(|e| MappingError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.map_parsed(&parsed, url)
    }

    pub(crate) fn map_parsed(&self, url: &Url, original: &str) -> Result<String, MappingError> {
        self.map_path(url.path())?
            .ok_or_else(|| MappingError::NoPatternMatch {
                url: original.to_string(),
            })
    }
}

impl Default for TargetMap {
    fn default() -> Self {
        Self::identity()
    }
}
