//! URL template formatting.
//!
//! Placeholders come in two shapes: `:name` (path segment names only) and
//! `{name}` / `{name:regex}` (any context). A single scanner walks the
//! template once; the context of each placeholder is decided by where the
//! scanner is when it meets it, using the same split rules as
//! [`PathExpression::parse`](crate::core::PathExpression::parse):
//!
//! * before the first `?` and outside a `;` group: [`Context::Path`]
//! * after a `;` in the current segment: [`Context::Matrix`]
//! * after the first `?`: [`Context::Query`]
//! * after the last `#`: [`Context::Fragment`]
//!
//! Header values are templated separately by [`Templater::format_header`],
//! which only knows `{name}` / `{name:regex}` and binds from
//! [`Context::Header`].
//!
//! Resolved values are inserted verbatim. Callers that need percent-encoding
//! must encode before binding.
use std::{collections::HashMap, fmt};

use regex::Regex;
use thiserror::Error;

use crate::core::path_expression::is_redundant_segment;

/// Where a placeholder sits in the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Path,
    Matrix,
    Query,
    Fragment,
    Header,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Path => "path",
            Context::Matrix => "matrix",
            Context::Query => "query",
            Context::Fragment => "fragment",
            Context::Header => "header",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Templating failures. All of them surface synchronously to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No {context} parameter bound for placeholder {placeholder}")]
    MissingParameter {
        placeholder: String,
        context: Context,
    },

    #[error("Value '{value}' does not match {context} placeholder {placeholder}")]
    PatternMismatch {
        placeholder: String,
        context: Context,
        value: String,
    },

    #[error("Invalid {context} pattern in placeholder {placeholder}: {reason}")]
    InvalidTemplate {
        placeholder: String,
        context: Context,
        reason: String,
    },
}

/// Result type for templating operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Parameter maps consulted while formatting, one per context.
///
/// [`Bindings::shared`] builds the legacy mode where a single map serves
/// every context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    path: HashMap<String, String>,
    matrix: HashMap<String, String>,
    query: HashMap<String, String>,
    fragment: HashMap<String, String>,
    header: HashMap<String, String>,
    shared: bool,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// One map for every context.
    pub fn shared(params: HashMap<String, String>) -> Self {
        Self {
            path: params,
            shared: true,
            ..Self::default()
        }
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Bind `name` in `context`. In shared mode the context is ignored.
    pub fn insert(&mut self, context: Context, name: impl Into<String>, value: impl Into<String>) {
        self.map_mut(context).insert(name.into(), value.into());
    }

    pub fn with(
        mut self,
        context: Context,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.insert(context, name, value);
        self
    }

    pub fn get(&self, context: Context, name: &str) -> Option<&str> {
        self.map(context).get(name).map(String::as_str)
    }

    pub fn map(&self, context: Context) -> &HashMap<String, String> {
        if self.shared {
            return &self.path;
        }
        match context {
            Context::Path => &self.path,
            Context::Matrix => &self.matrix,
            Context::Query => &self.query,
            Context::Fragment => &self.fragment,
            Context::Header => &self.header,
        }
    }

    fn map_mut(&mut self, context: Context) -> &mut HashMap<String, String> {
        if self.shared {
            return &mut self.path;
        }
        match context {
            Context::Path => &mut self.path,
            Context::Matrix => &mut self.matrix,
            Context::Query => &mut self.query,
            Context::Fragment => &mut self.fragment,
            Context::Header => &mut self.header,
        }
    }
}

/// Stateless URL formatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Templater;

impl Templater {
    /// Substitute every placeholder of `template` from `bindings`.
    ///
    /// * `None` template: [`TemplateError::InvalidArgument`]
    /// * blank template: empty string
    /// * no placeholder (or unbalanced braces): the template, unchanged
    pub fn format_url<'a>(
        template: impl Into<Option<&'a str>>,
        bindings: &Bindings,
    ) -> TemplateResult<String> {
        let Some(template) = template.into() else {
            return Err(TemplateError::InvalidArgument(
                "template must not be null".to_string(),
            ));
        };
        if template.trim().is_empty() {
            return Ok(String::new());
        }

        let Some(layout) = Layout::scan(template) else {
            return Ok(template.to_string());
        };
        if layout.placeholders.is_empty() {
            return Ok(template.to_string());
        }

        layout.render(template, bindings)
    }

    /// Substitute `{name}` / `{name:regex}` placeholders of a header value
    /// from the [`Context::Header`] bindings. No slash normalization applies
    /// and `:name` is literal text.
    pub fn format_header(value: &str, bindings: &Bindings) -> TemplateResult<String> {
        let Some(braces) = Braces::scan(value) else {
            return Ok(value.to_string());
        };

        let mut out = String::with_capacity(value.len());
        let mut idx = 0;
        for placeholder in &braces.placeholders {
            out.push_str(&value[idx..placeholder.start]);
            out.push_str(resolve(value, placeholder, Context::Header, bindings)?);
            idx = placeholder.end;
        }
        out.push_str(&value[idx..]);
        Ok(out)
    }
}

/// Shorthand for [`Templater::format_url`].
pub fn format_url<'a>(
    template: impl Into<Option<&'a str>>,
    bindings: &Bindings,
) -> TemplateResult<String> {
    Templater::format_url(template, bindings)
}

/// A placeholder occurrence: byte range in the template, name and optional
/// inline pattern.
#[derive(Debug, Clone, Copy)]
struct Placeholder<'t> {
    start: usize,
    end: usize,
    name: &'t str,
    pattern: Option<&'t str>,
}

/// Brace placeholders plus the `?` and `#` found outside of them.
#[derive(Debug)]
struct Braces<'t> {
    placeholders: Vec<Placeholder<'t>>,
    first_question: Option<usize>,
    last_hash: Option<usize>,
}

impl<'t> Braces<'t> {
    /// Returns `None` when braces are unbalanced; such a template is treated
    /// as carrying no expression at all.
    fn scan(template: &'t str) -> Option<Self> {
        let bytes = template.as_bytes();
        let mut placeholders = Vec::new();
        let mut depth = 0usize;
        let mut open = 0usize;
        let mut last_hash = None;
        let mut first_question = None;

        for (idx, &byte) in bytes.iter().enumerate() {
            match byte {
                b'{' => {
                    if depth == 0 {
                        open = idx;
                    }
                    depth += 1;
                }
                b'}' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        let inner = &template[open + 1..idx];
                        let (name, pattern) = match inner.split_once(':') {
                            Some((name, pattern)) => (name.trim(), Some(pattern)),
                            None => (inner.trim(), None),
                        };
                        placeholders.push(Placeholder {
                            start: open,
                            end: idx + 1,
                            name,
                            pattern,
                        });
                    }
                }
                b'#' if depth == 0 => last_hash = Some(idx),
                b'?' if depth == 0 && first_question.is_none() => first_question = Some(idx),
                _ => {}
            }
        }
        if depth != 0 {
            return None;
        }

        Some(Self {
            placeholders,
            first_question,
            last_hash,
        })
    }
}

/// Placeholder positions plus the structural delimiters of a template.
#[derive(Debug)]
struct Layout<'t> {
    placeholders: Vec<Placeholder<'t>>,
    query_start: Option<usize>,
    fragment_start: Option<usize>,
}

impl<'t> Layout<'t> {
    fn scan(template: &'t str) -> Option<Self> {
        let Braces {
            mut placeholders,
            first_question,
            last_hash,
        } = Braces::scan(template)?;

        let query_start = first_question.filter(|q| last_hash.is_none_or(|hash| *q < hash));
        let path_end = query_start.or(last_hash).unwrap_or(template.len());

        let mut colon = Self::colon_placeholders(template, path_end, &placeholders);
        if !colon.is_empty() {
            placeholders.append(&mut colon);
            placeholders.sort_by_key(|placeholder| placeholder.start);
        }

        Some(Self {
            placeholders,
            query_start,
            fragment_start: last_hash,
        })
    }

    /// `:name` tokens that open a path segment.
    fn colon_placeholders(
        template: &'t str,
        path_end: usize,
        braces: &[Placeholder<'t>],
    ) -> Vec<Placeholder<'t>> {
        let bytes = template.as_bytes();
        let mut found = Vec::new();
        for idx in 0..path_end {
            let at_segment_start = idx == 0 || bytes[idx - 1] == b'/';
            if bytes[idx] != b':' || !at_segment_start {
                continue;
            }
            if braces.iter().any(|p| p.start <= idx && idx < p.end) {
                continue;
            }
            let name_len = bytes[idx + 1..path_end]
                .iter()
                .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                .count();
            if name_len == 0 {
                continue;
            }
            found.push(Placeholder {
                start: idx,
                end: idx + 1 + name_len,
                name: &template[idx + 1..idx + 1 + name_len],
                pattern: None,
            });
        }
        found
    }

    fn render(&self, template: &str, bindings: &Bindings) -> TemplateResult<String> {
        let mut path = String::with_capacity(template.len());
        let mut tail = String::new();
        let mut context = Context::Path;
        let mut placeholders = self.placeholders.iter().peekable();
        let mut idx = 0;

        while idx < template.len() {
            if let Some(placeholder) = placeholders.next_if(|p| p.start == idx) {
                let value = resolve(template, placeholder, context, bindings)?;
                if matches!(context, Context::Path | Context::Matrix) {
                    path.push_str(value);
                } else {
                    tail.push_str(value);
                }
                idx = placeholder.end;
                continue;
            }

            let Some(ch) = template[idx..].chars().next() else {
                break;
            };
            if Some(idx) == self.fragment_start {
                context = Context::Fragment;
            } else if Some(idx) == self.query_start {
                context = Context::Query;
            } else if matches!(context, Context::Path | Context::Matrix) {
                match ch {
                    ';' => context = Context::Matrix,
                    '/' => context = Context::Path,
                    _ => {}
                }
            }

            if matches!(context, Context::Path | Context::Matrix) {
                path.push(ch);
            } else {
                tail.push(ch);
            }
            idx += ch.len_utf8();
        }

        let mut out = normalize_path(&path);
        out.push_str(&tail);
        Ok(out)
    }
}

fn resolve<'b>(
    template: &str,
    placeholder: &Placeholder<'_>,
    context: Context,
    bindings: &'b Bindings,
) -> TemplateResult<&'b str> {
    let raw = &template[placeholder.start..placeholder.end];
    let value = bindings
        .get(context, placeholder.name)
        .ok_or_else(|| TemplateError::MissingParameter {
            placeholder: raw.to_string(),
            context,
        })?;

    if let Some(pattern) = placeholder.pattern {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
            TemplateError::InvalidTemplate {
                placeholder: raw.to_string(),
                context,
                reason: err.to_string(),
            }
        })?;
        if !regex.is_match(value) {
            return Err(TemplateError::PatternMismatch {
                placeholder: raw.to_string(),
                context,
                value: value.to_string(),
            });
        }
    }

    Ok(value)
}

/// Collapse slashes in the path portion the way a rendered
/// `PathExpression` would.
fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let joined = path
        .split('/')
        .filter(|raw| !is_redundant_segment(raw))
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(name: &str, value: &str) -> Bindings {
        Bindings::new().with(Context::Path, name, value)
    }

    #[test]
    fn test_null_and_blank_templates() {
        let bindings = Bindings::new();
        assert!(matches!(
            Templater::format_url(None, &bindings),
            Err(TemplateError::InvalidArgument(_))
        ));
        assert_eq!(format_url("", &bindings).unwrap(), "");
        assert_eq!(format_url("   \t", &bindings).unwrap(), "");
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged() {
        let bindings = Bindings::new();
        assert_eq!(format_url("/a//b/", &bindings).unwrap(), "/a//b/");
        assert_eq!(format_url("/a?x=1", &bindings).unwrap(), "/a?x=1");
    }

    #[test]
    fn test_unbalanced_braces_are_returned_unchanged() {
        let bindings = path("hulk", "green");
        assert_eq!(
            format_url("/movies/{hulk{", &bindings).unwrap(),
            "/movies/{hulk{"
        );
        assert_eq!(format_url("/movies/}hulk", &bindings).unwrap(), "/movies/}hulk");
    }

    #[test]
    fn test_path_placeholders() {
        let bindings = path("id", "42").with(Context::Path, "org", "acme");
        assert_eq!(
            format_url("/orgs/{org}/users/:id", &bindings).unwrap(),
            "/orgs/acme/users/42"
        );
        assert_eq!(format_url(":org/x", &bindings).unwrap(), "acme/x");
    }

    #[test]
    fn test_colon_only_at_segment_start() {
        let bindings = path("id", "42");
        assert_eq!(
            format_url("/time/10:30/{id}", &bindings).unwrap(),
            "/time/10:30/42"
        );
    }

    #[test]
    fn test_regex_constraint() {
        let ok = path("id", "12345");
        assert_eq!(
            format_url(r"/users/{id:\d+}", &ok).unwrap(),
            "/users/12345"
        );

        let bad = path("id", "abc");
        let err = format_url(r"/users/{id:\d+}", &bad).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::PatternMismatch { context: Context::Path, .. }
        ));
    }

    #[test]
    fn test_regex_must_match_fully() {
        let bindings = path("id", "12a");
        assert!(format_url(r"/users/{id:\d+}", &bindings).is_err());
        let bindings = path("code", "ab");
        assert_eq!(
            format_url("/c/{code:[a-z]{2}}", &bindings).unwrap(),
            "/c/ab"
        );
    }

    #[test]
    fn test_invalid_regex_names_context() {
        let bindings = Bindings::new().with(Context::Query, "q", "x");
        let err = format_url("/a?k={q:(}", &bindings).unwrap_err();
        match err {
            TemplateError::InvalidTemplate { context, .. } => assert_eq!(context, Context::Query),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_parameter_is_context_specific() {
        let bindings = path("x", "1");
        let err = format_url("/a?{x}=2", &bindings).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("{x}"), "{message}");
        assert!(message.contains("query"), "{message}");
        assert!(!message.contains("path"), "{message}");
    }

    #[test]
    fn test_all_four_contexts() {
        let bindings = Bindings::new()
            .with(Context::Path, "p", "items")
            .with(Context::Matrix, "mk", "color")
            .with(Context::Matrix, "mv", "red")
            .with(Context::Query, "qk", "sort")
            .with(Context::Query, "qv", "asc")
            .with(Context::Fragment, "f", "top");
        assert_eq!(
            format_url("/{p};{mk}={mv}?{qk}={qv}#{f}", &bindings).unwrap(),
            "/items;color=red?sort=asc#top"
        );
    }

    #[test]
    fn test_matrix_value_inserted_verbatim() {
        let bindings = Bindings::new().with(Context::Matrix, "val", "x;y=1");
        assert_eq!(
            format_url("/a;k={val}/b", &bindings).unwrap(),
            "/a;k=x;y=1/b"
        );
    }

    #[test]
    fn test_shared_bindings_serve_every_context() {
        let mut params = HashMap::new();
        params.insert("id".to_string(), "7".to_string());
        let bindings = Bindings::shared(params);
        assert_eq!(
            format_url("/u/{id};v={id}?id={id}#{id}", &bindings).unwrap(),
            "/u/7;v=7?id=7#7"
        );
    }

    #[test]
    fn test_slashes_collapse_after_substitution() {
        let bindings = path("a", "").with(Context::Path, "b", "x//y");
        assert_eq!(format_url("//{a}/{b}/", &bindings).unwrap(), "/x/y");
    }

    #[test]
    fn test_bare_matrix_separator_segments_collapse() {
        let bindings = path("a", "x").with(Context::Path, "b", ";");
        let out = format_url("/{a}/;", &bindings).unwrap();
        assert_eq!(out, "/x");
        assert_eq!(format_url("/{a}/{b}/y", &bindings).unwrap(), "/x/y");

        let parsed = crate::core::PathExpression::parse(&out, None).unwrap();
        assert_eq!(parsed.render(), out);
    }

    #[test]
    fn test_last_hash_in_resolved_output_starts_fragment() {
        let bindings = path("id", "a#b");
        let out = format_url("/items/{id}#frag", &bindings).unwrap();
        assert_eq!(out, "/items/a#b#frag");
        let parsed = crate::core::PathExpression::parse(&out, None).unwrap();
        assert_eq!(parsed.fragment(), ["frag"]);
    }

    #[test]
    fn test_header_values_bind_from_header_context() {
        let bindings = Bindings::new()
            .with(Context::Header, "token", "abc")
            .with(Context::Path, "other", "nope");
        assert_eq!(
            Templater::format_header("Bearer {token}", &bindings).unwrap(),
            "Bearer abc"
        );
        assert_eq!(
            Templater::format_header("text/plain; q=0.5", &bindings).unwrap(),
            "text/plain; q=0.5"
        );
        assert_eq!(
            Templater::format_header(":other/{token}", &bindings).unwrap(),
            ":other/abc"
        );

        let err = Templater::format_header("{other}", &bindings).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingParameter {
                placeholder: "{other}".to_string(),
                context: Context::Header,
            }
        );
    }

    #[test]
    fn test_header_pattern_is_checked() {
        let bindings = Bindings::new().with(Context::Header, "v", "v2");
        assert_eq!(
            Templater::format_header(r"app/{v:v\d+}", &bindings).unwrap(),
            "app/v2"
        );
        assert!(matches!(
            Templater::format_header(r"{v:\d+}", &bindings),
            Err(TemplateError::PatternMismatch {
                context: Context::Header,
                ..
            })
        ));
    }

    #[test]
    fn test_formatting_is_deterministic() {
        let bindings = path("id", "1").with(Context::Query, "q", "z");
        let first = format_url("/a/{id}?q={q}", &bindings).unwrap();
        let second = format_url("/a/{id}?q={q}", &bindings).unwrap();
        assert_eq!(first, second);
    }
}
