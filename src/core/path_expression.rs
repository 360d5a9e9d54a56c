//! Structured representation of a request URI.
//!
//! A [`PathExpression`] splits a raw token into path segments (each carrying
//! its own multi-valued matrix parameters), an ordered query multimap and a
//! fragment. Rendering is the inverse of parsing: a token without redundant
//! slashes or `!` markers renders back byte-for-byte.
//!
//! ```text
//! /users;role=admin;role=ops/42?expand=groups&expand=roles#details/audit
//! └──────── segments ────────┘└────────── query ──────────┘└─fragment──┘
//! ```
use std::fmt;

use thiserror::Error;

/// Errors raised while parsing or mutating a path expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PathError {
    /// A query component without a `=` separator, or an empty one.
    #[error("Malformed query parameter '{pair}': expected key=value")]
    MalformedQuery { pair: String },

    /// A matrix component without a `=` separator, or an empty one.
    #[error("Malformed matrix parameter '{pair}' in segment '{segment}': expected key=value")]
    MalformedMatrix { segment: String, pair: String },

    /// Mutation targeted a segment that does not exist.
    #[error("Segment index {index} out of range for path with {len} segments")]
    SegmentIndex { index: usize, len: usize },
}

/// Result type for path expression operations
pub type PathResult<T> = Result<T, PathError>;

/// Ordered multimap: distinct keys keep their first-insertion order and each
/// key keeps the order of its values.
///
/// Equality treats the map as a multiset of `key -> value` pairs, so the
/// order of repeated values does not matter but their multiplicity does.
#[derive(Debug, Clone, Default)]
pub struct MultiMap {
    entries: Vec<(String, Vec<String>)>,
}

impl MultiMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// All values bound to `key`, in insertion order.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.position(key).map(|idx| self.entries[idx].1.as_slice())
    }

    /// First value bound to `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Flattened `(key, value)` pairs in rendering order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(key, values)| {
            values
                .iter()
                .map(move |value| (key.as_str(), value.as_str()))
        })
    }

    /// Replace every value of `key`. The key keeps its position if already
    /// present; an empty value list removes it.
    pub fn set<I, V>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let key = key.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        match (self.position(&key), values.is_empty()) {
            (Some(idx), true) => {
                self.entries.remove(idx);
            }
            (Some(idx), false) => self.entries[idx].1 = values,
            (None, true) => {}
            (None, false) => self.entries.push((key, values)),
        }
    }

    /// Add one more value for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(idx) => self.entries[idx].1.push(value.into()),
            None => self.entries.push((key, vec![value.into()])),
        }
    }

    /// Remove `key` and return its former values.
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.position(key)
            .map(|idx| self.entries.remove(idx).1)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

impl PartialEq for MultiMap {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.entries.iter().all(|(key, values)| {
            let Some(theirs) = other.get(key) else {
                return false;
            };
            if values.len() != theirs.len() {
                return false;
            }
            let mut ours = values.clone();
            let mut theirs = theirs.to_vec();
            ours.sort_unstable();
            theirs.sort_unstable();
            ours == theirs
        })
    }
}

impl Eq for MultiMap {}

impl<K, V> FromIterator<(K, V)> for MultiMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = MultiMap::new();
        for (key, value) in iter {
            map.append(key, value);
        }
        map
    }
}

/// One path segment: a name plus its `;key=value` matrix parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    pub name: String,
    pub matrix: MultiMap,
}

impl Segment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matrix: MultiMap::new(),
        }
    }

    fn parse(raw: &str) -> PathResult<Self> {
        let Some((name, params)) = raw.split_once(';') else {
            return Ok(Self::new(raw));
        };

        let mut matrix = MultiMap::new();
        for pair in params.split(';') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| PathError::MalformedMatrix {
                    segment: raw.to_string(),
                    pair: pair.to_string(),
                })?;
            matrix.append(key, value);
        }

        Ok(Self {
            name: name.to_string(),
            matrix,
        })
    }

    fn write_to(&self, out: &mut String) {
        out.push_str(&self.name);
        for (key, value) in self.matrix.pairs() {
            out.push(';');
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
    }
}

/// `!` and `!!` segments are no-op markers and never survive parsing.
fn is_marker(segment: &str) -> bool {
    segment == "!" || segment == "!!"
}

/// Segments dropped while parsing: empty ones, markers, and bare `;` runs
/// that carry neither a name nor a matrix pair.
pub(crate) fn is_redundant_segment(segment: &str) -> bool {
    is_marker(segment) || segment.bytes().all(|byte| byte == b';')
}

/// Whether `root` ends on a component boundary of `token`.
fn root_matches(token: &str, root: &str) -> bool {
    if root.is_empty() || !token.starts_with(root) {
        return false;
    }
    let rest = &token[root.len()..];
    root.ends_with('/') || rest.is_empty() || rest.starts_with(['/', '?', '#'])
}

/// Join a root prefix and a rendered path without doubling the slash at the
/// boundary.
pub fn join_root(root: &str, path: &str) -> String {
    let root = root.trim_end_matches('/');
    if path.is_empty() {
        return root.to_string();
    }
    if path.starts_with(['/', '?', '#']) {
        format!("{root}{path}")
    } else {
        format!("{root}/{path}")
    }
}

/// Parsed request URI: segments, query and fragment, optionally rebased
/// against a root prefix such as `https://api.example.com/v1`.
#[derive(Debug, Clone, Default)]
pub struct PathExpression {
    root: Option<String>,
    absolute: bool,
    segments: Vec<Segment>,
    query: MultiMap,
    /// A bare `?` with nothing after it.
    empty_query: bool,
    fragment: Vec<String>,
}

impl PathExpression {
    /// Parse `token`. When `root` is given and `token` starts with it on a
    /// component boundary, the root is split off and kept for
    /// [`PathExpression::render`]. `http://host` is not a root of
    /// `http://hostname/a`.
    pub fn parse(token: &str, root: Option<&str>) -> PathResult<Self> {
        let (root, rest) = match root {
            Some(root) if root_matches(token, root) => (
                Some(root.trim_end_matches('/').to_string()),
                &token[root.len()..],
            ),
            _ => (None, token),
        };

        // Only the last '#' starts the fragment.
        let (before_fragment, fragment) = match rest.rfind('#') {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
            None => (rest, None),
        };
        let (path, query) = match before_fragment.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (before_fragment, None),
        };

        let segments = path
            .split('/')
            .filter(|raw| !is_redundant_segment(raw))
            .map(Segment::parse)
            .collect::<PathResult<Vec<_>>>()?;

        let empty_query = query == Some("");
        let mut query_map = MultiMap::new();
        for pair in query
            .filter(|query| !query.is_empty())
            .into_iter()
            .flat_map(|query| query.split('&'))
        {
            let (key, value) = pair.split_once('=').ok_or_else(|| PathError::MalformedQuery {
                pair: pair.to_string(),
            })?;
            query_map.append(key, value);
        }

        Ok(Self {
            root,
            absolute: path.starts_with('/'),
            segments,
            query: query_map,
            empty_query,
            fragment: fragment
                .map(|fragment| fragment.split('/').map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Whether the path portion begins with `/`.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn query(&self) -> &MultiMap {
        &self.query
    }

    pub fn fragment(&self) -> &[String] {
        &self.fragment
    }

    /// Matrix parameters of the segment at `index`.
    pub fn matrix(&self, index: usize) -> PathResult<&MultiMap> {
        self.segments
            .get(index)
            .map(|segment| &segment.matrix)
            .ok_or(PathError::SegmentIndex {
                index,
                len: self.segments.len(),
            })
    }

    /// Render with the root captured at parse time (if any).
    pub fn render(&self) -> String {
        match &self.root {
            Some(root) => self.value(root),
            None => self.no_root_value(),
        }
    }

    /// Render prefixed with `root`.
    pub fn value(&self, root: &str) -> String {
        join_root(root, &self.no_root_value())
    }

    /// Render without any root prefix.
    pub fn no_root_value(&self) -> String {
        let mut out = String::new();
        if self.absolute {
            out.push('/');
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                out.push('/');
            }
            segment.write_to(&mut out);
        }

        for (idx, (key, value)) in self.query.pairs().enumerate() {
            out.push(if idx == 0 { '?' } else { '&' });
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        if self.empty_query && self.query.is_empty() {
            out.push('?');
        }

        if !self.fragment.is_empty() {
            out.push('#');
            out.push_str(&self.fragment.join("/"));
        }
        out
    }

    /// Segment names joined by `/`, matrix content omitted.
    pub fn path_without_matrix(&self) -> String {
        let names = self
            .segments
            .iter()
            .map(|segment| segment.name.as_str())
            .collect::<Vec<_>>()
            .join("/");
        if self.absolute {
            format!("/{names}")
        } else {
            names
        }
    }

    /// Tail match of segment names against `suffix`, ignoring matrix
    /// parameters on both sides. An empty suffix never matches.
    pub fn ends_with_path(&self, suffix: &str) -> bool {
        let wanted: Vec<&str> = suffix
            .split('/')
            .filter(|raw| !is_redundant_segment(raw))
            .map(|raw| raw.split_once(';').map_or(raw, |(name, _)| name))
            .collect();
        if wanted.is_empty() || wanted.len() > self.segments.len() {
            return false;
        }

        let tail = &self.segments[self.segments.len() - wanted.len()..];
        tail.iter()
            .zip(&wanted)
            .all(|(segment, name)| segment.name == *name)
    }

    pub fn set_matrix_parameter(
        &mut self,
        index: usize,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> PathResult<()> {
        self.set_matrix_parameters(index, key, [value.into()])
    }

    pub fn set_matrix_parameters<I, V>(
        &mut self,
        index: usize,
        key: impl Into<String>,
        values: I,
    ) -> PathResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.segment_mut(index)?.matrix.set(key, values);
        Ok(())
    }

    pub fn append_matrix_parameter(
        &mut self,
        index: usize,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> PathResult<()> {
        self.segment_mut(index)?.matrix.append(key, value);
        Ok(())
    }

    pub fn remove_matrix_parameter(
        &mut self,
        index: usize,
        key: &str,
    ) -> PathResult<Option<Vec<String>>> {
        Ok(self.segment_mut(index)?.matrix.remove(key))
    }

    pub fn set_query_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.set(key, [value.into()]);
    }

    pub fn set_query_parameters<I, V>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.query.set(key, values);
    }

    pub fn append_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.append(key, value);
    }

    pub fn remove_parameter(&mut self, key: &str) -> Option<Vec<String>> {
        self.query.remove(key)
    }

    fn segment_mut(&mut self, index: usize) -> PathResult<&mut Segment> {
        let len = self.segments.len();
        self.segments
            .get_mut(index)
            .ok_or(PathError::SegmentIndex { index, len })
    }
}

impl PartialEq for PathExpression {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
            && self.query == other.query
            && self.fragment == other.fragment
    }
}

impl Eq for PathExpression {}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
