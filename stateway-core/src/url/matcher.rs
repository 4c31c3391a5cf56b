//! URL pattern compilation and matching.
//!
//! A pattern like `/users/:id/details/{type}/{repeat:[0-9]+}?from&to`
//! compiles into an ordered list of static segments interleaved with path
//! parameters, a set of search parameters, and a regex with one capture
//! group per path parameter. Matchers concatenate (`append`) so a child
//! state's compiled regex is its parent's followed by its own.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::error::UrlError;
use crate::param::{
    join_array_segment, split_array_segment, ArrayMode, Param, ParamDeclaration, ParamLocation,
    ParamTypes, SquashPolicy,
};

/// RFC 3986 reserved set minus `:` and `@`: what gets percent-encoded
/// inside a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b':')
    .remove(b'@');

/// Flags a matcher is compiled under. Appended matchers must agree.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    pub case_insensitive: bool,
    pub strict_mode: bool,
    pub default_squash: SquashPolicy,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            case_insensitive: false,
            strict_mode: true,
            default_squash: SquashPolicy::Off,
        }
    }
}

/// A compiled URL matcher.
///
/// Invariant: `segments.len() == path_params.len() + 1`; the path reads
/// `segments[0] p0 segments[1] p1 ... segments[n]`.
#[derive(Clone)]
pub struct UrlMatcher {
    pattern: String,
    segments: Vec<String>,
    path_params: Vec<Param>,
    search_params: Vec<Param>,
    hash_param: Option<Param>,
    regex: Regex,
    config: MatcherConfig,
}

impl fmt::Debug for UrlMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlMatcher")
            .field("pattern", &self.pattern)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

impl UrlMatcher {
    /// Compile a pattern. `param_decls` supplies per-parameter overrides
    /// (type, default, squash, ...) keyed by parameter id, typically from
    /// the owning state's `params` block.
    pub fn compile(
        pattern: &str,
        types: &ParamTypes,
        config: &MatcherConfig,
        param_decls: &HashMap<String, ParamDeclaration>,
    ) -> Result<UrlMatcher, UrlError> {
        let parsed = parse_pattern(pattern)?;

        let mut path_params = Vec::with_capacity(parsed.path_params.len());
        for placeholder in parsed.path_params {
            let decl = param_decls
                .get(placeholder.trimmed_id())
                .cloned()
                .unwrap_or_default();
            path_params.push(placeholder.into_param(types, config, &decl, pattern)?);
        }

        let mut search_params = Vec::with_capacity(parsed.search_params.len());
        for placeholder in parsed.search_params {
            let decl = param_decls
                .get(placeholder.trimmed_id())
                .cloned()
                .unwrap_or_default();
            search_params.push(placeholder.into_param(types, config, &decl, pattern)?);
        }

        let matcher = UrlMatcher {
            pattern: pattern.to_string(),
            regex: build_regex(&parsed.segments, &path_params, config)?,
            segments: parsed.segments,
            path_params,
            search_params,
            hash_param: None,
            config: config.clone(),
        };
        matcher.check_duplicates()?;
        Ok(matcher)
    }

    /// The synthetic root matcher: empty path, owns the built-in `#`
    /// parameter.
    pub fn root(types: &ParamTypes, config: &MatcherConfig) -> UrlMatcher {
        let hash_type = types.get("hash").expect("built-in hash type");
        let hash_param = Param::from_parts(
            "#",
            ParamLocation::Search,
            hash_type,
            &ParamDeclaration::new().default_value(""),
            ArrayMode::Off,
            &SquashPolicy::Off,
        );
        let mut matcher = UrlMatcher::compile("", types, config, &HashMap::new())
            .expect("empty pattern always compiles");
        matcher.hash_param = Some(hash_param);
        matcher
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// All parameters: path params in order, then search params, then the
    /// hash param if owned.
    pub fn parameters(&self) -> Vec<&Param> {
        self.path_params
            .iter()
            .chain(self.search_params.iter())
            .chain(self.hash_param.iter())
            .collect()
    }

    pub fn parameter(&self, id: &str) -> Option<&Param> {
        self.parameters().into_iter().find(|p| p.id() == id)
    }

    /// The literal text before the first path parameter (used for
    /// prefix-matching future-state URLs).
    pub fn static_prefix(&self) -> &str {
        &self.segments[0]
    }

    // ── Concatenation ───────────────────────────────────────────────────────

    /// Concatenate `child` onto this matcher. Parent path comes first;
    /// parameter namespaces merge with the child overriding search params.
    /// Associative: `(a+b)+c` and `a+(b+c)` match the same URLs.
    pub fn append(&self, child: &UrlMatcher) -> Result<UrlMatcher, UrlError> {
        if self.config.case_insensitive != child.config.case_insensitive
            || self.config.strict_mode != child.config.strict_mode
        {
            return Err(UrlError::IncompatibleAppend {
                reason: format!(
                    "flags differ between '{}' and '{}'",
                    self.pattern, child.pattern
                ),
            });
        }

        let mut segments = self.segments.clone();
        let joint = segments.pop().unwrap_or_default() + &child.segments[0];
        segments.push(joint);
        segments.extend(child.segments[1..].iter().cloned());

        let mut path_params = self.path_params.clone();
        path_params.extend(child.path_params.iter().cloned());

        let mut search_params: Vec<Param> = self
            .search_params
            .iter()
            .filter(|p| child.search_params.iter().all(|c| c.id() != p.id()))
            .cloned()
            .collect();
        search_params.extend(child.search_params.iter().cloned());

        let matcher = UrlMatcher {
            pattern: format!("{}{}", self.pattern, child.pattern),
            regex: build_regex(&segments, &path_params, &self.config)?,
            segments,
            path_params,
            search_params,
            hash_param: child.hash_param.clone().or_else(|| self.hash_param.clone()),
            config: self.config.clone(),
        };
        matcher.check_duplicates()?;
        Ok(matcher)
    }

    fn check_duplicates(&self) -> Result<(), UrlError> {
        let mut seen = std::collections::HashSet::new();
        for p in self.path_params.iter().chain(self.search_params.iter()) {
            if !seen.insert(p.id().to_string()) {
                return Err(UrlError::DuplicateParam {
                    pattern: self.pattern.clone(),
                    param: p.id().to_string(),
                });
            }
        }
        Ok(())
    }

    // ── Matching ────────────────────────────────────────────────────────────

    /// Match a path + parsed search map (+ hash fragment) against this
    /// matcher, producing decoded, validated parameter values.
    pub fn exec(
        &self,
        path: &str,
        search: &HashMap<String, Vec<String>>,
        hash: &str,
    ) -> Option<HashMap<String, Value>> {
        let captures = self.regex.captures(path)?;
        let mut values = HashMap::new();

        for (i, param) in self.path_params.iter().enumerate() {
            let captured = captures.get(i + 1).map(|m| m.as_str());
            let value = self.decode_path_value(param, captured);
            if !param.validates(&value) {
                return None;
            }
            values.insert(param.id().to_string(), value);
        }

        for param in &self.search_params {
            let value = match search.get(param.id()) {
                Some(raw_values) if !raw_values.is_empty() => {
                    decode_search_values(param, raw_values)
                }
                _ => param.apply_default(None),
            };
            if !param.validates(&value) {
                return None;
            }
            values.insert(param.id().to_string(), value);
        }

        if let Some(hash_param) = &self.hash_param {
            values.insert(hash_param.id().to_string(), Value::String(hash.to_string()));
        }

        Some(values)
    }

    fn decode_path_value(&self, param: &Param, captured: Option<&str>) -> Value {
        let raw = match captured {
            None | Some("") => return param.apply_default(None),
            Some(raw) => raw,
        };
        if let SquashPolicy::Literal(token) = param.squash() {
            if raw == token {
                return param.apply_default(None);
            }
        }
        match param.array_mode() {
            ArrayMode::Off => {
                let decoded = percent_decode_str(raw).decode_utf8_lossy();
                param.decode(&decoded)
            }
            _ => {
                let elements: Vec<Value> = raw
                    .split('-')
                    .map(|piece| {
                        let decoded = percent_decode_str(piece).decode_utf8_lossy();
                        let unescaped = split_array_segment(&decoded).join("-");
                        param.scalar_type().decode(&unescaped)
                    })
                    .collect();
                Value::Array(elements)
            }
        }
    }

    /// Check a parameter map against every declared parameter.
    pub fn validates(&self, params: &HashMap<String, Value>) -> bool {
        self.parameters().iter().all(|p| {
            let value = p.apply_default(params.get(p.id()).cloned());
            p.validates(&value)
        })
    }

    // ── Formatting ──────────────────────────────────────────────────────────

    /// Produce the URL (`path?query#hash`) for a parameter map, or `None`
    /// if any value fails its type check.
    pub fn format(&self, params: &HashMap<String, Value>) -> Option<String> {
        if !self.validates(params) {
            return None;
        }

        let mut url = self.segments[0].clone();
        for (i, param) in self.path_params.iter().enumerate() {
            let value = param.apply_default(params.get(param.id()).cloned());
            let squashed = param.is_default_value(&value);
            match (squashed, param.squash()) {
                (true, SquashPolicy::Omit) => {
                    if url.ends_with('/') {
                        url.pop();
                    }
                }
                (true, SquashPolicy::Literal(token)) => url.push_str(token),
                _ => url.push_str(&self.encode_path_value(param, &value)),
            }
            let next = &self.segments[i + 1];
            if url.ends_with('/') && next.starts_with('/') {
                url.push_str(&next[1..]);
            } else {
                url.push_str(next);
            }
        }

        let query = self.format_query(params);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        if let Some(hash_param) = &self.hash_param {
            if let Some(Value::String(h)) = params.get(hash_param.id()) {
                if !h.is_empty() {
                    url.push('#');
                    url.push_str(h);
                }
            }
        }

        Some(url)
    }

    fn encode_path_value(&self, param: &Param, value: &Value) -> String {
        match param.array_mode() {
            ArrayMode::Off => {
                let encoded = param.encode(value).into_single();
                if param.is_raw() {
                    encoded
                } else {
                    utf8_percent_encode(&encoded, PATH_SEGMENT).to_string()
                }
            }
            _ => {
                let elements: Vec<String> = param.encode(value).as_slice().iter().map(|s| s.to_string()).collect();
                let joined = join_array_segment(&elements);
                if param.is_raw() {
                    joined
                } else {
                    // Escaped separators percent-encode fully: `\-` → `%5C%2D`.
                    utf8_percent_encode(&joined, PATH_SEGMENT)
                        .to_string()
                        .replace("%5C-", "%5C%2D")
                }
            }
        }
    }

    fn format_query(&self, params: &HashMap<String, Value>) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        let mut any = false;
        for param in &self.search_params {
            let value = param.apply_default(params.get(param.id()).cloned());
            if value.is_null() || param.is_default_value(&value) {
                continue;
            }
            for piece in param.encode(&value).as_slice() {
                serializer.append_pair(param.id(), piece);
                any = true;
            }
        }
        if any {
            serializer.finish()
        } else {
            String::new()
        }
    }

    // ── Specificity ─────────────────────────────────────────────────────────

    /// Total order on matchers: more specific sorts first. Deeper paths
    /// win; at equal depth a static token beats a parameter token; two
    /// static tokens byte-compare; fully tied matchers are ranked by query
    /// parameter count (more wins).
    pub fn compare(a: &UrlMatcher, b: &UrlMatcher) -> Ordering {
        let (ta, tb) = (a.tokens(), b.tokens());
        let mut ia = ta.iter();
        let mut ib = tb.iter();
        loop {
            match (ia.next(), ib.next()) {
                (None, None) => break,
                (None, Some(_)) => return Ordering::Greater,
                (Some(_), None) => return Ordering::Less,
                (Some(x), Some(y)) => match (x, y) {
                    (PathToken::Static(s), PathToken::Static(t)) => match s.cmp(t) {
                        Ordering::Equal => continue,
                        other => return other,
                    },
                    (PathToken::Static(_), PathToken::Param) => return Ordering::Less,
                    (PathToken::Param, PathToken::Static(_)) => return Ordering::Greater,
                    (PathToken::Param, PathToken::Param) => continue,
                },
            }
        }
        b.search_params.len().cmp(&a.search_params.len())
    }

    fn tokens(&self) -> Vec<PathToken> {
        let mut tokens = Vec::new();
        for (i, segment) in self.segments.iter().enumerate() {
            for piece in segment.split('/').filter(|s| !s.is_empty()) {
                tokens.push(PathToken::Static(piece.to_string()));
            }
            if i < self.path_params.len() {
                tokens.push(PathToken::Param);
            }
        }
        tokens
    }
}

#[derive(Debug, PartialEq)]
enum PathToken {
    Static(String),
    Param,
}

fn decode_search_values(param: &Param, raw_values: &[String]) -> Value {
    match param.array_mode() {
        ArrayMode::Off => param.scalar_type().decode(&raw_values[0]),
        ArrayMode::Auto if raw_values.len() == 1 => param.scalar_type().decode(&raw_values[0]),
        _ => Value::Array(
            raw_values
                .iter()
                .map(|raw| param.scalar_type().decode(raw))
                .collect(),
        ),
    }
}

// ── Pattern grammar ─────────────────────────────────────────────────────────

struct Placeholder {
    id: String,
    kind: PlaceholderKind,
    location: ParamLocation,
}

enum PlaceholderKind {
    /// `:name`, `{name}`, or a bare query name: location-default type.
    Default,
    /// `{name:typeName}`: a registered type.
    Named(String),
    /// `{name:regexp}`: inline subpattern over the string type.
    Inline(String),
    /// `*name`: greedy catch-all.
    CatchAll,
}

impl Placeholder {
    fn trimmed_id(&self) -> &str {
        self.id.strip_suffix("[]").unwrap_or(&self.id)
    }

    fn into_param(
        self,
        types: &ParamTypes,
        config: &MatcherConfig,
        decl: &ParamDeclaration,
        pattern: &str,
    ) -> Result<Param, UrlError> {
        let decl = decl.clone();
        let scalar = match self.kind {
            PlaceholderKind::Default => match decl.type_name.as_deref() {
                Some(name) => types.get(name).ok_or_else(|| UrlError::UnknownParamType {
                    pattern: pattern.to_string(),
                    type_name: name.to_string(),
                })?,
                None => types.default_for(self.location),
            },
            PlaceholderKind::Named(name) => {
                types.get(&name).ok_or_else(|| UrlError::UnknownParamType {
                    pattern: pattern.to_string(),
                    type_name: name,
                })?
            }
            PlaceholderKind::Inline(subpattern) => {
                types.default_for(self.location).with_pattern(subpattern)
            }
            PlaceholderKind::CatchAll => types
                .default_for(self.location)
                .with_pattern(r"[\s\S]*"),
        };

        let mut id = self.id;
        let mut array = decl.array;
        if let Some(stripped) = id.strip_suffix("[]") {
            id = stripped.to_string();
            array.get_or_insert(ArrayMode::On);
        }
        let array = array.unwrap_or(match self.location {
            ParamLocation::Search => ArrayMode::Auto,
            _ => ArrayMode::Off,
        });

        Ok(Param::from_parts(
            id,
            self.location,
            scalar,
            &decl,
            array,
            &config.default_squash,
        ))
    }
}

struct ParsedPattern {
    segments: Vec<String>,
    path_params: Vec<Placeholder>,
    search_params: Vec<Placeholder>,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse_pattern(pattern: &str) -> Result<ParsedPattern, UrlError> {
    let (path_part, query_part) = match pattern.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (pattern, None),
    };

    let mut segments = Vec::new();
    let mut path_params = Vec::new();
    let mut current = String::new();

    let mut chars = path_part.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        match c {
            ':' | '*' => {
                let mut id = String::new();
                while let Some(&(_, nc)) = chars.peek() {
                    if is_ident_char(nc) || (nc == '[' || nc == ']') {
                        id.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if id.is_empty() {
                    // A lone ':' is literal text (e.g. a port or time).
                    current.push(c);
                    continue;
                }
                segments.push(std::mem::take(&mut current));
                path_params.push(Placeholder {
                    id,
                    kind: if c == '*' {
                        PlaceholderKind::CatchAll
                    } else {
                        PlaceholderKind::Default
                    },
                    location: ParamLocation::Path,
                });
            }
            '{' => {
                let body = read_braced(&mut chars).ok_or_else(|| UrlError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: "unterminated '{'".to_string(),
                })?;
                segments.push(std::mem::take(&mut current));
                path_params.push(parse_braced(&body, ParamLocation::Path, pattern)?);
            }
            other => current.push(other),
        }
    }
    segments.push(current);

    let mut search_params = Vec::new();
    if let Some(query) = query_part {
        for entry in query.split('&').filter(|s| !s.is_empty()) {
            if let Some(body) = entry.strip_prefix('{').and_then(|e| e.strip_suffix('}')) {
                search_params.push(parse_braced(body, ParamLocation::Search, pattern)?);
            } else {
                search_params.push(Placeholder {
                    id: entry.to_string(),
                    kind: PlaceholderKind::Default,
                    location: ParamLocation::Search,
                });
            }
        }
    }

    Ok(ParsedPattern {
        segments,
        path_params,
        search_params,
    })
}

/// Consume a `{...}` body starting after the opening brace, honoring
/// nested braces (regex quantifiers like `[0-9]{4}`).
fn read_braced(chars: &mut std::iter::Peekable<std::str::CharIndices>) -> Option<String> {
    let mut depth = 1usize;
    let mut body = String::new();
    let mut escaped = false;
    for (_, c) in chars.by_ref() {
        if escaped {
            body.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                body.push(c);
                escaped = true;
            }
            '{' => {
                depth += 1;
                body.push(c);
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(body);
                }
                body.push(c);
            }
            other => body.push(other),
        }
    }
    None
}

fn parse_braced(
    body: &str,
    location: ParamLocation,
    pattern: &str,
) -> Result<Placeholder, UrlError> {
    let (id, spec) = match body.split_once(':') {
        Some((id, spec)) => (id, Some(spec)),
        None => (body, None),
    };
    if id.is_empty() || !id.chars().all(|c| is_ident_char(c) || c == '[' || c == ']') {
        return Err(UrlError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: format!("invalid parameter name '{id}'"),
        });
    }
    let kind = match spec {
        None => PlaceholderKind::Default,
        Some(spec) if spec.chars().all(is_ident_char) && !spec.is_empty() => {
            PlaceholderKind::Named(spec.to_string())
        }
        Some(spec) => {
            check_balanced(spec).map_err(|_| UrlError::UnbalancedPattern {
                pattern: pattern.to_string(),
            })?;
            PlaceholderKind::Inline(spec.to_string())
        }
    };
    Ok(Placeholder {
        id: id.to_string(),
        kind,
        location,
    })
}

/// Inline subpatterns must have balanced (unescaped) parentheses; the
/// group structure feeds capture indexing.
fn check_balanced(subpattern: &str) -> Result<(), ()> {
    let mut depth = 0i32;
    let mut escaped = false;
    let mut in_class = false;
    for c in subpattern.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                depth -= 1;
                if depth < 0 {
                    return Err(());
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(())
    }
}

fn build_regex(
    segments: &[String],
    path_params: &[Param],
    config: &MatcherConfig,
) -> Result<Regex, UrlError> {
    let mut source = String::new();
    if config.case_insensitive {
        source.push_str("(?i)");
    }
    source.push('^');

    for (i, segment) in segments.iter().enumerate() {
        let param = path_params.get(i);
        match param {
            Some(p) if matches!(p.squash(), SquashPolicy::Omit | SquashPolicy::Literal(_))
                && segment.ends_with('/') =>
            {
                // Optional segment: the preceding slash and the value are
                // matched (or skipped) as one unit.
                source.push_str(&regex::escape(&segment[..segment.len() - 1]));
                match p.squash() {
                    SquashPolicy::Literal(token) => {
                        source.push_str(&format!(
                            "(?:/({}|{}))?",
                            p.scalar_type().pattern(),
                            regex::escape(token)
                        ));
                    }
                    _ => {
                        source.push_str(&format!("(?:/({}))?", p.scalar_type().pattern()));
                    }
                }
            }
            Some(p) => {
                source.push_str(&regex::escape(segment));
                source.push_str(&format!("({})", p.scalar_type().pattern()));
            }
            None => source.push_str(&regex::escape(segment)),
        }
    }

    if !config.strict_mode {
        // Tolerate exactly one trailing slash.
        source.push_str("/?");
    }
    source.push('$');

    Regex::new(&source).map_err(|e| UrlError::InvalidPattern {
        pattern: segments.join("{..}"),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(pattern: &str) -> UrlMatcher {
        let types = ParamTypes::new();
        UrlMatcher::compile(pattern, &types, &MatcherConfig::default(), &HashMap::new()).unwrap()
    }

    fn compile_with(pattern: &str, decls: HashMap<String, ParamDeclaration>) -> UrlMatcher {
        let types = ParamTypes::new();
        UrlMatcher::compile(pattern, &types, &MatcherConfig::default(), &decls).unwrap()
    }

    fn exec(m: &UrlMatcher, path: &str) -> Option<HashMap<String, Value>> {
        m.exec(path, &HashMap::new(), "")
    }

    #[test]
    fn literal_only() {
        let m = compile("/about");
        assert!(exec(&m, "/about").is_some());
        assert!(exec(&m, "/about/").is_none());
        assert!(exec(&m, "/abut").is_none());
    }

    #[test]
    fn colon_parameter() {
        let m = compile("/users/:id");
        let params = exec(&m, "/users/100").unwrap();
        assert_eq!(params["id"], json!("100"));
        assert!(exec(&m, "/users/1/2").is_none());
    }

    #[test]
    fn percent_decoding_roundtrip() {
        // S1: /users/:id with '100%'
        let m = compile("/users/:id");
        let params = exec(&m, "/users/100%25").unwrap();
        assert_eq!(params["id"], json!("100%"));
        let url = m
            .format(&HashMap::from([(String::from("id"), json!("100%"))]))
            .unwrap();
        assert_eq!(url, "/users/100%25");
    }

    #[test]
    fn braced_with_inline_regex() {
        let m = compile("/item/{code:[0-9]{4}}");
        assert!(exec(&m, "/item/1234").is_some());
        assert!(exec(&m, "/item/12a4").is_none());
    }

    #[test]
    fn unbalanced_inline_regex_fails() {
        let types = ParamTypes::new();
        let err = UrlMatcher::compile(
            "/x/{bad:(ab}",
            &types,
            &MatcherConfig::default(),
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, UrlError::UnbalancedPattern { .. }));
    }

    #[test]
    fn named_type_parameter() {
        let m = compile("/posts/{id:int}");
        let params = exec(&m, "/posts/42").unwrap();
        assert_eq!(params["id"], json!(42));
        assert!(exec(&m, "/posts/4x").is_none());
    }

    #[test]
    fn unknown_type_fails_compilation() {
        let types = ParamTypes::new();
        let err = UrlMatcher::compile(
            "/x/{id:nosuch}",
            &types,
            &MatcherConfig::default(),
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, UrlError::UnknownParamType { type_name, .. } if type_name == "nosuch"));
    }

    #[test]
    fn catch_all_is_greedy() {
        let m = compile("/docs/*rest");
        let params = exec(&m, "/docs/a/b/c").unwrap();
        assert_eq!(params["rest"], json!("a/b/c"));
    }

    #[test]
    fn query_parameters() {
        let m = compile("/search?q&{page:int}");
        let search = HashMap::from([
            (String::from("q"), vec![String::from("rust")]),
            (String::from("page"), vec![String::from("2")]),
        ]);
        let params = m.exec("/search", &search, "").unwrap();
        assert_eq!(params["q"], json!("rust"));
        assert_eq!(params["page"], json!(2));
    }

    #[test]
    fn repeated_query_values_collect() {
        let m = compile("/filter?tag");
        let search = HashMap::from([(
            String::from("tag"),
            vec![String::from("a"), String::from("b")],
        )]);
        let params = m.exec("/filter", &search, "").unwrap();
        assert_eq!(params["tag"], json!(["a", "b"]));
        // auto mode unwraps singletons
        let single = HashMap::from([(String::from("tag"), vec![String::from("a")])]);
        assert_eq!(m.exec("/filter", &single, "").unwrap()["tag"], json!("a"));
    }

    #[test]
    fn query_arrays_format_as_repeated_pairs() {
        let m = compile("/filter?tag");
        let url = m
            .format(&HashMap::from([(String::from("tag"), json!(["a", "b"]))]))
            .unwrap();
        assert_eq!(url, "/filter?tag=a&tag=b");
    }

    #[test]
    fn default_value_substituted_when_squashed() {
        let decls = HashMap::from([(
            String::from("id"),
            ParamDeclaration::new()
                .default_value("home")
                .squash(SquashPolicy::Omit),
        )]);
        let m = compile_with("/pages/:id", decls);
        let params = exec(&m, "/pages").unwrap();
        assert_eq!(params["id"], json!("home"));
        let params = exec(&m, "/pages/about").unwrap();
        assert_eq!(params["id"], json!("about"));
        // formatting the default omits the segment
        let url = m
            .format(&HashMap::from([(String::from("id"), json!("home"))]))
            .unwrap();
        assert_eq!(url, "/pages");
    }

    #[test]
    fn literal_squash_token() {
        let decls = HashMap::from([(
            String::from("lang"),
            ParamDeclaration::new()
                .default_value("en")
                .squash(SquashPolicy::Literal("~".into())),
        )]);
        let m = compile_with("/docs/:lang", decls);
        assert_eq!(exec(&m, "/docs/~").unwrap()["lang"], json!("en"));
        assert_eq!(exec(&m, "/docs/fr").unwrap()["lang"], json!("fr"));
        let url = m
            .format(&HashMap::from([(String::from("lang"), json!("en"))]))
            .unwrap();
        assert_eq!(url, "/docs/~");
    }

    #[test]
    fn non_strict_tolerates_one_trailing_slash() {
        let types = ParamTypes::new();
        let config = MatcherConfig {
            strict_mode: false,
            ..MatcherConfig::default()
        };
        let m = UrlMatcher::compile("/about", &types, &config, &HashMap::new()).unwrap();
        assert!(m.exec("/about", &HashMap::new(), "").is_some());
        assert!(m.exec("/about/", &HashMap::new(), "").is_some());
        assert!(m.exec("/about//", &HashMap::new(), "").is_none());
    }

    #[test]
    fn case_insensitive_matching() {
        let types = ParamTypes::new();
        let config = MatcherConfig {
            case_insensitive: true,
            ..MatcherConfig::default()
        };
        let m = UrlMatcher::compile("/About", &types, &config, &HashMap::new()).unwrap();
        assert!(m.exec("/about", &HashMap::new(), "").is_some());
    }

    #[test]
    fn append_concatenates_paths_and_params() {
        let parent = compile("/users/:userId");
        let child = compile("/posts/:postId");
        let joined = parent.append(&child).unwrap();
        let params = exec(&joined, "/users/7/posts/9").unwrap();
        assert_eq!(params["userId"], json!("7"));
        assert_eq!(params["postId"], json!("9"));
    }

    #[test]
    fn append_is_associative() {
        let a = compile("/a/:x");
        let b = compile("/b/:y");
        let c = compile("/c/:z");
        let left = a.append(&b).unwrap().append(&c).unwrap();
        let right = a.append(&b.append(&c).unwrap()).unwrap();
        for path in ["/a/1/b/2/c/3", "/a/1/b/2", "/nope"] {
            assert_eq!(
                exec(&left, path).is_some(),
                exec(&right, path).is_some(),
                "paths disagree on {path}"
            );
        }
        let params = exec(&right, "/a/1/b/2/c/3").unwrap();
        assert_eq!(params["z"], json!("3"));
    }

    #[test]
    fn append_rejects_duplicate_param() {
        let parent = compile("/users/:id");
        let child = compile("/posts/:id");
        assert!(matches!(
            parent.append(&child),
            Err(UrlError::DuplicateParam { param, .. }) if param == "id"
        ));
    }

    #[test]
    fn specificity_static_beats_param() {
        let static_m = compile("/foo/:p1/AAA");
        let param_m = compile("/foo/:p1/:p2");
        assert_eq!(UrlMatcher::compare(&static_m, &param_m), Ordering::Less);
        assert_eq!(UrlMatcher::compare(&param_m, &static_m), Ordering::Greater);
    }

    #[test]
    fn specificity_deeper_wins() {
        let deep = compile("/a/b/c");
        let shallow = compile("/a/b");
        assert_eq!(UrlMatcher::compare(&deep, &shallow), Ordering::Less);
    }

    #[test]
    fn specificity_query_count_breaks_ties() {
        let more = compile("/a?x&y");
        let fewer = compile("/a?x");
        assert_eq!(UrlMatcher::compare(&more, &fewer), Ordering::Less);
    }

    #[test]
    fn array_path_param_joins_with_dash() {
        let decls = HashMap::from([(String::from("ids"), ParamDeclaration::new().array(ArrayMode::On))]);
        let m = compile_with("/multi/:ids", decls);
        let url = m
            .format(&HashMap::from([(String::from("ids"), json!(["a", "b-c"]))]))
            .unwrap();
        assert_eq!(url, "/multi/a-b%5C%2Dc");
        let params = exec(&m, "/multi/a-b%5C%2Dc").unwrap();
        assert_eq!(params["ids"], json!(["a", "b-c"]));
    }

    #[test]
    fn hash_param_attached_by_root() {
        let types = ParamTypes::new();
        let config = MatcherConfig::default();
        let root = UrlMatcher::root(&types, &config);
        let child = compile("/inbox");
        let m = root.append(&child).unwrap();
        let params = m.exec("/inbox", &HashMap::new(), "message-3").unwrap();
        assert_eq!(params["#"], json!("message-3"));
        let url = m
            .format(&HashMap::from([
                (String::from("#"), json!("message-3")),
            ]))
            .unwrap();
        assert_eq!(url, "/inbox#message-3");
    }

    #[test]
    fn format_rejects_invalid_values() {
        let m = compile("/posts/{id:int}");
        assert!(m
            .format(&HashMap::from([(String::from("id"), json!("abc"))]))
            .is_none());
    }

    #[test]
    fn validates_checks_all_params() {
        let m = compile("/posts/{id:int}?{page:int}");
        assert!(m.validates(&HashMap::from([
            (String::from("id"), json!(1)),
            (String::from("page"), json!(2)),
        ])));
        assert!(!m.validates(&HashMap::from([(String::from("id"), json!("x"))])));
    }
}
