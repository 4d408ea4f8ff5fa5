//! Parser for `.mosaic` page, layout and component sources.
//!
//! Sources are line oriented. Plain lines are emitted as they are, with
//! `{{ expr }}` (escaped) and `{{{ expr }}}` (raw) interpolation. A line whose
//! first non-blank characters are `@` is a directive; `@@` escapes a literal
//! `@`.
//!
//! ```text
//! @layout main
//!   @push title
//! Posts
//!   @end
//!   @each post in posts.published order published_at desc limit 5
//!     @comp card title=post.title href=post.url
//!   @end
//! @end
//! ```

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use mosaic_data::Value;
use mosaic_render::{Breakpoint, MAIN_SLOT};
use thiserror::Error;

/// Script parse or evaluation error, located by file and line.
#[derive(Debug, Error)]
#[error("{path}:{line}: {message}")]
pub struct ScriptError {
    pub path: String,
    pub line: usize,
    pub message: String,
}

impl ScriptError {
    pub fn new(path: &Path, line: usize, message: impl Into<String>) -> Self {
        Self {
            path: path.display().to_string(),
            line,
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, ScriptError>;

/// A parsed source file.
#[derive(Debug, Clone)]
pub struct Script {
    path: PathBuf,
    nodes: Vec<Node>,
}

impl Script {
    /// Read and parse a source file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .map_err(|e| ScriptError::new(path, 0, format!("could not be read: {e}")))?;
        Self::parse(path, &source)
    }

    /// Parse source text. `path` is only used for error locations.
    pub fn parse(path: &Path, source: &str) -> Result<Self> {
        let lines: Vec<&str> = source.lines().collect();
        let mut parser = Parser {
            path,
            lines: &lines,
            pos: 0,
        };
        let (nodes, end) = parser.block(&[])?;
        if let Some((keyword, line)) = end {
            return Err(ScriptError::new(path, line, format!("unexpected @{keyword}")));
        }
        Ok(Self {
            path: path.to_path_buf(),
            nodes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Whether any `@paginate` block appears in the script.
    pub fn paginates(&self) -> bool {
        fn walk(nodes: &[Node]) -> bool {
            nodes.iter().any(|node| match node {
                Node::Paginate { .. } => true,
                Node::Layout { body, .. }
                | Node::Push { body, .. }
                | Node::Each { body, .. } => walk(body),
                Node::Comp {
                    body: Some(body), ..
                } => walk(body),
                Node::If {
                    then, otherwise, ..
                } => walk(then) || walk(otherwise),
                _ => false,
            })
        }
        walk(&self.nodes)
    }
}

/// One statement of a script.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text {
        line: usize,
        parts: Vec<Part>,
    },
    Layout {
        line: usize,
        name: String,
        body: Vec<Node>,
    },
    Push {
        line: usize,
        slot: String,
        body: Vec<Node>,
    },
    Pull {
        slot: String,
    },
    PullStyles,
    PullExternalStyles,
    Comp {
        line: usize,
        name: String,
        args: Vec<(String, Expr)>,
        /// Content block, present when the call ends with `do`.
        body: Option<Vec<Node>>,
    },
    Styles {
        scoped: bool,
        rules: Vec<StyleRule>,
    },
    Each {
        line: usize,
        var: String,
        source: Source,
        body: Vec<Node>,
    },
    Paginate {
        line: usize,
        var: String,
        source: Source,
        per_page: usize,
        body: Vec<Node>,
    },
    If {
        line: usize,
        negate: bool,
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// Piece of a text line.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Literal(String),
    Escaped(Expr),
    Raw(Expr),
}

/// Value expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Dotted lookup through the scope, e.g. `post.author.name`.
    Path(Vec<String>),
    /// Public URL of a domain asset, `asset:images/logo.png`.
    Asset(String),
    /// Absolute URL of a domain asset under the site base URL,
    /// `asset_url:images/logo.png`.
    AssetUrl(String),
    /// Quoted string, number, `true`, `false` or `null`.
    Literal(Value),
}

impl Expr {
    /// Parse one expression token.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(asset) = text.strip_prefix("asset_url:") {
            return Some(Self::AssetUrl(asset.trim().to_string()));
        }
        if let Some(asset) = text.strip_prefix("asset:") {
            return Some(Self::Asset(asset.trim().to_string()));
        }
        if let Some(inner) = text
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            return Some(Self::Literal(Value::String(inner.replace("\\\"", "\""))));
        }
        match text {
            "true" => return Some(Self::Literal(Value::Bool(true))),
            "false" => return Some(Self::Literal(Value::Bool(false))),
            "null" => return Some(Self::Literal(Value::Null)),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            return Some(Self::Literal(Value::Int(i)));
        }
        if text.starts_with(|c: char| c.is_ascii_digit() || c == '-')
            && let Ok(f) = text.parse::<f64>()
        {
            return Some(Self::Literal(Value::Float(f)));
        }
        let segments: Vec<String> = text.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| !is_identifier(s)) {
            return None;
        }
        Some(Self::Path(segments))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(segments) => f.write_str(&segments.join(".")),
            Self::Asset(path) => write!(f, "asset:{path}"),
            Self::AssetUrl(path) => write!(f, "asset_url:{path}"),
            Self::Literal(value) => write!(f, "{}", value.to_json()),
        }
    }
}

/// Rule inside a `@styles` block.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleRule {
    Base(String),
    At(Breakpoint, String),
}

/// Where an `@each` or `@paginate` block reads its items from.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// Scope variable path, or model name followed by scope names.
    pub path: Vec<String>,
    pub clauses: Vec<Clause>,
}

/// Query clause of a source.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Where { field: String, op: Op, value: Expr },
    Order { field: String, desc: bool },
    Limit(usize),
    Offset(usize),
}

/// Comparison operator of a `where` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
}

impl Op {
    fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "=" | "==" => Self::Eq,
            "!=" => Self::Ne,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "<" => Self::Lt,
            "<=" => Self::Le,
            "~" => Self::Contains,
            _ => return None,
        })
    }
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Split on whitespace, keeping double-quoted runs together.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if quoted && chars.peek() == Some(&'"') => {
                current.push('\\');
                current.push('"');
                chars.next();
            }
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Split off `n` leading words, returning them and the trimmed remainder.
fn leading_words(text: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut rest = text.trim_start();
    let mut words = Vec::with_capacity(n);
    for _ in 0..n {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        words.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Some((words, rest.trim_end()))
}

struct Parser<'a> {
    path: &'a Path,
    lines: &'a [&'a str],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, line: usize, message: impl Into<String>) -> ScriptError {
        ScriptError::new(self.path, line, message)
    }

    /// Parse statements until one of `terminators` (or end of input).
    /// Returns the nodes and the terminator that stopped the block.
    fn block(&mut self, terminators: &[&str]) -> Result<(Vec<Node>, Option<(String, usize)>)> {
        let mut nodes = Vec::new();

        while self.pos < self.lines.len() {
            let line_no = self.pos + 1;
            let raw = self.lines[self.pos];
            self.pos += 1;
            let trimmed = raw.trim_start();

            if trimmed.starts_with("@@") {
                let indent = &raw[..raw.len() - trimmed.len()];
                let text = format!("{indent}{}", &trimmed[1..]);
                nodes.push(self.text(line_no, &text)?);
                continue;
            }

            let Some(directive) = trimmed.strip_prefix('@') else {
                nodes.push(self.text(line_no, raw)?);
                continue;
            };

            let directive = directive.trim_end();
            let (keyword, rest) = directive
                .split_once(char::is_whitespace)
                .map_or((directive, ""), |(k, r)| (k, r.trim()));

            if terminators.contains(&keyword) {
                return Ok((nodes, Some((keyword.to_string(), line_no))));
            }

            let node = match keyword {
                "layout" => Node::Layout {
                    line: line_no,
                    name: self.name(line_no, keyword, rest)?,
                    body: self.body(line_no, keyword)?,
                },
                "push" => Node::Push {
                    line: line_no,
                    slot: self.name(line_no, keyword, rest)?,
                    body: self.body(line_no, keyword)?,
                },
                "pull" => Node::Pull {
                    slot: if rest.is_empty() {
                        MAIN_SLOT.to_string()
                    } else {
                        self.name(line_no, keyword, rest)?
                    },
                },
                "pull_styles" => Node::PullStyles,
                "pull_external_styles" => Node::PullExternalStyles,
                "comp" => self.comp(line_no, rest)?,
                "styles" => self.styles(line_no, rest)?,
                "each" => {
                    let (var, source, per_page) = self.loop_header(line_no, keyword, rest)?;
                    if per_page.is_some() {
                        return Err(self.error(line_no, "@each does not take 'per'"));
                    }
                    Node::Each {
                        line: line_no,
                        var,
                        source,
                        body: self.body(line_no, keyword)?,
                    }
                }
                "paginate" => {
                    let (var, source, per_page) = self.loop_header(line_no, keyword, rest)?;
                    let per_page = per_page
                        .ok_or_else(|| self.error(line_no, "@paginate requires 'per N'"))?;
                    Node::Paginate {
                        line: line_no,
                        var,
                        source,
                        per_page,
                        body: self.body(line_no, keyword)?,
                    }
                }
                "if" | "unless" => self.conditional(line_no, keyword, rest)?,
                "end" | "else" => {
                    return Err(self.error(line_no, format!("unexpected @{keyword}")));
                }
                other => return Err(self.error(line_no, format!("unknown directive @{other}"))),
            };
            nodes.push(node);
        }

        Ok((nodes, None))
    }

    /// Body of a block directive, closed by `@end`.
    fn body(&mut self, line: usize, keyword: &str) -> Result<Vec<Node>> {
        match self.block(&["end"])? {
            (nodes, Some(_)) => Ok(nodes),
            (_, None) => Err(self.error(line, format!("@{keyword} is missing its @end"))),
        }
    }

    fn name(&self, line: usize, keyword: &str, rest: &str) -> Result<String> {
        if is_identifier(rest) {
            Ok(rest.to_string())
        } else {
            Err(self.error(line, format!("@{keyword} expects a name, got '{rest}'")))
        }
    }

    fn text(&self, line: usize, raw: &str) -> Result<Node> {
        let mut parts = Vec::new();
        let mut rest = raw;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                parts.push(Part::Literal(rest[..start].to_string()));
            }
            let (close, raw_output) = if rest[start..].starts_with("{{{") {
                ("}}}", true)
            } else {
                ("}}", false)
            };
            let inner_start = start + close.len();
            let Some(len) = rest[inner_start..].find(close) else {
                return Err(self.error(line, format!("unclosed interpolation, expected '{close}'")));
            };
            let inner = &rest[inner_start..inner_start + len];
            let expr = Expr::parse(inner)
                .ok_or_else(|| self.error(line, format!("invalid expression '{}'", inner.trim())))?;
            parts.push(if raw_output {
                Part::Raw(expr)
            } else {
                Part::Escaped(expr)
            });
            rest = &rest[inner_start + len + close.len()..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Node::Text { line, parts })
    }

    fn comp(&mut self, line: usize, rest: &str) -> Result<Node> {
        let mut tokens = tokenize(rest);
        let has_body = tokens.len() > 1 && tokens.last().is_some_and(|t| t == "do");
        if has_body {
            tokens.pop();
        }
        let Some((name, args)) = tokens.split_first() else {
            return Err(self.error(line, "@comp expects a component name"));
        };
        if !is_identifier(name) {
            return Err(self.error(line, format!("invalid component name '{name}'")));
        }

        let args = args
            .iter()
            .map(|token| {
                let (key, value) = token
                    .split_once('=')
                    .ok_or_else(|| self.error(line, format!("expected key=value, got '{token}'")))?;
                let expr = Expr::parse(value)
                    .ok_or_else(|| self.error(line, format!("invalid value for {key}: '{value}'")))?;
                Ok((key.to_string(), expr))
            })
            .collect::<Result<_>>()?;
        let body = if has_body {
            Some(self.body(line, "comp")?)
        } else {
            None
        };

        Ok(Node::Comp {
            line,
            name: name.clone(),
            args,
            body,
        })
    }

    fn styles(&mut self, line: usize, rest: &str) -> Result<Node> {
        let scoped = match rest {
            "" => false,
            "scoped" => true,
            other => return Err(self.error(line, format!("unexpected '{other}' after @styles"))),
        };

        let mut rules = Vec::new();
        while self.pos < self.lines.len() {
            let line_no = self.pos + 1;
            let text = self.lines[self.pos].trim();
            self.pos += 1;

            if text.is_empty() {
                continue;
            }
            let Some(directive) = text.strip_prefix('@') else {
                rules.push(StyleRule::Base(text.to_string()));
                continue;
            };
            if directive == "end" {
                return Ok(Node::Styles { scoped, rules });
            }
            rules.push(self.breakpoint_rule(line_no, directive)?);
        }

        Err(self.error(line, "@styles is missing its @end"))
    }

    fn breakpoint_rule(&self, line: usize, directive: &str) -> Result<StyleRule> {
        let (keyword, rest) = directive
            .split_once(char::is_whitespace)
            .unwrap_or((directive, ""));

        let (arity, named) = match keyword {
            "media_min" | "media_max" | "container_min" | "container_max" => (1, false),
            "media_minmax" | "container_minmax" => (2, false),
            "named_container_min" | "named_container_max" => (1, true),
            "named_container_minmax" => (2, true),
            other => return Err(self.error(line, format!("unknown style directive @{other}"))),
        };
        let words = arity + usize::from(named);
        let (args, rule) = leading_words(rest, words)
            .filter(|(_, rule)| !rule.is_empty())
            .ok_or_else(|| self.error(line, format!("@{keyword} expects {words} argument(s) and a rule")))?;

        let (name, widths) = if named {
            (args[0].to_string(), &args[1..])
        } else {
            (String::new(), &args[..])
        };
        let widths = widths
            .iter()
            .map(|w| {
                w.trim_end_matches("px")
                    .parse::<u32>()
                    .map_err(|_| self.error(line, format!("invalid width '{w}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        let breakpoint = match (keyword, widths.as_slice()) {
            ("media_min", [w]) => Breakpoint::MediaMin(*w),
            ("media_max", [w]) => Breakpoint::MediaMax(*w),
            ("media_minmax", [a, b]) => Breakpoint::MediaRange(*a, *b),
            ("container_min", [w]) => Breakpoint::ContainerMin(*w),
            ("container_max", [w]) => Breakpoint::ContainerMax(*w),
            ("container_minmax", [a, b]) => Breakpoint::ContainerRange(*a, *b),
            ("named_container_min", [w]) => Breakpoint::NamedMin(name, *w),
            ("named_container_max", [w]) => Breakpoint::NamedMax(name, *w),
            ("named_container_minmax", [a, b]) => Breakpoint::NamedRange(name, *a, *b),
            _ => return Err(self.error(line, format!("malformed @{keyword}"))),
        };
        Ok(StyleRule::At(breakpoint, rule.to_string()))
    }

    /// `VAR in SOURCE [per N] [clauses]`
    fn loop_header(
        &self,
        line: usize,
        keyword: &str,
        rest: &str,
    ) -> Result<(String, Source, Option<usize>)> {
        let tokens = tokenize(rest);
        let (var, source) = match tokens.as_slice() {
            [var, kw_in, source, ..] if kw_in == "in" => (var, source),
            _ => {
                return Err(self.error(line, format!("expected '@{keyword} VAR in SOURCE'")));
            }
        };
        if !is_identifier(var) {
            return Err(self.error(line, format!("invalid loop variable '{var}'")));
        }
        let path: Vec<String> = source.split('.').map(str::to_string).collect();
        if path.iter().any(|s| !is_identifier(s)) {
            return Err(self.error(line, format!("invalid source '{source}'")));
        }

        let mut clauses = Vec::new();
        let mut per_page = None;
        let mut it = tokens[3..].iter();
        while let Some(token) = it.next() {
            let mut next = |what: &str| {
                it.next()
                    .cloned()
                    .ok_or_else(|| self.error(line, format!("'{token}' expects {what}")))
            };
            match token.as_str() {
                "where" => {
                    let field = next("a field")?;
                    let op = next("an operator")?;
                    let value = next("a value")?;
                    let op = Op::parse(&op)
                        .ok_or_else(|| self.error(line, format!("unknown operator '{op}'")))?;
                    let value = Expr::parse(&value)
                        .ok_or_else(|| self.error(line, format!("invalid value '{value}'")))?;
                    clauses.push(Clause::Where { field, op, value });
                }
                "order" => {
                    let field = next("a field")?;
                    clauses.push(Clause::Order { field, desc: false });
                }
                "desc" | "asc" => match clauses.last_mut() {
                    Some(Clause::Order { desc, .. }) => *desc = token == "desc",
                    _ => return Err(self.error(line, format!("'{token}' must follow 'order'"))),
                },
                "limit" | "offset" | "per" => {
                    let n = next("a number")?;
                    let n: usize = n
                        .parse()
                        .map_err(|_| self.error(line, format!("invalid number '{n}'")))?;
                    match token.as_str() {
                        "limit" => clauses.push(Clause::Limit(n)),
                        "offset" => clauses.push(Clause::Offset(n)),
                        _ => per_page = Some(n),
                    }
                }
                other => return Err(self.error(line, format!("unexpected '{other}'"))),
            }
        }

        Ok((var.clone(), Source { path, clauses }, per_page))
    }

    fn conditional(&mut self, line: usize, keyword: &str, rest: &str) -> Result<Node> {
        let cond = Expr::parse(rest)
            .ok_or_else(|| self.error(line, format!("@{keyword} expects an expression")))?;
        let (then, end) = self.block(&["else", "end"])?;
        let otherwise = match end {
            Some((kw, _)) if kw == "else" => self.body(line, keyword)?,
            Some(_) => Vec::new(),
            None => return Err(self.error(line, format!("@{keyword} is missing its @end"))),
        };
        Ok(Node::If {
            line,
            negate: keyword == "unless",
            cond,
            then,
            otherwise,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Script {
        Script::parse(Path::new("test.mosaic"), source).unwrap()
    }

    fn parse_err(source: &str) -> ScriptError {
        Script::parse(Path::new("test.mosaic"), source).unwrap_err()
    }

    #[test]
    fn test_text_interpolation() {
        let script = parse("<h1>{{ post.title }}</h1>{{{ body }}}");
        assert_eq!(
            script.nodes(),
            [Node::Text {
                line: 1,
                parts: vec![
                    Part::Literal("<h1>".into()),
                    Part::Escaped(Expr::Path(vec!["post".into(), "title".into()])),
                    Part::Literal("</h1>".into()),
                    Part::Raw(Expr::Path(vec!["body".into()])),
                ],
            }]
        );
    }

    #[test]
    fn test_escaped_at() {
        let script = parse("  @@media print");
        assert_eq!(
            script.nodes(),
            [Node::Text {
                line: 1,
                parts: vec![Part::Literal("  @media print".into())],
            }]
        );
    }

    #[test]
    fn test_nested_blocks() {
        let script = parse(
            "@layout main\n@push title\nHi\n@end\n@each p in posts where draft = false order date desc limit 3\n@comp card title=p.title label=\"Read more\" n=2\n@end\n@end\n",
        );
        let [Node::Layout { name, body, .. }] = script.nodes() else {
            panic!("expected one layout node");
        };
        assert_eq!(name, "main");
        assert!(matches!(&body[0], Node::Push { slot, .. } if slot == "title"));

        let Node::Each { var, source, body, .. } = &body[1] else {
            panic!("expected each");
        };
        assert_eq!(var, "p");
        assert_eq!(source.path, ["posts"]);
        assert_eq!(
            source.clauses,
            [
                Clause::Where {
                    field: "draft".into(),
                    op: Op::Eq,
                    value: Expr::Literal(Value::Bool(false)),
                },
                Clause::Order {
                    field: "date".into(),
                    desc: true,
                },
                Clause::Limit(3),
            ]
        );
        assert_eq!(
            body[0],
            Node::Comp {
                line: 6,
                name: "card".into(),
                args: vec![
                    ("title".into(), Expr::Path(vec!["p".into(), "title".into()])),
                    ("label".into(), Expr::Literal(Value::from("Read more"))),
                    ("n".into(), Expr::Literal(Value::Int(2))),
                ],
                body: None,
            }
        );
    }

    #[test]
    fn test_comp_with_content_block() {
        let script = parse("@comp panel title=\"Hi\" do
<p>{{ body }}</p>
@end
after");
        let [Node::Comp { name, args, body, .. }, Node::Text { line: 4, .. }] = script.nodes()
        else {
            panic!("expected comp followed by text");
        };
        assert_eq!(name, "panel");
        assert_eq!(args.len(), 1);
        assert!(matches!(body.as_deref(), Some([Node::Text { line: 2, .. }])));

        let err = parse_err("@comp panel do
<p>open");
        assert!(err.message.contains("@comp is missing its @end"));
    }

    #[test]
    fn test_styles_block() {
        let script = parse(
            "@styles scoped\n.card { padding: 1rem; }\n@media_min 768 .card { padding: 2rem; }\n@named_container_max sidebar 400px .card { display: none; }\n@end",
        );
        assert_eq!(
            script.nodes(),
            [Node::Styles {
                scoped: true,
                rules: vec![
                    StyleRule::Base(".card { padding: 1rem; }".into()),
                    StyleRule::At(
                        Breakpoint::MediaMin(768),
                        ".card { padding: 2rem; }".into()
                    ),
                    StyleRule::At(
                        Breakpoint::NamedMax("sidebar".into(), 400),
                        ".card { display: none; }".into()
                    ),
                ],
            }]
        );
    }

    #[test]
    fn test_paginate_and_conditionals() {
        let script = parse(
            "@paginate page in posts.published per 5\n@if page.prev_url\nprev\n@else\nfirst\n@end\n@end",
        );
        assert!(script.paginates());
        let [Node::Paginate {
            per_page, body, source, ..
        }] = script.nodes()
        else {
            panic!("expected paginate");
        };
        assert_eq!(*per_page, 5);
        assert_eq!(source.path, ["posts", "published"]);
        assert!(matches!(&body[0], Node::If { otherwise, .. } if otherwise.len() == 1));
    }

    #[test]
    fn test_pull_defaults_to_main() {
        let script = parse("@pull\n@pull sidebar\n@pull_styles");
        assert_eq!(
            script.nodes(),
            [
                Node::Pull {
                    slot: "main".into()
                },
                Node::Pull {
                    slot: "sidebar".into()
                },
                Node::PullStyles,
            ]
        );
    }

    #[test]
    fn test_errors_carry_line() {
        let err = parse_err("ok\n@layout main\nno end");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("missing its @end"));

        let err = parse_err("@frobnicate");
        assert!(err.to_string().starts_with("test.mosaic:1:"));

        let err = parse_err("@end");
        assert!(err.message.contains("unexpected @end"));

        let err = parse_err("x {{ oops");
        assert!(err.message.contains("unclosed"));

        let err = parse_err("@paginate p in posts\n@end");
        assert!(err.message.contains("per N"));
    }

    #[test]
    fn test_expr_parse() {
        assert_eq!(Expr::parse("asset:img/a.png"), Some(Expr::Asset("img/a.png".into())));
        assert_eq!(
            Expr::parse("asset_url:img/a.png"),
            Some(Expr::AssetUrl("img/a.png".into()))
        );
        assert_eq!(
            Expr::AssetUrl("img/a.png".into()).to_string(),
            "asset_url:img/a.png"
        );
        assert_eq!(Expr::parse("-1.5"), Some(Expr::Literal(Value::Float(-1.5))));
        assert_eq!(Expr::parse("\"a b\""), Some(Expr::Literal(Value::from("a b"))));
        assert_eq!(Expr::parse("a..b"), None);
    }

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize(r#"card title="Hello world" n=1"#),
            ["card", r#"title="Hello world""#, "n=1"]
        );
    }
}
