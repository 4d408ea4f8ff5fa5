//! Script evaluation against a render context.
//!
//! A [`Runtime`] holds what every script can read: the data store, the asset
//! manifest and the site settings. An [`Env`] is one execution of a script,
//! with its variable scopes and pagination mode.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    fmt,
    path::Path,
    rc::Rc,
};

use mosaic_data::{Condition, DataStore, Item, Matcher, Page, Query, Value};
use mosaic_render::{Args, RenderContext, RenderError, StyleBuilder, TemplateKind};
use tracing::warn;

use crate::{
    assets::AssetManifest,
    script::{Clause, Expr, Node, Op, Part, Script, ScriptError, Source, StyleRule},
};

type Result<T> = std::result::Result<T, RenderError>;

/// State shared by every script of a build.
#[derive(Debug)]
pub struct Runtime {
    pub store: RefCell<DataStore>,
    pub manifest: RefCell<AssetManifest>,
    pub site: Value,
}

impl Runtime {
    pub fn new(store: DataStore, site: Value) -> Self {
        Self {
            store: RefCell::new(store),
            manifest: RefCell::new(AssetManifest::new()),
            site,
        }
    }
}

/// A value bound in a script scope.
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Value),
    Item(Item),
    List(Vec<Binding>),
    Map(BTreeMap<String, Binding>),
}

impl Binding {
    fn null() -> Self {
        Self::Value(Value::Null)
    }

    /// Member access: map keys, item fields and methods, list helpers.
    fn get(&self, name: &str) -> mosaic_data::Result<Binding> {
        Ok(match self {
            Self::Value(Value::Map(map)) => map
                .get(name)
                .cloned()
                .map(Binding::Value)
                .unwrap_or_else(Binding::null),
            Self::Value(Value::Array(items)) => {
                let items: Vec<Binding> = items.iter().cloned().map(Binding::Value).collect();
                list_member(&items, name)
            }
            Self::Value(Value::String(s)) if matches!(name, "size" | "length") => {
                Binding::Value(Value::from(s.chars().count()))
            }
            Self::Value(_) => Binding::null(),
            Self::Item(item) => Binding::Value(item.lookup(name)?),
            Self::List(items) => list_member(items, name),
            Self::Map(map) => map.get(name).cloned().unwrap_or_else(Binding::null),
        })
    }

    fn is_truthy(&self) -> bool {
        match self {
            Self::Value(value) => value.is_truthy(),
            Self::Item(_) => true,
            Self::List(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
        }
    }

    /// Plain value view. Items become maps of their fields.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Item(item) => Value::Map(item.to_map()),
            Self::List(items) => Value::Array(items.iter().map(Binding::to_value).collect()),
            Self::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }

    /// Elements of a list-like binding.
    fn into_list(self) -> Vec<Binding> {
        match self {
            Self::List(items) => items,
            Self::Value(Value::Array(items)) => items.into_iter().map(Binding::Value).collect(),
            Self::Value(Value::Null) => Vec::new(),
            other => vec![other],
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            other => write!(f, "{}", other.to_value()),
        }
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

fn list_member(items: &[Binding], name: &str) -> Binding {
    match name {
        "size" | "count" | "length" => Binding::Value(Value::from(items.len())),
        "empty" => Binding::Value(Value::Bool(items.is_empty())),
        "first" => items.first().cloned().unwrap_or_else(Binding::null),
        "last" => items.last().cloned().unwrap_or_else(Binding::null),
        _ => name
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index).cloned())
            .unwrap_or_else(Binding::null),
    }
}

/// How `@paginate` blocks behave in this execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Record the page count and write nothing for the block.
    Capture,
    /// Evaluate the block for the given 1-based page.
    Render(usize),
}

enum Resolved {
    Query(Query),
    List(Vec<Binding>),
}

/// One execution of a script.
pub struct Env<'r> {
    runtime: &'r Runtime,
    path: &'r Path,
    domain: &'r str,
    url: String,
    scopes: Vec<HashMap<String, Binding>>,
    pagination: Pagination,
    paginated: bool,
    page_count: Option<usize>,
}

impl<'r> Env<'r> {
    /// Execution environment for a script at `path` in `domain`, served at `url`.
    pub fn new(runtime: &'r Runtime, path: &'r Path, domain: &'r str, url: impl Into<String>) -> Self {
        let url = url.into();
        let mut globals = HashMap::new();
        globals.insert("site".to_string(), Binding::Value(runtime.site.clone()));
        globals.insert("domain".to_string(), Binding::Value(Value::from(domain)));
        globals.insert("url".to_string(), Binding::Value(Value::from(url.as_str())));

        Self {
            runtime,
            path,
            domain,
            url,
            scopes: vec![globals],
            pagination: Pagination::Render(1),
            paginated: false,
            page_count: None,
        }
    }

    #[must_use]
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    /// Bind a variable in the outermost scope.
    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) {
        if let Some(globals) = self.scopes.first_mut() {
            globals.insert(name.into(), binding);
        }
    }

    /// Bind every template argument as a variable.
    pub fn bind_args(&mut self, args: &Args) {
        for (name, value) in args.iter() {
            self.bind(name.clone(), Binding::Value(Value::from(value.clone())));
        }
    }

    /// Page count recorded by the first `@paginate` block in capture mode.
    pub fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    /// Execute a whole script.
    pub fn run(&mut self, script: &Script, ctx: &mut RenderContext<'_>) -> Result<()> {
        self.exec(script.nodes(), ctx)
    }

    fn exec(&mut self, nodes: &[Node], ctx: &mut RenderContext<'_>) -> Result<()> {
        for node in nodes {
            self.exec_node(node, ctx)?;
        }
        Ok(())
    }

    fn exec_node(&mut self, node: &Node, ctx: &mut RenderContext<'_>) -> Result<()> {
        match node {
            Node::Text { line, parts } => {
                for part in parts {
                    match part {
                        Part::Literal(text) => {
                            ctx.raw(text);
                        }
                        Part::Escaped(expr) => {
                            let value = self.eval(expr, *line)?;
                            ctx.text(&value.to_string());
                        }
                        Part::Raw(expr) => {
                            let value = self.eval(expr, *line)?;
                            ctx.raw(&value.to_string());
                        }
                    }
                }
                ctx.raw("\n");
            }
            Node::Layout { name, body, .. } => {
                ctx.layout(name, |ctx| self.exec(body, ctx))?;
            }
            Node::Push { slot, body, .. } => {
                ctx.push(slot, |ctx| self.exec(body, ctx))?;
            }
            Node::Pull { slot } => {
                ctx.pull(slot);
            }
            Node::PullStyles => {
                ctx.pull_styles();
            }
            Node::PullExternalStyles => {
                ctx.pull_external_styles();
            }
            Node::Comp {
                line,
                name,
                args,
                body,
            } => {
                let mut values = Args::new();
                for (key, expr) in args {
                    values.insert(key.clone(), self.eval(expr, *line)?.to_value().to_json());
                }
                match body {
                    Some(body) => {
                        ctx.component_with_content(name, &values, |ctx| self.exec(body, ctx))?
                    }
                    None => ctx.component(name, &values)?,
                }
            }
            Node::Styles { scoped, rules } => {
                ctx.styles(*scoped, |builder| apply_rules(builder, rules));
            }
            Node::Each {
                line,
                var,
                source,
                body,
            } => {
                let items: Vec<Binding> = match self.resolve(source, *line, ctx)? {
                    Resolved::Query(query) => query.all().into_iter().map(Binding::Item).collect(),
                    Resolved::List(items) => items,
                };
                let total = items.len();
                for (index, item) in items.into_iter().enumerate() {
                    let mut scope = HashMap::new();
                    scope.insert(var.clone(), item);
                    scope.insert("loop".to_string(), loop_info(index, total));
                    self.scopes.push(scope);
                    let result = self.exec(body, ctx);
                    self.scopes.pop();
                    result?;
                }
            }
            Node::Paginate {
                line,
                var,
                source,
                per_page,
                body,
            } => {
                if self.paginated {
                    warn!(
                        path = %self.path.display(),
                        line,
                        "only the first @paginate block of a page is used"
                    );
                    return Ok(());
                }
                self.paginated = true;

                let pages = self.pages(source, *per_page, *line, ctx)?;
                match self.pagination {
                    Pagination::Capture => self.page_count = Some(pages.len()),
                    Pagination::Render(number) => {
                        let page = pages
                            .into_iter()
                            .nth(number.saturating_sub(1))
                            .unwrap_or_else(|| Binding::Map(BTreeMap::new()));
                        let mut scope = HashMap::new();
                        scope.insert(var.clone(), page);
                        self.scopes.push(scope);
                        let result = self.exec(body, ctx);
                        self.scopes.pop();
                        result?;
                    }
                }
            }
            Node::If {
                line,
                negate,
                cond,
                then,
                otherwise,
            } => {
                let truthy = self.eval(cond, *line)?.is_truthy();
                if truthy != *negate {
                    self.exec(then, ctx)?;
                } else {
                    self.exec(otherwise, ctx)?;
                }
            }
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr, line: usize) -> Result<Binding> {
        match expr {
            Expr::Literal(value) => Ok(Binding::Value(value.clone())),
            Expr::Asset(name) => Ok(Binding::Value(Value::from(
                self.runtime.manifest.borrow().url_for(self.domain, name, None),
            ))),
            Expr::AssetUrl(name) => {
                let base = self.runtime.site.get("base_url").and_then(Value::as_str);
                Ok(Binding::Value(Value::from(
                    self.runtime
                        .manifest
                        .borrow()
                        .url_for(self.domain, name, base.or(Some(""))),
                )))
            }
            Expr::Path(segments) => self.lookup(segments, line),
        }
    }

    fn lookup(&self, segments: &[String], line: usize) -> Result<Binding> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(Binding::null());
        };
        let Some(mut current) = self.variable(first).cloned() else {
            return Ok(Binding::null());
        };
        for segment in rest {
            current = current.get(segment).map_err(|e| self.fail(line, e))?;
        }
        Ok(current)
    }

    fn variable(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Resolve a loop source to a query or an in-memory list.
    fn resolve(
        &self,
        source: &Source,
        line: usize,
        ctx: &mut RenderContext<'_>,
    ) -> Result<Resolved> {
        let Some(model) = source.path.first() else {
            return Err(self.fail(line, "empty source"));
        };

        if self.variable(model).is_some() {
            let items = self.lookup(&source.path, line)?.into_list();
            return self.filter_list(items, &source.clauses, line).map(Resolved::List);
        }

        let mut query = self
            .runtime
            .store
            .borrow()
            .query(model)
            .map_err(|e| self.fail(line, e))?;
        ctx.note_data(model.clone());

        for scope in &source.path[1..] {
            query = query.scope(scope, &[]).map_err(|e| self.fail(line, e))?;
        }
        for clause in &source.clauses {
            query = match clause {
                Clause::Where { field, op, value } => {
                    let value = self.eval(value, line)?.to_value();
                    query.filter([(field.clone(), condition(*op, value))])
                }
                Clause::Order { field, desc } => query.order(field.clone(), *desc),
                Clause::Limit(n) => query.limit(*n),
                Clause::Offset(n) => query.offset(*n),
            };
        }
        Ok(Resolved::Query(query))
    }

    fn filter_list(
        &self,
        mut items: Vec<Binding>,
        clauses: &[Clause],
        line: usize,
    ) -> Result<Vec<Binding>> {
        let mut offset = 0;
        let mut limit = usize::MAX;

        for clause in clauses {
            match clause {
                Clause::Where { field, op, value } => {
                    let condition = condition(*op, self.eval(value, line)?.to_value());
                    let mut kept = Vec::with_capacity(items.len());
                    for item in items {
                        let field = item.get(field).map_err(|e| self.fail(line, e))?;
                        if condition.matches(&field.to_value()) {
                            kept.push(item);
                        }
                    }
                    items = kept;
                }
                Clause::Order { field, desc } => {
                    let mut keyed = Vec::with_capacity(items.len());
                    for item in items {
                        let key = item.get(field).map_err(|e| self.fail(line, e))?.to_value();
                        keyed.push((key, item));
                    }
                    let (mut present, missing): (Vec<_>, Vec<_>) =
                        keyed.into_iter().partition(|(key, _)| !key.is_null());
                    present.sort_by(|(a, _), (b, _)| a.rank_cmp(b));
                    if *desc {
                        present.reverse();
                    }
                    items = present
                        .into_iter()
                        .chain(missing)
                        .map(|(_, item)| item)
                        .collect();
                }
                Clause::Limit(n) => limit = *n,
                Clause::Offset(n) => offset = *n,
            }
        }

        Ok(items.into_iter().skip(offset).take(limit).collect())
    }

    /// Every page of a `@paginate` source, as bindings.
    fn pages(
        &self,
        source: &Source,
        per_page: usize,
        line: usize,
        ctx: &mut RenderContext<'_>,
    ) -> Result<Vec<Binding>> {
        let pages = match self.resolve(source, line, ctx)? {
            Resolved::Query(query) => query
                .paginate(per_page)
                .map_err(|e| self.fail(line, e))?
                .into_iter()
                .map(|page| {
                    let items: Vec<Binding> =
                        page.items.iter().cloned().map(Binding::Item).collect();
                    (page, items)
                })
                .collect::<Vec<_>>(),
            Resolved::List(items) => {
                if per_page == 0 {
                    return Err(self.fail(line, "per_page must be positive"));
                }
                let total_items = items.len();
                let total_pages = total_items.div_ceil(per_page).max(1);
                let mut chunks: Vec<Vec<Binding>> =
                    items.chunks(per_page).map(<[Binding]>::to_vec).collect();
                if chunks.is_empty() {
                    chunks.push(Vec::new());
                }
                chunks
                    .into_iter()
                    .enumerate()
                    .map(|(index, chunk)| {
                        (Page::new(Vec::new(), index + 1, total_pages, total_items), chunk)
                    })
                    .collect()
            }
        };

        Ok(pages
            .into_iter()
            .map(|(page, items)| self.page_binding(&page, items))
            .collect())
    }

    fn page_binding(&self, page: &Page, items: Vec<Binding>) -> Binding {
        let mut map: BTreeMap<String, Binding> = page
            .info()
            .into_iter()
            .map(|(k, v)| (k, Binding::Value(v)))
            .collect();
        map.insert("items".to_string(), Binding::List(items.clone()));
        map.insert("posts".to_string(), Binding::List(items));
        map.insert(
            "url".to_string(),
            Binding::Value(Value::from(page_url(&self.url, page.current_page))),
        );
        map.insert(
            "prev_url".to_string(),
            Binding::Value(
                page.prev_page
                    .map(|n| Value::from(page_url(&self.url, n)))
                    .unwrap_or_default(),
            ),
        );
        map.insert(
            "next_url".to_string(),
            Binding::Value(
                page.next_page
                    .map(|n| Value::from(page_url(&self.url, n)))
                    .unwrap_or_default(),
            ),
        );
        Binding::Map(map)
    }

    fn fail(&self, line: usize, error: impl fmt::Display) -> RenderError {
        RenderError::failed(ScriptError::new(self.path, line, error.to_string()))
    }
}

/// Public URL of page `number` of a paginated page served at `base`.
pub fn page_url(base: &str, number: usize) -> String {
    if number <= 1 {
        return base.to_string();
    }
    let base = base.trim_end_matches('/');
    format!("{base}/page-{number}/")
}

fn loop_info(index: usize, total: usize) -> Binding {
    let mut map = BTreeMap::new();
    map.insert("index".to_string(), Value::from(index + 1));
    map.insert("index0".to_string(), Value::from(index));
    map.insert("first".to_string(), Value::Bool(index == 0));
    map.insert("last".to_string(), Value::Bool(index + 1 == total));
    map.insert("length".to_string(), Value::from(total));
    Binding::Value(Value::Map(map))
}

fn condition(op: Op, value: Value) -> Condition {
    match op {
        Op::Eq => Condition::Equals(value),
        Op::Ne => Matcher::Not(value).into(),
        Op::Gt => Matcher::GreaterThan(value).into(),
        Op::Ge => Matcher::GreaterThanOrEqual(value).into(),
        Op::Lt => Matcher::LessThan(value).into(),
        Op::Le => Matcher::LessThanOrEqual(value).into(),
        Op::Contains => Matcher::Contains(value).into(),
    }
}

fn apply_rules(builder: &mut StyleBuilder, rules: &[StyleRule]) {
    for rule in rules {
        match rule {
            StyleRule::Base(css) => {
                builder.css(css.clone());
            }
            StyleRule::At(breakpoint, css) => {
                builder.at(breakpoint.clone(), css.clone());
            }
        }
    }
}

/// Register a component or layout script with the engine.
///
/// The template keeps the script and runtime alive; it runs in the domain the
/// script was found in.
pub fn define_template(
    engine: &mosaic_render::Engine,
    kind: TemplateKind,
    name: &str,
    script: Rc<Script>,
    runtime: Rc<Runtime>,
    domain: String,
) -> Result<()> {
    engine.define(kind, name, move |ctx, args| {
        let mut env = Env::new(&runtime, script.path(), &domain, "");
        env.bind_args(args);
        env.run(&script, ctx)
    })
}
