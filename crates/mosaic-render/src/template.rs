//! Template identifiers, registry variants and render arguments.

use std::{collections::BTreeMap, fmt, rc::Rc};

use serde_json::{Map, Value};

use crate::{context::RenderContext, engine::CompiledLayout, error::Result};

/// Kind of a registered template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateKind {
    /// A top-level page.
    Page,
    /// A reusable skeleton with named slots.
    Layout,
    /// A reusable fragment, memoized per argument set.
    Component,
}

impl TemplateKind {
    /// Prefix used in template ids (`page_home`, `layout_main`, `comp_card`).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Layout => "layout",
            Self::Component => "comp",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Page => "page",
            Self::Layout => "layout",
            Self::Component => "component",
        })
    }
}

/// Qualified template name: kind plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId {
    kind: TemplateKind,
    name: String,
}

impl TemplateId {
    /// Create a new template id.
    pub fn new(kind: TemplateKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Id of a page template.
    pub fn page(name: impl Into<String>) -> Self {
        Self::new(TemplateKind::Page, name)
    }

    /// Id of a layout template.
    pub fn layout(name: impl Into<String>) -> Self {
        Self::new(TemplateKind::Layout, name)
    }

    /// Id of a component template.
    pub fn component(name: impl Into<String>) -> Self {
        Self::new(TemplateKind::Component, name)
    }

    /// Template kind.
    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// Bare template name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class name used to scope this template's styles (`comp_user_card` → `comp-user-card`).
    pub fn scope_class(&self) -> String {
        self.to_string().replace('_', "-")
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.prefix(), self.name)
    }
}

/// Renderer closure for pages and components.
pub type RenderFn = Rc<dyn Fn(&mut RenderContext<'_>, &Args) -> Result<()>>;

/// A registered template.
pub enum Template {
    /// Page renderer, invoked lazily per call.
    Page(RenderFn),
    /// Layout compiled eagerly at definition time.
    Layout(Rc<CompiledLayout>),
    /// Component renderer, invoked lazily per call.
    Component(RenderFn),
}

impl Template {
    /// Kind of this template.
    pub fn kind(&self) -> TemplateKind {
        match self {
            Self::Page(_) => TemplateKind::Page,
            Self::Layout(_) => TemplateKind::Layout,
            Self::Component(_) => TemplateKind::Component,
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layout(layout) => f.debug_tuple("Layout").field(layout).finish(),
            other => f.debug_tuple(&other.kind().to_string()).finish(),
        }
    }
}

/// Named arguments bound into a template execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Map<String, Value>,
}

impl Args {
    /// Create an empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert an argument.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get an argument value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get an argument as a string slice.
    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Iterate over the arguments.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Whether no arguments are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Structural fingerprint: canonical JSON with keys in sorted order.
    ///
    /// Equal argument sets always produce equal fingerprints regardless of
    /// insertion order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let sorted: BTreeMap<&String, &Value> = self.values.iter().collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = Self::new();
        for (key, value) in iter {
            args.insert(key, value);
        }
        args
    }
}
