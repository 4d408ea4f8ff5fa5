//! Template registry and render cache.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    path::PathBuf,
    rc::Rc,
    sync::LazyLock,
};

use regex::{Captures, Regex};
use tracing::{debug, trace};

use crate::{
    context::{RenderContext, Usage},
    error::{RenderError, Result},
    styles::StyleRegistry,
    template::{Args, RenderFn, Template, TemplateId, TemplateKind},
};

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--(?:SLOT:([^>]*?)|(STYLES)|(EXTERNAL_STYLES))-->")
        .expect("valid marker pattern")
});

/// Output of a page or component render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub html: String,
    pub usage: Usage,
}

/// A layout compiled to a skeleton with slot and style markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledLayout {
    pub skeleton: String,
    /// Usage recorded while compiling, merged into every page using the layout.
    pub usage: Usage,
}

/// Render engine holding templates, memoized renders and styles.
///
/// The engine is single-threaded: renderers may call back into it (components
/// rendering components) and it uses interior mutability for that.
pub struct Engine {
    templates: RefCell<HashMap<TemplateId, Template>>,
    cache: RefCell<HashMap<(TemplateId, String), Rendered>>,
    styles: StyleRegistry,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("templates", &self.templates.borrow().len())
            .field("cached", &self.cache.borrow().len())
            .field("styles", &self.styles)
            .finish()
    }
}

impl Engine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: RefCell::new(HashMap::new()),
            cache: RefCell::new(HashMap::new()),
            styles: StyleRegistry::new(),
        }
    }

    /// Create an engine that writes external stylesheets into `dir`, linked
    /// under `url`.
    #[must_use]
    pub fn with_external_styles(dir: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        let engine = Self::new();
        engine.styles.set_external_target(dir, url);
        engine
    }

    /// Style registry of this engine.
    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    /// Register a template. Redefining a name replaces it and drops its
    /// memoized renders.
    ///
    /// Layouts are executed immediately to build their skeleton.
    pub fn define<F>(&self, kind: TemplateKind, name: &str, renderer: F) -> Result<()>
    where
        F: Fn(&mut RenderContext<'_>, &Args) -> Result<()> + 'static,
    {
        let id = TemplateId::new(kind, name);
        let template = match kind {
            TemplateKind::Page => Template::Page(Rc::new(renderer)),
            TemplateKind::Component => Template::Component(Rc::new(renderer)),
            TemplateKind::Layout => {
                let mut ctx = RenderContext::compiling_layout(self, id.clone());
                renderer(&mut ctx, &Args::new())?;
                let (skeleton, usage) = ctx.into_parts();
                Template::Layout(Rc::new(CompiledLayout { skeleton, usage }))
            }
        };

        debug!(id = %id, "defined template");
        self.cache.borrow_mut().retain(|(cached, _), _| *cached != id);
        self.templates.borrow_mut().insert(id, template);
        Ok(())
    }

    pub fn define_page<F>(&self, name: &str, renderer: F) -> Result<()>
    where
        F: Fn(&mut RenderContext<'_>, &Args) -> Result<()> + 'static,
    {
        self.define(TemplateKind::Page, name, renderer)
    }

    pub fn define_layout<F>(&self, name: &str, renderer: F) -> Result<()>
    where
        F: Fn(&mut RenderContext<'_>, &Args) -> Result<()> + 'static,
    {
        self.define(TemplateKind::Layout, name, renderer)
    }

    pub fn define_component<F>(&self, name: &str, renderer: F) -> Result<()>
    where
        F: Fn(&mut RenderContext<'_>, &Args) -> Result<()> + 'static,
    {
        self.define(TemplateKind::Component, name, renderer)
    }

    /// Whether a template with this kind and name exists.
    pub fn is_defined(&self, kind: TemplateKind, name: &str) -> bool {
        self.templates
            .borrow()
            .contains_key(&TemplateId::new(kind, name))
    }

    /// Render a template to HTML.
    ///
    /// A layout renders as its skeleton with every slot empty.
    pub fn render(&self, kind: TemplateKind, name: &str, args: &Args) -> Result<String> {
        if kind == TemplateKind::Layout {
            let layout = self.compiled_layout(name)?;
            return self.substitute(&layout.skeleton, &HashMap::new(), &layout.usage);
        }
        Ok(self.render_template(&TemplateId::new(kind, name), args)?.html)
    }

    pub fn render_page(&self, name: &str, args: &Args) -> Result<String> {
        self.render(TemplateKind::Page, name, args)
    }

    pub fn render_component(&self, name: &str, args: &Args) -> Result<String> {
        self.render(TemplateKind::Component, name, args)
    }

    /// Render a page or component through the cache, returning output and usage.
    ///
    /// A result is cached only after its renderer completes, so a failing
    /// render leaves no entry behind.
    pub fn render_template(&self, id: &TemplateId, args: &Args) -> Result<Rendered> {
        let key = (id.clone(), args.fingerprint());
        if let Some(hit) = self.cache.borrow().get(&key) {
            trace!(id = %id, "render cache hit");
            return Ok(hit.clone());
        }

        let renderer = self.renderer(id)?;
        let mut ctx = RenderContext::new(self, Some(id.clone()));
        renderer(&mut ctx, args)?;
        let (html, usage) = ctx.into_parts();

        let rendered = Rendered { html, usage };
        self.cache.borrow_mut().insert(key, rendered.clone());
        Ok(rendered)
    }

    /// Compiled skeleton of a layout.
    pub fn compiled_layout(&self, name: &str) -> Result<Rc<CompiledLayout>> {
        match self.templates.borrow().get(&TemplateId::layout(name)) {
            Some(Template::Layout(layout)) => Ok(Rc::clone(layout)),
            _ => Err(RenderError::not_found(TemplateKind::Layout, name)),
        }
    }

    fn renderer(&self, id: &TemplateId) -> Result<RenderFn> {
        match self.templates.borrow().get(id) {
            Some(Template::Page(f) | Template::Component(f)) => Ok(Rc::clone(f)),
            _ => Err(RenderError::not_found(id.kind(), id.name())),
        }
    }

    /// Replace every marker of `skeleton` in one pass.
    ///
    /// Inserted slot values are never rescanned, so markers inside slot content
    /// survive literally.
    pub(crate) fn substitute(
        &self,
        skeleton: &str,
        slots: &HashMap<String, String>,
        usage: &Usage,
    ) -> Result<String> {
        let styles = if skeleton.contains("<!--STYLES-->") {
            self.styles.render_consolidated_styles(&usage.styles)
        } else {
            String::new()
        };
        let external = if skeleton.contains("<!--EXTERNAL_STYLES-->") {
            self.styles.render_external_styles(&usage.styles)?
        } else {
            String::new()
        };

        let html = MARKER_RE.replace_all(skeleton, |caps: &Captures<'_>| {
            if let Some(slot) = caps.get(1) {
                slots.get(slot.as_str()).cloned().unwrap_or_default()
            } else if caps.get(2).is_some() {
                styles.clone()
            } else {
                external.clone()
            }
        });
        Ok(html.into_owned())
    }

    /// Drop memoized renders and compiled styles; templates stay registered.
    pub fn clear_caches(&self) {
        self.cache.borrow_mut().clear();
        self.styles.clear();
    }

    /// Drop everything, including registered templates.
    pub fn reset(&self) {
        self.clear_caches();
        self.templates.borrow_mut().clear();
    }
}
