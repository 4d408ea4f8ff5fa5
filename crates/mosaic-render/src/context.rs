//! Per-invocation render state.

use std::{
    collections::{BTreeSet, HashMap},
    mem,
};

use crate::{
    engine::Engine,
    error::Result,
    styles::StyleBuilder,
    template::{Args, TemplateId},
};

/// Slot filled by stray layout-block output.
pub const MAIN_SLOT: &str = "main";

/// Argument carrying the rendered content block of a component call.
pub const CONTENT_ARG: &str = "content";

const STYLES_MARKER: &str = "<!--STYLES-->";
const EXTERNAL_STYLES_MARKER: &str = "<!--EXTERNAL_STYLES-->";

/// What a render touched: components, layouts, data models and style owners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    /// Component names rendered, including nested ones.
    pub components: BTreeSet<String>,
    /// Layout names applied.
    pub layouts: BTreeSet<String>,
    /// Data model names read.
    pub data: BTreeSet<String>,
    /// Style owner ids whose compiled styles belong to the output.
    pub styles: BTreeSet<String>,
}

impl Usage {
    /// Fold another usage record into this one.
    pub fn merge(&mut self, other: &Usage) {
        self.components.extend(other.components.iter().cloned());
        self.layouts.extend(other.layouts.iter().cloned());
        self.data.extend(other.data.iter().cloned());
        self.styles.extend(other.styles.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
            && self.layouts.is_empty()
            && self.data.is_empty()
            && self.styles.is_empty()
    }
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// State of one page, layout or component execution.
///
/// A context is created per invocation and never shared; nested components get
/// their own context and hand back their usage when they finish.
pub struct RenderContext<'e> {
    engine: &'e Engine,
    owner: Option<TemplateId>,
    buffer: String,
    slots: HashMap<String, String>,
    usage: Usage,
    compiling_layout: bool,
}

impl<'e> RenderContext<'e> {
    /// Create a context rendering on behalf of `owner`.
    pub fn new(engine: &'e Engine, owner: Option<TemplateId>) -> Self {
        Self {
            engine,
            owner,
            buffer: String::with_capacity(1024),
            slots: HashMap::new(),
            usage: Usage::default(),
            compiling_layout: false,
        }
    }

    /// Create a context owned by the page `name`.
    pub fn for_page(engine: &'e Engine, name: impl Into<String>) -> Self {
        Self::new(engine, Some(TemplateId::page(name)))
    }

    pub(crate) fn compiling_layout(engine: &'e Engine, owner: TemplateId) -> Self {
        let mut ctx = Self::new(engine, Some(owner));
        ctx.compiling_layout = true;
        ctx
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// Id of the page or component this context renders for.
    pub fn owner(&self) -> Option<&TemplateId> {
        self.owner.as_ref()
    }

    /// Append markup verbatim.
    pub fn raw(&mut self, html: &str) -> &mut Self {
        self.buffer.push_str(html);
        self
    }

    /// Append HTML-escaped text.
    pub fn text(&mut self, text: &str) -> &mut Self {
        self.buffer.push_str(&escape_html(text));
        self
    }

    /// Capture everything `block` writes into the slot `name`.
    pub fn push<F>(&mut self, name: &str, block: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let outer = mem::take(&mut self.buffer);
        let result = block(self);
        let captured = mem::replace(&mut self.buffer, outer);
        result?;
        self.slots.insert(name.to_string(), captured);
        Ok(())
    }

    /// Emit a slot: a marker while compiling a layout, the slot's value otherwise.
    pub fn pull(&mut self, name: &str) -> &mut Self {
        if self.compiling_layout {
            self.buffer.push_str("<!--SLOT:");
            self.buffer.push_str(name);
            self.buffer.push_str("-->");
        } else if let Some(value) = self.slots.get(name) {
            self.buffer.push_str(value);
        }
        self
    }

    /// Mark where the consolidated stylesheet goes.
    pub fn pull_styles(&mut self) -> &mut Self {
        self.raw(STYLES_MARKER)
    }

    /// Mark where the external stylesheet link goes.
    pub fn pull_external_styles(&mut self) -> &mut Self {
        self.raw(EXTERNAL_STYLES_MARKER)
    }

    /// Current value of a slot.
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }

    /// Render a component through the cache and append its markup.
    pub fn component(&mut self, name: &str, args: &Args) -> Result<()> {
        let id = TemplateId::component(name);
        self.usage.components.insert(name.to_string());
        self.usage.styles.insert(id.to_string());

        let rendered = self.engine.render_template(&id, args)?;
        self.usage.merge(&rendered.usage);
        self.buffer.push_str(&rendered.html);
        Ok(())
    }

    /// Render a component with a content block.
    ///
    /// `content` runs in this context; its markup is handed to the component
    /// as the [`CONTENT_ARG`] argument, so it is part of the cache key.
    pub fn component_with_content<F>(&mut self, name: &str, args: &Args, content: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let outer = mem::take(&mut self.buffer);
        let result = content(self);
        let captured = mem::replace(&mut self.buffer, outer);
        result?;

        let args = args.clone().with(CONTENT_ARG, captured);
        self.component(name, &args)
    }

    /// Wrap the output of `content` in the layout `name`.
    ///
    /// `content` fills slots with [`push`](Self::push). Anything it writes
    /// outside a push becomes the `main` slot unless `main` was pushed.
    pub fn layout<F>(&mut self, name: &str, content: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let compiled = self.engine.compiled_layout(name)?;
        self.usage.layouts.insert(name.to_string());

        let outer = mem::take(&mut self.buffer);
        let result = content(self);
        let stray = mem::replace(&mut self.buffer, outer);
        result?;

        if !stray.trim().is_empty() && !self.slots.contains_key(MAIN_SLOT) {
            self.slots.insert(MAIN_SLOT.to_string(), stray);
        }

        self.usage.merge(&compiled.usage);
        let html = self
            .engine
            .substitute(&compiled.skeleton, &self.slots, &self.usage)?;
        self.buffer.push_str(&html);
        Ok(())
    }

    /// Declare styles for the owner of this context.
    ///
    /// The block runs once per owner; later calls only record the owner as used.
    pub fn styles<F>(&mut self, scoped: bool, block: F)
    where
        F: FnOnce(&mut StyleBuilder),
    {
        let Some(owner) = &self.owner else {
            return;
        };
        let owner_id = owner.to_string();
        let registry = self.engine.styles();

        if !registry.is_compiled(&owner_id) {
            let mut builder = StyleBuilder::new();
            block(&mut builder);
            let scope_class = scoped.then(|| owner.scope_class());
            registry.insert(owner_id.clone(), builder.compile(scope_class.as_deref()));
        }

        self.usage.styles.insert(owner_id);
    }

    /// Record that a data model was read.
    pub fn note_data(&mut self, model: impl Into<String>) {
        self.usage.data.insert(model.into());
    }

    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    pub fn merge_usage(&mut self, other: &Usage) {
        self.usage.merge(other);
    }

    /// Output written so far.
    pub fn output(&self) -> &str {
        &self.buffer
    }

    /// Consume the context, returning its output.
    pub fn finish(self) -> String {
        self.buffer
    }

    /// Consume the context, returning output and usage.
    pub fn into_parts(self) -> (String, Usage) {
        (self.buffer, self.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_push_and_pull() {
        let engine = Engine::new();
        let mut ctx = RenderContext::for_page(&engine, "home");
        ctx.raw("<p>");
        ctx.push("title", |c| {
            c.text("A & B");
            Ok(())
        })
        .unwrap();
        ctx.raw("</p>").pull("title").pull("missing");

        assert_eq!(ctx.slot("title"), Some("A &amp; B"));
        assert_eq!(ctx.finish(), "<p></p>A &amp; B");
    }

    #[test]
    fn test_push_failure_restores_buffer() {
        let engine = Engine::new();
        let mut ctx = RenderContext::new(&engine, None);
        ctx.raw("before");
        let result = ctx.push("x", |c| {
            c.raw("partial");
            Err(RenderError::failed("nope"))
        });

        assert!(result.is_err());
        assert_eq!(ctx.slot("x"), None);
        assert_eq!(ctx.output(), "before");
    }

    #[test]
    fn test_styles_without_owner_is_noop() {
        let engine = Engine::new();
        let mut ctx = RenderContext::new(&engine, None);
        ctx.styles(false, |s| {
            s.css(".x{}");
        });
        assert!(ctx.usage().is_empty());
        assert!(engine.styles().is_empty());
    }

    #[test]
    fn test_styles_compiled_once_per_owner() {
        let engine = Engine::new();
        let mut runs = 0;
        for _ in 0..2 {
            let mut ctx = RenderContext::for_page(&engine, "about");
            ctx.styles(true, |s| {
                runs += 1;
                s.css(".hero{}");
            });
            assert!(ctx.usage().styles.contains("page_about"));
        }

        assert_eq!(runs, 1);
        assert_eq!(
            engine.styles().get("page_about").unwrap().base(),
            [".page-about .hero{}"]
        );
    }

    #[test]
    fn test_usage_merge() {
        let mut a = Usage::default();
        a.components.insert("card".into());
        let mut b = Usage::default();
        b.data.insert("posts".into());
        b.components.insert("card".into());

        a.merge(&b);
        assert_eq!(a.components.len(), 1);
        assert!(a.data.contains("posts"));
        assert!(!a.is_empty());
    }
}
