//! Component style compilation and consolidation.
//!
//! A page or component declares its CSS once through a [`StyleBuilder`]. The
//! compiled record is kept in the [`StyleRegistry`] and never recomputed until
//! the registry is cleared. At layout time the ids of every component used
//! during the render are turned into a single deduplicated stylesheet with
//! breakpoints emitted in a fixed order:
//!
//! ```text
//! base rules
//! @media max-width    (descending)
//! @media min-width    (ascending)
//! @media min and max  (ascending)
//! @container max / min / min and max
//! @container <name> max / min / min and max   (per name, first seen first)
//! ```

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashMap},
    fs,
    io::{self, Write},
    path::PathBuf,
};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Style errors.
#[derive(Debug, Error)]
pub enum StyleError {
    /// IO error while writing an external stylesheet.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// External stylesheets were requested without an output directory.
    #[error("external stylesheet directory is not configured")]
    ExternalDirUnset,
}

/// Classification of a breakpoint-bound rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Breakpoint {
    /// `@media (min-width: Npx)`
    MediaMin(u32),
    /// `@media (max-width: Npx)`
    MediaMax(u32),
    /// `@media (min-width: Apx) and (max-width: Bpx)`
    MediaRange(u32, u32),
    /// `@container (min-width: Npx)`
    ContainerMin(u32),
    /// `@container (max-width: Npx)`
    ContainerMax(u32),
    /// `@container (min-width: Apx) and (max-width: Bpx)`
    ContainerRange(u32, u32),
    /// `@container name (min-width: Npx)`
    NamedMin(String, u32),
    /// `@container name (max-width: Npx)`
    NamedMax(String, u32),
    /// `@container name (min-width: Apx) and (max-width: Bpx)`
    NamedRange(String, u32, u32),
}

impl Breakpoint {
    /// String classification key, e.g. `m-min-768` or `c-sidebar-max-400`.
    pub fn key(&self) -> String {
        match self {
            Self::MediaMin(w) => format!("m-min-{w}"),
            Self::MediaMax(w) => format!("m-max-{w}"),
            Self::MediaRange(min, max) => format!("m-minmax-{min}-{max}"),
            Self::ContainerMin(w) => format!("c-min-{w}"),
            Self::ContainerMax(w) => format!("c-max-{w}"),
            Self::ContainerRange(min, max) => format!("c-minmax-{min}-{max}"),
            Self::NamedMin(name, w) => format!("c-{name}-min-{w}"),
            Self::NamedMax(name, w) => format!("c-{name}-max-{w}"),
            Self::NamedRange(name, min, max) => format!("c-{name}-minmax-{min}-{max}"),
        }
    }
}

/// Collector handed to a `styles` block.
#[derive(Debug, Clone, Default)]
pub struct StyleBuilder {
    base: Vec<String>,
    buckets: Vec<(Breakpoint, Vec<String>)>,
}

impl StyleBuilder {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a base rule.
    pub fn css(&mut self, rule: impl Into<String>) -> &mut Self {
        self.base.push(rule.into());
        self
    }

    /// Add a rule for a breakpoint.
    pub fn at(&mut self, breakpoint: Breakpoint, rule: impl Into<String>) -> &mut Self {
        let rule = rule.into();
        match self.buckets.iter_mut().find(|(bp, _)| *bp == breakpoint) {
            Some((_, rules)) => rules.push(rule),
            None => self.buckets.push((breakpoint, vec![rule])),
        }
        self
    }

    pub fn media_min(&mut self, width: u32, rule: impl Into<String>) -> &mut Self {
        self.at(Breakpoint::MediaMin(width), rule)
    }

    pub fn media_max(&mut self, width: u32, rule: impl Into<String>) -> &mut Self {
        self.at(Breakpoint::MediaMax(width), rule)
    }

    pub fn media_minmax(&mut self, min: u32, max: u32, rule: impl Into<String>) -> &mut Self {
        self.at(Breakpoint::MediaRange(min, max), rule)
    }

    pub fn container_min(&mut self, width: u32, rule: impl Into<String>) -> &mut Self {
        self.at(Breakpoint::ContainerMin(width), rule)
    }

    pub fn container_max(&mut self, width: u32, rule: impl Into<String>) -> &mut Self {
        self.at(Breakpoint::ContainerMax(width), rule)
    }

    pub fn container_minmax(&mut self, min: u32, max: u32, rule: impl Into<String>) -> &mut Self {
        self.at(Breakpoint::ContainerRange(min, max), rule)
    }

    pub fn named_container_min(
        &mut self,
        name: impl Into<String>,
        width: u32,
        rule: impl Into<String>,
    ) -> &mut Self {
        self.at(Breakpoint::NamedMin(name.into(), width), rule)
    }

    pub fn named_container_max(
        &mut self,
        name: impl Into<String>,
        width: u32,
        rule: impl Into<String>,
    ) -> &mut Self {
        self.at(Breakpoint::NamedMax(name.into(), width), rule)
    }

    pub fn named_container_minmax(
        &mut self,
        name: impl Into<String>,
        min: u32,
        max: u32,
        rule: impl Into<String>,
    ) -> &mut Self {
        self.at(Breakpoint::NamedRange(name.into(), min, max), rule)
    }

    /// Compile into a frozen record, scoping class selectors under
    /// `scope_class` when given.
    #[must_use]
    pub fn compile(self, scope_class: Option<&str>) -> CompiledStyle {
        let prefix = scope_class.map(|class| format!(".{class} "));
        let scope = |rule: String| match &prefix {
            Some(prefix) => scope_rule(&rule, prefix),
            None => rule,
        };

        CompiledStyle {
            base: self.base.into_iter().map(scope).collect(),
            buckets: self
                .buckets
                .into_iter()
                .map(|(bp, rules)| (bp, rules.into_iter().map(scope).collect()))
                .collect(),
        }
    }
}

/// Compiled styles of one page or component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledStyle {
    base: Vec<String>,
    buckets: Vec<(Breakpoint, Vec<String>)>,
}

impl CompiledStyle {
    /// Base rules in declaration order.
    pub fn base(&self) -> &[String] {
        &self.base
    }

    /// Breakpoint buckets in first-declared order.
    pub fn buckets(&self) -> &[(Breakpoint, Vec<String>)] {
        &self.buckets
    }

    /// Rules for one breakpoint.
    pub fn rules_for(&self, breakpoint: &Breakpoint) -> Option<&[String]> {
        self.buckets
            .iter()
            .find(|(bp, _)| bp == breakpoint)
            .map(|(_, rules)| rules.as_slice())
    }
}

/// Prefix every class selector of a rule with `prefix`.
///
/// Only the selector list before the first `{` is inspected. Selectors that do
/// not start with a class (`h1`, `#id`, `:root`) are left as they are.
pub fn scope_rule(rule: &str, prefix: &str) -> String {
    let (selectors, body) = rule.split_at(rule.find('{').unwrap_or(rule.len()));
    let gap = &selectors[selectors.trim_end().len()..];

    let scoped = selectors
        .split(',')
        .map(str::trim)
        .map(|selector| {
            if starts_with_class(selector) {
                format!("{prefix}{selector}")
            } else {
                selector.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("{scoped}{gap}{body}")
}

fn starts_with_class(selector: &str) -> bool {
    selector
        .strip_prefix('.')
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_alphabetic())
}

/// Where external stylesheets are written and served from.
#[derive(Debug, Clone)]
struct ExternalTarget {
    dir: PathBuf,
    url: String,
}

/// Registry of compiled styles plus the consolidated stylesheet caches.
#[derive(Debug, Default)]
pub struct StyleRegistry {
    compiled: RefCell<HashMap<String, CompiledStyle>>,
    consolidated: RefCell<HashMap<String, String>>,
    external: RefCell<Option<ExternalTarget>>,
    linked: RefCell<HashMap<String, String>>,
}

impl StyleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the directory external stylesheets are written to and the
    /// URL prefix they are linked with.
    pub fn set_external_target(&self, dir: impl Into<PathBuf>, url: impl Into<String>) {
        *self.external.borrow_mut() = Some(ExternalTarget {
            dir: dir.into(),
            url: url.into(),
        });
        self.linked.borrow_mut().clear();
    }

    /// Whether `owner` already has a compiled record.
    pub fn is_compiled(&self, owner: &str) -> bool {
        self.compiled.borrow().contains_key(owner)
    }

    /// Store the compiled record for `owner`. The first record wins.
    pub fn insert(&self, owner: impl Into<String>, style: CompiledStyle) {
        self.compiled
            .borrow_mut()
            .entry(owner.into())
            .or_insert(style);
    }

    /// Compiled record for `owner`.
    pub fn get(&self, owner: &str) -> Option<CompiledStyle> {
        self.compiled.borrow().get(owner).cloned()
    }

    /// Number of compiled records.
    pub fn len(&self) -> usize {
        self.compiled.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.borrow().is_empty()
    }

    /// Drop every compiled record and cached stylesheet.
    pub fn clear(&self) {
        self.compiled.borrow_mut().clear();
        self.consolidated.borrow_mut().clear();
        self.linked.borrow_mut().clear();
    }

    /// Render one stylesheet covering every id in `ids`.
    ///
    /// The result depends only on the set of ids, never on their order, and is
    /// cached under the sorted comma-joined id list. Ids without a compiled
    /// record are skipped.
    pub fn render_consolidated_styles<I, S>(&self, ids: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = sorted_ids(ids);
        if ids.is_empty() {
            return String::new();
        }

        let key = cache_key(&ids);
        if let Some(css) = self.consolidated.borrow().get(&key) {
            return css.clone();
        }

        let css = {
            let compiled = self.compiled.borrow();
            consolidate(ids.iter().filter_map(|id| compiled.get(id.as_str())))
        };

        debug!(key = %key, bytes = css.len(), "consolidated styles");
        self.consolidated.borrow_mut().insert(key, css.clone());
        css
    }

    /// Write the consolidated stylesheet for `ids` once and return a link tag.
    ///
    /// The file name is a fingerprint of the stylesheet content. The CSS is
    /// written to a temporary file in the same directory and linked into place
    /// only when complete, and an existing file is never replaced.
    pub fn render_external_styles<I, S>(&self, ids: I) -> Result<String, StyleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = sorted_ids(ids);
        if ids.is_empty() {
            return Ok(String::new());
        }

        let key = cache_key(&ids);
        if let Some(href) = self.linked.borrow().get(&key) {
            return Ok(link_tag(href));
        }

        let target = self
            .external
            .borrow()
            .clone()
            .ok_or(StyleError::ExternalDirUnset)?;

        let css = self.render_consolidated_styles(&ids);
        let digest = hex::encode(Sha256::digest(css.as_bytes()));
        let file_name = format!("styles-{}.css", &digest[..12]);

        fs::create_dir_all(&target.dir)?;
        let path = target.dir.join(&file_name);
        if path.exists() {
            debug!(path = %path.display(), "external stylesheet already present");
        } else {
            let mut file = NamedTempFile::new_in(&target.dir)?;
            file.write_all(css.as_bytes())?;
            match file.persist_noclobber(&path) {
                Ok(_) => debug!(path = %path.display(), "wrote external stylesheet"),
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "external stylesheet already present");
                }
                Err(e) => return Err(e.error.into()),
            }
        }

        let href = format!("{}/{file_name}", target.url.trim_end_matches('/'));
        self.linked.borrow_mut().insert(key, href.clone());
        Ok(link_tag(&href))
    }
}

fn sorted_ids<I, S>(ids: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ids.into_iter().map(|id| id.as_ref().to_string()).collect()
}

fn cache_key(ids: &BTreeSet<String>) -> String {
    ids.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

fn link_tag(href: &str) -> String {
    format!(r#"<link rel="stylesheet" href="{href}">"#)
}

/// Rules grouped by breakpoint, ready to emit in the global order.
#[derive(Debug, Default)]
struct Groups {
    media_max: BTreeMap<u32, Vec<String>>,
    media_min: BTreeMap<u32, Vec<String>>,
    media_range: BTreeMap<(u32, u32), Vec<String>>,
    container: SizeGroups,
    named: Vec<(String, SizeGroups)>,
}

#[derive(Debug, Default)]
struct SizeGroups {
    max: BTreeMap<u32, Vec<String>>,
    min: BTreeMap<u32, Vec<String>>,
    range: BTreeMap<(u32, u32), Vec<String>>,
}

impl Groups {
    fn named(&mut self, name: &str) -> &mut SizeGroups {
        let index = match self.named.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.named.push((name.to_string(), SizeGroups::default()));
                self.named.len() - 1
            }
        };
        &mut self.named[index].1
    }

    fn bucket(&mut self, breakpoint: &Breakpoint) -> &mut Vec<String> {
        match breakpoint {
            Breakpoint::MediaMax(w) => self.media_max.entry(*w).or_default(),
            Breakpoint::MediaMin(w) => self.media_min.entry(*w).or_default(),
            Breakpoint::MediaRange(min, max) => self.media_range.entry((*min, *max)).or_default(),
            Breakpoint::ContainerMax(w) => self.container.max.entry(*w).or_default(),
            Breakpoint::ContainerMin(w) => self.container.min.entry(*w).or_default(),
            Breakpoint::ContainerRange(min, max) => {
                self.container.range.entry((*min, *max)).or_default()
            }
            Breakpoint::NamedMax(name, w) => self.named(name).max.entry(*w).or_default(),
            Breakpoint::NamedMin(name, w) => self.named(name).min.entry(*w).or_default(),
            Breakpoint::NamedRange(name, min, max) => {
                self.named(name).range.entry((*min, *max)).or_default()
            }
        }
    }
}

fn consolidate<'a>(styles: impl Iterator<Item = &'a CompiledStyle>) -> String {
    let mut css = String::with_capacity(4096);
    let mut seen_base = BTreeSet::new();
    let mut groups = Groups::default();

    for style in styles {
        for rule in &style.base {
            if seen_base.insert(rule.as_str()) {
                css.push_str(rule);
            }
        }
        for (breakpoint, rules) in &style.buckets {
            let bucket = groups.bucket(breakpoint);
            for rule in rules {
                if !bucket.contains(rule) {
                    bucket.push(rule.clone());
                }
            }
        }
    }

    for (w, rules) in groups.media_max.iter().rev() {
        write_block(&mut css, &format!("@media (max-width: {w}px)"), rules);
    }
    for (w, rules) in &groups.media_min {
        write_block(&mut css, &format!("@media (min-width: {w}px)"), rules);
    }
    for ((min, max), rules) in &groups.media_range {
        write_block(
            &mut css,
            &format!("@media (min-width: {min}px) and (max-width: {max}px)"),
            rules,
        );
    }
    write_sizes(&mut css, "@container", &groups.container);
    for (name, sizes) in &groups.named {
        write_sizes(&mut css, &format!("@container {name}"), sizes);
    }

    css
}

fn write_sizes(css: &mut String, at_rule: &str, sizes: &SizeGroups) {
    for (w, rules) in sizes.max.iter().rev() {
        write_block(css, &format!("{at_rule} (max-width: {w}px)"), rules);
    }
    for (w, rules) in &sizes.min {
        write_block(css, &format!("{at_rule} (min-width: {w}px)"), rules);
    }
    for ((min, max), rules) in &sizes.range {
        write_block(
            css,
            &format!("{at_rule} (min-width: {min}px) and (max-width: {max}px)"),
            rules,
        );
    }
}

fn write_block(css: &mut String, header: &str, rules: &[String]) {
    css.push_str(header);
    css.push('{');
    for rule in rules {
        css.push_str(rule);
    }
    css.push('}');
}
