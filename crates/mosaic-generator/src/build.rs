//! Build orchestration.
//!
//! Coordinates full and incremental site builds.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    time::Instant,
};

use mosaic_core::{Config, CoreError};
use mosaic_data::{DataError, DataStore, Definition, Value};
use mosaic_render::{Engine, RenderContext, RenderError, TemplateKind, Usage};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    assets::{ASSETS_DIR, AssetError, AssetManifest, AssetProcessor, PlannedAsset},
    deps::{DependencyError, DependencyGraph},
    discover::{COMPONENTS_DIR, Discoverer, Discovery, LAYOUTS_DIR, PageSource},
    eval::{Env, Pagination, Runtime, define_template},
    script::{Script, ScriptError},
};

/// Dependency graph file inside the output directory.
pub const DEPENDENCIES_FILE: &str = ".dependencies.json";

/// Asset manifest file inside the output directory.
pub const MANIFEST_FILE: &str = ".asset-manifest.json";

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Template registration or page render error.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Source parse error.
    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    /// Data loading error.
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// Asset error.
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    /// Dependency graph error.
    #[error("dependency graph error: {0}")]
    Dependency(#[from] DependencyError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] CoreError),
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Build statistics.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Number of page files written, counting every paginated page.
    pub pages: usize,

    /// Number of error pages written.
    pub error_pages: usize,

    /// Number of hashed domain assets written.
    pub assets: usize,

    /// Number of global assets copied.
    pub global_assets: usize,

    /// Written files, relative to the output directory.
    pub files: Vec<PathBuf>,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

/// What a changed path means for an incremental build.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    Component(String),
    Layout(String),
    Data(String),
    Page(String),
    Asset(String),
    Other,
}

type DataDefinition = Box<dyn Fn(&mut DataStore) -> mosaic_data::Result<()>>;

/// A parsed layout, kept so it can be recompiled after caches are cleared.
struct LoadedLayout {
    name: String,
    script: Rc<Script>,
    domain: String,
}

/// Site builder that orchestrates the build process.
pub struct Builder {
    config: Config,
    content_dir: PathBuf,
    output_dir: PathBuf,
    data_dir: PathBuf,
    public_dirs: Vec<PathBuf>,
    definitions: Vec<DataDefinition>,
    engine: Engine,
    runtime: Rc<Runtime>,
    layouts: RefCell<Vec<LoadedLayout>>,
    data_loaded: Cell<bool>,
    templates_loaded: Cell<bool>,
}

impl Builder {
    /// Create a new builder.
    ///
    /// The data and global asset directories default to siblings of the
    /// content directory, named as in the configuration.
    #[must_use]
    pub fn new(
        config: Config,
        content_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let content_dir = content_dir.into();
        let output_dir = output_dir.into();
        let root = content_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let data_dir = root.join(&config.build.data_dir);
        let public_dirs = config
            .build
            .public_dirs
            .iter()
            .map(|dir| root.join(dir))
            .collect();
        let engine = Engine::with_external_styles(
            output_dir.join(&config.build.css_dir),
            config.build.css_url.clone(),
        );
        let runtime = Rc::new(Runtime::new(
            DataStore::new(&data_dir),
            site_value(&config),
        ));

        Self {
            config,
            content_dir,
            output_dir,
            data_dir,
            public_dirs,
            definitions: Vec::new(),
            engine,
            runtime,
            layouts: RefCell::new(Vec::new()),
            data_loaded: Cell::new(false),
            templates_loaded: Cell::new(false),
        }
    }

    /// Create a builder for a project root, resolving directories from the
    /// configuration.
    #[must_use]
    pub fn from_root(config: Config, root: &Path) -> Self {
        let content_dir = root.join(&config.build.content_dir);
        let output_dir = root.join(&config.build.output_dir);
        Self::new(config, content_dir, output_dir)
    }

    /// Set the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the directories copied verbatim to the output root.
    #[must_use]
    pub fn with_public_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.public_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Define a collection programmatically, with scopes and methods.
    ///
    /// Definitions run on every data load, before the data directory is
    /// scanned, and take precedence over files of the same name.
    #[must_use]
    pub fn define_data<F>(mut self, name: &str, build: F) -> Self
    where
        F: Fn(&mut Definition<'_>) -> mosaic_data::Result<()> + 'static,
    {
        let name = name.to_string();
        self.definitions
            .push(Box::new(move |store: &mut DataStore| {
                store.define(&name, |def| build(def))
            }));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Execute the full build process.
    pub fn build(&self) -> Result<BuildStats> {
        let start = Instant::now();
        let mut stats = BuildStats::default();

        info!(
            content = %self.content_dir.display(),
            output = %self.output_dir.display(),
            "starting build"
        );

        // 1. Clean output directory
        if self.config.build.force {
            self.clean_output()?;
        }

        // 2. Load data
        self.load_data()?;
        let discovery = self.discover();

        // 3. Plan assets so `asset:` lookups resolve in layouts and pages
        let planned = self.plan_assets(&discovery)?;

        // 4. Load components and layouts
        self.engine.reset();
        self.load_templates(&discovery)?;

        // 5. Render pages and error pages
        let mut graph = DependencyGraph::new();
        info!(count = discovery.pages.len(), "rendering pages");
        for page in &discovery.pages {
            self.build_page(page, &mut graph, &mut stats);
        }
        self.build_error_pages(&discovery, None, &mut graph, &mut stats);

        // 6. Write assets
        stats.assets = AssetProcessor::write(&planned, &self.output_dir)?;
        for dir in &self.public_dirs {
            stats.global_assets += AssetProcessor::copy_dir(dir, &self.output_dir)?;
        }

        // 7. Persist dependency graph and manifest
        graph.save(&self.dependencies_path())?;
        self.runtime.manifest.borrow().save(&self.manifest_path())?;

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            pages = stats.pages,
            error_pages = stats.error_pages,
            assets = stats.assets,
            global_assets = stats.global_assets,
            duration_ms = stats.duration_ms,
            "build complete"
        );

        Ok(stats)
    }

    /// Rebuild only the pages affected by `changed` paths.
    ///
    /// Paths may be absolute or relative to the working directory; they are
    /// matched against the content and data directories.
    pub fn build_incremental(&self, changed: &[PathBuf]) -> Result<BuildStats> {
        let start = Instant::now();
        let mut stats = BuildStats::default();

        info!(changed = changed.len(), "starting incremental build");

        let discovery = self.discover();
        let mut graph = DependencyGraph::load(&self.dependencies_path())?;
        *self.runtime.manifest.borrow_mut() = AssetManifest::load(&self.manifest_path())?;

        let mut affected = BTreeSet::new();
        let mut reload_data = !self.data_loaded.get();
        let mut reload_templates = !self.templates_loaded.get();
        let mut asset_domains = BTreeSet::new();

        for path in changed {
            let change = self.classify(path);
            debug!(path = %path.display(), ?change, "classified change");
            match change {
                Change::Component(name) => {
                    affected.extend(graph.component_dependents(&name));
                    reload_templates = true;
                }
                Change::Layout(name) => {
                    affected.extend(graph.layout_dependents(&name));
                    reload_templates = true;
                }
                Change::Data(model) => {
                    affected.extend(graph.data_dependents(&model));
                    reload_data = true;
                }
                Change::Page(source) => {
                    affected.insert(source);
                }
                Change::Asset(domain) => {
                    asset_domains.insert(domain);
                }
                Change::Other => debug!(path = %path.display(), "ignoring change"),
            }
        }

        if !asset_domains.is_empty() {
            let planned = self.plan_assets(&discovery)?;
            stats.assets = AssetProcessor::write(&planned, &self.output_dir)?;
            for page in discovery
                .pages
                .iter()
                .filter(|page| asset_domains.contains(&page.domain))
            {
                affected.insert(page.source.clone());
            }
        }

        if reload_data {
            self.load_data()?;
            // Layout skeletons may embed data.
            reload_templates = true;
        }
        self.engine.clear_caches();
        if reload_templates {
            self.engine.reset();
            self.load_templates(&discovery)?;
        } else {
            self.recompile_layouts()?;
        }

        info!(count = affected.len(), "rebuilding affected pages");
        let mut error_sources = BTreeSet::new();
        for source in &affected {
            if let Some(page) = discovery.page(source) {
                self.build_page(page, &mut graph, &mut stats);
            } else if discovery.error_page(source).is_some() {
                error_sources.insert(source.clone());
            } else {
                debug!(source = %source, "source no longer exists");
                graph.remove(source);
            }
        }
        if !error_sources.is_empty() {
            self.build_error_pages(&discovery, Some(&error_sources), &mut graph, &mut stats);
        }

        graph.save(&self.dependencies_path())?;
        self.runtime.manifest.borrow().save(&self.manifest_path())?;

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            pages = stats.pages,
            error_pages = stats.error_pages,
            duration_ms = stats.duration_ms,
            "incremental build complete"
        );
        Ok(stats)
    }

    /// Clean the output directory.
    fn clean_output(&self) -> Result<()> {
        if self.output_dir.exists() {
            debug!(dir = %self.output_dir.display(), "cleaning output directory");
            fs::remove_dir_all(&self.output_dir)?;
        }
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    fn discover(&self) -> Discovery {
        Discoverer::new(
            &self.content_dir,
            &self.config.build.source_extension,
            &self.config.build.default_domain,
        )
        .discover()
    }

    /// Replace the data store with freshly loaded collections.
    fn load_data(&self) -> Result<()> {
        let mut store = DataStore::new(&self.data_dir);
        for define in &self.definitions {
            define(&mut store)?;
        }
        store.load_directory()?;
        info!(models = store.models().len(), "loaded data");

        *self.runtime.store.borrow_mut() = store;
        self.data_loaded.set(true);
        Ok(())
    }

    /// Parse and register every component, then every layout.
    fn load_templates(&self, discovery: &Discovery) -> Result<()> {
        for component in &discovery.components {
            let script = Script::load(&component.path)?;
            define_template(
                &self.engine,
                TemplateKind::Component,
                &component.name,
                Rc::new(script),
                Rc::clone(&self.runtime),
                component.domain.clone(),
            )?;
        }

        let mut layouts = Vec::with_capacity(discovery.layouts.len());
        for layout in &discovery.layouts {
            layouts.push(LoadedLayout {
                name: layout.name.clone(),
                script: Rc::new(Script::load(&layout.path)?),
                domain: layout.domain.clone(),
            });
        }
        *self.layouts.borrow_mut() = layouts;
        self.recompile_layouts()?;

        info!(
            components = discovery.components.len(),
            layouts = discovery.layouts.len(),
            "loaded templates"
        );
        self.templates_loaded.set(true);
        Ok(())
    }

    /// Compile every loaded layout again, restoring its styles.
    fn recompile_layouts(&self) -> Result<()> {
        for layout in self.layouts.borrow().iter() {
            define_template(
                &self.engine,
                TemplateKind::Layout,
                &layout.name,
                Rc::clone(&layout.script),
                Rc::clone(&self.runtime),
                layout.domain.clone(),
            )?;
        }
        Ok(())
    }

    /// Hash domain assets and install their manifest.
    fn plan_assets(&self, discovery: &Discovery) -> Result<Vec<PlannedAsset>> {
        let processor =
            AssetProcessor::new(&self.content_dir, &self.config.build.default_domain);
        let planned = processor.plan(&discovery.domains)?;
        *self.runtime.manifest.borrow_mut() = AssetProcessor::manifest(&planned);
        Ok(planned)
    }

    /// Render one page and record its dependencies. Failures skip the page.
    fn build_page(&self, page: &PageSource, graph: &mut DependencyGraph, stats: &mut BuildStats) {
        match self.render_page(page) {
            Ok((files, usage)) => {
                graph.record(&page.source, (&usage).into());
                stats.pages += files.len();
                stats.files.extend(files);
            }
            Err(e) => {
                warn!(page = %page.source, error = %e, "failed to render page");
                graph.remove(&page.source);
            }
        }
    }

    /// Render a page, once per page when it paginates.
    fn render_page(&self, page: &PageSource) -> Result<(Vec<PathBuf>, Usage)> {
        let script = Script::load(&page.path)?;
        let name = page.template_name();

        let mut usage = Usage::default();
        let mut count = 1;
        if script.paginates() {
            let mut ctx = RenderContext::for_page(&self.engine, name.as_str());
            let mut env = Env::new(&self.runtime, &page.path, &page.domain, page.url.as_str())
                .with_pagination(Pagination::Capture);
            env.run(&script, &mut ctx)?;
            count = env.page_count().unwrap_or(1).max(1);
            usage.merge(ctx.usage());
            debug!(page = %page.source, pages = count, "paginated page");
        }

        let mut files = Vec::with_capacity(count);
        for number in 1..=count {
            let mut ctx = RenderContext::for_page(&self.engine, name.as_str());
            let mut env = Env::new(&self.runtime, &page.path, &page.domain, page.url.as_str())
                .with_pagination(Pagination::Render(number));
            env.run(&script, &mut ctx)?;
            let (html, page_usage) = ctx.into_parts();
            usage.merge(&page_usage);
            files.push(self.write_output(&page.page_output(number), &html)?);
        }

        Ok((files, usage))
    }

    /// Render error pages, or only those in `only`.
    fn build_error_pages(
        &self,
        discovery: &Discovery,
        only: Option<&BTreeSet<String>>,
        graph: &mut DependencyGraph,
        stats: &mut BuildStats,
    ) {
        for page in &discovery.error_pages {
            if only.is_some_and(|sources| !sources.contains(&page.source)) {
                continue;
            }

            let result = Script::load(&page.path)
                .map_err(BuildError::from)
                .and_then(|script| {
                    let mut ctx = RenderContext::for_page(&self.engine, page.template_name());
                    let url = format!("/{}.html", page.code);
                    Env::new(&self.runtime, &page.path, &page.domain, url)
                        .run(&script, &mut ctx)?;
                    let (html, usage) = ctx.into_parts();
                    let file = self.write_output(&page.output, &html)?;
                    Ok((file, usage))
                });

            match result {
                Ok((file, usage)) => {
                    graph.record(&page.source, (&usage).into());
                    stats.error_pages += 1;
                    stats.files.push(file);
                }
                Err(e) => {
                    warn!(page = %page.source, error = %e, "failed to render error page");
                    graph.remove(&page.source);
                }
            }
        }
    }

    fn write_output(&self, relative: &Path, html: &str) -> Result<PathBuf> {
        let path = self.output_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, html)?;
        debug!(path = %path.display(), "wrote page");
        Ok(relative.to_path_buf())
    }

    fn classify(&self, path: &Path) -> Change {
        if let Some(relative) = relative_to(path, &self.data_dir) {
            return DataStore::new(&self.data_dir)
                .model_for_path(&self.data_dir.join(relative))
                .map_or(Change::Other, Change::Data);
        }

        let Some(relative) = relative_to(path, &self.content_dir) else {
            return Change::Other;
        };
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let [domain, inner @ ..] = segments.as_slice() else {
            return Change::Other;
        };
        if inner.is_empty() {
            return Change::Other;
        }

        let dirs = &inner[..inner.len() - 1];
        let stem = || {
            relative
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        if dirs.iter().any(|s| s == COMPONENTS_DIR) {
            return Change::Component(stem());
        }
        if dirs.iter().any(|s| s == LAYOUTS_DIR) {
            return Change::Layout(stem());
        }
        if inner.len() > 1 && inner[0] == ASSETS_DIR {
            return Change::Asset(domain.clone());
        }
        if relative.extension().and_then(|ext| ext.to_str())
            == Some(self.config.build.source_extension.as_str())
        {
            return Change::Page(segments.join("/"));
        }
        Change::Other
    }

    fn dependencies_path(&self) -> PathBuf {
        self.output_dir.join(DEPENDENCIES_FILE)
    }

    fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_FILE)
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("content_dir", &self.content_dir)
            .field("output_dir", &self.output_dir)
            .field("data_dir", &self.data_dir)
            .field("public_dirs", &self.public_dirs)
            .field("definitions", &self.definitions.len())
            .finish_non_exhaustive()
    }
}

/// `path` relative to `base`, comparing absolute forms when the plain prefix
/// does not match.
fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Some(relative.to_path_buf());
    }
    let path = std::path::absolute(path).ok()?;
    let base = std::path::absolute(base).ok()?;
    path.strip_prefix(base).ok().map(Path::to_path_buf)
}

fn site_value(config: &Config) -> Value {
    Value::Map(BTreeMap::from([
        ("title".to_string(), Value::from(config.site.title.as_str())),
        ("base_url".to_string(), Value::from(config.site.base_url.as_str())),
    ]))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn builder(root: &Path) -> Builder {
        Builder::from_root(Config::default(), root)
    }

    #[test]
    fn test_build_empty_site() {
        let dir = TempDir::new().unwrap();
        let stats = builder(dir.path()).build().unwrap();

        assert_eq!(stats.pages, 0);
        assert!(dir.path().join("dist").join(DEPENDENCIES_FILE).exists());
        assert!(dir.path().join("dist").join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_failed_page_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "content/default/index.mosaic", "<h1>Home</h1>");
        write(dir.path(), "content/default/broken.mosaic", "@comp missing");
        write(dir.path(), "content/default/bad.mosaic", "@each x in");

        let stats = builder(dir.path()).build().unwrap();

        assert_eq!(stats.pages, 1);
        assert_eq!(stats.files, [PathBuf::from("index.html")]);
        assert!(!dir.path().join("dist/broken/index.html").exists());
        let graph = DependencyGraph::load(&dir.path().join("dist").join(DEPENDENCIES_FILE)).unwrap();
        assert!(graph.get("default/broken.mosaic").is_none());
        assert!(graph.get("default/index.mosaic").is_some());
    }

    #[test]
    fn test_data_errors_abort() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "data/posts.json", "{ not json");
        write(dir.path(), "content/default/index.mosaic", "hi");

        assert!(matches!(
            builder(dir.path()).build(),
            Err(BuildError::Data(_))
        ));
    }

    #[test]
    fn test_force_cleans_output() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "dist/stale.html", "old");
        write(dir.path(), "content/default/index.mosaic", "hi");

        let mut config = Config::default();
        config.build.force = true;
        Builder::from_root(config, dir.path()).build().unwrap();

        assert!(!dir.path().join("dist/stale.html").exists());
        assert!(dir.path().join("dist/index.html").exists());
    }

    #[test]
    fn test_classify_changes() {
        let dir = TempDir::new().unwrap();
        let builder = builder(dir.path());
        let content = dir.path().join("content");

        assert_eq!(
            builder.classify(&content.join("blog/_components/card.mosaic")),
            Change::Component("card".to_string())
        );
        assert_eq!(
            builder.classify(&content.join("default/_layouts/main.mosaic")),
            Change::Layout("main".to_string())
        );
        assert_eq!(
            builder.classify(&content.join("blog/posts.mosaic")),
            Change::Page("blog/posts.mosaic".to_string())
        );
        assert_eq!(
            builder.classify(&content.join("blog/assets/site.css")),
            Change::Asset("blog".to_string())
        );
        assert_eq!(
            builder.classify(&dir.path().join("data/posts_data.json")),
            Change::Data("posts".to_string())
        );
        assert_eq!(
            builder.classify(&dir.path().join("data/posts/one.yaml")),
            Change::Data("posts".to_string())
        );
        assert_eq!(builder.classify(&dir.path().join("README.md")), Change::Other);
    }

    #[test]
    fn test_define_data_programmatically() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "content/default/index.mosaic",
            "@each n in numbers.big\n{{ n.value }}\n@end",
        );

        builder(dir.path())
            .define_data("numbers", |def| {
                def.from_array((1..=4).map(|n| {
                    Value::Map(BTreeMap::from([("value".to_string(), Value::from(n))]))
                }))?
                .scope("big", |q, _| {
                    Ok(q.filter([("value", mosaic_data::Matcher::GreaterThan(2.into()))]))
                });
                Ok(())
            })
            .build()
            .unwrap();

        let html = fs::read_to_string(dir.path().join("dist/index.html")).unwrap();
        assert_eq!(html, "3\n4\n");
    }
}
