//! Source discovery under the content root.
//!
//! The first path segment below the content root is the domain. Components
//! and layouts live in `_components` and `_layouts` directories at any depth;
//! every other source file is a page, or an error page when its base name is
//! a three-digit status code.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::assets::ASSETS_DIR;

pub const COMPONENTS_DIR: &str = "_components";
pub const LAYOUTS_DIR: &str = "_layouts";

/// A page source and where it renders to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSource {
    pub path: PathBuf,
    /// Path relative to the content root, `/`-separated.
    pub source: String,
    pub domain: String,
    /// Path inside the domain without the extension, e.g. `posts/index`.
    pub route: String,
    pub url: String,
    /// Output file relative to the output directory.
    pub output: PathBuf,
}

impl PageSource {
    /// Owner name of the page's render context.
    pub fn template_name(&self) -> String {
        format!("{}_{}", self.domain, self.route.replace('/', "_"))
    }

    /// Output file of page `number` of a paginated page.
    pub fn page_output(&self, number: usize) -> PathBuf {
        paginated_output(&self.output, number)
    }
}

/// An error page, rendered to `[domain/]NNN.html`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPage {
    pub path: PathBuf,
    pub source: String,
    pub domain: String,
    pub code: u16,
    pub output: PathBuf,
}

impl ErrorPage {
    pub fn template_name(&self) -> String {
        format!("{}_{}", self.domain, self.code)
    }
}

/// A component or layout source, registered under its base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub name: String,
    pub path: PathBuf,
    pub source: String,
    pub domain: String,
}

/// Everything found under the content root.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub domains: Vec<String>,
    pub pages: Vec<PageSource>,
    pub error_pages: Vec<ErrorPage>,
    pub components: Vec<TemplateSource>,
    pub layouts: Vec<TemplateSource>,
}

impl Discovery {
    pub fn page(&self, source: &str) -> Option<&PageSource> {
        self.pages.iter().find(|page| page.source == source)
    }

    pub fn error_page(&self, source: &str) -> Option<&ErrorPage> {
        self.error_pages.iter().find(|page| page.source == source)
    }
}

/// Walks a content root.
#[derive(Debug, Clone)]
pub struct Discoverer {
    content_dir: PathBuf,
    extension: String,
    default_domain: String,
}

impl Discoverer {
    pub fn new(
        content_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        default_domain: impl Into<String>,
    ) -> Self {
        Self {
            content_dir: content_dir.into(),
            extension: extension.into(),
            default_domain: default_domain.into(),
        }
    }

    /// Collect domains, pages, error pages, components and layouts.
    ///
    /// Traversal is sorted, so duplicates resolve to the first path in order.
    pub fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();
        let mut domains = BTreeSet::new();
        let mut error_codes = HashSet::new();
        let mut component_names = BTreeMap::new();
        let mut layout_names = BTreeMap::new();

        if !self.content_dir.is_dir() {
            debug!(dir = %self.content_dir.display(), "content directory missing");
            return discovery;
        }

        // Domains are the directories directly under the content root.
        for entry in WalkDir::new(&self.content_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                domains.insert(name);
            }
        }

        for entry in WalkDir::new(&self.content_dir)
            .min_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.content_dir) else {
                continue;
            };
            let segments: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let Some((domain, inner)) = segments.split_first() else {
                continue;
            };
            let source = segments.join("/");

            let template_dir = inner[..inner.len().saturating_sub(1)]
                .iter()
                .find(|s| *s == COMPONENTS_DIR || *s == LAYOUTS_DIR);
            if let Some(dir) = template_dir {
                let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                    continue;
                };
                let (list, names) = if dir == COMPONENTS_DIR {
                    (&mut discovery.components, &mut component_names)
                } else {
                    (&mut discovery.layouts, &mut layout_names)
                };
                if let Some(first) = names.get(&name) {
                    warn!(name = %name, kept = %first, ignored = %source, "duplicate template name");
                    continue;
                }
                names.insert(name.clone(), source.clone());
                list.push(TemplateSource {
                    name,
                    path: path.to_path_buf(),
                    source,
                    domain: domain.clone(),
                });
                continue;
            }

            if inner.first().is_some_and(|s| s == ASSETS_DIR) {
                continue;
            }

            let route = inner.join("/");
            let route = route
                .strip_suffix(&format!(".{}", self.extension))
                .unwrap_or(&route)
                .to_string();

            if let Some(code) = error_code(&route) {
                if !error_codes.insert((domain.clone(), code)) {
                    warn!(domain = %domain, code, ignored = %source, "duplicate error page");
                    continue;
                }
                discovery.error_pages.push(ErrorPage {
                    path: path.to_path_buf(),
                    source,
                    output: self.domain_prefix(domain).join(format!("{code}.html")),
                    domain: domain.clone(),
                    code,
                });
                continue;
            }

            let url = url_for(&route);
            discovery.pages.push(PageSource {
                path: path.to_path_buf(),
                source,
                output: self.domain_prefix(domain).join(output_for(&url)),
                domain: domain.clone(),
                route,
                url,
            });
        }

        discovery.domains = domains.into_iter().collect();
        debug!(
            domains = discovery.domains.len(),
            pages = discovery.pages.len(),
            error_pages = discovery.error_pages.len(),
            components = discovery.components.len(),
            layouts = discovery.layouts.len(),
            "discovered sources"
        );
        discovery
    }

    fn domain_prefix(&self, domain: &str) -> PathBuf {
        if domain == self.default_domain {
            PathBuf::new()
        } else {
            PathBuf::from(domain)
        }
    }
}

/// Status code of an error page route: a base name of exactly three digits.
fn error_code(route: &str) -> Option<u16> {
    let name = route.rsplit('/').next()?;
    if name.len() == 3 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}

/// Public URL of a route: `index` is `/`, `a/index` is `/a/`, `a/b` is `/a/b/`.
pub fn url_for(route: &str) -> String {
    let route = if route == "index" {
        ""
    } else {
        route.strip_suffix("/index").unwrap_or(route)
    };
    let route = route.trim_matches('/');
    if route.is_empty() {
        "/".to_string()
    } else {
        format!("/{route}/")
    }
}

/// Output file of a URL: cleaned segments followed by `index.html`.
pub fn output_for(url: &str) -> PathBuf {
    let cleaned: String = url
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-'))
        .collect();
    let mut output = PathBuf::new();
    for segment in cleaned.split('/').filter(|s| !s.is_empty()) {
        output.push(segment);
    }
    output.join("index.html")
}

/// Output of page `number`: a `page-N` directory before the final `index.html`.
pub fn paginated_output(output: &Path, number: usize) -> PathBuf {
    if number <= 1 {
        return output.to_path_buf();
    }
    let parent = output.parent().unwrap_or(Path::new(""));
    parent.join(format!("page-{number}")).join("index.html")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn touch(root: &Path, path: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, "").unwrap();
    }

    #[test]
    fn test_url_mapping() {
        assert_eq!(url_for("index"), "/");
        assert_eq!(url_for("about"), "/about/");
        assert_eq!(url_for("posts/index"), "/posts/");
        assert_eq!(url_for("a/b"), "/a/b/");
        // Only a whole `index` segment maps to the directory.
        assert_eq!(url_for("reindex"), "/reindex/");
    }

    #[test]
    fn test_output_mapping() {
        assert_eq!(output_for("/"), PathBuf::from("index.html"));
        assert_eq!(output_for("/a/b/"), PathBuf::from("a/b/index.html"));
        assert_eq!(output_for("/we ird.!/"), PathBuf::from("weird/index.html"));
    }

    #[test]
    fn test_paginated_output() {
        let output = PathBuf::from("blog/posts/index.html");
        assert_eq!(paginated_output(&output, 1), output);
        assert_eq!(
            paginated_output(&output, 3),
            PathBuf::from("blog/posts/page-3/index.html")
        );
        assert_eq!(
            paginated_output(Path::new("index.html"), 2),
            PathBuf::from("page-2/index.html")
        );
    }

    #[test]
    fn test_discover_domains_pages_and_templates() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for path in [
            "default/index.mosaic",
            "default/about.mosaic",
            "default/404.mosaic",
            "default/_layouts/main.mosaic",
            "default/assets/style.css",
            "default/assets/fake.mosaic",
            "default/notes.txt",
            "blog/posts.mosaic",
            "blog/404.mosaic",
            "blog/errors/404.mosaic",
            "blog/_components/card.mosaic",
            "blog/nested/_components/card.mosaic",
            "stray.mosaic",
        ] {
            touch(root, path);
        }

        let found = Discoverer::new(root, "mosaic", "default").discover();

        assert_eq!(found.domains, ["blog", "default"]);
        let outputs: Vec<_> = found.pages.iter().map(|p| p.output.clone()).collect();
        assert_eq!(
            outputs,
            [
                PathBuf::from("blog/posts/index.html"),
                PathBuf::from("about/index.html"),
                PathBuf::from("index.html"),
            ]
        );
        let posts = found.page("blog/posts.mosaic").unwrap();
        assert_eq!(posts.url, "/posts/");
        assert_eq!(posts.template_name(), "blog_posts");

        let errors: Vec<_> = found
            .error_pages
            .iter()
            .map(|p| (p.source.as_str(), p.output.clone()))
            .collect();
        assert_eq!(
            errors,
            [
                ("blog/404.mosaic", PathBuf::from("blog/404.html")),
                ("default/404.mosaic", PathBuf::from("404.html")),
            ]
        );

        assert_eq!(found.components.len(), 1);
        assert_eq!(found.components[0].source, "blog/_components/card.mosaic");
        assert_eq!(found.layouts[0].name, "main");
    }

    #[test]
    fn test_missing_content_dir() {
        let dir = TempDir::new().unwrap();
        let found = Discoverer::new(dir.path().join("nope"), "mosaic", "default").discover();
        assert!(found.domains.is_empty());
        assert!(found.pages.is_empty());
    }
}
