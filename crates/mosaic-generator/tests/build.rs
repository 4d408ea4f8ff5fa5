use std::{
    fs,
    path::{Path, PathBuf},
};

use mosaic_core::Config;
use mosaic_generator::{Builder, DependencyGraph, assets::compute_hash, build::DEPENDENCIES_FILE};
use tempfile::TempDir;

const LAYOUT: &str = "\
<html><head><title>
@pull title
</title>
<style>
@pull_styles
</style>
</head><body>
@pull
</body></html>";

const CARD: &str = "\
@styles
.card { color: red; }
@media_min 768 .card { padding: 2rem; }
@end
<div class=\"card\">{{ title }}</div>";

const HOME: &str = "\
@layout main
@push title
Home
@end
<h1>Welcome to {{ site.title }}</h1>
@comp card title=\"Hello\"
<img src=\"{{ asset:logo.png }}\">
@end";

const ABOUT: &str = "\
@layout main
<p>About</p>
@end";

const POSTS: &str = "\
@layout main
@each post in posts order n desc limit 2
<li>{{ post.title }}</li>
@end
@end";

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

fn read(root: &Path, path: &str) -> String {
    fs::read_to_string(root.join("dist").join(path)).unwrap()
}

fn posts_json(count: usize) -> String {
    let posts: Vec<String> = (1..=count)
        .map(|n| format!(r#"{{"n": {n}, "title": "Post {n}"}}"#))
        .collect();
    format!("[{}]", posts.join(","))
}

fn site() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "content/default/_layouts/main.mosaic", LAYOUT);
    write(root, "content/default/_components/card.mosaic", CARD);
    write(root, "content/default/index.mosaic", HOME);
    write(root, "content/default/about.mosaic", ABOUT);
    write(root, "content/default/404.mosaic", "@layout main\nNot found\n@end");
    write(root, "content/default/assets/logo.png", "fake-logo-data");
    write(root, "content/blog/posts.mosaic", POSTS);
    write(root, "content/blog/assets/css/theme.css", ".theme {}");
    write(root, "data/posts.json", &posts_json(3));
    write(root, "public/robots.txt", "User-agent: *");
    dir
}

fn config() -> Config {
    let mut config = Config::default();
    config.site.title = "Mosaic".to_string();
    config
}

fn builder(root: &Path) -> Builder {
    Builder::from_root(config(), root)
}

fn sorted(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = files.to_vec();
    files.sort();
    files
}

#[test]
fn test_builds_two_domains() {
    let dir = site();
    let root = dir.path();
    let stats = builder(root).build().unwrap();

    assert_eq!(stats.pages, 3);
    assert_eq!(stats.error_pages, 1);
    assert_eq!(stats.assets, 2);
    assert_eq!(stats.global_assets, 1);
    assert_eq!(
        sorted(&stats.files),
        [
            PathBuf::from("404.html"),
            PathBuf::from("about/index.html"),
            PathBuf::from("blog/posts/index.html"),
            PathBuf::from("index.html"),
        ]
    );

    let home = read(root, "index.html");
    assert!(home.contains("<title>\nHome\n</title>"));
    assert!(home.contains("<h1>Welcome to Mosaic</h1>"));
    assert!(home.contains("<div class=\"card\">Hello</div>"));
    assert!(home.contains(".card { color: red; }"));
    assert!(home.contains("@media (min-width: 768px)"));
    let logo = format!("/assets/logo-{}.png", compute_hash(b"fake-logo-data"));
    assert!(home.contains(&format!("<img src=\"{logo}\">")));

    // No component on the about page, so no card styles.
    let about = read(root, "about/index.html");
    assert!(about.contains("<p>About</p>"));
    assert!(!about.contains(".card"));

    let posts = read(root, "blog/posts/index.html");
    assert!(posts.contains("<li>Post 3</li>\n<li>Post 2</li>"));
    assert!(!posts.contains("Post 1"));

    assert!(read(root, "404.html").contains("Not found"));
    assert_eq!(read(root, "robots.txt"), "User-agent: *");
    assert!(root.join("dist").join(logo.trim_start_matches('/')).is_file());

    let manifest: serde_json::Value =
        serde_json::from_str(&read(root, ".asset-manifest.json")).unwrap();
    assert_eq!(manifest["default/logo.png"], serde_json::json!(logo));
    assert!(
        manifest["blog/css/theme.css"]
            .as_str()
            .unwrap()
            .starts_with("/blog/assets/css/theme-")
    );
}

#[test]
fn test_records_dependencies_per_page() {
    let dir = site();
    let root = dir.path();
    builder(root).build().unwrap();

    let graph = DependencyGraph::load(&root.join("dist").join(DEPENDENCIES_FILE)).unwrap();
    let home = graph.get("default/index.mosaic").unwrap();
    assert!(home.components.contains("card"));
    assert!(home.layouts.contains("main"));
    assert!(home.data.is_empty());

    let posts = graph.get("blog/posts.mosaic").unwrap();
    assert!(posts.components.is_empty());
    assert!(posts.data.contains("posts"));
    assert_eq!(graph.data_dependents("posts").len(), 1);
    assert_eq!(graph.layout_dependents("main").len(), 4);
}

#[test]
fn test_incremental_rebuilds_exactly_the_dependent_pages() {
    let dir = site();
    let root = dir.path();
    builder(root).build().unwrap();

    // Component change: only the page rendering the card.
    let card = root.join("content/default/_components/card.mosaic");
    fs::write(&card, CARD.replace("{{ title }}", "[{{ title }}]")).unwrap();
    let stats = builder(root).build_incremental(&[card]).unwrap();
    assert_eq!(stats.files, [PathBuf::from("index.html")]);
    assert!(read(root, "index.html").contains("<div class=\"card\">[Hello]</div>"));

    // Data change: only the page reading the model.
    write(root, "data/posts.json", &posts_json(5));
    let stats = builder(root)
        .build_incremental(&[root.join("data/posts.json")])
        .unwrap();
    assert_eq!(stats.files, [PathBuf::from("blog/posts/index.html")]);
    assert!(read(root, "blog/posts/index.html").contains("<li>Post 5</li>"));

    // Page change: only that page.
    write(root, "content/default/about.mosaic", "@layout main\n<p>Changed</p>\n@end");
    let stats = builder(root)
        .build_incremental(&[root.join("content/default/about.mosaic")])
        .unwrap();
    assert_eq!(stats.files, [PathBuf::from("about/index.html")]);
    assert!(read(root, "about/index.html").contains("<p>Changed</p>"));
}

#[test]
fn test_incremental_layout_change_rebuilds_error_pages_too() {
    let dir = site();
    let root = dir.path();
    let builder = builder(root);
    builder.build().unwrap();

    let layout = root.join("content/default/_layouts/main.mosaic");
    fs::write(&layout, LAYOUT.replace("<body>", "<body class=\"v2\">")).unwrap();
    let stats = builder.build_incremental(&[layout]).unwrap();

    assert_eq!(stats.pages, 3);
    assert_eq!(stats.error_pages, 1);
    assert!(read(root, "404.html").contains("<body class=\"v2\">"));
    // Styles survive the cache clear.
    assert!(read(root, "index.html").contains(".card { color: red; }"));
}

#[test]
fn test_paginates_into_page_directories() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "data/posts.json", &posts_json(23));
    write(
        root,
        "content/default/blog.mosaic",
        "\
@paginate page in posts per 5 order n
@each post in page.items
{{ post.n }}
@end
{{ page.current_page }}/{{ page.total_pages }} prev={{ page.prev_url }} next={{ page.next_url }}
@end",
    );

    let stats = builder(root).build().unwrap();

    assert_eq!(stats.pages, 5);
    assert_eq!(
        stats.files,
        [
            PathBuf::from("blog/index.html"),
            PathBuf::from("blog/page-2/index.html"),
            PathBuf::from("blog/page-3/index.html"),
            PathBuf::from("blog/page-4/index.html"),
            PathBuf::from("blog/page-5/index.html"),
        ]
    );
    assert_eq!(
        read(root, "blog/index.html"),
        "1\n2\n3\n4\n5\n1/5 prev= next=/blog/page-2/\n"
    );
    assert_eq!(
        read(root, "blog/page-2/index.html"),
        "6\n7\n8\n9\n10\n2/5 prev=/blog/ next=/blog/page-3/\n"
    );
    assert_eq!(
        read(root, "blog/page-5/index.html"),
        "21\n22\n23\n5/5 prev=/blog/page-4/ next=\n"
    );
}

#[test]
fn test_empty_pagination_still_writes_the_first_page() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "data/posts.json", "[]");
    write(
        root,
        "content/default/index.mosaic",
        "@paginate page in posts per 10\n{{ page.total_items }} items\n@end",
    );

    let stats = builder(root).build().unwrap();

    assert_eq!(stats.files, [PathBuf::from("index.html")]);
    assert_eq!(read(root, "index.html"), "0 items\n");
}

#[test]
fn test_hashed_asset_names_are_deterministic() {
    let first = site();
    let second = site();
    builder(first.path()).build().unwrap();
    builder(second.path()).build().unwrap();

    assert_eq!(
        read(first.path(), ".asset-manifest.json"),
        read(second.path(), ".asset-manifest.json")
    );
}

#[test]
fn test_external_stylesheets_are_linked_and_written_once() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "content/default/_layouts/ext.mosaic",
        "<head>\n@pull_external_styles\n</head>\n@pull",
    );
    write(root, "content/default/_components/card.mosaic", CARD);
    for page in ["a", "b"] {
        write(
            root,
            &format!("content/default/{page}.mosaic"),
            "@layout ext\n@comp card title=\"x\"\n@end",
        );
    }

    builder(root).build().unwrap();

    let a = read(root, "a/index.html");
    let b = read(root, "b/index.html");
    let link_line = |html: &str| html.lines().find(|l| l.contains("<link")).unwrap().to_string();
    assert_eq!(link_line(&a), link_line(&b));

    let css: Vec<_> = fs::read_dir(root.join("dist/css"))
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(css.len(), 1);
    let name = css[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("styles-") && name.ends_with(".css"));
    assert!(link_line(&a).contains(&format!("/css/{name}")));
}
