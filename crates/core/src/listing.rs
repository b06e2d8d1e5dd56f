//! Directory listings, tree rendering, and recursive search.

use serde::Serialize;

use crate::error::{FsError, FsResult};
use crate::glob::{self, GlobMatcher};
use crate::inode::FileType;
use crate::path::join;
use crate::vfs::VirtualFs;

// ---------------------------------------------------------------------------
// tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeFormat {
    #[default]
    Ascii,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    pub max_depth: Option<usize>,
    pub show_hidden: bool,
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    pub show_size: bool,
    pub dirs_first: bool,
    pub format: TreeFormat,
}

#[derive(Debug)]
pub enum TreeOutput {
    Ascii(String),
    Json(serde_json::Value),
}

#[derive(Debug, Serialize)]
struct TreeNode {
    name: String,
    #[serde(rename = "type")]
    file_type: FileType,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<TreeNode>>,
}

// ---------------------------------------------------------------------------
// listDir
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListSort {
    #[default]
    Name,
    Size,
    Date,
}

impl ListSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(ListSort::Name),
            "size" => Some(ListSort::Size),
            "date" => Some(ListSort::Date),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub pattern: Option<String>,
    pub show_hidden: bool,
    pub with_details: bool,
    pub sort: ListSort,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
    pub group_directories: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub entries: Vec<ListEntry>,
    pub total: usize,
    /// Entries past the window; rendered as a "… N more" indicator.
    pub remaining: usize,
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub exclude: Vec<String>,
    pub max_depth: Option<usize>,
    pub show_hidden: bool,
    pub limit: Option<usize>,
    pub content_search: Option<String>,
    pub case_sensitive: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            exclude: Vec::new(),
            max_depth: None,
            show_hidden: false,
            limit: None,
            content_search: None,
            case_sensitive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
}

fn compile_all(patterns: &[String]) -> FsResult<Vec<GlobMatcher>> {
    patterns.iter().map(|p| glob::compile(p, true)).collect()
}

fn excluded(name: &str, rel: &str, matchers: &[GlobMatcher]) -> bool {
    matchers.iter().any(|m| {
        if m.matches_full_path() {
            m.is_match(rel)
        } else {
            m.is_match(name)
        }
    })
}

impl VirtualFs {
    /// Depth-limited tree view of a directory.
    pub fn tree(&self, path: &str, opts: &TreeOptions) -> FsResult<TreeOutput> {
        let path = self.validator.normalize(path)?;
        let root_inode = self.graph.lookup(&path, true)?;
        if !root_inode.is_dir() {
            return Err(FsError::not_dir(&path));
        }
        let exclude = compile_all(&opts.exclude)?;
        let include = compile_all(&opts.include)?;
        let children = self.tree_children(&path, 1, opts, &exclude, &include)?;

        let root_name = if path == "/" { "/".to_string() } else { path.clone() };
        match opts.format {
            TreeFormat::Json => {
                let root = TreeNode {
                    name: root_name,
                    file_type: FileType::Directory,
                    size: None,
                    children: Some(children),
                };
                Ok(TreeOutput::Json(serde_json::to_value(root).map_err(|e| {
                    FsError::internal(format!("tree serialization failed: {e}"))
                })?))
            }
            TreeFormat::Ascii => {
                let mut out = String::new();
                out.push_str(&root_name);
                out.push('\n');
                render_ascii(&children, "", &mut out, opts.show_size);
                Ok(TreeOutput::Ascii(out))
            }
        }
    }

    fn tree_children(
        &self,
        dir: &str,
        depth: usize,
        opts: &TreeOptions,
        exclude: &[GlobMatcher],
        include: &[GlobMatcher],
    ) -> FsResult<Vec<TreeNode>> {
        let mut entries = self.graph.readdir(dir)?;
        if opts.dirs_first {
            entries.sort_by_key(|(_, t)| *t != FileType::Directory);
        }

        let mut nodes = Vec::new();
        for (name, file_type) in entries {
            if !opts.show_hidden && name.starts_with('.') {
                continue;
            }
            let child_path = join(dir, &name);
            if excluded(&name, &child_path, exclude) {
                continue;
            }
            if file_type != FileType::Directory
                && !include.is_empty()
                && !include.iter().any(|m| m.is_match(&name))
            {
                continue;
            }

            let inode = match self.graph.lookup(&child_path, false) {
                Ok(inode) => inode,
                Err(_) => continue,
            };
            let children = if file_type == FileType::Directory
                && opts.max_depth.is_none_or(|max| depth < max)
            {
                Some(self.tree_children(&child_path, depth + 1, opts, exclude, include)?)
            } else {
                None
            };
            nodes.push(TreeNode {
                name,
                file_type,
                size: opts.show_size.then(|| inode.size()),
                children,
            });
        }
        Ok(nodes)
    }

    /// Directory listing with filtering, sorting, and windowing.
    pub fn list_dir(&self, path: &str, opts: &ListOptions) -> FsResult<ListResult> {
        let path = self.validator.normalize(path)?;
        let matcher = match opts.pattern.as_deref() {
            Some(p) => Some(glob::compile(p, true)?),
            None => None,
        };

        let mut entries = Vec::new();
        for (name, file_type) in self.graph.readdir(&path)? {
            if !opts.show_hidden && name.starts_with('.') {
                continue;
            }
            if let Some(ref m) = matcher {
                if !m.is_match(&name) {
                    continue;
                }
            }
            let inode = match self.graph.lookup(&join(&path, &name), false) {
                Ok(inode) => inode,
                Err(_) => continue,
            };
            entries.push(ListEntry {
                name,
                file_type,
                size: opts.with_details.then(|| inode.size()),
                mtime: opts.with_details.then_some(inode.mtime),
                mode: opts.with_details.then_some(inode.mode),
            });
        }

        // Sorting needs size/date even when details are not requested, so we
        // re-read lazily only for those keys.
        match opts.sort {
            ListSort::Name => entries.sort_by(|a, b| a.name.cmp(&b.name)),
            ListSort::Size => {
                entries.sort_by_key(|e| self.entry_size(&path, &e.name));
            }
            ListSort::Date => {
                entries.sort_by_key(|e| self.entry_mtime(&path, &e.name));
            }
        }
        if opts.order == SortOrder::Desc {
            entries.reverse();
        }
        if opts.group_directories {
            entries.sort_by_key(|e| e.file_type != FileType::Directory);
        }

        let total = entries.len();
        let windowed: Vec<ListEntry> = entries
            .into_iter()
            .skip(opts.offset)
            .take(opts.limit.unwrap_or(usize::MAX))
            .collect();
        let remaining = total - opts.offset.min(total) - windowed.len().min(total);
        Ok(ListResult { entries: windowed, total, remaining })
    }

    fn entry_size(&self, dir: &str, name: &str) -> u64 {
        self.graph.lookup(&join(dir, name), false).map(|i| i.size()).unwrap_or(0)
    }

    fn entry_mtime(&self, dir: &str, name: &str) -> u64 {
        self.graph.lookup(&join(dir, name), false).map(|i| i.mtime).unwrap_or(0)
    }

    /// Recursive glob search, optionally with substring content matching.
    pub fn search(
        &self,
        root: &str,
        pattern: &str,
        opts: &SearchOptions,
    ) -> FsResult<Vec<SearchMatch>> {
        let root = self.validator.normalize(root)?;
        let matcher = glob::compile(pattern, opts.case_sensitive)?;
        let exclude = compile_all(&opts.exclude)?;
        let needle = opts
            .content_search
            .as_ref()
            .map(|n| if opts.case_sensitive { n.clone() } else { n.to_lowercase() });

        let mut matches = Vec::new();
        for (path, depth, inode) in self.graph.walk(&root)? {
            if let Some(max) = opts.max_depth {
                if depth > max {
                    continue;
                }
            }
            let rel = path.strip_prefix(&root).unwrap_or(&path).trim_start_matches('/');
            let name = rel.rsplit('/').next().unwrap_or(rel);
            if !opts.show_hidden && rel.split('/').any(|seg| seg.starts_with('.')) {
                continue;
            }
            // Exclusion applies to every path component, so an excluded
            // directory prunes its whole subtree.
            let skip = exclude.iter().any(|m| {
                if m.matches_full_path() {
                    m.is_match(rel)
                } else {
                    rel.split('/').any(|seg| m.is_match(seg))
                }
            });
            if skip {
                continue;
            }
            let name_hit = if matcher.matches_full_path() {
                matcher.is_match(rel)
            } else {
                matcher.is_match(name)
            };
            if !name_hit {
                continue;
            }

            let match_count = match needle {
                None => None,
                Some(ref needle) => {
                    if inode.file_type() != FileType::File {
                        continue;
                    }
                    let Some(hash) = inode.content_hash() else { continue };
                    let Ok(bytes) = self.cas.read_all(hash) else { continue };
                    let haystack = String::from_utf8_lossy(&bytes);
                    let count = if opts.case_sensitive {
                        haystack.matches(needle.as_str()).count()
                    } else {
                        haystack.to_lowercase().matches(needle.as_str()).count()
                    };
                    if count == 0 {
                        continue;
                    }
                    Some(count)
                }
            };

            matches.push(SearchMatch { path, file_type: inode.file_type(), match_count });
            if opts.limit.is_some_and(|l| matches.len() >= l) {
                break;
            }
        }
        Ok(matches)
    }
}

fn render_ascii(nodes: &[TreeNode], prefix: &str, out: &mut String, show_size: bool) {
    for (i, node) in nodes.iter().enumerate() {
        let last = i + 1 == nodes.len();
        let connector = if last { "└── " } else { "├── " };
        out.push_str(prefix);
        out.push_str(connector);
        out.push_str(&node.name);
        if show_size {
            if let Some(size) = node.size {
                out.push_str(&format!(" ({size} bytes)"));
            }
        }
        out.push('\n');
        if let Some(ref children) = node.children {
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            render_ascii(children, &child_prefix, out, show_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn populated() -> VirtualFs {
        let fs = VirtualFs::in_memory(EngineConfig::default());
        fs.mkdir("/proj/src", true, None).unwrap();
        fs.mkdir("/proj/docs", true, None).unwrap();
        fs.write_file("/proj/readme.md", b"hello world", None).unwrap();
        fs.write_file("/proj/src/main.rs", b"fn main() { println!(\"hello\"); }", None).unwrap();
        fs.write_file("/proj/src/lib.rs", b"pub fn hello() {}", None).unwrap();
        fs.write_file("/proj/docs/guide.md", b"guide", None).unwrap();
        fs.write_file("/proj/.hidden", b"secret", None).unwrap();
        fs
    }

    #[test]
    fn ascii_tree_uses_box_drawing() {
        let fs = populated();
        let TreeOutput::Ascii(text) = fs.tree("/proj", &TreeOptions::default()).unwrap() else {
            panic!("expected ascii output");
        };
        assert!(text.starts_with("/proj\n"));
        assert!(text.contains("├── "));
        assert!(text.contains("└── "));
        assert!(text.contains("main.rs"));
        assert!(!text.contains(".hidden"));
    }

    #[test]
    fn tree_respects_depth_and_hidden() {
        let fs = populated();
        let opts = TreeOptions { max_depth: Some(1), show_hidden: true, ..Default::default() };
        let TreeOutput::Ascii(text) = fs.tree("/proj", &opts).unwrap() else {
            panic!("expected ascii output");
        };
        assert!(text.contains(".hidden"));
        assert!(text.contains("src"));
        assert!(!text.contains("main.rs"), "depth 1 must not descend: {text}");
    }

    #[test]
    fn json_tree_nests_children() {
        let fs = populated();
        let opts = TreeOptions {
            format: TreeFormat::Json,
            show_size: true,
            ..Default::default()
        };
        let TreeOutput::Json(json) = fs.tree("/proj", &opts).unwrap() else {
            panic!("expected json output");
        };
        assert_eq!(json["type"], "directory");
        let children = json["children"].as_array().unwrap();
        let readme = children.iter().find(|c| c["name"] == "readme.md").unwrap();
        assert_eq!(readme["type"], "file");
        assert_eq!(readme["size"], 11);
    }

    #[test]
    fn tree_dirs_first_ordering() {
        let fs = populated();
        let opts = TreeOptions { dirs_first: true, ..Default::default() };
        let TreeOutput::Ascii(text) = fs.tree("/proj", &opts).unwrap() else {
            panic!("expected ascii output");
        };
        let readme_at = text.find("readme.md").unwrap();
        let docs_at = text.find("docs").unwrap();
        let src_at = text.find("src").unwrap();
        assert!(docs_at < readme_at && src_at < readme_at);
    }

    #[test]
    fn list_dir_pattern_and_window() {
        let fs = populated();
        let opts = ListOptions {
            pattern: Some("*.rs".to_string()),
            ..Default::default()
        };
        let result = fs.list_dir("/proj/src", &opts).unwrap();
        assert_eq!(result.total, 2);
        let names: Vec<&str> = result.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["lib.rs", "main.rs"]);

        let opts = ListOptions { limit: Some(1), ..Default::default() };
        let result = fs.list_dir("/proj/src", &opts).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.remaining, 1);
    }

    #[test]
    fn list_dir_sort_by_size_desc() {
        let fs = populated();
        let opts = ListOptions {
            sort: ListSort::Size,
            order: SortOrder::Desc,
            with_details: true,
            ..Default::default()
        };
        let result = fs.list_dir("/proj/src", &opts).unwrap();
        let sizes: Vec<u64> = result.entries.iter().map(|e| e.size.unwrap()).collect();
        assert!(sizes[0] >= sizes[1]);
    }

    #[test]
    fn list_dir_groups_directories() {
        let fs = populated();
        let opts = ListOptions { group_directories: true, ..Default::default() };
        let result = fs.list_dir("/proj", &opts).unwrap();
        assert_eq!(result.entries[0].file_type, FileType::Directory);
        assert_eq!(result.entries[1].file_type, FileType::Directory);
    }

    #[test]
    fn search_by_glob() {
        let fs = populated();
        let matches = fs.search("/proj", "*.md", &SearchOptions::default()).unwrap();
        let paths: Vec<&str> = matches.iter().map(|m| m.path.as_str()).collect();
        assert!(paths.contains(&"/proj/readme.md"));
        assert!(paths.contains(&"/proj/docs/guide.md"));
        assert!(!paths.iter().any(|p| p.ends_with(".rs")));
    }

    #[test]
    fn search_with_double_star() {
        let fs = populated();
        let matches = fs.search("/proj", "**/*.rs", &SearchOptions::default()).unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn search_content_counts_matches() {
        let fs = populated();
        let opts = SearchOptions {
            content_search: Some("hello".to_string()),
            ..Default::default()
        };
        let matches = fs.search("/proj", "*", &opts).unwrap();
        let main = matches.iter().find(|m| m.path.ends_with("main.rs")).unwrap();
        assert_eq!(main.match_count, Some(1));
        assert!(matches.iter().any(|m| m.path.ends_with("readme.md")));
        assert!(!matches.iter().any(|m| m.path.ends_with("guide.md")));
    }

    #[test]
    fn search_respects_exclude_and_limit() {
        let fs = populated();
        let opts = SearchOptions {
            exclude: vec!["docs".to_string(), "*.md".to_string()],
            ..Default::default()
        };
        let matches = fs.search("/proj", "*", &opts).unwrap();
        assert!(matches.iter().all(|m| !m.path.contains("docs")));
        assert!(matches.iter().all(|m| !m.path.ends_with(".md")));

        let opts = SearchOptions { limit: Some(1), ..Default::default() };
        assert_eq!(fs.search("/proj", "*", &opts).unwrap().len(), 1);
    }

    #[test]
    fn search_case_insensitive_content() {
        let fs = populated();
        fs.write_file("/proj/caps.txt", b"HELLO Hello hello", None).unwrap();
        let opts = SearchOptions {
            content_search: Some("hello".to_string()),
            case_sensitive: false,
            ..Default::default()
        };
        let matches = fs.search("/proj", "*.txt", &opts).unwrap();
        assert_eq!(matches[0].match_count, Some(3));
    }
}
