//! Resolves source locators to plain text.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::IndexError;
use crate::models::IndexingConfig;
use crate::utils::file::{is_text_file, read_file_content};

/// Raw text of one source plus its provenance identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct DocumentLoader {
    client: Client,
    max_file_size: u64,
}

impl DocumentLoader {
    pub fn new(config: &IndexingConfig) -> Result<Self, IndexError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| IndexError::InvalidSource(e.to_string()))?;
        Ok(Self {
            client,
            max_file_size: config.max_file_size,
        })
    }

    /// File path → direct read, `http(s)://` → fetch, anything else → `InvalidSource`.
    pub async fn load(&self, locator: &str) -> Result<LoadedDocument, IndexError> {
        let source = normalize_source(locator);

        if is_web_url(locator) {
            let text = self.fetch(locator).await?;
            return Ok(LoadedDocument { source, text });
        }

        let path = Path::new(locator.strip_prefix("file://").unwrap_or(locator));
        if !path.is_file() {
            return Err(IndexError::InvalidSource(format!(
                "{} is neither a readable file nor a web URL",
                locator
            )));
        }
        if !is_text_file(path) {
            return Err(IndexError::InvalidSource(format!(
                "{} is not a text file",
                path.display()
            )));
        }

        let text = read_file_content(path, self.max_file_size)
            .map_err(|e| IndexError::InvalidSource(format!("{}: {}", path.display(), e)))?;
        debug!(source = %source, bytes = text.len(), "file loaded");
        Ok(LoadedDocument { source, text })
    }

    async fn fetch(&self, url: &str) -> Result<String, IndexError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IndexError::InvalidSource(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(IndexError::InvalidSource(format!(
                "{}: status {}",
                url,
                response.status()
            )));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("html"));
        let body = response
            .text()
            .await
            .map_err(|e| IndexError::InvalidSource(format!("{}: {}", url, e)))?;

        debug!(url, bytes = body.len(), is_html, "page fetched");
        Ok(if is_html { html_to_text(&body) } else { body })
    }
}

pub fn is_web_url(locator: &str) -> bool {
    let lower = locator.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Provenance identifier: web URLs lose their query string and fragment,
/// file paths are kept as given.
pub fn normalize_source(locator: &str) -> String {
    let trimmed = locator.trim();
    if !is_web_url(trimmed) {
        return trimmed.to_string();
    }
    let end = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
    trimmed[..end].to_string()
}

static RE_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>").unwrap());
static RE_BLOCK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(br|/p|/div|/li|/h[1-6]|/tr)\b[^>]*>").unwrap());
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r\f]+").unwrap());
static RE_MULTI_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").unwrap());

pub fn html_to_text(html: &str) -> String {
    let text = RE_SCRIPT.replace_all(html, " ");
    let text = RE_BLOCK_TAG.replace_all(&text, "\n");
    let text = RE_TAG.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let text = RE_SPACES.replace_all(&text, " ");
    let text = RE_MULTI_BLANK_LINES.replace_all(&text, "\n\n");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Text files under `root`, skipping paths matched by any exclude glob.
pub fn collect_files(root: &Path, exclude_patterns: &[String]) -> Result<Vec<PathBuf>, IndexError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        return Err(IndexError::InvalidSource(format!(
            "{} does not exist",
            root.display()
        )));
    }

    let patterns: Vec<glob::Pattern> = exclude_patterns
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| IndexError::InvalidSource(e.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let path_str = path.to_string_lossy();
        if patterns.iter().any(|p| p.matches(&path_str)) {
            continue;
        }
        if is_text_file(path) {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_source_strips_query_and_fragment() {
        assert_eq!(
            normalize_source("https://example.com/doc.pdf?sv=2021&sig=abc"),
            "https://example.com/doc.pdf"
        );
        assert_eq!(normalize_source("https://example.com/a#intro"), "https://example.com/a");
        assert_eq!(normalize_source("docs/A.txt"), "docs/A.txt");
        assert_eq!(normalize_source("notes/week#1.txt"), "notes/week#1.txt");
        assert_eq!(normalize_source("what?.md"), "what?.md");
    }

    #[tokio::test]
    async fn test_load_file_with_hash_in_name_keeps_full_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes#1.txt");
        fs::write(&path, "First meeting notes.").unwrap();

        let loader = DocumentLoader::new(&IndexingConfig::default()).unwrap();
        let doc = loader.load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(doc.source, path.to_str().unwrap());
        assert_eq!(doc.text, "First meeting notes.");
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><style>p{color:red}</style><script>var x=1;</script></head>\
            <body><h1>Title</h1><p>Fish &amp; chips</p><p>Second</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Fish & chips"));
        assert!(text.contains("Second"));
        assert!(!text.contains("color"));
        assert!(!text.contains("var x"));
        assert!(!text.contains('<'));
    }

    #[tokio::test]
    async fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.txt");
        fs::write(&path, "Paris is the capital of France.").unwrap();

        let loader = DocumentLoader::new(&IndexingConfig::default()).unwrap();
        let doc = loader.load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(doc.text, "Paris is the capital of France.");
        assert_eq!(doc.source, path.to_str().unwrap());
    }

    #[tokio::test]
    async fn test_load_invalid_source() {
        let loader = DocumentLoader::new(&IndexingConfig::default()).unwrap();
        assert!(matches!(
            loader.load("/definitely/not/here.txt").await,
            Err(IndexError::InvalidSource(_))
        ));
        assert!(matches!(
            loader.load("ftp://example.com/file").await,
            Err(IndexError::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn test_load_rejects_oversize_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "x".repeat(64)).unwrap();

        let config = IndexingConfig {
            max_file_size: 16,
            ..Default::default()
        };
        let loader = DocumentLoader::new(&config).unwrap();
        assert!(matches!(
            loader.load(path.to_str().unwrap()).await,
            Err(IndexError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_collect_files_applies_excludes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::write(dir.path().join("b.png"), [0u8, 1, 2]).unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules").join("c.js"), "c").unwrap();

        let files = collect_files(dir.path(), &["**/node_modules/**".to_string()]).unwrap();
        assert_eq!(files, vec![dir.path().join("a.md")]);
    }
}
