//! File helpers for document ingestion.

use std::fs;
use std::io::Read;
use std::path::Path;

/// Whether a file is likely text, by extension and then by sniffing for NUL bytes.
pub fn is_text_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if is_binary_extension(&ext) {
            return false;
        }
        if is_text_extension(&ext) {
            return true;
        }
    }

    if let Ok(file) = fs::File::open(path) {
        let mut buffer = [0u8; 512];
        let mut reader = std::io::BufReader::new(file);
        if let Ok(n) = reader.read(&mut buffer) {
            return n == 0 || !buffer[..n].contains(&0);
        }
    }

    false
}

/// Read a UTF-8 file, refusing anything larger than `max_size` bytes.
pub fn read_file_content(path: &Path, max_size: u64) -> std::io::Result<String> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }

    fs::read_to_string(path)
}

// PDF and office formats need a decoder and are treated as binary.
fn is_binary_extension(ext: &str) -> bool {
    matches!(
        ext,
        "exe" | "dll" | "so" | "dylib" | "a" | "o" | "obj"
            | "png" | "jpg" | "jpeg" | "gif" | "bmp" | "ico" | "webp"
            | "mp3" | "mp4" | "avi" | "mkv" | "mov" | "wav" | "flac"
            | "zip" | "tar" | "gz" | "bz2" | "xz" | "7z" | "rar"
            | "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx"
            | "woff" | "woff2" | "ttf" | "otf"
            | "class" | "jar" | "pyc" | "db" | "sqlite" | "sqlite3" | "bin" | "dat"
    )
}

fn is_text_extension(ext: &str) -> bool {
    matches!(
        ext,
        "txt" | "md" | "markdown" | "rst" | "adoc" | "org" | "log"
            | "csv" | "tsv" | "json" | "jsonl" | "yaml" | "yml" | "toml" | "xml" | "ini"
            | "html" | "htm"
            | "rs" | "py" | "js" | "ts" | "go" | "java" | "c" | "h" | "cpp" | "sh" | "sql"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_is_binary_extension() {
        assert!(is_binary_extension("exe"));
        assert!(is_binary_extension("pdf"));
        assert!(!is_binary_extension("txt"));
    }

    #[test]
    fn test_is_text_extension() {
        assert!(is_text_extension("md"));
        assert!(is_text_extension("csv"));
        assert!(!is_text_extension("png"));
    }

    #[test]
    fn test_is_text_file() {
        assert!(is_text_file(&PathBuf::from("notes.txt")));
        assert!(!is_text_file(&PathBuf::from("scan.pdf")));
    }

    #[test]
    fn test_sniffs_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("README");
        std::fs::write(&text, "plain words").unwrap();
        assert!(is_text_file(&text));

        let binary = dir.path().join("blob.xyz");
        std::fs::write(&binary, [1u8, 0, 2]).unwrap();
        assert!(!is_text_file(&binary));
    }

    #[test]
    fn test_read_file_content_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "0123456789").unwrap();
        assert_eq!(read_file_content(&path, 10).unwrap(), "0123456789");
        assert!(read_file_content(&path, 9).is_err());
    }
}
