/// Optional path filters applied while a search job discovers files.
///
/// All of them default to "include everything": a job with no extensions,
/// no ignore patterns and binary skipping off searches every regular file
/// under its root.
use glob::Pattern;
use std::path::Path;

/// Checks if a file should be included in the search based on its extension
pub fn has_valid_extension(path: &Path, extensions: &Option<Vec<String>>) -> bool {
    match extensions {
        None => true,
        Some(exts) => {
            if let Some(ext) = path.extension() {
                if let Some(ext_str) = ext.to_str() {
                    return exts.iter().any(|e| e.eq_ignore_ascii_case(ext_str));
                }
            }
            false
        }
    }
}

/// Compiles glob ignore patterns, skipping any that are malformed.
pub fn compile_patterns(ignore_patterns: &[String]) -> Vec<Pattern> {
    ignore_patterns
        .iter()
        .filter_map(|pattern| match Pattern::new(pattern) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!("Ignoring malformed glob {:?}: {}", pattern, e);
                None
            }
        })
        .collect()
}

/// Checks if a file matches any of the compiled ignore patterns
pub fn should_ignore(path: &Path, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let normalized_path = path.to_string_lossy().replace('\\', "/");
    patterns.iter().any(|p| p.matches(&normalized_path))
}

/// Checks if a file is likely to be binary
pub fn is_likely_binary(path: &Path) -> bool {
    const BINARY_EXTENSIONS: &[&str] = &[
        "exe", "dll", "so", "dylib", "bin", "obj", "o", "class", "jar", "war", "ear", "png", "jpg",
        "jpeg", "gif", "bmp", "ico", "pdf", "doc", "docx", "xls", "xlsx", "zip", "tar", "gz", "7z",
        "rar",
    ];

    if let Some(ext) = path.extension() {
        if let Some(ext_str) = ext.to_str() {
            return BINARY_EXTENSIONS
                .iter()
                .any(|&bin_ext| bin_ext.eq_ignore_ascii_case(ext_str));
        }
    }
    false
}
