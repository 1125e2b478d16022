//! File type guesses used for icons and raw downloads.

use std::path::Path;

fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Icon class for a file name.
pub fn icon(path: &str) -> String {
    let ext = extension(path);
    let class = match ext.as_deref() {
        Some("c") => "c",
        Some("h" | "hh" | "hpp" | "hxx") => "h",
        Some("cc" | "cpp" | "cxx" | "c++") => "cpp",
        Some("rs") => "rs",
        Some("py") => "py",
        Some("js" | "jsm" | "mjs") => "js",
        Some("html" | "htm" | "xhtml") => "html",
        Some("css") => "css",
        Some("java") => "java",
        Some("md" | "txt" | "rst") => "txt",
        Some("sh" | "bash") => "sh",
        Some("mk") => "mk",
        _ if is_image(path) => "image",
        _ => "unknown",
    };
    format!("type-{}", class)
}

pub fn is_image(path: &str) -> bool {
    matches!(
        extension(path).as_deref(),
        Some("png" | "jpg" | "jpeg" | "gif" | "bmp" | "ico" | "svg" | "webp")
    )
}

/// MIME type guessed from the extension.
pub fn guess_type(path: &str) -> Option<&'static str> {
    let mime = match extension(path)?.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "ico" => "image/vnd.microsoft.icon",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" | "c" | "h" | "cpp" | "cc" | "hpp" | "rs" | "py" => "text/plain",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icons() {
        assert_eq!(icon("src/main.cpp"), "type-cpp");
        assert_eq!(icon("include/A.HPP"), "type-h");
        assert_eq!(icon("logo.png"), "type-image");
        assert_eq!(icon("Makefile"), "type-unknown");
    }

    #[test]
    fn test_guess_type() {
        assert_eq!(guess_type("a/b.PNG"), Some("image/png"));
        assert_eq!(guess_type("a/b"), None);
        assert!(is_image("x.svg"));
        assert!(!is_image("x.c"));
    }
}
