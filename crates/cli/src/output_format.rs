use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use treeidx_engine::service::{FileView, FolderView};
use treeidx_engine::{BrowseView, SearchResponse, SearchResult};

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Coloured, human-readable (default)
    Human,
    /// Grep-like: path:line:text
    Grep,
    /// The JSON body a client would receive
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "human" | "default" => Ok(Self::Human),
            "grep" => Ok(Self::Grep),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Unknown format: {}. Valid formats: human, grep, json", s),
        }
    }

    /// The `Accept` header that makes the service answer in this format.
    pub fn accept_header(&self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::Human | OutputFormat::Grep => "text/html",
        }
    }
}

fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Formatter for service responses
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn format_results(&self, results: &[SearchResult]) -> String {
        let mut out = Vec::new();
        for result in results {
            match self.format {
                OutputFormat::Grep => {
                    for line in &result.lines {
                        out.push(format!("{}:{}:{}", result.path, line.line_number, line.line));
                    }
                }
                _ => {
                    out.push(result.path.bold().blue().to_string());
                    for line in &result.lines {
                        out.push(format!(
                            "  {} {}",
                            format!("{:>5}", line.line_number).yellow(),
                            line.line.trim_end()
                        ));
                    }
                }
            }
        }
        out.join("\n")
    }

    fn format_json(body: &Value) -> String {
        serde_json::to_string_pretty(body).unwrap_or_default()
    }

    /// Render a search response. The second value is whether it reports an
    /// error.
    pub fn format_search(&self, response: &SearchResponse) -> (String, bool) {
        match response {
            SearchResponse::Redirect(url) => (format!("→ {}", url.green()), false),
            SearchResponse::Json { status, body } => (Self::format_json(body), *status != 200),
            SearchResponse::Page { status, page } => match &page.error {
                Some(reason) => (format!("{} {}", "✗".red(), reason), *status != 200),
                None if page.results.is_empty() => ("No results".dimmed().to_string(), false),
                None => (self.format_results(&page.results), false),
            },
        }
    }

    fn format_folder(&self, folder: &FolderView) -> String {
        let mut out = vec![format!("📁 {}", folder.path.bold())];
        for entry in &folder.entries {
            let name = if entry.icon == "folder" {
                format!("{}/", entry.name).blue().bold().to_string()
            } else {
                entry.name.clone()
            };
            let size = entry.size.map(|s| s.to_string()).unwrap_or_default();
            let modified = entry
                .modified
                .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            match self.format {
                OutputFormat::Grep => out.push(entry.name.clone()),
                _ => out.push(format!("  {:<40} {:>10}  {}", name, size, modified.dimmed())),
            }
        }
        out.join("\n")
    }

    fn format_file(&self, file: &FileView) -> String {
        let mut out = vec![format!("{} ({})", file.path.bold(), file.icon.dimmed())];
        for section in &file.sections {
            out.push(format!("{}:", section.heading.cyan()));
            for item in &section.items {
                out.push(format!("  {} {}", item.title, item.href.dimmed()));
            }
        }
        match &file.lines {
            None => out.push("(binary file; use `raw` to fetch it)".dimmed().to_string()),
            Some(lines) => {
                for line in lines {
                    let badges: Vec<&str> = line.annotations.iter().map(|a| a.title.as_str()).collect();
                    let text = strip_tags(&line.html);
                    match self.format {
                        OutputFormat::Grep => out.push(format!("{}:{}:{}", file.path, line.number, text)),
                        _ if badges.is_empty() => {
                            out.push(format!("{} {}", format!("{:>5}", line.number).yellow(), text))
                        }
                        _ => out.push(format!(
                            "{} {}  {}",
                            format!("{:>5}", line.number).yellow(),
                            text,
                            format!("[{}]", badges.join(", ")).magenta()
                        )),
                    }
                }
            }
        }
        out.join("\n")
    }

    pub fn format_browse(&self, view: &BrowseView) -> String {
        if self.format == OutputFormat::Json {
            return serde_json::to_string_pretty(view).unwrap_or_default();
        }
        match view {
            BrowseView::Folder(folder) => self.format_folder(folder),
            BrowseView::File(file) => self.format_file(file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treeidx_engine::query::ResultLine;

    #[test]
    fn test_format_from_str() {
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::from_str("xml").is_err());
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(
            strip_tags("int <span class=\"def\">f</span>(a&lt;b);"),
            "int f(a<b);"
        );
    }

    #[test]
    fn test_grep_results() {
        let formatter = OutputFormatter::new(OutputFormat::Grep);
        let results = vec![SearchResult {
            icon: "type-c".into(),
            path: "a.c".into(),
            lines: vec![ResultLine {
                line_number: 3,
                line: "int x;".into(),
            }],
        }];
        assert_eq!(formatter.format_results(&results), "a.c:3:int x;");
    }
}
