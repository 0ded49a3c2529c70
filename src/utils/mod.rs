use anyhow::Result;
use url::Url;

/// Validate a URL and return normalized version
pub fn validate_and_normalize_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed.to_string())
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    let sanitized = filename
        .chars()
        .map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' => c,
            _ => '_',
        })
        .collect::<String>();

    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized
    }
}

/// Fold newlines and cut long text to `max_chars`, marking the cut with `...`
pub fn truncate_title(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace(['\r', '\n'], " ").trim().to_string();

    if cleaned.chars().count() > max_chars {
        let kept: String = cleaned.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept.trim_end())
    } else {
        cleaned
    }
}

/// Minimal escaping for text placed inside HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
