use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::extractors::{VideoMetadata, VideoReference};
use crate::utils::{escape_html, sanitize_filename};
use crate::Result;

const REPORT_STYLE: &str = "body{font-family:system-ui,-apple-system,sans-serif;max-width:760px;margin:2rem auto;padding:0 1rem;line-height:1.6;color:#1f2933}\
header{border-bottom:1px solid #d9e2ec;margin-bottom:1.5rem}\
h1{font-size:1.6rem;margin-bottom:.25rem}\
.meta{color:#627d98;font-size:.9rem}\
footer{margin-top:2rem;color:#9fb3c8;font-size:.8rem}";

/// Render a standalone HTML report for a summary
pub fn render_report(
    metadata: &VideoMetadata,
    summary_html: &str,
    reference: &VideoReference,
) -> String {
    render_report_at(metadata, summary_html, reference, Utc::now())
}

/// Render a report with an explicit generation time
pub fn render_report_at(
    metadata: &VideoMetadata,
    summary_html: &str,
    reference: &VideoReference,
    generated_at: DateTime<Utc>,
) -> String {
    let title = escape_html(&metadata.title);
    let author = escape_html(&metadata.author_name);
    let source_url = escape_html(&reference.source_url());
    let platform = reference.source_kind().platform_name();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} - Summary</title>
<style>{REPORT_STYLE}</style>
</head>
<body>
<header>
<h1>{title}</h1>
<p class="meta">By {author} on {platform} &middot; <a href="{source_url}">{source_url}</a></p>
</header>
<main>
{summary}
</main>
<footer>Generated {timestamp}</footer>
</body>
</html>
"#,
        summary = summary_html.trim(),
        timestamp = generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Transcript and report files kept per video id
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn transcript_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", sanitize_filename(id)))
    }

    pub fn summary_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}_summary.html", sanitize_filename(id)))
    }

    /// Write the transcript, overwriting any earlier run for the same id
    pub fn save_transcript(&self, id: &str, transcript: &str) -> Result<PathBuf> {
        self.write(self.transcript_path(id), transcript)
    }

    pub fn save_summary(&self, id: &str, report_html: &str) -> Result<PathBuf> {
        self.write(self.summary_path(id), report_html)
    }

    /// `None` when no transcript was saved for `id`
    pub fn read_transcript(&self, id: &str) -> Result<Option<String>> {
        Self::read(&self.transcript_path(id))
    }

    pub fn read_summary(&self, id: &str) -> Result<Option<String>> {
        Self::read(&self.summary_path(id))
    }

    fn write(&self, path: PathBuf, content: &str) -> Result<PathBuf> {
        fs_err::create_dir_all(&self.dir)?;
        fs_err::write(&path, content)?;
        tracing::debug!("Wrote {}", path.display());
        Ok(path)
    }

    fn read(path: &Path) -> Result<Option<String>> {
        match fs_err::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
