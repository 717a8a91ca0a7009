/// Manuscript loading: optional YAML front matter plus plain-text or
/// Markdown prose.
///
/// Markdown is flattened to paragraphs separated by blank lines; headings
/// survive as `#`-prefixed paragraphs so section detection still sees them.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Story metadata a manuscript may carry in its front matter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontMatter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub target_age: Option<String>,
    #[serde(default)]
    pub persona: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manuscript {
    pub front_matter: FrontMatter,
    pub text: String,
}

/// Splits `---` delimited YAML front matter from the body.
pub fn split_front_matter(content: &str) -> Result<(Option<FrontMatter>, String)> {
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() < 2 || lines[0].trim() != "---" {
        return Ok((None, content.to_string()));
    }

    let Some(end_idx) = lines[1..].iter().position(|l| l.trim() == "---").map(|i| i + 1) else {
        bail!("front matter not closed");
    };

    let yaml = lines[1..end_idx].join("\n");
    let front_matter = if yaml.trim().is_empty() {
        FrontMatter::default()
    } else {
        serde_yaml::from_str(&yaml).context("invalid front matter")?
    };
    let body = lines[end_idx + 1..].join("\n");
    Ok((Some(front_matter), body))
}

/// Flattens Markdown to prose paragraphs.
pub fn markdown_to_prose(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                out.push_str(&"#".repeat(level as usize));
                out.push(' ');
            }
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
            )
            | Event::Rule => out.push_str("\n\n"),
            _ => {}
        }
    }

    out.trim().to_string()
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
}

/// Reads a manuscript from disk. `.md`/`.markdown` files are flattened,
/// anything else is taken verbatim.
pub fn load(path: &Path) -> Result<Manuscript> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read manuscript: {}", path.display()))?;
    let (front_matter, body) = split_front_matter(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let text = if is_markdown(path) {
        markdown_to_prose(&body)
    } else {
        body
    };
    debug!(
        "Loaded {} ({} chars, front matter: {})",
        path.display(),
        text.len(),
        front_matter.is_some()
    );

    Ok(Manuscript {
        front_matter: front_matter.unwrap_or_default(),
        text,
    })
}
