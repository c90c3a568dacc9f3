//! Markdown rendering of captured thread payloads.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

const THREAD_BASE_URL: &str = "https://www.perplexity.ai/search/";

static ACTION_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(.*?)\]\(pplx://.*?\)").expect("static regex"));
static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("static regex"));

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConversationResponse {
    #[serde(default)]
    pub entries: Vec<ThreadEntry>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadEntry {
    pub thread_url_slug: String,
    pub updated_datetime: String,
    pub query_str: String,
    pub blocks: Vec<AnswerBlock>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnswerBlock {
    pub intended_usage: String,
    pub markdown_block: Option<MarkdownBlock>,
    pub sources_mode_block: Option<SourcesBlock>,
    pub image_mode_block: Option<MediaBlock>,
    pub video_mode_block: Option<MediaBlock>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MarkdownBlock {
    pub answer: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourcesBlock {
    pub rows: Vec<SourceRow>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourceRow {
    pub web_result: WebResult,
    pub citation: Option<Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebResult {
    pub name: String,
    pub url: String,
    pub snippet: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MediaBlock {
    pub media_items: Vec<MediaItem>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MediaItem {
    pub name: String,
    pub url: String,
    pub image: String,
    pub image_width: f64,
    pub image_height: f64,
}

/// Render a raw captured payload.
pub fn render_payload(payload: &Value) -> Result<String, serde_json::Error> {
    let conversation = ConversationResponse::deserialize(payload)?;
    Ok(render_conversation(&conversation))
}

pub fn render_conversation(conversation: &ConversationResponse) -> String {
    let entries = &conversation.entries;
    let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
        return String::new();
    };

    let mut items = vec![format!(
        "---\nPerplexity URL: {THREAD_BASE_URL}{}\nLast updated: {}\n---",
        first.thread_url_slug, last.updated_datetime
    )];

    for (index, entry) in entries.iter().enumerate() {
        if index > 0 {
            items.push("* * *".to_string());
        }

        let heading = entry.query_str.split('\n').next().unwrap_or_default();
        items.push(format!("# {heading}"));
        items.push(format!(
            ">[!important] {}",
            entry.query_str.split('\n').collect::<Vec<_>>().join("\n> ")
        ));

        let block = |usage: &str| {
            entry
                .blocks
                .iter()
                .find(|block| block.intended_usage == usage)
        };

        if let Some(images) = block("image_answer_mode").and_then(|b| b.image_mode_block.as_ref()) {
            items.push(render_images(images));
        }
        if let Some(videos) = block("video_answer_mode").and_then(|b| b.video_mode_block.as_ref()) {
            items.push(render_videos(videos));
        }
        if let Some(answer) = block("ask_text").and_then(|b| b.markdown_block.as_ref()) {
            items.push(cleanup_answer(&answer.answer, index));
        }
        if let Some(sources) =
            block("sources_answer_mode").and_then(|b| b.sources_mode_block.as_ref())
        {
            items.push(render_sources(sources, index));
        }
    }

    items.join("\n\n")
}

fn cleanup_answer(answer: &str, entry_index: usize) -> String {
    let without_links = ACTION_LINK.replace_all(answer, "$1");
    CITATION
        .replace_all(&without_links, |caps: &Captures<'_>| {
            format!(" [[#^{}-{}]] ", entry_index + 1, &caps[1])
        })
        .into_owned()
}

fn render_sources(sources: &SourcesBlock, entry_index: usize) -> String {
    let mut text = format!("## {} Sources\n\n", sources.rows.len());
    for row in &sources.rows {
        let web = &row.web_result;
        if web.url.starts_with("http") {
            text.push_str(&format!("- [{}]({}) {}", web.name, web.url, host_label(&web.url)));
        } else {
            text.push_str(&format!("- {} ({})", web.name, web.url));
        }
        if let Some(snippet) = web.snippet.as_deref().filter(|s| !s.is_empty()) {
            text.push_str(&format!("\n    {snippet}"));
        }
        if let Some(citation) = row.citation.as_ref().and_then(citation_label) {
            text.push_str(&format!(" ^{}-{citation}", entry_index + 1));
        }
        text.push('\n');
    }
    text
}

fn render_images(images: &MediaBlock) -> String {
    let line = images
        .media_items
        .iter()
        .map(|item| {
            let width = if item.image_height > 0.0 {
                item.image_width * 100.0 / item.image_height
            } else {
                item.image_width
            };
            format!(
                "[![{}|{:.0}x100]({})]({})",
                item.name,
                width.round(),
                item.image,
                item.url
            )
        })
        .collect::<Vec<_>>()
        .join(" ");
    format!("{line}\n")
}

fn render_videos(videos: &MediaBlock) -> String {
    videos
        .media_items
        .iter()
        .map(|item| format!("- 📺 [{}]({}) {}\n", item.name, item.url, host_label(&item.url)))
        .collect()
}

fn host_label(url: &str) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| host.replacen("www.", "", 1)))
        .unwrap_or_else(|| url.to_string());
    format!("({host})")
}

fn citation_label(citation: &Value) -> Option<String> {
    match citation {
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
