use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::errors::{GraphError, GraphResult};

static WIKILINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]+))?\]\]").expect("wikilink regex"));
static INLINE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)#([\p{L}_][\p{L}\p{N}_/-]*)").expect("tag regex"));

/// Optional `+++` TOML header of a note. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrontMatter {
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// TOML datetime, RFC 3339 string or `YYYY-MM-DD`.
    pub created: Option<toml::Value>,
}

impl FrontMatter {
    /// `created` as epoch milliseconds, when it parses.
    pub fn created_ms(&self) -> Option<i64> {
        let raw = match self.created.as_ref()? {
            toml::Value::Datetime(dt) => dt.to_string(),
            toml::Value::String(s) => s.clone(),
            _ => return None,
        };
        parse_timestamp(&raw)
    }
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLink {
    /// Link target without alias or `#heading` suffix.
    pub target: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedNote {
    pub front: FrontMatter,
    pub body: String,
    pub links: Vec<WikiLink>,
    /// Front matter tags followed by inline `#tags`, deduplicated.
    pub tags: Vec<String>,
}

impl ParsedNote {
    /// Front matter title, else the first heading.
    pub fn title(&self) -> Option<String> {
        self.front
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| {
                self.body.lines().find_map(|line| {
                    line.trim_start()
                        .strip_prefix("# ")
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                })
            })
    }
}

pub fn parse_note(raw: &str) -> GraphResult<ParsedNote> {
    let (front, body) = match split_front_matter(raw)? {
        Some((front, body)) => (toml::from_str::<FrontMatter>(&front)?, body),
        None => (FrontMatter::default(), raw.to_string()),
    };

    let links = extract_links(&body);
    let mut seen = HashSet::new();
    let tags = front
        .tags
        .iter()
        .map(|t| t.trim().trim_start_matches('#').to_string())
        .chain(extract_inline_tags(&body))
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect();

    Ok(ParsedNote {
        front,
        body,
        links,
        tags,
    })
}

/// `None` when the note has no front matter at all.
fn split_front_matter(raw: &str) -> GraphResult<Option<(String, String)>> {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with("+++") {
        return Ok(None);
    }

    let mut lines = trimmed.lines();
    lines.next();
    let mut front_lines = Vec::new();
    for line in lines.by_ref() {
        if line.trim() == "+++" {
            let front = front_lines.join("\n");
            let body = lines.collect::<Vec<_>>().join("\n");
            return Ok(Some((front, body)));
        }
        front_lines.push(line);
    }

    Err(GraphError::InvalidFrontMatter(
        "unterminated front matter".to_string(),
    ))
}

pub fn extract_links(body: &str) -> Vec<WikiLink> {
    WIKILINK
        .captures_iter(body)
        .filter_map(|cap| {
            let raw = cap.get(1)?.as_str();
            let target = raw.split('#').next().unwrap_or(raw).trim().to_string();
            if target.is_empty() {
                return None;
            }
            Some(WikiLink {
                target,
                alias: cap.get(2).map(|m| m.as_str().trim().to_string()),
            })
        })
        .collect()
}

/// `#tags` outside fenced code blocks. Headings (`# Title`) never match.
pub fn extract_inline_tags(body: &str) -> Vec<String> {
    let mut in_fence = false;
    let mut tags = Vec::new();
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        tags.extend(
            INLINE_TAG
                .captures_iter(line)
                .filter_map(|cap| cap.get(1))
                .map(|m| m.as_str().trim_end_matches('/').to_string()),
        );
    }
    tags
}
