/// Minimum chunk size; smaller sections are merged into the next one.
pub const MIN_CHUNK_CHARS: usize = 200;
/// Sections longer than this are split on paragraph boundaries.
pub const MAX_CHUNK_CHARS: usize = 4000;

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub heading: String,
    pub content: String,
    pub index: usize,
}

impl Chunk {
    /// Text sent to the embedding model.
    pub fn embedding_input(&self) -> String {
        format!("{}\n\n{}", self.heading, self.content)
    }
}

/// Split a note body into heading sections, merge tiny ones and split
/// oversized ones. `fallback_heading` names text before the first heading.
pub fn chunk_markdown(body: &str, fallback_heading: &str) -> Vec<Chunk> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut heading = fallback_heading.to_string();
    let mut lines: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        match heading_text(line).filter(|_| !in_fence) {
            Some(next) => {
                push_section(&mut sections, &heading, &lines);
                heading = next;
                lines.clear();
            }
            None => lines.push(line),
        }
    }
    push_section(&mut sections, &heading, &lines);

    let mut chunks: Vec<Chunk> = Vec::new();
    for (heading, content) in merge_small(sections) {
        for piece in split_large(&content) {
            chunks.push(Chunk {
                heading: heading.clone(),
                content: piece,
                index: chunks.len(),
            });
        }
    }
    chunks
}

fn push_section(sections: &mut Vec<(String, String)>, heading: &str, lines: &[&str]) {
    let content = lines.join("\n").trim().to_string();
    if !content.is_empty() {
        sections.push((heading.to_string(), content));
    }
}

fn heading_text(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim();
    (!title.is_empty()).then(|| title.to_string())
}

fn merge_small(sections: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::new();
    let mut pending: Option<(String, String)> = None;
    for (heading, content) in sections {
        let next = match pending.take() {
            Some((pending_heading, mut pending_content)) => {
                pending_content.push_str("\n\n");
                pending_content.push_str(&content);
                (pending_heading, pending_content)
            }
            None => (heading, content),
        };
        if next.1.len() < MIN_CHUNK_CHARS {
            pending = Some(next);
        } else {
            merged.push(next);
        }
    }
    if let Some(rest) = pending {
        match merged.last_mut() {
            Some(last) => {
                last.1.push_str("\n\n");
                last.1.push_str(&rest.1);
            }
            None => merged.push(rest),
        }
    }
    merged
}

fn split_large(content: &str) -> Vec<String> {
    if content.len() <= MAX_CHUNK_CHARS {
        return vec![content.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for paragraph in content.split("\n\n") {
        if !current.is_empty() && current.len() + paragraph.len() + 2 > MAX_CHUNK_CHARS {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
