//! Rendering of search results, narrative (templates) or structured (JSON).

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::errors::{GraphError, GraphResult};
use crate::models::{
    Connection, ContextIntersection, FindPathResponse, PathOutcome, PathReport, ResponseFormat,
    ScoredPath,
};
use crate::repository::PathStores;

const REPORT_HEADER: &str = "## Paths from {{link:start}} to {{link:end}}\n\n\
Found {{count}} path(s) in {{elapsed}} ms.{{fallback}}\n";

const PATH_TEMPLATE: &str = "\n### {{index}}. {{strategy}} (score {{score}})\n\n\
{{hops}}\n\n\
- {{reasoning}}\n\
- {{metrics}}\n{{insight}}";

const NOT_FOUND_TEMPLATE: &str = "No path search was run: the {{side}} note `{{path}}` {{reason}}.\n\
Check the path (vault-relative, e.g. `folder/note.md`) and re-index the vault if the note is new.\n";

const NO_PATH_TEMPLATE: &str = "## No path from {{link:start}} to {{link:end}}\n\n\
None of the strategies, including the relaxed fallback search, connected these notes.\n";

const TIMEOUT_TEMPLATE: &str = "## Search timed out\n\n\
Looking for paths from {{link:start}} to {{link:end}} took longer than {{timeout}} ms.\n\
Try again with semantic paths disabled, a smaller hop budget, or notes that are closer together.\n";

/// Fill `{{name}}` placeholders from `vars`. `{{link:name}}` renders the
/// value as a wikilink. Unknown names and unclosed braces are errors.
fn fill(template: &str, vars: &[(&str, &str)]) -> GraphResult<String> {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 2..];
        let Some(close) = tail.find("}}") else {
            return Err(GraphError::Template(format!("unclosed placeholder in {template:?}")));
        };
        let placeholder = tail[..close].trim();
        let (as_link, name) = match placeholder.strip_prefix("link:") {
            Some(name) => (true, name.trim()),
            None => (false, placeholder),
        };
        let Some((_, value)) = vars.iter().find(|(key, _)| *key == name) else {
            return Err(GraphError::Template(format!("missing template variable `{name}`")));
        };
        if as_link {
            out.push_str(&wikilink(value));
        } else {
            out.push_str(value);
        }
        rest = &tail[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// `[[target]]`, with brackets and pipes in the target swapped out so a
/// note title cannot close the link early or turn into an alias.
pub fn wikilink(target: &str) -> String {
    let target: String = target
        .chars()
        .map(|c| match c {
            '[' => '(',
            ']' => ')',
            '|' => '/',
            c => c,
        })
        .collect();
    format!("[[{target}]]")
}

/// Display label for every id, in one batched node lookup. Unknown ids map
/// to themselves.
pub async fn resolve_labels(
    stores: &PathStores,
    ids: impl IntoIterator<Item = String>,
) -> GraphResult<HashMap<String, String>> {
    let ids: Vec<String> = ids
        .into_iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let mut labels: HashMap<String, String> = stores
        .graph
        .get_by_ids(&ids)
        .await?
        .into_iter()
        .map(|node| (node.id.clone(), node.display_label()))
        .collect();
    for id in ids {
        labels.entry(id.clone()).or_insert(id);
    }
    Ok(labels)
}

fn label<'a>(labels: &'a HashMap<String, String>, id: &'a str) -> &'a str {
    labels.get(id).map(String::as_str).unwrap_or(id)
}

pub fn connection_label(connection: &Connection) -> String {
    match connection {
        Connection::Physical => "physical".to_string(),
        Connection::Semantic { similarity } => format!("semantic {:.0}%", similarity * 100.0),
    }
}

/// `[[a]] --(physical)--> [[b]] --(semantic 82%)--> [[c]]`
pub fn render_hops(path: &ScoredPath, labels: &HashMap<String, String>) -> String {
    let mut out = String::new();
    for (index, segment) in path.segments.iter().enumerate() {
        if index > 0 {
            let _ = write!(out, " --({})--> ", connection_label(&segment.connection));
        }
        out.push_str(&wikilink(label(labels, &segment.node_id)));
    }
    out
}

fn render_path(index: usize, path: &ScoredPath, labels: &HashMap<String, String>) -> GraphResult<String> {
    let score = &path.score;
    let mut metrics = format!(
        "{} hop(s), {:.0}% physical, freshness {:.2}, uniqueness {:.2}, {} domain jump(s)",
        score.length,
        score.physical_ratio * 100.0,
        score.freshness,
        score.uniqueness,
        score.domain_jumps
    );
    if score.avg_similarity > 0.0 {
        let _ = write!(metrics, ", avg similarity {:.0}%", score.avg_similarity * 100.0);
    }
    let insight = path
        .insight_label
        .as_ref()
        .map(|insight| format!("- Insight: {insight}\n"))
        .unwrap_or_default();

    fill(
        PATH_TEMPLATE,
        &[
            ("index", (index + 1).to_string().as_str()),
            ("strategy", path.strategy.display_name()),
            ("score", format!("{:.1}", score.total_score).as_str()),
            ("hops", render_hops(path, labels).as_str()),
            ("reasoning", path.reasoning.as_str()),
            ("metrics", metrics.as_str()),
            ("insight", insight.as_str()),
        ],
    )
}

fn render_context(context: &ContextIntersection) -> String {
    let mut out = String::from("\n## Context\n\n");
    if context.common_folder.is_empty() {
        out.push_str("- No shared folder.\n");
    } else {
        let _ = writeln!(
            out,
            "- Shared folder: `{}` (depth {})",
            context.common_folder, context.folder_depth
        );
    }
    if !context.shared_tags.is_empty() {
        let tags: Vec<String> = context.shared_tags.iter().map(|t| format!("#{t}")).collect();
        let _ = writeln!(out, "- Shared tags: {}", tags.join(", "));
    }
    for parent in &context.common_parents {
        let _ = writeln!(
            out,
            "- Common parent: {} ({} reference(s))",
            wikilink(&parent.label),
            parent.references
        );
    }
    if context.is_distant {
        out.push_str(
            "- These notes live far apart but share tags or parents: a bridge worth writing down.\n",
        );
    }
    out
}

fn render_report(report: &PathReport) -> GraphResult<String> {
    let fallback = if report.fallback_used {
        " Only the degraded fallback search succeeded."
    } else {
        ""
    };
    let mut out = fill(
        REPORT_HEADER,
        &[
            ("start", report.start_path.as_str()),
            ("end", report.end_path.as_str()),
            ("count", report.paths.len().to_string().as_str()),
            ("elapsed", report.elapsed_ms.to_string().as_str()),
            ("fallback", fallback),
        ],
    )?;

    for (index, path) in report.paths.iter().enumerate() {
        out.push_str(&render_path(index, path, &report.labels)?);
    }

    out.push_str("\n## Hubs\n\n");
    if report.hubs.is_empty() {
        out.push_str("- No node recurs across paths.\n");
    }
    for hub in &report.hubs {
        let _ = writeln!(
            out,
            "- {} appears in {} of {} paths (betweenness {:.2})",
            wikilink(&hub.label),
            hub.occurrences,
            report.paths.len(),
            hub.betweenness
        );
    }
    out.push_str(&render_context(&report.context));
    Ok(out)
}

impl FindPathResponse {
    /// Final text for the caller in the requested format.
    pub fn render(&self) -> GraphResult<String> {
        if self.format == ResponseFormat::Structured {
            return Ok(serde_json::to_string_pretty(self)?);
        }
        match &self.outcome {
            PathOutcome::Found(report) => render_report(report),
            PathOutcome::NotFound { side, path, reason } => fill(
                NOT_FOUND_TEMPLATE,
                &[
                    ("side", side.as_str()),
                    ("path", path.as_str()),
                    ("reason", reason.as_str()),
                ],
            ),
            PathOutcome::NoPath {
                start_path,
                end_path,
                context,
            } => {
                let mut out = fill(
                    NO_PATH_TEMPLATE,
                    &[("start", start_path.as_str()), ("end", end_path.as_str())],
                )?;
                out.push_str(&render_context(context));
                Ok(out)
            }
            PathOutcome::Timeout {
                start_path,
                end_path,
                timeout_ms,
            } => fill(
                TIMEOUT_TEMPLATE,
                &[
                    ("start", start_path.as_str()),
                    ("end", end_path.as_str()),
                    ("timeout", timeout_ms.to_string().as_str()),
                ],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EndpointSide, PathSegment, Strategy};

    #[test]
    fn hops_show_connection_kinds() {
        let path = ScoredPath::new(
            Strategy::Brainstorm,
            vec![
                PathSegment::origin("a"),
                PathSegment::new("b", Connection::Physical),
                PathSegment::new("c", Connection::Semantic { similarity: 0.823 }),
            ],
        );
        let labels: HashMap<String, String> = [("a", "inbox/a.md"), ("c", "tag:rust")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(
            render_hops(&path, &labels),
            "[[inbox/a.md]] --(physical)--> [[b]] --(semantic 82%)--> [[tag:rust]]"
        );
    }

    #[test]
    fn placeholders_and_links_are_filled() {
        let out = fill(
            "{{count}} path(s) from {{ link:start }}",
            &[("count", "2"), ("start", "Draft [v2] | notes")],
        )
        .unwrap();
        assert_eq!(out, "2 path(s) from [[Draft (v2) / notes]]");
    }

    #[test]
    fn broken_templates_are_errors() {
        assert!(matches!(fill("{{missing}}", &[]), Err(GraphError::Template(_))));
        assert!(fill("oops {{", &[]).is_err());
        assert!(fill("{{ }}", &[]).is_err());
    }

    #[test]
    fn not_found_names_the_side() {
        let response = FindPathResponse::new(
            ResponseFormat::Narrative,
            PathOutcome::NotFound {
                side: EndpointSide::End,
                path: "missing.md".into(),
                reason: "is not indexed".into(),
            },
        );
        let text = response.render().unwrap();
        assert!(text.starts_with("No path search was run: the end note `missing.md` is not indexed."));
    }

    #[test]
    fn structured_output_is_json() {
        let response = FindPathResponse::new(
            ResponseFormat::Structured,
            PathOutcome::Timeout {
                start_path: "a.md".into(),
                end_path: "b.md".into(),
                timeout_ms: 10,
            },
        );
        let value: serde_json::Value = serde_json::from_str(&response.render().unwrap()).unwrap();
        assert_eq!(value["status"], "timeout");
        assert_eq!(value["format"], "structured");
        assert_eq!(value["timeout_ms"], 10);
    }
}
