//! HTML report rendering. The renderer substitutes a handful of
//! placeholders in a template (the embedded default or a user-provided one)
//! and groups pages by their similarity cluster.

use std::fmt::Write as _;

use crate::session::{Page, SessionFile};
use crate::utils;

pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/report.html");

pub struct Report<'a> {
    session: &'a SessionFile,
    template: String,
}

impl<'a> Report<'a> {
    pub fn new(session: &'a SessionFile, template: String) -> Self {
        Self { session, template }
    }

    pub fn render(&self) -> String {
        let stats = &self.session.stats;
        self.template
            .replace("{{VERSION}}", &escape(&self.session.version))
            .replace("{{STARTED_AT}}", &stats.started_at.to_rfc3339())
            .replace("{{FINISHED_AT}}", &stats.finished_at.to_rfc3339())
            .replace("{{DURATION}}", &utils::format_duration(stats.duration()))
            .replace("{{PAGE_COUNT}}", &self.session.pages.len().to_string())
            .replace(
                "{{REQUESTS_SUCCESSFUL}}",
                &stats.request_successful.to_string(),
            )
            .replace("{{REQUESTS_FAILED}}", &stats.request_failed.to_string())
            .replace(
                "{{CLUSTER_COUNT}}",
                &self.session.page_similarity_clusters.len().to_string(),
            )
            .replace("{{CLUSTERS}}", &self.render_clusters())
    }

    fn render_clusters(&self) -> String {
        let mut html = String::new();

        if self.session.page_similarity_clusters.is_empty() {
            // Interrupted or body-less sessions have pages but no clusters.
            html.push_str("<div class=\"cluster\"><h3>All pages</h3><table>\n");
            for page in &self.session.pages {
                html.push_str(&self.render_page_row(page));
            }
            html.push_str("</table></div>\n");
            return html;
        }

        for (index, (_, urls)) in self.session.page_similarity_clusters.iter().enumerate() {
            let _ = write!(
                html,
                "<div class=\"cluster\"><h3>Cluster {} ({} pages)</h3><table>\n",
                index + 1,
                urls.len()
            );
            for url in urls {
                if let Some(page) = self.session.pages.iter().find(|p| &p.url == url) {
                    html.push_str(&self.render_page_row(page));
                }
            }
            html.push_str("</table></div>\n");
        }

        html
    }

    fn render_page_row(&self, page: &Page) -> String {
        let bucket = page.code.chars().next().unwrap_or('0');
        let mut tags = String::new();
        for tag in &page.tags {
            let _ = write!(
                tags,
                "<span class=\"tag {}\">{}</span>",
                escape(&tag.kind),
                escape(&tag.text)
            );
        }

        let screenshot = if page.screenshot_path.is_empty() {
            String::new()
        } else {
            format!(
                "<a href=\"{0}\"><img class=\"thumb\" src=\"{0}\" alt=\"screenshot\"></a>",
                escape(&page.screenshot_path)
            )
        };

        format!(
            "<tr><td class=\"code-{bucket}xx\">{code}</td>\
             <td><a href=\"{url}\">{url}</a><br>{title}<br>{tags}</td>\
             <td>{server}</td><td>{screenshot}</td></tr>\n",
            code = escape(&page.code),
            url = escape(&page.url),
            title = escape(&page.title),
            server = escape(&page.server),
        )
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SimilarityClusters, StatsSnapshot};
    use chrono::Utc;

    fn sample_session() -> SessionFile {
        let now = Utc::now();
        SessionFile {
            version: "0.1.0".to_string(),
            options: crate::config::Config::default(),
            stats: StatsSnapshot {
                started_at: now,
                finished_at: now,
                request_successful: 2,
                request_failed: 1,
                response_code_2xx: 2,
                response_code_3xx: 0,
                response_code_4xx: 0,
                response_code_5xx: 0,
                screenshot_successful: 0,
                screenshot_failed: 0,
            },
            pages: vec![Page {
                url: "https://example.com/".to_string(),
                code: "200".to_string(),
                title: "Example <Domain>".to_string(),
                server: "nginx".to_string(),
                ..Default::default()
            }],
            ports: vec![443],
            page_similarity_clusters: SimilarityClusters(vec![(
                "c1".to_string(),
                vec!["https://example.com/".to_string()],
            )]),
        }
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let session = sample_session();
        let report = Report::new(&session, DEFAULT_TEMPLATE.to_string());
        let html = report.render();

        assert!(!html.contains("{{"));
        assert!(html.contains("https://example.com/"));
        assert!(html.contains("nginx"));
        assert!(html.contains("Cluster 1 (1 pages)"));
    }

    #[test]
    fn test_render_escapes_page_content() {
        let session = sample_session();
        let report = Report::new(&session, DEFAULT_TEMPLATE.to_string());
        let html = report.render();
        assert!(html.contains("Example &lt;Domain&gt;"));
    }

    #[test]
    fn test_render_without_clusters_lists_all_pages() {
        let mut session = sample_session();
        session.page_similarity_clusters = SimilarityClusters::default();
        let report = Report::new(&session, DEFAULT_TEMPLATE.to_string());
        let html = report.render();
        assert!(html.contains("All pages"));
        assert!(html.contains("https://example.com/"));
    }

    #[test]
    fn test_render_custom_template() {
        let session = sample_session();
        let report = Report::new(&session, "pages: {{PAGE_COUNT}}".to_string());
        assert_eq!(report.render(), "pages: 1");
    }
}
