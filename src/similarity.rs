//! Page-structure extraction and similarity clustering.
//!
//! A page's structure is the sequence of element tag names in document
//! order, extracted with a lenient HTML parse. Similarity between two
//! structures is Jaccard over their unique tag-name sets. Clustering is a
//! single-threaded first-fit pass run during session finalization.

use std::collections::{HashMap, HashSet};

use scraper::Html;
use uuid::Uuid;

use crate::config::ClusteringPredicate;
use crate::session::SimilarityClusters;

/// Threshold on the Jaccard score used by the cluster membership test.
const SIMILARITY_THRESHOLD: f64 = 0.80;

/// Extract the ordered, lowercased element tag names from an HTML document.
///
/// The parse is lenient: malformed markup yields whatever elements were
/// recognized, never an error. Text, comments, doctypes and attributes do
/// not contribute. Note that the parser supplies the implied `html`, `head`
/// and `body` elements for fragments, so every parseable document carries
/// them uniformly.
pub fn get_page_structure(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .tree
        .root()
        .descendants()
        .filter_map(|node| node.value().as_element())
        .map(|element| element.name().to_lowercase())
        .collect()
}

/// Jaccard similarity of the unique tag-name sets of two structures.
///
/// Both empty yields 1.0; exactly one empty yields 0.0.
pub fn get_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();

    intersection as f64 / union as f64
}

/// Group pages by structural similarity.
///
/// Pages are visited in the order given; existing clusters are scanned in
/// creation order and the page joins the first one whose membership test
/// accepts it against *every* current member, else it founds a new cluster
/// with a fresh opaque identifier.
///
/// The `Literal` predicate accepts when all members score below the
/// threshold; `Fixed` accepts when all members score at or above it.
pub fn cluster_pages(
    pages: &[(String, Vec<String>)],
    predicate: ClusteringPredicate,
) -> SimilarityClusters {
    let structures: HashMap<&str, &Vec<String>> = pages
        .iter()
        .map(|(url, structure)| (url.as_str(), structure))
        .collect();

    let mut clusters: Vec<(String, Vec<String>)> = Vec::new();

    for (url, structure) in pages {
        let mut joined = false;

        for (_, members) in clusters.iter_mut() {
            let accepted = members.iter().all(|member_url| {
                let score = structures
                    .get(member_url.as_str())
                    .map(|member| get_similarity(structure, member))
                    .unwrap_or(0.0);
                match predicate {
                    ClusteringPredicate::Literal => score < SIMILARITY_THRESHOLD,
                    ClusteringPredicate::Fixed => score >= SIMILARITY_THRESHOLD,
                }
            });

            if accepted {
                members.push(url.clone());
                joined = true;
                break;
            }
        }

        if !joined {
            clusters.push((Uuid::new_v4().to_string(), vec![url.clone()]));
        }
    }

    SimilarityClusters(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_structure_extraction_in_document_order() {
        let html =
            "<html><head><title>T</title></head><body><h1>x</h1><p>y<b>z</b></p></body></html>";
        assert_eq!(
            get_page_structure(html),
            tags(&["html", "head", "title", "body", "h1", "p", "b"])
        );
    }

    #[test]
    fn test_structure_extraction_ignores_text_comments_doctype() {
        let html = "<!DOCTYPE html><!-- c --><html><body>text<p class=\"x\">more</p></body></html>";
        assert_eq!(get_page_structure(html), tags(&["html", "head", "body", "p"]));
    }

    #[test]
    fn test_structure_extraction_supplies_implied_elements() {
        assert_eq!(
            get_page_structure("<h1>a</h1>"),
            tags(&["html", "head", "body", "h1"])
        );
    }

    #[test]
    fn test_structure_extraction_survives_malformed_html() {
        let structure = get_page_structure("<div><<<span</div attr></zzz>");
        assert!(structure.contains(&"div".to_string()));
    }

    #[test]
    fn test_similarity_identity_and_symmetry() {
        let a = tags(&["html", "body", "h1", "p"]);
        let b = tags(&["html", "body", "table", "tr", "td"]);
        assert_eq!(get_similarity(&a, &a), 1.0);
        assert_eq!(get_similarity(&a, &b), get_similarity(&b, &a));
    }

    #[test]
    fn test_similarity_empty_rules() {
        let a = tags(&["html"]);
        let empty: Vec<String> = Vec::new();
        assert_eq!(get_similarity(&empty, &empty), 1.0);
        assert_eq!(get_similarity(&a, &empty), 0.0);
        assert_eq!(get_similarity(&empty, &a), 0.0);
    }

    #[test]
    fn test_similarity_uses_set_semantics() {
        // Multiplicity is ignored: {p} vs {p,p,p} is identical as a set.
        let once = tags(&["html", "body", "p"]);
        let thrice = tags(&["html", "body", "p", "p", "p"]);
        assert_eq!(get_similarity(&once, &thrice), 1.0);
    }

    #[test]
    fn test_similarity_partial_overlap() {
        let a = tags(&["html", "body", "h1", "p"]);
        let b = tags(&["html", "body", "table", "tr", "td"]);
        // |{html,body}| / |{html,body,h1,p,table,tr,td}|
        let score = get_similarity(&a, &b);
        assert!((score - 2.0 / 7.0).abs() < 1e-9);
    }

    // Regression for the contested predicate polarity: with the literal
    // test, identical pages land in *separate* clusters and the dissimilar
    // page joins the first one.
    #[test]
    fn test_clustering_literal_predicate() {
        let pages = vec![
            ("https://a.test/".to_string(), tags(&["html", "body", "h1", "p"])),
            ("https://b.test/".to_string(), tags(&["html", "body", "h1", "p"])),
            (
                "https://c.test/".to_string(),
                tags(&["html", "body", "table", "tr", "td"]),
            ),
        ];

        let clusters = cluster_pages(&pages, ClusteringPredicate::Literal);
        assert_eq!(clusters.len(), 2);

        let members: Vec<&Vec<String>> = clusters.iter().map(|(_, urls)| urls).collect();
        assert_eq!(
            members[0],
            &vec!["https://a.test/".to_string(), "https://c.test/".to_string()]
        );
        assert_eq!(members[1], &vec!["https://b.test/".to_string()]);
    }

    #[test]
    fn test_clustering_fixed_predicate() {
        let pages = vec![
            ("https://a.test/".to_string(), tags(&["html", "body", "h1", "p"])),
            ("https://b.test/".to_string(), tags(&["html", "body", "h1", "p"])),
            (
                "https://c.test/".to_string(),
                tags(&["html", "body", "table", "tr", "td"]),
            ),
        ];

        let clusters = cluster_pages(&pages, ClusteringPredicate::Fixed);
        assert_eq!(clusters.len(), 2);

        let members: Vec<&Vec<String>> = clusters.iter().map(|(_, urls)| urls).collect();
        assert_eq!(
            members[0],
            &vec!["https://a.test/".to_string(), "https://b.test/".to_string()]
        );
        assert_eq!(members[1], &vec!["https://c.test/".to_string()]);
    }

    #[test]
    fn test_clustering_covers_every_page_exactly_once() {
        let pages: Vec<(String, Vec<String>)> = (0..10)
            .map(|i| {
                let structure = if i % 2 == 0 {
                    tags(&["html", "body", "div"])
                } else {
                    tags(&["html", "body", "form", "input"])
                };
                (format!("https://host{i}.test/"), structure)
            })
            .collect();

        for predicate in [ClusteringPredicate::Literal, ClusteringPredicate::Fixed] {
            let clusters = cluster_pages(&pages, predicate);
            assert_eq!(clusters.total_urls(), pages.len());
            assert!(clusters.iter().all(|(_, urls)| !urls.is_empty()));

            let mut seen = HashSet::new();
            for (_, urls) in clusters.iter() {
                for url in urls {
                    assert!(seen.insert(url.clone()), "{url} appears twice");
                }
            }
        }
    }

    #[test]
    fn test_cluster_identifiers_are_unique() {
        let pages = vec![
            ("https://a.test/".to_string(), tags(&["html", "body", "h1"])),
            ("https://b.test/".to_string(), tags(&["html", "body", "h1"])),
            ("https://c.test/".to_string(), tags(&["html", "body", "h1"])),
        ];
        let clusters = cluster_pages(&pages, ClusteringPredicate::Literal);
        let ids: HashSet<&str> = clusters.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids.len(), clusters.len());
    }
}
