use std::sync::LazyLock;

use regex::Regex;

const DURATION_MARKER: &str = "tour duration:";
const DISTANCE_MARKER: &str = "total distance:";

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)Tour Duration:<[^>]*>(.*?)</span>").expect("duration pattern compiles")
});
static DISTANCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Total Distance:\s*(\d+\s*km)").expect("distance pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    Tour { duration: String, distance: String },
    Page,
}

pub fn is_tour(raw_content: &str) -> bool {
    let lowered = raw_content.to_lowercase();
    lowered.contains(DURATION_MARKER) || lowered.contains(DISTANCE_MARKER)
}

pub fn extract_duration(clean_content: &str) -> String {
    DURATION_PATTERN
        .captures(clean_content)
        .and_then(|captures| captures.get(1))
        .map(|capture| capture.as_str().replace("<br>", " ").trim().to_string())
        .unwrap_or_default()
}

pub fn extract_distance(clean_content: &str) -> String {
    DISTANCE_PATTERN
        .captures(clean_content)
        .and_then(|captures| captures.get(1))
        .map(|capture| capture.as_str().to_string())
        .unwrap_or_default()
}

/// Route on the raw markup, extract from the cleaned markup.
pub fn classify_page(raw_content: &str, clean_content: &str) -> PageKind {
    if !is_tour(raw_content) {
        return PageKind::Page;
    }
    PageKind::Tour {
        duration: extract_duration(clean_content),
        distance: extract_distance(clean_content),
    }
}

#[cfg(test)]
mod tests {
    use super::{PageKind, classify_page, extract_distance, extract_duration, is_tour};

    #[test]
    fn tour_fields_are_extracted() {
        let content =
            "<p>Tour Duration:<span>3 days<br>2 nights</span></p><p>Total Distance: 45 km</p>";
        assert_eq!(
            classify_page(content, content),
            PageKind::Tour {
                duration: "3 days 2 nights".to_string(),
                distance: "45 km".to_string(),
            }
        );
    }

    #[test]
    fn markers_match_case_insensitively() {
        assert!(is_tour("<p>TOUR DURATION: two weeks</p>"));
        assert!(is_tour("<p>total distance: 12km</p>"));
        assert!(!is_tour("<p>Our tours last a while</p>"));
    }

    #[test]
    fn plain_pages_route_to_page() {
        assert_eq!(
            classify_page("<p>About us</p>", "<p>About us</p>"),
            PageKind::Page
        );
    }

    #[test]
    fn missing_fields_extract_as_empty() {
        let content = "<p>Total Distance: unknown</p>";
        assert!(is_tour(content));
        assert_eq!(extract_distance(content), "");
        assert_eq!(extract_duration(content), "");
        assert_eq!(
            classify_page(content, content),
            PageKind::Tour {
                duration: String::new(),
                distance: String::new(),
            }
        );
    }

    #[test]
    fn duration_spans_lines_and_attributes() {
        let content =
            "<strong>Tour Duration:<span class=\"value\">\n  5 days<br>\n</span></strong>";
        assert_eq!(extract_duration(content), "5 days");
    }

    #[test]
    fn distance_accepts_compact_and_mixed_case_units() {
        assert_eq!(extract_distance("Total Distance:120KM"), "120KM");
        assert_eq!(extract_distance("Total distance:  8  km total"), "8  km");
    }
}
