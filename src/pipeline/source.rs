//! Work-item source: split a delimited text file into `(id, text)` items.
//!
//! The format is the one the combiner writes, so a combined file can be fed
//! straight back in as the input of the next stage:
//!
//! ```text
//! ===== page_1 =====
//! body of page one
//!
//! ===== page_2 =====
//! body of page two
//! ```

use edgequake_llm::ImageData;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{error, info};

/// One unit of input for a transform.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Stable identifier, e.g. `page_12`. Also the output file stem.
    pub id: String,
    /// Text to transform (trimmed body of the block).
    pub text: String,
    /// Rendered page attached to OCR requests.
    pub image: Option<ImageData>,
    /// Set when the input could not be built; the item fails without a call.
    pub unprepared: Option<String>,
}

impl WorkItem {
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            image: None,
            unprepared: None,
        }
    }

    pub fn page_image(id: impl Into<String>, image: ImageData) -> Self {
        Self {
            id: id.into(),
            text: String::new(),
            image: Some(image),
            unprepared: None,
        }
    }

    /// An item whose input could not be produced, with the reason.
    pub fn unprepared(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: String::new(),
            image: None,
            unprepared: Some(reason.into()),
        }
    }

    /// Size of the payload: characters of text plus base64 image bytes.
    pub fn input_len(&self) -> usize {
        self.text.chars().count() + self.image.as_ref().map_or(0, |img| img.data.len())
    }
}

static RE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^===== (\S(?:.*\S)?) =====\s*$").unwrap());

/// Render the delimiter line that opens a block.
pub fn marker_line(id: &str) -> String {
    format!("===== {id} =====")
}

/// Parse delimited blocks in file order.
///
/// Text before the first marker is ignored; bodies are trimmed. Input with no
/// marker lines yields no items.
pub fn parse_work_items(content: &str) -> Vec<WorkItem> {
    let mut items = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in content.lines() {
        if let Some(caps) = RE_MARKER.captures(line) {
            if let Some((id, body)) = current.take() {
                items.push(WorkItem::text(id, body.join("\n").trim()));
            }
            current = Some((caps[1].to_string(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((id, body)) = current {
        items.push(WorkItem::text(id, body.join("\n").trim()));
    }

    items
}

/// Read and parse a work-item file.
///
/// A file that cannot be opened or is not UTF-8 is logged and yields an
/// empty list; the caller decides whether zero items is fatal.
pub async fn load_work_items(path: &Path) -> Vec<WorkItem> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let items = parse_work_items(&content);
            info!("Parsed {} items from {}", items.len(), path.display());
            items
        }
        Err(e) => {
            error!("Failed to read work items from {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_blocks_in_file_order_with_trimmed_bodies() {
        let input = "===== page_1 =====\n  first page  \n\n===== page_2 =====\nsecond\nline\n\n\n===== page_10 =====\n\tlast\n";
        let items = parse_work_items(input);
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["page_1", "page_2", "page_10"]);
        assert_eq!(items[0].text, "first page");
        assert_eq!(items[1].text, "second\nline");
        assert_eq!(items[2].text, "last");
    }

    #[test]
    fn no_markers_yield_no_items() {
        assert!(parse_work_items("just some text\nwithout markers").is_empty());
        assert!(parse_work_items("").is_empty());
        assert!(parse_work_items("==== page_1 ====\nfour equals signs").is_empty());
    }

    #[test]
    fn preamble_before_first_marker_is_ignored() {
        let items = parse_work_items("preamble\n===== a =====\nbody");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[0].text, "body");
    }

    #[test]
    fn tolerates_crlf_and_empty_bodies() {
        let items = parse_work_items("===== page_1 =====\r\nسلام\r\n===== page_2 =====\r\n");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "سلام");
        assert_eq!(items[1].text, "");
    }

    #[test]
    fn marker_must_be_the_whole_line() {
        let items = parse_work_items("===== page_1 =====\nsee ===== page_2 ===== inline\n");
        assert_eq!(items.len(), 1);
        assert!(items[0].text.contains("inline"));
    }

    #[test]
    fn combined_output_round_trips() {
        let combined = format!(
            "{}\n\nfirst\n\n{}\n\nsecond\n\n",
            marker_line("page_1"),
            marker_line("page_2")
        );
        let items = parse_work_items(&combined);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].text, "second");
    }

    #[test]
    fn input_len_counts_characters_not_bytes() {
        let item = WorkItem::text("page_1", "طيب");
        assert_eq!(item.input_len(), 3);
    }

    #[tokio::test]
    async fn missing_file_yields_empty_list() {
        let items = load_work_items(Path::new("/definitely/not/here.txt")).await;
        assert!(items.is_empty());
    }
}
