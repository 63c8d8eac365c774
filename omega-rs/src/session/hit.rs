//! The current hit while `$hitlist` iterates.

use std::collections::HashMap;

use crate::backend::{DocId, Document, MSetItem};

/// One result row, with its record already split into fields.
#[derive(Debug, Clone, Default)]
pub struct Hit {
    /// 0-based position in the full result list.
    pub index: u32,
    pub docid: DocId,
    pub percent: u32,
    pub collapse_count: u32,
    pub fields: HashMap<String, String>,
}

impl Hit {
    pub fn new(index: u32, item: &MSetItem, doc: Option<&Document>) -> Self {
        Self {
            index,
            docid: item.docid,
            percent: item.percent,
            collapse_count: item.collapse_count,
            fields: doc.map(|d| parse_record(&d.data)).unwrap_or_default(),
        }
    }

    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Split record text into fields.
///
/// `key=value` lines set a field; a repeated key joins its values with a
/// tab.  The first bare line becomes `caption` and every bare line is
/// appended to `sample`.
pub fn parse_record(text: &str) -> HashMap<String, String> {
    let mut fields: HashMap<String, String> = HashMap::new();
    for line in text.split('\n') {
        if let Some((key, value)) = line.split_once('=') {
            let slot = fields.entry(key.to_owned()).or_default();
            if !slot.is_empty() {
                slot.push('\t');
            }
            slot.push_str(value);
        } else if !line.is_empty() {
            let caption = fields.entry("caption".to_owned()).or_default();
            if caption.is_empty() {
                caption.push_str(line);
            }
            fields.entry("sample".to_owned()).or_default().push_str(line);
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_lines() {
        let f = parse_record("url=http://a/\ntitle=A page\n");
        assert_eq!(f["url"], "http://a/");
        assert_eq!(f["title"], "A page");
        assert!(!f.contains_key("caption"));
    }

    #[test]
    fn repeated_keys_tab_joined() {
        let f = parse_record("tag=a\ntag=b");
        assert_eq!(f["tag"], "a\tb");
    }

    #[test]
    fn bare_lines_fill_caption_and_sample() {
        let f = parse_record("First line\nsecond\nurl=x");
        assert_eq!(f["caption"], "First line");
        assert_eq!(f["sample"], "First linesecond");
        assert_eq!(f["url"], "x");
    }
}
