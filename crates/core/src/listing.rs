//! Extraction of the labeled `Conversion:` / `Price:` / `Stock:` lines from a
//! free-form chat message.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingFields {
    pub conversion: String,
    pub price: String,
    pub stock: String,
}

/// Returns `None` unless all three labels are present with non-empty values.
///
/// Only the first line carrying a label is considered; an empty value there is
/// not rescued by a later line with the same label.
pub fn parse_listing(text: &str) -> Option<ListingFields> {
    let lines: Vec<&str> = text.split('\n').collect();

    Some(ListingFields {
        conversion: labeled_value(&lines, "conversion")?,
        price: labeled_value(&lines, "price")?,
        stock: labeled_value(&lines, "stock")?,
    })
}

fn labeled_value(lines: &[&str], label: &str) -> Option<String> {
    let line = lines.iter().find(|line| has_label(line, label))?;
    let (_, value) = line.split_once(':')?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn has_label(line: &str, label: &str) -> bool {
    let Some(head) = line.get(..label.len()) else {
        return false;
    };
    head.eq_ignore_ascii_case(label) && line[label.len()..].starts_with(':')
}
