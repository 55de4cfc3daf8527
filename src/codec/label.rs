//! Prefix-delimited label codec

use crate::error::{Result, SlotError};
use crate::host::Item;

use super::LabelCodec;

/// Splices `PREFIX + id + PREFIX + original` into the label field
#[derive(Debug, Clone)]
pub struct PrefixLabelCodec {
    prefix: String,
}

impl PrefixLabelCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Split a label into (id, original) on the first two prefix occurrences
    fn split<'a>(&self, label: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = label.strip_prefix(self.prefix.as_str())?;
        match rest.find(self.prefix.as_str()) {
            Some(end) => Some((&rest[..end], &rest[end + self.prefix.len()..])),
            // Truncated wrapper: the id is all there is
            None => Some((rest, "")),
        }
    }
}

impl LabelCodec for PrefixLabelCodec {
    fn encode(&self, mut item: Item, id: &str) -> Result<Item> {
        self.validate_id(id)?;

        // A label already carrying our prefix is a stale wrapper, not user content
        let original = match item.label.take() {
            Some(label) if label.starts_with(self.prefix.as_str()) => String::new(),
            Some(label) => label,
            None => String::new(),
        };

        item.label = Some(format!("{p}{id}{p}{original}", p = self.prefix));
        Ok(item)
    }

    fn decode(&self, item: &Item) -> Option<String> {
        let label = item.label.as_deref()?;
        let (id, _) = self.split(label)?;
        if id.is_empty() {
            return None;
        }
        Some(id.to_string())
    }

    fn strip(&self, mut item: Item) -> Item {
        let original = item
            .label
            .as_deref()
            .and_then(|label| self.split(label))
            .map(|(_, original)| original.to_string());

        if let Some(original) = original {
            item.label = if original.is_empty() {
                None
            } else {
                Some(original)
            };
        }
        item
    }

    fn validate_id(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(SlotError::InvalidId("id must not be empty".to_string()));
        }
        if id.contains(self.prefix.as_str()) {
            return Err(SlotError::InvalidId(format!(
                "id {:?} contains the label prefix",
                id
            )));
        }
        Ok(())
    }
}
