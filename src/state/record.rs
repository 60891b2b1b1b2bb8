//! Metadata resolved for one identifier
//!
//! Records are built from the table row that links to the identifier on its
//! parent's page. The row layout is positional: name, direct children,
//! total descendants, description, information.

/// Placeholder stored when a row carries no information column
pub const INFO_PLACEHOLDER: &str = "-";

/// Resolved metadata for one node of the reference tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidRecord {
    /// Node name (e.g. "iso", "itu-t, ccitt")
    pub name: String,

    /// Number of direct children
    pub sub_children: i64,

    /// Number of descendants in the whole subtree
    pub sub_total: i64,

    /// Short description, may be empty
    pub description: String,

    /// Supplementary information excerpt
    pub information: String,
}

impl Default for OidRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            sub_children: 0,
            sub_total: 0,
            description: String::new(),
            information: INFO_PLACEHOLDER.to_string(),
        }
    }
}

impl OidRecord {
    /// Builds a record from up to five positional fields
    ///
    /// Missing trailing fields keep their defaults. Counts that do not parse
    /// as integers become 0. Fields beyond the fifth are ignored.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Self {
        let mut record = Self::default();
        let mut fields = fields.iter().map(|f| f.as_ref());

        if let Some(name) = fields.next() {
            record.name = name.to_string();
        }
        if let Some(count) = fields.next() {
            record.sub_children = parse_count(count);
        }
        if let Some(count) = fields.next() {
            record.sub_total = parse_count(count);
        }
        if let Some(description) = fields.next() {
            record.description = description.to_string();
        }
        if let Some(information) = fields.next() {
            record.information = information.to_string();
        }

        record
    }

    /// Records without a name carry no usable metadata and are never stored
    pub fn is_resolved(&self) -> bool {
        !self.name.is_empty()
    }
}

fn parse_count(value: &str) -> i64 {
    value.trim().parse().unwrap_or(0)
}
