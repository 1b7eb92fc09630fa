/// One answer produced by a resolver, written back as a `DATA` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub class: String,
    pub record_type: String,
    pub ttl: u32,
    /// Zone id, `-1` when not applicable.
    pub id: i64,
    pub content: String,
}

impl Record {
    pub const NO_ID: i64 = -1;

    pub fn new(
        name: impl Into<String>,
        class: impl Into<String>,
        record_type: impl Into<String>,
        ttl: u32,
        id: i64,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            record_type: record_type.into(),
            ttl,
            id,
            content: content.into(),
        }
    }

    /// Record in class `IN` without a zone id.
    pub fn internet(
        name: impl Into<String>,
        record_type: impl Into<String>,
        ttl: u32,
        content: impl Into<String>,
    ) -> Self {
        Self::new(name, "IN", record_type, ttl, Self::NO_ID, content)
    }
}
