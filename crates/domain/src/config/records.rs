use crate::Record;
use serde::{Deserialize, Serialize};

/// Static answer served by the bundled resolver.
///
/// ```toml
/// [[records]]
/// name = "nas.home.lan"
/// type = "A"
/// content = "192.168.1.100"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticRecordConfig {
    pub name: String,

    /// Record class (default "IN")
    #[serde(default = "default_class")]
    pub class: String,

    #[serde(rename = "type")]
    pub record_type: String,

    /// Time-to-live in seconds (optional, default 300)
    #[serde(default)]
    pub ttl: Option<u32>,

    /// Zone id (optional, default -1)
    #[serde(default)]
    pub id: Option<i64>,

    pub content: String,
}

fn default_class() -> String {
    "IN".to_string()
}

impl StaticRecordConfig {
    pub fn ttl_or_default(&self) -> u32 {
        self.ttl.unwrap_or(300)
    }

    pub fn to_record(&self) -> Record {
        Record::new(
            self.name.as_str(),
            self.class.as_str(),
            self.record_type.as_str(),
            self.ttl_or_default(),
            self.id.unwrap_or(Record::NO_ID),
            self.content.as_str(),
        )
    }
}
