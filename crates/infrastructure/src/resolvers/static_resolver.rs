use async_trait::async_trait;
use ferrous_backend_application::ports::Resolver;
use ferrous_backend_domain::config::StaticRecordConfig;
use ferrous_backend_domain::{LookupError, Query, Record};
use std::collections::HashMap;
use tracing::debug;

const ANY: &str = "ANY";

/// Answers queries from a fixed, in-memory record set.
///
/// Names match case-insensitively with any trailing dot ignored. A query of
/// type `ANY` returns every record for the name; otherwise only records of
/// the queried type are returned, in the order they were configured.
///
/// A resolver built with [`StaticResolver::always`] ignores the query and
/// answers every lookup with the same records.
#[derive(Debug, Default)]
pub struct StaticResolver {
    records: HashMap<String, Vec<Record>>,
    catch_all: Option<Vec<Record>>,
}

impl StaticResolver {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        let mut by_name: HashMap<String, Vec<Record>> = HashMap::new();
        for record in records {
            by_name.entry(normalize(&record.name)).or_default().push(record);
        }
        Self {
            records: by_name,
            catch_all: None,
        }
    }

    pub fn always(records: Vec<Record>) -> Self {
        Self {
            records: HashMap::new(),
            catch_all: Some(records),
        }
    }

    pub fn from_config(records: &[StaticRecordConfig]) -> Self {
        Self::new(records.iter().map(StaticRecordConfig::to_record))
    }

    /// Answers every query with `example.com IN A 93.184.216.34`.
    pub fn example() -> Self {
        Self::always(vec![Record::new(
            "example.com",
            "IN",
            "A",
            300,
            Record::NO_ID,
            "93.184.216.34",
        )])
    }

    pub fn len(&self) -> usize {
        match self.catch_all {
            Some(ref records) => records.len(),
            None => self.records.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn answer(&self, query: &Query) -> Vec<Record> {
        if let Some(ref records) = self.catch_all {
            return records.clone();
        }

        let Some(records) = self.records.get(&normalize(query.name())) else {
            return Vec::new();
        };

        if query.qtype().eq_ignore_ascii_case(ANY) {
            return records.clone();
        }

        records
            .iter()
            .filter(|r| r.record_type.eq_ignore_ascii_case(query.qtype()))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn lookup(&self, query: &Query) -> Result<Vec<Record>, LookupError> {
        let answer = self.answer(query);
        debug!(name = %query.name(), qtype = %query.qtype(), records = answer.len(), "Static lookup");
        Ok(answer)
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}
