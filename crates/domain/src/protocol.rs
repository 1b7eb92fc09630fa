//! Line codec for the versioned backend protocol.
//!
//! Every message is one newline-terminated line; fields are separated by a
//! single tab. The functions here are pure: no I/O, no state.
//!
//! ```text
//! peer    -> backend   HELO\t<1|2|3>
//! backend -> peer      HELO\t<banner>
//! peer    -> backend   Q\tname\ttype\tclass\tid\tremote-ip[\tlocal-ip[\tedns-subnet]]
//! backend -> peer      DATA\tname\tclass\ttype\tttl\tid\tcontent   (zero or more)
//! backend -> peer      END | FAIL
//! ```

use crate::{AbiVersion, BackendError, Query, Record};

pub const SEPARATOR: char = '\t';
pub const HELO: &str = "HELO";
pub const DATA: &str = "DATA";
pub const END: &str = "END";
pub const FAIL: &str = "FAIL";

/// Parses the opening `HELO<TAB><digit>` line into the negotiated version.
pub fn parse_handshake(line: &str) -> Result<AbiVersion, BackendError> {
    let trimmed = line.trim();
    let fail = || BackendError::Handshake {
        line: trimmed.to_string(),
    };

    let digit = trimmed
        .strip_prefix(HELO)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .ok_or_else(fail)?;

    match digit.as_bytes() {
        [d @ b'1'..=b'3'] => AbiVersion::from_u8(d - b'0').ok_or_else(fail),
        _ => Err(fail()),
    }
}

/// Parses a query line using the field layout of `version`.
pub fn parse_query(line: &str, version: AbiVersion) -> Result<Query, BackendError> {
    let trimmed = line.trim();
    let fail = || BackendError::QueryParse {
        line: trimmed.to_string(),
        version,
    };

    let fields: Vec<&str> = trimmed.split(SEPARATOR).collect();
    if fields.len() != version.field_count() {
        return Err(fail());
    }

    let id: i64 = fields[4].parse().map_err(|_| fail())?;
    let query = Query::new(fields[0], fields[1], fields[2], fields[3], id, fields[5]);

    Ok(match version {
        AbiVersion::V1 => query,
        AbiVersion::V2 => query.with_local_ip(fields[6]),
        AbiVersion::V3 => query.with_edns_subnet(fields[6], fields[7]),
    })
}

/// Six tab-joined fields: name, class, type, ttl, id, content.
pub fn format_record(record: &Record) -> String {
    let mut line = String::with_capacity(
        record.name.len() + record.class.len() + record.record_type.len() + record.content.len() + 32,
    );
    line.push_str(&record.name);
    line.push(SEPARATOR);
    line.push_str(&record.class);
    line.push(SEPARATOR);
    line.push_str(&record.record_type);
    line.push(SEPARATOR);
    line.push_str(&record.ttl.to_string());
    line.push(SEPARATOR);
    line.push_str(&record.id.to_string());
    line.push(SEPARATOR);
    line.push_str(&record.content);
    line
}

pub fn format_data_line(record: &Record) -> String {
    format!("{}{}{}", DATA, SEPARATOR, format_record(record))
}

pub fn format_handshake_ack(banner: &str) -> String {
    format!("{}{}{}", HELO, SEPARATOR, banner)
}
