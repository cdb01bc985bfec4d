//! Parsers for rabbitmqctl listing output.
//!
//! Listings are tab-separated. Depending on the broker release, `-q` output
//! may still carry a column header, and older releases wrap it in
//! `Listing ...` / `...done.` banners; all of those are skipped.

use crate::error::{Error, Result};
use declarative::Permissions;
use std::collections::{BTreeMap, BTreeSet};

const USERS_HEADER: &str = "user\ttags";
const PERMISSIONS_HEADER: &str = "vhost\tconfigure\twrite\tread";

/// Lines of a listing that carry data
fn data_lines(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .filter(|l| !l.starts_with("Listing ") && !l.starts_with("...done"))
}

/// Parse `rabbitmqctl list_users -q` into user → tags
///
/// ```text
/// guest	[administrator]
/// monitor	[monitoring, management]
/// svc	[]
/// ```
pub fn parse_users(output: &str) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let mut users = BTreeMap::new();

    for line in data_lines(output).filter(|l| *l != USERS_HEADER) {
        let (name, tags) = match line.split_once('\t') {
            Some((name, tags)) => (name, tags),
            None => (line, ""),
        };
        if name.is_empty() {
            return Err(Error::Parse(format!("missing user name in line: {line}")));
        }
        users.insert(name.to_string(), parse_tags(tags));
    }

    Ok(users)
}

/// Parse a tag list like `[administrator, monitoring]`
pub fn parse_tags(raw: &str) -> BTreeSet<String> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split([',', ' '])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `rabbitmqctl list_user_permissions -q <user>` into vhost → triple
///
/// ```text
/// /	.*	.*	.*
/// reports		^amq\.	.*
/// ```
pub fn parse_permissions(output: &str) -> Result<BTreeMap<String, Permissions>> {
    let mut perms = BTreeMap::new();

    for line in data_lines(output).filter(|l| *l != PERMISSIONS_HEADER) {
        let fields: Vec<&str> = line.split('\t').collect();
        let [vhost, configure, write, read] = fields.as_slice() else {
            return Err(Error::Parse(format!(
                "expected 4 tab-separated fields, got {}: {line}",
                fields.len()
            )));
        };
        perms.insert(
            (*vhost).to_string(),
            Permissions::new(*configure, *write, *read),
        );
    }

    Ok(perms)
}
