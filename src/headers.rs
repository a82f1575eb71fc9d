//! Header normalization and column binding.
//!
//! Source files arrive with inconsistent header spelling. Headers are
//! normalized once, then every logical field is bound to at most one column
//! through an ordered alias list.

use crate::models::Table;

const INVISIBLE: [char; 4] = ['\u{feff}', '\u{200b}', '\u{200c}', '\u{200d}'];

/// Strip byte-order marks and zero-width characters.
pub fn sanitize_header(raw: &str) -> String {
    raw.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

/// Collapse whitespace runs, trim and title-case a header.
///
/// A letter is upper-cased when the character before it is not a cased
/// letter and lower-cased otherwise, so `"acc#"` becomes `"Acc#"` and
/// `"patient DOB"` becomes `"Patient Dob"`.
pub fn normalize_header(raw: &str) -> String {
    let collapsed = sanitize_header(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = String::with_capacity(collapsed.len());
    let mut prev_cased = false;
    for c in collapsed.chars() {
        let cased = c.is_uppercase() || c.is_lowercase();
        if cased {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
        } else {
            out.push(c);
        }
        prev_cased = cased;
    }
    out
}

/// Normalize every header of a table. Values are left untouched.
pub fn normalize_table(table: Table) -> Table {
    Table {
        headers: table.headers.iter().map(|h| normalize_header(h)).collect(),
        rows: table.rows,
    }
}

/// How a logical field is recognised among a table's headers.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub name: &'static str,
    /// Whole-header matches, tried in this order.
    pub exact: &'static [&'static str],
    /// Substring matches, tried against headers in column order.
    pub contains: &'static [&'static str],
}

impl FieldAliases {
    /// Resolve to a column index. Matching is case-insensitive.
    pub fn resolve(&self, headers: &[String]) -> Option<usize> {
        let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        for alias in self.exact {
            if let Some(idx) = lowered.iter().position(|h| h == alias) {
                return Some(idx);
            }
        }
        lowered
            .iter()
            .position(|h| self.contains.iter().any(|needle| h.contains(needle)))
    }
}

pub const PROVIDER: FieldAliases = FieldAliases {
    name: "Provider",
    exact: &["appointment provider name", "provider name", "provider", "appt provider name"],
    contains: &["provider"],
};

pub const LOCATION: FieldAliases = FieldAliases {
    name: "Appointment Location",
    exact: &["appointment location", "appointment state", "location", "state"],
    contains: &["appointment location", "appointment state"],
};

pub const VISIT_TYPE: FieldAliases = FieldAliases {
    name: "Visit Type",
    exact: &["visit type"],
    contains: &["visit type"],
};

pub const VISIT_STATUS: FieldAliases = FieldAliases {
    name: "Visit Status",
    exact: &["visit status"],
    contains: &["visit status"],
};

pub const PRIMARY_INSURANCE: FieldAliases = FieldAliases {
    name: "Primary Insurance Name",
    exact: &["primary insurance name"],
    contains: &["primary insurance name"],
};

pub const ACCOUNT_NUMBER: FieldAliases = FieldAliases {
    name: "Patient Account Number",
    exact: &[],
    contains: &[
        "patient account number",
        "patient account",
        "account number",
        "account",
        "patient acct no",
    ],
};

pub const DATE_OF_SERVICE: FieldAliases = FieldAliases {
    name: "Date Of Service",
    exact: &["date of service", "appointment date"],
    contains: &["date of service", "appointment date"],
};

/// Working-table columns resolved once per table shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnBinding {
    pub provider: Option<usize>,
    pub location: Option<usize>,
    pub visit_type: Option<usize>,
    pub visit_status: Option<usize>,
    pub primary_insurance: Option<usize>,
    pub account_number: Option<usize>,
    pub date_of_service: Option<usize>,
}

impl ColumnBinding {
    pub fn bind(headers: &[String]) -> Self {
        Self {
            provider: PROVIDER.resolve(headers),
            location: LOCATION.resolve(headers),
            visit_type: VISIT_TYPE.resolve(headers),
            visit_status: VISIT_STATUS.resolve(headers),
            primary_insurance: PRIMARY_INSURANCE.resolve(headers),
            account_number: ACCOUNT_NUMBER.resolve(headers),
            date_of_service: DATE_OF_SERVICE.resolve(headers),
        }
    }
}
