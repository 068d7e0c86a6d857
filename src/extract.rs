/// Best-effort field extraction from free-form user text.
///
/// This is a pattern matcher, not a validator: the backend step decides
/// whether a value is acceptable.
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static CUSTOMER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i-u)cust[a-z0-9_]+").expect("customer id pattern is valid"));

static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("amount pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    CustomerId,
    LoanAmount,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::CustomerId => "customer_id",
            FieldKind::LoanAmount => "loan_amount",
        }
    }

    /// Question put to the operator when nothing could be extracted.
    /// `None` means a miss is passed on as an empty value instead.
    pub fn fallback_prompt(self) -> Option<&'static str> {
        match self {
            FieldKind::CustomerId => None,
            FieldKind::LoanAmount => Some("Enter loan amount:"),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First match for `kind` in `text`, returned verbatim.
pub fn extract(text: &str, kind: FieldKind) -> Option<String> {
    let re = match kind {
        FieldKind::CustomerId => &*CUSTOMER_ID,
        FieldKind::LoanAmount => &*AMOUNT,
    };
    re.find(text).map(|m| m.as_str().to_string())
}
