use serde::Serialize;
use std::fmt;

/// Whether a code must be reported to the external compliance system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Reportable {
    #[serde(rename = "Y")]
    Yes,
    #[default]
    #[serde(rename = "N")]
    No,
}

impl Reportable {
    /// Single-character flag as stored in the staging table
    pub fn as_str(&self) -> &'static str {
        match self {
            Reportable::Yes => "Y",
            Reportable::No => "N",
        }
    }

    /// Parse a spreadsheet flag cell. Returns `None` for anything other than Y/N.
    pub fn from_flag(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "Y" | "YES" => Some(Reportable::Yes),
            "N" | "NO" => Some(Reportable::No),
            _ => None,
        }
    }
}

impl fmt::Display for Reportable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the NOC/NIBRS code list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NocRecord {
    code: i32,
    degree: String,
    description: String,
    reportable: Reportable,
}

impl NocRecord {
    pub fn new(
        code: i32,
        degree: impl Into<String>,
        description: impl Into<String>,
        reportable: Reportable,
    ) -> Self {
        Self {
            code,
            degree: degree.into(),
            description: description.into(),
            reportable,
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn degree(&self) -> &str {
        &self.degree
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn reportable(&self) -> Reportable {
        self.reportable
    }
}

impl fmt::Display for NocRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NOC: {}, Degree: {}, Description: {}, Reportable: {}",
            self.code, self.degree, self.description, self.reportable
        )
    }
}
