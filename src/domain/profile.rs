//! Company profile types: the closed vocabularies offered by the form and
//! understood by the category encoders.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::encoding::EncodingError;

/// Language in which therapy sessions are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Language {
    English,
    Spanish,
    French,
    German,
}

impl Language {
    /// All languages in form order.
    pub const ALL: [Language; 4] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::German,
    ];

    /// Label used by the form, the encoders and the slot table header.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Spanish",
            Self::French => "French",
            Self::German => "German",
        }
    }
}

/// Geographic area of the company's workforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Area {
    NorthAmerica,
    Europe,
    Asia,
    SouthAmerica,
    Africa,
}

impl Area {
    /// All areas in form order.
    pub const ALL: [Area; 5] = [
        Area::NorthAmerica,
        Area::Europe,
        Area::Asia,
        Area::SouthAmerica,
        Area::Africa,
    ];

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::NorthAmerica => "North America",
            Self::Europe => "Europe",
            Self::Asia => "Asia",
            Self::SouthAmerica => "South America",
            Self::Africa => "Africa",
        }
    }
}

/// Industry sector of the company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Industry {
    Healthcare,
    Technology,
    Finance,
    Education,
    Retail,
}

impl Industry {
    /// All industries in form order.
    pub const ALL: [Industry; 5] = [
        Industry::Healthcare,
        Industry::Technology,
        Industry::Finance,
        Industry::Education,
        Industry::Retail,
    ];

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthcare => "Healthcare",
            Self::Technology => "Technology",
            Self::Finance => "Finance",
            Self::Education => "Education",
            Self::Retail => "Retail",
        }
    }
}

macro_rules! labelled_vocabulary {
    ($ty:ident, $field:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $ty {
            type Err = EncodingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.label() == trimmed)
                    .ok_or_else(|| EncodingError::UnknownLabel {
                        field: $field,
                        label: trimmed.to_string(),
                    })
            }
        }

        impl TryFrom<String> for $ty {
            type Error = EncodingError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.label().to_string()
            }
        }
    };
}

labelled_vocabulary!(Language, "language");
labelled_vocabulary!(Area, "area");
labelled_vocabulary!(Industry, "industry");

/// Strictly positive number of employees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct EmployeeCount(NonZeroU32);

impl EmployeeCount {
    /// Default shown in the form.
    pub const DEFAULT: u32 = 1000;

    /// Create an employee count, rejecting zero.
    ///
    /// # Errors
    /// Returns a message if `n` is zero.
    pub fn new(n: u32) -> Result<Self, String> {
        NonZeroU32::new(n)
            .map(Self)
            .ok_or_else(|| "Number of employees must be greater than zero".to_string())
    }

    /// Parse the raw value of the numeric form field.
    ///
    /// Accepts whole numbers only; negative, zero, fractional and
    /// non-numeric input is rejected with a user-facing message.
    ///
    /// # Errors
    /// Returns a message describing why the input was rejected.
    pub fn parse_field(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("Number of employees is required".to_string());
        }
        let value: i64 = trimmed
            .parse()
            .map_err(|_| format!("Number of employees must be a whole number, got {trimmed:?}"))?;
        if value <= 0 {
            return Err(format!(
                "Number of employees must be greater than zero, got {value}"
            ));
        }
        let value = u32::try_from(value)
            .map_err(|_| format!("Number of employees is too large: {value}"))?;
        Self::new(value)
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    #[must_use]
    pub fn as_f64(&self) -> f64 {
        f64::from(self.0.get())
    }
}

impl TryFrom<u32> for EmployeeCount {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EmployeeCount> for u32 {
    fn from(value: EmployeeCount) -> Self {
        value.get()
    }
}

impl fmt::Display for EmployeeCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A complete, validated estimation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub language: Language,
    pub area: Area,
    pub industry: Industry,
    pub employee_count: EmployeeCount,
}

impl CompanyProfile {
    #[must_use]
    pub fn new(
        language: Language,
        area: Area,
        industry: Industry,
        employee_count: EmployeeCount,
    ) -> Self {
        Self {
            language,
            area,
            industry,
            employee_count,
        }
    }
}
