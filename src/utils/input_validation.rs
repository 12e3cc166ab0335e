//! Wrapper types for identifiers that must be validated before they are
//! stored: usernames, phone numbers, national ids, SHA member numbers and
//! diagnosis codes.

use derive_more::derive::Display;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{2,19}$").expect("Failed to compile username regex")
});

// Safaricom/Airtel ranges: 07xx and 01xx, national or international form
static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\+254|254|0)([17]\d{8})$").expect("Failed to compile phone regex")
});

static NATIONAL_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{6,10}$").expect("Failed to compile national id regex"));

static SHA_NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z0-9][A-Z0-9-]{4,18}[A-Z0-9]$").expect("Failed to compile SHA number regex")
});

static DIAGNOSIS_CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]\d{2}(?:\.[0-9A-Z]{1,4})?$").expect("Failed to compile diagnosis code regex")
});

#[derive(Debug, Clone, Copy, Display, Error)]
#[display("invalid input")]
pub struct InvalidInput;

macro_rules! validated_string {
    ($(#[$meta:meta])* $name:ident, $check:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
        #[serde(transparent)]
        pub struct $name(String);

        impl TryFrom<String> for $name {
            type Error = InvalidInput;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                let check: fn(&str) -> Option<String> = $check;
                check(&value).map(Self).ok_or(InvalidInput)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = InvalidInput;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::try_from(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

validated_string!(
    /// A login name: a letter followed by 2 to 19 letters, digits or underscores
    Username,
    |value| USERNAME_REGEX.is_match(value).then(|| value.to_owned())
);

validated_string!(
    /// A Kenyan mobile number, stored in international form (`+2547XXXXXXXX`)
    PhoneNumber,
    |value| {
        let compact: String = value.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
        PHONE_REGEX
            .captures(&compact)
            .map(|caps| format!("+254{}", &caps[1]))
    }
);

validated_string!(
    /// A national identity card number
    NationalId,
    |value| NATIONAL_ID_REGEX.is_match(value.trim()).then(|| value.trim().to_owned())
);

validated_string!(
    /// A Social Health Authority member number
    ShaNumber,
    |value| {
        let upper = value.trim().to_ascii_uppercase();
        let has_digit = upper.chars().any(|c| c.is_ascii_digit());
        (has_digit && SHA_NUMBER_REGEX.is_match(&upper)).then_some(upper)
    }
);

validated_string!(
    /// An ICD-10 style diagnosis code such as `J18.9`
    DiagnosisCode,
    |value| {
        let upper = value.trim().to_ascii_uppercase();
        DIAGNOSIS_CODE_REGEX.is_match(&upper).then_some(upper)
    }
);
