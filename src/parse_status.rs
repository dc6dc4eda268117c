//! Outcome of parsing a fetched page.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MajorCode {
    #[default]
    NotParsed,
    Success,
    Failed,
}

impl MajorCode {
    pub fn code(self) -> u8 {
        match self {
            MajorCode::NotParsed => 0,
            MajorCode::Success => 1,
            MajorCode::Failed => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MajorCode::NotParsed),
            1 => Some(MajorCode::Success),
            2 => Some(MajorCode::Failed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MajorCode::NotParsed => "notparsed",
            MajorCode::Success => "success",
            MajorCode::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinorCode {
    #[default]
    SuccessOk,
    SuccessRedirect,
    FailedException,
    FailedTruncated,
    FailedInvalidFormat,
    FailedMissingParts,
    FailedMissingContent,
}

impl MinorCode {
    pub fn code(self) -> u16 {
        match self {
            MinorCode::SuccessOk => 0,
            MinorCode::SuccessRedirect => 100,
            MinorCode::FailedException => 200,
            MinorCode::FailedTruncated => 202,
            MinorCode::FailedInvalidFormat => 203,
            MinorCode::FailedMissingParts => 204,
            MinorCode::FailedMissingContent => 205,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(MinorCode::SuccessOk),
            100 => Some(MinorCode::SuccessRedirect),
            200 => Some(MinorCode::FailedException),
            202 => Some(MinorCode::FailedTruncated),
            203 => Some(MinorCode::FailedInvalidFormat),
            204 => Some(MinorCode::FailedMissingParts),
            205 => Some(MinorCode::FailedMissingContent),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MinorCode::SuccessOk => "ok",
            MinorCode::SuccessRedirect => "redirect",
            MinorCode::FailedException => "exception",
            MinorCode::FailedTruncated => "truncated",
            MinorCode::FailedInvalidFormat => "invalid_format",
            MinorCode::FailedMissingParts => "missing_parts",
            MinorCode::FailedMissingContent => "missing_content",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParseStatus {
    pub major: MajorCode,
    pub minor: MinorCode,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ParseStatus {
    pub fn new(major: MajorCode, minor: MinorCode) -> Self {
        Self {
            major,
            minor,
            args: Vec::new(),
        }
    }

    pub fn success() -> Self {
        Self::new(MajorCode::Success, MinorCode::SuccessOk)
    }

    pub fn failed(minor: MinorCode, message: impl Into<String>) -> Self {
        Self::new(MajorCode::Failed, minor).with_arg(message)
    }

    /// Builds a status from stored numeric codes.
    pub fn from_codes(major: u8, minor: u16) -> Result<Self, CrawlError> {
        let major = MajorCode::from_code(major)
            .ok_or_else(|| CrawlError::InvalidInput(format!("Unknown major parse code {}", major)))?;
        let minor = MinorCode::from_code(minor)
            .ok_or_else(|| CrawlError::InvalidInput(format!("Unknown minor parse code {}", minor)))?;
        Ok(Self::new(major, minor))
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn is_success(status: Option<&ParseStatus>) -> bool {
        status.map_or(false, |status| status.major == MajorCode::Success)
    }

    /// The first argument, which by convention holds the failure message.
    pub fn message(&self) -> Option<&str> {
        self.arg(0)
    }

    pub fn arg(&self, n: usize) -> Option<&str> {
        self.args.get(n).map(String::as_str)
    }
}

/// `failed/exception (2/200), args=[boom]`
impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({}/{}), args=[{}]",
            self.major.name(),
            self.minor.name(),
            self.major.code(),
            self.minor.code(),
            self.args.join(",")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Outlink {
    pub to_url: String,
    pub anchor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Parse {
    pub text: String,
    pub title: String,
    pub outlinks: Vec<Outlink>,
    pub status: ParseStatus,
}

impl Parse {
    /// An empty parse recording that parsing raised `err`.
    pub fn empty_from_error(err: &dyn std::error::Error) -> Self {
        Self::empty(MinorCode::FailedException, err.to_string())
    }

    /// An empty parse with a failed status.
    pub fn empty(minor: MinorCode, message: impl Into<String>) -> Self {
        Self {
            status: ParseStatus::failed(minor, message),
            ..Self::default()
        }
    }
}
