use crate::period::Period;
use thiserror::Error;

/// Coarse classification of a failure, used by callers to decide how to
/// present it (re-prompt for input, refuse the operation, report a bug).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Sequence,
    NotFound,
    Configuration,
    Serialization,
}

#[derive(Error, Debug)]
pub enum CertificationError {
    #[error("Validation failed for {subject}: {details}")]
    ValidationError { subject: String, details: String },

    #[error("Item '{item_id}': anterior {anterior} + presente {presente} exceeds 100%")]
    AcumuladoExceedsLimit {
        item_id: String,
        anterior: f64,
        presente: f64,
    },

    #[error("Item '{item_id}': presente {presente} would regress acumulado below anterior")]
    NegativePresente { item_id: String, presente: f64 },

    #[error("Item '{item_id}': invalid percentage {value}")]
    InvalidPercentage { item_id: String, value: f64 },

    #[error("Measurement for {period} has no item with presente > 0")]
    EmptyMeasurement { period: Period },

    #[error("Budget {budget_id} already has a measurement for {period}")]
    DuplicatePeriod { budget_id: u64, period: Period },

    #[error("Measurement {measurement_id} is referenced by certificate {certificate_id}")]
    MeasurementInUse {
        measurement_id: u64,
        certificate_id: u64,
    },

    #[error("Item '{item_id}' in {period}: anterior {anterior} does not match prior acumulado {expected}")]
    CarryForwardMismatch {
        item_id: String,
        period: Period,
        anterior: f64,
        expected: f64,
    },

    #[error("Section shares sum to {total}% instead of 100%")]
    PercentageClosureViolation { total: f64 },

    #[error("Certificate period {period} is not after the chain tail period {tail_period}")]
    OutOfSequence { period: Period, tail_period: Period },

    #[error("Period {period} is already certified by certificate {certificate_id}")]
    PeriodAlreadyCertified { period: Period, certificate_id: u64 },

    #[error("Certificate {certificate_id} is not the chain tail (followed by {successor_id})")]
    CertificateNotTail {
        certificate_id: u64,
        successor_id: u64,
    },

    #[error("Measurement {measurement_id} is already certified by certificate {certificate_id}")]
    AlreadyCertified {
        measurement_id: u64,
        certificate_id: u64,
    },

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Section not found: {0}")]
    SectionNotFound(String),

    #[error("Budget not found: {0}")]
    BudgetNotFound(u64),

    #[error("Measurement not found: {0}")]
    MeasurementNotFound(u64),

    #[error("Certificate not found: {0}")]
    CertificateNotFound(u64),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Invalid tolerance {0}: must be finite and non-negative")]
    InvalidTolerance(f64),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CertificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError { .. }
            | Self::AcumuladoExceedsLimit { .. }
            | Self::NegativePresente { .. }
            | Self::InvalidPercentage { .. }
            | Self::EmptyMeasurement { .. }
            | Self::DuplicatePeriod { .. }
            | Self::MeasurementInUse { .. }
            | Self::CarryForwardMismatch { .. }
            | Self::PercentageClosureViolation { .. }
            | Self::InvalidPeriod(_) => ErrorKind::Validation,
            Self::OutOfSequence { .. }
            | Self::CertificateNotTail { .. }
            | Self::PeriodAlreadyCertified { .. }
            | Self::AlreadyCertified { .. } => ErrorKind::Sequence,
            Self::ItemNotFound(_)
            | Self::SectionNotFound(_)
            | Self::BudgetNotFound(_)
            | Self::MeasurementNotFound(_)
            | Self::CertificateNotFound(_) => ErrorKind::NotFound,
            Self::InvalidTolerance(_) => ErrorKind::Configuration,
            Self::SerializationError(_) | Self::IoError(_) => ErrorKind::Serialization,
        }
    }

    pub(crate) fn validation(subject: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ValidationError {
            subject: subject.into(),
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CertificationError>;
