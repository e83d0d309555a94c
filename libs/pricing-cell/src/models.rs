use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ==============================================================================
// SERVICE CATALOG
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    QuickStampLocal,
    StandardNotary,
    ExtendedHours,
    LoanSigning,
    RonServices,
}

impl ServiceType {
    pub const ALL: [ServiceType; 5] = [
        ServiceType::QuickStampLocal,
        ServiceType::StandardNotary,
        ServiceType::ExtendedHours,
        ServiceType::LoanSigning,
        ServiceType::RonServices,
    ];

    /// Remote notarization happens over video; nobody drives anywhere.
    pub fn is_remote(&self) -> bool {
        matches!(self, ServiceType::RonServices)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceType::QuickStampLocal => "QUICK_STAMP_LOCAL",
            ServiceType::StandardNotary => "STANDARD_NOTARY",
            ServiceType::ExtendedHours => "EXTENDED_HOURS",
            ServiceType::LoanSigning => "LOAN_SIGNING",
            ServiceType::RonServices => "RON_SERVICES",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ServiceType {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUICK_STAMP_LOCAL" => Ok(ServiceType::QuickStampLocal),
            "STANDARD_NOTARY" => Ok(ServiceType::StandardNotary),
            "EXTENDED_HOURS" => Ok(ServiceType::ExtendedHours),
            "LOAN_SIGNING" => Ok(ServiceType::LoanSigning),
            "RON_SERVICES" => Ok(ServiceType::RonServices),
            other => Err(PricingError::UnknownService(other.to_string())),
        }
    }
}

/// Per-service rate card. Base prices and travel allowances follow the
/// published rate sheet; all amounts are integer cents.
#[derive(Debug, Clone, Copy)]
pub struct ServiceRates {
    pub base_cents: i64,
    pub included_radius_miles: f64,
    pub per_mile_cents: i64,
    pub included_documents: u32,
    pub extra_document_fee_cents: i64,
    pub included_signers: u32,
    pub extra_signer_fee_cents: i64,
}

impl ServiceType {
    pub fn rates(&self) -> ServiceRates {
        match self {
            ServiceType::QuickStampLocal => ServiceRates {
                base_cents: 4_500,
                included_radius_miles: 10.0,
                per_mile_cents: 50,
                included_documents: 1,
                extra_document_fee_cents: 500,
                included_signers: 1,
                extra_signer_fee_cents: 1_000,
            },
            ServiceType::StandardNotary => ServiceRates {
                base_cents: 7_500,
                included_radius_miles: 20.0,
                per_mile_cents: 50,
                included_documents: 2,
                extra_document_fee_cents: 500,
                included_signers: 1,
                extra_signer_fee_cents: 1_000,
            },
            ServiceType::ExtendedHours => ServiceRates {
                base_cents: 10_000,
                included_radius_miles: 20.0,
                per_mile_cents: 50,
                included_documents: 5,
                extra_document_fee_cents: 500,
                included_signers: 1,
                extra_signer_fee_cents: 1_000,
            },
            // Flat fee regardless of document count; two signers included.
            ServiceType::LoanSigning => ServiceRates {
                base_cents: 15_000,
                included_radius_miles: 25.0,
                per_mile_cents: 50,
                included_documents: u32::MAX,
                extra_document_fee_cents: 0,
                included_signers: 2,
                extra_signer_fee_cents: 1_000,
            },
            ServiceType::RonServices => ServiceRates {
                base_cents: 2_500,
                included_radius_miles: 0.0,
                per_mile_cents: 0,
                included_documents: 1,
                extra_document_fee_cents: 500,
                included_signers: 1,
                extra_signer_fee_cents: 500,
            },
        }
    }
}

// ==============================================================================
// SURCHARGES, ADD-ONS, DEPOSITS
// ==============================================================================

pub const WEEKEND_SURCHARGE_CENTS: i64 = 4_000;
pub const HOLIDAY_SURCHARGE_CENTS: i64 = 5_000;
pub const AFTER_HOURS_SURCHARGE_CENTS: i64 = 3_000;

pub const DEPOSIT_THRESHOLD_CENTS: i64 = 10_000;
pub const DEPOSIT_MINIMUM_CENTS: i64 = 2_500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AddOn {
    PriorityDispatch,
    ExtraWitness,
    DocumentPrep,
}

impl AddOn {
    pub fn fee_cents(&self) -> i64 {
        match self {
            AddOn::PriorityDispatch => 2_500,
            AddOn::ExtraWitness => 5_000,
            AddOn::DocumentPrep => 7_500,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AddOn::PriorityDispatch => "Priority dispatch",
            AddOn::ExtraWitness => "Extra witness",
            AddOn::DocumentPrep => "Document preparation",
        }
    }
}

// ==============================================================================
// ENGINE INPUT / OUTPUT
// ==============================================================================

/// Everything the engine needs, resolved up front by the caller.
/// Promo/loyalty discounts require datastore lookups, so they arrive
/// here as an already-resolved amount.
#[derive(Debug, Clone)]
pub struct PricingInput {
    pub service_type: ServiceType,
    pub signer_count: u32,
    pub distance_miles: f64,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub is_after_hours: bool,
    pub extra_documents: u32,
    pub add_ons: Vec<AddOn>,
    pub promo_discount_cents: i64,
}

impl PricingInput {
    pub fn new(service_type: ServiceType) -> Self {
        Self {
            service_type,
            signer_count: 1,
            distance_miles: 0.0,
            is_weekend: false,
            is_holiday: false,
            is_after_hours: false,
            extra_documents: 0,
            add_ons: Vec::new(),
            promo_discount_cents: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    Base,
    Travel,
    Surcharge,
    Fee,
    AddOn,
    Discount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub amount_cents: i64,
    pub kind: LineItemKind,
}

/// Itemized quote. `total_cents` becomes the booking's immutable price
/// snapshot; `deposit_cents` gates up-front payment collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub line_items: Vec<LineItem>,
    pub base_cents: i64,
    pub travel_cents: i64,
    pub surcharge_cents: i64,
    pub fees_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub deposit_cents: i64,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum PricingError {
    #[error("Unknown service type: {0}")]
    UnknownService(String),

    #[error("Invalid pricing input: {0}")]
    InvalidInput(String),
}
