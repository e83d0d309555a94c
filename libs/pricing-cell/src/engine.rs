use tracing::debug;

use crate::models::{
    AddOn, LineItem, LineItemKind, PriceBreakdown, PricingError, PricingInput,
    AFTER_HOURS_SURCHARGE_CENTS, DEPOSIT_MINIMUM_CENTS, DEPOSIT_THRESHOLD_CENTS,
    HOLIDAY_SURCHARGE_CENTS, WEEKEND_SURCHARGE_CENTS,
};

/// Compute an itemized quote for a booking request. Pure and
/// deterministic: same input, same breakdown, no I/O.
pub fn compute_price(input: &PricingInput) -> Result<PriceBreakdown, PricingError> {
    if input.signer_count == 0 {
        return Err(PricingError::InvalidInput(
            "signer count must be at least 1".to_string(),
        ));
    }
    if input.promo_discount_cents < 0 {
        return Err(PricingError::InvalidInput(
            "discount cannot be negative".to_string(),
        ));
    }

    let rates = input.service_type.rates();
    let mut line_items = Vec::new();

    let base_cents = rates.base_cents;
    line_items.push(LineItem {
        description: format!("{} base fee", input.service_type),
        amount_cents: base_cents,
        kind: LineItemKind::Base,
    });

    let travel_cents = travel_fee_cents(input);
    if travel_cents > 0 {
        line_items.push(LineItem {
            description: format!(
                "Travel fee ({:.1} miles beyond included {:.0}-mile radius)",
                input.distance_miles.max(0.0) - rates.included_radius_miles,
                rates.included_radius_miles
            ),
            amount_cents: travel_cents,
            kind: LineItemKind::Travel,
        });
    }

    let mut surcharge_cents = 0;

    // Weekend and holiday never stack; the larger of the two applies.
    if input.is_weekend || input.is_holiday {
        let (amount, label) = if input.is_holiday && input.is_weekend {
            if HOLIDAY_SURCHARGE_CENTS >= WEEKEND_SURCHARGE_CENTS {
                (HOLIDAY_SURCHARGE_CENTS, "Holiday service surcharge")
            } else {
                (WEEKEND_SURCHARGE_CENTS, "Weekend service surcharge")
            }
        } else if input.is_holiday {
            (HOLIDAY_SURCHARGE_CENTS, "Holiday service surcharge")
        } else {
            (WEEKEND_SURCHARGE_CENTS, "Weekend service surcharge")
        };
        surcharge_cents += amount;
        line_items.push(LineItem {
            description: label.to_string(),
            amount_cents: amount,
            kind: LineItemKind::Surcharge,
        });
    }

    if input.is_after_hours {
        surcharge_cents += AFTER_HOURS_SURCHARGE_CENTS;
        line_items.push(LineItem {
            description: "After-hours surcharge".to_string(),
            amount_cents: AFTER_HOURS_SURCHARGE_CENTS,
            kind: LineItemKind::Surcharge,
        });
    }

    let mut fees_cents = 0;

    let extra_signers = input.signer_count.saturating_sub(rates.included_signers);
    if extra_signers > 0 && rates.extra_signer_fee_cents > 0 {
        let amount = extra_signers as i64 * rates.extra_signer_fee_cents;
        fees_cents += amount;
        line_items.push(LineItem {
            description: format!("Additional signers ({})", extra_signers),
            amount_cents: amount,
            kind: LineItemKind::Fee,
        });
    }

    if input.extra_documents > 0 && rates.extra_document_fee_cents > 0 {
        let amount = input.extra_documents as i64 * rates.extra_document_fee_cents;
        fees_cents += amount;
        line_items.push(LineItem {
            description: format!("Additional documents ({})", input.extra_documents),
            amount_cents: amount,
            kind: LineItemKind::Fee,
        });
    }

    for add_on in &input.add_ons {
        let amount = add_on.fee_cents();
        fees_cents += amount;
        line_items.push(LineItem {
            description: add_on.label().to_string(),
            amount_cents: amount,
            kind: LineItemKind::AddOn,
        });
    }

    let discount_cents = input.promo_discount_cents;
    if discount_cents > 0 {
        line_items.push(LineItem {
            description: "Discounts applied".to_string(),
            amount_cents: -discount_cents,
            kind: LineItemKind::Discount,
        });
    }

    let total_cents =
        (base_cents + travel_cents + surcharge_cents + fees_cents - discount_cents).max(0);
    let deposit_cents = quote_deposit(total_cents);

    debug!(
        service_type = %input.service_type,
        total_cents,
        deposit_cents,
        "price computed"
    );

    Ok(PriceBreakdown {
        line_items,
        base_cents,
        travel_cents,
        surcharge_cents,
        fees_cents,
        discount_cents,
        total_cents,
        deposit_cents,
    })
}

/// 50% deposit on quotes over the threshold, with a floor; smaller jobs
/// collect nothing up front.
pub fn quote_deposit(total_cents: i64) -> i64 {
    if total_cents > DEPOSIT_THRESHOLD_CENTS {
        (total_cents / 2).max(DEPOSIT_MINIMUM_CENTS)
    } else {
        0
    }
}

/// Travel beyond the service's included radius, billed per mile.
/// Negative or non-finite distances are treated as in-radius.
fn travel_fee_cents(input: &PricingInput) -> i64 {
    if input.service_type.is_remote() {
        return 0;
    }

    let rates = input.service_type.rates();
    let distance = if input.distance_miles.is_finite() {
        input.distance_miles.max(0.0)
    } else {
        0.0
    };

    let excess_miles = (distance - rates.included_radius_miles).max(0.0);
    (excess_miles * rates.per_mile_cents as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceType;
    use assert_matches::assert_matches;
    use std::str::FromStr;

    #[test]
    fn test_standard_notary_travel_fee_scenario() {
        // 25 miles against a 20-mile included radius at $0.50/mile.
        let mut input = PricingInput::new(ServiceType::StandardNotary);
        input.distance_miles = 25.0;

        let breakdown = compute_price(&input).unwrap();

        assert_eq!(breakdown.base_cents, 7_500);
        assert_eq!(breakdown.travel_cents, 250);
        assert_eq!(breakdown.total_cents, 7_750);
        assert_eq!(breakdown.deposit_cents, 0);
    }

    #[test]
    fn test_travel_fee_monotonic_in_distance() {
        let mut previous_total = 0;
        for miles in [0.0, 10.0, 20.0, 20.5, 25.0, 40.0, 100.0] {
            let mut input = PricingInput::new(ServiceType::StandardNotary);
            input.distance_miles = miles;
            let total = compute_price(&input).unwrap().total_cents;
            assert!(
                total >= previous_total,
                "total decreased at {} miles: {} < {}",
                miles,
                total,
                previous_total
            );
            previous_total = total;
        }
    }

    #[test]
    fn test_negative_distance_treated_as_zero() {
        let mut input = PricingInput::new(ServiceType::StandardNotary);
        input.distance_miles = -14.0;

        let breakdown = compute_price(&input).unwrap();
        assert_eq!(breakdown.travel_cents, 0);
        assert_eq!(breakdown.total_cents, 7_500);
    }

    #[test]
    fn test_remote_service_has_no_travel_fee() {
        let mut input = PricingInput::new(ServiceType::RonServices);
        input.distance_miles = 500.0;

        let breakdown = compute_price(&input).unwrap();
        assert_eq!(breakdown.travel_cents, 0);
    }

    #[test]
    fn test_weekend_and_holiday_never_stack() {
        let mut input = PricingInput::new(ServiceType::StandardNotary);
        input.is_weekend = true;
        input.is_holiday = true;

        let breakdown = compute_price(&input).unwrap();

        // Only the larger of the two applies.
        assert_eq!(breakdown.surcharge_cents, HOLIDAY_SURCHARGE_CENTS);
        let surcharge_items: Vec<_> = breakdown
            .line_items
            .iter()
            .filter(|item| item.kind == LineItemKind::Surcharge)
            .collect();
        assert_eq!(surcharge_items.len(), 1);
    }

    #[test]
    fn test_after_hours_stacks_with_weekend() {
        let mut input = PricingInput::new(ServiceType::StandardNotary);
        input.is_weekend = true;
        input.is_after_hours = true;

        let breakdown = compute_price(&input).unwrap();
        assert_eq!(
            breakdown.surcharge_cents,
            WEEKEND_SURCHARGE_CENTS + AFTER_HOURS_SURCHARGE_CENTS
        );
    }

    #[test]
    fn test_extra_signers_and_documents() {
        let mut input = PricingInput::new(ServiceType::StandardNotary);
        input.signer_count = 3;
        input.extra_documents = 2;

        let breakdown = compute_price(&input).unwrap();
        // Two extra signers at $10 plus two extra documents at $5.
        assert_eq!(breakdown.fees_cents, 2_000 + 1_000);
    }

    #[test]
    fn test_loan_signing_flat_document_pricing() {
        let mut cheap = PricingInput::new(ServiceType::LoanSigning);
        cheap.signer_count = 2;
        let mut heavy = cheap.clone();
        heavy.extra_documents = 40;

        let cheap_total = compute_price(&cheap).unwrap().total_cents;
        let heavy_total = compute_price(&heavy).unwrap().total_cents;
        assert_eq!(cheap_total, heavy_total);
    }

    #[test]
    fn test_add_on_fees_applied() {
        let mut input = PricingInput::new(ServiceType::StandardNotary);
        input.add_ons = vec![AddOn::PriorityDispatch, AddOn::ExtraWitness];

        let breakdown = compute_price(&input).unwrap();
        assert_eq!(breakdown.fees_cents, 2_500 + 5_000);
    }

    #[test]
    fn test_discount_clamps_at_zero() {
        let mut input = PricingInput::new(ServiceType::RonServices);
        input.promo_discount_cents = 99_999;

        let breakdown = compute_price(&input).unwrap();
        assert_eq!(breakdown.total_cents, 0);
    }

    #[test]
    fn test_deposit_rules() {
        assert_eq!(quote_deposit(7_750), 0);
        assert_eq!(quote_deposit(10_000), 0);
        assert_eq!(quote_deposit(10_001), 5_000);
        assert_eq!(quote_deposit(15_000), 7_500);
        // The floor only matters just past the threshold.
        assert!(quote_deposit(10_002) >= DEPOSIT_MINIMUM_CENTS);
    }

    #[test]
    fn test_deposit_collected_for_expensive_booking() {
        let mut input = PricingInput::new(ServiceType::LoanSigning);
        input.signer_count = 2;

        let breakdown = compute_price(&input).unwrap();
        assert_eq!(breakdown.total_cents, 15_000);
        assert_eq!(breakdown.deposit_cents, 7_500);
    }

    #[test]
    fn test_unknown_service_type_rejected_at_boundary() {
        let result = ServiceType::from_str("DRONE_NOTARY");
        assert_matches!(result, Err(PricingError::UnknownService(_)));
    }

    #[test]
    fn test_zero_signers_rejected() {
        let mut input = PricingInput::new(ServiceType::StandardNotary);
        input.signer_count = 0;

        assert_matches!(compute_price(&input), Err(PricingError::InvalidInput(_)));
    }
}
