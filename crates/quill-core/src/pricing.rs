//! Static pricing catalog: plan name, price, credit quantity and the
//! payment collaborator's price identifier. Pure lookup table, no state.

/// Credits granted to a user the first time the service sees them.
pub const BOOTSTRAP_GRANT: i64 = 100;

/// Credits debited per successful transcription request.
pub const TRANSCRIPTION_COST: i64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingPlan {
    pub name: &'static str,
    pub price_cents: u32,
    pub credits: i64,
    pub price_id: &'static str,
}

pub const PLANS: &[PricingPlan] = &[
    PricingPlan {
        name: "Basic",
        price_cents: 500,
        credits: 50,
        price_id: "price_basic_50",
    },
    PricingPlan {
        name: "Pro",
        price_cents: 1000,
        credits: 120,
        price_id: "price_pro_120",
    },
    PricingPlan {
        name: "Ultimate",
        price_cents: 2000,
        credits: 300,
        price_id: "price_ultimate_300",
    },
];

pub fn find_plan(price_id: &str) -> Option<&'static PricingPlan> {
    PLANS.iter().find(|plan| plan.price_id == price_id)
}

/// Resolve a payment-collaborator price id to a credit quantity.
pub fn credits_for_price(price_id: &str) -> Option<i64> {
    find_plan(price_id).map(|plan| plan.credits)
}
