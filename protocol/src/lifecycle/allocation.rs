//! Splitting an emitted supply between platform, reserve and winery.
//!
//! All arithmetic is in stroops. Platform and reserve shares are floored;
//! the winery gets whatever is left, so the three always add up to the total
//! when the basis points fit in 10 000.

use serde::Serialize;

use crate::amount::Amount;
use crate::config::MAX_BPS;
use crate::error::{TokenizationError, TokenizationResult};

/// Who a payout goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutRole {
    Platform,
    Winery,
    Reserve,
}

impl PayoutRole {
    pub fn label(self) -> &'static str {
        match self {
            PayoutRole::Platform => "Platform treasury",
            PayoutRole::Winery => "Winery",
            PayoutRole::Reserve => "Reserve",
        }
    }
}

/// The three shares of a supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub total: Amount,
    pub platform: Amount,
    pub reserve: Amount,
    pub winery: Amount,
    pub platform_fee_bps: u32,
    pub reserve_ratio_bps: u32,
}

/// API shape of an allocation. Platform is always rendered with 7 decimals;
/// the other two collapse to `"0"` when empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationView {
    pub winery_amount: String,
    pub platform_amount: String,
    pub reserve_amount: String,
    pub platform_fee_bps: u32,
    pub reserve_ratio_bps: u32,
}

impl Allocation {
    pub fn view(&self) -> AllocationView {
        AllocationView {
            winery_amount: self.winery.to_compact_string(),
            platform_amount: self.platform.to_string(),
            reserve_amount: self.reserve.to_compact_string(),
            platform_fee_bps: self.platform_fee_bps,
            reserve_ratio_bps: self.reserve_ratio_bps,
        }
    }

    pub fn amount_for(&self, role: PayoutRole) -> Amount {
        match role {
            PayoutRole::Platform => self.platform,
            PayoutRole::Winery => self.winery,
            PayoutRole::Reserve => self.reserve,
        }
    }
}

pub fn compute_allocation(total: Amount, platform_fee_bps: u32, reserve_ratio_bps: u32) -> Allocation {
    let platform = total.mul_bps(platform_fee_bps.min(MAX_BPS));
    let reserve = total.mul_bps(reserve_ratio_bps.min(MAX_BPS));
    let winery = total.saturating_sub(platform).saturating_sub(reserve);
    Allocation {
        total,
        platform,
        reserve,
        winery: if winery.is_positive() { winery } else { Amount::ZERO },
        platform_fee_bps,
        reserve_ratio_bps,
    }
}

/// One payment in the distribution transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutLine {
    pub role: PayoutRole,
    pub destination: String,
    pub amount: Amount,
}

/// Pair each non-zero share with its destination.
///
/// A non-zero share with no destination is refused outright rather than
/// silently left in the distribution account. If every share is zero there
/// is nothing to do, which is [`TokenizationError::NoPayableAmount`].
pub fn plan_payouts(
    allocation: &Allocation,
    token_code: &str,
    treasury: &str,
    winery: Option<&str>,
    reserve: Option<&str>,
) -> TokenizationResult<Vec<PayoutLine>> {
    let candidates = [
        (PayoutRole::Platform, Some(treasury)),
        (PayoutRole::Winery, winery),
        (PayoutRole::Reserve, reserve),
    ];

    let mut lines = Vec::with_capacity(candidates.len());
    for (role, destination) in candidates {
        let amount = allocation.amount_for(role);
        if !amount.is_positive() {
            continue;
        }
        match destination {
            Some(dest) => lines.push(PayoutLine {
                role,
                destination: dest.to_string(),
                amount,
            }),
            None => {
                return Err(TokenizationError::MissingPayoutAddress {
                    label: role.label().to_string(),
                    code: token_code.to_string(),
                    amount,
                })
            }
        }
    }

    if lines.is_empty() {
        return Err(TokenizationError::NoPayableAmount);
    }
    Ok(lines)
}
