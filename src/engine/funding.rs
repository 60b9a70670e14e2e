//! Checkout funding composition.
//!
//! Splits each selection's price across the three funding legs: wallet
//! balance first, then refund credit (never for reassignments), with the
//! remainder going to the external gateway. Pure arithmetic; the coordinator
//! feeds it balances read inside its own transaction.

use crate::domain::Money;

/// Funding split for one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingSplit {
    pub price: Money,
    /// Covered from the advertiser's wallet balance.
    pub wallet_applied: Money,
    /// Covered from refund credit. Always zero for reassignments.
    pub refund_applied: Money,
    /// Sent to the external gateway.
    pub amount_paid: Money,
}

impl FundingSplit {
    /// The composition invariant for this split.
    pub fn balanced(&self) -> bool {
        self.price == self.wallet_applied + self.refund_applied + self.amount_paid
    }
}

/// Funding plan for a whole checkout group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingPlan {
    /// Per-selection splits, in input order.
    pub splits: Vec<FundingSplit>,
    pub wallet_total: Money,
    pub refund_total: Money,
    /// Amount to charge through the gateway; zero means the checkout settles
    /// without an external call.
    pub external_total: Money,
}

/// Compose funding for a group of selections.
///
/// Selections draw sequentially from the shared wallet balance and refund
/// credit pool, in input order. Refund credit is categorically excluded for
/// reassignments; a reassignment either covers each price from wallet
/// balance or sends the remainder to the gateway.
pub fn plan_checkout(
    prices: &[Money],
    wallet_balance: Money,
    refund_available: Money,
    is_reassignment: bool,
) -> FundingPlan {
    let mut remaining_wallet = wallet_balance;
    let mut remaining_refund = if is_reassignment {
        Money::zero()
    } else {
        refund_available
    };

    let mut splits = Vec::with_capacity(prices.len());
    let mut wallet_total = Money::zero();
    let mut refund_total = Money::zero();
    let mut external_total = Money::zero();

    for &price in prices {
        let wallet_applied = remaining_wallet.min(price);
        remaining_wallet = remaining_wallet - wallet_applied;

        let after_wallet = price - wallet_applied;
        let refund_applied = remaining_refund.min(after_wallet);
        remaining_refund = remaining_refund - refund_applied;

        let amount_paid = after_wallet - refund_applied;

        wallet_total = wallet_total + wallet_applied;
        refund_total = refund_total + refund_applied;
        external_total = external_total + amount_paid;

        splits.push(FundingSplit {
            price,
            wallet_applied,
            refund_applied,
            amount_paid,
        });
    }

    FundingPlan {
        splits,
        wallet_total,
        refund_total,
        external_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        Money::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_wallet_covers_everything() {
        let plan = plan_checkout(&[m("15")], m("100"), m("0"), false);
        assert_eq!(plan.splits[0].wallet_applied, m("15"));
        assert_eq!(plan.splits[0].refund_applied, m("0"));
        assert_eq!(plan.splits[0].amount_paid, m("0"));
        assert_eq!(plan.external_total, m("0"));
        assert!(plan.splits[0].balanced());
    }

    #[test]
    fn test_refund_credit_covers_remainder() {
        // Wallet empty, 20 refund credit, price 15: all from credit.
        let plan = plan_checkout(&[m("15")], m("0"), m("20"), false);
        assert_eq!(plan.splits[0].wallet_applied, m("0"));
        assert_eq!(plan.splits[0].refund_applied, m("15"));
        assert_eq!(plan.splits[0].amount_paid, m("0"));
        assert_eq!(plan.external_total, m("0"));
    }

    #[test]
    fn test_three_way_split() {
        let plan = plan_checkout(&[m("100")], m("40"), m("25"), false);
        assert_eq!(plan.splits[0].wallet_applied, m("40"));
        assert_eq!(plan.splits[0].refund_applied, m("25"));
        assert_eq!(plan.splits[0].amount_paid, m("35"));
        assert!(plan.splits[0].balanced());
    }

    #[test]
    fn test_reassignment_excludes_refund_credit() {
        let plan = plan_checkout(&[m("100")], m("40"), m("25"), true);
        assert_eq!(plan.splits[0].wallet_applied, m("40"));
        assert_eq!(plan.splits[0].refund_applied, m("0"));
        assert_eq!(plan.splits[0].amount_paid, m("60"));
        assert_eq!(plan.refund_total, m("0"));
    }

    #[test]
    fn test_group_draws_sequentially() {
        let plan = plan_checkout(&[m("10"), m("10"), m("10")], m("15"), m("8"), false);

        assert_eq!(plan.splits[0].wallet_applied, m("10"));
        assert_eq!(plan.splits[0].amount_paid, m("0"));

        assert_eq!(plan.splits[1].wallet_applied, m("5"));
        assert_eq!(plan.splits[1].refund_applied, m("5"));
        assert_eq!(plan.splits[1].amount_paid, m("0"));

        assert_eq!(plan.splits[2].wallet_applied, m("0"));
        assert_eq!(plan.splits[2].refund_applied, m("3"));
        assert_eq!(plan.splits[2].amount_paid, m("7"));

        assert_eq!(plan.wallet_total, m("15"));
        assert_eq!(plan.refund_total, m("8"));
        assert_eq!(plan.external_total, m("7"));
        assert!(plan.splits.iter().all(FundingSplit::balanced));
    }

    #[test]
    fn test_no_balances_goes_fully_external() {
        let plan = plan_checkout(&[m("30")], m("0"), m("0"), false);
        assert_eq!(plan.splits[0].amount_paid, m("30"));
        assert_eq!(plan.external_total, m("30"));
    }
}
