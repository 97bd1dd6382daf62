use crate::domain::member::{MemberBalance, MemberId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberDebit {
    pub member_id: MemberId,
    pub amount: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebitPlan {
    pub deductions: Vec<MemberDebit>,
}

impl DebitPlan {
    pub fn is_empty(&self) -> bool {
        self.deductions.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.deductions.iter().map(|debit| debit.amount).sum()
    }
}

/// Splits a group-level charge across members in proportion to their current
/// balances: `floor(total * member_points / group_points)` each.
///
/// Floor rounding may collect up to `member_count - 1` points less than the
/// requested total. The shortfall is forgiven, never assigned to any single
/// member. Members whose share rounds to zero are left untouched, and a
/// group with no members or no points yields an empty plan.
pub fn plan_proportional_debit(balances: &[MemberBalance], total_points: u64) -> DebitPlan {
    if balances.is_empty() || total_points == 0 {
        return DebitPlan::default();
    }

    let group_points: u64 = balances.iter().map(|balance| balance.points).sum();
    if group_points == 0 {
        return DebitPlan::default();
    }

    let deductions = balances
        .iter()
        .filter_map(|member| {
            // Widened so `total * points` cannot overflow before the divide.
            let share = u128::from(total_points) * u128::from(member.points)
                / u128::from(group_points);
            let amount = share as u64;
            (amount > 0).then(|| MemberDebit { member_id: member.member_id.clone(), amount })
        })
        .collect();

    DebitPlan { deductions }
}

#[cfg(test)]
mod tests {
    use crate::domain::member::{GroupId, MemberBalance, MemberId};

    use super::plan_proportional_debit;

    fn balances(points: &[u64]) -> Vec<MemberBalance> {
        points
            .iter()
            .enumerate()
            .map(|(index, points)| MemberBalance {
                member_id: MemberId(format!("m-{index}")),
                group_id: GroupId("grp-eagle".to_string()),
                points: *points,
            })
            .collect()
    }

    #[test]
    fn exact_split_leaves_no_remainder() {
        let plan = plan_proportional_debit(&balances(&[100, 50, 0]), 30);

        let amounts: Vec<(String, u64)> = plan
            .deductions
            .iter()
            .map(|debit| (debit.member_id.0.clone(), debit.amount))
            .collect();
        assert_eq!(amounts, vec![("m-0".to_string(), 20), ("m-1".to_string(), 10)]);
        assert_eq!(plan.total(), 30);
    }

    #[test]
    fn floor_rounding_under_collects_and_is_accepted() {
        let plan = plan_proportional_debit(&balances(&[10, 10, 10]), 10);

        let amounts: Vec<u64> = plan.deductions.iter().map(|debit| debit.amount).collect();
        assert_eq!(amounts, vec![3, 3, 3]);
        assert_eq!(plan.total(), 9);
    }

    #[test]
    fn shortfall_is_bounded_by_member_count_minus_one() {
        let members = balances(&[7, 7, 7, 7]);
        let plan = plan_proportional_debit(&members, 10);

        let shortfall = 10 - plan.total();
        assert!(shortfall <= (members.len() as u64) - 1, "shortfall was {shortfall}");
    }

    #[test]
    fn larger_balances_never_lose_fewer_points() {
        let plan = plan_proportional_debit(&balances(&[5, 40, 200, 200]), 90);

        let amounts: Vec<u64> = plan.deductions.iter().map(|debit| debit.amount).collect();
        let mut sorted = amounts.clone();
        sorted.sort_unstable();
        assert_eq!(amounts, sorted);
        // Equal balances are charged equally.
        assert_eq!(amounts[amounts.len() - 1], amounts[amounts.len() - 2]);
    }

    #[test]
    fn no_members_means_nothing_to_deduct() {
        assert!(plan_proportional_debit(&[], 50).is_empty());
    }

    #[test]
    fn zero_group_balance_means_nothing_to_deduct() {
        assert!(plan_proportional_debit(&balances(&[0, 0]), 50).is_empty());
    }

    #[test]
    fn zero_charge_is_a_no_op() {
        assert!(plan_proportional_debit(&balances(&[10, 20]), 0).is_empty());
    }

    #[test]
    fn large_balances_do_not_overflow_the_split() {
        let plan = plan_proportional_debit(&balances(&[u64::MAX / 2, u64::MAX / 2]), 1_000);
        assert_eq!(plan.total(), 1_000);
    }
}
