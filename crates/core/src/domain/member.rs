use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One member's share of the group's points pool. Earned points are credited
/// by subsystems outside this crate; the only write this crate performs is
/// the debit applied when a redemption finalizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBalance {
    pub member_id: MemberId,
    pub group_id: GroupId,
    pub points: u64,
}

/// Spendable balance of a group at the time of the read: the sum of its
/// member balances. An empty member set spends nothing.
pub fn group_balance(balances: &[MemberBalance]) -> u64 {
    balances.iter().map(|balance| balance.points).sum()
}

#[cfg(test)]
mod tests {
    use super::{group_balance, GroupId, MemberBalance, MemberId};

    fn balance(member: &str, points: u64) -> MemberBalance {
        MemberBalance {
            member_id: MemberId(member.to_string()),
            group_id: GroupId("grp-eagle".to_string()),
            points,
        }
    }

    #[test]
    fn group_balance_sums_member_points() {
        let balances = vec![balance("m-1", 100), balance("m-2", 50), balance("m-3", 0)];
        assert_eq!(group_balance(&balances), 150);
    }

    #[test]
    fn empty_member_set_has_zero_balance() {
        assert_eq!(group_balance(&[]), 0);
    }
}
