use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Decimal scale shared by every balance and rate in the mirrored ledger.
pub const AMOUNT_DECIMALS: u32 = 18;

/// Mantissa value of one whole token (10^18).
pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Unsigned fixed-point amount: integer mantissa at an 18-decimal scale.
///
/// Serialized as a decimal string because mantissas routinely exceed the
/// integer range JSON consumers can represent losslessly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_mantissa(mantissa: u128) -> Self {
        Self(mantissa)
    }

    /// Whole-token constructor: `from_whole(5)` is 5 tokens, mantissa 5×10^18.
    pub fn from_whole(tokens: u64) -> Self {
        Self(tokens as u128 * ONE_TOKEN)
    }

    pub fn mantissa(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Scale by a whole number of seconds, saturating at the representable
    /// maximum. Used by reward projection (`rate * elapsed`).
    pub fn saturating_mul_secs(self, secs: u64) -> Amount {
        Amount(self.0.saturating_mul(secs as u128))
    }

    /// Signed difference `self - earlier`, saturating at the i128 range.
    pub fn delta_since(self, earlier: Amount) -> BalanceDelta {
        let now = clamp_to_i128(self.0);
        let before = clamp_to_i128(earlier.0);
        BalanceDelta(now - before)
    }
}

fn clamp_to_i128(value: u128) -> i128 {
    i128::try_from(value).unwrap_or(i128::MAX)
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / ONE_TOKEN;
        let frac = self.0 % ONE_TOKEN;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let frac = format!("{:018}", frac);
        write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if frac.len() > AMOUNT_DECIMALS as usize {
            return Err(format!("more than {} fractional digits: '{}'", AMOUNT_DECIMALS, s));
        }
        let whole: u128 = whole
            .parse()
            .map_err(|e| format!("invalid amount '{}': {}", s, e))?;
        let mut frac_mantissa: u128 = 0;
        if !frac.is_empty() {
            let padded = format!("{:0<18}", frac);
            frac_mantissa = padded
                .parse()
                .map_err(|e| format!("invalid amount '{}': {}", s, e))?;
        }
        whole
            .checked_mul(ONE_TOKEN)
            .and_then(|m| m.checked_add(frac_mantissa))
            .map(Amount)
            .ok_or_else(|| format!("amount out of range: '{}'", s))
    }
}

impl TryFrom<String> for Amount {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_string()
    }
}

/// Signed fixed-point difference between two observed balances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BalanceDelta(i128);

impl BalanceDelta {
    pub const ZERO: BalanceDelta = BalanceDelta(0);

    pub fn from_mantissa(mantissa: i128) -> Self {
        Self(mantissa)
    }

    pub fn mantissa(self) -> i128 {
        self.0
    }

    pub fn is_gain(self) -> bool {
        self.0 > 0
    }

    pub fn is_loss(self) -> bool {
        self.0 < 0
    }

    /// Magnitude as an unsigned amount.
    pub fn magnitude(self) -> Amount {
        Amount(self.0.unsigned_abs())
    }
}

impl fmt::Display for BalanceDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "-{}", self.magnitude())
        } else {
            write!(f, "+{}", self.magnitude())
        }
    }
}

impl TryFrom<String> for BalanceDelta {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (negative, digits) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value.strip_prefix('+').unwrap_or(&value)),
        };
        let amount: Amount = digits.parse()?;
        let mantissa = clamp_to_i128(amount.mantissa());
        Ok(BalanceDelta(if negative { -mantissa } else { mantissa }))
    }
}

impl From<BalanceDelta> for String {
    fn from(value: BalanceDelta) -> Self {
        value.to_string()
    }
}

/// Opaque on-ledger account address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

/// Authoritatively observed account state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Amount,
    /// Absent means the account has never claimed a reward.
    pub last_claim_time: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(id: AccountId, balance: Amount) -> Self {
        Self {
            id,
            balance,
            last_claim_time: None,
        }
    }

    pub fn with_last_claim(mut self, at: DateTime<Utc>) -> Self {
        self.last_claim_time = Some(at);
        self
    }
}

/// Ledger-wide parameters, read-only from the mirror's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalParameters {
    /// Account with exclusive authority over the fee rate; also collects
    /// the fee share of every transfer.
    pub owner: AccountId,
    pub fee_rate_basis_points: u32,
    pub reward_rate_per_second: Amount,
}

/// A timestamped authoritative read of account and parameter state.
///
/// Snapshots may be partial: `accounts` carries only the accounts that were
/// queried, and a merge must not disturb any others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub accounts: BTreeMap<AccountId, Account>,
    pub params: GlobalParameters,
    pub observed_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Balance of `id` as observed, zero when the account was not present.
    pub fn balance_of(&self, id: &AccountId) -> Amount {
        self.accounts
            .get(id)
            .map(|account| account.balance)
            .unwrap_or(Amount::ZERO)
    }
}

/// A state change submitted to the authoritative ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    ClaimReward {
        account: AccountId,
    },
    SetFee {
        requester: AccountId,
        basis_points: u32,
    },
}

impl Mutation {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Transfer { .. } => "transfer",
            Self::ClaimReward { .. } => "claim_reward",
            Self::SetFee { .. } => "set_fee",
        }
    }

    /// The account this mutation originates from; at most one mutation may
    /// be outstanding per originator.
    pub fn originator(&self) -> &AccountId {
        match self {
            Self::Transfer { from, .. } => from,
            Self::ClaimReward { account } => account,
            Self::SetFee { requester, .. } => requester,
        }
    }

    /// Accounts named directly by the mutation, before fee routing.
    pub fn named_accounts(&self) -> BTreeSet<AccountId> {
        let mut accounts = BTreeSet::new();
        match self {
            Self::Transfer { from, to, .. } => {
                accounts.insert(from.clone());
                accounts.insert(to.clone());
            }
            Self::ClaimReward { account } => {
                accounts.insert(account.clone());
            }
            Self::SetFee { requester, .. } => {
                accounts.insert(requester.clone());
            }
        }
        accounts
    }

    /// Every account whose balance this mutation can affect. Transfers also
    /// touch the owner, who collects the fee share.
    pub fn touched_accounts(&self, owner: &AccountId) -> BTreeSet<AccountId> {
        let mut accounts = self.named_accounts();
        if matches!(self, Self::Transfer { .. }) {
            accounts.insert(owner.clone());
        }
        accounts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_display_round_trips() {
        let cases = [
            Amount::ZERO,
            Amount::from_whole(1),
            Amount::from_mantissa(1),
            Amount::from_mantissa(1_500_000_000_000_000_000),
            Amount::from_mantissa(u128::MAX / ONE_TOKEN * ONE_TOKEN),
        ];
        for amount in cases {
            let parsed: Amount = amount.to_string().parse().expect("parse");
            assert_eq!(parsed, amount);
        }
    }

    #[test]
    fn amount_rejects_excess_precision() {
        assert!("1.0000000000000000001".parse::<Amount>().is_err());
    }

    #[test]
    fn delta_signs() {
        let before = Amount::from_whole(10);
        let after = Amount::from_whole(7);
        let delta = after.delta_since(before);
        assert!(delta.is_loss());
        assert_eq!(delta.magnitude(), Amount::from_whole(3));
        assert_eq!(delta.to_string(), "-3");
    }

    #[test]
    fn transfer_touches_owner() {
        let mutation = Mutation::Transfer {
            from: AccountId::from("0xaaa"),
            to: AccountId::from("0xbbb"),
            amount: Amount::from_whole(1),
        };
        let owner = AccountId::from("0xccc");
        let touched = mutation.touched_accounts(&owner);
        assert_eq!(touched.len(), 3);
        assert!(touched.contains(&owner));
    }

    #[test]
    fn claim_does_not_touch_owner() {
        let mutation = Mutation::ClaimReward {
            account: AccountId::from("0xaaa"),
        };
        let owner = AccountId::from("0xccc");
        assert!(!mutation.touched_accounts(&owner).contains(&owner));
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let amount = Amount::from_whole(1_000_000);
        let json = serde_json::to_string(&amount).expect("serialize");
        assert_eq!(json, "\"1000000\"");
    }
}
