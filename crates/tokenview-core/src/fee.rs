//! Transfer-fee policy: bounded, integer-exact, and strictly advisory.
//!
//! The policy validates and computes; it never commits anything. A
//! successful proposal yields the `Mutation::SetFee` to hand to the
//! mutation executor, and the effective fee of a confirmed transfer is
//! always taken from the owner's observed delta, not from this math.

use crate::error::TokenViewError;
use crate::types::{AccountId, Amount, Mutation};

/// Default governance cap: 1000 basis points (10%).
pub const MAX_FEE_BASIS_POINTS: u32 = 1_000;

const BASIS_POINT_DENOMINATOR: u128 = 10_000;

/// Fee rate validation and fee math.
#[derive(Debug, Clone)]
pub struct FeePolicy {
    max_fee_basis_points: u32,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self::new(MAX_FEE_BASIS_POINTS)
    }
}

impl FeePolicy {
    pub fn new(max_fee_basis_points: u32) -> Self {
        Self {
            max_fee_basis_points,
        }
    }

    pub fn cap(&self) -> u32 {
        self.max_fee_basis_points
    }

    /// Validate a fee-rate change request.
    ///
    /// Only the ledger owner may change the rate, and the requested rate
    /// must not exceed the cap. Returns the mutation to submit; this call
    /// commits nothing.
    pub fn propose_fee_change(
        &self,
        requested_basis_points: u32,
        requester: &AccountId,
        owner: &AccountId,
    ) -> Result<Mutation, TokenViewError> {
        if requester != owner {
            return Err(TokenViewError::Unauthorized {
                requester: requester.clone(),
            });
        }
        if requested_basis_points > self.max_fee_basis_points {
            return Err(TokenViewError::OutOfBounds {
                requested: requested_basis_points,
                max: self.max_fee_basis_points,
            });
        }
        Ok(Mutation::SetFee {
            requester: requester.clone(),
            basis_points: requested_basis_points,
        })
    }
}

/// Fee owed on `amount` at `basis_points`, truncating toward zero to match
/// the ledger's own integer math.
pub fn compute_fee(amount: Amount, basis_points: u32) -> Amount {
    let mantissa = amount.mantissa();
    let bps = basis_points as u128;
    // Split to stay exact without overflowing u128 on large mantissas:
    // (m * bps) / D == (m / D) * bps + ((m % D) * bps) / D when D | the
    // first term, which it is by construction.
    let whole = (mantissa / BASIS_POINT_DENOMINATOR).saturating_mul(bps);
    let rest = (mantissa % BASIS_POINT_DENOMINATOR) * bps / BASIS_POINT_DENOMINATOR;
    Amount::from_mantissa(whole.saturating_add(rest))
}
