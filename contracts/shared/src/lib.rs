//! Shared arithmetic and cross-contract interfaces for the lottery contracts.
//!
//! The lottery never links against the identity registry or the randomizer
//! directly. It talks to them through the client traits declared here, so any
//! deployed contract exposing the same function names and argument types can
//! be configured in their place.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{contractclient, contracterror, Address, Env};

/// Error codes for the shared helpers.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Error {
    InvalidAmount = 1,
    InvalidRate = 2,
    Overflow = 3,
}

/// Fee rates are expressed in basis points (e.g., 1_000 = 10%).
pub const FEE_DENOMINATOR: u32 = 10_000;

/// `amount * fee_rate / FEE_DENOMINATOR`, rounded down.
///
/// Truncation is part of the settlement contract: the remainder stays with
/// whoever receives `amount - fee`.
pub fn calculate_fee(amount: i128, fee_rate: u32) -> Result<i128, Error> {
    if amount < 0 {
        return Err(Error::InvalidAmount);
    }
    if fee_rate > FEE_DENOMINATOR {
        return Err(Error::InvalidRate);
    }
    amount
        .checked_mul(fee_rate as i128)
        .and_then(|v| v.checked_div(FEE_DENOMINATOR as i128))
        .ok_or(Error::Overflow)
}

// ---------------------------------------------------------------------------
// Cross-contract interfaces
// ---------------------------------------------------------------------------

/// Maps an account to a stable, Sybil-resistant identity handle.
#[contractclient(name = "IdentityProviderClient")]
pub trait IdentityProvider {
    /// Fails when `account` has no registered identity.
    fn resolve(env: Env, account: Address) -> u64;
}

/// Outbound half of the randomness protocol.
#[contractclient(name = "RandomnessOracleClient")]
pub trait RandomnessOracle {
    /// Register a request on behalf of `consumer`. `payer` covers the
    /// oracle's off-chain cost. Returns the id the fulfillment will carry.
    fn request_random(env: Env, consumer: Address, payer: Address, seed_hint: u64) -> u64;
}

/// Inbound half of the randomness protocol, implemented by consumers.
#[contractclient(name = "RandomnessConsumerClient")]
pub trait RandomnessConsumer {
    /// Deliver `raw_value` for `request_id`. `oracle` is the delivering
    /// contract and must be the consumer's configured oracle.
    fn fulfill_randomness(env: Env, oracle: Address, request_id: u64, raw_value: u64);
}
