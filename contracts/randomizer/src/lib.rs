//! Randomizer Contract
//!
//! Oracle transport for the lottery's randomness protocol, split across two
//! independent transactions:
//!
//! 1. A whitelisted consumer contract calls `request_random`. The `payer`
//!    covers the oracle's off-chain cost (`request_fee`, paid to the oracle
//!    operator) and the contract assigns the next sequential request id.
//! 2. The designated oracle calls `fulfill_random` with a `server_seed`.
//!    The raw value is
//!
//!      `u64_be(sha256(server_seed || request_id_be_bytes)[0..8])`
//!
//!    and is forwarded to the consumer's `fulfill_randomness` entry point.
//!    Reducing the raw value to a range is the consumer's business.
//!
//! The seed and the raw value are stored on-chain after fulfillment, so any
//! party can re-derive the value. A consumer that rejects the callback does
//! not block fulfillment: the entry is recorded with `delivered = false`.
//!
//! ## Storage Strategy
//! - `instance()`: Admin, Oracle, FeeToken, RequestFee, NextRequestId.
//! - `persistent()`: AuthorizedConsumer entries, PendingRequest entries,
//!   FulfilledRequest entries, TTL bumped on every write.
#![no_std]
#![allow(unexpected_cfgs)]

use lotto_shared::RandomnessConsumerClient;
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, log, token::TokenClient,
    Address, Bytes, BytesN, Env,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Persistent storage TTL in ledgers (~30 days at 5 s/ledger).
pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized     = 2,
    NotAuthorized      = 3,
    InvalidAmount      = 4,
    RequestNotFound    = 5,
    /// `fulfill_random` was called a second time for the same `request_id`.
    AlreadyFulfilled   = 6,
    /// The `consumer` passed to `request_random` is not in the whitelist.
    UnauthorizedConsumer = 7,
    Overflow           = 8,
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

#[contracttype]
pub enum DataKey {
    // --- instance() ---
    Admin,
    Oracle,
    FeeToken,
    RequestFee,
    NextRequestId,
    // --- persistent() ---
    /// Presence flag for whitelisted consumer contracts.
    AuthorizedConsumer(Address),
    PendingRequest(u64),
    FulfilledRequest(u64),
}

/// A request awaiting the oracle.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingEntry {
    pub consumer: Address,
    pub seed_hint: u64,
    pub issued_at: u64,
}

/// A fulfilled request with the seed needed to verify it.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FulfilledEntry {
    pub consumer: Address,
    pub seed_hint: u64,
    pub server_seed: BytesN<32>,
    pub raw_value: u64,
    /// Whether the consumer accepted the callback.
    pub delivered: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct RandomRequested {
    #[topic]
    pub request_id: u64,
    #[topic]
    pub consumer: Address,
    pub seed_hint: u64,
    pub fee: i128,
}

#[contractevent]
pub struct RandomFulfilled {
    #[topic]
    pub request_id: u64,
    pub raw_value: u64,
    pub server_seed: BytesN<32>,
    pub delivered: bool,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct Randomizer;

#[contractimpl]
impl Randomizer {
    /// Initialize the contract. May only be called once.
    ///
    /// `oracle` is the sole address permitted to call `fulfill_random` and
    /// receives every `request_fee` paid in `fee_token`.
    pub fn init(
        env: Env,
        admin: Address,
        oracle: Address,
        fee_token: Address,
        request_fee: i128,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        if request_fee < 0 {
            return Err(Error::InvalidAmount);
        }

        admin.require_auth();

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Oracle, &oracle);
        env.storage().instance().set(&DataKey::FeeToken, &fee_token);
        env.storage().instance().set(&DataKey::RequestFee, &request_fee);
        env.storage().instance().set(&DataKey::NextRequestId, &1u64);

        Ok(())
    }

    /// Add a consumer contract to the whitelist. Admin only.
    pub fn authorize(env: Env, admin: Address, consumer: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        require_admin(&env, &admin)?;

        let key = DataKey::AuthorizedConsumer(consumer);
        env.storage().persistent().set(&key, &());
        env.storage()
            .persistent()
            .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);

        Ok(())
    }

    /// Remove a consumer contract from the whitelist. Admin only.
    pub fn revoke(env: Env, admin: Address, consumer: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        require_admin(&env, &admin)?;

        env.storage()
            .persistent()
            .remove(&DataKey::AuthorizedConsumer(consumer));

        Ok(())
    }

    /// Change the per-request fee. Admin only.
    pub fn set_request_fee(env: Env, admin: Address, request_fee: i128) -> Result<(), Error> {
        require_initialized(&env)?;
        require_admin(&env, &admin)?;

        if request_fee < 0 {
            return Err(Error::InvalidAmount);
        }
        env.storage().instance().set(&DataKey::RequestFee, &request_fee);

        Ok(())
    }

    /// Register a randomness request for `consumer` and return its id.
    ///
    /// `payer` transfers the current `request_fee` to the oracle operator in
    /// the same transaction. A zero fee skips the transfer.
    pub fn request_random(
        env: Env,
        consumer: Address,
        payer: Address,
        seed_hint: u64,
    ) -> Result<u64, Error> {
        require_initialized(&env)?;

        consumer.require_auth();

        if !env
            .storage()
            .persistent()
            .has(&DataKey::AuthorizedConsumer(consumer.clone()))
        {
            return Err(Error::UnauthorizedConsumer);
        }

        payer.require_auth();

        let fee: i128 = env
            .storage()
            .instance()
            .get(&DataKey::RequestFee)
            .unwrap_or(0);
        if fee > 0 {
            let token: Address = env
                .storage()
                .instance()
                .get(&DataKey::FeeToken)
                .ok_or(Error::NotInitialized)?;
            let oracle = get_oracle(&env)?;
            TokenClient::new(&env, &token).transfer(&payer, &oracle, &fee);
        }

        let request_id: u64 = env
            .storage()
            .instance()
            .get(&DataKey::NextRequestId)
            .unwrap_or(1);
        let next = request_id.checked_add(1).ok_or(Error::Overflow)?;
        env.storage().instance().set(&DataKey::NextRequestId, &next);

        let entry = PendingEntry {
            consumer: consumer.clone(),
            seed_hint,
            issued_at: env.ledger().timestamp(),
        };
        let key = DataKey::PendingRequest(request_id);
        env.storage().persistent().set(&key, &entry);
        env.storage()
            .persistent()
            .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);

        RandomRequested { request_id, consumer, seed_hint, fee }.publish(&env);

        Ok(request_id)
    }

    /// Fulfill a pending request and forward the raw value. Oracle only.
    ///
    /// Returns the derived raw value.
    pub fn fulfill_random(
        env: Env,
        oracle: Address,
        request_id: u64,
        server_seed: BytesN<32>,
    ) -> Result<u64, Error> {
        require_initialized(&env)?;
        require_oracle(&env, &oracle)?;

        if env
            .storage()
            .persistent()
            .has(&DataKey::FulfilledRequest(request_id))
        {
            return Err(Error::AlreadyFulfilled);
        }

        let pending_key = DataKey::PendingRequest(request_id);
        let pending: PendingEntry = env
            .storage()
            .persistent()
            .get(&pending_key)
            .ok_or(Error::RequestNotFound)?;

        let raw_value = derive_raw(&env, &server_seed, request_id);

        // The consumer's failure is contained to its own frame.
        let delivered = matches!(
            RandomnessConsumerClient::new(&env, &pending.consumer).try_fulfill_randomness(
                &env.current_contract_address(),
                &request_id,
                &raw_value,
            ),
            Ok(Ok(()))
        );
        if !delivered {
            log!(&env, "consumer rejected request {}", request_id);
        }

        env.storage().persistent().remove(&pending_key);

        let fulfilled = FulfilledEntry {
            consumer: pending.consumer,
            seed_hint: pending.seed_hint,
            server_seed: server_seed.clone(),
            raw_value,
            delivered,
        };
        let fulfilled_key = DataKey::FulfilledRequest(request_id);
        env.storage().persistent().set(&fulfilled_key, &fulfilled);
        env.storage()
            .persistent()
            .extend_ttl(&fulfilled_key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);

        RandomFulfilled { request_id, raw_value, server_seed, delivered }.publish(&env);

        Ok(raw_value)
    }

    /// Pending request by id. `RequestNotFound` once fulfilled.
    pub fn get_request(env: Env, request_id: u64) -> Result<PendingEntry, Error> {
        env.storage()
            .persistent()
            .get(&DataKey::PendingRequest(request_id))
            .ok_or(Error::RequestNotFound)
    }

    /// Fulfilled request by id. `RequestNotFound` while still pending.
    pub fn get_result(env: Env, request_id: u64) -> Result<FulfilledEntry, Error> {
        require_initialized(&env)?;

        env.storage()
            .persistent()
            .get(&DataKey::FulfilledRequest(request_id))
            .ok_or(Error::RequestNotFound)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Admin) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn require_admin(env: &Env, caller: &Address) -> Result<(), Error> {
    let admin: Address = env
        .storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if caller != &admin {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn get_oracle(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Oracle)
        .ok_or(Error::NotInitialized)
}

fn require_oracle(env: &Env, caller: &Address) -> Result<(), Error> {
    let oracle = get_oracle(env)?;
    caller.require_auth();
    if caller != &oracle {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

/// Preimage is `server_seed (32 bytes) || request_id (8 bytes BE)`; the
/// first 8 digest bytes are read as a big-endian u64.
pub fn derive_raw(env: &Env, server_seed: &BytesN<32>, request_id: u64) -> u64 {
    let mut preimage = [0u8; 40];
    preimage[..32].copy_from_slice(&server_seed.to_array());
    preimage[32..].copy_from_slice(&request_id.to_be_bytes());

    let digest: BytesN<32> = env.crypto().sha256(&Bytes::from_slice(env, &preimage)).into();
    let arr = digest.to_array();
    u64::from_be_bytes([arr[0], arr[1], arr[2], arr[3], arr[4], arr[5], arr[6], arr[7]])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
