//! Identity Registry Contract
//!
//! Binds each account to exactly one identity handle. Handles are
//! sequential, start at 1 and are never reused, so a lottery can key its
//! one-ticket-per-participant rule on the handle instead of the raw address.
//!
//! ## Storage Strategy
//! - `instance()`: NextHandle counter.
//! - `persistent()`: HandleOf(account) and AccountOf(handle) side maps, TTL
//!   bumped on every write.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Env,
};

pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyRegistered = 1,
    IdentityNotFound  = 2,
    Overflow          = 3,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    NextHandle,
    HandleOf(Address),
    AccountOf(u64),
}

#[contractevent]
pub struct IdentityRegistered {
    #[topic]
    pub handle: u64,
    #[topic]
    pub account: Address,
}

#[contract]
pub struct IdentityRegistry;

#[contractimpl]
impl IdentityRegistry {
    /// Create a new identity for `account`. One identity per account.
    pub fn register(env: Env, account: Address) -> Result<u64, Error> {
        account.require_auth();

        let handle_key = DataKey::HandleOf(account.clone());
        if env.storage().persistent().has(&handle_key) {
            return Err(Error::AlreadyRegistered);
        }

        let handle: u64 = env
            .storage()
            .instance()
            .get(&DataKey::NextHandle)
            .unwrap_or(1);
        let next = handle.checked_add(1).ok_or(Error::Overflow)?;
        env.storage().instance().set(&DataKey::NextHandle, &next);

        write_persistent(&env, &handle_key, &handle);
        write_persistent(&env, &DataKey::AccountOf(handle), &account);

        IdentityRegistered { handle, account }.publish(&env);

        Ok(handle)
    }

    /// Handle bound to `account`.
    pub fn resolve(env: Env, account: Address) -> Result<u64, Error> {
        env.storage()
            .persistent()
            .get(&DataKey::HandleOf(account))
            .ok_or(Error::IdentityNotFound)
    }

    /// Account bound to `handle`.
    pub fn address_of(env: Env, handle: u64) -> Result<Address, Error> {
        env.storage()
            .persistent()
            .get(&DataKey::AccountOf(handle))
            .ok_or(Error::IdentityNotFound)
    }
}

fn write_persistent<V>(env: &Env, key: &DataKey, value: &V)
where
    V: soroban_sdk::IntoVal<Env, soroban_sdk::Val>,
{
    env.storage().persistent().set(key, value);
    env.storage()
        .persistent()
        .extend_ttl(key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}
