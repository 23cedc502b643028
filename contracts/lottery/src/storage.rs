//! Storage keys and typed accessors.
//!
//! Instance storage holds the admin, the config and the lottery counter.
//! Every record lives in its own persistent entry whose TTL is bumped on
//! each write.

use soroban_sdk::{contracttype, Address, Env, IntoVal, Val, Vec};

use crate::{Config, Error, Escrow, Lottery, RandomnessRequest, Ticket, MAX_PAGE_SIZE};

/// Persistent storage TTL in ledgers (~30 days at 5 s/ledger).
pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    // --- instance() ---
    Admin,
    Config,
    NextLotteryId,
    // --- persistent() ---
    Lottery(u64),
    Escrow(u64),
    /// (lottery_id, ticket index)
    Ticket(u64, u32),
    /// (lottery_id, identity handle) -> ticket index
    TicketOf(u64, u64),
    /// (identity handle, n) -> id of the n-th lottery that identity created
    Owned(u64, u32),
    /// Number of lotteries created by an identity handle.
    OwnedCount(u64),
    Request(u64),
}

pub fn write_persistent<V: IntoVal<Env, Val>>(env: &Env, key: &DataKey, value: &V) {
    env.storage().persistent().set(key, value);
    env.storage()
        .persistent()
        .extend_ttl(key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

pub fn now(env: &Env) -> u64 {
    env.ledger().timestamp()
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

pub fn is_initialized(env: &Env) -> bool {
    env.storage().instance().has(&DataKey::Admin)
}

pub fn read_config(env: &Env) -> Result<Config, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .ok_or(Error::NotInitialized)
}

pub fn write_config(env: &Env, config: &Config) {
    env.storage().instance().set(&DataKey::Config, config);
}

/// Verify that `caller` is the stored admin and has signed the invocation.
pub fn require_admin(env: &Env, caller: &Address) -> Result<(), Error> {
    let admin: Address = env
        .storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if caller != &admin {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

/// Reserve the next lottery id. Ids start at 1.
pub fn next_lottery_id(env: &Env) -> Result<u64, Error> {
    let id: u64 = env
        .storage()
        .instance()
        .get(&DataKey::NextLotteryId)
        .unwrap_or(1);
    let next = id.checked_add(1).ok_or(Error::Overflow)?;
    env.storage().instance().set(&DataKey::NextLotteryId, &next);
    Ok(id)
}

pub fn lottery_count(env: &Env) -> u64 {
    env.storage()
        .instance()
        .get::<_, u64>(&DataKey::NextLotteryId)
        .unwrap_or(1)
        - 1
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

pub fn read_lottery(env: &Env, lottery_id: u64) -> Result<Lottery, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Lottery(lottery_id))
        .ok_or(Error::NotFound)
}

pub fn write_lottery(env: &Env, lottery: &Lottery) {
    write_persistent(env, &DataKey::Lottery(lottery.id), lottery);
}

pub fn read_escrow(env: &Env, lottery_id: u64) -> Result<Escrow, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Escrow(lottery_id))
        .ok_or(Error::NotFound)
}

pub fn write_escrow(env: &Env, lottery_id: u64, escrow: &Escrow) {
    write_persistent(env, &DataKey::Escrow(lottery_id), escrow);
}

pub fn read_ticket(env: &Env, lottery_id: u64, index: u32) -> Result<Ticket, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Ticket(lottery_id, index))
        .ok_or(Error::NotFound)
}

/// Store the ticket and its identity side-map entry.
pub fn write_ticket(env: &Env, lottery_id: u64, ticket: &Ticket) {
    write_persistent(env, &DataKey::Ticket(lottery_id, ticket.index), ticket);
    write_persistent(env, &DataKey::TicketOf(lottery_id, ticket.owner), &ticket.index);
}

pub fn ticket_index_of(env: &Env, lottery_id: u64, owner: u64) -> Option<u32> {
    env.storage()
        .persistent()
        .get(&DataKey::TicketOf(lottery_id, owner))
}

pub fn owned_count(env: &Env, owner: u64) -> u32 {
    env.storage()
        .persistent()
        .get(&DataKey::OwnedCount(owner))
        .unwrap_or(0)
}

/// Lottery ids created by `owner`, oldest first, from position `start`.
pub fn owned_lotteries(env: &Env, owner: u64, start: u32, limit: u32) -> Result<Vec<u64>, Error> {
    let end = page_end(start, limit, owned_count(env, owner));
    let mut ids = Vec::new(env);
    for n in start..end {
        let id: u64 = env
            .storage()
            .persistent()
            .get(&DataKey::Owned(owner, n))
            .ok_or(Error::NotFound)?;
        ids.push_back(id);
    }
    Ok(ids)
}

pub fn add_owned_lottery(env: &Env, owner: u64, lottery_id: u64) -> Result<(), Error> {
    let n = owned_count(env, owner);
    write_persistent(env, &DataKey::Owned(owner, n), &lottery_id);
    let next = n.checked_add(1).ok_or(Error::Overflow)?;
    write_persistent(env, &DataKey::OwnedCount(owner), &next);
    Ok(())
}

/// Exclusive end of the page `[start, start + limit)` clipped to `len` and
/// to `MAX_PAGE_SIZE` entries.
pub fn page_end(start: u32, limit: u32, len: u32) -> u32 {
    start
        .saturating_add(limit.min(MAX_PAGE_SIZE))
        .min(len)
        .max(start)
}

pub fn has_request(env: &Env, request_id: u64) -> bool {
    env.storage().persistent().has(&DataKey::Request(request_id))
}

pub fn read_request(env: &Env, request_id: u64) -> Result<RandomnessRequest, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Request(request_id))
        .ok_or(Error::UnknownRequest)
}

pub fn write_request(env: &Env, request: &RandomnessRequest) {
    write_persistent(env, &DataKey::Request(request.request_id), request);
}
