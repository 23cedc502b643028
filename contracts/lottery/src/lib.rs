//! Ticketed Lottery Contract
//!
//! A creator escrows a reward and opens a ticket window. Each registered
//! identity may buy one ticket while the window is open. Once it closes,
//! anyone may `raffle` the lottery: the contract asks an external oracle for
//! a random value and freezes the lottery until the oracle calls back with
//! `fulfill_randomness`. The callback picks the winning ticket and settles
//! the escrow in the same invocation.
//!
//! ```text
//! Open ──(now >= end_ts)──▶ Closing ──raffle──▶ AwaitingRandomness ──fulfill──▶ Resolved
//!   └────────────── raffle with zero tickets (creator refunded) ──────────────────▶ Resolved
//! ```
//!
//! `Closing` is never stored. It is derived from the stored `Open` status and
//! the ledger clock whenever a lottery is read.
//!
//! ## Storage Strategy
//! - `instance()`: Admin, Config, NextLotteryId.
//! - `persistent()`: Lottery, Escrow, Ticket and Request records plus the
//!   TicketOf and Owned side maps. TTL bumped on every write.
//!
//! ## Settlement
//! `fee = reward_amount * fee_rate / 10_000` (rounded down) goes to the fee
//! receiver; the winning ticket's paying account gets the rest of the
//! escrow. Payout legs are recorded as they complete. A leg that fails inside
//! the oracle callback leaves the lottery awaiting settlement instead of
//! rolling back the callback; `retry_settlement` completes it.
#![no_std]
#![allow(unexpected_cfgs)]

mod escrow;
mod events;
mod storage;

use lotto_shared::{IdentityProviderClient, RandomnessOracleClient, FEE_DENOMINATOR};
use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, log, Address, Env, String, Symbol, Vec,
};

use escrow::Deposit;
use events::{
    LotteryCreated, LotteryResolved, RandomnessFulfilled, RandomnessRequested, RequestAbandoned,
    SettlementFailed, TicketPurchased,
};
use storage::DataKey;

pub use storage::PERSISTENT_BUMP_LEDGERS;

/// Maximum description length in bytes.
pub const MAX_DESCRIPTION_LEN: u32 = 256;

/// Largest page returned by the paginated queries.
pub const MAX_PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized     = 2,
    /// `begin_ts >= end_ts`, or the window already ended.
    InvalidWindow      = 3,
    NotFound           = 4,
    /// The identity already holds a ticket in this lottery.
    DuplicateTicket    = 5,
    PaymentFailed      = 6,
    FundingFailed      = 7,
    /// The ticket window is still open, or the request has not timed out.
    TooEarly           = 8,
    AlreadyRaffled     = 9,
    /// The callback does not match the lottery's outstanding request.
    UnknownRequest     = 10,
    AlreadyResolved    = 11,
    PayoutFailed       = 12,
    Unauthorized       = 13,
    /// The account has no identity handle.
    NoIdentity         = 14,
    /// The lottery is not accepting tickets right now.
    NotOpen            = 15,
    InvalidAmount      = 16,
    InvalidFee         = 17,
    InvalidInput       = 18,
    /// The oracle handed out a request id that is already recorded.
    DuplicateRequest   = 19,
    NothingToSettle    = 20,
    /// No outstanding request awaiting a callback.
    NoPendingRequest   = 21,
    /// Escrow bookkeeping disagrees with the amounts paid out.
    EscrowImbalance    = 22,
    Overflow           = 23,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// SEP-41 token every price, reward and payout is denominated in.
    pub token: Address,
    pub identity_provider: Address,
    pub randomness_oracle: Address,
    /// Seconds after which an unanswered request may be reissued.
    pub request_timeout: u64,
}

/// Creator-supplied parameters for `create_lottery`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LotteryParams {
    pub name: Symbol,
    pub description: String,
    pub price_per_ticket: i128,
    pub reward_amount: i128,
    pub begin_ts: u64,
    pub end_ts: u64,
    /// Basis points of `reward_amount`.
    pub fee_rate: u32,
    pub fee_receiver: Address,
}

#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LotteryStatus {
    Open = 0,
    Closing = 1,
    AwaitingRandomness = 2,
    Resolved = 3,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lottery {
    pub id: u64,
    pub name: Symbol,
    pub description: String,
    pub price_per_ticket: i128,
    pub reward_amount: i128,
    pub begin_ts: u64,
    pub end_ts: u64,
    pub fee_rate: u32,
    pub fee_receiver: Address,
    /// Identity handle of the creator.
    pub owner: u64,
    /// Account that funded the reward; refunded when nobody buys a ticket.
    pub creator: Address,
    pub status: LotteryStatus,
    /// Identity handle of the winning ticket's owner.
    pub winner: Option<u64>,
    pub pending_request: Option<u64>,
    pub ticket_count: u32,
    pub created_at: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ticket {
    pub index: u32,
    pub owner: u64,
    /// Paying account, and the payout target if this ticket wins.
    pub account: Address,
    pub purchased_at: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Escrow {
    pub reward: i128,
    /// Sum of ticket payments.
    pub collected: i128,
    pub balance: i128,
    pub fee_paid: bool,
    pub prize_paid: bool,
    pub drained: bool,
}

#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestStatus {
    Issued = 0,
    Fulfilled = 1,
    Abandoned = 2,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RandomnessRequest {
    pub request_id: u64,
    pub lottery_id: u64,
    pub issued_at: u64,
    pub status: RequestStatus,
    pub result: Option<u64>,
}

/// `Open` reads as `Closing` once the window has ended.
pub fn effective_status(stored: LotteryStatus, now: u64, end_ts: u64) -> LotteryStatus {
    match stored {
        LotteryStatus::Open if now >= end_ts => LotteryStatus::Closing,
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct TicketLottery;

#[contractimpl]
impl TicketLottery {
    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    pub fn init(env: Env, admin: Address, config: Config) -> Result<(), Error> {
        if storage::is_initialized(&env) {
            return Err(Error::AlreadyInitialized);
        }
        admin.require_auth();

        if config.request_timeout == 0 {
            return Err(Error::InvalidInput);
        }

        env.storage().instance().set(&DataKey::Admin, &admin);
        storage::write_config(&env, &config);
        Ok(())
    }

    pub fn get_config(env: Env) -> Result<Config, Error> {
        storage::read_config(&env)
    }

    /// Change how long a request may stay unanswered before it can be
    /// reissued. Admin only.
    pub fn set_request_timeout(env: Env, admin: Address, seconds: u64) -> Result<(), Error> {
        storage::require_admin(&env, &admin)?;
        if seconds == 0 {
            return Err(Error::InvalidInput);
        }
        let mut config = storage::read_config(&env)?;
        config.request_timeout = seconds;
        storage::write_config(&env, &config);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lottery registry
    // -----------------------------------------------------------------------

    /// Open a new lottery and escrow its reward.
    ///
    /// `creator` must have approved this contract for `reward_amount`. The
    /// lottery is owned by the creator's identity handle.
    pub fn create_lottery(env: Env, creator: Address, params: LotteryParams) -> Result<u64, Error> {
        let config = storage::read_config(&env)?;
        creator.require_auth();

        let now = storage::now(&env);
        if params.description.len() > MAX_DESCRIPTION_LEN {
            return Err(Error::InvalidInput);
        }
        if params.begin_ts >= params.end_ts || params.end_ts <= now {
            return Err(Error::InvalidWindow);
        }
        if params.price_per_ticket <= 0 || params.reward_amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        if params.fee_rate > FEE_DENOMINATOR {
            return Err(Error::InvalidFee);
        }

        let owner = resolve_identity(&env, &config, &creator)?;
        let lottery_id = storage::next_lottery_id(&env)?;

        let mut escrow = escrow::open();
        escrow::fund(
            &env,
            &config.token,
            &mut escrow,
            &creator,
            params.reward_amount,
            Deposit::Reward,
        )?;

        let lottery = Lottery {
            id: lottery_id,
            name: params.name,
            description: params.description,
            price_per_ticket: params.price_per_ticket,
            reward_amount: params.reward_amount,
            begin_ts: params.begin_ts,
            end_ts: params.end_ts,
            fee_rate: params.fee_rate,
            fee_receiver: params.fee_receiver,
            owner,
            creator,
            status: LotteryStatus::Open,
            winner: None,
            pending_request: None,
            ticket_count: 0,
            created_at: now,
        };
        storage::write_lottery(&env, &lottery);
        storage::write_escrow(&env, lottery_id, &escrow);
        storage::add_owned_lottery(&env, owner, lottery_id)?;

        LotteryCreated {
            lottery_id,
            owner,
            name: lottery.name,
            reward_amount: lottery.reward_amount,
            begin_ts: lottery.begin_ts,
            end_ts: lottery.end_ts,
        }
        .publish(&env);

        Ok(lottery_id)
    }

    /// Lottery record with its effective status.
    pub fn get_lottery(env: Env, lottery_id: u64) -> Result<Lottery, Error> {
        let mut lottery = storage::read_lottery(&env, lottery_id)?;
        lottery.status = effective_status(lottery.status, storage::now(&env), lottery.end_ts);
        Ok(lottery)
    }

    pub fn lottery_count(env: Env) -> u64 {
        storage::lottery_count(&env)
    }

    /// Ids of the lotteries created by identity `owner`, oldest first.
    /// At most `MAX_PAGE_SIZE` ids starting at position `start`.
    pub fn lotteries_of(env: Env, owner: u64, start: u32, limit: u32) -> Result<Vec<u64>, Error> {
        storage::owned_lotteries(&env, owner, start, limit)
    }

    pub fn owned_lottery_count(env: Env, owner: u64) -> u32 {
        storage::owned_count(&env, owner)
    }

    // -----------------------------------------------------------------------
    // Ticket ledger
    // -----------------------------------------------------------------------

    /// Buy the caller's identity a ticket. Returns the ticket index.
    pub fn buy_ticket(env: Env, buyer: Address, lottery_id: u64) -> Result<u32, Error> {
        let config = storage::read_config(&env)?;
        buyer.require_auth();

        let owner = resolve_identity(&env, &config, &buyer)?;
        let mut lottery = storage::read_lottery(&env, lottery_id)?;

        let now = storage::now(&env);
        if effective_status(lottery.status, now, lottery.end_ts) != LotteryStatus::Open
            || now < lottery.begin_ts
        {
            return Err(Error::NotOpen);
        }
        if storage::ticket_index_of(&env, lottery_id, owner).is_some() {
            return Err(Error::DuplicateTicket);
        }

        let mut escrow = storage::read_escrow(&env, lottery_id)?;
        escrow::fund(
            &env,
            &config.token,
            &mut escrow,
            &buyer,
            lottery.price_per_ticket,
            Deposit::Ticket,
        )?;

        let index = lottery.ticket_count;
        let ticket = Ticket { index, owner, account: buyer, purchased_at: now };
        lottery.ticket_count = index.checked_add(1).ok_or(Error::Overflow)?;

        storage::write_ticket(&env, lottery_id, &ticket);
        storage::write_escrow(&env, lottery_id, &escrow);
        storage::write_lottery(&env, &lottery);

        TicketPurchased { lottery_id, owner, index, price: lottery.price_per_ticket }.publish(&env);

        Ok(index)
    }

    pub fn get_ticket(env: Env, lottery_id: u64, index: u32) -> Result<Ticket, Error> {
        storage::read_ticket(&env, lottery_id, index)
    }

    pub fn get_ticket_by_identity(env: Env, lottery_id: u64, owner: u64) -> Result<Ticket, Error> {
        let index = storage::ticket_index_of(&env, lottery_id, owner).ok_or(Error::NotFound)?;
        storage::read_ticket(&env, lottery_id, index)
    }

    /// Identity handles holding tickets `start..start + limit`, in ticket
    /// order. At most `MAX_PAGE_SIZE` per call.
    pub fn list_participants(
        env: Env,
        lottery_id: u64,
        start: u32,
        limit: u32,
    ) -> Result<Vec<u64>, Error> {
        let lottery = storage::read_lottery(&env, lottery_id)?;
        let end = storage::page_end(start, limit, lottery.ticket_count);
        let mut participants = Vec::new(&env);
        for index in start..end {
            participants.push_back(storage::read_ticket(&env, lottery_id, index)?.owner);
        }
        Ok(participants)
    }

    pub fn get_escrow(env: Env, lottery_id: u64) -> Result<Escrow, Error> {
        storage::read_escrow(&env, lottery_id)
    }

    // -----------------------------------------------------------------------
    // Randomness resolution
    // -----------------------------------------------------------------------

    /// Close a lottery whose window has ended.
    ///
    /// With tickets sold this requests randomness (the caller pays the
    /// oracle's request fee) and returns the request id. Without tickets the
    /// reward goes back to the creator immediately and `None` is returned.
    pub fn raffle(env: Env, caller: Address, lottery_id: u64) -> Result<Option<u64>, Error> {
        let config = storage::read_config(&env)?;
        caller.require_auth();

        let mut lottery = storage::read_lottery(&env, lottery_id)?;
        if lottery.status != LotteryStatus::Open {
            return Err(Error::AlreadyRaffled);
        }
        if storage::now(&env) < lottery.end_ts {
            return Err(Error::TooEarly);
        }

        if lottery.ticket_count == 0 {
            let mut escrow = storage::read_escrow(&env, lottery_id)?;
            let payout = escrow::settle(&env, &config.token, &lottery, &mut escrow, &lottery.creator)?;
            storage::write_escrow(&env, lottery_id, &escrow);
            finalize(&env, &mut lottery, None, payout);
            return Ok(None);
        }

        let request_id = issue_request(&env, &config, &mut lottery, &caller)?;
        Ok(Some(request_id))
    }

    /// Oracle callback carrying the raw random value for `request_id`.
    ///
    /// A failed payout does not fail the callback: the request stays
    /// fulfilled, a `SettlementFailed` event is emitted and the lottery
    /// waits for `retry_settlement`.
    pub fn fulfill_randomness(
        env: Env,
        oracle: Address,
        request_id: u64,
        raw_value: u64,
    ) -> Result<(), Error> {
        let config = storage::read_config(&env)?;
        oracle.require_auth();
        if oracle != config.randomness_oracle {
            return Err(Error::Unauthorized);
        }

        let mut request = storage::read_request(&env, request_id)?;
        let mut lottery = storage::read_lottery(&env, request.lottery_id)?;

        if lottery.status != LotteryStatus::AwaitingRandomness {
            return Err(Error::AlreadyResolved);
        }
        if lottery.pending_request != Some(request_id) {
            return Err(Error::UnknownRequest);
        }
        if request.status != RequestStatus::Issued {
            return Err(Error::AlreadyResolved);
        }

        request.status = RequestStatus::Fulfilled;
        request.result = Some(raw_value);
        storage::write_request(&env, &request);

        let winner = winning_ticket(&env, &lottery, raw_value)?;
        RandomnessFulfilled {
            lottery_id: lottery.id,
            request_id,
            raw_value,
            winner_index: winner.index,
        }
        .publish(&env);

        settle_winner(&env, &config, &mut lottery, request_id, &winner)?;
        Ok(())
    }

    /// Finish a settlement whose payout failed during the oracle callback.
    /// Anyone may call this; legs already paid are skipped and legs that
    /// succeed now are kept even if another leg still fails.
    ///
    /// Returns `true` once the lottery is resolved, `false` while a payout
    /// leg is still outstanding.
    pub fn retry_settlement(env: Env, lottery_id: u64) -> Result<bool, Error> {
        let config = storage::read_config(&env)?;
        let mut lottery = storage::read_lottery(&env, lottery_id)?;

        match lottery.status {
            LotteryStatus::Resolved => return Err(Error::AlreadyResolved),
            LotteryStatus::AwaitingRandomness => {}
            _ => return Err(Error::NothingToSettle),
        }
        let request_id = lottery.pending_request.ok_or(Error::NothingToSettle)?;
        let request = storage::read_request(&env, request_id)?;
        let raw_value = match (request.status, request.result) {
            (RequestStatus::Fulfilled, Some(raw_value)) => raw_value,
            _ => return Err(Error::NothingToSettle),
        };

        let winner = winning_ticket(&env, &lottery, raw_value)?;
        settle_winner(&env, &config, &mut lottery, request_id, &winner)
    }

    /// Replace a request the oracle has not answered within
    /// `request_timeout`. The caller pays the new request's fee. Returns the
    /// new request id.
    pub fn reissue_randomness(env: Env, caller: Address, lottery_id: u64) -> Result<u64, Error> {
        let config = storage::read_config(&env)?;
        caller.require_auth();

        let mut lottery = storage::read_lottery(&env, lottery_id)?;
        if lottery.status != LotteryStatus::AwaitingRandomness {
            return Err(Error::NoPendingRequest);
        }
        let stale_id = lottery.pending_request.ok_or(Error::NoPendingRequest)?;
        let mut stale = storage::read_request(&env, stale_id)?;
        if stale.status != RequestStatus::Issued {
            return Err(Error::NoPendingRequest);
        }

        let deadline = stale
            .issued_at
            .checked_add(config.request_timeout)
            .ok_or(Error::Overflow)?;
        if storage::now(&env) < deadline {
            return Err(Error::TooEarly);
        }

        stale.status = RequestStatus::Abandoned;
        storage::write_request(&env, &stale);
        RequestAbandoned { lottery_id, request_id: stale_id }.publish(&env);

        issue_request(&env, &config, &mut lottery, &caller)
    }

    pub fn get_request(env: Env, request_id: u64) -> Result<RandomnessRequest, Error> {
        storage::read_request(&env, request_id)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn resolve_identity(env: &Env, config: &Config, account: &Address) -> Result<u64, Error> {
    match IdentityProviderClient::new(env, &config.identity_provider).try_resolve(account) {
        Ok(Ok(handle)) => Ok(handle),
        _ => Err(Error::NoIdentity),
    }
}

/// Ask the oracle for randomness on behalf of `lottery` and lock it.
fn issue_request(
    env: &Env,
    config: &Config,
    lottery: &mut Lottery,
    payer: &Address,
) -> Result<u64, Error> {
    let request_id = RandomnessOracleClient::new(env, &config.randomness_oracle).request_random(
        &env.current_contract_address(),
        payer,
        &lottery.id,
    );
    if storage::has_request(env, request_id) {
        return Err(Error::DuplicateRequest);
    }

    storage::write_request(
        env,
        &RandomnessRequest {
            request_id,
            lottery_id: lottery.id,
            issued_at: storage::now(env),
            status: RequestStatus::Issued,
            result: None,
        },
    );

    lottery.status = LotteryStatus::AwaitingRandomness;
    lottery.pending_request = Some(request_id);
    storage::write_lottery(env, lottery);

    RandomnessRequested { lottery_id: lottery.id, request_id, payer: payer.clone() }.publish(env);

    Ok(request_id)
}

/// Pay out to `winner`. A failed leg is persisted and reported with
/// `SettlementFailed` instead of failing the invocation; returns whether the
/// lottery is now resolved.
fn settle_winner(
    env: &Env,
    config: &Config,
    lottery: &mut Lottery,
    request_id: u64,
    winner: &Ticket,
) -> Result<bool, Error> {
    let mut escrow = storage::read_escrow(env, lottery.id)?;
    match escrow::settle(env, &config.token, lottery, &mut escrow, &winner.account) {
        Ok(payout) => {
            storage::write_escrow(env, lottery.id, &escrow);
            finalize(env, lottery, Some(winner.owner), payout);
            Ok(true)
        }
        Err(Error::PayoutFailed) => {
            storage::write_escrow(env, lottery.id, &escrow);
            log!(env, "settlement of lottery {} deferred", lottery.id);
            SettlementFailed {
                lottery_id: lottery.id,
                request_id,
                fee_paid: escrow.fee_paid,
                prize_paid: escrow.prize_paid,
            }
            .publish(env);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn winning_ticket(env: &Env, lottery: &Lottery, raw_value: u64) -> Result<Ticket, Error> {
    if lottery.ticket_count == 0 {
        return Err(Error::NothingToSettle);
    }
    let index = (raw_value % u64::from(lottery.ticket_count)) as u32;
    storage::read_ticket(env, lottery.id, index)
}

fn finalize(env: &Env, lottery: &mut Lottery, winner: Option<u64>, payout: escrow::Payout) {
    lottery.status = LotteryStatus::Resolved;
    lottery.winner = winner;
    lottery.pending_request = None;
    storage::write_lottery(env, lottery);

    LotteryResolved {
        lottery_id: lottery.id,
        winner,
        recipient: payout.recipient,
        prize: payout.prize,
        fee: payout.fee,
    }
    .publish(env);
}
