//! Per-lottery escrow and settlement.
//!
//! An escrow is a sub-ledger of the contract's single token balance, keyed by
//! lottery id. Inbound pulls are verified against the contract's balance
//! delta; outbound payouts use fallible token calls and record each leg as it
//! completes, so a retried settlement never pays the same leg twice.

use lotto_shared::calculate_fee;
use soroban_sdk::{log, token::TokenClient, Address, Env};

use crate::{Error, Escrow, Lottery};

/// What an inbound transfer pays for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Deposit {
    Reward,
    Ticket,
}

impl Deposit {
    fn failure(self) -> Error {
        match self {
            Deposit::Reward => Error::FundingFailed,
            Deposit::Ticket => Error::PaymentFailed,
        }
    }
}

/// Amounts moved by a completed settlement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Payout {
    pub recipient: Address,
    pub prize: i128,
    pub fee: i128,
}

pub fn open() -> Escrow {
    Escrow {
        reward: 0,
        collected: 0,
        balance: 0,
        fee_paid: false,
        prize_paid: false,
        drained: false,
    }
}

/// Pull `amount` from `from` against its allowance and credit `escrow`.
pub fn fund(
    env: &Env,
    token: &Address,
    escrow: &mut Escrow,
    from: &Address,
    amount: i128,
    deposit: Deposit,
) -> Result<(), Error> {
    let client = TokenClient::new(env, token);
    let this = env.current_contract_address();

    let before = client.balance(&this);
    if !matches!(
        client.try_transfer_from(&this, from, &this, &amount),
        Ok(Ok(()))
    ) {
        log!(env, "pull of {} failed", amount);
        return Err(deposit.failure());
    }
    let received = client
        .balance(&this)
        .checked_sub(before)
        .ok_or(Error::Overflow)?;
    if received != amount {
        log!(env, "pull of {} credited {}", amount, received);
        return Err(deposit.failure());
    }

    match deposit {
        Deposit::Reward => {
            escrow.reward = escrow.reward.checked_add(amount).ok_or(Error::Overflow)?;
        }
        Deposit::Ticket => {
            escrow.collected = escrow.collected.checked_add(amount).ok_or(Error::Overflow)?;
        }
    }
    escrow.balance = escrow.balance.checked_add(amount).ok_or(Error::Overflow)?;

    Ok(())
}

/// Distribute the whole escrow.
///
/// With tickets sold, the fee receiver gets `reward * fee_rate /
/// FEE_DENOMINATOR` (rounded down) and `recipient` gets everything else.
/// Without tickets there is no fee and `recipient` (the creator) gets the
/// reward back.
///
/// Each unpaid leg is attempted on every call, independently of the other.
/// On `PayoutFailed`
/// the legs paid so far are already recorded in `escrow`; the caller decides
/// whether to persist them.
pub fn settle(
    env: &Env,
    token: &Address,
    lottery: &Lottery,
    escrow: &mut Escrow,
    recipient: &Address,
) -> Result<Payout, Error> {
    if escrow.drained {
        return Err(Error::AlreadyResolved);
    }

    let fee = if lottery.ticket_count == 0 {
        0
    } else {
        calculate_fee(escrow.reward, lottery.fee_rate).map_err(|_| Error::InvalidFee)?
    };
    let prize = escrow
        .reward
        .checked_add(escrow.collected)
        .and_then(|total| total.checked_sub(fee))
        .ok_or(Error::Overflow)?;

    let mut outstanding = false;

    if fee > 0 && !escrow.fee_paid {
        if pay(env, token, &lottery.fee_receiver, fee).is_ok() {
            escrow.fee_paid = true;
            escrow.balance = escrow.balance.checked_sub(fee).ok_or(Error::Overflow)?;
        } else {
            outstanding = true;
        }
    }

    if !escrow.prize_paid {
        if prize == 0 || pay(env, token, recipient, prize).is_ok() {
            escrow.prize_paid = true;
            escrow.balance = escrow.balance.checked_sub(prize).ok_or(Error::Overflow)?;
        } else {
            outstanding = true;
        }
    }

    if outstanding {
        return Err(Error::PayoutFailed);
    }

    if escrow.balance != 0 {
        log!(env, "escrow {} left {} after settlement", lottery.id, escrow.balance);
        return Err(Error::EscrowImbalance);
    }
    escrow.drained = true;

    Ok(Payout { recipient: recipient.clone(), prize, fee })
}

fn pay(env: &Env, token: &Address, to: &Address, amount: i128) -> Result<(), Error> {
    let client = TokenClient::new(env, token);
    match client.try_transfer(&env.current_contract_address(), to, &amount) {
        Ok(Ok(())) => Ok(()),
        _ => {
            log!(env, "payout of {} failed", amount);
            Err(Error::PayoutFailed)
        }
    }
}
