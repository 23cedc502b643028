use soroban_sdk::{contractevent, Address, Symbol};

#[contractevent]
pub struct LotteryCreated {
    #[topic]
    pub lottery_id: u64,
    #[topic]
    pub owner: u64,
    pub name: Symbol,
    pub reward_amount: i128,
    pub begin_ts: u64,
    pub end_ts: u64,
}

#[contractevent]
pub struct TicketPurchased {
    #[topic]
    pub lottery_id: u64,
    #[topic]
    pub owner: u64,
    pub index: u32,
    pub price: i128,
}

#[contractevent]
pub struct RandomnessRequested {
    #[topic]
    pub lottery_id: u64,
    #[topic]
    pub request_id: u64,
    pub payer: Address,
}

#[contractevent]
pub struct RandomnessFulfilled {
    #[topic]
    pub lottery_id: u64,
    #[topic]
    pub request_id: u64,
    pub raw_value: u64,
    pub winner_index: u32,
}

/// A stalled request was replaced; callbacks for it are refused from now on.
#[contractevent]
pub struct RequestAbandoned {
    #[topic]
    pub lottery_id: u64,
    #[topic]
    pub request_id: u64,
}

/// The winner is known but a payout leg failed. `retry_settlement` finishes
/// the job.
#[contractevent]
pub struct SettlementFailed {
    #[topic]
    pub lottery_id: u64,
    pub request_id: u64,
    pub fee_paid: bool,
    pub prize_paid: bool,
}

#[contractevent]
pub struct LotteryResolved {
    #[topic]
    pub lottery_id: u64,
    pub winner: Option<u64>,
    pub recipient: Address,
    pub prize: i128,
    pub fee: i128,
}
