//! Donation amounts paid out when a micro-bet closes.
//!
//! A "neither" outcome pays exactly half of the ceiling. A matched outcome
//! pays a uniformly random whole amount strictly between [`MIN_MATCHED_DONATION`]
//! and the ceiling.

use rand::Rng;

use crate::db::models::BetAnswer;

/// Exclusive lower bound for a matched payout.
pub const MIN_MATCHED_DONATION: u32 = 100;

pub fn donation_amount<R: Rng + ?Sized>(answer: BetAnswer, max_donation: u32, rng: &mut R) -> u32 {
    let half = max_donation / 2;
    match answer {
        BetAnswer::Neither => half,
        BetAnswer::Opt1 | BetAnswer::Opt2 => {
            let low = MIN_MATCHED_DONATION + 1;
            if max_donation <= low {
                // (100, max) holds no integer
                half
            } else {
                rng.gen_range(low..max_donation)
            }
        }
    }
}
