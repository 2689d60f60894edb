//! Key Encoding Helpers
//!
//! Key encoding is protocol for the sled backend. Never inline key
//! construction in store logic.
//!
//! Every key starts with a one-byte record prefix followed by fixed-width
//! fields, so no key of one kind is a prefix of a key of another kind and
//! range scans over a prefix return exactly one record kind.
//!
//! - Identifiers are raw UUID bytes (16 bytes)
//! - Counters are big-endian (sorts numerically)

use lib_types::{PhaseId, TokenId, UserId};

use crate::records::AchievementKey;

// =============================================================================
// PREFIXES (FIXED - DO NOT CHANGE)
// =============================================================================

pub const TOKEN: u8 = 0x01;
pub const BALANCE: u8 = 0x02;
pub const TRADE: u8 = 0x03;
pub const POOL: u8 = 0x04;
pub const STAKE: u8 = 0x05;
pub const GRADUATION: u8 = 0x06;
pub const PHASE: u8 = 0x07;
pub const PHASE_NUMBER: u8 = 0x08;
pub const ACHIEVEMENT: u8 = 0x09;

fn compose(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.push(prefix);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

// =============================================================================
// TOKENS, BALANCES, TRADES
// =============================================================================

/// [0x01][token: 16]
pub fn token_key(id: &TokenId) -> Vec<u8> {
    compose(TOKEN, &[id.as_uuid().as_bytes()])
}

/// [0x02][token: 16][user: 16]
///
/// Token first so all holders of a token are one prefix scan.
pub fn balance_key(token: &TokenId, user: &UserId) -> Vec<u8> {
    compose(BALANCE, &[token.as_uuid().as_bytes(), user.as_uuid().as_bytes()])
}

/// [0x02][token: 16]
pub fn balance_prefix(token: &TokenId) -> Vec<u8> {
    compose(BALANCE, &[token.as_uuid().as_bytes()])
}

/// [0x03][token: 16][sequence: 8 BE]
///
/// The sequence is the token version the trade produced, so trades of a
/// token sort in commit order.
pub fn trade_key(token: &TokenId, sequence: u64) -> Vec<u8> {
    compose(TRADE, &[token.as_uuid().as_bytes(), &sequence.to_be_bytes()])
}

/// [0x03][token: 16]
pub fn trade_prefix(token: &TokenId) -> Vec<u8> {
    compose(TRADE, &[token.as_uuid().as_bytes()])
}

// =============================================================================
// STAKING & GRADUATION
// =============================================================================

/// The staking pool singleton
pub fn pool_key() -> Vec<u8> {
    vec![POOL]
}

/// [0x05][user: 16]
pub fn stake_key(user: &UserId) -> Vec<u8> {
    compose(STAKE, &[user.as_uuid().as_bytes()])
}

/// [0x06][token: 16]
pub fn graduation_key(token: &TokenId) -> Vec<u8> {
    compose(GRADUATION, &[token.as_uuid().as_bytes()])
}

// =============================================================================
// TEMPLE
// =============================================================================

/// [0x07][phase: 16]
pub fn phase_key(id: &PhaseId) -> Vec<u8> {
    compose(PHASE, &[id.as_uuid().as_bytes()])
}

/// [0x08][phase_number: 4 BE] -> phase id, enforces unique phase numbers
pub fn phase_number_key(number: u32) -> Vec<u8> {
    compose(PHASE_NUMBER, &[&number.to_be_bytes()])
}

/// [0x09][phase: 16][tier: 1][token: 16]
pub fn achievement_key(key: &AchievementKey) -> Vec<u8> {
    compose(
        ACHIEVEMENT,
        &[
            key.phase.as_uuid().as_bytes(),
            &[key.tier],
            key.token.as_uuid().as_bytes(),
        ],
    )
}

/// [0x09][phase: 16]
pub fn achievement_prefix(phase: &PhaseId) -> Vec<u8> {
    compose(ACHIEVEMENT, &[phase.as_uuid().as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lengths() {
        let token = TokenId::new();
        let user = UserId::new();
        assert_eq!(token_key(&token).len(), 17);
        assert_eq!(balance_key(&token, &user).len(), 33);
        assert_eq!(trade_key(&token, 7).len(), 25);
        assert!(balance_key(&token, &user).starts_with(&balance_prefix(&token)));
    }

    #[test]
    fn test_trade_keys_sort_by_sequence() {
        let token = TokenId::new();
        assert!(trade_key(&token, 2) < trade_key(&token, 10));
        assert!(trade_key(&token, 255) < trade_key(&token, 256));
    }
}
