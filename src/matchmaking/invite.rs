//! Join codes for private matches

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;

use crate::game::MatchId;

/// No 0/O or 1/I, codes get read aloud
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Draw codes until one is free among live matches and claim it
pub fn reserve_code(codes: &DashMap<String, MatchId>, match_id: MatchId) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let code = generate_code(&mut rng);
        if let Entry::Vacant(slot) = codes.entry(code.clone()) {
            slot.insert(match_id);
            return code;
        }
    }
}
