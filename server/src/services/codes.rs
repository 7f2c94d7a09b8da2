//! Opaque identifiers handed to customers and providers. Generated here,
//! never accepted from clients.

use rand::distributions::Distribution;
use rand::distributions::Uniform;
use rand::Rng;

/// Upper-case letters and digits without the easily confused 0/O and 1/I.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const TICKET_CODE_LEN: usize = 16;
pub const BOOKING_REFERENCE_LEN: usize = 12;
pub const PAYMENT_REFERENCE_LEN: usize = 20;

/// Attempts made before a uniqueness collision is reported as an error.
pub const MAX_CODE_ATTEMPTS: usize = 5;

fn random_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    let index = Uniform::from(0..ALPHABET.len());
    (0..len)
        .map(|_| char::from(ALPHABET[index.sample(rng)]))
        .collect()
}

pub fn ticket_code() -> String {
    random_code(&mut rand::thread_rng(), TICKET_CODE_LEN)
}

pub fn booking_reference() -> String {
    random_code(&mut rand::thread_rng(), BOOKING_REFERENCE_LEN)
}

pub fn payment_reference() -> String {
    format!(
        "pay_{}",
        random_code(&mut rand::thread_rng(), PAYMENT_REFERENCE_LEN).to_ascii_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_use_the_unambiguous_alphabet() {
        let code = ticket_code();
        assert_eq!(code.len(), TICKET_CODE_LEN);
        assert!(code.bytes().all(|b| ALPHABET.contains(&b)));

        let reference = booking_reference();
        assert_eq!(reference.len(), BOOKING_REFERENCE_LEN);
        assert!(!reference.contains('0') && !reference.contains('O'));
    }

    #[test]
    fn test_codes_do_not_repeat_in_practice() {
        let codes: HashSet<String> = (0..1_000).map(|_| ticket_code()).collect();
        assert_eq!(codes.len(), 1_000);
    }

    #[test]
    fn test_payment_reference_prefix() {
        let reference = payment_reference();
        assert!(reference.starts_with("pay_"));
        assert_eq!(reference.len(), 4 + PAYMENT_REFERENCE_LEN);
    }
}
