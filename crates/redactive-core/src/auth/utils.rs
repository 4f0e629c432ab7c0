use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// Length of the anti-forgery state generated for connection flows.
pub const SIGN_IN_STATE_LEN: usize = 32;

pub fn random_state(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_alphanumeric_and_distinct() {
        let first = random_state(SIGN_IN_STATE_LEN);
        let second = random_state(SIGN_IN_STATE_LEN);
        assert_eq!(first.len(), SIGN_IN_STATE_LEN);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first, second);
    }
}
