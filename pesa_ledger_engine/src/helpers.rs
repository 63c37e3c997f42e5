//! Small helpers shared by the engine and its callers.

use rand::{distributions::Alphanumeric, thread_rng, Rng};

/// Generates a fresh ledger reference of the form `{prefix}-{16 alphanumeric chars}`,
/// e.g. `WD-j3K9fDqLm2xVbR7p`.
pub fn new_reference(prefix: &str) -> String {
    let suffix = thread_rng().sample_iter(&Alphanumeric).take(16).map(char::from).collect::<String>();
    format!("{prefix}-{suffix}")
}

#[cfg(test)]
mod test {
    use super::new_reference;

    #[test]
    fn references_carry_the_prefix_and_are_unique() {
        let a = new_reference("WD");
        let b = new_reference("WD");
        assert!(a.starts_with("WD-"));
        assert_eq!(a.len(), 19);
        assert_ne!(a, b);
    }
}
