use std::{
    fmt,
    fmt::{Debug, Display},
};

/// Wrapper for credentials that must never leak into logs.
///
/// The webhook signing secret and the gateway API key both travel through config structs that get
/// debug-printed at startup, so the masking lives on the type rather than on programmer
/// discipline. Call [`reveal`](Self::reveal) at the single point the raw value is actually needed.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    /// Hands back the wrapped value. Keep the result out of log statements.
    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[cfg(test)]
mod test {
    use super::Secret;

    #[test]
    fn secrets_mask_their_value_in_all_formatters() {
        let key: Secret<String> = "whk_live_123456".to_string().into();
        assert_eq!(format!("{key}"), "****");
        assert_eq!(format!("{key:?}"), "****");
        assert_eq!(key.reveal(), "whk_live_123456");
    }
}
