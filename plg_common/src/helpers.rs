/// Reads a boolean switch out of an environment-variable value. Anything unrecognisable falls
/// back to the default rather than erroring, so a mistyped flag never stops the server booting.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let Some(raw) = value else { return default };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => true,
        "false" | "no" | "off" | "0" => false,
        _ => default,
    }
}

#[cfg(test)]
mod test {
    use super::parse_boolean_flag;

    #[test]
    fn recognised_flags_override_the_default() {
        for truthy in ["true", "YES", " on ", "1"] {
            assert!(parse_boolean_flag(Some(truthy.into()), false), "{truthy} should read as true");
        }
        for falsy in ["false", "No", "off", "0"] {
            assert!(!parse_boolean_flag(Some(falsy.into()), true), "{falsy} should read as false");
        }
    }

    #[test]
    fn missing_or_garbled_flags_fall_back_to_the_default() {
        assert!(parse_boolean_flag(None, true));
        assert!(!parse_boolean_flag(None, false));
        assert!(parse_boolean_flag(Some("enable_it_quickly".into()), true));
    }
}
