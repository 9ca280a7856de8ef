use clap::Parser;

/// Read an environment variable, parsing it to the desired type.
pub fn get_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Parses from the command line arguments.
pub fn parse_args<T: Parser>() -> Result<T, clap::Error> {
    T::try_parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_missing_or_unparsable() {
        assert_eq!(get_env::<u32>("ROUTE_ATLAS_TEST_SURELY_UNSET_VARIABLE"), None);
        // PATH is always set but never a number
        assert_eq!(get_env::<u32>("PATH"), None);
        assert!(get_env::<String>("PATH").is_some());
    }
}
