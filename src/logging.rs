//! Logger initialisation for hosts embedding stackwright

/// Map a `-v` count to a log level
pub fn level_for(verbose: u8, quiet: bool) -> log::LevelFilter {
    if quiet {
        return log::LevelFilter::Error;
    }
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// Install an env_logger at the level implied by `verbose` and `quiet`
///
/// Does nothing if a logger is already installed.
pub fn init(verbose: u8, quiet: bool) {
    let _ = env_logger::Builder::new()
        .filter_level(level_for(verbose, quiet))
        .format_timestamp(None)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for(0, false), log::LevelFilter::Warn);
        assert_eq!(level_for(1, false), log::LevelFilter::Info);
        assert_eq!(level_for(2, false), log::LevelFilter::Debug);
        assert_eq!(level_for(7, false), log::LevelFilter::Trace);
        assert_eq!(level_for(3, true), log::LevelFilter::Error);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(0, false);
        init(2, false);
    }
}
