//! `Cache-Control` handling.

/// Caching directives of one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub max_age: Option<u64>,
    pub stale_while_revalidate: Option<u64>,
}

impl CacheControl {
    /// Parse a `Cache-Control` value. Unknown directives are ignored.
    pub fn parse(value: Option<&str>) -> Self {
        let mut control = Self::default();
        let Some(value) = value else {
            return control;
        };

        for directive in value.split(',') {
            let directive = directive.trim();
            let (name, arg) = match directive.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
                None => (directive, None),
            };
            let seconds = arg.and_then(|a| a.parse::<u64>().ok());
            match name.to_ascii_lowercase().as_str() {
                "no-store" => control.no_store = true,
                "max-age" => control.max_age = seconds,
                "stale-while-revalidate" => control.stale_while_revalidate = seconds,
                _ => {}
            }
        }
        control
    }

    /// `(expires_at, refresh_at)` for a response received at `now`,
    /// or `None` if it must not be cached.
    pub fn lifetime(&self, now: u64, default_max_age: u64) -> Option<(u64, u64)> {
        if self.no_store {
            return None;
        }
        let max_age = self.max_age.unwrap_or(default_max_age);
        let grace = self.stale_while_revalidate.unwrap_or(0);
        if max_age == 0 && grace == 0 {
            return None;
        }
        let refresh_at = now.saturating_add(max_age);
        Some((refresh_at.saturating_add(grace), refresh_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let control = CacheControl::parse(Some("public, max-age=60, stale-while-revalidate=30"));
        assert_eq!(control.max_age, Some(60));
        assert_eq!(control.stale_while_revalidate, Some(30));
        assert!(!control.no_store);

        assert!(CacheControl::parse(Some("No-Store")).no_store);
        assert_eq!(CacheControl::parse(None), CacheControl::default());
        assert_eq!(CacheControl::parse(Some("max-age=abc")).max_age, None);
    }

    #[test]
    fn test_lifetime() {
        let control = CacheControl::parse(Some("max-age=60, stale-while-revalidate=30"));
        assert_eq!(control.lifetime(1000, 0), Some((1090, 1060)));

        let plain = CacheControl::parse(Some("max-age=60"));
        assert_eq!(plain.lifetime(1000, 0), Some((1060, 1060)));
    }

    #[test]
    fn test_lifetime_defaults_and_no_store() {
        assert_eq!(CacheControl::default().lifetime(1000, 0), None);
        assert_eq!(CacheControl::default().lifetime(1000, 10), Some((1010, 1010)));

        let control = CacheControl::parse(Some("no-store, max-age=60"));
        assert_eq!(control.lifetime(1000, 10), None);
    }
}
