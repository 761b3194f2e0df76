//! Reverse DNS labels for destinations
//!
//! Lookups go through the system resolver and are cached per address,
//! including negative results, so a busy destination costs one lookup.

use std::collections::HashMap;
use std::net::IpAddr;

/// Caching reverse resolver.
#[derive(Debug, Default)]
pub struct Resolver {
    cache: HashMap<IpAddr, Option<String>>,
}

impl Resolver {
    /// Create an empty resolver cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `addr` to a hostname, if the system resolver knows one.
    pub fn lookup(&mut self, addr: IpAddr) -> Option<String> {
        self.cache
            .entry(addr)
            .or_insert_with(|| dns_lookup::lookup_addr(&addr).ok())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    #[test]
    fn test_lookup_is_cached() {
        let mut resolver = Resolver::new();
        let addr = IpAddr::V4(Ipv4Addr::LOCALHOST);

        let first = resolver.lookup(addr);
        let second = resolver.lookup(addr);

        assert_eq!(first, second);
        assert_eq!(1, resolver.cache.len());
    }
}
