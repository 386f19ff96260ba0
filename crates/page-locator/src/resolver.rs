//! Ordered first-success-wins field resolution.
//!
//! Heuristic selector cascades (many fallback ways to derive the same field)
//! are modelled as an ordered list of independent resolver functions over an
//! already-collected page sample. Each resolver either produces a value or
//! abstains; the first success wins and the chain records which source won,
//! keeping the precedence policy testable in isolation from page structure.

use tracing::debug;

/// One step of a resolution cascade.
pub struct Resolver<S, T> {
    /// Source name recorded when this resolver wins
    pub name: &'static str,

    /// The resolution function; `None` means "this source has no answer"
    pub run: fn(&S) -> Option<T>,
}

impl<S, T> Resolver<S, T> {
    pub fn new(name: &'static str, run: fn(&S) -> Option<T>) -> Self {
        Self { name, run }
    }
}

/// Walk the cascade in order and return the first hit with its source name.
pub fn resolve_first<S, T>(label: &'static str, sample: &S, chain: &[Resolver<S, T>]) -> Option<(T, &'static str)> {
    for resolver in chain {
        if let Some(value) = (resolver.run)(sample) {
            debug!(field = label, source = resolver.name, "field resolved");
            return Some((value, resolver.name));
        }
        debug!(field = label, source = resolver.name, "source abstained");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample {
        primary: Option<&'static str>,
        fallback: Option<&'static str>,
    }

    fn from_primary(sample: &Sample) -> Option<String> {
        sample.primary.map(str::to_string)
    }

    fn from_fallback(sample: &Sample) -> Option<String> {
        sample.fallback.map(str::to_string)
    }

    fn chain() -> Vec<Resolver<Sample, String>> {
        vec![
            Resolver::new("primary", from_primary),
            Resolver::new("fallback", from_fallback),
        ]
    }

    #[test]
    fn first_success_wins() {
        let sample = Sample {
            primary: Some("a"),
            fallback: Some("b"),
        };
        let (value, source) = resolve_first("field", &sample, &chain()).unwrap();
        assert_eq!(value, "a");
        assert_eq!(source, "primary");
    }

    #[test]
    fn falls_through_to_later_sources() {
        let sample = Sample {
            primary: None,
            fallback: Some("b"),
        };
        let (value, source) = resolve_first("field", &sample, &chain()).unwrap();
        assert_eq!(value, "b");
        assert_eq!(source, "fallback");
    }

    #[test]
    fn exhausted_chain_returns_none() {
        let sample = Sample {
            primary: None,
            fallback: None,
        };
        assert!(resolve_first("field", &sample, &chain()).is_none());
    }
}
